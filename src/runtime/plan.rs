//! The workflow plan: a dependency-labeled node graph derived from the
//! typechecked AST, the intermediate representation the scheduling state
//! machine executes.
//!
//! Each workflow element becomes a node with a unique string ID
//! (`decl-x`, `call-y`, `scatter-L5C3`, ...) and a set of predecessor IDs.
//! Scatter/conditional sections carry a nested sub-plan plus one synthesized
//! [`GatherNode`] per inner binding, lifting it to an `Array[T]` (scatter)
//! or `T?` (conditional) for the enclosing scope; outer nodes always depend
//! on the gather, never on the inner node directly. A terminal
//! `outputs` node depends on every output declaration (or on all top-level
//! calls and gathers when the output section is absent).
//!
//! A section node's dependencies also include every dependency its body
//! nodes have on nodes outside the section, so that by the time the section
//! is instantiated the values its body needs are all available for the
//! per-instance environment snapshot.

use crate::error::WdlError;
use crate::expr::Expression;
use crate::tree::{Call, Declaration, Document, Workflow, WorkflowElement};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Plan {
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct PlanNode {
    pub id: String,
    pub deps: BTreeSet<String>,
    pub kind: PlanNodeKind,
}

#[derive(Debug, Clone)]
pub enum PlanNodeKind {
    /// Evaluate (or take from workflow inputs) a value declaration.
    Decl(Declaration),
    /// Evaluate call inputs and dispatch the callee.
    Call(Call),
    /// Scatter or conditional section with its sub-plan.
    Section(SectionPlan),
    /// Terminal sink assembling the workflow outputs.
    Outputs(Vec<Declaration>),
}

#[derive(Debug, Clone)]
pub struct SectionPlan {
    /// `Some(variable)` for scatter, `None` for conditional.
    pub scatter_variable: Option<String>,
    pub expr: Expression,
    pub body: Vec<PlanNode>,
    pub gathers: Vec<GatherNode>,
}

/// Synthesized node lifting one inner binding out of a section.
#[derive(Debug, Clone)]
pub struct GatherNode {
    pub id: String,
    /// Inner node (or nested gather) whose outputs are collected.
    pub referee: String,
    /// The scope-level name this gather answers for (`sq`, or a call name).
    pub key: String,
    /// Environment binding names the gather produces (`sq`, `t.out`, ...).
    pub names: Vec<String>,
    pub scatter: bool,
}

impl Plan {
    /// Compile a typechecked workflow into its plan. The workflow is known
    /// acyclic; this verifies the structural invariant that every
    /// dependency ID refers to a known node or an exposed gather.
    pub fn compile(wf: &Workflow, doc: &Document) -> Result<Plan, WdlError> {
        let mut top_names: HashMap<String, String> = HashMap::new();
        for d in wf.input_decls() {
            top_names.insert(d.name.clone(), d.workflow_node_id());
        }

        let mut nodes: Vec<PlanNode> = Vec::new();
        for d in wf.input_decls() {
            nodes.push(PlanNode {
                id: d.workflow_node_id(),
                deps: resolve_deps(&decl_refs(d), &[&top_names]),
                kind: PlanNodeKind::Decl((*d).clone()),
            });
        }

        let (mut body_nodes, body_names) = build_scope(&wf.body, doc, &[&top_names])?;
        nodes.append(&mut body_nodes);

        // terminal outputs node
        match &wf.outputs {
            Some(outputs) => {
                // outputs may reference earlier outputs
                let output_names: HashMap<String, String> = outputs
                    .iter()
                    .map(|d| (d.name.clone(), format!("output-{}", d.name)))
                    .collect();
                let out_maps: [&HashMap<String, String>; 3] =
                    [&output_names, &body_names, &top_names];
                let mut output_ids = BTreeSet::new();
                for d in outputs {
                    let id = format!("output-{}", d.name);
                    nodes.push(PlanNode {
                        id: id.clone(),
                        deps: {
                            let mut deps = resolve_deps(&decl_refs(d), &out_maps);
                            deps.remove(&id);
                            deps
                        },
                        kind: PlanNodeKind::Decl(d.clone()),
                    });
                    output_ids.insert(id);
                }
                nodes.push(PlanNode {
                    id: "outputs".to_string(),
                    deps: output_ids,
                    kind: PlanNodeKind::Outputs(outputs.clone()),
                });
            }
            None => {
                // expose every top-level call and section gather
                let mut deps = BTreeSet::new();
                for n in &nodes {
                    match &n.kind {
                        PlanNodeKind::Call(_) => {
                            deps.insert(n.id.clone());
                        }
                        PlanNodeKind::Section(s) => {
                            for g in &s.gathers {
                                deps.insert(g.id.clone());
                            }
                        }
                        _ => {}
                    }
                }
                nodes.push(PlanNode {
                    id: "outputs".to_string(),
                    deps,
                    kind: PlanNodeKind::Outputs(vec![]),
                });
            }
        }

        let plan = Plan { nodes };
        plan.check_dependencies()?;
        Ok(plan)
    }

    /// Every dependency must name a known node or gather.
    fn check_dependencies(&self) -> Result<(), WdlError> {
        let mut known = BTreeSet::new();
        fn collect(nodes: &[PlanNode], known: &mut BTreeSet<String>) {
            for n in nodes {
                known.insert(n.id.clone());
                if let PlanNodeKind::Section(s) = &n.kind {
                    for g in &s.gathers {
                        known.insert(g.id.clone());
                    }
                    collect(&s.body, known);
                }
            }
        }
        collect(&self.nodes, &mut known);
        fn verify(nodes: &[PlanNode], known: &BTreeSet<String>) -> Result<(), WdlError> {
            for n in nodes {
                for d in &n.deps {
                    if !known.contains(d) {
                        return Err(WdlError::runtime(format!(
                            "workflow plan references unknown node {} (from {})",
                            d, n.id
                        )));
                    }
                }
                if let PlanNodeKind::Section(s) = &n.kind {
                    verify(&s.body, known)?;
                }
            }
            Ok(())
        }
        verify(&self.nodes, &known)
    }

    /// Node lookup by ID at the top level.
    pub fn node(&self, id: &str) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

fn decl_refs(d: &Declaration) -> Vec<String> {
    let mut refs = Vec::new();
    if let Some(e) = &d.expr {
        e.referenced_names(&mut refs);
    }
    refs
}

fn call_refs(c: &Call) -> Vec<String> {
    let mut refs = Vec::new();
    for e in c.inputs.values() {
        e.referenced_names(&mut refs);
    }
    refs.extend(c.afters.iter().cloned());
    refs
}

/// Map referenced names to node IDs through the scope maps (innermost
/// first); names that resolve nowhere are workflow inputs, scatter
/// variables, or other implicit bindings and yield no edge.
fn resolve_deps(refs: &[String], maps: &[&HashMap<String, String>]) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    for name in refs {
        let first = name.split('.').next().unwrap_or(name);
        for map in maps {
            if let Some(id) = map.get(name).or_else(|| map.get(first)) {
                deps.insert(id.clone());
                break;
            }
        }
    }
    deps
}

/// The binding names a call produces in the enclosing environment.
fn call_binding_names(c: &Call, doc: &Document) -> Vec<String> {
    match &c.callee {
        Some(callee) => doc
            .callee_outputs(callee)
            .iter()
            .map(|b| format!("{}.{}", c.name(), b.name()))
            .collect(),
        None => vec![],
    }
}

/// Build plan nodes for one scope. Returns the nodes plus the name→ID map
/// this scope exposes to its siblings (gathers standing in for section
/// innards).
fn build_scope(
    elements: &[WorkflowElement],
    doc: &Document,
    outer_maps: &[&HashMap<String, String>],
) -> Result<(Vec<PlanNode>, HashMap<String, String>), WdlError> {
    // sibling name map first, so forward references resolve
    let mut scope_map: HashMap<String, String> = HashMap::new();
    for element in elements {
        match element {
            WorkflowElement::Decl(d) => {
                scope_map.insert(d.name.clone(), d.workflow_node_id());
            }
            WorkflowElement::Call(c) => {
                scope_map.insert(c.name().to_string(), c.workflow_node_id());
            }
            WorkflowElement::Scatter(s) => {
                for (key, gather_id) in scope_exports(&s.body, doc) {
                    scope_map.insert(key, gather_id);
                }
            }
            WorkflowElement::Conditional(c) => {
                for (key, gather_id) in scope_exports(&c.body, doc) {
                    scope_map.insert(key, gather_id);
                }
            }
        }
    }

    let mut maps: Vec<&HashMap<String, String>> = vec![&scope_map];
    maps.extend(outer_maps.iter().copied());

    let mut nodes = Vec::new();
    for element in elements {
        match element {
            WorkflowElement::Decl(d) => {
                nodes.push(PlanNode {
                    id: d.workflow_node_id(),
                    deps: resolve_deps(&decl_refs(d), &maps),
                    kind: PlanNodeKind::Decl(d.clone()),
                });
            }
            WorkflowElement::Call(c) => {
                nodes.push(PlanNode {
                    id: c.workflow_node_id(),
                    deps: resolve_deps(&call_refs(c), &maps),
                    kind: PlanNodeKind::Call(c.clone()),
                });
            }
            WorkflowElement::Scatter(s) => {
                nodes.push(build_section(
                    s.workflow_node_id(),
                    Some(s.variable.clone()),
                    &s.expr,
                    &s.body,
                    doc,
                    &maps,
                )?);
            }
            WorkflowElement::Conditional(c) => {
                nodes.push(build_section(
                    c.workflow_node_id(),
                    None,
                    &c.expr,
                    &c.body,
                    doc,
                    &maps,
                )?);
            }
        }
    }
    Ok((nodes, scope_map))
}

fn build_section(
    id: String,
    scatter_variable: Option<String>,
    expr: &Expression,
    body: &[WorkflowElement],
    doc: &Document,
    outer_maps: &[&HashMap<String, String>],
) -> Result<PlanNode, WdlError> {
    let (body_nodes, _body_map) = build_scope(body, doc, outer_maps)?;

    // the section depends on its expression plus every dependency its body
    // has on the outside world
    let mut expr_refs = Vec::new();
    expr.referenced_names(&mut expr_refs);
    let mut deps = resolve_deps(&expr_refs, outer_maps);
    let local_ids: BTreeSet<String> = {
        let mut ids = BTreeSet::new();
        for n in &body_nodes {
            ids.insert(n.id.clone());
            if let PlanNodeKind::Section(s) = &n.kind {
                for g in &s.gathers {
                    ids.insert(g.id.clone());
                }
            }
        }
        ids
    };
    fn outward(nodes: &[PlanNode], local: &BTreeSet<String>, out: &mut BTreeSet<String>) {
        for n in nodes {
            for d in &n.deps {
                if !local.contains(d) {
                    out.insert(d.clone());
                }
            }
            // nested sections already aggregated their own bodies' outward
            // deps into their node deps
        }
    }
    outward(&body_nodes, &local_ids, &mut deps);

    let scatter = scatter_variable.is_some();
    let mut gathers = Vec::new();
    for n in &body_nodes {
        match &n.kind {
            PlanNodeKind::Decl(d) => gathers.push(GatherNode {
                id: format!("gather-{}", n.id),
                referee: n.id.clone(),
                key: d.name.clone(),
                names: vec![d.name.clone()],
                scatter,
            }),
            PlanNodeKind::Call(c) => gathers.push(GatherNode {
                id: format!("gather-{}", n.id),
                referee: n.id.clone(),
                key: c.name().to_string(),
                names: call_binding_names(c, doc),
                scatter,
            }),
            PlanNodeKind::Section(inner) => {
                for g in &inner.gathers {
                    gathers.push(GatherNode {
                        id: format!("gather-{}", g.id),
                        referee: g.id.clone(),
                        key: g.key.clone(),
                        names: g.names.clone(),
                        scatter,
                    });
                }
            }
            PlanNodeKind::Outputs(_) => {}
        }
    }

    Ok(PlanNode {
        id,
        deps,
        kind: PlanNodeKind::Section(SectionPlan {
            scatter_variable,
            expr: expr.clone(),
            body: body_nodes,
            gathers,
        }),
    })
}

/// The (key → gather ID) pairs a section exposes to its siblings.
fn scope_exports(body: &[WorkflowElement], doc: &Document) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for element in body {
        match element {
            WorkflowElement::Decl(d) => out.push((
                d.name.clone(),
                format!("gather-{}", d.workflow_node_id()),
            )),
            WorkflowElement::Call(c) => out.push((
                c.name().to_string(),
                format!("gather-{}", c.workflow_node_id()),
            )),
            WorkflowElement::Scatter(s) => {
                for (key, inner_gather) in scope_exports(&s.body, doc) {
                    out.push((key, format!("gather-{}", inner_gather)));
                }
            }
            WorkflowElement::Conditional(c) => {
                for (key, inner_gather) in scope_exports(&c.body, doc) {
                    out.push((key, format!("gather-{}", inner_gather)));
                }
            }
        }
    }
    out
}
