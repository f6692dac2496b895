//! Static analysis passes over a parsed [`Document`]: struct typedef
//! resolution, task typechecking, workflow typechecking with call
//! resolution, and dependency cycle detection.
//!
//! Validation errors accumulate in a [`MultiErrorContext`] so a single pass
//! reports as many problems as it can find, sorted by source position.

use crate::env::Bindings;
use crate::error::{MultiErrorContext, SourcePosition, WdlError};
use crate::expr::typecheck::TypeContext;
use crate::expr::Expression;
use crate::stdlib::StdLib;
use crate::tree::{
    Call, Callee, CalleeKind, Declaration, Document, Task, Workflow, WorkflowElement,
};
use crate::types::{struct_type_id, Type};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};

impl Document {
    /// Run all static checks, decorating the AST in place. Imported
    /// documents must already be loaded and typechecked (the loader works in
    /// import topological order).
    pub fn typecheck(&mut self, check_quant: bool) -> Result<(), WdlError> {
        let mut errors = MultiErrorContext::new();

        self.check_top_level_names(&mut errors);
        self.resolve_struct_typedefs(&mut errors);

        let typedefs = self.struct_typedefs.clone();
        let stdlib = StdLib::base(&self.wdl_version);

        let mut tasks = std::mem::take(&mut self.tasks);
        for task in tasks.iter_mut() {
            typecheck_task(task, &typedefs, &stdlib, check_quant, &mut errors);
        }
        self.tasks = tasks;

        // the workflow borrows the document for call resolution, so detach
        // it during its check
        let mut workflow = self.workflow.take();
        if let Some(wf) = workflow.as_mut() {
            typecheck_workflow(wf, self, &typedefs, &stdlib, check_quant, &mut errors);
        }
        self.workflow = workflow;

        errors.maybe_raise()
    }

    fn check_top_level_names(&self, errors: &mut MultiErrorContext) {
        let mut seen: HashMap<&str, &SourcePosition> = HashMap::new();
        for task in &self.tasks {
            if seen.insert(&task.name, &task.pos).is_some() {
                errors.append(WdlError::MultipleDefinitions {
                    pos: task.pos.clone(),
                    message: format!("multiple tasks named {}", task.name),
                });
            }
        }
        if let Some(wf) = &self.workflow {
            if seen.contains_key(wf.name.as_str()) {
                errors.append(WdlError::MultipleDefinitions {
                    pos: wf.pos.clone(),
                    message: format!("workflow and task both named {}", wf.name),
                });
            }
        }
        let mut namespaces = HashSet::new();
        for import in &self.imports {
            if !namespaces.insert(import.namespace.clone()) {
                errors.append(WdlError::MultipleDefinitions {
                    pos: import.pos.clone(),
                    message: format!("multiple imports with namespace {}", import.namespace),
                });
            }
        }
    }

    /// Populate `struct_typedefs` from local declarations and imports
    /// (applying `alias` renames), then resolve member struct references and
    /// reject cyclic struct definitions.
    fn resolve_struct_typedefs(&mut self, errors: &mut MultiErrorContext) {
        let mut typedefs: IndexMap<String, IndexMap<String, Type>> = IndexMap::new();
        let mut positions: HashMap<String, SourcePosition> = HashMap::new();

        let mut add =
            |name: String, members: IndexMap<String, Type>, pos: &SourcePosition,
             typedefs: &mut IndexMap<String, IndexMap<String, Type>>,
             errors: &mut MultiErrorContext| {
                if let Some(existing) = typedefs.get(&name) {
                    if struct_type_id(existing) != struct_type_id(&members) {
                        errors.append(WdlError::MultipleDefinitions {
                            pos: pos.clone(),
                            message: format!(
                                "struct {} conflicts with another struct of the same name; \
                                 use import aliasing",
                                name
                            ),
                        });
                    }
                } else {
                    typedefs.insert(name, members);
                }
            };

        for import in &self.imports {
            if let Some(subdoc) = &import.doc {
                let renames: HashMap<&str, &str> = import
                    .aliases
                    .iter()
                    .map(|(a, b)| (a.as_str(), b.as_str()))
                    .collect();
                for (name, members) in &subdoc.struct_typedefs {
                    let local = renames.get(name.as_str()).map(|s| s.to_string())
                        .unwrap_or_else(|| name.clone());
                    positions.entry(local.clone()).or_insert_with(|| import.pos.clone());
                    add(local, members.clone(), &import.pos, &mut typedefs, errors);
                }
            }
        }
        for st in &self.structs {
            positions.insert(st.name.clone(), st.pos.clone());
            add(st.name.clone(), st.members.clone(), &st.pos, &mut typedefs, errors);
        }

        // struct-to-struct reference graph for cycle detection
        fn referenced_structs(ty: &Type, out: &mut Vec<String>) {
            match ty {
                Type::StructInstance { name, .. } => out.push(name.clone()),
                _ => {
                    for p in ty.parameters() {
                        referenced_structs(p, out);
                    }
                    if let Type::Array { item, .. } = ty {
                        referenced_structs(item, out);
                    }
                    if let Type::Map { key, value, .. } = ty {
                        referenced_structs(key, out);
                        referenced_structs(value, out);
                    }
                    if let Type::Pair { left, right, .. } = ty {
                        referenced_structs(left, out);
                        referenced_structs(right, out);
                    }
                }
            }
        }

        let mut order: Vec<String> = Vec::new();
        let mut state: HashMap<String, u8> = HashMap::new(); // 1 = visiting, 2 = done
        fn visit(
            name: &str,
            typedefs: &IndexMap<String, IndexMap<String, Type>>,
            state: &mut HashMap<String, u8>,
            order: &mut Vec<String>,
        ) -> bool {
            match state.get(name) {
                Some(1) => return false, // cycle
                Some(2) => return true,
                _ => {}
            }
            state.insert(name.to_string(), 1);
            if let Some(members) = typedefs.get(name) {
                let mut refs = Vec::new();
                for ty in members.values() {
                    referenced_structs(ty, &mut refs);
                }
                for r in refs {
                    if typedefs.contains_key(&r) && !visit(&r, typedefs, state, order) {
                        return false;
                    }
                }
            }
            state.insert(name.to_string(), 2);
            order.push(name.to_string());
            true
        }
        for name in typedefs.keys().cloned().collect::<Vec<_>>() {
            if !visit(&name, &typedefs, &mut state, &mut order) {
                let pos = positions
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(SourcePosition::unknown);
                errors.append(WdlError::CircularDependencies { pos, name });
                return;
            }
        }

        // resolve member types in dependency order
        let mut resolved: IndexMap<String, IndexMap<String, Type>> = IndexMap::new();
        for name in order {
            if let Some(members) = typedefs.get(&name) {
                let pos = positions
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(SourcePosition::unknown);
                let mut out = IndexMap::new();
                for (member, ty) in members {
                    match ty.resolve_structs(&resolved, &pos) {
                        Ok(t) => {
                            out.insert(member.clone(), t);
                        }
                        Err(e) => errors.append(e),
                    }
                }
                resolved.insert(name, out);
            }
        }
        // preserve original declaration order
        let mut final_map = IndexMap::new();
        for name in typedefs.keys() {
            if let Some(members) = resolved.get(name) {
                final_map.insert(name.clone(), members.clone());
            }
        }
        self.struct_typedefs = final_map;
    }
}

/// Topologically order declarations by their intra-set references (forward
/// references permitted, cycles rejected).
fn sort_decls<'a>(
    decls: Vec<&'a mut Declaration>,
    errors: &mut MultiErrorContext,
) -> Vec<&'a mut Declaration> {
    let names: HashMap<String, usize> = decls
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.clone(), i))
        .collect();

    let mut deps: Vec<HashSet<usize>> = Vec::with_capacity(decls.len());
    for d in &decls {
        let mut refs = Vec::new();
        if let Some(e) = &d.expr {
            e.referenced_names(&mut refs);
        }
        let mut set = HashSet::new();
        for r in refs {
            let first = r.split('.').next().unwrap_or(&r);
            if let Some(&i) = names.get(&r).or_else(|| names.get(first)) {
                set.insert(i);
            }
        }
        deps.push(set);
    }

    let mut incoming: Vec<usize> = deps.iter().map(|s| s.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); decls.len()];
    for (i, set) in deps.iter().enumerate() {
        for &j in set {
            dependents[j].push(i);
        }
    }
    let mut queue: VecDeque<usize> = (0..decls.len()).filter(|&i| incoming[i] == 0).collect();
    let mut order = Vec::with_capacity(decls.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dep in &dependents[i] {
            incoming[dep] -= 1;
            if incoming[dep] == 0 {
                queue.push_back(dep);
            }
        }
    }
    if order.len() != decls.len() {
        if let Some((i, _)) = incoming.iter().enumerate().find(|(_, &n)| n > 0) {
            errors.append(WdlError::CircularDependencies {
                pos: decls[i].pos.clone(),
                name: decls[i].name.clone(),
            });
        }
        // fall back to declaration order so checking can continue
        let mut seen: HashSet<usize> = order.iter().copied().collect();
        for i in 0..decls.len() {
            if seen.insert(i) {
                order.push(i);
            }
        }
    }

    let mut slots: Vec<Option<&'a mut Declaration>> = decls.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

fn typecheck_task(
    task: &mut Task,
    typedefs: &IndexMap<String, IndexMap<String, Type>>,
    stdlib: &StdLib,
    check_quant: bool,
    errors: &mut MultiErrorContext,
) {
    // name uniqueness across inputs, body decls, and outputs
    let mut seen: HashSet<&str> = HashSet::new();
    for d in task
        .inputs
        .iter()
        .flatten()
        .chain(&task.postinputs)
        .chain(&task.outputs)
    {
        if !seen.insert(&d.name) {
            errors.append(WdlError::MultipleDefinitions {
                pos: d.pos.clone(),
                message: format!("multiple declarations of {}", d.name),
            });
        }
    }

    // resolve declared types
    for d in task
        .inputs
        .iter_mut()
        .flatten()
        .chain(task.postinputs.iter_mut())
        .chain(task.outputs.iter_mut())
    {
        match d.decl_type.resolve_structs(typedefs, &d.pos) {
            Ok(t) => d.decl_type = t,
            Err(e) => errors.append(e),
        }
    }

    // inputs and postinputs form one dependency-ordered group
    let mut env: Bindings<Type> = Bindings::new();
    {
        let decls: Vec<&mut Declaration> = task
            .inputs
            .iter_mut()
            .flatten()
            .chain(task.postinputs.iter_mut())
            .collect();
        let sorted = sort_decls(decls, errors);

        // first surface every name so forward references resolve
        for d in &sorted {
            env = env.bind(d.name.clone(), d.decl_type.clone(), None);
        }
        for d in sorted {
            if let Some(expr) = d.expr.as_mut() {
                let ctx = TypeContext::new(&env, stdlib, typedefs).with_check_quant(check_quant);
                errors.try_with(|| expr.typecheck(&d.decl_type, &ctx));
            }
        }
    }

    // command placeholders must render as strings
    {
        let ctx = TypeContext::new(&env, stdlib, typedefs).with_check_quant(check_quant);
        errors.try_with(|| task.command.infer_type(&ctx));
    }

    // runtime expressions are arbitrary; normalization happens at run time
    for expr in task.runtime.values_mut() {
        let ctx = TypeContext::new(&env, stdlib, typedefs).with_check_quant(check_quant);
        errors.try_with(|| expr.infer_type(&ctx));
    }

    // outputs see inputs plus previously-declared outputs
    let mut out_env = env;
    for d in task.outputs.iter_mut() {
        if let Some(expr) = d.expr.as_mut() {
            let ctx = TypeContext::new(&out_env, stdlib, typedefs).with_check_quant(check_quant);
            errors.try_with(|| expr.typecheck(&d.decl_type, &ctx));
        } else {
            errors.append(WdlError::validation(
                d.pos.clone(),
                format!("task output {} requires an expression", d.name),
            ));
        }
        out_env = out_env.bind(d.name.clone(), d.decl_type.clone(), None);
    }
}

fn typecheck_workflow(
    wf: &mut Workflow,
    doc: &Document,
    typedefs: &IndexMap<String, IndexMap<String, Type>>,
    stdlib: &StdLib,
    check_quant: bool,
    errors: &mut MultiErrorContext,
) {
    // inputs: resolve types, order by dependencies, check defaults
    let mut input_env: Bindings<Type> = Bindings::new();
    if let Some(inputs) = wf.inputs.as_mut() {
        for d in inputs.iter_mut() {
            match d.decl_type.resolve_structs(typedefs, &d.pos) {
                Ok(t) => d.decl_type = t,
                Err(e) => errors.append(e),
            }
        }
        let sorted = sort_decls(inputs.iter_mut().collect(), errors);
        for d in &sorted {
            input_env = input_env.bind(d.name.clone(), d.decl_type.clone(), None);
        }
        for d in sorted {
            if let Some(expr) = d.expr.as_mut() {
                let ctx =
                    TypeContext::new(&input_env, stdlib, typedefs).with_check_quant(check_quant);
                errors.try_with(|| expr.typecheck(&d.decl_type, &ctx));
            }
        }
    }

    // pass 1: resolve decl types and call callees throughout the body,
    // checking name uniqueness workflow-wide
    let mut produced: HashMap<String, SourcePosition> = HashMap::new();
    for d in wf.input_decls() {
        produced.insert(d.name.clone(), d.pos.clone());
    }
    prepare_scope(&mut wf.body, doc, typedefs, &mut produced, errors);

    // pass 2: typecheck expressions with the full (forward-reference
    // friendly) environment in scope
    let body_env = {
        let exports = scope_bindings(&wf.body, doc);
        merge_envs(&input_env, &exports)
    };
    check_scope(&mut wf.body, &body_env, doc, typedefs, stdlib, check_quant, errors);

    // outputs: expand `call.*` shorthands, then check
    expand_output_shorthand(wf, doc, errors);
    let mut out_env = body_env;
    if let Some(outputs) = wf.outputs.as_mut() {
        let mut seen: HashSet<String> = HashSet::new();
        for d in outputs.iter_mut() {
            if !seen.insert(d.name.clone()) {
                errors.append(WdlError::MultipleDefinitions {
                    pos: d.pos.clone(),
                    message: format!("multiple workflow outputs named {}", d.name),
                });
            }
            match d.decl_type.resolve_structs(typedefs, &d.pos) {
                Ok(t) => d.decl_type = t,
                Err(e) => errors.append(e),
            }
            if let Some(expr) = d.expr.as_mut() {
                let ctx =
                    TypeContext::new(&out_env, stdlib, typedefs).with_check_quant(check_quant);
                if let Some(actual) = errors.try_with(|| expr.typecheck(&d.decl_type, &ctx)) {
                    // draft-2 expression-style outputs carry no declared
                    // type until inference supplies one
                    if matches!(d.decl_type, Type::Any { optional: false }) {
                        d.decl_type = actual;
                    }
                }
            } else {
                errors.append(WdlError::validation(
                    d.pos.clone(),
                    format!("workflow output {} requires an expression", d.name),
                ));
            }
            out_env = out_env.bind(d.name.clone(), d.decl_type.clone(), None);
        }
    }

    if !errors.has_errors() {
        if let Err(e) = detect_cycles(wf) {
            errors.append(e);
        }
    }
}

fn merge_envs(outer: &Bindings<Type>, inner: &Bindings<Type>) -> Bindings<Type> {
    crate::env::merge(&[inner, outer])
}

/// Pass 1: resolve declared types and call targets; enforce workflow-wide
/// name uniqueness.
fn prepare_scope(
    elements: &mut [WorkflowElement],
    doc: &Document,
    typedefs: &IndexMap<String, IndexMap<String, Type>>,
    produced: &mut HashMap<String, SourcePosition>,
    errors: &mut MultiErrorContext,
) {
    for element in elements.iter_mut() {
        match element {
            WorkflowElement::Decl(d) => {
                match d.decl_type.resolve_structs(typedefs, &d.pos) {
                    Ok(t) => d.decl_type = t,
                    Err(e) => errors.append(e),
                }
                if produced.insert(d.name.clone(), d.pos.clone()).is_some() {
                    errors.append(WdlError::MultipleDefinitions {
                        pos: d.pos.clone(),
                        message: format!("multiple definitions of {}", d.name),
                    });
                }
            }
            WorkflowElement::Call(c) => {
                if let Err(e) = resolve_call(c, doc) {
                    errors.append(e);
                }
                let name = c.name().to_string();
                if produced.insert(name.clone(), c.pos.clone()).is_some() {
                    errors.append(WdlError::MultipleDefinitions {
                        pos: c.pos.clone(),
                        message: format!("multiple calls named {}; use `as` to alias", name),
                    });
                }
            }
            WorkflowElement::Scatter(s) => {
                if produced.contains_key(&s.variable) {
                    errors.append(WdlError::MultipleDefinitions {
                        pos: s.pos.clone(),
                        message: format!("scatter variable {} shadows another name", s.variable),
                    });
                }
                prepare_scope(&mut s.body, doc, typedefs, produced, errors);
            }
            WorkflowElement::Conditional(c) => {
                prepare_scope(&mut c.body, doc, typedefs, produced, errors);
            }
        }
    }
}

/// Bindings a prepared scope exposes to its siblings (subsection bindings
/// lifted to `Array[T]` / `T?`).
fn scope_bindings(elements: &[WorkflowElement], doc: &Document) -> Bindings<Type> {
    let mut env = Bindings::new();
    for element in elements {
        match element {
            WorkflowElement::Decl(d) => {
                env = env.bind(d.name.clone(), d.decl_type.clone(), None);
            }
            WorkflowElement::Call(c) => {
                if let Some(callee) = &c.callee {
                    let outputs = doc.callee_outputs(callee);
                    if outputs.is_empty() {
                        env = env.with_empty_namespace(c.name());
                    } else {
                        for b in outputs.iter().collect::<Vec<_>>().into_iter().rev() {
                            env = env.bind(
                                format!("{}.{}", c.name(), b.name()),
                                b.value().clone(),
                                None,
                            );
                        }
                    }
                } else {
                    env = env.with_empty_namespace(c.name());
                }
            }
            WorkflowElement::Scatter(s) => {
                let inner = scope_bindings(&s.body, doc);
                env = merge_envs(&env, &lift(&inner, true));
            }
            WorkflowElement::Conditional(c) => {
                let inner = scope_bindings(&c.body, doc);
                env = merge_envs(&env, &lift(&inner, false));
            }
        }
    }
    env
}

/// Lift a section's inner bindings for the enclosing scope: arrays for
/// scatter, optionals for conditionals.
pub fn lift(inner: &Bindings<Type>, scatter: bool) -> Bindings<Type> {
    inner.map(|b| {
        let lifted = if scatter {
            Type::array(b.value().clone(), false, false)
        } else {
            b.value().clone().with_optional(true)
        };
        Some(crate::env::Binding::new(
            b.name().to_string(),
            lifted,
            b.info().cloned(),
        ))
    })
}

/// Pass 2: typecheck every expression with the full scope environment.
fn check_scope(
    elements: &mut [WorkflowElement],
    env: &Bindings<Type>,
    doc: &Document,
    typedefs: &IndexMap<String, IndexMap<String, Type>>,
    stdlib: &StdLib,
    check_quant: bool,
    errors: &mut MultiErrorContext,
) {
    let call_names: HashSet<String> = elements
        .iter()
        .filter_map(|e| match e {
            WorkflowElement::Call(c) => Some(c.name().to_string()),
            _ => None,
        })
        .collect();

    for element in elements.iter_mut() {
        match element {
            WorkflowElement::Decl(d) => {
                if let Some(expr) = d.expr.as_mut() {
                    let ctx = TypeContext::new(env, stdlib, typedefs).with_check_quant(check_quant);
                    errors.try_with(|| expr.typecheck(&d.decl_type, &ctx));
                }
            }
            WorkflowElement::Call(c) => {
                for after in &c.afters {
                    if !call_names.contains(after) {
                        errors.append(WdlError::NoSuchCall {
                            pos: c.pos.clone(),
                            name: after.clone(),
                        });
                    }
                }
                let callee_inputs = match &c.callee {
                    Some(callee) => {
                        if let Some(t) = doc.callee_task(callee) {
                            t.available_inputs()
                        } else if let Some(w) = doc.callee_workflow(callee) {
                            w.available_inputs()
                        } else {
                            Bindings::new()
                        }
                    }
                    None => Bindings::new(),
                };
                for (input_name, expr) in c.inputs.iter_mut() {
                    match callee_inputs.resolve(input_name) {
                        Some(expected) => {
                            let ctx = TypeContext::new(env, stdlib, typedefs)
                                .with_check_quant(check_quant);
                            errors.try_with(|| expr.typecheck(expected, &ctx));
                        }
                        None if c.callee.is_some() => {
                            errors.append(WdlError::NoSuchInput {
                                pos: expr.pos().clone(),
                                name: input_name.clone(),
                            });
                        }
                        None => {}
                    }
                }
            }
            WorkflowElement::Scatter(s) => {
                let ctx = TypeContext::new(env, stdlib, typedefs).with_check_quant(check_quant);
                let item_type = match errors.try_with(|| s.expr.infer_type(&ctx)) {
                    Some(Type::Array { item, .. }) => *item,
                    Some(Type::Any { .. }) => Type::any(),
                    Some(other) => {
                        errors.append(WdlError::static_mismatch(
                            s.expr.pos().clone(),
                            "Array".to_string(),
                            other.to_string(),
                            "scatter expression must be an array",
                        ));
                        Type::any()
                    }
                    None => Type::any(),
                };
                let inner_exports = scope_bindings(&s.body, doc);
                let inner_env = merge_envs(env, &inner_exports)
                    .bind(s.variable.clone(), item_type, None);
                check_scope(&mut s.body, &inner_env, doc, typedefs, stdlib, check_quant, errors);
            }
            WorkflowElement::Conditional(c) => {
                let ctx = TypeContext::new(env, stdlib, typedefs).with_check_quant(check_quant);
                if let Some(t) = errors.try_with(|| c.expr.infer_type(&ctx)) {
                    if !t.coerces(&Type::boolean(false), check_quant) {
                        errors.append(WdlError::static_mismatch(
                            c.expr.pos().clone(),
                            "Boolean".to_string(),
                            t.to_string(),
                            "conditional expression must be a Boolean",
                        ));
                    }
                }
                let inner_exports = scope_bindings(&c.body, doc);
                let inner_env = merge_envs(env, &inner_exports);
                check_scope(&mut c.body, &inner_env, doc, typedefs, stdlib, check_quant, errors);
            }
        }
    }
}

/// Resolve a call target to a task or workflow in this document or one of
/// its imports.
fn resolve_call(call: &mut Call, doc: &Document) -> Result<(), WdlError> {
    let target = call.callee_id.join(".");
    let callee = match call.callee_id.len() {
        1 => {
            let name = &call.callee_id[0];
            doc.tasks
                .iter()
                .position(|t| &t.name == name)
                .map(|idx| Callee {
                    import: None,
                    kind: CalleeKind::Task(idx),
                })
        }
        2 => {
            let ns = &call.callee_id[0];
            let name = &call.callee_id[1];
            doc.imports
                .iter()
                .position(|i| &i.namespace == ns)
                .and_then(|import_idx| {
                    let subdoc = doc.imports[import_idx].doc.as_deref()?;
                    if let Some(task_idx) = subdoc.tasks.iter().position(|t| &t.name == name) {
                        Some(Callee {
                            import: Some(import_idx),
                            kind: CalleeKind::Task(task_idx),
                        })
                    } else if subdoc.workflow.as_ref().map(|w| &w.name == name).unwrap_or(false) {
                        Some(Callee {
                            import: Some(import_idx),
                            kind: CalleeKind::Workflow,
                        })
                    } else {
                        None
                    }
                })
        }
        _ => None,
    };
    match callee {
        Some(c) => {
            // a sub-workflow must be callable: output section present and
            // all of its own calls' required inputs satisfied
            if let CalleeKind::Workflow = c.kind {
                let wf = doc.callee_workflow(&c).unwrap();
                let subdoc = doc.callee_document(&c).unwrap();
                if wf.outputs.is_none() || !workflow_calls_complete(wf, subdoc) {
                    return Err(WdlError::UncallableWorkflow {
                        pos: call.pos.clone(),
                        name: target,
                    });
                }
            }
            call.callee = Some(c);
            Ok(())
        }
        None => Err(WdlError::NoSuchTask {
            pos: call.pos.clone(),
            name: target,
        }),
    }
}

/// Whether every call in `wf` supplies all of its callee's required inputs.
fn workflow_calls_complete(wf: &Workflow, doc: &Document) -> bool {
    wf.calls().iter().all(|c| match &c.callee {
        Some(callee) => {
            let required: Vec<String> = if let Some(t) = doc.callee_task(callee) {
                t.required_inputs().iter().map(|d| d.name.clone()).collect()
            } else if let Some(w) = doc.callee_workflow(callee) {
                w.required_inputs().iter().map(|d| d.name.clone()).collect()
            } else {
                vec![]
            };
            required.iter().all(|r| c.inputs.contains_key(r))
        }
        None => false,
    })
}

/// Expand draft-2 style `call.*` output shorthands into one declaration per
/// callee output.
fn expand_output_shorthand(wf: &mut Workflow, doc: &Document, errors: &mut MultiErrorContext) {
    let calls: Vec<(String, Bindings<Type>)> = wf
        .calls()
        .iter()
        .filter_map(|c| {
            c.callee
                .as_ref()
                .map(|callee| (c.name().to_string(), doc.callee_outputs(callee)))
        })
        .collect();

    if let Some(outputs) = wf.outputs.as_mut() {
        let mut expanded: Vec<Declaration> = Vec::new();
        for d in outputs.drain(..) {
            if let Some(call_name) = d.name.strip_suffix(".*") {
                match calls.iter().find(|(n, _)| n == call_name) {
                    Some((_, outs)) => {
                        for b in outs.iter().collect::<Vec<_>>().into_iter().rev() {
                            let name = format!("{}.{}", call_name, b.name());
                            expanded.push(Declaration::new(
                                d.pos.clone(),
                                b.value().clone(),
                                name.clone(),
                                Some(Expression::ident(d.pos.clone(), name)),
                            ));
                        }
                    }
                    None => errors.append(WdlError::NoSuchCall {
                        pos: d.pos.clone(),
                        name: call_name.to_string(),
                    }),
                }
            } else {
                expanded.push(d);
            }
        }
        *outputs = expanded;
    }
}

/// Verify the workflow's dependency graph is acyclic.
fn detect_cycles(wf: &Workflow) -> Result<(), WdlError> {
    struct Node {
        id: String,
        pos: SourcePosition,
        display_name: String,
        deps: Vec<String>,
    }

    fn collect(
        elements: &[WorkflowElement],
        section_stack: &[(String, Vec<String>)],
        nodes: &mut Vec<Node>,
        producers: &mut HashMap<String, String>,
    ) {
        for e in elements {
            match e {
                WorkflowElement::Decl(d) => {
                    let mut deps = Vec::new();
                    if let Some(expr) = &d.expr {
                        expr.referenced_names(&mut deps);
                    }
                    for (sid, sdeps) in section_stack {
                        deps.push(sid.clone());
                        deps.extend(sdeps.iter().cloned());
                    }
                    producers.insert(d.name.clone(), d.workflow_node_id());
                    nodes.push(Node {
                        id: d.workflow_node_id(),
                        pos: d.pos.clone(),
                        display_name: d.name.clone(),
                        deps,
                    });
                }
                WorkflowElement::Call(c) => {
                    let mut deps = Vec::new();
                    for expr in c.inputs.values() {
                        expr.referenced_names(&mut deps);
                    }
                    deps.extend(c.afters.iter().cloned());
                    for (sid, sdeps) in section_stack {
                        deps.push(sid.clone());
                        deps.extend(sdeps.iter().cloned());
                    }
                    producers.insert(c.name().to_string(), c.workflow_node_id());
                    nodes.push(Node {
                        id: c.workflow_node_id(),
                        pos: c.pos.clone(),
                        display_name: c.name().to_string(),
                        deps,
                    });
                }
                WorkflowElement::Scatter(s) => {
                    let mut sdeps = Vec::new();
                    s.expr.referenced_names(&mut sdeps);
                    let id = s.workflow_node_id();
                    producers.insert(s.variable.clone(), id.clone());
                    nodes.push(Node {
                        id: id.clone(),
                        pos: s.pos.clone(),
                        display_name: s.variable.clone(),
                        deps: {
                            let mut d = sdeps.clone();
                            for (sid, outer) in section_stack {
                                d.push(sid.clone());
                                d.extend(outer.iter().cloned());
                            }
                            d
                        },
                    });
                    let mut stack = section_stack.to_vec();
                    stack.push((id, sdeps));
                    collect(&s.body, &stack, nodes, producers);
                }
                WorkflowElement::Conditional(c) => {
                    let mut sdeps = Vec::new();
                    c.expr.referenced_names(&mut sdeps);
                    let id = c.workflow_node_id();
                    nodes.push(Node {
                        id: id.clone(),
                        pos: c.pos.clone(),
                        display_name: id.clone(),
                        deps: {
                            let mut d = sdeps.clone();
                            for (sid, outer) in section_stack {
                                d.push(sid.clone());
                                d.extend(outer.iter().cloned());
                            }
                            d
                        },
                    });
                    let mut stack = section_stack.to_vec();
                    stack.push((id, sdeps));
                    collect(&c.body, &stack, nodes, producers);
                }
            }
        }
    }

    let mut nodes = Vec::new();
    let mut producers: HashMap<String, String> = HashMap::new();
    for d in wf.input_decls() {
        producers.insert(d.name.clone(), d.workflow_node_id());
    }
    collect(&wf.body, &[], &mut nodes, &mut producers);

    // resolve dependency names to node ids
    let index: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();
    let resolve = |name: &str| -> Option<usize> {
        if let Some(i) = index.get(name) {
            return Some(*i);
        }
        let producer = producers
            .get(name)
            .or_else(|| producers.get(name.split('.').next().unwrap_or(name)))?;
        index.get(producer).copied()
    };

    let mut incoming = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, n) in nodes.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &n.deps {
            if let Some(j) = resolve(dep) {
                if j != i && seen.insert(j) {
                    incoming[i] += 1;
                    dependents[j].push(i);
                }
            }
        }
    }
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| incoming[i] == 0).collect();
    let mut done = 0;
    while let Some(i) = queue.pop_front() {
        done += 1;
        for &j in &dependents[i] {
            incoming[j] -= 1;
            if incoming[j] == 0 {
                queue.push_back(j);
            }
        }
    }
    if done != nodes.len() {
        let culprit = nodes
            .iter()
            .enumerate()
            .find(|(i, _)| incoming[*i] > 0)
            .map(|(_, n)| n)
            .unwrap();
        return Err(WdlError::CircularDependencies {
            pos: culprit.pos.clone(),
            name: culprit.display_name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;
    use crate::tree::{Conditional, Scatter};

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn pos_at(line: u32) -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), line, 1, line, 2)
    }

    fn empty_doc() -> Document {
        Document {
            pos: pos(),
            uri: "t.wdl".into(),
            abspath: "t.wdl".into(),
            wdl_version: "1.0".into(),
            imports: vec![],
            structs: vec![],
            struct_typedefs: IndexMap::new(),
            tasks: vec![],
            workflow: None,
        }
    }

    fn hello_task() -> Task {
        Task {
            pos: pos(),
            name: "hello".into(),
            inputs: Some(vec![Declaration::new(
                pos(),
                Type::string(false),
                "who".into(),
                None,
            )]),
            postinputs: vec![],
            command: Expression::command(
                pos(),
                vec![crate::expr::StringPart::Text("echo hi".into())],
            ),
            outputs: vec![Declaration::new(
                pos(),
                Type::string(false),
                "out".into(),
                Some(Expression::string_literal(pos(), "done")),
            )],
            runtime: IndexMap::new(),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        }
    }

    #[test]
    fn task_with_forward_reference_typechecks() {
        let mut doc = empty_doc();
        let mut task = hello_task();
        // y declared after its use in x's default
        task.postinputs = vec![
            Declaration::new(
                pos_at(2),
                Type::int(false),
                "x".into(),
                Some(Expression::ident(pos_at(2), "y")),
            ),
            Declaration::new(
                pos_at(3),
                Type::int(false),
                "y".into(),
                Some(Expression::int(pos_at(3), 4)),
            ),
        ];
        doc.tasks.push(task);
        doc.typecheck(true).unwrap();
    }

    #[test]
    fn circular_task_decls_rejected() {
        let mut doc = empty_doc();
        let mut task = hello_task();
        task.inputs = Some(vec![Declaration::new(
            pos_at(2),
            Type::int(false),
            "x".into(),
            Some(Expression::ident(pos_at(2), "y")),
        )]);
        task.postinputs = vec![Declaration::new(
            pos_at(3),
            Type::int(false),
            "y".into(),
            Some(Expression::ident(pos_at(3), "x")),
        )];
        doc.tasks.push(task);
        match doc.typecheck(true) {
            Err(WdlError::CircularDependencies { .. }) => {}
            other => panic!("expected CircularDependencies, got {:?}", other),
        }
    }

    #[test]
    fn workflow_scatter_lifts_to_array() {
        let mut doc = empty_doc();
        let wf = Workflow {
            pos: pos(),
            name: "w".into(),
            inputs: Some(vec![Declaration::new(
                pos(),
                Type::array(Type::int(false), false, false),
                "xs".into(),
                None,
            )]),
            body: vec![WorkflowElement::Scatter(Scatter {
                pos: pos_at(3),
                variable: "x".into(),
                expr: Expression::ident(pos_at(3), "xs"),
                body: vec![WorkflowElement::Decl(Declaration::new(
                    pos_at(4),
                    Type::int(false),
                    "sq".into(),
                    Some(Expression::binary(
                        pos_at(4),
                        BinaryOp::Mul,
                        Expression::ident(pos_at(4), "x"),
                        Expression::ident(pos_at(4), "x"),
                    )),
                ))],
            })],
            outputs: Some(vec![Declaration::new(
                pos_at(6),
                Type::array(Type::int(false), false, false),
                "sqs".into(),
                Some(Expression::ident(pos_at(6), "sq")),
            )]),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        };
        doc.workflow = Some(wf);
        doc.typecheck(true).unwrap();
    }

    #[test]
    fn conditional_lifts_to_optional() {
        let mut doc = empty_doc();
        let wf = Workflow {
            pos: pos(),
            name: "w".into(),
            inputs: Some(vec![
                Declaration::new(pos(), Type::boolean(false), "b".into(), None),
                Declaration::new(pos(), Type::int(false), "x".into(), None),
            ]),
            body: vec![WorkflowElement::Conditional(Conditional {
                pos: pos_at(3),
                expr: Expression::ident(pos_at(3), "b"),
                body: vec![WorkflowElement::Decl(Declaration::new(
                    pos_at(4),
                    Type::int(false),
                    "y".into(),
                    Some(Expression::binary(
                        pos_at(4),
                        BinaryOp::Add,
                        Expression::ident(pos_at(4), "x"),
                        Expression::int(pos_at(4), 1),
                    )),
                ))],
            })],
            outputs: Some(vec![Declaration::new(
                pos_at(6),
                Type::int(true),
                "y_out".into(),
                Some(Expression::ident(pos_at(6), "y")),
            )]),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        };
        doc.workflow = Some(wf);
        doc.typecheck(true).unwrap();
    }

    #[test]
    fn call_resolution_and_outputs() {
        let mut doc = empty_doc();
        doc.tasks.push(hello_task());
        let wf = Workflow {
            pos: pos(),
            name: "w".into(),
            inputs: Some(vec![Declaration::new(
                pos(),
                Type::string(false),
                "name".into(),
                None,
            )]),
            body: vec![WorkflowElement::Call(Call::new(
                pos_at(3),
                vec!["hello".into()],
                None,
                vec![],
                {
                    let mut m = IndexMap::new();
                    m.insert(
                        "who".to_string(),
                        Expression::ident(pos_at(3), "name"),
                    );
                    m
                },
            ))],
            outputs: Some(vec![Declaration::new(
                pos_at(5),
                Type::string(false),
                "result".into(),
                Some(Expression::ident(pos_at(5), "hello.out")),
            )]),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        };
        doc.workflow = Some(wf);
        doc.typecheck(true).unwrap();
        let wf = doc.workflow.as_ref().unwrap();
        match &wf.body[0] {
            WorkflowElement::Call(c) => assert!(c.callee.is_some()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn unknown_call_target_rejected() {
        let mut doc = empty_doc();
        let wf = Workflow {
            pos: pos(),
            name: "w".into(),
            inputs: None,
            body: vec![WorkflowElement::Call(Call::new(
                pos_at(2),
                vec!["nope".into()],
                None,
                vec![],
                IndexMap::new(),
            ))],
            outputs: Some(vec![]),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        };
        doc.workflow = Some(wf);
        match doc.typecheck(true) {
            Err(WdlError::NoSuchTask { name, .. }) => assert_eq!(name, "nope"),
            other => panic!("expected NoSuchTask, got {:?}", other),
        }
    }

    #[test]
    fn bad_call_input_name_rejected() {
        let mut doc = empty_doc();
        doc.tasks.push(hello_task());
        let wf = Workflow {
            pos: pos(),
            name: "w".into(),
            inputs: None,
            body: vec![WorkflowElement::Call(Call::new(
                pos_at(2),
                vec!["hello".into()],
                None,
                vec![],
                {
                    let mut m = IndexMap::new();
                    m.insert(
                        "whom".to_string(),
                        Expression::string_literal(pos_at(2), "x"),
                    );
                    m
                },
            ))],
            outputs: Some(vec![]),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        };
        doc.workflow = Some(wf);
        match doc.typecheck(true) {
            Err(WdlError::NoSuchInput { name, .. }) => assert_eq!(name, "whom"),
            other => panic!("expected NoSuchInput, got {:?}", other),
        }
    }

    #[test]
    fn workflow_cycle_detected() {
        let mut doc = empty_doc();
        let wf = Workflow {
            pos: pos(),
            name: "w".into(),
            inputs: None,
            body: vec![
                WorkflowElement::Decl(Declaration::new(
                    pos_at(2),
                    Type::int(false),
                    "a".into(),
                    Some(Expression::ident(pos_at(2), "b")),
                )),
                WorkflowElement::Decl(Declaration::new(
                    pos_at(3),
                    Type::int(false),
                    "b".into(),
                    Some(Expression::ident(pos_at(3), "a")),
                )),
            ],
            outputs: Some(vec![]),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        };
        doc.workflow = Some(wf);
        match doc.typecheck(true) {
            Err(WdlError::CircularDependencies { .. }) => {}
            other => panic!("expected CircularDependencies, got {:?}", other),
        }
    }

    #[test]
    fn struct_cycle_detected() {
        let mut doc = empty_doc();
        let mut m1 = IndexMap::new();
        m1.insert("b".to_string(), Type::struct_instance("B".into(), false));
        let mut m2 = IndexMap::new();
        m2.insert("a".to_string(), Type::struct_instance("A".into(), false));
        doc.structs = vec![
            crate::tree::StructTypeDef {
                pos: pos_at(1),
                name: "A".into(),
                members: m1,
                imported: false,
            },
            crate::tree::StructTypeDef {
                pos: pos_at(2),
                name: "B".into(),
                members: m2,
                imported: false,
            },
        ];
        match doc.typecheck(true) {
            Err(WdlError::CircularDependencies { .. }) => {}
            other => panic!("expected CircularDependencies, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut doc = empty_doc();
        doc.tasks.push(hello_task());
        doc.tasks.push(hello_task());
        match doc.typecheck(true) {
            Err(WdlError::MultipleDefinitions { .. }) => {}
            other => panic!("expected MultipleDefinitions, got {:?}", other),
        }
    }
}
