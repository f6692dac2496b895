//! Typed syntax tree for WDL documents: declarations, tasks, workflows with
//! their scatter/conditional sections and calls, imports, and struct
//! typedefs.
//!
//! Nodes are built by the parser, decorated by the typechecker (resolved
//! struct member maps, inferred expression types, resolved call callees), and
//! immutable afterwards. Cross-references that would be cyclic, notably a
//! call's resolved callee, are stored as indices into the owning
//! [`Document`] rather than as direct links.

pub mod typecheck;

use crate::env::Bindings;
use crate::error::{HasSourcePosition, SourcePosition};
use crate::expr::Expression;
use crate::types::Type;
use indexmap::IndexMap;
use std::fmt;

/// A value declaration (`Type name = expr`), in a task, workflow, or
/// input/output section.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub pos: SourcePosition,
    pub decl_type: Type,
    pub name: String,
    pub expr: Option<Expression>,
}

impl Declaration {
    pub fn new(pos: SourcePosition, decl_type: Type, name: String, expr: Option<Expression>) -> Self {
        Self {
            pos,
            decl_type,
            name,
            expr,
        }
    }

    /// Plan/graph node ID for this declaration.
    pub fn workflow_node_id(&self) -> String {
        format!("decl-{}", self.name)
    }
}

impl HasSourcePosition for Declaration {
    fn source_position(&self) -> &SourcePosition {
        &self.pos
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr {
            Some(e) => write!(f, "{} {} = {}", self.decl_type, self.name, e),
            None => write!(f, "{} {}", self.decl_type, self.name),
        }
    }
}

/// Identifies a call's resolved target within the document (possibly through
/// one of its imports).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callee {
    /// Index into [`Document::imports`], or `None` for the local document.
    pub import: Option<usize>,
    pub kind: CalleeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalleeKind {
    /// Index into the owning document's `tasks`.
    Task(usize),
    Workflow,
}

/// A call to a task or sub-workflow.
#[derive(Debug, Clone)]
pub struct Call {
    pub pos: SourcePosition,
    /// Dot-separated target as written (`mytask` or `lib.mytask`).
    pub callee_id: Vec<String>,
    pub alias: Option<String>,
    /// `after` clause: names of calls in the same section that must finish
    /// first.
    pub afters: Vec<String>,
    pub inputs: IndexMap<String, Expression>,
    /// Resolved by the typechecker.
    pub callee: Option<Callee>,
}

impl Call {
    pub fn new(
        pos: SourcePosition,
        callee_id: Vec<String>,
        alias: Option<String>,
        afters: Vec<String>,
        inputs: IndexMap<String, Expression>,
    ) -> Self {
        Self {
            pos,
            callee_id,
            alias,
            afters,
            inputs,
            callee: None,
        }
    }

    /// The name this call binds in its workflow (alias, else the last
    /// component of the target).
    pub fn name(&self) -> &str {
        match &self.alias {
            Some(a) => a,
            None => self.callee_id.last().map(|s| s.as_str()).unwrap_or(""),
        }
    }

    pub fn workflow_node_id(&self) -> String {
        format!("call-{}", self.name())
    }
}

impl HasSourcePosition for Call {
    fn source_position(&self) -> &SourcePosition {
        &self.pos
    }
}

/// One element of a workflow (or section) body.
#[derive(Debug, Clone)]
pub enum WorkflowElement {
    Decl(Declaration),
    Call(Call),
    Scatter(Scatter),
    Conditional(Conditional),
}

impl WorkflowElement {
    pub fn pos(&self) -> &SourcePosition {
        match self {
            WorkflowElement::Decl(d) => &d.pos,
            WorkflowElement::Call(c) => &c.pos,
            WorkflowElement::Scatter(s) => &s.pos,
            WorkflowElement::Conditional(c) => &c.pos,
        }
    }
}

/// `scatter (x in expr) { ... }`
#[derive(Debug, Clone)]
pub struct Scatter {
    pub pos: SourcePosition,
    pub variable: String,
    pub expr: Expression,
    pub body: Vec<WorkflowElement>,
}

impl Scatter {
    /// Section node ID, derived from the source position so it is unique and
    /// stable within the workflow.
    pub fn workflow_node_id(&self) -> String {
        format!("scatter-L{}C{}", self.pos.line, self.pos.column)
    }
}

/// `if (expr) { ... }`
#[derive(Debug, Clone)]
pub struct Conditional {
    pub pos: SourcePosition,
    pub expr: Expression,
    pub body: Vec<WorkflowElement>,
}

impl Conditional {
    pub fn workflow_node_id(&self) -> String {
        format!("if-L{}C{}", self.pos.line, self.pos.column)
    }
}

/// JSON-like metadata literal appearing in `meta` and `parameter_meta`
/// sections. Deliberately distinct from the runtime [`crate::value::Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<MetaValue>),
    Object(IndexMap<String, MetaValue>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A task: typed inputs, a command template, runtime requirements, and typed
/// outputs.
#[derive(Debug, Clone)]
pub struct Task {
    pub pos: SourcePosition,
    pub name: String,
    /// Declarations inside `input {}`; `None` when the section is absent
    /// (draft-2 style, where all top-level decls are inputs).
    pub inputs: Option<Vec<Declaration>>,
    /// Declarations after the input section (private to the task body).
    pub postinputs: Vec<Declaration>,
    /// Command template (`Expression::Str` with `command = true`).
    pub command: Expression,
    pub outputs: Vec<Declaration>,
    pub runtime: IndexMap<String, Expression>,
    pub parameter_meta: IndexMap<String, MetaValue>,
    pub meta: IndexMap<String, MetaValue>,
    /// The document's effective WDL version, recorded for evaluation.
    pub wdl_version: String,
}

impl Task {
    /// Declarations that may be supplied as call/run inputs.
    ///
    /// With an explicit `input {}` section, exactly those; otherwise every
    /// top-level declaration without an expression.
    pub fn input_decls(&self) -> Vec<&Declaration> {
        match &self.inputs {
            Some(decls) => decls.iter().collect(),
            None => self.postinputs.iter().filter(|d| d.expr.is_none()).collect(),
        }
    }

    /// Input declarations as a type environment.
    pub fn available_inputs(&self) -> Bindings<Type> {
        let mut env = Bindings::new();
        for d in self.input_decls().into_iter().rev() {
            env = env.bind(d.name.clone(), d.decl_type.clone(), None);
        }
        env
    }

    /// Inputs that must be supplied: no default expression and non-optional.
    pub fn required_inputs(&self) -> Vec<&Declaration> {
        self.input_decls()
            .into_iter()
            .filter(|d| d.expr.is_none() && !d.decl_type.is_optional())
            .collect()
    }

    /// Output declarations as a type environment.
    pub fn effective_outputs(&self) -> Bindings<Type> {
        let mut env = Bindings::new();
        for d in self.outputs.iter().rev() {
            env = env.bind(d.name.clone(), d.decl_type.clone(), None);
        }
        env
    }
}

impl HasSourcePosition for Task {
    fn source_position(&self) -> &SourcePosition {
        &self.pos
    }
}

/// A workflow: inputs, a body of declarations/calls/sections, and outputs.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub pos: SourcePosition,
    pub name: String,
    pub inputs: Option<Vec<Declaration>>,
    pub body: Vec<WorkflowElement>,
    /// `None` when the output section is absent (all call outputs exposed).
    pub outputs: Option<Vec<Declaration>>,
    pub parameter_meta: IndexMap<String, MetaValue>,
    pub meta: IndexMap<String, MetaValue>,
    pub wdl_version: String,
}

impl Workflow {
    pub fn input_decls(&self) -> Vec<&Declaration> {
        match &self.inputs {
            Some(decls) => decls.iter().collect(),
            None => vec![],
        }
    }

    pub fn available_inputs(&self) -> Bindings<Type> {
        let mut env = Bindings::new();
        for d in self.input_decls().into_iter().rev() {
            env = env.bind(d.name.clone(), d.decl_type.clone(), None);
        }
        env
    }

    pub fn required_inputs(&self) -> Vec<&Declaration> {
        self.input_decls()
            .into_iter()
            .filter(|d| d.expr.is_none() && !d.decl_type.is_optional())
            .collect()
    }

    /// Output declarations as a type environment (available only after
    /// typechecking, which expands any `call.*` shorthands).
    pub fn effective_outputs(&self) -> Bindings<Type> {
        let mut env = Bindings::new();
        if let Some(outputs) = &self.outputs {
            for d in outputs.iter().rev() {
                env = env.bind(d.name.clone(), d.decl_type.clone(), None);
            }
        }
        env
    }

    /// All calls in the body, recursively.
    pub fn calls(&self) -> Vec<&Call> {
        fn walk<'a>(elements: &'a [WorkflowElement], out: &mut Vec<&'a Call>) {
            for e in elements {
                match e {
                    WorkflowElement::Call(c) => out.push(c),
                    WorkflowElement::Scatter(s) => walk(&s.body, out),
                    WorkflowElement::Conditional(c) => walk(&c.body, out),
                    WorkflowElement::Decl(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.body, &mut out);
        out
    }
}

impl HasSourcePosition for Workflow {
    fn source_position(&self) -> &SourcePosition {
        &self.pos
    }
}

/// `import "uri" as ns alias A as B ...`
#[derive(Debug, Clone)]
pub struct Import {
    pub pos: SourcePosition,
    pub uri: String,
    /// Explicit or derived namespace (URI basename minus `.wdl`).
    pub namespace: String,
    /// `alias X as Y` struct renames.
    pub aliases: Vec<(String, String)>,
    /// The loaded sub-document (filled in by the loader).
    pub doc: Option<Box<Document>>,
}

/// `struct S { ... }` typedef as parsed.
#[derive(Debug, Clone)]
pub struct StructTypeDef {
    pub pos: SourcePosition,
    pub name: String,
    pub members: IndexMap<String, Type>,
    /// True when brought in via an import alias rather than declared here.
    pub imported: bool,
}

/// A parsed WDL source file.
#[derive(Debug, Clone)]
pub struct Document {
    pub pos: SourcePosition,
    /// URI/path the document was loaded as.
    pub uri: String,
    pub abspath: String,
    /// Effective version: `draft-2`, `1.0`, `1.1`, `1.2`, `development`.
    pub wdl_version: String,
    pub imports: Vec<Import>,
    pub structs: Vec<StructTypeDef>,
    /// Name → member types, for every struct visible in this document
    /// (local and imported). Filled by the typechecker.
    pub struct_typedefs: IndexMap<String, IndexMap<String, Type>>,
    pub tasks: Vec<Task>,
    pub workflow: Option<Workflow>,
}

impl Document {
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Dereference a resolved [`Callee`] to the task it names, if a task.
    pub fn callee_task(&self, callee: &Callee) -> Option<&Task> {
        let doc = match callee.import {
            Some(i) => self.imports.get(i)?.doc.as_deref()?,
            None => self,
        };
        match callee.kind {
            CalleeKind::Task(idx) => doc.tasks.get(idx),
            CalleeKind::Workflow => None,
        }
    }

    /// Dereference a resolved [`Callee`] to the workflow it names, if a
    /// workflow.
    pub fn callee_workflow(&self, callee: &Callee) -> Option<&Workflow> {
        let doc = match callee.import {
            Some(i) => self.imports.get(i)?.doc.as_deref()?,
            None => self,
        };
        match callee.kind {
            CalleeKind::Workflow => doc.workflow.as_ref(),
            CalleeKind::Task(_) => None,
        }
    }

    /// The document owning the callee (for sub-workflow execution).
    pub fn callee_document(&self, callee: &Callee) -> Option<&Document> {
        match callee.import {
            Some(i) => self.imports.get(i)?.doc.as_deref(),
            None => Some(self),
        }
    }

    /// The type environment a call of `callee` produces (its outputs).
    pub fn callee_outputs(&self, callee: &Callee) -> Bindings<Type> {
        if let Some(task) = self.callee_task(callee) {
            task.effective_outputs()
        } else if let Some(wf) = self.callee_workflow(callee) {
            wf.effective_outputs()
        } else {
            Bindings::new()
        }
    }
}

impl HasSourcePosition for Document {
    fn source_position(&self) -> &SourcePosition {
        &self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn simple_task() -> Task {
        Task {
            pos: pos(),
            name: "t".to_string(),
            inputs: Some(vec![
                Declaration::new(pos(), Type::string(false), "who".to_string(), None),
                Declaration::new(
                    pos(),
                    Type::int(false),
                    "n".to_string(),
                    Some(Expression::int(pos(), 1)),
                ),
                Declaration::new(pos(), Type::int(true), "opt".to_string(), None),
            ]),
            postinputs: vec![],
            command: Expression::command(pos(), vec![]),
            outputs: vec![Declaration::new(
                pos(),
                Type::string(false),
                "out".to_string(),
                None,
            )],
            runtime: IndexMap::new(),
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".to_string(),
        }
    }

    #[test]
    fn task_inputs() {
        let t = simple_task();
        assert_eq!(t.input_decls().len(), 3);
        let required: Vec<&str> = t.required_inputs().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(required, vec!["who"]);
        assert!(t.available_inputs().has_binding("n"));
        assert!(t.effective_outputs().has_binding("out"));
    }

    #[test]
    fn call_naming() {
        let c = Call::new(
            pos(),
            vec!["lib".to_string(), "align".to_string()],
            None,
            vec![],
            IndexMap::new(),
        );
        assert_eq!(c.name(), "align");
        assert_eq!(c.workflow_node_id(), "call-align");

        let aliased = Call::new(
            pos(),
            vec!["align".to_string()],
            Some("a2".to_string()),
            vec![],
            IndexMap::new(),
        );
        assert_eq!(aliased.name(), "a2");
    }

    #[test]
    fn section_ids_are_positional() {
        let s = Scatter {
            pos: SourcePosition::new("w.wdl".into(), "w.wdl".into(), 5, 3, 7, 1),
            variable: "x".to_string(),
            expr: Expression::ident(pos(), "xs"),
            body: vec![],
        };
        assert_eq!(s.workflow_node_id(), "scatter-L5C3");
    }

    #[test]
    fn workflow_calls_recurse() {
        let wf = Workflow {
            pos: pos(),
            name: "w".to_string(),
            inputs: None,
            body: vec![
                WorkflowElement::Call(Call::new(
                    pos(),
                    vec!["t1".to_string()],
                    None,
                    vec![],
                    IndexMap::new(),
                )),
                WorkflowElement::Scatter(Scatter {
                    pos: pos(),
                    variable: "x".to_string(),
                    expr: Expression::ident(pos(), "xs"),
                    body: vec![WorkflowElement::Call(Call::new(
                        pos(),
                        vec!["t2".to_string()],
                        None,
                        vec![],
                        IndexMap::new(),
                    ))],
                }),
            ],
            outputs: None,
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".to_string(),
        };
        let names: Vec<&str> = wf.calls().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["t1", "t2"]);
    }
}
