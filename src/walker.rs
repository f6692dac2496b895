//! Generic traversal protocol over the document tree.
//!
//! A [`Walker`] visits each node kind through an overridable method whose
//! default implementation recurses into the node's children. Overrides call
//! the provided `walk_*` helper at whichever point suits pre- or post-order
//! processing, or skip it to prune the subtree.

use crate::error::WdlError;
use crate::expr::{Expression, StringPart};
use crate::tree::{Conditional, Declaration, Document, Scatter, Task, Workflow, WorkflowElement};

#[allow(unused_variables)]
pub trait Walker {
    fn document(&mut self, doc: &Document) -> Result<(), WdlError> {
        walk_document(self, doc)
    }

    fn task(&mut self, task: &Task) -> Result<(), WdlError> {
        walk_task(self, task)
    }

    fn workflow(&mut self, wf: &Workflow) -> Result<(), WdlError> {
        walk_workflow(self, wf)
    }

    fn decl(&mut self, decl: &Declaration) -> Result<(), WdlError> {
        walk_decl(self, decl)
    }

    fn call(&mut self, call: &crate::tree::Call) -> Result<(), WdlError> {
        walk_call(self, call)
    }

    fn scatter(&mut self, scatter: &Scatter) -> Result<(), WdlError> {
        walk_scatter(self, scatter)
    }

    fn conditional(&mut self, conditional: &Conditional) -> Result<(), WdlError> {
        walk_conditional(self, conditional)
    }

    fn expr(&mut self, expr: &Expression) -> Result<(), WdlError> {
        walk_expr(self, expr)
    }
}

pub fn walk_document<W: Walker + ?Sized>(w: &mut W, doc: &Document) -> Result<(), WdlError> {
    for import in &doc.imports {
        if let Some(subdoc) = &import.doc {
            w.document(subdoc)?;
        }
    }
    for task in &doc.tasks {
        w.task(task)?;
    }
    if let Some(wf) = &doc.workflow {
        w.workflow(wf)?;
    }
    Ok(())
}

pub fn walk_task<W: Walker + ?Sized>(w: &mut W, task: &Task) -> Result<(), WdlError> {
    for d in task.inputs.iter().flatten().chain(&task.postinputs) {
        w.decl(d)?;
    }
    w.expr(&task.command)?;
    for e in task.runtime.values() {
        w.expr(e)?;
    }
    for d in &task.outputs {
        w.decl(d)?;
    }
    Ok(())
}

pub fn walk_workflow<W: Walker + ?Sized>(w: &mut W, wf: &Workflow) -> Result<(), WdlError> {
    for d in wf.inputs.iter().flatten() {
        w.decl(d)?;
    }
    for element in &wf.body {
        walk_element(w, element)?;
    }
    for d in wf.outputs.iter().flatten() {
        w.decl(d)?;
    }
    Ok(())
}

pub fn walk_element<W: Walker + ?Sized>(
    w: &mut W,
    element: &WorkflowElement,
) -> Result<(), WdlError> {
    match element {
        WorkflowElement::Decl(d) => w.decl(d),
        WorkflowElement::Call(c) => w.call(c),
        WorkflowElement::Scatter(s) => w.scatter(s),
        WorkflowElement::Conditional(c) => w.conditional(c),
    }
}

pub fn walk_decl<W: Walker + ?Sized>(w: &mut W, decl: &Declaration) -> Result<(), WdlError> {
    if let Some(e) = &decl.expr {
        w.expr(e)?;
    }
    Ok(())
}

pub fn walk_call<W: Walker + ?Sized>(w: &mut W, call: &crate::tree::Call) -> Result<(), WdlError> {
    for e in call.inputs.values() {
        w.expr(e)?;
    }
    Ok(())
}

pub fn walk_scatter<W: Walker + ?Sized>(w: &mut W, scatter: &Scatter) -> Result<(), WdlError> {
    w.expr(&scatter.expr)?;
    for element in &scatter.body {
        walk_element(w, element)?;
    }
    Ok(())
}

pub fn walk_conditional<W: Walker + ?Sized>(
    w: &mut W,
    conditional: &Conditional,
) -> Result<(), WdlError> {
    w.expr(&conditional.expr)?;
    for element in &conditional.body {
        walk_element(w, element)?;
    }
    Ok(())
}

pub fn walk_expr<W: Walker + ?Sized>(w: &mut W, expr: &Expression) -> Result<(), WdlError> {
    if let Expression::Str { parts, .. } = expr {
        for part in parts {
            if let StringPart::Placeholder { expr, .. } = part {
                w.expr(expr)?;
            }
        }
        return Ok(());
    }
    for child in expr.children() {
        w.expr(child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourcePosition;
    use crate::types::Type;
    use indexmap::IndexMap;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    /// Counts every identifier in the tree.
    #[derive(Default)]
    struct IdentCounter {
        count: usize,
    }

    impl Walker for IdentCounter {
        fn expr(&mut self, expr: &Expression) -> Result<(), WdlError> {
            if matches!(expr, Expression::Ident { .. }) {
                self.count += 1;
            }
            walk_expr(self, expr)
        }
    }

    /// Skips conditional bodies entirely.
    #[derive(Default)]
    struct UnconditionalCalls {
        names: Vec<String>,
    }

    impl Walker for UnconditionalCalls {
        fn conditional(&mut self, _c: &Conditional) -> Result<(), WdlError> {
            Ok(())
        }
        fn call(&mut self, call: &crate::tree::Call) -> Result<(), WdlError> {
            self.names.push(call.name().to_string());
            walk_call(self, call)
        }
    }

    fn sample_workflow() -> Workflow {
        Workflow {
            pos: pos(),
            name: "w".into(),
            inputs: None,
            body: vec![
                WorkflowElement::Call(crate::tree::Call::new(
                    pos(),
                    vec!["outer".into()],
                    None,
                    vec![],
                    IndexMap::new(),
                )),
                WorkflowElement::Conditional(Conditional {
                    pos: pos(),
                    expr: Expression::ident(pos(), "flag"),
                    body: vec![WorkflowElement::Call(crate::tree::Call::new(
                        pos(),
                        vec!["inner".into()],
                        None,
                        vec![],
                        IndexMap::new(),
                    ))],
                }),
                WorkflowElement::Decl(Declaration::new(
                    pos(),
                    Type::int(false),
                    "n".into(),
                    Some(Expression::binary(
                        pos(),
                        crate::expr::BinaryOp::Add,
                        Expression::ident(pos(), "a"),
                        Expression::ident(pos(), "b"),
                    )),
                )),
            ],
            outputs: None,
            parameter_meta: IndexMap::new(),
            meta: IndexMap::new(),
            wdl_version: "1.0".into(),
        }
    }

    #[test]
    fn counts_idents_recursively() {
        let wf = sample_workflow();
        let mut counter = IdentCounter::default();
        counter.workflow(&wf).unwrap();
        // flag, a, b
        assert_eq!(counter.count, 3);
    }

    #[test]
    fn pruning_skips_subtrees() {
        let wf = sample_workflow();
        let mut walker = UnconditionalCalls::default();
        walker.workflow(&wf).unwrap();
        assert_eq!(walker.names, vec!["outer".to_string()]);
    }
}
