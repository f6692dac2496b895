//! Workflow parsing: the `workflow` block, its body elements (declarations,
//! calls, scatter and conditional sections), and the output section with its
//! draft-2 expression shorthands.

use super::declarations::parse_declaration;
use super::expressions::parse_expression;
use super::keywords::gates;
use super::stream::TokenStream;
use super::tasks::parse_meta_block;
use super::tokens::Token;
use super::types::looks_like_declaration;
use crate::error::WdlError;
use crate::expr::Expression;
use crate::tree::{Call, Conditional, Declaration, Scatter, Workflow, WorkflowElement};
use crate::types::Type;
use indexmap::IndexMap;

pub fn parse_workflow(stream: &mut TokenStream) -> Result<Workflow, WdlError> {
    let pos = stream.pos();
    stream.expect_keyword("workflow")?;
    let name = stream.expect_ident()?;
    stream.expect(&Token::LBrace)?;

    let mut inputs: Option<Vec<Declaration>> = None;
    let mut outputs: Option<Vec<Declaration>> = None;
    let mut body: Vec<WorkflowElement> = Vec::new();
    let mut meta = IndexMap::new();
    let mut parameter_meta = IndexMap::new();

    loop {
        if stream.accept(&Token::RBrace) {
            break;
        }
        match stream.peek() {
            Some(Token::Keyword(k)) if k == "input" => {
                stream.next();
                stream.expect(&Token::LBrace)?;
                let mut decls = Vec::new();
                while !stream.accept(&Token::RBrace) {
                    decls.push(parse_declaration(stream)?);
                    stream.accept(&Token::Comma);
                }
                if inputs.replace(decls).is_some() {
                    return Err(stream.error("duplicate input section"));
                }
            }
            Some(Token::Keyword(k)) if k == "output" => {
                stream.next();
                stream.expect(&Token::LBrace)?;
                let mut decls = Vec::new();
                while !stream.accept(&Token::RBrace) {
                    decls.push(parse_output_declaration(stream)?);
                    stream.accept(&Token::Comma);
                }
                if outputs.replace(decls).is_some() {
                    return Err(stream.error("duplicate output section"));
                }
            }
            Some(Token::Keyword(k)) if k == "meta" => {
                stream.next();
                meta = parse_meta_block(stream)?;
            }
            Some(Token::Keyword(k)) if k == "parameter_meta" => {
                stream.next();
                parameter_meta = parse_meta_block(stream)?;
            }
            _ => body.push(parse_workflow_element(stream)?),
        }
    }

    Ok(Workflow {
        pos,
        name,
        inputs,
        body,
        outputs,
        parameter_meta,
        meta,
        wdl_version: stream.version().to_string(),
    })
}

pub fn parse_workflow_element(stream: &mut TokenStream) -> Result<WorkflowElement, WdlError> {
    match stream.peek() {
        Some(Token::Keyword(k)) if k == "call" => Ok(WorkflowElement::Call(parse_call(stream)?)),
        Some(Token::Keyword(k)) if k == "scatter" => {
            Ok(WorkflowElement::Scatter(parse_scatter(stream)?))
        }
        Some(Token::Keyword(k)) if k == "if" => {
            Ok(WorkflowElement::Conditional(parse_conditional(stream)?))
        }
        _ if looks_like_declaration(stream) => {
            Ok(WorkflowElement::Decl(parse_declaration(stream)?))
        }
        _ => Err(stream.error(format!(
            "expected a declaration, call, scatter, or if; found {}",
            stream.describe_next()
        ))),
    }
}

fn parse_call(stream: &mut TokenStream) -> Result<Call, WdlError> {
    let pos = stream.pos();
    stream.expect_keyword("call")?;

    let mut callee_id = vec![stream.expect_ident()?];
    while stream.accept(&Token::Dot) {
        callee_id.push(stream.expect_ident()?);
    }

    let alias = if stream.accept_keyword("as") {
        Some(stream.expect_ident()?)
    } else {
        None
    };

    let mut afters = Vec::new();
    if gates(stream.version()).call_after {
        while stream.accept_keyword("after") {
            afters.push(stream.expect_ident()?);
        }
    }

    let mut inputs = IndexMap::new();
    if stream.accept(&Token::LBrace) {
        let explicit_input = stream.accept_keyword("input");
        if explicit_input {
            stream.expect(&Token::Colon)?;
        } else if !gates(stream.version()).bare_call_inputs
            && stream.peek() != Some(&Token::RBrace)
        {
            return Err(stream.error("expected `input:` to begin call inputs"));
        }
        while !stream.accept(&Token::RBrace) {
            let input_pos = stream.pos();
            let name = stream.expect_ident()?;
            let expr = if stream.accept(&Token::Assign) {
                parse_expression(stream)?
            } else {
                // `x` shorthand for `x = x`
                Expression::ident(input_pos, name.clone())
            };
            if inputs.insert(name.clone(), expr).is_some() {
                return Err(stream.error(format!("duplicate call input {}", name)));
            }
            if !stream.accept(&Token::Comma) && stream.peek() != Some(&Token::RBrace) {
                // allow newline-separated inputs without commas
                continue;
            }
        }
    }

    Ok(Call::new(pos, callee_id, alias, afters, inputs))
}

fn parse_scatter(stream: &mut TokenStream) -> Result<Scatter, WdlError> {
    let pos = stream.pos();
    stream.expect_keyword("scatter")?;
    stream.expect(&Token::LParen)?;
    let variable = stream.expect_ident()?;
    stream.expect_keyword("in")?;
    let expr = parse_expression(stream)?;
    stream.expect(&Token::RParen)?;
    stream.expect(&Token::LBrace)?;
    let mut body = Vec::new();
    while !stream.accept(&Token::RBrace) {
        body.push(parse_workflow_element(stream)?);
    }
    Ok(Scatter {
        pos,
        variable,
        expr,
        body,
    })
}

fn parse_conditional(stream: &mut TokenStream) -> Result<Conditional, WdlError> {
    let pos = stream.pos();
    stream.expect_keyword("if")?;
    stream.expect(&Token::LParen)?;
    let expr = parse_expression(stream)?;
    stream.expect(&Token::RParen)?;
    stream.expect(&Token::LBrace)?;
    let mut body = Vec::new();
    while !stream.accept(&Token::RBrace) {
        body.push(parse_workflow_element(stream)?);
    }
    Ok(Conditional { pos, expr, body })
}

/// An output entry: a full declaration, or (draft-2) the `call.out` /
/// `call.*` shorthands.
fn parse_output_declaration(stream: &mut TokenStream) -> Result<Declaration, WdlError> {
    if looks_like_declaration(stream) {
        let d = parse_declaration(stream)?;
        if d.expr.is_none() {
            let message = format!("workflow output {} requires an expression", d.name);
            return Err(WdlError::syntax(d.pos, message, stream.version()));
        }
        return Ok(d);
    }
    let pos = stream.pos();
    let mut name = stream.expect_ident()?;
    while stream.accept(&Token::Dot) {
        if stream.accept(&Token::Star) {
            name.push_str(".*");
            return Ok(Declaration::new(pos, Type::any(), name, None));
        }
        name.push('.');
        name.push_str(&stream.expect_ident()?);
    }
    let expr = Expression::ident(pos.clone(), name.clone());
    Ok(Declaration::new(pos, Type::any(), name, Some(expr)))
}
