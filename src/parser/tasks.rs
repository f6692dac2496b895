//! Task parsing: the `task` block with its input, command, output, runtime,
//! and metadata sections. Also home to the JSON-like `meta` /
//! `parameter_meta` literal parser shared with workflows.

use super::declarations::parse_declaration;
use super::expressions::{parse_expression, string_parts};
use super::stream::TokenStream;
use super::tokens::{RawStringPart, Token};
use crate::error::WdlError;
use crate::expr::Expression;
use crate::tree::{Declaration, MetaValue, Task};
use indexmap::IndexMap;

pub fn parse_task(stream: &mut TokenStream) -> Result<Task, WdlError> {
    let pos = stream.pos();
    stream.expect_keyword("task")?;
    let name = stream.expect_ident()?;
    stream.expect(&Token::LBrace)?;

    let mut inputs: Option<Vec<Declaration>> = None;
    let mut postinputs: Vec<Declaration> = Vec::new();
    let mut command: Option<Expression> = None;
    let mut outputs: Vec<Declaration> = Vec::new();
    let mut runtime: IndexMap<String, Expression> = IndexMap::new();
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
            Some(Token::Keyword(k)) if k == "command" => {
                let command_pos = stream.pos();
                stream.next();
                let raw = match stream.next().map(|t| t.token) {
                    Some(Token::CommandLit(parts)) => parts,
                    _ => return Err(stream.error("malformed command section")),
                };
                let parts = string_parts(stream, raw)?;
                if command
                    .replace(Expression::command(command_pos, parts))
                    .is_some()
                {
                    return Err(stream.error("duplicate command section"));
                }
            }
            Some(Token::Keyword(k)) if k == "output" => {
                stream.next();
                stream.expect(&Token::LBrace)?;
                while !stream.accept(&Token::RBrace) {
                    outputs.push(parse_declaration(stream)?);
                    stream.accept(&Token::Comma);
                }
            }
            Some(Token::Keyword(k)) if k == "runtime" || k == "requirements" => {
                stream.next();
                stream.expect(&Token::LBrace)?;
                while !stream.accept(&Token::RBrace) {
                    let key = stream.expect_ident()?;
                    stream.expect(&Token::Colon)?;
                    let expr = parse_expression(stream)?;
                    if runtime.insert(key.clone(), expr).is_some() {
                        return Err(stream.error(format!("duplicate runtime key {}", key)));
                    }
                    stream.accept(&Token::Comma);
                }
            }
            Some(Token::Keyword(k)) if k == "meta" => {
                stream.next();
                meta = parse_meta_block(stream)?;
            }
            Some(Token::Keyword(k)) if k == "hints" => {
                stream.next();
                let hints = parse_meta_block(stream)?;
                meta.insert("hints".to_string(), MetaValue::Object(hints));
            }
            Some(Token::Keyword(k)) if k == "parameter_meta" => {
                stream.next();
                parameter_meta = parse_meta_block(stream)?;
            }
            _ => {
                postinputs.push(parse_declaration(stream)?);
            }
        }
    }

    let command = command.ok_or_else(|| {
        WdlError::syntax(
            pos.clone(),
            format!("task {} is missing a command section", name),
            stream.version(),
        )
    })?;

    Ok(Task {
        pos,
        name,
        inputs,
        postinputs,
        command,
        outputs,
        runtime,
        parameter_meta,
        meta,
        wdl_version: stream.version().to_string(),
    })
}

/// `{ key: value, ... }` of JSON-like literals.
pub fn parse_meta_block(
    stream: &mut TokenStream,
) -> Result<IndexMap<String, MetaValue>, WdlError> {
    stream.expect(&Token::LBrace)?;
    parse_meta_members(stream)
}

fn parse_meta_members(stream: &mut TokenStream) -> Result<IndexMap<String, MetaValue>, WdlError> {
    let mut members = IndexMap::new();
    while !stream.accept(&Token::RBrace) {
        let key = match stream.peek().cloned() {
            Some(Token::Ident(k)) | Some(Token::Keyword(k)) => {
                stream.next();
                k
            }
            Some(Token::StringLit(parts)) => {
                stream.next();
                meta_string(stream, parts)?
            }
            _ => {
                return Err(stream.error(format!(
                    "expected metadata key, found {}",
                    stream.describe_next()
                )))
            }
        };
        stream.expect(&Token::Colon)?;
        let value = parse_meta_value(stream)?;
        if members.insert(key.clone(), value).is_some() {
            return Err(stream.error(format!("duplicate metadata key {}", key)));
        }
        stream.accept(&Token::Comma);
    }
    Ok(members)
}

fn parse_meta_value(stream: &mut TokenStream) -> Result<MetaValue, WdlError> {
    match stream.peek().cloned() {
        Some(Token::Keyword(k)) if k == "None" => {
            stream.next();
            Ok(MetaValue::Null)
        }
        Some(Token::Ident(k)) if k == "null" => {
            stream.next();
            Ok(MetaValue::Null)
        }
        Some(Token::BoolLit(b)) => {
            stream.next();
            Ok(MetaValue::Boolean(b))
        }
        Some(Token::IntLit(n)) => {
            stream.next();
            Ok(MetaValue::Int(n))
        }
        Some(Token::FloatLit(f)) => {
            stream.next();
            Ok(MetaValue::Float(f))
        }
        Some(Token::Minus) => {
            stream.next();
            match stream.next().map(|t| t.token) {
                Some(Token::IntLit(n)) => Ok(MetaValue::Int(-n)),
                Some(Token::FloatLit(f)) => Ok(MetaValue::Float(-f)),
                _ => Err(stream.error("expected number after '-' in metadata")),
            }
        }
        Some(Token::StringLit(parts)) => {
            stream.next();
            Ok(MetaValue::String(meta_string(stream, parts)?))
        }
        Some(Token::LBracket) => {
            stream.next();
            let mut items = Vec::new();
            while !stream.accept(&Token::RBracket) {
                items.push(parse_meta_value(stream)?);
                stream.accept(&Token::Comma);
            }
            Ok(MetaValue::Array(items))
        }
        Some(Token::LBrace) => {
            stream.next();
            Ok(MetaValue::Object(parse_meta_members(stream)?))
        }
        _ => Err(stream.error(format!(
            "expected metadata value, found {}",
            stream.describe_next()
        ))),
    }
}

/// Metadata strings are literal only; placeholders are not expanded there.
fn meta_string(stream: &TokenStream, parts: Vec<RawStringPart>) -> Result<String, WdlError> {
    let mut out = String::new();
    for p in parts {
        match p {
            RawStringPart::Text(t) => out.push_str(&t),
            RawStringPart::Placeholder(_) => {
                return Err(stream.error("placeholders are not allowed in metadata strings"))
            }
        }
    }
    Ok(out)
}
