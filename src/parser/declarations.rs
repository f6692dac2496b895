//! Declaration parsing: `Type name [= expr]`.

use super::expressions::parse_expression;
use super::stream::TokenStream;
use super::tokens::Token;
use super::types::parse_type;
use crate::error::WdlError;
use crate::tree::Declaration;

pub fn parse_declaration(stream: &mut TokenStream) -> Result<Declaration, WdlError> {
    let pos = stream.pos();
    let decl_type = parse_type(stream)?;
    let name = stream.expect_ident()?;
    let expr = if stream.accept(&Token::Assign) {
        Some(parse_expression(stream)?)
    } else {
        None
    };
    Ok(Declaration::new(pos, decl_type, name, expr))
}
