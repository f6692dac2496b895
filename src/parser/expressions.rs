//! Expression parsing by recursive descent, with the standard WDL
//! precedence ladder: `||` < `&&` < `==`/`!=` < relational < `+`/`-` <
//! `*`/`/`/`%` < unary < postfix (indexing, member access, application).

use super::keywords::gates;
use super::stream::TokenStream;
use super::tokens::{LocatedToken, RawStringPart, Token};
use crate::error::WdlError;
use crate::expr::{BinaryOp, Expression, StringPart, UnaryOp};

pub fn parse_expression(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    if stream.accept_keyword("if") {
        let pos = stream.pos();
        let condition = parse_expression(stream)?;
        stream.expect_keyword("then")?;
        let consequent = parse_expression(stream)?;
        stream.expect_keyword("else")?;
        let alternative = parse_expression(stream)?;
        return Ok(Expression::if_then_else(
            pos,
            condition,
            consequent,
            alternative,
        ));
    }
    parse_or(stream)
}

fn parse_or(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let mut lhs = parse_and(stream)?;
    while stream.accept(&Token::OrOr) {
        let pos = lhs.pos().clone();
        let rhs = parse_and(stream)?;
        lhs = Expression::binary(pos, BinaryOp::Or, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_and(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let mut lhs = parse_equality(stream)?;
    while stream.accept(&Token::AndAnd) {
        let pos = lhs.pos().clone();
        let rhs = parse_equality(stream)?;
        lhs = Expression::binary(pos, BinaryOp::And, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_equality(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let mut lhs = parse_relational(stream)?;
    loop {
        let op = match stream.peek() {
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::NotEq) => BinaryOp::Neq,
            _ => break,
        };
        stream.next();
        let pos = lhs.pos().clone();
        let rhs = parse_relational(stream)?;
        lhs = Expression::binary(pos, op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_relational(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let mut lhs = parse_additive(stream)?;
    loop {
        let op = match stream.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Lte) => BinaryOp::Lte,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Gte) => BinaryOp::Gte,
            _ => break,
        };
        stream.next();
        let pos = lhs.pos().clone();
        let rhs = parse_additive(stream)?;
        lhs = Expression::binary(pos, op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_additive(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let mut lhs = parse_multiplicative(stream)?;
    loop {
        let op = match stream.peek() {
            Some(Token::Plus) => BinaryOp::Add,
            Some(Token::Minus) => BinaryOp::Sub,
            _ => break,
        };
        stream.next();
        let pos = lhs.pos().clone();
        let rhs = parse_multiplicative(stream)?;
        lhs = Expression::binary(pos, op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_multiplicative(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let mut lhs = parse_unary(stream)?;
    loop {
        let op = match stream.peek() {
            Some(Token::Star) => BinaryOp::Mul,
            Some(Token::Slash) => BinaryOp::Div,
            Some(Token::Percent) => BinaryOp::Rem,
            _ => break,
        };
        stream.next();
        let pos = lhs.pos().clone();
        let rhs = parse_unary(stream)?;
        lhs = Expression::binary(pos, op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_unary(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let pos = stream.pos();
    if stream.accept(&Token::Bang) {
        let operand = parse_unary(stream)?;
        return Ok(Expression::unary(pos, UnaryOp::Not, operand));
    }
    if stream.accept(&Token::Minus) {
        let operand = parse_unary(stream)?;
        // fold literal negation so e.g. -1 is an Int literal
        return Ok(match operand {
            Expression::Int { value, .. } => Expression::int(pos, -value),
            Expression::Float { value, .. } => Expression::float(pos, -value),
            other => Expression::unary(pos, UnaryOp::Neg, other),
        });
    }
    parse_postfix(stream)
}

fn parse_postfix(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let mut expr = parse_primary(stream)?;
    loop {
        if stream.accept(&Token::LBracket) {
            let pos = expr.pos().clone();
            let index = parse_expression(stream)?;
            stream.expect(&Token::RBracket)?;
            expr = Expression::at(pos, expr, index);
        } else if stream.peek() == Some(&Token::Dot)
            && matches!(stream.peek_at(1), Some(Token::Ident(_)))
        {
            stream.next();
            let member = stream.expect_ident()?;
            // fold pure identifier chains into a dotted name, which the
            // typechecker resolves against namespaced bindings
            expr = match expr {
                Expression::Ident { pos, name, .. } => {
                    Expression::ident(pos, format!("{}.{}", name, member))
                }
                other => {
                    let pos = other.pos().clone();
                    Expression::get_member(pos, other, member)
                }
            };
        } else {
            break;
        }
    }
    Ok(expr)
}

fn parse_primary(stream: &mut TokenStream) -> Result<Expression, WdlError> {
    let pos = stream.pos();
    match stream.peek().cloned() {
        Some(Token::IntLit(n)) => {
            stream.next();
            Ok(Expression::int(pos, n))
        }
        Some(Token::FloatLit(f)) => {
            stream.next();
            Ok(Expression::float(pos, f))
        }
        Some(Token::BoolLit(b)) => {
            stream.next();
            Ok(Expression::boolean(pos, b))
        }
        Some(Token::StringLit(raw)) => {
            stream.next();
            let parts = string_parts(stream, raw)?;
            Ok(Expression::string(pos, parts))
        }
        Some(Token::Keyword(k)) if k == "None" => {
            stream.next();
            Ok(Expression::null(pos))
        }
        Some(Token::Keyword(k)) if k == "object" => {
            stream.next();
            if !gates(stream.version()).object_literal {
                return Err(WdlError::syntax(
                    pos,
                    "object literals are not supported in this WDL version; use a struct",
                    stream.version(),
                ));
            }
            stream.expect(&Token::LBrace)?;
            let members = parse_member_list(stream)?;
            Ok(Expression::struct_literal(pos, None, members))
        }
        Some(Token::Ident(name)) => {
            stream.next();
            if stream.accept(&Token::LParen) {
                let mut arguments = Vec::new();
                if !stream.accept(&Token::RParen) {
                    loop {
                        arguments.push(parse_expression(stream)?);
                        if !stream.accept(&Token::Comma) {
                            break;
                        }
                    }
                    stream.expect(&Token::RParen)?;
                }
                return Ok(Expression::apply(pos, name, arguments));
            }
            if gates(stream.version()).struct_literals && struct_literal_ahead(stream) {
                stream.expect(&Token::LBrace)?;
                let members = parse_member_list(stream)?;
                return Ok(Expression::struct_literal(pos, Some(name), members));
            }
            Ok(Expression::ident(pos, name))
        }
        Some(Token::LParen) => {
            stream.next();
            let first = parse_expression(stream)?;
            if stream.accept(&Token::Comma) {
                let second = parse_expression(stream)?;
                stream.expect(&Token::RParen)?;
                Ok(Expression::pair(pos, first, second))
            } else {
                stream.expect(&Token::RParen)?;
                Ok(first)
            }
        }
        Some(Token::LBracket) => {
            stream.next();
            let mut items = Vec::new();
            if !stream.accept(&Token::RBracket) {
                loop {
                    items.push(parse_expression(stream)?);
                    if !stream.accept(&Token::Comma) {
                        break;
                    }
                    // tolerate a trailing comma
                    if stream.peek() == Some(&Token::RBracket) {
                        break;
                    }
                }
                stream.expect(&Token::RBracket)?;
            }
            Ok(Expression::array(pos, items))
        }
        Some(Token::LBrace) => {
            stream.next();
            let mut pairs = Vec::new();
            if !stream.accept(&Token::RBrace) {
                loop {
                    let key = parse_expression(stream)?;
                    stream.expect(&Token::Colon)?;
                    let value = parse_expression(stream)?;
                    pairs.push((key, value));
                    if !stream.accept(&Token::Comma) {
                        break;
                    }
                    if stream.peek() == Some(&Token::RBrace) {
                        break;
                    }
                }
                stream.expect(&Token::RBrace)?;
            }
            Ok(Expression::map(pos, pairs))
        }
        _ => Err(stream.error(format!(
            "expected an expression, found {}",
            stream.describe_next()
        ))),
    }
}

/// `Name {` begins a struct literal only when followed by `}` or
/// `member :`.
fn struct_literal_ahead(stream: &TokenStream) -> bool {
    stream.peek() == Some(&Token::LBrace)
        && match (stream.peek_at(1), stream.peek_at(2)) {
            (Some(Token::RBrace), _) => true,
            (Some(Token::Ident(_)), Some(Token::Colon)) => true,
            _ => false,
        }
}

fn parse_member_list(stream: &mut TokenStream) -> Result<Vec<(String, Expression)>, WdlError> {
    let mut members = Vec::new();
    if stream.accept(&Token::RBrace) {
        return Ok(members);
    }
    loop {
        let name = stream.expect_ident()?;
        stream.expect(&Token::Colon)?;
        let value = parse_expression(stream)?;
        members.push((name, value));
        if !stream.accept(&Token::Comma) {
            break;
        }
        if stream.peek() == Some(&Token::RBrace) {
            break;
        }
    }
    stream.expect(&Token::RBrace)?;
    Ok(members)
}

/// Convert raw scanned string parts into AST parts, parsing each
/// placeholder's option list and expression.
pub fn string_parts(
    stream: &TokenStream,
    raw: Vec<RawStringPart>,
) -> Result<Vec<StringPart>, WdlError> {
    let mut parts = Vec::new();
    for part in raw {
        match part {
            RawStringPart::Text(t) => parts.push(StringPart::Text(t)),
            RawStringPart::Placeholder(tokens) => {
                parts.push(parse_placeholder(stream, tokens)?);
            }
        }
    }
    Ok(parts)
}

/// Parse a placeholder token run: leading `name = "literal"` options, then
/// the expression.
fn parse_placeholder(
    outer: &TokenStream,
    tokens: Vec<LocatedToken>,
) -> Result<StringPart, WdlError> {
    let mut stream = TokenStream::new(tokens, "", "", outer.version());
    let mut options = Vec::new();
    loop {
        let name = match (stream.peek(), stream.peek_at(1)) {
            (Some(Token::Ident(n)), Some(Token::Assign)) => Some(n.clone()),
            (Some(Token::BoolLit(b)), Some(Token::Assign)) => Some(b.to_string()),
            _ => None,
        };
        let Some(name) = name else { break };
        stream.next();
        stream.next();
        let value = match stream.next().map(|t| t.token) {
            Some(Token::StringLit(parts)) => {
                let mut text = String::new();
                for p in parts {
                    match p {
                        RawStringPart::Text(t) => text.push_str(&t),
                        RawStringPart::Placeholder(_) => {
                            return Err(stream.error(
                                "placeholder option values must be literal strings",
                            ))
                        }
                    }
                }
                text
            }
            _ => {
                return Err(
                    stream.error(format!("expected string literal for {} option", name))
                )
            }
        };
        options.push((name, value));
    }
    let expr = parse_expression(&mut stream)?;
    if !stream.at_end() {
        return Err(stream.error(format!(
            "unexpected {} after placeholder expression",
            stream.describe_next()
        )));
    }
    Ok(StringPart::Placeholder {
        options,
        expr: Box::new(expr),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;

    fn parse(source: &str) -> Expression {
        let tokens = Lexer::new("t.wdl", "t.wdl", "1.0").tokenize(source).unwrap();
        let mut stream = TokenStream::new(tokens, "t.wdl", "t.wdl", "1.0");
        let e = parse_expression(&mut stream).unwrap();
        assert!(stream.at_end(), "trailing tokens in {:?}", source);
        e
    }

    #[test]
    fn precedence() {
        assert_eq!(parse("1 + 2 * 3").to_string(), "1 + 2 * 3");
        match parse("1 + 2 * 3") {
            Expression::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOp::Add);
                assert!(matches!(
                    *right,
                    Expression::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse("a || b && c") {
            Expression::Binary { op, .. } => assert_eq!(op, BinaryOp::Or),
            other => panic!("unexpected {:?}", other),
        }
        match parse("1 < 2 == true") {
            Expression::Binary { op, .. } => assert_eq!(op, BinaryOp::Eq),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parenthesized_vs_pair() {
        assert!(matches!(parse("(1)"), Expression::Int { .. }));
        assert!(matches!(parse("(1, 2)"), Expression::Pair { .. }));
    }

    #[test]
    fn unary_folding() {
        assert!(matches!(parse("-3"), Expression::Int { value: -3, .. }));
        assert!(matches!(parse("!x"), Expression::Unary { .. }));
        match parse("1 - -2") {
            Expression::Binary { op, right, .. } => {
                assert_eq!(op, BinaryOp::Sub);
                assert!(matches!(*right, Expression::Int { value: -2, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn postfix_chain() {
        match parse("xs[0].left") {
            Expression::GetMember { member, expr, .. } => {
                assert_eq!(member, "left");
                assert!(matches!(*expr, Expression::At { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dotted_idents_fold() {
        match parse("lib.task_out.value") {
            Expression::Ident { name, .. } => assert_eq!(name, "lib.task_out.value"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn function_application() {
        match parse("select_first([a, b])") {
            Expression::Apply {
                function,
                arguments,
                ..
            } => {
                assert_eq!(function, "select_first");
                assert_eq!(arguments.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn if_then_else() {
        match parse("if b then 1 else 2") {
            Expression::IfThenElse { .. } => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn collection_literals() {
        assert!(matches!(parse("[]"), Expression::Array { .. }));
        assert!(matches!(parse("[1, 2, 3]"), Expression::Array { .. }));
        assert!(matches!(parse("{\"a\": 1}"), Expression::Map { .. }));
        match parse("Sample { id: 1 }") {
            Expression::Struct { name, members, .. } => {
                assert_eq!(name.as_deref(), Some("Sample"));
                assert_eq!(members.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn object_literal_version_gate() {
        // accepted in 1.0
        assert!(matches!(parse("object { a: 1 }"), Expression::Struct { name: None, .. }));
        // rejected in 1.1
        let tokens = Lexer::new("t.wdl", "t.wdl", "1.1")
            .tokenize("object { a: 1 }")
            .unwrap();
        let mut stream = TokenStream::new(tokens, "t.wdl", "t.wdl", "1.1");
        assert!(parse_expression(&mut stream).is_err());
    }

    #[test]
    fn string_with_options() {
        match parse("\"~{sep=\",\" xs}\"") {
            Expression::Str { parts, .. } => match &parts[0] {
                StringPart::Placeholder { options, .. } => {
                    assert_eq!(options, &vec![("sep".to_string(), ",".to_string())]);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn true_false_options() {
        match parse("\"~{true=\"--x\" false=\"\" flag}\"") {
            Expression::Str { parts, .. } => match &parts[0] {
                StringPart::Placeholder { options, expr } => {
                    assert_eq!(options.len(), 2);
                    assert_eq!(options[0].0, "true");
                    assert!(matches!(**expr, Expression::Ident { .. }));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }
}
