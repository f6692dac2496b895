//! Type expression parsing: primitives, `Array[T]+?`, `Map[K,V]`,
//! `Pair[L,R]`, and struct references, with the `?`/`+` quantifiers.

use super::keywords::gates;
use super::stream::TokenStream;
use super::tokens::Token;
use crate::error::WdlError;
use crate::types::Type;
use indexmap::IndexMap;

pub fn parse_type(stream: &mut TokenStream) -> Result<Type, WdlError> {
    let pos = stream.pos();
    let name = match stream.peek() {
        Some(Token::Ident(n)) => {
            let n = n.clone();
            stream.next();
            n
        }
        Some(Token::Keyword(k)) if k == "object" => {
            stream.next();
            let t = Type::object(IndexMap::new());
            return Ok(t);
        }
        _ => {
            return Err(stream.error(format!(
                "expected a type, found {}",
                stream.describe_next()
            )))
        }
    };

    let mut ty = match name.as_str() {
        "Boolean" => Type::boolean(false),
        "Int" => Type::int(false),
        "Float" => Type::float(false),
        "String" => Type::string(false),
        "File" => Type::file(false),
        "Directory" => {
            if !gates(stream.version()).directory_type {
                return Err(WdlError::syntax(
                    pos,
                    "Directory type requires WDL version 1.2 or later",
                    stream.version(),
                ));
            }
            Type::directory(false)
        }
        "Object" => Type::object(IndexMap::new()),
        "Array" => {
            stream.expect(&Token::LBracket)?;
            let item = parse_type(stream)?;
            stream.expect(&Token::RBracket)?;
            let nonempty = stream.accept(&Token::Plus);
            Type::array(item, false, nonempty)
        }
        "Map" => {
            stream.expect(&Token::LBracket)?;
            let key = parse_type(stream)?;
            if !matches!(
                key,
                Type::Boolean { .. }
                    | Type::Int { .. }
                    | Type::Float { .. }
                    | Type::String { .. }
                    | Type::File { .. }
                    | Type::Directory { .. }
            ) {
                return Err(WdlError::InvalidType {
                    pos,
                    message: format!("Map key type must be primitive, not {}", key),
                });
            }
            stream.expect(&Token::Comma)?;
            let value = parse_type(stream)?;
            stream.expect(&Token::RBracket)?;
            Type::map(key, value, false)
        }
        "Pair" => {
            stream.expect(&Token::LBracket)?;
            let left = parse_type(stream)?;
            stream.expect(&Token::Comma)?;
            let right = parse_type(stream)?;
            stream.expect(&Token::RBracket)?;
            Type::pair(left, right, false)
        }
        _ => Type::struct_instance(name, false),
    };

    if stream.accept(&Token::Question) {
        ty = ty.with_optional(true);
    }
    Ok(ty)
}

/// Whether the upcoming tokens begin a declaration (`Type name ...`).
pub fn looks_like_declaration(stream: &TokenStream) -> bool {
    match stream.peek() {
        Some(Token::Ident(_)) => {}
        Some(Token::Keyword(k)) if k == "object" => return true,
        _ => return false,
    }
    // after the type name we may see [, ?, + (type syntax) or directly the
    // declared identifier
    match stream.peek_at(1) {
        Some(Token::Ident(_)) | Some(Token::LBracket) => true,
        Some(Token::Question) | Some(Token::Plus) => {
            matches!(stream.peek_at(2), Some(Token::Ident(_)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;

    fn parse(source: &str, version: &str) -> Result<Type, WdlError> {
        let tokens = Lexer::new("t.wdl", "t.wdl", version).tokenize(source).unwrap();
        let mut stream = TokenStream::new(tokens, "t.wdl", "t.wdl", version);
        parse_type(&mut stream)
    }

    #[test]
    fn primitives_and_quantifiers() {
        assert_eq!(parse("Int", "1.0").unwrap().to_string(), "Int");
        assert_eq!(parse("String?", "1.0").unwrap().to_string(), "String?");
        assert_eq!(
            parse("Array[File]+", "1.0").unwrap().to_string(),
            "Array[File]+"
        );
        assert_eq!(
            parse("Array[Int]+?", "1.0").unwrap().to_string(),
            "Array[Int]+?"
        );
    }

    #[test]
    fn compound_types() {
        assert_eq!(
            parse("Map[String,Array[Int]]", "1.0").unwrap().to_string(),
            "Map[String,Array[Int]]"
        );
        assert_eq!(
            parse("Pair[Int,Pair[Float,String]]", "1.0").unwrap().to_string(),
            "Pair[Int,Pair[Float,String]]"
        );
    }

    #[test]
    fn struct_reference() {
        let t = parse("SampleInfo?", "1.0").unwrap();
        match t {
            Type::StructInstance { name, optional, .. } => {
                assert_eq!(name, "SampleInfo");
                assert!(optional);
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn map_key_must_be_primitive() {
        assert!(matches!(
            parse("Map[Array[Int],Int]", "1.0"),
            Err(WdlError::InvalidType { .. })
        ));
    }

    #[test]
    fn directory_gated() {
        assert!(parse("Directory", "1.0").is_err());
        assert!(parse("Directory", "1.2").is_ok());
    }
}
