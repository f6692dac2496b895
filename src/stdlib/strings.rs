//! String manipulation builtins.

use super::{check_arity, eval_args, Function, StaticFunction, StdLib};
use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::typecheck::TypeContext;
use crate::expr::Expression;
use crate::types::Type;
use crate::value::Value;
use regex::Regex;

pub fn register(lib: &mut StdLib) {
    lib.register(StaticFunction::new(
        "sub",
        vec![Type::string(false), Type::string(false), Type::string(false)],
        Type::string(false),
        |pos, args| {
            let input = args[0].as_string().unwrap();
            let pattern = args[1].as_string().unwrap();
            let replacement = args[2].as_string().unwrap();
            let re = Regex::new(pattern)
                .map_err(|e| WdlError::eval(pos.clone(), format!("bad sub() pattern: {}", e)))?;
            Ok(Value::string(re.replace_all(input, replacement).to_string()))
        },
    ));
    lib.register(StaticFunction::new(
        "find",
        vec![Type::string(false), Type::string(false)],
        Type::string(true),
        |pos, args| {
            let input = args[0].as_string().unwrap();
            let pattern = args[1].as_string().unwrap();
            let re = Regex::new(pattern)
                .map_err(|e| WdlError::eval(pos.clone(), format!("bad find() pattern: {}", e)))?;
            Ok(match re.find(input) {
                Some(m) => Value::string(m.as_str().to_string()),
                None => Value::null(),
            })
        },
    ));
    lib.register(StaticFunction::new(
        "matches",
        vec![Type::string(false), Type::string(false)],
        Type::boolean(false),
        |pos, args| {
            let input = args[0].as_string().unwrap();
            let pattern = args[1].as_string().unwrap();
            let re = Regex::new(pattern).map_err(|e| {
                WdlError::eval(pos.clone(), format!("bad matches() pattern: {}", e))
            })?;
            Ok(Value::boolean(re.is_match(input)))
        },
    ));
    lib.register(StaticFunction::new(
        "join_paths",
        vec![Type::file(false), Type::string(false)],
        Type::file(false),
        |pos, args| {
            let base = args[0].as_string().unwrap();
            let rel = args[1].as_string().unwrap();
            if rel.starts_with('/') {
                return Err(WdlError::eval(
                    pos.clone(),
                    "join_paths() second argument must be relative",
                ));
            }
            Ok(Value::file(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                rel
            )))
        },
    ));
    lib.register(Box::new(Basename));
    lib.register(Box::new(Defined));
    lib.register(Box::new(Sep));
    lib.register(Box::new(QuoteLike { single: false }));
    lib.register(Box::new(QuoteLike { single: true }));
}

/// `basename(File|String[, suffix])`: final path component, optionally with
/// a suffix removed.
struct Basename;

impl Function for Basename {
    fn name(&self) -> &str {
        "basename"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "basename", args, 1, 2)?;
        let t = args[0].infer_type(ctx)?;
        if !t.coerces(&Type::string(false), ctx.check_quant) {
            return Err(WdlError::static_mismatch(
                args[0].pos().clone(),
                "File or String".to_string(),
                t.to_string(),
                "",
            ));
        }
        if let Some(suffix) = args.get_mut(1) {
            suffix.typecheck(&Type::string(false), ctx)?;
        }
        Ok(Type::string(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let values = eval_args(args, env, stdlib)?;
        let path = values[0]
            .as_string()
            .ok_or_else(|| WdlError::eval(pos.clone(), "basename() of non-string"))?;
        let mut base = path.rsplit('/').next().unwrap_or(path).to_string();
        if let Some(suffix) = values.get(1).and_then(|v| v.as_string()) {
            if let Some(stripped) = base.strip_suffix(suffix) {
                base = stripped.to_string();
            }
        }
        Ok(Value::string(base))
    }
}

/// `defined(T?)`: whether an optional value is present.
struct Defined;

impl Function for Defined {
    fn name(&self) -> &str {
        "defined"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "defined", args, 1, 1)?;
        args[0].infer_type(ctx)?;
        Ok(Type::boolean(false))
    }

    fn eval(
        &self,
        _pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        Ok(Value::boolean(!v.is_null()))
    }
}

/// `sep(separator, Array[P])`: join stringified elements.
struct Sep;

impl Function for Sep {
    fn name(&self) -> &str {
        "sep"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "sep", args, 2, 2)?;
        args[0].typecheck(&Type::string(false), ctx)?;
        let arr_ty = args[1].infer_type(ctx)?;
        match arr_ty {
            Type::Array { ref item, .. }
                if item.coerces(&Type::string(false), ctx.check_quant) =>
            {
                Ok(Type::string(false))
            }
            Type::Any { .. } => Ok(Type::string(false)),
            other => Err(WdlError::static_mismatch(
                args[1].pos().clone(),
                "Array[String]".to_string(),
                other.to_string(),
                "",
            )),
        }
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let values = eval_args(args, env, stdlib)?;
        let sep = values[0]
            .coerce(&Type::string(false))?
            .as_string()
            .unwrap()
            .to_string();
        let items = values[1]
            .as_array()
            .ok_or_else(|| WdlError::eval(pos.clone(), "sep() of non-array"))?;
        let parts: Result<Vec<String>, WdlError> = items
            .iter()
            .map(|v| {
                v.coerce(&Type::string(false))
                    .map(|s| s.as_string().unwrap().to_string())
            })
            .collect();
        Ok(Value::string(parts?.join(&sep)))
    }
}

/// `quote` / `squote`: wrap each stringified element in (single) quotes.
struct QuoteLike {
    single: bool,
}

impl Function for QuoteLike {
    fn name(&self) -> &str {
        if self.single {
            "squote"
        } else {
            "quote"
        }
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name(), args, 1, 1)?;
        let arr_ty = args[0].infer_type(ctx)?;
        match arr_ty {
            Type::Array { ref item, .. }
                if item.coerces(&Type::string(false), ctx.check_quant) =>
            {
                Ok(Type::array(Type::string(false), false, false))
            }
            Type::Any { .. } => Ok(Type::array(Type::string(false), false, false)),
            other => Err(WdlError::static_mismatch(
                args[0].pos().clone(),
                "Array[String]".to_string(),
                other.to_string(),
                "",
            )),
        }
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let items = v
            .as_array()
            .ok_or_else(|| WdlError::eval(pos.clone(), "quote() of non-array"))?;
        let q = if self.single { '\'' } else { '"' };
        let quoted: Result<Vec<Value>, WdlError> = items
            .iter()
            .map(|item| {
                item.coerce(&Type::string(false))
                    .map(|s| Value::string(format!("{}{}{}", q, s.as_string().unwrap(), q)))
            })
            .collect();
        Ok(Value::array(Type::string(false), quoted?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn eval1(name: &str, args: Vec<Expression>) -> Result<Value, WdlError> {
        let lib = StdLib::base("1.0");
        let env = Bindings::new();
        lib.get_function(name).unwrap().eval(&pos(), &args, &env, &lib)
    }

    #[test]
    fn basename_with_suffix() {
        let v = eval1(
            "basename",
            vec![Expression::string_literal(pos(), "/data/x/sample.bam")],
        )
        .unwrap();
        assert_eq!(v.as_string(), Some("sample.bam"));

        let stripped = eval1(
            "basename",
            vec![
                Expression::string_literal(pos(), "/data/x/sample.bam"),
                Expression::string_literal(pos(), ".bam"),
            ],
        )
        .unwrap();
        assert_eq!(stripped.as_string(), Some("sample"));
    }

    #[test]
    fn sub_replaces_regex() {
        let v = eval1(
            "sub",
            vec![
                Expression::string_literal(pos(), "aaa bbb"),
                Expression::string_literal(pos(), "b+"),
                Expression::string_literal(pos(), "x"),
            ],
        )
        .unwrap();
        assert_eq!(v.as_string(), Some("aaa x"));
    }

    #[test]
    fn defined_checks_null() {
        assert_eq!(
            eval1("defined", vec![Expression::null(pos())]).unwrap().as_bool(),
            Some(false)
        );
        assert_eq!(
            eval1("defined", vec![Expression::int(pos(), 1)]).unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn sep_joins() {
        let arr = Expression::array(
            pos(),
            vec![Expression::int(pos(), 1), Expression::int(pos(), 2)],
        );
        let v = eval1(
            "sep",
            vec![Expression::string_literal(pos(), ", "), arr],
        )
        .unwrap();
        assert_eq!(v.as_string(), Some("1, 2"));
    }

    #[test]
    fn quote_wraps() {
        let arr = Expression::array(
            pos(),
            vec![
                Expression::string_literal(pos(), "a"),
                Expression::string_literal(pos(), "b"),
            ],
        );
        let v = eval1("quote", vec![arr]).unwrap();
        let items = v.as_array().unwrap();
        assert_eq!(items[0].as_string(), Some("\"a\""));
    }

    #[test]
    fn find_returns_optional() {
        let hit = eval1(
            "find",
            vec![
                Expression::string_literal(pos(), "chr12"),
                Expression::string_literal(pos(), "[0-9]+"),
            ],
        )
        .unwrap();
        assert_eq!(hit.as_string(), Some("12"));
        let miss = eval1(
            "find",
            vec![
                Expression::string_literal(pos(), "chrX"),
                Expression::string_literal(pos(), "[0-9]+"),
            ],
        )
        .unwrap();
        assert!(miss.is_null());
    }
}
