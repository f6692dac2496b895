//! Expression evaluation.
//!
//! Evaluation is a pure function of the value environment plus a standard
//! library handle; the only effects are those performed by stdlib functions
//! (file reads and writes). Every result coerces to the expression's
//! statically-inferred type, refining `Any` where the static type was
//! indeterminate.

use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::{BinaryOp, Expression, StringPart, UnaryOp};
use crate::stdlib::StdLib;
use crate::types::Type;
use crate::value::Value;

impl Expression {
    /// Evaluate in `env`, resolving function applications through `stdlib`.
    pub fn eval(&self, env: &Bindings<Value>, stdlib: &StdLib) -> Result<Value, WdlError> {
        match self {
            Expression::Boolean { value, .. } => Ok(Value::boolean(*value)),
            Expression::Int { value, .. } => Ok(Value::int(*value)),
            Expression::Float { value, .. } => Ok(Value::float(*value)),
            Expression::Null { .. } => Ok(Value::null()),

            Expression::Str { pos, parts, .. } => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        StringPart::Text(t) => out.push_str(t),
                        StringPart::Placeholder { options, expr } => {
                            let v = expr.eval(env, stdlib)?;
                            out.push_str(&render_placeholder(pos, &v, options)?);
                        }
                    }
                }
                Ok(Value::string(out))
            }

            Expression::Array { items, ty, .. } => {
                let values: Result<Vec<Value>, WdlError> =
                    items.iter().map(|e| e.eval(env, stdlib)).collect();
                let values = values?;
                let item_type = match ty {
                    Some(Type::Array { item, .. }) => (**item).clone(),
                    _ => values
                        .first()
                        .map(|v| v.wdl_type())
                        .unwrap_or_else(Type::any),
                };
                let coerced: Result<Vec<Value>, WdlError> =
                    values.iter().map(|v| v.coerce(&item_type)).collect();
                Ok(Value::array(item_type, coerced?))
            }

            Expression::Pair { left, right, .. } => Ok(Value::pair(
                left.eval(env, stdlib)?,
                right.eval(env, stdlib)?,
            )),

            Expression::Map { pairs, ty, .. } => {
                let (kt, vt) = match ty {
                    Some(Type::Map { key, value, .. }) => ((**key).clone(), (**value).clone()),
                    _ => (Type::any(), Type::any()),
                };
                let mut out = Vec::new();
                for (k, v) in pairs {
                    out.push((k.eval(env, stdlib)?, v.eval(env, stdlib)?));
                }
                Ok(Value::map(kt, vt, out))
            }

            Expression::Struct { members, ty, .. } => {
                let mut out = indexmap::IndexMap::new();
                for (name, e) in members {
                    out.insert(name.clone(), e.eval(env, stdlib)?);
                }
                match ty {
                    Some(struct_ty @ Type::StructInstance { .. }) => {
                        Value::object(out).coerce(struct_ty)
                    }
                    _ => Ok(Value::object(out)),
                }
            }

            Expression::Ident { pos, name, .. } => eval_dotted(pos, name, env),

            Expression::At {
                pos, expr, index, ..
            } => {
                let base = expr.eval(env, stdlib)?;
                let idx = index.eval(env, stdlib)?;
                match &base {
                    Value::Array { values, .. } => {
                        let i = idx.coerce(&Type::int(false))?.as_int().unwrap();
                        if i < 0 || i as usize >= values.len() {
                            return Err(WdlError::OutOfBounds {
                                pos: pos.clone(),
                                message: format!("index {} of {} elements", i, values.len()),
                            });
                        }
                        Ok(values[i as usize].clone())
                    }
                    Value::Map { pairs, .. } => {
                        for (k, v) in pairs {
                            if k.equals(&idx) {
                                return Ok(v.clone());
                            }
                        }
                        Err(WdlError::OutOfBounds {
                            pos: pos.clone(),
                            message: format!("map key {} not found", idx),
                        })
                    }
                    Value::Null => Err(WdlError::NullValue { pos: pos.clone() }),
                    other => Err(WdlError::eval(
                        pos.clone(),
                        format!("cannot index into {}", other.wdl_type()),
                    )),
                }
            }

            Expression::GetMember {
                pos, expr, member, ..
            } => {
                let base = expr.eval(env, stdlib)?;
                member_value(pos, &base, member)
            }

            Expression::IfThenElse {
                condition,
                consequent,
                alternative,
                ty,
                ..
            } => {
                let cond = condition
                    .eval(env, stdlib)?
                    .coerce(&Type::boolean(false))?
                    .as_bool()
                    .unwrap();
                let branch = if cond { consequent } else { alternative };
                let v = branch.eval(env, stdlib)?;
                match ty {
                    Some(t) => v.coerce(t),
                    None => Ok(v),
                }
            }

            Expression::Apply {
                pos,
                function,
                arguments,
                ..
            } => {
                let f = stdlib
                    .get_function(function)
                    .ok_or_else(|| WdlError::NoSuchFunction {
                        pos: pos.clone(),
                        name: function.clone(),
                    })?;
                f.eval(pos, arguments, env, stdlib)
            }

            Expression::Binary {
                pos,
                op,
                left,
                right,
                ..
            } => eval_binary(pos, *op, left, right, env, stdlib),

            Expression::Unary {
                pos, op, operand, ..
            } => {
                let v = operand.eval(env, stdlib)?;
                match op {
                    UnaryOp::Not => {
                        let b = v.coerce(&Type::boolean(false))?.as_bool().unwrap();
                        Ok(Value::boolean(!b))
                    }
                    UnaryOp::Neg => match v {
                        Value::Int { value } => Ok(Value::int(-value)),
                        Value::Float { value } => Ok(Value::float(-value)),
                        other => Err(WdlError::eval(
                            pos.clone(),
                            format!("cannot negate {}", other.wdl_type()),
                        )),
                    },
                }
            }
        }
    }
}

/// Resolve a dotted identifier against the value environment: longest bound
/// prefix, then member accesses.
fn eval_dotted(
    pos: &SourcePosition,
    name: &str,
    env: &Bindings<Value>,
) -> Result<Value, WdlError> {
    if let Some(v) = env.resolve(name) {
        return Ok(v.clone());
    }
    let parts: Vec<&str> = name.split('.').collect();
    for split in (1..parts.len()).rev() {
        let prefix = parts[..split].join(".");
        if let Some(bound) = env.resolve(&prefix) {
            let mut v = bound.clone();
            for member in &parts[split..] {
                v = member_value(pos, &v, member)?;
            }
            return Ok(v);
        }
    }
    Err(WdlError::UnknownIdentifier {
        pos: pos.clone(),
        name: name.to_string(),
    })
}

fn member_value(pos: &SourcePosition, base: &Value, member: &str) -> Result<Value, WdlError> {
    match base {
        Value::Struct { members, .. } => {
            members.get(member).cloned().ok_or_else(|| WdlError::NoSuchMember {
                pos: pos.clone(),
                member: member.to_string(),
            })
        }
        Value::Pair { left, right } => match member {
            "left" => Ok((**left).clone()),
            "right" => Ok((**right).clone()),
            _ => Err(WdlError::NoSuchMember {
                pos: pos.clone(),
                member: member.to_string(),
            }),
        },
        Value::Null => Err(WdlError::NullValue { pos: pos.clone() }),
        other => Err(WdlError::eval(
            pos.clone(),
            format!("cannot access member {} of {}", member, other.wdl_type()),
        )),
    }
}

/// Substitute one placeholder per its option list.
pub fn render_placeholder(
    pos: &SourcePosition,
    value: &Value,
    options: &[(String, String)],
) -> Result<String, WdlError> {
    let opt = |name: &str| options.iter().find(|(k, _)| k == name).map(|(_, v)| v);

    if value.is_null() {
        return Ok(opt("default").cloned().unwrap_or_default());
    }
    if let Some(sep) = opt("sep") {
        let items = value.as_array().ok_or_else(|| {
            WdlError::eval(pos.clone(), "sep placeholder applied to non-array value")
        })?;
        let rendered: Result<Vec<String>, WdlError> = items
            .iter()
            .map(|v| {
                v.coerce(&Type::string(false))
                    .map(|s| s.as_string().unwrap_or_default().to_string())
            })
            .collect();
        return Ok(rendered?.join(sep));
    }
    if let (Some(t), Some(f)) = (opt("true"), opt("false")) {
        let b = value
            .coerce(&Type::boolean(false))?
            .as_bool()
            .unwrap();
        return Ok(if b { t.clone() } else { f.clone() });
    }
    if value.as_array().is_some() {
        return Err(WdlError::eval(
            pos.clone(),
            "array placeholder requires the sep option",
        ));
    }
    Ok(value
        .coerce(&Type::string(false))?
        .as_string()
        .unwrap_or_default()
        .to_string())
}

/// Floor division matching the WDL arithmetic semantics (quotient rounds
/// toward negative infinity).
fn floor_div(pos: &SourcePosition, a: i64, b: i64) -> Result<i64, WdlError> {
    if b == 0 {
        return Err(WdlError::eval(pos.clone(), "division by zero"));
    }
    let q = a / b;
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q })
}

fn floor_rem(pos: &SourcePosition, a: i64, b: i64) -> Result<i64, WdlError> {
    if b == 0 {
        return Err(WdlError::eval(pos.clone(), "modulo by zero"));
    }
    let r = a % b;
    Ok(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
}

fn eval_binary(
    pos: &SourcePosition,
    op: BinaryOp,
    left: &Expression,
    right: &Expression,
    env: &Bindings<Value>,
    stdlib: &StdLib,
) -> Result<Value, WdlError> {
    // short-circuit logic first
    match op {
        BinaryOp::And => {
            let l = left.eval(env, stdlib)?.coerce(&Type::boolean(false))?;
            if !l.as_bool().unwrap() {
                return Ok(Value::boolean(false));
            }
            let r = right.eval(env, stdlib)?.coerce(&Type::boolean(false))?;
            return Ok(Value::boolean(r.as_bool().unwrap()));
        }
        BinaryOp::Or => {
            let l = left.eval(env, stdlib)?.coerce(&Type::boolean(false))?;
            if l.as_bool().unwrap() {
                return Ok(Value::boolean(true));
            }
            let r = right.eval(env, stdlib)?.coerce(&Type::boolean(false))?;
            return Ok(Value::boolean(r.as_bool().unwrap()));
        }
        _ => {}
    }

    let lv = left.eval(env, stdlib)?;
    let rv = right.eval(env, stdlib)?;

    match op {
        BinaryOp::Eq => Ok(Value::boolean(lv.equals(&rv))),
        BinaryOp::Neq => Ok(Value::boolean(!lv.equals(&rv))),

        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let ord = compare_values(pos, &lv, &rv)?;
            let b = match op {
                BinaryOp::Lt => ord == std::cmp::Ordering::Less,
                BinaryOp::Lte => ord != std::cmp::Ordering::Greater,
                BinaryOp::Gt => ord == std::cmp::Ordering::Greater,
                BinaryOp::Gte => ord != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::boolean(b))
        }

        BinaryOp::Add => match (&lv, &rv) {
            (Value::Int { value: a }, Value::Int { value: b }) => Ok(Value::int(a + b)),
            (Value::Null, _) | (_, Value::Null) => Err(WdlError::NullValue { pos: pos.clone() }),
            _ if lv.as_float().is_some() && rv.as_float().is_some() => Ok(Value::float(
                lv.as_float().unwrap() + rv.as_float().unwrap(),
            )),
            _ => {
                let a = lv.coerce(&Type::string(false))?;
                let b = rv.coerce(&Type::string(false))?;
                Ok(Value::string(format!(
                    "{}{}",
                    a.as_string().unwrap(),
                    b.as_string().unwrap()
                )))
            }
        },

        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            match (&lv, &rv) {
                (Value::Int { value: a }, Value::Int { value: b }) => {
                    let (a, b) = (*a, *b);
                    let n = match op {
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => floor_div(pos, a, b)?,
                        BinaryOp::Rem => floor_rem(pos, a, b)?,
                        _ => unreachable!(),
                    };
                    Ok(Value::int(n))
                }
                (Value::Null, _) | (_, Value::Null) => {
                    Err(WdlError::NullValue { pos: pos.clone() })
                }
                _ => {
                    let a = lv.as_float().ok_or_else(|| {
                        WdlError::eval(pos.clone(), format!("non-numeric operand {}", lv.wdl_type()))
                    })?;
                    let b = rv.as_float().ok_or_else(|| {
                        WdlError::eval(pos.clone(), format!("non-numeric operand {}", rv.wdl_type()))
                    })?;
                    let n = match op {
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => {
                            if b == 0.0 {
                                return Err(WdlError::eval(pos.clone(), "division by zero"));
                            }
                            a / b
                        }
                        BinaryOp::Rem => {
                            if b == 0.0 {
                                return Err(WdlError::eval(pos.clone(), "modulo by zero"));
                            }
                            a % b
                        }
                        _ => unreachable!(),
                    };
                    Ok(Value::float(n))
                }
            }
        }

        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

fn compare_values(
    pos: &SourcePosition,
    a: &Value,
    b: &Value,
) -> Result<std::cmp::Ordering, WdlError> {
    match (a, b) {
        (Value::Int { value: x }, Value::Int { value: y }) => Ok(x.cmp(y)),
        (Value::Boolean { value: x }, Value::Boolean { value: y }) => Ok(x.cmp(y)),
        (
            Value::String { value: x } | Value::File { value: x },
            Value::String { value: y } | Value::File { value: y },
        ) => Ok(x.cmp(y)),
        _ => {
            let (x, y) = (a.as_float(), b.as_float());
            match (x, y) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                    WdlError::eval(pos.clone(), "NaN is not comparable")
                }),
                _ => Err(WdlError::eval(
                    pos.clone(),
                    format!("cannot compare {} with {}", a.wdl_type(), b.wdl_type()),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::typecheck::TypeContext;
    use indexmap::IndexMap;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn eval(expr: &Expression, env: &Bindings<Value>) -> Result<Value, WdlError> {
        let stdlib = StdLib::base("1.0");
        expr.eval(env, &stdlib)
    }

    #[test]
    fn integer_arithmetic_floors() {
        let env = Bindings::new();
        let div = Expression::binary(
            pos(),
            BinaryOp::Div,
            Expression::int(pos(), 7),
            Expression::int(pos(), 2),
        );
        assert_eq!(eval(&div, &env).unwrap().as_int(), Some(3));

        let neg = Expression::binary(
            pos(),
            BinaryOp::Div,
            Expression::int(pos(), -7),
            Expression::int(pos(), 2),
        );
        assert_eq!(eval(&neg, &env).unwrap().as_int(), Some(-4));

        let rem = Expression::binary(
            pos(),
            BinaryOp::Rem,
            Expression::int(pos(), -7),
            Expression::int(pos(), 2),
        );
        assert_eq!(eval(&rem, &env).unwrap().as_int(), Some(1));
    }

    #[test]
    fn division_by_zero() {
        let env = Bindings::new();
        let div = Expression::binary(
            pos(),
            BinaryOp::Div,
            Expression::int(pos(), 1),
            Expression::int(pos(), 0),
        );
        assert!(eval(&div, &env).is_err());
    }

    #[test]
    fn float_promotion() {
        let env = Bindings::new();
        let e = Expression::binary(
            pos(),
            BinaryOp::Div,
            Expression::int(pos(), 7),
            Expression::float(pos(), 2.0),
        );
        assert_eq!(eval(&e, &env).unwrap().as_float(), Some(3.5));
    }

    #[test]
    fn short_circuit_and() {
        // x is unbound; && must not evaluate the right side
        let env = Bindings::new();
        let e = Expression::binary(
            pos(),
            BinaryOp::And,
            Expression::boolean(pos(), false),
            Expression::ident(pos(), "unbound"),
        );
        assert_eq!(eval(&e, &env).unwrap().as_bool(), Some(false));

        let o = Expression::binary(
            pos(),
            BinaryOp::Or,
            Expression::boolean(pos(), true),
            Expression::ident(pos(), "unbound"),
        );
        assert_eq!(eval(&o, &env).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn string_concat_coerces() {
        let env = Bindings::new();
        let e = Expression::binary(
            pos(),
            BinaryOp::Add,
            Expression::string_literal(pos(), "n="),
            Expression::int(pos(), 3),
        );
        assert_eq!(eval(&e, &env).unwrap().as_string(), Some("n=3"));
    }

    #[test]
    fn comparisons() {
        let env = Bindings::new();
        let e = Expression::binary(
            pos(),
            BinaryOp::Lte,
            Expression::int(pos(), 2),
            Expression::float(pos(), 2.5),
        );
        assert_eq!(eval(&e, &env).unwrap().as_bool(), Some(true));

        let s = Expression::binary(
            pos(),
            BinaryOp::Lt,
            Expression::string_literal(pos(), "abc"),
            Expression::string_literal(pos(), "abd"),
        );
        assert_eq!(eval(&s, &env).unwrap().as_bool(), Some(true));
    }

    #[test]
    fn out_of_bounds() {
        let env = Bindings::new().bind(
            "xs".to_string(),
            Value::array(Type::int(false), vec![Value::int(1)]),
            None,
        );
        let e = Expression::at(
            pos(),
            Expression::ident(pos(), "xs"),
            Expression::int(pos(), 5),
        );
        assert!(matches!(eval(&e, &env), Err(WdlError::OutOfBounds { .. })));
    }

    #[test]
    fn map_lookup_and_miss() {
        let env = Bindings::new().bind(
            "m".to_string(),
            Value::map(
                Type::string(false),
                Type::int(false),
                vec![(Value::string("a"), Value::int(1))],
            ),
            None,
        );
        let hit = Expression::at(
            pos(),
            Expression::ident(pos(), "m"),
            Expression::string_literal(pos(), "a"),
        );
        assert_eq!(eval(&hit, &env).unwrap().as_int(), Some(1));
        let miss = Expression::at(
            pos(),
            Expression::ident(pos(), "m"),
            Expression::string_literal(pos(), "b"),
        );
        assert!(matches!(eval(&miss, &env), Err(WdlError::OutOfBounds { .. })));
    }

    #[test]
    fn interpolation_with_options() {
        let env = Bindings::new()
            .bind(
                "xs".to_string(),
                Value::array(
                    Type::int(false),
                    vec![Value::int(1), Value::int(2), Value::int(3)],
                ),
                None,
            )
            .bind("maybe".to_string(), Value::null(), None)
            .bind("flag".to_string(), Value::boolean(true), None);

        let sep = Expression::string(
            pos(),
            vec![StringPart::Placeholder {
                options: vec![("sep".to_string(), ",".to_string())],
                expr: Box::new(Expression::ident(pos(), "xs")),
            }],
        );
        assert_eq!(eval(&sep, &env).unwrap().as_string(), Some("1,2,3"));

        let default = Expression::string(
            pos(),
            vec![StringPart::Placeholder {
                options: vec![("default".to_string(), "n/a".to_string())],
                expr: Box::new(Expression::ident(pos(), "maybe")),
            }],
        );
        assert_eq!(eval(&default, &env).unwrap().as_string(), Some("n/a"));

        let tf = Expression::string(
            pos(),
            vec![StringPart::Placeholder {
                options: vec![
                    ("true".to_string(), "--yes".to_string()),
                    ("false".to_string(), "".to_string()),
                ],
                expr: Box::new(Expression::ident(pos(), "flag")),
            }],
        );
        assert_eq!(eval(&tf, &env).unwrap().as_string(), Some("--yes"));
    }

    #[test]
    fn if_then_else_coerces_to_join() {
        let env = Bindings::new();
        let stdlib = StdLib::base("1.0");
        let structs = IndexMap::new();
        let tenv: Bindings<Type> = Bindings::new();
        let ctx = TypeContext::new(&tenv, &stdlib, &structs);
        let mut e = Expression::if_then_else(
            pos(),
            Expression::boolean(pos(), true),
            Expression::int(pos(), 1),
            Expression::float(pos(), 0.5),
        );
        e.infer_type(&ctx).unwrap();
        let v = e.eval(&env, &stdlib).unwrap();
        assert!(matches!(v, Value::Float { .. }));
    }

    #[test]
    fn pair_member_access() {
        let env = Bindings::new().bind(
            "p".to_string(),
            Value::pair(Value::int(1), Value::string("x")),
            None,
        );
        let e = Expression::ident(pos(), "p.left");
        assert_eq!(eval(&e, &env).unwrap().as_int(), Some(1));
    }
}
