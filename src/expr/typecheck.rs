//! Static type inference for expressions.
//!
//! [`Expression::infer_type`] decorates the AST with types bottom-up. It
//! needs a [`TypeContext`]: the type environment, the standard library (for
//! `Apply` signatures), the document's resolved struct typedefs, and the
//! `check_quant` mode controlling optional/nonempty quantifier enforcement.

use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::{BinaryOp, Expression, StringPart, UnaryOp};
use crate::stdlib::StdLib;
use crate::types::{unify, Type};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Everything expression inference needs to know about its surroundings.
pub struct TypeContext<'a> {
    pub env: &'a Bindings<Type>,
    pub stdlib: &'a StdLib,
    pub structs: &'a IndexMap<String, IndexMap<String, Type>>,
    pub check_quant: bool,
}

impl<'a> TypeContext<'a> {
    pub fn new(
        env: &'a Bindings<Type>,
        stdlib: &'a StdLib,
        structs: &'a IndexMap<String, IndexMap<String, Type>>,
    ) -> Self {
        Self {
            env,
            stdlib,
            structs,
            check_quant: true,
        }
    }

    pub fn with_check_quant(mut self, check_quant: bool) -> Self {
        self.check_quant = check_quant;
        self
    }

    /// Same context over a different type environment.
    pub fn with_env(&self, env: &'a Bindings<Type>) -> TypeContext<'a> {
        TypeContext {
            env,
            stdlib: self.stdlib,
            structs: self.structs,
            check_quant: self.check_quant,
        }
    }
}

impl Expression {
    /// The statically-known type: the inference cache where present, or the
    /// intrinsic type of a literal.
    pub fn static_type(&self) -> Option<Type> {
        match self {
            Expression::Boolean { .. } => Some(Type::boolean(false)),
            Expression::Int { .. } => Some(Type::int(false)),
            Expression::Float { .. } => Some(Type::float(false)),
            Expression::Null { .. } => Some(Type::none()),
            other => other.get_type().cloned(),
        }
    }

    /// Infer this expression's type, caching it on the node, and validate
    /// child expressions along the way.
    pub fn infer_type(&mut self, ctx: &TypeContext<'_>) -> Result<Type, WdlError> {
        let inferred = match self {
            Expression::Boolean { .. } => Type::boolean(false),
            Expression::Int { .. } => Type::int(false),
            Expression::Float { .. } => Type::float(false),
            Expression::Null { .. } => Type::none(),

            Expression::Str { parts, ty, .. } => {
                for part in parts.iter_mut() {
                    if let StringPart::Placeholder { options, expr } = part {
                        let expr_ty = expr.infer_type(ctx)?;
                        check_placeholder_options(expr.pos(), options, &expr_ty, ctx.check_quant)?;
                    }
                }
                let t = Type::string(false);
                *ty = Some(t.clone());
                t
            }

            Expression::Array { pos, items, ty } => {
                let mut item_types = Vec::new();
                for item in items.iter_mut() {
                    item_types.push(item.infer_type(ctx)?);
                }
                let t = if item_types.is_empty() {
                    Type::array(Type::any(), false, false)
                } else {
                    let refs: Vec<&Type> = item_types.iter().collect();
                    let unified = unify(&refs, ctx.check_quant, true);
                    if matches!(unified, Type::Any { optional: false }) {
                        return Err(WdlError::IndeterminateType {
                            pos: pos.clone(),
                            message: "array elements have no common type".to_string(),
                        });
                    }
                    Type::array(unified, false, true)
                };
                *ty = Some(t.clone());
                t
            }

            Expression::Pair {
                left, right, ty, ..
            } => {
                let lt = left.infer_type(ctx)?;
                let rt = right.infer_type(ctx)?;
                let t = Type::pair(lt, rt, false);
                *ty = Some(t.clone());
                t
            }

            Expression::Map { pairs, ty, pos } => {
                let mut key_types = Vec::new();
                let mut value_types = Vec::new();
                let mut literal_keys: Option<HashSet<String>> = Some(HashSet::new());
                for (k, v) in pairs.iter_mut() {
                    key_types.push(k.infer_type(ctx)?);
                    value_types.push(v.infer_type(ctx)?);
                    let lit_key = k
                        .literal()
                        .and_then(|l| l.as_string().map(|s| s.to_string()));
                    literal_keys = match (lit_key, literal_keys.take()) {
                        (Some(s), Some(mut keys)) => {
                            keys.insert(s);
                            Some(keys)
                        }
                        _ => None,
                    };
                }
                let key_refs: Vec<&Type> = key_types.iter().collect();
                let value_refs: Vec<&Type> = value_types.iter().collect();
                let kt = unify(&key_refs, ctx.check_quant, true);
                let vt = unify(&value_refs, ctx.check_quant, true);
                if !pairs.is_empty() && matches!(kt, Type::Any { optional: false }) {
                    return Err(WdlError::IndeterminateType {
                        pos: pos.clone(),
                        message: "map keys have no common type".to_string(),
                    });
                }
                let t = match literal_keys {
                    Some(keys) if !pairs.is_empty() => {
                        Type::map_with_literal_keys(kt, vt, false, keys)
                    }
                    _ => Type::map(kt, vt, false),
                };
                *ty = Some(t.clone());
                t
            }

            Expression::Struct {
                pos,
                name,
                members,
                ty,
            } => {
                let mut member_types: IndexMap<String, Type> = IndexMap::new();
                for (k, v) in members.iter_mut() {
                    let vt = v.infer_type(ctx)?;
                    if member_types.insert(k.clone(), vt).is_some() {
                        return Err(WdlError::MultipleDefinitions {
                            pos: pos.clone(),
                            message: format!("duplicate member {}", k),
                        });
                    }
                }
                let t = match name {
                    Some(struct_name) => {
                        let defined = ctx.structs.get(struct_name).ok_or_else(|| {
                            WdlError::InvalidType {
                                pos: pos.clone(),
                                message: format!("Unknown struct type {}", struct_name),
                            }
                        })?;
                        for (member_name, member_ty) in &member_types {
                            match defined.get(member_name) {
                                Some(expected) => {
                                    if !member_ty.coerces(expected, ctx.check_quant) {
                                        return Err(WdlError::static_mismatch(
                                            pos.clone(),
                                            expected.to_string(),
                                            member_ty.to_string(),
                                            "",
                                        ));
                                    }
                                }
                                None => {
                                    return Err(WdlError::NoSuchMember {
                                        pos: pos.clone(),
                                        member: member_name.clone(),
                                    })
                                }
                            }
                        }
                        for (member_name, member_ty) in defined {
                            if !member_types.contains_key(member_name) && !member_ty.is_optional() {
                                return Err(WdlError::validation(
                                    pos.clone(),
                                    format!("missing non-optional member {}", member_name),
                                ));
                            }
                        }
                        Type::StructInstance {
                            name: struct_name.clone(),
                            members: Some(defined.clone()),
                            optional: false,
                        }
                    }
                    None => Type::object(member_types),
                };
                *ty = Some(t.clone());
                t
            }

            Expression::Ident {
                pos,
                name,
                resolved_prefix,
                ty,
            } => {
                let (t, prefix) = resolve_dotted(pos, name, ctx)?;
                *resolved_prefix = Some(prefix);
                *ty = Some(t.clone());
                t
            }

            Expression::At {
                pos,
                expr,
                index,
                ty,
            } => {
                let base_ty = expr.infer_type(ctx)?;
                let index_ty = index.infer_type(ctx)?;
                let t = match &base_ty {
                    Type::Array { item, .. } => {
                        if !index_ty.coerces(&Type::int(false), ctx.check_quant) {
                            return Err(WdlError::static_mismatch(
                                index.pos().clone(),
                                "Int".to_string(),
                                index_ty.to_string(),
                                "",
                            ));
                        }
                        (**item).clone()
                    }
                    Type::Map { key, value, .. } => {
                        if !index_ty.coerces(key, ctx.check_quant) {
                            return Err(WdlError::static_mismatch(
                                index.pos().clone(),
                                key.to_string(),
                                index_ty.to_string(),
                                "",
                            ));
                        }
                        (**value).clone()
                    }
                    Type::Any { .. } => Type::any(),
                    _ => {
                        return Err(WdlError::NotAnArray { pos: pos.clone() });
                    }
                };
                *ty = Some(t.clone());
                t
            }

            Expression::GetMember {
                pos,
                expr,
                member,
                ty,
            } => {
                let base_ty = expr.infer_type(ctx)?;
                let t = member_type(pos, &base_ty, member)?;
                *ty = Some(t.clone());
                t
            }

            Expression::IfThenElse {
                pos,
                condition,
                consequent,
                alternative,
                ty,
            } => {
                let cond_ty = condition.infer_type(ctx)?;
                if !cond_ty.coerces(&Type::boolean(false), ctx.check_quant) {
                    return Err(WdlError::static_mismatch(
                        condition.pos().clone(),
                        "Boolean".to_string(),
                        cond_ty.to_string(),
                        "",
                    ));
                }
                let then_ty = consequent.infer_type(ctx)?;
                let else_ty = alternative.infer_type(ctx)?;
                let t = match (&then_ty, &else_ty) {
                    (Type::Any { optional: true }, other) => other.clone().with_optional(true),
                    (other, Type::Any { optional: true }) => other.clone().with_optional(true),
                    _ => {
                        let joined = unify(&[&then_ty, &else_ty], ctx.check_quant, false);
                        if matches!(joined, Type::Any { optional: false }) {
                            return Err(WdlError::static_mismatch(
                                pos.clone(),
                                then_ty.to_string(),
                                else_ty.to_string(),
                                "if/else branches have incompatible types",
                            ));
                        }
                        joined
                    }
                };
                *ty = Some(t.clone());
                t
            }

            Expression::Apply {
                pos,
                function,
                arguments,
                ty,
            } => {
                let f = ctx
                    .stdlib
                    .get_function(function)
                    .ok_or_else(|| WdlError::NoSuchFunction {
                        pos: pos.clone(),
                        name: function.clone(),
                    })?;
                let t = f.infer_type(pos, arguments, ctx)?;
                *ty = Some(t.clone());
                t
            }

            Expression::Binary {
                pos,
                op,
                left,
                right,
                ty,
            } => {
                let lt = left.infer_type(ctx)?;
                let rt = right.infer_type(ctx)?;
                let t = infer_binary(pos, *op, &lt, &rt, ctx.check_quant)?;
                *ty = Some(t.clone());
                t
            }

            Expression::Unary {
                pos, op, operand, ty, ..
            } => {
                let ot = operand.infer_type(ctx)?;
                let t = match op {
                    UnaryOp::Not => {
                        if !ot.coerces(&Type::boolean(false), ctx.check_quant) {
                            return Err(WdlError::IncompatibleOperand {
                                pos: pos.clone(),
                                message: format!("! applied to {}", ot),
                            });
                        }
                        Type::boolean(false)
                    }
                    UnaryOp::Neg => match ot {
                        Type::Int { .. } => Type::int(false),
                        Type::Float { .. } => Type::float(false),
                        other => {
                            return Err(WdlError::IncompatibleOperand {
                                pos: pos.clone(),
                                message: format!("- applied to {}", other),
                            })
                        }
                    },
                };
                *ty = Some(t.clone());
                t
            }
        };
        Ok(inferred)
    }

    /// Infer, then require coercibility to `expected`.
    pub fn typecheck(&mut self, expected: &Type, ctx: &TypeContext<'_>) -> Result<Type, WdlError> {
        let actual = self.infer_type(ctx)?;
        if !actual.coerces(expected, ctx.check_quant) {
            return Err(WdlError::static_mismatch(
                self.pos().clone(),
                expected.to_string(),
                actual.to_string(),
                "",
            ));
        }
        Ok(actual)
    }
}

/// Resolve a possibly dotted identifier against the environment: the longest
/// bound prefix wins and the remaining segments are member accesses.
fn resolve_dotted(
    pos: &SourcePosition,
    name: &str,
    ctx: &TypeContext<'_>,
) -> Result<(Type, String), WdlError> {
    if let Some(t) = ctx.env.resolve(name) {
        return Ok((t.clone(), name.to_string()));
    }
    let parts: Vec<&str> = name.split('.').collect();
    for split in (1..parts.len()).rev() {
        let prefix = parts[..split].join(".");
        if let Some(bound) = ctx.env.resolve(&prefix) {
            let mut t = bound.clone();
            for member in &parts[split..] {
                t = member_type(pos, &t, member)?;
            }
            return Ok((t, prefix));
        }
    }
    Err(WdlError::UnknownIdentifier {
        pos: pos.clone(),
        name: name.to_string(),
    })
}

/// The type of `base.member`.
fn member_type(pos: &SourcePosition, base: &Type, member: &str) -> Result<Type, WdlError> {
    match base {
        Type::StructInstance {
            members: Some(members),
            ..
        } => members.get(member).cloned().ok_or_else(|| WdlError::NoSuchMember {
            pos: pos.clone(),
            member: member.to_string(),
        }),
        Type::Object { members } => {
            members.get(member).cloned().ok_or_else(|| WdlError::NoSuchMember {
                pos: pos.clone(),
                member: member.to_string(),
            })
        }
        Type::Pair { left, right, .. } => match member {
            "left" => Ok((**left).clone()),
            "right" => Ok((**right).clone()),
            _ => Err(WdlError::NoSuchMember {
                pos: pos.clone(),
                member: member.to_string(),
            }),
        },
        Type::Any { .. } => Ok(Type::any()),
        _ => Err(WdlError::NoSuchMember {
            pos: pos.clone(),
            member: member.to_string(),
        }),
    }
}

fn check_placeholder_options(
    pos: &SourcePosition,
    options: &[(String, String)],
    expr_ty: &Type,
    check_quant: bool,
) -> Result<(), WdlError> {
    let has = |name: &str| options.iter().any(|(k, _)| k == name);
    if has("sep") {
        if !matches!(expr_ty, Type::Array { .. } | Type::Any { .. }) {
            return Err(WdlError::static_mismatch(
                pos.clone(),
                "Array".to_string(),
                expr_ty.to_string(),
                "sep placeholder option requires an Array",
            ));
        }
    } else if has("true") || has("false") {
        if !(has("true") && has("false")) {
            return Err(WdlError::validation(
                pos.clone(),
                "true/false placeholder options must be paired",
            ));
        }
        if !expr_ty.coerces(&Type::boolean(false), check_quant) {
            return Err(WdlError::static_mismatch(
                pos.clone(),
                "Boolean".to_string(),
                expr_ty.to_string(),
                "true/false placeholder options require a Boolean",
            ));
        }
    } else if has("default") {
        if !expr_ty.is_optional() && !matches!(expr_ty, Type::Any { .. }) {
            return Err(WdlError::validation(
                pos.clone(),
                "default placeholder option requires an optional type",
            ));
        }
    } else if !expr_ty.coerces(&Type::string(true), false) {
        return Err(WdlError::static_mismatch(
            pos.clone(),
            "String".to_string(),
            expr_ty.to_string(),
            "placeholder expression cannot be converted to String",
        ));
    }
    Ok(())
}

fn infer_binary(
    pos: &SourcePosition,
    op: BinaryOp,
    lt: &Type,
    rt: &Type,
    check_quant: bool,
) -> Result<Type, WdlError> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            for t in [lt, rt] {
                if !t.coerces(&Type::boolean(false), check_quant) {
                    return Err(WdlError::IncompatibleOperand {
                        pos: pos.clone(),
                        message: format!("{} operand is {}, not Boolean", op.symbol(), t),
                    });
                }
            }
            Ok(Type::boolean(false))
        }
        BinaryOp::Eq | BinaryOp::Neq => {
            if !lt.equatable(rt) {
                return Err(WdlError::IncompatibleOperand {
                    pos: pos.clone(),
                    message: format!("cannot compare {} {} {}", lt, op.symbol(), rt),
                });
            }
            Ok(Type::boolean(false))
        }
        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            if !lt.comparable(rt, check_quant) {
                return Err(WdlError::IncompatibleOperand {
                    pos: pos.clone(),
                    message: format!("cannot compare {} {} {}", lt, op.symbol(), rt),
                });
            }
            Ok(Type::boolean(false))
        }
        BinaryOp::Add => {
            // numeric addition, or string concatenation when either side is
            // already String-typed
            match (lt, rt) {
                (Type::Int { .. }, Type::Int { .. }) => Ok(Type::int(false)),
                (
                    Type::Int { .. } | Type::Float { .. },
                    Type::Int { .. } | Type::Float { .. },
                ) => Ok(Type::float(false)),
                _ => {
                    let stringish = matches!(lt, Type::String { .. } | Type::File { .. })
                        || matches!(rt, Type::String { .. } | Type::File { .. });
                    if stringish
                        && lt.coerces(&Type::string(true), false)
                        && rt.coerces(&Type::string(true), false)
                    {
                        Ok(Type::string(false))
                    } else if matches!(lt, Type::Any { .. }) || matches!(rt, Type::Any { .. }) {
                        Ok(Type::any())
                    } else {
                        Err(WdlError::IncompatibleOperand {
                            pos: pos.clone(),
                            message: format!("cannot add {} + {}", lt, rt),
                        })
                    }
                }
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => match (lt, rt) {
            (Type::Int { .. }, Type::Int { .. }) => Ok(Type::int(false)),
            (
                Type::Int { .. } | Type::Float { .. },
                Type::Int { .. } | Type::Float { .. },
            ) => Ok(Type::float(false)),
            (Type::Any { .. }, _) | (_, Type::Any { .. }) => Ok(Type::any()),
            _ => Err(WdlError::IncompatibleOperand {
                pos: pos.clone(),
                message: format!("non-numeric operands to {}: {}, {}", op.symbol(), lt, rt),
            }),
        },
    }
}
