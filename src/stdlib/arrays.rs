//! Array manipulation builtins, most with element-polymorphic signatures.

use super::{check_arity, eval_args, Function, StaticFunction, StdLib};
use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::typecheck::TypeContext;
use crate::expr::Expression;
use crate::types::{unify, Type};
use crate::value::Value;

pub fn register(lib: &mut StdLib) {
    lib.register(StaticFunction::new(
        "range",
        vec![Type::int(false)],
        Type::array(Type::int(false), false, false),
        |pos, args| {
            let n = args[0].as_int().unwrap();
            if n < 0 {
                return Err(WdlError::eval(pos.clone(), "range() of negative length"));
            }
            Ok(Value::array(
                Type::int(false),
                (0..n).map(Value::int).collect(),
            ))
        },
    ));
    lib.register(Box::new(Length));
    lib.register(Box::new(SelectFirst));
    lib.register(Box::new(SelectAll));
    lib.register(Box::new(Flatten));
    lib.register(Box::new(Transpose));
    lib.register(Box::new(ZipCross { cross: false }));
    lib.register(Box::new(ZipCross { cross: true }));
    lib.register(Box::new(Unzip));
    lib.register(Box::new(Affix { prefix: true }));
    lib.register(Box::new(Affix { prefix: false }));
}

/// Validate that the sole argument is an array, returning its item type.
fn array_item_type(
    function: &str,
    pos: &SourcePosition,
    args: &mut [Expression],
    ctx: &TypeContext<'_>,
) -> Result<Type, WdlError> {
    check_arity(pos, function, args, 1, 1)?;
    match args[0].infer_type(ctx)? {
        Type::Array { item, .. } => Ok(*item),
        Type::Any { .. } => Ok(Type::any()),
        other => Err(WdlError::static_mismatch(
            args[0].pos().clone(),
            "Array".to_string(),
            other.to_string(),
            "",
        )),
    }
}

fn expect_array(pos: &SourcePosition, v: &Value) -> Result<Vec<Value>, WdlError> {
    v.as_array()
        .map(|s| s.to_vec())
        .ok_or_else(|| WdlError::eval(pos.clone(), "expected an array value"))
}

struct Length;

impl Function for Length {
    fn name(&self) -> &str {
        "length"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        array_item_type("length", pos, args, ctx)?;
        Ok(Type::int(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        Ok(Value::int(expect_array(pos, &v)?.len() as i64))
    }
}

/// `select_first(Array[T?][, default])`: first non-null element.
struct SelectFirst;

impl Function for SelectFirst {
    fn name(&self) -> &str {
        "select_first"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "select_first", args, 1, 2)?;
        let item = match args[0].infer_type(ctx)? {
            Type::Array { item, .. } => *item,
            Type::Any { .. } => Type::any(),
            other => {
                return Err(WdlError::static_mismatch(
                    args[0].pos().clone(),
                    "Array".to_string(),
                    other.to_string(),
                    "",
                ))
            }
        };
        if args.len() == 2 {
            let (first, rest) = args.split_at_mut(1);
            let _ = first;
            rest[0].infer_type(ctx)?;
        }
        Ok(item.with_optional(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let values = eval_args(args, env, stdlib)?;
        let items = expect_array(pos, &values[0])?;
        for item in &items {
            if !item.is_null() {
                return Ok(item.clone());
            }
        }
        if let Some(default) = values.get(1) {
            if !default.is_null() {
                return Ok(default.clone());
            }
        }
        Err(WdlError::eval(
            pos.clone(),
            "select_first() found no non-null element",
        ))
    }
}

struct SelectAll;

impl Function for SelectAll {
    fn name(&self) -> &str {
        "select_all"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let item = array_item_type("select_all", pos, args, ctx)?;
        Ok(Type::array(item.with_optional(false), false, false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let items = expect_array(pos, &v)?;
        let kept: Vec<Value> = items.into_iter().filter(|v| !v.is_null()).collect();
        let item_type = match v.wdl_type() {
            Type::Array { item, .. } => item.with_optional(false),
            _ => Type::any(),
        };
        Ok(Value::array(item_type, kept))
    }
}

struct Flatten;

impl Function for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let item = array_item_type("flatten", pos, args, ctx)?;
        match item {
            Type::Array { item: inner, .. } => Ok(Type::array(*inner, false, false)),
            Type::Any { .. } => Ok(Type::array(Type::any(), false, false)),
            other => Err(WdlError::static_mismatch(
                args[0].pos().clone(),
                "Array[Array[T]]".to_string(),
                format!("Array[{}]", other),
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
        let outer = expect_array(pos, &v)?;
        let mut out = Vec::new();
        let mut item_type = Type::any();
        for inner in outer {
            let items = expect_array(pos, &inner)?;
            if let Type::Array { item, .. } = inner.wdl_type() {
                item_type = *item;
            }
            out.extend(items);
        }
        Ok(Value::array(item_type, out))
    }
}

struct Transpose;

impl Function for Transpose {
    fn name(&self) -> &str {
        "transpose"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let item = array_item_type("transpose", pos, args, ctx)?;
        match item {
            Type::Array { .. } => Ok(Type::array(item, false, false)),
            Type::Any { .. } => Ok(Type::array(Type::any(), false, false)),
            other => Err(WdlError::static_mismatch(
                args[0].pos().clone(),
                "Array[Array[T]]".to_string(),
                format!("Array[{}]", other),
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
        let rows: Vec<Vec<Value>> = expect_array(pos, &v)?
            .into_iter()
            .map(|row| expect_array(pos, &row))
            .collect::<Result<_, _>>()?;
        let inner_type = match v.wdl_type() {
            Type::Array { item, .. } => match *item {
                Type::Array { item: inner, .. } => *inner,
                _ => Type::any(),
            },
            _ => Type::any(),
        };
        if rows.is_empty() {
            return Ok(Value::array(
                Type::array(inner_type, false, false),
                vec![],
            ));
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(WdlError::eval(
                pos.clone(),
                "transpose() of ragged array",
            ));
        }
        let mut cols = Vec::with_capacity(width);
        for i in 0..width {
            let col: Vec<Value> = rows.iter().map(|r| r[i].clone()).collect();
            cols.push(Value::array(inner_type.clone(), col));
        }
        Ok(Value::array(Type::array(inner_type, false, false), cols))
    }
}

/// `zip` pairs elements positionally; `cross` forms the cartesian product.
struct ZipCross {
    cross: bool,
}

impl Function for ZipCross {
    fn name(&self) -> &str {
        if self.cross {
            "cross"
        } else {
            "zip"
        }
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name(), args, 2, 2)?;
        let mut item_types = Vec::new();
        for arg in args.iter_mut() {
            match arg.infer_type(ctx)? {
                Type::Array { item, .. } => item_types.push(*item),
                Type::Any { .. } => item_types.push(Type::any()),
                other => {
                    return Err(WdlError::static_mismatch(
                        arg.pos().clone(),
                        "Array".to_string(),
                        other.to_string(),
                        "",
                    ))
                }
            }
        }
        let right = item_types.pop().unwrap();
        let left = item_types.pop().unwrap();
        Ok(Type::array(Type::pair(left, right, false), false, false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let values = eval_args(args, env, stdlib)?;
        let left = expect_array(pos, &values[0])?;
        let right = expect_array(pos, &values[1])?;
        let lt = match values[0].wdl_type() {
            Type::Array { item, .. } => *item,
            _ => Type::any(),
        };
        let rt = match values[1].wdl_type() {
            Type::Array { item, .. } => *item,
            _ => Type::any(),
        };
        let pair_type = Type::pair(lt, rt, false);
        let mut out = Vec::new();
        if self.cross {
            for l in &left {
                for r in &right {
                    out.push(Value::pair(l.clone(), r.clone()));
                }
            }
        } else {
            if left.len() != right.len() {
                return Err(WdlError::eval(
                    pos.clone(),
                    format!(
                        "zip() arrays of unequal length ({} vs {})",
                        left.len(),
                        right.len()
                    ),
                ));
            }
            for (l, r) in left.into_iter().zip(right) {
                out.push(Value::pair(l, r));
            }
        }
        Ok(Value::array(pair_type, out))
    }
}

struct Unzip;

impl Function for Unzip {
    fn name(&self) -> &str {
        "unzip"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let item = array_item_type("unzip", pos, args, ctx)?;
        match item {
            Type::Pair { left, right, .. } => Ok(Type::pair(
                Type::array(*left, false, false),
                Type::array(*right, false, false),
                false,
            )),
            Type::Any { .. } => Ok(Type::pair(
                Type::array(Type::any(), false, false),
                Type::array(Type::any(), false, false),
                false,
            )),
            other => Err(WdlError::static_mismatch(
                args[0].pos().clone(),
                "Array[Pair[L,R]]".to_string(),
                format!("Array[{}]", other),
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
        let pairs = expect_array(pos, &v)?;
        let mut lefts = Vec::new();
        let mut rights = Vec::new();
        for p in &pairs {
            let (l, r) = p
                .as_pair()
                .ok_or_else(|| WdlError::eval(pos.clone(), "unzip() of non-pair element"))?;
            lefts.push(l.clone());
            rights.push(r.clone());
        }
        let (lt, rt) = match v.wdl_type() {
            Type::Array { item, .. } => match *item {
                Type::Pair { left, right, .. } => (*left, *right),
                _ => (Type::any(), Type::any()),
            },
            _ => (Type::any(), Type::any()),
        };
        Ok(Value::pair(
            Value::array(lt, lefts),
            Value::array(rt, rights),
        ))
    }
}

/// `prefix` / `suffix`: affix a string to each stringified element.
struct Affix {
    prefix: bool,
}

impl Function for Affix {
    fn name(&self) -> &str {
        if self.prefix {
            "prefix"
        } else {
            "suffix"
        }
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, self.name(), args, 2, 2)?;
        args[0].typecheck(&Type::string(false), ctx)?;
        match args[1].infer_type(ctx)? {
            Type::Array { item, .. } if item.coerces(&Type::string(false), ctx.check_quant) => {
                Ok(Type::array(Type::string(false), false, false))
            }
            Type::Any { .. } => Ok(Type::array(Type::string(false), false, false)),
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
        let affix = values[0]
            .coerce(&Type::string(false))?
            .as_string()
            .unwrap()
            .to_string();
        let items = expect_array(pos, &values[1])?;
        let out: Result<Vec<Value>, WdlError> = items
            .iter()
            .map(|v| {
                let s = v.coerce(&Type::string(false))?;
                let s = s.as_string().unwrap();
                Ok(Value::string(if self.prefix {
                    format!("{}{}", affix, s)
                } else {
                    format!("{}{}", s, affix)
                }))
            })
            .collect();
        Ok(Value::array(Type::string(false), out?))
    }
}

/// Common supertype of evaluated array elements (used by literal helpers).
pub fn unify_value_types(values: &[Value]) -> Type {
    let types: Vec<Type> = values.iter().map(|v| v.wdl_type()).collect();
    let refs: Vec<&Type> = types.iter().collect();
    unify(&refs, true, false)
}
