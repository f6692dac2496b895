//! Map manipulation builtins.

use super::{check_arity, eval_args, Function, StdLib};
use crate::env::Bindings;
use crate::error::{SourcePosition, WdlError};
use crate::expr::typecheck::TypeContext;
use crate::expr::Expression;
use crate::types::Type;
use crate::value::Value;

pub fn register(lib: &mut StdLib) {
    lib.register(Box::new(Keys));
    lib.register(Box::new(Values));
    lib.register(Box::new(AsPairs));
    lib.register(Box::new(AsMap));
    lib.register(Box::new(CollectByKey));
    lib.register(Box::new(ContainsKey));
}

fn map_types(
    function: &str,
    pos: &SourcePosition,
    args: &mut [Expression],
    ctx: &TypeContext<'_>,
) -> Result<(Type, Type), WdlError> {
    check_arity(pos, function, args, 1, 1)?;
    match args[0].infer_type(ctx)? {
        Type::Map { key, value, .. } => Ok((*key, *value)),
        Type::Any { .. } => Ok((Type::any(), Type::any())),
        other => Err(WdlError::static_mismatch(
            args[0].pos().clone(),
            "Map".to_string(),
            other.to_string(),
            "",
        )),
    }
}

fn pair_item_types(
    function: &str,
    pos: &SourcePosition,
    args: &mut [Expression],
    ctx: &TypeContext<'_>,
) -> Result<(Type, Type), WdlError> {
    check_arity(pos, function, args, 1, 1)?;
    match args[0].infer_type(ctx)? {
        Type::Array { item, .. } => match *item {
            Type::Pair { left, right, .. } => Ok((*left, *right)),
            Type::Any { .. } => Ok((Type::any(), Type::any())),
            other => Err(WdlError::static_mismatch(
                args[0].pos().clone(),
                "Array[Pair[K,V]]".to_string(),
                format!("Array[{}]", other),
                "",
            )),
        },
        Type::Any { .. } => Ok((Type::any(), Type::any())),
        other => Err(WdlError::static_mismatch(
            args[0].pos().clone(),
            "Array[Pair[K,V]]".to_string(),
            other.to_string(),
            "",
        )),
    }
}

struct Keys;

impl Function for Keys {
    fn name(&self) -> &str {
        "keys"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let (k, _) = map_types("keys", pos, args, ctx)?;
        Ok(Type::array(k, false, false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let pairs = v
            .as_map_pairs()
            .ok_or_else(|| WdlError::eval(pos.clone(), "keys() of non-map"))?;
        let kt = match v.wdl_type() {
            Type::Map { key, .. } => *key,
            _ => Type::any(),
        };
        Ok(Value::array(
            kt,
            pairs.iter().map(|(k, _)| k.clone()).collect(),
        ))
    }
}

struct Values;

impl Function for Values {
    fn name(&self) -> &str {
        "values"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let (_, v) = map_types("values", pos, args, ctx)?;
        Ok(Type::array(v, false, false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let pairs = v
            .as_map_pairs()
            .ok_or_else(|| WdlError::eval(pos.clone(), "values() of non-map"))?;
        let vt = match v.wdl_type() {
            Type::Map { value, .. } => *value,
            _ => Type::any(),
        };
        Ok(Value::array(
            vt,
            pairs.iter().map(|(_, v)| v.clone()).collect(),
        ))
    }
}

struct AsPairs;

impl Function for AsPairs {
    fn name(&self) -> &str {
        "as_pairs"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let (k, v) = map_types("as_pairs", pos, args, ctx)?;
        Ok(Type::array(Type::pair(k, v, false), false, false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let v = args[0].eval(env, stdlib)?;
        let pairs = v
            .as_map_pairs()
            .ok_or_else(|| WdlError::eval(pos.clone(), "as_pairs() of non-map"))?;
        let (kt, vt) = match v.wdl_type() {
            Type::Map { key, value, .. } => (*key, *value),
            _ => (Type::any(), Type::any()),
        };
        Ok(Value::array(
            Type::pair(kt, vt, false),
            pairs
                .iter()
                .map(|(k, v)| Value::pair(k.clone(), v.clone()))
                .collect(),
        ))
    }
}

struct AsMap;

impl Function for AsMap {
    fn name(&self) -> &str {
        "as_map"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let (k, v) = pair_item_types("as_map", pos, args, ctx)?;
        Ok(Type::map(k, v, false))
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
            .ok_or_else(|| WdlError::eval(pos.clone(), "as_map() of non-array"))?;
        let mut pairs = Vec::new();
        for item in items {
            let (k, val) = item
                .as_pair()
                .ok_or_else(|| WdlError::eval(pos.clone(), "as_map() of non-pair element"))?;
            for (seen, _) in &pairs {
                if k.equals(seen) {
                    return Err(WdlError::eval(
                        pos.clone(),
                        format!("as_map() duplicate key {}", k),
                    ));
                }
            }
            pairs.push((k.clone(), val.clone()));
        }
        let (kt, vt) = match v.wdl_type() {
            Type::Array { item, .. } => match *item {
                Type::Pair { left, right, .. } => (*left, *right),
                _ => (Type::any(), Type::any()),
            },
            _ => (Type::any(), Type::any()),
        };
        Ok(Value::map(kt, vt, pairs))
    }
}

struct CollectByKey;

impl Function for CollectByKey {
    fn name(&self) -> &str {
        "collect_by_key"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        let (k, v) = pair_item_types("collect_by_key", pos, args, ctx)?;
        Ok(Type::map(k, Type::array(v, false, false), false))
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
            .ok_or_else(|| WdlError::eval(pos.clone(), "collect_by_key() of non-array"))?;
        let (kt, vt) = match v.wdl_type() {
            Type::Array { item, .. } => match *item {
                Type::Pair { left, right, .. } => (*left, *right),
                _ => (Type::any(), Type::any()),
            },
            _ => (Type::any(), Type::any()),
        };
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for item in items {
            let (k, val) = item.as_pair().ok_or_else(|| {
                WdlError::eval(pos.clone(), "collect_by_key() of non-pair element")
            })?;
            match groups.iter_mut().find(|(seen, _)| seen.equals(k)) {
                Some((_, vs)) => vs.push(val.clone()),
                None => groups.push((k.clone(), vec![val.clone()])),
            }
        }
        let pairs: Vec<(Value, Value)> = groups
            .into_iter()
            .map(|(k, vs)| (k, Value::array(vt.clone(), vs)))
            .collect();
        Ok(Value::map(kt, Type::array(vt, false, false), pairs))
    }
}

struct ContainsKey;

impl Function for ContainsKey {
    fn name(&self) -> &str {
        "contains_key"
    }

    fn infer_type(
        &self,
        pos: &SourcePosition,
        args: &mut [Expression],
        ctx: &TypeContext<'_>,
    ) -> Result<Type, WdlError> {
        check_arity(pos, "contains_key", args, 2, 2)?;
        let (first, rest) = args.split_at_mut(1);
        let key_ty = match first[0].infer_type(ctx)? {
            Type::Map { key, .. } => *key,
            Type::Any { .. } => Type::any(),
            other => {
                return Err(WdlError::static_mismatch(
                    first[0].pos().clone(),
                    "Map".to_string(),
                    other.to_string(),
                    "",
                ))
            }
        };
        rest[0].typecheck(&key_ty, ctx)?;
        Ok(Type::boolean(false))
    }

    fn eval(
        &self,
        pos: &SourcePosition,
        args: &[Expression],
        env: &Bindings<Value>,
        stdlib: &StdLib,
    ) -> Result<Value, WdlError> {
        let values = eval_args(args, env, stdlib)?;
        let pairs = values[0]
            .as_map_pairs()
            .ok_or_else(|| WdlError::eval(pos.clone(), "contains_key() of non-map"))?;
        Ok(Value::boolean(
            pairs.iter().any(|(k, _)| k.equals(&values[1])),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    fn sample_map() -> Value {
        Value::map(
            Type::string(false),
            Type::int(false),
            vec![
                (Value::string("a"), Value::int(1)),
                (Value::string("b"), Value::int(2)),
            ],
        )
    }

    fn eval_with_m(name: &str, extra: Vec<Expression>) -> Result<Value, WdlError> {
        let lib = StdLib::base("1.1");
        let env = Bindings::new().bind("m".to_string(), sample_map(), None);
        let mut args = vec![Expression::ident(pos(), "m")];
        args.extend(extra);
        lib.get_function(name).unwrap().eval(&pos(), &args, &env, &lib)
    }

    #[test]
    fn keys_and_values() {
        let k = eval_with_m("keys", vec![]).unwrap();
        assert_eq!(k.as_array().unwrap()[0].as_string(), Some("a"));
        let v = eval_with_m("values", vec![]).unwrap();
        assert_eq!(v.as_array().unwrap()[1].as_int(), Some(2));
    }

    #[test]
    fn pairs_round_trip() {
        let pairs = eval_with_m("as_pairs", vec![]).unwrap();
        let lib = StdLib::base("1.1");
        let env = Bindings::new().bind("ps".to_string(), pairs, None);
        let back = lib
            .get_function("as_map")
            .unwrap()
            .eval(&pos(), &[Expression::ident(pos(), "ps")], &env, &lib)
            .unwrap();
        assert!(back.equals(&sample_map()));
    }

    #[test]
    fn as_map_rejects_duplicates() {
        let lib = StdLib::base("1.1");
        let dup = Value::array(
            Type::pair(Type::string(false), Type::int(false), false),
            vec![
                Value::pair(Value::string("k"), Value::int(1)),
                Value::pair(Value::string("k"), Value::int(2)),
            ],
        );
        let env = Bindings::new().bind("ps".to_string(), dup, None);
        assert!(lib
            .get_function("as_map")
            .unwrap()
            .eval(&pos(), &[Expression::ident(pos(), "ps")], &env, &lib)
            .is_err());
    }

    #[test]
    fn collect_by_key_groups() {
        let lib = StdLib::base("1.1");
        let items = Value::array(
            Type::pair(Type::string(false), Type::int(false), false),
            vec![
                Value::pair(Value::string("k"), Value::int(1)),
                Value::pair(Value::string("j"), Value::int(2)),
                Value::pair(Value::string("k"), Value::int(3)),
            ],
        );
        let env = Bindings::new().bind("ps".to_string(), items, None);
        let grouped = lib
            .get_function("collect_by_key")
            .unwrap()
            .eval(&pos(), &[Expression::ident(pos(), "ps")], &env, &lib)
            .unwrap();
        let pairs = grouped.as_map_pairs().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1.as_array().unwrap().len(), 2);
    }

    #[test]
    fn contains_key_checks() {
        assert_eq!(
            eval_with_m("contains_key", vec![Expression::string_literal(pos(), "a")])
                .unwrap()
                .as_bool(),
            Some(true)
        );
        assert_eq!(
            eval_with_m("contains_key", vec![Expression::string_literal(pos(), "z")])
                .unwrap()
                .as_bool(),
            Some(false)
        );
    }
}
