//! Runtime values.
//!
//! A [`Value`] is the result of evaluating a WDL expression: a tagged payload
//! together with enough type information to recover its static
//! [`Type`](crate::types::Type). Values coerce at runtime by the same rules
//! the typechecker applies statically, with the addition that `String`
//! payloads actually parse when coerced to `Int`/`Float` (raising an
//! evaluation error if they don't).
//!
//! [`Value::to_json`] is the canonical JSON projection used for run inputs
//! and outputs; `File`/`Directory` values serialize as path strings and are
//! distinguished only by the companion static type.

use crate::error::{SourcePosition, WdlError};
use crate::types::Type;
use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;

/// A WDL runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// `None` in WDL; the absence of a value.
    Null,
    Boolean {
        value: bool,
    },
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    String {
        value: String,
    },
    File {
        value: String,
    },
    Directory {
        value: String,
    },
    Array {
        item_type: Type,
        values: Vec<Value>,
    },
    Map {
        key_type: Type,
        value_type: Type,
        pairs: Vec<(Value, Value)>,
    },
    Pair {
        left: Box<Value>,
        right: Box<Value>,
    },
    Struct {
        wdl_type: Type,
        members: IndexMap<String, Value>,
    },
}

impl Value {
    pub fn null() -> Self {
        Value::Null
    }

    pub fn boolean(value: bool) -> Self {
        Value::Boolean { value }
    }

    pub fn int(value: i64) -> Self {
        Value::Int { value }
    }

    pub fn float(value: f64) -> Self {
        Value::Float { value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value::String {
            value: value.into(),
        }
    }

    pub fn file(value: impl Into<String>) -> Self {
        Value::File {
            value: value.into(),
        }
    }

    pub fn directory(value: impl Into<String>) -> Self {
        Value::Directory {
            value: value.into(),
        }
    }

    pub fn array(item_type: Type, values: Vec<Value>) -> Self {
        Value::Array { item_type, values }
    }

    pub fn map(key_type: Type, value_type: Type, pairs: Vec<(Value, Value)>) -> Self {
        Value::Map {
            key_type,
            value_type,
            pairs,
        }
    }

    pub fn pair(left: Value, right: Value) -> Self {
        Value::Pair {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Build a struct value against a resolved `StructInstance` type,
    /// filling omitted optional members with `Null` and rejecting missing
    /// required members.
    pub fn struct_value(
        wdl_type: Type,
        mut members: IndexMap<String, Value>,
    ) -> Result<Self, WdlError> {
        if let Type::StructInstance {
            members: Some(member_types),
            ..
        } = &wdl_type
        {
            for (name, ty) in member_types {
                if !members.contains_key(name) {
                    if ty.is_optional() {
                        members.insert(name.clone(), Value::Null);
                    } else {
                        return Err(WdlError::validation(
                            SourcePosition::unknown(),
                            format!("missing required struct member {}", name),
                        ));
                    }
                }
            }
        }
        Ok(Value::Struct { wdl_type, members })
    }

    /// Build a struct/object value without member validation.
    pub fn object(members: IndexMap<String, Value>) -> Self {
        let member_types: IndexMap<String, Type> = members
            .iter()
            .map(|(k, v)| (k.clone(), v.wdl_type()))
            .collect();
        Value::Struct {
            wdl_type: Type::object(member_types),
            members,
        }
    }

    /// The static type this value inhabits.
    pub fn wdl_type(&self) -> Type {
        match self {
            Value::Null => Type::none(),
            Value::Boolean { .. } => Type::boolean(false),
            Value::Int { .. } => Type::int(false),
            Value::Float { .. } => Type::float(false),
            Value::String { .. } => Type::string(false),
            Value::File { .. } => Type::file(false),
            Value::Directory { .. } => Type::directory(false),
            Value::Array { item_type, values } => {
                Type::array(item_type.clone(), false, !values.is_empty())
            }
            Value::Map {
                key_type,
                value_type,
                ..
            } => Type::map(key_type.clone(), value_type.clone(), false),
            Value::Pair { left, right } => Type::pair(left.wdl_type(), right.wdl_type(), false),
            Value::Struct { wdl_type, .. } => wdl_type.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean { value } => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int { value } => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float { value } => Some(*value),
            Value::Int { value } => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String { value } | Value::File { value } | Value::Directory { value } => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn as_map_pairs(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map { pairs, .. } => Some(pairs),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<(&Value, &Value)> {
        match self {
            Value::Pair { left, right } => Some((left, right)),
            _ => None,
        }
    }

    pub fn as_struct_members(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Struct { members, .. } => Some(members),
            _ => None,
        }
    }

    /// Canonical JSON projection.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Boolean { value } => JsonValue::Bool(*value),
            Value::Int { value } => JsonValue::Number((*value).into()),
            Value::Float { value } => serde_json::Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String { value } | Value::File { value } | Value::Directory { value } => {
                JsonValue::String(value.clone())
            }
            Value::Array { values, .. } => {
                JsonValue::Array(values.iter().map(|v| v.to_json()).collect())
            }
            Value::Map { pairs, .. } => {
                let mut obj = JsonMap::new();
                for (k, v) in pairs {
                    obj.insert(k.json_key(), v.to_json());
                }
                JsonValue::Object(obj)
            }
            Value::Pair { left, right } => {
                let mut obj = JsonMap::new();
                obj.insert("left".to_string(), left.to_json());
                obj.insert("right".to_string(), right.to_json());
                JsonValue::Object(obj)
            }
            Value::Struct { members, .. } => {
                let obj: JsonMap<String, JsonValue> = members
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                JsonValue::Object(obj)
            }
        }
    }

    fn json_key(&self) -> String {
        match self {
            Value::String { value } | Value::File { value } | Value::Directory { value } => {
                value.clone()
            }
            Value::Int { value } => value.to_string(),
            Value::Float { value } => value.to_string(),
            Value::Boolean { value } => value.to_string(),
            other => other.to_string(),
        }
    }

    /// Infer a value from untyped JSON.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::boolean(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::int(i)
                } else {
                    Value::float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            JsonValue::String(s) => Value::string(s),
            JsonValue::Array(items) => {
                let values: Vec<Value> = items.into_iter().map(Value::from_json).collect();
                let item_type = values
                    .first()
                    .map(|v| v.wdl_type())
                    .unwrap_or_else(Type::any);
                Value::array(item_type, values)
            }
            JsonValue::Object(obj) => {
                let members: IndexMap<String, Value> = obj
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect();
                Value::object(members)
            }
        }
    }

    /// Deserialize JSON against a known target type, applying coercions.
    pub fn from_json_typed(ty: &Type, json: JsonValue) -> Result<Self, WdlError> {
        Value::from_json(json).coerce(ty)
    }

    /// Coerce to `target`, by the rules mirrored from the static relation.
    pub fn coerce(&self, target: &Type) -> Result<Value, WdlError> {
        match (self, target) {
            (_, Type::Any { .. }) => Ok(self.clone()),

            (Value::Null, _) if target.is_optional() => Ok(Value::Null),
            (Value::Null, _) => Err(WdlError::NullValue {
                pos: SourcePosition::unknown(),
            }),

            (Value::Boolean { .. }, Type::Boolean { .. })
            | (Value::Int { .. }, Type::Int { .. })
            | (Value::Float { .. }, Type::Float { .. })
            | (Value::String { .. }, Type::String { .. })
            | (Value::File { .. }, Type::File { .. })
            | (Value::Directory { .. }, Type::Directory { .. }) => Ok(self.clone()),

            (Value::Int { value }, Type::Float { .. }) => Ok(Value::float(*value as f64)),

            (_, Type::String { .. }) => Ok(Value::string(self.to_string())),

            (Value::String { value }, Type::File { .. }) => {
                if value.ends_with('/') {
                    Err(WdlError::eval(
                        SourcePosition::unknown(),
                        format!("invalid file path {}", value),
                    ))
                } else {
                    Ok(Value::file(value.clone()))
                }
            }
            (Value::String { value }, Type::Directory { .. }) => {
                Ok(Value::directory(value.trim_end_matches('/').to_string()))
            }
            (Value::String { value }, Type::Int { .. }) => {
                value.trim().parse::<i64>().map(Value::int).map_err(|_| {
                    WdlError::eval(
                        SourcePosition::unknown(),
                        format!("cannot coerce {:?} to Int", value),
                    )
                })
            }
            (Value::String { value }, Type::Float { .. }) => {
                value.trim().parse::<f64>().map(Value::float).map_err(|_| {
                    WdlError::eval(
                        SourcePosition::unknown(),
                        format!("cannot coerce {:?} to Float", value),
                    )
                })
            }
            (Value::File { value }, Type::Directory { .. }) => Ok(Value::directory(value.clone())),
            (Value::Directory { value }, Type::File { .. }) => Ok(Value::file(value.clone())),

            (Value::Array { values, .. }, Type::Array { item, nonempty, .. }) => {
                if *nonempty && values.is_empty() {
                    return Err(WdlError::EmptyArray {
                        pos: SourcePosition::unknown(),
                    });
                }
                let coerced: Result<Vec<Value>, WdlError> =
                    values.iter().map(|v| v.coerce(item)).collect();
                Ok(Value::array((**item).clone(), coerced?))
            }

            // promote scalar to singleton array (draft-2 compatibility)
            (_, Type::Array { item, .. }) => {
                let inner = self.coerce(item)?;
                Ok(Value::array((**item).clone(), vec![inner]))
            }

            (Value::Map { pairs, .. }, Type::Map { key, value, .. }) => {
                let coerced: Result<Vec<(Value, Value)>, WdlError> = pairs
                    .iter()
                    .map(|(k, v)| Ok((k.coerce(key)?, v.coerce(value)?)))
                    .collect();
                Ok(Value::map((**key).clone(), (**value).clone(), coerced?))
            }

            (Value::Map { pairs, .. }, Type::StructInstance { .. }) => {
                let mut members = IndexMap::new();
                for (k, v) in pairs {
                    let name = k
                        .as_string()
                        .ok_or_else(|| {
                            WdlError::eval(
                                SourcePosition::unknown(),
                                "struct member names must be strings",
                            )
                        })?
                        .to_string();
                    members.insert(name, v.clone());
                }
                Value::coerce_members_into_struct(members, target)
            }

            (Value::Pair { left, right }, Type::Pair { left: lt, right: rt, .. }) => Ok(
                Value::pair(left.coerce(lt)?, right.coerce(rt)?),
            ),

            (Value::Struct { members, .. }, Type::StructInstance { .. }) => {
                Value::coerce_members_into_struct(members.clone(), target)
            }

            (Value::Struct { members, .. }, Type::Map { key, value, .. }) => {
                let pairs: Result<Vec<(Value, Value)>, WdlError> = members
                    .iter()
                    .map(|(k, v)| Ok((Value::string(k.clone()).coerce(key)?, v.coerce(value)?)))
                    .collect();
                Ok(Value::map((**key).clone(), (**value).clone(), pairs?))
            }

            (Value::Struct { members, .. }, Type::Object { .. }) => {
                Ok(Value::object(members.clone()))
            }

            _ => Err(WdlError::eval(
                SourcePosition::unknown(),
                format!("cannot coerce {} to {}", self.wdl_type(), target),
            )),
        }
    }

    fn coerce_members_into_struct(
        members: IndexMap<String, Value>,
        target: &Type,
    ) -> Result<Value, WdlError> {
        let member_types = match target {
            Type::StructInstance {
                members: Some(m), ..
            } => m,
            _ => {
                return Err(WdlError::eval(
                    SourcePosition::unknown(),
                    format!("cannot coerce members into unresolved {}", target),
                ))
            }
        };
        let mut out = IndexMap::new();
        for (name, ty) in member_types {
            match members.get(name) {
                Some(v) => {
                    out.insert(name.clone(), v.coerce(ty)?);
                }
                None if ty.is_optional() => {
                    out.insert(name.clone(), Value::Null);
                }
                None => {
                    return Err(WdlError::eval(
                        SourcePosition::unknown(),
                        format!("missing required struct member {}", name),
                    ))
                }
            }
        }
        for name in members.keys() {
            if !member_types.contains_key(name) {
                return Err(WdlError::NoSuchMember {
                    pos: SourcePosition::unknown(),
                    member: name.clone(),
                });
            }
        }
        Ok(Value::Struct {
            wdl_type: target.clone(),
            members: out,
        })
    }

    /// Runtime equality with Int/Float promotion and File/String
    /// interchangeability.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean { value: a }, Value::Boolean { value: b }) => a == b,
            (Value::Int { value: a }, Value::Int { value: b }) => a == b,
            (Value::Float { value: a }, Value::Float { value: b }) => a == b,
            (Value::Int { value: a }, Value::Float { value: b }) => (*a as f64) == *b,
            (Value::Float { value: a }, Value::Int { value: b }) => *a == (*b as f64),
            (
                Value::String { value: a } | Value::File { value: a } | Value::Directory { value: a },
                Value::String { value: b } | Value::File { value: b } | Value::Directory { value: b },
            ) => a == b,
            (Value::Array { values: a, .. }, Value::Array { values: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map { pairs: a, .. }, Value::Map { pairs: b, .. }) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ak, av), (bk, bv))| ak.equals(bk) && av.equals(bv))
            }
            (Value::Pair { left: al, right: ar }, Value::Pair { left: bl, right: br }) => {
                al.equals(bl) && ar.equals(br)
            }
            (Value::Struct { members: a, .. }, Value::Struct { members: b, .. }) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.equals(w)).unwrap_or(false))
            }
            _ => false,
        }
    }

    /// Collect every `File`/`Directory` path reachable within this value.
    pub fn collect_paths(&self, out: &mut Vec<(String, bool)>) {
        match self {
            Value::File { value } => out.push((value.clone(), false)),
            Value::Directory { value } => out.push((value.clone(), true)),
            Value::Array { values, .. } => {
                for v in values {
                    v.collect_paths(out);
                }
            }
            Value::Map { pairs, .. } => {
                for (k, v) in pairs {
                    k.collect_paths(out);
                    v.collect_paths(out);
                }
            }
            Value::Pair { left, right } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
            Value::Struct { members, .. } => {
                for v in members.values() {
                    v.collect_paths(out);
                }
            }
            _ => {}
        }
    }

    /// Rewrite every `File`/`Directory` path with `f`, recursively.
    pub fn map_paths<F>(&self, f: &mut F) -> Result<Value, WdlError>
    where
        F: FnMut(&str, bool) -> Result<String, WdlError>,
    {
        Ok(match self {
            Value::File { value } => Value::file(f(value, false)?),
            Value::Directory { value } => Value::directory(f(value, true)?),
            Value::Array { item_type, values } => Value::Array {
                item_type: item_type.clone(),
                values: values
                    .iter()
                    .map(|v| v.map_paths(f))
                    .collect::<Result<_, _>>()?,
            },
            Value::Map {
                key_type,
                value_type,
                pairs,
            } => Value::Map {
                key_type: key_type.clone(),
                value_type: value_type.clone(),
                pairs: pairs
                    .iter()
                    .map(|(k, v)| Ok((k.map_paths(f)?, v.map_paths(f)?)))
                    .collect::<Result<_, WdlError>>()?,
            },
            Value::Pair { left, right } => Value::pair(left.map_paths(f)?, right.map_paths(f)?),
            Value::Struct { wdl_type, members } => Value::Struct {
                wdl_type: wdl_type.clone(),
                members: members
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.map_paths(f)?)))
                    .collect::<Result<_, WdlError>>()?,
            },
            other => other.clone(),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Boolean { value } => write!(f, "{}", value),
            Value::Int { value } => write!(f, "{}", value),
            Value::Float { value } => write!(f, "{:.6}", value),
            Value::String { value } | Value::File { value } | Value::Directory { value } => {
                write!(f, "{}", value)
            }
            Value::Array { values, .. } => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map { pairs, .. } => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Pair { left, right } => write!(f, "({},{})", left, right),
            Value::Struct { members, .. } => {
                write!(f, "{{")?;
                for (i, (k, v)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_types() {
        assert_eq!(Value::int(3).wdl_type().to_string(), "Int");
        assert_eq!(Value::null().wdl_type().to_string(), "None");
        assert_eq!(
            Value::array(Type::int(false), vec![Value::int(1)])
                .wdl_type()
                .to_string(),
            "Array[Int]+"
        );
    }

    #[test]
    fn coerce_int_to_float_and_string() {
        let v = Value::int(7);
        assert_eq!(v.coerce(&Type::float(false)).unwrap().as_float(), Some(7.0));
        assert_eq!(
            v.coerce(&Type::string(false)).unwrap().as_string(),
            Some("7")
        );
    }

    #[test]
    fn coerce_string_parses_numbers() {
        let v = Value::string("42");
        assert_eq!(v.coerce(&Type::int(false)).unwrap().as_int(), Some(42));
        assert!(Value::string("not a number")
            .coerce(&Type::int(false))
            .is_err());
        assert_eq!(
            Value::string("2.5").coerce(&Type::float(false)).unwrap().as_float(),
            Some(2.5)
        );
    }

    #[test]
    fn null_requires_optional() {
        assert!(Value::null().coerce(&Type::int(true)).is_ok());
        assert!(matches!(
            Value::null().coerce(&Type::int(false)),
            Err(WdlError::NullValue { .. })
        ));
    }

    #[test]
    fn array_coercion_elementwise() {
        let arr = Value::array(Type::int(false), vec![Value::int(1), Value::int(2)]);
        let floats = arr
            .coerce(&Type::array(Type::float(false), false, false))
            .unwrap();
        assert_eq!(floats.as_array().unwrap()[1].as_float(), Some(2.0));
    }

    #[test]
    fn empty_array_to_nonempty_fails() {
        let arr = Value::array(Type::int(false), vec![]);
        assert!(matches!(
            arr.coerce(&Type::array(Type::int(false), false, true)),
            Err(WdlError::EmptyArray { .. })
        ));
    }

    #[test]
    fn scalar_promotes_to_singleton_array() {
        let arr = Value::int(5)
            .coerce(&Type::array(Type::int(false), false, false))
            .unwrap();
        assert_eq!(arr.as_array().unwrap().len(), 1);
    }

    #[test]
    fn struct_coercion_fills_optionals() {
        let mut member_types = IndexMap::new();
        member_types.insert("a".to_string(), Type::int(false));
        member_types.insert("b".to_string(), Type::string(true));
        let st = Type::StructInstance {
            name: "S".to_string(),
            members: Some(member_types),
            optional: false,
        };
        let mut members = IndexMap::new();
        members.insert("a".to_string(), Value::int(1));
        let v = Value::object(members).coerce(&st).unwrap();
        let m = v.as_struct_members().unwrap();
        assert!(m.get("b").unwrap().is_null());
    }

    #[test]
    fn struct_coercion_rejects_extra_member() {
        let mut member_types = IndexMap::new();
        member_types.insert("a".to_string(), Type::int(false));
        let st = Type::StructInstance {
            name: "S".to_string(),
            members: Some(member_types),
            optional: false,
        };
        let mut members = IndexMap::new();
        members.insert("a".to_string(), Value::int(1));
        members.insert("zzz".to_string(), Value::int(2));
        assert!(matches!(
            Value::object(members).coerce(&st),
            Err(WdlError::NoSuchMember { .. })
        ));
    }

    #[test]
    fn json_round_trip() {
        for v in [
            Value::boolean(true),
            Value::int(-3),
            Value::float(1.25),
            Value::string("hi"),
        ] {
            let j = v.to_json();
            let back = Value::from_json_typed(&v.wdl_type(), j).unwrap();
            assert!(back.equals(&v));
        }
    }

    #[test]
    fn json_object_to_map() {
        let j: JsonValue = serde_json::json!({"a": 1, "b": 2});
        let m = Value::from_json_typed(
            &Type::map(Type::string(false), Type::int(false), false),
            j,
        )
        .unwrap();
        assert_eq!(m.as_map_pairs().unwrap().len(), 2);
    }

    #[test]
    fn file_serializes_as_string() {
        let v = Value::file("/tmp/x.txt");
        assert_eq!(v.to_json(), JsonValue::String("/tmp/x.txt".to_string()));
    }

    #[test]
    fn equality_promotes_numerics() {
        assert!(Value::int(2).equals(&Value::float(2.0)));
        assert!(!Value::int(2).equals(&Value::float(2.5)));
        assert!(Value::file("x").equals(&Value::string("x")));
    }

    #[test]
    fn collect_and_map_paths() {
        let v = Value::array(
            Type::file(false),
            vec![Value::file("/a"), Value::file("/b")],
        );
        let mut paths = Vec::new();
        v.collect_paths(&mut paths);
        assert_eq!(paths.len(), 2);
        let mapped = v
            .map_paths(&mut |p, _| Ok(format!("/mnt{}", p)))
            .unwrap();
        let mut mapped_paths = Vec::new();
        mapped.collect_paths(&mut mapped_paths);
        assert_eq!(mapped_paths[0].0, "/mnt/a");
    }

    #[test]
    fn display_float_fixed_precision() {
        assert_eq!(Value::float(1.0).to_string(), "1.000000");
    }
}
