//! The WDL static type lattice.
//!
//! Types are immutable values of the [`Type`] enum: primitives (`Boolean`,
//! `Int`, `Float`, `String`, `File`, `Directory`), parametric compounds
//! (`Array`, `Map`, `Pair`), user-defined `StructInstance`s, the legacy
//! `Object` record, and `Any`. Every variant carries an `optional` flag
//! corresponding to the `?` quantifier.
//!
//! The coercion relation implemented by [`Type::coerces`] is:
//!
//! 1. `Any` coerces to and from every type
//! 2. `Int` → `Float`; `Boolean`/`Int`/`Float`/`File` → `String`
//! 3. `String` → `File`/`Directory`/`Int`/`Float`
//! 4. `T` → `T?`, but `T?` → `T` only when quantifier checking is off
//! 5. `Array[T]` → `Array[U]` when `T` → `U`; `Array[T]+` → `Array[T]`
//! 6. `Map`/`Pair` coerce memberwise; `Map[String,V]` → struct when the
//!    literal key set satisfies the struct's members

use crate::error::{SourcePosition, WdlError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A WDL static type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    /// Indeterminate type; placeholder for `None` literals and empty arrays.
    Any { optional: bool },
    Boolean { optional: bool },
    Int { optional: bool },
    Float { optional: bool },
    String { optional: bool },
    File { optional: bool },
    Directory { optional: bool },
    Array {
        item: Box<Type>,
        optional: bool,
        nonempty: bool,
    },
    Map {
        key: Box<Type>,
        value: Box<Type>,
        optional: bool,
        /// Key set recorded on map literals, enabling map → struct coercion.
        literal_keys: Option<HashSet<std::string::String>>,
    },
    Pair {
        left: Box<Type>,
        right: Box<Type>,
        optional: bool,
    },
    StructInstance {
        name: std::string::String,
        /// `None` until the enclosing document's typedefs are resolved.
        members: Option<IndexMap<std::string::String, Type>>,
        optional: bool,
    },
    /// Untyped record produced by `object {...}` literals and call outputs in
    /// draft-2 documents; only permitted transitionally.
    Object {
        members: IndexMap<std::string::String, Type>,
    },
}

impl Type {
    pub fn any() -> Self {
        Type::Any { optional: false }
    }

    /// The type of the `None` literal.
    pub fn none() -> Self {
        Type::Any { optional: true }
    }

    pub fn boolean(optional: bool) -> Self {
        Type::Boolean { optional }
    }

    pub fn int(optional: bool) -> Self {
        Type::Int { optional }
    }

    pub fn float(optional: bool) -> Self {
        Type::Float { optional }
    }

    pub fn string(optional: bool) -> Self {
        Type::String { optional }
    }

    pub fn file(optional: bool) -> Self {
        Type::File { optional }
    }

    pub fn directory(optional: bool) -> Self {
        Type::Directory { optional }
    }

    pub fn array(item: Type, optional: bool, nonempty: bool) -> Self {
        Type::Array {
            item: Box::new(item),
            optional,
            nonempty,
        }
    }

    pub fn map(key: Type, value: Type, optional: bool) -> Self {
        Type::Map {
            key: Box::new(key),
            value: Box::new(value),
            optional,
            literal_keys: None,
        }
    }

    pub fn map_with_literal_keys(
        key: Type,
        value: Type,
        optional: bool,
        keys: HashSet<std::string::String>,
    ) -> Self {
        Type::Map {
            key: Box::new(key),
            value: Box::new(value),
            optional,
            literal_keys: Some(keys),
        }
    }

    pub fn pair(left: Type, right: Type, optional: bool) -> Self {
        Type::Pair {
            left: Box::new(left),
            right: Box::new(right),
            optional,
        }
    }

    /// An unresolved struct reference by name.
    pub fn struct_instance(name: std::string::String, optional: bool) -> Self {
        Type::StructInstance {
            name,
            members: None,
            optional,
        }
    }

    pub fn object(members: IndexMap<std::string::String, Type>) -> Self {
        Type::Object { members }
    }

    pub fn is_optional(&self) -> bool {
        match self {
            Type::Any { optional }
            | Type::Boolean { optional }
            | Type::Int { optional }
            | Type::Float { optional }
            | Type::String { optional }
            | Type::File { optional }
            | Type::Directory { optional }
            | Type::Array { optional, .. }
            | Type::Map { optional, .. }
            | Type::Pair { optional, .. }
            | Type::StructInstance { optional, .. } => *optional,
            Type::Object { .. } => false,
        }
    }

    pub fn is_nonempty(&self) -> bool {
        matches!(self, Type::Array { nonempty: true, .. })
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        match &mut self {
            Type::Any { optional: o }
            | Type::Boolean { optional: o }
            | Type::Int { optional: o }
            | Type::Float { optional: o }
            | Type::String { optional: o }
            | Type::File { optional: o }
            | Type::Directory { optional: o }
            | Type::Array { optional: o, .. }
            | Type::Map { optional: o, .. }
            | Type::Pair { optional: o, .. }
            | Type::StructInstance { optional: o, .. } => *o = optional,
            Type::Object { .. } => {}
        }
        self
    }

    pub fn with_nonempty(mut self, nonempty: bool) -> Self {
        if let Type::Array { nonempty: ne, .. } = &mut self {
            *ne = nonempty;
        }
        self
    }

    /// Child types of a parametric type (array item, map key/value, pair
    /// halves, struct member types).
    pub fn parameters(&self) -> Vec<&Type> {
        match self {
            Type::Array { item, .. } => vec![item],
            Type::Map { key, value, .. } => vec![key, value],
            Type::Pair { left, right, .. } => vec![left, right],
            Type::StructInstance {
                members: Some(m), ..
            } => m.values().collect(),
            Type::Object { members } => members.values().collect(),
            _ => vec![],
        }
    }

    /// Whether `self` may stand in for `target`. With `check_quant` the
    /// optional/nonempty quantifiers are enforced; without it `T?` → `T` and
    /// `T` → `Array[T]` (draft-2 style promotion) are additionally allowed.
    pub fn coerces(&self, target: &Type, check_quant: bool) -> bool {
        self.check_coercion(target, check_quant).is_ok()
    }

    /// Like [`Type::coerces`] but explaining the failure.
    pub fn check_coercion(&self, target: &Type, check_quant: bool) -> Result<(), WdlError> {
        if matches!(self, Type::Any { .. }) || matches!(target, Type::Any { .. }) {
            return self.check_quantifiers(target, check_quant);
        }

        // draft-2 style promotion of a scalar to a one-element array
        if !check_quant {
            if let Type::Array { item, .. } = target {
                if !matches!(self, Type::Array { .. }) && self.coerces(item, check_quant) {
                    return Ok(());
                }
            }
        }

        match (self, target) {
            (Type::Boolean { .. }, Type::Boolean { .. })
            | (Type::Int { .. }, Type::Int { .. })
            | (Type::Float { .. }, Type::Float { .. })
            | (Type::String { .. }, Type::String { .. })
            | (Type::File { .. }, Type::File { .. })
            | (Type::Directory { .. }, Type::Directory { .. })
            | (Type::Int { .. }, Type::Float { .. }) => {
                self.check_quantifiers(target, check_quant)
            }

            (
                Type::Boolean { .. } | Type::Int { .. } | Type::Float { .. } | Type::File { .. },
                Type::String { .. },
            ) => self.check_quantifiers(target, check_quant),

            (
                Type::String { .. },
                Type::File { .. } | Type::Directory { .. } | Type::Int { .. } | Type::Float { .. },
            ) => self.check_quantifiers(target, check_quant),

            (Type::Array { item: a, .. }, Type::Array { item: b, .. }) => {
                a.check_coercion(b, check_quant)?;
                self.check_quantifiers(target, check_quant)
            }

            // Array[P] stringifies when its item type does
            (Type::Array { item, .. }, Type::String { .. }) => {
                item.check_coercion(&Type::string(false), check_quant)?;
                self.check_quantifiers(target, check_quant)
            }

            (
                Type::Map {
                    key: ak, value: av, ..
                },
                Type::Map {
                    key: bk, value: bv, ..
                },
            ) => {
                ak.check_coercion(bk, check_quant)?;
                av.check_coercion(bv, check_quant)?;
                self.check_quantifiers(target, check_quant)
            }

            (
                Type::Map {
                    value,
                    literal_keys: Some(keys),
                    ..
                },
                Type::StructInstance {
                    members: Some(members),
                    ..
                },
            ) => check_members_against_struct(keys, value, members, check_quant),

            (
                Type::Pair {
                    left: al, right: ar, ..
                },
                Type::Pair {
                    left: bl, right: br, ..
                },
            ) => {
                al.check_coercion(bl, check_quant)?;
                ar.check_coercion(br, check_quant)?;
                self.check_quantifiers(target, check_quant)
            }

            (
                Type::StructInstance {
                    name: a_name,
                    members: a_members,
                    ..
                },
                Type::StructInstance {
                    name: b_name,
                    members: b_members,
                    ..
                },
            ) => {
                if let (Some(am), Some(bm)) = (a_members, b_members) {
                    if struct_type_id(am) != struct_type_id(bm) {
                        return Err(WdlError::static_mismatch(
                            SourcePosition::unknown(),
                            b_name.clone(),
                            a_name.clone(),
                            "",
                        ));
                    }
                }
                self.check_quantifiers(target, check_quant)
            }

            (
                Type::Object { members },
                Type::StructInstance {
                    members: Some(struct_members),
                    ..
                },
            ) => {
                let keys: HashSet<std::string::String> = members.keys().cloned().collect();
                check_members_against_struct(&keys, &Type::any(), struct_members, check_quant)
            }

            (Type::Object { members }, Type::Map { key, value, .. }) => {
                Type::string(false).check_coercion(key, check_quant)?;
                for m in members.values() {
                    m.check_coercion(value, check_quant)?;
                }
                Ok(())
            }

            (Type::Object { .. }, Type::Object { .. }) => Ok(()),

            (Type::Map { key, value, .. }, Type::Object { members }) => {
                key.check_coercion(&Type::string(false), check_quant)?;
                for m in members.values() {
                    value.check_coercion(m, check_quant)?;
                }
                Ok(())
            }

            _ => Err(WdlError::static_mismatch(
                SourcePosition::unknown(),
                target.to_string(),
                self.to_string(),
                "",
            )),
        }
    }

    fn check_quantifiers(&self, target: &Type, check_quant: bool) -> Result<(), WdlError> {
        if check_quant
            && self.is_optional()
            && !target.is_optional()
            && !matches!(target, Type::Any { .. })
        {
            return Err(WdlError::static_mismatch(
                SourcePosition::unknown(),
                target.to_string(),
                self.to_string(),
                "",
            ));
        }
        Ok(())
    }

    /// Whether `==`/`!=` is defined between values of these types.
    pub fn equatable(&self, rhs: &Type) -> bool {
        match (self, rhs) {
            (Type::Any { .. }, _) | (_, Type::Any { .. }) => true,
            (Type::Object { .. }, _) | (_, Type::Object { .. }) => false,
            (Type::Int { .. }, Type::Float { .. }) | (Type::Float { .. }, Type::Int { .. }) => true,
            // File values compare as strings in placeholder contexts
            (Type::File { .. }, Type::String { .. })
            | (Type::String { .. }, Type::File { .. }) => true,
            (Type::Boolean { .. }, Type::Boolean { .. })
            | (Type::Int { .. }, Type::Int { .. })
            | (Type::Float { .. }, Type::Float { .. })
            | (Type::String { .. }, Type::String { .. })
            | (Type::File { .. }, Type::File { .. })
            | (Type::Directory { .. }, Type::Directory { .. }) => true,
            (Type::Array { item: a, .. }, Type::Array { item: b, .. }) => a.equatable(b),
            (
                Type::Map {
                    key: ak, value: av, ..
                },
                Type::Map {
                    key: bk, value: bv, ..
                },
            ) => ak.equatable(bk) && av.equatable(bv),
            (
                Type::Pair {
                    left: al, right: ar, ..
                },
                Type::Pair {
                    left: bl, right: br, ..
                },
            ) => al.equatable(bl) && ar.equatable(br),
            (
                Type::StructInstance {
                    members: Some(am), ..
                },
                Type::StructInstance {
                    members: Some(bm), ..
                },
            ) => struct_type_id(am) == struct_type_id(bm),
            _ => false,
        }
    }

    /// Whether `<`/`<=`/`>`/`>=` is defined between values of these types.
    pub fn comparable(&self, rhs: &Type, check_quant: bool) -> bool {
        if check_quant && (self.is_optional() || rhs.is_optional()) {
            return false;
        }
        matches!(
            (self, rhs),
            (Type::Int { .. }, Type::Int { .. })
                | (Type::Int { .. }, Type::Float { .. })
                | (Type::Float { .. }, Type::Int { .. })
                | (Type::Float { .. }, Type::Float { .. })
                | (Type::String { .. }, Type::String { .. })
                | (Type::Boolean { .. }, Type::Boolean { .. })
        )
    }

    /// Replace unresolved struct references with their member maps from
    /// `typedefs`, recursively through parametric types.
    pub fn resolve_structs(
        &self,
        typedefs: &IndexMap<std::string::String, IndexMap<std::string::String, Type>>,
        pos: &SourcePosition,
    ) -> Result<Type, WdlError> {
        match self {
            Type::StructInstance {
                name,
                members: None,
                optional,
            } => match typedefs.get(name) {
                Some(members) => Ok(Type::StructInstance {
                    name: name.clone(),
                    members: Some(members.clone()),
                    optional: *optional,
                }),
                None => Err(WdlError::InvalidType {
                    pos: pos.clone(),
                    message: format!("Unknown struct type {}", name),
                }),
            },
            Type::Array {
                item,
                optional,
                nonempty,
            } => Ok(Type::Array {
                item: Box::new(item.resolve_structs(typedefs, pos)?),
                optional: *optional,
                nonempty: *nonempty,
            }),
            Type::Map {
                key,
                value,
                optional,
                literal_keys,
            } => Ok(Type::Map {
                key: Box::new(key.resolve_structs(typedefs, pos)?),
                value: Box::new(value.resolve_structs(typedefs, pos)?),
                optional: *optional,
                literal_keys: literal_keys.clone(),
            }),
            Type::Pair {
                left,
                right,
                optional,
            } => Ok(Type::Pair {
                left: Box::new(left.resolve_structs(typedefs, pos)?),
                right: Box::new(right.resolve_structs(typedefs, pos)?),
                optional: *optional,
            }),
            other => Ok(other.clone()),
        }
    }

    /// Structural equality ignoring the optional/nonempty quantifiers.
    pub fn same_as(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Array { item: a, .. }, Type::Array { item: b, .. }) => a.same_as(b),
            (
                Type::Map {
                    key: ak, value: av, ..
                },
                Type::Map {
                    key: bk, value: bv, ..
                },
            ) => ak.same_as(bk) && av.same_as(bv),
            (
                Type::Pair {
                    left: al, right: ar, ..
                },
                Type::Pair {
                    left: bl, right: br, ..
                },
            ) => al.same_as(bl) && ar.same_as(br),
            (Type::StructInstance { name: a, .. }, Type::StructInstance { name: b, .. }) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self {
            Type::Any { optional: true } => "None".to_string(),
            Type::Any { .. } => "Any".to_string(),
            Type::Boolean { .. } => "Boolean".to_string(),
            Type::Int { .. } => "Int".to_string(),
            Type::Float { .. } => "Float".to_string(),
            Type::String { .. } => "String".to_string(),
            Type::File { .. } => "File".to_string(),
            Type::Directory { .. } => "Directory".to_string(),
            Type::Array { item, nonempty, .. } => {
                format!("Array[{}]{}", item, if *nonempty { "+" } else { "" })
            }
            Type::Map { key, value, .. } => format!("Map[{},{}]", key, value),
            Type::Pair { left, right, .. } => format!("Pair[{},{}]", left, right),
            Type::StructInstance { name, .. } => name.clone(),
            Type::Object { .. } => "Object".to_string(),
        };
        let quant = if self.is_optional() && !matches!(self, Type::Any { optional: true }) {
            "?"
        } else {
            ""
        };
        write!(f, "{}{}", base, quant)
    }
}

/// Canonical identity for a struct's member map, insensitive to declaration
/// order, so imported structs aliased under different names still unify.
pub fn struct_type_id(members: &IndexMap<std::string::String, Type>) -> std::string::String {
    let mut parts: Vec<std::string::String> = members
        .iter()
        .map(|(name, ty)| {
            let ts = match ty {
                Type::StructInstance {
                    members: Some(nested),
                    ..
                } => format!(
                    "{}{}",
                    struct_type_id(nested),
                    if ty.is_optional() { "?" } else { "" }
                ),
                _ => ty.to_string(),
            };
            format!("{} : {}", name, ts)
        })
        .collect();
    parts.sort();
    format!("struct({})", parts.join(", "))
}

fn check_members_against_struct(
    keys: &HashSet<std::string::String>,
    value_type: &Type,
    struct_members: &IndexMap<std::string::String, Type>,
    check_quant: bool,
) -> Result<(), WdlError> {
    let missing: Vec<&std::string::String> = struct_members
        .iter()
        .filter(|(name, ty)| !keys.contains(*name) && !ty.is_optional())
        .map(|(name, _)| name)
        .collect();
    if !missing.is_empty() {
        return Err(WdlError::validation(
            SourcePosition::unknown(),
            format!(
                "missing non-optional struct member(s) {}",
                missing
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }
    for key in keys {
        if let Some(member_ty) = struct_members.get(key) {
            value_type.check_coercion(member_ty, check_quant)?;
        }
    }
    Ok(())
}

/// Least upper bound of a set of types under coercion; used for array
/// literals and if/then/else joins. Falls back to `String` when
/// `force_string` is set and everything stringifies, else `Any`.
pub fn unify(types: &[&Type], check_quant: bool, force_string: bool) -> Type {
    if types.is_empty() {
        return Type::any();
    }

    let mut unified = types
        .iter()
        .find(|t| !matches!(t, Type::String { .. } | Type::Any { .. }))
        .copied()
        .unwrap_or(types[0])
        .clone();

    let mut optional = false;
    let mut all_nonempty = true;
    let mut all_stringify = true;
    for t in types {
        if t.is_optional() || matches!(t, Type::Any { optional: true }) {
            optional = true;
        }
        if !t.is_nonempty() {
            all_nonempty = false;
        }
        if !t.coerces(&Type::string(true), check_quant) {
            all_stringify = false;
        }
        if matches!((&unified, t), (Type::Int { .. }, Type::Float { .. })) {
            unified = Type::float(false);
        }
        if matches!(t, Type::String { .. })
            && !matches!(
                &unified,
                Type::Pair { .. } | Type::Map { .. } | Type::Array { .. }
            )
        {
            unified = Type::string(false);
        }
    }

    if matches!(&unified, Type::Array { .. }) {
        unified = unified.with_nonempty(all_nonempty);
    }
    unified = unified.with_optional(optional);

    for t in types {
        if !t.coerces(&unified, check_quant) {
            if force_string && all_stringify {
                return Type::string(optional);
            }
            return Type::any();
        }
    }
    unified
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Type::int(false).to_string(), "Int");
        assert_eq!(Type::int(true).to_string(), "Int?");
        assert_eq!(
            Type::array(Type::string(false), false, true).to_string(),
            "Array[String]+"
        );
        assert_eq!(
            Type::map(Type::string(false), Type::int(false), true).to_string(),
            "Map[String,Int]?"
        );
        assert_eq!(
            Type::pair(Type::int(false), Type::float(false), false).to_string(),
            "Pair[Int,Float]"
        );
        assert_eq!(Type::none().to_string(), "None");
    }

    #[test]
    fn primitive_coercions() {
        assert!(Type::int(false).coerces(&Type::float(false), true));
        assert!(!Type::float(false).coerces(&Type::int(false), true));
        assert!(Type::int(false).coerces(&Type::string(false), true));
        assert!(Type::string(false).coerces(&Type::file(false), true));
        assert!(Type::string(false).coerces(&Type::int(false), true));
        assert!(Type::file(false).coerces(&Type::string(false), true));
        assert!(!Type::boolean(false).coerces(&Type::int(false), true));
    }

    #[test]
    fn optional_quantifier() {
        assert!(Type::int(false).coerces(&Type::int(true), true));
        assert!(!Type::int(true).coerces(&Type::int(false), true));
        assert!(Type::int(true).coerces(&Type::int(false), false));
    }

    #[test]
    fn array_coercions() {
        let ints = Type::array(Type::int(false), false, false);
        let floats = Type::array(Type::float(false), false, false);
        let ints_ne = Type::array(Type::int(false), false, true);
        assert!(ints.coerces(&floats, true));
        assert!(!floats.coerces(&ints, true));
        assert!(ints_ne.coerces(&ints, true));
        assert!(ints.coerces(&Type::string(false), true));
    }

    #[test]
    fn scalar_to_array_promotion_without_quant() {
        let arr = Type::array(Type::int(false), false, false);
        assert!(Type::int(false).coerces(&arr, false));
        assert!(!Type::int(false).coerces(&arr, true));
    }

    #[test]
    fn any_coerces_both_ways() {
        assert!(Type::any().coerces(&Type::file(false), true));
        assert!(Type::file(false).coerces(&Type::any(), true));
        assert!(Type::none().coerces(&Type::int(true), true));
    }

    #[test]
    fn map_to_struct() {
        let mut members = IndexMap::new();
        members.insert("a".to_string(), Type::int(false));
        members.insert("b".to_string(), Type::string(true));
        let s = Type::StructInstance {
            name: "S".to_string(),
            members: Some(members),
            optional: false,
        };
        let keys: HashSet<std::string::String> = ["a".to_string()].into_iter().collect();
        let m = Type::map_with_literal_keys(Type::string(false), Type::int(false), false, keys);
        // "b" is optional so it may be omitted
        assert!(m.coerces(&s, true));

        let no_keys = Type::map(Type::string(false), Type::int(false), false);
        assert!(!no_keys.coerces(&s, true));
    }

    #[test]
    fn struct_identity_ignores_member_order() {
        let mut m1 = IndexMap::new();
        m1.insert("x".to_string(), Type::int(false));
        m1.insert("y".to_string(), Type::string(false));
        let mut m2 = IndexMap::new();
        m2.insert("y".to_string(), Type::string(false));
        m2.insert("x".to_string(), Type::int(false));
        assert_eq!(struct_type_id(&m1), struct_type_id(&m2));
    }

    #[test]
    fn equatable_and_comparable() {
        assert!(Type::int(false).equatable(&Type::float(false)));
        assert!(Type::file(false).equatable(&Type::string(false)));
        assert!(!Type::boolean(false).equatable(&Type::int(false)));
        assert!(Type::int(false).comparable(&Type::float(false), true));
        assert!(Type::string(false).comparable(&Type::string(false), true));
        assert!(!Type::int(true).comparable(&Type::int(false), true));
        assert!(Type::int(true).comparable(&Type::int(false), false));
    }

    #[test]
    fn unify_numeric() {
        let i = Type::int(false);
        let f = Type::float(false);
        let u = unify(&[&i, &f], true, false);
        assert!(matches!(u, Type::Float { .. }));
    }

    #[test]
    fn unify_optional_propagates() {
        let i = Type::int(false);
        let n = Type::none();
        let u = unify(&[&i, &n], true, false);
        assert!(u.is_optional());
        assert!(matches!(u, Type::Int { .. }));
    }

    #[test]
    fn unify_force_string() {
        let i = Type::int(false);
        let b = Type::boolean(false);
        let u = unify(&[&i, &b], true, true);
        assert!(matches!(u, Type::String { .. }));
        let u2 = unify(&[&i, &b], true, false);
        assert!(matches!(u2, Type::Any { .. }));
    }

    #[test]
    fn resolve_struct_reference() {
        let mut typedefs = IndexMap::new();
        let mut members = IndexMap::new();
        members.insert("n".to_string(), Type::int(false));
        typedefs.insert("Point".to_string(), members);

        let t = Type::array(Type::struct_instance("Point".to_string(), false), false, false);
        let resolved = t
            .resolve_structs(&typedefs, &SourcePosition::unknown())
            .unwrap();
        match resolved {
            Type::Array { item, .. } => match *item {
                Type::StructInstance { members, .. } => assert!(members.is_some()),
                other => panic!("unexpected {}", other),
            },
            other => panic!("unexpected {}", other),
        }

        let bad = Type::struct_instance("Missing".to_string(), false);
        assert!(bad
            .resolve_structs(&typedefs, &SourcePosition::unknown())
            .is_err());
    }

    #[test]
    fn same_as_ignores_quantifiers() {
        assert!(Type::int(false).same_as(&Type::int(true)));
        assert!(Type::array(Type::int(false), false, true)
            .same_as(&Type::array(Type::int(false), true, false)));
        assert!(!Type::int(false).same_as(&Type::float(false)));
    }
}
