//! WDL expression abstract syntax.
//!
//! An [`Expression`] composes literals, arithmetic/comparison/logic
//! operators, string interpolation with placeholders, array/map/pair/struct
//! construction, indexing and member access, conditionals, and standard
//! library applications. Each node carries its [`SourcePosition`] and, after
//! type inference, a cached static [`Type`].
//!
//! Type inference lives in [`typecheck`], evaluation in [`eval`].

pub mod eval;
pub mod typecheck;

use crate::error::{HasSourcePosition, SourcePosition};
use crate::types::Type;
use crate::value::Value;
use std::fmt;

/// One segment of an interpolated string or command body.
#[derive(Debug, Clone)]
pub enum StringPart {
    /// Literal text (escape sequences already decoded).
    Text(String),
    /// `~{...}` / `${...}` placeholder with its leading options.
    Placeholder {
        /// Ordered `name = "literal"` option list (`sep`, `true`, `false`,
        /// `default`).
        options: Vec<(String, String)>,
        expr: Box<Expression>,
    },
}

/// Binary operators in precedence order (lowest first: `||`, `&&`,
/// equality, relational, additive, multiplicative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expression AST node.
#[derive(Debug, Clone)]
pub enum Expression {
    Boolean {
        pos: SourcePosition,
        value: bool,
    },
    Int {
        pos: SourcePosition,
        value: i64,
    },
    Float {
        pos: SourcePosition,
        value: f64,
    },
    /// Interpolated string; also the representation of task command bodies.
    Str {
        pos: SourcePosition,
        parts: Vec<StringPart>,
        /// True for command bodies, which render but do not re-quote.
        command: bool,
        ty: Option<Type>,
    },
    /// The `None` literal.
    Null {
        pos: SourcePosition,
    },
    Array {
        pos: SourcePosition,
        items: Vec<Expression>,
        ty: Option<Type>,
    },
    Pair {
        pos: SourcePosition,
        left: Box<Expression>,
        right: Box<Expression>,
        ty: Option<Type>,
    },
    Map {
        pos: SourcePosition,
        pairs: Vec<(Expression, Expression)>,
        ty: Option<Type>,
    },
    /// `StructName { k: v, ... }`, or `object { k: v, ... }` when `name` is
    /// `None`.
    Struct {
        pos: SourcePosition,
        name: Option<String>,
        members: Vec<(String, Expression)>,
        ty: Option<Type>,
    },
    /// Possibly dot-namespaced identifier (`x`, `ns.x`, `call.out`). The
    /// longest environment-bound prefix is recorded during inference.
    Ident {
        pos: SourcePosition,
        name: String,
        resolved_prefix: Option<String>,
        ty: Option<Type>,
    },
    /// Indexing `expr[index]` over arrays and maps.
    At {
        pos: SourcePosition,
        expr: Box<Expression>,
        index: Box<Expression>,
        ty: Option<Type>,
    },
    /// Member access `expr.member` on structs, objects, pairs, and call
    /// outputs.
    GetMember {
        pos: SourcePosition,
        expr: Box<Expression>,
        member: String,
        ty: Option<Type>,
    },
    IfThenElse {
        pos: SourcePosition,
        condition: Box<Expression>,
        consequent: Box<Expression>,
        alternative: Box<Expression>,
        ty: Option<Type>,
    },
    Apply {
        pos: SourcePosition,
        function: String,
        arguments: Vec<Expression>,
        ty: Option<Type>,
    },
    Binary {
        pos: SourcePosition,
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        ty: Option<Type>,
    },
    Unary {
        pos: SourcePosition,
        op: UnaryOp,
        operand: Box<Expression>,
        ty: Option<Type>,
    },
}

impl Expression {
    pub fn boolean(pos: SourcePosition, value: bool) -> Self {
        Expression::Boolean { pos, value }
    }

    pub fn int(pos: SourcePosition, value: i64) -> Self {
        Expression::Int { pos, value }
    }

    pub fn float(pos: SourcePosition, value: f64) -> Self {
        Expression::Float { pos, value }
    }

    pub fn null(pos: SourcePosition) -> Self {
        Expression::Null { pos }
    }

    pub fn string(pos: SourcePosition, parts: Vec<StringPart>) -> Self {
        Expression::Str {
            pos,
            parts,
            command: false,
            ty: None,
        }
    }

    /// A string literal with no placeholders.
    pub fn string_literal(pos: SourcePosition, text: impl Into<String>) -> Self {
        Expression::Str {
            pos,
            parts: vec![StringPart::Text(text.into())],
            command: false,
            ty: None,
        }
    }

    pub fn command(pos: SourcePosition, parts: Vec<StringPart>) -> Self {
        Expression::Str {
            pos,
            parts,
            command: true,
            ty: None,
        }
    }

    pub fn ident(pos: SourcePosition, name: impl Into<String>) -> Self {
        Expression::Ident {
            pos,
            name: name.into(),
            resolved_prefix: None,
            ty: None,
        }
    }

    pub fn array(pos: SourcePosition, items: Vec<Expression>) -> Self {
        Expression::Array {
            pos,
            items,
            ty: None,
        }
    }

    pub fn pair(pos: SourcePosition, left: Expression, right: Expression) -> Self {
        Expression::Pair {
            pos,
            left: Box::new(left),
            right: Box::new(right),
            ty: None,
        }
    }

    pub fn map(pos: SourcePosition, pairs: Vec<(Expression, Expression)>) -> Self {
        Expression::Map { pos, pairs, ty: None }
    }

    pub fn struct_literal(
        pos: SourcePosition,
        name: Option<String>,
        members: Vec<(String, Expression)>,
    ) -> Self {
        Expression::Struct {
            pos,
            name,
            members,
            ty: None,
        }
    }

    pub fn at(pos: SourcePosition, expr: Expression, index: Expression) -> Self {
        Expression::At {
            pos,
            expr: Box::new(expr),
            index: Box::new(index),
            ty: None,
        }
    }

    pub fn get_member(pos: SourcePosition, expr: Expression, member: impl Into<String>) -> Self {
        Expression::GetMember {
            pos,
            expr: Box::new(expr),
            member: member.into(),
            ty: None,
        }
    }

    pub fn if_then_else(
        pos: SourcePosition,
        condition: Expression,
        consequent: Expression,
        alternative: Expression,
    ) -> Self {
        Expression::IfThenElse {
            pos,
            condition: Box::new(condition),
            consequent: Box::new(consequent),
            alternative: Box::new(alternative),
            ty: None,
        }
    }

    pub fn apply(pos: SourcePosition, function: impl Into<String>, arguments: Vec<Expression>) -> Self {
        Expression::Apply {
            pos,
            function: function.into(),
            arguments,
            ty: None,
        }
    }

    pub fn binary(pos: SourcePosition, op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            pos,
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty: None,
        }
    }

    pub fn unary(pos: SourcePosition, op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary {
            pos,
            op,
            operand: Box::new(operand),
            ty: None,
        }
    }

    pub fn pos(&self) -> &SourcePosition {
        match self {
            Expression::Boolean { pos, .. }
            | Expression::Int { pos, .. }
            | Expression::Float { pos, .. }
            | Expression::Str { pos, .. }
            | Expression::Null { pos }
            | Expression::Array { pos, .. }
            | Expression::Pair { pos, .. }
            | Expression::Map { pos, .. }
            | Expression::Struct { pos, .. }
            | Expression::Ident { pos, .. }
            | Expression::At { pos, .. }
            | Expression::GetMember { pos, .. }
            | Expression::IfThenElse { pos, .. }
            | Expression::Apply { pos, .. }
            | Expression::Binary { pos, .. }
            | Expression::Unary { pos, .. } => pos,
        }
    }

    /// The cached inferred type, if inference has run.
    pub fn get_type(&self) -> Option<&Type> {
        match self {
            Expression::Boolean { .. } => None,
            Expression::Int { .. } => None,
            Expression::Float { .. } => None,
            Expression::Null { .. } => None,
            Expression::Str { ty, .. }
            | Expression::Array { ty, .. }
            | Expression::Pair { ty, .. }
            | Expression::Map { ty, .. }
            | Expression::Struct { ty, .. }
            | Expression::Ident { ty, .. }
            | Expression::At { ty, .. }
            | Expression::GetMember { ty, .. }
            | Expression::IfThenElse { ty, .. }
            | Expression::Apply { ty, .. }
            | Expression::Binary { ty, .. }
            | Expression::Unary { ty, .. } => ty.as_ref(),
        }
    }

    /// Immediate child expressions (placeholder expressions included).
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Str { parts, .. } => parts
                .iter()
                .filter_map(|p| match p {
                    StringPart::Placeholder { expr, .. } => Some(expr.as_ref()),
                    StringPart::Text(_) => None,
                })
                .collect(),
            Expression::Array { items, .. } => items.iter().collect(),
            Expression::Pair { left, right, .. } => vec![left, right],
            Expression::Map { pairs, .. } => pairs
                .iter()
                .flat_map(|(k, v)| [k, v])
                .collect(),
            Expression::Struct { members, .. } => members.iter().map(|(_, e)| e).collect(),
            Expression::At { expr, index, .. } => vec![expr, index],
            Expression::GetMember { expr, .. } => vec![expr],
            Expression::IfThenElse {
                condition,
                consequent,
                alternative,
                ..
            } => vec![condition, consequent, alternative],
            Expression::Apply { arguments, .. } => arguments.iter().collect(),
            Expression::Binary { left, right, .. } => vec![left, right],
            Expression::Unary { operand, .. } => vec![operand],
            _ => vec![],
        }
    }

    /// If this expression is a constant literal, its value.
    pub fn literal(&self) -> Option<Value> {
        match self {
            Expression::Boolean { value, .. } => Some(Value::boolean(*value)),
            Expression::Int { value, .. } => Some(Value::int(*value)),
            Expression::Float { value, .. } => Some(Value::float(*value)),
            Expression::Null { .. } => Some(Value::null()),
            Expression::Str { parts, .. } => match parts.as_slice() {
                [] => Some(Value::string("")),
                [StringPart::Text(t)] => Some(Value::string(t.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Names this expression (transitively) reads from its environment. After
    /// inference these are the resolved binding prefixes (e.g. `t.out` for a
    /// call output), which workflow graph construction maps to node IDs.
    pub fn referenced_names(&self, out: &mut Vec<String>) {
        if let Expression::Ident {
            name,
            resolved_prefix,
            ..
        } = self
        {
            out.push(resolved_prefix.clone().unwrap_or_else(|| name.clone()));
        }
        for child in self.children() {
            child.referenced_names(out);
        }
    }
}

impl HasSourcePosition for Expression {
    fn source_position(&self) -> &SourcePosition {
        self.pos()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Boolean { value, .. } => write!(f, "{}", value),
            Expression::Int { value, .. } => write!(f, "{}", value),
            Expression::Float { value, .. } => write!(f, "{}", value),
            Expression::Null { .. } => write!(f, "None"),
            Expression::Str { parts, command, .. } => {
                if !command {
                    write!(f, "\"")?;
                }
                for part in parts {
                    match part {
                        StringPart::Text(t) => write!(f, "{}", t)?,
                        StringPart::Placeholder { expr, .. } => write!(f, "~{{{}}}", expr)?,
                    }
                }
                if !command {
                    write!(f, "\"")?;
                }
                Ok(())
            }
            Expression::Array { items, .. } => {
                write!(f, "[")?;
                for (i, e) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            Expression::Pair { left, right, .. } => write!(f, "({}, {})", left, right),
            Expression::Map { pairs, .. } => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expression::Struct { name, members, .. } => {
                write!(f, "{} {{", name.as_deref().unwrap_or("object"))?;
                for (i, (k, v)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Expression::Ident { name, .. } => write!(f, "{}", name),
            Expression::At { expr, index, .. } => write!(f, "{}[{}]", expr, index),
            Expression::GetMember { expr, member, .. } => write!(f, "{}.{}", expr, member),
            Expression::IfThenElse {
                condition,
                consequent,
                alternative,
                ..
            } => write!(f, "if {} then {} else {}", condition, consequent, alternative),
            Expression::Apply {
                function, arguments, ..
            } => {
                write!(f, "{}(", function)?;
                for (i, a) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expression::Binary { op, left, right, .. } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Expression::Unary { op, operand, .. } => {
                let s = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                write!(f, "{}{}", s, operand)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> SourcePosition {
        SourcePosition::new("t.wdl".into(), "t.wdl".into(), 1, 1, 1, 2)
    }

    #[test]
    fn literals() {
        assert!(Expression::boolean(pos(), true).literal().unwrap().as_bool().unwrap());
        assert_eq!(Expression::int(pos(), 7).literal().unwrap().as_int(), Some(7));
        assert_eq!(
            Expression::string_literal(pos(), "hi").literal().unwrap().as_string(),
            Some("hi")
        );
        assert!(Expression::ident(pos(), "x").literal().is_none());
    }

    #[test]
    fn display() {
        let e = Expression::binary(
            pos(),
            BinaryOp::Add,
            Expression::int(pos(), 1),
            Expression::int(pos(), 2),
        );
        assert_eq!(e.to_string(), "1 + 2");
        let m = Expression::get_member(pos(), Expression::ident(pos(), "p"), "left");
        assert_eq!(m.to_string(), "p.left");
    }

    #[test]
    fn referenced_names_collects_idents() {
        let e = Expression::binary(
            pos(),
            BinaryOp::Mul,
            Expression::ident(pos(), "x"),
            Expression::apply(pos(), "length", vec![Expression::ident(pos(), "ys")]),
        );
        let mut names = Vec::new();
        e.referenced_names(&mut names);
        assert_eq!(names, vec!["x".to_string(), "ys".to_string()]);
    }

    #[test]
    fn children_of_string_parts() {
        let s = Expression::string(
            pos(),
            vec![
                StringPart::Text("a".into()),
                StringPart::Placeholder {
                    options: vec![],
                    expr: Box::new(Expression::ident(pos(), "x")),
                },
            ],
        );
        assert_eq!(s.children().len(), 1);
    }
}
