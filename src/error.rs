//! Source positions and the WDL error taxonomy.
//!
//! Everything that can go wrong while loading, checking, or evaluating a WDL
//! document is a variant of [`WdlError`]. Static validation errors carry a
//! [`SourcePosition`] and may be accumulated into a single
//! `MultipleValidation` report via [`MultiErrorContext`], so the typechecker
//! can surface as many problems as it finds in one pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Position of a syntax construct within a source document.
///
/// Lines and columns are one-based. `uri` is the name the document was loaded
/// or imported as (possibly relative); `abspath` the resolved filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourcePosition {
    pub uri: String,
    pub abspath: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourcePosition {
    pub fn new(
        uri: String,
        abspath: String,
        line: u32,
        column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            uri,
            abspath,
            line,
            column,
            end_line,
            end_column,
        }
    }

    /// Placeholder position for errors raised outside any source context.
    pub fn unknown() -> Self {
        Self::new(String::new(), String::new(), 0, 0, 0, 0)
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.uri.is_empty() {
            "(unknown)"
        } else {
            &self.uri
        };
        write!(f, "({} Ln {}, Col {})", name, self.line, self.column)
    }
}

/// Sum of all error kinds raised by the front-end and the runtime.
#[derive(Error, Debug)]
pub enum WdlError {
    /// The document failed to lex/parse.
    #[error("{pos} Syntax error: {message}")]
    Syntax {
        pos: SourcePosition,
        message: String,
        wdl_version: String,
        declared_wdl_version: Option<String>,
    },

    /// An imported document could not be retrieved or loaded.
    #[error("{pos} Failed to import {uri}: {message}")]
    Import {
        pos: SourcePosition,
        uri: String,
        message: String,
    },

    /// Document parses but fails a static check (generic).
    #[error("{pos} {message}")]
    Validation { pos: SourcePosition, message: String },

    /// A type declaration is malformed (e.g. Map with compound key).
    #[error("{pos} Invalid type: {message}")]
    InvalidType { pos: SourcePosition, message: String },

    /// An expression's type cannot be determined statically.
    #[error("{pos} Indeterminate type: {message}")]
    IndeterminateType { pos: SourcePosition, message: String },

    #[error("{pos} Unknown identifier {name}")]
    UnknownIdentifier { pos: SourcePosition, name: String },

    #[error("{pos} No such task or workflow: {name}")]
    NoSuchTask { pos: SourcePosition, name: String },

    #[error("{pos} No such call in this workflow: {name}")]
    NoSuchCall { pos: SourcePosition, name: String },

    #[error("{pos} No such function: {name}")]
    NoSuchFunction { pos: SourcePosition, name: String },

    #[error("{pos} No such input {name}")]
    NoSuchInput { pos: SourcePosition, name: String },

    #[error("{pos} No such member '{member}'")]
    NoSuchMember { pos: SourcePosition, member: String },

    #[error("{pos} {function} expects {expected} argument(s), got {actual}")]
    WrongArity {
        pos: SourcePosition,
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("{pos} Not an array")]
    NotAnArray { pos: SourcePosition },

    #[error("{pos} Empty array for Array+ input/declaration")]
    EmptyArray { pos: SourcePosition },

    #[error("{pos} {message}")]
    StaticTypeMismatch {
        pos: SourcePosition,
        expected: String,
        actual: String,
        message: String,
    },

    #[error("{pos} Incompatible operand: {message}")]
    IncompatibleOperand { pos: SourcePosition, message: String },

    #[error("{pos} Multiple definitions: {message}")]
    MultipleDefinitions { pos: SourcePosition, message: String },

    #[error("{pos} Stray input declaration: {message}")]
    StrayInputDeclaration { pos: SourcePosition, message: String },

    #[error("{pos} Circular dependencies involving {name}")]
    CircularDependencies { pos: SourcePosition, name: String },

    #[error("{pos} Cannot call subworkflow {name}: missing required call inputs or no output section")]
    UncallableWorkflow { pos: SourcePosition, name: String },

    /// Several validation errors, reported together sorted by position.
    #[error("{}", render_multiple(.errors))]
    MultipleValidation { errors: Vec<WdlError> },

    /// An expression evaluated but failed (division by zero, bad runtime
    /// coercion, etc).
    #[error("{pos} {message}")]
    Eval { pos: SourcePosition, message: String },

    #[error("{pos} Array or map index out of bounds: {message}")]
    OutOfBounds { pos: SourcePosition, message: String },

    #[error("{pos} Null value where a non-optional value is required")]
    NullValue { pos: SourcePosition },

    /// Runtime failure not tied to a source position.
    #[error("{message}")]
    Runtime { message: String },

    /// Bad input file or malformed input JSON.
    #[error("Input error: {message}")]
    Input { message: String },
}

fn render_multiple(errors: &[WdlError]) -> String {
    let mut s = format!("{} validation errors", errors.len());
    for e in errors {
        s.push('\n');
        s.push_str(&e.to_string());
    }
    s
}

impl WdlError {
    /// The source position this error pins to, if any.
    pub fn source_position(&self) -> Option<&SourcePosition> {
        use WdlError::*;
        match self {
            Syntax { pos, .. }
            | Import { pos, .. }
            | Validation { pos, .. }
            | InvalidType { pos, .. }
            | IndeterminateType { pos, .. }
            | UnknownIdentifier { pos, .. }
            | NoSuchTask { pos, .. }
            | NoSuchCall { pos, .. }
            | NoSuchFunction { pos, .. }
            | NoSuchInput { pos, .. }
            | NoSuchMember { pos, .. }
            | WrongArity { pos, .. }
            | NotAnArray { pos }
            | EmptyArray { pos }
            | StaticTypeMismatch { pos, .. }
            | IncompatibleOperand { pos, .. }
            | MultipleDefinitions { pos, .. }
            | StrayInputDeclaration { pos, .. }
            | CircularDependencies { pos, .. }
            | UncallableWorkflow { pos, .. }
            | Eval { pos, .. }
            | OutOfBounds { pos, .. }
            | NullValue { pos } => Some(pos),
            MultipleValidation { errors } => errors.first().and_then(|e| e.source_position()),
            Runtime { .. } | Input { .. } => None,
        }
    }

    pub fn validation(pos: SourcePosition, message: impl Into<String>) -> Self {
        WdlError::Validation {
            pos,
            message: message.into(),
        }
    }

    pub fn syntax(pos: SourcePosition, message: impl Into<String>, wdl_version: &str) -> Self {
        WdlError::Syntax {
            pos,
            message: message.into(),
            wdl_version: wdl_version.to_string(),
            declared_wdl_version: None,
        }
    }

    pub fn eval(pos: SourcePosition, message: impl Into<String>) -> Self {
        WdlError::Eval {
            pos,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        WdlError::Runtime {
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        WdlError::Input {
            message: message.into(),
        }
    }

    /// Static mismatch with the conventional hints appended when the caller
    /// doesn't supply its own message.
    pub fn static_mismatch(
        pos: SourcePosition,
        expected: impl Into<String>,
        actual: impl Into<String>,
        message: &str,
    ) -> Self {
        let expected = expected.into();
        let actual = actual.into();
        let message = if message.is_empty() {
            let mut m = format!("Expected {} instead of {}", expected, actual);
            if expected == "Int" && actual == "Float" {
                m.push_str("; perhaps try floor() or round()");
            } else if actual.trim_end_matches('?') == expected {
                m.push_str(
                    " -- to coerce T? into T, try select_first([x, default]) or select_first([x])",
                );
            }
            m
        } else {
            message.to_string()
        };
        WdlError::StaticTypeMismatch {
            pos,
            expected,
            actual,
            message,
        }
    }

    /// Collapse a batch of validation errors into one, sorted by position.
    pub fn multiple(mut errors: Vec<WdlError>) -> Self {
        errors.sort_by(|a, b| match (a.source_position(), b.source_position()) {
            (Some(pa), Some(pb)) => pa.cmp(pb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        WdlError::MultipleValidation { errors }
    }
}

/// Accumulates validation errors so checking can proceed past the first
/// failure, then reports the batch at document scope.
#[derive(Default)]
pub struct MultiErrorContext {
    errors: Vec<WdlError>,
}

impl MultiErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, capturing any error it returns. Yields the result on success.
    pub fn try_with<T, F>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce() -> Result<T, WdlError>,
    {
        match f() {
            Ok(x) => Some(x),
            Err(e) => {
                self.append(e);
                None
            }
        }
    }

    /// Add an error to the batch; nested multi-errors are flattened.
    pub fn append(&mut self, error: WdlError) {
        match error {
            WdlError::MultipleValidation { errors } => self.errors.extend(errors),
            other => self.errors.push(other),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Fail with the accumulated errors, or succeed if there were none.
    pub fn maybe_raise(self) -> Result<(), WdlError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.into_iter().next().unwrap()),
            _ => Err(WdlError::multiple(self.errors)),
        }
    }
}

/// Implemented by every AST node so diagnostics can pin to the source.
pub trait HasSourcePosition {
    fn source_position(&self) -> &SourcePosition;
}
