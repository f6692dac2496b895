//! # sluice
//!
//! Workflow Description Language (WDL) parser, static analysis, and local
//! workflow runtime.
//!
//! The front-end lexes and parses WDL documents across language versions
//! (draft-2 through 1.2/development) into a typed syntax tree, resolves
//! imports and struct typedefs, and typechecks tasks and workflows with
//! polymorphic coercion rules. The runtime compiles workflows into a
//! dependency-labeled plan, drives it with a cooperative state machine,
//! executes task commands through a pluggable container backend, and
//! memoizes task results in a content-addressed call cache.

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]

pub mod env;
pub mod error;
pub mod expr;
pub mod parser;
pub mod runtime;
pub mod stdlib;
pub mod tree;
pub mod types;
pub mod value;
pub mod walker;

pub use env::{Binding, Bindings};
pub use error::{HasSourcePosition, MultiErrorContext, SourcePosition, WdlError};
pub use expr::{BinaryOp, Expression, StringPart, UnaryOp};
pub use parser::{detect_version, load, parse_and_check, parse_document};
pub use runtime::{Config, RunContext, RuntimeError, RuntimeResult};
pub use tree::{Call, Conditional, Declaration, Document, Scatter, Task, Workflow};
pub use types::Type;
pub use value::Value;

/// Build a typed input environment from run-input JSON.
///
/// Keys may be plain input names or dot-namespaced (`wf.who`, or
/// `wf.call.threads` to address a call's own inputs); a leading
/// `<target_name>.` prefix is stripped. Keys beginning with `#` are
/// comments. Unknown plain names are rejected.
pub fn inputs_from_json(
    json: &serde_json::Value,
    target_name: &str,
    available: &Bindings<Type>,
) -> Result<Bindings<Value>, WdlError> {
    let obj = json
        .as_object()
        .ok_or_else(|| WdlError::input("run inputs must be a JSON object"))?;
    let prefix = format!("{}.", target_name);
    let mut out = Bindings::new();
    for (key, jvalue) in obj {
        if key.starts_with('#') {
            continue;
        }
        let name = key.strip_prefix(&prefix).unwrap_or(key);
        match available.resolve(name) {
            Some(ty) => {
                let v = Value::from_json_typed(ty, jvalue.clone()).map_err(|e| {
                    WdlError::input(format!("input {}: {}", key, e))
                })?;
                out = out.bind(name.to_string(), v, None);
            }
            None if name.contains('.') => {
                // call-addressed input; typechecked when the call launches
                out = out.bind(name.to_string(), Value::from_json(jvalue.clone()), None);
            }
            None => {
                return Err(WdlError::input(format!("no such input {}", key)));
            }
        }
    }
    Ok(out)
}

/// Project run outputs to JSON with dot-namespaced keys
/// (`<target_name>.<output>`).
pub fn outputs_to_json(outputs: &Bindings<Value>, target_name: &str) -> serde_json::Value {
    let mut entries: Vec<(String, serde_json::Value)> = outputs
        .iter()
        .map(|b| (format!("{}.{}", target_name, b.name()), b.value().to_json()))
        .collect();
    entries.reverse();
    let obj: serde_json::Map<String, serde_json::Value> = entries.into_iter().collect();
    serde_json::Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_from_json_namespacing() {
        let available = Bindings::new()
            .bind("who".to_string(), Type::string(false), None)
            .bind("n".to_string(), Type::int(false), None);
        let json = serde_json::json!({
            "hello.who": "Alyssa",
            "n": "42",
            "hello.greet.threads": 4,
            "#comment": "ignored"
        });
        let inputs = inputs_from_json(&json, "hello", &available).unwrap();
        assert_eq!(inputs.resolve("who").unwrap().as_string(), Some("Alyssa"));
        // string-to-int coercion applies from JSON as well
        assert_eq!(inputs.resolve("n").unwrap().as_int(), Some(42));
        assert!(inputs.has_binding("greet.threads"));

        let bad = serde_json::json!({"nope": 1});
        assert!(inputs_from_json(&bad, "hello", &available).is_err());
    }

    #[test]
    fn outputs_to_json_namespaced() {
        let outputs = Bindings::new().bind("out".to_string(), Value::string("x"), None);
        let json = outputs_to_json(&outputs, "hello");
        assert_eq!(json["hello.out"], serde_json::json!("x"));
    }
}
