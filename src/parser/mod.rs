//! Versioned lexer and recursive-descent parser producing [`Document`]
//! trees.
//!
//! The [`lexer`] resolves the context-sensitive pieces of the grammar
//! (strings, placeholders, command bodies) into composite tokens; the
//! parser modules above it are plain recursive descent over a
//! [`stream::TokenStream`]. Grammar differences between `draft-2`, `1.0`,
//! `1.1`, `1.2`, and `development` documents are captured by
//! [`keywords::gates`].

pub mod declarations;
pub mod document;
pub mod expressions;
pub mod keywords;
pub mod lexer;
pub mod statements;
pub mod stream;
pub mod tasks;
pub mod types;
pub mod tokens;

pub use document::{detect_version, load, parse_and_check, parse_document};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::WorkflowElement;

    #[test]
    fn end_to_end_parse_and_check() {
        let doc = parse_and_check(
            r#"version 1.0
            task hello {
                input {
                    String who
                }
                command {
                    echo "Hello, ~{who}!"
                }
                output {
                    String out = read_string(stdout())
                }
            }
            workflow greet_all {
                input {
                    Array[String] names
                }
                scatter (name in names) {
                    call hello { input: who = name }
                }
                output {
                    Array[String] greetings = hello.out
                }
            }"#,
            "greet.wdl",
            true,
        )
        .unwrap();

        assert_eq!(doc.tasks.len(), 1);
        let wf = doc.workflow.as_ref().unwrap();
        match &wf.body[0] {
            WorkflowElement::Scatter(s) => {
                assert_eq!(s.variable, "name");
            }
            other => panic!("unexpected {:?}", other),
        }
        // gathered call output is Array[String] outside the scatter
        let outs = wf.effective_outputs();
        assert_eq!(
            outs.resolve("greetings").unwrap().to_string(),
            "Array[String]"
        );
    }

    #[test]
    fn validation_errors_accumulate() {
        let err = parse_and_check(
            r#"version 1.0
            workflow w {
                Int a = b
                Int c = "not coercible" + false
            }"#,
            "w.wdl",
            true,
        )
        .unwrap_err();
        let text = err.to_string();
        // both the unknown identifier and the bad operand surface at once
        assert!(text.contains("Unknown identifier"), "got: {}", text);
    }
}
