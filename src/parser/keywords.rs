//! Reserved words and per-version grammar gates.

/// Words that can never be identifiers.
const KEYWORDS: &[&str] = &[
    "version",
    "import",
    "as",
    "alias",
    "task",
    "workflow",
    "struct",
    "scatter",
    "if",
    "then",
    "else",
    "call",
    "input",
    "output",
    "command",
    "runtime",
    "requirements",
    "hints",
    "meta",
    "parameter_meta",
    "in",
    "object",
    "after",
    "None",
];

pub fn is_keyword(word: &str, version: &str) -> bool {
    match word {
        // introduced in 1.1
        "after" | "None" => version_at_least(version, "1.1"),
        // 1.2 task sections
        "requirements" | "hints" => version_at_least(version, "1.2"),
        other => KEYWORDS.contains(&other),
    }
}

/// Grammar capabilities that differ between language versions.
#[derive(Debug, Clone, Copy)]
pub struct VersionGates {
    /// `Directory` is a primitive type.
    pub directory_type: bool,
    /// Untyped `object { ... }` literals accepted.
    pub object_literal: bool,
    /// `struct` typedefs accepted.
    pub structs: bool,
    /// `${...}` placeholders allowed in brace-style commands.
    pub dollar_placeholders_in_command: bool,
    /// `after` clauses on calls.
    pub call_after: bool,
    /// call inputs may omit the `input:` prefix.
    pub bare_call_inputs: bool,
    /// struct literals `Name { ... }` in expressions.
    pub struct_literals: bool,
}

pub fn gates(version: &str) -> VersionGates {
    VersionGates {
        directory_type: version_at_least(version, "1.2"),
        object_literal: !version_at_least(version, "1.1"),
        structs: version_at_least(version, "1.0"),
        dollar_placeholders_in_command: !version_at_least(version, "1.2"),
        call_after: version_at_least(version, "1.1"),
        bare_call_inputs: version_at_least(version, "1.2"),
        struct_literals: version_at_least(version, "1.0"),
    }
}

/// Order: draft-2 < 1.0 < 1.1 < 1.2 == development.
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    rank(version) >= rank(minimum)
}

fn rank(version: &str) -> u32 {
    match version {
        "draft-2" => 0,
        "1.0" => 10,
        "1.1" => 11,
        "1.2" => 12,
        "development" => 12,
        _ => 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_by_version() {
        assert!(is_keyword("task", "1.0"));
        assert!(is_keyword("scatter", "draft-2"));
        assert!(!is_keyword("after", "1.0"));
        assert!(is_keyword("after", "1.1"));
        assert!(!is_keyword("frobnicate", "1.2"));
    }

    #[test]
    fn version_ordering() {
        assert!(version_at_least("1.2", "1.0"));
        assert!(version_at_least("development", "1.2"));
        assert!(!version_at_least("draft-2", "1.0"));
    }

    #[test]
    fn gate_examples() {
        assert!(gates("1.0").object_literal);
        assert!(!gates("1.1").object_literal);
        assert!(gates("1.2").directory_type);
        assert!(!gates("1.0").directory_type);
        assert!(gates("draft-2").dollar_placeholders_in_command);
    }
}
