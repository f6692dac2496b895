//! Mode-aware lexer.
//!
//! Plain WDL code tokenizes with ordinary scanners, but string literals,
//! placeholders, and command bodies are context-sensitive: quotes nest
//! inside placeholders inside quotes, command braces must stay balanced
//! around shell syntax, and `$`/`~` only open a placeholder when followed by
//! `{`. The lexer resolves all of that here, emitting composite
//! [`Token::StringLit`]/[`Token::CommandLit`] tokens whose placeholder parts
//! carry their own token runs for the parser to consume.

use super::keywords::{gates, is_keyword};
use super::tokens::{LocatedToken, RawStringPart, Token};
use crate::error::{SourcePosition, WdlError};
use nom::InputTake;
use nom_locate::LocatedSpan;

pub type Span<'a> = LocatedSpan<&'a str>;

pub struct Lexer<'a> {
    uri: &'a str,
    abspath: &'a str,
    version: &'a str,
    dollar_commands: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(uri: &'a str, abspath: &'a str, version: &'a str) -> Self {
        Self {
            uri,
            abspath,
            version,
            dollar_commands: gates(version).dollar_placeholders_in_command,
        }
    }

    /// Tokenize an entire document.
    pub fn tokenize(&self, source: &'a str) -> Result<Vec<LocatedToken>, WdlError> {
        let mut span = Span::new(source);
        let mut out: Vec<LocatedToken> = Vec::new();
        loop {
            span = skip_trivia(span);
            if span.fragment().is_empty() {
                break;
            }
            let (rest, tok) = self.next_token(span)?;
            let is_command_kw = matches!(&tok.token, Token::Keyword(k) if k == "command");
            out.push(tok);
            span = rest;
            if is_command_kw {
                span = skip_trivia(span);
                let start = self.start_pos(span);
                if span.fragment().starts_with("<<<") {
                    let (rest, parts) = self.lex_heredoc(advance(span, 3))?;
                    out.push(LocatedToken::new(Token::CommandLit(parts), start));
                    span = rest;
                } else if span.fragment().starts_with('{') {
                    let (rest, parts) = self.lex_command_braces(advance(span, 1))?;
                    out.push(LocatedToken::new(Token::CommandLit(parts), start));
                    span = rest;
                } else {
                    return Err(self.syntax(span, "expected '{' or '<<<' after command"));
                }
            }
        }
        Ok(out)
    }

    fn start_pos(&self, span: Span<'_>) -> SourcePosition {
        SourcePosition::new(
            self.uri.to_string(),
            self.abspath.to_string(),
            span.location_line(),
            span.get_utf8_column() as u32,
            span.location_line(),
            span.get_utf8_column() as u32,
        )
    }

    fn token_pos(&self, start: Span<'_>, end: Span<'_>) -> SourcePosition {
        SourcePosition::new(
            self.uri.to_string(),
            self.abspath.to_string(),
            start.location_line(),
            start.get_utf8_column() as u32,
            end.location_line(),
            end.get_utf8_column() as u32,
        )
    }

    fn syntax(&self, span: Span<'_>, message: impl Into<String>) -> WdlError {
        WdlError::syntax(self.start_pos(span), message, self.version)
    }

    /// Scan one token (trivia already skipped, input non-empty).
    fn next_token(&self, span: Span<'a>) -> Result<(Span<'a>, LocatedToken), WdlError> {
        let fragment = span.fragment();
        let first = fragment.chars().next().unwrap();

        if first == '"' || first == '\'' {
            let start = span;
            let (rest, parts) = self.lex_string(advance(span, 1), first)?;
            return Ok((
                rest,
                LocatedToken::new(Token::StringLit(parts), self.token_pos(start, rest)),
            ));
        }

        // multi-character operators first
        for (text, token) in [
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::Lte),
            (">=", Token::Gte),
            ("&&", Token::AndAnd),
            ("||", Token::OrOr),
        ] {
            if fragment.starts_with(text) {
                let rest = advance(span, text.len());
                return Ok((
                    rest,
                    LocatedToken::new(token, self.token_pos(span, rest)),
                ));
            }
        }

        let simple = match first {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' => Some(Token::Bang),
            '=' => Some(Token::Assign),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            ',' => Some(Token::Comma),
            ':' => Some(Token::Colon),
            '?' => Some(Token::Question),
            _ => None,
        };
        if let Some(token) = simple {
            // '.' is punctuation unless it begins a member access after a
            // digit run, which the number scanner below handles first
            let rest = advance(span, 1);
            return Ok((rest, LocatedToken::new(token, self.token_pos(span, rest))));
        }
        if first == '.' {
            let rest = advance(span, 1);
            return Ok((
                rest,
                LocatedToken::new(Token::Dot, self.token_pos(span, rest)),
            ));
        }

        if first.is_ascii_digit() {
            return self.lex_number(span);
        }

        if first.is_ascii_alphabetic() {
            let len = fragment
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map(|(i, _)| i)
                .unwrap_or(fragment.len());
            let word = &fragment[..len];
            let rest = advance(span, len);
            let token = match word {
                "true" => Token::BoolLit(true),
                "false" => Token::BoolLit(false),
                w if is_keyword(w, self.version) => Token::Keyword(w.to_string()),
                w => Token::Ident(w.to_string()),
            };
            return Ok((rest, LocatedToken::new(token, self.token_pos(span, rest))));
        }

        Err(self.syntax(span, format!("unexpected character {:?}", first)))
    }

    fn lex_number(&self, span: Span<'a>) -> Result<(Span<'a>, LocatedToken), WdlError> {
        let fragment = span.fragment();
        let bytes = fragment.as_bytes();
        let mut i = 0;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let mut is_float = false;
        if i < bytes.len() && bytes[i] == b'.' && bytes.get(i + 1).map_or(false, |b| b.is_ascii_digit())
        {
            is_float = true;
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }
        if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
            let mut j = i + 1;
            if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                j += 1;
            }
            if j < bytes.len() && bytes[j].is_ascii_digit() {
                is_float = true;
                i = j;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
        }
        let text = &fragment[..i];
        let rest = advance(span, i);
        let token = if is_float {
            Token::FloatLit(text.parse::<f64>().map_err(|_| {
                self.syntax(span, format!("malformed float literal {}", text))
            })?)
        } else {
            Token::IntLit(text.parse::<i64>().map_err(|_| {
                self.syntax(span, format!("integer literal out of range: {}", text))
            })?)
        };
        Ok((rest, LocatedToken::new(token, self.token_pos(span, rest))))
    }

    /// Body of a quoted string (opening quote consumed).
    fn lex_string(
        &self,
        mut span: Span<'a>,
        quote: char,
    ) -> Result<(Span<'a>, Vec<RawStringPart>), WdlError> {
        let mut parts: Vec<RawStringPart> = Vec::new();
        let mut text = String::new();
        loop {
            let fragment = span.fragment();
            let mut chars = fragment.chars();
            let c = match chars.next() {
                Some(c) => c,
                None => return Err(self.syntax(span, "unterminated string literal")),
            };
            match c {
                '\n' => return Err(self.syntax(span, "newline in string literal")),
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| self.syntax(span, "unterminated string literal"))?;
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '\\' => text.push('\\'),
                        '\'' => text.push('\''),
                        '"' => text.push('"'),
                        '~' => text.push('~'),
                        '$' => text.push('$'),
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                    span = advance(span, 1 + escaped.len_utf8());
                }
                c if c == quote => {
                    span = advance(span, 1);
                    break;
                }
                '~' | '$' if fragment[c.len_utf8()..].starts_with('{') => {
                    if !text.is_empty() {
                        parts.push(RawStringPart::Text(std::mem::take(&mut text)));
                    }
                    let (rest, tokens) = self.lex_placeholder(advance(span, 2))?;
                    parts.push(RawStringPart::Placeholder(tokens));
                    span = rest;
                }
                other => {
                    text.push(other);
                    span = advance(span, other.len_utf8());
                }
            }
        }
        if !text.is_empty() {
            parts.push(RawStringPart::Text(text));
        }
        Ok((span, parts))
    }

    /// Token run between a placeholder opener and its balancing `}`.
    fn lex_placeholder(
        &self,
        mut span: Span<'a>,
    ) -> Result<(Span<'a>, Vec<LocatedToken>), WdlError> {
        let mut tokens = Vec::new();
        let mut depth: u32 = 0;
        loop {
            span = skip_trivia(span);
            if span.fragment().is_empty() {
                return Err(self.syntax(span, "unterminated placeholder"));
            }
            if span.fragment().starts_with('}') && depth == 0 {
                return Ok((advance(span, 1), tokens));
            }
            let (rest, tok) = self.next_token(span)?;
            match &tok.token {
                Token::LBrace => depth += 1,
                Token::RBrace => depth -= 1,
                _ => {}
            }
            tokens.push(tok);
            span = rest;
        }
    }

    /// Brace-delimited command body (opening `{` consumed). Shell braces
    /// must balance; `~{` always opens a placeholder, `${` per version.
    fn lex_command_braces(
        &self,
        mut span: Span<'a>,
    ) -> Result<(Span<'a>, Vec<RawStringPart>), WdlError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut depth: u32 = 1;
        loop {
            let fragment = span.fragment();
            let c = match fragment.chars().next() {
                Some(c) => c,
                None => return Err(self.syntax(span, "unterminated command")),
            };
            match c {
                '{' => {
                    depth += 1;
                    text.push('{');
                    span = advance(span, 1);
                }
                '}' => {
                    depth -= 1;
                    span = advance(span, 1);
                    if depth == 0 {
                        break;
                    }
                    text.push('}');
                }
                '~' if fragment[1..].starts_with('{') => {
                    if !text.is_empty() {
                        parts.push(RawStringPart::Text(std::mem::take(&mut text)));
                    }
                    let (rest, tokens) = self.lex_placeholder(advance(span, 2))?;
                    parts.push(RawStringPart::Placeholder(tokens));
                    span = rest;
                }
                '$' if self.dollar_commands && fragment[1..].starts_with('{') => {
                    if !text.is_empty() {
                        parts.push(RawStringPart::Text(std::mem::take(&mut text)));
                    }
                    let (rest, tokens) = self.lex_placeholder(advance(span, 2))?;
                    parts.push(RawStringPart::Placeholder(tokens));
                    span = rest;
                }
                other => {
                    text.push(other);
                    span = advance(span, other.len_utf8());
                }
            }
        }
        if !text.is_empty() {
            parts.push(RawStringPart::Text(text));
        }
        Ok((span, parts))
    }

    /// Heredoc command body (`<<<` consumed). Only `~{` placeholders.
    fn lex_heredoc(&self, mut span: Span<'a>) -> Result<(Span<'a>, Vec<RawStringPart>), WdlError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            let fragment = span.fragment();
            if fragment.is_empty() {
                return Err(self.syntax(span, "unterminated command (missing >>>)"));
            }
            if fragment.starts_with(">>>") {
                span = advance(span, 3);
                break;
            }
            if fragment.starts_with("~{") {
                if !text.is_empty() {
                    parts.push(RawStringPart::Text(std::mem::take(&mut text)));
                }
                let (rest, tokens) = self.lex_placeholder(advance(span, 2))?;
                parts.push(RawStringPart::Placeholder(tokens));
                span = rest;
                continue;
            }
            let c = fragment.chars().next().unwrap();
            text.push(c);
            span = advance(span, c.len_utf8());
        }
        if !text.is_empty() {
            parts.push(RawStringPart::Text(text));
        }
        Ok((span, parts))
    }
}

fn advance(span: Span<'_>, n: usize) -> Span<'_> {
    span.take_split(n).0
}

/// Skip whitespace, newlines, and `#` comments.
fn skip_trivia(mut span: Span<'_>) -> Span<'_> {
    loop {
        let fragment = span.fragment();
        let mut len = 0;
        for c in fragment.chars() {
            if c == ' ' || c == '\t' || c == '\r' || c == '\n' {
                len += c.len_utf8();
            } else {
                break;
            }
        }
        if len > 0 {
            span = advance(span, len);
            continue;
        }
        if span.fragment().starts_with('#') {
            let end = span
                .fragment()
                .find('\n')
                .unwrap_or_else(|| span.fragment().len());
            span = advance(span, end);
            continue;
        }
        return span;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new("t.wdl", "t.wdl", "1.0")
            .tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn simple_tokens() {
        let toks = lex("Int x = 40 + 2 # trailing comment");
        assert_eq!(
            toks,
            vec![
                Token::Ident("Int".into()),
                Token::Ident("x".into()),
                Token::Assign,
                Token::IntLit(40),
                Token::Plus,
                Token::IntLit(2),
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(lex("3.25"), vec![Token::FloatLit(3.25)]);
        assert_eq!(lex("1e3"), vec![Token::FloatLit(1000.0)]);
        // member access does not get eaten as a float
        assert_eq!(
            lex("a.b"),
            vec![
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("b".into())
            ]
        );
    }

    #[test]
    fn keywords_and_bools() {
        let toks = lex("task true false scatter");
        assert_eq!(
            toks,
            vec![
                Token::Keyword("task".into()),
                Token::BoolLit(true),
                Token::BoolLit(false),
                Token::Keyword("scatter".into()),
            ]
        );
    }

    #[test]
    fn string_with_placeholder() {
        let toks = lex("\"Hello, ~{who}!\"");
        match &toks[0] {
            Token::StringLit(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(parts[0], RawStringPart::Text("Hello, ".into()));
                match &parts[1] {
                    RawStringPart::Placeholder(inner) => {
                        assert_eq!(inner.len(), 1);
                        assert_eq!(inner[0].token, Token::Ident("who".into()));
                    }
                    other => panic!("unexpected {:?}", other),
                }
                assert_eq!(parts[2], RawStringPart::Text("!".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn string_escapes() {
        let toks = lex(r#""a\tb\"c\~{""#);
        match &toks[0] {
            Token::StringLit(parts) => {
                assert_eq!(parts, &vec![RawStringPart::Text("a\tb\"c~{".into())]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn nested_string_in_placeholder() {
        let toks = lex("\"~{sep=\", \" xs}\"");
        match &toks[0] {
            Token::StringLit(parts) => match &parts[0] {
                RawStringPart::Placeholder(inner) => {
                    assert_eq!(inner[0].token, Token::Ident("sep".into()));
                    assert_eq!(inner[1].token, Token::Assign);
                    assert!(matches!(inner[2].token, Token::StringLit(_)));
                    assert_eq!(inner[3].token, Token::Ident("xs".into()));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn command_braces_balance_shell_syntax() {
        let toks = lex("command { if true; then echo ${x}; fi; awk '{print $1}' }");
        assert_eq!(toks[0], Token::Keyword("command".into()));
        match &toks[1] {
            Token::CommandLit(parts) => {
                // text, placeholder(x), text (with the awk braces intact)
                assert_eq!(parts.len(), 3);
                match (&parts[0], &parts[2]) {
                    (RawStringPart::Text(a), RawStringPart::Text(b)) => {
                        assert!(a.contains("if true; then echo "));
                        assert!(b.contains("awk '{print $1}'"));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn heredoc_ignores_dollar() {
        let toks = lex("command <<< echo $HOME ~{who} >>>");
        match &toks[1] {
            Token::CommandLit(parts) => {
                assert_eq!(parts.len(), 3);
                match &parts[0] {
                    RawStringPart::Text(t) => assert!(t.contains("$HOME")),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dollar_placeholder_gated_by_version() {
        // in 1.2, ${} inside command{} is shell text, not a placeholder
        let toks12: Vec<Token> = Lexer::new("t.wdl", "t.wdl", "1.2")
            .tokenize("command { echo ${x} }")
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect();
        match &toks12[1] {
            Token::CommandLit(parts) => {
                assert_eq!(parts.len(), 1);
                assert!(matches!(&parts[0], RawStringPart::Text(t) if t.contains("${x}")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unterminated_string_errors() {
        let err = Lexer::new("t.wdl", "t.wdl", "1.0").tokenize("\"abc");
        assert!(err.is_err());
    }
}
