//! Cursor over the lexer's token vector, with the conveniences the
//! recursive-descent parser leans on (peeking, expecting, positioned syntax
//! errors).

use super::tokens::{LocatedToken, Token};
use crate::error::{SourcePosition, WdlError};

pub struct TokenStream {
    tokens: Vec<LocatedToken>,
    index: usize,
    uri: String,
    abspath: String,
    version: String,
}

impl TokenStream {
    pub fn new(tokens: Vec<LocatedToken>, uri: &str, abspath: &str, version: &str) -> Self {
        Self {
            tokens,
            index: 0,
            uri: uri.to_string(),
            abspath: abspath.to_string(),
            version: version.to_string(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn at_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|t| &t.token)
    }

    pub fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset).map(|t| &t.token)
    }

    /// Position of the next token (or of the end of input).
    pub fn pos(&self) -> SourcePosition {
        match self.tokens.get(self.index).or_else(|| self.tokens.last()) {
            Some(t) => t.pos.clone(),
            None => SourcePosition::new(self.uri.clone(), self.abspath.clone(), 1, 1, 1, 1),
        }
    }

    pub fn next(&mut self) -> Option<LocatedToken> {
        let t = self.tokens.get(self.index).cloned();
        if t.is_some() {
            self.index += 1;
        }
        t
    }

    pub fn error(&self, message: impl Into<String>) -> WdlError {
        WdlError::syntax(self.pos(), message, &self.version)
    }

    /// Consume the next token if it equals `token`.
    pub fn accept(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, token: &Token) -> Result<(), WdlError> {
        if self.accept(token) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                token.describe(),
                self.describe_next()
            )))
        }
    }

    pub fn accept_keyword(&mut self, word: &str) -> bool {
        match self.peek() {
            Some(Token::Keyword(k)) if k == word => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    pub fn expect_keyword(&mut self, word: &str) -> Result<(), WdlError> {
        if self.accept_keyword(word) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected keyword {}, found {}",
                word,
                self.describe_next()
            )))
        }
    }

    pub fn expect_ident(&mut self) -> Result<String, WdlError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.index += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected identifier, found {}", self.describe_next()))),
        }
    }

    pub fn describe_next(&self) -> String {
        match self.peek() {
            Some(t) => t.describe(),
            None => "end of input".to_string(),
        }
    }
}
