//! Token model produced by the lexer.
//!
//! String literals and command bodies are scanned into composite tokens
//! whose parts interleave literal text with placeholder token runs; the
//! parser later parses each placeholder run as an option list plus an
//! expression. This keeps the context-sensitive trickery (nested quotes,
//! brace balancing, `$`/`~` disambiguation) inside the lexer.

use crate::error::SourcePosition;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Keyword(String),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    /// Quoted string literal, possibly with `~{}`/`${}` placeholders.
    StringLit(Vec<RawStringPart>),
    /// `command { ... }` or `command <<< ... >>>` body.
    CommandLit(Vec<RawStringPart>),

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    AndAnd,
    OrOr,
    Bang,
    Assign,

    // delimiters and punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Question,
}

impl Token {
    /// Concise rendering for syntax error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier {}", s),
            Token::Keyword(s) => format!("keyword {}", s),
            Token::IntLit(n) => format!("integer {}", n),
            Token::FloatLit(f) => format!("float {}", f),
            Token::BoolLit(b) => format!("{}", b),
            Token::StringLit(_) => "string literal".to_string(),
            Token::CommandLit(_) => "command body".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Lte => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Gte => "'>='".to_string(),
            Token::AndAnd => "'&&'".to_string(),
            Token::OrOr => "'||'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::Assign => "'='".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Question => "'?'".to_string(),
        }
    }
}

/// One segment of a string/command literal as scanned.
#[derive(Debug, Clone, PartialEq)]
pub enum RawStringPart {
    Text(String),
    /// Tokens between `~{`/`${` and the balancing `}`.
    Placeholder(Vec<LocatedToken>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedToken {
    pub token: Token,
    pub pos: SourcePosition,
}

impl LocatedToken {
    pub fn new(token: Token, pos: SourcePosition) -> Self {
        Self { token, pos }
    }
}
