//! Lexer - turns source text into a token stream
//!
//! Lexical errors never abort: each one is recorded as a diagnostic and an
//! `Error` token is emitted in its place so the parser can keep going.

use crate::executor::types::ast::{Article, Preposition, Span};

use super::ParseError;

/* ===================== Tokens ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Then,
    Else,
    When,
    Match,
    Case,
    Otherwise,
    Each,
    Where,
    And,
    Or,
    Not,
    Is,
    Parallel,
    Contains,
    Matches,
    True,
    False,
    Null,
    Empty,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Keyword> {
        let kw = match word {
            "if" => Keyword::If,
            "then" => Keyword::Then,
            "else" => Keyword::Else,
            "when" => Keyword::When,
            "match" => Keyword::Match,
            "case" => Keyword::Case,
            "otherwise" => Keyword::Otherwise,
            "each" => Keyword::Each,
            "where" => Keyword::Where,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "is" => Keyword::Is,
            "parallel" => Keyword::Parallel,
            "contains" => Keyword::Contains,
            "matches" => Keyword::Matches,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "null" => Keyword::Null,
            "empty" => Keyword::Empty,
            _ => return None,
        };
        Some(kw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Article(Article),
    Preposition(Preposition),
    Keyword(Keyword),
    Str(String),
    Number(f64),
    Regex { pattern: String, flags: String },
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Lt,
    Gt,
    Le,
    Ge,
    /// `=`
    Assign,
    /// `==`
    EqEq,
    NotEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Colon,
    Comma,
    Dot,
    /// Placeholder for text that failed to lex
    Error,
    Eof,
}

impl TokenKind {
    /// Tokens after which a `/` is division rather than a regex
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::Str(_)
                | TokenKind::Regex { .. }
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::Gt
                | TokenKind::Keyword(
                    Keyword::True | Keyword::False | Keyword::Null | Keyword::Empty
                )
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Text of word-like tokens (identifiers, articles, prepositions, keywords)
    pub fn word<'s>(&self, source: &'s str) -> Option<&'s str> {
        match self.kind {
            TokenKind::Ident(_)
            | TokenKind::Article(_)
            | TokenKind::Preposition(_)
            | TokenKind::Keyword(_) => source.get(self.span.start..self.span.end),
            _ => None,
        }
    }
}

/* ===================== Lexer ===================== */

pub struct Lexer<'s> {
    source: &'s str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
    diagnostics: Vec<ParseError>,
}

/// Tokenize a source string, returning tokens (always ending in `Eof`) and
/// any lexical diagnostics
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<ParseError>) {
    let mut lexer = Lexer::new(source);
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            line: 0,
            col: 0,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn mark(&self) -> (usize, usize, usize) {
        (self.offset(), self.line, self.col)
    }

    fn span_from(&self, mark: (usize, usize, usize)) -> Span {
        Span::new(mark.0, self.offset(), mark.1, mark.2, self.line, self.col)
    }

    fn push(&mut self, kind: TokenKind, mark: (usize, usize, usize)) {
        let span = self.span_from(mark);
        self.tokens.push(Token { kind, span });
    }

    fn error(&mut self, message: impl Into<String>, mark: (usize, usize, usize)) {
        let span = self.span_from(mark);
        self.diagnostics.push(ParseError::Lexical {
            message: message.into(),
            span,
        });
        self.tokens.push(Token {
            kind: TokenKind::Error,
            span,
        });
    }

    fn previous_ends_operand(&self) -> bool {
        self.tokens
            .last()
            .map(|t| t.kind.ends_operand())
            .unwrap_or(false)
    }

    fn run(&mut self) {
        while let Some(c) = self.peek() {
            let mark = self.mark();
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '(' if self.peek_at(1) == Some('*') => self.block_comment(),
                '"' => self.double_quoted(),
                '\'' => self.single_quoted(),
                '/' if self.starts_regex() => self.regex(),
                c if c.is_ascii_digit() => self.number(),
                c if c.is_alphabetic() || c == '_' => self.word(),
                _ => self.punctuation(c, mark),
            }
        }
        let mark = self.mark();
        self.push(TokenKind::Eof, mark);
    }

    fn punctuation(&mut self, c: char, mark: (usize, usize, usize)) {
        self.bump();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '<' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Le
            }
            '<' => TokenKind::Lt,
            '>' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Ge
            }
            '>' => TokenKind::Gt,
            '=' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::EqEq
            }
            '=' => TokenKind::Assign,
            '!' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::NotEq
            }
            other => {
                self.error(format!("Unexpected character '{}'", other), mark);
                return;
            }
        };
        self.push(kind, mark);
    }

    /// `(* ... *)`, nesting allowed
    fn block_comment(&mut self) {
        let mark = self.mark();
        self.bump();
        self.bump();
        let mut depth = 1;
        while depth > 0 {
            match (self.peek(), self.peek_at(1)) {
                (Some('('), Some('*')) => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                (Some('*'), Some(')')) => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                }
                (Some(_), _) => {
                    self.bump();
                }
                (None, _) => {
                    self.error("Unterminated comment", mark);
                    return;
                }
            }
        }
    }

    fn word(&mut self) {
        let mark = self.mark();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[mark.0..self.offset()];
        let kind = if let Some(article) = Article::from_word(text) {
            TokenKind::Article(article)
        } else if let Some(prep) = Preposition::from_word(text) {
            TokenKind::Preposition(prep)
        } else if let Some(kw) = Keyword::from_word(text) {
            TokenKind::Keyword(kw)
        } else {
            TokenKind::Ident(text.to_string())
        };
        self.push(kind, mark);
    }

    /// Digits with optional `_` separators; `.` only counts when a digit follows
    fn number(&mut self) {
        let mark = self.mark();
        let mut text = String::new();
        self.digits(&mut text);
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            text.push('.');
            self.digits(&mut text);
        }
        match text.parse::<f64>() {
            Ok(n) => self.push(TokenKind::Number(n), mark),
            Err(_) => self.error(format!("Invalid number '{}'", text), mark),
        }
    }

    fn digits(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.bump();
            } else if c == '_' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn double_quoted(&mut self) {
        let mark = self.mark();
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.error("Unterminated string literal", mark);
                    return;
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    let escape_mark = self.mark();
                    self.bump();
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('0') => value.push('\0'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some('\'') => value.push('\''),
                        Some('u') => match self.unicode_escape() {
                            Some(c) => value.push(c),
                            None => {
                                let span = self.span_from(escape_mark);
                                self.diagnostics.push(ParseError::Lexical {
                                    message: "Invalid unicode escape".to_string(),
                                    span,
                                });
                            }
                        },
                        Some(other) => value.push(other),
                        None => {
                            self.error("Unterminated string literal", mark);
                            return;
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str(value), mark);
    }

    /// `\u{XXXX}` after the `u` has been consumed
    fn unicode_escape(&mut self) -> Option<char> {
        if self.peek() != Some('{') {
            return None;
        }
        self.bump();
        let mut hex = String::new();
        while let Some(c) = self.peek() {
            if c == '}' {
                break;
            }
            if !c.is_ascii_hexdigit() || hex.len() >= 6 {
                return None;
            }
            hex.push(c);
            self.bump();
        }
        if self.peek() != Some('}') {
            return None;
        }
        self.bump();
        u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
    }

    /// Raw string: only `\'` is an escape
    fn single_quoted(&mut self) {
        let mark = self.mark();
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.error("Unterminated string literal", mark);
                    return;
                }
                Some('\'') => {
                    self.bump();
                    break;
                }
                Some('\\') if self.peek_at(1) == Some('\'') => {
                    self.bump();
                    self.bump();
                    value.push('\'');
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str(value), mark);
    }

    fn starts_regex(&self) -> bool {
        let next_ok = self
            .peek_at(1)
            .is_some_and(|c| !c.is_whitespace() && c != '=');
        next_ok && !self.previous_ends_operand()
    }

    /// `/pattern/flags`; `\/` escapes the delimiter
    fn regex(&mut self) {
        let mark = self.mark();
        self.bump();
        let mut pattern = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.error("Unterminated regex literal", mark);
                    return;
                }
                Some('/') => {
                    self.bump();
                    break;
                }
                Some('\\') if self.peek_at(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    pattern.push('/');
                }
                Some('\\') => {
                    self.bump();
                    pattern.push('\\');
                    if let Some(c) = self.bump() {
                        pattern.push(c);
                    }
                }
                Some(c) => {
                    pattern.push(c);
                    self.bump();
                }
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                flags.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.push(TokenKind::Regex { pattern, flags }, mark);
    }
}
