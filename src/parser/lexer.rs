//! Lexer (tokenizer) for retrace source code
//!
//! Converts raw source text into a flat [`Token`] stream consumed by the parser.
//! Offsets are counted in characters so spans can be handed to the diagnostic
//! renderer unchanged.

use super::ast::Span;
use std::fmt;

/// All token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),

    Ident(String),
    /// `'name` block/loop tag
    Tag(String),

    // Keywords
    Let,
    Const,
    Fun,
    Pattern,
    If,
    Else,
    While,
    For,
    In,
    Exit,
    Next,
    Redo,
    Restart,
    Return,
    Fail,
    True,
    False,
    Nil,
    Ahead,
    Not,
    Atomic,

    // Arithmetic
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %

    // Comparison
    EqEq,  // ==
    NotEq, // !=
    Lt,    // <
    Le,    // <=
    Gt,    // >
    Ge,    // >=

    // Logical
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    // Assignment
    Eq,        // =
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=

    // Pattern operators
    Pipe,     // |
    Question, // ?
    Dollar,   // $
    DotDot,   // ..
    Ellipsis, // ...

    Dot,   // .
    Colon, // :

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Comma,     // ,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLiteral(n) => write!(f, "int literal {}", n),
            TokenKind::FloatLiteral(n) => write!(f, "float literal {}", n),
            TokenKind::StringLiteral(s) => write!(f, "string literal \"{}\"", s),
            TokenKind::Ident(s) => write!(f, "identifier '{}'", s),
            TokenKind::Tag(s) => write!(f, "tag '{}", s),
            TokenKind::Let => write!(f, "'let'"),
            TokenKind::Const => write!(f, "'const'"),
            TokenKind::Fun => write!(f, "'fun'"),
            TokenKind::Pattern => write!(f, "'pattern'"),
            TokenKind::If => write!(f, "'if'"),
            TokenKind::Else => write!(f, "'else'"),
            TokenKind::While => write!(f, "'while'"),
            TokenKind::For => write!(f, "'for'"),
            TokenKind::In => write!(f, "'in'"),
            TokenKind::Exit => write!(f, "'exit'"),
            TokenKind::Next => write!(f, "'next'"),
            TokenKind::Redo => write!(f, "'redo'"),
            TokenKind::Restart => write!(f, "'restart'"),
            TokenKind::Return => write!(f, "'return'"),
            TokenKind::Fail => write!(f, "'fail'"),
            TokenKind::True => write!(f, "'true'"),
            TokenKind::False => write!(f, "'false'"),
            TokenKind::Nil => write!(f, "'nil'"),
            TokenKind::Ahead => write!(f, "'ahead'"),
            TokenKind::Not => write!(f, "'not'"),
            TokenKind::Atomic => write!(f, "'atomic'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::EqEq => write!(f, "'=='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Le => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Ge => write!(f, "'>='"),
            TokenKind::AndAnd => write!(f, "'&&'"),
            TokenKind::OrOr => write!(f, "'||'"),
            TokenKind::Bang => write!(f, "'!'"),
            TokenKind::Eq => write!(f, "'='"),
            TokenKind::PlusEq => write!(f, "'+='"),
            TokenKind::MinusEq => write!(f, "'-='"),
            TokenKind::StarEq => write!(f, "'*='"),
            TokenKind::SlashEq => write!(f, "'/='"),
            TokenKind::PercentEq => write!(f, "'%='"),
            TokenKind::Pipe => write!(f, "'|'"),
            TokenKind::Question => write!(f, "'?'"),
            TokenKind::Dollar => write!(f, "'$'"),
            TokenKind::DotDot => write!(f, "'..'"),
            TokenKind::Ellipsis => write!(f, "'...'"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::Colon => write!(f, "':'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

/// A token together with the source span it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

/// Lexer error type
#[derive(Debug, thiserror::Error)]
#[error("Lexer error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct LexError {
    pub message: String,
    pub location: Span,
}

/// Lexer for retrace source code
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    /// Create a new lexer for the given source string.
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    span: self.span_from(self.position, self.line, self.column),
                });
                break;
            }

            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let (start, line, column) = (self.position, self.line, self.column);
        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of file".to_string(),
            location: Span::new(start, start, line, column),
        })?;

        let kind = match ch {
            '"' => self.string_literal(start, line, column)?,
            '0'..='9' => self.number_literal(ch, start, line, column)?,
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch),
            '\'' => {
                let first = self.peek().filter(|c| c.is_alphabetic() || *c == '_');
                match first {
                    Some(first) => {
                        self.advance();
                        TokenKind::Tag(self.read_identifier(first))
                    }
                    None => {
                        return Err(LexError {
                            message: "Expected tag name after '\\''".to_string(),
                            location: Span::new(start, self.position, line, column),
                        })
                    }
                }
            }

            '+' => self.with_eq(TokenKind::Plus, TokenKind::PlusEq),
            '-' => self.with_eq(TokenKind::Minus, TokenKind::MinusEq),
            '*' => self.with_eq(TokenKind::Star, TokenKind::StarEq),
            '/' => self.with_eq(TokenKind::Slash, TokenKind::SlashEq),
            '%' => self.with_eq(TokenKind::Percent, TokenKind::PercentEq),
            '=' => self.with_eq(TokenKind::Eq, TokenKind::EqEq),
            '!' => self.with_eq(TokenKind::Bang, TokenKind::NotEq),
            '<' => self.with_eq(TokenKind::Lt, TokenKind::Le),
            '>' => self.with_eq(TokenKind::Gt, TokenKind::Ge),
            '&' => {
                if self.peek() == Some('&') {
                    self.advance();
                    TokenKind::AndAnd
                } else {
                    return Err(LexError {
                        message: "Unexpected character '&' (did you mean '&&'?)".to_string(),
                        location: Span::new(start, self.position, line, column),
                    });
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            '.' => {
                if self.peek() == Some('.') {
                    self.advance();
                    if self.peek() == Some('.') {
                        self.advance();
                        TokenKind::Ellipsis
                    } else {
                        TokenKind::DotDot
                    }
                } else {
                    TokenKind::Dot
                }
            }
            '?' => TokenKind::Question,
            '$' => TokenKind::Dollar,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,

            _ => {
                return Err(LexError {
                    message: format!("Unexpected character '{}'", ch),
                    location: Span::new(start, self.position, line, column),
                })
            }
        };

        Ok(Token {
            kind,
            span: self.span_from(start, line, column),
        })
    }

    fn with_eq(&mut self, plain: TokenKind, with_eq: TokenKind) -> TokenKind {
        if self.peek() == Some('=') {
            self.advance();
            with_eq
        } else {
            plain
        }
    }

    fn string_literal(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<TokenKind, LexError> {
        let mut value = String::new();

        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        message: "Unterminated string literal".to_string(),
                        location: Span::new(start, self.position, line, column),
                    })
                }
                Some('"') => break,
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some(other) => {
                            return Err(LexError {
                                message: format!("Unknown escape sequence '\\{}'", other),
                                location: Span::new(start, self.position, line, column),
                            })
                        }
                        None => {
                            return Err(LexError {
                                message: "Unterminated string literal".to_string(),
                                location: Span::new(start, self.position, line, column),
                            })
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }

        Ok(TokenKind::StringLiteral(value))
    }

    fn number_literal(
        &mut self,
        first: char,
        start: usize,
        line: usize,
        column: usize,
    ) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            text.push(c);
            self.advance();
        }

        // `1..5` is a range, not a float
        let is_float = self.peek() == Some('.')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.advance();
            }
            return text
                .parse::<f64>()
                .map(TokenKind::FloatLiteral)
                .map_err(|_| LexError {
                    message: format!("Invalid float literal '{}'", text),
                    location: Span::new(start, self.position, line, column),
                });
        }

        text.parse::<i64>()
            .map(TokenKind::IntLiteral)
            .map_err(|_| LexError {
                message: format!("Integer literal '{}' is out of range", text),
                location: Span::new(start, self.position, line, column),
            })
    }

    fn identifier_or_keyword(&mut self, first: char) -> TokenKind {
        let ident = self.read_identifier(first);

        match ident.as_str() {
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "fun" => TokenKind::Fun,
            "pattern" => TokenKind::Pattern,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "exit" => TokenKind::Exit,
            "next" => TokenKind::Next,
            "redo" => TokenKind::Redo,
            "restart" => TokenKind::Restart,
            "return" => TokenKind::Return,
            "fail" => TokenKind::Fail,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            "ahead" => TokenKind::Ahead,
            "not" => TokenKind::Not,
            "atomic" => TokenKind::Atomic,
            _ => TokenKind::Ident(ident),
        }
    }

    fn read_identifier(&mut self, first: char) -> String {
        let mut ident = String::from(first);
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            ident.push(c);
            self.advance();
        }
        ident
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let (start, line, column) = (self.position, self.line, self.column);
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(LexError {
                                    message: "Unterminated block comment".to_string(),
                                    location: Span::new(start, self.position, line, column),
                                })
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn span_from(&self, start: usize, line: usize, column: usize) -> Span {
        Span::new(start, self.position, line, column)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_tags() {
        assert_eq!(
            kinds("'outer: while true { exit 'outer; }"),
            vec![
                TokenKind::Tag("outer".to_string()),
                TokenKind::Colon,
                TokenKind::While,
                TokenKind::True,
                TokenKind::LBrace,
                TokenKind::Exit,
                TokenKind::Tag("outer".to_string()),
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_range_is_not_float() {
        assert_eq!(
            kinds("1..5 2.5 ...x"),
            vec![
                TokenKind::IntLiteral(1),
                TokenKind::DotDot,
                TokenKind::IntLiteral(5),
                TokenKind::FloatLiteral(2.5),
                TokenKind::Ellipsis,
                TokenKind::Ident("x".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::StringLiteral("a\n\"b\"".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_spans_count_characters() {
        let tokens = Lexer::new("\"é\" + x").tokenize().unwrap();
        assert_eq!(tokens[2].span, Span::new(6, 7, 1, 7));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("a // line\n/* block */ b"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert!(err.message.contains("Unterminated"));
    }
}
