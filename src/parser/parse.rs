//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and core parsing infrastructure,
//! including error types, helper methods, and the main parse entry point.
//!
//! # Parser Architecture
//!
//! The Parser uses a recursive descent approach with the following organization:
//! - This module: Parser struct, helper methods, and coordination
//! - `declarations`: `let`/`const`, `fun` and `pattern` declarations
//! - `statements`: control flow, tagged blocks and control statements
//! - `expressions`: expressions with precedence climbing
//! - `lexemes`: descriptive pattern bodies
//!
//! Parser methods are split across multiple files using `impl Parser` blocks.

use crate::parser::ast::*;
use crate::parser::lexer::{LexError, Lexer, Token, TokenKind};

/// Parser error type
#[derive(Debug, thiserror::Error)]
#[error("Parse error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct ParseError {
    pub message: String,
    pub location: Span,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            location: err.location,
        }
    }
}

/// Recursive descent parser for retrace modules
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse the entire module
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::new();

        while !self.is_at_end() {
            let stmt = self.parse_statement()?;
            program.nodes.push(stmt);
        }

        Ok(program)
    }

    // ===== Helper methods =====

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn check_ahead(&self, n: usize, kind: &TokenKind) -> bool {
        self.peek_ahead(n)
            .is_some_and(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(kind))
    }

    pub(crate) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.position += 1;
        }
        self.previous()
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    pub(crate) fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.position + n)
    }

    pub(crate) fn previous(&self) -> &Token {
        &self.tokens[self.position.saturating_sub(1)]
    }

    pub(crate) fn previous_span(&self) -> Span {
        self.previous().span
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.current_span(),
        }
    }

    pub(crate) fn expect_token(&mut self, kind: &TokenKind, message: &str) -> Result<Span, ParseError> {
        if self.check(kind) {
            Ok(self.advance().span)
        } else {
            Err(ParseError {
                message: format!("{}, found {}", message, self.peek()),
                location: self.current_span(),
            })
        }
    }

    pub(crate) fn expect_lparen(&mut self, ctx: &str) -> Result<Span, ParseError> {
        self.expect_token(&TokenKind::LParen, &format!("Expected '(' {ctx}"))
    }

    pub(crate) fn expect_rparen(&mut self, ctx: &str) -> Result<Span, ParseError> {
        self.expect_token(&TokenKind::RParen, &format!("Expected ')' {ctx}"))
    }

    pub(crate) fn expect_lbrace(&mut self, ctx: &str) -> Result<Span, ParseError> {
        self.expect_token(&TokenKind::LBrace, &format!("Expected '{{' {ctx}"))
    }

    pub(crate) fn expect_rbrace(&mut self, ctx: &str) -> Result<Span, ParseError> {
        self.expect_token(&TokenKind::RBrace, &format!("Expected '}}' {ctx}"))
    }

    pub(crate) fn expect_semicolon(&mut self, ctx: &str) -> Result<Span, ParseError> {
        self.expect_token(&TokenKind::Semicolon, &format!("Expected ';' {ctx}"))
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(ParseError {
                message: format!("Expected identifier, found {}", self.peek()),
                location: self.current_span(),
            })
        }
    }

    /// `{ stmt* }`, returning the statements and the span of the closing brace
    pub(crate) fn parse_braced_body(&mut self, ctx: &str) -> Result<(Vec<AstNode>, Span), ParseError> {
        self.expect_lbrace(ctx)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            body.push(self.parse_statement()?);
        }
        let end = self.expect_rbrace(ctx)?;
        Ok((body, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_function() {
        let source = "fun main() { return 0; }";
        let mut parser = Parser::new(source).unwrap();
        let program = parser.parse_program().unwrap();

        assert_eq!(program.nodes.len(), 1);
        match &program.nodes[0] {
            AstNode::FunctionDef {
                name, params, body, ..
            } => {
                assert_eq!(name, "main");
                assert_eq!(params.len(), 0);
                assert_eq!(body.len(), 1);
            }
            _ => panic!("Expected function definition"),
        }
    }

    #[test]
    fn test_parse_expression() {
        let source = "let x = 1 + 2 * 3;";
        let mut parser = Parser::new(source).unwrap();
        let program = parser.parse_program().unwrap();

        match &program.nodes[0] {
            AstNode::VarDecl {
                init: Some(init), ..
            } => match init.as_ref() {
                AstNode::BinaryOp {
                    op: BinOp::Add,
                    right,
                    ..
                } => assert!(matches!(
                    right.as_ref(),
                    AstNode::BinaryOp { op: BinOp::Mul, .. }
                )),
                other => panic!("Expected addition, got {:?}", other),
            },
            other => panic!("Expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pattern() {
        let source = r#"pattern main() { ("a" | "b") "c" }"#;
        let mut parser = Parser::new(source).unwrap();
        let program = parser.parse_program().unwrap();

        match &program.nodes[0] {
            AstNode::PatternDef { name, body, .. } => {
                assert_eq!(name, "main");
                match body {
                    Lexeme::Sequence(items, _) => {
                        assert_eq!(items.len(), 2);
                        assert!(matches!(items[0], Lexeme::Alternation(..)));
                    }
                    other => panic!("Expected sequence, got {:?}", other),
                }
            }
            other => panic!("Expected pattern definition, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_semicolon_reports_location() {
        let mut parser = Parser::new("let x = 1\nlet y = 2;").unwrap();
        let err = parser.parse_program().unwrap_err();
        assert!(err.message.contains("Expected ';'"));
        assert_eq!(err.location.line, 2);
    }
}
