//! Declaration parsing
//!
//! Handles `let`/`const` bindings, named `fun` declarations and `pattern`
//! declarations. Anonymous `fun (...) { ... }` expressions share the
//! parameter-list parser defined here.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// `let x = e;` / `const x = e;`
    pub(crate) fn parse_var_decl(&mut self) -> Result<AstNode, ParseError> {
        let start = self.current_span();
        let constant = matches!(self.advance().kind, TokenKind::Const);
        let name = self.expect_identifier()?;

        let init = if self.match_token(&TokenKind::Eq) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        if constant && init.is_none() {
            return Err(ParseError {
                message: format!("Constant '{}' must be initialized", name),
                location: start,
            });
        }

        let end = self.expect_semicolon("after variable declaration")?;
        Ok(AstNode::VarDecl {
            name,
            constant,
            init,
            span: start.to(end),
        })
    }

    /// `fun name(params) { body }`
    pub(crate) fn parse_function_def(&mut self) -> Result<AstNode, ParseError> {
        let start = self.expect_token(&TokenKind::Fun, "Expected 'fun'")?;
        let name = self.expect_identifier()?;
        let params = self.parse_params()?;
        let (body, end) = self.parse_braced_body("around function body")?;

        Ok(AstNode::FunctionDef {
            name,
            params,
            body,
            span: start.to(end),
        })
    }

    /// `fun (params) { body }` in expression position
    pub(crate) fn parse_function_expr(&mut self) -> Result<AstNode, ParseError> {
        let start = self.expect_token(&TokenKind::Fun, "Expected 'fun'")?;
        let params = self.parse_params()?;
        let (body, end) = self.parse_braced_body("around function body")?;

        Ok(AstNode::FunctionExpr {
            params,
            body,
            span: start.to(end),
        })
    }

    /// `pattern name(params)? { lexemes }`
    pub(crate) fn parse_pattern_def(&mut self) -> Result<AstNode, ParseError> {
        let start = self.expect_token(&TokenKind::Pattern, "Expected 'pattern'")?;
        let name = self.expect_identifier()?;
        let params = if self.check(&TokenKind::LParen) {
            self.parse_params()?
        } else {
            Vec::new()
        };

        self.expect_lbrace("before pattern body")?;
        let body = self.parse_lexeme_alternation()?;
        let end = self.expect_rbrace("after pattern body")?;

        Ok(AstNode::PatternDef {
            name,
            params,
            body,
            span: start.to(end),
        })
    }

    /// `(a, b = default, ...)`
    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect_lparen("before parameter list")?;
        let mut params = Vec::new();

        if !self.check(&TokenKind::RParen) {
            loop {
                let span = self.current_span();
                let name = self.expect_identifier()?;
                let default = if self.match_token(&TokenKind::Eq) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                params.push(Param {
                    name,
                    default,
                    span,
                });

                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect_rparen("after parameter list")?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::Parser;

    #[test]
    fn test_default_parameters() {
        let mut parser = Parser::new("fun f(a, b = 2) { return a + b; }").unwrap();
        let program = parser.parse_program().unwrap();
        match &program.nodes[0] {
            AstNode::FunctionDef { params, .. } => {
                assert_eq!(params.len(), 2);
                assert!(params[0].default.is_none());
                assert!(matches!(params[1].default, Some(AstNode::IntLiteral(2, _))));
            }
            other => panic!("Expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn test_const_requires_initializer() {
        let mut parser = Parser::new("const x;").unwrap();
        assert!(parser.parse_program().is_err());
    }

    #[test]
    fn test_pattern_without_params() {
        let mut parser = Parser::new(r#"pattern digit { "0".."9" }"#).unwrap();
        let program = parser.parse_program().unwrap();
        match &program.nodes[0] {
            AstNode::PatternDef { params, body, .. } => {
                assert!(params.is_empty());
                assert!(matches!(body, Lexeme::Range { from: '0', to: '9', .. }));
            }
            other => panic!("Expected pattern definition, got {:?}", other),
        }
    }
}
