//! Statement parsing implementation
//!
//! # Supported Statements
//!
//! - Declarations: `let`, `const`, `fun`, `pattern`
//! - Control flow: `if`/`else`, `while`, `for ... in`
//! - Tagged loops and blocks: `'tag: while ...`, `'tag: { ... }`
//! - Control statements: `exit`, `next`, `redo`, `restart`, `return`
//! - `fail;`
//! - Assignments and expression statements
//!
//! All parsing methods are implemented as `pub(crate)` methods on the [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// Parse a single statement
    pub(crate) fn parse_statement(&mut self) -> Result<AstNode, ParseError> {
        match &self.peek().kind {
            TokenKind::Let | TokenKind::Const => self.parse_var_decl(),
            TokenKind::Fun if self.check_ahead(1, &TokenKind::Ident(String::new())) => {
                self.parse_function_def()
            }
            TokenKind::Pattern => self.parse_pattern_def(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(None),
            TokenKind::For => self.parse_for(None),
            TokenKind::LBrace => self.parse_block(None),
            TokenKind::Tag(tag) => {
                let tag = tag.clone();
                self.parse_tagged(tag)
            }
            TokenKind::Exit => self.parse_control(ControlKind::Exit),
            TokenKind::Next => self.parse_control(ControlKind::Next),
            TokenKind::Redo => self.parse_control(ControlKind::Redo),
            TokenKind::Restart => self.parse_control(ControlKind::Restart),
            TokenKind::Return => self.parse_control(ControlKind::Return),
            TokenKind::Fail => {
                let start = self.advance().span;
                let end = self.expect_semicolon("after 'fail'")?;
                Ok(AstNode::Fail(start.to(end)))
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// `'tag: while/for/{`
    fn parse_tagged(&mut self, tag: String) -> Result<AstNode, ParseError> {
        let start = self.advance().span;
        self.expect_token(&TokenKind::Colon, "Expected ':' after tag")?;

        let node = match self.peek().kind {
            TokenKind::While => self.parse_while(Some(tag))?,
            TokenKind::For => self.parse_for(Some(tag))?,
            TokenKind::LBrace => self.parse_block(Some(tag))?,
            _ => {
                return Err(self.error_here(format!(
                    "Expected 'while', 'for' or '{{' after tag, found {}",
                    self.peek()
                )))
            }
        };

        // Widen the span so diagnostics include the tag
        Ok(match node {
            AstNode::While {
                tag,
                condition,
                body,
                span,
            } => AstNode::While {
                tag,
                condition,
                body,
                span: start.to(span),
            },
            AstNode::For {
                tag,
                var,
                iterable,
                body,
                span,
            } => AstNode::For {
                tag,
                var,
                iterable,
                body,
                span: start.to(span),
            },
            AstNode::Block { tag, body, span } => AstNode::Block {
                tag,
                body,
                span: start.to(span),
            },
            other => other,
        })
    }

    fn parse_block(&mut self, tag: Option<String>) -> Result<AstNode, ParseError> {
        let start = self.current_span();
        let (body, end) = self.parse_braced_body("around block")?;
        Ok(AstNode::Block {
            tag,
            body,
            span: start.to(end),
        })
    }

    fn parse_if(&mut self) -> Result<AstNode, ParseError> {
        let start = self.expect_token(&TokenKind::If, "Expected 'if'")?;
        let condition = Box::new(self.parse_expression()?);
        let (then_branch, mut end) = self.parse_braced_body("around 'if' body")?;

        let else_branch = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let nested = self.parse_if()?;
                end = nested.span();
                Some(vec![nested])
            } else {
                let (body, close) = self.parse_braced_body("around 'else' body")?;
                end = close;
                Some(body)
            }
        } else {
            None
        };

        Ok(AstNode::If {
            condition,
            then_branch,
            else_branch,
            span: start.to(end),
        })
    }

    fn parse_while(&mut self, tag: Option<String>) -> Result<AstNode, ParseError> {
        let start = self.expect_token(&TokenKind::While, "Expected 'while'")?;
        let condition = Box::new(self.parse_expression()?);
        let (body, end) = self.parse_braced_body("around 'while' body")?;

        Ok(AstNode::While {
            tag,
            condition,
            body,
            span: start.to(end),
        })
    }

    fn parse_for(&mut self, tag: Option<String>) -> Result<AstNode, ParseError> {
        let start = self.expect_token(&TokenKind::For, "Expected 'for'")?;
        let var = self.expect_identifier()?;
        self.expect_token(&TokenKind::In, "Expected 'in' after loop variable")?;
        let iterable = Box::new(self.parse_expression()?);
        let (body, end) = self.parse_braced_body("around 'for' body")?;

        Ok(AstNode::For {
            tag,
            var,
            iterable,
            body,
            span: start.to(end),
        })
    }

    /// `exit 'tag?;`, `return e?;` and friends
    fn parse_control(&mut self, kind: ControlKind) -> Result<AstNode, ParseError> {
        let start = self.advance().span;

        let tag = if let TokenKind::Tag(tag) = &self.peek().kind {
            let tag = tag.clone();
            self.advance();
            Some(tag)
        } else {
            None
        };

        let value = if kind == ControlKind::Return && !self.check(&TokenKind::Semicolon) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        let end = self.expect_semicolon(&format!("after '{}'", kind))?;
        Ok(AstNode::Control {
            kind,
            tag,
            value,
            span: start.to(end),
        })
    }

    /// Expression statement, or an assignment when followed by `=`/`op=`
    fn parse_expression_statement(&mut self) -> Result<AstNode, ParseError> {
        let expr = self.parse_expression()?;
        let start = expr.span();

        let op = match self.peek().kind {
            TokenKind::Eq => Some(None),
            TokenKind::PlusEq => Some(Some(BinOp::Add)),
            TokenKind::MinusEq => Some(Some(BinOp::Sub)),
            TokenKind::StarEq => Some(Some(BinOp::Mul)),
            TokenKind::SlashEq => Some(Some(BinOp::Div)),
            TokenKind::PercentEq => Some(Some(BinOp::Mod)),
            _ => None,
        };

        if let Some(op) = op {
            if !matches!(
                expr,
                AstNode::Identifier(..) | AstNode::Index { .. } | AstNode::Field { .. }
            ) {
                return Err(ParseError {
                    message: "Invalid assignment target".to_string(),
                    location: start,
                });
            }
            self.advance();
            let value = Box::new(self.parse_expression()?);
            let end = self.expect_semicolon("after assignment")?;
            return Ok(AstNode::Assignment {
                target: Box::new(expr),
                op,
                value,
                span: start.to(end),
            });
        }

        let end = self.expect_semicolon("after expression")?;
        Ok(AstNode::ExpressionStatement {
            expr: Box::new(expr),
            span: start.to(end),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::Parser;

    fn parse(src: &str) -> Program {
        Parser::new(src).unwrap().parse_program().unwrap()
    }

    #[test]
    fn test_tagged_block_and_exit() {
        let program = parse("'foo: { exit 'foo; }");
        match &program.nodes[0] {
            AstNode::Block { tag, body, .. } => {
                assert_eq!(tag.as_deref(), Some("foo"));
                assert!(matches!(
                    &body[0],
                    AstNode::Control { kind: ControlKind::Exit, tag: Some(t), .. } if t == "foo"
                ));
            }
            other => panic!("Expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain() {
        let program = parse("if a { x = 1; } else if b { x = 2; } else { x = 3; }");
        match &program.nodes[0] {
            AstNode::If {
                else_branch: Some(else_branch),
                ..
            } => assert!(matches!(
                &else_branch[0],
                AstNode::If {
                    else_branch: Some(_),
                    ..
                }
            )),
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_compound_assignment() {
        let program = parse("a[0] += 2;");
        assert!(matches!(
            &program.nodes[0],
            AstNode::Assignment {
                op: Some(BinOp::Add),
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let mut parser = Parser::new("1 = 2;").unwrap();
        assert!(parser.parse_program().is_err());
    }

    #[test]
    fn test_anonymous_function_statement() {
        let program = parse("let f = fun (x) { return x; };");
        assert!(matches!(
            &program.nodes[0],
            AstNode::VarDecl { init: Some(init), .. } if matches!(init.as_ref(), AstNode::FunctionExpr { .. })
        ));
    }
}
