//! Expression parsing implementation
//!
//! Binary operators are parsed by precedence climbing; everything else is
//! plain recursive descent.
//!
//! # Precedence (lowest first)
//!
//! `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`, unary `- !`,
//! postfix `()` `[]` `.`

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// Parse expression (top-level entry point)
    pub(crate) fn parse_expression(&mut self) -> Result<AstNode, ParseError> {
        self.parse_binary(0)
    }

    fn binary_op(kind: &TokenKind) -> Option<(BinOp, u8)> {
        let entry = match kind {
            TokenKind::OrOr => (BinOp::Or, 1),
            TokenKind::AndAnd => (BinOp::And, 2),
            TokenKind::EqEq => (BinOp::Eq, 3),
            TokenKind::NotEq => (BinOp::Ne, 3),
            TokenKind::Lt => (BinOp::Lt, 4),
            TokenKind::Le => (BinOp::Le, 4),
            TokenKind::Gt => (BinOp::Gt, 4),
            TokenKind::Ge => (BinOp::Ge, 4),
            TokenKind::Plus => (BinOp::Add, 5),
            TokenKind::Minus => (BinOp::Sub, 5),
            TokenKind::Star => (BinOp::Mul, 6),
            TokenKind::Slash => (BinOp::Div, 6),
            TokenKind::Percent => (BinOp::Mod, 6),
            _ => return None,
        };
        Some(entry)
    }

    /// Precedence climbing over left-associative binary operators
    fn parse_binary(&mut self, min_prec: u8) -> Result<AstNode, ParseError> {
        let mut left = self.parse_unary()?;

        while let Some((op, prec)) = Self::binary_op(&self.peek().kind) {
            if prec <= min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec)?;
            let span = left.span().to(right.span());
            left = AstNode::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<AstNode, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            _ => None,
        };

        if let Some(op) = op {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.to(operand.span());
            return Ok(AstNode::UnaryOp {
                op,
                operand: Box::new(operand),
                span,
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<AstNode, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.match_token(&TokenKind::LParen) {
                let args = self.parse_arguments()?;
                let end = self.expect_rparen("after call arguments")?;
                let span = expr.span().to(end);
                expr = AstNode::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.match_token(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let end = self.expect_token(&TokenKind::RBracket, "Expected ']' after index")?;
                let span = expr.span().to(end);
                expr = AstNode::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else if self.match_token(&TokenKind::Dot) {
                let end = self.current_span();
                let name = self.expect_identifier()?;
                let span = expr.span().to(end);
                expr = AstNode::Field {
                    object: Box::new(expr),
                    name,
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    /// Call arguments after `(`: positional, `name = e` and `...spread`
    pub(crate) fn parse_arguments(&mut self) -> Result<Vec<Argument>, ParseError> {
        let mut args = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            if self.match_token(&TokenKind::Ellipsis) {
                args.push(Argument::Spread(self.parse_expression()?));
            } else if matches!(self.peek().kind, TokenKind::Ident(_))
                && self.check_ahead(1, &TokenKind::Eq)
            {
                let name = self.expect_identifier()?;
                self.advance();
                args.push(Argument::Named(name, self.parse_expression()?));
            } else {
                if !args.is_empty()
                    && args
                        .iter()
                        .any(|a| matches!(a, Argument::Named(..)))
                {
                    return Err(self.error_here("Positional argument after named argument"));
                }
                args.push(Argument::Positional(self.parse_expression()?));
            }

            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<AstNode, ParseError> {
        let token = self.peek().clone();
        let span = token.span;

        match token.kind {
            TokenKind::IntLiteral(n) => {
                self.advance();
                Ok(AstNode::IntLiteral(n, span))
            }
            TokenKind::FloatLiteral(n) => {
                self.advance();
                Ok(AstNode::FloatLiteral(n, span))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(AstNode::StringLiteral(s, span))
            }
            TokenKind::True => {
                self.advance();
                Ok(AstNode::BoolLiteral(true, span))
            }
            TokenKind::False => {
                self.advance();
                Ok(AstNode::BoolLiteral(false, span))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(AstNode::Nil(span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(AstNode::Identifier(name, span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_rparen("after parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.match_token(&TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect_token(&TokenKind::RBracket, "Expected ']' after list")?;
                Ok(AstNode::ListLiteral {
                    elements,
                    span: span.to(end),
                })
            }
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Fun => self.parse_function_expr(),
            _ => Err(ParseError {
                message: format!("Expected expression, found {}", token),
                location: span,
            }),
        }
    }

    /// `{ key: e, "k": e }`
    fn parse_object_literal(&mut self) -> Result<AstNode, ParseError> {
        let start = self.expect_lbrace("before object literal")?;
        let mut fields = Vec::new();

        while !self.check(&TokenKind::RBrace) {
            let key = match &self.peek().kind {
                TokenKind::Ident(name) | TokenKind::StringLiteral(name) => name.clone(),
                _ => return Err(self.error_here(format!("Expected field name, found {}", self.peek()))),
            };
            self.advance();
            self.expect_token(&TokenKind::Colon, "Expected ':' after field name")?;
            fields.push((key, self.parse_expression()?));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        let end = self.expect_rbrace("after object literal")?;
        Ok(AstNode::ObjectLiteral {
            fields,
            span: start.to(end),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::Parser;

    fn expr(src: &str) -> AstNode {
        let program = Parser::new(&format!("{};", src))
            .unwrap()
            .parse_program()
            .unwrap();
        match program.nodes.into_iter().next() {
            Some(AstNode::ExpressionStatement { expr, .. }) => *expr,
            other => panic!("Expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_subtraction() {
        match expr("10 - 3 - 2") {
            AstNode::BinaryOp {
                op: BinOp::Sub,
                left,
                right,
                ..
            } => {
                assert!(matches!(*left, AstNode::BinaryOp { op: BinOp::Sub, .. }));
                assert!(matches!(*right, AstNode::IntLiteral(2, _)));
            }
            other => panic!("Expected subtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_precedence() {
        assert!(matches!(
            expr("a || b && c"),
            AstNode::BinaryOp { op: BinOp::Or, .. }
        ));
    }

    #[test]
    fn test_call_argument_kinds() {
        match expr("f(1, ...xs, key = 2)") {
            AstNode::Call { args, .. } => {
                assert!(matches!(args[0], Argument::Positional(_)));
                assert!(matches!(args[1], Argument::Spread(_)));
                assert!(matches!(&args[2], Argument::Named(name, _) if name == "key"));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_postfix_chain() {
        assert!(matches!(
            expr("a.b[0](x)"),
            AstNode::Call { callee, .. } if matches!(*callee, AstNode::Index { .. })
        ));
    }
}
