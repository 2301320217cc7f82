//! Pattern body parsing
//!
//! ```text
//! alternation := sequence ('|' sequence)*
//! sequence    := quantified+
//! quantified  := (IDENT ':')? atom quantifier?
//! quantifier  := ('*' | '+' | '?' | '{' INT (',' INT?)? '}') '?'?
//! atom        := STRING ('..' STRING)? | '.' | '$' | '(' alternation ')'
//!              | IDENT ('(' args ')')? | '{' statements '}'
//!              | ('ahead' | 'not' | 'atomic') '(' alternation ')'
//! ```

use crate::parser::ast::*;
use crate::parser::lexer::TokenKind;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    pub(crate) fn parse_lexeme_alternation(&mut self) -> Result<Lexeme, ParseError> {
        let first = self.parse_lexeme_sequence()?;
        if !self.check(&TokenKind::Pipe) {
            return Ok(first);
        }

        let mut branches = vec![first];
        while self.match_token(&TokenKind::Pipe) {
            branches.push(self.parse_lexeme_sequence()?);
        }

        let span = branches[0].span().to(branches[branches.len() - 1].span());
        Ok(Lexeme::Alternation(branches, span))
    }

    fn at_sequence_end(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Pipe | TokenKind::RParen | TokenKind::RBrace | TokenKind::Eof
        )
    }

    fn parse_lexeme_sequence(&mut self) -> Result<Lexeme, ParseError> {
        let start = self.current_span();
        let mut items = Vec::new();

        while !self.at_sequence_end() {
            items.push(self.parse_quantified()?);
        }

        match items.len() {
            0 => Err(ParseError {
                message: "Empty pattern alternative".to_string(),
                location: start,
            }),
            1 => Ok(items.remove(0)),
            _ => {
                let span = items[0].span().to(items[items.len() - 1].span());
                Ok(Lexeme::Sequence(items, span))
            }
        }
    }

    fn parse_quantified(&mut self) -> Result<Lexeme, ParseError> {
        // `name: atom` captures the (possibly quantified) atom
        if let TokenKind::Ident(name) = &self.peek().kind {
            if self.check_ahead(1, &TokenKind::Colon) {
                let name = name.clone();
                let start = self.advance().span;
                self.advance();
                let inner = self.parse_quantified()?;
                let span = start.to(inner.span());
                return Ok(Lexeme::Capture {
                    name,
                    inner: Box::new(inner),
                    span,
                });
            }
        }

        let atom = self.parse_lexeme_atom()?;
        self.parse_quantifier(atom)
    }

    fn parse_quantifier(&mut self, atom: Lexeme) -> Result<Lexeme, ParseError> {
        let (min, max) = match self.peek().kind {
            TokenKind::Star => {
                self.advance();
                (0, None)
            }
            TokenKind::Plus => {
                self.advance();
                (1, None)
            }
            TokenKind::Question => {
                self.advance();
                (0, Some(1))
            }
            TokenKind::LBrace if matches!(
                self.peek_ahead(1).map(|t| &t.kind),
                Some(TokenKind::IntLiteral(_))
            ) =>
            {
                self.parse_counted_quantifier()?
            }
            _ => return Ok(atom),
        };

        let lazy = self.match_token(&TokenKind::Question);
        let span = atom.span().to(self.previous_span());
        Ok(Lexeme::Quantified {
            inner: Box::new(atom),
            min,
            max,
            lazy,
            span,
        })
    }

    /// `{n}`, `{n,}`, `{n,m}`
    fn parse_counted_quantifier(&mut self) -> Result<(u32, Option<u32>), ParseError> {
        self.advance();
        let min = self.expect_count()?;
        let max = if self.match_token(&TokenKind::Comma) {
            if self.check(&TokenKind::RBrace) {
                None
            } else {
                Some(self.expect_count()?)
            }
        } else {
            Some(min)
        };
        self.expect_rbrace("after quantifier bounds")?;
        Ok((min, max))
    }

    fn expect_count(&mut self) -> Result<u32, ParseError> {
        match self.peek().kind {
            TokenKind::IntLiteral(n) => {
                let span = self.advance().span;
                u32::try_from(n).map_err(|_| ParseError {
                    message: format!("Quantifier bound {} is out of range", n),
                    location: span,
                })
            }
            _ => Err(self.error_here(format!(
                "Expected quantifier bound, found {}",
                self.peek()
            ))),
        }
    }

    fn parse_lexeme_atom(&mut self) -> Result<Lexeme, ParseError> {
        let token = self.peek().clone();
        let span = token.span;

        match token.kind {
            TokenKind::StringLiteral(text) => {
                self.advance();
                if self.match_token(&TokenKind::DotDot) {
                    return self.parse_char_range(text, span);
                }
                Ok(Lexeme::Text(text, span))
            }
            TokenKind::Dot => {
                self.advance();
                Ok(Lexeme::Any(span))
            }
            TokenKind::Dollar => {
                self.advance();
                Ok(Lexeme::End(span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_lexeme_alternation()?;
                self.expect_rparen("after pattern group")?;
                Ok(inner)
            }
            TokenKind::LBrace => {
                let (body, end) = self.parse_braced_body("around pattern code block")?;
                Ok(Lexeme::Code {
                    body,
                    span: span.to(end),
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                let (args, end) = if self.match_token(&TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    (args, self.expect_rparen("after pattern arguments")?)
                } else {
                    (Vec::new(), span)
                };
                Ok(Lexeme::Reference {
                    name,
                    args,
                    span: span.to(end),
                })
            }
            TokenKind::Ahead | TokenKind::Not | TokenKind::Atomic => {
                self.advance();
                self.expect_lparen(&format!("after {}", token.kind))?;
                let inner = Box::new(self.parse_lexeme_alternation()?);
                let end = self.expect_rparen("after group")?;
                let span = span.to(end);
                Ok(match token.kind {
                    TokenKind::Atomic => Lexeme::Atomic { inner, span },
                    TokenKind::Not => Lexeme::Lookahead {
                        inner,
                        negate: true,
                        span,
                    },
                    _ => Lexeme::Lookahead {
                        inner,
                        negate: false,
                        span,
                    },
                })
            }
            _ => Err(ParseError {
                message: format!("Expected pattern element, found {}", token),
                location: span,
            }),
        }
    }

    /// `"a".."z"` (both ends inclusive, single characters)
    fn parse_char_range(&mut self, from: String, start: Span) -> Result<Lexeme, ParseError> {
        let to = match &self.peek().kind {
            TokenKind::StringLiteral(s) => s.clone(),
            _ => {
                return Err(self.error_here(format!(
                    "Expected string after '..', found {}",
                    self.peek()
                )))
            }
        };
        let end = self.advance().span;
        let span = start.to(end);

        let single = |s: &str| {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        };

        match (single(&from), single(&to)) {
            (Some(from), Some(to)) => Ok(Lexeme::Range { from, to, span }),
            _ => Err(ParseError {
                message: "Character range bounds must be single characters".to_string(),
                location: span,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::Parser;

    fn pattern_body(src: &str) -> Lexeme {
        let program = Parser::new(&format!("pattern p {{ {} }}", src))
            .unwrap()
            .parse_program()
            .unwrap();
        match program.nodes.into_iter().next() {
            Some(AstNode::PatternDef { body, .. }) => body,
            other => panic!("Expected pattern, got {:?}", other),
        }
    }

    #[test]
    fn test_bounded_quantifier() {
        match pattern_body(r#""a"{2,4}"#) {
            Lexeme::Quantified {
                min, max, lazy, ..
            } => {
                assert_eq!(min, 2);
                assert_eq!(max, Some(4));
                assert!(!lazy);
            }
            other => panic!("Expected quantifier, got {:?}", other),
        }
    }

    #[test]
    fn test_lazy_star_and_open_bound() {
        assert!(matches!(
            pattern_body(r#""a"*?"#),
            Lexeme::Quantified { min: 0, max: None, lazy: true, .. }
        ));
        assert!(matches!(
            pattern_body(r#""a"{3,}"#),
            Lexeme::Quantified { min: 3, max: None, .. }
        ));
    }

    #[test]
    fn test_code_block_is_not_a_quantifier() {
        match pattern_body(r#""a" { let x = 1; }"#) {
            Lexeme::Sequence(items, _) => {
                assert!(matches!(items[1], Lexeme::Code { .. }));
            }
            other => panic!("Expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_of_quantified_reference() {
        match pattern_body("d: digit+") {
            Lexeme::Capture { name, inner, .. } => {
                assert_eq!(name, "d");
                assert!(matches!(*inner, Lexeme::Quantified { min: 1, .. }));
            }
            other => panic!("Expected capture, got {:?}", other),
        }
    }

    #[test]
    fn test_lookaheads() {
        match pattern_body(r#"not("x") ahead(.) atomic("a"+)"#) {
            Lexeme::Sequence(items, _) => {
                assert!(matches!(items[0], Lexeme::Lookahead { negate: true, .. }));
                assert!(matches!(items[1], Lexeme::Lookahead { negate: false, .. }));
                assert!(matches!(items[2], Lexeme::Atomic { .. }));
            }
            other => panic!("Expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_range_requires_single_chars() {
        let result = Parser::new(r#"pattern p { "ab".."z" }"#)
            .unwrap()
            .parse_program();
        assert!(result.is_err());
    }
}
