//! Lowering from the AST to the compiled node tree.
//!
//! Children are lowered before their parent so their ids are known when the
//! parent's [`NodeKind`] is built; [`Lowerer::adopt`] then records the
//! parent link and the signal each child reports back with.

use super::node::*;
use super::CompileError;
use crate::parser::ast::{Argument, AstNode, Lexeme, Param, Program, Span};
use rustc_hash::FxHashSet;

pub(crate) struct Lowerer {
    nodes: Vec<Node>,
}

impl Lowerer {
    pub(crate) fn new() -> Self {
        Lowerer { nodes: Vec::new() }
    }

    fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            parent_signal: Signal::Start,
            span,
        });
        id
    }

    fn adopt(&mut self, parent: NodeId, child: NodeId, signal: Signal) {
        let node = &mut self.nodes[child.index()];
        node.parent = Some(parent);
        node.parent_signal = signal;
    }

    fn adopt_all(&mut self, parent: NodeId, children: &[NodeId]) {
        for (i, child) in children.iter().enumerate() {
            self.adopt(parent, *child, Signal::Child(i as u32));
        }
    }

    /// Lower a whole module. The entry call is appended as the last body
    /// element so module-level declarations run first.
    pub(crate) fn lower_program(mut self, program: &Program) -> Result<CompiledProgram, CompileError> {
        let mut body = program
            .nodes
            .iter()
            .map(|node| self.lower_statement(node))
            .collect::<Result<Vec<_>, _>>()?;

        let end = program.nodes.last().map(|n| n.span()).unwrap_or_default();
        let start = program.nodes.first().map(|n| n.span()).unwrap_or_default();
        body.push(self.add(NodeKind::Entry, end));

        let root = self.add(NodeKind::Module { body: body.clone() }, start.to(end));
        self.adopt_all(root, &body);

        Ok(CompiledProgram {
            nodes: self.nodes,
            root,
        })
    }

    fn lower_block(
        &mut self,
        statements: &[AstNode],
        tag: Option<String>,
        scoped: bool,
        span: Span,
    ) -> Result<NodeId, CompileError> {
        let body = statements
            .iter()
            .map(|s| self.lower_statement(s))
            .collect::<Result<Vec<_>, _>>()?;
        let id = self.add(
            NodeKind::Block {
                tag,
                body: body.clone(),
                scoped,
            },
            span,
        );
        self.adopt_all(id, &body);
        Ok(id)
    }

    fn lower_statement(&mut self, node: &AstNode) -> Result<NodeId, CompileError> {
        match node {
            AstNode::VarDecl {
                name,
                constant,
                init,
                span,
            } => {
                let init = init.as_deref().map(|i| self.lower_expression(i)).transpose()?;
                let id = self.add(
                    NodeKind::Declare {
                        name: name.clone(),
                        constant: *constant,
                        init,
                    },
                    *span,
                );
                if let Some(init) = init {
                    self.adopt(id, init, Signal::Child(0));
                }
                Ok(id)
            }

            AstNode::Assignment {
                target,
                op,
                value,
                span,
            } => {
                let (target, operands) = match target.as_ref() {
                    AstNode::Identifier(name, _) => (AssignTarget::Name(name.clone()), vec![]),
                    AstNode::Index { object, index, .. } => {
                        let object = self.lower_expression(object)?;
                        let index = self.lower_expression(index)?;
                        (AssignTarget::Index { object, index }, vec![object, index])
                    }
                    AstNode::Field { object, name, .. } => {
                        let object = self.lower_expression(object)?;
                        (
                            AssignTarget::Field {
                                object,
                                name: name.clone(),
                            },
                            vec![object],
                        )
                    }
                    other => {
                        return Err(CompileError::new(
                            "Invalid assignment target",
                            other.span(),
                        ))
                    }
                };
                let value = self.lower_expression(value)?;
                let count = target.operand_count();
                let id = self.add(
                    NodeKind::Assign {
                        target,
                        op: *op,
                        value,
                    },
                    *span,
                );
                self.adopt_all(id, &operands);
                self.adopt(id, value, Signal::Child(count));
                Ok(id)
            }

            AstNode::If {
                condition,
                then_branch,
                else_branch,
                span,
            } => {
                let condition = self.lower_expression(condition)?;
                let then_branch = self.lower_block(then_branch, None, true, *span)?;
                let else_branch = else_branch
                    .as_deref()
                    .map(|body| self.lower_block(body, None, true, *span))
                    .transpose()?;
                let id = self.add(
                    NodeKind::If {
                        condition,
                        then_branch,
                        else_branch,
                    },
                    *span,
                );
                self.adopt(id, condition, Signal::Child(0));
                self.adopt(id, then_branch, Signal::Child(1));
                if let Some(else_branch) = else_branch {
                    self.adopt(id, else_branch, Signal::Child(2));
                }
                Ok(id)
            }

            AstNode::While {
                tag,
                condition,
                body,
                span,
            } => {
                let condition = self.lower_expression(condition)?;
                let body = self.lower_block(body, None, true, *span)?;
                let id = self.add(
                    NodeKind::While {
                        tag: tag.clone(),
                        condition,
                        body,
                    },
                    *span,
                );
                self.adopt_all(id, &[condition, body]);
                Ok(id)
            }

            AstNode::For {
                tag,
                var,
                iterable,
                body,
                span,
            } => {
                let iterable = self.lower_expression(iterable)?;
                let body = self.lower_block(body, None, true, *span)?;
                let id = self.add(
                    NodeKind::For {
                        tag: tag.clone(),
                        var: var.clone(),
                        iterable,
                        body,
                    },
                    *span,
                );
                self.adopt_all(id, &[iterable, body]);
                Ok(id)
            }

            AstNode::Block { tag, body, span } => self.lower_block(body, tag.clone(), true, *span),

            AstNode::Control {
                kind,
                tag,
                value,
                span,
            } => {
                let value = value.as_deref().map(|v| self.lower_expression(v)).transpose()?;
                let id = self.add(
                    NodeKind::Control {
                        kind: *kind,
                        tag: tag.clone(),
                        value,
                    },
                    *span,
                );
                if let Some(value) = value {
                    self.adopt(id, value, Signal::Child(0));
                }
                Ok(id)
            }

            AstNode::Fail(span) => Ok(self.add(NodeKind::Fail, *span)),

            AstNode::ExpressionStatement { expr, span } => {
                let expr = self.lower_expression(expr)?;
                Ok(self.expression_statement(expr, *span))
            }

            AstNode::FunctionDef {
                name,
                params,
                body,
                span,
            } => {
                let body = self.lower_block(body, None, false, *span)?;
                let function = self.lower_function(Some(name), params, body, false, *span)?;
                Ok(self.declaration(name, function, *span))
            }

            AstNode::PatternDef {
                name,
                params,
                body,
                span,
            } => {
                let body = self.lower_lexeme(body)?;
                let function = self.lower_function(Some(name), params, body, true, *span)?;
                Ok(self.declaration(name, function, *span))
            }

            expr => {
                let id = self.lower_expression(expr)?;
                Ok(self.expression_statement(id, expr.span()))
            }
        }
    }

    fn expression_statement(&mut self, expr: NodeId, span: Span) -> NodeId {
        let id = self.add(NodeKind::ExprStatement { expr }, span);
        self.adopt(id, expr, Signal::Child(0));
        id
    }

    fn declaration(&mut self, name: &str, init: NodeId, span: Span) -> NodeId {
        let id = self.add(
            NodeKind::Declare {
                name: name.to_string(),
                constant: false,
                init: Some(init),
            },
            span,
        );
        self.adopt(id, init, Signal::Child(0));
        id
    }

    fn lower_function(
        &mut self,
        name: Option<&str>,
        params: &[Param],
        body: NodeId,
        is_pattern: bool,
        span: Span,
    ) -> Result<NodeId, CompileError> {
        let mut seen = FxHashSet::default();
        for param in params {
            if !seen.insert(param.name.as_str()) {
                return Err(CompileError::new(
                    format!("Duplicate parameter '{}'", param.name),
                    param.span,
                ));
            }
        }

        let defaults = params
            .iter()
            .map(|p| p.default.as_ref().map(|d| self.lower_expression(d)).transpose())
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.add(
            NodeKind::Function(FunctionNode {
                name: name.map(str::to_string),
                params: params.iter().map(|p| p.name.clone()).collect(),
                defaults: defaults.clone(),
                body,
                is_pattern,
            }),
            span,
        );
        self.adopt(id, body, Signal::Child(0));
        for (i, default) in defaults.iter().enumerate() {
            if let Some(default) = default {
                self.adopt(id, *default, Signal::Child(1 + i as u32));
            }
        }
        Ok(id)
    }

    fn lower_call(
        &mut self,
        callee: NodeId,
        args: &[Argument],
        span: Span,
    ) -> Result<NodeId, CompileError> {
        let mut values = Vec::with_capacity(args.len());
        let mut kinds = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.lower_expression(arg.value())?);
            kinds.push(match arg {
                Argument::Positional(_) => ArgKind::Positional,
                Argument::Named(name, _) => ArgKind::Named(name.clone()),
                Argument::Spread(_) => ArgKind::Spread,
            });
        }

        let id = self.add(
            NodeKind::Call {
                callee,
                args: values.clone(),
                kinds,
            },
            span,
        );
        self.adopt(id, callee, Signal::Child(0));
        for (i, value) in values.iter().enumerate() {
            self.adopt(id, *value, Signal::Child(1 + i as u32));
        }
        Ok(id)
    }

    fn lower_expression(&mut self, node: &AstNode) -> Result<NodeId, CompileError> {
        let literal = |l| NodeKind::Literal(l);
        match node {
            AstNode::IntLiteral(n, span) => Ok(self.add(literal(Literal::Int(*n)), *span)),
            AstNode::FloatLiteral(n, span) => Ok(self.add(literal(Literal::Float(*n)), *span)),
            AstNode::StringLiteral(s, span) => {
                Ok(self.add(literal(Literal::Str(s.clone())), *span))
            }
            AstNode::BoolLiteral(b, span) => Ok(self.add(literal(Literal::Bool(*b)), *span)),
            AstNode::Nil(span) => Ok(self.add(literal(Literal::Nil), *span)),
            AstNode::Identifier(name, span) => {
                Ok(self.add(NodeKind::Identifier(name.clone()), *span))
            }

            AstNode::ListLiteral { elements, span } => {
                let elements = elements
                    .iter()
                    .map(|e| self.lower_expression(e))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = self.add(
                    NodeKind::List {
                        elements: elements.clone(),
                    },
                    *span,
                );
                self.adopt_all(id, &elements);
                Ok(id)
            }

            AstNode::ObjectLiteral { fields, span } => {
                let keys = fields.iter().map(|(k, _)| k.clone()).collect();
                let values = fields
                    .iter()
                    .map(|(_, v)| self.lower_expression(v))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = self.add(
                    NodeKind::Object {
                        keys,
                        values: values.clone(),
                    },
                    *span,
                );
                self.adopt_all(id, &values);
                Ok(id)
            }

            AstNode::BinaryOp {
                op,
                left,
                right,
                span,
            } => {
                let left = self.lower_expression(left)?;
                let right = self.lower_expression(right)?;
                let id = self.add(
                    NodeKind::Binary {
                        op: *op,
                        left,
                        right,
                    },
                    *span,
                );
                self.adopt_all(id, &[left, right]);
                Ok(id)
            }

            AstNode::UnaryOp { op, operand, span } => {
                let operand = self.lower_expression(operand)?;
                let id = self.add(NodeKind::Unary { op: *op, operand }, *span);
                self.adopt(id, operand, Signal::Child(0));
                Ok(id)
            }

            AstNode::Call { callee, args, span } => {
                let callee = self.lower_expression(callee)?;
                self.lower_call(callee, args, *span)
            }

            AstNode::Index {
                object,
                index,
                span,
            } => {
                let object = self.lower_expression(object)?;
                let index = self.lower_expression(index)?;
                let id = self.add(NodeKind::Index { object, index }, *span);
                self.adopt_all(id, &[object, index]);
                Ok(id)
            }

            AstNode::Field { object, name, span } => {
                let object = self.lower_expression(object)?;
                let id = self.add(
                    NodeKind::Field {
                        object,
                        name: name.clone(),
                    },
                    *span,
                );
                self.adopt(id, object, Signal::Child(0));
                Ok(id)
            }

            AstNode::FunctionExpr { params, body, span } => {
                let body = self.lower_block(body, None, false, *span)?;
                self.lower_function(None, params, body, false, *span)
            }

            other => Err(CompileError::new(
                "Statement used where an expression is expected",
                other.span(),
            )),
        }
    }

    fn lower_lexeme(&mut self, lexeme: &Lexeme) -> Result<NodeId, CompileError> {
        match lexeme {
            Lexeme::Text(text, span) => Ok(self.add(NodeKind::Text(text.chars().collect()), *span)),

            Lexeme::Range { from, to, span } => {
                if from > to {
                    return Err(CompileError::new(
                        format!("Empty character range '{}'..'{}'", from, to),
                        *span,
                    ));
                }
                Ok(self.add(
                    NodeKind::CharRange {
                        from: *from,
                        to: *to,
                    },
                    *span,
                ))
            }

            Lexeme::Any(span) => Ok(self.add(NodeKind::AnyChar, *span)),
            Lexeme::End(span) => Ok(self.add(NodeKind::EndOfInput, *span)),

            Lexeme::Sequence(items, span) => {
                let items = items
                    .iter()
                    .map(|i| self.lower_lexeme(i))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = self.add(NodeKind::Sequence(items.clone()), *span);
                self.adopt_all(id, &items);
                Ok(id)
            }

            Lexeme::Alternation(branches, span) => {
                let branches = branches
                    .iter()
                    .map(|b| self.lower_lexeme(b))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = self.add(NodeKind::Alternation(branches.clone()), *span);
                self.adopt_all(id, &branches);
                Ok(id)
            }

            Lexeme::Quantified {
                inner,
                min,
                max,
                lazy,
                span,
            } => {
                if let Some(max) = max {
                    if min > max {
                        return Err(CompileError::new(
                            format!("Quantifier minimum {} exceeds maximum {}", min, max),
                            *span,
                        ));
                    }
                }
                let inner = self.lower_lexeme(inner)?;
                let id = self.add(
                    NodeKind::Quantifier {
                        inner,
                        min: *min,
                        max: *max,
                        lazy: *lazy,
                    },
                    *span,
                );
                self.adopt(id, inner, Signal::Child(0));
                Ok(id)
            }

            Lexeme::Capture { name, inner, span } => {
                // Capturing a pattern call keeps the value it produced
                let (inner, keeps_value) = match inner.as_ref() {
                    Lexeme::Reference {
                        name: callee,
                        args,
                        span,
                    } => (self.lower_reference_call(callee, args, *span)?, true),
                    other => (self.lower_lexeme(other)?, false),
                };
                let id = self.add(
                    NodeKind::Capture {
                        name: name.clone(),
                        inner,
                        keeps_value,
                    },
                    *span,
                );
                self.adopt(id, inner, Signal::Child(0));
                Ok(id)
            }

            Lexeme::Reference { name, args, span } => {
                let call = self.lower_reference_call(name, args, *span)?;
                Ok(self.expression_statement(call, *span))
            }

            Lexeme::Code { body, span } => self.lower_block(body, None, false, *span),

            Lexeme::Lookahead {
                inner,
                negate,
                span,
            } => {
                let inner = self.lower_lexeme(inner)?;
                let id = self.add(
                    NodeKind::Lookahead {
                        inner,
                        negate: *negate,
                    },
                    *span,
                );
                self.adopt(id, inner, Signal::Child(0));
                Ok(id)
            }

            Lexeme::Atomic { inner, span } => {
                let inner = self.lower_lexeme(inner)?;
                let id = self.add(NodeKind::Atomic { inner }, *span);
                self.adopt(id, inner, Signal::Child(0));
                Ok(id)
            }
        }
    }

    fn lower_reference_call(
        &mut self,
        name: &str,
        args: &[Argument],
        span: Span,
    ) -> Result<NodeId, CompileError> {
        let callee = self.add(NodeKind::Identifier(name.to_string()), span);
        self.lower_call(callee, args, span)
    }
}
