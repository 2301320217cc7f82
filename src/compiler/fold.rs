//! Constant folding over the AST
//!
//! Binary and unary operations whose operands are literals are evaluated
//! ahead of time with the same primitive operators the analyzer uses, so a
//! folded program behaves exactly like the unfolded one. Operations that
//! would fail at runtime (division by zero, type mismatches, overflow) are
//! left in place so the error is reported with its span when executed.

use crate::interpreter::expressions::{binary_primitive, unary_primitive};
use crate::memory::value::Value;
use crate::parser::ast::*;

pub fn fold_program(program: &mut Program) {
    for node in &mut program.nodes {
        fold(node);
    }
}

fn literal_value(node: &AstNode) -> Option<Value> {
    match node {
        AstNode::IntLiteral(n, _) => Some(Value::Int(*n)),
        AstNode::FloatLiteral(n, _) => Some(Value::Float(*n)),
        AstNode::StringLiteral(s, _) => Some(Value::Str(s.clone())),
        AstNode::BoolLiteral(b, _) => Some(Value::Bool(*b)),
        AstNode::Nil(_) => Some(Value::Nil),
        _ => None,
    }
}

fn literal_node(value: Value, span: Span) -> Option<AstNode> {
    match value {
        Value::Nil => Some(AstNode::Nil(span)),
        Value::Bool(b) => Some(AstNode::BoolLiteral(b, span)),
        Value::Int(n) => Some(AstNode::IntLiteral(n, span)),
        Value::Float(n) => Some(AstNode::FloatLiteral(n, span)),
        Value::Str(s) => Some(AstNode::StringLiteral(s, span)),
        Value::Ref(_) => None,
    }
}

fn fold_all(nodes: &mut [AstNode]) {
    for node in nodes {
        fold(node);
    }
}

fn fold_params(params: &mut [Param]) {
    for param in params {
        if let Some(default) = &mut param.default {
            fold(default);
        }
    }
}

fn fold_args(args: &mut [Argument]) {
    for arg in args {
        match arg {
            Argument::Positional(node) | Argument::Named(_, node) | Argument::Spread(node) => {
                fold(node)
            }
        }
    }
}

fn fold(node: &mut AstNode) {
    let folded = match node {
        AstNode::BinaryOp {
            op,
            left,
            right,
            span,
        } => {
            fold(left);
            fold(right);
            // Short-circuit operators keep their node so evaluation order stays visible
            if matches!(op, BinOp::And | BinOp::Or) {
                None
            } else {
                match (literal_value(left), literal_value(right)) {
                    (Some(l), Some(r)) => binary_primitive(*op, &l, &r)
                        .ok()
                        .and_then(|v| literal_node(v, *span)),
                    _ => None,
                }
            }
        }
        AstNode::UnaryOp { op, operand, span } => {
            fold(operand);
            literal_value(operand)
                .and_then(|v| unary_primitive(*op, &v).ok())
                .and_then(|v| literal_node(v, *span))
        }
        AstNode::ListLiteral { elements, .. } => {
            fold_all(elements);
            None
        }
        AstNode::ObjectLiteral { fields, .. } => {
            for (_, value) in fields {
                fold(value);
            }
            None
        }
        AstNode::Call { callee, args, .. } => {
            fold(callee);
            fold_args(args);
            None
        }
        AstNode::Index { object, index, .. } => {
            fold(object);
            fold(index);
            None
        }
        AstNode::Field { object, .. } => {
            fold(object);
            None
        }
        AstNode::FunctionExpr { params, body, .. } | AstNode::FunctionDef { params, body, .. } => {
            fold_params(params);
            fold_all(body);
            None
        }
        AstNode::PatternDef { params, body, .. } => {
            fold_params(params);
            fold_lexeme(body);
            None
        }
        AstNode::VarDecl { init, .. } => {
            if let Some(init) = init {
                fold(init);
            }
            None
        }
        AstNode::Assignment { target, value, .. } => {
            fold(target);
            fold(value);
            None
        }
        AstNode::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            fold(condition);
            fold_all(then_branch);
            if let Some(else_branch) = else_branch {
                fold_all(else_branch);
            }
            None
        }
        AstNode::While {
            condition, body, ..
        } => {
            fold(condition);
            fold_all(body);
            None
        }
        AstNode::For { iterable, body, .. } => {
            fold(iterable);
            fold_all(body);
            None
        }
        AstNode::Block { body, .. } => {
            fold_all(body);
            None
        }
        AstNode::Control { value, .. } => {
            if let Some(value) = value {
                fold(value);
            }
            None
        }
        AstNode::ExpressionStatement { expr, .. } => {
            fold(expr);
            None
        }
        AstNode::IntLiteral(..)
        | AstNode::FloatLiteral(..)
        | AstNode::StringLiteral(..)
        | AstNode::BoolLiteral(..)
        | AstNode::Nil(_)
        | AstNode::Identifier(..)
        | AstNode::Fail(_) => None,
    };

    if let Some(folded) = folded {
        *node = folded;
    }
}

fn fold_lexeme(lexeme: &mut Lexeme) {
    match lexeme {
        Lexeme::Sequence(items, _) | Lexeme::Alternation(items, _) => {
            for item in items {
                fold_lexeme(item);
            }
        }
        Lexeme::Quantified { inner, .. }
        | Lexeme::Capture { inner, .. }
        | Lexeme::Lookahead { inner, .. }
        | Lexeme::Atomic { inner, .. } => fold_lexeme(inner),
        Lexeme::Reference { args, .. } => fold_args(args),
        Lexeme::Code { body, .. } => fold_all(body),
        Lexeme::Text(..) | Lexeme::Range { .. } | Lexeme::Any(_) | Lexeme::End(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn folded_init(src: &str) -> AstNode {
        let mut program = Parser::new(src).unwrap().parse_program().unwrap();
        fold_program(&mut program);
        match program.nodes.remove(0) {
            AstNode::VarDecl {
                init: Some(init), ..
            } => *init,
            other => panic!("Expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_folds_arithmetic() {
        assert!(matches!(
            folded_init("let x = 1 + 2 * 3;"),
            AstNode::IntLiteral(7, _)
        ));
        assert!(matches!(
            folded_init("let x = -(4 - 6);"),
            AstNode::IntLiteral(2, _)
        ));
    }

    #[test]
    fn test_folds_string_concat_and_comparison() {
        assert!(matches!(
            folded_init(r#"let x = "a" + "b";"#),
            AstNode::StringLiteral(s, _) if s == "ab"
        ));
        assert!(matches!(
            folded_init("let x = 2 < 3;"),
            AstNode::BoolLiteral(true, _)
        ));
    }

    #[test]
    fn test_leaves_runtime_errors_in_place() {
        assert!(matches!(
            folded_init("let x = 1 / 0;"),
            AstNode::BinaryOp { op: BinOp::Div, .. }
        ));
        assert!(matches!(
            folded_init(r#"let x = 1 + "a";"#),
            AstNode::BinaryOp { op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn test_keeps_short_circuit() {
        assert!(matches!(
            folded_init("let x = true || false;"),
            AstNode::BinaryOp { op: BinOp::Or, .. }
        ));
    }
}
