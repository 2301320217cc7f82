//! Compilation of the AST into the node tree the analyzer steps through.
//!
//! ```text
//! Source → Parser → AST → fold → lower → CompiledProgram
//! ```

pub mod fold;
mod lower;
pub mod node;

use crate::parser::ast::{Program, Span};
use crate::parser::{ParseError, Parser};
use thiserror::Error;

pub use node::{CompiledProgram, NodeId, NodeKind, ResumptionPoint, Signal};

#[derive(Debug, Clone, Error)]
#[error("Compile error at line {}, column {}: {message}", .location.line, .location.column)]
pub struct CompileError {
    pub message: String,
    pub location: Span,
}

impl CompileError {
    pub fn new(message: impl Into<String>, location: Span) -> Self {
        CompileError {
            message: message.into(),
            location,
        }
    }
}

/// Anything that can go wrong before the analyzer runs
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl FrontendError {
    pub fn location(&self) -> Span {
        match self {
            FrontendError::Parse(e) => e.location,
            FrontendError::Compile(e) => e.location,
        }
    }

    pub fn message(&self) -> String {
        match self {
            FrontendError::Parse(e) => e.message.clone(),
            FrontendError::Compile(e) => e.message.clone(),
        }
    }
}

/// Fold constants and lower a parsed program
pub fn compile(mut program: Program) -> Result<CompiledProgram, CompileError> {
    fold::fold_program(&mut program);
    let compiled = lower::Lowerer::new().lower_program(&program)?;
    tracing::debug!(nodes = compiled.len(), "compiled program");
    Ok(compiled)
}

/// Parse and compile source text in one go
pub fn compile_source(source: &str) -> Result<CompiledProgram, FrontendError> {
    let program = Parser::new(source)?.parse_program()?;
    Ok(compile(program)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(program: &CompiledProgram) -> Vec<&'static str> {
        program.nodes.iter().map(|n| n.kind.label()).collect()
    }

    #[test]
    fn test_entry_is_last_module_statement() {
        let program = compile_source("fun main() { return 1; }").unwrap();
        let root = program.node(program.root).unwrap();
        match &root.kind {
            NodeKind::Module { body } => {
                let last = program.node(*body.last().unwrap()).unwrap();
                assert_eq!(last.kind, NodeKind::Entry);
                assert_eq!(body.len(), 2);
            }
            other => panic!("Expected module, got {:?}", other),
        }
        assert!(root.parent.is_none());
    }

    #[test]
    fn test_every_node_but_root_has_parent() {
        let program = compile_source(
            r#"
            pattern digit { "0".."9" }
            pattern number { digit+ ("." digit+)? }
            fun main() { let x = [1, 2]; for v in x { print(v); } }
            "#,
        )
        .unwrap();
        for (i, node) in program.nodes.iter().enumerate() {
            if NodeId(i as u32) == program.root {
                assert!(node.parent.is_none());
            } else {
                assert!(node.parent.is_some(), "node {} has no parent", i);
            }
        }
    }

    #[test]
    fn test_call_argument_signals() {
        let program = compile_source("fun main() { f(1, b = 2, ...xs); }").unwrap();
        let call = program
            .nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::Call { .. }))
            .unwrap();
        let mut signals: Vec<Signal> = program
            .children(NodeId(call as u32))
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        signals.sort_by_key(|s| match s {
            Signal::Child(i) => *i,
            _ => u32::MAX,
        });
        assert_eq!(
            signals,
            vec![
                Signal::Child(0),
                Signal::Child(1),
                Signal::Child(2),
                Signal::Child(3)
            ]
        );
    }

    #[test]
    fn test_reference_becomes_discarded_call() {
        let program = compile_source(r#"pattern p { q } pattern q { "x" }"#).unwrap();
        let labels = kinds(&program);
        assert!(labels.contains(&"expression"));
        assert!(labels.contains(&"call"));
    }

    #[test]
    fn test_captured_reference_keeps_value() {
        let program = compile_source(r#"pattern p { n:q } pattern q { "x" }"#).unwrap();
        let capture = program
            .nodes
            .iter()
            .find_map(|n| match &n.kind {
                NodeKind::Capture { keeps_value, .. } => Some(*keeps_value),
                _ => None,
            })
            .unwrap();
        assert!(capture);
    }

    #[test]
    fn test_duplicate_parameter() {
        let err = compile_source("fun f(a, a) {}").unwrap_err();
        assert!(err.message().contains("Duplicate parameter"));
    }

    #[test]
    fn test_quantifier_bounds() {
        let err = compile_source(r#"pattern p { "a"{3,2} }"#).unwrap_err();
        assert!(err.message().contains("exceeds maximum"));
    }
}
