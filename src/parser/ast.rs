// AST (Abstract Syntax Tree) definitions for the retrace source language

use std::fmt;
use std::ops::Range;

/// Source span used for error reporting and debugger highlighting.
///
/// `start`/`end` are character offsets into the source (the unit ariadne
/// expects), `line`/`column` point at the first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering `self` through the end of `other`
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end.max(self.start)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical (short-circuit)
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg, // -x
    Not, // !x
}

/// Non-local transfer statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Exit,
    Next,
    Redo,
    Restart,
    Return,
}

impl ControlKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ControlKind::Exit => "exit",
            ControlKind::Next => "next",
            ControlKind::Redo => "redo",
            ControlKind::Restart => "restart",
            ControlKind::Return => "return",
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Function or pattern parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<AstNode>,
    pub span: Span,
}

/// Call argument
#[derive(Debug, Clone)]
pub enum Argument {
    Positional(AstNode),
    Named(String, AstNode),
    Spread(AstNode),
}

impl Argument {
    pub fn value(&self) -> &AstNode {
        match self {
            Argument::Positional(node) | Argument::Named(_, node) | Argument::Spread(node) => node,
        }
    }
}

/// Statements and expressions
#[derive(Debug, Clone)]
pub enum AstNode {
    // Literals
    IntLiteral(i64, Span),
    FloatLiteral(f64, Span),
    StringLiteral(String, Span),
    BoolLiteral(bool, Span),
    Nil(Span),

    Identifier(String, Span),

    ListLiteral {
        elements: Vec<AstNode>,
        span: Span,
    },

    ObjectLiteral {
        fields: Vec<(String, AstNode)>,
        span: Span,
    },

    BinaryOp {
        op: BinOp,
        left: Box<AstNode>,
        right: Box<AstNode>,
        span: Span,
    },

    UnaryOp {
        op: UnOp,
        operand: Box<AstNode>,
        span: Span,
    },

    Call {
        callee: Box<AstNode>,
        args: Vec<Argument>,
        span: Span,
    },

    Index {
        object: Box<AstNode>,
        index: Box<AstNode>,
        span: Span,
    },

    Field {
        object: Box<AstNode>,
        name: String,
        span: Span,
    },

    FunctionExpr {
        params: Vec<Param>,
        body: Vec<AstNode>,
        span: Span,
    },

    // Statements
    VarDecl {
        name: String,
        constant: bool,
        init: Option<Box<AstNode>>,
        span: Span,
    },

    /// `target = value` or compound `target op= value`
    Assignment {
        target: Box<AstNode>,
        op: Option<BinOp>,
        value: Box<AstNode>,
        span: Span,
    },

    If {
        condition: Box<AstNode>,
        then_branch: Vec<AstNode>,
        else_branch: Option<Vec<AstNode>>,
        span: Span,
    },

    While {
        tag: Option<String>,
        condition: Box<AstNode>,
        body: Vec<AstNode>,
        span: Span,
    },

    For {
        tag: Option<String>,
        var: String,
        iterable: Box<AstNode>,
        body: Vec<AstNode>,
        span: Span,
    },

    Block {
        tag: Option<String>,
        body: Vec<AstNode>,
        span: Span,
    },

    Control {
        kind: ControlKind,
        tag: Option<String>,
        value: Option<Box<AstNode>>,
        span: Span,
    },

    Fail(Span),

    ExpressionStatement {
        expr: Box<AstNode>,
        span: Span,
    },

    FunctionDef {
        name: String,
        params: Vec<Param>,
        body: Vec<AstNode>,
        span: Span,
    },

    PatternDef {
        name: String,
        params: Vec<Param>,
        body: Lexeme,
        span: Span,
    },
}

impl AstNode {
    pub fn span(&self) -> Span {
        match self {
            AstNode::IntLiteral(_, span)
            | AstNode::FloatLiteral(_, span)
            | AstNode::StringLiteral(_, span)
            | AstNode::BoolLiteral(_, span)
            | AstNode::Nil(span)
            | AstNode::Identifier(_, span)
            | AstNode::Fail(span) => *span,
            AstNode::ListLiteral { span, .. }
            | AstNode::ObjectLiteral { span, .. }
            | AstNode::BinaryOp { span, .. }
            | AstNode::UnaryOp { span, .. }
            | AstNode::Call { span, .. }
            | AstNode::Index { span, .. }
            | AstNode::Field { span, .. }
            | AstNode::FunctionExpr { span, .. }
            | AstNode::VarDecl { span, .. }
            | AstNode::Assignment { span, .. }
            | AstNode::If { span, .. }
            | AstNode::While { span, .. }
            | AstNode::For { span, .. }
            | AstNode::Block { span, .. }
            | AstNode::Control { span, .. }
            | AstNode::ExpressionStatement { span, .. }
            | AstNode::FunctionDef { span, .. }
            | AstNode::PatternDef { span, .. } => *span,
        }
    }
}

/// Descriptive pattern elements (bodies of `pattern` declarations)
#[derive(Debug, Clone)]
pub enum Lexeme {
    Text(String, Span),
    /// One character in `from..=to`
    Range {
        from: char,
        to: char,
        span: Span,
    },
    Any(Span),
    End(Span),
    Sequence(Vec<Lexeme>, Span),
    Alternation(Vec<Lexeme>, Span),
    Quantified {
        inner: Box<Lexeme>,
        min: u32,
        max: Option<u32>,
        lazy: bool,
        span: Span,
    },
    Capture {
        name: String,
        inner: Box<Lexeme>,
        span: Span,
    },
    Reference {
        name: String,
        args: Vec<Argument>,
        span: Span,
    },
    Code {
        body: Vec<AstNode>,
        span: Span,
    },
    Lookahead {
        inner: Box<Lexeme>,
        negate: bool,
        span: Span,
    },
    Atomic {
        inner: Box<Lexeme>,
        span: Span,
    },
}

impl Lexeme {
    pub fn span(&self) -> Span {
        match self {
            Lexeme::Text(_, span)
            | Lexeme::Any(span)
            | Lexeme::End(span)
            | Lexeme::Sequence(_, span)
            | Lexeme::Alternation(_, span) => *span,
            Lexeme::Range { span, .. }
            | Lexeme::Quantified { span, .. }
            | Lexeme::Capture { span, .. }
            | Lexeme::Reference { span, .. }
            | Lexeme::Code { span, .. }
            | Lexeme::Lookahead { span, .. }
            | Lexeme::Atomic { span, .. } => *span,
        }
    }
}

/// Top-level program (a module)
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub nodes: Vec<AstNode>,
}

impl Program {
    pub fn new() -> Self {
        Program { nodes: Vec::new() }
    }
}
