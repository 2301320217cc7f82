//! Compiled tree: an arena of nodes with parent links and the signals the
//! trampoline uses to move between them.

use crate::parser::ast::{BinOp, ControlKind, Span, UnOp};
use std::fmt;

/// Stable identity of a compiled node (index into [`CompiledProgram::nodes`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node is being told when it is stepped.
///
/// `Start` begins evaluation, `Child(i)` reports that child `i` finished,
/// `Alternative(i)` resumes a frozen choice, `Internal(state)` is a node's
/// private state machine and `Control(kind)` carries a non-local transfer
/// upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Start,
    Child(u32),
    Alternative(u32),
    Internal(u32),
    Control(ControlKind),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Start => write!(f, "start"),
            Signal::Child(i) => write!(f, "child {}", i),
            Signal::Alternative(i) => write!(f, "alternative {}", i),
            Signal::Internal(s) => write!(f, "internal {}", s),
            Signal::Control(kind) => write!(f, "control {}", kind),
        }
    }
}

/// Where interpretation continues: a node plus the signal it will receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResumptionPoint {
    pub node: NodeId,
    pub signal: Signal,
}

impl ResumptionPoint {
    pub fn new(node: NodeId, signal: Signal) -> Self {
        ResumptionPoint { node, signal }
    }
}

impl fmt::Display for ResumptionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.node, self.signal)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// How a call argument contributes to the argument bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Positional,
    Named(String),
    Spread,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    /// Object is child 0, index is child 1
    Index { object: NodeId, index: NodeId },
    /// Object is child 0
    Field { object: NodeId, name: String },
}

impl AssignTarget {
    /// Number of operand children evaluated before the assigned value
    pub fn operand_count(&self) -> u32 {
        match self {
            AssignTarget::Name(_) => 0,
            AssignTarget::Index { .. } => 2,
            AssignTarget::Field { .. } => 1,
        }
    }
}

/// A function or pattern literal.
///
/// The body reports as `Child(0)`, parameter default `i` as `Child(1 + i)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionNode {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub defaults: Vec<Option<NodeId>>,
    pub body: NodeId,
    pub is_pattern: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Program root; the last body element is the entry call
    Module { body: Vec<NodeId> },
    /// Invokes the configured entry point
    Entry,

    // Expressions
    Literal(Literal),
    List { elements: Vec<NodeId> },
    Object { keys: Vec<String>, values: Vec<NodeId> },
    Identifier(String),
    Binary { op: BinOp, left: NodeId, right: NodeId },
    Unary { op: UnOp, operand: NodeId },
    Index { object: NodeId, index: NodeId },
    Field { object: NodeId, name: String },
    /// Callee is child 0, argument `i` is child `1 + i`
    Call { callee: NodeId, args: Vec<NodeId>, kinds: Vec<ArgKind> },
    Function(FunctionNode),

    // Statements
    Declare { name: String, constant: bool, init: Option<NodeId> },
    Assign { target: AssignTarget, op: Option<BinOp>, value: NodeId },
    Block { tag: Option<String>, body: Vec<NodeId>, scoped: bool },
    If { condition: NodeId, then_branch: NodeId, else_branch: Option<NodeId> },
    While { tag: Option<String>, condition: NodeId, body: NodeId },
    For { tag: Option<String>, var: String, iterable: NodeId, body: NodeId },
    Control { kind: ControlKind, tag: Option<String>, value: Option<NodeId> },
    ExprStatement { expr: NodeId },
    Fail,

    // Lexemes
    Text(Vec<char>),
    CharRange { from: char, to: char },
    AnyChar,
    EndOfInput,
    Sequence(Vec<NodeId>),
    Alternation(Vec<NodeId>),
    Quantifier { inner: NodeId, min: u32, max: Option<u32>, lazy: bool },
    /// `keeps_value` captures the value the inner call produced instead of the matched text
    Capture { name: String, inner: NodeId, keeps_value: bool },
    Lookahead { inner: NodeId, negate: bool },
    Atomic { inner: NodeId },
}

impl NodeKind {
    /// Short label used by the debugger and trace output
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Module { .. } => "module",
            NodeKind::Entry => "entry",
            NodeKind::Literal(_) => "literal",
            NodeKind::List { .. } => "list",
            NodeKind::Object { .. } => "object",
            NodeKind::Identifier(_) => "identifier",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Index { .. } => "index",
            NodeKind::Field { .. } => "field",
            NodeKind::Call { .. } => "call",
            NodeKind::Function(f) if f.is_pattern => "pattern",
            NodeKind::Function(_) => "function",
            NodeKind::Declare { .. } => "declare",
            NodeKind::Assign { .. } => "assign",
            NodeKind::Block { .. } => "block",
            NodeKind::If { .. } => "if",
            NodeKind::While { .. } => "while",
            NodeKind::For { .. } => "for",
            NodeKind::Control { .. } => "control",
            NodeKind::ExprStatement { .. } => "expression",
            NodeKind::Fail => "fail",
            NodeKind::Text(_) => "text",
            NodeKind::CharRange { .. } => "range",
            NodeKind::AnyChar => "any",
            NodeKind::EndOfInput => "end",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Alternation(_) => "alternation",
            NodeKind::Quantifier { .. } => "quantifier",
            NodeKind::Capture { .. } => "capture",
            NodeKind::Lookahead { .. } => "lookahead",
            NodeKind::Atomic { .. } => "atomic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Signal the parent receives when this node finishes
    pub parent_signal: Signal,
    pub span: Span,
}

/// The output of the compiler: every node plus the root
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub nodes: Vec<Node>,
    pub root: NodeId,
}

impl CompiledProgram {
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a node together with the signal each reports back with
    pub fn children(&self, id: NodeId) -> Vec<(NodeId, Signal)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent == Some(id))
            .map(|(i, n)| (NodeId(i as u32), n.parent_signal))
            .collect()
    }
}
