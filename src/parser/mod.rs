//! retrace source code parser
//!
//! This module transforms source text into an Abstract Syntax Tree (AST):
//! - [`lexer`]: Tokenization (source text → tokens)
//! - [`parse`]: Parsing (tokens → AST)
//! - [`ast`]: AST node definitions
//!
//! # Language
//!
//! - Statements: `let`/`const`, assignments, `if`, `while`, `for ... in`,
//!   tagged blocks, `exit`/`next`/`redo`/`restart`/`return`, `fail`
//! - Declarations: `fun name(...)`, `pattern name(...) { lexemes }`
//! - Expressions: arithmetic, comparison, short-circuit logic, calls with
//!   positional/named/spread arguments, lists, objects, closures
//! - Lexemes: text, char ranges, `.`, `$`, alternation, quantifiers,
//!   captures, embedded code, lookahead and atomic groups
//!
//! Hand-written recursive descent parser with precedence climbing for binary operators.

pub mod ast;
mod declarations;
mod expressions;
mod lexemes;
pub mod lexer;
pub mod parse;
mod statements;

pub use parse::{ParseError, Parser};
