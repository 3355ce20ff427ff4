//! Source text to AST: lexer and recursive-descent parser.

pub mod ast;
pub mod lexer;
mod parser;

pub use parser::parse;
