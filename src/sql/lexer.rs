//! Reference lexer
//!
//! Turns a (possibly templated) file into the flat list of raw segments the
//! parser consumes. Tokenization is handled by logos ([`tokens`]); the
//! implementation module maps token spans back through the templated file and
//! inserts placeholder metas for source regions that rendered to nothing.

pub mod lexer_impl;
pub mod tokens;

pub use lexer_impl::{lex, lex_templated, tokenize_with_spans};
pub use tokens::Token;
