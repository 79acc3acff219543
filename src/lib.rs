//! # sqlreflow
//!
//! Grammar-matching SQL parser and indentation reflow engine.
//!
//! Source text is lexed into raw segments, matched against a declarative
//! dialect grammar into a nested syntax tree, and then walked by the reflow
//! engine which derives the indentation each line should carry from the
//! zero-width Indent/Dedent markers the grammar placed in the tree.
//!
//! ## Testing
//!
//! Shared fixtures and helpers live in the [testing module](sql::testing).

pub mod sql;
