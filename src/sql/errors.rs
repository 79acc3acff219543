//! Error types for grammar construction, parsing, templating and reflow
//!
//! "No match" is never an error: matchers report it through an empty
//! [`MatchResult`](crate::sql::parser::MatchResult). The types here are
//! reserved for construction mistakes and engine faults.

use crate::sql::markers::PositionMarker;
use std::fmt;
use thiserror::Error;

/// A 1-indexed line/column location used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line_no: usize,
    pub line_pos: usize,
}

impl Location {
    pub fn new(line_no: usize, line_pos: usize) -> Self {
        Self { line_no, line_pos }
    }
}

impl From<&PositionMarker> for Location {
    fn from(marker: &PositionMarker) -> Self {
        Self::new(marker.line_no(), marker.line_pos())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, position {}", self.line_no, self.line_pos)
    }
}

/// Mistakes in a grammar definition, reported when the grammar is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("grammar references undefined symbol `{name}`")]
    MissingReference { name: String },
    #[error("invalid grammar element `{element}`: {reason}")]
    InvalidGrammar { element: String, reason: String },
    #[error("bracket type `{bracket_type}` not found in bracket set `{set}`")]
    UnknownBracket { bracket_type: String, set: String },
    #[error("symbol `{name}` is defined more than once")]
    DuplicateDefinition { name: String },
}

/// Fatal parse failures. Unparsable input is not one of these; it becomes an
/// `unparsable` node plus a [`ParseDiagnostic`](crate::sql::parser::ParseDiagnostic).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlParseError {
    #[error("parse did not preserve the source text: expected {expected:?}, got {actual:?}")]
    Completeness { expected: String, actual: String },
    #[error("segment positions are not contiguous at {location}")]
    Discontiguous { location: Location },
    #[error("query too complex: nesting exceeded {max_depth} at {location}")]
    TooComplex { max_depth: usize, location: Location },
    #[error("internal parser error at {location}: {description}")]
    Internal {
        description: String,
        location: Location,
    },
    #[error("dialect `{dialect}` has no root grammar `{name}`")]
    MissingRoot { dialect: String, name: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Lex(#[from] LexError),
}

impl SqlParseError {
    pub fn location(&self) -> Option<Location> {
        match self {
            SqlParseError::Discontiguous { location }
            | SqlParseError::TooComplex { location, .. }
            | SqlParseError::Internal { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// Render the error followed by a numbered window of `source` around it.
    pub fn render(&self, source: &str) -> String {
        match self.location() {
            Some(location) if location.line_no > 0 => {
                format!("Error: {}\n\n{}", self, format_source_context(source, location))
            }
            _ => format!("Error: {}\n", self),
        }
    }
}

/// Inconsistent template mappings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("templated file `{fname}` differs from its source but has no slice map")]
    Unsliced { fname: String },
    #[error("templated position {position} is not covered by the slice map")]
    PositionNotFound { position: usize },
    #[error("zero-length slice at templated position {position} falls inside a templated section")]
    InsideTemplatedSection { position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReflowError {
    #[error("invalid indent unit {0:?}: expected \"space\" or \"tab\"")]
    InvalidIndentUnit(String),
    #[error("invalid reflow sequence: {0}")]
    InvalidSequence(String),
    #[error("unknown segment type {0:?} in reflow config")]
    UnknownSegmentType(String),
    #[error("cannot break an empty point without a neighbouring segment to anchor on")]
    MissingAnchor,
    #[error("invalid {key} {value:?} for layout type {kind:?}")]
    InvalidLayout {
        kind: String,
        key: &'static str,
        value: String,
    },
    #[error("rebreak cannot build on a sequence that already carries fixes")]
    PendingFixes,
}

/// Format source code context around an error location
///
/// Shows 2 lines before the error, the error line with >> marker, and 2 lines after.
pub fn format_source_context(source: &str, location: Location) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let error_line = location.line_no.saturating_sub(1);

    let start_line = error_line.saturating_sub(2);
    let end_line = (error_line + 3).min(lines.len());

    let mut context = String::new();
    for (line_num, line) in lines.iter().enumerate().take(end_line).skip(start_line) {
        let marker = if line_num == error_line { ">>" } else { "  " };
        context.push_str(&format!("{} {:3} | {}\n", marker, line_num + 1, line));
    }
    context
}
