//! Grammar-matching parser
//!
//! Turns the flat segment list produced by the lexer into a syntax tree by
//! matching it against a dialect's root grammar:
//!
//! 1. **Match**: the root grammar is matched over the code span of the file,
//!    producing a [`MatchResult`] that describes the whole tree without
//!    building it.
//! 2. **Apply**: the result is realized into segments. Nested rules were
//!    already resolved during matching, so realizing the tree expands every
//!    level at once.
//! 3. **Validate**: the realized tree must reproduce the input text exactly
//!    and its positions must be contiguous. Either failure is an engine
//!    fault, not a problem with the SQL.
//!
//! Input the grammar can't account for is wrapped in `unparsable` nodes and
//! reported as [`ParseDiagnostic`]s; the rest of the file still parses.

pub mod context;
pub mod grammar;
pub mod match_algorithms;
pub mod match_result;
pub mod matchable;

pub use context::{IndentToggle, IndentationToggles, ParseContext};
pub use grammar::{Grammar, NodeId, ParseMode};
pub use match_result::{MatchResult, Matched, Span};
pub use matchable::match_node;

use crate::sql::dialect::Dialect;
use crate::sql::errors::{Location, SqlParseError};
use crate::sql::lexer::lex;
use crate::sql::parser::match_algorithms::{
    skip_start_index_forward_to_code, skip_stop_index_backward_to_code,
};
use crate::sql::segments::{Segment, SyntaxKind};
use sqlreflow_config::SqlreflowConfig;
use std::fmt;

/// Name of the rule every dialect parses files with.
pub const ROOT_SEGMENT: &str = "FileSegment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    pub max_parse_depth: usize,
    pub indentation: IndentationToggles,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_parse_depth: 255,
            indentation: IndentationToggles::default(),
        }
    }
}

impl From<&SqlreflowConfig> for ParserConfig {
    fn from(config: &SqlreflowConfig) -> Self {
        let indentation = &config.indentation;
        Self {
            max_parse_depth: config.parser.max_parse_depth,
            indentation: IndentationToggles {
                indented_joins: indentation.indented_joins,
                indented_ctes: indentation.indented_ctes,
                indented_using_on: indentation.indented_using_on,
                indented_on_contents: indentation.indented_on_contents,
                indented_then: indentation.indented_then,
            },
        }
    }
}

/// One unparsable region of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub location: Location,
    pub expected: String,
    pub found: String,
    pub message: String,
}

impl ParseDiagnostic {
    fn from_unparsable(segment: &Segment) -> Self {
        let location = segment.position().map(Location::from).unwrap_or_default();
        let expected = segment.expected().unwrap_or("something else").to_string();
        let found = segment
            .raw_segments()
            .iter()
            .find(|seg| seg.is_code())
            .map(|seg| seg.raw().to_string())
            .unwrap_or_default();
        let message = format!("expected {}, found '{}'", expected, found);
        Self {
            location,
            expected,
            found,
            message,
        }
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// A parsed file: the tree plus one diagnostic per unparsable region.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub fname: String,
    pub tree: Segment,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParsedFile {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

pub struct Parser<'a> {
    dialect: &'a Dialect,
    config: ParserConfig,
}

impl<'a> Parser<'a> {
    pub fn new(dialect: &'a Dialect, config: ParserConfig) -> Self {
        Self { dialect, config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Lex and parse an untemplated string.
    pub fn parse_string(&self, sql: &str) -> Result<ParsedFile, SqlParseError> {
        let segments = lex(sql)?;
        self.parse(&segments, "<string>")
    }

    /// Parse lexed `segments` into a `file` tree.
    pub fn parse(&self, segments: &[Segment], fname: &str) -> Result<ParsedFile, SqlParseError> {
        let grammar = &self.dialect.grammar;
        let root = grammar
            .root(ROOT_SEGMENT)
            .ok_or_else(|| SqlParseError::MissingRoot {
                dialect: self.dialect.name.clone(),
                name: ROOT_SEGMENT.to_string(),
            })?;

        let start_idx = skip_start_index_forward_to_code(segments, 0, segments.len());
        let end_idx = skip_stop_index_backward_to_code(segments, segments.len(), start_idx);

        let children = if start_idx == end_idx {
            log::debug!(target: "sqlreflow::parser", "{}: no code to parse", fname);
            segments.to_vec()
        } else {
            let mut ctx = ParseContext::new(
                grammar,
                self.config.indentation,
                self.config.max_parse_depth,
            );
            let matched = match ctx.deeper_match(false, &[], |ctx| {
                match_node(root, &segments[..end_idx], start_idx, ctx)
            }) {
                Ok(matched) => complete_match(matched, segments, start_idx, end_idx, grammar, root),
                Err(SqlParseError::TooComplex { max_depth, location }) => {
                    log::warn!(
                        target: "sqlreflow::parser",
                        "{}: nesting exceeded {} at {}; treating the file as unparsable",
                        fname,
                        max_depth,
                        location
                    );
                    MatchResult::unparsable(
                        start_idx,
                        end_idx,
                        format!("a statement nested at most {} levels deep", max_depth),
                    )
                }
                Err(err) => return Err(err),
            };
            ctx.clear_cache();

            let mut children = segments[..start_idx].to_vec();
            children.extend(matched.apply(segments)?);
            children.extend_from_slice(&segments[end_idx..]);
            children
        };

        let tree = Segment::node(SyntaxKind::File, children);
        check_completeness(segments, &tree)?;
        if let Err(segment) = tree.validate_segment_positions() {
            let location = segment.position().map(Location::from).unwrap_or_default();
            log::error!(target: "sqlreflow::parser", "{}: positions jump at {}", fname, location);
            return Err(SqlParseError::Discontiguous { location });
        }

        let diagnostics: Vec<ParseDiagnostic> = tree
            .iter_unparsables()
            .iter()
            .map(ParseDiagnostic::from_unparsable)
            .collect();
        for diagnostic in &diagnostics {
            log::debug!(target: "sqlreflow::parser", "{}: {}", fname, diagnostic);
        }

        Ok(ParsedFile {
            fname: fname.to_string(),
            tree,
            diagnostics,
        })
    }
}

/// Make the root match cover the whole code span: no match wraps all of it,
/// a partial match wraps what's left after it.
fn complete_match(
    matched: MatchResult,
    segments: &[Segment],
    start_idx: usize,
    end_idx: usize,
    grammar: &Grammar,
    root: NodeId,
) -> MatchResult {
    if !matched.has_match() {
        return MatchResult::unparsable(start_idx, end_idx, grammar.describe(root));
    }
    if matched.span.end >= end_idx {
        return matched;
    }
    let tail_start = skip_start_index_forward_to_code(segments, matched.span.end, end_idx);
    matched.append(MatchResult::unparsable(tail_start, end_idx, "nothing else"))
}

fn check_completeness(segments: &[Segment], tree: &Segment) -> Result<(), SqlParseError> {
    let expected: String = segments.iter().map(Segment::raw).collect();
    let actual = tree.raw();
    if expected != actual {
        log::error!(
            target: "sqlreflow::parser",
            "parse lost or duplicated text: {:?} became {:?}",
            expected,
            actual
        );
        return Err(SqlParseError::Completeness {
            expected,
            actual: actual.to_string(),
        });
    }
    Ok(())
}
