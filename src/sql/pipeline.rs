//! Parse and reindent SQL text end to end
//!
//! The engine pieces (lexer, parser, reflow) each work on their own types.
//! [`Pipeline`] strings them together for callers that start from source
//! text: the debug binary and the integration tests.
//!
//! Reindenting runs in passes. Each pass parses the current text, lints the
//! indentation of the resulting tree and applies the fixes; the fixed text is
//! parsed again for the next pass, so every pass sees fresh positions. The
//! loop stops once a pass produces no fixes.
//!
//! Respacing and rebreaking are single passes over one parse.

use crate::sql::dialect::{Dialect, DialectRegistry};
use crate::sql::errors::{CompileError, ReflowError, SqlParseError};
use crate::sql::parser::{ParseDiagnostic, ParsedFile, Parser, ParserConfig};
use crate::sql::reflow::{ReflowConfig, ReflowSequence, RespaceFilter};
use crate::sql::segments::{apply_fixes, LintResult};
use crate::sql::templated::TemplatedFile;
use sqlreflow_config::{ConfigError, SqlreflowConfig};
use std::rc::Rc;
use thiserror::Error;

/// Passes after which reindenting gives up on reaching a fixed point.
pub const MAX_REINDENT_PASSES: usize = 10;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown dialect `{0}`")]
    UnknownDialect(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Parse(#[from] SqlParseError),
    #[error(transparent)]
    Reflow(#[from] ReflowError),
}

/// Result of reindenting one file.
#[derive(Debug, Clone)]
pub struct ReindentOutcome {
    /// The reindented source text.
    pub fixed: String,
    /// Problems found in the original text, in line order.
    pub results: Vec<LintResult>,
    /// Unparsable regions of the original text.
    pub diagnostics: Vec<ParseDiagnostic>,
    /// Passes that produced fixes.
    pub passes: usize,
    /// False when the pass limit was hit with fixes still pending.
    pub converged: bool,
}

impl ReindentOutcome {
    pub fn is_changed(&self) -> bool {
        !self.results.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    dialect: Dialect,
    parser_config: ParserConfig,
    reflow_config: ReflowConfig,
}

impl Pipeline {
    pub fn new(dialect: Dialect, parser_config: ParserConfig, reflow_config: ReflowConfig) -> Self {
        Self {
            dialect,
            parser_config,
            reflow_config,
        }
    }

    /// The bundled ANSI dialect with default settings.
    pub fn ansi() -> Result<Self, PipelineError> {
        Ok(Self::new(
            Dialect::ansi()?,
            ParserConfig::default(),
            ReflowConfig::default(),
        ))
    }

    /// Resolve the dialect by name and validate the indentation settings.
    pub fn from_config(config: &SqlreflowConfig) -> Result<Self, PipelineError> {
        let registry = DialectRegistry::with_defaults()?;
        let name = &config.parser.dialect;
        let dialect = registry
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownDialect(name.clone()))?;
        Ok(Self::new(
            dialect,
            ParserConfig::from(config),
            ReflowConfig::from_config(config)?,
        ))
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn reflow_config(&self) -> &ReflowConfig {
        &self.reflow_config
    }

    pub fn with_reflow_config(mut self, reflow_config: ReflowConfig) -> Self {
        self.reflow_config = reflow_config;
        self
    }

    pub fn parse(&self, sql: &str, fname: &str) -> Result<ParsedFile, PipelineError> {
        let segments = crate::sql::lexer::lex(sql).map_err(SqlParseError::from)?;
        let parsed = Parser::new(&self.dialect, self.parser_config).parse(&segments, fname)?;
        Ok(parsed)
    }

    /// Parse an already rendered template. Fixes to such a tree describe the
    /// rendered text, so there is no reindent loop over it.
    pub fn parse_templated(&self, file: &Rc<TemplatedFile>) -> Result<ParsedFile, PipelineError> {
        let segments = crate::sql::lexer::lex_templated(file).map_err(SqlParseError::from)?;
        let parsed = Parser::new(&self.dialect, self.parser_config).parse(&segments, &file.fname)?;
        Ok(parsed)
    }

    /// Lint one pass over `parsed` without applying anything.
    pub fn lint(&self, parsed: &ParsedFile) -> Result<ReflowSequence, PipelineError> {
        let sequence = ReflowSequence::from_root(&parsed.tree, &self.reflow_config)?.reindent()?;
        Ok(sequence)
    }

    /// Set the spacing between segments on each line from the layout config
    /// and drop trailing whitespace. Line breaks are left where they are.
    pub fn respace(&self, sql: &str, fname: &str) -> Result<String, PipelineError> {
        let parsed = self.parse(sql, fname)?;
        let sequence = ReflowSequence::from_root(&parsed.tree, &self.reflow_config)?
            .respace(false, RespaceFilter::All);
        let fixes = sequence.get_fixes();
        log::info!(
            target: "sqlreflow::reflow",
            "{}: respace produced {} fix(es)",
            fname,
            fixes.len()
        );
        Ok(apply_fixes(&parsed.tree, &fixes).raw().to_string())
    }

    /// Move operators and commas to their configured side of the line
    /// breaks next to them.
    pub fn rebreak(&self, sql: &str, fname: &str) -> Result<String, PipelineError> {
        let parsed = self.parse(sql, fname)?;
        let sequence = ReflowSequence::from_root(&parsed.tree, &self.reflow_config)?.rebreak()?;
        let fixes = sequence.get_fixes();
        log::info!(
            target: "sqlreflow::reflow",
            "{}: rebreak produced {} fix(es)",
            fname,
            fixes.len()
        );
        Ok(apply_fixes(&parsed.tree, &fixes).raw().to_string())
    }

    /// Reindent `sql` until it stops changing or the pass limit is reached.
    pub fn reindent(&self, sql: &str, fname: &str) -> Result<ReindentOutcome, PipelineError> {
        let first = self.parse(sql, fname)?;
        let diagnostics = first.diagnostics.clone();
        if !first.is_clean() {
            log::warn!(
                target: "sqlreflow::reflow",
                "{}: {} unparsable region(s); indentation around them may be off",
                fname,
                diagnostics.len()
            );
        }

        let mut parsed = first;
        let mut results = Vec::new();
        let mut passes = 0;
        loop {
            let sequence = self.lint(&parsed)?;
            let fixes = sequence.get_fixes();
            if passes == 0 {
                results = sequence.get_results().to_vec();
            }
            if fixes.is_empty() {
                return Ok(ReindentOutcome {
                    fixed: parsed.tree.raw().to_string(),
                    results,
                    diagnostics,
                    passes,
                    converged: true,
                });
            }
            if passes == MAX_REINDENT_PASSES {
                log::warn!(
                    target: "sqlreflow::reflow",
                    "{}: still {} fix(es) pending after {} passes",
                    fname,
                    fixes.len(),
                    passes
                );
                return Ok(ReindentOutcome {
                    fixed: parsed.tree.raw().to_string(),
                    results,
                    diagnostics,
                    passes,
                    converged: false,
                });
            }

            passes += 1;
            let fixed = apply_fixes(&parsed.tree, &fixes);
            log::info!(
                target: "sqlreflow::reflow",
                "{}: pass {} applied {} fix(es)",
                fname,
                passes,
                fixes.len()
            );
            parsed = self.parse(fixed.raw(), fname)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlreflow_config::Loader;

    #[test]
    fn test_clean_file_takes_no_passes() {
        let pipeline = Pipeline::ansi().unwrap();
        let outcome = pipeline.reindent("select a\nfrom t\n", "clean.sql").unwrap();
        assert_eq!(outcome.fixed, "select a\nfrom t\n");
        assert_eq!(outcome.passes, 0);
        assert!(outcome.converged);
        assert!(!outcome.is_changed());
    }

    #[test]
    fn test_reindent_reports_original_problems() {
        let pipeline = Pipeline::ansi().unwrap();
        let outcome = pipeline.reindent("select\na\nfrom t", "bad.sql").unwrap();
        assert_eq!(outcome.fixed, "select\n    a\nfrom t");
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].description, "Expected indent of 4 spaces.");
        assert!(outcome.passes >= 1);
        assert!(outcome.converged);
    }

    #[test]
    fn test_from_config_uses_indentation_section() {
        let config = Loader::new()
            .set_override("indentation.tab_space_size", 2_i64)
            .unwrap()
            .build()
            .unwrap();
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.reflow_config().tab_space_size, 2);
        let outcome = pipeline.reindent("select\n1", "two.sql").unwrap();
        assert_eq!(outcome.fixed, "select\n  1");
    }

    #[test]
    fn test_unknown_dialect() {
        let config = Loader::new()
            .set_override("parser.dialect", "tsql")
            .unwrap()
            .build()
            .unwrap();
        let result = Pipeline::from_config(&config);
        assert!(matches!(result, Err(PipelineError::UnknownDialect(name)) if name == "tsql"));
    }
}
