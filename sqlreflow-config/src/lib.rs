//! Layered configuration for the sqlreflow parser and reflow engine.
//!
//! `defaults/sqlreflow.default.toml` is embedded into every binary so that the
//! documented defaults and runtime behavior stay in sync. Applications layer
//! user files and single-key overrides on top of those defaults via [`Loader`]
//! before deserializing into [`SqlreflowConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub use config::ConfigError;

const DEFAULT_TOML: &str = include_str!("../defaults/sqlreflow.default.toml");

/// Top-level configuration consumed by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlreflowConfig {
    pub parser: ParserSection,
    pub indentation: IndentationSection,
    pub layout: LayoutSection,
}

/// Knobs for the grammar-matching parser.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserSection {
    pub dialect: String,
    pub max_parse_depth: usize,
}

/// Indentation settings shared by the grammar (conditional indents) and the
/// reindent pass.
#[derive(Debug, Clone, Deserialize)]
pub struct IndentationSection {
    pub indent_unit: String,
    pub tab_space_size: usize,
    pub hanging_indents: bool,
    pub skip_indentation_in: Vec<String>,
    pub indented_joins: bool,
    pub indented_ctes: bool,
    pub indented_using_on: bool,
    pub indented_on_contents: bool,
    pub indented_then: bool,
    pub allow_implicit_indents: bool,
}

/// Spacing and line break preferences, keyed by segment type name under
/// `[layout.type.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayoutSection {
    #[serde(rename = "type", default)]
    pub types: BTreeMap<String, LayoutTypeSection>,
}

/// Layout for one segment type. Spacing values are `single`, `touch` or
/// `any`, optionally suffixed with `:inline`; line positions are `leading`
/// or `trailing`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LayoutTypeSection {
    pub spacing_before: Option<String>,
    pub spacing_after: Option<String>,
    pub spacing_within: Option<String>,
    pub line_position: Option<String>,
}

/// Helper for layering user overrides over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    /// Start a loader seeded with the embedded defaults.
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a configuration file. Missing files trigger an error.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer an optional configuration file (ignored if absent).
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Layer raw TOML text, e.g. an inline config passed by a test or editor.
    pub fn with_toml_str(mut self, toml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(toml, FileFormat::Toml));
        self
    }

    /// Apply a single key/value override such as `indentation.tab_space_size`.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<SqlreflowConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for callers that only need the defaults.
pub fn load_defaults() -> Result<SqlreflowConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.parser.dialect, "ansi");
        assert_eq!(config.parser.max_parse_depth, 255);
        assert_eq!(config.indentation.indent_unit, "space");
        assert_eq!(config.indentation.tab_space_size, 4);
        assert!(config.indentation.skip_indentation_in.is_empty());
        assert!(!config.indentation.indented_joins);
        assert!(config.indentation.indented_then);

        let comma = &config.layout.types["comma"];
        assert_eq!(comma.spacing_before.as_deref(), Some("touch"));
        assert_eq!(comma.line_position.as_deref(), Some("trailing"));
        assert_eq!(comma.spacing_after, None);
    }

    #[test]
    fn layout_entries_merge_per_key() {
        let config = Loader::new()
            .with_toml_str(
                r#"
[layout.type.comma]
line_position = "leading"

[layout.type.keyword]
spacing_after = "any"
"#,
            )
            .build()
            .expect("config to build");
        let comma = &config.layout.types["comma"];
        assert_eq!(comma.line_position.as_deref(), Some("leading"));
        assert_eq!(comma.spacing_before.as_deref(), Some("touch"));
        assert_eq!(config.layout.types["keyword"].spacing_after.as_deref(), Some("any"));
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("indentation.tab_space_size", 2_i64)
            .expect("override to apply")
            .set_override("indentation.indent_unit", "tab")
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.indentation.tab_space_size, 2);
        assert_eq!(config.indentation.indent_unit, "tab");
    }

    #[test]
    fn layers_inline_toml() {
        let config = Loader::new()
            .with_toml_str(
                r#"
[indentation]
hanging_indents = true
skip_indentation_in = ["case_expression"]
"#,
            )
            .build()
            .expect("config to build");
        assert!(config.indentation.hanging_indents);
        assert_eq!(config.indentation.skip_indentation_in, vec!["case_expression"]);
        // Untouched keys keep their defaults
        assert_eq!(config.indentation.tab_space_size, 4);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = Loader::new()
            .with_file("/definitely/not/here/sqlreflow.toml")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn missing_optional_file_is_ignored() {
        let config = Loader::new()
            .with_optional_file("/definitely/not/here/sqlreflow.toml")
            .build()
            .expect("optional file to be skipped");
        assert_eq!(config.parser.dialect, "ansi");
    }
}
