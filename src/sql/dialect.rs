//! Dialects and the dialect registry
//!
//! A [`Dialect`] is a named, compiled [`Grammar`] plus the keyword lists it
//! was built from. Dialects are static data: they are built once, never
//! mutated afterwards, and shared by reference with every parse.

pub mod ansi;

use crate::sql::errors::CompileError;
use crate::sql::parser::grammar::Grammar;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone)]
pub struct Dialect {
    pub name: String,
    pub grammar: Grammar,
    reserved_keywords: FxHashSet<String>,
    unreserved_keywords: FxHashSet<String>,
}

impl Dialect {
    /// Wrap an already compiled grammar.
    pub fn new(name: impl Into<String>, grammar: Grammar) -> Self {
        Self {
            name: name.into(),
            grammar,
            reserved_keywords: FxHashSet::default(),
            unreserved_keywords: FxHashSet::default(),
        }
    }

    pub fn with_keywords(mut self, reserved: &[&str], unreserved: &[&str]) -> Self {
        self.reserved_keywords = reserved.iter().map(|kw| kw.to_uppercase()).collect();
        self.unreserved_keywords = unreserved.iter().map(|kw| kw.to_uppercase()).collect();
        self
    }

    /// The ANSI subset shipped with the crate.
    pub fn ansi() -> Result<Self, CompileError> {
        let grammar = ansi::grammar()?;
        Ok(Self::new("ansi", grammar)
            .with_keywords(ansi::RESERVED_KEYWORDS, ansi::UNRESERVED_KEYWORDS))
    }

    /// Reserved words can't be used as bare identifiers.
    pub fn is_reserved(&self, word: &str) -> bool {
        self.reserved_keywords.contains(&word.to_uppercase())
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        let upper = word.to_uppercase();
        self.reserved_keywords.contains(&upper) || self.unreserved_keywords.contains(&upper)
    }
}

/// Registry of dialects by name
pub struct DialectRegistry {
    dialects: FxHashMap<String, Dialect>,
}

impl DialectRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        DialectRegistry {
            dialects: FxHashMap::default(),
        }
    }

    /// Register a dialect, replacing any previous one of the same name
    pub fn register(&mut self, dialect: Dialect) {
        log::debug!(target: "sqlreflow::parser", "registering dialect {}", dialect.name);
        self.dialects.insert(dialect.name.clone(), dialect);
    }

    pub fn get(&self, name: &str) -> Option<&Dialect> {
        self.dialects.get(&name.to_lowercase())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dialects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Create registry with the bundled dialects
    pub fn with_defaults() -> Result<Self, CompileError> {
        let mut registry = Self::new();
        registry.register(Dialect::ansi()?);
        Ok(registry)
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let registry = DialectRegistry::with_defaults().unwrap();
        assert_eq!(registry.names(), vec!["ansi"]);
        assert!(registry.has("ANSI"));
        assert!(registry.get("postgres").is_none());
    }

    #[test]
    fn test_keywords() {
        let dialect = Dialect::ansi().unwrap();
        assert!(dialect.is_reserved("select"));
        assert!(!dialect.is_reserved("nulls"));
        assert!(dialect.is_keyword("nulls"));
        assert!(!dialect.is_keyword("foo"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = DialectRegistry::new();
        registry.register(Dialect::new("ansi", Grammar::new().compile().unwrap()));
        registry.register(Dialect::ansi().unwrap());
        assert_eq!(registry.names().len(), 1);
        assert!(registry.get("ansi").unwrap().grammar.root("FileSegment").is_some());
    }
}
