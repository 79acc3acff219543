//! Testing utilities for parse trees and reindent output
//!
//! # Guidelines
//!
//! 1. **Use [`SqlSources`] for shared inputs.** The curated samples are
//!    checked against the bundled dialect; tests that need "a select with a
//!    join" should take it from there instead of writing a fresh query.
//! 2. **Assert whole shapes, not counts.** [`assert_tree`] walks a tree with
//!    a fluent API so a test states the kinds and raws it expects at every
//!    level it cares about:
//!
//! ```rust-example
//! use sqlreflow::sql::testing::{assert_tree, parse_ansi};
//! use sqlreflow::sql::SyntaxKind;
//!
//! let parsed = parse_ansi("select 1");
//! assert_tree(&parsed.tree)
//!     .kind(SyntaxKind::File)
//!     .code_child(0, |stmt| {
//!         stmt.kind(SyntaxKind::Statement)
//!             .raw("select 1")
//!     });
//! ```
//!
//! 3. **Compare text with [`assert_text_eq`].** Reindent failures are about
//!    whitespace; the line diff shows exactly which line moved.

use crate::sql::dialect::Dialect;
use crate::sql::parser::{ParsedFile, Parser, ParserConfig};
use crate::sql::reflow::ReflowConfig;
use crate::sql::pipeline::Pipeline;
use crate::sql::segments::{Segment, SyntaxKind};

/// Curated SQL samples that parse cleanly with the ANSI dialect.
pub struct SqlSources;

impl SqlSources {
    const SAMPLES: &'static [(&'static str, &'static str)] = &[
        ("select-literal", "select 1"),
        ("select-columns", "select a, b as c\nfrom t\n"),
        ("select-where", "select a\nfrom t\nwhere a = 1\n    and b = 2\n"),
        (
            "select-join",
            "select\n    t.a,\n    u.b\nfrom t\ninner join u\n    on t.id = u.id\n",
        ),
        (
            "select-function",
            "select\n    coalesce(a, b) as c,\n    count(*)\nfrom t\ngroup by c\n",
        ),
        ("select-bracketed", "select (a + (b * 2)) as c\nfrom t\n"),
        (
            "with-cte",
            "with cte as (\n    select a\n    from t\n)\nselect a\nfrom cte\n",
        ),
        ("two-statements", "select a\nfrom t;\nselect b\nfrom u;\n"),
    ];

    /// Sample text by name.
    ///
    /// # Panics
    ///
    /// Panics on an unknown name, listing the known ones.
    pub fn get(name: &str) -> &'static str {
        Self::SAMPLES
            .iter()
            .find(|(sample, _)| *sample == name)
            .map(|(_, sql)| *sql)
            .unwrap_or_else(|| panic!("unknown sample {:?}; known: {:?}", name, Self::names()))
    }

    pub fn names() -> Vec<&'static str> {
        Self::SAMPLES.iter().map(|(name, _)| *name).collect()
    }

    pub fn all() -> &'static [(&'static str, &'static str)] {
        Self::SAMPLES
    }
}

/// Parse with the ANSI dialect and default settings, panicking on engine errors.
pub fn parse_ansi(sql: &str) -> ParsedFile {
    let dialect = Dialect::ansi().unwrap_or_else(|err| panic!("ansi dialect: {}", err));
    Parser::new(&dialect, ParserConfig::default())
        .parse_string(sql)
        .unwrap_or_else(|err| panic!("{}", err.render(sql)))
}

/// Reindent with the ANSI dialect and the given reflow settings.
pub fn reindent_with(sql: &str, config: ReflowConfig) -> String {
    let pipeline = Pipeline::ansi()
        .unwrap_or_else(|err| panic!("ansi pipeline: {}", err))
        .with_reflow_config(config);
    pipeline
        .reindent(sql, "<test>")
        .unwrap_or_else(|err| panic!("reindent failed: {}", err))
        .fixed
}

/// Start a fluent assertion on `segment`.
pub fn assert_tree(segment: &Segment) -> TreeAssertion<'_> {
    TreeAssertion {
        segment,
        path: String::from("root"),
    }
}

pub struct TreeAssertion<'a> {
    segment: &'a Segment,
    path: String,
}

impl<'a> TreeAssertion<'a> {
    pub fn kind(self, expected: SyntaxKind) -> Self {
        assert_eq!(
            self.segment.kind(),
            expected,
            "{}: expected {}, found {}",
            self.path,
            expected.as_str(),
            self.segment.kind().as_str()
        );
        self
    }

    pub fn raw(self, expected: &str) -> Self {
        assert_eq!(self.segment.raw(), expected, "{}: raw differs", self.path);
        self
    }

    pub fn child_count(self, expected: usize) -> Self {
        assert_eq!(
            self.segment.segments().len(),
            expected,
            "{}: child count differs; children are {:?}",
            self.path,
            self.child_kinds()
        );
        self
    }

    /// Kinds of the code children, in order.
    pub fn code_kinds(self, expected: &[SyntaxKind]) -> Self {
        let actual: Vec<SyntaxKind> = self
            .segment
            .segments()
            .iter()
            .filter(|seg| seg.is_code())
            .map(Segment::kind)
            .collect();
        assert_eq!(actual, expected, "{}: code children differ", self.path);
        self
    }

    pub fn child<F>(self, idx: usize, check: F) -> Self
    where
        F: FnOnce(TreeAssertion<'_>) -> TreeAssertion<'_>,
    {
        let child = self.segment.segments().get(idx).unwrap_or_else(|| {
            panic!(
                "{}: no child {}; children are {:?}",
                self.path,
                idx,
                self.child_kinds()
            )
        });
        check(TreeAssertion {
            segment: child,
            path: format!("{}/{}", self.path, idx),
        });
        self
    }

    /// Like [`child`](Self::child) but counting only code children.
    pub fn code_child<F>(self, idx: usize, check: F) -> Self
    where
        F: FnOnce(TreeAssertion<'_>) -> TreeAssertion<'_>,
    {
        let child = self
            .segment
            .segments()
            .iter()
            .filter(|seg| seg.is_code())
            .nth(idx)
            .unwrap_or_else(|| panic!("{}: no code child {}", self.path, idx));
        check(TreeAssertion {
            segment: child,
            path: format!("{}/code{}", self.path, idx),
        });
        self
    }

    /// The first descendant of `kind` exists and passes `check`.
    pub fn find<F>(self, kind: SyntaxKind, check: F) -> Self
    where
        F: FnOnce(TreeAssertion<'_>) -> TreeAssertion<'_>,
    {
        let found = find_first(self.segment, kind)
            .unwrap_or_else(|| panic!("{}: no {} below", self.path, kind.as_str()));
        check(TreeAssertion {
            segment: found,
            path: format!("{}//{}", self.path, kind.as_str()),
        });
        self
    }

    pub fn no_unparsable(self) -> Self {
        let unparsables = self.segment.iter_unparsables();
        assert!(
            unparsables.is_empty(),
            "{}: unexpected unparsable {:?}",
            self.path,
            unparsables.iter().map(Segment::raw).collect::<Vec<_>>()
        );
        self
    }

    fn child_kinds(&self) -> Vec<&'static str> {
        self.segment
            .segments()
            .iter()
            .map(|seg| seg.kind().as_str())
            .collect()
    }
}

fn find_first(segment: &Segment, kind: SyntaxKind) -> Option<&Segment> {
    segment.segments().iter().find_map(|child| {
        if child.is_type(kind) {
            Some(child)
        } else {
            find_first(child, kind)
        }
    })
}

/// Assert that two strings are equal, with a line-by-line diff on failure.
pub fn assert_text_eq(expected: &str, actual: &str) {
    if let Some(report) = diff_text(expected, actual) {
        panic!(
            "\n\nText comparison failed:\n{}\n\nExpected:\n{}\n\nActual:\n{}\n",
            report, expected, actual
        );
    }
}

/// `None` when equal, otherwise one entry per differing line. Whitespace is
/// shown escaped since that is usually what differs.
pub fn diff_text(expected: &str, actual: &str) -> Option<String> {
    if expected == actual {
        return None;
    }
    let expected_lines: Vec<&str> = expected.split('\n').collect();
    let actual_lines: Vec<&str> = actual.split('\n').collect();
    let mut report = Vec::new();
    for i in 0..expected_lines.len().max(actual_lines.len()) {
        match (expected_lines.get(i), actual_lines.get(i)) {
            (Some(exp), Some(act)) if exp == act => {}
            (Some(exp), Some(act)) => {
                report.push(format!("Line {}: MISMATCH", i + 1));
                report.push(format!("  Expected: {exp:?}"));
                report.push(format!("  Actual:   {act:?}"));
            }
            (Some(exp), None) => {
                report.push(format!("Line {}: MISSING in actual", i + 1));
                report.push(format!("  Expected: {exp:?}"));
            }
            (None, Some(act)) => {
                report.push(format!("Line {}: EXTRA in actual", i + 1));
                report.push(format!("  Actual:   {act:?}"));
            }
            (None, None) => {}
        }
    }
    Some(report.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_parse_cleanly() {
        for (name, sql) in SqlSources::all() {
            let parsed = parse_ansi(sql);
            assert!(parsed.is_clean(), "{}: {:?}", name, parsed.diagnostics);
            assert_eq!(parsed.tree.raw(), *sql);
        }
    }

    #[test]
    fn test_tree_assertion_walks_children() {
        let parsed = parse_ansi(SqlSources::get("select-literal"));
        assert_tree(&parsed.tree)
            .kind(SyntaxKind::File)
            .no_unparsable()
            .code_child(0, |stmt| stmt.kind(SyntaxKind::Statement).raw("select 1"))
            .find(SyntaxKind::NumericLiteral, |lit| lit.raw("1"));
    }

    #[test]
    #[should_panic(expected = "unknown sample")]
    fn test_unknown_sample_panics() {
        SqlSources::get("no-such-sample");
    }

    #[test]
    fn test_diff_text_marks_lines() {
        assert_eq!(diff_text("a\nb", "a\nb"), None);
        let report = diff_text("a\n    b", "a\n  b").unwrap();
        assert!(report.contains("Line 2: MISMATCH"));
        assert!(report.contains("\"    b\""));
    }
}
