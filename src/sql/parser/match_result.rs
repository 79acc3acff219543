//! Match results
//!
//! A [`MatchResult`] records what a matcher recognized without building any
//! segments: a half-open [`Span`] over the root segment list, what to wrap
//! that span in, zero-width metas to insert and the already-resolved child
//! matches. [`MatchResult::apply`] realizes it as a tree once the whole file
//! has been matched.

use crate::sql::errors::{Location, SqlParseError};
use crate::sql::segments::{Segment, SyntaxKind};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a matched span becomes when applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matched {
    /// Wrap the span in a composite of this kind.
    Kind(SyntaxKind),
    /// Retype the single raw segment in the span.
    Newtype(SyntaxKind),
    /// Wrap the span in an `unparsable` node.
    Unparsable { expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub span: Span,
    pub matched: Option<Matched>,
    pub insert_segments: Vec<(usize, SyntaxKind)>,
    pub child_matches: Vec<MatchResult>,
    /// False for empty matches and for results that contain unparsable
    /// regions.
    pub is_clean: bool,
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            span: Span::default(),
            matched: None,
            insert_segments: Vec::new(),
            child_matches: Vec::new(),
            is_clean: true,
        }
    }
}

impl MatchResult {
    /// The failed match at `idx`. Always unclean.
    pub fn empty_at(idx: usize) -> Self {
        Self {
            span: Span::new(idx, idx),
            is_clean: false,
            ..Self::default()
        }
    }

    pub fn from_span(start: usize, end: usize) -> Self {
        Self {
            span: Span::new(start, end),
            ..Self::default()
        }
    }

    pub fn unparsable(start: usize, end: usize, expected: impl Into<String>) -> Self {
        Self {
            span: Span::new(start, end),
            matched: Some(Matched::Unparsable {
                expected: expected.into(),
            }),
            is_clean: false,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    /// True when anything was matched, including zero-width inserts.
    pub fn has_match(&self) -> bool {
        !self.span.is_empty() || !self.insert_segments.is_empty()
    }

    /// Clean beats unclean, otherwise the longer match wins.
    pub fn is_better_than(&self, other: &MatchResult) -> bool {
        if self.is_clean && !other.is_clean {
            return true;
        }
        if other.is_clean && !self.is_clean {
            return false;
        }
        self.len() > other.len()
    }

    /// Combine with a match that starts at or after this one's end.
    pub fn append(self, other: MatchResult) -> MatchResult {
        if !self.has_match() {
            return other;
        }
        if !other.has_match() {
            return self;
        }

        let span = Span::new(self.span.start, other.span.end);
        let is_clean = self.is_clean && other.is_clean;
        let mut insert_segments = Vec::new();
        let mut child_matches = Vec::new();
        for result in [self, other] {
            if result.matched.is_some() {
                child_matches.push(result);
            } else {
                insert_segments.extend(result.insert_segments);
                child_matches.extend(result.child_matches);
            }
        }

        MatchResult {
            span,
            matched: None,
            insert_segments,
            child_matches,
            is_clean,
        }
    }

    /// Wrap this result in `outer`. Zero-length results are returned as they
    /// are: there is nothing to wrap.
    pub fn wrap(self, outer: Matched) -> MatchResult {
        if self.span.is_empty() {
            return self;
        }
        let is_clean = self.is_clean && !matches!(outer, Matched::Unparsable { .. });
        let span = self.span;
        let (insert_segments, child_matches) = if self.matched.is_some() {
            (Vec::new(), vec![self])
        } else {
            (self.insert_segments, self.child_matches)
        };

        MatchResult {
            span,
            matched: Some(outer),
            insert_segments,
            child_matches,
            is_clean,
        }
    }

    /// Realize the match against the segments it was computed over.
    ///
    /// Children and inserted metas are spliced in index order, every other
    /// segment in the span is carried over unchanged. Overlapping children
    /// are an engine fault.
    pub fn apply(&self, segments: &[Segment]) -> Result<Vec<Segment>, SqlParseError> {
        if self.span.end > segments.len() {
            return Err(internal(
                segments,
                self.span.start,
                format!(
                    "match {}..{} lies outside the {} segments it was applied to",
                    self.span.start,
                    self.span.end,
                    segments.len()
                ),
            ));
        }

        enum Trigger<'a> {
            Meta(SyntaxKind),
            Child(&'a MatchResult),
        }

        let mut triggers: BTreeMap<usize, Vec<Trigger<'_>>> = BTreeMap::new();
        for (idx, kind) in &self.insert_segments {
            triggers.entry(*idx).or_default().push(Trigger::Meta(*kind));
        }
        for child in &self.child_matches {
            triggers
                .entry(child.span.start)
                .or_default()
                .push(Trigger::Child(child));
        }

        let mut result = Vec::with_capacity(self.span.len());
        let mut max_idx = self.span.start;
        for (idx, group) in triggers {
            if idx > max_idx {
                result.extend_from_slice(&segments[max_idx..idx]);
                max_idx = idx;
            } else if idx < max_idx {
                return Err(internal(
                    segments,
                    idx,
                    format!(
                        "overlapping matches: index {} already consumed up to {}",
                        idx, max_idx
                    ),
                ));
            }
            for trigger in group {
                match trigger {
                    Trigger::Child(child) => {
                        if child.span.start < max_idx {
                            return Err(internal(
                                segments,
                                child.span.start,
                                "child match overlaps a previous child".to_string(),
                            ));
                        }
                        result.extend(child.apply(segments)?);
                        max_idx = child.span.end;
                    }
                    Trigger::Meta(kind) => {
                        let position = if idx < segments.len() {
                            segments[idx].position().map(|p| p.start_point_marker())
                        } else {
                            idx.checked_sub(1)
                                .and_then(|prev| segments[prev].position())
                                .map(|p| p.end_point_marker())
                        };
                        result.push(Segment::indent(kind, position, None));
                    }
                }
            }
        }
        if max_idx < self.span.end {
            result.extend_from_slice(&segments[max_idx..self.span.end]);
        }

        match &self.matched {
            None => Ok(result),
            Some(Matched::Kind(kind)) => Ok(vec![Segment::node(*kind, result)]),
            Some(Matched::Unparsable { expected }) => {
                Ok(vec![Segment::unparsable(result, expected.clone())])
            }
            Some(Matched::Newtype(kind)) => match result.as_slice() {
                [single] if single.is_raw() => Ok(vec![single.retyped(*kind)]),
                _ => Err(internal(
                    segments,
                    self.span.start,
                    format!("cannot retype {} segments as {}", result.len(), kind),
                )),
            },
        }
    }
}

fn internal(segments: &[Segment], idx: usize, description: String) -> SqlParseError {
    let location = segments
        .get(idx)
        .or_else(|| segments.last())
        .and_then(Segment::position)
        .map(Location::from)
        .unwrap_or_default();
    log::error!(target: "sqlreflow::parser", "{} at {}", description, location);
    SqlParseError::Internal {
        description,
        location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::lexer::lex;

    fn kinds(segments: &[Segment]) -> Vec<SyntaxKind> {
        segments.iter().map(Segment::kind).collect()
    }

    #[test]
    fn test_empty_match_is_unclean() {
        let empty = MatchResult::empty_at(3);
        assert!(!empty.is_clean);
        assert!(!empty.has_match());
        assert_eq!(empty.span, Span::new(3, 3));
        assert!(MatchResult::from_span(3, 3).is_better_than(&empty));
        assert!(MatchResult::from_span(0, 2).is_better_than(&MatchResult::from_span(0, 1)));
        assert!(!MatchResult::from_span(0, 1).is_better_than(&MatchResult::from_span(0, 1)));
    }

    #[test]
    fn test_append_flattens_unwrapped_results() {
        let first = MatchResult {
            span: Span::new(0, 1),
            insert_segments: vec![(1, SyntaxKind::Indent)],
            ..MatchResult::default()
        };
        let second = MatchResult::from_span(2, 3).wrap(Matched::Kind(SyntaxKind::Expression));
        let combined = first.append(second);
        assert_eq!(combined.span, Span::new(0, 3));
        assert_eq!(combined.insert_segments, vec![(1, SyntaxKind::Indent)]);
        assert_eq!(combined.child_matches.len(), 1);
        assert!(combined.matched.is_none());
        assert_eq!(MatchResult::empty_at(0).append(combined.clone()), combined);
    }

    #[test]
    fn test_wrap_keeps_matched_child() {
        let inner = MatchResult::from_span(0, 1).wrap(Matched::Newtype(SyntaxKind::Keyword));
        let outer = inner.clone().wrap(Matched::Kind(SyntaxKind::SelectClause));
        assert_eq!(outer.child_matches, vec![inner]);
        assert_eq!(
            MatchResult::empty_at(4).wrap(Matched::Kind(SyntaxKind::File)),
            MatchResult::empty_at(4)
        );
    }

    #[test]
    fn test_apply_builds_tree_with_metas() {
        let segments = lex("select 1").unwrap();
        let keyword = MatchResult::from_span(0, 1).wrap(Matched::Newtype(SyntaxKind::Keyword));
        let literal =
            MatchResult::from_span(2, 3).wrap(Matched::Kind(SyntaxKind::SelectClauseElement));
        let clause = MatchResult {
            span: Span::new(0, 3),
            insert_segments: vec![(1, SyntaxKind::Indent), (3, SyntaxKind::Dedent)],
            child_matches: vec![keyword, literal],
            ..MatchResult::default()
        }
        .wrap(Matched::Kind(SyntaxKind::SelectClause));

        let applied = clause.apply(&segments).unwrap();
        assert_eq!(applied.len(), 1);
        let tree = &applied[0];
        assert_eq!(tree.raw(), "select 1");
        assert_eq!(
            kinds(tree.segments()),
            vec![
                SyntaxKind::Keyword,
                SyntaxKind::Indent,
                SyntaxKind::Whitespace,
                SyntaxKind::SelectClauseElement,
                SyntaxKind::Dedent,
            ]
        );
        assert_eq!(tree.segments()[4].get_start_loc(), Some((1, 9)));
    }

    #[test]
    fn test_apply_rejects_overlaps() {
        let segments = lex("select 1").unwrap();
        let result = MatchResult {
            span: Span::new(0, 3),
            child_matches: vec![
                MatchResult::from_span(0, 2).wrap(Matched::Kind(SyntaxKind::Expression)),
                MatchResult::from_span(1, 3).wrap(Matched::Kind(SyntaxKind::Expression)),
            ],
            ..MatchResult::default()
        };
        assert!(matches!(result.apply(&segments), Err(SqlParseError::Internal { .. })));
    }

    #[test]
    fn test_newtype_needs_single_raw() {
        let segments = lex("select 1").unwrap();
        let result = MatchResult::from_span(0, 2).wrap(Matched::Newtype(SyntaxKind::Keyword));
        assert!(result.apply(&segments).is_err());
    }
}
