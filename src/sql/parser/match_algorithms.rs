//! Matching algorithms shared by the grammar elements
//!
//! Index helpers for skipping non-code, the longest-match selection used by
//! `OneOf`/`AnyNumberOf`/`Delimited`, and the bracket-aware forward search
//! behind greedy matching and terminator trimming.

use crate::sql::errors::SqlParseError;
use crate::sql::parser::context::ParseContext;
use crate::sql::parser::grammar::{NodeId, ResolvedBracket};
use crate::sql::parser::match_result::{MatchResult, Matched, Span};
use crate::sql::parser::matchable::match_node;
use crate::sql::segments::{Segment, SyntaxKind, SyntaxSet};
use rustc_hash::FxHashMap;

/// First index at or after `start_idx` holding code, or `max_idx`.
pub fn skip_start_index_forward_to_code(
    segments: &[Segment],
    start_idx: usize,
    max_idx: usize,
) -> usize {
    let mut idx = start_idx;
    while idx < max_idx && !segments[idx].is_code() {
        idx += 1;
    }
    idx
}

/// Stop index moved back over trailing non-code, not below `min_idx`.
pub fn skip_stop_index_backward_to_code(
    segments: &[Segment],
    stop_idx: usize,
    min_idx: usize,
) -> usize {
    let mut idx = stop_idx;
    while idx > min_idx && !segments[idx - 1].is_code() {
        idx -= 1;
    }
    idx
}

/// First whitespace-separated word of the segment's uppercased raw text.
pub fn first_trimmed_raw(segment: &Segment) -> String {
    segment
        .raw_upper()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Raw text and class types of the first segment from `start_idx` that has
/// visible text.
pub fn first_non_whitespace(segments: &[Segment], start_idx: usize) -> Option<(String, SyntaxSet)> {
    segments.get(start_idx..)?.iter().find_map(|segment| {
        segment
            .first_non_whitespace_raw_upper()
            .map(|raw| (raw, segment.class_types()))
    })
}

fn option_matches_first_token(
    ctx: &ParseContext<'_>,
    option: NodeId,
    first: Option<&(String, SyntaxSet)>,
) -> bool {
    let Some((raw, types)) = first else {
        return true;
    };
    match ctx.grammar.simple(option) {
        Some(simple) => simple.admits(raw, types),
        None => true,
    }
}

/// Try every matcher at `idx` and keep the best result.
///
/// Matchers whose first-token set rules them out are skipped. The longest
/// clean match wins and ties go to the earliest matcher. A match reaching the
/// end of `segments`, or followed by one of the active terminators, ends the
/// search early.
pub fn longest_match(
    segments: &[Segment],
    matchers: &[NodeId],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<(MatchResult, Option<NodeId>), SqlParseError> {
    let max_idx = segments.len();
    if matchers.is_empty() || idx >= max_idx {
        return Ok((MatchResult::empty_at(idx), None));
    }

    let first = first_non_whitespace(segments, idx);
    let available: Vec<NodeId> = matchers
        .iter()
        .copied()
        .filter(|m| option_matches_first_token(ctx, *m, first.as_ref()))
        .collect();
    if available.is_empty() {
        return Ok((MatchResult::empty_at(idx), None));
    }

    let mut best = MatchResult::empty_at(idx);
    let mut best_matcher = None;
    for (seen, matcher) in available.iter().copied().enumerate() {
        let result = match ctx.check_parse_cache(idx, max_idx, matcher) {
            Some(cached) => cached,
            None => {
                let computed = match_node(matcher, segments, idx, ctx)?;
                ctx.put_parse_cache(idx, max_idx, matcher, computed.clone());
                computed
            }
        };

        if result.has_match() && result.span.end == max_idx && result.is_clean {
            return Ok((result, Some(matcher)));
        }

        if result.is_better_than(&best) {
            best = result;
            best_matcher = Some(matcher);

            if seen + 1 == available.len() {
                break;
            }
            if !ctx.terminators.is_empty() {
                let next_code = skip_start_index_forward_to_code(segments, best.span.end, max_idx);
                if next_code == max_idx {
                    break;
                }
                let terminators = ctx.terminators.clone();
                let mut terminated = false;
                for terminator in terminators {
                    if match_node(terminator, segments, next_code, ctx)?.has_match() {
                        terminated = true;
                        break;
                    }
                }
                if terminated {
                    break;
                }
            }
        }
    }

    Ok((best, best_matcher))
}

/// Lookup from first token to the matchers that could start with it.
struct FirstTokenIndex {
    by_raw: FxHashMap<String, Vec<usize>>,
    by_type: Vec<(SyntaxKind, Vec<usize>)>,
}

impl FirstTokenIndex {
    fn new(ctx: &ParseContext<'_>, matchers: &[NodeId]) -> Self {
        let mut by_raw: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        let mut by_type: FxHashMap<SyntaxKind, Vec<usize>> = FxHashMap::default();
        for (position, matcher) in matchers.iter().enumerate() {
            let Some(simple) = ctx.grammar.simple(*matcher) else {
                log::debug!(
                    target: "sqlreflow::parser",
                    "skipping {} in forward search: no first-token set",
                    ctx.grammar.describe(*matcher)
                );
                continue;
            };
            for raw in &simple.raws {
                by_raw.entry(raw.clone()).or_default().push(position);
            }
            for kind in simple.types.iter() {
                by_type.entry(kind).or_default().push(position);
            }
        }
        Self {
            by_raw,
            by_type: by_type.into_iter().collect(),
        }
    }

    /// Matcher positions that could start at `segment`, in declaration order.
    fn candidates(&self, segment: &Segment) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .by_raw
            .get(&first_trimmed_raw(segment))
            .cloned()
            .unwrap_or_default();
        let types = segment.class_types();
        for (kind, positions) in &self.by_type {
            if types.contains(*kind) {
                found.extend(positions);
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }
}

/// Scan forward from `idx` for the first position where any matcher
/// matches. Only matchers with a first-token set take part.
fn next_match_indexed(
    segments: &[Segment],
    idx: usize,
    matchers: &[NodeId],
    index: &FirstTokenIndex,
    ctx: &mut ParseContext<'_>,
) -> Result<(MatchResult, Option<NodeId>), SqlParseError> {
    for scan_idx in idx..segments.len() {
        for position in index.candidates(&segments[scan_idx]) {
            let matcher = matchers[position];
            let result = match_node(matcher, segments, scan_idx, ctx)?;
            if result.has_match() {
                return Ok((result, Some(matcher)));
            }
        }
    }
    Ok((MatchResult::empty_at(idx), None))
}

pub fn next_match(
    segments: &[Segment],
    idx: usize,
    matchers: &[NodeId],
    ctx: &mut ParseContext<'_>,
) -> Result<(MatchResult, Option<NodeId>), SqlParseError> {
    let index = FirstTokenIndex::new(ctx, matchers);
    next_match_indexed(segments, idx, matchers, &index, ctx)
}

/// Brackets of one set together with the search index over them.
pub struct BracketSearch {
    brackets: Vec<ResolvedBracket>,
    /// Caller matchers followed by every start and every end bracket.
    all_matchers: Vec<NodeId>,
    n_targets: usize,
    index: FirstTokenIndex,
    bracket_index: FirstTokenIndex,
}

impl BracketSearch {
    pub fn new(ctx: &ParseContext<'_>, matchers: &[NodeId], set: &str) -> Self {
        let brackets = ctx.grammar.bracket_set(set).to_vec();
        let mut all_matchers = matchers.to_vec();
        all_matchers.extend(brackets.iter().map(|b| b.start));
        all_matchers.extend(brackets.iter().map(|b| b.end));
        let index = FirstTokenIndex::new(ctx, &all_matchers);
        let bracket_index = FirstTokenIndex::new(ctx, &all_matchers[matchers.len()..]);
        Self {
            brackets,
            all_matchers,
            n_targets: matchers.len(),
            index,
            bracket_index,
        }
    }

    fn start_position(&self, matcher: NodeId) -> Option<usize> {
        self.brackets.iter().position(|b| b.start == matcher)
    }

    fn end_position(&self, matcher: NodeId) -> Option<usize> {
        self.brackets.iter().position(|b| b.end == matcher)
    }
}

/// Find the bracket closing `opening`, which matched with the start bracket
/// of `brackets[type_idx]`.
///
/// The result spans both brackets, inserts an Indent after the opening one
/// and a Dedent before the closing one, and is wrapped as `bracketed` if
/// the pair persists. `None` means the bracket is never closed or is closed
/// by a bracket of another type.
pub fn resolve_bracket(
    segments: &[Segment],
    opening: MatchResult,
    type_idx: usize,
    brackets: &[ResolvedBracket],
    ctx: &mut ParseContext<'_>,
    nested_match: bool,
) -> Result<Option<MatchResult>, SqlParseError> {
    let mut matchers: Vec<NodeId> = brackets.iter().map(|b| b.start).collect();
    matchers.extend(brackets.iter().map(|b| b.end));
    let index = FirstTokenIndex::new(ctx, &matchers);
    resolve_bracket_indexed(
        segments,
        opening,
        type_idx,
        brackets,
        &matchers,
        &index,
        ctx,
        nested_match,
    )
}

#[allow(clippy::too_many_arguments)]
fn resolve_bracket_indexed(
    segments: &[Segment],
    opening: MatchResult,
    type_idx: usize,
    brackets: &[ResolvedBracket],
    matchers: &[NodeId],
    index: &FirstTokenIndex,
    ctx: &mut ParseContext<'_>,
    nested_match: bool,
) -> Result<Option<MatchResult>, SqlParseError> {
    let start = opening.span.start;
    let mut matched_idx = opening.span.end;
    let mut child_matches = vec![opening];

    loop {
        let (found, matcher) = next_match_indexed(segments, matched_idx, matchers, index, ctx)?;
        let Some(matcher) = matcher.filter(|_| found.has_match()) else {
            log::debug!(target: "sqlreflow::parser", "no closing bracket for bracket at {}", start);
            return Ok(None);
        };

        if let Some(end_idx) = brackets.iter().position(|b| b.end == matcher) {
            if end_idx != type_idx {
                log::debug!(
                    target: "sqlreflow::parser",
                    "mismatched closing bracket at {}",
                    found.span.start
                );
                return Ok(None);
            }
            let opening_end = child_matches[0].span.end;
            let insert_segments = vec![
                (opening_end, SyntaxKind::Indent),
                (found.span.start, SyntaxKind::Dedent),
            ];
            let span = Span::new(start, found.span.end);
            child_matches.push(found);
            let result = MatchResult {
                span,
                matched: None,
                insert_segments,
                child_matches,
                is_clean: true,
            };
            if brackets[type_idx].persists {
                return Ok(Some(result.wrap(Matched::Kind(SyntaxKind::Bracketed))));
            }
            return Ok(Some(result));
        }

        let Some(inner_type) = brackets.iter().position(|b| b.start == matcher) else {
            return Ok(None);
        };
        let Some(inner) = resolve_bracket_indexed(
            segments, found, inner_type, brackets, matchers, index, ctx, false,
        )?
        else {
            return Ok(None);
        };
        matched_idx = inner.span.end;
        if nested_match {
            child_matches.push(inner);
        }
    }
}

/// Next match of any of the search's target matchers, skipping over
/// bracketed regions. Returns the match, its matcher and the bracket
/// matches passed on the way.
pub fn next_ex_bracket_match(
    segments: &[Segment],
    idx: usize,
    search: &BracketSearch,
    ctx: &mut ParseContext<'_>,
) -> Result<(MatchResult, Option<NodeId>, Vec<MatchResult>), SqlParseError> {
    if idx >= segments.len() {
        return Ok((MatchResult::empty_at(idx), None, Vec::new()));
    }

    let mut matched_idx = idx;
    let mut child_matches = Vec::new();
    let bracket_matchers = &search.all_matchers[search.n_targets..];

    loop {
        let (found, matcher) =
            next_match_indexed(segments, matched_idx, &search.all_matchers, &search.index, ctx)?;
        let Some(matcher) = matcher.filter(|_| found.has_match()) else {
            return Ok((found, None, child_matches));
        };

        if search.all_matchers[..search.n_targets].contains(&matcher) {
            return Ok((found, Some(matcher), child_matches));
        }

        if search.end_position(matcher).is_some() {
            return Ok((MatchResult::empty_at(idx), None, Vec::new()));
        }

        let Some(type_idx) = search.start_position(matcher) else {
            return Ok((MatchResult::empty_at(idx), None, Vec::new()));
        };
        let resolved = resolve_bracket_indexed(
            segments,
            found,
            type_idx,
            &search.brackets,
            bracket_matchers,
            &search.bracket_index,
            ctx,
            true,
        )?;
        let Some(bracket) = resolved else {
            return Ok((MatchResult::empty_at(idx), None, Vec::new()));
        };
        matched_idx = bracket.span.end;
        child_matches.push(bracket);
    }
}

/// Claim everything from `idx` up to the first match of `matchers` outside
/// brackets.
///
/// Purely alphabetic keyword matchers only count when preceded by
/// whitespace or a newline (metas aside), so a terminator can't end the
/// match in the middle of an expression like `a.from`. With
/// `include_terminator` the terminator is part of the result; otherwise the
/// result stops at the last code before it.
pub fn greedy_match(
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
    matchers: &[NodeId],
    include_terminator: bool,
    nested_match: bool,
) -> Result<MatchResult, SqlParseError> {
    let search = BracketSearch::new(ctx, matchers, "bracket_pairs");
    let mut working_idx = idx;
    let mut child_matches = Vec::new();

    let terminator = loop {
        let (found, matcher, inner) = ctx.deeper_match(false, &[], |ctx| {
            next_ex_bracket_match(segments, working_idx, &search, ctx)
        })?;
        if nested_match {
            child_matches.extend(inner);
        }

        let Some(matcher) = matcher.filter(|_| found.has_match()) else {
            return Ok(MatchResult {
                span: Span::new(idx, segments.len()),
                child_matches,
                ..MatchResult::default()
            });
        };

        let start_idx = found.span.start;
        let keyword_like = ctx
            .grammar
            .simple(matcher)
            .map(|simple| {
                simple.types.is_empty()
                    && simple
                        .raws
                        .iter()
                        .all(|raw| raw.chars().all(char::is_alphabetic))
            })
            .unwrap_or(false);

        if keyword_like {
            let mut allowable = start_idx == working_idx;
            for preceding in (working_idx + 1..=start_idx).rev() {
                let segment = &segments[preceding - 1];
                if segment.is_meta() {
                    continue;
                }
                allowable = segment.is_type(SyntaxKind::Whitespace)
                    || segment.is_type(SyntaxKind::Newline);
                break;
            }
            if !allowable {
                working_idx = found.span.end;
                continue;
            }
        }
        break found;
    };

    if include_terminator {
        return Ok(MatchResult {
            span: Span::new(idx, terminator.span.end),
            child_matches,
            ..MatchResult::default()
        });
    }

    let stop_idx = skip_stop_index_backward_to_code(segments, terminator.span.start, idx);
    let end = if stop_idx == idx { terminator.span.start } else { stop_idx };
    child_matches.retain(|child| child.span.end <= end);
    Ok(MatchResult {
        span: Span::new(idx, end),
        child_matches,
        ..MatchResult::default()
    })
}

/// Index at which matching from `idx` should stop given `terminators`:
/// `idx` itself if one matches there, otherwise the last code before the
/// next terminator outside brackets.
pub fn trim_to_terminator(
    segments: &[Segment],
    idx: usize,
    terminators: &[NodeId],
    ctx: &mut ParseContext<'_>,
) -> Result<usize, SqlParseError> {
    if idx >= segments.len() {
        return Ok(segments.len());
    }

    let first = first_non_whitespace(segments, idx);
    let immediate = ctx.deeper_match(false, &[], |ctx| {
        for terminator in terminators {
            if !option_matches_first_token(ctx, *terminator, first.as_ref()) {
                continue;
            }
            if match_node(*terminator, segments, idx, ctx)?.has_match() {
                return Ok(true);
            }
        }
        Ok(false)
    })?;
    if immediate {
        return Ok(idx);
    }

    let term_match = ctx.deeper_match(false, &[], |ctx| {
        greedy_match(segments, idx, ctx, terminators, false, false)
    })?;
    Ok(skip_stop_index_backward_to_code(segments, term_match.span.end, idx))
}
