//! Matching grammar nodes against segments
//!
//! [`match_node`] is the single entry point: it dispatches on the node's
//! kind. Every matcher takes the full segment slice and a start index and
//! returns a [`MatchResult`] over that slice. A failed match is the empty
//! result; `Err` is reserved for engine faults and the depth limit.

use crate::sql::errors::{Location, SqlParseError};
use crate::sql::parser::context::ParseContext;
use crate::sql::parser::grammar::{
    AnyNumberOfOptions, BracketedOptions, DelimitedOptions, NodeId, NodeKind, ParseMode, RefOptions,
    ResolvedBracket, SequenceOptions, StartsWithOptions,
};
use crate::sql::parser::match_algorithms::{
    greedy_match, longest_match, resolve_bracket, skip_start_index_forward_to_code,
    skip_stop_index_backward_to_code, trim_to_terminator,
};
use crate::sql::parser::match_result::{MatchResult, Matched, Span};
use crate::sql::segments::{Segment, SyntaxKind};
use rustc_hash::FxHashMap;

/// Match grammar node `id` against `segments` starting at `idx`.
pub fn match_node(
    id: NodeId,
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    let g = ctx.grammar;
    let result = match &g.node(id).kind {
        NodeKind::String { template, kind } => Ok(match_single(segments, idx, *kind, |seg| {
            seg.is_code() && seg.raw().eq_ignore_ascii_case(template)
        })),
        NodeKind::MultiString { templates, kind } => Ok(match_single(segments, idx, *kind, |seg| {
            seg.is_code() && templates.iter().any(|t| seg.raw().eq_ignore_ascii_case(t))
        })),
        NodeKind::Regex { matcher, kind } => Ok(match_single(segments, idx, *kind, |seg| {
            if !seg.is_code() {
                return false;
            }
            let upper = seg.raw_upper();
            matcher.regex.is_match(&upper)
                && !matcher
                    .anti_regex
                    .as_ref()
                    .is_some_and(|anti| anti.is_match(&upper))
        })),
        NodeKind::Typed { template, kind } => {
            Ok(match_single(segments, idx, *kind, |seg| seg.is_type(*template)))
        }
        NodeKind::Code => Ok(match segments.get(idx) {
            Some(seg) if seg.is_code() => MatchResult::from_span(idx, idx + 1),
            _ => MatchResult::empty_at(idx),
        }),
        NodeKind::NonCode => Ok(match_non_code(segments, idx)),
        NodeKind::Nothing => Ok(MatchResult::empty_at(idx)),
        NodeKind::Meta(kind) => Ok(MatchResult {
            span: Span::new(idx, idx),
            insert_segments: vec![(idx, *kind)],
            ..MatchResult::default()
        }),
        NodeKind::Conditional {
            meta,
            toggle,
            enabled,
        } => Ok(if ctx.indentation.get(*toggle) == *enabled {
            MatchResult {
                span: Span::new(idx, idx),
                insert_segments: vec![(idx, *meta)],
                ..MatchResult::default()
            }
        } else {
            MatchResult::empty_at(idx)
        }),
        NodeKind::NodeMatcher { kind, child } => {
            match_node_matcher(*kind, *child, segments, idx, ctx)
        }
        NodeKind::Sequence { children, options } => {
            match_sequence(children, options, segments, idx, ctx)
        }
        NodeKind::OneOf { children, options } => {
            let options = AnyNumberOfOptions::from(options.clone());
            match_any_number_of(children, &options, segments, idx, ctx)
        }
        NodeKind::AnyNumberOf { children, options } => {
            match_any_number_of(children, options, segments, idx, ctx)
        }
        NodeKind::Delimited {
            elements,
            delimiter,
            options,
        } => match_delimited(elements, *delimiter, options, segments, idx, ctx),
        NodeKind::Bracketed {
            content,
            options,
            resolved,
        } => match resolved {
            Some(bracket) => match_bracketed(*content, options, *bracket, segments, idx, ctx),
            None => Err(unresolved(id, segments, idx, ctx)),
        },
        NodeKind::Anything { terminators } => match_anything(terminators, segments, idx, ctx),
        NodeKind::StartsWith { target, options } => {
            match_starts_with(*target, options, segments, idx, ctx)
        }
        NodeKind::Ref {
            options, resolved, ..
        } => match resolved {
            Some(target) => match_ref(*target, options, segments, idx, ctx),
            None => Err(unresolved(id, segments, idx, ctx)),
        },
    };
    result.map_err(|err| locate(err, segments, idx))
}

/// A single code segment, retyped as `kind` when `accept` admits it.
fn match_single(
    segments: &[Segment],
    idx: usize,
    kind: SyntaxKind,
    accept: impl FnOnce(&Segment) -> bool,
) -> MatchResult {
    match segments.get(idx) {
        Some(segment) if accept(segment) => {
            MatchResult::from_span(idx, idx + 1).wrap(Matched::Newtype(kind))
        }
        _ => MatchResult::empty_at(idx),
    }
}

fn match_non_code(segments: &[Segment], idx: usize) -> MatchResult {
    let end = skip_start_index_forward_to_code(segments, idx, segments.len());
    if end > idx {
        MatchResult::from_span(idx, end)
    } else {
        MatchResult::empty_at(idx)
    }
}

fn match_node_matcher(
    kind: SyntaxKind,
    child: NodeId,
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    let Some(segment) = segments.get(idx) else {
        return Ok(MatchResult::empty_at(idx));
    };
    if segment.is_type(kind) {
        return Ok(MatchResult::from_span(idx, idx + 1));
    }
    let result = ctx.deeper_match(false, &[], |ctx| match_node(child, segments, idx, ctx))?;
    Ok(result.wrap(Matched::Kind(kind)))
}

/// Metas buffered across a gap go before it if none of them dedent, after it
/// otherwise.
fn flush_metas(
    pre_gap_idx: usize,
    post_gap_idx: usize,
    metas: Vec<SyntaxKind>,
) -> Vec<(usize, SyntaxKind)> {
    let meta_idx = if metas.iter().all(|meta| meta.indent_val() >= 0) {
        pre_gap_idx
    } else {
        post_gap_idx
    };
    metas.into_iter().map(|meta| (meta_idx, meta)).collect()
}

fn joined_terminators(own: &[NodeId], ctx: &ParseContext<'_>, reset: bool) -> Vec<NodeId> {
    let mut terminators = own.to_vec();
    if !reset {
        terminators.extend(ctx.terminators.iter().filter(|t| !own.contains(t)));
    }
    terminators
}

fn match_sequence(
    children: &[NodeId],
    options: &SequenceOptions,
    segments: &[Segment],
    start_idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    let g = ctx.grammar;
    let mut matched_idx = start_idx;
    let mut max_idx = segments.len();
    let mut insert_segments = Vec::new();
    let mut child_matches = Vec::new();
    let mut meta_buffer: Vec<SyntaxKind> = Vec::new();
    let mut first_match = true;
    let mut is_clean = true;

    if options.parse_mode == ParseMode::Greedy {
        let terminators = joined_terminators(&options.terminators, ctx, false);
        max_idx = trim_to_terminator(segments, start_idx, &terminators, ctx)?;
    }

    for child in children.iter().copied() {
        match &g.node(child).kind {
            NodeKind::Meta(kind) => {
                meta_buffer.push(*kind);
                continue;
            }
            NodeKind::Conditional { .. } => {
                let toggled = match_node(child, segments, matched_idx, ctx)?;
                meta_buffer.extend(toggled.insert_segments.into_iter().map(|(_, kind)| kind));
                continue;
            }
            _ => {}
        }

        let idx = if options.allow_gaps {
            skip_start_index_forward_to_code(segments, matched_idx, max_idx)
        } else {
            matched_idx
        };

        if idx >= max_idx {
            if g.is_optional(child) {
                continue;
            }
            if options.parse_mode == ParseMode::Strict || matched_idx == start_idx {
                return Ok(MatchResult::empty_at(idx));
            }
            insert_segments.extend(meta_buffer.into_iter().map(|meta| (matched_idx, meta)));
            let found = matched_idx
                .checked_sub(1)
                .map(|prev| segments[prev].raw().to_string())
                .unwrap_or_default();
            return Ok(MatchResult {
                span: Span::new(start_idx, matched_idx),
                matched: Some(Matched::Unparsable {
                    expected: format!("{} after '{}', found nothing", g.describe(child), found),
                }),
                insert_segments,
                child_matches,
                is_clean: false,
            });
        }

        let bounded = &segments[..max_idx];
        let elem_match = ctx.deeper_match(false, &[], |ctx| match_node(child, bounded, idx, ctx))?;

        if !elem_match.has_match() {
            if g.is_optional(child) {
                continue;
            }
            if options.parse_mode == ParseMode::Strict
                || (options.parse_mode == ParseMode::GreedyOnceStarted && matched_idx == start_idx)
            {
                return Ok(MatchResult::empty_at(idx));
            }
            if matched_idx == start_idx {
                return Ok(MatchResult::unparsable(start_idx, max_idx, g.describe(child)));
            }
            child_matches.push(MatchResult::unparsable(
                skip_start_index_forward_to_code(segments, matched_idx, max_idx),
                max_idx,
                g.describe(child),
            ));
            log::debug!(
                target: "sqlreflow::parser",
                "sequence failed at {} expecting {}; wrapping the rest as unparsable",
                idx,
                g.describe(child)
            );
            return Ok(MatchResult {
                span: Span::new(start_idx, max_idx),
                matched: None,
                insert_segments,
                child_matches,
                is_clean: false,
            });
        }

        insert_segments.extend(flush_metas(matched_idx, idx, std::mem::take(&mut meta_buffer)));
        matched_idx = elem_match.span.end;

        if first_match && options.parse_mode == ParseMode::GreedyOnceStarted {
            let terminators = joined_terminators(&options.terminators, ctx, false);
            max_idx = trim_to_terminator(segments, matched_idx, &terminators, ctx)?;
            first_match = false;
        }

        is_clean &= elem_match.is_clean;
        if elem_match.matched.is_some() {
            child_matches.push(elem_match);
        } else {
            child_matches.extend(elem_match.child_matches);
            insert_segments.extend(elem_match.insert_segments);
        }
    }

    insert_segments.extend(meta_buffer.into_iter().map(|meta| (matched_idx, meta)));

    if options.parse_mode != ParseMode::Strict && max_idx > matched_idx {
        let tail_idx = skip_start_index_forward_to_code(segments, matched_idx, max_idx);
        let stop_idx = skip_stop_index_backward_to_code(segments, max_idx, tail_idx);
        if stop_idx > tail_idx {
            child_matches.push(MatchResult::unparsable(tail_idx, stop_idx, "nothing else"));
            matched_idx = stop_idx;
            is_clean = false;
        }
    }

    Ok(MatchResult {
        span: Span::new(start_idx, matched_idx),
        matched: None,
        insert_segments,
        child_matches,
        is_clean,
    })
}

/// Claim the code between `matched.span.end` and `max_idx` as unparsable
/// in the greedy modes.
fn parse_mode_match_result(
    segments: &[Segment],
    matched: MatchResult,
    max_idx: usize,
    parse_mode: ParseMode,
    expected: impl FnOnce() -> String,
) -> MatchResult {
    if parse_mode == ParseMode::Strict {
        return matched;
    }
    let stop_idx = matched.span.end;
    if stop_idx >= max_idx || segments[stop_idx..max_idx].iter().all(|seg| !seg.is_code()) {
        return matched;
    }
    let trim_idx = skip_start_index_forward_to_code(segments, stop_idx, max_idx);
    matched.append(MatchResult::unparsable(trim_idx, max_idx, expected()))
}

fn match_any_number_of(
    elements: &[NodeId],
    options: &AnyNumberOfOptions,
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    let g = ctx.grammar;
    if let Some(exclude) = options.exclude {
        let excluded = ctx.deeper_match(false, &[], |ctx| match_node(exclude, segments, idx, ctx))?;
        if excluded.has_match() {
            return Ok(MatchResult::empty_at(idx));
        }
    }

    let mut n_matches = 0;
    let mut per_element: FxHashMap<NodeId, usize> = FxHashMap::default();
    let mut matched = MatchResult::empty_at(idx);
    let mut matched_idx = idx;
    let mut working_idx = idx;
    let mut max_idx = segments.len();
    let expected = || {
        elements
            .iter()
            .map(|e| g.describe(*e))
            .collect::<Vec<_>>()
            .join(", ")
    };

    if options.parse_mode == ParseMode::Greedy {
        let terminators = joined_terminators(&options.terminators, ctx, options.reset_terminators);
        max_idx = trim_to_terminator(segments, idx, &terminators, ctx)?;
    }

    loop {
        let satisfied = n_matches >= options.min_times && matched_idx >= max_idx;
        let exhausted = options.max_times.is_some_and(|max| n_matches >= max);
        if satisfied || exhausted {
            return Ok(parse_mode_match_result(
                segments,
                matched,
                max_idx,
                options.parse_mode,
                expected,
            ));
        }
        if matched_idx >= max_idx {
            return Ok(MatchResult::empty_at(idx));
        }

        let bounded = &segments[..max_idx];
        let (result, option) =
            ctx.deeper_match(options.reset_terminators, &options.terminators, |ctx| {
                longest_match(bounded, elements, working_idx, ctx)
            })?;

        let Some(option) = option.filter(|_| result.has_match()) else {
            if n_matches < options.min_times {
                matched = MatchResult::empty_at(idx);
            }
            return Ok(parse_mode_match_result(
                segments,
                matched,
                max_idx,
                options.parse_mode,
                expected,
            ));
        };

        if let Some(limit) = options.max_times_per_element {
            let count = per_element.entry(option).or_default();
            *count += 1;
            if *count > limit {
                return Ok(parse_mode_match_result(
                    segments,
                    matched,
                    max_idx,
                    options.parse_mode,
                    expected,
                ));
            }
        }

        matched = matched.append(result);
        matched_idx = matched.span.end;
        working_idx = if options.allow_gaps {
            skip_start_index_forward_to_code(segments, matched_idx, max_idx)
        } else {
            matched_idx
        };
        n_matches += 1;
    }
}

fn match_delimited(
    elements: &[NodeId],
    delimiter: NodeId,
    options: &DelimitedOptions,
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    let max_idx = segments.len();
    let mut delimiters = 0;
    let mut seeking_delimiter = false;
    let mut working_idx = idx;
    let mut working_match = MatchResult::empty_at(idx);
    let mut delimiter_match: Option<MatchResult> = None;

    let mut terminators = options.terminators.clone();
    terminators.extend(
        ctx.terminators
            .iter()
            .copied()
            .filter(|t| *t != delimiter && !options.terminators.contains(t)),
    );
    let delimiter_matchers = [delimiter];

    loop {
        if options.allow_gaps && working_idx > idx {
            working_idx = skip_start_index_forward_to_code(segments, working_idx, max_idx);
        }
        if working_idx >= max_idx {
            break;
        }
        if !options.allow_gaps && !segments[working_idx].is_code() {
            break;
        }

        let (terminated, _) = ctx.deeper_match(false, &[], |ctx| {
            longest_match(segments, &terminators, working_idx, ctx)
        })?;
        if terminated.has_match() {
            break;
        }

        let (candidates, push): (&[NodeId], &[NodeId]) = if seeking_delimiter {
            (&delimiter_matchers, &[])
        } else {
            (elements, &delimiter_matchers)
        };
        let (result, _) = ctx.deeper_match(false, push, |ctx| {
            longest_match(segments, candidates, working_idx, ctx)
        })?;

        if !result.has_match() {
            if seeking_delimiter && options.optional_delimiter {
                seeking_delimiter = false;
                continue;
            }
            break;
        }

        working_idx = result.span.end;
        if seeking_delimiter {
            delimiter_match = Some(result);
        } else {
            if let Some(delimiter_result) = delimiter_match.take() {
                delimiters += 1;
                working_match = working_match.append(delimiter_result);
            }
            working_match = working_match.append(result);
        }
        seeking_delimiter = !seeking_delimiter;
    }

    if options.allow_trailing && !seeking_delimiter {
        if let Some(trailing) = delimiter_match {
            delimiters += 1;
            working_match = working_match.append(trailing);
        }
    }

    if delimiters < options.min_delimiters {
        log::debug!(
            target: "sqlreflow::parser",
            "delimited list at {} found {} delimiters, needs {}",
            idx,
            delimiters,
            options.min_delimiters
        );
        return Ok(MatchResult::empty_at(idx));
    }
    Ok(working_match)
}

fn match_bracketed(
    content: NodeId,
    options: &BracketedOptions,
    bracket: ResolvedBracket,
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    let g = ctx.grammar;
    let opening =
        ctx.deeper_match(false, &[], |ctx| match_node(bracket.start, segments, idx, ctx))?;
    if !opening.has_match() {
        return Ok(MatchResult::empty_at(idx));
    }
    let content_start = opening.span.end;

    let brackets = [bracket];
    let Some(bracketed) = resolve_bracket(segments, opening, 0, &brackets, ctx, false)? else {
        return Ok(MatchResult::empty_at(idx));
    };
    let close_idx = bracketed.span.end - 1;

    let (inner_start, inner_end) = if options.allow_gaps {
        let start = skip_start_index_forward_to_code(segments, content_start, close_idx);
        (start, skip_stop_index_backward_to_code(segments, close_idx, start))
    } else {
        (content_start, close_idx)
    };

    if inner_start == inner_end {
        let accepted = g.is_optional(content)
            || matches!(g.node(content).kind, NodeKind::Nothing)
            || options.parse_mode != ParseMode::Strict;
        if !accepted {
            return Ok(MatchResult::empty_at(idx));
        }
        return Ok(bracketed);
    }

    let inner = &segments[..inner_end];
    let content_match = ctx.deeper_match(true, &[bracket.end], |ctx| {
        match_node(content, inner, inner_start, ctx)
    })?;

    if content_match.span.end != inner_end && options.parse_mode == ParseMode::Strict {
        return Ok(MatchResult::empty_at(idx));
    }
    if !options.allow_gaps && content_match.span.end != close_idx {
        return Ok(MatchResult::empty_at(idx));
    }

    let mut result = bracketed;
    let content_end = content_match.span.end.max(inner_start);
    result.is_clean &= content_match.is_clean;
    if content_match.has_match() {
        if content_match.matched.is_some() {
            push_child(&mut result, content_match);
        } else {
            result.insert_segments.extend(content_match.insert_segments);
            for child in content_match.child_matches {
                push_child(&mut result, child);
            }
        }
    }

    // Only reachable in the greedy modes: claim what the content left over.
    let leftover_start = skip_start_index_forward_to_code(segments, content_end, inner_end);
    if leftover_start < inner_end {
        push_child(
            &mut result,
            MatchResult::unparsable(leftover_start, inner_end, g.describe(content)),
        );
        result.is_clean = false;
    }
    Ok(result)
}

/// Insert `child` among the bracket's children, keeping them ordered.
fn push_child(result: &mut MatchResult, child: MatchResult) {
    let position = result
        .child_matches
        .iter()
        .position(|c| c.span.start >= child.span.end && !c.span.is_empty())
        .unwrap_or(result.child_matches.len());
    result.child_matches.insert(position, child);
}

fn match_anything(
    own: &[NodeId],
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    if own.is_empty() && ctx.terminators.is_empty() {
        return Ok(MatchResult::from_span(idx, segments.len()));
    }
    let terminators = joined_terminators(own, ctx, false);
    greedy_match(segments, idx, ctx, &terminators, false, true)
}

fn match_starts_with(
    target: NodeId,
    options: &StartsWithOptions,
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    let first_code = skip_start_index_forward_to_code(segments, idx, segments.len());
    if first_code >= segments.len() {
        return Ok(MatchResult::empty_at(idx));
    }
    let head = ctx.deeper_match(false, &[], |ctx| match_node(target, segments, first_code, ctx))?;
    if !head.has_match() {
        return Ok(MatchResult::empty_at(idx));
    }

    let terminators = joined_terminators(&options.terminators, ctx, false);
    let tail = ctx.deeper_match(false, &[], |ctx| {
        greedy_match(segments, head.span.end, ctx, &terminators, options.include_terminator, true)
    })?;
    if segments[tail.span.start..tail.span.end].iter().all(|seg| !seg.is_code()) {
        return Ok(head);
    }
    Ok(head.append(tail))
}

fn match_ref(
    target: NodeId,
    options: &RefOptions,
    segments: &[Segment],
    idx: usize,
    ctx: &mut ParseContext<'_>,
) -> Result<MatchResult, SqlParseError> {
    if let Some(exclude) = options.exclude {
        let excluded = ctx.deeper_match(options.reset_terminators, &options.terminators, |ctx| {
            match_node(exclude, segments, idx, ctx)
        })?;
        if excluded.has_match() {
            return Ok(MatchResult::empty_at(idx));
        }
    }
    ctx.deeper_match(options.reset_terminators, &options.terminators, |ctx| {
        match_node(target, segments, idx, ctx)
    })
}

fn unresolved(
    id: NodeId,
    segments: &[Segment],
    idx: usize,
    ctx: &ParseContext<'_>,
) -> SqlParseError {
    let description = format!(
        "grammar element {} was not resolved; compile the grammar before parsing",
        ctx.grammar.describe(id)
    );
    log::error!(target: "sqlreflow::parser", "{}", description);
    SqlParseError::Internal {
        description,
        location: location_at(segments, idx),
    }
}

fn location_at(segments: &[Segment], idx: usize) -> Location {
    segments
        .get(idx)
        .or_else(|| segments.last())
        .and_then(Segment::position)
        .map(Location::from)
        .unwrap_or_default()
}

/// Attach the innermost position to a depth-limit error.
fn locate(err: SqlParseError, segments: &[Segment], idx: usize) -> SqlParseError {
    match err {
        SqlParseError::TooComplex { max_depth, location } if location == Location::default() => {
            SqlParseError::TooComplex {
                max_depth,
                location: location_at(segments, idx),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::lexer::lex;
    use crate::sql::parser::context::{IndentToggle, IndentationToggles};
    use crate::sql::parser::grammar::{Grammar, OneOfOptions};
    use rstest::rstest;

    fn tokens(sql: &str) -> Vec<Segment> {
        let mut segments = lex(sql).unwrap();
        // Drop the end-of-file meta
        segments.pop();
        segments
    }

    fn with_brackets(mut g: Grammar) -> Grammar {
        let open = g.string("(", SyntaxKind::StartBracket);
        let close = g.string(")", SyntaxKind::EndBracket);
        g.define("StartBracketSegment", open);
        g.define("EndBracketSegment", close);
        g.bracket_pair("bracket_pairs", "round", "StartBracketSegment", "EndBracketSegment", true);
        g.compile().unwrap()
    }

    fn run(g: &Grammar, id: NodeId, segments: &[Segment]) -> MatchResult {
        let mut ctx = ParseContext::new(g, IndentationToggles::default(), 64);
        match_node(id, segments, 0, &mut ctx).unwrap()
    }

    #[rstest]
    #[case(0, true, 5)]
    #[case(1, false, 0)]
    #[case(1, true, 5)]
    #[case(2, true, 0)]
    fn test_delimited_gaps_and_minimum(
        #[case] min_delimiters: usize,
        #[case] allow_gaps: bool,
        #[case] expected: usize,
    ) {
        let mut g = Grammar::new();
        let bar = g.string("bar", SyntaxKind::Identifier);
        let dot = g.string(".", SyntaxKind::Dot);
        let list = g.delimited_with(
            [bar],
            dot,
            DelimitedOptions {
                min_delimiters,
                allow_gaps,
                ..DelimitedOptions::default()
            },
        );
        let g = g.compile().unwrap();
        let segments = tokens("bar .    bar");
        assert_eq!(segments.len(), 5);
        assert_eq!(run(&g, list, &segments).len(), expected);
    }

    #[test]
    fn test_delimited_trailing_delimiter() {
        let mut g = Grammar::new();
        let bar = g.string("bar", SyntaxKind::Identifier);
        let comma = g.string(",", SyntaxKind::Comma);
        let strict = g.delimited([bar], comma);
        let trailing = g.delimited_with(
            [bar],
            comma,
            DelimitedOptions {
                allow_trailing: true,
                ..DelimitedOptions::default()
            },
        );
        let g = g.compile().unwrap();
        let segments = tokens("bar, bar,");
        assert_eq!(run(&g, strict, &segments).span, Span::new(0, 4));
        assert_eq!(run(&g, trailing, &segments).span, Span::new(0, 5));
    }

    #[test]
    fn test_one_of_longest_then_first() {
        let mut g = Grammar::new();
        let a = g.keyword("a");
        let b = g.keyword("b");
        let short = g.sequence([a]);
        let long = g.sequence([a, b]);
        let also_short = g.node_matcher(SyntaxKind::Expression, a);
        let longest = g.one_of([short, long]);
        let tie = g.one_of([also_short, short]);
        let g = g.compile().unwrap();
        let segments = tokens("a b");

        assert_eq!(run(&g, longest, &segments).span, Span::new(0, 3));
        let tied = run(&g, tie, &segments);
        assert_eq!(tied.span, Span::new(0, 1));
        assert_eq!(tied.matched, Some(Matched::Kind(SyntaxKind::Expression)));
    }

    #[test]
    fn test_sequence_places_metas_around_gaps() {
        let mut g = Grammar::new();
        let select = g.keyword("select");
        let one = g.code();
        let indent = g.indent();
        let dedent = g.dedent();
        let clause = g.sequence([select, indent, one, dedent]);
        let g = g.compile().unwrap();
        let segments = tokens("select 1");

        let result = run(&g, clause, &segments);
        assert_eq!(result.span, Span::new(0, 3));
        assert_eq!(
            result.insert_segments,
            vec![(1, SyntaxKind::Indent), (3, SyntaxKind::Dedent)]
        );
        assert!(result.is_clean);
    }

    #[test]
    fn test_strict_sequence_fails_without_backtracking() {
        let mut g = Grammar::new();
        let a = g.keyword("a");
        let b = g.keyword("b");
        let seq = g.sequence([a, b]);
        let g = g.compile().unwrap();
        assert!(!run(&g, seq, &tokens("a c")).has_match());
        assert!(!run(&g, seq, &tokens("a")).has_match());
    }

    #[test]
    fn test_greedy_once_started_claims_the_rest() {
        let mut g = Grammar::new();
        let select = g.keyword("select");
        let from = g.keyword("from");
        let element = g.code();
        let clause = g.sequence_with(
            [select, element],
            SequenceOptions {
                parse_mode: ParseMode::GreedyOnceStarted,
                terminators: vec![from],
                ..SequenceOptions::default()
            },
        );
        let g = g.compile().unwrap();

        let segments = tokens("select 1 1 from x");
        let result = run(&g, clause, &segments);
        assert_eq!(result.span, Span::new(0, 5));
        assert!(!result.is_clean);
        let tail = result.child_matches.last().unwrap();
        assert_eq!(tail.span, Span::new(4, 5));
        assert!(matches!(tail.matched, Some(Matched::Unparsable { .. })));

        assert!(!run(&g, clause, &tokens("from x")).has_match());
    }

    #[test]
    fn test_any_number_of_bounds() {
        let mut g = Grammar::new();
        let a = g.keyword("a");
        let at_most_two = g.any_number_of_with(
            [a],
            AnyNumberOfOptions {
                max_times: Some(2),
                ..AnyNumberOfOptions::default()
            },
        );
        let at_least_three = g.any_number_of_with(
            [a],
            AnyNumberOfOptions {
                min_times: 3,
                ..AnyNumberOfOptions::default()
            },
        );
        let g = g.compile().unwrap();
        let segments = tokens("a a a");
        assert_eq!(run(&g, at_most_two, &segments).span, Span::new(0, 3));
        assert_eq!(run(&g, at_least_three, &segments).span, Span::new(0, 5));
        assert!(!run(&g, at_least_three, &tokens("a a")).has_match());
    }

    #[test]
    fn test_any_set_of_uses_each_element_once() {
        let mut g = Grammar::new();
        let a = g.keyword("a");
        let b = g.keyword("b");
        let set = g.any_set_of([a, b], AnyNumberOfOptions::default());
        let g = g.compile().unwrap();
        assert_eq!(run(&g, set, &tokens("b a")).span, Span::new(0, 3));
        assert_eq!(run(&g, set, &tokens("a a")).span, Span::new(0, 1));
    }

    #[test]
    fn test_one_of_exclude() {
        let mut g = Grammar::new();
        let word = g.regex("[A-Z]+", None, SyntaxKind::NakedIdentifier);
        let from = g.keyword("from");
        let ident = g.one_of_with(
            [word],
            OneOfOptions {
                exclude: Some(from),
                ..OneOfOptions::default()
            },
        );
        let g = g.compile().unwrap();
        assert!(run(&g, ident, &tokens("foo")).has_match());
        assert!(!run(&g, ident, &tokens("from")).has_match());
    }

    #[test]
    fn test_regex_anti_pattern() {
        let mut g = Grammar::new();
        let ident = g.regex("[A-Z_]+", Some("SELECT|FROM"), SyntaxKind::NakedIdentifier);
        let g = g.compile().unwrap();
        assert!(run(&g, ident, &tokens("foo_bar")).has_match());
        assert!(!run(&g, ident, &tokens("select")).has_match());
        assert!(!run(&g, ident, &tokens("foo1")).has_match());
    }

    #[test]
    fn test_bracketed_inserts_indent_and_dedent() {
        let mut g = Grammar::new();
        let code = g.code();
        let comma = g.string(",", SyntaxKind::Comma);
        let inner = g.delimited([code], comma);
        let bracketed = g.bracketed(inner);
        let g = with_brackets(g);
        let segments = tokens("( a, b )");

        let result = run(&g, bracketed, &segments);
        assert_eq!(result.span, Span::new(0, segments.len()));
        assert_eq!(result.matched, Some(Matched::Kind(SyntaxKind::Bracketed)));
        assert_eq!(
            result.insert_segments,
            vec![(1, SyntaxKind::Indent), (7, SyntaxKind::Dedent)]
        );
        let applied = result.apply(&segments).unwrap();
        assert_eq!(applied[0].raw(), "( a, b )");
    }

    #[test]
    fn test_bracketed_failures() {
        let mut g = Grammar::new();
        let a = g.keyword("a");
        let bracketed = g.bracketed(a);
        let g = with_brackets(g);
        assert!(!run(&g, bracketed, &tokens("(a")).has_match());
        assert!(!run(&g, bracketed, &tokens("(a b)")).has_match());
        assert!(!run(&g, bracketed, &tokens("()")).has_match());
        assert!(run(&g, bracketed, &tokens("((a))")).span.is_empty());
    }

    #[test]
    fn test_starts_with_and_anything() {
        let mut g = Grammar::new();
        let select = g.keyword("select");
        let semi = g.string(";", SyntaxKind::StatementTerminator);
        let statement = g.starts_with(
            select,
            StartsWithOptions {
                terminators: vec![semi],
                include_terminator: false,
            },
        );
        let rest = g.anything_until(vec![semi]);
        let g = with_brackets(g);
        let segments = tokens("select a (;) b ; c");

        assert_eq!(run(&g, statement, &segments).span, Span::new(0, 9));
        assert_eq!(run(&g, rest, &segments).span, Span::new(0, 9));
        assert!(!run(&g, statement, &tokens("update a")).has_match());
    }

    #[test]
    fn test_conditional_follows_toggles() {
        let mut g = Grammar::new();
        let join = g.keyword("join");
        let cond = g.conditional(SyntaxKind::Indent, IndentToggle::IndentedJoins, true);
        let seq = g.sequence([join, cond]);
        let g = g.compile().unwrap();
        let segments = tokens("join");

        let mut off = ParseContext::new(&g, IndentationToggles::default(), 64);
        assert!(match_node(seq, &segments, 0, &mut off).unwrap().insert_segments.is_empty());

        let toggles = IndentationToggles {
            indented_joins: true,
            ..IndentationToggles::default()
        };
        let mut on = ParseContext::new(&g, toggles, 64);
        assert_eq!(
            match_node(seq, &segments, 0, &mut on).unwrap().insert_segments,
            vec![(1, SyntaxKind::Indent)]
        );
    }

    #[test]
    fn test_depth_limit_reports_position() {
        let mut g = Grammar::new();
        let expr = g.ref_("Expr");
        let bracketed = g.bracketed(expr);
        let code = g.code();
        let body = g.one_of([bracketed, code]);
        g.define("Expr", body);
        let g = with_brackets(g);
        let segments = tokens("((((((((a))))))))");
        let mut ctx = ParseContext::new(&g, IndentationToggles::default(), 6);
        let err = match_node(expr, &segments, 0, &mut ctx).unwrap_err();
        match err {
            SqlParseError::TooComplex { max_depth, location } => {
                assert_eq!(max_depth, 6);
                assert_eq!(location.line_no, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
