//! Blocks and points: the two kinds of reflow element

use super::config::{LinePosition, ReflowConfig, SpacingRule};
use super::depth_map::DepthInfo;
use super::respace::{
    determine_constraints, handle_respace_inline_with_space, handle_respace_inline_without_space,
    process_spacing, InsertAnchor,
};
use crate::sql::errors::ReflowError;
use crate::sql::segments::{LintFix, Segment, SyntaxKind, SyntaxSet};
use rustc_hash::FxHashMap;

/// Net effect of the indent metas inside one point.
///
/// `trough` is the lowest running balance reached while summing left to
/// right, so a point that closes one clause and opens another (dedent then
/// indent) has an impulse of 0 but a trough of -1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndentStats {
    pub impulse: i32,
    pub trough: i32,
    /// Running balances (relative to the start of the point) reached by
    /// implicit indents. Only filled when implicit indents are allowed.
    pub implicit_indents: Vec<i32>,
}

impl IndentStats {
    pub fn from_segments(segments: &[Segment], allow_implicit_indents: bool) -> Self {
        let mut stats = IndentStats::default();
        for seg in segments.iter().filter(|seg| seg.is_type(SyntaxKind::Indent)) {
            stats.impulse += seg.indent_val();
            if allow_implicit_indents && seg.is_implicit_indent() {
                stats.implicit_indents.push(stats.impulse);
            }
            stats.trough = stats.trough.min(stats.impulse);
        }
        stats
    }
}

/// A single non-layout segment, where it sits in the tree and how it wants
/// to be spaced.
#[derive(Debug, Clone)]
pub struct ReflowBlock {
    segment: Segment,
    pub spacing_before: SpacingRule,
    pub spacing_after: SpacingRule,
    pub line_position: Option<LinePosition>,
    pub depth_info: DepthInfo,
    /// `spacing_within` of configured ancestors, keyed by ancestor id.
    pub stack_spacing_configs: FxHashMap<usize, SpacingRule>,
    /// `line_position` of configured ancestors, keyed by ancestor id.
    pub line_position_configs: FxHashMap<usize, LinePosition>,
}

impl ReflowBlock {
    pub fn from_config(segment: Segment, config: &ReflowConfig, depth_info: DepthInfo) -> Self {
        let block_config = config.get_block_config(segment.class_types(), Some(&depth_info));
        let mut stack_spacing_configs = FxHashMap::default();
        let mut line_position_configs = FxHashMap::default();
        let stack = depth_info.stack_hashes.iter().zip(&depth_info.stack_class_types);
        for (hash, class_types) in stack {
            let parent_config = config.get_block_config(*class_types, None);
            if let Some(within) = parent_config.spacing_within {
                stack_spacing_configs.insert(*hash, within);
            }
            if let Some(line_position) = parent_config.line_position {
                line_position_configs.insert(*hash, line_position);
            }
        }
        Self {
            segment,
            spacing_before: block_config.spacing_before,
            spacing_after: block_config.spacing_after,
            line_position: block_config.line_position,
            depth_info,
            stack_spacing_configs,
            line_position_configs,
        }
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn class_types(&self) -> SyntaxSet {
        self.segment.class_types()
    }
}

/// The whitespace, newlines and indent metas between two blocks. Possibly
/// empty.
#[derive(Debug, Clone, Default)]
pub struct ReflowPoint {
    segments: Vec<Segment>,
}

impl ReflowPoint {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn class_types(&self) -> SyntaxSet {
        self.segments
            .iter()
            .fold(SyntaxSet::EMPTY, |acc, seg| acc.union(seg.class_types()))
    }

    pub fn raw(&self) -> String {
        self.segments.iter().map(Segment::raw).collect()
    }

    pub fn num_newlines(&self) -> usize {
        self.segments
            .iter()
            .filter(|seg| seg.is_type(SyntaxKind::Newline))
            .map(|seg| seg.raw().matches('\n').count().max(1))
            .sum()
    }

    pub fn get_indent_impulse(&self, allow_implicit_indents: bool) -> IndentStats {
        IndentStats::from_segments(&self.segments, allow_implicit_indents)
    }

    /// The whitespace after the last newline, if the point has a newline.
    ///
    /// Segments that came out of template code are skipped; segments with no
    /// position are fresh edits and count as literal. A placeholder whose
    /// swallowed whitespace holds a newline stands in for both the break and
    /// the indent after it.
    pub fn get_indent_segment(&self) -> Option<&Segment> {
        let mut indent = None;
        for seg in self.segments.iter().rev() {
            if seg.position().is_some_and(|pos| !pos.is_literal()) {
                continue;
            }
            if seg.is_type(SyntaxKind::Newline) {
                return indent;
            }
            if seg.is_type(SyntaxKind::Whitespace) {
                indent = Some(seg);
            } else if seg.consumed_whitespace().is_some_and(|ws| ws.contains('\n')) {
                return indent.or(Some(seg));
            }
        }
        None
    }

    pub fn get_indent(&self) -> Option<&str> {
        self.get_indent_segment().map(Segment::raw)
    }

    /// Bring the spacing of this point in line with the blocks either side.
    ///
    /// `fixes` are the fixes already pending on the sequence; the returned
    /// list is them plus whatever this point needs. Deletions and edits are
    /// made straight away; a missing space is merged into a pending insertion
    /// of a neighbour when there is one. With `strip_newlines` the point is
    /// pulled onto one line. Points holding whitespace swallowed by the
    /// template are left alone.
    pub fn respace_point(
        &self,
        prev_block: Option<&ReflowBlock>,
        next_block: Option<&ReflowBlock>,
        mut fixes: Vec<LintFix>,
        strip_newlines: bool,
        anchor: InsertAnchor,
    ) -> (Vec<LintFix>, ReflowPoint) {
        if self.segments.iter().any(|seg| seg.consumed_whitespace().is_some()) {
            log::debug!(
                target: "sqlreflow::reflow",
                "not respacing templated whitespace {:?}",
                self.raw()
            );
            return (fixes, self.clone());
        }

        let (pre_constraint, post_constraint, strip_newlines) =
            determine_constraints(prev_block, next_block, strip_newlines);
        log::debug!(target: "sqlreflow::reflow", "respacing {:?}", self.raw());

        let (mut segment_buffer, mut last_whitespace, mut new_fixes) =
            process_spacing(&self.segments, strip_newlines);

        // Trailing whitespace at the end of the file would otherwise look
        // like an indent.
        let before_eof =
            next_block.is_some_and(|block| block.segment.is_type(SyntaxKind::EndOfFile));
        if before_eof {
            if let Some(ws) = last_whitespace.take() {
                segment_buffer.retain(|seg| !seg.ptr_eq(&ws));
                new_fixes.push(LintFix::delete(ws));
            }
        }

        let has_newline = segment_buffer.iter().any(|seg| seg.is_type(SyntaxKind::Newline));
        if (has_newline && !strip_newlines) || before_eof {
            // Indents are reindent's business, except whitespace left behind
            // by a removal between it and the newline.
            if let Some(ws) = &last_whitespace {
                let prev_seg = self
                    .index_of(ws)
                    .and_then(|idx| idx.checked_sub(1))
                    .map(|idx| &self.segments[idx]);
                let detached = prev_seg.is_some_and(|prev| {
                    let gap = match (prev.get_end_loc(), ws.get_start_loc()) {
                        (Some(end), Some(start)) => end < start,
                        _ => false,
                    };
                    prev.is_type(SyntaxKind::Newline) && gap
                });
                if detached {
                    log::debug!(target: "sqlreflow::reflow", "removing non-contiguous whitespace");
                    segment_buffer.retain(|seg| !seg.ptr_eq(ws));
                    new_fixes.push(LintFix::delete(ws.clone()));
                }
            }
        } else {
            log::debug!(
                target: "sqlreflow::reflow",
                "inline case: {:?} <-> {:?}",
                pre_constraint,
                post_constraint
            );
            match &last_whitespace {
                Some(ws) => {
                    let (buffer, delta) = handle_respace_inline_with_space(
                        pre_constraint,
                        post_constraint,
                        segment_buffer,
                        ws,
                    );
                    segment_buffer = buffer;
                    new_fixes.extend(delta);
                }
                None => {
                    let (buffer, updated, edited) = handle_respace_inline_without_space(
                        pre_constraint,
                        post_constraint,
                        prev_block,
                        next_block,
                        segment_buffer,
                        fixes,
                        anchor,
                    );
                    if edited {
                        log::debug!(
                            target: "sqlreflow::reflow",
                            "fix buffer now holds {} fix(es)",
                            updated.len()
                        );
                    }
                    segment_buffer = buffer;
                    fixes = updated;
                }
            }
        }

        fixes.extend(new_fixes);
        (fixes, ReflowPoint::new(segment_buffer))
    }

    fn index_of(&self, target: &Segment) -> Option<usize> {
        self.segments.iter().position(|seg| seg.ptr_eq(target))
    }

    fn spliced(&self, idx: usize, remove: usize, insert: Vec<Segment>) -> ReflowPoint {
        let mut segments = self.segments[..idx].to_vec();
        segments.extend(insert);
        segments.extend_from_slice(&self.segments[idx + remove..]);
        ReflowPoint::new(segments)
    }

    /// Coerce the point to end in a line break followed by `desired`.
    ///
    /// Returns the fixes that do it and the point as it will look afterwards.
    /// A point without a newline gets one: existing whitespace is replaced
    /// by newline and indent, and an empty point inserts them next to
    /// `before` (preferred) or `after`.
    pub fn indent_to(
        &self,
        desired: &str,
        before: Option<&Segment>,
        after: Option<&Segment>,
    ) -> Result<(Vec<LintFix>, ReflowPoint), ReflowError> {
        let indent_seg = self.get_indent_segment();
        log::debug!(
            target: "sqlreflow::reflow",
            "coercing indent {:?} to {:?} (newlines: {})",
            indent_seg.map(Segment::raw),
            desired,
            self.num_newlines()
        );

        if let Some(consumed) = indent_seg.and_then(Segment::consumed_whitespace) {
            log::warn!(
                target: "sqlreflow::reflow",
                "indent {:?} was swallowed by the template, leaving it",
                consumed
            );
            return Ok((Vec::new(), self.clone()));
        }

        if self.num_newlines() > 0 {
            if let Some(indent_seg) = indent_seg {
                if indent_seg.raw() == desired {
                    return Ok((Vec::new(), self.clone()));
                }
                let idx = self
                    .index_of(indent_seg)
                    .ok_or_else(|| {
                        ReflowError::InvalidSequence("indent not in point".to_string())
                    })?;
                if desired.is_empty() {
                    return Ok((
                        vec![LintFix::delete(indent_seg.clone())],
                        self.spliced(idx, 1, Vec::new()),
                    ));
                }
                let new_indent = indent_seg.edit(desired);
                return Ok((
                    vec![LintFix::replace(indent_seg.clone(), vec![new_indent.clone()])],
                    self.spliced(idx, 1, vec![new_indent]),
                ));
            }

            if desired.is_empty() {
                return Ok((Vec::new(), self.clone()));
            }
            let is_newline = |seg: &Segment| seg.is_type(SyntaxKind::Newline);
            let idx = self
                .segments
                .iter()
                .rposition(|seg| {
                    is_newline(seg) && seg.position().map_or(true, |pos| pos.is_literal())
                })
                .or_else(|| self.segments.iter().rposition(is_newline))
                .ok_or_else(|| {
                    ReflowError::InvalidSequence("newline count without a newline".to_string())
                })?;
            let new_indent = Segment::whitespace(desired);
            return Ok((
                vec![LintFix::create_after(self.segments[idx].clone(), vec![new_indent.clone()])],
                self.spliced(idx + 1, 0, vec![new_indent]),
            ));
        }

        let whitespace = self
            .segments
            .iter()
            .find(|seg| seg.is_type(SyntaxKind::Whitespace));
        let Some(ws_seg) = whitespace else {
            let mut new_segs = vec![Segment::newline()];
            if !desired.is_empty() {
                new_segs.push(Segment::whitespace(desired));
            }
            let fix = match (before, after) {
                (Some(before), _) => LintFix::create_before(before.clone(), new_segs.clone()),
                (None, Some(after)) => LintFix::create_after(after.clone(), new_segs.clone()),
                (None, None) => return Err(ReflowError::MissingAnchor),
            };
            let mut segments = self.segments.clone();
            segments.extend(new_segs);
            return Ok((vec![fix], ReflowPoint::new(segments)));
        };

        let mut new_segs = vec![Segment::newline()];
        if !desired.is_empty() {
            new_segs.push(ws_seg.edit(desired));
        }
        let idx = self
            .index_of(ws_seg)
            .ok_or_else(|| ReflowError::InvalidSequence("whitespace not in point".to_string()))?;
        Ok((
            vec![LintFix::replace(ws_seg.clone(), new_segs.clone())],
            self.spliced(idx, 1, new_segs),
        ))
    }
}

#[derive(Debug, Clone)]
pub enum ReflowElement {
    Block(ReflowBlock),
    Point(ReflowPoint),
}

impl ReflowElement {
    pub fn segments(&self) -> &[Segment] {
        match self {
            ReflowElement::Block(block) => std::slice::from_ref(&block.segment),
            ReflowElement::Point(point) => point.segments(),
        }
    }

    pub fn class_types(&self) -> SyntaxSet {
        match self {
            ReflowElement::Block(block) => block.class_types(),
            ReflowElement::Point(point) => point.class_types(),
        }
    }

    pub fn raw(&self) -> String {
        self.segments().iter().map(Segment::raw).collect()
    }

    pub fn first_segment(&self) -> Option<&Segment> {
        self.segments().first()
    }

    pub fn as_point(&self) -> Option<&ReflowPoint> {
        match self {
            ReflowElement::Point(point) => Some(point),
            ReflowElement::Block(_) => None,
        }
    }

    pub fn as_block(&self) -> Option<&ReflowBlock> {
        match self {
            ReflowElement::Block(block) => Some(block),
            ReflowElement::Point(_) => None,
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, ReflowElement::Point(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::segments::EditType;

    fn indent() -> Segment {
        Segment::indent(SyntaxKind::Indent, None, None)
    }

    fn dedent() -> Segment {
        Segment::indent(SyntaxKind::Dedent, None, None)
    }

    #[test]
    fn test_indent_impulse_and_trough() {
        let point = ReflowPoint::new(vec![dedent(), Segment::newline(), indent()]);
        let stats = point.get_indent_impulse(false);
        assert_eq!(stats.impulse, 0);
        assert_eq!(stats.trough, -1);

        let point = ReflowPoint::new(vec![indent(), indent(), dedent()]);
        let stats = point.get_indent_impulse(false);
        assert_eq!(stats.impulse, 1);
        assert_eq!(stats.trough, 0);
    }

    #[test]
    fn test_implicit_indents_recorded_only_when_allowed() {
        let implicit = Segment::indent(SyntaxKind::ImplicitIndent, None, None);
        let point = ReflowPoint::new(vec![indent(), implicit]);
        assert_eq!(point.get_indent_impulse(true).implicit_indents, vec![2]);
        assert!(point.get_indent_impulse(false).implicit_indents.is_empty());
        assert_eq!(point.get_indent_impulse(false).impulse, 2);
    }

    #[test]
    fn test_indent_segment() {
        let point = ReflowPoint::new(vec![Segment::newline(), Segment::whitespace("  "), dedent()]);
        assert_eq!(point.get_indent(), Some("  "));
        assert_eq!(point.num_newlines(), 1);
        assert_eq!(ReflowPoint::new(vec![Segment::whitespace(" ")]).get_indent(), None);
    }

    #[test]
    fn test_indent_to_replaces_and_deletes() {
        let point = ReflowPoint::new(vec![Segment::newline(), Segment::whitespace("    ")]);

        let (fixes, new_point) = point.indent_to("  ", None, None).unwrap();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].edit_type, EditType::Replace);
        assert_eq!(new_point.raw(), "\n  ");

        let (fixes, new_point) = point.indent_to("", None, None).unwrap();
        assert_eq!(fixes[0].edit_type, EditType::Delete);
        assert_eq!(new_point.raw(), "\n");

        let (fixes, _) = point.indent_to("    ", None, None).unwrap();
        assert!(fixes.is_empty());
    }

    #[test]
    fn test_indent_to_after_bare_newline() {
        let point = ReflowPoint::new(vec![indent(), Segment::newline()]);
        let (fixes, new_point) = point.indent_to("  ", None, None).unwrap();
        assert_eq!(fixes[0].edit_type, EditType::CreateAfter);
        assert!(fixes[0].anchor.is_type(SyntaxKind::Newline));
        assert_eq!(new_point.raw(), "\n  ");
        assert_eq!(new_point.segments().len(), 3);
    }

    #[test]
    fn test_indent_to_without_newline() {
        let anchor = Segment::token(SyntaxKind::Keyword, "from", None);

        let (fixes, new_point) = ReflowPoint::default()
            .indent_to("  ", Some(&anchor), None)
            .unwrap();
        assert_eq!(fixes[0].edit_type, EditType::CreateBefore);
        assert!(fixes[0].anchor.ptr_eq(&anchor));
        assert_eq!(fixes[0].edit_raw(), "\n  ");
        assert_eq!(new_point.raw(), "\n  ");

        let point = ReflowPoint::new(vec![Segment::whitespace(" ")]);
        let (fixes, new_point) = point.indent_to("", Some(&anchor), None).unwrap();
        assert_eq!(fixes[0].edit_type, EditType::Replace);
        assert_eq!(new_point.raw(), "\n");

        assert_eq!(
            ReflowPoint::default().indent_to("  ", None, None).unwrap_err(),
            ReflowError::MissingAnchor
        );
    }
}
