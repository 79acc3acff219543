//! Building and operating on a flat reflow sequence

use super::config::{LinePosition, ReflowConfig};
use super::depth_map::{DepthMap, StackPositionType};
use super::elements::{ReflowBlock, ReflowElement, ReflowPoint};
use super::reindent::lint_indent_points;
use super::respace::InsertAnchor;
use crate::sql::errors::ReflowError;
use crate::sql::segments::{LintFix, LintResult, Segment, SyntaxKind, SyntaxSet};

const POINT_TYPES: SyntaxSet = SyntaxSet::new(&[
    SyntaxKind::Whitespace,
    SyntaxKind::Newline,
    SyntaxKind::Indent,
]);

/// Which neighbours of a target [`ReflowSequence::from_around_target`] takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetSides {
    #[default]
    Both,
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

/// Which points [`ReflowSequence::respace`] may change, judged on the point
/// after respacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RespaceFilter {
    #[default]
    All,
    /// Only points with a line break or right before the end of the file.
    Newline,
    /// Only points on a single line.
    Inline,
}

/// Alternating points and blocks covering a run of raw segments, always
/// starting and ending with a (possibly empty) point.
///
/// Editing operations return a new sequence plus the fixes that would turn
/// the tree into it ([`get_fixes`](Self::get_fixes)). The tree itself is
/// never touched.
#[derive(Debug, Clone)]
pub struct ReflowSequence {
    root: Segment,
    elements: Vec<ReflowElement>,
    config: ReflowConfig,
    depth_map: DepthMap,
    /// Fixes that produce this sequence from the tree.
    embodied_fixes: Vec<LintFix>,
    results: Vec<LintResult>,
}

impl ReflowSequence {
    /// Sequence over every raw segment under `root`.
    pub fn from_root(root: &Segment, config: &ReflowConfig) -> Result<Self, ReflowError> {
        let depth_map = DepthMap::from_parent(root);
        Self::from_raw_segments(&root.raw_segments(), root, config, &depth_map)
    }

    /// Sequence over `segments`, which must all sit under `root`.
    pub fn from_raw_segments(
        segments: &[Segment],
        root: &Segment,
        config: &ReflowConfig,
        depth_map: &DepthMap,
    ) -> Result<Self, ReflowError> {
        let elements = Self::elements_from_raw_segments(segments, config, depth_map)?;
        log::debug!(
            target: "sqlreflow::reflow",
            "built sequence of {} elements from {} segments",
            elements.len(),
            segments.len()
        );
        Ok(Self {
            root: root.clone(),
            elements,
            config: config.clone(),
            depth_map: depth_map.clone(),
            embodied_fixes: Vec::new(),
            results: Vec::new(),
        })
    }

    /// Sequence centred on `target`, reaching out to the nearest code
    /// segment on each requested side. Comments on the way are taken in.
    pub fn from_around_target(
        target: &Segment,
        root: &Segment,
        config: &ReflowConfig,
        sides: TargetSides,
    ) -> Result<Self, ReflowError> {
        let all_raws = root.raw_segments();
        let target_raws = target.raw_segments();
        let find = |seg: &Segment| all_raws.iter().position(|raw| raw.ptr_eq(seg));
        let (Some(first), Some(last)) = (
            target_raws.first().and_then(find),
            target_raws.last().and_then(find),
        ) else {
            return Err(ReflowError::InvalidSequence(format!("{:?} is not under the root", target)));
        };

        let mut pre_idx = first;
        let mut post_idx = last + 1;
        if sides != TargetSides::After {
            pre_idx = pre_idx.saturating_sub(1);
            while pre_idx > 1 && !all_raws[pre_idx].is_code() {
                pre_idx -= 1;
            }
        }
        if sides != TargetSides::Before {
            while post_idx < all_raws.len() && !all_raws[post_idx].is_code() {
                post_idx += 1;
            }
            post_idx = (post_idx + 1).min(all_raws.len());
        }
        let segments = &all_raws[pre_idx..post_idx];
        log::debug!(
            target: "sqlreflow::reflow",
            "sequence around target {}..{}: {:?}",
            pre_idx,
            post_idx,
            segments.iter().map(Segment::raw).collect::<String>()
        );
        Self::from_raw_segments(segments, root, config, &DepthMap::from_parent(root))
    }

    fn elements_from_raw_segments(
        segments: &[Segment],
        config: &ReflowConfig,
        depth_map: &DepthMap,
    ) -> Result<Vec<ReflowElement>, ReflowError> {
        let mut elements = Vec::with_capacity(segments.len() * 2 + 1);
        let mut point_buffer: Vec<Segment> = Vec::new();
        for seg in segments {
            if seg.is_any_type(&POINT_TYPES) || seg.consumed_whitespace().is_some() {
                point_buffer.push(seg.clone());
                continue;
            }
            let depth_info = depth_map
                .get_depth_info(seg)
                .cloned()
                .ok_or_else(|| {
                    ReflowError::InvalidSequence(format!("{:?} is not under the root", seg))
                })?;
            let point = ReflowPoint::new(std::mem::take(&mut point_buffer));
            elements.push(ReflowElement::Point(point));
            let block = ReflowBlock::from_config(seg.clone(), config, depth_info);
            elements.push(ReflowElement::Block(block));
        }
        elements.push(ReflowElement::Point(ReflowPoint::new(point_buffer)));
        Self::validate(&elements)?;
        Ok(elements)
    }

    fn validate(elements: &[ReflowElement]) -> Result<(), ReflowError> {
        for (idx, elem) in elements.iter().enumerate() {
            if elem.is_point() != (idx % 2 == 0) {
                return Err(ReflowError::InvalidSequence(format!(
                    "element {} breaks point/block alternation",
                    idx
                )));
            }
        }
        if elements.last().is_some_and(|elem| !elem.is_point()) {
            return Err(ReflowError::InvalidSequence("sequence must end with a point".to_string()));
        }
        Ok(())
    }

    fn with_elements(&self, elements: Vec<ReflowElement>, embodied_fixes: Vec<LintFix>) -> Self {
        Self {
            root: self.root.clone(),
            elements,
            config: self.config.clone(),
            depth_map: self.depth_map.clone(),
            embodied_fixes,
            results: self.results.clone(),
        }
    }

    pub fn root(&self) -> &Segment {
        &self.root
    }

    pub fn elements(&self) -> &[ReflowElement] {
        &self.elements
    }

    fn find_element_idx_with(&self, target: &Segment) -> Result<usize, ReflowError> {
        self.elements
            .iter()
            .position(|elem| elem.segments().iter().any(|seg| seg.ptr_eq(target)))
            .ok_or_else(|| {
                ReflowError::InvalidSequence(format!("{:?} is not in the sequence", target))
            })
    }

    fn block_idx_with(&self, target: &Segment) -> Result<usize, ReflowError> {
        let idx = self.find_element_idx_with(target)?;
        if self.elements[idx].is_point() {
            return Err(ReflowError::InvalidSequence(format!(
                "{:?} is spacing, not a block",
                target
            )));
        }
        Ok(idx)
    }

    /// The sequence as it would be without the block holding `target`. The
    /// points either side are merged; their spacing is left to a later
    /// [`respace`](Self::respace).
    pub fn without(&self, target: &Segment) -> Result<Self, ReflowError> {
        let idx = self.block_idx_with(target)?;
        let mut merged = self.elements[idx - 1].segments().to_vec();
        merged.extend_from_slice(self.elements[idx + 1].segments());

        let mut elements = self.elements[..idx - 1].to_vec();
        elements.push(ReflowElement::Point(ReflowPoint::new(merged)));
        elements.extend_from_slice(&self.elements[idx + 2..]);

        let mut fixes = self.embodied_fixes.clone();
        fixes.push(LintFix::delete(target.clone()));
        Ok(self.with_elements(elements, fixes))
    }

    /// The sequence with `insertion` as a new block next to `target`. The
    /// insertion is given the depth of `target`, as it becomes its sibling.
    pub fn insert(
        &self,
        insertion: &Segment,
        target: &Segment,
        pos: InsertPosition,
    ) -> Result<Self, ReflowError> {
        if insertion.is_any_type(&POINT_TYPES) {
            return Err(ReflowError::InvalidSequence(
                "whitespace, newlines and indents can't be inserted as blocks".to_string(),
            ));
        }
        let idx = self.block_idx_with(target)?;

        let mut depth_map = self.depth_map.clone();
        depth_map.copy_depth_info(target, insertion, 0);
        let depth_info = depth_map
            .get_depth_info(insertion)
            .cloned()
            .ok_or_else(|| ReflowError::InvalidSequence(format!("{:?} has no depth", target)))?;
        let block = ReflowBlock::from_config(insertion.clone(), &self.config, depth_info);
        let block = ReflowElement::Block(block);
        let point = ReflowElement::Point(ReflowPoint::default());

        let mut elements = self.elements.clone();
        let mut fixes = self.embodied_fixes.clone();
        match pos {
            InsertPosition::Before => {
                elements.insert(idx, point);
                elements.insert(idx, block);
                fixes.push(LintFix::create_before(target.clone(), vec![insertion.clone()]));
            }
            InsertPosition::After => {
                elements.insert(idx + 1, block);
                elements.insert(idx + 1, point);
                fixes.push(LintFix::create_after(target.clone(), vec![insertion.clone()]));
            }
        }
        let mut sequence = self.with_elements(elements, fixes);
        sequence.depth_map = depth_map;
        Ok(sequence)
    }

    /// The sequence with `target` (a raw segment or a whole subtree)
    /// replaced by `edit`. New raw segments take the depth of the first raw
    /// of `target`, less the levels inside `target` itself.
    pub fn replace(&self, target: &Segment, edit: Vec<Segment>) -> Result<Self, ReflowError> {
        let target_raws = target.raw_segments();
        let (Some(first), Some(last)) = (target_raws.first(), target_raws.last()) else {
            return Err(ReflowError::InvalidSequence("cannot replace an empty segment".to_string()));
        };
        let trim = target.path_to(first).len();
        let edit_raws: Vec<Segment> = edit.iter().flat_map(Segment::raw_segments).collect();

        let mut depth_map = self.depth_map.clone();
        for raw in &edit_raws {
            if !depth_map.copy_depth_info(first, raw, trim) {
                return Err(ReflowError::InvalidSequence(format!("{:?} has no depth", first)));
            }
        }
        log::debug!(
            target: "sqlreflow::reflow",
            "replacing {:?}, trimming {} level(s)",
            target.raw(),
            trim
        );

        let current: Vec<Segment> = self
            .elements
            .iter()
            .flat_map(|elem| elem.segments().iter().cloned())
            .collect();
        let position = |seg: &Segment| {
            current
                .iter()
                .position(|raw| raw.ptr_eq(seg))
                .ok_or_else(|| {
                    ReflowError::InvalidSequence(format!("{:?} is not in the sequence", seg))
                })
        };
        let (start, end) = (position(first)?, position(last)?);
        let mut raws = current[..start].to_vec();
        raws.extend(edit_raws);
        raws.extend_from_slice(&current[end + 1..]);

        let elements = Self::elements_from_raw_segments(&raws, &self.config, &depth_map)?;
        let mut fixes = self.embodied_fixes.clone();
        fixes.push(LintFix::replace(target.clone(), edit));
        let mut sequence = self.with_elements(elements, fixes);
        sequence.depth_map = depth_map;
        Ok(sequence)
    }

    /// Reset spacing at every point (or those `filter` selects) from the
    /// layout of the blocks around it, building on the fixes the sequence
    /// already carries. With `strip_newlines` line breaks are removed too,
    /// which pulls a focused sequence onto one line; it does not choose
    /// between breaks the way reindent does.
    pub fn respace(&self, strip_newlines: bool, filter: RespaceFilter) -> Self {
        let mut fixes = self.embodied_fixes.clone();
        let mut elements = self.elements.clone();
        for (idx, elem) in self.elements.iter().enumerate() {
            let Some(point) = elem.as_point() else {
                continue;
            };
            let pre = idx.checked_sub(1).and_then(|i| self.elements[i].as_block());
            let post = self.elements.get(idx + 1).and_then(ReflowElement::as_block);
            // A point at either end with no whitespace in it has nothing on
            // one side to space against.
            if (pre.is_none() || post.is_none()) && point.segments().iter().all(Segment::is_meta) {
                continue;
            }
            let (new_fixes, new_point) = point.respace_point(
                pre,
                post,
                fixes.clone(),
                strip_newlines,
                InsertAnchor::Previous,
            );

            let breaks_line = new_point.num_newlines() > 0
                || post.is_some_and(|block| block.segment().is_type(SyntaxKind::EndOfFile));
            let skipped = match filter {
                RespaceFilter::All => false,
                RespaceFilter::Newline => !breaks_line,
                RespaceFilter::Inline => breaks_line,
            };
            if skipped {
                log::debug!(target: "sqlreflow::reflow", "filter {:?} skips point {}", filter, idx);
                continue;
            }
            fixes = new_fixes;
            elements[idx] = ReflowElement::Point(new_point);
        }
        self.with_elements(elements, fixes)
    }

    /// Move segments with a `line_position` preference (operators, commas,
    /// and configured parents) to the preferred side of an adjacent line
    /// break. Only existing breaks are used; indentation is assumed right.
    pub fn rebreak(&self) -> Result<Self, ReflowError> {
        if !self.embodied_fixes.is_empty() {
            return Err(ReflowError::PendingFixes);
        }

        let mut fixes: Vec<LintFix> = Vec::new();
        let mut elem_buff = self.elements.clone();

        let locations: Vec<RebreakLocation> = identify_rebreak_spans(&self.elements, &self.root)
            .into_iter()
            .map(|span| RebreakLocation::from_span(span, &self.elements))
            .collect();

        for loc in locations {
            log::debug!(
                target: "sqlreflow::reflow",
                "rebreak span ({:?}: {:?}): {:?}",
                loc.line_position,
                loc.target.raw(),
                elem_buff[loc.prev_code_pt_idx..=loc.next_code_pt_idx]
                    .iter()
                    .map(ReflowElement::raw)
                    .collect::<String>()
            );
            if loc.has_inappropriate_newlines(&elem_buff) || loc.has_templated_newline(&elem_buff) {
                continue;
            }

            let prev_point = point_at(&elem_buff, loc.prev_point_idx)?.clone();
            let next_point = point_at(&elem_buff, loc.next_point_idx)?.clone();

            match loc.line_position {
                LinePosition::Leading => {
                    if num_newlines(&elem_buff, loc.prev_nl_idx) > 0 {
                        continue;
                    }
                    if loc.next_point_idx == loc.next_code_pt_idx
                        && num_newlines(&elem_buff, loc.next_nl_idx) == 1
                    {
                        log::debug!(target: "sqlreflow::reflow", "leading, no comments in the way");
                        let indent = next_point.get_indent().unwrap_or_default().to_string();
                        let (indent_fixes, new_prev) =
                            prev_point.indent_to(&indent, Some(&loc.target), None)?;
                        fixes.extend(indent_fixes);
                        let (updated, new_next) = next_point.respace_point(
                            block_at(&elem_buff, loc.next_point_idx - 1),
                            block_at(&elem_buff, loc.next_point_idx + 1),
                            fixes,
                            true,
                            InsertAnchor::Previous,
                        );
                        fixes = updated;
                        elem_buff[loc.prev_point_idx] = ReflowElement::Point(new_prev);
                        elem_buff[loc.next_point_idx] = ReflowElement::Point(new_next);
                    } else {
                        log::debug!(target: "sqlreflow::reflow", "leading, moving past comments");
                        fixes.push(LintFix::delete(loc.target.clone()));
                        let stale = prev_point.segments().iter().filter(|seg| !seg.is_meta());
                        fixes.extend(stale.cloned().map(LintFix::delete));

                        let landing = point_at(&elem_buff, loc.next_code_pt_idx)?;
                        let next_code = block_at(&elem_buff, loc.next_code_pt_idx + 1);
                        let moved = vec![loc.target.clone()];
                        let insertion = match (landing.segments().last(), next_code) {
                            (Some(last), _) => LintFix::create_after(last.clone(), moved),
                            (None, Some(code)) => {
                                LintFix::create_before(code.segment().clone(), moved)
                            }
                            (None, None) => return Err(ReflowError::MissingAnchor),
                        };
                        fixes.push(insertion);
                        let (updated, new_point) = ReflowPoint::default().respace_point(
                            block_at(&elem_buff, loc.next_point_idx - 1),
                            next_code,
                            fixes,
                            false,
                            InsertAnchor::Next,
                        );
                        fixes = updated;

                        let mut rebuilt = elem_buff[..loc.prev_point_idx].to_vec();
                        let target_start = loc.prev_point_idx + 1;
                        let target_end = loc.next_point_idx;
                        rebuilt.extend_from_slice(&elem_buff[target_end..=loc.next_code_pt_idx]);
                        rebuilt.extend_from_slice(&elem_buff[target_start..target_end]);
                        rebuilt.push(ReflowElement::Point(new_point));
                        rebuilt.extend_from_slice(&elem_buff[loc.next_code_pt_idx + 1..]);
                        elem_buff = rebuilt;
                    }
                }
                LinePosition::Trailing => {
                    if num_newlines(&elem_buff, loc.next_nl_idx) > 0 {
                        continue;
                    }
                    if loc.prev_point_idx == loc.prev_code_pt_idx
                        && num_newlines(&elem_buff, loc.prev_nl_idx) == 1
                    {
                        log::debug!(
                            target: "sqlreflow::reflow",
                            "trailing, no comments in the way"
                        );
                        let indent = prev_point.get_indent().unwrap_or_default().to_string();
                        let (indent_fixes, new_next) =
                            next_point.indent_to(&indent, None, Some(&loc.target))?;
                        fixes.extend(indent_fixes);
                        let (updated, new_prev) = prev_point.respace_point(
                            block_at(&elem_buff, loc.prev_point_idx - 1),
                            block_at(&elem_buff, loc.prev_point_idx + 1),
                            fixes,
                            true,
                            InsertAnchor::Previous,
                        );
                        fixes = updated;
                        elem_buff[loc.prev_point_idx] = ReflowElement::Point(new_prev);
                        elem_buff[loc.next_point_idx] = ReflowElement::Point(new_next);
                    } else {
                        log::debug!(target: "sqlreflow::reflow", "trailing, moving past comments");
                        fixes.push(LintFix::delete(loc.target.clone()));
                        let stale = next_point.segments().iter().filter(|seg| !seg.is_meta());
                        fixes.extend(stale.cloned().map(LintFix::delete));

                        let landing = point_at(&elem_buff, loc.prev_code_pt_idx)?;
                        let prev_code = loc
                            .prev_code_pt_idx
                            .checked_sub(1)
                            .and_then(|idx| block_at(&elem_buff, idx));
                        let moved = vec![loc.target.clone()];
                        let insertion = match (landing.segments().first(), prev_code) {
                            (Some(first), _) => LintFix::create_before(first.clone(), moved),
                            (None, Some(code)) => {
                                LintFix::create_after(code.segment().clone(), moved)
                            }
                            (None, None) => return Err(ReflowError::MissingAnchor),
                        };
                        fixes.push(insertion);
                        let (updated, new_point) = ReflowPoint::default().respace_point(
                            prev_code,
                            block_at(&elem_buff, loc.prev_point_idx + 1),
                            fixes,
                            false,
                            InsertAnchor::Previous,
                        );
                        fixes = updated;

                        let mut rebuilt = elem_buff[..loc.prev_code_pt_idx].to_vec();
                        rebuilt.push(ReflowElement::Point(new_point));
                        let target_start = loc.prev_point_idx + 1;
                        let target_end = loc.next_point_idx;
                        rebuilt.extend_from_slice(&elem_buff[target_start..target_end]);
                        rebuilt.extend_from_slice(&elem_buff[loc.prev_code_pt_idx..target_start]);
                        rebuilt.extend_from_slice(&elem_buff[loc.next_point_idx + 1..]);
                        elem_buff = rebuilt;
                    }
                }
            }
        }

        Ok(self.with_elements(elem_buff, fixes))
    }

    /// Lint indentation, returning the corrected sequence. The fixes that
    /// correct it are available through [`get_fixes`](Self::get_fixes).
    pub fn reindent(self) -> Result<Self, ReflowError> {
        let single_indent = self.config.single_indent()?;
        log::debug!(target: "sqlreflow::reflow", "reindenting with unit {:?}", single_indent);
        let (elements, results) = lint_indent_points(
            &self.elements,
            &single_indent,
            &self.config.skip_indentation_in,
            self.config.indent_policy(),
        )?;
        Ok(Self {
            elements,
            results,
            ..self
        })
    }

    pub fn get_results(&self) -> &[LintResult] {
        &self.results
    }

    /// Fixes from editing operations followed by those of the reindent
    /// results.
    pub fn get_fixes(&self) -> Vec<LintFix> {
        self.embodied_fixes
            .iter()
            .cloned()
            .chain(self.results.iter().flat_map(|result| result.fixes.iter().cloned()))
            .collect()
    }

    /// Source text as the sequence currently describes it.
    pub fn get_raw(&self) -> String {
        self.elements.iter().map(ReflowElement::raw).collect()
    }
}

fn point_at(elements: &[ReflowElement], idx: usize) -> Result<&ReflowPoint, ReflowError> {
    elements
        .get(idx)
        .and_then(ReflowElement::as_point)
        .ok_or_else(|| ReflowError::InvalidSequence(format!("element {} is not a point", idx)))
}

fn block_at(elements: &[ReflowElement], idx: usize) -> Option<&ReflowBlock> {
    elements.get(idx).and_then(ReflowElement::as_block)
}

fn num_newlines(elements: &[ReflowElement], idx: usize) -> usize {
    elements
        .get(idx)
        .and_then(ReflowElement::as_point)
        .map_or(0, ReflowPoint::num_newlines)
}

fn is_code_block(elements: &[ReflowElement], idx: usize) -> bool {
    elements[idx].segments().iter().any(Segment::is_code)
}

/// A block, or a run of blocks making up one parent, with a line position.
#[derive(Debug, Clone)]
struct RebreakSpan {
    target: Segment,
    start_idx: usize,
    end_idx: usize,
    line_position: LinePosition,
}

/// Find the spans worth rebreaking: blocks configured themselves, and
/// configured parents whose first and last code blocks are both in view.
fn identify_rebreak_spans(elements: &[ReflowElement], root: &Segment) -> Vec<RebreakSpan> {
    use StackPositionType::{End, Solo, Start};

    let mut spans = Vec::new();
    // Two elements are needed either side.
    for idx in 2..elements.len().saturating_sub(2) {
        let Some(block) = elements[idx].as_block() else {
            continue;
        };
        if let Some(line_position) = block.line_position {
            spans.push(RebreakSpan {
                target: block.segment().clone(),
                start_idx: idx,
                end_idx: idx,
                line_position,
            });
        }

        let depth_info = &block.depth_info;
        for (depth, hash) in depth_info.stack_hashes.iter().enumerate() {
            let Some(&line_position) = block.line_position_configs.get(hash) else {
                continue;
            };
            if !matches!(depth_info.stack_positions[depth].position_type, Start | Solo) {
                continue;
            }
            for end_idx in idx..elements.len() - 2 {
                let Some(end) = elements[end_idx].as_block() else {
                    continue;
                };
                if end.depth_info.stack_hashes.get(depth) != Some(hash) {
                    // Left the parent without seeing its end.
                    break;
                }
                if matches!(end.depth_info.stack_positions[depth].position_type, End | Solo) {
                    if let Some(target) = root.path_to(block.segment()).get(depth) {
                        spans.push(RebreakSpan {
                            target: target.clone(),
                            start_idx: idx,
                            end_idx,
                            line_position,
                        });
                    }
                    break;
                }
            }
        }
    }
    spans
}

/// A span plus the points around it that rebreaking looks at: the points
/// right next to it, the nearest points with a newline (seeing past
/// comments) and the points next to the nearest code.
#[derive(Debug, Clone)]
struct RebreakLocation {
    target: Segment,
    prev_code_pt_idx: usize,
    prev_nl_idx: usize,
    prev_point_idx: usize,
    next_point_idx: usize,
    next_nl_idx: usize,
    next_code_pt_idx: usize,
    line_position: LinePosition,
}

impl RebreakLocation {
    fn from_span(span: RebreakSpan, elements: &[ReflowElement]) -> Self {
        let len = elements.len();
        let has_newline = |idx: usize| elements[idx].class_types().contains(SyntaxKind::Newline);

        let prev_point_idx = span.start_idx - 1;
        let next_point_idx = span.end_idx + 1;

        // Points sit two apart.
        let mut prev_nl_idx = prev_point_idx;
        while prev_nl_idx >= 2
            && !has_newline(prev_nl_idx)
            && !is_code_block(elements, prev_nl_idx - 1)
        {
            prev_nl_idx -= 2;
        }
        let mut next_nl_idx = next_point_idx;
        while next_nl_idx + 2 < len
            && !has_newline(next_nl_idx)
            && !is_code_block(elements, next_nl_idx + 1)
        {
            next_nl_idx += 2;
        }

        let mut prev_code_pt_idx = prev_nl_idx;
        while prev_code_pt_idx >= 2 && !is_code_block(elements, prev_code_pt_idx - 1) {
            prev_code_pt_idx -= 2;
        }
        let mut next_code_pt_idx = next_nl_idx;
        while next_code_pt_idx + 2 < len && !is_code_block(elements, next_code_pt_idx + 1) {
            next_code_pt_idx += 2;
        }

        Self {
            target: span.target,
            prev_code_pt_idx,
            prev_nl_idx,
            prev_point_idx,
            next_point_idx,
            next_nl_idx,
            next_code_pt_idx,
            line_position: span.line_position,
        }
    }

    /// A newline from the template on either side reads as a tag in the
    /// source, which is as good as no newline at all.
    fn has_templated_newline(&self, elements: &[ReflowElement]) -> bool {
        let templated = |seg: &Segment| seg.position().is_some_and(|pos| !pos.is_literal());
        let last_prev = elements[self.prev_nl_idx]
            .segments()
            .iter()
            .rev()
            .find(|seg| seg.is_type(SyntaxKind::Newline));
        let first_next = elements[self.next_nl_idx]
            .segments()
            .iter()
            .find(|seg| seg.is_type(SyntaxKind::Newline));
        last_prev.is_some_and(templated) || first_next.is_some_and(templated)
    }

    /// True unless exactly one side has a line break.
    fn has_inappropriate_newlines(&self, elements: &[ReflowElement]) -> bool {
        let prev = num_newlines(elements, self.prev_nl_idx) > 0;
        let next = num_newlines(elements, self.next_nl_idx) > 0;
        prev == next
    }
}
