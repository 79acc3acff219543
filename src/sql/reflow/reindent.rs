//! Indentation linting over a reflow sequence
//!
//! The engine never measures indentation directly against the tree. Instead
//! it tracks an abstract *indent balance*: every `indent` meta raises it by
//! one and every `dedent` lowers it. A line should start indented by its
//! balance, minus any indents that were opened and closed again without a
//! line break in between ("untaken" indents), plus any indents this pass
//! forced open by inserting a line break.
//!
//! The pass runs in four stages:
//!
//! 1. [`map_line_buffers`] finds the points that matter (line breaks and
//!    points carrying indent metas) and groups them into [`IndentLine`]s.
//! 2. [`revise_templated_lines`] and [`revise_comment_lines`] adjust the
//!    starting balance of lines made only of template tags or comments.
//! 3. Each line's starting indent is compared with the desired one.
//! 4. Lines that open an untaken indent without closing it (or close one
//!    that was taken) get a line break inserted at that point.
//!
//! Balances are abstract units; they become literal whitespace only when a
//! fix is emitted, by repeating the configured single indent.

use super::elements::{ReflowBlock, ReflowElement, ReflowPoint};
use crate::sql::errors::ReflowError;
use crate::sql::segments::{LintFix, LintResult, Segment, SyntaxKind, SyntaxSet};
use crate::sql::templated::{BlockUuid, SliceType};
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Behaviour switches for [`lint_indent_points`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentPolicy {
    /// Implicit indents count as taken even without a line break after them.
    pub allow_implicit_indents: bool,
    /// Accept lines aligned under the first token after an open bracket.
    pub hanging_indents: bool,
    /// Columns a tab counts for when measuring existing indentation.
    pub tab_space_size: usize,
}

impl Default for IndentPolicy {
    fn default() -> Self {
        Self {
            allow_implicit_indents: false,
            hanging_indents: false,
            tab_space_size: 4,
        }
    }
}

/// A point that is either a line break or changes the indent balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentPoint {
    /// Index of the point in the element list.
    pub idx: usize,
    pub indent_impulse: i32,
    pub indent_trough: i32,
    pub initial_indent_balance: i32,
    pub last_line_break_idx: Option<usize>,
    pub is_line_break: bool,
    /// Untaken indents before this point, named by the balance they
    /// raised to. An indent from 1 to 2 that was never followed by a line
    /// break is untaken indent 2.
    pub untaken_indents: Vec<i32>,
}

impl IndentPoint {
    pub fn closing_indent_balance(&self) -> i32 {
        self.initial_indent_balance + self.indent_impulse
    }
}

/// The indent points of one line: from the line break that opens it up to
/// and including the one that closes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentLine {
    pub initial_indent_balance: i32,
    pub indent_points: Vec<IndentPoint>,
}

impl IndentLine {
    /// `points` must not be empty.
    pub fn from_points(points: Vec<IndentPoint>) -> Self {
        debug_assert!(!points.is_empty());
        let starting_balance = match points.last() {
            Some(last) if last.last_line_break_idx.is_some() => points[0].closing_indent_balance(),
            _ => 0,
        };
        Self {
            initial_indent_balance: starting_balance,
            indent_points: points,
        }
    }

    fn first(&self) -> &IndentPoint {
        &self.indent_points[0]
    }

    fn last(&self) -> &IndentPoint {
        &self.indent_points[self.indent_points.len() - 1]
    }

    fn is_first_line(&self) -> bool {
        self.last().last_line_break_idx.is_none()
    }

    pub fn iter_blocks<'a>(
        &self,
        elements: &'a [ReflowElement],
    ) -> impl Iterator<Item = &'a ReflowBlock> + 'a {
        let start = if self.is_first_line() { 0 } else { self.first().idx };
        let end = self.last().idx.min(elements.len());
        elements[start.min(end)..end]
            .iter()
            .filter_map(ReflowElement::as_block)
    }

    pub fn is_all_comments(&self, elements: &[ReflowElement]) -> bool {
        let mut blocks = self.iter_blocks(elements).map(ReflowBlock::segment).peekable();
        blocks.peek().is_some() && blocks.all(|seg| seg.is_type(SyntaxKind::Comment))
    }

    pub fn is_all_templates(&self, elements: &[ReflowElement]) -> bool {
        let mut blocks = self.iter_blocks(elements).map(ReflowBlock::segment).peekable();
        blocks.peek().is_some()
            && blocks.all(|seg| {
                seg.is_type(SyntaxKind::Placeholder) || seg.is_type(SyntaxKind::TemplateLoop)
            })
    }

    /// Indent units this line should start with.
    ///
    /// When the first point dips before rising again, untaken indents above
    /// the dip no longer apply.
    pub fn desired_indent_units(&self, forced_indents: &[i32]) -> i32 {
        let first = self.first();
        let relevant_untaken = if first.indent_trough != 0 {
            let limit = self.initial_indent_balance - (first.indent_impulse - first.indent_trough);
            first.untaken_indents.iter().filter(|i| **i <= limit).count()
        } else {
            first.untaken_indents.len()
        };
        let desired =
            self.initial_indent_balance - relevant_untaken as i32 + forced_indents.len() as i32;
        log::debug!(
            target: "sqlreflow::reflow",
            "desired indent: balance {}, relevant untaken {}, untaken {:?}, forced {:?} = {}",
            self.initial_indent_balance,
            relevant_untaken,
            first.untaken_indents,
            forced_indents,
            desired
        );
        desired
    }

    pub fn closing_balance(&self) -> i32 {
        self.last().closing_indent_balance()
    }

    /// Balance at the start of the line as it stands in the tree. The first
    /// line of a file always opens at zero.
    pub fn opening_balance(&self) -> i32 {
        if self.is_first_line() {
            return 0;
        }
        self.first().closing_indent_balance()
    }
}

/// One level of indentation as literal text.
pub fn construct_single_indent(
    indent_unit: &str,
    tab_space_size: usize,
) -> Result<String, ReflowError> {
    match indent_unit {
        "tab" => Ok("\t".to_string()),
        "space" => Ok(" ".repeat(tab_space_size)),
        other => Err(ReflowError::InvalidIndentUnit(other.to_string())),
    }
}

/// True when the point holds a newline that exists in the source, not one
/// produced by template code.
pub fn has_untemplated_newline(point: &ReflowPoint) -> bool {
    point.segments().iter().any(|seg| {
        (seg.is_type(SyntaxKind::Newline) && !seg.is_templated())
            || seg.consumed_whitespace().is_some_and(|ws| ws.contains('\n'))
    })
}

/// Walk the sequence and record every point that matters for indentation.
pub fn crawl_indent_points(
    elements: &[ReflowElement],
    allow_implicit_indents: bool,
) -> Vec<IndentPoint> {
    let mut points = Vec::new();
    let mut last_line_break_idx: Option<usize> = None;
    let mut indent_balance = 0;
    let mut untaken_indents: Vec<i32> = Vec::new();

    for (idx, elem) in elements.iter().enumerate() {
        let ReflowElement::Point(point) = elem else {
            continue;
        };
        let stats = point.get_indent_impulse(allow_implicit_indents);
        let mut has_newline = false;

        if has_untemplated_newline(point) && last_line_break_idx != Some(idx) {
            points.push(IndentPoint {
                idx,
                indent_impulse: stats.impulse,
                indent_trough: stats.trough,
                initial_indent_balance: indent_balance,
                last_line_break_idx,
                is_line_break: true,
                untaken_indents: untaken_indents.clone(),
            });
            last_line_break_idx = Some(idx);
            has_newline = true;
        } else if stats.impulse != 0
            || stats.trough != 0
            || idx == 0
            || elements
                .get(idx + 1)
                .and_then(ReflowElement::first_segment)
                .is_some_and(|seg| seg.is_type(SyntaxKind::EndOfFile))
        {
            points.push(IndentPoint {
                idx,
                indent_impulse: stats.impulse,
                indent_trough: stats.trough,
                initial_indent_balance: indent_balance,
                last_line_break_idx,
                is_line_break: false,
                untaken_indents: untaken_indents.clone(),
            });
        }

        // Strip back to the trough when it dips below where the point ends.
        let strip_above = if stats.trough < stats.impulse {
            indent_balance + stats.impulse + stats.trough
        } else {
            indent_balance + stats.impulse
        };
        untaken_indents.retain(|i| *i <= strip_above);

        if stats.impulse > stats.trough && !has_newline {
            for i in stats.trough..stats.impulse {
                if stats.implicit_indents.contains(&(i + 1)) {
                    continue;
                }
                untaken_indents.push(indent_balance + i + 1);
            }
        }

        indent_balance += stats.impulse;
    }
    points
}

/// Group the indent points into lines, split at line breaks.
pub fn map_line_buffers(
    elements: &[ReflowElement],
    allow_implicit_indents: bool,
) -> Vec<IndentLine> {
    let mut lines = Vec::new();
    let mut buffer: Vec<IndentPoint> = Vec::new();
    for point in crawl_indent_points(elements, allow_implicit_indents) {
        let is_line_break = point.is_line_break;
        buffer.push(point.clone());
        if !is_line_break {
            continue;
        }
        lines.push(IndentLine::from_points(std::mem::take(&mut buffer)));
        buffer.push(point);
    }
    if buffer.len() > 1 {
        lines.push(IndentLine::from_points(buffer));
    }
    lines
}

fn template_block_of(line: &IndentLine, elements: &[ReflowElement]) -> Option<BlockUuid> {
    let idx = line.last().idx.checked_sub(1)?;
    elements.get(idx)?.first_segment()?.block_uuid()
}

/// Balances a template-only line could sit at without crossing code: its
/// own, plus every balance passed by walking back through the indent metas
/// before it and forward through those after it.
fn template_line_options(line: &IndentLine, elements: &[ReflowElement]) -> BTreeSet<i32> {
    let mut steps = BTreeSet::from([line.initial_indent_balance]);

    let mut balance = line.initial_indent_balance;
    for seg in elements[line.first().idx].segments().iter().rev() {
        if seg.is_type(SyntaxKind::Indent) {
            balance -= seg.indent_val();
        }
        steps.insert(balance);
    }

    let mut balance = line.initial_indent_balance;
    for seg in elements[line.last().idx].segments() {
        if seg.is_type(SyntaxKind::Indent) {
            balance += seg.indent_val();
        }
        steps.insert(balance);
    }
    steps
}

/// Give the tags of each template block a consistent starting balance.
///
/// Tags already level are left alone. Otherwise they move to the deepest
/// balance every tag can reach without passing code between them; failing
/// that they all drop to the shallowest tag's balance and the lines they
/// enclose lose one level. Lines whose first segment's source spans several
/// lines are removed from linting afterwards.
pub fn revise_templated_lines(lines: &mut Vec<IndentLine>, elements: &[ReflowElement]) {
    let mut groups: Vec<(BlockUuid, Vec<usize>)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if !line.is_all_templates(elements) {
            continue;
        }
        let Some(uuid) = template_block_of(line, elements) else {
            continue;
        };
        match groups.iter_mut().find(|(group, _)| *group == uuid) {
            Some((_, members)) => members.push(idx),
            None => groups.push((uuid, vec![idx])),
        }
    }

    let deepest = |members: &[usize]| {
        members
            .iter()
            .map(|idx| lines[*idx].initial_indent_balance)
            .max()
            .unwrap_or(0)
    };
    let mut keyed: Vec<(i32, BlockUuid, Vec<usize>)> = groups
        .into_iter()
        .map(|(uuid, members)| (deepest(&members), uuid, members))
        .collect();
    keyed.sort_by_key(|(depth, _, _)| Reverse(*depth));

    for (_, uuid, members) in keyed {
        let balances: Vec<i32> = members
            .iter()
            .map(|idx| lines[*idx].initial_indent_balance)
            .collect();
        log::debug!(
            target: "sqlreflow::reflow",
            "template block {:?}: balances {:?}",
            uuid,
            balances
        );
        if balances.windows(2).all(|pair| pair[0] == pair[1]) {
            continue;
        }

        let options: Vec<BTreeSet<i32>> = members
            .iter()
            .map(|idx| template_line_options(&lines[*idx], elements))
            .collect();

        let first_member = members[0];
        let last_member = members[members.len() - 1];
        let intermediate: Vec<usize> = (first_member + 1..last_member)
            .filter(|idx| !members.contains(idx))
            .collect();
        let limit = intermediate
            .iter()
            .map(|idx| lines[*idx].initial_indent_balance - 1)
            .min()
            .unwrap_or(i32::MAX);

        let mut overlap = options[0].clone();
        for steps in &options[1..] {
            overlap = overlap.intersection(steps).copied().collect();
        }
        let best = match overlap.range(..=limit).next_back() {
            Some(best) => {
                log::debug!(
                    target: "sqlreflow::reflow",
                    "  shared balance {} (limit {})",
                    best,
                    limit
                );
                *best
            }
            None => {
                let best = balances.iter().copied().min().unwrap_or(0);
                log::debug!(target: "sqlreflow::reflow", "  straddling block, using {}", best);
                for idx in &intermediate {
                    lines[*idx].initial_indent_balance -= 1;
                }
                best
            }
        };
        for idx in &members {
            lines[*idx].initial_indent_balance = best;
        }
    }

    lines.retain(|line| {
        let Some(first_seg) = elements
            .get(line.first().idx + 1)
            .and_then(ReflowElement::first_segment)
        else {
            return true;
        };
        let Some(position) = first_seg.position() else {
            return true;
        };
        let source = position.source_str();
        let multiline_template = source != first_seg.raw() && source.contains('\n');
        if multiline_template {
            log::debug!(
                target: "sqlreflow::reflow",
                "skipping line {}: template source spans lines",
                position.line_no()
            );
        }
        !multiline_template
    });
}

/// Comment-only lines take the balance of the next line with code, or
/// zero when nothing follows them.
pub fn revise_comment_lines(lines: &mut [IndentLine], elements: &[ReflowElement]) {
    let mut comment_lines: Vec<usize> = Vec::new();
    for idx in 0..lines.len() {
        if lines[idx].is_all_comments(elements) {
            comment_lines.push(idx);
            continue;
        }
        let balance = lines[idx].initial_indent_balance;
        for comment_idx in comment_lines.drain(..) {
            log::debug!(
                target: "sqlreflow::reflow",
                "comment line {} anchored to line {}",
                comment_idx,
                idx
            );
            lines[comment_idx].initial_indent_balance = balance;
        }
    }
    for comment_idx in comment_lines {
        lines[comment_idx].initial_indent_balance = 0;
    }
}

/// The indent a line currently has.
///
/// `last_line_break_idx` is the point that starts the line; without one the
/// line is the first in the file and any leading whitespace is its indent.
/// When templating swallowed the break, the indent is whatever followed the
/// last newline in the swallowed source.
pub fn deduce_line_indent(
    elements: &[ReflowElement],
    last_line_break_idx: Option<usize>,
) -> String {
    let indent_seg = match last_line_break_idx {
        Some(idx) => elements
            .get(idx)
            .and_then(ReflowElement::as_point)
            .and_then(ReflowPoint::get_indent_segment),
        None => elements
            .first()
            .and_then(ReflowElement::as_point)
            .and_then(|point| {
                point
                    .segments()
                    .iter()
                    .rev()
                    .find(|seg| seg.is_type(SyntaxKind::Whitespace))
            }),
    };
    let Some(seg) = indent_seg else {
        return String::new();
    };
    match seg.consumed_whitespace() {
        Some(ws) => ws.rsplit('\n').next().unwrap_or_default().to_string(),
        None if !seg.is_templated() => seg.raw().to_string(),
        None => {
            log::warn!(target: "sqlreflow::reflow", "templated indent {:?} ignored", seg.raw());
            String::new()
        }
    }
}

fn indent_string(single_indent: &str, units: i32) -> String {
    single_indent.repeat(units.max(0) as usize)
}

fn indent_width(indent: &str, tab_space_size: usize) -> usize {
    indent
        .chars()
        .map(|c| if c == '\t' { tab_space_size } else { 1 })
        .sum()
}

fn indent_description(indent: &str) -> String {
    if indent.is_empty() {
        "no indent".to_string()
    } else if indent.contains(' ') && indent.contains('\t') {
        "mixed indent".to_string()
    } else if indent.starts_with('\t') {
        format!("indent of {} tabs", indent.len())
    } else {
        format!("indent of {} spaces", indent.len())
    }
}

fn quoted_source(seg: &Segment) -> String {
    match seg.placeholder_source() {
        Some((source, _)) => format!("'{}'", source),
        None => format!("'{}'", seg.raw()),
    }
}

fn fix_description(point: &ReflowPoint, desired: &str, before: Option<&Segment>) -> String {
    if has_untemplated_newline(point) || point.num_newlines() > 0 {
        if desired.is_empty() {
            return "Line should not be indented.".to_string();
        }
        return format!("Expected {}.", indent_description(desired));
    }
    match before {
        Some(seg) => format!(
            "Expected line break and {} before {}.",
            indent_description(desired),
            quoted_source(seg)
        ),
        None => format!("Expected line break and {}.", indent_description(desired)),
    }
}

fn line_number(elements: &[ReflowElement], line: &IndentLine) -> Option<usize> {
    elements
        .get(line.first().idx + 1)
        .and_then(ReflowElement::first_segment)
        .and_then(Segment::position)
        .map(|pos| pos.line_no())
}

/// Re-indent the point at `point_idx` and record the result.
fn coerce_point(
    elements: &mut [ReflowElement],
    point_idx: usize,
    desired: &str,
    reference_line: Option<usize>,
) -> Result<Vec<LintResult>, ReflowError> {
    let before = elements
        .get(point_idx + 1)
        .and_then(ReflowElement::first_segment)
        .cloned();
    let after = point_idx
        .checked_sub(1)
        .and_then(|idx| elements.get(idx))
        .and_then(ReflowElement::first_segment)
        .cloned();
    let point = elements
        .get(point_idx)
        .and_then(ReflowElement::as_point)
        .ok_or_else(|| {
            ReflowError::InvalidSequence(format!("element {} is not a point", point_idx))
        })?;

    let description = fix_description(point, desired, before.as_ref());
    let swallowed = point
        .get_indent_segment()
        .filter(|seg| seg.consumed_whitespace().is_some())
        .cloned();
    let (fixes, new_point) = point.indent_to(desired, before.as_ref(), after.as_ref())?;
    elements[point_idx] = ReflowElement::Point(new_point);

    // A swallowed indent can't be edited, so it is reported without fixes.
    let Some(anchor) = fixes.first().map(|fix| fix.anchor.clone()).or(swallowed) else {
        return Ok(Vec::new());
    };
    Ok(vec![LintResult::new(Some(anchor), fixes, description).with_reference_line(reference_line)])
}

/// What the previous line looked like, for hanging indent decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HangingLine {
    pub indent_width: usize,
    /// Column of the first token after the construct the line left open.
    pub hanging_column: Option<usize>,
    pub is_hanger: bool,
}

/// Column of the first token after the last construct this line opens and
/// leaves open.
fn hanging_column(
    elements: &[ReflowElement],
    line: &IndentLine,
    tab_space_size: usize,
) -> Option<usize> {
    let points = &line.indent_points;
    for i in (1..points.len().saturating_sub(1)).rev() {
        let ip = &points[i];
        if ip.indent_impulse <= ip.indent_trough {
            continue;
        }
        let opened = ip.closing_indent_balance();
        let closed_later = points[i + 1..]
            .iter()
            .any(|later| later.initial_indent_balance + later.indent_trough < opened);
        if closed_later {
            continue;
        }
        let text: String = elements[points[0].idx..=ip.idx]
            .iter()
            .map(ReflowElement::raw)
            .collect();
        let line_text = match text.rfind('\n') {
            Some(pos) => &text[pos + 1..],
            None => text.as_str(),
        };
        return Some(indent_width(line_text, tab_space_size));
    }
    None
}

/// Fix the indent at the start of a line.
///
/// Returns the results and whether the line was accepted as a hanging
/// indent.
pub fn lint_line_starting_indent(
    elements: &mut [ReflowElement],
    line: &IndentLine,
    single_indent: &str,
    forced_indents: &[i32],
    previous: Option<&HangingLine>,
    policy: IndentPolicy,
    reference_line: Option<usize>,
) -> Result<(Vec<LintResult>, bool), ReflowError> {
    let first = line.first();
    let current = deduce_line_indent(elements, line.last().last_line_break_idx);
    let desired_units = line.desired_indent_units(forced_indents);
    let desired = indent_string(single_indent, desired_units);

    if current == desired {
        return Ok((Vec::new(), false));
    }

    if policy.hanging_indents {
        let width = indent_width(&current, policy.tab_space_size);
        let hangs = previous.is_some_and(|prev| {
            prev.hanging_column == Some(width) || (prev.is_hanger && prev.indent_width == width)
        });
        if width > 0 && hangs {
            log::debug!(
                target: "sqlreflow::reflow",
                "  accepted hanging indent of {} columns",
                width
            );
            return Ok((Vec::new(), true));
        }
    }

    log::debug!(
        target: "sqlreflow::reflow",
        "  correcting indent {:?} -> {:?}",
        current,
        desired
    );

    if first.idx == 0 && !first.is_line_break {
        let point = elements
            .first()
            .and_then(ReflowElement::as_point)
            .ok_or_else(|| {
                ReflowError::InvalidSequence("sequence must start with a point".to_string())
            })?;
        let (whitespace, kept): (Vec<Segment>, Vec<Segment>) = point
            .segments()
            .iter()
            .cloned()
            .partition(|seg| seg.is_type(SyntaxKind::Whitespace));
        let Some(anchor) = whitespace.first().cloned() else {
            return Ok((Vec::new(), false));
        };
        let fixes = whitespace.into_iter().map(LintFix::delete).collect();
        elements[0] = ReflowElement::Point(ReflowPoint::new(kept));
        return Ok((
            vec![LintResult::new(Some(anchor), fixes, "First line should not be indented.")],
            false,
        ));
    }

    Ok((coerce_point(elements, first.idx, &desired, reference_line)?, false))
}

/// Insert a line break where the line opens an untaken indent and ends
/// still inside it. Returns the results and the balance forced open.
pub fn lint_line_untaken_positive_indents(
    elements: &mut [ReflowElement],
    line: &IndentLine,
    single_indent: &str,
    reference_line: Option<usize>,
) -> Result<Option<(Vec<LintResult>, i32)>, ReflowError> {
    let starting_balance = line.opening_balance();
    if line.closing_balance() <= starting_balance {
        return Ok(None);
    }

    let last = line.last();
    let closing_trough = last.initial_indent_balance
        + if last.indent_trough != 0 {
            last.indent_trough
        } else {
            last.indent_impulse
        };
    // Dropped back down to close the untaken indent.
    if closing_trough <= starting_balance {
        return Ok(None);
    }
    if !last.untaken_indents.contains(&closing_trough) {
        return Ok(None);
    }

    let Some(target) = line
        .indent_points
        .iter()
        .find(|ip| ip.closing_indent_balance() == closing_trough)
    else {
        log::warn!(
            target: "sqlreflow::reflow",
            "no point opens balance {} on its line",
            closing_trough
        );
        return Ok(None);
    };
    let desired = indent_string(
        single_indent,
        target.closing_indent_balance() - target.untaken_indents.len() as i32,
    );
    log::debug!(
        target: "sqlreflow::reflow",
        "  missing line break opening balance {}, indenting to {:?}",
        closing_trough,
        desired
    );
    let results = coerce_point(elements, target.idx, &desired, reference_line)?;
    Ok(Some((results, closing_trough)))
}

fn is_block_placeholder(seg: &Segment) -> bool {
    matches!(
        seg.placeholder_source(),
        Some((_, SliceType::BlockStart | SliceType::BlockMid | SliceType::BlockEnd))
    )
}

/// Insert line breaks where the line closes indents that were taken on the
/// way in. Never breaks before comments, statement terminators or template
/// block tags.
pub fn lint_line_untaken_negative_indents(
    elements: &mut [ReflowElement],
    line: &IndentLine,
    single_indent: &str,
    forced_indents: &[i32],
    reference_line: Option<usize>,
) -> Result<Vec<LintResult>, ReflowError> {
    if line.closing_balance() >= line.opening_balance() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for ip in &line.indent_points[..line.indent_points.len() - 1] {
        if ip.is_line_break || ip.indent_impulse >= 0 {
            continue;
        }
        if ip.untaken_indents.contains(&ip.initial_indent_balance)
            && !forced_indents.contains(&ip.initial_indent_balance)
        {
            continue;
        }

        let Some(next) = elements.get(ip.idx + 1) else {
            continue;
        };
        let next_types = next.class_types();
        if next_types.contains(SyntaxKind::Comment)
            || next_types.contains(SyntaxKind::StatementTerminator)
            || next.segments().iter().any(is_block_placeholder)
        {
            log::debug!(
                target: "sqlreflow::reflow",
                "  not breaking before {:?}",
                next.raw()
            );
            continue;
        }

        let desired = indent_string(
            single_indent,
            ip.closing_indent_balance() - ip.untaken_indents.len() as i32
                + forced_indents.len() as i32,
        );
        log::debug!(
            target: "sqlreflow::reflow",
            "  missing line break closing balance {}, indenting to {:?}",
            ip.initial_indent_balance,
            desired
        );
        results.extend(coerce_point(elements, ip.idx, &desired, reference_line)?);
    }
    Ok(results)
}

/// Evaluate one line. Mutates `elements` and `forced_indents`.
fn lint_line_buffer_indents(
    elements: &mut [ReflowElement],
    line: &IndentLine,
    single_indent: &str,
    forced_indents: &mut Vec<i32>,
    policy: IndentPolicy,
    hanging: &mut Option<HangingLine>,
    reference_line: Option<usize>,
) -> Result<Vec<LintResult>, ReflowError> {
    log::info!(
        target: "sqlreflow::reflow",
        "evaluating line at point {} (balance {}, forced {:?})",
        line.first().idx,
        line.initial_indent_balance,
        forced_indents
    );

    let (mut results, is_hanger) = lint_line_starting_indent(
        elements,
        line,
        single_indent,
        forced_indents,
        hanging.as_ref(),
        policy,
        reference_line,
    )?;

    let mut skip_positive = false;
    if policy.hanging_indents {
        let current = deduce_line_indent(elements, line.last().last_line_break_idx);
        let column = hanging_column(elements, line, policy.tab_space_size);
        if line.last().is_line_break {
            let next_indent = deduce_line_indent(elements, Some(line.last().idx));
            let next_width = indent_width(&next_indent, policy.tab_space_size);
            skip_positive = next_width > 0 && column == Some(next_width);
        }
        *hanging = Some(HangingLine {
            indent_width: indent_width(&current, policy.tab_space_size),
            hanging_column: column,
            is_hanger,
        });
    }

    if !skip_positive {
        if let Some((positive, forced)) =
            lint_line_untaken_positive_indents(elements, line, single_indent, reference_line)?
        {
            results.extend(positive);
            forced_indents.push(forced);
            return Ok(results);
        }
    }

    results.extend(lint_line_untaken_negative_indents(
        elements,
        line,
        single_indent,
        forced_indents,
        reference_line,
    )?);

    let closing = line.closing_balance();
    forced_indents.retain(|i| *i <= closing);
    Ok(results)
}

/// Lint every line of `elements` and return the corrected elements and the
/// results carrying the fixes.
///
/// Lines inside any segment whose type is in `skip_indentation_in` are left
/// alone.
pub fn lint_indent_points(
    elements: &[ReflowElement],
    single_indent: &str,
    skip_indentation_in: &SyntaxSet,
    policy: IndentPolicy,
) -> Result<(Vec<ReflowElement>, Vec<LintResult>), ReflowError> {
    let mut lines = map_line_buffers(elements, policy.allow_implicit_indents);
    revise_templated_lines(&mut lines, elements);
    revise_comment_lines(&mut lines, elements);

    if !skip_indentation_in.is_empty() {
        lines.retain(|line| {
            let skipped = line
                .iter_blocks(elements)
                .any(|block| block.depth_info.is_within(skip_indentation_in));
            if skipped {
                log::debug!(
                    target: "sqlreflow::reflow",
                    "skipping line at point {}: inside {:?}",
                    line.first().idx,
                    skip_indentation_in
                );
            }
            !skipped
        });
    }

    let mut buffer = elements.to_vec();
    let mut results = Vec::new();
    let mut forced_indents: Vec<i32> = Vec::new();
    let mut hanging: Option<HangingLine> = None;
    let mut reference_line = None;
    for line in &lines {
        results.extend(lint_line_buffer_indents(
            &mut buffer,
            line,
            single_indent,
            &mut forced_indents,
            policy,
            &mut hanging,
            reference_line,
        )?);
        reference_line = line_number(elements, line).or(reference_line);
    }
    Ok((buffer, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::Dialect;
    use crate::sql::parser::{Parser, ParserConfig};
    use crate::sql::reflow::{ReflowConfig, ReflowSequence};
    use crate::sql::segments::EditType;

    fn sequence(sql: &str, config: &ReflowConfig) -> ReflowSequence {
        let dialect = Dialect::ansi().unwrap();
        let parsed = Parser::new(&dialect, ParserConfig::default())
            .parse_string(sql)
            .unwrap();
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        ReflowSequence::from_root(&parsed.tree, config).unwrap()
    }

    fn config(tab_space_size: usize) -> ReflowConfig {
        ReflowConfig {
            tab_space_size,
            ..ReflowConfig::default()
        }
    }

    fn reindent(sql: &str, config: &ReflowConfig) -> (String, Vec<LintResult>) {
        let reindented = sequence(sql, config).reindent().unwrap();
        (reindented.get_raw(), reindented.get_results().to_vec())
    }

    #[test]
    fn test_single_indent() {
        assert_eq!(construct_single_indent("space", 2).unwrap(), "  ");
        assert_eq!(construct_single_indent("tab", 2).unwrap(), "\t");
        assert!(construct_single_indent("both", 2).is_err());
    }

    #[test]
    fn test_crawl_marks_untaken_indents() {
        let seq = sequence("select a\nfrom t", &config(4));
        let points = crawl_indent_points(seq.elements(), false);
        // file start, after select, the line break, after from, before end of file
        assert_eq!(points.len(), 5);
        assert_eq!(points[1].untaken_indents, Vec::<i32>::new());
        assert!(points[2].is_line_break);
        assert_eq!(points[2].untaken_indents, vec![1]);
        assert_eq!(points[2].closing_indent_balance(), 0);
        let total: i32 = points.iter().map(|p| p.indent_impulse).sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_inserts_missing_indent() {
        let (raw, results) = reindent("select\n1", &config(2));
        assert_eq!(raw, "select\n  1");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].description, "Expected indent of 2 spaces.");
        assert_eq!(results[0].fixes[0].edit_type, EditType::CreateAfter);
        assert_eq!(results[0].reference_line, Some(1));
    }

    #[test]
    fn test_corrects_over_indented_lines() {
        let (raw, results) = reindent(
            "select\n    1+(\n    2+3\n    ),\n    4\n    from foo",
            &config(2),
        );
        assert_eq!(raw, "select\n  1+(\n    2+3\n  ),\n  4\nfrom foo");
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_first_line_indent_removed() {
        let (raw, results) = reindent("  select 1", &config(4));
        assert_eq!(raw, "select 1");
        assert_eq!(results[0].description, "First line should not be indented.");
    }

    #[test]
    fn test_forces_line_break_for_untaken_indent() {
        let (raw, results) = reindent("select a,\n b\nfrom t", &config(4));
        assert_eq!(raw, "select\n    a,\n    b\nfrom t");
        assert_eq!(
            results[0].description,
            "Expected line break and indent of 4 spaces before 'a'."
        );
    }

    #[test]
    fn test_comment_line_follows_next_line() {
        let (raw, _) = reindent("select\n-- note\n1", &config(4));
        assert_eq!(raw, "select\n    -- note\n    1");
    }

    #[test]
    fn test_implicit_indent_allowed() {
        let sql = "select a\nfrom t\nwhere a = 1\nand b = 2";
        let mut allowed = config(2);
        allowed.allow_implicit_indents = true;
        let (raw, _) = reindent(sql, &allowed);
        assert_eq!(raw, "select a\nfrom t\nwhere a = 1\n  and b = 2");

        let (raw, _) = reindent(sql, &config(2));
        assert_eq!(raw, "select a\nfrom t\nwhere\n  a = 1\n  and b = 2");
    }

    #[test]
    fn test_hanging_indent_accepted() {
        let sql = "select foo(a,\n           b)\nfrom t";
        let mut hanging = config(4);
        hanging.hanging_indents = true;
        let (raw, results) = reindent(sql, &hanging);
        assert_eq!(raw, sql);
        assert!(results.is_empty());

        let (raw, _) = reindent(sql, &config(4));
        assert_eq!(raw, "select foo(\n    a,\n    b\n)\nfrom t");
    }

    #[test]
    fn test_skip_indentation_in() {
        let mut skipping = config(2);
        skipping.skip_indentation_in = SyntaxSet::single(SyntaxKind::SelectClause);
        let (raw, results) = reindent("select\n1", &skipping);
        assert_eq!(raw, "select\n1");
        assert!(results.is_empty());
    }

    #[test]
    fn test_no_break_before_statement_terminator() {
        let sql = "select\n    a;\nselect b";
        let (raw, results) = reindent(sql, &config(4));
        assert_eq!(raw, sql);
        assert!(results.is_empty());
    }

    fn placeholder(source: &str, block_type: SliceType) -> Segment {
        Segment::placeholder(source, block_type, Some(BlockUuid(1)), None)
    }

    /// Builds:
    ///
    /// ```text
    /// select            -- balance 0
    ///     x             -- 2
    ///       {% if %}    -- 3, could also sit at 2
    ///       a           -- 3
    ///   {% endif %}     -- 1, could also sit at 2 or 3
    /// ```
    fn template_elements() -> Vec<ReflowElement> {
        let indent = || Segment::indent(SyntaxKind::Indent, None, None);
        let dedent = || Segment::indent(SyntaxKind::Dedent, None, None);
        let word = |raw: &str| Segment::token(SyntaxKind::NakedIdentifier, raw, None);
        let root = Segment::node(
            SyntaxKind::File,
            vec![
                Segment::token(SyntaxKind::Keyword, "select", None),
                indent(),
                indent(),
                Segment::newline(),
                word("x"),
                indent(),
                Segment::newline(),
                placeholder("{% if x %}", SliceType::BlockStart),
                Segment::newline(),
                word("a"),
                dedent(),
                dedent(),
                Segment::newline(),
                placeholder("{% endif %}", SliceType::BlockEnd),
                dedent(),
                Segment::newline(),
                Segment::end_of_file(None),
            ],
        );
        ReflowSequence::from_root(&root, &ReflowConfig::default())
            .unwrap()
            .elements()
            .to_vec()
    }

    #[test]
    fn test_template_block_takes_deepest_shared_balance() {
        let elements = template_elements();
        let mut lines = map_line_buffers(&elements, false);
        let balances: Vec<i32> = lines.iter().map(|l| l.initial_indent_balance).collect();
        assert_eq!(balances, vec![0, 2, 3, 3, 1]);
        assert!(lines[2].is_all_templates(&elements));
        assert!(lines[4].is_all_templates(&elements));

        revise_templated_lines(&mut lines, &elements);
        let balances: Vec<i32> = lines.iter().map(|l| l.initial_indent_balance).collect();
        assert_eq!(balances, vec![0, 2, 2, 3, 2]);
    }

    #[test]
    fn test_swallowed_line_break_keeps_its_indent() {
        let swallowed = Segment::placeholder("\n   ", SliceType::Literal, None, None);
        let root = Segment::node(
            SyntaxKind::File,
            vec![
                Segment::token(SyntaxKind::Keyword, "select", None),
                Segment::indent(SyntaxKind::Indent, None, None),
                swallowed.clone(),
                Segment::token(SyntaxKind::NumericLiteral, "1", None),
                Segment::indent(SyntaxKind::Dedent, None, None),
                Segment::end_of_file(None),
            ],
        );
        let seq = ReflowSequence::from_root(&root, &config(4)).unwrap();
        let point = seq.elements()[2].as_point().unwrap();
        assert_eq!(point.segments().len(), 2);
        assert!(has_untemplated_newline(point));
        assert!(point.get_indent_segment().unwrap().ptr_eq(&swallowed));
        assert_eq!(deduce_line_indent(seq.elements(), Some(2)), "   ");

        let reindented = seq.reindent().unwrap();
        let results = reindented.get_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].description, "Expected indent of 4 spaces.");
        assert!(results[0].fixes.is_empty());
        assert!(results[0].anchor.as_ref().unwrap().ptr_eq(&swallowed));
        assert_eq!(reindented.get_raw(), "select1");
    }

    #[test]
    fn test_comment_lines_revised() {
        let comment = || Segment::token(SyntaxKind::InlineComment, "-- c", None);
        let root = Segment::node(
            SyntaxKind::File,
            vec![
                Segment::token(SyntaxKind::Keyword, "select", None),
                Segment::indent(SyntaxKind::Indent, None, None),
                Segment::newline(),
                comment(),
                Segment::newline(),
                Segment::token(SyntaxKind::NumericLiteral, "1", None),
                Segment::indent(SyntaxKind::Dedent, None, None),
                Segment::newline(),
                comment(),
                Segment::newline(),
                Segment::end_of_file(None),
            ],
        );
        let seq = ReflowSequence::from_root(&root, &ReflowConfig::default()).unwrap();
        let mut lines = map_line_buffers(seq.elements(), false);
        lines[1].initial_indent_balance = 5;
        revise_comment_lines(&mut lines, seq.elements());
        let balances: Vec<i32> = lines.iter().map(|l| l.initial_indent_balance).collect();
        assert_eq!(balances, vec![0, 1, 1, 0]);
    }
}
