//! Spacing between neighbouring blocks
//!
//! A point is respaced from the constraints of the blocks either side of it:
//! the previous block's `spacing_after`, the next block's `spacing_before` and
//! the `spacing_within` of their closest common parent. Line breaks are left
//! to reindent and rebreak; here they only decide whether trailing whitespace
//! has to go.

use super::config::{Spacing, SpacingRule};
use super::elements::ReflowBlock;
use crate::sql::segments::{EditType, LintFix, Segment, SyntaxKind};

/// Which block a freshly inserted space is anchored to when neither side is
/// an insertion already.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertAnchor {
    /// Created after the last segment of the previous block.
    #[default]
    Previous,
    /// Created before the first segment of the next block.
    Next,
}

/// Constraints either side of a point, and whether line breaks in it should
/// be removed.
pub fn determine_constraints(
    prev_block: Option<&ReflowBlock>,
    next_block: Option<&ReflowBlock>,
    strip_newlines: bool,
) -> (Spacing, Spacing, bool) {
    let pre_rule = prev_block.map_or(SpacingRule::SINGLE, |block| block.spacing_after);
    let post_rule = next_block.map_or(SpacingRule::SINGLE, |block| block.spacing_before);
    let mut strip_newlines = strip_newlines || pre_rule.inline || post_rule.inline;
    let (mut pre, mut post) = (pre_rule.spacing, post_rule.spacing);

    let within = match (prev_block, next_block) {
        (Some(prev), Some(next)) => {
            // Only the closest common parent is consulted.
            let common = prev.depth_info.common_depth(&next.depth_info);
            common
                .checked_sub(1)
                .and_then(|idx| prev.stack_spacing_configs.get(&prev.depth_info.stack_hashes[idx]))
                .copied()
        }
        _ => None,
    };
    if let Some(within) = within {
        strip_newlines |= within.inline;
        match within.spacing {
            Spacing::Touch => {
                if pre != Spacing::Any {
                    pre = Spacing::Touch;
                }
                if post != Spacing::Any {
                    post = Spacing::Touch;
                }
            }
            Spacing::Any => {
                pre = Spacing::Any;
                post = Spacing::Any;
            }
            Spacing::Single => {}
        }
    }
    (pre, post, strip_newlines)
}

/// Remove trailing and duplicate whitespace (and line breaks when
/// `strip_newlines`), returning what is left, the whitespace that now
/// separates the neighbours and the deletions.
pub fn process_spacing(
    segments: &[Segment],
    strip_newlines: bool,
) -> (Vec<Segment>, Option<Segment>, Vec<LintFix>) {
    let mut removed: Vec<Segment> = Vec::new();
    let mut last_whitespace: Vec<Segment> = Vec::new();

    for seg in segments {
        if seg.is_type(SyntaxKind::Whitespace) {
            last_whitespace.push(seg.clone());
        } else if seg.is_type(SyntaxKind::Newline) {
            if seg.position().is_some_and(|pos| !pos.is_literal()) {
                log::debug!(target: "sqlreflow::reflow", "skipping templated newline {:?}", seg);
                last_whitespace.clear();
                continue;
            }
            if strip_newlines {
                log::debug!(target: "sqlreflow::reflow", "stripping newline {:?}", seg);
                removed.push(seg.clone());
                continue;
            }
            if !last_whitespace.is_empty() {
                log::debug!(target: "sqlreflow::reflow", "stripping trailing whitespace");
                removed.append(&mut last_whitespace);
            }
        }
    }

    // Runs of whitespace are what's left after removals; the first is kept.
    if last_whitespace.len() >= 2 {
        log::debug!(target: "sqlreflow::reflow", "removing adjoining whitespace");
        removed.extend(last_whitespace.drain(1..));
    }

    let buffer = segments
        .iter()
        .filter(|seg| !removed.iter().any(|gone| gone.ptr_eq(seg)))
        .cloned()
        .collect();
    let fixes = removed.into_iter().map(LintFix::delete).collect();
    (buffer, last_whitespace.into_iter().next(), fixes)
}

/// Inline point that has whitespace: make it fit the constraints.
pub fn handle_respace_inline_with_space(
    pre_constraint: Spacing,
    post_constraint: Spacing,
    mut segment_buffer: Vec<Segment>,
    last_whitespace: &Segment,
) -> (Vec<Segment>, Vec<LintFix>) {
    if pre_constraint == Spacing::Any || post_constraint == Spacing::Any {
        return (segment_buffer, Vec::new());
    }
    let Some(ws_idx) = segment_buffer.iter().position(|seg| seg.ptr_eq(last_whitespace)) else {
        return (segment_buffer, Vec::new());
    };

    if pre_constraint == Spacing::Touch || post_constraint == Spacing::Touch {
        segment_buffer.remove(ws_idx);
        return (segment_buffer, vec![LintFix::delete(last_whitespace.clone())]);
    }

    if last_whitespace.raw() == " " {
        return (segment_buffer, Vec::new());
    }
    let single = last_whitespace.edit(" ");
    segment_buffer[ws_idx] = single.clone();
    (
        segment_buffer,
        vec![LintFix::replace(last_whitespace.clone(), vec![single])],
    )
}

/// Inline point with no whitespace: insert a single space when both sides
/// want one.
///
/// When a neighbour is itself being inserted by one of `fixes`, the space is
/// added to that fix instead of anchoring a new one on a segment that isn't
/// in the tree yet. Returns whether `fixes` changed.
pub fn handle_respace_inline_without_space(
    pre_constraint: Spacing,
    post_constraint: Spacing,
    prev_block: Option<&ReflowBlock>,
    next_block: Option<&ReflowBlock>,
    mut segment_buffer: Vec<Segment>,
    mut fixes: Vec<LintFix>,
    anchor: InsertAnchor,
) -> (Vec<Segment>, Vec<LintFix>, bool) {
    if pre_constraint != Spacing::Single || post_constraint != Spacing::Single {
        return (segment_buffer, fixes, false);
    }

    let added = Segment::whitespace(" ");

    let pending_edit = |target: &Segment| {
        fixes.iter().enumerate().find_map(|(fix_idx, fix)| {
            let in_edit = matches!(
                fix.edit_type,
                EditType::CreateBefore | EditType::CreateAfter | EditType::Replace
            );
            let pos = fix.edit.iter().position(|seg| seg.ptr_eq(target))?;
            in_edit.then_some((fix_idx, pos))
        })
    };
    let existing = prev_block
        .and_then(|prev| pending_edit(prev.segment()).map(|(fix_idx, pos)| (fix_idx, pos + 1)))
        .or_else(|| next_block.and_then(|next| pending_edit(next.segment())));
    if let Some((fix_idx, pos)) = existing {
        log::debug!(target: "sqlreflow::reflow", "adding space to pending insertion {}", fix_idx);
        fixes[fix_idx].edit.insert(pos, added.clone());
        segment_buffer.push(added);
        return (segment_buffer, fixes, true);
    }

    let fix = match (prev_block, next_block, anchor) {
        (Some(prev), _, InsertAnchor::Previous) | (Some(prev), None, InsertAnchor::Next) => {
            LintFix::create_after(prev.segment().clone(), vec![added.clone()])
        }
        (_, Some(next), _) => LintFix::create_before(next.segment().clone(), vec![added.clone()]),
        (None, None, _) => return (segment_buffer, fixes, false),
    };
    log::debug!(target: "sqlreflow::reflow", "inserting single space ({:?})", fix.edit_type);
    segment_buffer.push(added);
    fixes.push(fix);
    (segment_buffer, fixes, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::reflow::{DepthInfo, ReflowConfig};

    fn block(kind: SyntaxKind, raw: &str) -> ReflowBlock {
        ReflowBlock::from_config(
            Segment::token(kind, raw, None),
            &ReflowConfig::default(),
            DepthInfo::default(),
        )
    }

    #[test]
    fn test_constraints_from_neighbours() {
        let word = block(SyntaxKind::NakedIdentifier, "a");
        let comma = block(SyntaxKind::Comma, ",");
        let comment = block(SyntaxKind::InlineComment, "-- c");

        assert_eq!(
            determine_constraints(Some(&word), Some(&comma), false),
            (Spacing::Single, Spacing::Touch, false)
        );
        assert_eq!(
            determine_constraints(Some(&comma), Some(&comment), false),
            (Spacing::Single, Spacing::Any, false)
        );
        assert_eq!(
            determine_constraints(None, None, true),
            (Spacing::Single, Spacing::Single, true)
        );
    }

    #[test]
    fn test_process_spacing_strips_trailing_and_duplicates() {
        let trailing = Segment::whitespace("  ");
        let newline = Segment::newline();
        let indent = Segment::whitespace("    ");
        let point = [trailing.clone(), newline.clone(), indent.clone()];
        let (buffer, last, fixes) = process_spacing(&point, false);
        assert_eq!(buffer.len(), 2);
        assert!(last.unwrap().ptr_eq(&indent));
        assert_eq!(fixes.len(), 1);
        assert!(fixes[0].anchor.ptr_eq(&trailing));

        let (buffer, last, fixes) = process_spacing(&[trailing.clone(), newline, indent], true);
        assert_eq!(buffer.len(), 1);
        assert!(last.unwrap().ptr_eq(&trailing));
        assert_eq!(fixes.len(), 2);
        assert!(fixes.iter().all(|fix| fix.edit_type == EditType::Delete));
    }

    #[test]
    fn test_with_space_shrinks_or_removes() {
        let wide = Segment::whitespace("   ");
        let respace =
            |pre, post| handle_respace_inline_with_space(pre, post, vec![wide.clone()], &wide);

        let (buffer, fixes) = respace(Spacing::Single, Spacing::Single);
        assert_eq!(buffer[0].raw(), " ");
        assert_eq!(fixes[0].edit_type, EditType::Replace);

        let (buffer, fixes) = respace(Spacing::Single, Spacing::Touch);
        assert!(buffer.is_empty());
        assert_eq!(fixes[0].edit_type, EditType::Delete);

        let (buffer, fixes) = respace(Spacing::Any, Spacing::Touch);
        assert_eq!(buffer.len(), 1);
        assert!(fixes.is_empty());
    }

    #[test]
    fn test_without_space_joins_pending_insertion() {
        let prev = block(SyntaxKind::Keyword, "select");
        let next = block(SyntaxKind::NakedIdentifier, "a");

        let (buffer, fixes, edited) = handle_respace_inline_without_space(
            Spacing::Single,
            Spacing::Single,
            Some(&prev),
            Some(&next),
            Vec::new(),
            Vec::new(),
            InsertAnchor::Previous,
        );
        assert!(edited);
        assert_eq!(buffer.len(), 1);
        assert_eq!(fixes[0].edit_type, EditType::CreateAfter);
        assert!(fixes[0].anchor.ptr_eq(prev.segment()));

        let anchor = Segment::token(SyntaxKind::Keyword, "from", None);
        let pending = vec![LintFix::create_before(anchor, vec![next.segment().clone()])];
        let (_, fixes, edited) = handle_respace_inline_without_space(
            Spacing::Single,
            Spacing::Single,
            Some(&prev),
            Some(&next),
            Vec::new(),
            pending,
            InsertAnchor::Previous,
        );
        assert!(edited);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].edit_raw(), " a");

        let (_, fixes, edited) = handle_respace_inline_without_space(
            Spacing::Single,
            Spacing::Touch,
            Some(&prev),
            Some(&next),
            Vec::new(),
            Vec::new(),
            InsertAnchor::Next,
        );
        assert!(!edited);
        assert!(fixes.is_empty());
    }
}
