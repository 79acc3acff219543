//! Edits against a syntax tree
//!
//! A [`LintFix`] names an anchor segment (by identity) and what to do around
//! it. [`apply_fixes`] realizes a batch of fixes as a new tree: only the path
//! from the root to each anchor is rebuilt, every other subtree is shared
//! with the original.

use super::Segment;
use crate::sql::markers::PositionMarker;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditType {
    Replace,
    CreateBefore,
    CreateAfter,
    Delete,
}

#[derive(Debug, Clone)]
pub struct LintFix {
    pub edit_type: EditType,
    pub anchor: Segment,
    pub edit: Vec<Segment>,
}

impl LintFix {
    pub fn replace(anchor: Segment, edit: Vec<Segment>) -> Self {
        Self {
            edit_type: EditType::Replace,
            anchor,
            edit,
        }
    }

    pub fn create_before(anchor: Segment, edit: Vec<Segment>) -> Self {
        Self {
            edit_type: EditType::CreateBefore,
            anchor,
            edit,
        }
    }

    pub fn create_after(anchor: Segment, edit: Vec<Segment>) -> Self {
        Self {
            edit_type: EditType::CreateAfter,
            anchor,
            edit,
        }
    }

    pub fn delete(anchor: Segment) -> Self {
        Self {
            edit_type: EditType::Delete,
            anchor,
            edit: Vec::new(),
        }
    }

    pub fn edit_raw(&self) -> String {
        self.edit.iter().map(Segment::raw).collect()
    }
}

/// The outcome of one check: where it applies, how to fix it and why.
#[derive(Debug, Clone)]
pub struct LintResult {
    pub anchor: Option<Segment>,
    pub fixes: Vec<LintFix>,
    pub description: String,
    /// The line the failing line was compared against, when there is one.
    pub reference_line: Option<usize>,
}

impl LintResult {
    pub fn new(
        anchor: Option<Segment>,
        fixes: Vec<LintFix>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            anchor,
            fixes,
            description: description.into(),
            reference_line: None,
        }
    }

    pub fn with_reference_line(mut self, line: Option<usize>) -> Self {
        self.reference_line = line;
        self
    }
}

/// Apply `fixes` to the tree under `root`, returning the new root.
pub fn apply_fixes(root: &Segment, fixes: &[LintFix]) -> Segment {
    if fixes.is_empty() {
        return root.clone();
    }
    let mut by_anchor: FxHashMap<usize, Vec<&LintFix>> = FxHashMap::default();
    for fix in fixes {
        by_anchor.entry(fix.anchor.id()).or_default().push(fix);
    }
    let mut rebuilt = rebuild(root, &by_anchor);
    if rebuilt.len() == 1 {
        rebuilt.remove(0)
    } else {
        root.with_children(rebuilt)
    }
}

fn rebuild(segment: &Segment, by_anchor: &FxHashMap<usize, Vec<&LintFix>>) -> Vec<Segment> {
    let node = if segment.is_raw() {
        segment.clone()
    } else {
        let mut changed = false;
        let mut children = Vec::with_capacity(segment.segments().len());
        for child in segment.segments() {
            let replacement = rebuild(child, by_anchor);
            if replacement.len() != 1 || !replacement[0].ptr_eq(child) {
                changed = true;
            }
            children.extend(replacement);
        }
        if changed {
            segment.with_children(children)
        } else {
            segment.clone()
        }
    };

    let Some(anchored) = by_anchor.get(&segment.id()) else {
        return vec![node];
    };

    let start = segment.position().map(PositionMarker::start_point_marker);
    let end = segment.position().map(PositionMarker::end_point_marker);

    let mut before = Vec::new();
    let mut middle = vec![node];
    let mut after = Vec::new();
    for fix in anchored {
        match fix.edit_type {
            EditType::CreateBefore => before.extend(positioned(&fix.edit, &start)),
            EditType::CreateAfter => after.extend(positioned(&fix.edit, &end)),
            EditType::Replace => middle = positioned(&fix.edit, &start),
            EditType::Delete => middle.clear(),
        }
    }
    before.extend(middle);
    before.extend(after);
    before
}

/// Give unpositioned inserted segments a point marker at `at`.
fn positioned(edit: &[Segment], at: &Option<PositionMarker>) -> Vec<Segment> {
    edit.iter()
        .map(|seg| {
            if seg.position().is_some() || at.is_none() {
                seg.clone()
            } else {
                seg.with_position(at.clone())
            }
        })
        .collect()
}
