//! Where each raw segment sits in the tree
//!
//! Reflow works on a flat list, so every block carries a snapshot of the
//! ancestors above it: how deep it is, which nodes enclose it, what types
//! those nodes have and whether the segment opens or closes each of them.

use crate::sql::segments::{Segment, SyntaxSet};
use rustc_hash::FxHashMap;

/// Position of a segment among the code children of one ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPositionType {
    /// The only code child.
    Solo,
    /// The first code child.
    Start,
    /// The last code child.
    End,
    Mid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackPosition {
    /// Index of the child holding the segment within the ancestor.
    pub idx: usize,
    /// Number of children of the ancestor.
    pub len: usize,
    pub position_type: StackPositionType,
}

impl StackPosition {
    fn from_path_step(parent: &Segment, idx: usize) -> Self {
        let code_idxs: Vec<usize> = parent
            .segments()
            .iter()
            .enumerate()
            .filter(|(_, seg)| seg.is_code())
            .map(|(i, _)| i)
            .collect();
        let first = code_idxs.first().copied();
        let last = code_idxs.last().copied();
        let position_type = if first == Some(idx) && last == Some(idx) {
            StackPositionType::Solo
        } else if first == Some(idx) {
            StackPositionType::Start
        } else if last == Some(idx) {
            StackPositionType::End
        } else {
            StackPositionType::Mid
        };
        Self {
            idx,
            len: parent.segments().len(),
            position_type,
        }
    }
}

/// Ancestry of one raw segment, outermost ancestor first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthInfo {
    pub stack_depth: usize,
    pub stack_hashes: Vec<usize>,
    pub stack_class_types: Vec<SyntaxSet>,
    pub stack_positions: Vec<StackPosition>,
}

impl DepthInfo {
    /// True when any enclosing segment has one of `kinds`.
    pub fn is_within(&self, kinds: &SyntaxSet) -> bool {
        self.stack_class_types.iter().any(|types| types.intersects(kinds))
    }

    /// Number of leading ancestors shared with `other`.
    pub fn common_depth(&self, other: &DepthInfo) -> usize {
        self.stack_hashes
            .iter()
            .zip(&other.stack_hashes)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// The same ancestry with the innermost `amount` ancestors dropped.
    pub fn trim(&self, amount: usize) -> DepthInfo {
        let keep = self.stack_hashes.len().saturating_sub(amount);
        DepthInfo {
            stack_depth: self.stack_depth.saturating_sub(amount),
            stack_hashes: self.stack_hashes[..keep].to_vec(),
            stack_class_types: self.stack_class_types[..keep].to_vec(),
            stack_positions: self.stack_positions[..keep].to_vec(),
        }
    }
}

/// [`DepthInfo`] for every raw segment under a root, keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct DepthMap {
    depth_info: FxHashMap<usize, DepthInfo>,
}

impl DepthMap {
    pub fn from_parent(root: &Segment) -> Self {
        let mut map = Self::default();
        let mut stack = DepthInfo::default();
        map.collect(root, &mut stack);
        map
    }

    fn collect(&mut self, segment: &Segment, stack: &mut DepthInfo) {
        if segment.is_raw() {
            self.depth_info.insert(segment.id(), stack.clone());
            return;
        }
        for (idx, child) in segment.segments().iter().enumerate() {
            stack.stack_depth += 1;
            stack.stack_hashes.push(segment.id());
            stack.stack_class_types.push(segment.class_types());
            stack
                .stack_positions
                .push(StackPosition::from_path_step(segment, idx));

            self.collect(child, stack);

            stack.stack_depth -= 1;
            stack.stack_hashes.pop();
            stack.stack_class_types.pop();
            stack.stack_positions.pop();
        }
    }

    pub fn get_depth_info(&self, segment: &Segment) -> Option<&DepthInfo> {
        self.depth_info.get(&segment.id())
    }

    /// Register `new_segment` as sitting where `anchor` does, less the
    /// innermost `trim` ancestors. Used for segments an edit is about to
    /// insert, which the map has never seen.
    pub fn copy_depth_info(
        &mut self,
        anchor: &Segment,
        new_segment: &Segment,
        trim: usize,
    ) -> bool {
        let Some(info) = self.get_depth_info(anchor).map(|info| info.trim(trim)) else {
            return false;
        };
        self.depth_info.insert(new_segment.id(), info);
        true
    }

    pub fn len(&self) -> usize {
        self.depth_info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth_info.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::segments::SyntaxKind;

    fn tree() -> Segment {
        let element = Segment::node(
            SyntaxKind::SelectClauseElement,
            vec![Segment::token(SyntaxKind::NumericLiteral, "1", None)],
        );
        Segment::node(
            SyntaxKind::SelectClause,
            vec![
                Segment::token(SyntaxKind::Keyword, "select", None),
                Segment::whitespace(" "),
                element,
            ],
        )
    }

    #[test]
    fn test_depth_and_types() {
        let root = tree();
        let map = DepthMap::from_parent(&root);
        assert_eq!(map.len(), 3);

        let keyword = &root.segments()[0];
        let literal = &root.segments()[2].segments()[0];
        let keyword_info = map.get_depth_info(keyword).unwrap();
        let literal_info = map.get_depth_info(literal).unwrap();

        assert_eq!(keyword_info.stack_depth, 1);
        assert_eq!(literal_info.stack_depth, 2);
        assert!(literal_info.is_within(&SyntaxSet::single(SyntaxKind::SelectClauseElement)));
        assert!(!keyword_info.is_within(&SyntaxSet::single(SyntaxKind::SelectClauseElement)));
        assert_eq!(keyword_info.common_depth(literal_info), 1);
    }

    #[test]
    fn test_stack_positions() {
        let root = tree();
        let map = DepthMap::from_parent(&root);
        let keyword = map.get_depth_info(&root.segments()[0]).unwrap();
        let whitespace = map.get_depth_info(&root.segments()[1]).unwrap();
        let literal = map.get_depth_info(&root.segments()[2].segments()[0]).unwrap();

        assert_eq!(keyword.stack_positions[0].position_type, StackPositionType::Start);
        assert_eq!(whitespace.stack_positions[0].position_type, StackPositionType::Mid);
        assert_eq!(literal.stack_positions[0].position_type, StackPositionType::End);
        assert_eq!(literal.stack_positions[1].position_type, StackPositionType::Solo);
        assert_eq!(literal.stack_positions[0].len, 3);
    }

    #[test]
    fn test_copy_depth_info_with_trim() {
        let root = tree();
        let mut map = DepthMap::from_parent(&root);
        let literal = &root.segments()[2].segments()[0];
        let fresh = Segment::token(SyntaxKind::NumericLiteral, "2", None);

        assert!(map.copy_depth_info(literal, &fresh, 1));
        let copied = map.get_depth_info(&fresh).unwrap();
        assert_eq!(copied.stack_depth, 1);
        assert_eq!(copied.stack_hashes, vec![root.id()]);
        assert!(!copied.is_within(&SyntaxSet::single(SyntaxKind::SelectClauseElement)));

        let stranger = Segment::token(SyntaxKind::Keyword, "from", None);
        assert!(!map.copy_depth_info(&stranger, &fresh, 0));
    }
}
