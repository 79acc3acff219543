//! Position markers linking segments back to their files
//!
//! Every segment records where it sits in the templated file (what the parser
//! saw) and in the source file (what the user wrote). Both are byte ranges,
//! plus a "working" line/position that tracks where the segment is in the
//! current, possibly edited, view of the file.

use crate::sql::templated::TemplatedFile;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

#[derive(Clone)]
pub struct PositionMarker {
    pub source_slice: Range<usize>,
    pub templated_slice: Range<usize>,
    pub templated_file: Rc<TemplatedFile>,
    pub working_line_no: usize,
    pub working_line_pos: usize,
}

impl PositionMarker {
    /// Build a marker. Without an explicit working location the templated
    /// position is used.
    pub fn new(
        source_slice: Range<usize>,
        templated_slice: Range<usize>,
        templated_file: Rc<TemplatedFile>,
        working_loc: Option<(usize, usize)>,
    ) -> Self {
        let (working_line_no, working_line_pos) = working_loc.unwrap_or_else(|| {
            templated_file.get_line_pos_of_char_pos(templated_slice.start, false)
        });
        Self {
            source_slice,
            templated_slice,
            templated_file,
            working_line_no,
            working_line_pos,
        }
    }

    /// A zero-length marker.
    pub fn from_point(
        source_point: usize,
        templated_point: usize,
        templated_file: Rc<TemplatedFile>,
        working_loc: Option<(usize, usize)>,
    ) -> Self {
        Self::new(
            source_point..source_point,
            templated_point..templated_point,
            templated_file,
            working_loc,
        )
    }

    /// The marker spanning a set of child markers, or `None` without any.
    pub fn from_child_markers<'a, I>(markers: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a PositionMarker>,
    {
        let mut iter = markers.into_iter();
        let first = iter.next()?;
        let mut source = first.source_slice.clone();
        let mut templated = first.templated_slice.clone();
        let mut working = first.working_loc();
        for marker in iter {
            source.start = source.start.min(marker.source_slice.start);
            source.end = source.end.max(marker.source_slice.end);
            templated.start = templated.start.min(marker.templated_slice.start);
            templated.end = templated.end.max(marker.templated_slice.end);
            working = working.min(marker.working_loc());
        }
        Some(Self::new(
            source,
            templated,
            first.templated_file.clone(),
            Some(working),
        ))
    }

    /// 1-indexed (line, position) of the start in the source file.
    pub fn source_position(&self) -> (usize, usize) {
        self.templated_file
            .get_line_pos_of_char_pos(self.source_slice.start, true)
    }

    /// 1-indexed (line, position) of the start in the templated file.
    pub fn templated_position(&self) -> (usize, usize) {
        self.templated_file
            .get_line_pos_of_char_pos(self.templated_slice.start, false)
    }

    pub fn working_loc(&self) -> (usize, usize) {
        (self.working_line_no, self.working_line_pos)
    }

    /// The working location just after `raw`, starting from this marker.
    pub fn working_loc_after(&self, raw: &str) -> (usize, usize) {
        Self::infer_next_position(raw, self.working_line_no, self.working_line_pos)
    }

    pub fn line_no(&self) -> usize {
        self.source_position().0
    }

    pub fn line_pos(&self) -> usize {
        self.source_position().1
    }

    pub fn start_point_marker(&self) -> Self {
        Self::from_point(
            self.source_slice.start,
            self.templated_slice.start,
            self.templated_file.clone(),
            Some(self.working_loc()),
        )
    }

    pub fn end_point_marker(&self) -> Self {
        Self::from_point(
            self.source_slice.end,
            self.templated_slice.end,
            self.templated_file.clone(),
            None,
        )
    }

    pub fn is_point(&self) -> bool {
        self.source_slice.is_empty() && self.templated_slice.is_empty()
    }

    /// Line and position after reading `raw` from `(line_no, line_pos)`.
    pub fn infer_next_position(raw: &str, line_no: usize, line_pos: usize) -> (usize, usize) {
        if raw.is_empty() {
            return (line_no, line_pos);
        }
        let newlines = raw.matches('\n').count();
        if newlines == 0 {
            (line_no, line_pos + raw.len())
        } else {
            let tail = raw.rsplit('\n').next().unwrap_or_default();
            (line_no + newlines, tail.len() + 1)
        }
    }

    /// A point marker `raw.len()` bytes further on in both files.
    pub fn advance_by(&self, raw: &str) -> Self {
        let source = self.source_slice.start + raw.len();
        let templated = self.templated_slice.start + raw.len();
        Self::from_point(
            source,
            templated,
            self.templated_file.clone(),
            Some(self.working_loc_after(raw)),
        )
    }

    /// True unless the marked source region is (partly) template code.
    pub fn is_literal(&self) -> bool {
        self.templated_file
            .is_source_slice_literal(&self.source_slice)
    }

    pub fn source_str(&self) -> &str {
        self.templated_file
            .source_str
            .get(self.source_slice.clone())
            .unwrap_or_default()
    }

    pub fn templated_str(&self) -> &str {
        self.templated_file
            .templated_str
            .get(self.templated_slice.clone())
            .unwrap_or_default()
    }

    /// Whether `next` starts exactly where this marker ends in the templated file.
    pub fn is_contiguous_with(&self, next: &PositionMarker) -> bool {
        self.templated_slice.end == next.templated_slice.start
    }

    pub fn to_source_string(&self) -> String {
        let (line_no, line_pos) = self.source_position();
        format!("[L:{:3}, P:{:3}]", line_no, line_pos)
    }
}

impl fmt::Display for PositionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source_string())
    }
}

impl fmt::Debug for PositionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PositionMarker")
            .field("source_slice", &self.source_slice)
            .field("templated_slice", &self.templated_slice)
            .field("working_loc", &self.working_loc())
            .finish()
    }
}

impl PartialEq for PositionMarker {
    fn eq(&self, other: &Self) -> bool {
        self.source_slice == other.source_slice
            && self.templated_slice == other.templated_slice
            && self.working_loc() == other.working_loc()
    }
}

impl PartialOrd for PositionMarker {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.working_loc().cmp(&other.working_loc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn file(text: &str) -> Rc<TemplatedFile> {
        Rc::new(TemplatedFile::from_string(text))
    }

    #[rstest]
    #[case("", (1, 1), (1, 1))]
    #[case("foo", (1, 1), (1, 4))]
    #[case("foo\nbar", (1, 1), (2, 4))]
    #[case("\n", (3, 7), (4, 1))]
    #[case("a\n\nbc", (2, 2), (4, 3))]
    fn test_infer_next_position(
        #[case] raw: &str,
        #[case] start: (usize, usize),
        #[case] end: (usize, usize),
    ) {
        assert_eq!(PositionMarker::infer_next_position(raw, start.0, start.1), end);
    }

    #[test]
    fn test_working_loc_defaults_to_templated_position() {
        let marker = PositionMarker::new(7..10, 7..10, file("select\nfoo"), None);
        assert_eq!(marker.working_loc(), (2, 1));
        assert_eq!(marker.source_position(), (2, 1));
        assert_eq!(marker.source_str(), "foo");
        assert_eq!(marker.to_source_string(), "[L:  2, P:  1]");
    }

    #[test]
    fn test_advance_by_reaches_end_point() {
        let f = file("select\nfoo");
        let marker = PositionMarker::new(0..10, 0..10, f, None);
        let advanced = marker.start_point_marker().advance_by("select\nfoo");
        assert_eq!(advanced, marker.end_point_marker());
        assert!(advanced.is_point());
    }

    #[test]
    fn test_from_child_markers_spans_children() {
        let f = file("select 1");
        let a = PositionMarker::new(0..6, 0..6, f.clone(), None);
        let b = PositionMarker::new(7..8, 7..8, f, None);
        let parent = PositionMarker::from_child_markers([&b, &a]).expect("non-empty");
        assert_eq!(parent.source_slice, 0..8);
        assert_eq!(parent.templated_slice, 0..8);
        assert_eq!(parent.working_loc(), (1, 1));
        let next = PositionMarker::new(6..7, 6..7, parent.templated_file.clone(), None);
        assert!(a.is_contiguous_with(&next));
        assert!(PositionMarker::from_child_markers(std::iter::empty()).is_none());
    }
}
