//! Mapping between a templated file and the source it was rendered from
//!
//! A [`TemplatedFile`] keeps both views of a file plus the slice maps that
//! relate them: `sliced_file` pairs every region of the templated text with the
//! source region that produced it, `raw_sliced` describes the source as a run
//! of literal text, template expressions, comments and block tags.
//!
//! Untemplated input gets the identity mapping from [`TemplatedFile::from_string`].

use crate::sql::errors::TemplateError;
use std::fmt;
use std::ops::Range;

/// How a region of the source relates to the templated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceType {
    Literal,
    Templated,
    Comment,
    BlockStart,
    BlockMid,
    BlockEnd,
}

impl SliceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceType::Literal => "literal",
            SliceType::Templated => "templated",
            SliceType::Comment => "comment",
            SliceType::BlockStart => "block_start",
            SliceType::BlockMid => "block_mid",
            SliceType::BlockEnd => "block_end",
        }
    }

    /// Slice types that exist only in the source and render to nothing.
    pub fn is_source_only(&self) -> bool {
        matches!(
            self,
            SliceType::Comment | SliceType::BlockStart | SliceType::BlockMid | SliceType::BlockEnd
        )
    }
}

impl fmt::Display for SliceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the template block (e.g. one loop) a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockUuid(pub u32);

/// A slice of the raw source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFileSlice {
    pub raw: String,
    pub slice_type: SliceType,
    pub source_idx: usize,
    /// Index of the enclosing block, counted through the file.
    pub block_idx: usize,
    pub block_uuid: Option<BlockUuid>,
}

impl RawFileSlice {
    pub fn new(raw: impl Into<String>, slice_type: SliceType, source_idx: usize) -> Self {
        Self {
            raw: raw.into(),
            slice_type,
            source_idx,
            block_idx: 0,
            block_uuid: None,
        }
    }

    pub fn with_block(mut self, block_idx: usize, block_uuid: Option<BlockUuid>) -> Self {
        self.block_idx = block_idx;
        self.block_uuid = block_uuid;
        self
    }

    pub fn end_source_idx(&self) -> usize {
        self.source_idx + self.raw.len()
    }

    pub fn source_slice(&self) -> Range<usize> {
        self.source_idx..self.end_source_idx()
    }
}

/// A region of the templated file and the source region it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatedFileSlice {
    pub slice_type: SliceType,
    pub source_slice: Range<usize>,
    pub templated_slice: Range<usize>,
}

impl TemplatedFileSlice {
    pub fn new(
        slice_type: SliceType,
        source_slice: Range<usize>,
        templated_slice: Range<usize>,
    ) -> Self {
        Self {
            slice_type,
            source_slice,
            templated_slice,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplatedFile {
    pub source_str: String,
    pub templated_str: String,
    pub fname: String,
    pub sliced_file: Vec<TemplatedFileSlice>,
    pub raw_sliced: Vec<RawFileSlice>,
    source_newlines: Vec<usize>,
    templated_newlines: Vec<usize>,
}

impl TemplatedFile {
    /// An untemplated file: source and templated views are identical.
    pub fn from_string(source: impl Into<String>) -> Self {
        let source = source.into();
        let len = source.len();
        Self::build(
            source.clone(),
            source.clone(),
            "<string>".to_string(),
            vec![TemplatedFileSlice::new(SliceType::Literal, 0..len, 0..len)],
            vec![RawFileSlice::new(source, SliceType::Literal, 0)],
        )
    }

    /// A templated file with explicit slice maps.
    ///
    /// Empty maps are only allowed when the templated text equals the source,
    /// in which case the identity mapping is filled in.
    pub fn new(
        source: impl Into<String>,
        templated: impl Into<String>,
        fname: impl Into<String>,
        sliced_file: Vec<TemplatedFileSlice>,
        raw_sliced: Vec<RawFileSlice>,
    ) -> Result<Self, TemplateError> {
        let source = source.into();
        let templated = templated.into();
        let fname = fname.into();
        if sliced_file.is_empty() {
            if templated != source {
                return Err(TemplateError::Unsliced { fname });
            }
            let mut file = Self::from_string(source);
            file.fname = fname;
            return Ok(file);
        }
        let raw_sliced = if raw_sliced.is_empty() {
            vec![RawFileSlice::new(source.clone(), SliceType::Literal, 0)]
        } else {
            raw_sliced
        };
        Ok(Self::build(source, templated, fname, sliced_file, raw_sliced))
    }

    fn build(
        source_str: String,
        templated_str: String,
        fname: String,
        sliced_file: Vec<TemplatedFileSlice>,
        raw_sliced: Vec<RawFileSlice>,
    ) -> Self {
        let source_newlines = newline_indices(&source_str);
        let templated_newlines = newline_indices(&templated_str);
        Self {
            source_str,
            templated_str,
            fname,
            sliced_file,
            raw_sliced,
            source_newlines,
            templated_newlines,
        }
    }

    pub fn is_templated(&self) -> bool {
        self.raw_sliced
            .iter()
            .any(|slice| slice.slice_type != SliceType::Literal)
    }

    /// 1-indexed line number and line position of a byte offset.
    ///
    /// A newline character belongs to the line it terminates.
    pub fn get_line_pos_of_char_pos(&self, char_pos: usize, source: bool) -> (usize, usize) {
        let newlines = if source {
            &self.source_newlines
        } else {
            &self.templated_newlines
        };
        let preceding = newlines.partition_point(|&nl| nl < char_pos);
        if preceding == 0 {
            (1, char_pos + 1)
        } else {
            (preceding + 1, char_pos - newlines[preceding - 1])
        }
    }

    /// Indices into `sliced_file` of the slices touching a templated position.
    ///
    /// The second value is exclusive so the pair can be used as a range.
    fn find_slice_indices_of_templated_pos(
        &self,
        templated_pos: usize,
        start_idx: usize,
        inclusive: bool,
    ) -> Result<(usize, usize), TemplateError> {
        let mut first_idx = None;
        let mut last_idx = start_idx;
        let mut exhausted = true;
        for (idx, elem) in self.sliced_file.iter().enumerate().skip(start_idx) {
            last_idx = idx;
            if elem.templated_slice.end >= templated_pos {
                if first_idx.is_none() {
                    first_idx = Some(idx);
                }
                if elem.templated_slice.start > templated_pos
                    || (!inclusive && elem.templated_slice.start >= templated_pos)
                {
                    exhausted = false;
                    break;
                }
            }
        }
        if exhausted {
            last_idx += 1;
        }
        let first_idx = first_idx.ok_or(TemplateError::PositionNotFound {
            position: templated_pos,
        })?;
        Ok((first_idx, last_idx))
    }

    /// The raw slices which overlap a region of the source.
    pub fn raw_slices_spanning_source_slice(&self, source_slice: &Range<usize>) -> &[RawFileSlice] {
        if self.raw_sliced.is_empty() {
            return &[];
        }
        let mut raw_slice_idx = 0;
        while raw_slice_idx + 1 < self.raw_sliced.len()
            && self.raw_sliced[raw_slice_idx + 1].source_idx <= source_slice.start
        {
            raw_slice_idx += 1;
        }
        let mut slice_span = 1;
        while raw_slice_idx + slice_span < self.raw_sliced.len()
            && self.raw_sliced[raw_slice_idx + slice_span].source_idx < source_slice.end
        {
            slice_span += 1;
        }
        &self.raw_sliced[raw_slice_idx..raw_slice_idx + slice_span]
    }

    /// Convert a region of the templated file to the source region behind it.
    ///
    /// Literal regions map with exact offsets. Regions inside templated
    /// sections widen to the whole section.
    pub fn templated_slice_to_source_slice(
        &self,
        template_slice: &Range<usize>,
    ) -> Result<Range<usize>, TemplateError> {
        if self.sliced_file.is_empty() {
            return Ok(template_slice.clone());
        }

        let (ts_start_sf_start, ts_start_sf_stop) =
            self.find_slice_indices_of_templated_pos(template_slice.start, 0, true)?;
        let start_subsliced = &self.sliced_file[ts_start_sf_start..ts_start_sf_stop];

        // Lowest source position of any slice edge sitting exactly on our start
        let insertion_point = start_subsliced
            .iter()
            .flat_map(|elem| {
                [
                    (elem.templated_slice.start, elem.source_slice.start),
                    (elem.templated_slice.end, elem.source_slice.end),
                ]
            })
            .filter(|(templated, _)| *templated == template_slice.start)
            .map(|(_, source)| source)
            .min();

        if template_slice.start == template_slice.end {
            if let Some(point) = insertion_point {
                return Ok(point..point);
            }
            let first = start_subsliced.first().ok_or(TemplateError::PositionNotFound {
                position: template_slice.start,
            })?;
            if first.slice_type == SliceType::Literal {
                let offset = template_slice.start - first.templated_slice.start;
                let point = first.source_slice.start + offset;
                return Ok(point..point);
            }
            return Err(TemplateError::InsideTemplatedSection {
                position: template_slice.start,
            });
        }

        let (ts_stop_sf_start, ts_stop_sf_stop) =
            self.find_slice_indices_of_templated_pos(template_slice.end, 0, false)?;

        let mut ts_start_sf_start = ts_start_sf_start;
        if let Some(point) = insertion_point {
            for elem in &self.sliced_file[ts_start_sf_start..] {
                if elem.source_slice.start != point {
                    ts_start_sf_start += 1;
                } else {
                    break;
                }
            }
        }

        let clamp = |idx: usize| idx.min(self.sliced_file.len().saturating_sub(1));
        let n_slices = self.sliced_file.len();
        let subslices = &self.sliced_file[ts_start_sf_start.min(ts_stop_sf_start).min(n_slices)
            ..ts_start_sf_stop.max(ts_stop_sf_stop).min(n_slices)];
        let start_slices = if ts_start_sf_start >= ts_start_sf_stop {
            &self.sliced_file[clamp(ts_start_sf_start)..=clamp(ts_start_sf_start)]
        } else {
            &self.sliced_file[ts_start_sf_start..ts_start_sf_stop]
        };
        let stop_slices = if ts_stop_sf_start >= ts_stop_sf_stop {
            &self.sliced_file[clamp(ts_stop_sf_start)..=clamp(ts_stop_sf_start)]
        } else {
            &self.sliced_file[ts_stop_sf_start..ts_stop_sf_stop]
        };

        let not_found = TemplateError::PositionNotFound {
            position: template_slice.start,
        };
        let first_start = start_slices.first().ok_or_else(|| not_found.clone())?;
        let last_stop = stop_slices.last().ok_or(not_found)?;

        let mut source_start = match insertion_point {
            Some(point) => point,
            None if first_start.slice_type == SliceType::Literal => {
                let offset = template_slice.start - first_start.templated_slice.start;
                first_start.source_slice.start + offset
            }
            None => first_start.source_slice.start,
        };
        let mut source_stop = if last_stop.slice_type == SliceType::Literal {
            let offset = last_stop.templated_slice.end.saturating_sub(template_slice.end);
            last_stop.source_slice.end.saturating_sub(offset)
        } else {
            last_stop.source_slice.end
        };

        // Loops and mixed slices can make the span run backward; widen instead
        if source_start > source_stop {
            source_start = subslices
                .iter()
                .map(|elem| elem.source_slice.start)
                .min()
                .unwrap_or(source_start);
            source_stop = subslices
                .iter()
                .map(|elem| elem.source_slice.end)
                .max()
                .unwrap_or(source_stop);
        }

        Ok(source_start..source_stop)
    }

    /// True when every raw slice touched by the region is literal text.
    /// Zero-length regions are always literal.
    pub fn is_source_slice_literal(&self, source_slice: &Range<usize>) -> bool {
        if self.raw_sliced.is_empty() || source_slice.start == source_slice.end {
            return true;
        }
        let mut is_literal = true;
        for raw_slice in &self.raw_sliced {
            if raw_slice.source_idx <= source_slice.start {
                is_literal = raw_slice.slice_type == SliceType::Literal;
            } else if raw_slice.source_idx >= source_slice.end {
                break;
            } else if raw_slice.slice_type != SliceType::Literal {
                is_literal = false;
            }
        }
        is_literal
    }

    /// Raw slices that exist only in the source (comments and block tags),
    /// in source order.
    pub fn source_only_slices(&self) -> Vec<&RawFileSlice> {
        self.raw_sliced
            .iter()
            .filter(|slice| slice.slice_type.is_source_only())
            .collect()
    }

    /// The raw slice starting at a source offset, if any.
    pub fn raw_slice_at(&self, source_idx: usize) -> Option<&RawFileSlice> {
        self.raw_sliced
            .iter()
            .find(|slice| slice.source_idx == source_idx)
    }
}

impl fmt::Display for TemplatedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.templated_str)
    }
}

fn newline_indices(text: &str) -> Vec<usize> {
    text.match_indices('\n').map(|(idx, _)| idx).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// `SELECT {{blah}}, boo {# comment #} FROM tbl` rendered with blah=foo.
    fn simple_templated() -> TemplatedFile {
        let source = "SELECT {{blah}}, boo {# comment #} FROM tbl";
        let templated = "SELECT foo, boo  FROM tbl";
        TemplatedFile::new(
            source,
            templated,
            "test.sql",
            vec![
                TemplatedFileSlice::new(SliceType::Literal, 0..7, 0..7),
                TemplatedFileSlice::new(SliceType::Templated, 7..15, 7..10),
                TemplatedFileSlice::new(SliceType::Literal, 15..21, 10..16),
                TemplatedFileSlice::new(SliceType::Comment, 21..34, 16..16),
                TemplatedFileSlice::new(SliceType::Literal, 34..43, 16..25),
            ],
            vec![
                RawFileSlice::new("SELECT ", SliceType::Literal, 0),
                RawFileSlice::new("{{blah}}", SliceType::Templated, 7),
                RawFileSlice::new(", boo ", SliceType::Literal, 15),
                RawFileSlice::new("{# comment #}", SliceType::Comment, 21),
                RawFileSlice::new(" FROM tbl", SliceType::Literal, 34),
            ],
        )
        .expect("valid templated file")
    }

    #[test]
    fn test_unsliced_templated_file_is_rejected() {
        let err = TemplatedFile::new("a {{b}}", "a c", "x.sql", vec![], vec![]).unwrap_err();
        assert_eq!(err, TemplateError::Unsliced { fname: "x.sql".into() });
    }

    #[test]
    fn test_identity_file_without_slices() {
        let file = TemplatedFile::new("select 1", "select 1", "x.sql", vec![], vec![]).unwrap();
        assert!(!file.is_templated());
        assert_eq!(file.sliced_file.len(), 1);
        assert_eq!(file.fname, "x.sql");
    }

    #[rstest]
    #[case(0, (1, 1))]
    #[case(3, (1, 4))]
    #[case(6, (1, 7))]
    #[case(7, (2, 1))]
    #[case(10, (2, 4))]
    #[case(11, (3, 1))]
    fn test_line_pos_of_char_pos(#[case] pos: usize, #[case] expected: (usize, usize)) {
        let file = TemplatedFile::from_string("select\nfoo\nbar");
        assert_eq!(file.get_line_pos_of_char_pos(pos, true), expected);
    }

    #[rstest]
    #[case(0..7, 0..7)]
    #[case(7..10, 7..15)]
    #[case(8..9, 7..15)]
    #[case(10..11, 15..16)]
    #[case(16..16, 21..21)]
    #[case(17..21, 35..39)]
    #[case(11..11, 16..16)]
    fn test_templated_slice_to_source_slice(
        #[case] templated: Range<usize>,
        #[case] expected: Range<usize>,
    ) {
        let file = simple_templated();
        assert_eq!(file.templated_slice_to_source_slice(&templated).unwrap(), expected);
    }

    #[test]
    fn test_zero_length_inside_templated_section() {
        let file = simple_templated();
        assert_eq!(
            file.templated_slice_to_source_slice(&(8..8)),
            Err(TemplateError::InsideTemplatedSection { position: 8 })
        );
    }

    #[rstest]
    #[case(0..7, true)]
    #[case(7..15, false)]
    #[case(5..9, false)]
    #[case(15..21, true)]
    #[case(21..34, false)]
    #[case(21..21, true)]
    fn test_is_source_slice_literal(#[case] slice: Range<usize>, #[case] expected: bool) {
        assert_eq!(simple_templated().is_source_slice_literal(&slice), expected);
    }

    #[test]
    fn test_raw_slices_spanning_source_slice() {
        let file = simple_templated();
        let spanning = file.raw_slices_spanning_source_slice(&(5..16));
        let raws: Vec<&str> = spanning.iter().map(|s| s.raw.as_str()).collect();
        assert_eq!(raws, vec!["SELECT ", "{{blah}}", ", boo "]);
    }

    #[test]
    fn test_source_only_slices() {
        let file = simple_templated();
        let only: Vec<&str> = file.source_only_slices().iter().map(|s| s.raw.as_str()).collect();
        assert_eq!(only, vec!["{# comment #}"]);
    }
}
