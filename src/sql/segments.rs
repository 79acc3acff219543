//! Syntax tree model
//!
//! A [`Segment`] is an immutable, reference-counted tree node. Raw segments
//! hold source text; composite segments hold children and their raw text is
//! the concatenation of their children's. Meta segments (indents, dedents,
//! template placeholders and the end-of-file marker) are raw segments with no
//! text that carry layout information for the reflow engine.
//!
//! Identity is pointer identity ([`Segment::ptr_eq`]); `==` compares structure.
//! Edits never mutate a tree, they build a new one that shares every
//! untouched subtree (see [`fix`]).

pub mod fix;
pub mod kind;

pub use fix::{apply_fixes, EditType, LintFix, LintResult};
pub use kind::{SyntaxKind, SyntaxSet, UnknownSyntaxKind};

use crate::sql::markers::PositionMarker;
use crate::sql::templated::{BlockUuid, SliceType};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

const NON_CODE: SyntaxSet = SyntaxSet::new(&[
    SyntaxKind::Whitespace,
    SyntaxKind::Newline,
    SyntaxKind::Comment,
    SyntaxKind::InlineComment,
    SyntaxKind::BlockComment,
]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Raw,
    Node,
    Unparsable {
        expected: String,
    },
    Indent {
        is_implicit: bool,
        block_uuid: Option<BlockUuid>,
    },
    Placeholder {
        source_str: String,
        block_type: SliceType,
        block_uuid: Option<BlockUuid>,
    },
    EndOfFile,
}

#[derive(Debug)]
pub struct SegmentData {
    kind: SyntaxKind,
    class_types: SyntaxSet,
    raw: String,
    position: Option<PositionMarker>,
    children: Vec<Segment>,
    payload: Payload,
    is_code: bool,
    is_comment: bool,
    is_whitespace: bool,
}

#[derive(Clone)]
pub struct Segment(Rc<SegmentData>);

impl Segment {
    fn from_data(data: SegmentData) -> Self {
        Segment(Rc::new(data))
    }

    /// A raw segment holding source text.
    pub fn token(
        kind: SyntaxKind,
        raw: impl Into<String>,
        position: Option<PositionMarker>,
    ) -> Self {
        let class_types = kind.class_types();
        Self::from_data(SegmentData {
            kind,
            class_types,
            raw: raw.into(),
            position,
            children: Vec::new(),
            payload: Payload::Raw,
            is_code: !class_types.intersects(&NON_CODE),
            is_comment: class_types.contains(SyntaxKind::Comment),
            is_whitespace: class_types.intersects(&SyntaxSet::new(&[
                SyntaxKind::Whitespace,
                SyntaxKind::Newline,
            ])),
        })
    }

    pub fn whitespace(raw: impl Into<String>) -> Self {
        Self::token(SyntaxKind::Whitespace, raw, None)
    }

    pub fn newline() -> Self {
        Self::token(SyntaxKind::Newline, "\n", None)
    }

    /// A composite segment. Its position spans the children's positions.
    pub fn node(kind: SyntaxKind, children: Vec<Segment>) -> Self {
        Self::composite(kind, children, Payload::Node)
    }

    pub fn unparsable(children: Vec<Segment>, expected: impl Into<String>) -> Self {
        Self::composite(
            SyntaxKind::Unparsable,
            children,
            Payload::Unparsable {
                expected: expected.into(),
            },
        )
    }

    fn composite(kind: SyntaxKind, children: Vec<Segment>, payload: Payload) -> Self {
        let raw: String = children.iter().map(|child| child.raw()).collect();
        let position =
            PositionMarker::from_child_markers(children.iter().filter_map(|c| c.position()));
        let is_code = children.iter().any(Segment::is_code);
        let is_comment = !children.is_empty() && children.iter().all(Segment::is_comment);
        let is_whitespace = !children.is_empty() && children.iter().all(Segment::is_whitespace);
        Self::from_data(SegmentData {
            kind,
            class_types: kind.class_types(),
            raw,
            position,
            children,
            payload,
            is_code,
            is_comment,
            is_whitespace,
        })
    }

    fn meta(kind: SyntaxKind, position: Option<PositionMarker>, payload: Payload) -> Self {
        Self::from_data(SegmentData {
            kind,
            class_types: kind.class_types(),
            raw: String::new(),
            position,
            children: Vec::new(),
            payload,
            is_code: false,
            is_comment: false,
            is_whitespace: false,
        })
    }

    /// An `indent`, `implicit_indent` or `dedent` meta.
    pub fn indent(
        kind: SyntaxKind,
        position: Option<PositionMarker>,
        block_uuid: Option<BlockUuid>,
    ) -> Self {
        Self::meta(
            kind,
            position,
            Payload::Indent {
                is_implicit: kind == SyntaxKind::ImplicitIndent,
                block_uuid,
            },
        )
    }

    /// A zero-width stand-in for source text that rendered to nothing.
    pub fn placeholder(
        source_str: impl Into<String>,
        block_type: SliceType,
        block_uuid: Option<BlockUuid>,
        position: Option<PositionMarker>,
    ) -> Self {
        Self::meta(
            SyntaxKind::Placeholder,
            position,
            Payload::Placeholder {
                source_str: source_str.into(),
                block_type,
                block_uuid,
            },
        )
    }

    pub fn end_of_file(position: Option<PositionMarker>) -> Self {
        Self::meta(SyntaxKind::EndOfFile, position, Payload::EndOfFile)
    }

    /// The same raw segment retyped as `kind`, keeping its previous classes.
    pub fn retyped(&self, kind: SyntaxKind) -> Self {
        let class_types = self.0.class_types.union(kind.class_types());
        Self::from_data(SegmentData {
            kind,
            class_types,
            raw: self.0.raw.clone(),
            position: self.0.position.clone(),
            children: self.0.children.clone(),
            payload: self.0.payload.clone(),
            is_code: self.0.is_code,
            is_comment: self.0.is_comment,
            is_whitespace: self.0.is_whitespace,
        })
    }

    /// A copy of a raw segment with new text and the same position.
    pub fn edit(&self, raw: impl Into<String>) -> Self {
        Self::from_data(SegmentData {
            kind: self.0.kind,
            class_types: self.0.class_types,
            raw: raw.into(),
            position: self.0.position.clone(),
            children: Vec::new(),
            payload: self.0.payload.clone(),
            is_code: self.0.is_code,
            is_comment: self.0.is_comment,
            is_whitespace: self.0.is_whitespace,
        })
    }

    /// A copy of a composite with different children, recomputing raw text,
    /// flags and position.
    pub fn with_children(&self, children: Vec<Segment>) -> Self {
        let rebuilt = Self::composite(self.0.kind, children, self.0.payload.clone());
        if rebuilt.0.position.is_some() || self.0.position.is_none() {
            return rebuilt;
        }
        rebuilt.with_position(self.0.position.clone())
    }

    pub fn with_position(&self, position: Option<PositionMarker>) -> Self {
        Self::from_data(SegmentData {
            kind: self.0.kind,
            class_types: self.0.class_types,
            raw: self.0.raw.clone(),
            position,
            children: self.0.children.clone(),
            payload: self.0.payload.clone(),
            is_code: self.0.is_code,
            is_comment: self.0.is_comment,
            is_whitespace: self.0.is_whitespace,
        })
    }

    pub fn kind(&self) -> SyntaxKind {
        self.0.kind
    }

    pub fn class_types(&self) -> SyntaxSet {
        self.0.class_types
    }

    pub fn is_type(&self, kind: SyntaxKind) -> bool {
        self.0.class_types.contains(kind)
    }

    pub fn is_any_type(&self, kinds: &SyntaxSet) -> bool {
        self.0.class_types.intersects(kinds)
    }

    pub fn raw(&self) -> &str {
        &self.0.raw
    }

    pub fn raw_upper(&self) -> String {
        self.0.raw.to_uppercase()
    }

    pub fn position(&self) -> Option<&PositionMarker> {
        self.0.position.as_ref()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0.children
    }

    pub fn payload(&self) -> &Payload {
        &self.0.payload
    }

    pub fn is_raw(&self) -> bool {
        !matches!(self.0.payload, Payload::Node | Payload::Unparsable { .. })
    }

    pub fn is_meta(&self) -> bool {
        self.0.kind.is_meta()
    }

    pub fn is_code(&self) -> bool {
        self.0.is_code
    }

    pub fn is_comment(&self) -> bool {
        self.0.is_comment
    }

    pub fn is_whitespace(&self) -> bool {
        self.0.is_whitespace
    }

    /// True when the segment's source region is template code rather than
    /// literal SQL text.
    pub fn is_templated(&self) -> bool {
        match &self.0.position {
            Some(pos) => pos.source_slice.start != pos.source_slice.end && !pos.is_literal(),
            None => false,
        }
    }

    pub fn indent_val(&self) -> i32 {
        match self.0.payload {
            Payload::Indent { .. } => self.0.kind.indent_val(),
            _ => 0,
        }
    }

    pub fn is_implicit_indent(&self) -> bool {
        matches!(self.0.payload, Payload::Indent { is_implicit: true, .. })
    }

    pub fn block_uuid(&self) -> Option<BlockUuid> {
        match &self.0.payload {
            Payload::Indent { block_uuid, .. } | Payload::Placeholder { block_uuid, .. } => {
                *block_uuid
            }
            _ => None,
        }
    }

    /// Placeholder details: the source text it stands for and its slice type.
    pub fn placeholder_source(&self) -> Option<(&str, SliceType)> {
        match &self.0.payload {
            Payload::Placeholder {
                source_str,
                block_type,
                ..
            } => Some((source_str.as_str(), *block_type)),
            _ => None,
        }
    }

    /// Whitespace swallowed by the templater, for literal placeholders.
    pub fn consumed_whitespace(&self) -> Option<&str> {
        match self.placeholder_source() {
            Some((source, SliceType::Literal)) => Some(source),
            _ => None,
        }
    }

    pub fn expected(&self) -> Option<&str> {
        match &self.0.payload {
            Payload::Unparsable { expected } => Some(expected),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Segment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address-based identity usable as a map key while the tree is alive.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Working location of the start, if positioned.
    pub fn get_start_loc(&self) -> Option<(usize, usize)> {
        self.position().map(PositionMarker::working_loc)
    }

    pub fn get_end_loc(&self) -> Option<(usize, usize)> {
        self.position().map(|pos| pos.working_loc_after(self.raw()))
    }

    /// Uppercased raw text of the first segment that isn't whitespace or meta.
    pub fn first_non_whitespace_raw_upper(&self) -> Option<String> {
        if self.is_raw() {
            let trimmed = self.0.raw.trim();
            return (!trimmed.is_empty()).then(|| self.0.raw.to_uppercase());
        }
        self.0
            .children
            .iter()
            .find_map(Segment::first_non_whitespace_raw_upper)
    }

    /// The chain of segments from `self` down to the parent of `target`,
    /// outermost first. Empty when `target` is `self` or not a descendant.
    pub fn path_to(&self, target: &Segment) -> Vec<Segment> {
        let mut path = Vec::new();
        if self.collect_path(target, &mut path) {
            path.reverse();
        }
        path
    }

    fn collect_path(&self, target: &Segment, path: &mut Vec<Segment>) -> bool {
        for child in &self.0.children {
            if child.ptr_eq(target) || child.collect_path(target, path) {
                path.push(self.clone());
                return true;
            }
        }
        false
    }

    /// All leaf segments (metas included) in order.
    pub fn raw_segments(&self) -> Vec<Segment> {
        let mut out = Vec::new();
        self.collect_raw_segments(&mut out);
        out
    }

    fn collect_raw_segments(&self, out: &mut Vec<Segment>) {
        if self.is_raw() {
            out.push(self.clone());
            return;
        }
        for child in &self.0.children {
            child.collect_raw_segments(out);
        }
    }

    /// Every segment (this one included) matching any of `kinds`, depth first.
    /// With `recurse_into` false, matching segments are not searched further.
    pub fn recursive_crawl(&self, kinds: &SyntaxSet, recurse_into: bool) -> Vec<Segment> {
        let mut out = Vec::new();
        self.crawl_into(kinds, recurse_into, &mut out);
        out
    }

    fn crawl_into(&self, kinds: &SyntaxSet, recurse_into: bool, out: &mut Vec<Segment>) {
        let matched = self.is_any_type(kinds);
        if matched {
            out.push(self.clone());
            if !recurse_into {
                return;
            }
        }
        for child in &self.0.children {
            child.crawl_into(kinds, recurse_into, out);
        }
    }

    pub fn iter_unparsables(&self) -> Vec<Segment> {
        self.recursive_crawl(&SyntaxSet::single(SyntaxKind::Unparsable), false)
    }

    /// Check that leaf positions run on without gaps through the templated
    /// file. Returns the first offending segment.
    pub fn validate_segment_positions(&self) -> Result<(), Segment> {
        let mut previous: Option<PositionMarker> = None;
        for segment in self.raw_segments() {
            let Some(position) = segment.position() else {
                continue;
            };
            if let Some(prev) = &previous {
                if !prev.is_contiguous_with(position) {
                    return Err(segment.clone());
                }
            }
            previous = Some(position.clone());
        }
        Ok(())
    }

    /// Indented dump of the tree, one segment per line.
    pub fn stringify(&self, code_only: bool) -> String {
        let mut buff = String::new();
        self.stringify_into(&mut buff, 0, code_only);
        buff
    }

    fn stringify_into(&self, buff: &mut String, depth: usize, code_only: bool) {
        let pos = self
            .position()
            .map(PositionMarker::to_source_string)
            .unwrap_or_else(|| "-".to_string());
        let modifier = if self.is_meta() { "[META] " } else { "" };
        let padded_type = format!("{}{}{}:", "    ".repeat(depth), modifier, self.kind());
        let suffix = if self.is_raw() && !self.is_meta() {
            format!("{:?}", self.raw())
        } else {
            String::new()
        };
        let line = format!("{:20}|{:60}  {}", pos, padded_type, suffix);
        buff.push_str(line.trim_end());
        buff.push('\n');
        for child in &self.0.children {
            if !code_only || child.is_code() {
                child.stringify_into(buff, depth + 1, code_only);
            }
        }
    }

    /// Serializable view of the tree for JSON/YAML output.
    pub fn to_record(&self) -> SegmentRecord {
        let (line_no, line_pos) = match self.position() {
            Some(pos) => {
                let (l, p) = pos.source_position();
                (Some(l), Some(p))
            }
            None => (None, None),
        };
        SegmentRecord {
            kind: self.kind().as_str(),
            raw: (self.is_raw() && !self.is_meta()).then(|| self.raw().to_string()),
            line_no,
            line_pos,
            expected: self.expected().map(str::to_string),
            children: self.0.children.iter().map(Segment::to_record).collect(),
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.kind == other.0.kind
                && self.0.raw == other.0.raw
                && self.0.payload == other.0.payload
                && self.0.children == other.0.children)
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_raw() {
            write!(f, "{}({:?})", self.kind(), self.raw())
        } else {
            write!(f, "{}", self.kind())?;
            f.debug_list().entries(self.segments()).finish()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_no: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_pos: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SegmentRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::templated::TemplatedFile;

    fn positioned(kind: SyntaxKind, raw: &str, start: usize, file: &Rc<TemplatedFile>) -> Segment {
        let end = start + raw.len();
        Segment::token(
            kind,
            raw,
            Some(PositionMarker::new(start..end, start..end, file.clone(), None)),
        )
    }

    fn sample() -> Segment {
        let file = Rc::new(TemplatedFile::from_string("select 1"));
        let element = Segment::node(
            SyntaxKind::SelectClauseElement,
            vec![positioned(SyntaxKind::NumericLiteral, "1", 7, &file)],
        );
        Segment::node(
            SyntaxKind::SelectClause,
            vec![
                positioned(SyntaxKind::Keyword, "select", 0, &file),
                positioned(SyntaxKind::Whitespace, " ", 6, &file),
                element,
            ],
        )
    }

    #[test]
    fn test_composite_raw_and_flags() {
        let tree = sample();
        assert_eq!(tree.raw(), "select 1");
        assert!(tree.is_code());
        assert!(!tree.is_raw());
        assert_eq!(tree.position().map(|p| p.source_slice.clone()), Some(0..8));
        assert!(!tree.segments()[1].is_code());
        assert!(tree.segments()[1].is_whitespace());
    }

    #[test]
    fn test_raw_segments_and_crawl() {
        let tree = sample();
        let raws: Vec<String> = tree.raw_segments().iter().map(|s| s.raw().to_string()).collect();
        assert_eq!(raws, vec!["select", " ", "1"]);
        let literals = tree.recursive_crawl(&SyntaxSet::single(SyntaxKind::Literal), true);
        assert_eq!(literals.len(), 1);
        assert_eq!(literals[0].raw(), "1");
        assert!(tree.validate_segment_positions().is_ok());
    }

    #[test]
    fn test_path_to() {
        let tree = sample();
        let element = &tree.segments()[2];
        let literal = &element.segments()[0];
        let path = tree.path_to(literal);
        assert_eq!(path.len(), 2);
        assert!(path[0].ptr_eq(&tree));
        assert!(path[1].ptr_eq(element));
        assert_eq!(element.path_to(literal).len(), 1);
        assert!(literal.path_to(literal).is_empty());
        assert!(element.path_to(&tree.segments()[0]).is_empty());
    }

    #[test]
    fn test_retyped_keeps_classes() {
        let word = Segment::token(SyntaxKind::Word, "foo", None);
        let ident = word.retyped(SyntaxKind::NakedIdentifier);
        assert_eq!(ident.kind(), SyntaxKind::NakedIdentifier);
        assert!(ident.is_type(SyntaxKind::Word));
        assert!(ident.is_type(SyntaxKind::Identifier));
        assert!(!ident.ptr_eq(&word));
    }

    #[test]
    fn test_meta_segments() {
        let indent = Segment::indent(SyntaxKind::Dedent, None, None);
        assert!(indent.is_meta());
        assert!(!indent.is_code());
        assert_eq!(indent.indent_val(), -1);
        assert!(indent.is_type(SyntaxKind::Indent));
        let placeholder =
            Segment::placeholder("{% if x %}", SliceType::BlockStart, Some(BlockUuid(1)), None);
        assert_eq!(placeholder.raw(), "");
        assert_eq!(placeholder.block_uuid(), Some(BlockUuid(1)));
        assert_eq!(placeholder.consumed_whitespace(), None);
        let consumed = Segment::placeholder("  \n", SliceType::Literal, None, None);
        assert_eq!(consumed.consumed_whitespace(), Some("  \n"));
    }

    #[test]
    fn test_first_non_whitespace_raw_upper() {
        let tree = Segment::node(
            SyntaxKind::Expression,
            vec![
                Segment::indent(SyntaxKind::Indent, None, None),
                Segment::whitespace(" "),
                Segment::token(SyntaxKind::Word, "from", None),
            ],
        );
        assert_eq!(tree.first_non_whitespace_raw_upper().as_deref(), Some("FROM"));
    }

    #[test]
    fn test_stringify() {
        let dump = sample().stringify(false);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("[L:  1, P:  1]      |select_clause:"));
        assert!(lines[1].ends_with("\"select\""));
        assert!(lines[4].contains("        numeric_literal:"));
        assert_eq!(sample().stringify(true).lines().count(), 4);
    }

    #[test]
    fn test_record_serializes() {
        let json = serde_json::to_string(&sample().to_record()).expect("serializable");
        let head = r#"{"type":"select_clause","line_no":1,"line_pos":1,"children":["#;
        assert!(json.starts_with(head));
        assert!(json.contains(r#"{"type":"keyword","raw":"select","line_no":1,"line_pos":1}"#));
    }
}
