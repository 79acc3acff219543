//! Segment type tags
//!
//! [`SyntaxKind`] is the closed set of types a segment can have. Segments also
//! carry a [`SyntaxSet`] of class types so that, for example, an
//! `inline_comment` answers to both `inline_comment` and `comment`.

use std::fmt;
use std::str::FromStr;

macro_rules! syntax_kinds {
    ($($variant:ident => $name:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u8)]
        pub enum SyntaxKind {
            $($variant,)*
        }

        impl SyntaxKind {
            pub const ALL: &'static [SyntaxKind] = &[$(SyntaxKind::$variant,)*];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(SyntaxKind::$variant => $name,)*
                }
            }
        }
    };
}

syntax_kinds! {
    File => "file",
    Unparsable => "unparsable",
    Unlexable => "unlexable",
    Whitespace => "whitespace",
    Newline => "newline",
    Comment => "comment",
    InlineComment => "inline_comment",
    BlockComment => "block_comment",
    Indent => "indent",
    ImplicitIndent => "implicit_indent",
    Dedent => "dedent",
    Placeholder => "placeholder",
    TemplateLoop => "template_loop",
    EndOfFile => "end_of_file",
    Raw => "raw",
    Word => "word",
    Symbol => "symbol",
    Keyword => "keyword",
    Identifier => "identifier",
    NakedIdentifier => "naked_identifier",
    QuotedIdentifier => "quoted_identifier",
    Literal => "literal",
    NumericLiteral => "numeric_literal",
    QuotedLiteral => "quoted_literal",
    NullLiteral => "null_literal",
    BooleanLiteral => "boolean_literal",
    Comma => "comma",
    Dot => "dot",
    StartBracket => "start_bracket",
    EndBracket => "end_bracket",
    StartSquareBracket => "start_square_bracket",
    EndSquareBracket => "end_square_bracket",
    BinaryOperator => "binary_operator",
    ComparisonOperator => "comparison_operator",
    Star => "star",
    StatementTerminator => "statement_terminator",
    Statement => "statement",
    UseStatement => "use_statement",
    SetExpression => "set_expression",
    SetOperator => "set_operator",
    WithCompoundStatement => "with_compound_statement",
    CommonTableExpression => "common_table_expression",
    SelectStatement => "select_statement",
    SelectClause => "select_clause",
    SelectClauseModifier => "select_clause_modifier",
    SelectClauseElement => "select_clause_element",
    WildcardExpression => "wildcard_expression",
    WildcardIdentifier => "wildcard_identifier",
    AliasExpression => "alias_expression",
    FromClause => "from_clause",
    FromExpression => "from_expression",
    FromExpressionElement => "from_expression_element",
    TableExpression => "table_expression",
    TableReference => "table_reference",
    JoinClause => "join_clause",
    JoinOnCondition => "join_on_condition",
    ColumnReference => "column_reference",
    WhereClause => "where_clause",
    GroupbyClause => "groupby_clause",
    OrderbyClause => "orderby_clause",
    LimitClause => "limit_clause",
    Expression => "expression",
    Bracketed => "bracketed",
    Function => "function",
    FunctionName => "function_name",
    CaseExpression => "case_expression",
    WhenClause => "when_clause",
    ElseClause => "else_clause",
}

impl SyntaxKind {
    /// Contribution of a meta segment of this kind to the indent balance.
    pub fn indent_val(self) -> i32 {
        match self {
            SyntaxKind::Indent | SyntaxKind::ImplicitIndent => 1,
            SyntaxKind::Dedent => -1,
            _ => 0,
        }
    }

    /// Zero-width kinds inserted by the lexer or the grammar.
    pub fn is_meta(self) -> bool {
        matches!(
            self,
            SyntaxKind::Indent
                | SyntaxKind::ImplicitIndent
                | SyntaxKind::Dedent
                | SyntaxKind::Placeholder
                | SyntaxKind::TemplateLoop
                | SyntaxKind::EndOfFile
        )
    }

    /// The kind itself plus the broader classes it belongs to.
    pub fn class_types(self) -> SyntaxSet {
        let base = SyntaxSet::single(self);
        match self {
            SyntaxKind::InlineComment | SyntaxKind::BlockComment => base.with(SyntaxKind::Comment),
            SyntaxKind::ImplicitIndent | SyntaxKind::Dedent => base.with(SyntaxKind::Indent),
            SyntaxKind::NakedIdentifier | SyntaxKind::QuotedIdentifier => {
                base.with(SyntaxKind::Identifier)
            }
            SyntaxKind::NumericLiteral
            | SyntaxKind::QuotedLiteral
            | SyntaxKind::NullLiteral
            | SyntaxKind::BooleanLiteral => base.with(SyntaxKind::Literal),
            _ => base,
        }
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSyntaxKind(pub String);

impl fmt::Display for UnknownSyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown segment type `{}`", self.0)
    }
}

impl std::error::Error for UnknownSyntaxKind {}

impl FromStr for SyntaxKind {
    type Err = UnknownSyntaxKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyntaxKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownSyntaxKind(s.to_string()))
    }
}

/// A set of [`SyntaxKind`]s stored as a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SyntaxSet(u128);

impl SyntaxSet {
    pub const EMPTY: SyntaxSet = SyntaxSet(0);

    pub const fn new(kinds: &[SyntaxKind]) -> Self {
        let mut bits = 0u128;
        let mut idx = 0;
        while idx < kinds.len() {
            bits |= 1u128 << (kinds[idx] as u8);
            idx += 1;
        }
        SyntaxSet(bits)
    }

    pub const fn single(kind: SyntaxKind) -> Self {
        SyntaxSet(1u128 << (kind as u8))
    }

    pub const fn with(self, kind: SyntaxKind) -> Self {
        SyntaxSet(self.0 | (1u128 << (kind as u8)))
    }

    pub fn insert(&mut self, kind: SyntaxKind) {
        self.0 |= 1u128 << (kind as u8);
    }

    pub const fn contains(&self, kind: SyntaxKind) -> bool {
        self.0 & (1u128 << (kind as u8)) != 0
    }

    pub const fn union(self, other: SyntaxSet) -> Self {
        SyntaxSet(self.0 | other.0)
    }

    pub const fn intersection(self, other: SyntaxSet) -> Self {
        SyntaxSet(self.0 & other.0)
    }

    pub const fn intersects(&self, other: &SyntaxSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = SyntaxKind> + '_ {
        SyntaxKind::ALL
            .iter()
            .copied()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<SyntaxKind> for SyntaxSet {
    fn from_iter<T: IntoIterator<Item = SyntaxKind>>(iter: T) -> Self {
        let mut set = SyntaxSet::EMPTY;
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Debug for SyntaxSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(SyntaxKind::as_str)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_fit_in_a_set() {
        assert!(SyntaxKind::ALL.len() <= 128);
        let all: SyntaxSet = SyntaxKind::ALL.iter().copied().collect();
        assert_eq!(all.len(), SyntaxKind::ALL.len());
    }

    #[test]
    fn test_names_round_trip() {
        for kind in SyntaxKind::ALL {
            assert_eq!(kind.as_str().parse::<SyntaxKind>(), Ok(*kind));
        }
        assert!("select_thing".parse::<SyntaxKind>().is_err());
    }

    #[test]
    fn test_class_types() {
        let types = SyntaxKind::InlineComment.class_types();
        assert!(types.contains(SyntaxKind::Comment));
        assert!(types.contains(SyntaxKind::InlineComment));
        assert!(!types.contains(SyntaxKind::BlockComment));
        assert!(SyntaxKind::Dedent.class_types().contains(SyntaxKind::Indent));
        assert_eq!(SyntaxKind::Dedent.indent_val(), -1);
        assert_eq!(SyntaxKind::ImplicitIndent.indent_val(), 1);
        assert_eq!(SyntaxKind::Keyword.indent_val(), 0);
    }

    #[test]
    fn test_set_operations() {
        let a = SyntaxSet::new(&[SyntaxKind::Whitespace, SyntaxKind::Newline]);
        let b = SyntaxSet::single(SyntaxKind::Newline).with(SyntaxKind::Comma);
        assert!(a.intersects(&b));
        assert_eq!(a.intersection(b), SyntaxSet::single(SyntaxKind::Newline));
        assert_eq!(a.union(b).len(), 3);
        assert!(SyntaxSet::EMPTY.is_empty());
    }
}
