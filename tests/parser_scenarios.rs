//! Parse trees for whole files with the ANSI dialect

use sqlreflow::sql::errors::Location;
use sqlreflow::sql::testing::{assert_tree, parse_ansi, SqlSources};
use sqlreflow::sql::{Pipeline, Segment, SyntaxKind};

/// Non-meta segments, one per line, raws quoted.
fn render(segment: &Segment) -> String {
    let mut out = String::new();
    render_into(segment, 0, &mut out);
    out
}

fn render_into(segment: &Segment, depth: usize, out: &mut String) {
    if segment.is_meta() {
        return;
    }
    out.push_str(&"  ".repeat(depth));
    out.push_str(segment.kind().as_str());
    if segment.is_raw() {
        out.push_str(&format!(": {:?}", segment.raw()));
    }
    out.push('\n');
    for child in segment.segments() {
        render_into(child, depth + 1, out);
    }
}

#[test]
fn test_extra_select_element_is_unparsable() {
    let parsed = parse_ansi("SELECT 1 1");

    insta::assert_snapshot!(render(&parsed.tree), @r#"
    file
      statement
        select_statement
          select_clause
            keyword: "SELECT"
            whitespace: " "
            select_clause_element
              expression
                numeric_literal: "1"
            whitespace: " "
            unparsable
              numeric_literal: "1"
    "#);

    assert_eq!(parsed.diagnostics.len(), 1);
    let diagnostic = &parsed.diagnostics[0];
    assert_eq!(diagnostic.location, Location::new(1, 10));
    assert_eq!(diagnostic.found, "1");
}

#[test]
fn test_select_clause_children() {
    let parsed = parse_ansi("SELECT 1 1");
    assert_tree(&parsed.tree).find(SyntaxKind::SelectClause, |clause| {
        clause.code_kinds(&[
            SyntaxKind::Keyword,
            SyntaxKind::SelectClauseElement,
            SyntaxKind::Unparsable,
        ])
    });
}

#[test]
fn test_join_sample_structure() {
    let parsed = parse_ansi(SqlSources::get("select-join"));
    assert_tree(&parsed.tree)
        .no_unparsable()
        .find(SyntaxKind::JoinClause, |join| {
            join.raw("inner join u\n    on t.id = u.id")
                .find(SyntaxKind::JoinOnCondition, |on| on.raw("on t.id = u.id"))
        })
        .find(SyntaxKind::FromExpressionElement, |element| element.raw("t"));
}

#[test]
fn test_every_sample_round_trips() {
    for (name, sql) in SqlSources::all() {
        let parsed = parse_ansi(sql);
        assert_eq!(parsed.tree.raw(), *sql, "{} lost text", name);
        let leaves: String = parsed.tree.raw_segments().iter().map(Segment::raw).collect();
        assert_eq!(leaves, *sql, "{} leaves differ", name);
    }
}

#[test]
fn test_two_statements_keep_terminators_outside() {
    let parsed = parse_ansi(SqlSources::get("two-statements"));
    assert_tree(&parsed.tree)
        .no_unparsable()
        .code_kinds(&[
            SyntaxKind::Statement,
            SyntaxKind::StatementTerminator,
            SyntaxKind::Statement,
            SyntaxKind::StatementTerminator,
        ]);
}

#[test]
fn test_block_comment_is_one_non_code_segment() {
    let pipeline = Pipeline::ansi().unwrap();
    let parsed = pipeline.parse("select 1 /* note */\nfrom t", "comment.sql").unwrap();
    assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
    assert_tree(&parsed.tree)
        .no_unparsable()
        .find(SyntaxKind::BlockComment, |comment| comment.raw("/* note */"))
        .find(SyntaxKind::FromClause, |from| from.raw("from t"));
}

#[test]
fn test_multiline_block_comment_keeps_lines() {
    let sql = "select a /* one\n   two */, b\nfrom t";
    let parsed = parse_ansi(sql);
    assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
    let comment = parsed
        .tree
        .raw_segments()
        .into_iter()
        .find(|segment| segment.kind() == SyntaxKind::BlockComment)
        .unwrap();
    assert_eq!(comment.raw(), "/* one\n   two */");
    assert_eq!(parsed.tree.raw(), sql);
}
