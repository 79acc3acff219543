//! ANSI-subset grammar
//!
//! Select statements with set operators and common table expressions,
//! from/join/where/group by/order by/limit clauses, expressions with
//! functions and case expressions, and statement delimiters. Indent and
//! Dedent markers are placed where the reflow engine should indent.
//!
//! Rule names follow the `FooSegment` / `FooGrammar` convention: segments
//! produce a node of their own, grammars are shared fragments.

use crate::sql::errors::CompileError;
use crate::sql::parser::context::IndentToggle;
use crate::sql::parser::grammar::{
    AnyNumberOfOptions, DelimitedOptions, Grammar, NodeId, OneOfOptions, ParseMode, SequenceOptions,
    StartsWithOptions,
};
use crate::sql::segments::SyntaxKind;

pub const RESERVED_KEYWORDS: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BY", "CASE", "CROSS", "DESC", "DISTINCT", "ELSE", "END", "EXCEPT",
    "FALSE", "FROM", "FULL", "GROUP", "IN", "INNER", "INTERSECT", "IS", "JOIN", "LEFT", "LIKE",
    "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "RIGHT", "SELECT", "THEN",
    "TRUE", "UNION", "USE", "USING", "WHEN", "WHERE", "WITH",
];

pub const UNRESERVED_KEYWORDS: &[&str] = &["FIRST", "LAST", "NULLS", "RECURSIVE"];

/// Keywords that end a select clause.
const SELECT_CLAUSE_TERMINATORS: &[&str] =
    &["FROM", "WHERE", "GROUP", "ORDER", "LIMIT", "UNION", "INTERSECT", "EXCEPT"];

pub fn grammar() -> Result<Grammar, CompileError> {
    let mut g = Grammar::new();
    define_symbols(&mut g);
    define_literals_and_identifiers(&mut g);
    define_expressions(&mut g);
    define_select(&mut g);
    define_from(&mut g);
    define_clauses(&mut g);
    define_statements(&mut g);
    g.compile()
}

fn keywords(g: &mut Grammar, words: &[&str]) -> Vec<NodeId> {
    words.iter().map(|word| g.keyword(word)).collect()
}

fn define_symbols(g: &mut Grammar) {
    let symbols = [
        ("StartBracketSegment", "(", SyntaxKind::StartBracket),
        ("EndBracketSegment", ")", SyntaxKind::EndBracket),
        ("StartSquareBracketSegment", "[", SyntaxKind::StartSquareBracket),
        ("EndSquareBracketSegment", "]", SyntaxKind::EndSquareBracket),
        ("CommaSegment", ",", SyntaxKind::Comma),
        ("DotSegment", ".", SyntaxKind::Dot),
        ("StarSegment", "*", SyntaxKind::Star),
        ("SemicolonSegment", ";", SyntaxKind::StatementTerminator),
    ];
    for (name, raw, kind) in symbols {
        let id = g.string(raw, kind);
        g.define(name, id);
    }
    g.bracket_pair("bracket_pairs", "round", "StartBracketSegment", "EndBracketSegment", true);
    g.bracket_pair(
        "bracket_pairs",
        "square",
        "StartSquareBracketSegment",
        "EndSquareBracketSegment",
        true,
    );

    let arithmetic = g.multi_string(&["+", "-", "*", "/", "%", "||"], SyntaxKind::BinaryOperator);
    g.define("ArithmeticBinaryOperatorGrammar", arithmetic);
    let comparison = g.multi_string(
        &["=", "<", ">", "<=", ">=", "<>", "!="],
        SyntaxKind::ComparisonOperator,
    );
    g.define("ComparisonOperatorGrammar", comparison);
    let and = g.string("and", SyntaxKind::BinaryOperator);
    let or = g.string("or", SyntaxKind::BinaryOperator);
    let boolean = g.one_of([and, or]);
    g.define("BooleanBinaryOperatorGrammar", boolean);
}

fn define_literals_and_identifiers(g: &mut Grammar) {
    let anti = RESERVED_KEYWORDS.join("|");
    let naked = g.regex("[A-Z_][A-Z0-9_$]*", Some(&anti), SyntaxKind::NakedIdentifier);
    g.define("NakedIdentifierSegment", naked);
    let quoted = g.typed(SyntaxKind::QuotedIdentifier, SyntaxKind::QuotedIdentifier);
    g.define("QuotedIdentifierSegment", quoted);
    let single = g.one_of([naked, quoted]);
    g.define("SingleIdentifierGrammar", single);

    let numeric = g.typed(SyntaxKind::NumericLiteral, SyntaxKind::NumericLiteral);
    g.define("NumericLiteralSegment", numeric);
    let string = g.typed(SyntaxKind::QuotedLiteral, SyntaxKind::QuotedLiteral);
    let null = g.string("null", SyntaxKind::NullLiteral);
    let boolean = g.multi_string(&["true", "false"], SyntaxKind::BooleanLiteral);
    let literal = g.one_of([numeric, string, null, boolean]);
    g.define("LiteralGrammar", literal);

    let ident = g.ref_("SingleIdentifierGrammar");
    let dot = g.ref_("DotSegment");
    let no_gaps = DelimitedOptions {
        allow_gaps: false,
        ..DelimitedOptions::default()
    };
    let column = g.delimited_with([ident], dot, no_gaps.clone());
    let column = g.node_matcher(SyntaxKind::ColumnReference, column);
    g.define("ColumnReferenceSegment", column);
    let table = g.delimited_with([ident], dot, no_gaps);
    let table = g.node_matcher(SyntaxKind::TableReference, table);
    g.define("TableReferenceSegment", table);

    // An optional AS followed by a name.
    let indent = g.indent();
    let as_ = g.keyword("as");
    let as_ = g.optional(as_);
    let dedent = g.dedent();
    let alias = g.sequence([indent, as_, ident, dedent]);
    let alias = g.node_matcher(SyntaxKind::AliasExpression, alias);
    g.define("AliasExpressionSegment", alias);
}

fn define_expressions(g: &mut Grammar) {
    let expression = g.ref_("ExpressionSegment");
    let comma = g.ref_("CommaSegment");

    // Function calls. Arguments the grammar can't break down stay as
    // unstructured raw segments rather than becoming unparsable.
    let name = g.ref_("NakedIdentifierSegment");
    let name = g.node_matcher(SyntaxKind::FunctionName, name);
    let star = g.ref_("StarSegment");
    let args = g.delimited([expression], comma);
    let fallback = g.anything();
    let contents = g.one_of([star, args, fallback]);
    let contents = g.optional(contents);
    let call = g.bracketed(contents);
    let function = g.sequence_with(
        [name, call],
        SequenceOptions {
            allow_gaps: false,
            ..SequenceOptions::default()
        },
    );
    let function = g.node_matcher(SyntaxKind::Function, function);
    g.define("FunctionSegment", function);

    let when = g.keyword("when");
    let then = g.keyword("then");
    let implicit = g.implicit_indent();
    let dedent = g.dedent();
    let then_indent = g.conditional(SyntaxKind::Indent, IndentToggle::IndentedThen, true);
    let then_dedent = g.conditional(SyntaxKind::Dedent, IndentToggle::IndentedThen, true);
    let when_clause = g.sequence([
        when,
        implicit,
        expression,
        dedent,
        then_indent,
        then,
        expression,
        then_dedent,
    ]);
    let when_clause = g.node_matcher(SyntaxKind::WhenClause, when_clause);
    g.define("WhenClauseSegment", when_clause);

    let else_ = g.keyword("else");
    let else_clause = g.sequence([else_, implicit, expression, dedent]);
    let else_clause = g.node_matcher(SyntaxKind::ElseClause, else_clause);
    g.define("ElseClauseSegment", else_clause);

    let case = g.keyword("case");
    let end = g.keyword("end");
    let when_ref = g.ref_("WhenClauseSegment");
    let whens = g.any_number_of_with(
        [when_ref],
        AnyNumberOfOptions {
            min_times: 1,
            reset_terminators: true,
            terminators: vec![else_, end],
            ..AnyNumberOfOptions::default()
        },
    );
    let else_ref = g.ref_("ElseClauseSegment");
    let else_ref = g.optional(else_ref);
    let case_expression = g.sequence([case, implicit, whens, else_ref, dedent, end]);
    let case_expression = g.node_matcher(SyntaxKind::CaseExpression, case_expression);
    g.define("CaseExpressionSegment", case_expression);

    // Operands.
    let selectable = g.ref_("SelectableGrammar");
    let sub_expression = g.one_of([selectable, expression]);
    let bracketed = g.bracketed(sub_expression);
    let case_ref = g.ref_("CaseExpressionSegment");
    let function_ref = g.ref_("FunctionSegment");
    let column_ref = g.ref_("ColumnReferenceSegment");
    let literal = g.ref_("LiteralGrammar");
    let operand = g.one_of([case_ref, function_ref, column_ref, literal, bracketed]);
    let not = g.keyword("not");
    let not = g.optional(not);
    let term = g.sequence([not, operand]);
    g.define("ExpressionTermGrammar", term);

    // Binary operators and the postfix IS / IN / LIKE forms.
    let arithmetic = g.ref_("ArithmeticBinaryOperatorGrammar");
    let comparison = g.ref_("ComparisonOperatorGrammar");
    let boolean = g.ref_("BooleanBinaryOperatorGrammar");
    let is = g.keyword("is");
    let is_not = g.sequence([is, not]);
    let like = g.keyword("like");
    let not_like = g.sequence([not, like]);
    let operator = g.one_of([arithmetic, comparison, boolean, is_not, not_like]);
    let term_ref = g.ref_("ExpressionTermGrammar");
    let binary = g.sequence([operator, term_ref]);

    let in_ = g.keyword("in");
    let values = g.delimited([expression], comma);
    let in_contents = g.one_of([selectable, values]);
    let in_list = g.bracketed(in_contents);
    let in_tail = g.sequence([not, in_, in_list]);

    let tails = g.one_of([binary, in_tail]);
    let tails = g.any_number_of([tails]);
    let body = g.sequence([term_ref, tails]);
    let body = g.node_matcher(SyntaxKind::Expression, body);
    g.define("ExpressionSegment", body);
}

fn define_select(g: &mut Grammar) {
    let comma = g.ref_("CommaSegment");
    let dot = g.ref_("DotSegment");
    let star = g.ref_("StarSegment");
    let naked = g.ref_("NakedIdentifierSegment");

    let no_gaps = SequenceOptions {
        allow_gaps: false,
        ..SequenceOptions::default()
    };
    let qualifier = g.sequence_with([naked, dot], no_gaps.clone());
    let qualifiers = g.any_number_of([qualifier]);
    let wildcard = g.sequence_with([qualifiers, star], no_gaps);
    let wildcard = g.node_matcher(SyntaxKind::WildcardIdentifier, wildcard);
    let wildcard = g.node_matcher(SyntaxKind::WildcardExpression, wildcard);
    g.define("WildcardExpressionSegment", wildcard);

    let expression = g.ref_("ExpressionSegment");
    let alias = g.ref_("AliasExpressionSegment");
    let alias = g.optional(alias);
    let aliased = g.sequence([expression, alias]);
    let element = g.one_of([wildcard, aliased]);
    let element = g.node_matcher(SyntaxKind::SelectClauseElement, element);
    g.define("SelectClauseElementSegment", element);

    let modifier = keywords(g, &["distinct", "all"]);
    let modifier = g.one_of(modifier);
    let modifier = g.node_matcher(SyntaxKind::SelectClauseModifier, modifier);
    g.define("SelectClauseModifierSegment", modifier);

    let select = g.keyword("select");
    let modifier_ref = g.ref_("SelectClauseModifierSegment");
    let modifier_ref = g.optional(modifier_ref);
    let indent = g.indent();
    let dedent = g.dedent();
    let element_ref = g.ref_("SelectClauseElementSegment");
    let elements = g.delimited_with(
        [element_ref],
        comma,
        DelimitedOptions {
            allow_trailing: true,
            ..DelimitedOptions::default()
        },
    );
    let terminators = keywords(g, SELECT_CLAUSE_TERMINATORS);
    let clause = g.sequence_with(
        [select, modifier_ref, indent, elements, dedent],
        SequenceOptions {
            parse_mode: ParseMode::GreedyOnceStarted,
            terminators,
            ..SequenceOptions::default()
        },
    );
    let clause = g.node_matcher(SyntaxKind::SelectClause, clause);
    g.define("SelectClauseSegment", clause);

    let clause_ref = g.ref_("SelectClauseSegment");
    let mut parts = vec![clause_ref];
    for name in [
        "FromClauseSegment",
        "WhereClauseSegment",
        "GroupbyClauseSegment",
        "OrderbyClauseSegment",
        "LimitClauseSegment",
    ] {
        let part = g.ref_(name);
        parts.push(g.optional(part));
    }
    let statement = g.sequence(parts);
    let statement = g.node_matcher(SyntaxKind::SelectStatement, statement);
    g.define("SelectStatementSegment", statement);
}

fn define_from(g: &mut Grammar) {
    let comma = g.ref_("CommaSegment");
    let indent = g.indent();
    let dedent = g.dedent();
    let implicit = g.implicit_indent();

    let table_ref = g.ref_("TableReferenceSegment");
    let selectable = g.ref_("SelectableGrammar");
    let subquery = g.bracketed(selectable);
    let table_expression = g.one_of([table_ref, subquery]);
    let table_expression = g.node_matcher(SyntaxKind::TableExpression, table_expression);
    let alias = g.ref_("AliasExpressionSegment");
    let alias = g.optional(alias);
    let element = g.sequence([table_expression, alias]);
    let element = g.node_matcher(SyntaxKind::FromExpressionElement, element);
    g.define("FromExpressionElementSegment", element);

    // ON <expr> or USING (<columns>)
    let on = g.keyword("on");
    let on_indent =
        g.conditional(SyntaxKind::ImplicitIndent, IndentToggle::IndentedOnContents, true);
    let on_dedent = g.conditional(SyntaxKind::Dedent, IndentToggle::IndentedOnContents, true);
    let expression = g.ref_("ExpressionSegment");
    let on_condition = g.sequence([on, on_indent, expression, on_dedent]);
    let on_condition = g.node_matcher(SyntaxKind::JoinOnCondition, on_condition);
    g.define("JoinOnConditionSegment", on_condition);

    let using = g.keyword("using");
    let ident = g.ref_("SingleIdentifierGrammar");
    let columns = g.delimited([ident], comma);
    let columns = g.bracketed(columns);
    let using_clause = g.sequence([using, columns]);
    let on_ref = g.ref_("JoinOnConditionSegment");
    let constraint = g.one_of([on_ref, using_clause]);
    let using_on_indent = g.conditional(SyntaxKind::Indent, IndentToggle::IndentedUsingOn, true);
    let using_on_dedent = g.conditional(SyntaxKind::Dedent, IndentToggle::IndentedUsingOn, true);
    let constraint = g.sequence([using_on_indent, constraint, using_on_dedent]);
    let constraint = g.optional(constraint);

    let inner = g.keyword("inner");
    let cross = g.keyword("cross");
    let sides = keywords(g, &["left", "right", "full"]);
    let side = g.one_of(sides);
    let outer = g.keyword("outer");
    let outer = g.optional(outer);
    let sided = g.sequence([side, outer]);
    let join_type = g.one_of([inner, cross, sided]);
    let join_type = g.optional(join_type);
    let join = g.keyword("join");
    let element_ref = g.ref_("FromExpressionElementSegment");
    let join_clause = g.sequence([join_type, join, indent, element_ref, dedent, constraint]);
    let join_clause = g.node_matcher(SyntaxKind::JoinClause, join_clause);
    g.define("JoinClauseSegment", join_clause);

    // Joins sit at the level of the from clause keyword unless indented.
    let join_ref = g.ref_("JoinClauseSegment");
    let joins = g.any_number_of([join_ref]);
    let joins_dedent = g.conditional(SyntaxKind::Dedent, IndentToggle::IndentedJoins, false);
    let joins_indent = g.conditional(SyntaxKind::Indent, IndentToggle::IndentedJoins, false);
    let from_expression = g.sequence([element_ref, joins_dedent, joins, joins_indent]);
    let from_expression = g.node_matcher(SyntaxKind::FromExpression, from_expression);
    g.define("FromExpressionSegment", from_expression);

    let from = g.keyword("from");
    let from_ref = g.ref_("FromExpressionSegment");
    let expressions = g.delimited([from_ref], comma);
    let terminators = keywords(
        g,
        &["WHERE", "GROUP", "ORDER", "LIMIT", "UNION", "INTERSECT", "EXCEPT"],
    );
    let from_clause = g.sequence_with(
        [from, indent, expressions, dedent],
        SequenceOptions {
            parse_mode: ParseMode::GreedyOnceStarted,
            terminators,
            ..SequenceOptions::default()
        },
    );
    let from_clause = g.node_matcher(SyntaxKind::FromClause, from_clause);
    g.define("FromClauseSegment", from_clause);

    let where_ = g.keyword("where");
    let condition = g.optionally_bracketed(expression);
    let terminators = keywords(g, &["GROUP", "ORDER", "LIMIT", "UNION", "INTERSECT", "EXCEPT"]);
    let where_clause = g.sequence_with(
        [where_, implicit, condition, dedent],
        SequenceOptions {
            parse_mode: ParseMode::GreedyOnceStarted,
            terminators,
            ..SequenceOptions::default()
        },
    );
    let where_clause = g.node_matcher(SyntaxKind::WhereClause, where_clause);
    g.define("WhereClauseSegment", where_clause);
}

fn define_clauses(g: &mut Grammar) {
    let comma = g.ref_("CommaSegment");
    let indent = g.indent();
    let dedent = g.dedent();
    let by = g.keyword("by");
    let expression = g.ref_("ExpressionSegment");

    let group = g.keyword("group");
    let groups = g.delimited([expression], comma);
    let terminators = keywords(g, &["ORDER", "LIMIT", "UNION", "INTERSECT", "EXCEPT"]);
    let group_by = g.sequence_with(
        [group, by, indent, groups, dedent],
        SequenceOptions {
            parse_mode: ParseMode::GreedyOnceStarted,
            terminators,
            ..SequenceOptions::default()
        },
    );
    let group_by = g.node_matcher(SyntaxKind::GroupbyClause, group_by);
    g.define("GroupbyClauseSegment", group_by);

    // Sort direction and null placement, each at most once, in any order.
    let directions = keywords(g, &["asc", "desc"]);
    let direction = g.one_of(directions);
    let nulls = g.keyword("nulls");
    let placements = keywords(g, &["first", "last"]);
    let placement = g.one_of(placements);
    let null_order = g.sequence([nulls, placement]);
    let modifiers = g.any_set_of([direction, null_order], AnyNumberOfOptions::default());
    let sort_key = g.sequence([expression, modifiers]);
    let order = g.keyword("order");
    let keys = g.delimited([sort_key], comma);
    let terminators = keywords(g, &["LIMIT", "UNION", "INTERSECT", "EXCEPT"]);
    let order_by = g.sequence_with(
        [order, by, indent, keys, dedent],
        SequenceOptions {
            parse_mode: ParseMode::GreedyOnceStarted,
            terminators,
            ..SequenceOptions::default()
        },
    );
    let order_by = g.node_matcher(SyntaxKind::OrderbyClause, order_by);
    g.define("OrderbyClauseSegment", order_by);

    let limit = g.keyword("limit");
    let numeric = g.ref_("NumericLiteralSegment");
    let all = g.keyword("all");
    let count = g.one_of([numeric, all]);
    let offset = g.keyword("offset");
    let offset = g.sequence([offset, numeric]);
    let offset = g.optional(offset);
    let limit_clause = g.sequence([limit, indent, count, dedent, offset]);
    let limit_clause = g.node_matcher(SyntaxKind::LimitClause, limit_clause);
    g.define("LimitClauseSegment", limit_clause);
}

fn define_statements(g: &mut Grammar) {
    let comma = g.ref_("CommaSegment");
    let semicolon = g.ref_("SemicolonSegment");
    let select_statement = g.ref_("SelectStatementSegment");
    let selectable = g.ref_("SelectableGrammar");
    let non_with = g.ref_("NonWithSelectableGrammar");

    let nested = g.bracketed(selectable);
    let non_set = g.one_of([select_statement, nested]);
    g.define("NonSetSelectableGrammar", non_set);

    let union = g.keyword("union");
    let quantifiers = keywords(g, &["all", "distinct"]);
    let quantifier = g.one_of(quantifiers);
    let quantifier = g.optional(quantifier);
    let union = g.sequence([union, quantifier]);
    let intersect = g.keyword("intersect");
    let except = g.keyword("except");
    let set_operator = g.one_of([union, intersect, except]);
    let set_operator = g.node_matcher(SyntaxKind::SetOperator, set_operator);
    let next = g.sequence([set_operator, non_set]);
    let more = g.any_number_of_with(
        [next],
        AnyNumberOfOptions {
            min_times: 1,
            ..AnyNumberOfOptions::default()
        },
    );
    let order_by = g.ref_("OrderbyClauseSegment");
    let order_by = g.optional(order_by);
    let limit = g.ref_("LimitClauseSegment");
    let limit = g.optional(limit);
    let set_expression = g.sequence([non_set, more, order_by, limit]);
    let set_expression = g.node_matcher(SyntaxKind::SetExpression, set_expression);
    g.define("SetExpressionSegment", set_expression);

    let set_ref = g.ref_("SetExpressionSegment");
    let non_with_body = g.one_of([set_ref, non_set]);
    g.define("NonWithSelectableGrammar", non_with_body);

    let name = g.ref_("NakedIdentifierSegment");
    let as_ = g.keyword("as");
    let cte_body = g.bracketed(selectable);
    let cte = g.sequence([name, as_, cte_body]);
    let cte = g.node_matcher(SyntaxKind::CommonTableExpression, cte);
    let with = g.keyword("with");
    let recursive = g.keyword("recursive");
    let recursive = g.optional(recursive);
    let cte_indent = g.conditional(SyntaxKind::Indent, IndentToggle::IndentedCtes, true);
    let cte_dedent = g.conditional(SyntaxKind::Dedent, IndentToggle::IndentedCtes, true);
    let select = g.keyword("select");
    let ctes = g.delimited_with(
        [cte],
        comma,
        DelimitedOptions {
            terminators: vec![select],
            ..DelimitedOptions::default()
        },
    );
    let with_statement = g.sequence([with, recursive, cte_indent, ctes, cte_dedent, non_with]);
    let with_statement = g.node_matcher(SyntaxKind::WithCompoundStatement, with_statement);
    g.define("WithCompoundStatementSegment", with_statement);

    let with_ref = g.ref_("WithCompoundStatementSegment");
    let selectable_body = g.one_of([with_ref, non_with]);
    g.define("SelectableGrammar", selectable_body);

    // Statements the subset only recognises by their first keyword.
    let use_ = g.keyword("use");
    let use_statement = g.starts_with(
        use_,
        StartsWithOptions {
            terminators: vec![semicolon],
            include_terminator: false,
        },
    );
    let use_statement = g.node_matcher(SyntaxKind::UseStatement, use_statement);
    g.define("UseStatementSegment", use_statement);

    let use_ref = g.ref_("UseStatementSegment");
    let statement = g.one_of_with(
        [selectable, use_ref],
        OneOfOptions {
            terminators: vec![semicolon],
            ..OneOfOptions::default()
        },
    );
    let statement = g.node_matcher(SyntaxKind::Statement, statement);
    g.define("StatementSegment", statement);

    let statement_ref = g.ref_("StatementSegment");
    let file = g.delimited_with(
        [statement_ref],
        semicolon,
        DelimitedOptions {
            allow_trailing: true,
            ..DelimitedOptions::default()
        },
    );
    g.define("FileSegment", file);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::dialect::Dialect;
    use crate::sql::parser::{Parser, ParserConfig};
    use crate::sql::segments::{Segment, SyntaxSet};

    fn parse(sql: &str) -> Segment {
        let dialect = Dialect::ansi().unwrap();
        let parsed = Parser::new(&dialect, ParserConfig::default())
            .parse_string(sql)
            .unwrap();
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        parsed.tree
    }

    fn kinds_in(tree: &Segment, kind: SyntaxKind) -> Vec<String> {
        tree.recursive_crawl(&SyntaxSet::single(kind), true)
            .iter()
            .map(|seg| seg.raw().to_string())
            .collect()
    }

    #[test]
    fn test_grammar_compiles() {
        let g = grammar().unwrap();
        assert!(g.root("FileSegment").is_some());
        assert!(g.is_compiled());
    }

    #[test]
    fn test_select_with_clauses() {
        let tree = parse("select a, b as c from t where a = 1 order by b desc limit 10");
        assert_eq!(kinds_in(&tree, SyntaxKind::SelectClause), vec!["select a, b as c"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::FromClause), vec!["from t"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::WhereClause), vec!["where a = 1"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::OrderbyClause), vec!["order by b desc"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::LimitClause), vec!["limit 10"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::AliasExpression), vec!["as c"]);
    }

    #[test]
    fn test_keywords_are_retyped() {
        let tree = parse("SELECT x FROM y");
        let keywords = kinds_in(&tree, SyntaxKind::Keyword);
        assert_eq!(keywords, vec!["SELECT", "FROM"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::NakedIdentifier), vec!["x", "y"]);
    }

    #[test]
    fn test_joins_functions_and_case() {
        let tree = parse(
            "select count(*), case when a then 1 else 2 end\n\
             from t1 left join t2 on t1.id = t2.id join t3 using (id)",
        );
        assert_eq!(kinds_in(&tree, SyntaxKind::JoinClause).len(), 2);
        assert_eq!(kinds_in(&tree, SyntaxKind::JoinOnCondition), vec!["on t1.id = t2.id"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::FunctionName), vec!["count"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::WhenClause), vec!["when a then 1"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::ElseClause), vec!["else 2"]);
    }

    #[test]
    fn test_set_expressions_and_ctes() {
        let tree = parse("with x as (select 1) select * from x union all select 2");
        assert_eq!(kinds_in(&tree, SyntaxKind::CommonTableExpression), vec!["x as (select 1)"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::SetOperator), vec!["union all"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::WildcardExpression), vec!["*"]);
    }

    #[test]
    fn test_multiple_statements_and_use() {
        let tree = parse("use warehouse.db;\nselect 1;\n");
        assert_eq!(kinds_in(&tree, SyntaxKind::Statement).len(), 2);
        assert_eq!(kinds_in(&tree, SyntaxKind::UseStatement), vec!["use warehouse.db"]);
        assert_eq!(kinds_in(&tree, SyntaxKind::StatementTerminator), vec![";", ";"]);
    }

    #[test]
    fn test_order_by_modifiers_in_any_order() {
        let tree = parse("select a from t order by a nulls last desc, b");
        assert_eq!(
            kinds_in(&tree, SyntaxKind::OrderbyClause),
            vec!["order by a nulls last desc, b"]
        );
    }

    #[test]
    fn test_subquery_brackets_carry_indents() {
        let tree = parse("select a from (select b from c) as d");
        let bracketed = tree.recursive_crawl(&SyntaxSet::single(SyntaxKind::Bracketed), true);
        assert_eq!(bracketed.len(), 1);
        let kinds: Vec<SyntaxKind> = bracketed[0].segments().iter().map(Segment::kind).collect();
        assert_eq!(kinds.first(), Some(&SyntaxKind::StartBracket));
        assert_eq!(kinds.get(1), Some(&SyntaxKind::Indent));
        assert_eq!(kinds.get(kinds.len() - 2), Some(&SyntaxKind::Dedent));
        assert_eq!(kinds.last(), Some(&SyntaxKind::EndBracket));
    }
}
