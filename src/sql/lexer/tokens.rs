//! Token definitions for the reference SQL lexer
//!
//! Tokens are defined using the logos derive macro. Punctuation and
//! operators all lex as symbols; the dialect grammar gives them their final
//! types (comma, start_bracket, binary_operator, ...) during parsing.

use crate::sql::segments::SyntaxKind;
use logos::Logos;

#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    #[regex(r"[ \t]+")]
    Whitespace,

    #[regex(r"\r?\n")]
    Newline,

    // Comments
    #[regex(r"--[^\n]*")]
    InlineComment,
    #[token("/*", lex_block_comment)]
    BlockComment,

    // Literals and identifiers
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    NumericLiteral,
    #[regex(r"'([^']|'')*'")]
    QuotedLiteral,
    #[regex(r#""([^"]|"")*""#)]
    QuotedIdentifier,
    #[regex(r"[A-Za-z_][A-Za-z0-9_$]*")]
    Word,

    // Brackets
    #[token("(")]
    StartBracket,
    #[token(")")]
    EndBracket,
    #[token("[")]
    StartSquareBracket,
    #[token("]")]
    EndSquareBracket,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(";")]
    Semicolon,

    // Operators
    #[regex(r"<=|>=|<>|!=|=|<|>")]
    Comparison,
    #[regex(r"\|\||::|[+\-*/%]")]
    Operator,
}

/// Consume through the closing `*/`. Block comments do not nest, and an
/// unterminated one is a lex error.
fn lex_block_comment(lex: &mut logos::Lexer<Token>) -> Option<()> {
    let end = lex.remainder().find("*/")?;
    lex.bump(end + 2);
    Some(())
}

impl Token {
    /// The segment type a token lexes to.
    pub fn kind(self) -> SyntaxKind {
        match self {
            Token::Whitespace => SyntaxKind::Whitespace,
            Token::Newline => SyntaxKind::Newline,
            Token::InlineComment => SyntaxKind::InlineComment,
            Token::BlockComment => SyntaxKind::BlockComment,
            Token::NumericLiteral => SyntaxKind::NumericLiteral,
            Token::QuotedLiteral => SyntaxKind::QuotedLiteral,
            Token::QuotedIdentifier => SyntaxKind::QuotedIdentifier,
            Token::Word => SyntaxKind::Word,
            Token::StartBracket
            | Token::EndBracket
            | Token::StartSquareBracket
            | Token::EndSquareBracket
            | Token::Comma
            | Token::Dot
            | Token::Semicolon
            | Token::Comparison
            | Token::Operator => SyntaxKind::Symbol,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self, Token::Whitespace | Token::Newline)
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Token::InlineComment | Token::BlockComment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        Token::lexer(source).filter_map(|result| result.ok()).collect()
    }

    #[test]
    fn test_select_statement() {
        assert_eq!(
            lex_all("select a, 1.5 from t;"),
            vec![
                Token::Word,
                Token::Whitespace,
                Token::Word,
                Token::Comma,
                Token::Whitespace,
                Token::NumericLiteral,
                Token::Whitespace,
                Token::Word,
                Token::Whitespace,
                Token::Word,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn test_comments_beat_operators() {
        assert_eq!(
            lex_all("1 -- note\n/* block\n */-2"),
            vec![
                Token::NumericLiteral,
                Token::Whitespace,
                Token::InlineComment,
                Token::Newline,
                Token::BlockComment,
                Token::Operator,
                Token::NumericLiteral,
            ]
        );
    }

    #[test]
    fn test_block_comment_spans() {
        let mut lexer = Token::lexer("/* a * b / c */*/**/x");
        assert_eq!(lexer.next(), Some(Ok(Token::BlockComment)));
        assert_eq!(lexer.slice(), "/* a * b / c */");
        assert_eq!(lexer.next(), Some(Ok(Token::Operator)));
        assert_eq!(lexer.next(), Some(Ok(Token::BlockComment)));
        assert_eq!(lexer.slice(), "/**/");
        assert_eq!(lexer.next(), Some(Ok(Token::Word)));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_unterminated_block_comment_is_an_error() {
        let mut lexer = Token::lexer("/* open");
        assert_eq!(lexer.next(), Some(Err(())));
        assert_eq!(lexer.slice(), "/*");
    }

    #[test]
    fn test_multi_character_operators() {
        assert_eq!(
            lex_all("a<=b<>c||d"),
            vec![
                Token::Word,
                Token::Comparison,
                Token::Word,
                Token::Comparison,
                Token::Word,
                Token::Operator,
                Token::Word,
            ]
        );
    }

    #[test]
    fn test_quoted_tokens() {
        let mut lexer = Token::lexer("'it''s' \"Col\"");
        assert_eq!(lexer.next(), Some(Ok(Token::QuotedLiteral)));
        assert_eq!(lexer.slice(), "'it''s'");
        assert_eq!(lexer.next(), Some(Ok(Token::Whitespace)));
        assert_eq!(lexer.next(), Some(Ok(Token::QuotedIdentifier)));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_qualified_name_and_decimal() {
        assert_eq!(
            lex_all("t.col 3."),
            vec![Token::Word, Token::Dot, Token::Word, Token::Whitespace, Token::NumericLiteral]
        );
    }
}
