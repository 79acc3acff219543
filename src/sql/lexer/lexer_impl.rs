//! Implementation of the reference lexer

use crate::sql::errors::{LexError, TemplateError};
use crate::sql::lexer::tokens::Token;
use crate::sql::markers::PositionMarker;
use crate::sql::segments::{Segment, SyntaxKind};
use crate::sql::templated::{SliceType, TemplatedFile, TemplatedFileSlice};
use logos::Logos;
use std::ops::Range;
use std::rc::Rc;

/// Tokenize a string, keeping spans. `None` marks input no token matches;
/// consecutive unmatched bytes are merged into one span.
pub fn tokenize_with_spans(source: &str) -> Vec<(Option<Token>, Range<usize>)> {
    let mut lexer = Token::lexer(source);
    let mut tokens: Vec<(Option<Token>, Range<usize>)> = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((Some(token), span)),
            Err(()) => match tokens.last_mut() {
                Some((None, previous)) if previous.end == span.start => previous.end = span.end,
                _ => tokens.push((None, span)),
            },
        }
    }

    tokens
}

/// Lex an untemplated SQL string.
pub fn lex(sql: &str) -> Result<Vec<Segment>, LexError> {
    lex_templated(&Rc::new(TemplatedFile::from_string(sql)))
}

/// Lex the templated view of a file.
///
/// Every token becomes a raw segment positioned in both views. Source regions
/// with no templated output (block tags, template comments, empty
/// expressions, swallowed whitespace) become placeholder metas at the point
/// they occupy, splitting a token if needed. The list always ends with an
/// `end_of_file` meta.
pub fn lex_templated(file: &Rc<TemplatedFile>) -> Result<Vec<Segment>, LexError> {
    let templated = file.templated_str.as_str();
    let mut segments = Vec::new();
    let mut pending = file
        .sliced_file
        .iter()
        .filter(|slice| slice.templated_slice.is_empty() && !slice.source_slice.is_empty())
        .peekable();

    for (token, span) in tokenize_with_spans(templated) {
        let kind = token.map_or(SyntaxKind::Unlexable, Token::kind);
        let mut cursor = span.start;
        loop {
            while let Some(slice) = pending.next_if(|s| s.templated_slice.start <= cursor) {
                segments.push(placeholder_for(file, slice));
            }
            let stop = pending
                .peek()
                .map(|s| s.templated_slice.start)
                .filter(|&point| point < span.end)
                .unwrap_or(span.end);
            let piece = cursor..stop;
            let source_slice = source_slice_for(file, &piece)?;
            let raw = templated.get(piece.clone()).unwrap_or_default();
            let position = PositionMarker::new(source_slice, piece, file.clone(), None);
            segments.push(Segment::token(kind, raw, Some(position)));
            if stop == span.end {
                break;
            }
            cursor = stop;
        }
    }

    for slice in pending {
        segments.push(placeholder_for(file, slice));
    }

    let eof =
        PositionMarker::from_point(file.source_str.len(), templated.len(), file.clone(), None);
    segments.push(Segment::end_of_file(Some(eof)));

    log::debug!(
        target: "sqlreflow::lexer",
        "lexed {} segments from {}",
        segments.len(),
        file.fname
    );
    Ok(segments)
}

/// Source region behind a token. A token inside a single rendered slice maps
/// exactly (literal) or to that whole slice (templated); anything straddling
/// slices goes through the general mapping.
fn source_slice_for(
    file: &TemplatedFile,
    piece: &Range<usize>,
) -> Result<Range<usize>, TemplateError> {
    let mut covering = file.sliced_file.iter().filter(|slice| {
        !slice.templated_slice.is_empty()
            && slice.templated_slice.start < piece.end
            && piece.start < slice.templated_slice.end
    });
    if let (Some(slice), None) = (covering.next(), covering.next()) {
        if slice.slice_type != SliceType::Literal {
            return Ok(slice.source_slice.clone());
        }
        let start = slice.source_slice.start + (piece.start - slice.templated_slice.start);
        return Ok(start..start + piece.len());
    }
    file.templated_slice_to_source_slice(piece)
}

fn placeholder_for(file: &Rc<TemplatedFile>, slice: &TemplatedFileSlice) -> Segment {
    let source_str = file
        .source_str
        .get(slice.source_slice.clone())
        .unwrap_or_default();
    let block_uuid = file
        .raw_slice_at(slice.source_slice.start)
        .and_then(|raw| raw.block_uuid);
    let position = PositionMarker::new(
        slice.source_slice.clone(),
        slice.templated_slice.clone(),
        file.clone(),
        None,
    );
    Segment::placeholder(source_str, slice.slice_type, block_uuid, Some(position))
}
