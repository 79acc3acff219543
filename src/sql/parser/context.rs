//! Per-parse state
//!
//! A [`ParseContext`] lives for one parse of one file and is passed
//! explicitly through every match call. It owns the terminator stack, the
//! recursion depth counter and the match cache; nothing here outlives the
//! parse.

use crate::sql::errors::{Location, SqlParseError};
use crate::sql::parser::grammar::{Grammar, NodeId};
use crate::sql::parser::match_result::MatchResult;
use rustc_hash::FxHashMap;

/// Indentation switches that `Conditional` grammar elements test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndentToggle {
    IndentedJoins,
    IndentedCtes,
    IndentedUsingOn,
    IndentedOnContents,
    IndentedThen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentationToggles {
    pub indented_joins: bool,
    pub indented_ctes: bool,
    pub indented_using_on: bool,
    pub indented_on_contents: bool,
    pub indented_then: bool,
}

impl Default for IndentationToggles {
    fn default() -> Self {
        Self {
            indented_joins: false,
            indented_ctes: false,
            indented_using_on: true,
            indented_on_contents: true,
            indented_then: true,
        }
    }
}

impl IndentationToggles {
    pub fn get(&self, toggle: IndentToggle) -> bool {
        match toggle {
            IndentToggle::IndentedJoins => self.indented_joins,
            IndentToggle::IndentedCtes => self.indented_ctes,
            IndentToggle::IndentedUsingOn => self.indented_using_on,
            IndentToggle::IndentedOnContents => self.indented_on_contents,
            IndentToggle::IndentedThen => self.indented_then,
        }
    }
}

/// Cache key: start index, length of the segment slice being matched and
/// the matcher. Terminators are not part of the key.
type CacheKey = (usize, usize, NodeId);

pub struct ParseContext<'a> {
    pub(crate) grammar: &'a Grammar,
    pub(crate) terminators: Vec<NodeId>,
    pub(crate) indentation: IndentationToggles,
    depth: usize,
    max_depth: usize,
    parse_cache: FxHashMap<CacheKey, MatchResult>,
    cache_hits: usize,
}

impl<'a> ParseContext<'a> {
    pub fn new(grammar: &'a Grammar, indentation: IndentationToggles, max_depth: usize) -> Self {
        Self {
            grammar,
            terminators: Vec::new(),
            indentation,
            depth: 0,
            max_depth,
            parse_cache: FxHashMap::default(),
            cache_hits: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn terminators(&self) -> &[NodeId] {
        &self.terminators
    }

    /// Run `f` one level deeper with an adjusted terminator stack.
    ///
    /// `clear_terminators` replaces the stack with `push_terminators` for the
    /// duration of `f`; otherwise those not already present are pushed. The
    /// stack is restored afterwards whatever `f` returns.
    pub fn deeper_match<T>(
        &mut self,
        clear_terminators: bool,
        push_terminators: &[NodeId],
        f: impl FnOnce(&mut Self) -> Result<T, SqlParseError>,
    ) -> Result<T, SqlParseError> {
        if self.depth >= self.max_depth {
            log::warn!(
                target: "sqlreflow::parser",
                "maximum parse depth {} reached",
                self.max_depth
            );
            return Err(SqlParseError::TooComplex {
                max_depth: self.max_depth,
                location: Location::default(),
            });
        }

        let saved = if clear_terminators {
            Some(std::mem::replace(&mut self.terminators, push_terminators.to_vec()))
        } else {
            None
        };
        let mut appended = 0;
        if !clear_terminators {
            for terminator in push_terminators {
                if !self.terminators.contains(terminator) {
                    self.terminators.push(*terminator);
                    appended += 1;
                }
            }
        }

        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        match saved {
            Some(terminators) => self.terminators = terminators,
            None => {
                let keep = self.terminators.len().saturating_sub(appended);
                self.terminators.truncate(keep);
            }
        }
        result
    }

    pub fn check_parse_cache(
        &mut self,
        idx: usize,
        max_idx: usize,
        matcher: NodeId,
    ) -> Option<MatchResult> {
        let hit = self.parse_cache.get(&(idx, max_idx, matcher)).cloned();
        if hit.is_some() {
            self.cache_hits += 1;
        }
        hit
    }

    pub fn put_parse_cache(
        &mut self,
        idx: usize,
        max_idx: usize,
        matcher: NodeId,
        result: MatchResult,
    ) {
        self.parse_cache.insert((idx, max_idx, matcher), result);
    }

    /// Drop every cached match. Called between independent entry points.
    pub fn clear_cache(&mut self) {
        log::debug!(
            target: "sqlreflow::parser",
            "clearing parse cache: {} entries, {} hits",
            self.parse_cache.len(),
            self.cache_hits
        );
        self.parse_cache.clear();
        self.cache_hits = 0;
    }

    pub fn cache_len(&self) -> usize {
        self.parse_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> Grammar {
        Grammar::new().compile().unwrap()
    }

    #[test]
    fn test_deeper_match_restores_terminators() {
        let g = grammar();
        let mut ctx = ParseContext::new(&g, IndentationToggles::default(), 10);
        let a = NodeId(1);
        let b = NodeId(2);
        ctx.deeper_match(false, &[a], |ctx| {
            assert_eq!(ctx.terminators(), &[a]);
            ctx.deeper_match(false, &[a, b], |ctx| {
                assert_eq!(ctx.terminators(), &[a, b]);
                Ok(())
            })?;
            assert_eq!(ctx.terminators(), &[a]);
            ctx.deeper_match(true, &[b], |ctx| {
                assert_eq!(ctx.terminators(), &[b]);
                assert_eq!(ctx.depth(), 2);
                Ok(())
            })?;
            assert_eq!(ctx.terminators(), &[a]);
            Ok(())
        })
        .unwrap();
        assert!(ctx.terminators().is_empty());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_depth_limit_is_an_error() {
        let g = grammar();
        let mut ctx = ParseContext::new(&g, IndentationToggles::default(), 2);
        let result = ctx.deeper_match(false, &[], |ctx| {
            ctx.deeper_match(false, &[], |ctx| ctx.deeper_match(false, &[], |_| Ok(())))
        });
        assert!(matches!(result, Err(SqlParseError::TooComplex { max_depth: 2, .. })));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_cache_round_trip_and_clear() {
        let g = grammar();
        let mut ctx = ParseContext::new(&g, IndentationToggles::default(), 10);
        ctx.put_parse_cache(0, 5, NodeId(0), MatchResult::from_span(0, 2));
        assert_eq!(ctx.check_parse_cache(0, 5, NodeId(0)), Some(MatchResult::from_span(0, 2)));
        assert_eq!(ctx.check_parse_cache(0, 4, NodeId(0)), None);
        ctx.clear_cache();
        assert_eq!(ctx.cache_len(), 0);
    }

    #[test]
    fn test_toggle_defaults() {
        let toggles = IndentationToggles::default();
        assert!(!toggles.get(IndentToggle::IndentedJoins));
        assert!(toggles.get(IndentToggle::IndentedThen));
    }
}
