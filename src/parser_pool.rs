//! Parser pool
//!
//! Tree-sitter parsers are expensive to create and cannot be shared between
//! concurrent parses, so they are checked out of a pool for the duration of
//! one parse. The pool grows on demand and never shrinks while it lives.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ropey::Rope;
use tracing::{debug, trace};
use tree_sitter::{ParseOptions, ParseState, Parser, Tree};

use crate::error::GrammarError;
use crate::grammar::Grammar;

/// Why a pooled parse produced no tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The grammar could not be assigned to the parser.
    Language(GrammarError),
    /// The parse ran longer than the allowed time.
    TimedOut(Duration),
}

#[derive(Default)]
pub struct ParserPool {
    idle: Mutex<Vec<Parser>>,
    created: AtomicUsize,
}

impl ParserPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks out an idle parser, creating a new one if none is available.
    pub fn acquire(&self) -> PooledParser<'_> {
        let parser = self.idle.lock().pop().unwrap_or_else(|| {
            let total = self.created.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Creating parser #{}", total);
            Parser::new()
        });
        PooledParser { pool: self, parser: ManuallyDrop::new(parser) }
    }

    /// Total parsers created over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Parsers currently checked in.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, parser: Parser) {
        self.idle.lock().push(parser);
    }

    /// Parses `text` with `grammar`, reusing `old_tree` when given.
    ///
    /// `old_tree` must already have every edit since its parse applied to it.
    /// The parser goes back to the pool on every exit path; after a timeout
    /// it is reset first so the next parse starts clean.
    pub fn parse(
        &self,
        grammar: &Grammar,
        text: &Rope,
        old_tree: Option<&Tree>,
        timeout: Duration,
    ) -> Result<Tree, ParseFailure> {
        let mut parser = self.acquire();
        parser.set_language(grammar.language()).map_err(|e| {
            ParseFailure::Language(GrammarError::IncompatibleVersion {
                language: grammar.language_id().to_string(),
                message: e.to_string(),
            })
        })?;

        let started = Instant::now();
        let len = text.len_bytes();
        let mut read = |byte: usize, _: tree_sitter::Point| {
            if byte >= len {
                return &b""[..];
            }
            let (chunk, chunk_start, _, _) = text.chunk_at_byte(byte);
            &chunk.as_bytes()[byte - chunk_start..]
        };
        let mut progress = |_: &ParseState| started.elapsed() > timeout;
        let options = ParseOptions::new().progress_callback(&mut progress);

        let tree = parser.parse_with_options(&mut read, old_tree, Some(options));
        match tree {
            Some(tree) => {
                trace!("Parsed {} bytes in {:?}", len, started.elapsed());
                Ok(tree)
            }
            None => {
                parser.reset();
                Err(ParseFailure::TimedOut(timeout))
            }
        }
    }
}

/// A parser checked out of a [`ParserPool`]. Returned to the pool on drop.
pub struct PooledParser<'a> {
    pool: &'a ParserPool,
    parser: ManuallyDrop<Parser>,
}

impl Deref for PooledParser<'_> {
    type Target = Parser;

    fn deref(&self) -> &Parser {
        &self.parser
    }
}

impl DerefMut for PooledParser<'_> {
    fn deref_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }
}

impl Drop for PooledParser<'_> {
    fn drop(&mut self) {
        // SAFETY: `parser` is taken exactly once, here, and never touched again.
        let parser = unsafe { ManuallyDrop::take(&mut self.parser) };
        self.pool.release(parser);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::grammar::GrammarRegistry;

    fn javascript() -> Grammar {
        GrammarRegistry::new(&EngineConfig::default()).load_blocking("javascript").unwrap()
    }

    #[test]
    fn test_parsers_are_reused() {
        let pool = ParserPool::new();
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            assert_eq!(pool.created(), 2);
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 2);
        let _c = pool.acquire();
        assert_eq!(pool.created(), 2);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_parse_returns_parser() {
        let pool = ParserPool::new();
        let grammar = javascript();
        let text = Rope::from_str("let x = [1, 2, 3];");
        let tree = pool.parse(&grammar, &text, None, Duration::from_secs(5)).unwrap();
        assert_eq!(tree.root_node().kind(), "program");
        assert!(!tree.root_node().has_error());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_parse_reads_across_chunks() {
        let pool = ParserPool::new();
        let grammar = javascript();
        let source: String = (0..2000).map(|i| format!("let v{i} = {i};\n")).collect();
        let text = Rope::from_str(&source);
        assert!(text.chunks().count() > 1);
        let tree = pool.parse(&grammar, &text, None, Duration::from_secs(30)).unwrap();
        assert_eq!(tree.root_node().end_byte(), source.len());
        assert_eq!(tree.root_node().named_child_count(), 2000);
    }
}
