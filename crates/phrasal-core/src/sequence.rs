use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, Range};
use std::sync::Arc;

use crate::vocab::{Symbol, Vocabulary};

/// Immutable sequence of symbols.
///
/// Subsequences share the parent's storage: `subsequence` is O(1) and
/// never copies symbols. Equality and hashing are by content, so a view and
/// an owned sequence with the same symbols compare equal.
#[derive(Clone)]
pub struct Sequence {
    data: Arc<[Symbol]>,
    start: usize,
    end: usize,
}

impl Sequence {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        let end = symbols.len();
        Self {
            data: Arc::from(symbols),
            start: 0,
            end,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Intern a whitespace-tokenized line.
    pub fn from_line(vocab: &Vocabulary, line: &str) -> Self {
        Self::new(vocab.intern_line(line))
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.data[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// View of `range` (relative to this sequence) sharing the same storage.
    ///
    /// Panics if the range is out of bounds, like slice indexing.
    pub fn subsequence(&self, range: Range<usize>) -> Sequence {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "subsequence {range:?} out of bounds for length {}",
            self.len()
        );
        Sequence {
            data: Arc::clone(&self.data),
            start: self.start + range.start,
            end: self.start + range.end,
        }
    }

    /// Concatenate sequences into a freshly allocated sequence.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a Sequence>) -> Sequence {
        let mut out = Vec::new();
        for p in parts {
            out.extend_from_slice(p.as_slice());
        }
        Sequence::new(out)
    }

    pub fn starts_with(&self, prefix: &[Symbol]) -> bool {
        self.as_slice().starts_with(prefix)
    }

    pub fn render(&self, vocab: &Vocabulary) -> String {
        vocab.render(self.as_slice())
    }
}

impl Deref for Sequence {
    type Target = [Symbol];

    fn deref(&self) -> &[Symbol] {
        self.as_slice()
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Sequence {}

impl Hash for Sequence {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.as_slice().iter().map(|s| s.0))
            .finish()
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<Symbol>> for Sequence {
    fn from(symbols: Vec<Symbol>) -> Self {
        Self::new(symbols)
    }
}

impl FromIterator<Symbol> for Sequence {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
