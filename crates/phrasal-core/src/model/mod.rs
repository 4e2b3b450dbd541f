//! Translation- and language-model interfaces.
//!
//! Both models are shared read-only by every worker thread, so the traits
//! require `Send + Sync`. The in-memory implementations here are what the
//! tests and the CLI use; on-disk formats are parsed outside the core.

mod composite;
mod ngram;
mod phrase_table;

pub use composite::CompositeTranslationModel;
pub use ngram::{NgramLanguageModel, NgramModelBuilder};
pub use phrase_table::MemoryPhraseTable;

use smallvec::SmallVec;

use crate::features::FeatureVector;
use crate::sequence::Sequence;
use crate::vocab::Symbol;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("{model} query failed: {reason}")]
    Query { model: String, reason: String },

    #[error("model panicked: {0}")]
    Panicked(String),
}

/// Word alignment inside one phrase pair: `(source offset, target offset)`
/// pairs relative to the phrase start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseAlignment {
    pub links: Vec<(u16, u16)>,
}

impl PhraseAlignment {
    /// Parse Moses-style `0-0 1-2` links.
    pub fn parse(text: &str) -> Option<Self> {
        let mut links = Vec::new();
        for pair in text.split_whitespace() {
            let (s, t) = pair.split_once('-')?;
            links.push((s.parse().ok()?, t.parse().ok()?));
        }
        Some(Self { links })
    }
}

/// A candidate target phrase returned by a translation model.
#[derive(Debug, Clone)]
pub struct PhraseRule {
    pub target: Sequence,
    pub features: FeatureVector,
    pub alignment: Option<PhraseAlignment>,
}

pub trait TranslationModel: Send + Sync {
    /// Candidate target phrases for a contiguous source span. May be empty.
    fn query(&self, source: &[Symbol]) -> Result<Vec<PhraseRule>, ModelError>;

    /// Longest source phrase the model can match.
    fn max_source_len(&self) -> usize;

    fn name(&self) -> &str;
}

/// Opaque language-model context: the most recent target words, oldest
/// first, truncated to at most `order - 1` symbols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LmState {
    context: SmallVec<[Symbol; 4]>,
}

impl LmState {
    pub fn new(context: &[Symbol]) -> Self {
        Self {
            context: SmallVec::from_slice(context),
        }
    }

    pub fn context(&self) -> &[Symbol] {
        &self.context
    }

    /// Append `sym` and keep at most `max_len` trailing symbols.
    pub fn extended(&self, sym: Symbol, max_len: usize) -> Self {
        let mut context = self.context.clone();
        context.push(sym);
        if context.len() > max_len {
            let excess = context.len() - max_len;
            context.drain(..excess);
        }
        Self { context }
    }
}

pub trait LanguageModel: Send + Sync {
    /// Context at sentence start (after `<s>`).
    fn start(&self) -> LmState;

    /// Context-free state used to estimate phrase costs for future-cost
    /// heuristics.
    fn null_state(&self) -> LmState {
        LmState::default()
    }

    /// Natural-log probability of `token` after `state`, and the new state.
    fn extend(&self, state: &LmState, token: Symbol) -> (f64, LmState);

    /// Log-probability of `</s>` after `state`.
    fn end(&self, state: &LmState) -> f64 {
        self.extend(state, Symbol::END).0
    }

    fn order(&self) -> usize;

    /// Score a whole phrase starting from `state`.
    fn score_phrase(&self, state: &LmState, phrase: &[Symbol]) -> (f64, LmState) {
        let mut total = 0.0;
        let mut cur = state.clone();
        for &tok in phrase {
            let (lp, next) = self.extend(&cur, tok);
            total += lp;
            cur = next;
        }
        (total, cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lm_state_truncates_oldest() {
        let s = LmState::new(&[Symbol(1), Symbol(2)]);
        let t = s.extended(Symbol(3), 2);
        assert_eq!(t.context(), &[Symbol(2), Symbol(3)]);
        let u = t.extended(Symbol(4), 0);
        assert!(u.context().is_empty());
    }

    #[test]
    fn parse_alignment() {
        let a = PhraseAlignment::parse("0-0 1-2 2-1").unwrap();
        assert_eq!(a.links, vec![(0, 0), (1, 2), (2, 1)]);
        assert_eq!(PhraseAlignment::parse("").unwrap().links, vec![]);
        assert!(PhraseAlignment::parse("0:1").is_none());
    }
}
