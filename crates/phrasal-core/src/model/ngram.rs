use std::collections::HashMap;

use smallvec::SmallVec;

use crate::vocab::Symbol;

use super::{LanguageModel, LmState};

/// Log-probability used for words the model has never seen.
pub const DEFAULT_UNKNOWN_LOGPROB: f64 = -100.0;

/// Back-off n-gram language model held in memory.
///
/// Probabilities are natural logs. The context state keeps the last
/// `order - 1` words, which is exactly what future scores depend on, so
/// recombining on this state is lossless for this model.
pub struct NgramLanguageModel {
    order: usize,
    /// n-gram → (log-probability, back-off weight)
    entries: HashMap<Vec<Symbol>, (f64, f64)>,
    unknown_logprob: f64,
}

impl NgramLanguageModel {
    pub fn builder(order: usize) -> NgramModelBuilder {
        NgramModelBuilder {
            order: order.max(1),
            entries: HashMap::new(),
            unknown_logprob: DEFAULT_UNKNOWN_LOGPROB,
        }
    }

    /// Back-off log-probability of `token` given `context` (oldest first).
    fn logprob(&self, context: &[Symbol], token: Symbol) -> f64 {
        let mut backoff = 0.0;
        let mut key: SmallVec<[Symbol; 8]> = SmallVec::new();
        for start in 0..=context.len() {
            let history = &context[start..];
            key.clear();
            key.extend_from_slice(history);
            key.push(token);
            if let Some(&(lp, _)) = self.entries.get(key.as_slice()) {
                return backoff + lp;
            }
            if !history.is_empty() {
                if let Some(&(_, bo)) = self.entries.get(history) {
                    backoff += bo;
                }
            }
        }
        backoff + self.unknown_logprob
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LanguageModel for NgramLanguageModel {
    fn start(&self) -> LmState {
        LmState::default().extended(Symbol::START, self.order - 1)
    }

    fn extend(&self, state: &LmState, token: Symbol) -> (f64, LmState) {
        let context = state.context();
        let lp = self.logprob(context, token);
        (lp, state.extended(token, self.order - 1))
    }

    fn order(&self) -> usize {
        self.order
    }
}

impl std::fmt::Debug for NgramLanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NgramLanguageModel")
            .field("order", &self.order)
            .field("entries", &self.entries.len())
            .finish()
    }
}

pub struct NgramModelBuilder {
    order: usize,
    entries: HashMap<Vec<Symbol>, (f64, f64)>,
    unknown_logprob: f64,
}

impl NgramModelBuilder {
    /// Add an n-gram. N-grams longer than the model order are ignored.
    pub fn add(&mut self, ngram: &[Symbol], logprob: f64, backoff: f64) -> &mut Self {
        if !ngram.is_empty() && ngram.len() <= self.order {
            self.entries.insert(ngram.to_vec(), (logprob, backoff));
        }
        self
    }

    pub fn unknown_logprob(&mut self, logprob: f64) -> &mut Self {
        self.unknown_logprob = logprob;
        self
    }

    pub fn build(&mut self) -> NgramLanguageModel {
        NgramLanguageModel {
            order: self.order,
            entries: std::mem::take(&mut self.entries),
            unknown_logprob: self.unknown_logprob,
        }
    }
}
