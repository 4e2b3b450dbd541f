use crate::model::LmState;
use crate::vocab::Symbol;

use super::coverage::{Coverage, ItgStack};
use super::options::{OptionId, OptionTable};

/// Handle into a `HypothesisArena`.
pub type HypId = u32;

/// A partial (or, with full coverage, complete) translation.
///
/// Back-pointers are arena indices, so many leaves can share one ancestor
/// chain and the whole search graph is released in one go when the arena
/// is cleared.
#[derive(Debug, Clone)]
pub struct Hypothesis {
    pub parent: Option<HypId>,
    pub option: Option<OptionId>,
    pub coverage: Coverage,
    /// End of the most recently translated source phrase.
    pub boundary: usize,
    pub lm_state: LmState,
    pub itg: ItgStack,
    /// Model score so far, without any heuristic.
    pub score: f64,
    /// Future-cost estimate for the untranslated rest.
    pub future: f64,
    pub target_len: usize,
    /// Unweighted LM log-probability so far.
    pub lm_logprob: f64,
    /// Sum of source jump distances so far.
    pub distortion: usize,
    /// Force-decode references still matched (all ones when unconstrained).
    pub refs: u64,
}

impl Hypothesis {
    /// Key the beams sort by.
    pub fn rank_key(&self) -> f64 {
        self.score + self.future
    }

    pub fn is_complete(&self) -> bool {
        self.coverage.is_complete()
    }
}

#[derive(Debug, Default)]
pub struct HypothesisArena {
    hyps: Vec<Hypothesis>,
}

impl HypothesisArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every hypothesis, keeping the allocation for the next sentence.
    pub fn clear(&mut self) {
        self.hyps.clear();
    }

    pub fn push(&mut self, hyp: Hypothesis) -> HypId {
        let id = self.hyps.len() as HypId;
        self.hyps.push(hyp);
        id
    }

    pub fn get(&self, id: HypId) -> &Hypothesis {
        &self.hyps[id as usize]
    }

    pub fn len(&self) -> usize {
        self.hyps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hyps.is_empty()
    }

    /// Option ids along the derivation of `id`, in application order.
    pub fn derivation(&self, id: HypId) -> Vec<OptionId> {
        let mut steps = Vec::new();
        let mut cur = Some(id);
        while let Some(h) = cur {
            let hyp = self.get(h);
            if let Some(opt) = hyp.option {
                steps.push(opt);
            }
            cur = hyp.parent;
        }
        steps.reverse();
        steps
    }

    /// Target words produced by the derivation of `id`.
    pub fn output(&self, id: HypId, options: &OptionTable) -> Vec<Symbol> {
        let mut out = Vec::with_capacity(self.get(id).target_len);
        for opt in self.derivation(id) {
            out.extend_from_slice(&options.get(opt).target);
        }
        out
    }
}
