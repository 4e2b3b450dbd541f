//! Recombination: merging hypotheses whose futures are interchangeable.
//!
//! Two hypotheses with equal keys receive identical scores from every
//! possible continuation, so only the better one needs to be expanded. How
//! much state goes into the key depends on the mode. `Exact` and `Dtu` keep
//! everything the search consults later; `Pharaoh` and `Coverage` drop
//! parts of it and may lose the best derivation in exchange for a smaller
//! search space.

use crate::model::LmState;
use crate::settings::RecombinationMode;

use super::coverage::{Coverage, ItgStack};
use super::hypothesis::Hypothesis;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecombinationKey {
    coverage: Coverage,
    boundary: usize,
    lm: Option<LmState>,
    pending_gaps: Option<usize>,
    itg: Option<ItgStack>,
    /// Output length and reference mask, when force decoding.
    reference: Option<(usize, u64)>,
}

#[derive(Debug, Clone)]
pub struct RecombinationFilter {
    mode: RecombinationMode,
    gaps: bool,
    itg: bool,
    constrained: bool,
}

impl RecombinationFilter {
    pub fn new(mode: RecombinationMode, gaps: bool, itg: bool, constrained: bool) -> Self {
        Self {
            mode,
            gaps,
            itg,
            constrained,
        }
    }

    /// Equivalence key for `hyp`, or `None` when recombination is off.
    pub fn key(&self, hyp: &Hypothesis) -> Option<RecombinationKey> {
        let (lm, gaps, itg) = match self.mode {
            RecombinationMode::None => return None,
            RecombinationMode::Exact => (true, true, true),
            RecombinationMode::Dtu => (true, true, false),
            RecombinationMode::Pharaoh => (true, false, false),
            RecombinationMode::Coverage => (false, false, false),
        };
        Some(RecombinationKey {
            coverage: hyp.coverage.clone(),
            boundary: hyp.boundary,
            lm: lm.then(|| hyp.lm_state.clone()),
            pending_gaps: (gaps && self.gaps).then(|| hyp.coverage.pending_gaps(hyp.boundary)),
            itg: (itg && self.itg).then(|| hyp.itg.clone()),
            // Reference state is part of the key in every mode.
            reference: self.constrained.then_some((hyp.target_len, hyp.refs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::coverage::Span;
    use crate::vocab::Symbol;

    fn hyp(covered: Span, boundary: usize, lm: &[u32], score: f64) -> Hypothesis {
        let ctx: Vec<Symbol> = lm.iter().map(|&i| Symbol(i)).collect();
        Hypothesis {
            parent: None,
            option: None,
            coverage: Coverage::new(4).with_span(covered),
            boundary,
            lm_state: LmState::new(&ctx),
            itg: ItgStack::default().pushed(covered),
            score,
            future: 0.0,
            target_len: 2,
            lm_logprob: 0.0,
            distortion: 0,
            refs: 1,
        }
    }

    #[test]
    fn exact_distinguishes_lm_context() {
        let f = RecombinationFilter::new(RecombinationMode::Exact, false, false, false);
        let a = hyp(Span::new(0, 2), 2, &[7], -1.0);
        let b = hyp(Span::new(0, 2), 2, &[8], -2.0);
        let c = hyp(Span::new(0, 2), 2, &[7], -3.0);
        assert_ne!(f.key(&a), f.key(&b));
        assert_eq!(f.key(&a), f.key(&c));
    }

    #[test]
    fn coverage_mode_ignores_lm_context() {
        let f = RecombinationFilter::new(RecombinationMode::Coverage, false, false, false);
        let a = hyp(Span::new(0, 2), 2, &[7], -1.0);
        let b = hyp(Span::new(0, 2), 2, &[8], -2.0);
        assert_eq!(f.key(&a), f.key(&b));
        let c = hyp(Span::new(0, 2), 1, &[7], -1.0);
        assert_ne!(f.key(&a), f.key(&c));
    }

    #[test]
    fn none_mode_never_merges() {
        let f = RecombinationFilter::new(RecombinationMode::None, false, false, false);
        assert!(f.key(&hyp(Span::new(0, 1), 1, &[], 0.0)).is_none());
    }

    #[test]
    fn force_decoding_separates_reference_positions() {
        let f = RecombinationFilter::new(RecombinationMode::Pharaoh, false, false, true);
        let a = hyp(Span::new(0, 2), 2, &[7], -1.0);
        let mut b = a.clone();
        b.target_len = 3;
        assert_ne!(f.key(&a), f.key(&b));
    }

    #[test]
    fn itg_stack_only_in_exact_mode() {
        let mut a = hyp(Span::new(0, 1), 2, &[7], -1.0);
        a.coverage = a.coverage.with_span(Span::new(1, 2));
        let mut b = a.clone();
        a.itg = ItgStack::default().pushed(Span::new(0, 2));
        b.itg = ItgStack::default().pushed(Span::new(1, 2)).pushed(Span::new(3, 4));

        let exact = RecombinationFilter::new(RecombinationMode::Exact, false, true, false);
        let dtu = RecombinationFilter::new(RecombinationMode::Dtu, false, true, false);
        assert_ne!(exact.key(&a), exact.key(&b));
        assert_eq!(dtu.key(&a), dtu.key(&b));
    }
}
