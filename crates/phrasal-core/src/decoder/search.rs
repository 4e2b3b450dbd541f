use crate::features::Scorer;
use crate::model::LanguageModel;
use crate::settings::SearchAlgorithm;

use super::beam::Beam;
use super::constrained::ReferenceConstraint;
use super::coverage::{ConstraintChecker, Coverage, ItgStack, Span};
use super::future_cost::FutureCost;
use super::hypothesis::{HypId, Hypothesis, HypothesisArena};
use super::options::{OptionId, OptionTable};
use super::recombination::RecombinationFilter;
use super::{cube, multibeam};

/// Everything a search strategy needs for one sentence. Read-only; the
/// mutable state is the arena passed alongside.
pub struct SearchContext<'a> {
    pub options: &'a OptionTable,
    pub checker: &'a ConstraintChecker,
    pub scorer: &'a Scorer,
    pub lm: &'a dyn LanguageModel,
    pub future: &'a FutureCost,
    pub recombination: &'a RecombinationFilter,
    pub constraint: Option<&'a ReferenceConstraint>,
    pub beam_size: usize,
    pub pop_limit: usize,
}

impl SearchContext<'_> {
    pub fn source_len(&self) -> usize {
        self.options.source_len()
    }

    /// The empty hypothesis every derivation starts from.
    pub fn root(&self) -> Hypothesis {
        let coverage = Coverage::new(self.source_len());
        let future = self.future.estimate(&coverage, 0);
        Hypothesis {
            parent: None,
            option: None,
            coverage,
            boundary: 0,
            lm_state: self.lm.start(),
            itg: ItgStack::default(),
            score: 0.0,
            future,
            target_len: 0,
            lm_logprob: 0.0,
            distortion: 0,
            refs: self.constraint.map_or(u64::MAX, |c| c.initial_mask()),
        }
    }

    pub fn is_eligible(&self, hyp: &Hypothesis, span: Span) -> bool {
        self.checker
            .is_eligible(&hyp.coverage, hyp.boundary, &hyp.itg, span)
    }

    /// Apply option `opt` to `parent`. The caller has already checked that
    /// the option's span is eligible.
    ///
    /// Returns `None` when the result can never complete or diverges from
    /// every force-decode reference.
    pub fn extend(&self, arena: &HypothesisArena, parent_id: HypId, opt: OptionId) -> Option<Hypothesis> {
        let parent = arena.get(parent_id);
        let option = self.options.get(opt);
        let span = option.span;

        let coverage = parent.coverage.with_span(span);
        let complete = coverage.is_complete();

        let refs = match self.constraint {
            Some(c) => c.advance(parent.refs, parent.target_len, &option.target, complete)?,
            None => parent.refs,
        };

        let future = self.future.estimate(&coverage, span.end);
        if future == f64::NEG_INFINITY {
            return None;
        }

        let (mut lp, lm_state) = self.lm.score_phrase(&parent.lm_state, &option.target);
        if complete {
            lp += self.lm.end(&lm_state);
        }
        let distance = parent.boundary.abs_diff(span.start);
        let score = parent.score
            + option.static_score
            + self.scorer.lm_score(lp)
            + self.scorer.distortion_score(distance);

        let itg = if self.checker.uses_itg() {
            parent.itg.pushed(span)
        } else {
            ItgStack::default()
        };

        Some(Hypothesis {
            parent: Some(parent_id),
            option: Some(opt),
            coverage,
            boundary: span.end,
            lm_state,
            itg,
            score,
            future,
            target_len: parent.target_len + option.target.len(),
            lm_logprob: parent.lm_logprob + lp,
            distortion: parent.distortion + distance,
            refs,
        })
    }

    /// Expand every eligible option of `span` from `parent` into `beam`.
    pub(crate) fn expand_span(
        &self,
        arena: &mut HypothesisArena,
        parent: HypId,
        span: Span,
        beam: &mut Beam,
    ) -> usize {
        let mut produced = 0;
        for opt in self.options.ids_for(span) {
            if let Some(hyp) = self.extend(arena, parent, opt) {
                produced += 1;
                beam.offer(hyp, arena, self.recombination);
            }
        }
        produced
    }
}

/// Complete hypotheses a search produced, best first by model score.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub complete: Vec<HypId>,
    pub expansions: usize,
    pub recombined: usize,
}

impl SearchOutcome {
    pub(crate) fn from_final_beam(beam: &Beam, arena: &HypothesisArena, expansions: usize, recombined: usize) -> Self {
        let mut complete: Vec<HypId> = beam
            .hyps()
            .iter()
            .chain(beam.spill())
            .copied()
            .filter(|&id| arena.get(id).is_complete())
            .collect();
        complete.sort_by(|&a, &b| {
            arena
                .get(b)
                .score
                .total_cmp(&arena.get(a).score)
                .then(a.cmp(&b))
        });
        complete.dedup();
        Self {
            complete,
            expansions,
            recombined,
        }
    }
}

/// Search algorithm, selected once from the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Multibeam,
    Cube,
}

impl From<SearchAlgorithm> for SearchStrategy {
    fn from(alg: SearchAlgorithm) -> Self {
        match alg {
            SearchAlgorithm::Multibeam => Self::Multibeam,
            SearchAlgorithm::Cube => Self::Cube,
        }
    }
}

impl SearchStrategy {
    pub fn search(&self, ctx: &SearchContext<'_>, arena: &mut HypothesisArena) -> SearchOutcome {
        match self {
            Self::Multibeam => multibeam::search(ctx, arena),
            Self::Cube => cube::search(ctx, arena),
        }
    }
}
