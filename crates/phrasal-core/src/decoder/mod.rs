//! Phrase-based search for one sentence.
//!
//! Builds the translation option table, runs the configured search
//! strategy (multibeam stack search or cube pruning) over a hypothesis
//! arena, then extracts the n-best list from the complete hypotheses.

mod beam;
pub mod constrained;
pub mod coverage;
mod cube;
mod future_cost;
pub mod hypothesis;
mod multibeam;
pub mod nbest;
pub mod options;
mod recombination;
mod search;
pub(crate) mod testutil;

#[cfg(test)]
mod tests;

use std::ops::Range;

use tracing::{debug, debug_span, warn};

use crate::features::{FeatureVector, Scorer, LINEAR_DISTORTION, LM};
use crate::model::{LanguageModel, ModelError, PhraseAlignment, TranslationModel};
use crate::sequence::Sequence;
use crate::settings::{Settings, SettingsError, MAX_NBEST_SIZE};

pub use constrained::ReferenceConstraint;
pub use coverage::{ConstraintChecker, Coverage, ItgStack, Span};
pub use future_cost::FutureCost;
pub use hypothesis::{HypId, Hypothesis, HypothesisArena};
pub use nbest::{DiversityPolicy, NbestCandidate, NgramOverlapPenalty};
pub use options::{OptionTable, TranslationOption};
pub use recombination::{RecombinationFilter, RecombinationKey};
pub use search::{SearchContext, SearchOutcome, SearchStrategy};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    ModelQuery(#[from] ModelError),

    #[error("no derivation covers all {source_len} source words")]
    NoPathFound { source_len: usize },

    #[error("{what} {value} exceeds the limit of {limit}")]
    CapacityExceeded {
        what: &'static str,
        value: usize,
        limit: usize,
    },
}

impl From<SettingsError> for DecodeError {
    fn from(e: SettingsError) -> Self {
        DecodeError::Configuration(e.to_string())
    }
}

/// One phrase of a derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseStep {
    pub source: Span,
    /// Positions in the output sequence.
    pub target: Range<usize>,
    pub alignment: Option<PhraseAlignment>,
    pub pass_through: bool,
}

/// An n-best entry.
#[derive(Debug, Clone)]
pub struct Translation {
    /// 0-based position in the n-best list.
    pub rank: usize,
    pub score: f64,
    pub output: Sequence,
    /// Unweighted feature totals, when requested.
    pub features: Option<FeatureVector>,
    /// Phrase derivation, when alignments are requested.
    pub derivation: Vec<PhraseStep>,
}

impl Translation {
    /// Word alignment as absolute `(source, target)` positions. Phrases
    /// without an internal alignment contribute nothing.
    pub fn word_alignment(&self) -> Vec<(usize, usize)> {
        let mut links = Vec::new();
        for step in &self.derivation {
            if let Some(a) = &step.alignment {
                links.extend(a.links.iter().map(|&(s, t)| {
                    (step.source.start + s as usize, step.target.start + t as usize)
                }));
            }
        }
        links.sort_unstable();
        links
    }
}

/// Shared, read-only inputs to `decode_sentence`.
pub struct DecodeContext<'a> {
    pub tm: &'a dyn TranslationModel,
    pub lm: &'a dyn LanguageModel,
    pub scorer: &'a Scorer,
    pub settings: &'a Settings,
    pub policy: &'a dyn DiversityPolicy,
}

/// Decode `source` into at most `n` translations.
///
/// `arena` is cleared first and left holding this sentence's search graph,
/// so one arena can be reused across sentences without reallocating.
/// Sentences shorter than the configured minimum yield an empty list.
pub fn decode_sentence(
    cx: &DecodeContext<'_>,
    arena: &mut HypothesisArena,
    source: &Sequence,
    n: usize,
    constraint: Option<&ReferenceConstraint>,
) -> Result<Vec<Translation>, DecodeError> {
    let settings = cx.settings;
    let search = &settings.search;
    if n > MAX_NBEST_SIZE {
        return Err(DecodeError::CapacityExceeded {
            what: "n-best size",
            value: n,
            limit: MAX_NBEST_SIZE,
        });
    }
    if let Some(max) = settings.input.max_sentence_length {
        if source.len() > max {
            return Err(DecodeError::CapacityExceeded {
                what: "sentence length",
                value: source.len(),
                limit: max,
            });
        }
    }
    if source.is_empty() || n == 0 {
        return Ok(Vec::new());
    }
    if source.len() < settings.input.min_sentence_length {
        debug!(len = source.len(), "sentence below minimum length, skipped");
        return Ok(Vec::new());
    }

    let _span = debug_span!("decode_sentence", len = source.len(), n).entered();
    arena.clear();

    let table = OptionTable::build(source, cx.tm, cx.lm, cx.scorer, search)?;
    if let Some(pos) = table.uncoverable_position() {
        warn!(position = pos, "source word has no translation option");
        return Err(DecodeError::NoPathFound {
            source_len: source.len(),
        });
    }

    let mut future = FutureCost::new(&table);
    if search.gaps.enabled && search.gaps.in_future_cost {
        future = future.with_gap_distortion(cx.scorer.clone());
    }
    let checker = ConstraintChecker::new(
        search.distortion_limit(),
        search.use_itg_constraints,
        search.gaps.enabled.then_some(search.gaps.max_pending_phrases),
    );
    let recombination = RecombinationFilter::new(
        search.recombination,
        search.gaps.enabled,
        search.use_itg_constraints,
        constraint.is_some(),
    );
    let ctx = SearchContext {
        options: &table,
        checker: &checker,
        scorer: cx.scorer,
        lm: cx.lm,
        future: &future,
        recombination: &recombination,
        constraint,
        beam_size: search.beam_size,
        pop_limit: search.effective_pop_limit(),
    };

    let outcome = SearchStrategy::from(search.algorithm).search(&ctx, arena);
    let arena: &HypothesisArena = arena;
    if outcome.complete.is_empty() {
        warn!(len = source.len(), "search produced no complete hypothesis");
        return Err(DecodeError::NoPathFound {
            source_len: source.len(),
        });
    }

    let pool: Vec<NbestCandidate> = outcome
        .complete
        .iter()
        .map(|&id| NbestCandidate {
            hyp: id,
            score: arena.get(id).score,
            output: Sequence::new(arena.output(id, &table)),
        })
        .collect();
    let chosen = nbest::extract(&pool, n, settings.nbest.distinct, settings.nbest.mode, cx.policy)?;

    Ok(chosen
        .into_iter()
        .enumerate()
        .map(|(rank, c)| Translation {
            rank,
            score: c.score,
            features: settings
                .nbest
                .include_features
                .then(|| feature_totals(arena, &table, c.hyp)),
            derivation: if settings.nbest.include_alignment {
                derivation(arena, &table, c.hyp)
            } else {
                Vec::new()
            },
            output: c.output,
        })
        .collect())
}

/// Unweighted features of a derivation: option features plus the dynamic
/// LM and distortion totals. Their weighted sum is the hypothesis score.
pub fn feature_totals(arena: &HypothesisArena, table: &OptionTable, id: HypId) -> FeatureVector {
    let mut fv = FeatureVector::new();
    for opt in arena.derivation(id) {
        fv.merge(&table.get(opt).features);
    }
    let hyp = arena.get(id);
    fv.add(LM, hyp.lm_logprob);
    fv.add(LINEAR_DISTORTION, -(hyp.distortion as f64));
    fv
}

fn derivation(arena: &HypothesisArena, table: &OptionTable, id: HypId) -> Vec<PhraseStep> {
    let mut pos = 0;
    arena
        .derivation(id)
        .into_iter()
        .map(|opt| {
            let o = table.get(opt);
            let step = PhraseStep {
                source: o.span,
                target: pos..pos + o.target.len(),
                alignment: o.alignment.clone(),
                pass_through: o.pass_through,
            };
            pos += o.target.len();
            step
        })
        .collect()
}
