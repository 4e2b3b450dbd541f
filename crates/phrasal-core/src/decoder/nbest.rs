use std::collections::HashSet;

use tracing::debug_span;

use crate::sequence::Sequence;
use crate::settings::{NbestMode, MAX_NBEST_SIZE};
use crate::vocab::Symbol;

use super::hypothesis::HypId;
use super::DecodeError;

/// A complete hypothesis offered to the extractor.
#[derive(Debug, Clone)]
pub struct NbestCandidate {
    pub hyp: HypId,
    pub score: f64,
    pub output: Sequence,
}

/// Re-ranking penalty used by the diverse n-best modes.
pub trait DiversityPolicy: Send + Sync {
    /// Amount subtracted from `candidate`'s score given what has already
    /// been selected.
    fn penalty(&self, candidate: &[Symbol], selected: &[&[Symbol]]) -> f64;
}

/// Penalizes n-gram overlap with the closest already-selected output.
///
/// The overlap is the fraction of the candidate's n-grams (orders 1 to
/// `order`) that also occur in a selected output, so the penalty ranges
/// from 0 to `weight`.
#[derive(Debug, Clone)]
pub struct NgramOverlapPenalty {
    pub weight: f64,
    pub order: usize,
}

impl NgramOverlapPenalty {
    pub fn new(weight: f64) -> Self {
        Self { weight, order: 2 }
    }
}

impl DiversityPolicy for NgramOverlapPenalty {
    fn penalty(&self, candidate: &[Symbol], selected: &[&[Symbol]]) -> f64 {
        let mine = ngrams(candidate, self.order);
        if mine.is_empty() {
            return 0.0;
        }
        selected
            .iter()
            .map(|other| {
                let theirs = ngrams(other, self.order);
                let shared = mine.iter().filter(|g| theirs.contains(*g)).count();
                shared as f64 / mine.len() as f64
            })
            .fold(0.0, f64::max)
            * self.weight
    }
}

fn ngrams(words: &[Symbol], order: usize) -> HashSet<&[Symbol]> {
    (1..=order)
        .flat_map(|n| words.windows(n))
        .collect()
}

/// Select up to `n` entries from `pool`.
///
/// The result is always ordered by score, descending, with ties broken by
/// hypothesis id. With `distinct`, no two entries share an output.
pub fn extract(
    pool: &[NbestCandidate],
    n: usize,
    distinct: bool,
    mode: NbestMode,
    policy: &dyn DiversityPolicy,
) -> Result<Vec<NbestCandidate>, DecodeError> {
    if n > MAX_NBEST_SIZE {
        return Err(DecodeError::CapacityExceeded {
            what: "n-best size",
            value: n,
            limit: MAX_NBEST_SIZE,
        });
    }
    let _span = debug_span!("nbest", pool = pool.len(), n).entered();

    let mut ranked: Vec<&NbestCandidate> = pool.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.hyp.cmp(&b.hyp)));
    if distinct {
        let mut seen = HashSet::new();
        ranked.retain(|c| seen.insert(c.output.as_slice()));
    }

    let mut chosen: Vec<&NbestCandidate> = match mode {
        NbestMode::Standard => ranked.iter().take(n).copied().collect(),
        NbestMode::Diverse => rerank(&ranked, Vec::new(), n, policy),
        NbestMode::Combined => {
            let head: Vec<_> = ranked.iter().take(n.div_ceil(2)).copied().collect();
            rerank(&ranked, head, n, policy)
        }
    };

    chosen.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.hyp.cmp(&b.hyp)));
    Ok(chosen.into_iter().cloned().collect())
}

/// Greedily fill `chosen` up to `n`, each time taking the candidate with
/// the best diversity-adjusted score.
fn rerank<'a>(
    ranked: &[&'a NbestCandidate],
    mut chosen: Vec<&'a NbestCandidate>,
    n: usize,
    policy: &dyn DiversityPolicy,
) -> Vec<&'a NbestCandidate> {
    let mut taken: HashSet<HypId> = chosen.iter().map(|c| c.hyp).collect();
    while chosen.len() < n {
        let selected: Vec<&[Symbol]> = chosen.iter().map(|c| c.output.as_slice()).collect();
        let best = ranked
            .iter()
            .filter(|c| !taken.contains(&c.hyp))
            .map(|c| (c.score - policy.penalty(&c.output, &selected), *c))
            // Earlier candidates win ties: max_by keeps the last maximum.
            .rev()
            .max_by(|a, b| a.0.total_cmp(&b.0));
        let Some((_, cand)) = best else {
            break;
        };
        taken.insert(cand.hyp);
        chosen.push(cand);
    }
    chosen
}
