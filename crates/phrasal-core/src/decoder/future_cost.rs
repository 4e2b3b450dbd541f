use crate::features::Scorer;

use super::coverage::{Coverage, Span};
use super::options::OptionTable;

/// Precomputed best-case score for translating each source span.
///
/// `best[i][j]` is the highest option estimate (static score plus
/// out-of-context LM score) of any segmentation of `[i, j)`, or `-inf` when
/// the span cannot be covered at all. Only ever used in ranking keys.
#[derive(Debug)]
pub struct FutureCost {
    n: usize,
    best: Vec<f64>,
    gap_scorer: Option<Scorer>,
}

impl FutureCost {
    pub fn new(options: &OptionTable) -> Self {
        let n = options.source_len();
        let mut best = vec![f64::NEG_INFINITY; (n + 1) * (n + 1)];
        for span in options.spans() {
            let direct = options
                .options_for(span)
                .iter()
                .map(|o| o.estimate())
                .fold(f64::NEG_INFINITY, f64::max);
            best[span.start * (n + 1) + span.end] = direct;
        }
        for len in 2..=n {
            for start in 0..=n - len {
                let end = start + len;
                let mut b = best[start * (n + 1) + end];
                for mid in start + 1..end {
                    let split = best[start * (n + 1) + mid] + best[mid * (n + 1) + end];
                    if split > b {
                        b = split;
                    }
                }
                best[start * (n + 1) + end] = b;
            }
        }
        Self {
            n,
            best,
            gap_scorer: None,
        }
    }

    /// Also charge the distortion of jumping back to the first pending gap.
    pub fn with_gap_distortion(mut self, scorer: Scorer) -> Self {
        self.gap_scorer = Some(scorer);
        self
    }

    pub fn span(&self, span: Span) -> f64 {
        if span.is_empty() {
            return 0.0;
        }
        self.best[span.start * (self.n + 1) + span.end]
    }

    /// Heuristic score of everything `coverage` leaves untranslated.
    ///
    /// `-inf` means some uncovered stretch has no segmentation at all, so
    /// nothing reachable from this coverage can complete.
    pub fn estimate(&self, coverage: &Coverage, boundary: usize) -> f64 {
        let runs = coverage.uncovered_runs();
        let mut total: f64 = runs.iter().map(|&r| self.span(r)).sum();
        if let (Some(scorer), Some(first)) = (&self.gap_scorer, runs.first()) {
            if first.end <= boundary {
                total += scorer.distortion_score(boundary - first.start);
            }
        }
        total
    }
}
