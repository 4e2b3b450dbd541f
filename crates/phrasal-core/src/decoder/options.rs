use std::ops::Range;

use tracing::{debug, debug_span};

use crate::features::{FeatureVector, Scorer, PHRASE_PENALTY, UNKNOWN_WORD, WORD_PENALTY};
use crate::model::{LanguageModel, ModelError, PhraseAlignment, TranslationModel};
use crate::sequence::Sequence;
use crate::settings::SearchSettings;

use super::coverage::Span;

/// Index of an option inside its `OptionTable`.
pub type OptionId = u32;

/// One way of translating one source span.
#[derive(Debug, Clone)]
pub struct TranslationOption {
    pub span: Span,
    pub target: Sequence,
    /// Static features: model scores plus word/phrase penalties.
    pub features: FeatureVector,
    pub alignment: Option<PhraseAlignment>,
    /// Weighted score of `features`.
    pub static_score: f64,
    /// Weighted LM score of `target` out of context, for future costs.
    pub lm_estimate: f64,
    pub pass_through: bool,
}

impl TranslationOption {
    /// Best guess of what this option contributes to a full derivation.
    pub fn estimate(&self) -> f64 {
        self.static_score + self.lm_estimate
    }
}

/// Per-sentence table of translation options, grouped by span.
///
/// Options are stored flat; `ranges` maps each `(start, len)` cell to the
/// slice of its options, best first.
#[derive(Debug)]
pub struct OptionTable {
    source_len: usize,
    max_len: usize,
    options: Vec<TranslationOption>,
    ranges: Vec<Range<u32>>,
}

impl OptionTable {
    /// Query the model for every span up to the configured phrase length.
    ///
    /// At most `rule_query_limit` options survive per span, ranked by their
    /// weighted model score. Spans no model covers simply have no options.
    pub fn build(
        source: &Sequence,
        tm: &dyn TranslationModel,
        lm: &dyn LanguageModel,
        scorer: &Scorer,
        search: &SearchSettings,
    ) -> Result<Self, ModelError> {
        let n = source.len();
        let _span = debug_span!("build_options", len = n).entered();

        let max_len = search.max_phrase_length.min(n).max(1);
        let mut table = OptionTable {
            source_len: n,
            max_len,
            options: Vec::new(),
            ranges: vec![0..0; n * max_len],
        };
        let model_max = tm.max_source_len();

        for start in 0..n {
            for len in 1..=max_len.min(n - start).min(model_max) {
                let span = Span::new(start, start + len);
                let rules = tm.query(&source[span.start..span.end])?;
                if rules.is_empty() {
                    continue;
                }
                let mut cell: Vec<TranslationOption> = rules
                    .into_iter()
                    .map(|rule| {
                        let mut features = rule.features;
                        features.add(WORD_PENALTY, rule.target.len() as f64);
                        features.add(PHRASE_PENALTY, 1.0);
                        make_option(span, rule.target, features, rule.alignment, lm, scorer, false)
                    })
                    .collect();
                cell.sort_by(|a, b| b.static_score.total_cmp(&a.static_score));
                cell.truncate(search.rule_query_limit);
                table.push_cell(span, cell);
            }
        }

        if search.drop_unknown_words {
            let mut passed = 0;
            for start in 0..n {
                let span = Span::new(start, start + 1);
                if !table.options_for(span).is_empty() {
                    continue;
                }
                let mut features = FeatureVector::new();
                features.add(UNKNOWN_WORD, 1.0);
                features.add(WORD_PENALTY, 1.0);
                features.add(PHRASE_PENALTY, 1.0);
                let target = source.subsequence(start..start + 1);
                let alignment = Some(PhraseAlignment { links: vec![(0, 0)] });
                let option = make_option(span, target, features, alignment, lm, scorer, true);
                table.push_cell(span, vec![option]);
                passed += 1;
            }
            if passed > 0 {
                debug!(positions = passed, "pass-through options added");
            }
        }

        debug!(options = table.options.len(), "option table built");
        Ok(table)
    }

    fn cell(&self, span: Span) -> usize {
        span.start * self.max_len + (span.len() - 1)
    }

    fn push_cell(&mut self, span: Span, cell: Vec<TranslationOption>) {
        let begin = self.options.len() as u32;
        self.options.extend(cell);
        let idx = self.cell(span);
        self.ranges[idx] = begin..self.options.len() as u32;
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn max_phrase_length(&self) -> usize {
        self.max_len
    }

    /// Options for `span`, best first. Empty for uncovered or over-long spans.
    pub fn options_for(&self, span: Span) -> &[TranslationOption] {
        let r = self.ids_for(span);
        &self.options[r.start as usize..r.end as usize]
    }

    pub fn ids_for(&self, span: Span) -> Range<OptionId> {
        if span.is_empty() || span.end > self.source_len || span.len() > self.max_len {
            return 0..0;
        }
        self.ranges[self.cell(span)].clone()
    }

    pub fn get(&self, id: OptionId) -> &TranslationOption {
        &self.options[id as usize]
    }

    /// Spans that have at least one option.
    pub fn spans(&self) -> impl Iterator<Item = Span> + '_ {
        (0..self.source_len).flat_map(move |start| {
            (1..=self.max_len.min(self.source_len - start))
                .map(move |len| Span::new(start, start + len))
                .filter(move |&s| !self.ids_for(s).is_empty())
        })
    }

    /// First source position that no option covers, if any.
    pub fn uncoverable_position(&self) -> Option<usize> {
        let mut covered = vec![false; self.source_len];
        for span in self.spans() {
            covered[span.start..span.end].fill(true);
        }
        covered.iter().position(|&c| !c)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

fn make_option(
    span: Span,
    target: Sequence,
    features: FeatureVector,
    alignment: Option<PhraseAlignment>,
    lm: &dyn LanguageModel,
    scorer: &Scorer,
    pass_through: bool,
) -> TranslationOption {
    let static_score = scorer.score(&features);
    let lm_estimate = scorer.lm_score(lm.score_phrase(&lm.null_state(), &target).0);
    TranslationOption {
        span,
        target,
        features,
        alignment,
        static_score,
        lm_estimate,
        pass_through,
    }
}
