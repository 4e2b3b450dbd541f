#![cfg(test)]

use std::sync::Arc;

use crate::features::{Scorer, Weights, PHRASE_PENALTY};
use crate::model::{LanguageModel, LmState, MemoryPhraseTable};
use crate::sequence::Sequence;
use crate::settings::Settings;
use crate::vocab::{Symbol, Vocabulary};

/// Language model that scores every word 0 and carries no context.
pub struct UniformLm;

impl LanguageModel for UniformLm {
    fn start(&self) -> LmState {
        LmState::default()
    }

    fn extend(&self, state: &LmState, _token: Symbol) -> (f64, LmState) {
        (0.0, state.clone())
    }

    fn order(&self) -> usize {
        1
    }
}

pub struct Fixture {
    pub vocab: Arc<Vocabulary>,
    pub source: Sequence,
    pub tm: MemoryPhraseTable,
    pub weights: Weights,
    pub scorer: Scorer,
    pub settings: Settings,
}

/// Source `a b c` with options X, Y, Z for single words and XY (-0.5) for
/// `a b`. Weights: `TM.0 = 1`, `PhrasePenalty = -1`; monotone, beam 10.
pub fn abc_fixture() -> Fixture {
    let vocab = Arc::new(Vocabulary::new());
    let mut tm = MemoryPhraseTable::new("tm");
    for (src, tgt, score) in [
        ("a", "X", 0.0),
        ("b", "Y", 0.0),
        ("c", "Z", 0.0),
        ("a b", "XY", -0.5),
    ] {
        tm.insert(
            &vocab.intern_line(src),
            Sequence::from_line(&vocab, tgt),
            &[score],
            None,
        );
    }
    let weights = Weights::new().with("TM.0", 1.0).with(PHRASE_PENALTY, -1.0);
    let scorer = Scorer::new(Arc::new(weights.clone()));

    let mut settings = Settings::default();
    settings.search.beam_size = 10;
    settings.search.distortion_limit = 0;

    Fixture {
        source: Sequence::from_line(&vocab, "a b c"),
        vocab,
        tm,
        weights,
        scorer,
        settings,
    }
}
