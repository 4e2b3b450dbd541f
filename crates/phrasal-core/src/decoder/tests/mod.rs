use super::*;
use crate::decoder::testutil::{abc_fixture, Fixture, UniformLm};
use crate::model::NgramLanguageModel;
use crate::vocab::{Symbol, Vocabulary};

mod basic;

fn decode_with(
    fx: &Fixture,
    lm: &dyn LanguageModel,
    settings: &Settings,
    source: &Sequence,
    n: usize,
    constraint: Option<&ReferenceConstraint>,
) -> Result<Vec<Translation>, DecodeError> {
    let policy = NgramOverlapPenalty::new(settings.nbest.diversity_penalty);
    let cx = DecodeContext {
        tm: &fx.tm,
        lm,
        scorer: &fx.scorer,
        settings,
        policy: &policy,
    };
    let mut arena = HypothesisArena::new();
    decode_sentence(&cx, &mut arena, source, n, constraint)
}

fn decode(fx: &Fixture, settings: &Settings, n: usize) -> Result<Vec<Translation>, DecodeError> {
    decode_with(fx, &UniformLm, settings, &fx.source, n, None)
}

fn render(fx: &Fixture, list: &[Translation]) -> Vec<String> {
    list.iter().map(|t| t.output.render(&fx.vocab)).collect()
}

/// Bigram model that strongly prefers the given word order: every bigram
/// along `<s> w1 .. wn </s>` costs -0.1, everything else backs off to -5.
fn order_lm(vocab: &Vocabulary, words: &str) -> NgramLanguageModel {
    let mut path = vec![Symbol::START];
    path.extend(vocab.intern_line(words));
    path.push(Symbol::END);

    let mut b = NgramLanguageModel::builder(2);
    for &w in &path {
        b.add(&[w], -5.0, 0.0);
    }
    for pair in path.windows(2) {
        b.add(pair, -0.1, 0.0);
    }
    b.build()
}
