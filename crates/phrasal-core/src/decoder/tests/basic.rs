use super::*;
use crate::features::{Weights, PHRASE_PENALTY, UNKNOWN_WORD, WORD_PENALTY};
use crate::model::MemoryPhraseTable;
use crate::settings::{NbestMode, SearchAlgorithm};
use std::sync::Arc;

/// Identity table over `words` (lower-case source, upper-case target) with
/// LM and distortion weights switched on.
fn word_fixture(words: &[&str]) -> Fixture {
    let vocab = Arc::new(Vocabulary::new());
    let mut tm = MemoryPhraseTable::new("tm");
    for w in words {
        tm.insert(
            &vocab.intern_line(w),
            Sequence::from_line(&vocab, &w.to_uppercase()),
            &[0.0],
            PhraseAlignment::parse("0-0"),
        );
    }
    let weights = Weights::new()
        .with("TM.0", 1.0)
        .with(LM, 1.0)
        .with(LINEAR_DISTORTION, 0.1)
        .with(PHRASE_PENALTY, -0.1);
    let mut settings = Settings::default();
    settings.search.beam_size = 50;
    Fixture {
        source: Sequence::from_line(&vocab, &words.join(" ")),
        scorer: Scorer::new(Arc::new(weights.clone())),
        vocab,
        tm,
        weights,
        settings,
    }
}

#[test]
fn two_word_phrase_wins() {
    let fx = abc_fixture();
    for alg in [SearchAlgorithm::Cube, SearchAlgorithm::Multibeam] {
        let mut settings = fx.settings.clone();
        settings.search.algorithm = alg;
        let list = decode(&fx, &settings, 1).unwrap();
        assert_eq!(render(&fx, &list), vec!["XY Z"], "{alg:?}");
        assert!((list[0].score - -2.5).abs() < 1e-9);
        assert_eq!(list[0].rank, 0);
    }
}

#[test]
fn single_word_phrases_only() {
    let fx = abc_fixture();
    for alg in [SearchAlgorithm::Cube, SearchAlgorithm::Multibeam] {
        let mut settings = fx.settings.clone();
        settings.search.algorithm = alg;
        settings.search.max_phrase_length = 1;
        let list = decode(&fx, &settings, 1).unwrap();
        assert_eq!(render(&fx, &list), vec!["X Y Z"], "{alg:?}");
        assert!((list[0].score - -3.0).abs() < 1e-9);
    }
}

#[test]
fn recombination_narrows_the_nbest_pool() {
    let fx = abc_fixture();
    // With a context-free LM, "X Y" and "XY" share coverage, boundary and
    // LM state, so the weaker partial is merged away.
    let list = decode(&fx, &fx.settings, 5).unwrap();
    assert_eq!(render(&fx, &list), vec!["XY Z"]);

    let mut settings = fx.settings.clone();
    settings.search.recombination = crate::settings::RecombinationMode::None;
    let list = decode(&fx, &settings, 5).unwrap();
    assert_eq!(render(&fx, &list), vec!["XY Z", "X Y Z"]);
    assert!(list[0].score >= list[1].score);
    assert_eq!(list[1].rank, 1);
}

#[test]
fn features_reproduce_the_score() {
    let fx = word_fixture(&["a", "b", "c"]);
    let lm = order_lm(&fx.vocab, "B A C");
    let mut settings = fx.settings.clone();
    settings.nbest.size = 3;
    let list = decode_with(&fx, &lm, &settings, &fx.source, 3, None).unwrap();
    assert!(!list.is_empty());
    for t in &list {
        let fv = t.features.as_ref().unwrap();
        assert!((fx.scorer.score(fv) - t.score).abs() < 1e-9);
        assert_eq!(fv.get(PHRASE_PENALTY), Some(3.0));
        assert_eq!(fv.get(WORD_PENALTY), Some(3.0));
    }
}

#[test]
fn language_model_drives_reordering() {
    let fx = word_fixture(&["a", "b"]);
    let lm = order_lm(&fx.vocab, "B A");
    let mut settings = fx.settings.clone();
    settings.nbest.include_alignment = true;

    settings.search.distortion_limit = 2;
    let list = decode_with(&fx, &lm, &settings, &fx.source, 1, None).unwrap();
    assert_eq!(render(&fx, &list), vec!["B A"]);
    let fv = list[0].features.as_ref().unwrap();
    assert_eq!(fv.get(LINEAR_DISTORTION), Some(-3.0));
    assert_eq!(list[0].word_alignment(), vec![(0, 1), (1, 0)]);
    assert_eq!(list[0].derivation[0].source, Span::new(1, 2));

    // Jumping to `b` first would leave `a` two positions behind.
    settings.search.distortion_limit = 1;
    let list = decode_with(&fx, &lm, &settings, &fx.source, 1, None).unwrap();
    assert_eq!(render(&fx, &list), vec!["A B"]);
}

#[test]
fn itg_forbids_inside_out_order() {
    let fx = word_fixture(&["a", "b", "c", "d"]);
    let lm = order_lm(&fx.vocab, "B D A C");
    let mut settings = fx.settings.clone();
    settings.search.distortion_limit = -1;

    let free = decode_with(&fx, &lm, &settings, &fx.source, 1, None).unwrap();
    assert_eq!(render(&fx, &free), vec!["B D A C"]);

    settings.search.use_itg_constraints = true;
    for alg in [SearchAlgorithm::Cube, SearchAlgorithm::Multibeam] {
        settings.search.algorithm = alg;
        let itg = decode_with(&fx, &lm, &settings, &fx.source, 1, None).unwrap();
        assert_eq!(itg.len(), 1);
        assert_ne!(render(&fx, &itg), vec!["B D A C"], "{alg:?}");
    }
}

#[test]
fn pending_gap_limit_restricts_search() {
    let fx = word_fixture(&["a", "b", "c", "d"]);
    let lm = order_lm(&fx.vocab, "B D A C");
    let mut settings = fx.settings.clone();
    settings.search.distortion_limit = -1;
    settings.search.gaps.enabled = true;
    settings.search.gaps.max_pending_phrases = 1;
    settings.search.gaps.in_future_cost = true;

    let list = decode_with(&fx, &lm, &settings, &fx.source, 1, None).unwrap();
    assert_eq!(list.len(), 1);
    assert_ne!(render(&fx, &list), vec!["B D A C"]);
}

#[test]
fn complete_hypothesis_whenever_every_word_translates() {
    let fx = word_fixture(&["a", "b", "c", "d", "e"]);
    for limit in [0, 1, 2, 5, -1] {
        for alg in [SearchAlgorithm::Cube, SearchAlgorithm::Multibeam] {
            let mut settings = fx.settings.clone();
            settings.search.algorithm = alg;
            settings.search.distortion_limit = limit;
            settings.search.beam_size = 3;
            let list = decode_with(&fx, &UniformLm, &settings, &fx.source, 1, None).unwrap();
            assert_eq!(list.len(), 1, "limit {limit} {alg:?}");
        }
    }
}

#[test]
fn unknown_word_fails_without_pass_through() {
    let fx = abc_fixture();
    let source = Sequence::from_line(&fx.vocab, "a d c");
    let err = decode_with(&fx, &UniformLm, &fx.settings, &source, 1, None).unwrap_err();
    assert!(matches!(err, DecodeError::NoPathFound { source_len: 3 }));

    let mut settings = fx.settings.clone();
    settings.search.drop_unknown_words = true;
    settings.nbest.include_alignment = true;
    let list = decode_with(&fx, &UniformLm, &settings, &source, 1, None).unwrap();
    assert_eq!(render(&fx, &list), vec!["X d Z"]);
    assert_eq!(list[0].features.as_ref().unwrap().get(UNKNOWN_WORD), Some(1.0));
    assert!(list[0].derivation[1].pass_through);
}

#[test]
fn length_bounds() {
    let fx = abc_fixture();
    let mut settings = fx.settings.clone();
    settings.input.max_sentence_length = Some(2);
    let err = decode(&fx, &settings, 1).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::CapacityExceeded {
            what: "sentence length",
            value: 3,
            limit: 2
        }
    ));

    settings.input.max_sentence_length = None;
    settings.input.min_sentence_length = 4;
    assert!(decode(&fx, &settings, 1).unwrap().is_empty());

    let empty = decode_with(&fx, &UniformLm, &fx.settings, &Sequence::empty(), 1, None).unwrap();
    assert!(empty.is_empty());
}

#[test]
fn nbest_request_above_maximum() {
    let fx = abc_fixture();
    let err = decode(&fx, &fx.settings, 1001).unwrap_err();
    assert!(matches!(err, DecodeError::CapacityExceeded { limit: 1000, .. }));
}

#[test]
fn distinct_nbest_has_unique_outputs() {
    let fx = word_fixture(&["a", "b", "c"]);
    let mut settings = fx.settings.clone();
    settings.search.distortion_limit = -1;
    settings.search.recombination = crate::settings::RecombinationMode::None;
    settings.nbest.distinct = true;
    for mode in [NbestMode::Standard, NbestMode::Diverse, NbestMode::Combined] {
        settings.nbest.mode = mode;
        let list = decode_with(&fx, &UniformLm, &settings, &fx.source, 10, None).unwrap();
        let outputs = render(&fx, &list);
        let unique: std::collections::HashSet<_> = outputs.iter().collect();
        assert_eq!(unique.len(), outputs.len(), "{mode:?}");
        for pair in list.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
