//! Sentence-level decoder shared by all worker threads.
//!
//! A `Decoder` owns the read-only models, the settings and one hypothesis
//! arena per worker slot. `decode` and `decode_nbest` translate a single
//! sentence on the caller's thread; `decode_batch` and `decode_lines` fan
//! sentences out over the worker pool and deliver outcomes in input order.

use std::io::BufRead;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::decoder::{
    decode_sentence, DecodeContext, DecodeError, DiversityPolicy, HypothesisArena,
    NgramOverlapPenalty, ReferenceConstraint, Translation,
};
use crate::features::{Scorer, Weights};
use crate::model::{LanguageModel, ModelError, TranslationModel};
use crate::sequence::Sequence;
use crate::settings::{validate, Settings};
use crate::vocab::Vocabulary;
use crate::worker;

/// The shared, read-only inputs of a decoder.
#[derive(Clone)]
pub struct Models {
    pub vocab: Arc<Vocabulary>,
    pub tm: Arc<dyn TranslationModel>,
    pub lm: Arc<dyn LanguageModel>,
}

/// One sentence to decode, with optional per-request overrides.
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub source: Sequence,
    /// N-best size; the configured size when `None`.
    pub nbest: Option<usize>,
    pub references: Option<ReferenceConstraint>,
}

impl DecodeRequest {
    pub fn new(source: Sequence) -> Self {
        Self {
            source,
            nbest: None,
            references: None,
        }
    }

    pub fn with_nbest(mut self, n: usize) -> Self {
        self.nbest = Some(n);
        self
    }

    pub fn with_references(mut self, references: ReferenceConstraint) -> Self {
        self.references = Some(references);
        self
    }
}

/// Result for one sentence of a batch.
#[derive(Debug)]
pub struct DecodeOutcome {
    pub sentence_id: usize,
    pub source: Sequence,
    pub result: Result<Vec<Translation>, DecodeError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub submitted: usize,
    pub failed: usize,
}

pub struct Decoder {
    models: Models,
    settings: Settings,
    scorer: Scorer,
    policy: Arc<dyn DiversityPolicy>,
    arenas: Vec<Mutex<HypothesisArena>>,
    cancelled: AtomicBool,
}

impl Decoder {
    /// Validate the configuration and set up one arena per worker thread.
    pub fn new(models: Models, settings: Settings, weights: Weights) -> Result<Self, DecodeError> {
        validate(&settings)?;
        if models.tm.max_source_len() == 0 {
            return Err(DecodeError::Configuration(format!(
                "translation model `{}` has no rules",
                models.tm.name()
            )));
        }
        if models.lm.order() == 0 {
            return Err(DecodeError::Configuration(
                "language model order must be positive".to_string(),
            ));
        }

        let threads = settings.runtime.threads;
        let policy: Arc<dyn DiversityPolicy> =
            Arc::new(NgramOverlapPenalty::new(settings.nbest.diversity_penalty));
        info!(
            tm = models.tm.name(),
            lm_order = models.lm.order(),
            threads,
            weights = weights.len(),
            "decoder ready"
        );
        Ok(Self {
            models,
            scorer: Scorer::new(Arc::new(weights)),
            policy,
            arenas: (0..threads).map(|_| Mutex::new(HypothesisArena::new())).collect(),
            cancelled: AtomicBool::new(false),
            settings,
        })
    }

    /// Replace the re-ranking policy used by the diverse n-best modes.
    pub fn with_diversity_policy(mut self, policy: Arc<dyn DiversityPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.models.vocab
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn weights(&self) -> &Weights {
        self.scorer.weights()
    }

    pub fn threads(&self) -> usize {
        self.arenas.len()
    }

    /// Decode with the configured n-best size.
    pub fn decode(
        &self,
        source: &Sequence,
        sentence_id: usize,
        thread_id: usize,
    ) -> Result<Vec<Translation>, DecodeError> {
        self.decode_nbest(source, sentence_id, thread_id, self.settings.nbest.size)
    }

    pub fn decode_nbest(
        &self,
        source: &Sequence,
        sentence_id: usize,
        thread_id: usize,
        n: usize,
    ) -> Result<Vec<Translation>, DecodeError> {
        self.run(source, n, None, sentence_id, thread_id)
    }

    /// Decode constrained to reproduce one of `references`.
    pub fn force_decode(
        &self,
        source: &Sequence,
        references: Vec<Sequence>,
        sentence_id: usize,
        thread_id: usize,
    ) -> Result<Vec<Translation>, DecodeError> {
        let constraint = self.reference_constraint(references)?;
        self.run(
            source,
            self.settings.nbest.size,
            Some(&constraint),
            sentence_id,
            thread_id,
        )
    }

    /// Build a reference constraint using the configured prefix mode.
    pub fn reference_constraint(&self, references: Vec<Sequence>) -> Result<ReferenceConstraint, DecodeError> {
        ReferenceConstraint::new(references, self.settings.force_decode.prefix)
    }

    pub fn decode_request(
        &self,
        request: &DecodeRequest,
        sentence_id: usize,
        thread_id: usize,
    ) -> Result<Vec<Translation>, DecodeError> {
        self.run(
            &request.source,
            request.nbest.unwrap_or(self.settings.nbest.size),
            request.references.as_ref(),
            sentence_id,
            thread_id,
        )
    }

    /// Decode `requests` on the worker pool; `sink` receives one outcome per
    /// request, in request order.
    pub fn decode_batch<I>(&self, requests: I, mut sink: impl FnMut(DecodeOutcome)) -> Result<BatchSummary, DecodeError>
    where
        I: IntoIterator<Item = DecodeRequest>,
    {
        let mut failed = 0;
        let submitted = worker::run_ordered(
            self.threads(),
            requests,
            &self.cancelled,
            |thread_id, sentence_id, request: DecodeRequest| {
                let result = self.decode_request(&request, sentence_id, thread_id);
                DecodeOutcome {
                    sentence_id,
                    source: request.source,
                    result,
                }
            },
            |_, outcome| {
                if outcome.result.is_err() {
                    failed += 1;
                }
                sink(outcome);
            },
        )
        .map_err(|e| DecodeError::Configuration(format!("cannot start worker threads: {e}")))?;

        info!(submitted, failed, "batch finished");
        Ok(BatchSummary { submitted, failed })
    }

    /// Decode whitespace-tokenized lines from `input`.
    ///
    /// A read error ends the input early; everything read so far is still
    /// decoded and delivered.
    pub fn decode_lines<R: BufRead>(
        &self,
        input: R,
        sink: impl FnMut(DecodeOutcome),
    ) -> Result<BatchSummary, DecodeError> {
        let vocab = Arc::clone(&self.models.vocab);
        let requests = input.lines().map_while(move |line| match line {
            Ok(line) => Some(DecodeRequest::new(Sequence::from_line(&vocab, &line))),
            Err(e) => {
                warn!(error = %e, "input read failed, stopping");
                None
            }
        });
        self.decode_batch(requests, sink)
    }

    /// Stop dispatching new sentences. Sentences already being decoded
    /// finish normally.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn run(
        &self,
        source: &Sequence,
        n: usize,
        constraint: Option<&ReferenceConstraint>,
        sentence_id: usize,
        thread_id: usize,
    ) -> Result<Vec<Translation>, DecodeError> {
        let cx = DecodeContext {
            tm: self.models.tm.as_ref(),
            lm: self.models.lm.as_ref(),
            scorer: &self.scorer,
            settings: &self.settings,
            policy: self.policy.as_ref(),
        };
        let slot = &self.arenas[thread_id % self.arenas.len()];

        // A panic inside model code fails this sentence only. The arena is
        // cleared before every use, so a poisoned lock is safe to reclaim.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut arena = slot.lock().unwrap_or_else(PoisonError::into_inner);
            decode_sentence(&cx, &mut arena, source, n, constraint)
        }))
        .unwrap_or_else(|payload| {
            Err(DecodeError::ModelQuery(ModelError::Panicked(
                panic_message(payload.as_ref()),
            )))
        });

        match &result {
            Ok(list) => debug!(sentence_id, candidates = list.len(), "sentence decoded"),
            Err(e) => warn!(sentence_id, error = %e, "sentence failed"),
        }
        result
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testutil::{abc_fixture, UniformLm};
    use crate::model::{MemoryPhraseTable, PhraseRule};
    use crate::vocab::Symbol;

    /// Wraps a table and misbehaves on sources containing a trigger word.
    struct Tripwire {
        inner: MemoryPhraseTable,
        panic_on: Symbol,
        fail_on: Symbol,
    }

    impl TranslationModel for Tripwire {
        fn query(&self, source: &[Symbol]) -> Result<Vec<PhraseRule>, ModelError> {
            if source.contains(&self.panic_on) {
                panic!("corrupt rule for {:?}", source);
            }
            if source.contains(&self.fail_on) {
                return Err(ModelError::Query {
                    model: "tripwire".into(),
                    reason: "timed out".into(),
                });
            }
            self.inner.query(source)
        }

        fn max_source_len(&self) -> usize {
            self.inner.max_source_len()
        }

        fn name(&self) -> &str {
            "tripwire"
        }
    }

    fn decoder(threads: usize) -> Decoder {
        let fx = abc_fixture();
        let mut settings = fx.settings;
        settings.runtime.threads = threads;
        let tm = Tripwire {
            panic_on: fx.vocab.intern("boom"),
            fail_on: fx.vocab.intern("slow"),
            inner: fx.tm,
        };
        let models = Models {
            vocab: fx.vocab,
            tm: Arc::new(tm),
            lm: Arc::new(UniformLm),
        };
        Decoder::new(models, settings, fx.weights).unwrap()
    }

    fn line(d: &Decoder, text: &str) -> Sequence {
        Sequence::from_line(d.vocabulary(), text)
    }

    #[test]
    fn single_sentence() {
        let d = decoder(1);
        let list = d.decode(&line(&d, "a b c"), 0, 0).unwrap();
        assert_eq!(list[0].output.render(d.vocabulary()), "XY Z");

        let list = d.decode_nbest(&line(&d, "c"), 1, 0, 3).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].output.render(d.vocabulary()), "Z");
    }

    #[test]
    fn force_decode_uses_references() {
        let d = decoder(1);
        let refs = vec![line(&d, "X Y Z")];
        let list = d.force_decode(&line(&d, "a b c"), refs, 0, 0).unwrap();
        assert_eq!(list[0].output.render(d.vocabulary()), "X Y Z");
    }

    #[test]
    fn batch_output_follows_input_order() {
        let d = decoder(4);
        let inputs = ["a b c", "c", "a", "b c", "a b", "c c a"];
        let text: String = inputs
            .iter()
            .cycle()
            .take(60)
            .map(|l| format!("{l}\n"))
            .collect();

        let mut outcomes = Vec::new();
        let summary = d.decode_lines(text.as_bytes(), |o| outcomes.push(o)).unwrap();
        assert_eq!(summary, BatchSummary { submitted: 60, failed: 0 });
        for (i, o) in outcomes.iter().enumerate() {
            assert_eq!(o.sentence_id, i);
            assert_eq!(o.source.render(d.vocabulary()), inputs[i % inputs.len()]);
            assert!(o.result.as_ref().is_ok_and(|l| !l.is_empty()));
        }
    }

    #[test]
    fn faults_stay_with_their_sentence() {
        let d = decoder(2);
        let text = "a b\nboom\nc\nslow a\nq\na b c\n";
        let mut outcomes = Vec::new();
        let summary = d.decode_lines(text.as_bytes(), |o| outcomes.push(o)).unwrap();
        assert_eq!(summary.submitted, 6);
        assert_eq!(summary.failed, 3);

        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            &outcomes[1].result,
            Err(DecodeError::ModelQuery(ModelError::Panicked(msg))) if msg.contains("corrupt rule")
        ));
        assert!(outcomes[2].result.is_ok());
        assert!(matches!(
            &outcomes[3].result,
            Err(DecodeError::ModelQuery(ModelError::Query { .. }))
        ));
        assert!(matches!(
            &outcomes[4].result,
            Err(DecodeError::NoPathFound { source_len: 1 })
        ));
        assert!(outcomes[5].result.is_ok());

        // The worker that hit the panic keeps decoding.
        assert!(d.decode(&line(&d, "a b c"), 7, 1).is_ok());
        assert!(d.decode(&line(&d, "a b c"), 8, 0).is_ok());
    }

    #[test]
    fn per_request_overrides() {
        let d = decoder(2);
        let refs = d.reference_constraint(vec![line(&d, "X Y Z")]).unwrap();
        let requests = vec![
            DecodeRequest::new(line(&d, "a b c")).with_nbest(1001),
            DecodeRequest::new(line(&d, "a b c")).with_references(refs),
        ];
        let mut outcomes = Vec::new();
        d.decode_batch(requests, |o| outcomes.push(o)).unwrap();
        assert!(matches!(
            outcomes[0].result,
            Err(DecodeError::CapacityExceeded { limit: 1000, .. })
        ));
        let forced = outcomes[1].result.as_ref().unwrap();
        assert_eq!(forced[0].output.render(d.vocabulary()), "X Y Z");
    }

    /// Rejects any output containing one word.
    struct AvoidWord(Symbol);

    impl DiversityPolicy for AvoidWord {
        fn penalty(&self, candidate: &[Symbol], _selected: &[&[Symbol]]) -> f64 {
            if candidate.contains(&self.0) {
                10.0
            } else {
                0.0
            }
        }
    }

    #[test]
    fn custom_diversity_policy_reranks() {
        let fx = abc_fixture();
        let mut settings = fx.settings;
        settings.search.recombination = crate::settings::RecombinationMode::None;
        settings.nbest.mode = crate::settings::NbestMode::Diverse;
        let models = Models {
            vocab: Arc::clone(&fx.vocab),
            tm: Arc::new(fx.tm),
            lm: Arc::new(UniformLm),
        };
        let source = Sequence::from_line(&fx.vocab, "a b c");

        let d = Decoder::new(models.clone(), settings.clone(), fx.weights.clone()).unwrap();
        let list = d.decode(&source, 0, 0).unwrap();
        assert_eq!(list[0].output.render(&fx.vocab), "XY Z");

        let xy = fx.vocab.intern("XY");
        let d = Decoder::new(models, settings, fx.weights)
            .unwrap()
            .with_diversity_policy(Arc::new(AvoidWord(xy)));
        let list = d.decode(&source, 0, 0).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].output.render(&fx.vocab), "X Y Z");
        assert!((list[0].score - -3.0).abs() < 1e-9);
    }

    #[test]
    fn cancel_stops_dispatch() {
        let d = decoder(2);
        d.cancel();
        assert!(d.is_cancelled());
        let mut count = 0;
        let summary = d.decode_lines("a\nb\n".as_bytes(), |_| count += 1).unwrap();
        assert_eq!(summary.submitted, 0);
        assert_eq!(count, 0);
    }

    #[test]
    fn configuration_errors_surface_at_construction() {
        let fx = abc_fixture();
        let mut settings = fx.settings.clone();
        settings.search.beam_size = 0;
        let models = Models {
            vocab: Arc::clone(&fx.vocab),
            tm: Arc::new(MemoryPhraseTable::new("empty")),
            lm: Arc::new(UniformLm),
        };
        let err = Decoder::new(models.clone(), settings, Weights::new()).err().unwrap();
        assert!(matches!(err, DecodeError::Configuration(ref m) if m.contains("beam_size")));

        let err = Decoder::new(models, fx.settings, Weights::new()).err().unwrap();
        assert!(matches!(err, DecodeError::Configuration(ref m) if m.contains("no rules")));
    }
}
