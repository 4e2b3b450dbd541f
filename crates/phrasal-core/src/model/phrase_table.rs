use std::collections::HashMap;

use tracing::debug;

use crate::features::{tm_feature_name, FeatureName};
use crate::sequence::Sequence;
use crate::vocab::Symbol;

use super::{ModelError, PhraseAlignment, PhraseRule, TranslationModel};

/// In-memory phrase table keyed by source phrase.
///
/// Dense scores are named `TM.0`, `TM.1`, ... in insertion order of the
/// score columns. Rules for one source phrase are returned in insertion
/// order; ranking happens in the option table.
pub struct MemoryPhraseTable {
    name: String,
    rules: HashMap<Vec<Symbol>, Vec<PhraseRule>>,
    feature_names: Vec<FeatureName>,
    max_source_len: usize,
}

impl MemoryPhraseTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: HashMap::new(),
            feature_names: Vec::new(),
            max_source_len: 0,
        }
    }

    /// Add a rule with dense scores named `TM.<i>`.
    pub fn insert(
        &mut self,
        source: &[Symbol],
        target: Sequence,
        scores: &[f64],
        alignment: Option<PhraseAlignment>,
    ) {
        while self.feature_names.len() < scores.len() {
            let next = tm_feature_name(self.feature_names.len());
            self.feature_names.push(next);
        }
        let features = scores
            .iter()
            .zip(&self.feature_names)
            .map(|(&v, name)| (FeatureName::clone(name), v))
            .collect();
        self.insert_rule(
            source,
            PhraseRule {
                target,
                features,
                alignment,
            },
        );
    }

    /// Add a rule with an arbitrary feature vector.
    pub fn insert_rule(&mut self, source: &[Symbol], rule: PhraseRule) {
        if source.is_empty() {
            return;
        }
        self.max_source_len = self.max_source_len.max(source.len());
        self.rules.entry(source.to_vec()).or_default().push(rule);
    }

    /// Build from `(source, [(target, scores)])` entries.
    pub fn from_entries(
        name: impl Into<String>,
        entries: Vec<(Vec<Symbol>, Vec<(Sequence, Vec<f64>)>)>,
    ) -> Self {
        let mut table = Self::new(name);
        for (source, targets) in entries {
            for (target, scores) in targets {
                table.insert(&source, target, &scores, None);
            }
        }
        debug!(
            table = table.name.as_str(),
            sources = table.rules.len(),
            "phrase table built"
        );
        table
    }

    /// Number of distinct source phrases.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }
}

impl TranslationModel for MemoryPhraseTable {
    fn query(&self, source: &[Symbol]) -> Result<Vec<PhraseRule>, ModelError> {
        Ok(self.rules.get(source).cloned().unwrap_or_default())
    }

    fn max_source_len(&self) -> usize {
        self.max_source_len
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MemoryPhraseTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPhraseTable")
            .field("name", &self.name)
            .field("sources", &self.rules.len())
            .field("max_source_len", &self.max_source_len)
            .finish()
    }
}
