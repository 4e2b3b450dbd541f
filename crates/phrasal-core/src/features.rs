//! Named features and the log-linear scorer.
//!
//! Feature identity is by name. A `FeatureVector` is a short list of
//! `(name, value)` pairs; `Weights` maps names to weights, with missing
//! names weighing zero. The `Scorer` caches the weights of the features the
//! search computes on the fly so the inner loop never hashes a name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::settings::SettingsError;

pub type FeatureName = Arc<str>;

pub const LM: &str = "LM";
pub const LINEAR_DISTORTION: &str = "LinearDistortion";
pub const WORD_PENALTY: &str = "WordPenalty";
pub const PHRASE_PENALTY: &str = "PhrasePenalty";
pub const UNKNOWN_WORD: &str = "UnknownWord";
pub const TM_PREFIX: &str = "TM.";
pub const ORIGIN_PREFIX: &str = "TM.origin.";

/// Name of the `index`-th dense phrase-table score.
pub fn tm_feature_name(index: usize) -> FeatureName {
    Arc::from(format!("{TM_PREFIX}{index}"))
}

/// Name of the feature that tags an option with the table it came from.
pub fn origin_feature_name(model: &str) -> FeatureName {
    Arc::from(format!("{ORIGIN_PREFIX}{model}"))
}

/// Sparse named feature values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(FeatureName, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` to feature `name`, creating it if absent.
    pub fn add(&mut self, name: &str, value: f64) {
        if let Some(e) = self.entries.iter_mut().find(|(n, _)| &**n == name) {
            e.1 += value;
        } else {
            self.entries.push((Arc::from(name), value));
        }
    }

    /// Like `add`, reusing an already-allocated name.
    pub fn add_named(&mut self, name: &FeatureName, value: f64) {
        if let Some(e) = self.entries.iter_mut().find(|(n, _)| n == name) {
            e.1 += value;
        } else {
            self.entries.push((Arc::clone(name), value));
        }
    }

    /// Element-wise sum into `self`.
    pub fn merge(&mut self, other: &FeatureVector) {
        for (name, value) in &other.entries {
            self.add_named(name, *value);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (&**n, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by name, for stable output.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut v: Vec<(&str, f64)> = self.iter().collect();
        v.sort_by(|a, b| a.0.cmp(b.0));
        v
    }
}

impl FromIterator<(FeatureName, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (FeatureName, f64)>>(iter: I) -> Self {
        let mut fv = FeatureVector::new();
        for (name, value) in iter {
            fv.add_named(&name, value);
        }
        fv
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.sorted().into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

/// Feature weights. Unknown names weigh 0.
#[derive(Debug, Clone, Default)]
pub struct Weights {
    map: HashMap<Arc<str>, f64>,
}

impl Weights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &HashMap<String, f64>) -> Self {
        Self {
            map: map
                .iter()
                .map(|(k, v)| (Arc::from(k.as_str()), *v))
                .collect(),
        }
    }

    pub fn set(&mut self, name: &str, weight: f64) {
        self.map.insert(Arc::from(name), weight);
    }

    pub fn with(mut self, name: &str, weight: f64) -> Self {
        self.set(name, weight);
        self
    }

    pub fn get(&self, name: &str) -> f64 {
        self.map.get(name).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Parse the plain-text weights format: one `name value` pair per line,
    /// blank lines and `#` comments ignored.
    pub fn parse_text(text: &str) -> Result<Self, SettingsError> {
        let mut weights = Weights::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(SettingsError::InvalidValue {
                    field: format!("weights line {}", lineno + 1),
                    reason: "expected `name value`".to_string(),
                });
            };
            let w: f64 = value.parse().map_err(|_| SettingsError::InvalidValue {
                field: format!("weights.{name}"),
                reason: format!("`{value}` is not a number"),
            })?;
            if !w.is_finite() {
                return Err(SettingsError::InvalidValue {
                    field: format!("weights.{name}"),
                    reason: "must be a finite number".to_string(),
                });
            }
            weights.set(name, w);
        }
        Ok(weights)
    }

    /// Overlay `other` on top of `self`; names present in both take `other`'s weight.
    pub fn extend(&mut self, other: &Weights) {
        for (k, v) in &other.map {
            self.map.insert(Arc::clone(k), *v);
        }
    }
}

/// Log-linear scorer: `score = Σ weight(name) · value`.
///
/// Pure and deterministic. The weights of the dynamic features (LM,
/// distortion) are resolved once at construction.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: Arc<Weights>,
    lm: f64,
    distortion: f64,
}

impl Scorer {
    pub fn new(weights: Arc<Weights>) -> Self {
        let lm = weights.get(LM);
        let distortion = weights.get(LINEAR_DISTORTION);
        Self {
            weights,
            lm,
            distortion,
        }
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Dot product of `features` with the weight vector.
    pub fn score(&self, features: &FeatureVector) -> f64 {
        features
            .entries
            .iter()
            .map(|(name, value)| self.weights.get(name) * value)
            .sum()
    }

    /// Weighted contribution of an incremental LM log-probability.
    pub fn lm_score(&self, logprob: f64) -> f64 {
        self.lm * logprob
    }

    /// Weighted contribution of a source jump of `distance` positions.
    ///
    /// The `LinearDistortion` feature value is the negated distance, so a
    /// positive weight penalizes reordering.
    pub fn distortion_score(&self, distance: usize) -> f64 {
        -(distance as f64) * self.distortion
    }
}
