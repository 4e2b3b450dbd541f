//! Decoder settings loaded from TOML.
//!
//! - `parse_settings_toml(toml)` parses and validates a full settings file
//! - `Settings::default()` parses the embedded `default_settings.toml`
//! - There is no global instance: the `Decoder` owns the `Settings` it was
//!   built with, so several decoders with different settings can coexist.

use std::collections::HashMap;

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

/// Hard upper bound on any n-best request.
pub const MAX_NBEST_SIZE: usize = 1000;

/// Force decoding keeps one bit per reference in each hypothesis.
pub const MAX_FORCE_DECODE_REFERENCES: usize = 64;

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub search: SearchSettings,
    pub nbest: NbestSettings,
    #[serde(default)]
    pub input: InputSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub force_decode: ForceDecodeSettings,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

impl Default for Settings {
    fn default() -> Self {
        parse_settings_toml(DEFAULT_SETTINGS_TOML).expect("embedded settings TOML must be valid")
    }
}

/// Search algorithm selected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchAlgorithm {
    /// Cube pruning over (hypothesis rank × option rank) lattices.
    Cube,
    /// Stack search with one beam per coverage cardinality.
    Multibeam,
}

/// How aggressively equivalent hypotheses are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecombinationMode {
    /// Coverage, right boundary, LM context, pending gaps and ITG blocks.
    Exact,
    /// Like `Exact` but ignores the ITG block stack.
    Dtu,
    /// Coverage, right boundary and LM context only.
    #[serde(alias = "pharoah")]
    Pharaoh,
    /// Coverage and right boundary only. Lossy: ignores the LM context.
    Coverage,
    /// Never merge. Exhaustive within the beam.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NbestMode {
    Standard,
    Diverse,
    Combined,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    pub algorithm: SearchAlgorithm,
    pub beam_size: usize,
    #[serde(default)]
    pub pop_limit: usize,
    pub distortion_limit: i64,
    pub max_phrase_length: usize,
    pub rule_query_limit: usize,
    #[serde(default)]
    pub use_itg_constraints: bool,
    pub recombination: RecombinationMode,
    #[serde(default)]
    pub drop_unknown_words: bool,
    #[serde(default)]
    pub gaps: GapSettings,
}

impl SearchSettings {
    /// `None` when the distortion limit is unbounded.
    pub fn distortion_limit(&self) -> Option<usize> {
        usize::try_from(self.distortion_limit).ok()
    }

    /// Cube-pruning pop limit, defaulting to the beam size.
    pub fn effective_pop_limit(&self) -> usize {
        if self.pop_limit == 0 {
            self.beam_size
        } else {
            self.pop_limit
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GapSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_pending_phrases")]
    pub max_pending_phrases: usize,
    #[serde(default)]
    pub in_future_cost: bool,
}

fn default_max_pending_phrases() -> usize {
    2
}

impl Default for GapSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_pending_phrases: default_max_pending_phrases(),
            in_future_cost: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NbestSettings {
    pub size: usize,
    #[serde(default)]
    pub distinct: bool,
    pub mode: NbestMode,
    #[serde(default = "default_diversity_penalty")]
    pub diversity_penalty: f64,
    #[serde(default = "default_true")]
    pub include_features: bool,
    #[serde(default)]
    pub include_alignment: bool,
}

fn default_diversity_penalty() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputSettings {
    #[serde(default)]
    pub max_sentence_length: Option<usize>,
    #[serde(default)]
    pub min_sentence_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSettings {
    pub threads: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForceDecodeSettings {
    #[serde(default)]
    pub prefix: bool,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

pub fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_positive_usize {
        ($section:ident . $field:ident) => {
            if s.$section.$field == 0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }
    macro_rules! check_finite {
        ($field:expr, $value:expr) => {
            if !$value.is_finite() {
                return Err(SettingsError::InvalidValue {
                    field: $field.to_string(),
                    reason: "must be a finite number".to_string(),
                });
            }
        };
    }

    check_positive_usize!(search.beam_size);
    check_positive_usize!(search.max_phrase_length);
    check_positive_usize!(search.rule_query_limit);
    check_positive_usize!(nbest.size);
    check_positive_usize!(runtime.threads);

    if s.nbest.size > MAX_NBEST_SIZE {
        return Err(SettingsError::InvalidValue {
            field: "nbest.size".to_string(),
            reason: format!("must not exceed {MAX_NBEST_SIZE}"),
        });
    }
    if s.search.gaps.enabled && s.search.gaps.max_pending_phrases == 0 {
        return Err(SettingsError::InvalidValue {
            field: "search.gaps.max_pending_phrases".to_string(),
            reason: "must be positive when gaps are enabled".to_string(),
        });
    }
    check_finite!("nbest.diversity_penalty", s.nbest.diversity_penalty);
    if s.nbest.diversity_penalty < 0.0 {
        return Err(SettingsError::InvalidValue {
            field: "nbest.diversity_penalty".to_string(),
            reason: "must be non-negative".to_string(),
        });
    }
    if let Some(max) = s.input.max_sentence_length {
        if max < s.input.min_sentence_length {
            return Err(SettingsError::InvalidValue {
                field: "input.max_sentence_length".to_string(),
                reason: "must not be below input.min_sentence_length".to_string(),
            });
        }
    }
    for (name, w) in &s.weights {
        check_finite!(format!("weights.{name}"), *w);
    }

    Ok(())
}
