use std::sync::Arc;

use crate::features::{origin_feature_name, FeatureName};
use crate::vocab::Symbol;

use super::{ModelError, PhraseRule, TranslationModel};

/// Independent phrase tables queried side by side.
///
/// Rules from every table are unioned per span. Each rule is tagged with a
/// `TM.origin.<table>` feature so the weights can prefer one source over
/// another; nothing is filtered or deduplicated here.
pub struct CompositeTranslationModel {
    layers: Vec<(Arc<dyn TranslationModel>, FeatureName)>,
    name: String,
}

impl CompositeTranslationModel {
    pub fn new(layers: Vec<Arc<dyn TranslationModel>>) -> Self {
        let name = layers
            .iter()
            .map(|l| l.name().to_string())
            .collect::<Vec<_>>()
            .join("+");
        let layers = layers
            .into_iter()
            .map(|l| {
                let tag = origin_feature_name(l.name());
                (l, tag)
            })
            .collect();
        Self { layers, name }
    }
}

impl TranslationModel for CompositeTranslationModel {
    fn query(&self, source: &[Symbol]) -> Result<Vec<PhraseRule>, ModelError> {
        let mut all = Vec::new();
        for (layer, tag) in &self.layers {
            if source.len() > layer.max_source_len() {
                continue;
            }
            for mut rule in layer.query(source)? {
                rule.features.add_named(tag, 1.0);
                all.push(rule);
            }
        }
        Ok(all)
    }

    fn max_source_len(&self) -> usize {
        self.layers
            .iter()
            .map(|(l, _)| l.max_source_len())
            .max()
            .unwrap_or(0)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
