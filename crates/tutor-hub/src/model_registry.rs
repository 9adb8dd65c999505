//! Per-feature model selection (`english`, `math`, ...).
//!
//! Seeded from environment defaults, then the catalog's `defaults`, then its
//! `last_selected`. Updates write through to the catalog when one is attached.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::model_catalog::{ModelCatalog, ModelSelection};

pub const FEATURE_ENGLISH: &str = "english";
pub const FEATURE_MATH: &str = "math";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSlot {
    Llm,
    Tts,
    TtsVoice,
}

impl FromStr for ModelSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm" => Ok(ModelSlot::Llm),
            "tts" => Ok(ModelSlot::Tts),
            "tts_voice" => Ok(ModelSlot::TtsVoice),
            other => Err(format!("unknown model slot '{}'", other)),
        }
    }
}

impl fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelSlot::Llm => "llm",
            ModelSlot::Tts => "tts",
            ModelSlot::TtsVoice => "tts_voice",
        };
        f.write_str(name)
    }
}

fn slot_value(selection: &ModelSelection, slot: ModelSlot) -> Option<&String> {
    match slot {
        ModelSlot::Llm => selection.llm.as_ref(),
        ModelSlot::Tts => selection.tts.as_ref(),
        ModelSlot::TtsVoice => selection.tts_voice.as_ref(),
    }
}

/// Environment-level fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDefaults {
    pub llm: String,
    pub tts: String,
    pub tts_voice: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            llm: "gpt-5-mini".to_string(),
            tts: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
        }
    }
}

pub struct ModelRegistry {
    by_feature: RwLock<BTreeMap<String, ModelSelection>>,
    catalog: Option<Arc<ModelCatalog>>,
    defaults: ModelDefaults,
}

impl ModelRegistry {
    pub fn new(defaults: ModelDefaults, catalog: Option<Arc<ModelCatalog>>) -> Self {
        let mut by_feature = BTreeMap::new();
        by_feature.insert(
            FEATURE_ENGLISH.to_string(),
            ModelSelection {
                llm: Some(defaults.llm.clone()),
                tts: Some(defaults.tts.clone()),
                tts_voice: Some(defaults.tts_voice.clone()),
            },
        );
        by_feature.insert(FEATURE_MATH.to_string(), ModelSelection::llm(defaults.llm.clone()));

        if let Some(catalog) = &catalog {
            for feature in catalog.features() {
                let entry: &mut ModelSelection = by_feature.entry(feature.clone()).or_default();
                entry.merge(&catalog.defaults(&feature));
                entry.merge(&catalog.last_selected(&feature));
            }
        }

        for (feature, selection) in &by_feature {
            info!("Model selection for {}: {:?}", feature, selection);
        }

        Self {
            by_feature: RwLock::new(by_feature),
            catalog,
            defaults,
        }
    }

    pub fn catalog(&self) -> Option<&Arc<ModelCatalog>> {
        self.catalog.as_ref()
    }

    pub fn defaults(&self) -> &ModelDefaults {
        &self.defaults
    }

    /// Never fails: unknown features or unset slots yield `fallback`.
    pub fn get(&self, feature: &str, slot: ModelSlot, fallback: Option<&str>) -> Option<String> {
        let guard = self.by_feature.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(feature)
            .and_then(|selection| slot_value(selection, slot).cloned())
            .or_else(|| fallback.map(str::to_string))
    }

    pub fn all(&self) -> BTreeMap<String, ModelSelection> {
        self.by_feature.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Partial update: only provided keys change. Returns the feature's new selection.
    pub fn set_models(&self, feature: &str, update: &ModelSelection) -> ModelSelection {
        let updated = {
            let mut guard = self.by_feature.write().unwrap_or_else(PoisonError::into_inner);
            let entry = guard.entry(feature.to_string()).or_default();
            entry.merge(update);
            entry.clone()
        };

        if let Some(catalog) = &self.catalog {
            if !update.is_empty() {
                if let Err(e) = catalog.set_last_selected(feature, update) {
                    warn!("Could not persist model selection for {}: {}", feature, e);
                }
            }
        }
        info!("Updated model selection for {}: {:?}", feature, updated);
        updated
    }

    /// The requested LLM when the catalog knows it, otherwise the feature's selection.
    pub fn resolve_llm(&self, feature: &str, requested: Option<&str>) -> String {
        let requested = requested.map(str::trim).filter(|m| !m.is_empty());
        if let Some(model) = requested {
            match &self.catalog {
                Some(catalog) if catalog.is_known_llm(model) => return model.to_string(),
                None => return model.to_string(),
                Some(_) => warn!("Unknown LLM '{}' requested; using {} default", model, feature),
            }
        }
        self.get(feature, ModelSlot::Llm, Some(&self.defaults.llm))
            .unwrap_or_else(|| self.defaults.llm.clone())
    }

    pub fn resolve_tts(&self, requested: Option<&str>) -> String {
        let requested = requested.map(str::trim).filter(|m| !m.is_empty());
        if let Some(model) = requested {
            match &self.catalog {
                Some(catalog) if catalog.is_known_tts(model) => return model.to_string(),
                None => return model.to_string(),
                Some(_) => warn!("Unknown TTS model '{}' requested; using default", model),
            }
        }
        self.get(FEATURE_ENGLISH, ModelSlot::Tts, Some(&self.defaults.tts))
            .unwrap_or_else(|| self.defaults.tts.clone())
    }

    pub fn default_voice(&self) -> String {
        self.get(FEATURE_ENGLISH, ModelSlot::TtsVoice, Some(&self.defaults.tts_voice))
            .unwrap_or_else(|| self.defaults.tts_voice.clone())
    }
}
