//! JSON-backed catalog of provider endpoints and selectable models (`models.json`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::PersistenceError;
use crate::utils::{atomic_write_json, read_json};

pub const TTS_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Models chosen for one feature; absent keys are "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_voice: Option<String>,
}

impl ModelSelection {
    pub fn llm(llm: impl Into<String>) -> Self {
        Self { llm: Some(llm.into()), ..Default::default() }
    }

    /// Overwrite only the keys `update` provides with a non-blank value.
    pub fn merge(&mut self, update: &ModelSelection) {
        fn pick(slot: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *slot = Some(v.to_string());
            }
        }
        pick(&mut self.llm, &update.llm);
        pick(&mut self.tts, &update.tts);
        pick(&mut self.tts_voice, &update.tts_voice);
    }

    pub fn is_empty(&self) -> bool {
        self.llm.is_none() && self.tts.is_none() && self.tts_voice.is_none()
    }
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Llm,
    Tts,
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm" => Ok(ModelKind::Llm),
            "tts" => Ok(ModelKind::Tts),
            other => Err(format!("unknown model type '{}' (expected llm or tts)", other)),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Llm => "llm",
            ModelKind::Tts => "tts",
        })
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0} already exists")]
    Duplicate(String),
    #[error("{0} not found")]
    Missing(String),
    #[error("endpoint '{0}' is not defined")]
    UnknownEndpoint(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDefinition {
    pub id: String,
    pub name: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voices: Vec<String>,
}

/// Fields of an endpoint to overwrite; `None` leaves the stored value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EndpointPatch {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelPatch {
    pub name: Option<String>,
    pub endpoint: Option<String>,
    pub enabled: Option<bool>,
    pub voices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelLists {
    #[serde(default)]
    pub llm: Vec<ModelDefinition>,
    #[serde(default)]
    pub tts: Vec<ModelDefinition>,
}

impl ModelLists {
    fn of(&self, kind: ModelKind) -> &Vec<ModelDefinition> {
        match kind {
            ModelKind::Llm => &self.llm,
            ModelKind::Tts => &self.tts,
        }
    }

    fn of_mut(&mut self, kind: ModelKind) -> &mut Vec<ModelDefinition> {
        match kind {
            ModelKind::Llm => &mut self.llm,
            ModelKind::Tts => &mut self.tts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub endpoints: Vec<EndpointDefinition>,
    #[serde(default)]
    pub models: ModelLists,
    #[serde(default)]
    pub defaults: BTreeMap<String, ModelSelection>,
    #[serde(default)]
    pub last_selected: BTreeMap<String, ModelSelection>,
}

impl Default for CatalogDocument {
    fn default() -> Self {
        let llm = |id: &str, name: &str| ModelDefinition {
            id: id.to_string(),
            name: name.to_string(),
            endpoint: Some("openai".to_string()),
            enabled: true,
            voices: Vec::new(),
        };
        let tts = |id: &str, name: &str| ModelDefinition {
            voices: TTS_VOICES.iter().map(|v| v.to_string()).collect(),
            ..llm(id, name)
        };

        let mut defaults = BTreeMap::new();
        defaults.insert(
            "english".to_string(),
            ModelSelection {
                llm: Some("gpt-5-mini".to_string()),
                tts: Some("tts-1".to_string()),
                tts_voice: Some("alloy".to_string()),
            },
        );
        defaults.insert("math".to_string(), ModelSelection::llm("gpt-5-mini"));

        Self {
            endpoints: vec![EndpointDefinition {
                id: "openai".to_string(),
                name: "OpenAI".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                enabled: true,
            }],
            models: ModelLists {
                llm: vec![
                    llm("gpt-4o", "GPT-4o"),
                    llm("gpt-4o-mini", "GPT-4o Mini"),
                    llm("gpt-5", "GPT-5"),
                    llm("gpt-5-mini", "GPT-5 Mini"),
                    llm("o1", "O1"),
                    llm("o1-mini", "O1 Mini"),
                    llm("o3-mini", "O3 Mini"),
                ],
                tts: vec![tts("tts-1", "TTS-1"), tts("tts-1-hd", "TTS-1 HD")],
            },
            defaults,
            last_selected: BTreeMap::new(),
        }
    }
}

pub struct ModelCatalog {
    path: PathBuf,
    document: RwLock<CatalogDocument>,
}

impl ModelCatalog {
    /// Load `path`, writing the built-in catalog there when the file is missing.
    /// A corrupt file is left untouched and the built-in catalog is used.
    pub fn load_or_create(path: &Path) -> Self {
        let document = match read_json::<CatalogDocument>(path) {
            Ok(document) => {
                info!("Loaded model catalog from {}", path.display());
                document
            }
            Err(PersistenceError::NotFound) => {
                let document = CatalogDocument::default();
                match atomic_write_json(path, &document) {
                    Ok(()) => info!("Created default model catalog at {}", path.display()),
                    Err(e) => warn!("Could not write default model catalog {}: {}", path.display(), e),
                }
                document
            }
            Err(e) => {
                warn!("Model catalog {} unreadable, using built-in defaults: {}", path.display(), e);
                CatalogDocument::default()
            }
        };
        Self::from_document(path, document)
    }

    pub fn from_document(path: &Path, document: CatalogDocument) -> Self {
        Self {
            path: path.to_path_buf(),
            document: RwLock::new(document),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&CatalogDocument) -> R) -> R {
        let guard = self.document.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Apply `f` to a copy of the document, persist it, then publish it.
    /// Nothing changes in memory when `f` or the write fails.
    fn edit<R>(&self, f: impl FnOnce(&mut CatalogDocument) -> Result<R, CatalogError>) -> Result<R, CatalogError> {
        let mut guard = self.document.write().unwrap_or_else(PoisonError::into_inner);
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        atomic_write_json(&self.path, &draft)?;
        *guard = draft;
        Ok(out)
    }

    pub fn document(&self) -> CatalogDocument {
        self.read(CatalogDocument::clone)
    }

    /// Re-read the file. On failure the current document stays in effect.
    pub fn reload(&self) -> Result<(), PersistenceError> {
        let document = read_json::<CatalogDocument>(&self.path)?;
        *self.document.write().unwrap_or_else(PoisonError::into_inner) = document;
        info!("Reloaded model catalog from {}", self.path.display());
        Ok(())
    }

    pub fn endpoints(&self) -> Vec<EndpointDefinition> {
        self.read(|doc| doc.endpoints.clone())
    }

    pub fn endpoint(&self, id: &str) -> Option<EndpointDefinition> {
        self.read(|doc| doc.endpoints.iter().find(|e| e.id == id).cloned())
    }

    /// Enabled endpoint serving the enabled model `model`, if the catalog assigns one.
    pub fn endpoint_for_model(&self, model: &str) -> Option<EndpointDefinition> {
        self.read(|doc| {
            let endpoint_id = doc
                .models
                .llm
                .iter()
                .chain(doc.models.tts.iter())
                .find(|m| m.enabled && m.id == model)?
                .endpoint
                .clone()?;
            doc.endpoints.iter().find(|e| e.enabled && e.id == endpoint_id).cloned()
        })
    }

    pub fn add_endpoint(&self, endpoint: EndpointDefinition) -> Result<EndpointDefinition, CatalogError> {
        self.edit(|doc| {
            if doc.endpoints.iter().any(|e| e.id == endpoint.id) {
                return Err(CatalogError::Duplicate(format!("endpoint '{}'", endpoint.id)));
            }
            doc.endpoints.push(endpoint.clone());
            Ok(endpoint)
        })
    }

    pub fn update_endpoint(&self, id: &str, patch: &EndpointPatch) -> Result<EndpointDefinition, CatalogError> {
        self.edit(|doc| {
            let endpoint = doc
                .endpoints
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| CatalogError::Missing(format!("endpoint '{}'", id)))?;
            if let Some(name) = &patch.name {
                endpoint.name = name.clone();
            }
            if let Some(base_url) = &patch.base_url {
                endpoint.base_url = base_url.clone();
            }
            if let Some(env) = &patch.api_key_env {
                endpoint.api_key_env = if env.is_empty() { None } else { Some(env.clone()) };
            }
            if let Some(enabled) = patch.enabled {
                endpoint.enabled = enabled;
            }
            Ok(endpoint.clone())
        })
    }

    pub fn delete_endpoint(&self, id: &str) -> Result<(), CatalogError> {
        self.edit(|doc| {
            let before = doc.endpoints.len();
            doc.endpoints.retain(|e| e.id != id);
            if doc.endpoints.len() == before {
                return Err(CatalogError::Missing(format!("endpoint '{}'", id)));
            }
            Ok(())
        })
    }

    /// Enabled LLM models.
    pub fn llm_models(&self) -> Vec<ModelDefinition> {
        self.models(ModelKind::Llm, false)
    }

    /// Enabled TTS models.
    pub fn tts_models(&self) -> Vec<ModelDefinition> {
        self.models(ModelKind::Tts, false)
    }

    pub fn models(&self, kind: ModelKind, include_disabled: bool) -> Vec<ModelDefinition> {
        self.read(|doc| {
            doc.models
                .of(kind)
                .iter()
                .filter(|m| include_disabled || m.enabled)
                .cloned()
                .collect()
        })
    }

    pub fn add_model(&self, kind: ModelKind, model: ModelDefinition) -> Result<ModelDefinition, CatalogError> {
        self.edit(|doc| {
            check_endpoint(doc, model.endpoint.as_deref())?;
            let models = doc.models.of_mut(kind);
            if models.iter().any(|m| m.id == model.id) {
                return Err(CatalogError::Duplicate(format!("{} model '{}'", kind, model.id)));
            }
            models.push(model.clone());
            Ok(model)
        })
    }

    pub fn update_model(&self, kind: ModelKind, id: &str, patch: &ModelPatch) -> Result<ModelDefinition, CatalogError> {
        self.edit(|doc| {
            check_endpoint(doc, patch.endpoint.as_deref())?;
            let model = doc
                .models
                .of_mut(kind)
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| CatalogError::Missing(format!("{} model '{}'", kind, id)))?;
            if let Some(name) = &patch.name {
                model.name = name.clone();
            }
            if let Some(endpoint) = &patch.endpoint {
                model.endpoint = Some(endpoint.clone());
            }
            if let Some(enabled) = patch.enabled {
                model.enabled = enabled;
            }
            if let Some(voices) = &patch.voices {
                model.voices = voices.clone();
            }
            Ok(model.clone())
        })
    }

    pub fn delete_model(&self, kind: ModelKind, id: &str) -> Result<(), CatalogError> {
        self.edit(|doc| {
            let models = doc.models.of_mut(kind);
            let before = models.len();
            models.retain(|m| m.id != id);
            if models.len() == before {
                return Err(CatalogError::Missing(format!("{} model '{}'", kind, id)));
            }
            Ok(())
        })
    }

    pub fn is_known_llm(&self, id: &str) -> bool {
        self.read(|doc| doc.models.llm.iter().any(|m| m.enabled && m.id == id))
    }

    pub fn is_known_tts(&self, id: &str) -> bool {
        self.read(|doc| doc.models.tts.iter().any(|m| m.enabled && m.id == id))
    }

    pub fn defaults(&self, feature: &str) -> ModelSelection {
        self.read(|doc| doc.defaults.get(feature).cloned().unwrap_or_default())
    }

    /// Replace the feature's defaults wholesale.
    pub fn set_defaults(&self, feature: &str, defaults: ModelSelection) -> Result<ModelSelection, CatalogError> {
        self.edit(|doc| {
            doc.defaults.insert(feature.to_string(), defaults.clone());
            Ok(defaults)
        })
    }

    pub fn last_selected(&self, feature: &str) -> ModelSelection {
        self.read(|doc| doc.last_selected.get(feature).cloned().unwrap_or_default())
    }

    /// Features named in either `defaults` or `last_selected`.
    pub fn features(&self) -> Vec<String> {
        self.read(|doc| {
            let mut features: Vec<String> =
                doc.defaults.keys().chain(doc.last_selected.keys()).cloned().collect();
            features.sort();
            features.dedup();
            features
        })
    }

    /// Merge `selection` into the feature's last selection and persist the catalog.
    ///
    /// The in-memory catalog is updated even when the write fails.
    pub fn set_last_selected(
        &self,
        feature: &str,
        selection: &ModelSelection,
    ) -> Result<ModelSelection, PersistenceError> {
        let mut guard = self.document.write().unwrap_or_else(PoisonError::into_inner);
        let current = guard.last_selected.entry(feature.to_string()).or_default();
        current.merge(selection);
        let merged = current.clone();
        atomic_write_json(&self.path, &*guard)?;
        Ok(merged)
    }
}

fn check_endpoint(doc: &CatalogDocument, endpoint: Option<&str>) -> Result<(), CatalogError> {
    match endpoint {
        Some(id) if !doc.endpoints.iter().any(|e| e.id == id) => Err(CatalogError::UnknownEndpoint(id.to_string())),
        _ => Ok(()),
    }
}
