//! Model identifiers and where their files come from.
//!
//! An identifier is either a local directory holding the MusicGen ONNX files
//! or one of the registered names below, which map to the ONNX exports on
//! HuggingFace and to a subdirectory of the model cache.

use std::path::{Path, PathBuf};

use crate::error::{GeneratorError, Result};
use crate::types::ModelConfig;

/// Model loaded when no identifier is configured.
pub const DEFAULT_MODEL_ID: &str = "facebook/musicgen-medium";

/// Files every model directory must contain.
pub const REQUIRED_MODEL_FILES: &[&str] = &[
    "tokenizer.json",
    "text_encoder.onnx",
    "decoder_model.onnx",
    "decoder_with_past_model.onnx",
    "encodec_decode.onnx",
];

/// Optional architecture description; defaults are used when absent.
pub const CONFIG_FILE: &str = "config.json";

const HF_BASE_URL: &str = "https://huggingface.co/gabotechs/music_gen/resolve/main";

/// A model the registry knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredModel {
    /// Identifier accepted in the configuration.
    pub id: &'static str,
    /// Remote folder holding `config.json` and `tokenizer.json`.
    pub config_folder: &'static str,
    /// Remote folder holding the ONNX graphs; also the cache subdirectory.
    pub weights_folder: &'static str,
    /// Whether this is a medium-sized checkpoint.
    pub medium: bool,
}

impl RegisteredModel {
    /// Download URL for one of the model files.
    pub fn url_for(&self, file: &str) -> String {
        let folder = if file.ends_with(".onnx") {
            self.weights_folder
        } else {
            self.config_folder
        };
        format!("{}/{}/{}", HF_BASE_URL, folder, file)
    }

    /// Architecture used when the model directory has no `config.json`.
    pub fn default_config(&self) -> ModelConfig {
        if self.medium {
            ModelConfig::musicgen_medium()
        } else {
            ModelConfig::musicgen_small()
        }
    }
}

/// Registered models.
pub const REGISTERED_MODELS: &[RegisteredModel] = &[
    RegisteredModel {
        id: "facebook/musicgen-small",
        config_folder: "small",
        weights_folder: "small",
        medium: false,
    },
    RegisteredModel {
        id: "musicgen-small-fp16",
        config_folder: "small",
        weights_folder: "small_fp16",
        medium: false,
    },
    RegisteredModel {
        id: "facebook/musicgen-medium",
        config_folder: "medium",
        weights_folder: "medium",
        medium: true,
    },
    RegisteredModel {
        id: "musicgen-medium-fp16",
        config_folder: "medium",
        weights_folder: "medium_fp16",
        medium: true,
    },
];

/// Looks up a registered identifier.
pub fn find_registered(model_id: &str) -> Option<&'static RegisteredModel> {
    REGISTERED_MODELS.iter().find(|m| m.id == model_id)
}

/// Where a model's files live and how to fetch the missing ones.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    /// Directory the files are loaded from.
    pub dir: PathBuf,
    /// Registry entry, or None for a local directory.
    pub registered: Option<&'static RegisteredModel>,
}

impl ResolvedModel {
    /// `(file, url)` pairs for every file that can be downloaded.
    pub fn downloads(&self) -> Vec<(&'static str, String)> {
        let Some(model) = self.registered else {
            return Vec::new();
        };
        REQUIRED_MODEL_FILES
            .iter()
            .chain(std::iter::once(&CONFIG_FILE))
            .map(|file| (*file, model.url_for(file)))
            .collect()
    }

    /// Architecture defaults for this model.
    pub fn default_config(&self) -> ModelConfig {
        match self.registered {
            Some(model) => model.default_config(),
            None => ModelConfig::default(),
        }
    }
}

/// Resolves a model identifier against the filesystem and the registry.
///
/// Fails with MODEL_NOT_FOUND when the identifier is neither an existing
/// directory nor a registered name.
pub fn resolve(model_id: &str, cache_dir: &Path) -> Result<ResolvedModel> {
    let local = Path::new(model_id);
    if local.is_dir() {
        return Ok(ResolvedModel {
            dir: local.to_path_buf(),
            registered: None,
        });
    }

    match find_registered(model_id) {
        Some(model) => Ok(ResolvedModel {
            dir: cache_dir.join(model.weights_folder),
            registered: Some(model),
        }),
        None => Err(GeneratorError::model_not_found(format!(
            "'{}' is not a model directory or a registered model (known: {})",
            model_id,
            REGISTERED_MODELS
                .iter()
                .map(|m| m.id)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}
