//! Model loader for MusicGen ONNX models.
//!
//! Checks model directories, builds ONNX sessions pinned to a device, and
//! reads the model configuration.

use std::path::Path;

use ort::session::Session;
use tracing::info;

use crate::error::{GeneratorError, Result};
use crate::types::ModelConfig;

use super::device::ComputeDevice;
use super::registry::{CONFIG_FILE, REQUIRED_MODEL_FILES};

/// Session options shared by every graph of one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Device the sessions run on.
    pub device: ComputeDevice,
    /// Intra-op thread count, if overridden.
    pub threads: Option<u32>,
}

impl SessionOptions {
    pub fn new(device: ComputeDevice, threads: Option<u32>) -> Self {
        Self { device, threads }
    }

    /// Builds a session for one ONNX file.
    pub fn load_session(&self, path: &Path) -> Result<Session> {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut builder = Session::builder().map_err(|e| {
            GeneratorError::model_load_failed(format!("Failed to create session: {}", e))
        })?;

        builder = builder
            .with_execution_providers([self.device.execution_provider()])
            .map_err(|e| {
                GeneratorError::model_load_failed(format!(
                    "Failed to set execution provider {}: {}",
                    self.device, e
                ))
            })?;

        if let Some(threads) = self.threads {
            builder = builder.with_intra_threads(threads as usize).map_err(|e| {
                GeneratorError::model_load_failed(format!("Failed to set thread count: {}", e))
            })?;
        }

        builder.commit_from_file(path).map_err(|e| {
            GeneratorError::model_load_failed(format!("Failed to load {}: {}", file, e))
        })
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new(ComputeDevice::Cpu, None)
    }
}

/// Checks if all required model files exist in the directory.
///
/// Returns Ok(()) if all files exist, or an error listing missing files.
pub fn check_models(model_dir: &Path) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_MODEL_FILES
        .iter()
        .copied()
        .filter(|file| !model_dir.join(file).exists())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GeneratorError::model_not_found(format!(
            "Missing model files in {}: {}",
            model_dir.display(),
            missing.join(", ")
        )))
    }
}

/// Loads model configuration from config.json or uses defaults.
pub fn load_config(model_dir: &Path, defaults: &ModelConfig) -> Result<ModelConfig> {
    let config_path = model_dir.join(CONFIG_FILE);

    let config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            GeneratorError::model_load_failed(format!("Failed to read config.json: {}", e))
        })?;

        ModelConfig::from_json(&content, defaults).map_err(|e| {
            GeneratorError::model_load_failed(format!("Failed to parse config.json: {}", e))
        })?
    } else {
        info!("No config.json in {}, using defaults", model_dir.display());
        defaults.clone()
    };

    if let Some(reason) = config.validate() {
        return Err(GeneratorError::model_load_failed(format!(
            "Unsupported model configuration: {}",
            reason
        )));
    }

    Ok(config)
}
