//! Generator configuration.
//!
//! Holds the model identifier, device preference and runtime tuning for a
//! [`MusicGenerator`](crate::MusicGenerator). Values come from defaults, the
//! environment, or the command line.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::registry::DEFAULT_MODEL_ID;

/// Preferred execution device for ONNX inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Use the best available accelerator, else the CPU.
    /// Priority: CUDA > Metal (CoreML) > CPU
    #[default]
    Auto,

    /// Force CPU execution.
    Cpu,

    /// Use CUDA for NVIDIA GPU acceleration.
    /// Every visible CUDA device receives a model replica.
    Cuda,

    /// Use Metal/CoreML for Apple Silicon acceleration.
    Metal,
}

impl Device {
    /// Returns the string representation of the device.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Metal => "metal",
        }
    }

    /// Parses a device from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Device::Auto),
            "cpu" => Some(Device::Cpu),
            "cuda" | "gpu" => Some(Device::Cuda),
            "metal" | "coreml" => Some(Device::Metal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for constructing a generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Registered model identifier or a local directory with model files.
    pub model_id: String,

    /// Directory holding downloaded models.
    /// If None, uses the platform-specific default cache location.
    pub cache_path: Option<PathBuf>,

    /// Execution device preference.
    pub device: Device,

    /// Number of threads for intra-op parallelism in ONNX Runtime.
    /// If None, uses ONNX Runtime's default.
    pub threads: Option<u32>,

    /// Seed for top-k sampling. Unseeded generation is not reproducible.
    pub seed: Option<u64>,

    /// Whether missing model files may be fetched over the network.
    pub allow_download: bool,
}

impl GeneratorConfig {
    /// Creates a new GeneratorConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a default config for the given model identifier.
    pub fn for_model(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Self::default()
        }
    }

    /// Creates a GeneratorConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `MUSICGEN_MODEL` - Model identifier or local model directory
    /// - `MUSICGEN_CACHE_PATH` - Directory for downloaded models
    /// - `MUSICGEN_DEVICE` - Device selection (auto, cpu, cuda, metal)
    /// - `MUSICGEN_THREADS` - Number of intra-op threads
    /// - `MUSICGEN_SEED` - Sampling seed
    /// - `MUSICGEN_OFFLINE` - Disable downloads when set to 1/true
    ///
    /// Falls back to defaults for unset or unparsable variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("MUSICGEN_MODEL") {
            if !model.trim().is_empty() {
                config.model_id = model;
            }
        }

        if let Ok(path) = std::env::var("MUSICGEN_CACHE_PATH") {
            config.cache_path = Some(PathBuf::from(path));
        }

        if let Ok(device_str) = std::env::var("MUSICGEN_DEVICE") {
            if let Some(device) = Device::parse(&device_str) {
                config.device = device;
            }
        }

        if let Ok(threads_str) = std::env::var("MUSICGEN_THREADS") {
            if let Ok(threads) = threads_str.parse::<u32>() {
                if threads > 0 {
                    config.threads = Some(threads);
                }
            }
        }

        if let Ok(seed_str) = std::env::var("MUSICGEN_SEED") {
            if let Ok(seed) = seed_str.parse::<u64>() {
                config.seed = Some(seed);
            }
        }

        if let Ok(offline) = std::env::var("MUSICGEN_OFFLINE") {
            if matches!(offline.to_lowercase().as_str(), "1" | "true" | "yes") {
                config.allow_download = false;
            }
        }

        config
    }

    /// Returns the effective cache path, using platform defaults if not specified.
    pub fn effective_cache_path(&self) -> PathBuf {
        if let Some(ref path) = self.cache_path {
            path.clone()
        } else {
            default_cache_path()
        }
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.model_id.trim().is_empty() {
            return Some("model_id must not be empty".to_string());
        }

        if let Some(threads) = self.threads {
            if threads == 0 {
                return Some("threads must be > 0".to_string());
            }
            if threads > 256 {
                return Some(format!("threads too high: {} (max 256)", threads));
            }
        }

        None
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            cache_path: None,
            device: Device::Auto,
            threads: None,
            seed: None,
            allow_download: true,
        }
    }
}

/// Returns the platform-specific default model cache path.
///
/// - macOS: ~/Library/Caches/musicgen-generator
/// - Linux: ~/.cache/musicgen-generator
/// - Windows: C:\Users\<user>\AppData\Local\musicgen-generator\cache
fn default_cache_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "musicgen-generator") {
        proj_dirs.cache_dir().to_path_buf()
    } else {
        PathBuf::from("./models")
    }
}
