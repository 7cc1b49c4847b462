//! Command-line interface for one-shot generation.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::{Device, GeneratorConfig};

/// Device choices accepted on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DeviceArg {
    /// Every visible accelerator, else the CPU
    #[default]
    Auto,
    /// CPU only
    Cpu,
    /// All visible CUDA devices
    Cuda,
    /// CoreML on Apple Silicon
    Metal,
}

impl From<DeviceArg> for Device {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Auto => Device::Auto,
            DeviceArg::Cpu => Device::Cpu,
            DeviceArg::Cuda => Device::Cuda,
            DeviceArg::Metal => Device::Metal,
        }
    }
}

/// musicgen-generator: text-to-music generation with MusicGen
#[derive(Parser, Debug)]
#[command(name = "musicgen-generator")]
#[command(about = "Generate music from a text prompt with MusicGen ONNX models")]
#[command(version)]
pub struct Cli {
    /// Text prompt describing the music to generate
    #[arg(short, long, required_unless_present = "fetch_only")]
    pub prompt: Option<String>,

    /// Registered model id or a directory containing the ONNX files
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory for downloaded models
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Execution device
    #[arg(short, long, value_enum)]
    pub device: Option<DeviceArg>,

    /// Intra-op threads for ONNX Runtime
    #[arg(short, long)]
    pub threads: Option<u32>,

    /// Random seed for reproducible sampling
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Never download missing model files
    #[arg(long)]
    pub offline: bool,

    /// Download the model files and exit
    #[arg(long)]
    pub fetch_only: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Applies command-line overrides on top of a base configuration.
    pub fn apply(&self, mut config: GeneratorConfig) -> GeneratorConfig {
        if let Some(ref model) = self.model {
            config.model_id = model.clone();
        }
        if let Some(ref dir) = self.cache_dir {
            config.cache_path = Some(dir.clone());
        }
        if let Some(device) = self.device {
            config.device = device.into();
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.offline {
            config.allow_download = false;
        }
        config
    }
}
