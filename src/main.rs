//! musicgen-generator: generate music from a text prompt.
//!
//! Loads the configured MusicGen model (replicated when several GPUs are
//! visible), generates once and reports the resulting waveform.

use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use musicgen_generator::cli::Cli;
use musicgen_generator::config::GeneratorConfig;
use musicgen_generator::error::Result;
use musicgen_generator::generation::MusicGenerator;
use musicgen_generator::models::{ensure_models, resolve};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = cli.apply(GeneratorConfig::from_env());

    if cli.fetch_only {
        return fetch_models(&config);
    }

    let prompt = cli.prompt.as_deref().unwrap_or_default();

    eprintln!("=== musicgen-generator ===");
    eprintln!("Model: {}", config.model_id);
    eprintln!("Device: {}", config.device);
    eprintln!("Prompt: \"{}\"", prompt);
    if let Some(seed) = config.seed {
        eprintln!("Seed: {}", seed);
    }
    eprintln!();

    let load_start = Instant::now();
    let mut generator = MusicGenerator::new(&config)?;
    info!(
        "Loaded {} on {} in {:.2}s",
        generator.model_id(),
        generator.placement(),
        load_start.elapsed().as_secs_f32()
    );

    let start_time = Instant::now();
    let waveform = generator.generate(prompt)?;
    let generation_time_sec = start_time.elapsed().as_secs_f32();

    eprintln!();
    eprintln!("Generation complete!");
    eprintln!("  Time: {:.2}s", generation_time_sec);
    eprintln!("  Shape: {:?}", waveform.shape());
    eprintln!(
        "  Audio duration: {:.2}s at {}Hz",
        waveform.duration_secs(),
        waveform.sample_rate()
    );
    eprintln!("  Peak: {:.3}", waveform.peak());

    Ok(())
}

/// Downloads the configured model's files without loading them.
fn fetch_models(config: &GeneratorConfig) -> Result<()> {
    let resolved = resolve(&config.model_id, &config.effective_cache_path())?;
    eprintln!("Fetching {} into {}", config.model_id, resolved.dir.display());
    ensure_models(&resolved)?;
    eprintln!("Model files ready.");
    Ok(())
}
