//! Generation pipeline for MusicGen.
//!
//! [`MusicGenerator`] owns the prompt processor and the generator chosen at
//! construction, and turns one text prompt into one waveform per call.

use tracing::{debug, error, info};

use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, Result};
use crate::models::{
    check_models, ensure_models, load_config, resolve, select_placement, DeviceSelector,
    MusicGenModel, MusicGenProcessor, OrtDeviceSelector, Placement, SessionOptions, TextProcessor,
};
use crate::types::Waveform;

use super::panics;
use super::replicated::{Generator, Replicated, SingleDevice};

/// Decoder steps per generation call. At 50 frames per second this is about
/// 15 seconds of audio.
pub const MAX_NEW_TOKENS: usize = 750;

/// Text-to-music generator bound to one model and one device placement.
pub struct MusicGenerator {
    model_id: String,
    placement: Placement,
    processor: Box<dyn TextProcessor>,
    generator: Box<dyn Generator>,
}

impl MusicGenerator {
    /// Loads the configured model on the devices ONNX Runtime reports.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use musicgen_generator::{GeneratorConfig, MusicGenerator};
    ///
    /// let mut generator = MusicGenerator::new(&GeneratorConfig::from_env())?;
    /// let waveform = generator.generate("lofi hip hop beats to relax to")?;
    /// ```
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        Self::with_selector(config, &OrtDeviceSelector::from_env())
    }

    /// Loads the configured model on devices chosen by `selector`.
    ///
    /// Placement is decided here once. With more than one device a replica
    /// is loaded on each of them.
    pub fn with_selector(config: &GeneratorConfig, selector: &dyn DeviceSelector) -> Result<Self> {
        if let Some(reason) = config.validate() {
            return Err(GeneratorError::invalid_config(reason));
        }

        let placement = select_placement(config.device, selector)?;
        info!("Placing {} on {}", config.model_id, placement);

        let resolved = resolve(&config.model_id, &config.effective_cache_path())?;
        if config.allow_download {
            ensure_models(&resolved)?;
        }
        check_models(&resolved.dir)?;

        let model_config = load_config(&resolved.dir, &resolved.default_config())?;
        let processor = MusicGenProcessor::load(&resolved.dir)?;

        let mut replicas = Vec::with_capacity(placement.devices().len());
        for (index, device) in placement.devices().iter().enumerate() {
            let options = SessionOptions::new(*device, config.threads);
            let seed = config.seed.map(|s| s.wrapping_add(index as u64));
            replicas.push(MusicGenModel::load(
                &resolved.dir,
                model_config.clone(),
                options,
                seed,
            )?);
        }

        let generator: Box<dyn Generator> = if placement.is_replicated() {
            let replicated = Replicated::new(replicas)?;
            info!("Using {} GPUs!", replicated.device_count());
            Box::new(replicated)
        } else {
            let model = replicas.pop().ok_or_else(|| {
                GeneratorError::model_load_failed("no device received a model replica")
            })?;
            Box::new(SingleDevice::new(model))
        };

        Ok(Self::from_parts(
            config.model_id.clone(),
            placement,
            Box::new(processor),
            generator,
        ))
    }

    /// Assembles a generator from already constructed parts.
    pub fn from_parts(
        model_id: impl Into<String>,
        placement: Placement,
        processor: Box<dyn TextProcessor>,
        generator: Box<dyn Generator>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            placement,
            processor,
            generator,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Generates audio for a prompt.
    ///
    /// The waveform has shape `[1, channels, samples]` whatever the
    /// placement. Failures, including panics inside the runtime, are logged
    /// once at ERROR level and returned.
    pub fn generate(&mut self, prompt: &str) -> Result<Waveform> {
        let processor = &self.processor;
        let generator = &mut self.generator;

        let outcome = panics::capture(|| -> Result<Waveform> {
            let inputs = processor.encode(&[prompt])?;
            debug!(
                "Encoded prompt into {} tokens, generating {} steps",
                inputs.seq_len(),
                MAX_NEW_TOKENS
            );
            let audio = generator.generate(&inputs, MAX_NEW_TOKENS)?;
            let waveform = Waveform::new(audio, generator.sample_rate());
            if waveform.is_empty() {
                return Err(GeneratorError::model_inference_failed(
                    "generator returned no audio",
                ));
            }
            Ok(waveform)
        })
        .unwrap_or_else(|message| {
            Err(GeneratorError::model_inference_failed(format!(
                "generation panicked: {}",
                message
            )))
        });

        match outcome {
            Ok(waveform) => {
                debug!(
                    "Generated {:?} at {} Hz ({:.2}s)",
                    waveform.shape(),
                    waveform.sample_rate(),
                    waveform.duration_secs()
                );
                Ok(waveform)
            }
            Err(err) => {
                error!("An error occurred with {}: {}", self.model_id, err);
                Err(err)
            }
        }
    }

    /// Like [`generate`](Self::generate), but reports failure as `None`.
    pub fn generate_music(&mut self, prompt: &str) -> Option<Waveform> {
        self.generate(prompt).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Device;
    use crate::error::ErrorCode;
    use crate::generation::test_support::{FakeModel, FakeProcessor, FAKE_SAMPLE_RATE};
    use crate::models::{ComputeDevice, StaticDevices};
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    const MODEL_ID: &str = "facebook/musicgen-medium";

    fn single(model: FakeModel) -> MusicGenerator {
        MusicGenerator::from_parts(
            MODEL_ID,
            Placement::cpu(),
            Box::new(FakeProcessor),
            Box::new(SingleDevice::new(model)),
        )
    }

    fn replicated(models: Vec<FakeModel>) -> MusicGenerator {
        let placement = Placement::new(
            (0..models.len() as i32).map(ComputeDevice::Cuda).collect(),
        );
        MusicGenerator::from_parts(
            MODEL_ID,
            placement,
            Box::new(FakeProcessor),
            Box::new(Replicated::new(models).unwrap()),
        )
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl CapturedLog {
        fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.0.lock().unwrap())
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_captured_log<T>(f: impl FnOnce() -> T) -> (T, CapturedLog) {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, log)
    }

    #[test]
    fn token_cap_is_fixed() {
        let model = FakeModel::new();
        let calls = model.calls();
        let mut generator = single(model);

        generator.generate("lofi").unwrap();
        generator
            .generate("a much longer prompt about a rainy evening in a jazz bar")
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(1, MAX_NEW_TOKENS), (1, MAX_NEW_TOKENS)]);
    }

    #[test]
    fn single_device_waveform_shape() {
        let mut generator = single(FakeModel::new());
        let waveform = generator.generate("ambient piano").unwrap();

        assert_eq!(waveform.shape(), [1, 1, MAX_NEW_TOKENS * 2]);
        assert_eq!(waveform.sample_rate(), FAKE_SAMPLE_RATE);
        assert!(!waveform.is_empty());
    }

    #[test]
    fn replicated_waveform_matches_single_device() {
        let mut one = single(FakeModel::new());
        let mut many = replicated(vec![FakeModel::new(), FakeModel::new(), FakeModel::new()]);
        assert!(many.placement().is_replicated());

        let expected = one.generate("city pop at dusk").unwrap();
        let actual = many.generate("city pop at dusk").unwrap();

        assert_eq!(actual.shape(), [1, 1, MAX_NEW_TOKENS * 2]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn injected_fault_logs_one_line() {
        let mut generator = single(FakeModel::failing("session run failed"));

        let (result, log) = with_captured_log(|| generator.generate_music("lofi"));

        assert!(result.is_none());
        let mentions: Vec<String> = log
            .lines()
            .into_iter()
            .filter(|line| line.contains(MODEL_ID))
            .collect();
        assert_eq!(mentions.len(), 1, "log was: {:?}", log.lines());
        assert!(mentions[0].contains("ERROR"));
        assert!(mentions[0].contains(&format!("An error occurred with {}:", MODEL_ID)));
        assert!(mentions[0].contains("session run failed"));
    }

    #[test]
    fn success_does_not_log_model_id() {
        let mut generator = single(FakeModel::new());
        let (result, log) = with_captured_log(|| generator.generate("lofi"));

        assert!(result.is_ok());
        assert!(log.lines().iter().all(|line| !line.contains(MODEL_ID)));
    }

    #[test]
    fn allocation_failure_is_out_of_memory() {
        let mut generator = single(FakeModel::failing("CUDA failure 2: out of memory"));
        let err = generator.generate("lofi").unwrap_err();
        assert_eq!(err.code, ErrorCode::OutOfMemory);
    }

    #[test]
    fn empty_prompt_is_invalid_input() {
        let model = FakeModel::new();
        let calls = model.calls();
        let mut generator = single(model);

        let err = generator.generate("").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn model_panic_becomes_error() {
        let mut generator = single(FakeModel::panicking());
        let err = generator.generate("lofi").unwrap_err();
        assert_eq!(err.code, ErrorCode::InferenceFailed);
        assert!(err.message.contains("fake model exploded"));

        assert!(generator.generate_music("lofi").is_none());
    }

    #[test]
    fn generator_is_reusable_after_failure() {
        let mut generator = single(FakeModel::new());
        assert!(generator.generate("").is_err());
        assert!(generator.generate("lofi").is_ok());
    }

    #[test]
    fn unknown_model_fails_construction() {
        let cache = tempdir().unwrap();
        let config = GeneratorConfig {
            model_id: "no-such-model".to_string(),
            cache_path: Some(cache.path().to_path_buf()),
            device: Device::Cpu,
            allow_download: false,
            ..GeneratorConfig::default()
        };

        let err = MusicGenerator::with_selector(&config, &StaticDevices::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::ModelNotFound);
    }

    #[test]
    fn missing_files_fail_construction() {
        let cache = tempdir().unwrap();
        let config = GeneratorConfig {
            model_id: "facebook/musicgen-small".to_string(),
            cache_path: Some(cache.path().to_path_buf()),
            device: Device::Cpu,
            allow_download: false,
            ..GeneratorConfig::default()
        };

        let err = MusicGenerator::with_selector(&config, &StaticDevices::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::ModelNotFound);
    }

    #[test]
    fn invalid_config_fails_before_loading() {
        let config = GeneratorConfig {
            threads: Some(0),
            ..GeneratorConfig::default()
        };
        let err = MusicGenerator::with_selector(&config, &StaticDevices::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }

    #[test]
    fn missing_accelerator_fails_construction() {
        let config = GeneratorConfig {
            device: Device::Cuda,
            ..GeneratorConfig::default()
        };
        let err = MusicGenerator::with_selector(&config, &StaticDevices::default())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::DeviceUnavailable);
    }
}
