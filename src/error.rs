//! Error types for the music generator.
//!
//! Load-time failures (resolving, downloading and loading models, selecting
//! devices) and generation-time failures share one error type so callers can
//! match on [`ErrorCode`] instead of parsing messages.

use std::fmt;

/// Error codes carried by every [`GeneratorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Model identifier is unknown or model files are missing.
    /// Trigger: Identifier neither a local directory nor a registered model.
    ModelNotFound,

    /// Failed to load ONNX model or tokenizer into memory.
    /// Trigger: Corrupt file, wrong format, or OOM during load.
    ModelLoadFailed,

    /// Failed to download model from remote source.
    /// Trigger: Network error, disk full during download.
    ModelDownloadFailed,

    /// The requested compute device is not present.
    /// Trigger: `cuda` or `metal` requested on a machine without it.
    DeviceUnavailable,

    /// Configuration values are out of range.
    InvalidConfig,

    /// The processor or model rejected the prompt encoding.
    InvalidInput,

    /// The device ran out of memory during generation.
    OutOfMemory,

    /// Any other failure inside the model graphs.
    InferenceFailed,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::ModelLoadFailed => "MODEL_LOAD_FAILED",
            ErrorCode::ModelDownloadFailed => "MODEL_DOWNLOAD_FAILED",
            ErrorCode::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::OutOfMemory => "OUT_OF_MEMORY",
            ErrorCode::InferenceFailed => "INFERENCE_FAILED",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => "Model identifier could not be resolved to model files",
            ErrorCode::ModelLoadFailed => "Failed to load ONNX model into memory",
            ErrorCode::ModelDownloadFailed => "Failed to download model from remote source",
            ErrorCode::DeviceUnavailable => "Requested compute device is not available",
            ErrorCode::InvalidConfig => "Generator configuration is invalid",
            ErrorCode::InvalidInput => "Prompt could not be encoded into model input",
            ErrorCode::OutOfMemory => "Device memory exhausted during generation",
            ErrorCode::InferenceFailed => "Model inference failed during generation",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::ModelNotFound => {
                "Use a registered identifier (e.g. facebook/musicgen-small) or a directory \
                 containing tokenizer.json and the MusicGen ONNX files"
            }
            ErrorCode::ModelLoadFailed => {
                "Check available memory (4GB+ recommended), verify model files are not corrupted, \
                 or delete the cache directory and download again"
            }
            ErrorCode::ModelDownloadFailed => {
                "Check internet connection and disk space, or try again later if HuggingFace \
                 is unavailable"
            }
            ErrorCode::DeviceUnavailable => {
                "Use MUSICGEN_DEVICE=auto to fall back to the CPU, or install the GPU runtime"
            }
            ErrorCode::InvalidConfig => "Fix the reported configuration value",
            ErrorCode::InvalidInput => "Provide a non-empty text prompt describing the music",
            ErrorCode::OutOfMemory => {
                "Free device memory, use a smaller model, or run on the CPU with MUSICGEN_DEVICE=cpu"
            }
            ErrorCode::InferenceFailed => {
                "Retry the generation; if the issue persists, reload the model or try the CPU"
            }
        }
    }

    /// Returns true for errors raised while constructing a generator.
    pub fn is_load_time(&self) -> bool {
        matches!(
            self,
            ErrorCode::ModelNotFound
                | ErrorCode::ModelLoadFailed
                | ErrorCode::ModelDownloadFailed
                | ErrorCode::DeviceUnavailable
                | ErrorCode::InvalidConfig
        )
    }

    /// Classifies a runtime failure message.
    ///
    /// ONNX Runtime reports allocation failures only through its message text.
    pub fn classify_inference(message: &str) -> Self {
        let lower = message.to_lowercase();
        const OOM_MARKERS: &[&str] = &[
            "out of memory",
            "failed to allocate",
            "bad_alloc",
            "cuda_error_out_of_memory",
            "cudaerrormemoryallocation",
        ];
        if OOM_MARKERS.iter().any(|m| lower.contains(m)) {
            ErrorCode::OutOfMemory
        } else {
            ErrorCode::InferenceFailed
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for generator operations.
#[derive(Debug)]
pub struct GeneratorError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GeneratorError {
    /// Creates a new GeneratorError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new GeneratorError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a MODEL_NOT_FOUND error.
    pub fn model_not_found(what: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelNotFound,
            format!("Model not found: {}", what.into()),
        )
    }

    /// Creates a MODEL_LOAD_FAILED error.
    pub fn model_load_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelLoadFailed,
            format!("Failed to load model: {}", reason.into()),
        )
    }

    /// Creates a MODEL_DOWNLOAD_FAILED error.
    pub fn model_download_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelDownloadFailed,
            format!("Failed to download model: {}", reason.into()),
        )
    }

    /// Creates a DEVICE_UNAVAILABLE error.
    pub fn device_unavailable(device: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeviceUnavailable,
            format!("Device not available: {}", device.into()),
        )
    }

    /// Creates an INVALID_CONFIG error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidConfig,
            format!("Invalid configuration: {}", reason.into()),
        )
    }

    /// Creates an INVALID_INPUT error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidInput,
            format!("Invalid input: {}", reason.into()),
        )
    }

    /// Creates an inference error, classified as OUT_OF_MEMORY when the
    /// runtime reports an allocation failure and INFERENCE_FAILED otherwise.
    pub fn model_inference_failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let code = ErrorCode::classify_inference(&reason);
        Self::new(code, format!("Inference failed: {}", reason))
    }
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for GeneratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using GeneratorError.
pub type Result<T> = std::result::Result<T, GeneratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::ModelNotFound,
        ErrorCode::ModelLoadFailed,
        ErrorCode::ModelDownloadFailed,
        ErrorCode::DeviceUnavailable,
        ErrorCode::InvalidConfig,
        ErrorCode::InvalidInput,
        ErrorCode::OutOfMemory,
        ErrorCode::InferenceFailed,
    ];

    #[test]
    fn error_code_as_str() {
        assert_eq!(ErrorCode::ModelNotFound.as_str(), "MODEL_NOT_FOUND");
        assert_eq!(ErrorCode::DeviceUnavailable.as_str(), "DEVICE_UNAVAILABLE");
        assert_eq!(ErrorCode::OutOfMemory.as_str(), "OUT_OF_MEMORY");
        assert_eq!(ErrorCode::InferenceFailed.as_str(), "INFERENCE_FAILED");
    }

    #[test]
    fn every_code_has_text() {
        for code in ALL_CODES {
            assert!(!code.description().is_empty());
            assert!(!code.recovery_hint().is_empty());
        }
    }

    #[test]
    fn load_time_codes() {
        assert!(ErrorCode::ModelNotFound.is_load_time());
        assert!(ErrorCode::DeviceUnavailable.is_load_time());
        assert!(!ErrorCode::OutOfMemory.is_load_time());
        assert!(!ErrorCode::InvalidInput.is_load_time());
        assert!(!ErrorCode::InferenceFailed.is_load_time());
    }

    #[test]
    fn inference_errors_are_classified() {
        let oom = GeneratorError::model_inference_failed(
            "CUDA failure 2: out of memory ; GPU=0 ; hostname=box",
        );
        assert_eq!(oom.code, ErrorCode::OutOfMemory);

        let alloc = GeneratorError::model_inference_failed("Failed to allocate memory for requested buffer");
        assert_eq!(alloc.code, ErrorCode::OutOfMemory);

        let other = GeneratorError::model_inference_failed("logits not found in output");
        assert_eq!(other.code, ErrorCode::InferenceFailed);
    }

    #[test]
    fn generator_error_display() {
        let err = GeneratorError::model_not_found("acme/unknown");
        let text = err.to_string();
        assert!(text.contains("MODEL_NOT_FOUND"));
        assert!(text.contains("acme/unknown"));
        assert!(text.contains("Recovery:"));
    }

    #[test]
    fn source_is_exposed() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = GeneratorError::with_source(ErrorCode::ModelLoadFailed, "reading config", io);
        assert!(err.source().is_some());
    }
}
