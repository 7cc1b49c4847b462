//! ModelConfig type for MusicGen model parameters.
//!
//! Contains the architecture parameters of a MusicGen ONNX export, read from
//! the `config.json` shipped next to the model files.

use serde::{Deserialize, Serialize};

/// Configuration parameters for the MusicGen model architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Token vocabulary size (typically 2048 for MusicGen).
    pub vocab_size: u32,

    /// Number of decoder transformer layers.
    pub num_hidden_layers: u32,

    /// Number of attention heads in each layer.
    pub num_attention_heads: u32,

    /// Hidden dimension size of the text encoder.
    pub d_model: u32,

    /// Key/value dimension per attention head.
    pub d_kv: u32,

    /// Number of audio channels (1 for the mono checkpoints).
    pub audio_channels: u32,

    /// Audio sample rate in Hz (always 32000 for MusicGen).
    pub sample_rate: u32,

    /// Number of EnCodec codebooks (always 4 for MusicGen).
    pub codebooks: u32,

    /// Padding token ID for the decoder.
    pub pad_token_id: i64,
}

impl ModelConfig {
    /// Configuration of musicgen-small.
    pub fn musicgen_small() -> Self {
        Self {
            vocab_size: 2048,
            num_hidden_layers: 24,
            num_attention_heads: 16,
            d_model: 768,
            d_kv: 64,
            audio_channels: 1,
            sample_rate: 32000,
            codebooks: 4,
            pad_token_id: 2048, // vocab_size is used as pad token
        }
    }

    /// Configuration of musicgen-medium.
    pub fn musicgen_medium() -> Self {
        Self {
            num_hidden_layers: 48,
            num_attention_heads: 24,
            ..Self::musicgen_small()
        }
    }

    /// Parses a HuggingFace MusicGen `config.json`.
    ///
    /// Missing fields fall back to the values of `defaults`.
    pub fn from_json(content: &str, defaults: &ModelConfig) -> Result<Self, String> {
        let raw: RawConfig = serde_json::from_str(content).map_err(|e| e.to_string())?;

        let decoder = raw
            .decoder
            .ok_or_else(|| "config.json missing 'decoder' section".to_string())?;
        let text_encoder = raw.text_encoder.unwrap_or_default();
        let audio_encoder = raw.audio_encoder.unwrap_or_default();

        Ok(Self {
            vocab_size: decoder.vocab_size.unwrap_or(defaults.vocab_size),
            num_hidden_layers: decoder.num_hidden_layers.unwrap_or(defaults.num_hidden_layers),
            num_attention_heads: decoder
                .num_attention_heads
                .unwrap_or(defaults.num_attention_heads),
            d_model: text_encoder.d_model.unwrap_or(defaults.d_model),
            d_kv: text_encoder.d_kv.unwrap_or(defaults.d_kv),
            audio_channels: decoder.audio_channels.unwrap_or(defaults.audio_channels),
            sample_rate: audio_encoder.sampling_rate.unwrap_or(defaults.sample_rate),
            codebooks: decoder.num_codebooks.unwrap_or(defaults.codebooks),
            pad_token_id: decoder.pad_token_id.unwrap_or(defaults.pad_token_id),
        })
    }

    /// Validates the configuration for consistency.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.vocab_size == 0 {
            return Some("vocab_size must be > 0".to_string());
        }

        if self.num_hidden_layers == 0 {
            return Some("num_hidden_layers must be > 0".to_string());
        }

        if self.num_attention_heads == 0 {
            return Some("num_attention_heads must be > 0".to_string());
        }

        if self.sample_rate != 32000 {
            return Some(format!("sample_rate must be 32000, got {}", self.sample_rate));
        }

        // The decoder loop feeds exactly 4 codebooks per step.
        if self.codebooks != 4 {
            return Some(format!("codebooks must be 4, got {}", self.codebooks));
        }

        None
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::musicgen_small()
    }
}

#[derive(Deserialize)]
struct RawConfig {
    decoder: Option<RawDecoder>,
    text_encoder: Option<RawTextEncoder>,
    audio_encoder: Option<RawAudioEncoder>,
}

#[derive(Deserialize)]
struct RawDecoder {
    vocab_size: Option<u32>,
    num_hidden_layers: Option<u32>,
    num_attention_heads: Option<u32>,
    num_codebooks: Option<u32>,
    audio_channels: Option<u32>,
    pad_token_id: Option<i64>,
}

#[derive(Deserialize, Default)]
struct RawTextEncoder {
    d_model: Option<u32>,
    d_kv: Option<u32>,
}

#[derive(Deserialize, Default)]
struct RawAudioEncoder {
    sampling_rate: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn musicgen_small_config() {
        let config = ModelConfig::musicgen_small();
        assert_eq!(config.vocab_size, 2048);
        assert_eq!(config.num_hidden_layers, 24);
        assert_eq!(config.sample_rate, 32000);
        assert_eq!(config.codebooks, 4);
        assert!(config.validate().is_none());
    }

    #[test]
    fn musicgen_medium_config() {
        let config = ModelConfig::musicgen_medium();
        assert_eq!(config.num_hidden_layers, 48);
        assert_eq!(config.num_attention_heads, 24);
        assert_eq!(config.pad_token_id, 2048);
        assert!(config.validate().is_none());
    }

    #[test]
    fn parses_nested_config_json() {
        let json = r#"{
            "audio_encoder": { "sampling_rate": 32000 },
            "decoder": {
                "num_hidden_layers": 48,
                "num_attention_heads": 24,
                "num_codebooks": 4,
                "vocab_size": 2048,
                "pad_token_id": 2048
            },
            "text_encoder": { "d_model": 768, "d_kv": 64 }
        }"#;
        let config = ModelConfig::from_json(json, &ModelConfig::musicgen_small()).unwrap();
        assert_eq!(config, ModelConfig::musicgen_medium());
    }

    #[test]
    fn missing_decoder_section_is_rejected() {
        let err = ModelConfig::from_json("{}", &ModelConfig::default()).unwrap_err();
        assert!(err.contains("decoder"));
    }

    #[test]
    fn config_validation() {
        let mut config = ModelConfig::musicgen_small();
        config.codebooks = 8;
        assert!(config.validate().is_some());
    }
}
