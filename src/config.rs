//! Engine configuration.
//!
//! `VadConfig` is the runtime configuration handed to the detector; its
//! defaults depend on the model generation. `AppConfig` is the TOML-facing
//! shape with optional overrides that are merged onto the per-variant
//! defaults, following the same serde-config / runtime-config split used for
//! the rest of the audio settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::download;
use crate::error::VadError;
use crate::silero::ModelVariant;

/// Audio rate at the state-machine boundary. The Silero models are driven at
/// 16 kHz here; resampling from other host rates happens upstream.
pub const SAMPLE_RATE: usize = 16000;

/// Frame widths the Silero models accept at 16 kHz.
pub const SUPPORTED_FRAME_SAMPLES: [usize; 3] = [512, 1024, 1536];

/// Where the ONNX model bytes come from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    /// A local model file.
    Path(PathBuf),
    /// A URL fetched (and cached) before first use.
    Url(String),
    /// Model bytes already in memory.
    Bytes(Vec<u8>),
}

/// Runtime configuration for the detector state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Model generation; selects state shapes and tuning defaults.
    pub model: ModelVariant,
    /// Sample rate in Hz (must be 16000).
    pub sample_rate: usize,
    /// Frame width in samples (512, 1024 or 1536).
    pub frame_samples: usize,
    /// Probability at or above which a frame counts as speech.
    pub positive_speech_threshold: f32,
    /// Probability below which a frame counts as silence; the band between
    /// the two thresholds holds the current state.
    pub negative_speech_threshold: f32,
    /// Consecutive sub-negative frames that end an utterance.
    pub redemption_frames: usize,
    /// Silent frames retained before speech start.
    pub pre_speech_pad_frames: usize,
    /// Positive frames an utterance needs to be validated.
    pub min_speech_frames: usize,
    /// Post-speech frames retained at the end of a segment.
    pub end_speech_pad_frames: usize,
    /// In-flight chunk width in frames; 0 disables chunk emission.
    pub num_frames_to_emit: usize,
}

impl VadConfig {
    /// Tuning defaults for the v5 model.
    pub fn v5() -> Self {
        Self {
            model: ModelVariant::V5,
            sample_rate: SAMPLE_RATE,
            frame_samples: 512,
            positive_speech_threshold: 0.5,
            negative_speech_threshold: 0.35,
            redemption_frames: 24,
            pre_speech_pad_frames: 3,
            min_speech_frames: 9,
            end_speech_pad_frames: 3,
            num_frames_to_emit: 0,
        }
    }

    /// Tuning defaults for the v4 model.
    pub fn v4() -> Self {
        Self {
            model: ModelVariant::V4,
            sample_rate: SAMPLE_RATE,
            frame_samples: 1536,
            positive_speech_threshold: 0.5,
            negative_speech_threshold: 0.35,
            redemption_frames: 8,
            pre_speech_pad_frames: 1,
            min_speech_frames: 3,
            end_speech_pad_frames: 1,
            num_frames_to_emit: 0,
        }
    }

    pub fn for_variant(variant: ModelVariant) -> Self {
        match variant {
            ModelVariant::V4 => Self::v4(),
            ModelVariant::V5 => Self::v5(),
        }
    }

    /// Reject configurations the state machine cannot run with. Called by
    /// the engine constructors; a bad configuration never yields an engine.
    pub fn validate(&self) -> Result<(), VadError> {
        if self.sample_rate != SAMPLE_RATE {
            return Err(VadError::InvalidConfig(format!(
                "sample_rate must be {} Hz, got {}",
                SAMPLE_RATE, self.sample_rate
            )));
        }
        if !SUPPORTED_FRAME_SAMPLES.contains(&self.frame_samples) {
            return Err(VadError::InvalidConfig(format!(
                "frame_samples must be one of {:?}, got {}",
                SUPPORTED_FRAME_SAMPLES, self.frame_samples
            )));
        }
        for (name, value) in [
            ("positive_speech_threshold", self.positive_speech_threshold),
            ("negative_speech_threshold", self.negative_speech_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(VadError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.negative_speech_threshold > self.positive_speech_threshold {
            return Err(VadError::InvalidConfig(format!(
                "negative_speech_threshold ({}) must not exceed positive_speech_threshold ({})",
                self.negative_speech_threshold, self.positive_speech_threshold
            )));
        }
        if self.redemption_frames == 0 {
            return Err(VadError::InvalidConfig(
                "redemption_frames must be at least 1".to_string(),
            ));
        }
        if self.min_speech_frames == 0 {
            return Err(VadError::InvalidConfig(
                "min_speech_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self::v5()
    }
}

/// TOML-facing configuration. Every detector field is optional; unset fields
/// fall back to the defaults of the selected model generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model generation ("v4" or "v5").
    pub model: ModelVariant,
    /// Local ONNX model file; takes precedence over `model_url`.
    pub model_path: Option<PathBuf>,
    /// Download URL; defaults to the official Silero release for the
    /// selected generation.
    pub model_url: Option<String>,
    pub sample_rate: Option<usize>,
    pub frame_samples: Option<usize>,
    pub positive_speech_threshold: Option<f32>,
    pub negative_speech_threshold: Option<f32>,
    pub redemption_frames: Option<usize>,
    pub pre_speech_pad_frames: Option<usize>,
    pub min_speech_frames: Option<usize>,
    pub end_speech_pad_frames: Option<usize>,
    pub num_frames_to_emit: Option<usize>,
}

impl AppConfig {
    /// Merge the file overrides onto the per-variant defaults.
    pub fn vad_config(&self) -> VadConfig {
        let mut config = VadConfig::for_variant(self.model);
        if let Some(v) = self.sample_rate {
            config.sample_rate = v;
        }
        if let Some(v) = self.frame_samples {
            config.frame_samples = v;
        }
        if let Some(v) = self.positive_speech_threshold {
            config.positive_speech_threshold = v;
        }
        if let Some(v) = self.negative_speech_threshold {
            config.negative_speech_threshold = v;
        }
        if let Some(v) = self.redemption_frames {
            config.redemption_frames = v;
        }
        if let Some(v) = self.pre_speech_pad_frames {
            config.pre_speech_pad_frames = v;
        }
        if let Some(v) = self.min_speech_frames {
            config.min_speech_frames = v;
        }
        if let Some(v) = self.end_speech_pad_frames {
            config.end_speech_pad_frames = v;
        }
        if let Some(v) = self.num_frames_to_emit {
            config.num_frames_to_emit = v;
        }
        config
    }

    /// Resolve the model source: explicit path, explicit URL, or the
    /// official release URL for the selected generation.
    pub fn model_source(&self) -> ModelSource {
        if let Some(path) = &self.model_path {
            ModelSource::Path(path.clone())
        } else if let Some(url) = &self.model_url {
            ModelSource::Url(url.clone())
        } else {
            ModelSource::Url(download::default_model_url(self.model).to_string())
        }
    }
}

/// Read `config.toml` from the working directory, falling back to defaults
/// when the file is missing or unreadable.
pub fn read_app_config() -> AppConfig {
    read_app_config_from(Path::new("config.toml"))
}

pub fn read_app_config_from(path: &Path) -> AppConfig {
    match std::fs::read_to_string(path) {
        Ok(config_str) => match toml::from_str(&config_str) {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "failed to parse {}: {}; using default configuration",
                    path.display(),
                    e
                );
                AppConfig::default()
            }
        },
        Err(e) => {
            log::debug!(
                "no configuration at {} ({}); using defaults",
                path.display(),
                e
            );
            AppConfig::default()
        }
    }
}
