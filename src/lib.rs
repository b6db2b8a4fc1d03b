pub mod config;
pub mod detector;
pub mod download;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame_slicer;
pub mod pcm;
pub mod silero;

// Re-export key components for easier access
pub use config::{read_app_config, AppConfig, ModelSource, VadConfig};
pub use detector::SpeechDetector;
pub use engine::VadEngine;
pub use error::VadError;
pub use events::VadEvent;
pub use silero::{ModelVariant, SileroSession, SpeechModel, SpeechProbability};
