//! Silero VAD inference adapter.
//!
//! Wraps an ONNX Runtime session behind the [`SpeechModel`] trait so the
//! detector only ever sees a speech probability per frame. The recurrent
//! state differs between model generations: v4 carries LSTM hidden and cell
//! tensors, v5 a single combined state tensor. Both are zeroed on
//! construction and on `reset_state`.

use ndarray::{Array1, Array2, ArrayD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ModelSource;
use crate::download;
use crate::error::VadError;

/// Which Silero VAD generation to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    V4,
    #[default]
    V5,
}

impl ModelVariant {
    /// Frame width the model generation was tuned for.
    pub fn default_frame_samples(self) -> usize {
        match self {
            ModelVariant::V4 => 1536,
            ModelVariant::V5 => 512,
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::V4 => write!(f, "v4"),
            ModelVariant::V5 => write!(f, "v5"),
        }
    }
}

/// Speech probability pair for one frame.
#[derive(Debug, Clone, Copy)]
pub struct SpeechProbability {
    pub is_speech: f32,
    pub not_speech: f32,
}

impl SpeechProbability {
    pub fn from_is_speech(is_speech: f32) -> Self {
        Self {
            is_speech,
            not_speech: 1.0 - is_speech,
        }
    }
}

/// The seam between the detector and the neural model.
///
/// Implementations own whatever recurrent state the model carries across
/// frames; `process` mutates it only on success. Keeping this a trait lets
/// the detector be tested with scripted probabilities.
pub trait SpeechModel: Send {
    fn process(&mut self, frame: &[f32]) -> Result<SpeechProbability, VadError>;
    fn reset_state(&mut self);
}

/// Recurrent state bundle, shaped per model generation.
enum RecurrentState {
    V4 { h: ArrayD<f32>, c: ArrayD<f32> },
    V5 { state: ArrayD<f32> },
}

impl RecurrentState {
    fn zeroed(variant: ModelVariant) -> Self {
        match variant {
            ModelVariant::V4 => RecurrentState::V4 {
                h: ArrayD::zeros([2, 1, 64].as_slice()),
                c: ArrayD::zeros([2, 1, 64].as_slice()),
            },
            ModelVariant::V5 => RecurrentState::V5 {
                state: ArrayD::zeros([2, 1, 128].as_slice()),
            },
        }
    }
}

/// An ONNX Runtime session driving a Silero VAD model.
pub struct SileroSession {
    session: Session,
    variant: ModelVariant,
    sample_rate: Array1<i64>,
    state: RecurrentState,
}

impl SileroSession {
    /// Load the model and prepare zeroed recurrent state.
    ///
    /// URL sources are fetched (with on-disk caching) before the session is
    /// committed; byte sources are committed from memory. Any failure here
    /// means no session is returned -- there is no degraded mode.
    pub async fn create(
        variant: ModelVariant,
        source: &ModelSource,
        sample_rate: usize,
    ) -> Result<Self, VadError> {
        let mut builder = Session::builder()
            .map_err(|e| VadError::ModelLoad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VadError::ModelLoad(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| VadError::ModelLoad(e.to_string()))?
            .with_inter_threads(1)
            .map_err(|e| VadError::ModelLoad(e.to_string()))?;

        let session = match source {
            ModelSource::Path(path) => builder.commit_from_file(path),
            ModelSource::Url(url) => {
                let path = download::fetch_model(variant, url).await?;
                builder.commit_from_file(path)
            }
            ModelSource::Bytes(bytes) => builder.commit_from_memory(bytes),
        }
        .map_err(|e| VadError::ModelLoad(e.to_string()))?;

        Ok(Self {
            session,
            variant,
            sample_rate: Array1::from_vec(vec![sample_rate as i64]),
            state: RecurrentState::zeroed(variant),
        })
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn infer(&mut self, frame: &[f32]) -> Result<f32, VadError> {
        let input = Array2::from_shape_vec((1, frame.len()), frame.to_vec())
            .map_err(|e| VadError::Inference(e.to_string()))?;
        let input = Tensor::from_array(input).map_err(|e| VadError::Inference(e.to_string()))?;
        let sr = Tensor::from_array(self.sample_rate.clone())
            .map_err(|e| VadError::Inference(e.to_string()))?;

        // v4 exposes input/sr/h/c -> output/hn/cn, v5 input/state/sr ->
        // output/stateN. The state is cloned into the run so a failed call
        // leaves the previous state intact.
        let outputs = match &self.state {
            RecurrentState::V4 { h, c } => {
                let h = Tensor::from_array(h.clone())
                    .map_err(|e| VadError::Inference(e.to_string()))?;
                let c = Tensor::from_array(c.clone())
                    .map_err(|e| VadError::Inference(e.to_string()))?;
                self.session
                    .run(ort::inputs!["input" => input, "sr" => sr, "h" => h, "c" => c])
                    .map_err(|e| VadError::Inference(e.to_string()))?
            }
            RecurrentState::V5 { state } => {
                let state = Tensor::from_array(state.clone())
                    .map_err(|e| VadError::Inference(e.to_string()))?;
                self.session
                    .run(ort::inputs!["input" => input, "state" => state, "sr" => sr])
                    .map_err(|e| VadError::Inference(e.to_string()))?
            }
        };

        match &mut self.state {
            RecurrentState::V4 { h, c } => {
                let hn = outputs.get("hn").ok_or_else(|| missing_output("hn"))?;
                let cn = outputs.get("cn").ok_or_else(|| missing_output("cn"))?;
                *h = extract_state(hn, "hn")?;
                *c = extract_state(cn, "cn")?;
            }
            RecurrentState::V5 { state } => {
                let state_n = outputs
                    .get("stateN")
                    .ok_or_else(|| missing_output("stateN"))?;
                *state = extract_state(state_n, "stateN")?;
            }
        }

        let (_, data) = outputs
            .get("output")
            .ok_or_else(|| missing_output("output"))?
            .try_extract_tensor::<f32>()
            .map_err(|e| VadError::Inference(e.to_string()))?;
        data.first()
            .copied()
            .ok_or_else(|| VadError::Inference("empty output tensor".to_string()))
    }
}

fn missing_output(name: &str) -> VadError {
    VadError::Inference(format!("missing output tensor '{name}'"))
}

fn extract_state(value: &DynValue, name: &str) -> Result<ArrayD<f32>, VadError> {
    value
        .try_extract_array::<f32>()
        .map(|view| view.to_owned())
        .map_err(|e| VadError::Inference(format!("failed to read '{name}': {e}")))
}

impl SpeechModel for SileroSession {
    fn process(&mut self, frame: &[f32]) -> Result<SpeechProbability, VadError> {
        let is_speech = self.infer(frame)?;
        Ok(SpeechProbability::from_is_speech(is_speech))
    }

    fn reset_state(&mut self) {
        self.state = RecurrentState::zeroed(self.variant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_frame_defaults() {
        assert_eq!(ModelVariant::V4.default_frame_samples(), 1536);
        assert_eq!(ModelVariant::V5.default_frame_samples(), 512);
    }

    #[test]
    fn zeroed_state_shapes() {
        match RecurrentState::zeroed(ModelVariant::V4) {
            RecurrentState::V4 { h, c } => {
                assert_eq!(h.shape(), &[2, 1, 64]);
                assert_eq!(c.shape(), &[2, 1, 64]);
                assert!(h.iter().chain(c.iter()).all(|&v| v == 0.0));
            }
            RecurrentState::V5 { .. } => panic!("expected v4 state"),
        }
        match RecurrentState::zeroed(ModelVariant::V5) {
            RecurrentState::V5 { state } => {
                assert_eq!(state.shape(), &[2, 1, 128]);
                assert!(state.iter().all(|&v| v == 0.0));
            }
            RecurrentState::V4 { .. } => panic!("expected v5 state"),
        }
    }

    #[test]
    fn probability_pair_is_complementary() {
        let p = SpeechProbability::from_is_speech(0.8);
        assert_eq!(p.is_speech, 0.8);
        assert!((p.not_speech - 0.2).abs() < 1e-6);
    }

    #[test]
    fn variant_parses_from_config_names() {
        assert_eq!(
            serde_json::from_str::<ModelVariant>("\"v4\"").unwrap(),
            ModelVariant::V4
        );
        assert_eq!(
            serde_json::from_str::<ModelVariant>("\"v5\"").unwrap(),
            ModelVariant::V5
        );
        assert_eq!(ModelVariant::V5.to_string(), "v5");
    }
}
