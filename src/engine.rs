//! The engine facade: byte stream in, events out.
//!
//! Composes the frame slicer and the detector around a speech model. One
//! engine assumes serialized input; callers finish each call before issuing
//! the next. Independent engines are free to run on separate threads -- the
//! model weights on disk are shared, everything mutable is per-instance.

use crate::config::{ModelSource, VadConfig};
use crate::detector::SpeechDetector;
use crate::error::VadError;
use crate::events::VadEvent;
use crate::frame_slicer::FrameSlicer;
use crate::silero::{SileroSession, SpeechModel};

pub struct VadEngine {
    slicer: FrameSlicer,
    detector: SpeechDetector,
    scratch: Vec<f32>,
}

impl VadEngine {
    /// Validate the configuration, provision the model, and build an engine.
    ///
    /// Any failure here (bad configuration, download, session init) means no
    /// engine is returned; there is no partially constructed state.
    pub async fn create(config: VadConfig, source: &ModelSource) -> Result<Self, VadError> {
        config.validate()?;
        let model = SileroSession::create(config.model, source, config.sample_rate).await?;
        Ok(Self::assemble(config, Box::new(model)))
    }

    /// Build an engine around an already-constructed model. This is how the
    /// detector gets exercised with deterministic probabilities in tests.
    pub fn with_model(config: VadConfig, model: Box<dyn SpeechModel>) -> Result<Self, VadError> {
        config.validate()?;
        Ok(Self::assemble(config, model))
    }

    fn assemble(config: VadConfig, model: Box<dyn SpeechModel>) -> Self {
        Self {
            slicer: FrameSlicer::new(config.frame_samples),
            detector: SpeechDetector::new(config, model),
            scratch: Vec::new(),
        }
    }

    /// Feed raw little-endian 16-bit PCM and collect the resulting events.
    ///
    /// Never fails mid-stream: per-frame inference errors surface as
    /// `VadEvent::Error` entries and the byte stream stays usable.
    pub fn process_audio_data(&mut self, bytes: &[u8]) -> Vec<VadEvent> {
        let mut events = Vec::new();
        self.slicer.push(bytes);
        while self.slicer.pop_frame_into(&mut self.scratch) {
            self.detector.process_frame(&self.scratch, &mut events);
        }
        events
    }

    /// End the current utterance on demand (see
    /// [`SpeechDetector::force_end_speech`]).
    pub fn force_end_speech(&mut self) -> Vec<VadEvent> {
        let mut events = Vec::new();
        self.detector.force_end_speech(&mut events);
        events
    }

    /// Clear buffered bytes, detector state and neural state. The engine
    /// behaves as freshly constructed afterwards.
    pub fn reset(&mut self) {
        self.slicer.clear();
        self.detector.reset();
    }

    /// Tear the engine down, dropping the model session. Terminal by
    /// construction: the engine is consumed.
    pub fn release(self) {}

    pub fn is_speaking(&self) -> bool {
        self.detector.is_speaking()
    }

    pub fn current_sample(&self) -> u64 {
        self.detector.current_sample()
    }

    pub fn total_frames_processed(&self) -> u64 {
        self.detector.total_frames_processed()
    }

    pub fn config(&self) -> &VadConfig {
        self.detector.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VadError;
    use crate::silero::SpeechProbability;

    /// Returns a fixed probability for every frame.
    struct ConstantModel(f32);

    impl SpeechModel for ConstantModel {
        fn process(&mut self, _frame: &[f32]) -> Result<SpeechProbability, VadError> {
            Ok(SpeechProbability::from_is_speech(self.0))
        }

        fn reset_state(&mut self) {}
    }

    fn pcm_bytes(samples: usize, value: i16) -> Vec<u8> {
        std::iter::repeat(value)
            .take(samples)
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    fn engine(probability: f32) -> VadEngine {
        VadEngine::with_model(VadConfig::v5(), Box::new(ConstantModel(probability))).unwrap()
    }

    #[test]
    fn frame_count_is_floor_of_bytes_over_frame_bytes() {
        let mut engine = engine(0.0);

        // 1000 bytes: below one 1024-byte frame.
        assert!(engine.process_audio_data(&pcm_bytes(500, 10)).is_empty());
        // 48 more bytes complete exactly one frame; 24 bytes stay queued.
        let events = engine.process_audio_data(&pcm_bytes(24, 10));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], VadEvent::FrameProcessed { .. }));
        assert_eq!(engine.total_frames_processed(), 1);
        assert_eq!(engine.current_sample(), 512);
    }

    #[test]
    fn long_pushes_produce_multiple_frames_in_order() {
        let mut engine = engine(0.0);
        let events = engine.process_audio_data(&pcm_bytes(512 * 3 + 100, 0));
        assert_eq!(events.len(), 3);
        let times: Vec<f64> = events.iter().map(|e| e.timestamp()).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn constant_speech_opens_an_utterance() {
        let mut engine = engine(0.9);
        let events = engine.process_audio_data(&pcm_bytes(512 * 12, 1000));

        let transitions: Vec<_> = events
            .iter()
            .filter(|e| !matches!(e, VadEvent::FrameProcessed { .. }))
            .collect();
        assert!(matches!(transitions[0], VadEvent::SpeechStart { .. }));
        assert!(matches!(transitions[1], VadEvent::SpeechRealStart { .. }));
        assert!(engine.is_speaking());

        let flushed = engine.force_end_speech();
        assert_eq!(flushed.len(), 1);
        match &flushed[0] {
            VadEvent::SpeechEnd { audio, .. } => assert_eq!(audio.len(), 12 * 512),
            other => panic!("expected end, got {other:?}"),
        }
        assert!(!engine.is_speaking());
    }

    #[test]
    fn reset_drops_queued_bytes() {
        let mut engine = engine(0.0);
        engine.process_audio_data(&pcm_bytes(500, 7));
        engine.reset();
        // Without the reset these 24 samples would complete a frame.
        assert!(engine.process_audio_data(&pcm_bytes(24, 7)).is_empty());
        assert_eq!(engine.total_frames_processed(), 0);
    }

    #[test]
    fn with_model_rejects_bad_configuration() {
        let mut config = VadConfig::v5();
        config.negative_speech_threshold = 0.9;
        let result = VadEngine::with_model(config, Box::new(ConstantModel(0.0)));
        assert!(matches!(result, Err(VadError::InvalidConfig(_))));
    }

    #[test]
    fn frame_events_carry_the_decoded_samples() {
        let mut engine = engine(0.0);
        let events = engine.process_audio_data(&pcm_bytes(512, 16384));
        match &events[0] {
            VadEvent::FrameProcessed {
                frame,
                is_speech,
                not_speech,
                ..
            } => {
                assert_eq!(frame.len(), 512);
                assert!(frame.iter().all(|&s| s == 0.5));
                assert_eq!(*is_speech, 0.0);
                assert_eq!(*not_speech, 1.0);
            }
            other => panic!("expected frame event, got {other:?}"),
        }
    }
}
