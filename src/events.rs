//! The event stream emitted by the detector.

use serde::Serialize;

/// One observable step of the streaming detector.
///
/// Events are delivered strictly in generation order. Within one utterance
/// the order is `SpeechStart -> [SpeechRealStart]? -> SpeechChunk* ->
/// (SpeechEnd | Misfire)`, with a final `SpeechChunk { is_final: true }`
/// allowed after `SpeechEnd`. Timestamps are seconds at the frame boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VadEvent {
    /// Emitted for every frame that went through the model, before any
    /// transition it triggers.
    FrameProcessed {
        t: f64,
        is_speech: f32,
        not_speech: f32,
        frame: Vec<f32>,
    },
    /// First positive frame opened an utterance.
    SpeechStart { t: f64 },
    /// The utterance reached `min_speech_frames` positive frames.
    SpeechRealStart { t: f64 },
    /// An in-flight or final slice of the current utterance as 16-bit PCM.
    SpeechChunk {
        t: f64,
        audio: Vec<i16>,
        is_final: bool,
    },
    /// Validated speech segment as 16-bit PCM.
    SpeechEnd { t: f64, audio: Vec<i16> },
    /// The utterance ended before reaching `min_speech_frames`; no audio.
    Misfire { t: f64 },
    /// Non-fatal processing error; the stream continues.
    Error { t: f64, message: String },
}

impl VadEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            VadEvent::FrameProcessed { t, .. }
            | VadEvent::SpeechStart { t }
            | VadEvent::SpeechRealStart { t }
            | VadEvent::SpeechChunk { t, .. }
            | VadEvent::SpeechEnd { t, .. }
            | VadEvent::Misfire { t }
            | VadEvent::Error { t, .. } => *t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let event = VadEvent::SpeechStart { t: 0.128 };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"speech_start","t":0.128}"#);
    }

    #[test]
    fn chunk_carries_final_flag() {
        let event = VadEvent::SpeechChunk {
            t: 1.0,
            audio: vec![1, -1],
            is_final: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"speech_chunk""#));
        assert!(json.contains(r#""is_final":true"#));
    }
}
