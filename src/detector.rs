//! The streaming speech detector.
//!
//! Consumes fixed-width frames, drives the neural model once per frame, and
//! turns the probability stream into utterance events. All buffers and
//! counters live on this struct; nothing is shared, so a detector is driven
//! from exactly one place at a time.
//!
//! A frame lands in one of three bands relative to the two thresholds:
//! positive (`p >= positive`), negative (`p < negative`), or the
//! intermediate band between them. The intermediate band holds whatever
//! state the detector is in: while speaking it clears the redemption counter
//! without opening a new utterance, while silent it only feeds the
//! pre-speech ring.

use std::collections::VecDeque;

use log::warn;

use crate::config::VadConfig;
use crate::events::VadEvent;
use crate::pcm;
use crate::silero::SpeechModel;

pub struct SpeechDetector {
    model: Box<dyn SpeechModel>,
    config: VadConfig,

    speaking: bool,
    /// Consecutive sub-negative frames since the last positive one.
    redemption_counter: usize,
    /// Positive frames in the current utterance.
    speech_positive_frames: usize,
    /// Latched once the utterance passes min-speech validation.
    real_start_fired: bool,
    /// First accumulator frame not yet emitted as an in-flight chunk.
    speech_start_index: usize,
    /// Redemption counter as of the most recent chunk emission. Deliberately
    /// not cleared by the intermediate band, so a chunk emitted during early
    /// redemption keeps its snapshot until the utterance closes.
    sent_redemption_frames: usize,

    /// Ring of the last `pre_speech_pad_frames` silent frames.
    pre_speech_buffer: VecDeque<Vec<f32>>,
    /// Every frame retained since speech start, flat at `frame_samples`
    /// stride.
    speech_buffer: Vec<f32>,

    /// Samples consumed so far; timestamps derive from this.
    current_sample: u64,
    /// Lifetime frame count; survives `reset`.
    total_frames_processed: u64,
}

impl SpeechDetector {
    pub fn new(config: VadConfig, model: Box<dyn SpeechModel>) -> Self {
        Self {
            model,
            config,
            speaking: false,
            redemption_counter: 0,
            speech_positive_frames: 0,
            real_start_fired: false,
            speech_start_index: 0,
            sent_redemption_frames: 0,
            pre_speech_buffer: VecDeque::new(),
            speech_buffer: Vec::new(),
            current_sample: 0,
            total_frames_processed: 0,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    pub fn total_frames_processed(&self) -> u64 {
        self.total_frames_processed
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    fn timestamp(&self) -> f64 {
        self.current_sample as f64 / self.config.sample_rate as f64
    }

    fn buffered_frames(&self) -> usize {
        self.speech_buffer.len() / self.config.frame_samples
    }

    /// Run one frame through the model and the state machine, appending any
    /// resulting events in generation order.
    pub fn process_frame(&mut self, frame: &[f32], events: &mut Vec<VadEvent>) {
        if frame.len() != self.config.frame_samples {
            warn!(
                "dropping frame of {} samples, detector expects {}",
                frame.len(),
                self.config.frame_samples
            );
            return;
        }

        let probability = match self.model.process(frame) {
            Ok(p) => p,
            Err(e) => {
                events.push(VadEvent::Error {
                    t: self.timestamp(),
                    message: e.to_string(),
                });
                return;
            }
        };

        self.current_sample += frame.len() as u64;
        self.total_frames_processed += 1;
        let t = self.timestamp();

        events.push(VadEvent::FrameProcessed {
            t,
            is_speech: probability.is_speech,
            not_speech: probability.not_speech,
            frame: frame.to_vec(),
        });

        if probability.is_speech >= self.config.positive_speech_threshold {
            self.on_positive_frame(frame, t, events);
        } else if probability.is_speech < self.config.negative_speech_threshold {
            self.on_negative_frame(frame, t, events);
        } else {
            self.on_intermediate_frame(frame, t, events);
        }
    }

    fn on_positive_frame(&mut self, frame: &[f32], t: f64, events: &mut Vec<VadEvent>) {
        if !self.speaking {
            self.speaking = true;
            self.speech_start_index = 0;
            self.real_start_fired = false;
            events.push(VadEvent::SpeechStart { t });
            for padded in self.pre_speech_buffer.drain(..) {
                self.speech_buffer.extend_from_slice(&padded);
            }
        }

        self.redemption_counter = 0;
        self.sent_redemption_frames = 0;
        self.speech_buffer.extend_from_slice(frame);
        self.speech_positive_frames += 1;

        if !self.real_start_fired && self.speech_positive_frames == self.config.min_speech_frames {
            self.real_start_fired = true;
            events.push(VadEvent::SpeechRealStart { t });
        }

        self.maybe_emit_chunk(t, events);
    }

    fn on_negative_frame(&mut self, frame: &[f32], t: f64, events: &mut Vec<VadEvent>) {
        if !self.speaking {
            self.push_pre_speech(frame);
            return;
        }

        self.speech_buffer.extend_from_slice(frame);
        self.redemption_counter += 1;
        if self.redemption_counter >= self.config.redemption_frames {
            self.finish_utterance(t, events);
        } else {
            self.maybe_emit_chunk(t, events);
        }
    }

    fn on_intermediate_frame(&mut self, frame: &[f32], t: f64, events: &mut Vec<VadEvent>) {
        if !self.speaking {
            self.push_pre_speech(frame);
            return;
        }

        self.speech_buffer.extend_from_slice(frame);
        // Holds speech open without counting as positive. Only the
        // redemption counter resets; sent_redemption_frames keeps its
        // snapshot from the last emitted chunk.
        self.redemption_counter = 0;

        self.maybe_emit_chunk(t, events);
    }

    fn push_pre_speech(&mut self, frame: &[f32]) {
        if self.config.pre_speech_pad_frames == 0 {
            return;
        }
        self.pre_speech_buffer.push_back(frame.to_vec());
        while self.pre_speech_buffer.len() > self.config.pre_speech_pad_frames {
            self.pre_speech_buffer.pop_front();
        }
    }

    /// Emit an in-flight slice once enough un-sent frames are buffered, as
    /// long as redemption has not outrun the end padding. Chunks only flow
    /// after min-speech validation; an utterance that misfires must never
    /// have emitted audio.
    fn maybe_emit_chunk(&mut self, t: f64, events: &mut Vec<VadEvent>) {
        let width = self.config.num_frames_to_emit;
        if width == 0 || !self.real_start_fired {
            return;
        }
        if self.buffered_frames() - self.speech_start_index < width {
            return;
        }
        if self.redemption_counter > self.config.end_speech_pad_frames {
            return;
        }

        let frame_samples = self.config.frame_samples;
        let start = self.speech_start_index * frame_samples;
        let audio = pcm::samples_to_i16(&self.speech_buffer[start..start + width * frame_samples]);
        events.push(VadEvent::SpeechChunk {
            t,
            audio,
            is_final: false,
        });
        self.speech_start_index += width;
        self.sent_redemption_frames = self.redemption_counter;
    }

    /// The redemption counter reached its limit: close the utterance, emit
    /// `end` (or `misfire`), flush the final chunk, and recycle the trimmed
    /// tail as pre-speech context.
    fn finish_utterance(&mut self, t: f64, events: &mut Vec<VadEvent>) {
        self.speaking = false;
        self.redemption_counter = 0;

        if self.speech_positive_frames < self.config.min_speech_frames {
            events.push(VadEvent::Misfire { t });
        } else {
            let frames_to_remove =
                self.config.redemption_frames as i64 - self.config.end_speech_pad_frames as i64;
            let audio = self.segment_with_tail_trim(0, frames_to_remove);
            events.push(VadEvent::SpeechEnd { t, audio });

            if self.config.num_frames_to_emit > 0 {
                let end_frames_to_remove = if self.sent_redemption_frames == 0 {
                    frames_to_remove
                } else {
                    self.sent_redemption_frames as i64 - self.config.end_speech_pad_frames as i64
                };
                if self.speech_start_index < self.buffered_frames() || end_frames_to_remove < 0 {
                    let audio =
                        self.segment_with_tail_trim(self.speech_start_index, end_frames_to_remove);
                    if !audio.is_empty() {
                        events.push(VadEvent::SpeechChunk {
                            t,
                            audio,
                            is_final: true,
                        });
                    }
                }
            }
        }

        self.reset_utterance();
    }

    /// Slice the accumulator from `start_frame`, dropping `frames_to_remove`
    /// tail frames, or appending that many silence frames when negative.
    fn segment_with_tail_trim(&self, start_frame: usize, frames_to_remove: i64) -> Vec<i16> {
        let frame_samples = self.config.frame_samples;
        let total_frames = self.buffered_frames();

        if frames_to_remove >= 0 {
            let end_frame = total_frames.saturating_sub(frames_to_remove as usize);
            if start_frame >= end_frame {
                return Vec::new();
            }
            pcm::samples_to_i16(
                &self.speech_buffer[start_frame * frame_samples..end_frame * frame_samples],
            )
        } else {
            let mut audio =
                pcm::samples_to_i16(&self.speech_buffer[start_frame * frame_samples..]);
            pcm::extend_with_silence(&mut audio, (-frames_to_remove) as usize * frame_samples);
            audio
        }
    }

    /// Shared cleanup after `end`, `misfire`, and force-end: zero the
    /// per-utterance counters and recycle the trimmed tail of the
    /// accumulator as pre-speech context for the next utterance.
    fn reset_utterance(&mut self) {
        self.speech_positive_frames = 0;
        self.speech_start_index = 0;
        self.sent_redemption_frames = 0;
        self.real_start_fired = false;

        let keep = self
            .config
            .redemption_frames
            .saturating_sub(self.config.end_speech_pad_frames);
        if keep > 0 && self.config.pre_speech_pad_frames > 0 {
            let frame_samples = self.config.frame_samples;
            let total_frames = self.buffered_frames();
            let first = total_frames.saturating_sub(keep);
            for index in first..total_frames {
                let tail_frame =
                    self.speech_buffer[index * frame_samples..(index + 1) * frame_samples].to_vec();
                self.pre_speech_buffer.push_back(tail_frame);
            }
            while self.pre_speech_buffer.len() > self.config.pre_speech_pad_frames {
                self.pre_speech_buffer.pop_front();
            }
        }
        self.speech_buffer.clear();
    }

    /// End the current utterance on caller demand. Only acts when the
    /// utterance already passed min-speech validation; emits the entire
    /// accumulator as one segment and never flushes a final chunk -- the
    /// in-flight partition is discarded by contract.
    pub fn force_end_speech(&mut self, events: &mut Vec<VadEvent>) {
        if !self.speaking || self.speech_positive_frames < self.config.min_speech_frames {
            return;
        }

        let audio = pcm::samples_to_i16(&self.speech_buffer);
        events.push(VadEvent::SpeechEnd {
            t: self.timestamp(),
            audio,
        });

        self.speaking = false;
        self.redemption_counter = 0;
        self.reset_utterance();
    }

    /// Clear all buffers and counters and zero the neural state. Subsequent
    /// behavior is independent of anything fed before the reset. The
    /// lifetime frame counter is left alone.
    pub fn reset(&mut self) {
        self.model.reset_state();
        self.speaking = false;
        self.redemption_counter = 0;
        self.speech_positive_frames = 0;
        self.real_start_fired = false;
        self.speech_start_index = 0;
        self.sent_redemption_frames = 0;
        self.pre_speech_buffer.clear();
        self.speech_buffer.clear();
        self.current_sample = 0;
    }
}
