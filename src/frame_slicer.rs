//! Byte stream to fixed-width frame slicing.
//!
//! The slicer accepts arbitrary-length chunks of little-endian 16-bit PCM and
//! hands out exact frames of `frame_samples` normalized f32 samples. Bytes
//! beyond a whole frame stay queued for the next push. The slicer never
//! inspects sample values.

use crate::pcm;

pub struct FrameSlicer {
    queue: Vec<u8>,
    frame_samples: usize,
}

impl FrameSlicer {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            queue: Vec::with_capacity(frame_samples * 4),
            frame_samples,
        }
    }

    /// Queue more raw PCM bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.queue.extend_from_slice(bytes);
    }

    /// Detach the next full frame into `frame`, returning false when fewer
    /// than `frame_samples * 2` bytes are buffered. `frame` is cleared first
    /// so callers can reuse one scratch buffer across calls.
    pub fn pop_frame_into(&mut self, frame: &mut Vec<f32>) -> bool {
        let frame_bytes = self.frame_samples * 2;
        if self.queue.len() < frame_bytes {
            return false;
        }

        frame.clear();
        frame.reserve(self.frame_samples);
        for pair in self.queue[..frame_bytes].chunks_exact(2) {
            frame.push(pcm::i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])));
        }
        self.queue.drain(..frame_bytes);
        true
    }

    /// Bytes currently buffered below one full frame.
    pub fn pending_bytes(&self) -> usize {
        self.queue.len()
    }

    /// Drop any buffered bytes.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
