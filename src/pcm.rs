//! Conversions between 16-bit PCM and the f32 samples the model consumes.

/// Decode one little-endian signed 16-bit sample to f32 in [-1, 1).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encode one f32 sample back to signed 16-bit PCM.
///
/// 32767 on the way out, 32768 on the way in; the mismatch is load-bearing
/// for bit-compatibility with existing consumers of the emitted audio.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0).round() as i16
}

/// Encode a sample slice as 16-bit PCM.
pub fn samples_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Append `samples` zero-valued samples of silence.
pub fn extend_with_silence(audio: &mut Vec<i16>, samples: usize) {
    audio.resize(audio.len() + samples, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_exact_in_the_inner_range() {
        for s in -16384..=16384i16 {
            assert_eq!(f32_to_i16(i16_to_f32(s)), s, "sample {}", s);
        }
    }

    #[test]
    fn round_trip_is_within_one_lsb_everywhere() {
        for s in (i16::MIN as i32..=i16::MAX as i32).step_by(17) {
            let s = s as i16;
            let back = f32_to_i16(i16_to_f32(s)) as i32;
            assert!((back - s as i32).abs() <= 1, "sample {} came back as {}", s, back);
        }
    }

    #[test]
    fn i16_min_comes_back_one_lsb_high() {
        // -32768 maps to -1.0 exactly, which re-encodes to -32767.
        assert_eq!(f32_to_i16(i16_to_f32(i16::MIN)), -32767);
    }

    #[test]
    fn out_of_range_input_saturates() {
        assert_eq!(f32_to_i16(1.5), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
    }

    #[test]
    fn silence_padding_appends_zeros() {
        let mut audio = vec![5i16, -5];
        extend_with_silence(&mut audio, 3);
        assert_eq!(audio, vec![5, -5, 0, 0, 0]);
    }
}
