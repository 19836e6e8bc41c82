//! Sample format conversion: bit-depth widening with TPDF dither, and
//! DSD-over-PCM (DoP) packing (spec §4.5 "Conversion rules").
//!
//! The dither generator is grounded in `AudioPlayer::lcg_next`/`tpdf_noise`/
//! `quantize_i16`/`quantize_u16` in the teacher's `audio/audio_player.rs`,
//! adapted here from "quantize a float sample to an output integer width" to
//! "widen an already-integer PCM sample to a wider integer width".

/// DoP marker bytes, alternating every frame (spec §4.5).
pub const DOP_MARKER_A: u8 = 0x05;
pub const DOP_MARKER_B: u8 = 0xFA;
/// DoP silence pattern used to pad a partial final DSD frame.
pub const DOP_SILENCE_BYTE: u8 = 0x69;

/// A linear-congruential dither noise generator, reused across a stream's
/// lifetime so successive samples get independent dither values.
#[derive(Debug, Clone, Copy)]
pub struct DitherState(u64);

impl DitherState {
    pub fn new(seed: u64) -> Self {
        DitherState(seed)
    }

    fn lcg_next(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((self.0 >> 32) as u32) as f32 / u32::MAX as f32
    }

    /// Triangular dither noise in `[-1.0, 1.0]`.
    fn tpdf_noise(&mut self) -> f32 {
        self.lcg_next() + self.lcg_next() - 1.0
    }
}

impl Default for DitherState {
    fn default() -> Self {
        DitherState::new(1)
    }
}

/// Widens a PCM sample from `from_bits` to `to_bits`, applying TPDF dither
/// to the discarded low bits when widening and `dither` is enabled. Returns
/// the sample unchanged when `to_bits <= from_bits` (the engine never
/// narrows per spec §4.5).
pub fn widen_sample(sample: i32, from_bits: u16, to_bits: u16, dither: bool, state: &mut DitherState) -> i32 {
    if to_bits <= from_bits {
        return sample;
    }
    let shift = (to_bits - from_bits) as u32;
    let mut widened = (sample as i64) << shift;
    if dither {
        let scale = (1i64 << shift).max(1);
        let noise = (state.tpdf_noise() * scale as f32) as i64;
        widened += noise;
    }
    let max = (1i64 << (to_bits - 1)) - 1;
    let min = -(1i64 << (to_bits - 1));
    widened.clamp(min, max) as i32
}

/// Converts a buffer of `from_bits`-wide PCM samples to `to_bits`, in place
/// semantics via a freshly allocated output vector.
pub fn convert_buffer(samples: &[i32], from_bits: u16, to_bits: u16, dither: bool, state: &mut DitherState) -> Vec<i32> {
    samples
        .iter()
        .map(|&s| widen_sample(s, from_bits, to_bits, dither, state))
        .collect()
}

/// Packs a stream of raw DSD bytes (1 bit per cell, MSB first) into 24-bit
/// DoP PCM frames, two DSD bytes (16 bit-cells) per output word, per spec
/// §4.5's DoP conversion rule. The marker alternates every frame. A trailing
/// partial pair is padded with [`DOP_SILENCE_BYTE`].
pub fn pack_dop_frames(dsd_bytes: &[u8]) -> Vec<i32> {
    let mut frames = Vec::with_capacity(dsd_bytes.len().div_ceil(2));
    let mut marker = DOP_MARKER_A;
    let mut iter = dsd_bytes.chunks(2);
    for pair in &mut iter {
        let high = pair[0];
        let low = *pair.get(1).unwrap_or(&DOP_SILENCE_BYTE);
        frames.push(((marker as i32) << 16) | ((high as i32) << 8) | low as i32);
        marker = if marker == DOP_MARKER_A { DOP_MARKER_B } else { DOP_MARKER_A };
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_same_width_is_a_no_op() {
        let mut state = DitherState::new(42);
        assert_eq!(widen_sample(12345, 16, 16, true, &mut state), 12345);
    }

    #[test]
    fn widen_without_dither_shifts_exactly() {
        let mut state = DitherState::new(42);
        assert_eq!(widen_sample(1, 16, 24, false, &mut state), 1 << 8);
        assert_eq!(widen_sample(-1, 16, 24, false, &mut state), -1 << 8);
    }

    #[test]
    fn widen_with_dither_stays_within_one_lsb_of_exact_shift() {
        let mut state = DitherState::new(7);
        let exact = 100i64 << 8;
        for _ in 0..50 {
            let widened = widen_sample(100, 16, 24, true, &mut state) as i64;
            assert!((widened - exact).abs() <= 2 * 256);
        }
    }

    #[test]
    fn dop_markers_alternate_every_frame() {
        let dsd = vec![0xAAu8, 0x55, 0x00, 0xFF];
        let frames = pack_dop_frames(&dsd);
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[0] >> 16) & 0xFF, DOP_MARKER_A as i32);
        assert_eq!((frames[1] >> 16) & 0xFF, DOP_MARKER_B as i32);
        assert_eq!(frames[0] & 0xFFFF, 0xAA55);
        assert_eq!(frames[1] & 0xFFFF, 0x00FF);
    }

    #[test]
    fn dop_pads_trailing_odd_byte_with_silence() {
        let dsd = vec![0x11u8, 0x22, 0x33];
        let frames = pack_dop_frames(&dsd);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1] & 0xFFFF, ((0x33i32) << 8) | DOP_SILENCE_BYTE as i32);
    }
}
