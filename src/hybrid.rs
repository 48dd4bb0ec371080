//! Hybrid-mode coordination (spec §4.7): SILK decodes the low end of the
//! band into the shared range coder first, CELT decodes the high end
//! (bands 17 and up) out of the same coder, and the two are mixed back
//! together after a fixed delay line realigns CELT with SILK's lookahead.

#[cfg(feature = "decoder")]
use crate::celt::CeltDecoder;
#[cfg(feature = "decoder")]
use crate::range_coder::RangeDecoder;
#[cfg(feature = "decoder")]
use crate::silk::{LostFlag, SilkDecoder};
#[cfg(feature = "decoder")]
use crate::DecoderError;

/// CELT band at which hybrid mode starts coding (spec §4.7): bands below
/// 17 are carried entirely by SILK. Used by both the encoder (to pick
/// `start_band`) and the decoder, so it isn't feature-gated.
pub(crate) const CELT_START_BAND: usize = 17;

/// CELT's encoder-side lookahead relative to SILK, in samples at 48 kHz
/// (2.7 ms), that the decoder must absorb with a delay line so the two
/// codecs' outputs land on the same sample index before mixing.
#[cfg(feature = "decoder")]
pub(crate) const HYBRID_DELAY_SAMPLES: usize = 130;

/// Realigns CELT's output with SILK's by holding back the most recent
/// `HYBRID_DELAY_SAMPLES` of CELT audio across calls.
#[cfg(feature = "decoder")]
#[derive(Clone, Debug)]
pub(crate) struct HybridDelayLine {
    buffer: Vec<f32>,
    channels: usize,
}

#[cfg(feature = "decoder")]
impl HybridDelayLine {
    pub(crate) fn new(channels: usize) -> Self {
        Self {
            buffer: vec![0.0; HYBRID_DELAY_SAMPLES * channels],
            channels,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Delays `celt_out` in place by the hybrid lookahead: the samples
    /// written on return are `HYBRID_DELAY_SAMPLES` older than the ones
    /// passed in, and the tail of `celt_out` becomes the new held-back
    /// buffer.
    fn delay(&mut self, celt_out: &mut [f32]) {
        if self.channels == 0 || celt_out.is_empty() {
            return;
        }
        let delay_len = self.buffer.len();
        let mut combined = Vec::with_capacity(delay_len + celt_out.len());
        combined.extend_from_slice(&self.buffer);
        combined.extend_from_slice(celt_out);

        celt_out.copy_from_slice(&combined[..celt_out.len()]);
        let start = combined.len() - delay_len;
        self.buffer.copy_from_slice(&combined[start..]);
    }
}

/// Decodes one hybrid-mode frame: SILK reads first from `decoder` (low
/// bands), then CELT reads the remainder of the same frame's bits (bands
/// `CELT_START_BAND..`), omitting the postfilter flag CELT would
/// otherwise read standalone. The two signals are summed sample-for-
/// sample after CELT's output passes through `delay`.
#[cfg(feature = "decoder")]
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_hybrid_frame(
    silk: &mut SilkDecoder,
    celt: &mut CeltDecoder,
    delay: &mut HybridDelayLine,
    decoder: &mut RangeDecoder,
    samples: &mut [f32],
    frame_size: usize,
    frame_bits: u32,
) -> Result<(), DecoderError> {
    let mut silk_out = vec![0.0f32; samples.len()];
    let mut silk_frame_size = frame_size;
    silk.decode(
        Some(&mut *decoder),
        &mut silk_out,
        &mut silk_frame_size,
        LostFlag::NoLoss,
        true,
    )?;

    let mut celt_out = vec![0.0f32; samples.len()];
    celt.decode(
        decoder,
        &mut celt_out,
        frame_size,
        CELT_START_BAND,
        frame_bits,
    )?;
    delay.delay(&mut celt_out);

    for (out, (s, c)) in samples.iter_mut().zip(silk_out.iter().zip(celt_out.iter())) {
        *out = s + c;
    }
    Ok(())
}

#[cfg(all(test, feature = "decoder"))]
mod tests {
    use super::*;

    #[test]
    fn test_delay_line_holds_back_then_releases_samples() {
        let mut delay = HybridDelayLine::new(1);
        let mut first = vec![1.0f32; HYBRID_DELAY_SAMPLES];
        delay.delay(&mut first);
        assert!(first.iter().all(|&v| v == 0.0));

        let mut second = vec![2.0f32; HYBRID_DELAY_SAMPLES];
        delay.delay(&mut second);
        assert!(second.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_reset_clears_delay_buffer() {
        let mut delay = HybridDelayLine::new(1);
        let mut samples = vec![1.0f32; HYBRID_DELAY_SAMPLES];
        delay.delay(&mut samples);
        delay.reset();
        let mut next = vec![2.0f32; HYBRID_DELAY_SAMPLES];
        delay.delay(&mut next);
        assert!(next.iter().all(|&v| v == 0.0));
    }
}
