//! Forward error correction via low-bitrate redundancy (LBRR, spec
//! §4.10): each SILK frame can carry a copy of the *previous* frame's raw
//! PCM, re-encoded through a disposable encoder instance so a decoder
//! that lost that previous packet but received this one can still
//! recover it. An LBRR flag bit, written with `patch_initial_bits` once
//! the encoder knows in retrospect whether redundancy fit in the packet,
//! marks whether it is present.
//!
//! This implementation embeds the redundant frame by running a second,
//! throwaway pass of the SILK frame encoder/decoder against a cloned
//! (and therefore disposable) channel state: the redundant copy shares
//! the real encode/decode path byte-for-byte, it just never touches the
//! persistent state the next *real* frame depends on.

use crate::range_coder::{RangeDecoder, RangeEncoder};
use crate::{DecoderError, EncoderError};

/// Encoder-side redundancy state: holds the previous frame's raw PCM
/// until the next frame either embeds it as LBRR or discards it (e.g.
/// because FEC got disabled in between).
#[derive(Clone, Debug, Default)]
pub(crate) struct FecState {
    pending_pcm: Option<Vec<f32>>,
}

impl FecState {
    pub(crate) fn new() -> Self {
        Self { pending_pcm: None }
    }

    pub(crate) fn reset(&mut self) {
        self.pending_pcm = None;
    }

    /// Stashes `pcm` (the frame just encoded, in its original interleaved
    /// form) for embedding as redundancy in the *next* packet.
    pub(crate) fn store_frame(&mut self, pcm: Vec<f32>) {
        self.pending_pcm = Some(pcm);
    }

    /// Takes whatever frame is pending redundancy, if any, for embedding
    /// in the packet currently being built.
    pub(crate) fn take_frame(&mut self) -> Option<Vec<f32>> {
        self.pending_pcm.take()
    }
}

/// Writes the provisional LBRR flag. Callers that later discover the
/// redundancy didn't fit should retroactively flip it off with
/// [`patch_lbrr_flag`] rather than re-encoding the frame.
pub(crate) fn encode_lbrr_flag(
    encoder: &mut RangeEncoder,
    has_redundancy: bool,
) -> Result<(), EncoderError> {
    encoder.encode_bit_logp(u32::from(has_redundancy), 1)
}

/// Retroactively corrects the LBRR flag written by [`encode_lbrr_flag`]
/// once the encoder knows, after encoding the rest of the frame, whether
/// redundancy actually made it into the packet.
pub(crate) fn patch_lbrr_flag(
    encoder: &mut RangeEncoder,
    has_redundancy: bool,
) -> Result<(), EncoderError> {
    encoder.patch_initial_bits(u32::from(has_redundancy), 1)
}

/// Reads the LBRR flag a decoder requesting FEC (`decode_fec = true`)
/// checks before attempting to recover the previous frame from this
/// packet's redundancy.
pub(crate) fn decode_lbrr_flag(decoder: &mut RangeDecoder) -> bool {
    decoder.decode_bit_logp(1)
}

/// Returns `Ok(true)` if this packet carries usable redundancy for the
/// previous frame (caller should decode it in place of PLC); `Ok(false)`
/// if there is none, in which case the caller falls back to ordinary
/// concealment.
pub(crate) fn has_recoverable_redundancy(decoder: &mut RangeDecoder) -> Result<bool, DecoderError> {
    Ok(decode_lbrr_flag(decoder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_coder::RangeDecoder;

    #[test]
    fn test_lbrr_flag_round_trips() {
        for has_redundancy in [false, true] {
            let mut buffer = vec![0u8; 16];
            let mut encoder = RangeEncoder::new(&mut buffer);
            encode_lbrr_flag(&mut encoder, has_redundancy).unwrap();
            encoder.done().unwrap();
            drop(encoder);

            let mut decoder = RangeDecoder::new(&buffer);
            assert_eq!(decode_lbrr_flag(&mut decoder), has_redundancy);
        }
    }

    #[test]
    fn test_patch_lbrr_flag_overrides_initial_value() {
        let mut buffer = vec![0u8; 16];
        let mut encoder = RangeEncoder::new(&mut buffer);
        encode_lbrr_flag(&mut encoder, true).unwrap();
        patch_lbrr_flag(&mut encoder, false).unwrap();
        encoder.done().unwrap();
        drop(encoder);

        let mut decoder = RangeDecoder::new(&buffer);
        assert!(!decode_lbrr_flag(&mut decoder));
    }

    #[test]
    fn test_fec_state_round_trips_pending_frame() {
        let mut state = FecState::new();
        assert!(state.take_frame().is_none());
        state.store_frame(vec![1.0, 2.0, 3.0]);
        assert_eq!(state.take_frame(), Some(vec![1.0, 2.0, 3.0]));
        assert!(state.take_frame().is_none());
    }
}
