//! Packet loss concealment (spec §4.10): tracks consecutive losses and
//! derives the fade-to-silence attenuation both codecs' concealment paths
//! apply (`silk::SilkDecoder::conceal`, `celt::CeltDecoder::conceal`).
//!
//! SILK's concealment repeats pitch-periodic history (already
//! attenuating on its own in `silk::decoder`); CELT's extrapolates from
//! its MDCT overlap memory. Both are scaled by the same
//! consecutive-loss-derived attenuation so a run of lost frames fades
//! out consistently regardless of which codec mode was last active.

/// Number of consecutively lost frames after which concealment has faded
/// fully to silence.
const FADE_OUT_FRAMES: u32 = 5;

/// Tracks how many frames in a row have been concealed.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PlcState {
    consecutive_losses: u32,
}

impl PlcState {
    pub(crate) fn new() -> Self {
        Self {
            consecutive_losses: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive_losses = 0;
    }

    /// Call once per concealed frame; returns the attenuation factor
    /// (`1.0` on the first loss, fading linearly to `0.0` by
    /// `FADE_OUT_FRAMES`) to apply to this frame's concealment output.
    pub(crate) fn note_loss(&mut self) -> f32 {
        self.consecutive_losses = self.consecutive_losses.saturating_add(1);
        self.attenuation()
    }

    /// Call once a real frame decodes successfully again.
    pub(crate) fn note_recovery(&mut self) {
        self.consecutive_losses = 0;
    }

    fn attenuation(&self) -> f32 {
        let remaining = FADE_OUT_FRAMES.saturating_sub(self.consecutive_losses - 1);
        (remaining as f32 / FADE_OUT_FRAMES as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attenuation_fades_to_zero_within_fade_out_frames() {
        let mut plc = PlcState::new();
        let mut last = 1.0;
        for _ in 0..FADE_OUT_FRAMES {
            let a = plc.note_loss();
            assert!(a <= last);
            last = a;
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn test_recovery_resets_attenuation() {
        let mut plc = PlcState::new();
        plc.note_loss();
        plc.note_loss();
        plc.note_recovery();
        assert_eq!(plc.note_loss(), 1.0);
    }
}
