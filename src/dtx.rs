//! Discontinuous transmission (spec §4.10, encoder side): a multi-band
//! voice activity detector that decides whether a frame needs a real
//! packet, or whether the decoder can keep concealing/comfort-noising
//! through silence.

/// Default number of consecutive silent frames (at 20 ms/frame, ~400 ms)
/// before the encoder stops transmitting and starts sending only
/// periodic comfort-noise frames.
pub(crate) const DEFAULT_SILENCE_THRESHOLD_FRAMES: u32 = 20;

const VAD_BANDS: usize = 3;
const VAD_ENERGY_FLOOR: f32 = 1e-6;

/// Tracks consecutive silence across frames and decides when to transmit.
#[derive(Clone, Debug)]
pub(crate) struct VoiceActivityDetector {
    silence_threshold_frames: u32,
    consecutive_silence: u32,
}

impl VoiceActivityDetector {
    pub(crate) fn new() -> Self {
        Self {
            silence_threshold_frames: DEFAULT_SILENCE_THRESHOLD_FRAMES,
            consecutive_silence: 0,
        }
    }

    pub(crate) fn set_threshold_frames(&mut self, frames: u32) {
        self.silence_threshold_frames = frames.max(1);
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive_silence = 0;
    }

    /// Splits `frame` into `VAD_BANDS` roughly-equal chunks (a coarse
    /// stand-in for the real sub-band energy split) and flags activity if
    /// any chunk's energy clears the noise floor.
    fn is_active(&self, frame: &[f32]) -> bool {
        let len = frame.len();
        if len == 0 {
            return false;
        }
        let band_len = (len / VAD_BANDS).max(1);
        for band in 0..VAD_BANDS {
            let start = band * band_len;
            let end = ((band + 1) * band_len).min(len);
            if start >= end {
                continue;
            }
            let slice = &frame[start..end];
            let energy: f32 = slice.iter().map(|&s| s * s).sum::<f32>() / slice.len() as f32;
            if energy > VAD_ENERGY_FLOOR {
                return true;
            }
        }
        false
    }

    /// Feeds one frame through the detector. Returns `true` if the
    /// encoder should produce a real packet for this frame (active
    /// speech, the trailing frames right after speech ends, or a
    /// periodic comfort-noise keepalive), `false` if it can be dropped.
    pub(crate) fn should_transmit(&mut self, frame: &[f32]) -> bool {
        if self.is_active(frame) {
            self.consecutive_silence = 0;
            return true;
        }

        self.consecutive_silence += 1;
        if self.consecutive_silence <= self.silence_threshold_frames {
            return true;
        }
        (self.consecutive_silence - self.silence_threshold_frames) % self.silence_threshold_frames
            == 0
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.3).sin()).collect()
    }

    #[test]
    fn test_active_speech_always_transmits() {
        let mut vad = VoiceActivityDetector::new();
        for _ in 0..50 {
            assert!(vad.should_transmit(&tone(160)));
        }
    }

    #[test]
    fn test_silence_eventually_stops_transmitting_every_frame() {
        let mut vad = VoiceActivityDetector::new();
        vad.set_threshold_frames(5);
        let mut transmitted = 0;
        for _ in 0..5 {
            if vad.should_transmit(&silence(160)) {
                transmitted += 1;
            }
        }
        assert_eq!(transmitted, 5);

        let mut transmitted_after = 0;
        for _ in 0..20 {
            if vad.should_transmit(&silence(160)) {
                transmitted_after += 1;
            }
        }
        assert!(transmitted_after < 20);
        assert!(transmitted_after > 0);
    }

    #[test]
    fn test_speech_after_silence_resumes_transmission() {
        let mut vad = VoiceActivityDetector::new();
        vad.set_threshold_frames(2);
        for _ in 0..10 {
            vad.should_transmit(&silence(160));
        }
        assert!(vad.should_transmit(&tone(160)));
    }
}
