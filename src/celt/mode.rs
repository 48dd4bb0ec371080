//! Static mode parameters shared across the encoder, decoder and comb
//! filter: the overlap window and per-frame-size short-block counts.
//!
//! Rust has no const-evaluable floating point trig, so (unlike the literal
//! tables libopus bakes into its mode structs) the window is computed once,
//! lazily, and cached for the process lifetime.

use std::f32::consts::PI;
use std::sync::OnceLock;

/// Overlap length, in samples at 48 kHz, between consecutive CELT frames.
pub(crate) const OVERLAP: usize = 120;

static WINDOW: OnceLock<Vec<f32>> = OnceLock::new();

/// The raised-sine ("Vorbis") overlap window CELT applies at the edges of
/// every MDCT, sized for `OVERLAP` samples at 48 kHz.
pub(crate) fn window() -> &'static [f32] {
    WINDOW
        .get_or_init(|| {
            (0..OVERLAP)
                .map(|i| {
                    let inner = (PI / 2.0) * (i as f32 + 0.5) / OVERLAP as f32;
                    let s = inner.sin();
                    (PI / 2.0 * s * s).sin()
                })
                .collect()
        })
        .as_slice()
}

/// Number of short MDCT blocks per frame, indexed by `lm` (log2 of the
/// frame-size-over-2.5ms ratio: 0 => one 2.5 ms block, 3 => eight stacked
/// into a 20 ms frame, matching `EBANDS`' `lm` parameter).
pub(crate) const SHORT_BLOCKS: [usize; 4] = [1, 2, 4, 8];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_monotonic_increasing() {
        let w = window();
        for pair in w.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_window_endpoints_in_unit_range() {
        let w = window();
        assert!(w[0] > 0.0 && w[0] < 0.1);
        assert!(w[OVERLAP - 1] > 0.9 && w[OVERLAP - 1] <= 1.0);
    }
}
