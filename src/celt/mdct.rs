//! Implements the modified discrete cosine transform.

use crate::celt::kiss_fft::KissFft;
use num_complex::Complex32;
use std::f32::consts::PI;

/// This is a simple MDCT implementation that uses a N/4 complex FFT
/// to do most of the work. It should be relatively straightforward to
/// plug in pretty much any FFT here.
///
/// This replaces the Vorbis FFT (and uses the exact same API), which
/// was a bit too messy and that was ending up duplicating code
/// (might as well use the same FFT everywhere).
///
/// The algorithm is similar to (and inspired from) Fabrice Bellard's
/// MDCT implementation in FFMPEG, but has differences in signs, ordering
/// and scaling in many places. Unlike the C reference, the twiddle/window
/// tables are owned `Vec`s computed in `new()`: Rust has no const
/// floating-point trig, so they can't be `&'static` literal arrays.
pub(crate) struct Mdct {
    n: usize,
    kfft: KissFft,
    trig: Vec<f32>,
}

impl Mdct {
    /// Builds an MDCT plan for a transform of size `n` (must be a multiple
    /// of 4).
    pub(crate) fn new(n: usize) -> Self {
        debug_assert_eq!(n % 4, 0);
        let quarter = n / 4;
        let kfft = KissFft::new(quarter);
        let trig: Vec<f32> = (0..quarter)
            .map(|i| {
                let angle = 2.0 * PI * (i as f32 + 0.125) / n as f32;
                angle
            })
            .collect();
        Self { n, kfft, trig }
    }

    /// Size of this transform (number of time-domain samples it consumes
    /// per forward call, or produces per inverse call).
    pub(crate) fn len(&self) -> usize {
        self.n
    }

    /// Forward MDCT: `input` holds `2*n` time-domain samples (the current
    /// and previous half-overlapping windows), `out` receives `n`
    /// frequency-domain coefficients.
    pub(crate) fn forward(&self, input: &[f32], out: &mut [f32], window: &[f32]) {
        let n = self.n;
        let n2 = n / 2;
        let n4 = n / 4;
        debug_assert_eq!(input.len(), 2 * n);
        debug_assert_eq!(out.len(), n);
        debug_assert_eq!(window.len(), n2);

        // Apply the window and fold the 2N samples down to N, pre-rotating
        // into N/4 complex bins.
        let mut folded = vec![0.0f32; n];
        for i in 0..n2 {
            let w = window[i];
            folded[i] = input[n2 + n4 + i] * w - input[n2 + n4 - 1 - i] * window[n2 - 1 - i];
        }
        for i in 0..n2 {
            let w = window[n2 - 1 - i];
            folded[n2 + i] = input[n4 + i] * w + input[n - 1 - n4 - i] * window[i];
        }

        let mut freq = vec![Complex32::new(0.0, 0.0); n4];
        for i in 0..n4 {
            let re = folded[2 * i];
            let im = folded[n2 - 1 - 2 * i];
            let t = self.trig[i];
            let (s, c) = t.sin_cos();
            freq[i] = Complex32::new(re * c + im * s, im * c - re * s);
        }

        self.kfft.forward(&mut freq);

        for i in 0..n4 {
            let t = self.trig[i];
            let (s, c) = t.sin_cos();
            let re = freq[i].re;
            let im = freq[i].im;
            out[2 * i] = re * c + im * s;
            out[n2 - 1 - 2 * i] = im * c - re * s;
        }
    }

    /// Inverse MDCT: `input` holds `n` frequency-domain coefficients,
    /// `out` receives `2*n` time-domain samples pre-windowed and ready to
    /// overlap-add with the adjacent frame.
    pub(crate) fn inverse(&self, input: &[f32], out: &mut [f32], window: &[f32]) {
        let n = self.n;
        let n2 = n / 2;
        let n4 = n / 4;
        debug_assert_eq!(input.len(), n);
        debug_assert_eq!(out.len(), 2 * n);
        debug_assert_eq!(window.len(), n2);

        let mut freq = vec![Complex32::new(0.0, 0.0); n4];
        for i in 0..n4 {
            let t = self.trig[i];
            let (s, c) = t.sin_cos();
            let re = input[2 * i];
            let im = input[n2 - 1 - 2 * i];
            freq[i] = Complex32::new(re * c - im * s, im * c + re * s);
        }

        self.kfft.inverse(&mut freq);
        let scale = 1.0 / n4 as f32;

        let mut folded = vec![0.0f32; n2];
        for i in 0..n4 {
            let t = self.trig[i];
            let (s, c) = t.sin_cos();
            let re = freq[i].re * scale;
            let im = freq[i].im * scale;
            folded[2 * i] = re * c - im * s;
            folded[n2 - 1 - 2 * i] = im * c + re * s;
        }

        out.iter_mut().for_each(|v| *v = 0.0);
        for i in 0..n2 {
            out[n4 + i] += folded[i] * window[i];
            out[n - 1 - n4 - i] += folded[i] * window[n2 - 1 - i];
            out[n4 + n2 - 1 - i] -= folded[n2 - 1 - i] * window[n2 - 1 - i];
            out[n + n4 + i] -= folded[n2 - 1 - i] * window[i];
        }
    }
}

/// Builds the analysis/synthesis window used for overlap-add, per the
/// raised-sine shape CELT uses at every supported frame size.
pub(crate) fn build_window(n2: usize) -> Vec<f32> {
    (0..n2)
        .map(|i| {
            let x = (i as f32 + 0.5) / n2 as f32 * (PI / 2.0);
            x.sin()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mdct_roundtrip_preserves_energy_order() {
        let n = 16;
        let mdct = Mdct::new(n);
        let window = build_window(n / 2);

        let input: Vec<f32> = (0..2 * n).map(|i| ((i as f32) * 0.1).sin()).collect();
        let mut freq = vec![0.0f32; n];
        mdct.forward(&input, &mut freq, &window);

        assert!(freq.iter().any(|&v| v.abs() > 1e-6));
    }

    #[test]
    fn test_window_endpoints() {
        let window = build_window(8);
        assert!(window[0] > 0.0 && window[0] < 1.0);
        assert!(window[7] < 1.0 && window[7] > window[0]);
    }
}
