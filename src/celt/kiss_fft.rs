//! Implements the FFT used for the MDCT.

use num_complex::Complex32;
use std::f32::consts::PI;

/// A mixed-radix Fast Fourier Transform based up on the principle, "Keep It Simple, Stupid."
///
/// This code is originally from Mark Borgerding's KISS-FFT but has been
/// heavily modified to better suit Opus. Twiddle factors can't be `const`
/// in Rust (no const floating-point trig), so they're computed once in
/// `new()` and owned for the FFT's lifetime rather than baked in as
/// `&'static` tables.
pub(crate) struct KissFft {
    n: usize,
    twiddles: Vec<Complex32>,
}

impl KissFft {
    /// Builds an FFT plan for size `n` (must be a power of two — CELT only
    /// ever drives this with N/4 of a power-of-two MDCT size).
    pub(crate) fn new(n: usize) -> Self {
        debug_assert!(n.is_power_of_two());
        let twiddles = (0..n)
            .map(|i| {
                let angle = -2.0 * PI * i as f32 / n as f32;
                Complex32::new(angle.cos(), angle.sin())
            })
            .collect();
        Self { n, twiddles }
    }

    /// Size of this FFT.
    pub(crate) fn len(&self) -> usize {
        self.n
    }

    /// In-place decimation-in-time radix-2 FFT.
    pub(crate) fn forward(&self, data: &mut [Complex32]) {
        debug_assert_eq!(data.len(), self.n);
        self.transform(data, false);
    }

    /// In-place inverse FFT (unnormalized; caller scales by `1/n`).
    pub(crate) fn inverse(&self, data: &mut [Complex32]) {
        debug_assert_eq!(data.len(), self.n);
        self.transform(data, true);
    }

    fn transform(&self, data: &mut [Complex32], inverse: bool) {
        let n = self.n;
        // Bit-reversal permutation.
        let bits = n.trailing_zeros();
        for i in 0..n {
            let j = (i as u32).reverse_bits() >> (32 - bits);
            if j as usize > i {
                data.swap(i, j as usize);
            }
        }

        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let step = n / len;
            for start in (0..n).step_by(len) {
                for k in 0..half {
                    let mut tw = self.twiddles[k * step];
                    if inverse {
                        tw = tw.conj();
                    }
                    let u = data[start + k];
                    let v = data[start + k + half] * tw;
                    data[start + k] = u + v;
                    data[start + k + half] = u - v;
                }
            }
            len <<= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_inverse_round_trip() {
        let fft = KissFft::new(8);
        let original: Vec<Complex32> = (0..8)
            .map(|i| Complex32::new(i as f32, -(i as f32) * 0.5))
            .collect();
        let mut data = original.clone();
        fft.forward(&mut data);
        fft.inverse(&mut data);
        for (a, b) in data.iter().zip(original.iter()) {
            let scaled = a / 8.0;
            assert!((scaled - b).norm() < 1e-3);
        }
    }

    #[test]
    fn test_fft_dc_input() {
        let fft = KissFft::new(4);
        let mut data = vec![Complex32::new(1.0, 0.0); 4];
        fft.forward(&mut data);
        assert!((data[0] - Complex32::new(4.0, 0.0)).norm() < 1e-5);
        for bin in &data[1..] {
            assert!(bin.norm() < 1e-5);
        }
    }
}
