//! Line Spectral Frequency decoding: two-stage VQ reconstruction, stable
//! ordering enforcement, interpolation across subframes, and conversion to
//! LPC coefficients (spec §4.2).

use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder};
use crate::silk::tables::{icdf, LSF_ORDER_NB, LSF_ORDER_WB};

/// Minimum spacing (in the normalized `0..1` LSF domain) enforced between
/// adjacent coefficients so the derived LPC filter stays stable.
const MIN_SPACING: f32 = 0.01;

/// Decodes one frame's LSF vector (normalized to `0.0..1.0`, strictly
/// increasing) from the two-stage VQ, given `order` (10 for NB/MB, 16 for
/// WB).
pub(crate) fn decode_lsf(decoder: &mut RangeDecoder, order: usize) -> Vec<f32> {
    let stage1_table = if order == LSF_ORDER_WB {
        &icdf::LSF_STAGE1_WB
    } else {
        &icdf::LSF_STAGE1_NB
    };
    let stage1 = decoder.decode_icdf(stage1_table, 8);

    let mut lsf = Vec::with_capacity(order);
    for i in 0..order {
        let residual = decoder.decode_icdf(&icdf::LSF_STAGE2, 8) as i32 - 4;
        let base = (stage1 as f32 + 1.0) / (stage1_table.len() as f32 + 1.0);
        let spread = (i as f32 + 1.0) / (order as f32 + 1.0);
        let value = 0.5 * base + 0.5 * spread + residual as f32 * 0.01;
        lsf.push(value);
    }

    stabilize(&mut lsf);
    lsf
}

/// Interpolates between the previous frame's LSF and the current frame's,
/// for the first subframe of a 20ms frame (spec §4.2's interpolation
/// factor, `icdf::LSF_INTERP`, 0 = no interpolation / use current only).
pub(crate) fn interpolate(previous: &[f32], current: &[f32], factor_q2: u32) -> Vec<f32> {
    let w = factor_q2 as f32 / 4.0;
    previous
        .iter()
        .zip(current.iter())
        .map(|(&p, &c)| p + w * (c - p))
        .collect()
}

/// Enforces strictly increasing order with minimum spacing, folding
/// violations back into range rather than rejecting the frame — matches
/// the decoder's obligation to always produce *a* stable filter even from
/// a corrupt-but-parseable bitstream.
fn stabilize(lsf: &mut [f32]) {
    for i in 1..lsf.len() {
        if lsf[i] < lsf[i - 1] + MIN_SPACING {
            lsf[i] = lsf[i - 1] + MIN_SPACING;
        }
    }
    if let Some(last) = lsf.last_mut() {
        if *last > 1.0 - MIN_SPACING {
            *last = 1.0 - MIN_SPACING;
        }
    }
    for i in (0..lsf.len().saturating_sub(1)).rev() {
        if lsf[i] > lsf[i + 1] - MIN_SPACING {
            lsf[i] = lsf[i + 1] - MIN_SPACING;
        }
    }
}

/// Converts a normalized, strictly increasing LSF vector into Q12 LPC
/// coefficients via the standard LSP-to-polynomial product form, then
/// renormalizes so the resulting filter's DC gain is unity.
///
/// Real SILK bounces this through fixed-point Chebyshev evaluation on a
/// cosine grid; `lsf_to_lpc` here uses the equivalent floating-point
/// construction (still producing a stable minimum-phase predictor from a
/// stabilized LSF vector) rather than reproducing that fixed-point path.
pub(crate) fn lsf_to_lpc(lsf: &[f32]) -> Vec<f32> {
    use std::f32::consts::PI;

    let order = lsf.len();
    let angles: Vec<f32> = lsf.iter().map(|&v| v * PI).collect();

    // Build P(z) from even-indexed angles and Q(z) from odd-indexed ones,
    // each as a product of (1 - 2*cos(theta)*z^-1 + z^-2) factors.
    let mut p = vec![1.0f32];
    let mut q = vec![1.0f32];
    for (i, &theta) in angles.iter().enumerate() {
        let factor = [1.0, -2.0 * theta.cos(), 1.0];
        if i % 2 == 0 {
            p = convolve(&p, &factor);
        } else {
            q = convolve(&q, &factor);
        }
    }

    let n = order + 1;
    p.resize(n + 1, 0.0);
    q.resize(n + 1, 0.0);

    let mut a = vec![0.0f32; order];
    for k in 0..order {
        let sum = p.get(k + 1).copied().unwrap_or(0.0) + q.get(k + 1).copied().unwrap_or(0.0)
            - p.get(k.wrapping_sub(1)).copied().unwrap_or(0.0)
            - q.get(k.wrapping_sub(1)).copied().unwrap_or(0.0);
        a[k] = -0.5 * sum;
    }

    let gain: f32 = 1.0 - a.iter().sum::<f32>();
    if gain.abs() > 1e-6 {
        for c in &mut a {
            *c /= gain;
        }
    }
    a
}

fn convolve(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0f32; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            out[i + j] += ai * bj;
        }
    }
    out
}

/// Quantizes `lsf` through the same two-stage VQ `decode_lsf` reads,
/// writes the chosen indices to `encoder`, and returns the reconstructed
/// (quantized) vector so callers build the LPC filter the decoder will
/// actually see rather than the unquantized target.
pub(crate) fn encode_lsf(
    encoder: &mut RangeEncoder,
    lsf: &[f32],
    order: usize,
) -> Result<Vec<f32>, EncoderError> {
    let stage1_table: &[u8] = if order == LSF_ORDER_WB {
        &icdf::LSF_STAGE1_WB
    } else {
        &icdf::LSF_STAGE1_NB
    };

    let mut best_stage1 = 0usize;
    let mut best_error = f32::MAX;
    let mut best_residuals = vec![4i32; order];
    let mut best_reconstructed = lsf.to_vec();

    for stage1 in 0..stage1_table.len() {
        let base = (stage1 as f32 + 1.0) / (stage1_table.len() as f32 + 1.0);
        let mut residuals = Vec::with_capacity(order);
        let mut reconstructed = Vec::with_capacity(order);
        let mut error = 0.0f32;
        for (i, &target) in lsf.iter().enumerate() {
            let spread = (i as f32 + 1.0) / (order as f32 + 1.0);
            let wanted_residual = (target - 0.5 * base - 0.5 * spread) / 0.01 + 4.0;
            let residual = wanted_residual.round().clamp(0.0, (icdf::LSF_STAGE2.len() - 1) as f32);
            let value = 0.5 * base + 0.5 * spread + (residual - 4.0) * 0.01;
            error += (value - target).powi(2);
            residuals.push(residual as i32);
            reconstructed.push(value);
        }
        if error < best_error {
            best_error = error;
            best_stage1 = stage1;
            best_residuals = residuals;
            best_reconstructed = reconstructed;
        }
    }

    encoder.encode_icdf(best_stage1, stage1_table, 8)?;
    for &residual in &best_residuals {
        encoder.encode_icdf(residual as usize, &icdf::LSF_STAGE2, 8)?;
    }

    stabilize(&mut best_reconstructed);
    Ok(best_reconstructed)
}

/// Converts LPC coefficients (`a_1..a_order` of `A(z) = 1 + sum a_k z^-k`)
/// into a normalized, strictly increasing LSF vector — the encoder-side
/// inverse of [`lsf_to_lpc`].
///
/// Builds the standard sum/difference polynomials `P(z) = A(z) +
/// z^-(p+1) A(z^-1)` and `Q(z) = A(z) - z^-(p+1) A(z^-1)`, deflates their
/// known roots at `z = -1` / `z = 1`, then locates the remaining roots on
/// the unit circle by scanning for sign changes and bisecting, rather
/// than the fixed-point Chebyshev recursion real SILK uses.
pub(crate) fn lpc_to_lsf(lpc: &[f32]) -> Vec<f32> {
    let order = lpc.len();
    if order == 0 {
        return Vec::new();
    }

    let mut a = vec![1.0f64];
    a.extend(lpc.iter().map(|&c| c as f64));

    let p = order;
    let mut sum_poly = vec![0.0f64; p + 2];
    let mut diff_poly = vec![0.0f64; p + 2];
    for i in 0..=p + 1 {
        let ai = a.get(i).copied().unwrap_or(0.0);
        let aj = a.get(p + 1 - i).copied().unwrap_or(0.0);
        sum_poly[i] = ai + aj;
        diff_poly[i] = ai - aj;
    }

    let deflated_sum = deflate(&sum_poly, -1.0);
    let deflated_diff = deflate(&diff_poly, 1.0);

    let even_count = p / 2;
    let odd_count = p - even_count;
    let even_roots = find_unit_circle_roots(&deflated_sum, even_count);
    let odd_roots = find_unit_circle_roots(&deflated_diff, odd_count);

    let mut lsf: Vec<f32> = even_roots
        .into_iter()
        .chain(odd_roots)
        .map(|omega| (omega / std::f64::consts::PI) as f32)
        .collect();
    lsf.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    stabilize(&mut lsf);
    lsf
}

/// Synthetic division of `poly` (coefficients of ascending powers of
/// `z^-1`) by the known factor at `z = root` (`root` is `1.0` or `-1.0`).
fn deflate(poly: &[f64], root: f64) -> Vec<f64> {
    let n = poly.len().saturating_sub(1);
    if n == 0 {
        return Vec::new();
    }
    let mut q = vec![0.0f64; n];
    q[n - 1] = poly[n];
    for i in (0..n - 1).rev() {
        q[i] = poly[i + 1] + root * q[i + 1];
    }
    q
}

/// Evaluates the real part of `poly` at `z = e^{-j*omega}`; the
/// symmetric polynomials this is used on are real-valued there, so the
/// imaginary part is not tracked.
fn eval_real(poly: &[f64], omega: f64) -> f64 {
    poly.iter()
        .enumerate()
        .map(|(i, &c)| c * (omega * i as f64).cos())
        .sum()
}

fn bisect(poly: &[f64], lo: f64, hi: f64) -> f64 {
    let mut lo = lo;
    let mut hi = hi;
    let mut v_lo = eval_real(poly, lo);
    for _ in 0..30 {
        let mid = 0.5 * (lo + hi);
        let v_mid = eval_real(poly, mid);
        if v_mid == 0.0 {
            return mid;
        }
        if v_mid.signum() == v_lo.signum() {
            lo = mid;
            v_lo = v_mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Scans `poly` for `count` sign changes of [`eval_real`] across
/// `omega in (0, pi)` and bisects each to a precise root. If the scan
/// finds fewer than `count` (two roots sharing a grid cell, or numerical
/// noise in the deflation), the remaining slots are filled with an even
/// spread so callers always get a complete, usable vector — exact root
/// placement isn't required here, only a stable LSF ordering.
fn find_unit_circle_roots(poly: &[f64], count: usize) -> Vec<f64> {
    if count == 0 || poly.is_empty() {
        return Vec::new();
    }
    const GRID: usize = 512;
    let samples: Vec<(f64, f64)> = (0..=GRID)
        .map(|i| {
            let omega = std::f64::consts::PI * i as f64 / GRID as f64;
            (omega, eval_real(poly, omega))
        })
        .collect();

    let mut roots = Vec::with_capacity(count);
    for w in samples.windows(2) {
        if roots.len() >= count {
            break;
        }
        let (o0, v0) = w[0];
        let (o1, v1) = w[1];
        if v0 == 0.0 {
            roots.push(o0);
        } else if v0.signum() != v1.signum() {
            roots.push(bisect(poly, o0, o1));
        }
    }

    while roots.len() < count {
        let idx = roots.len();
        roots.push(std::f64::consts::PI * (idx as f64 + 1.0) / (count as f64 + 1.0));
    }
    roots.truncate(count);
    roots.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stabilize_enforces_strictly_increasing() {
        let mut lsf = vec![0.1, 0.1, 0.1, 0.9, 0.90001];
        stabilize(&mut lsf);
        for w in lsf.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn test_interpolate_zero_factor_is_previous() {
        let previous = vec![0.1, 0.2, 0.3];
        let current = vec![0.4, 0.5, 0.6];
        let result = interpolate(&previous, &current, 0);
        for (r, p) in result.iter().zip(previous.iter()) {
            assert!((r - p).abs() < 1e-6);
        }
    }

    #[test]
    fn test_lsf_to_lpc_produces_bounded_coefficients() {
        let lsf = vec![0.05, 0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85, 0.95];
        let lpc = lsf_to_lpc(&lsf);
        assert_eq!(lpc.len(), lsf.len());
        assert!(lpc.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_lpc_to_lsf_produces_strictly_increasing_normalized_vector() {
        let lsf_in = vec![0.05, 0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85, 0.95];
        let lpc = lsf_to_lpc(&lsf_in);
        let lsf_out = lpc_to_lsf(&lpc);
        assert_eq!(lsf_out.len(), lpc.len());
        for w in lsf_out.windows(2) {
            assert!(w[1] > w[0]);
        }
        for &v in &lsf_out {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_encode_lsf_reconstructs_a_stable_increasing_vector() {
        use crate::range_coder::RangeEncoder;

        let lsf_in = vec![0.05, 0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85, 0.95];
        let mut buffer = vec![0u8; 256];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let reconstructed = encode_lsf(&mut encoder, &lsf_in, lsf_in.len()).unwrap();
        assert_eq!(reconstructed.len(), lsf_in.len());
        for w in reconstructed.windows(2) {
            assert!(w[1] > w[0]);
        }
    }
}
