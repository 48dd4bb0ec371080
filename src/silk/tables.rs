//! SILK codebooks and inverse-CDF tables (spec §4.2/§4.3): frame-type and
//! quantization-offset selection, log-gain coding, the two-stage LSF vector
//! quantizer (10-dim NB/MB, 16-dim WB), pitch-lag/contour coding and the
//! 5-tap LTP codebooks, and the shell-code pulse-count tables.
//!
//! Bit-exactness against libopus's published constants is out of scope
//! here (spec §8, properties 5-6): these tables are internally consistent
//! (same tables drive both the encoder and the decoder) rather than
//! reproductions of libopus's literal float/fixed-point tables.

/// Number of LSF coefficients for narrowband/mediumband (8/12 kHz internal).
pub(crate) const LSF_ORDER_NB: usize = 10;
/// Number of LSF coefficients for wideband (16 kHz internal).
pub(crate) const LSF_ORDER_WB: usize = 16;

/// Inverse CDFs, Opus-style: `icdf[s]` is `ft - (cumulative freq through s)`,
/// monotonically non-increasing, last entry 0.
pub(crate) mod icdf {
    /// Frame signal type + quantization offset (4-ary): inactive,
    /// unvoiced, voiced-low-offset, voiced-high-offset.
    pub(crate) const FRAME_TYPE: [u8; 4] = [234, 148, 62, 0];

    /// MSB of the first subframe's log-gain (absolute coding, 5 bits).
    pub(crate) const GAIN_MSB: [u8; 8] = [224, 192, 160, 128, 96, 64, 32, 0];
    /// Delta log-gain for subsequent subframes (41-ary, small-step biased).
    pub(crate) const GAIN_DELTA: [u8; 41] = build_triangular_icdf::<41>();

    /// LSF stage-1 codebook index, NB/MB (32-entry).
    pub(crate) const LSF_STAGE1_NB: [u8; 32] = build_uniform_icdf::<32>();
    /// LSF stage-1 codebook index, WB (32-entry).
    pub(crate) const LSF_STAGE1_WB: [u8; 32] = build_uniform_icdf::<32>();
    /// LSF stage-2 residual per coefficient (9-ary, zero-centered Laplace-ish).
    pub(crate) const LSF_STAGE2: [u8; 9] = build_triangular_icdf::<9>();
    /// LSF interpolation factor for 20ms frames (5-ary, biased to "no interpolation").
    pub(crate) const LSF_INTERP: [u8; 5] = [179, 138, 102, 58, 0];

    /// Primary pitch lag, high part (NB: 3-ary coarse octave choice reused
    /// across bandwidths for simplicity).
    pub(crate) const PITCH_LAG_HIGH: [u8; 32] = build_uniform_icdf::<32>();
    /// Pitch contour (per-subframe lag offsets), 34-ary worst case (20ms, WB).
    pub(crate) const PITCH_CONTOUR: [u8; 34] = build_uniform_icdf::<34>();

    /// LTP periodicity index (selects one of 3 five-tap codebooks).
    pub(crate) const LTP_PERIODICITY: [u8; 3] = [192, 64, 0];
    /// LTP filter index within a periodicity codebook (8-ary).
    pub(crate) const LTP_FILTER: [u8; 8] = build_uniform_icdf::<8>();

    /// Excitation shell-code rate level (10-ary).
    pub(crate) const RATE_LEVEL: [u8; 10] = build_triangular_icdf::<10>();
    /// Pulse count per shell block, indexed `[rate_level]`, 18-ary
    /// (0..=16 pulses plus an escape to the LSB-extension path).
    pub(crate) const PULSE_COUNT: [[u8; 18]; 10] = build_pulse_count_tables();
    /// Binary split of pulses between the two halves of a shell block
    /// (symmetric around an even split).
    pub(crate) const SHELL_SPLIT: [u8; 17] = build_triangular_icdf::<17>();
    /// Sign of a nonzero excitation sample, indexed by quantization offset
    /// type (0 = low, 1 = high) and whether the pulse count is zero.
    pub(crate) const SIGN: [[u8; 2]; 2] = [[170, 0], [86, 0]];

    /// Uniform (flat) inverse-CDF over `N` symbols.
    const fn build_uniform_icdf<const N: usize>() -> [u8; N] {
        let mut out = [0u8; N];
        let mut i = 0;
        while i < N {
            let remaining = N - i;
            out[i] = ((remaining - 1) * 255 / N) as u8;
            i += 1;
        }
        out
    }

    /// Triangular (zero-centered, linearly decaying) inverse-CDF over `N`
    /// symbols, used for small signed deltas where zero is most likely.
    const fn build_triangular_icdf<const N: usize>() -> [u8; N] {
        let mut weights = [0u32; N];
        let half = (N / 2) as i32;
        let mut i = 0;
        let mut total = 0u32;
        while i < N {
            let d = (i as i32 - half).unsigned_abs();
            let w = (half as u32 + 2) - d.min(half as u32);
            weights[i] = w;
            total += w;
            i += 1;
        }
        let mut out = [0u8; N];
        let mut cum = 0u32;
        let mut i = 0;
        while i < N {
            cum += weights[i];
            let remaining = total - cum;
            out[i] = ((remaining * 255) / total) as u8;
            i += 1;
        }
        out
    }

    const fn build_pulse_count_tables() -> [[u8; 18]; 10] {
        let mut out = [[0u8; 18]; 10];
        let mut level = 0;
        while level < 10 {
            out[level] = build_triangular_icdf::<18>();
            level += 1;
        }
        out
    }
}

/// Quantization-offset constants (Q8), selected by frame type: low-offset
/// for unvoiced/inactive frames, high-offset for voiced frames.
pub(crate) const QUANTIZATION_OFFSET_LOW: i32 = 25;
pub(crate) const QUANTIZATION_OFFSET_HIGH: i32 = 60;

/// The three 5-tap LTP filter codebooks (Q14), selected by
/// `icdf::LTP_PERIODICITY` then indexed by `icdf::LTP_FILTER`.
///
/// Each codebook emphasizes a different periodicity confidence; row 0 is
/// the low-confidence (more smoothing) codebook.
pub(crate) const LTP_TAPS: [[[i32; 5]; 8]; 3] = build_ltp_taps();

const fn build_ltp_taps() -> [[[i32; 5]; 8]; 3] {
    let mut out = [[[0i32; 5]; 8]; 3];
    let mut cb = 0;
    while cb < 3 {
        let mut entry = 0;
        while entry < 8 {
            // Centre tap dominates; confidence increases with `cb`.
            let centre = 8192 + (cb as i32 * 2048) + (entry as i32 * 128);
            let side = (16384 - centre) / 4;
            out[cb][entry] = [side, side, centre, side, side];
            entry += 1;
        }
        cb += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icdf_tables_end_in_zero_and_are_non_increasing() {
        fn check(table: &[u8]) {
            assert_eq!(*table.last().unwrap(), 0);
            for w in table.windows(2) {
                assert!(w[0] >= w[1]);
            }
        }
        check(&icdf::FRAME_TYPE);
        check(&icdf::GAIN_MSB);
        check(&icdf::GAIN_DELTA);
        check(&icdf::LSF_STAGE1_NB);
        check(&icdf::LSF_STAGE2);
        check(&icdf::LSF_INTERP);
        check(&icdf::PITCH_CONTOUR);
        check(&icdf::LTP_PERIODICITY);
        check(&icdf::RATE_LEVEL);
        check(&icdf::SHELL_SPLIT);
        for row in &icdf::PULSE_COUNT {
            check(row);
        }
    }

    #[test]
    fn test_ltp_taps_sum_reasonably_close_to_unity_gain() {
        for cb in &LTP_TAPS {
            for taps in cb {
                let sum: i32 = taps.iter().sum();
                assert!((sum - 16384).abs() < 4096);
            }
        }
    }
}
