//! Static tables for the CELT codec: band layout, entropy tables, and the
//! per-band pulse cap used by the bit allocator.

/// Band edges in the 5 ms short-frame sample domain (spec §4.4), including
/// the leading 0 and the trailing full-band edge. There are 21 bands.
pub(crate) const EBANDS: [i16; 22] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 34, 40, 48, 60, 78, 100,
];

/// Number of coded bands.
pub(crate) const NUM_BANDS: usize = EBANDS.len() - 1;

/// log2-domain energy mean per band, used to bias the energy predictor
/// (inter-frame, LR-split) toward typical spectral shape.
pub(crate) const E_MEANS: [f32; NUM_BANDS] = [
    6.437_5, 6.25, 5.75, 5.312_5, 5.062_5, 4.812_5, 4.5, 4.375, 4.875, 4.687_5, 4.562_5, 4.437_5,
    4.875, 4.625, 4.3125, 4.5, 4.375, 4.625, 4.75, 4.3125, 4.5,
];

/// Per-band cap on allocatable pulses (in 1/8th-bit units) at the highest
/// complexity, indexed by band. Keeps the allocator from wasting bits on a
/// band once it's already at "transparent" allocation.
pub(crate) const CACHE_CAPS50: [i16; NUM_BANDS] = [
    224, 224, 224, 224, 224, 224, 224, 224, 160, 160, 160, 160, 144, 144, 144, 128, 128, 128, 96,
    96, 64,
];

/// log2(Gamma(N)) style combinatorial table isn't needed directly: `pvq`
/// computes `V(N,K)` on the fly. This table instead gives, per band, the
/// maximum "pulses per sample" ratio used to seed the bisection search in
/// the bit allocator.
pub(crate) const LOG_N: [i16; NUM_BANDS] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 8, 8, 16, 16, 16, 21, 21, 24, 24, 26, 27,
];

/// Inverse CDFs used by the range coder for small fixed alphabets (spec
/// §4.4): `{value: 0..n}` decoded MSB-first against `255 - cumulative`.
pub(crate) mod icdf {
    /// Transient flag: P(transient) = 1/8.
    pub(crate) const TRANSIENT: &[u8] = &[7, 0];
    /// Intra flag (first frame after a reset, or coder-requested intra).
    pub(crate) const INTRA: &[u8] = &[7, 0];
    /// 3-way spread decision (none / light / normal / aggressive).
    pub(crate) const SPREAD: &[u8] = &[25, 23, 2, 0];
    /// Allocation trim: 11-way symbol centered on index 5 (trim value 0),
    /// biasing the bisection toward low bands (trim < 0) or high bands
    /// (trim > 0).
    pub(crate) const TRIM: &[u8] = &[126, 124, 119, 109, 87, 41, 19, 9, 4, 2, 0];
}

/// Returns the number of samples in band `b` at the given band-size shift
/// (`lm`, log2 of the short-block count: 0 = 2.5 ms granularity ... 3 = 20ms).
pub(crate) fn band_width(band: usize, lm: usize) -> usize {
    ((EBANDS[band + 1] - EBANDS[band]) as usize) << lm
}

/// Returns the starting bin of band `b` within a full-length (`lm`-scaled)
/// MDCT buffer. Telescopes to `EBANDS[b] << lm` since every band below it
/// has itself been widened by the same `lm` shift.
pub(crate) fn band_offset(band: usize, lm: usize) -> usize {
    (EBANDS[band] as usize) << lm
}

/// Scatters one short sub-block's `lm=0`-sized frequency bins (`block`,
/// `band_width(b, 0)` wide per band) into `dst`'s band-concatenated
/// layout at short-block index `blk` (spec's transient MDCT splitting):
/// band `b`'s segment in `dst` holds each sub-block's band-`b`
/// coefficients back to back, in block order.
pub(crate) fn scatter_block(dst: &mut [f32], block: &[f32], blk: usize, lm: usize) {
    for b in 0..NUM_BANDS {
        let width0 = band_width(b, 0);
        let lo0 = EBANDS[b] as usize;
        if lo0 + width0 > block.len() {
            break;
        }
        let dst_lo = band_offset(b, lm) + blk * width0;
        if dst_lo + width0 > dst.len() {
            break;
        }
        dst[dst_lo..dst_lo + width0].copy_from_slice(&block[lo0..lo0 + width0]);
    }
}

/// Inverse of [`scatter_block`]: gathers short sub-block `blk`'s
/// band-by-band coefficients back out of `src`'s band-concatenated
/// layout into a contiguous `lm=0`-sized `out`.
pub(crate) fn gather_block(src: &[f32], blk: usize, lm: usize, out: &mut [f32]) {
    for b in 0..NUM_BANDS {
        let width0 = band_width(b, 0);
        let lo0 = EBANDS[b] as usize;
        if lo0 + width0 > out.len() {
            break;
        }
        let src_lo = band_offset(b, lm) + blk * width0;
        if src_lo + width0 > src.len() {
            break;
        }
        out[lo0..lo0 + width0].copy_from_slice(&src[src_lo..src_lo + width0]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eband_boundaries_strictly_increasing() {
        for w in EBANDS.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn test_band_width_scales_with_lm() {
        assert_eq!(band_width(0, 0), 1);
        assert_eq!(band_width(0, 3), 8);
    }

    #[test]
    fn test_band_offset_matches_scaled_edges() {
        for b in 0..NUM_BANDS {
            assert_eq!(band_offset(b, 2), (EBANDS[b] as usize) << 2);
        }
    }

    #[test]
    fn test_scatter_gather_round_trips() {
        let lm = 2;
        let nb = 1usize << lm;
        let full_len = (EBANDS[NUM_BANDS] as usize) << lm;
        let short_len = EBANDS[NUM_BANDS] as usize;

        let mut dst = vec![0.0f32; full_len];
        let blocks: Vec<Vec<f32>> = (0..nb)
            .map(|blk| (0..short_len).map(|i| (blk * 1000 + i) as f32).collect())
            .collect();
        for (blk, block) in blocks.iter().enumerate() {
            scatter_block(&mut dst, block, blk, lm);
        }
        for (blk, expected) in blocks.iter().enumerate() {
            let mut out = vec![0.0f32; short_len];
            gather_block(&dst, blk, lm, &mut out);
            assert_eq!(&out, expected);
        }
    }
}
