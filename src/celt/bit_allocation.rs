//! The CELT bit allocator: splits a frame's bit budget across bands so
//! that encoder and decoder walk through the same band order and arrive
//! at the same per-band pulse counts (spec §4.6).
//!
//! Unlike a purely local computation, the allocator is itself a
//! bitstream element: it reads/writes an allocation-trim symbol, a
//! per-band skip bit (bisected top-down, "1 = code this band, 0 =
//! skip it"), and — for stereo — an intensity-stereo band index and a
//! dual-stereo flag, all through the same range coder the rest of the
//! frame uses. Encoder and decoder call mirrored functions that consume
//! these symbols in identical order, so a real encoder's bitstream stays
//! byte-for-byte interpretable by this decoder.

use crate::celt::tables::{band_width, icdf, CACHE_CAPS50, NUM_BANDS};
use crate::range_coder::{RangeDecoder, RangeEncoder};
use crate::EncoderError;

/// Per-band allocation in raw pulse counts (indexed relative to the
/// call's `start_band`), plus the shared stereo decisions both sides
/// decode identically.
#[derive(Clone, Debug)]
pub(crate) struct Allocation {
    /// Pulses allocated to each coded band (raw pulse count, indexed from
    /// `start_band`, not 1/8-bit units).
    pub(crate) pulses: [usize; NUM_BANDS],
    /// First band (relative to `start_band`), if any, coded with joint
    /// (intensity) stereo: this band and all above it share one shape.
    pub(crate) intensity: usize,
    /// Whether bands below `intensity` are coded as independent L/R
    /// (`true`) or as a shared mid/side shape (`false`).
    pub(crate) dual_stereo: bool,
}

/// Deterministic trim-biased bisection: finds, for each band, the
/// largest pulse count such that the total stays within `total_bits`.
/// Both sides run this identically once `trim` is known, so it needs no
/// further bitstream interaction itself — only its *result* is then
/// selectively zeroed by the per-band skip bits.
fn bisect(
    total_bits: i32,
    start_band: usize,
    count: usize,
    channels: usize,
    lm: usize,
    trim: i32,
) -> Vec<usize> {
    let mut best = vec![0usize; count];
    if count == 0 || total_bits <= 0 {
        return best;
    }

    let widths: Vec<usize> = (0..count)
        .map(|b| band_width(start_band + b, lm))
        .collect();
    if widths.iter().sum::<usize>() == 0 {
        return best;
    }

    let trim = trim as i64;
    let mut lo: i64 = 0;
    let mut hi: i64 = 32 << 3;
    // Reused across every bisection step instead of allocating a fresh
    // `Vec` per iteration (~15 iterations/call, spec §5's zero-allocation
    // hot path).
    let mut candidate = vec![0usize; count];
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        let mut used: i64 = 0;
        for b in 0..count {
            let cap = (CACHE_CAPS50[start_band + b] as i64) * channels as i64;
            // `trim` biases the per-band rate up for high bands and down
            // for low ones (or vice versa), same bisection otherwise.
            let centered = 2 * b as i64 - count as i64;
            let biased_mid = mid + (mid * trim * centered) / (50 * count.max(1) as i64);
            let raw = (biased_mid.max(0) * widths[b] as i64).min(cap);
            candidate[b] = (raw / 8).max(0) as usize;
            used += candidate[b] as i64 * 8;
        }
        if used <= total_bits as i64 {
            best.copy_from_slice(&candidate);
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    best
}

/// Scans from the top band down while the two channels' coarse energy
/// stays close, returning the lowest band at which they're still close
/// enough to share one PVQ shape (spec's "intensity stereo" split).
fn choose_intensity(energy: &[[f32; NUM_BANDS]], start_band: usize, count: usize) -> usize {
    if energy.len() < 2 || count == 0 {
        return count;
    }
    let mut intensity = count;
    for b in (0..count).rev() {
        let diff = (energy[0][start_band + b] - energy[1][start_band + b]).abs();
        if diff < 0.5 {
            intensity = b;
        } else {
            break;
        }
    }
    intensity
}

/// Whether the channels stay independent enough below `intensity` to be
/// worth coding as separate L/R rather than a shared mid/side shape.
fn choose_dual_stereo(energy: &[[f32; NUM_BANDS]], start_band: usize, intensity: usize) -> bool {
    if intensity == 0 {
        return false;
    }
    let avg_diff: f32 = (0..intensity)
        .map(|b| (energy[0][start_band + b] - energy[1][start_band + b]).abs())
        .sum::<f32>()
        / intensity as f32;
    avg_diff > 0.3
}

/// Encoder side: writes the trim symbol, the per-band skip bits (top
/// band down to `start_band`), and — for stereo — the intensity index
/// and dual-stereo flag, then returns the resulting allocation.
///
/// `trim` is the encoder's chosen bias (typically derived from the
/// frame's spectral tilt), clamped to the `[-5, 5]` range the `TRIM`
/// symbol can represent. `energy` is this frame's already-computed
/// per-channel coarse energy, used to decide the stereo split.
pub(crate) fn encode_allocation(
    encoder: &mut RangeEncoder,
    total_bits: i32,
    start_band: usize,
    end_band: usize,
    channels: usize,
    lm: usize,
    trim: i32,
    energy: &[[f32; NUM_BANDS]],
) -> Result<Allocation, EncoderError> {
    let end_band = end_band.min(NUM_BANDS);
    let count = end_band.saturating_sub(start_band);
    let trim = trim.clamp(-5, 5);

    encoder.encode_icdf((trim + 5) as usize, icdf::TRIM, 7)?;

    let raw = bisect(total_bits, start_band, count, channels, lm, trim);
    let mut pulses = [0usize; NUM_BANDS];
    for b in (0..count).rev() {
        let keep = raw[b] > 0;
        encoder.encode_bit_logp(u32::from(keep), 1)?;
        pulses[b] = if keep { raw[b] } else { 0 };
    }

    let intensity = if channels == 2 && count > 0 {
        let value = choose_intensity(energy, start_band, count);
        encoder.encode_uint(value as u32, (count + 1) as u32)?;
        value
    } else {
        count
    };

    let dual_stereo = if channels == 2 && intensity < count {
        let value = choose_dual_stereo(energy, start_band, intensity);
        encoder.encode_bit_logp(u32::from(value), 1)?;
        value
    } else {
        false
    };

    Ok(Allocation {
        pulses,
        intensity,
        dual_stereo,
    })
}

/// Decoder side: the mirror of [`encode_allocation`], reading the same
/// symbols in the same order.
pub(crate) fn decode_allocation(
    decoder: &mut RangeDecoder,
    total_bits: i32,
    start_band: usize,
    end_band: usize,
    channels: usize,
    lm: usize,
) -> Allocation {
    let end_band = end_band.min(NUM_BANDS);
    let count = end_band.saturating_sub(start_band);

    let trim = decoder.decode_icdf(icdf::TRIM, 7) as i32 - 5;

    let raw = bisect(total_bits, start_band, count, channels, lm, trim);
    let mut pulses = [0usize; NUM_BANDS];
    for b in (0..count).rev() {
        let keep = decoder.decode_bit_logp(1);
        pulses[b] = if keep { raw[b] } else { 0 };
    }

    let intensity = if channels == 2 && count > 0 {
        decoder.decode_uint((count + 1) as u32) as usize
    } else {
        count
    };

    let dual_stereo = if channels == 2 && intensity < count {
        decoder.decode_bit_logp(1)
    } else {
        false
    };

    Allocation {
        pulses,
        intensity,
        dual_stereo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_coder::RangeEncoder;

    fn flat_energy(channels: usize) -> Vec<[f32; NUM_BANDS]> {
        vec![[0.0; NUM_BANDS]; channels]
    }

    #[test]
    fn test_allocate_round_trips_through_range_coder() {
        let mut buffer = vec![0u8; 256];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let energy = flat_energy(2);
        let encoded = encode_allocation(&mut encoder, 800, 0, NUM_BANDS, 2, 3, 2, &energy).unwrap();
        encoder.done().unwrap();
        drop(encoder);

        let mut decoder = RangeDecoder::new(&buffer);
        let decoded = decode_allocation(&mut decoder, 800, 0, NUM_BANDS, 2, 3);

        assert_eq!(encoded.pulses, decoded.pulses);
        assert_eq!(encoded.intensity, decoded.intensity);
        assert_eq!(encoded.dual_stereo, decoded.dual_stereo);
    }

    #[test]
    fn test_allocate_zero_budget_is_silent() {
        let mut buffer = vec![0u8; 64];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let energy = flat_energy(1);
        let allocation = encode_allocation(&mut encoder, 0, 0, NUM_BANDS, 1, 3, 0, &energy).unwrap();
        assert!(allocation.pulses.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_allocate_more_bits_never_decreases_total_pulses() {
        let low = bisect(200, 0, NUM_BANDS, 1, 3, 0);
        let high = bisect(2000, 0, NUM_BANDS, 1, 3, 0);
        let low_total: usize = low.iter().sum();
        let high_total: usize = high.iter().sum();
        assert!(high_total >= low_total);
    }

    #[test]
    fn test_allocate_stays_within_budget() {
        let raw = bisect(400, 0, NUM_BANDS, 2, 3, 0);
        let bits_used: usize = raw.iter().map(|&p| p * 8).sum();
        assert!(bits_used <= 400 + 64); // allow rounding slack from the bisection
    }

    #[test]
    fn test_intensity_picks_up_diverging_channels() {
        let mut energy = flat_energy(2);
        for b in 0..NUM_BANDS {
            energy[1][b] = if b >= NUM_BANDS - 3 { 0.0 } else { 4.0 };
        }
        let intensity = choose_intensity(&energy, 0, NUM_BANDS);
        assert!(intensity >= NUM_BANDS - 3);
    }
}
