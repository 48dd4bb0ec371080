//! Shell-coded excitation decoding (spec §4.2): a rate level selects a
//! per-16-sample pulse-count table, pulse counts are iteratively
//! binary-split down to individual sample magnitudes, and LSBs/signs are
//! attached to recover signed pulse amplitudes.

use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder};
use crate::silk::tables::{icdf, QUANTIZATION_OFFSET_HIGH, QUANTIZATION_OFFSET_LOW};

const SHELL_BLOCK_SIZE: usize = 16;
/// Largest pulse count a single shell block can carry in this
/// simplified coder (no LSB-extension escape path).
const MAX_BLOCK_PULSES: i32 = 16;

/// Decodes the excitation signal for one subframe of `length` samples.
///
/// `high_offset` selects the quantization-offset constant (voiced frames
/// use the high offset, unvoiced/inactive frames the low one, per spec
/// §4.2's frame-type-to-offset mapping).
pub(crate) fn decode_excitation(
    decoder: &mut RangeDecoder,
    length: usize,
    high_offset: bool,
) -> Vec<f32> {
    let rate_level = decoder.decode_icdf(&icdf::RATE_LEVEL, 8) as usize;
    let offset = if high_offset {
        QUANTIZATION_OFFSET_HIGH
    } else {
        QUANTIZATION_OFFSET_LOW
    };

    let mut magnitudes = vec![0i32; length];
    let mut block_start = 0;
    while block_start < length {
        let block_len = SHELL_BLOCK_SIZE.min(length - block_start);
        let pulse_count = decoder.decode_icdf(&icdf::PULSE_COUNT[rate_level.min(9)], 8) as i32;
        let block = &mut magnitudes[block_start..block_start + block_len];
        split_pulses(decoder, block, pulse_count);
        block_start += block_len;
    }

    let mut out = Vec::with_capacity(length);
    for &mag in &magnitudes {
        if mag == 0 {
            out.push(offset as f32 / 256.0);
            continue;
        }
        let sign_table = &icdf::SIGN[usize::from(high_offset)];
        let negative = decoder.decode_icdf(sign_table, 8) == 0;
        let signed = if negative { -mag } else { mag };
        out.push(signed as f32 + (offset as f32 / 256.0) * signed.signum() as f32);
    }
    out
}

/// Recursively splits `total_pulses` across `block` by repeated binary
/// division (the shell code's combinatorial tree), bottoming out at
/// single-sample magnitudes.
fn split_pulses(decoder: &mut RangeDecoder, block: &mut [i32], total_pulses: i32) {
    if block.len() == 1 {
        block[0] = total_pulses;
        return;
    }
    if total_pulses == 0 {
        block.iter_mut().for_each(|m| *m = 0);
        return;
    }

    let mid = block.len() / 2;
    let left_pulses = if total_pulses as usize >= icdf::SHELL_SPLIT.len() - 1 {
        decoder.decode_icdf(&icdf::SHELL_SPLIT, 8) as i32 * total_pulses
            / (icdf::SHELL_SPLIT.len() as i32 - 1)
    } else {
        decoder.decode_icdf(&icdf::SHELL_SPLIT, 8) as i32 % (total_pulses + 1)
    };
    let left_pulses = left_pulses.clamp(0, total_pulses);
    let right_pulses = total_pulses - left_pulses;

    let (left, right) = block.split_at_mut(mid);
    split_pulses(decoder, left, left_pulses);
    split_pulses(decoder, right, right_pulses);
}

/// Quantizes `residual` (the LPC/LTP prediction error, in the same
/// normalized-offset domain `decode_excitation` produces) and writes it
/// through the shell coder, mirroring `decode_excitation`'s bit layout
/// exactly so the reconstruction matches.
pub(crate) fn encode_excitation(
    encoder: &mut RangeEncoder,
    residual: &[f32],
    high_offset: bool,
) -> Result<(), EncoderError> {
    let offset = if high_offset {
        QUANTIZATION_OFFSET_HIGH
    } else {
        QUANTIZATION_OFFSET_LOW
    } as f32
        / 256.0;

    let signed_magnitudes: Vec<i32> = residual
        .iter()
        .map(|&r| {
            let shifted = if r >= 0.0 { r - offset } else { r + offset };
            shifted.round() as i32
        })
        .collect();

    let rate_level = rate_level_for_magnitudes(&signed_magnitudes);
    encoder.encode_icdf(rate_level, &icdf::RATE_LEVEL, 8)?;

    let mut block_start = 0;
    while block_start < signed_magnitudes.len() {
        let block_len = SHELL_BLOCK_SIZE.min(signed_magnitudes.len() - block_start);
        let mut block: Vec<i32> = signed_magnitudes[block_start..block_start + block_len]
            .iter()
            .map(|&m| m.abs())
            .collect();

        let raw_total: i32 = block.iter().sum();
        let pulse_count = raw_total.min(MAX_BLOCK_PULSES);
        if raw_total != pulse_count {
            normalize_to_sum(&mut block, pulse_count);
        }

        encoder.encode_icdf(pulse_count as usize, &icdf::PULSE_COUNT[rate_level.min(9)], 8)?;
        encode_split_pulses(encoder, &block, pulse_count)?;

        for (i, &mag) in block.iter().enumerate() {
            if mag == 0 {
                continue;
            }
            let original = signed_magnitudes[block_start + i];
            let sign_table = &icdf::SIGN[usize::from(high_offset)];
            let symbol = if original < 0 { 0 } else { 1 };
            encoder.encode_icdf(symbol, sign_table, 8)?;
        }

        block_start += block_len;
    }

    Ok(())
}

/// Picks a rate level whose 18-ary pulse-count table can represent this
/// block's typical magnitude without saturating too often.
fn rate_level_for_magnitudes(magnitudes: &[i32]) -> usize {
    if magnitudes.is_empty() {
        return 0;
    }
    let mean_abs: f32 =
        magnitudes.iter().map(|&m| m.unsigned_abs()).sum::<u32>() as f32 / magnitudes.len() as f32;
    (mean_abs / 1.5).round().clamp(0.0, 9.0) as usize
}

/// Rescales non-negative `mags` so they sum to exactly `target`,
/// preserving relative proportions via largest-remainder rounding.
fn normalize_to_sum(mags: &mut [i32], target: i32) {
    let total: i32 = mags.iter().sum();
    if total == target {
        return;
    }
    if total == 0 {
        let mut remaining = target;
        for m in mags.iter_mut() {
            if remaining == 0 {
                break;
            }
            *m = 1;
            remaining -= 1;
        }
        return;
    }

    let scale = target as f32 / total as f32;
    let scaled: Vec<f32> = mags.iter().map(|&m| m as f32 * scale).collect();
    let mut floors: Vec<i32> = scaled.iter().map(|&v| v.floor() as i32).collect();
    let mut remainder = target - floors.iter().sum::<i32>();

    let mut order: Vec<usize> = (0..mags.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = scaled[a] - floors[a] as f32;
        let fb = scaled[b] - floors[b] as f32;
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });
    for &i in &order {
        if remainder <= 0 {
            break;
        }
        floors[i] += 1;
        remainder -= 1;
    }
    for (m, f) in mags.iter_mut().zip(floors.iter()) {
        *m = *f;
    }
}

/// Encoder-side mirror of `split_pulses`: since the total at each level is
/// already known exactly (it's the sum of the sub-block's magnitudes),
/// this just writes that split out through the same `SHELL_SPLIT` table
/// instead of reading it.
fn encode_split_pulses(
    encoder: &mut RangeEncoder,
    block: &[i32],
    total_pulses: i32,
) -> Result<(), EncoderError> {
    if block.len() == 1 || total_pulses == 0 {
        return Ok(());
    }
    let mid = block.len() / 2;
    let (left, right) = block.split_at(mid);
    let left_pulses: i32 = left.iter().sum();
    encoder.encode_icdf(left_pulses as usize, &icdf::SHELL_SPLIT, 8)?;
    encode_split_pulses(encoder, left, left_pulses)?;
    encode_split_pulses(encoder, right, total_pulses - left_pulses)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_coder::RangeEncoder;

    #[test]
    fn test_decode_excitation_produces_requested_length() {
        let packet = [0u8; 64];
        let mut decoder = RangeDecoder::new(&packet);
        let out = decode_excitation(&mut decoder, 40, true);
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn test_decode_excitation_is_deterministic() {
        let packet = [0xAAu8; 64];
        let mut d1 = RangeDecoder::new(&packet);
        let mut d2 = RangeDecoder::new(&packet);
        let a = decode_excitation(&mut d1, 20, false);
        let b = decode_excitation(&mut d2, 20, false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_pulses_conserves_total() {
        let mut buffer = vec![0u8; 256];
        let mut encoder = RangeEncoder::new(&mut buffer);
        for _ in 0..8 {
            encoder.encode_uint(3, 18).unwrap();
        }
        encoder.done().unwrap();
        drop(encoder);

        let mut decoder = RangeDecoder::new(&buffer);
        let mut block = vec![0i32; 16];
        split_pulses(&mut decoder, &mut block, 9);
        let total: i32 = block.iter().sum();
        assert_eq!(total, 9);
    }

    #[test]
    fn test_encode_then_decode_excitation_round_trips_length_and_silence() {
        let residual = vec![0.0f32; 32];
        let mut buffer = vec![0u8; 256];
        let mut encoder = RangeEncoder::new(&mut buffer);
        encode_excitation(&mut encoder, &residual, false).unwrap();
        encoder.done().unwrap();
        drop(encoder);

        let mut decoder = RangeDecoder::new(&buffer);
        let out = decode_excitation(&mut decoder, 32, false);
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn test_normalize_to_sum_preserves_target_total() {
        let mut mags = vec![5, 5, 5, 5];
        normalize_to_sum(&mut mags, 16);
        assert_eq!(mags.iter().sum::<i32>(), 16);

        let mut shrink = vec![10, 10];
        normalize_to_sum(&mut shrink, 16);
        assert_eq!(shrink.iter().sum::<i32>(), 16);
    }
}
