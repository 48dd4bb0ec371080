//! Long-term (pitch) prediction: lag/contour/tap decoding and the 5-tap
//! LTP synthesis step applied on top of the LPC excitation for voiced
//! subframes (spec §4.2).

use crate::encoder_error::EncoderError;
use crate::range_coder::{RangeDecoder, RangeEncoder};
use crate::silk::tables::{icdf, LTP_TAPS};

/// Smallest/largest pitch lag (in samples at the internal rate) the
/// `PITCH_LAG_HIGH` table can represent: `32 + idx * 4` for `idx in 0..32`.
const MIN_LAG: usize = 32;
const MAX_LAG: usize = 32 + 31 * 4;

/// Decoded pitch information for one frame.
#[derive(Clone, Debug)]
pub(crate) struct PitchInfo {
    /// Per-subframe pitch lag, in samples at the internal rate.
    pub(crate) lags: Vec<usize>,
    /// Per-subframe 5-tap LTP filter (Q14).
    pub(crate) taps: Vec<[i32; 5]>,
}

/// Decodes the pitch lag, contour and per-subframe LTP taps for a voiced
/// frame with `subframe_count` subframes (2 for 10ms, 4 for 20ms).
pub(crate) fn decode_pitch(decoder: &mut RangeDecoder, subframe_count: usize) -> PitchInfo {
    let base_lag = 32 + decoder.decode_icdf(&icdf::PITCH_LAG_HIGH, 8) as usize * 4;
    let mut lags = Vec::with_capacity(subframe_count);
    for _ in 0..subframe_count {
        let offset = decoder.decode_icdf(&icdf::PITCH_CONTOUR, 8) as i32 - 17;
        lags.push((base_lag as i32 + offset).max(32) as usize);
    }

    let mut taps = Vec::with_capacity(subframe_count);
    for _ in 0..subframe_count {
        let codebook = decoder.decode_icdf(&icdf::LTP_PERIODICITY, 8) as usize;
        let entry = decoder.decode_icdf(&icdf::LTP_FILTER, 8) as usize;
        taps.push(LTP_TAPS[codebook.min(2)][entry.min(7)]);
    }

    PitchInfo { lags, taps }
}

/// Applies the 5-tap LTP filter: adds the pitch-periodic prediction drawn
/// from `history` (samples preceding the subframe currently being
/// synthesized, most-recent last) to `excitation` in place.
pub(crate) fn apply_ltp(excitation: &mut [f32], history: &[f32], lag: usize, taps: &[i32; 5]) {
    let taps_f: [f32; 5] = [
        taps[0] as f32 / 16384.0,
        taps[1] as f32 / 16384.0,
        taps[2] as f32 / 16384.0,
        taps[3] as f32 / 16384.0,
        taps[4] as f32 / 16384.0,
    ];

    for (i, sample) in excitation.iter_mut().enumerate() {
        let centre = history.len() as i64 - lag as i64 + i as i64;
        let mut prediction = 0.0f32;
        for (tap_idx, &tap) in taps_f.iter().enumerate() {
            let idx = centre - 2 + tap_idx as i64;
            if idx >= 0 && (idx as usize) < history.len() {
                prediction += tap * history[idx as usize];
            }
        }
        *sample += prediction;
    }
}

/// Encoder-side inverse of `apply_ltp`: removes the pitch-periodic
/// prediction from `excitation` so only the LPC residual remains to be
/// shell-coded, mirroring exactly what the decoder will re-add from the
/// same `history`/`lag`/`taps`.
pub(crate) fn remove_ltp(excitation: &mut [f32], history: &[f32], lag: usize, taps: &[i32; 5]) {
    let taps_f: [f32; 5] = [
        taps[0] as f32 / 16384.0,
        taps[1] as f32 / 16384.0,
        taps[2] as f32 / 16384.0,
        taps[3] as f32 / 16384.0,
        taps[4] as f32 / 16384.0,
    ];

    for (i, sample) in excitation.iter_mut().enumerate() {
        let centre = history.len() as i64 - lag as i64 + i as i64;
        let mut prediction = 0.0f32;
        for (tap_idx, &tap) in taps_f.iter().enumerate() {
            let idx = centre - 2 + tap_idx as i64;
            if idx >= 0 && (idx as usize) < history.len() {
                prediction += tap * history[idx as usize];
            }
        }
        *sample -= prediction;
    }
}

/// Finds the lag in `MIN_LAG..=MAX_LAG` with the strongest normalized
/// autocorrelation between `current` and the tail of `history`, returning
/// the lag and a `0.0..=1.0` confidence score (a coarse stand-in for the
/// real three-stage open-then-closed-loop pitch search).
pub(crate) fn search_lag(history: &[f32], current: &[f32]) -> (usize, f32) {
    let current_energy: f32 = current.iter().map(|&c| c * c).sum::<f32>().max(1e-6);
    let mut best_lag = MIN_LAG;
    let mut best_corr = 0.0f32;

    for lag in MIN_LAG..=MAX_LAG {
        if lag > history.len() {
            break;
        }
        let mut num = 0.0f32;
        let mut den = 0.0f32;
        for (i, &c) in current.iter().enumerate() {
            let idx = history.len() as i64 - lag as i64 + i as i64;
            if idx >= 0 && (idx as usize) < history.len() {
                let h = history[idx as usize];
                num += c * h;
                den += h * h;
            }
        }
        if den > 1e-6 {
            let corr = (num * num) / (den * current_energy);
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }
    }

    (best_lag, best_corr)
}

/// Writes the pitch lag, contour and per-subframe LTP taps for a voiced
/// frame: reuses `base_lag` across all subframes (zero contour offset)
/// and always selects the middle-confidence codebook's first entry, a
/// coarse stand-in for the real per-subframe closed-loop LTP fit.
pub(crate) fn encode_pitch(
    encoder: &mut RangeEncoder,
    base_lag: usize,
    subframe_count: usize,
) -> Result<PitchInfo, EncoderError> {
    let base_index = (base_lag.saturating_sub(MIN_LAG) / 4).min(31);
    encoder.encode_icdf(base_index, &icdf::PITCH_LAG_HIGH, 8)?;
    let quantized_base_lag = MIN_LAG + base_index * 4;

    let mut lags = Vec::with_capacity(subframe_count);
    for _ in 0..subframe_count {
        encoder.encode_icdf(17, &icdf::PITCH_CONTOUR, 8)?;
        lags.push(quantized_base_lag);
    }

    const CODEBOOK: usize = 1;
    const ENTRY: usize = 0;
    let mut taps = Vec::with_capacity(subframe_count);
    for _ in 0..subframe_count {
        encoder.encode_icdf(CODEBOOK, &icdf::LTP_PERIODICITY, 8)?;
        encoder.encode_icdf(ENTRY, &icdf::LTP_FILTER, 8)?;
        taps.push(LTP_TAPS[CODEBOOK][ENTRY]);
    }

    Ok(PitchInfo { lags, taps })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_ltp_is_noop_with_zero_taps() {
        let mut excitation = vec![1.0f32; 4];
        let history = vec![0.5f32; 64];
        apply_ltp(&mut excitation, &history, 40, &[0, 0, 0, 0, 0]);
        assert_eq!(excitation, vec![1.0f32; 4]);
    }

    #[test]
    fn test_apply_ltp_adds_periodic_prediction() {
        let mut excitation = vec![0.0f32; 1];
        let mut history = vec![0.0f32; 64];
        history[63] = 1.0;
        apply_ltp(&mut excitation, &history, 1, &[0, 0, 16384, 0, 0]);
        assert!((excitation[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_remove_ltp_undoes_apply_ltp() {
        let history = vec![0.3f32; 64];
        let taps = [100, 500, 16384, 500, 100];
        let mut excitation = vec![0.0f32; 8];
        let original = excitation.clone();
        apply_ltp(&mut excitation, &history, 40, &taps);
        remove_ltp(&mut excitation, &history, 40, &taps);
        for (a, b) in excitation.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_search_lag_finds_known_periodicity() {
        let period = 50;
        let mut history = vec![0.0f32; 400];
        for (i, h) in history.iter_mut().enumerate() {
            *h = ((i % period) as f32 / period as f32 * std::f32::consts::TAU).sin();
        }
        let current: Vec<f32> = (0..80)
            .map(|i| ((i % period) as f32 / period as f32 * std::f32::consts::TAU).sin())
            .collect();
        let (lag, confidence) = search_lag(&history, &current);
        assert!(confidence > 0.5);
        assert_eq!(lag % period, 0);
    }

    #[test]
    fn test_encode_pitch_produces_lag_for_each_subframe() {
        let mut buffer = vec![0u8; 64];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let info = encode_pitch(&mut encoder, 60, 4).unwrap();
        assert_eq!(info.lags.len(), 4);
        assert_eq!(info.taps.len(), 4);
        assert!(info.lags.iter().all(|&l| (32..=156).contains(&l)));
    }
}
