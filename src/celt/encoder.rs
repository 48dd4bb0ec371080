//! Implements the CELT encoder: the mirror image of `celt::decoder`,
//! sharing the same band tables and bit allocator so encoder and decoder
//! walk the bitstream in lockstep (spec §4.6).

use crate::celt::bit_allocation::encode_allocation;
use crate::celt::mdct::{build_window, Mdct};
use crate::celt::pvq::{encode_joint_band, encode_vector, search};
use crate::celt::tables::{band_offset, band_width, icdf, scatter_block, E_MEANS, NUM_BANDS};
use crate::range_coder::{RangeEncoder, Tell};
use crate::{Channels, EncoderError, SamplingRate};

const LAPLACE_COARSE_DECAY: u32 = 6554;

/// The CELT encoder.
#[derive(Clone, Debug)]
pub(crate) struct CeltEncoder {
    channels: usize,
    sampling_rate: SamplingRate,
    old_energy: Vec<[f32; NUM_BANDS]>,
    overlap_mem: Vec<Vec<f32>>,
}

impl CeltEncoder {
    /// Creates a new CELT encoder.
    pub(crate) fn new(
        sampling_rate: SamplingRate,
        channels: Channels,
    ) -> Result<Self, EncoderError> {
        let n = channels as usize;
        Ok(Self {
            channels: n,
            sampling_rate,
            old_energy: vec![[0.0; NUM_BANDS]; n],
            overlap_mem: vec![vec![0.0; 960]; n],
        })
    }

    /// Resets the CELT encoder.
    pub(crate) fn reset(&mut self) -> Result<(), EncoderError> {
        for e in &mut self.old_energy {
            *e = [0.0; NUM_BANDS];
        }
        for mem in &mut self.overlap_mem {
            mem.iter_mut().for_each(|v| *v = 0.0);
        }
        Ok(())
    }

    /// Encodes one CELT frame of `frame_size` samples per channel from
    /// interleaved `input`, starting at CELT band `start_band`.
    pub(crate) fn encode(
        &mut self,
        encoder: &mut RangeEncoder,
        input: &[f32],
        frame_size: usize,
        start_band: usize,
        frame_bits: u32,
    ) -> Result<(), EncoderError> {
        let channels = self.channels;
        let end_band = NUM_BANDS;
        let lm = frame_size_to_lm(frame_size);
        let n4 = frame_size;

        let silent = input.iter().all(|&s| s.abs() < 1e-9);
        encoder.encode_icdf(usize::from(!silent), &[1, 0], 15)?;
        if silent {
            for e in &mut self.old_energy {
                *e = [-28.0; NUM_BANDS];
            }
            return Ok(());
        }

        let postfilter = if start_band == 0 {
            search_postfilter(input, channels, n4)
        } else {
            None
        };
        encoder.encode_icdf(usize::from(postfilter.is_some()), &[1, 0], 15)?;
        if let Some((period, gain)) = postfilter {
            encode_postfilter_params(encoder, period, gain)?;
        }

        // Transient frames split the MDCT into `nb = 2^lm` short blocks of
        // fixed 2.5 ms length (spec's short-block coding), detected from a
        // coarse front/back energy-ratio test on the raw input.
        let is_transient = lm > 0 && detect_transient(input, channels);
        if lm > 0 {
            encoder.encode_icdf(usize::from(is_transient), icdf::TRANSIENT, 3)?;
        }
        let nb = if is_transient { 1usize << lm } else { 1 };
        let sub_len = n4 / nb.max(1);

        let mdct = Mdct::new(sub_len);
        let window = build_window(sub_len / 2);

        let mut freq = vec![vec![0.0f32; n4]; channels];
        for ch in 0..channels {
            let mut time = vec![0.0f32; 2 * n4];
            for i in 0..n4 {
                let idx = i * channels + ch;
                time[n4 + i] = input.get(idx).copied().unwrap_or(0.0);
            }
            let overlap = &mut self.overlap_mem[ch];
            if overlap.len() < n4 {
                overlap.resize(n4, 0.0);
            }
            time[..n4].copy_from_slice(overlap);
            overlap.copy_from_slice(&time[n4..2 * n4]);

            for blk in 0..nb {
                let window_slice = &time[blk * sub_len..blk * sub_len + 2 * sub_len];
                let mut blk_freq = vec![0.0f32; sub_len];
                mdct.forward(window_slice, &mut blk_freq, &window);
                scatter_block(&mut freq[ch], &blk_freq, blk, lm);
            }
        }

        let mut raw_energy = vec![[0.0f32; NUM_BANDS]; channels];
        for ch in 0..channels {
            for b in 0..end_band {
                let width = band_width(b, lm);
                let lo = band_offset(b, lm).min(n4);
                let hi = (lo + width).min(n4);
                let sum_sq: f32 = freq[ch][lo..hi].iter().map(|&v| v * v).sum();
                let rms = (sum_sq / width.max(1) as f32).sqrt().max(1e-9);
                raw_energy[ch][b] = rms.log2();
            }
        }

        // Intra vs. inter-frame coarse-energy prediction: a real (if
        // coarse) rate estimate, picking whichever predictor yields
        // smaller deltas to code, rather than always coding intra.
        let intra_cost: f32 = (0..end_band).map(|b| (raw_energy[0][b] - E_MEANS[b]).abs()).sum();
        let inter_cost: f32 = (0..end_band)
            .map(|b| (raw_energy[0][b] - self.old_energy[0][b]).abs())
            .sum();
        let intra = intra_cost <= inter_cost;
        encoder.encode_icdf(usize::from(intra), icdf::INTRA, 3)?;

        // Coded energy is the *quantized* value (predictor + rounded
        // delta), matching what the decoder will reconstruct, so the next
        // frame's inter-frame predictor stays in sync with the decoder's.
        let mut energy = vec![[0.0f32; NUM_BANDS]; channels];
        for ch in 0..channels {
            for b in 0..end_band {
                let predictor = if intra {
                    E_MEANS[b]
                } else {
                    self.old_energy[ch][b]
                };
                let mut delta = ((raw_energy[ch][b] - predictor) / 0.0625).round() as i32;
                encoder.encode_laplace(&mut delta, 6000, LAPLACE_COARSE_DECAY)?;
                energy[ch][b] = predictor + delta as f32 * 0.0625;
            }
        }

        let remaining_bits = (frame_bits as i32 - encoder.tell_frac() as i32).max(0);
        let trim = estimate_trim(&energy[0], start_band, end_band);
        let allocation = encode_allocation(
            encoder,
            remaining_bits,
            start_band,
            end_band,
            channels,
            lm,
            trim,
            &energy,
        )?;

        for b in start_band..end_band {
            let width = band_width(b, lm);
            let rel = b - start_band;
            let k = allocation.pulses[rel];
            let lo = band_offset(b, lm).min(n4);
            let hi = (lo + width).min(n4);

            let shared = channels == 2 && (rel >= allocation.intensity || !allocation.dual_stereo);
            if shared {
                let gain0 = 2f32.powf(energy[0][b]);
                let gain1 = 2f32.powf(energy[1][b]);
                let left: Vec<f32> = freq[0][lo..hi]
                    .iter()
                    .map(|&v| if gain0 > 0.0 { v / gain0 } else { 0.0 })
                    .collect();
                let right: Vec<f32> = freq[1][lo..hi]
                    .iter()
                    .map(|&v| if gain1 > 0.0 { v / gain1 } else { 0.0 })
                    .collect();
                encode_joint_band(encoder, &left, &right, width, k)?;
            } else {
                for ch in 0..channels {
                    let gain = 2f32.powf(energy[ch][b]);
                    let normalized: Vec<f32> = freq[ch][lo..hi]
                        .iter()
                        .map(|&v| if gain > 0.0 { v / gain } else { 0.0 })
                        .collect();
                    let pulses = search(&normalized, width, k);
                    encode_vector(encoder, &pulses, width, k)?;
                }
            }
        }

        self.old_energy = energy;
        Ok(())
    }
}

/// Coarse transient detector: flags a frame whose second half carries
/// much more or much less energy than its first half, a cheap proxy for
/// an attack or decay the short-block MDCT split will represent better
/// than one long transform.
fn detect_transient(input: &[f32], channels: usize) -> bool {
    if channels == 0 || input.len() < 2 * channels {
        return false;
    }
    let half = (input.len() / channels / 2) * channels;
    if half == 0 {
        return false;
    }
    let (first, second) = input.split_at(half);
    let e1: f32 = first.iter().map(|&v| v * v).sum::<f32>().max(1e-9);
    let e2: f32 = second.iter().map(|&v| v * v).sum::<f32>().max(1e-9);
    let ratio = e2 / e1;
    ratio > 4.0 || ratio < 0.25
}

/// Biases the bisection toward low bands (negative) or high bands
/// (positive) from the frame's coarse spectral tilt, clamped to the
/// `TRIM` symbol's representable range.
fn estimate_trim(energy: &[f32; NUM_BANDS], start_band: usize, end_band: usize) -> i32 {
    let count = end_band.saturating_sub(start_band);
    if count < 2 {
        return 0;
    }
    let half = count / 2;
    let low_avg: f32 =
        energy[start_band..start_band + half].iter().sum::<f32>() / half.max(1) as f32;
    let high_avg: f32 = energy[start_band + half..end_band].iter().sum::<f32>()
        / (count - half).max(1) as f32;
    (low_avg - high_avg).round().clamp(-5.0, 5.0) as i32
}

/// Searches a pitch-synchronous comb-filter period via normalized
/// autocorrelation on the (downmixed) input, returning `(period, gain)`
/// only when the periodicity is strong enough to be worth signaling.
fn search_postfilter(input: &[f32], channels: usize, n4: usize) -> Option<(usize, f32)> {
    if channels == 0 || n4 < 64 {
        return None;
    }
    let mono: Vec<f32> = (0..n4)
        .map(|i| {
            let sum: f32 = (0..channels)
                .map(|ch| input.get(i * channels + ch).copied().unwrap_or(0.0))
                .sum();
            sum / channels as f32
        })
        .collect();

    // Matches `comb_filter::COMBFILTER_MINPERIOD`, below which the tap
    // delay line has no history to read.
    let min_period = 15usize;
    let max_period = (n4 / 2).min(1023);
    if max_period <= min_period {
        return None;
    }

    let mut best_period = 0usize;
    let mut best_score = 0.0f32;
    for period in min_period..max_period {
        let mut num = 0.0f32;
        let mut denom = 0.0f32;
        for i in period..n4 {
            num += mono[i] * mono[i - period];
            denom += mono[i - period] * mono[i - period];
        }
        if denom <= 1e-9 {
            continue;
        }
        let score = num * num / denom;
        if score > best_score {
            best_score = score;
            best_period = period;
        }
    }

    let signal_energy: f32 = mono.iter().map(|v| v * v).sum::<f32>().max(1e-9);
    let normalized = best_score / signal_energy;
    if best_period == 0 || normalized < 0.5 {
        return None;
    }
    let gain = normalized.sqrt().min(1.0) * 0.8;
    Some((best_period, gain))
}

/// Writes `period`/`gain` in the octave/remainder/gain-index/tapset
/// layout `celt::decoder::decode` reads.
fn encode_postfilter_params(
    encoder: &mut RangeEncoder,
    period: usize,
    gain: f32,
) -> Result<(), EncoderError> {
    let target = period + 1;
    let mut octave = 5u32;
    for o in 0..6u32 {
        let lo = 16usize << o;
        let hi = 32usize << o;
        if target >= lo && target < hi {
            octave = o;
            break;
        }
    }
    let remainder = target.saturating_sub(16usize << octave) as u32;
    encoder.encode_uint(octave, 6)?;
    encoder.encode_bits(remainder, 4 + octave)?;

    let gain_q = ((gain / 0.09375 - 1.0).round().clamp(0.0, 7.0)) as u32;
    encoder.encode_bits(gain_q, 3)?;
    // Tapset search isn't performed; always signal tapset 0.
    encoder.encode_icdf(0, &[2, 1, 0], 15)
}

fn frame_size_to_lm(frame_size: usize) -> usize {
    match frame_size {
        240 => 1,
        480 => 2,
        960 => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celt::decoder::CeltDecoder;

    #[test]
    fn test_encode_silence_sets_silence_flag() {
        let mut buffer = vec![0u8; 256];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let mut celt = CeltEncoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let input = vec![0.0f32; 120];
        celt.encode(&mut encoder, &input, 120, 0, 32).unwrap();
        encoder.done().unwrap();
        drop(encoder);

        let mut decoder = crate::range_coder::RangeDecoder::new(&buffer);
        let mut celt_dec = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut out = vec![1.0f32; 120];
        celt_dec
            .decode(&mut decoder, &mut out, 120, 0, 32)
            .unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_encode_nonsilent_frame_does_not_panic() {
        let mut buffer = vec![0u8; 1024];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let mut celt = CeltEncoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let input: Vec<f32> = (0..120).map(|i| (i as f32 * 0.1).sin()).collect();
        celt.encode(&mut encoder, &input, 120, 0, 800).unwrap();
        encoder.done().unwrap();
    }

    #[test]
    fn test_encode_transient_frame_round_trips_without_panicking() {
        let mut buffer = vec![0u8; 4096];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let mut celt = CeltEncoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut input = vec![0.0f32; 960];
        for (i, sample) in input.iter_mut().enumerate().skip(480) {
            *sample = (i as f32 * 0.9).sin();
        }
        celt.encode(&mut encoder, &input, 960, 0, 4000).unwrap();
        encoder.done().unwrap();
        drop(encoder);

        let mut decoder = crate::range_coder::RangeDecoder::new(&buffer);
        let mut celt_dec = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut out = vec![0.0f32; 960];
        celt_dec.decode(&mut decoder, &mut out, 960, 0, 4000).unwrap();
    }

    #[test]
    fn test_encode_stereo_frame_round_trips_without_panicking() {
        let mut buffer = vec![0u8; 4096];
        let mut encoder = RangeEncoder::new(&mut buffer);
        let mut celt = CeltEncoder::new(SamplingRate::Hz48000, Channels::Stereo).unwrap();
        let input: Vec<f32> = (0..240)
            .map(|i| if i % 2 == 0 { (i as f32 * 0.1).sin() } else { (i as f32 * 0.11).sin() })
            .collect();
        celt.encode(&mut encoder, &input, 120, 0, 1600).unwrap();
        encoder.done().unwrap();
        drop(encoder);

        let mut decoder = crate::range_coder::RangeDecoder::new(&buffer);
        let mut celt_dec = CeltDecoder::new(SamplingRate::Hz48000, Channels::Stereo).unwrap();
        let mut out = vec![0.0f32; 240];
        celt_dec.decode(&mut decoder, &mut out, 120, 0, 1600).unwrap();
    }
}
