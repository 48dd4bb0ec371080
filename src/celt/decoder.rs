//! Implements the CELT decoder.

use crate::celt::bit_allocation::decode_allocation;
use crate::celt::comb_filter::comb_filter_inplace;
use crate::celt::mdct::{build_window, Mdct};
use crate::celt::pvq::{decode_joint_band, decode_vector, normalize_pulses};
use crate::celt::tables::{band_offset, band_width, gather_block, icdf, E_MEANS, NUM_BANDS};
use crate::range_coder::{RangeDecoder, Tell};
use crate::{Channels, DecoderError, SamplingRate};

const LAPLACE_COARSE_DECAY: u32 = 6554; // ~0.8 in Q15, energy-delta decay.

/// The CELT decoder.
///
/// Tracks per-channel, per-band log-energy state across frames (needed for
/// predictive coarse-energy decoding) and the de-emphasis/post-filter
/// memories that must persist between `decode` calls.
#[derive(Clone, Debug)]
pub(crate) struct CeltDecoder {
    channels: usize,
    sampling_rate: SamplingRate,
    old_energy: Vec<[f32; NUM_BANDS]>,
    deemph_mem: Vec<f32>,
    postfilter_mem: Vec<Vec<f32>>,
    overlap_mem: Vec<Vec<f32>>,
    pitch: u32,
}

impl CeltDecoder {
    /// Creates a new CELT decoder.
    pub(crate) fn new(
        sampling_rate: SamplingRate,
        channels: Channels,
    ) -> Result<Self, DecoderError> {
        let n = channels as usize;
        Ok(Self {
            channels: n,
            sampling_rate,
            old_energy: vec![[0.0; NUM_BANDS]; n],
            deemph_mem: vec![0.0; n],
            postfilter_mem: vec![vec![0.0; 1024]; n],
            overlap_mem: vec![vec![0.0; 960]; n],
            pitch: 0,
        })
    }

    /// Resets the CELT decoder.
    pub(crate) fn reset(&mut self) -> Result<(), DecoderError> {
        for e in &mut self.old_energy {
            *e = [0.0; NUM_BANDS];
        }
        self.deemph_mem.iter_mut().for_each(|v| *v = 0.0);
        for mem in &mut self.postfilter_mem {
            mem.iter_mut().for_each(|v| *v = 0.0);
        }
        for mem in &mut self.overlap_mem {
            mem.iter_mut().for_each(|v| *v = 0.0);
        }
        self.pitch = 0;
        Ok(())
    }

    /// Gets the pitch of the last decoded frame.
    pub(crate) fn pitch(&self) -> u32 {
        self.pitch
    }

    /// Packet-loss concealment: extrapolates from the overlap memory left
    /// by the last good frame, scaled by `attenuation` (spec §4.10's
    /// fade-to-silence over consecutive losses), without consuming any
    /// bits from a range coder.
    pub(crate) fn conceal(&mut self, out: &mut [f32], frame_size: usize, attenuation: f32) {
        let channels = self.channels;
        for ch in 0..channels.min(self.overlap_mem.len()) {
            let overlap = &mut self.overlap_mem[ch];
            for i in 0..frame_size {
                let sample = if overlap.is_empty() {
                    0.0
                } else {
                    overlap[i % overlap.len()] * attenuation
                };
                let idx = i * channels + ch;
                if idx < out.len() {
                    out[idx] = sample;
                }
            }
            overlap.iter_mut().for_each(|v| *v *= attenuation);
        }
    }

    /// Decodes one CELT frame of `frame_size` samples per channel into
    /// interleaved `out`, starting at CELT band `start_band` (17 in hybrid
    /// mode, 0 otherwise).
    pub(crate) fn decode(
        &mut self,
        decoder: &mut RangeDecoder,
        out: &mut [f32],
        frame_size: usize,
        start_band: usize,
        frame_bits: u32,
    ) -> Result<(), DecoderError> {
        let channels = self.channels;
        let lm = frame_size_to_lm(frame_size)?;
        let end_band = NUM_BANDS;
        let n4 = frame_size;

        let silence = decoder.decode_icdf(&[1, 0], 15) == 0;

        let mut post_filter_gain = 0.0f32;
        let mut post_filter_period = 0usize;
        let mut post_filter_tapset = 0usize;
        if start_band == 0 && decoder.decode_icdf(&[1, 0], 15) != 0 {
            let octave = decoder.decode_uint(6);
            let period = (16usize << octave) + decoder.decode_bits(4 + octave as u32) as usize - 1;
            let gain_q = decoder.decode_bits(3);
            post_filter_gain = 0.09375 * (gain_q as f32 + 1.0);
            post_filter_period = period.max(15);
            post_filter_tapset = if decoder.decode_icdf(&[2, 1, 0], 15) != 0 {
                2
            } else {
                0
            };
        }

        // Transient frames split the MDCT into `nb = 2^lm` short blocks of
        // fixed 2.5 ms length for better time resolution on attacks; a
        // non-transient frame is the `nb == 1` case of the same layout.
        let is_transient = if lm > 0 {
            decoder.decode_icdf(icdf::TRANSIENT, 3) != 0
        } else {
            false
        };
        let nb = if is_transient { 1usize << lm } else { 1 };
        let sub_len = n4 / nb.max(1);

        let intra = decoder.decode_icdf(icdf::INTRA, 3) != 0;

        // Coarse per-band energy: Laplace-coded delta from the predictor
        // (previous frame's reconstructed energy, or the band mean on an
        // intra frame).
        let mut energy = vec![[0.0f32; NUM_BANDS]; channels];
        for ch in 0..channels {
            for b in 0..end_band {
                let predictor = if intra {
                    E_MEANS[b]
                } else {
                    self.old_energy[ch][b]
                };
                let delta = decoder.decode_laplace(6000, LAPLACE_COARSE_DECAY);
                energy[ch][b] = predictor + delta as f32 * 0.0625;
            }
        }

        if silence {
            out.iter_mut().for_each(|v| *v = 0.0);
            for ch in 0..channels {
                self.old_energy[ch] = [-28.0; NUM_BANDS];
            }
            return Ok(());
        }

        // Bit allocation: spend whatever's left in the frame.
        let remaining_bits = (frame_bits as i32 - decoder.tell_frac() as i32).max(0);
        let allocation = decode_allocation(decoder, remaining_bits, start_band, end_band, channels, lm);

        let mdct = Mdct::new(sub_len);
        let window = build_window(sub_len / 2);

        let mut freq = vec![vec![0.0f32; n4]; channels];
        for b in start_band..end_band {
            let width = band_width(b, lm);
            let rel = b - start_band;
            let k = allocation.pulses[rel];
            let lo = band_offset(b, lm).min(n4);
            let hi = (lo + width).min(n4);

            let shared = channels == 2 && (rel >= allocation.intensity || !allocation.dual_stereo);
            if shared {
                let (left, right) = decode_joint_band(decoder, width, k);
                let shapes = [left, right];
                for (ch, shape) in shapes.iter().enumerate().take(channels) {
                    let gain = 2f32.powf(energy[ch][b]);
                    for (i, &s) in shape.iter().enumerate() {
                        if lo + i < hi {
                            freq[ch][lo + i] = s * gain;
                        }
                    }
                }
            } else {
                for ch in 0..channels {
                    let pulses = decode_vector(decoder, width, k);
                    let mut shape = vec![0.0f32; width];
                    normalize_pulses(&pulses, &mut shape);
                    let gain = 2f32.powf(energy[ch][b]);
                    for (i, &s) in shape.iter().enumerate() {
                        if lo + i < hi {
                            freq[ch][lo + i] = s * gain;
                        }
                    }
                }
            }
        }

        for ch in 0..channels {
            let mut accum = vec![0.0f32; n4 + sub_len];
            for blk in 0..nb {
                let mut blk_freq = vec![0.0f32; sub_len];
                gather_block(&freq[ch], blk, lm, &mut blk_freq);
                let mut blk_time = vec![0.0f32; 2 * sub_len];
                mdct.inverse(&blk_freq, &mut blk_time, &window);
                for (i, &v) in blk_time.iter().enumerate() {
                    accum[blk * sub_len + i] += v;
                }
            }

            let overlap = &mut self.overlap_mem[ch];
            if overlap.len() < sub_len {
                overlap.resize(sub_len, 0.0);
            }
            for i in 0..n4 {
                let sample = accum[i] + if i < sub_len { overlap[i] } else { 0.0 };
                let idx = i * channels + ch;
                if idx < out.len() {
                    out[idx] = sample;
                }
            }
            overlap[..sub_len].copy_from_slice(&accum[n4..n4 + sub_len]);

            if post_filter_gain > 0.0 {
                let mem = &mut self.postfilter_mem[ch];
                if mem.len() < n4 + post_filter_period + 4 {
                    mem.resize(n4 + post_filter_period + 4, 0.0);
                }
                comb_filter_inplace(
                    mem,
                    post_filter_period + 4,
                    post_filter_period,
                    post_filter_period,
                    n4,
                    post_filter_gain,
                    post_filter_gain,
                    post_filter_tapset,
                    post_filter_tapset,
                    0,
                );
            }

            // De-emphasis: first-order leaky integrator, coefficient 0.85.
            let mut mem = self.deemph_mem[ch];
            for i in 0..n4 {
                let idx = i * channels + ch;
                if idx < out.len() {
                    let sample = out[idx] + 0.85 * mem;
                    out[idx] = sample;
                    mem = sample;
                }
            }
            self.deemph_mem[ch] = mem;
        }

        self.old_energy = energy;
        self.pitch = post_filter_period as u32;

        Ok(())
    }
}

fn frame_size_to_lm(frame_size: usize) -> Result<usize, DecoderError> {
    match frame_size {
        120 => Ok(0),
        240 => Ok(1),
        480 => Ok(2),
        960 => Ok(3),
        _ => Err(DecoderError::InvalidFrameCount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_to_lm() {
        assert_eq!(frame_size_to_lm(120).unwrap(), 0);
        assert_eq!(frame_size_to_lm(960).unwrap(), 3);
        assert!(frame_size_to_lm(7).is_err());
    }

    #[test]
    fn test_decoder_silence_flag_zeros_output() {
        // An all-zero packet decodes the silence flag true (icdf picks 0
        // on an immediately-exhausted range) and must zero the output
        // rather than leaving it untouched.
        let packet = [0u8; 4];
        let mut decoder = RangeDecoder::new(&packet);
        let mut celt = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut out = vec![1.0f32; 120];
        celt.decode(&mut decoder, &mut out, 120, 0, 32).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_conceal_attenuates_toward_silence() {
        let mut celt = CeltDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        celt.overlap_mem[0].iter_mut().for_each(|v| *v = 1.0);
        let mut out = vec![0.0f32; 16];
        celt.conceal(&mut out, 16, 0.5);
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }
}
