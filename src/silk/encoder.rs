//! Implements the Silk encoder.

use crate::encoder_error::EncoderError;
use crate::fec;
use crate::range_coder::RangeEncoder;
use crate::silk::excitation::encode_excitation;
use crate::silk::ltp::{encode_pitch, remove_ltp, search_lag};
use crate::silk::lsf::{encode_lsf, interpolate, lpc_to_lsf, lsf_to_lpc};
use crate::silk::resampler::Resampler;
use crate::silk::tables::{icdf, LSF_ORDER_NB, LSF_ORDER_WB};
use crate::{Channels, SamplingRate};

/// Below this normalized-correlation confidence, a frame is coded
/// unvoiced rather than spending bits on pitch lag/contour/taps.
const VOICING_THRESHOLD: f32 = 0.35;
/// Below this average sample energy, a frame is coded as inactive
/// (frame type 0) regardless of voicing.
const SILENCE_ENERGY_FLOOR: f32 = 1e-6;

/// Largest per-channel sample count `encode_frame` ever needs to hold,
/// either at the caller's input rate or SILK's internal rate: the widest
/// SILK frame (60 ms) at the highest rate either side can run at (48 kHz).
/// Bounds the resample scratch sized once at construction (spec §5's
/// zero-allocation hot path) rather than reallocated per call.
const MAX_FRAME_SAMPLES: usize = 48_000 * 60 / 1000;

/// Per-channel encoder state that must persist across frames.
#[derive(Clone, Debug)]
struct ChannelState {
    previous_lsf: Vec<f32>,
    lpc_history: Vec<f32>,
    pitch_history: Vec<f32>,
    resampler: Resampler,
}

impl ChannelState {
    fn new(order: usize, input_rate: SamplingRate, internal_rate: SamplingRate) -> Self {
        Self {
            previous_lsf: vec![0.0; order],
            lpc_history: vec![0.0; order.max(16)],
            pitch_history: vec![0.0; 1024],
            resampler: Resampler::new(input_rate, internal_rate),
        }
    }

    fn reset(&mut self) {
        self.previous_lsf.iter_mut().for_each(|v| *v = 0.0);
        self.lpc_history.iter_mut().for_each(|v| *v = 0.0);
        self.pitch_history.iter_mut().for_each(|v| *v = 0.0);
        self.resampler.reset();
    }
}

/// The Silk encoder.
#[derive(Clone, Debug)]
pub(crate) struct SilkEncoder {
    sampling_rate: SamplingRate,
    channels: Channels,
    internal_sampling_rate: SamplingRate,
    internal_channels: Channels,
    payload_size_ms: usize,
    channel_state: Vec<ChannelState>,
    /// Reused every `encode_frame` call instead of allocating: one
    /// channel's input-rate samples, deinterleaved from `input`.
    deinterleave_scratch: Vec<f32>,
    /// Reused every `encode_frame` call: each channel's resampled,
    /// internal-rate signal, indexed the same as `channel_state`.
    channel_signal_scratch: Vec<Vec<f32>>,
}

fn lsf_order_for(internal_rate: SamplingRate) -> usize {
    match internal_rate {
        SamplingRate::Hz16000 | SamplingRate::Hz24000 | SamplingRate::Hz48000 => LSF_ORDER_WB,
        _ => LSF_ORDER_NB,
    }
}

impl SilkEncoder {
    /// Creates a new Silk encoder. `sampling_rate`/`channels` describe the
    /// input PCM the caller will pass to `encode`.
    pub(crate) fn new(
        sampling_rate: SamplingRate,
        channels: Channels,
    ) -> Result<Self, EncoderError> {
        let internal_sampling_rate = SamplingRate::Hz16000;
        let order = lsf_order_for(internal_sampling_rate);
        let channel_state = (0..channels as usize)
            .map(|_| ChannelState::new(order, sampling_rate, internal_sampling_rate))
            .collect();
        let channel_signal_scratch = (0..channels as usize).map(|_| vec![0.0f32; MAX_FRAME_SAMPLES]).collect();

        Ok(Self {
            sampling_rate,
            channels,
            internal_sampling_rate,
            internal_channels: channels,
            payload_size_ms: 20,
            channel_state,
            deinterleave_scratch: vec![0.0f32; MAX_FRAME_SAMPLES],
            channel_signal_scratch,
        })
    }

    /// Resets the Silk encoder.
    pub(crate) fn reset(&mut self) -> Result<(), EncoderError> {
        for state in &mut self.channel_state {
            state.reset();
        }
        Ok(())
    }

    /// Sets the internal channels.
    pub(crate) fn set_internal_channels(&mut self, internal_channels: Channels) {
        self.internal_channels = internal_channels;
    }

    /// Sets the internal sampling rate.
    pub(crate) fn set_internal_sampling_rate(&mut self, sampling_rate: SamplingRate) {
        self.internal_sampling_rate = sampling_rate;
        let order = lsf_order_for(sampling_rate);
        for state in &mut self.channel_state {
            *state = ChannelState::new(order, self.sampling_rate, sampling_rate);
        }
    }

    /// Sets the payload size in ms.
    pub(crate) fn set_payload_size_ms(&mut self, payload_size_ms: usize) {
        self.payload_size_ms = payload_size_ms;
    }

    /// Encodes one frame of `frame_size` samples per channel, interleaved
    /// in `input` at the encoder's configured input sampling rate, into
    /// `encoder`.
    ///
    /// `redundancy_pcm`, if present, is the *previous* frame's PCM (same
    /// layout as `input`): it is re-encoded through a disposable clone of
    /// this encoder's channel state and embedded ahead of the real frame
    /// as LBRR (spec §4.10), so a decoder that lost the previous packet
    /// can still recover it from this one. The LBRR flag is written
    /// unconditionally so the decoder's bit position stays in sync
    /// whether or not redundancy is present.
    pub(crate) fn encode(
        &mut self,
        encoder: &mut RangeEncoder,
        input: &[f32],
        frame_size: usize,
        redundancy_pcm: Option<&[f32]>,
    ) -> Result<(), EncoderError> {
        fec::encode_lbrr_flag(encoder, redundancy_pcm.is_some())?;
        if let Some(prev) = redundancy_pcm {
            let mut shadow = self.clone();
            shadow.encode_frame(encoder, prev, frame_size)?;
        }
        self.encode_frame(encoder, input, frame_size)
    }

    /// The actual SILK frame encode, shared by real frames and the
    /// disposable LBRR redundancy pass in [`SilkEncoder::encode`].
    fn encode_frame(
        &mut self,
        encoder: &mut RangeEncoder,
        input: &[f32],
        frame_size: usize,
    ) -> Result<(), EncoderError> {
        let channels = self.channels as usize;
        let internal_samples = self.internal_sampling_rate as usize * self.payload_size_ms / 1000;
        let order = lsf_order_for(self.internal_sampling_rate);
        let subframe_count = if self.payload_size_ms >= 20 { 4 } else { 2 };
        let subframe_len = internal_samples / subframe_count.max(1);
        let active_channels = channels.min(self.channel_state.len());

        if frame_size > MAX_FRAME_SAMPLES || internal_samples > MAX_FRAME_SAMPLES {
            return Err(EncoderError::InvalidFrameSize);
        }

        // Resample every channel to the internal rate up front, into
        // instance-owned scratch reused across calls rather than
        // allocated per frame (spec §5's zero-allocation hot path); the
        // frame-type/pitch/LSF decisions below are shared across channels
        // (as the decoder also assumes), but each channel's own samples
        // still drive its own excitation.
        {
            let deinterleave_scratch = &mut self.deinterleave_scratch;
            let channel_signal_scratch = &mut self.channel_signal_scratch;
            let channel_state = &mut self.channel_state;
            for ch in 0..active_channels {
                let deinterleaved = &mut deinterleave_scratch[..frame_size];
                for (i, slot) in deinterleaved.iter_mut().enumerate() {
                    let idx = i * channels + ch;
                    *slot = if idx < input.len() { input[idx] } else { 0.0 };
                }
                let resampled = &mut channel_signal_scratch[ch][..internal_samples];
                channel_state[ch].resampler.process(deinterleaved, resampled);
            }
        }

        let internal_signal: &[f32] = self
            .channel_signal_scratch
            .first()
            .map(|v| &v[..internal_samples])
            .unwrap_or(&[]);

        let energy: f32 =
            internal_signal.iter().map(|&s| s * s).sum::<f32>() / internal_signal.len().max(1) as f32;
        let is_silent = energy < SILENCE_ENERGY_FLOOR;

        let (base_lag, confidence) = search_lag(
            self.channel_state.first().map(|s| s.pitch_history.as_slice()).unwrap_or(&[]),
            internal_signal,
        );
        let voiced = !is_silent && confidence > VOICING_THRESHOLD;

        let frame_type = if is_silent {
            0u32
        } else if voiced {
            3u32
        } else {
            1u32
        };
        let high_offset = frame_type == 3;
        encoder.encode_icdf(frame_type as usize, &icdf::FRAME_TYPE, 8)?;

        let pitch_info = if voiced {
            Some(encode_pitch(encoder, base_lag, subframe_count)?)
        } else {
            None
        };

        let lpc = burg_lpc(&internal_signal, order);
        let target_lsf = lpc_to_lsf(&lpc);
        let quantized_lsf = encode_lsf(encoder, &target_lsf, order)?;

        if subframe_count == 4 {
            // No interpolation: matches the decoder's default when this
            // flag isn't read (10ms frames) and keeps the analysis filter
            // aligned with the just-quantized LSF for the whole frame.
            encoder.encode_icdf(4, &icdf::LSF_INTERP, 8)?;
        }

        for ch in 0..channels.min(self.channel_state.len()) {
            let channel_signal = &self.channel_signal_scratch[ch][..internal_samples];
            let state = &mut self.channel_state[ch];
            let effective_lsf = interpolate(&state.previous_lsf, &quantized_lsf, 4);
            let reconstructed_lpc = lsf_to_lpc(&effective_lsf);

            for sf in 0..subframe_count {
                let start = sf * subframe_len;
                let end = (start + subframe_len).min(channel_signal.len());
                let target = &channel_signal[start..end];

                let subframe_energy: f32 =
                    target.iter().map(|&s| s * s).sum::<f32>() / target.len().max(1) as f32;
                let gain = subframe_energy.sqrt().max(1e-4);
                let max_index = if sf == 0 { 7 } else { 40 };
                let table: &[u8] = if sf == 0 {
                    &icdf::GAIN_MSB
                } else {
                    &icdf::GAIN_DELTA
                };
                let gain_index = linear_to_gain_index(gain, max_index);
                encoder.encode_icdf(gain_index as usize, table, 8)?;
                let quantized_gain = gain_index_to_linear(gain_index);

                let mut residual = analyze(&reconstructed_lpc, target, &mut state.lpc_history, quantized_gain);
                if let Some(pitch) = &pitch_info {
                    let lag = pitch.lags.get(sf).copied().unwrap_or(32);
                    let taps = pitch.taps.get(sf).copied().unwrap_or([0; 5]);
                    remove_ltp(&mut residual, &state.pitch_history, lag, &taps);
                }

                encode_excitation(encoder, &residual, high_offset)?;

                state.pitch_history.extend_from_slice(target);
                let keep = state.pitch_history.len().saturating_sub(1024);
                state.pitch_history.drain(0..keep);
            }

            state.previous_lsf = quantized_lsf.clone();
        }

        Ok(())
    }
}

/// Converts a target linear gain into the nearest representable index
/// for a subframe's gain table, the encoder-side inverse of
/// `gain_index_to_linear` (and of `silk::decoder`'s `gain_q16_to_linear`,
/// which uses the identical mapping).
fn linear_to_gain_index(gain: f32, max_index: u32) -> u32 {
    let db = 20.0 * gain.max(1e-6).log10();
    let index = ((db + 64.0) / 3.0).round();
    index.clamp(0.0, max_index as f32) as u32
}

fn gain_index_to_linear(gain_index: u32) -> f32 {
    let db = -64.0 + gain_index as f32 * 3.0;
    10f32.powf(db / 20.0)
}

/// Fits an order-`order` linear predictor to `signal` via Burg's method
/// (lattice recursion, converted directly to direct-form coefficients),
/// avoiding the windowing bias of autocorrelation-based LPC.
fn burg_lpc(signal: &[f32], order: usize) -> Vec<f32> {
    let n = signal.len();
    if order == 0 || n <= order + 1 {
        return vec![0.0; order];
    }

    let mut ef: Vec<f64> = signal.iter().map(|&s| s as f64).collect();
    let mut eb = ef.clone();
    let mut a = vec![0.0f64; order];

    for k in 0..order {
        let mut num = 0.0f64;
        let mut den = 0.0f64;
        for i in (k + 1)..n {
            num += ef[i] * eb[i - 1];
            den += ef[i] * ef[i] + eb[i - 1] * eb[i - 1];
        }
        let reflection = if den.abs() > 1e-12 { 2.0 * num / den } else { 0.0 };

        let prev_a = a.clone();
        a[k] = reflection;
        for i in 0..k {
            a[i] = prev_a[i] - reflection * prev_a[k - 1 - i];
        }

        for i in (k + 1..n).rev() {
            let new_ef = ef[i] - reflection * eb[i - 1];
            let new_eb = eb[i - 1] - reflection * ef[i];
            ef[i] = new_ef;
            eb[i - 1] = new_eb;
        }
    }

    a.iter().map(|&c| c as f32).collect()
}

/// Runs `target` through the analysis (inverse synthesis) filter: the
/// encoder-side mirror of `silk::decoder`'s `synthesize`, producing the
/// normalized excitation that would reproduce `target` given `lpc` and
/// `gain`, and advancing `history` the same way the decoder's filter
/// memory advances.
fn analyze(lpc: &[f32], target: &[f32], history: &mut Vec<f32>, gain: f32) -> Vec<f32> {
    let order = lpc.len();
    if history.len() < order {
        history.resize(order, 0.0);
    }

    let mut residual = Vec::with_capacity(target.len());
    for &sample in target {
        let mut prediction = 0.0f32;
        for (k, &coeff) in lpc.iter().enumerate() {
            prediction += coeff * history[history.len() - 1 - k];
        }
        let e = if gain.abs() > 1e-6 {
            (sample - prediction) / gain
        } else {
            0.0
        };
        residual.push(e);
        history.push(sample.clamp(-4.0, 4.0));
    }
    let keep = history.len().saturating_sub(order);
    history.drain(0..keep);
    residual
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_encoder_has_one_channel_state_per_channel() {
        let encoder = SilkEncoder::new(SamplingRate::Hz48000, Channels::Stereo).unwrap();
        assert_eq!(encoder.channel_state.len(), 2);
    }

    #[test]
    fn test_burg_lpc_fits_a_simple_ar_process() {
        // x[n] = 0.5 * x[n-1] + small noise-free impulse response.
        let mut signal = vec![0.0f32; 256];
        signal[0] = 1.0;
        for i in 1..signal.len() {
            signal[i] = 0.5 * signal[i - 1];
        }
        let lpc = burg_lpc(&signal, 2);
        assert!((lpc[0] - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_gain_index_round_trips_approximately() {
        let gain = 0.25f32;
        let index = linear_to_gain_index(gain, 40);
        let back = gain_index_to_linear(index);
        assert!((back - gain).abs() / gain < 0.2);
    }

    #[test]
    fn test_encode_silent_frame_does_not_panic() {
        let mut encoder = SilkEncoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut buffer = vec![0u8; 512];
        let mut range_encoder = RangeEncoder::new(&mut buffer);
        let input = vec![0.0f32; 960];
        encoder.encode(&mut range_encoder, &input, 960, None).unwrap();
    }

    #[test]
    fn test_encode_tone_then_decode_produces_expected_length() {
        use crate::range_coder::RangeDecoder;
        use crate::silk::decoder::{LostFlag, SilkDecoder};

        let mut encoder = SilkEncoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut buffer = vec![0u8; 4096];
        let mut range_encoder = RangeEncoder::new(&mut buffer);
        let input: Vec<f32> = (0..960)
            .map(|i| (i as f32 * 0.1).sin() * 0.5)
            .collect();
        encoder.encode(&mut range_encoder, &input, 960, None).unwrap();
        range_encoder.done().unwrap();
        drop(range_encoder);

        let mut decoder = SilkDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut range_decoder = RangeDecoder::new(&buffer);
        let mut samples = vec![0.0f32; 960];
        let mut frame_size = 960;
        decoder
            .decode(
                Some(&mut range_decoder),
                &mut samples,
                &mut frame_size,
                LostFlag::NoLoss,
                true,
            )
            .unwrap();
        assert_eq!(samples.len(), 960);
        assert!(samples.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_encode_with_redundancy_lets_decoder_recover_via_fec() {
        use crate::range_coder::RangeDecoder;
        use crate::silk::decoder::SilkDecoder;

        let mut encoder = SilkEncoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let previous: Vec<f32> = (0..960).map(|i| (i as f32 * 0.07).sin() * 0.4).collect();
        let current: Vec<f32> = (0..960).map(|i| (i as f32 * 0.11).sin() * 0.4).collect();

        let mut buffer = vec![0u8; 8192];
        let mut range_encoder = RangeEncoder::new(&mut buffer);
        encoder
            .encode(&mut range_encoder, &current, 960, Some(&previous))
            .unwrap();
        range_encoder.done().unwrap();
        drop(range_encoder);

        let mut decoder = SilkDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut range_decoder = RangeDecoder::new(&buffer);
        let mut recovered = vec![0.0f32; 960];
        let mut frame_size = 960;
        let found = decoder
            .decode_fec(&mut range_decoder, &mut recovered, &mut frame_size)
            .unwrap();
        assert!(found);
        assert!(recovered.iter().all(|v| v.is_finite()));
    }
}
