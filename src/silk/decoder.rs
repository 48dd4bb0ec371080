//! Implements the Silk decoder.

use crate::fec;
use crate::range_coder::RangeDecoder;
use crate::silk::excitation::decode_excitation;
use crate::silk::lsf::{decode_lsf, interpolate, lsf_to_lpc};
use crate::silk::ltp::{apply_ltp, decode_pitch};
use crate::silk::resampler::Resampler;
use crate::silk::tables::{icdf, LSF_ORDER_NB, LSF_ORDER_WB};
use crate::{Channels, DecoderError, SamplingRate};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum LostFlag {
    /// No packet loss.
    NoLoss,
    /// Packet loss.
    Loss,
    /// Forward correction.
    DecodeFec,
}

/// Per-channel decoder state that must persist across frames.
#[derive(Clone, Debug)]
struct ChannelState {
    previous_lsf: Vec<f32>,
    lpc_history: Vec<f32>,
    pitch_history: Vec<f32>,
    resampler: Resampler,
}

impl ChannelState {
    fn new(order: usize, internal_rate: SamplingRate, output_rate: SamplingRate) -> Self {
        Self {
            previous_lsf: vec![0.0; order],
            lpc_history: vec![0.0; order.max(16)],
            pitch_history: vec![0.0; 1024],
            resampler: Resampler::new(internal_rate, output_rate),
        }
    }

    fn reset(&mut self) {
        self.previous_lsf.iter_mut().for_each(|v| *v = 0.0);
        self.lpc_history.iter_mut().for_each(|v| *v = 0.0);
        self.pitch_history.iter_mut().for_each(|v| *v = 0.0);
        self.resampler.reset();
    }
}

/// The Silk decoder.
#[derive(Clone, Debug)]
pub(crate) struct SilkDecoder {
    sampling_rate: SamplingRate,
    channels: Channels,
    internal_sampling_rate: SamplingRate,
    internal_channels: Channels,
    payload_size_ms: usize,
    channel_state: Vec<ChannelState>,
    pitch: u32,
}

fn lsf_order_for(internal_rate: SamplingRate) -> usize {
    match internal_rate {
        SamplingRate::Hz16000 | SamplingRate::Hz24000 | SamplingRate::Hz48000 => LSF_ORDER_WB,
        _ => LSF_ORDER_NB,
    }
}

impl SilkDecoder {
    /// Creates a new Silk decoder. Configures the output sampling rate and output channels.
    pub(crate) fn new(
        sampling_rate: SamplingRate,
        channels: Channels,
    ) -> Result<Self, DecoderError> {
        let internal_sampling_rate = SamplingRate::Hz16000;
        let order = lsf_order_for(internal_sampling_rate);
        let channel_state = (0..channels as usize)
            .map(|_| ChannelState::new(order, internal_sampling_rate, sampling_rate))
            .collect();

        Ok(Self {
            sampling_rate,
            channels,
            internal_sampling_rate,
            internal_channels: channels,
            payload_size_ms: 20,
            channel_state,
            pitch: 0,
        })
    }

    /// Resets the Silk decoder.
    pub(crate) fn reset(&mut self) -> Result<(), DecoderError> {
        for state in &mut self.channel_state {
            state.reset();
        }
        self.pitch = 0;
        Ok(())
    }

    /// Gets the pitch of the last decoded frame.
    pub(crate) fn pitch(&self) -> u32 {
        self.pitch
    }

    /// Sets the internal channels.
    pub(crate) fn internal_channels(&mut self, internal_channels: Channels) {
        self.internal_channels = internal_channels;
    }

    /// Sets the internal channels.
    pub(crate) fn set_internal_channels(&mut self, internal_channels: Channels) {
        self.internal_channels = internal_channels;
    }

    /// Sets the sampling rate.
    pub(crate) fn set_internal_sampling_rate(&mut self, sampling_rate: SamplingRate) {
        self.internal_sampling_rate = sampling_rate;
        let order = lsf_order_for(sampling_rate);
        for state in &mut self.channel_state {
            *state = ChannelState::new(order, sampling_rate, self.sampling_rate);
        }
    }

    /// Sets the payload size in ms.
    pub(crate) fn set_payload_size_ms(&mut self, payload_size_ms: usize) {
        self.payload_size_ms = payload_size_ms;
    }

    /// Decodes one SILK frame, interleaved into `samples` at the decoder's
    /// configured output sampling rate and channel count.
    ///
    /// `dec` is `None` to request packet-loss concealment rather than a
    /// real decode (the PLC path drives `ChannelState` the same way a real
    /// decode would, so the next real frame stays continuous).
    ///
    /// Every real frame carries an LBRR flag (spec §4.10) ahead of its own
    /// data; this always reads and, if set, decodes-and-discards that
    /// redundant copy of the *previous* frame through a disposable clone
    /// of the channel state, so the real frame that follows stays at the
    /// right bit position regardless of whether the caller wants the
    /// redundancy. Callers that specifically want to recover a lost frame
    /// from redundancy should use [`SilkDecoder::decode_fec`] instead.
    pub(crate) fn decode(
        &mut self,
        dec: Option<&mut RangeDecoder>,
        samples: &mut [f32],
        frame_size: &mut usize,
        lost_flag: LostFlag,
        _first_frame: bool,
    ) -> Result<(), DecoderError> {
        let channels = self.channels as usize;

        if lost_flag != LostFlag::NoLoss || dec.is_none() {
            return self.conceal(samples, *frame_size, channels);
        }
        let decoder = dec.expect("checked above");

        if fec::decode_lbrr_flag(decoder) {
            let mut shadow = self.clone();
            let mut discard = vec![0.0f32; *frame_size];
            let mut discard_size = *frame_size;
            shadow.decode_frame(decoder, &mut discard, &mut discard_size)?;
        }

        self.decode_frame(decoder, samples, frame_size)
    }

    /// Attempts to recover a lost frame from the LBRR redundancy embedded
    /// in a *subsequent* packet's range decoder. Returns `Ok(true)` and
    /// fills `samples` if redundancy was present, `Ok(false)` (leaving
    /// `samples` untouched) if this packet carries none, in which case
    /// the caller should fall back to ordinary concealment.
    pub(crate) fn decode_fec(
        &mut self,
        decoder: &mut RangeDecoder,
        samples: &mut [f32],
        frame_size: &mut usize,
    ) -> Result<bool, DecoderError> {
        if !fec::decode_lbrr_flag(decoder) {
            return Ok(false);
        }
        self.decode_frame(decoder, samples, frame_size)?;
        Ok(true)
    }

    /// The actual SILK frame decode, shared by real frames, the disposable
    /// LBRR discard pass in [`SilkDecoder::decode`], and the recovery path
    /// in [`SilkDecoder::decode_fec`].
    fn decode_frame(
        &mut self,
        decoder: &mut RangeDecoder,
        samples: &mut [f32],
        frame_size: &mut usize,
    ) -> Result<(), DecoderError> {
        let channels = self.channels as usize;
        let internal_samples = self.internal_sampling_rate as usize * self.payload_size_ms / 1000;

        let order = lsf_order_for(self.internal_sampling_rate);
        let subframe_count = if self.payload_size_ms >= 20 { 4 } else { 2 };
        let subframe_len = internal_samples / subframe_count.max(1);

        let frame_type = decoder.decode_icdf(&icdf::FRAME_TYPE, 8);
        let voiced = frame_type >= 2;
        let high_offset = frame_type == 3;

        let pitch_info = if voiced {
            Some(decode_pitch(decoder, subframe_count))
        } else {
            None
        };

        let lsf = decode_lsf(decoder, order);
        let interp_factor = if subframe_count == 4 {
            decoder.decode_icdf(&icdf::LSF_INTERP, 8)
        } else {
            4
        };

        let mut internal_out = vec![0.0f32; internal_samples];
        for ch in 0..channels.min(self.channel_state.len()) {
            let state = &mut self.channel_state[ch];
            let effective_lsf = interpolate(&state.previous_lsf, &lsf, interp_factor);
            let lpc = lsf_to_lpc(&effective_lsf);

            for sf in 0..subframe_count {
                let gain_index = if sf == 0 {
                    decoder.decode_icdf(&icdf::GAIN_MSB, 8)
                } else {
                    decoder.decode_icdf(&icdf::GAIN_DELTA, 8)
                };
                let gain = gain_q16_to_linear(gain_index);

                let mut excitation = decode_excitation(decoder, subframe_len, high_offset);
                if let Some(pitch) = &pitch_info {
                    let lag = pitch.lags.get(sf).copied().unwrap_or(32);
                    let taps = pitch.taps.get(sf).copied().unwrap_or([0; 5]);
                    apply_ltp(&mut excitation, &state.pitch_history, lag, &taps);
                }

                let synthesized = synthesize(&lpc, &excitation, &mut state.lpc_history, gain);

                let start = sf * subframe_len;
                internal_out[start..start + subframe_len].copy_from_slice(&synthesized);

                state.pitch_history.extend_from_slice(&synthesized);
                let keep = state.pitch_history.len().saturating_sub(1024);
                state.pitch_history.drain(0..keep);
            }

            state.previous_lsf = lsf.clone();

            let out_len = *frame_size;
            let mut resampled = vec![0.0f32; out_len];
            state.resampler.process(&internal_out, &mut resampled);
            for (i, &s) in resampled.iter().enumerate() {
                let idx = i * channels + ch;
                if idx < samples.len() {
                    samples[idx] = s;
                }
            }
        }

        if let Some(pitch) = &pitch_info {
            self.pitch = *pitch.lags.last().unwrap_or(&0) as u32;
        }

        Ok(())
    }

    /// Packet-loss concealment: attenuating repetition of the last known
    /// pitch-periodic history (spec §4.10's "continue, then fade" rule).
    /// Kept in this module because it shares `ChannelState` directly;
    /// `plc.rs` calls through to it rather than duplicating the state.
    pub(crate) fn conceal(
        &mut self,
        samples: &mut [f32],
        frame_size: usize,
        channels: usize,
    ) -> Result<(), DecoderError> {
        for ch in 0..channels.min(self.channel_state.len()) {
            let state = &mut self.channel_state[ch];
            let history_len = state.pitch_history.len();
            for i in 0..frame_size {
                let value = if history_len > 0 {
                    state.pitch_history[(history_len - 1 + i) % history_len] * 0.4
                } else {
                    0.0
                };
                let idx = i * channels + ch;
                if idx < samples.len() {
                    samples[idx] = value;
                }
            }
        }
        Ok(())
    }
}

/// Converts a 6-bit gain index into a linear multiplier (SILK codes gains
/// as log-domain steps; this mirrors the shape of the real mapping
/// without claiming Q16-exact reproduction of the libopus table).
fn gain_q16_to_linear(gain_index: u32) -> f32 {
    let db = -64.0 + gain_index as f32 * 3.0;
    10f32.powf(db / 20.0)
}

/// Runs the excitation through the Q12-equivalent LPC synthesis filter
/// (direct-form IIR), carrying `history` across calls as filter memory.
fn synthesize(lpc: &[f32], excitation: &[f32], history: &mut Vec<f32>, gain: f32) -> Vec<f32> {
    let order = lpc.len();
    if history.len() < order {
        history.resize(order, 0.0);
    }

    let mut out = Vec::with_capacity(excitation.len());
    for &e in excitation {
        let mut prediction = 0.0f32;
        for (k, &coeff) in lpc.iter().enumerate() {
            prediction += coeff * history[history.len() - 1 - k];
        }
        let sample = (e * gain + prediction).clamp(-4.0, 4.0);
        history.push(sample);
        out.push(sample);
    }
    let keep = history.len().saturating_sub(order);
    history.drain(0..keep);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_decoder_has_one_channel_state_per_channel() {
        let decoder = SilkDecoder::new(SamplingRate::Hz48000, Channels::Stereo).unwrap();
        assert_eq!(decoder.channel_state.len(), 2);
    }

    #[test]
    fn test_conceal_with_empty_history_produces_silence() {
        let mut decoder = SilkDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut samples = vec![1.0f32; 10];
        decoder.conceal(&mut samples, 10, 1).unwrap();
        assert!(samples.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_decode_with_lost_flag_uses_concealment() {
        let mut decoder = SilkDecoder::new(SamplingRate::Hz48000, Channels::Mono).unwrap();
        let mut samples = vec![1.0f32; 480];
        let mut frame_size = 480;
        decoder
            .decode(
                None,
                &mut samples,
                &mut frame_size,
                LostFlag::Loss,
                true,
            )
            .unwrap();
        assert!(samples.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_gain_mapping_is_monotonic() {
        let low = gain_q16_to_linear(0);
        let high = gain_q16_to_linear(31);
        assert!(high > low);
    }
}
