//! Implement the Opus encoder.

use crate::celt::CeltEncoder;
use crate::dtx::VoiceActivityDetector;
use crate::fec::FecState;
use crate::plc::PlcState;
use crate::range_coder::RangeEncoder;
use crate::silk::SilkEncoder;
use crate::toc::configuration_to_index;
use crate::{Bandwidth, Channels, CodecMode, EncoderError, SamplingRate, Toc};

/// Encoding application, matching the three libopus application profiles:
/// each biases which codec mode [`Encoder::encode`] picks for a given
/// bandwidth.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Application {
    /// Tuned for voice over IP: favors SILK / Hybrid at lower bandwidths.
    Voip,
    /// Tuned for music and general audio: always uses CELT.
    Audio,
    /// Tuned for lowest algorithmic delay: always uses CELT, with no
    /// look-ahead dependent features.
    LowDelay,
}

/// Bitrate control mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitrateMode {
    /// Variable bitrate: the encoder picks a rate per frame to hit a
    /// target quality.
    Vbr,
    /// Constrained VBR: like VBR, but bounded so a single frame cannot
    /// exceed a hard per-frame cap.
    Cvbr,
    /// Constant bitrate: every frame targets the same size.
    Cbr,
}

/// Target bitrate, in bits per second, or one of the two special modes
/// libopus exposes through `OPUS_SET_BITRATE`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Bitrate {
    /// A specific bitrate in bits per second.
    Bits(u32),
    /// Let the encoder choose a sensible default for the configuration.
    Auto,
    /// Use as much rate as the configured complexity/bandwidth can productively use.
    Max,
}

/// Hint for the kind of signal being encoded, used to bias mode selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalHint {
    /// Let the encoder infer the signal type.
    Auto,
    /// Speech.
    Voice,
    /// Music / general audio.
    Music,
}

/// Forces the number of channels the encoder actually codes, independent
/// of the number of channels in the input PCM.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ForceChannels {
    /// Pick automatically based on the input signal.
    Auto,
    /// Always code mono.
    Mono,
    /// Always code stereo.
    Stereo,
}

/// Configures the encoder on creation.
#[derive(Clone, Debug)]
pub struct EncoderConfiguration {
    /// Sample rate of the input signal (Hz). Default: 48000 Hz.
    pub sampling_rate: SamplingRate,
    /// Number of channels of the input signal. Default: Stereo.
    pub channels: Channels,
    /// Encoding application profile. Default: Audio.
    pub application: Application,
}

impl Default for EncoderConfiguration {
    fn default() -> Self {
        Self {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            application: Application::Audio,
        }
    }
}

/// Opus encoder.
///
/// Like the decoder, the encoder is stateful: encoding the same input
/// twice through two separate `Encoder` instances does not necessarily
/// produce the same bytes as encoding it twice through one (prediction
/// state carries across frames).
#[derive(Clone, Debug)]
pub struct Encoder {
    celt_enc: CeltEncoder,
    silk_enc: SilkEncoder,
    channels: Channels,
    sampling_rate: SamplingRate,
    application: Application,

    bitrate: Bitrate,
    bitrate_mode: BitrateMode,
    complexity: u8,
    fec_enabled: bool,
    packet_loss_perc: u8,
    dtx_enabled: bool,
    signal_hint: SignalHint,
    bandwidth: Bandwidth,
    max_bandwidth: Bandwidth,
    force_channels: ForceChannels,
    prediction_disabled: bool,
    phase_inversion_disabled: bool,
    lsb_depth: u8,

    vad: VoiceActivityDetector,
    fec: FecState,
    plc: PlcState,
    prev_mode: Option<CodecMode>,
    final_range: u32,
}

/// Largest payload a single Opus packet can hold (spec §6).
pub const MAX_PACKET_BYTES: usize = 1275;

impl Encoder {
    /// Creates a new `Encoder` with the given configuration.
    pub fn new(configuration: &EncoderConfiguration) -> Result<Self, EncoderError> {
        let celt_enc = CeltEncoder::new(configuration.sampling_rate, configuration.channels)?;
        let silk_enc = SilkEncoder::new(configuration.sampling_rate, configuration.channels)?;

        Ok(Self {
            celt_enc,
            silk_enc,
            channels: configuration.channels,
            sampling_rate: configuration.sampling_rate,
            application: configuration.application,

            bitrate: Bitrate::Auto,
            bitrate_mode: BitrateMode::Vbr,
            complexity: 10,
            fec_enabled: false,
            packet_loss_perc: 0,
            dtx_enabled: false,
            signal_hint: SignalHint::Auto,
            bandwidth: Bandwidth::Auto,
            max_bandwidth: Bandwidth::Fullband,
            force_channels: ForceChannels::Auto,
            prediction_disabled: false,
            phase_inversion_disabled: false,
            lsb_depth: 24,

            vad: VoiceActivityDetector::new(),
            fec: FecState::new(),
            plc: PlcState::new(),
            prev_mode: None,
            final_range: 0,
        })
    }

    /// Resets the `Encoder` to be equivalent to a freshly initialized one.
    pub fn reset(&mut self) -> Result<(), EncoderError> {
        self.silk_enc.reset()?;
        self.celt_enc.reset()?;
        self.vad.reset();
        self.fec.reset();
        self.plc.reset();
        self.prev_mode = None;
        self.final_range = 0;
        Ok(())
    }

    /// Sampling rate the encoder was initialized with.
    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }

    /// Channels the encoder was initialized with.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Encoding application the encoder was initialized with.
    pub fn application(&self) -> Application {
        self.application
    }

    /// Current target bitrate.
    pub fn bitrate(&self) -> Bitrate {
        self.bitrate
    }

    /// Sets the target bitrate.
    pub fn set_bitrate(&mut self, bitrate: Bitrate) -> Result<(), EncoderError> {
        if let Bitrate::Bits(bps) = bitrate {
            let max = 510_000 * self.channels as u32;
            if !(6_000..=max).contains(&bps) {
                return Err(EncoderError::InvalidBitrate);
            }
        }
        self.bitrate = bitrate;
        Ok(())
    }

    /// Current bitrate control mode.
    pub fn bitrate_mode(&self) -> BitrateMode {
        self.bitrate_mode
    }

    /// Sets the bitrate control mode (VBR / CVBR / CBR).
    pub fn set_bitrate_mode(&mut self, mode: BitrateMode) {
        self.bitrate_mode = mode;
    }

    /// Current computational complexity, `0..=10`.
    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    /// Sets the computational complexity, `0..=10`.
    pub fn set_complexity(&mut self, complexity: u8) -> Result<(), EncoderError> {
        if complexity > 10 {
            return Err(EncoderError::InvalidComplexity);
        }
        self.complexity = complexity;
        Ok(())
    }

    /// Whether in-band forward error correction is enabled.
    pub fn fec_enabled(&self) -> bool {
        self.fec_enabled
    }

    /// Enables or disables in-band forward error correction (LBRR).
    pub fn set_fec_enabled(&mut self, enabled: bool) {
        self.fec_enabled = enabled;
        if !enabled {
            self.fec.reset();
        }
    }

    /// Expected packet loss percentage, `0..=100`, used to decide how
    /// aggressively to spend bits on FEC redundancy.
    pub fn packet_loss_perc(&self) -> u8 {
        self.packet_loss_perc
    }

    /// Sets the expected packet loss percentage, `0..=100`.
    pub fn set_packet_loss_perc(&mut self, percent: u8) -> Result<(), EncoderError> {
        if percent > 100 {
            return Err(EncoderError::InvalidPacketLoss);
        }
        self.packet_loss_perc = percent;
        Ok(())
    }

    /// Whether discontinuous transmission is enabled.
    pub fn dtx_enabled(&self) -> bool {
        self.dtx_enabled
    }

    /// Enables or disables discontinuous transmission.
    pub fn set_dtx_enabled(&mut self, enabled: bool) {
        self.dtx_enabled = enabled;
        if !enabled {
            self.vad.reset();
        }
    }

    /// Current signal-type hint.
    pub fn signal_hint(&self) -> SignalHint {
        self.signal_hint
    }

    /// Sets the signal-type hint.
    pub fn set_signal_hint(&mut self, hint: SignalHint) {
        self.signal_hint = hint;
    }

    /// Current bandwidth (`Bandwidth::Auto` lets the encoder pick based on
    /// sampling rate and application).
    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// Sets the bandwidth to encode at.
    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.bandwidth = bandwidth;
    }

    /// Current maximum bandwidth the encoder will ever select automatically.
    pub fn max_bandwidth(&self) -> Bandwidth {
        self.max_bandwidth
    }

    /// Sets the maximum bandwidth the encoder may pick when `bandwidth` is
    /// `Auto`.
    pub fn set_max_bandwidth(&mut self, bandwidth: Bandwidth) {
        self.max_bandwidth = bandwidth;
    }

    /// Current forced channel count.
    pub fn force_channels(&self) -> ForceChannels {
        self.force_channels
    }

    /// Forces mono/stereo coding regardless of the input channel count.
    pub fn set_force_channels(&mut self, force: ForceChannels) {
        self.force_channels = force;
    }

    /// Whether SILK's short-term/long-term prediction is disabled (useful
    /// for encoding already-lossy or non-speech-like signal at low
    /// complexity).
    pub fn prediction_disabled(&self) -> bool {
        self.prediction_disabled
    }

    /// Disables or re-enables SILK prediction.
    pub fn set_prediction_disabled(&mut self, disabled: bool) {
        self.prediction_disabled = disabled;
    }

    /// Whether CELT's mid/side phase inversion is disabled.
    pub fn phase_inversion_disabled(&self) -> bool {
        self.phase_inversion_disabled
    }

    /// Disables or re-enables CELT's mid/side phase inversion.
    pub fn set_phase_inversion_disabled(&mut self, disabled: bool) {
        self.phase_inversion_disabled = disabled;
    }

    /// Depth, in bits, of the source PCM samples the caller is encoding
    /// from, `8..=24`. Only affects how aggressively dithering/noise
    /// shaping rounds; never rejects or truncates audio.
    pub fn lsb_depth(&self) -> u8 {
        self.lsb_depth
    }

    /// Sets the source PCM bit depth, `8..=24`.
    pub fn set_lsb_depth(&mut self, depth: u8) -> Result<(), EncoderError> {
        if !(8..=24).contains(&depth) {
            return Err(EncoderError::InvalidLsbDepth);
        }
        self.lsb_depth = depth;
        Ok(())
    }

    /// Returns the final state of the codec's entropy coder (see
    /// `Decoder::final_range`; the two should match after coding the same
    /// payload with no corruption).
    pub fn final_range(&self) -> u32 {
        self.final_range
    }

    /// Algorithmic look-ahead, in samples at the encoder's configured
    /// sampling rate, that `encode` introduces before the first sample of
    /// input shows up in the output bitstream (spec §6): CELT's MDCT
    /// overlap (`rate/400`) plus SILK's look-ahead (`rate/250`), except
    /// `LowDelay` which omits the SILK term entirely.
    pub fn lookahead(&self) -> u32 {
        let rate = self.sampling_rate as u32;
        if self.application == Application::LowDelay {
            rate / 400
        } else {
            rate / 400 + rate / 250
        }
    }

    /// Picks the bandwidth to encode at for this call, resolving `Auto` to
    /// the input sampling rate's natural bandwidth, clamped to
    /// `max_bandwidth`.
    fn effective_bandwidth(&self) -> Bandwidth {
        let natural = match self.sampling_rate {
            SamplingRate::Hz8000 => Bandwidth::Narrowband,
            SamplingRate::Hz12000 => Bandwidth::Mediumband,
            SamplingRate::Hz16000 => Bandwidth::Wideband,
            SamplingRate::Hz24000 => Bandwidth::Superwideband,
            SamplingRate::Hz48000 => Bandwidth::Fullband,
        };
        let requested = match self.bandwidth {
            Bandwidth::Auto => natural,
            other => other,
        };
        if bandwidth_rank(requested) > bandwidth_rank(self.max_bandwidth) {
            self.max_bandwidth
        } else {
            requested
        }
    }

    /// Picks the codec mode for this call, the same way libopus biases
    /// application + bandwidth toward SILK for speech-shaped low
    /// bandwidths and CELT for music / wide bandwidths.
    fn select_mode(&self, bandwidth: Bandwidth) -> CodecMode {
        match self.application {
            Application::Audio | Application::LowDelay => CodecMode::Celt,
            Application::Voip => match (self.signal_hint, bandwidth) {
                (SignalHint::Music, _) => CodecMode::Celt,
                (_, Bandwidth::Fullband | Bandwidth::Superwideband) => CodecMode::Hybrid,
                _ => CodecMode::Silk,
            },
        }
    }

    /// Encodes one frame of generic samples into `out`, returning the
    /// number of bytes written (`0` if DTX elected to send nothing for a
    /// silent frame).
    ///
    /// # Arguments
    /// * `input`      - Input signal, interleaved if 2 channels.
    /// * `frame_size` - Number of samples per channel in `input`. Must be
    ///                  a standard Opus frame duration for the active mode
    ///                  (2.5/5/10/20 ms for CELT and Hybrid; 10/20/40/60 ms
    ///                  for SILK).
    /// * `out`        - Output buffer for the encoded packet.
    pub fn encode(&mut self, input: &[f32], frame_size: usize, out: &mut [u8]) -> Result<usize, EncoderError> {
        self.encode_native(input, frame_size, out)
    }

    /// Encodes one frame of floating point samples into `out`. Identical
    /// to [`Encoder::encode`]: the encoder's internal format is already
    /// `f32`, so this only exists to mirror `Decoder::decode_float`'s
    /// naming.
    pub fn encode_float(&mut self, input: &[f32], frame_size: usize, out: &mut [u8]) -> Result<usize, EncoderError> {
        self.encode_native(input, frame_size, out)
    }

    /// Takes the previous SILK-bearing frame's PCM, if FEC is enabled and
    /// one was stashed, for embedding as this frame's LBRR redundancy.
    fn take_fec_redundancy(&mut self) -> Option<Vec<f32>> {
        if self.fec_enabled {
            self.fec.take_frame()
        } else {
            self.fec.reset();
            None
        }
    }

    /// Stashes this frame's PCM as the redundancy candidate for the
    /// *next* SILK-bearing frame, if FEC is enabled.
    fn store_fec_redundancy(&mut self, input: &[f32], frame_size: usize) {
        if self.fec_enabled {
            let channels = self.channels as usize;
            self.fec.store_frame(input[..frame_size * channels].to_vec());
        }
    }

    fn encode_native(&mut self, input: &[f32], frame_size: usize, out: &mut [u8]) -> Result<usize, EncoderError> {
        let channels = self.channels as usize;
        if input.len() < frame_size * channels {
            return Err(EncoderError::InternalError("input shorter than frame_size * channels"));
        }
        if out.is_empty() {
            return Err(EncoderError::BufferToSmall);
        }

        if self.dtx_enabled && !self.vad.should_transmit(&input[..frame_size * channels]) {
            return Ok(0);
        }

        let bandwidth = self.effective_bandwidth();
        let mode = self.select_mode(bandwidth);
        let frame_duration_400ths = (frame_size as u32 * 400 / self.sampling_rate as u32).max(1);
        let config = configuration_to_index(mode, bandwidth, frame_duration_400ths)
            .ok_or(EncoderError::InvalidFrameSize)?;

        let toc = Toc {
            config,
            stereo: self.channels == Channels::Stereo,
            code: crate::toc::FrameCode::One,
        };
        out[0] = toc.to_byte();

        let payload_size_ms = (frame_duration_400ths as usize * 5) / 2;
        self.silk_enc.set_payload_size_ms(payload_size_ms.max(1));

        let payload = &mut out[1..];
        let mut range_encoder = RangeEncoder::new(payload);
        let frame_bits = (payload.len() as u32).saturating_mul(8);

        match mode {
            CodecMode::Silk => {
                let redundancy = self.take_fec_redundancy();
                self.silk_enc
                    .encode(&mut range_encoder, input, frame_size, redundancy.as_deref())?;
                self.store_fec_redundancy(input, frame_size);
            }
            CodecMode::Celt => {
                self.celt_enc.encode(&mut range_encoder, input, frame_size, 0, frame_bits)?;
            }
            CodecMode::Hybrid => {
                let redundancy = self.take_fec_redundancy();
                self.silk_enc
                    .encode(&mut range_encoder, input, frame_size, redundancy.as_deref())?;
                self.store_fec_redundancy(input, frame_size);
                self.celt_enc.encode(
                    &mut range_encoder,
                    input,
                    frame_size,
                    crate::hybrid::CELT_START_BAND,
                    frame_bits,
                )?;
            }
        }

        self.final_range = range_encoder.final_range();
        let written = range_encoder.shrink_and_finalize()?;
        self.prev_mode = Some(mode);

        Ok(1 + written)
    }
}

fn bandwidth_rank(bandwidth: Bandwidth) -> u8 {
    match bandwidth {
        Bandwidth::Auto => 0,
        Bandwidth::Narrowband => 1,
        Bandwidth::Mediumband => 2,
        Bandwidth::Wideband => 3,
        Bandwidth::Superwideband => 4,
        Bandwidth::Fullband => 5,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    #[cfg(feature = "decoder")]
    use crate::{Decoder, DecoderConfiguration};

    #[cfg(feature = "decoder")]
    fn sine(frame_size: usize, channels: usize, freq: f32, rate: f32) -> Vec<f32> {
        (0..frame_size * channels)
            .map(|i| {
                let t = (i / channels) as f32 / rate;
                0.2 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    #[cfg(feature = "decoder")]
    fn test_encode_decode_round_trip_celt_mono() {
        let mut encoder = Encoder::new(&EncoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            application: Application::Audio,
        })
        .unwrap();
        let mut decoder = Decoder::new(&DecoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            gain: 0,
        })
        .unwrap();

        let frame_size = 960;
        let input = sine(frame_size, 1, 440.0, 48000.0);
        let mut packet = vec![0u8; MAX_PACKET_BYTES];
        let written = encoder.encode(&input, frame_size, &mut packet).unwrap();
        assert!(written > 0);

        let mut output = vec![0.0f32; frame_size];
        let decoded = decoder.decode_float(Some(&packet[..written]), &mut output, frame_size, false).unwrap();
        assert_eq!(decoded as usize, frame_size);
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    #[cfg(feature = "decoder")]
    fn test_encode_decode_round_trip_hybrid_stereo() {
        let mut encoder = Encoder::new(&EncoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            application: Application::Voip,
        })
        .unwrap();
        let mut decoder = Decoder::new(&DecoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            gain: 0,
        })
        .unwrap();

        let frame_size = 960;
        let mut input = vec![0.0f32; frame_size * 2];
        for i in 0..frame_size {
            let t = i as f32 / 48000.0;
            let sample = 0.2 * (2.0 * std::f32::consts::PI * 220.0 * t).sin();
            input[2 * i] = sample;
            input[2 * i + 1] = sample;
        }
        let mut packet = vec![0u8; MAX_PACKET_BYTES];
        let written = encoder.encode(&input, frame_size, &mut packet).unwrap();
        assert!(written > 0);
        assert_eq!(encoder.select_mode(encoder.effective_bandwidth()), CodecMode::Hybrid);

        let mut output = vec![0.0f32; frame_size * 2];
        let decoded = decoder.decode_float(Some(&packet[..written]), &mut output, frame_size, false).unwrap();
        assert_eq!(decoded as usize, frame_size);
        assert!(output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_dtx_suppresses_silent_frames_after_threshold() {
        let mut encoder = Encoder::new(&EncoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            application: Application::Voip,
        })
        .unwrap();
        encoder.set_dtx_enabled(true);

        let frame_size = 960;
        let silence = vec![0.0f32; frame_size];
        let mut packet = vec![0u8; MAX_PACKET_BYTES];

        let mut non_empty = 0;
        for _ in 0..25 {
            let written = encoder.encode(&silence, frame_size, &mut packet).unwrap();
            if written > 0 {
                non_empty += 1;
            }
        }
        // Spec S5: DTX should have suppressed the vast majority of 25
        // consecutive silent frames, not merely encoded every one of them.
        assert!(non_empty < 25);
    }

    #[test]
    fn test_invalid_bitrate_rejected() {
        let mut encoder = Encoder::new(&EncoderConfiguration::default()).unwrap();
        assert!(matches!(
            encoder.set_bitrate(Bitrate::Bits(1000)),
            Err(EncoderError::InvalidBitrate)
        ));
    }
}
