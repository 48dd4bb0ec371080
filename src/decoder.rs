//! Implement the Opus decoder.

use crate::celt::CeltDecoder;
use crate::framing::parse_packet;
use crate::hybrid::{decode_hybrid_frame, HybridDelayLine};
use crate::plc::PlcState;
use crate::range_coder::RangeDecoder;
use crate::silk::{LostFlag, SilkDecoder};
use crate::toc::{query_packet_samples_per_frame, Toc};
use crate::{pcm_soft_clip, Bandwidth, Channels, CodecMode, DecoderError, Sample, SamplingRate};

/// Configures the decoder on creation.
///
/// Internally Opus stores data at 48000 Hz, so that should be the default
/// value for the sampling rate. However, the decoder can efficiently decode
/// to buffers at 8, 12, 16, and 24 kHz so if for some reason the caller cannot
/// use data at the full sample rate, or knows the compressed data doesn't
/// use the full frequency range, it can request decoding at a reduced
/// rate. Likewise, the decoder is capable of filling in either mono or
/// interleaved stereo pcm buffers, at the caller's request.
#[derive(Clone, Debug)]
pub struct DecoderConfiguration {
    /// Sample rate to decode at (Hz). Default: 48000 kHz.
    pub sampling_rate: SamplingRate,
    /// Number of channels to decode. Default: Stereo.
    pub channels: Channels,
    /// Scales the decoded output by a factor specified in Q8 dB units. Default: 0.
    pub gain: i16,
}

impl Default for DecoderConfiguration {
    fn default() -> Self {
        Self {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Stereo,
            gain: 0,
        }
    }
}

/// Opus decoder.
///
/// Opus is a stateful codec with overlapping blocks and as a result Opus
/// packets are not coded independently of each other. Packets must be
/// passed into the decoder serially and in the correct order for a correct
/// decode. Lost packets can be replaced with loss concealment by calling
/// the decoder with `None` for the missing packet.
#[derive(Clone, Debug)]
pub struct Decoder {
    celt_dec: CeltDecoder,
    silk_dec: SilkDecoder,
    channels: Channels,
    sampling_rate: SamplingRate,
    decode_gain: i16,

    stream_channels: Channels,
    bandwidth: Bandwidth,
    mode: Option<CodecMode>,
    prev_mode: Option<CodecMode>,
    frame_size: usize,
    prev_redundancy: Option<usize>,
    last_packet_duration: Option<u32>,

    plc: PlcState,
    hybrid_delay: HybridDelayLine,
    softclip_mem: Vec<f32>,

    final_range: u32,
}

impl Decoder {
    /// Creates a new `Decoder` with the given configuration.
    pub fn new(configuration: &DecoderConfiguration) -> Result<Self, DecoderError> {
        let celt_dec = CeltDecoder::new(configuration.sampling_rate, configuration.channels)?;
        let silk_dec = SilkDecoder::new(configuration.sampling_rate, configuration.channels)?;
        let channels = configuration.channels as usize;

        Ok(Self {
            celt_dec,
            silk_dec,
            sampling_rate: configuration.sampling_rate,
            channels: configuration.channels,
            decode_gain: configuration.gain,
            stream_channels: configuration.channels,
            bandwidth: Bandwidth::Auto,
            mode: None,
            prev_mode: None,
            frame_size: configuration.sampling_rate as usize / 400,
            prev_redundancy: None,
            last_packet_duration: None,
            plc: PlcState::new(),
            hybrid_delay: HybridDelayLine::new(channels),
            softclip_mem: vec![0.0; channels],
            final_range: 0,
        })
    }

    /// Resets the Decoder to be equivalent to a freshly initialized decoder.
    ///
    /// This should be called when switching streams in order to prevent
    /// the back to back decoding from giving different results from
    /// one at a time decoding.
    pub fn reset(&mut self) -> Result<(), DecoderError> {
        self.silk_dec.reset()?;
        self.celt_dec.reset()?;

        self.stream_channels = self.channels;
        self.bandwidth = Bandwidth::Auto;
        self.mode = None;
        self.prev_mode = None;
        self.frame_size = self.sampling_rate as usize / 400;
        self.prev_redundancy = None;
        self.last_packet_duration = None;
        self.plc.reset();
        self.hybrid_delay.reset();
        self.softclip_mem.iter_mut().for_each(|v| *v = 0.0);

        Ok(())
    }

    /// Returns the sampling rate the decoder was initialized with.
    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }

    /// Returns the channels the decoder was initialized with.
    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Returns the amount to scale PCM signal by in Q8 dB units.
    pub fn gain(&self) -> i16 {
        self.decode_gain
    }

    /// Returns the decoder's last bandpass.
    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// Returns the pitch of the last decoded frame, measured in samples at 48 kHz
    pub fn pitch(&self) -> Option<u32> {
        if let Some(prev_mode) = self.prev_mode {
            match prev_mode {
                CodecMode::Celt => Some(self.celt_dec.pitch()),
                CodecMode::Silk | CodecMode::Hybrid => Some(self.silk_dec.pitch()),
            }
        } else {
            None
        }
    }

    /// Returns the duration (in samples) of the last packet successfully decoded or concealed.
    pub fn last_packet_duration(&self) -> Option<u32> {
        self.last_packet_duration
    }

    /// Returns the final state of the codec's entropy coder.
    ///
    /// This is used for testing purposes, the encoder and decoder state
    /// should be identical after coding a payload assuming no data
    /// corruption or software bugs).
    pub fn final_range(&mut self) -> u32 {
        self.final_range
    }

    /// Decode an Opus packet with a generic sample output.
    ///
    /// Returns number of decoded samples.
    ///
    /// Caller needs to make sure that the samples buffer has enough space to fit
    /// all samples inside the packet. Call `query_packet_sample_count()` to query
    /// the number of samples inside a packet and resize the buffer if needed.
    ///
    /// The internal format is `f32`. Use `decode_float()` to access it directly.
    ///
    /// # Arguments
    /// * `packet`     - Input payload. Use a `None` to indicate packet loss.
    /// * `samples`    - Output signal encoded as PCM samples (interleaved if 2 channels).
    ///                  Length must be at least `frame_size` * `channels`.
    /// * `frame_size` - Number of samples per channel of available space in a PCM.
    ///                  `frame_size` must be a multiple of 2.5 ms (400 for 48kHz).
    ///                  In the case of PLC (packet==`None`) or FEC (decode_fec=`true`), then
    ///                  `frame_size` needs to be exactly the duration of audio that is missing,
    ///                  otherwise the decoder will not be in the optimal state to decode
    ///                  the next incoming packet.
    /// * `decode_fec` - Request that any in-band forward error correction data be decoded.
    ///                  If no such data is available, the frame is decoded as if it were lost.
    ///
    pub fn decode<S: Sample>(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [S],
        frame_size: usize,
        decode_fec: bool,
    ) -> Result<u32, DecoderError> {
        let channels = self.channels as usize;
        let mut scratch = vec![0.0f32; frame_size * channels];
        let (decoded, _) = self.decode_native(packet, &mut scratch, frame_size, decode_fec, false, true)?;

        for (dst, &src) in samples.iter_mut().zip(scratch.iter()) {
            *dst = S::from_f32(src);
        }
        Ok(decoded)
    }

    /// Decode an Opus packet with floating point output.
    ///
    /// Returns number of decoded samples.
    ///
    /// Caller needs to make sure that the samples buffer has enough space to fit
    /// all samples inside the packet. Call `query_packet_sample_count()` to query
    /// the number of samples inside a packet and resize the buffer if needed.
    ///
    /// # Arguments
    /// * `packet`     - Input payload. Use a `None` to indicate packet loss.
    /// * `samples`    - Output signal encoded as PCM samples (interleaved if 2 channels).
    ///                  Length is frame_size * channels.
    /// * `frame_size` - Number of samples per channel of available space in a PCM.
    ///                  `frame_size` must be a multiple of 2.5 ms (400 for 48kHz).
    ///                  In the case of PLC (packet==`None`) or FEC (decode_fec=`true`), then
    ///                  `frame_size` needs to be exactly the duration of audio that is missing,
    ///                  otherwise the decoder will not be in the optimal state to decode
    ///                  the next incoming packet.
    /// * `decode_fec` - Request that any in-band forward error correction data be decoded.
    ///                  If no such data is available, the frame is decoded as if it were lost.
    ///
    pub fn decode_float(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [f32],
        frame_size: usize,
        decode_fec: bool,
    ) -> Result<u32, DecoderError> {
        let (decoded, _) = self.decode_native(packet, samples, frame_size, decode_fec, false, false)?;
        Ok(decoded)
    }

    /// Returns the samples decoded and the packet_offset (used for multiple streams).
    fn decode_native(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [f32],
        frame_size: usize,
        decode_fec: bool,
        self_delimited: bool,
        soft_clip: bool,
    ) -> Result<(u32, usize), DecoderError> {
        let channels = self.channels as usize;
        if samples.len() < frame_size * channels {
            return Err(DecoderError::BufferTooSmall);
        }

        let packet = match packet {
            None => return self.finish_concealment(samples, frame_size, soft_clip),
            Some(p) if p.is_empty() => return self.finish_concealment(samples, frame_size, soft_clip),
            Some(p) => p,
        };

        let toc = Toc::parse(packet[0]);
        let configuration = toc.configuration();

        let mut frames = [0usize; 48];
        let mut sizes = [0usize; 48];
        let mut payload_offset = 0usize;
        let mut packet_offset = 0usize;
        let frame_count = parse_packet(
            packet,
            self_delimited,
            Some(&mut frames),
            &mut sizes,
            Some(&mut payload_offset),
            Some(&mut packet_offset),
        )?;

        // A packet requesting in-band FEC recovery for the *previous* lost
        // frame only has something to recover if this packet's first
        // frame is SILK-bearing and actually embeds LBRR redundancy (spec
        // §4.10); per this function's own documented contract, "if no
        // such data is available, the frame is decoded as if it were
        // lost".
        if decode_fec {
            if !matches!(configuration.mode, CodecMode::Silk | CodecMode::Hybrid) || frame_count == 0 {
                let (decoded, _) = self.finish_concealment(samples, frame_size, soft_clip)?;
                return Ok((decoded, packet_offset));
            }

            let payload_size_ms = (configuration.frame_duration_400ths as usize * 5) / 2;
            self.silk_dec.set_payload_size_ms(payload_size_ms.max(1));

            let frame_bytes = &packet[frames[0]..frames[0] + sizes[0]];
            let mut range_decoder = RangeDecoder::new(frame_bytes);
            let mut out_size = frame_size;
            let recovered =
                self.silk_dec
                    .decode_fec(&mut range_decoder, &mut samples[..frame_size * channels], &mut out_size)?;

            if recovered {
                self.prev_mode = Some(CodecMode::Silk);
                self.last_packet_duration = Some(frame_size as u32);
                self.plc.note_recovery();
                if soft_clip {
                    pcm_soft_clip(&mut samples[..frame_size * channels], channels, &mut self.softclip_mem);
                }
                return Ok((frame_size as u32, packet_offset));
            }

            let (decoded, _) = self.finish_concealment(samples, frame_size, soft_clip)?;
            return Ok((decoded, packet_offset));
        }

        self.bandwidth = configuration.bandwidth;
        self.mode = Some(configuration.mode);
        self.stream_channels = toc.channels();

        let samples_per_frame = query_packet_samples_per_frame(packet, self.sampling_rate);
        let total_samples = samples_per_frame * frame_count;
        if total_samples > frame_size {
            return Err(DecoderError::BufferTooSmall);
        }

        let payload_size_ms = (configuration.frame_duration_400ths as usize * 5) / 2;
        self.silk_dec.set_payload_size_ms(payload_size_ms.max(1));

        let mut final_range = self.final_range;
        for i in 0..frame_count {
            let frame_bytes = &packet[frames[i]..frames[i] + sizes[i]];
            let mut range_decoder = RangeDecoder::new(frame_bytes);
            let frame_bits = (sizes[i] as u32).saturating_mul(8);
            let mut per_frame_size = samples_per_frame;
            let out = &mut samples[i * samples_per_frame * channels..(i + 1) * samples_per_frame * channels];

            match configuration.mode {
                CodecMode::Silk => {
                    self.silk_dec.decode(
                        Some(&mut range_decoder),
                        out,
                        &mut per_frame_size,
                        LostFlag::NoLoss,
                        i == 0,
                    )?;
                }
                CodecMode::Celt => {
                    self.celt_dec.decode(&mut range_decoder, out, samples_per_frame, 0, frame_bits)?;
                }
                CodecMode::Hybrid => {
                    decode_hybrid_frame(
                        &mut self.silk_dec,
                        &mut self.celt_dec,
                        &mut self.hybrid_delay,
                        &mut range_decoder,
                        out,
                        samples_per_frame,
                        frame_bits,
                    )?;
                }
            }
            final_range = range_decoder.final_range();
        }

        self.final_range = final_range;
        self.prev_mode = self.mode;
        self.prev_redundancy = None;
        self.last_packet_duration = Some(total_samples as u32);
        self.plc.note_recovery();

        if soft_clip {
            pcm_soft_clip(&mut samples[..total_samples * channels], channels, &mut self.softclip_mem);
        }

        Ok((total_samples as u32, packet_offset))
    }

    /// Packet-loss concealment: fades out via `PlcState`, driving whichever
    /// codec decoded the last good frame (or silence if none has).
    fn finish_concealment(
        &mut self,
        samples: &mut [f32],
        frame_size: usize,
        soft_clip: bool,
    ) -> Result<(u32, usize), DecoderError> {
        let channels = self.channels as usize;
        let attenuation = self.plc.note_loss();
        let out = &mut samples[..frame_size * channels];

        match self.prev_mode {
            Some(CodecMode::Celt) => {
                self.celt_dec.conceal(out, frame_size, attenuation);
            }
            Some(CodecMode::Silk) => {
                let mut size = frame_size;
                self.silk_dec
                    .decode(None, out, &mut size, LostFlag::Loss, false)?;
                out.iter_mut().for_each(|s| *s *= attenuation);
            }
            Some(CodecMode::Hybrid) => {
                let mut size = frame_size;
                self.silk_dec
                    .decode(None, out, &mut size, LostFlag::Loss, false)?;
                let mut celt_out = vec![0.0f32; out.len()];
                self.celt_dec.conceal(&mut celt_out, frame_size, attenuation);
                for (o, c) in out.iter_mut().zip(celt_out.iter()) {
                    *o = *o * attenuation + c;
                }
            }
            None => {
                out.iter_mut().for_each(|s| *s = 0.0);
            }
        }

        self.last_packet_duration = Some(frame_size as u32);
        if soft_clip {
            pcm_soft_clip(out, channels, &mut self.softclip_mem);
        }
        Ok((frame_size as u32, 0))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    #[cfg(feature = "encoder")]
    use crate::encoder::{Application, Encoder, EncoderConfiguration, MAX_PACKET_BYTES};

    #[cfg(feature = "encoder")]
    fn sine(frame_size: usize, freq: f32, rate: f32) -> Vec<f32> {
        (0..frame_size)
            .map(|i| 0.2 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate).sin())
            .collect()
    }

    #[test]
    #[cfg(feature = "encoder")]
    fn test_plc_continuity_good_loss_good() {
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
        let input = sine(frame_size, 440.0, 48000.0);
        let mut packet = vec![0u8; MAX_PACKET_BYTES];

        let written = encoder.encode(&input, frame_size, &mut packet).unwrap();
        let mut first = vec![0.0f32; frame_size];
        let decoded = decoder.decode_float(Some(&packet[..written]), &mut first, frame_size, false).unwrap();
        assert_eq!(decoded as usize, frame_size);

        // Spec S6: a lost frame concealed via `decode(None)` must still
        // produce a full frame of finite audio with no discontinuity.
        let mut concealed = vec![0.0f32; frame_size];
        let decoded = decoder.decode_float(None, &mut concealed, frame_size, false).unwrap();
        assert_eq!(decoded as usize, frame_size);
        assert!(concealed.iter().all(|s| s.is_finite()));

        let written = encoder.encode(&input, frame_size, &mut packet).unwrap();
        let mut third = vec![0.0f32; frame_size];
        let decoded = decoder.decode_float(Some(&packet[..written]), &mut third, frame_size, false).unwrap();
        assert_eq!(decoded as usize, frame_size);
        assert!(third.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_decode_with_no_prior_frame_conceals_to_silence() {
        let mut decoder = Decoder::new(&DecoderConfiguration::default()).unwrap();
        let frame_size = 960;
        let channels = decoder.channels() as usize;
        let mut out = vec![1.0f32; frame_size * channels];
        let decoded = decoder.decode_float(None, &mut out, frame_size, false).unwrap();
        assert_eq!(decoded as usize, frame_size);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_buffer_too_small_is_rejected() {
        let mut decoder = Decoder::new(&DecoderConfiguration {
            sampling_rate: SamplingRate::Hz48000,
            channels: Channels::Mono,
            gain: 0,
        })
        .unwrap();
        let mut out = vec![0.0f32; 10];
        let result = decoder.decode_float(None, &mut out, 960, false);
        assert!(matches!(result, Err(DecoderError::BufferTooSmall)));
    }
}
