#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
// FIXME only temporary until the main library calls are implemented.
#![allow(unused)]
//! Implements the free and open audio codec Opus in Rust.
//!
//! The Opus codec is designed for interactive speech and audio transmission over the Internet.
//! It is designed by the IETF Codec Working Group and incorporates technology from
//! Skype's Silk codec and Xiph.Org's Celt codec.
//!
//! The Opus codec is designed to handle a wide range of interactive audio applications,
//! including Voice over IP, videoconferencing, in-game chat, and even remote live music
//! performances. It can scale from low bit-rate narrowband speech to very high quality
//! stereo music. Its main features are:
//!
//! * Sampling rates from 8 to 48 kHz
//! * Bit-rates from 6 kb/s to 510 kb/s
//! * Support for both constant bit-rate (CBR) and variable bit-rate (VBR)
//! * Audio bandwidth from narrowband to full-band
//! * Support for speech and music
//! * Support for mono and stereo
//! * Support for multichannel (up to 255 channels)
//! * Frame sizes from 2.5 ms to 60 ms
//! * Good loss robustness and packet loss concealment (PLC)
//!
#[cfg(feature = "decoder")]
pub use decoder::*;
pub use decoder_error::*;
#[cfg(feature = "encoder")]
pub use encoder::*;
pub use encoder_error::*;
pub use error::*;
pub use framing::{parse_packet, Repacketizer};
#[cfg(feature = "decoder")]
pub use multistream::*;
pub use toc::{
    query_packet_bandwidth, query_packet_channel_count, query_packet_codec_mode,
    query_packet_frame_count, query_packet_sample_count, query_packet_samples_per_frame,
};

pub(crate) mod celt;
#[cfg(feature = "decoder")]
mod decoder;
mod decoder_error;
#[cfg(feature = "encoder")]
pub(crate) mod dtx;
#[cfg(feature = "encoder")]
mod encoder;
mod encoder_error;
mod error;
#[cfg(feature = "encoder")]
pub(crate) mod fec;
mod framing;
pub(crate) mod hybrid;
pub(crate) mod math;
#[cfg(feature = "decoder")]
mod multistream;
pub(crate) mod plc;
pub(crate) mod range_coder;
pub(crate) mod silk;
mod toc;

// Affects the following targets: avr and msp430
#[cfg(any(target_pointer_width = "8", target_pointer_width = "16"))]
compile_error!("usize needs to be at least 32 bit wide");

/// Allows applications to use their own sample format.
pub trait Sample {
    /// Converts the given float into the custom sample.
    fn from_f32(float: f32) -> Self;
}

impl Sample for f32 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        float
    }
}

impl Sample for f64 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        float as f64
    }
}

impl Sample for i16 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 32768.0;
        if float > 32767.0 {
            32767
        } else if float < -32768.0 {
            -32768
        } else {
            float as i16
        }
    }
}

impl Sample for i32 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 2_147_483_648.0;
        if float > 2_147_483_647.0 {
            2_147_483_647
        } else if float < -2_147_483_648.0 {
            -2_147_483_648
        } else {
            float as i32
        }
    }
}

impl Sample for u16 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 32768.0 + 32768.0;
        if float > 32767.0 {
            32767
        } else if float < 0.0 {
            0
        } else {
            float as u16
        }
    }
}

impl Sample for u32 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 2_147_483_648.0 + 2_147_483_648.0;
        if float > 4_294_967_295.0 {
            4_294_967_295
        } else if float < 0.0 {
            0
        } else {
            float as u32
        }
    }
}

/// Audio channels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Channels {
    /// Mono - 1 channel
    Mono = 1,
    /// Stereo - 2 channels
    Stereo = 2,
}

/// Samples per second.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SamplingRate {
    /// 8 kHz
    Hz8000 = 8000,
    /// 12 kHz
    Hz12000 = 12000,
    /// 16 kHz
    Hz16000 = 16000,
    /// 16 kHz
    Hz24000 = 24000,
    /// 48 kHz
    Hz48000 = 48000,
}

/// Audio bandwidth.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Bandwidth {
    /// Automatic selection.
    Auto,
    /// 4 kHz passband.
    Narrowband,
    /// 6 kHz passband.
    Mediumband,
    /// 8 kHz passband.
    Wideband,
    /// 12 kHz passband.
    Superwideband,
    /// 20 kHz passband.
    Fullband,
}

/// Codec mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CodecMode {
    /// Silk only.
    Silk,
    /// Hybrid mode.
    Hybrid,
    /// Celt only.
    Celt,
}

/// Applies soft-clipping to bring a float signal within the [-1,1] range. If
/// the signal is already in that range, nothing is done. If there are values
/// outside of [-1,1], then the signal is clipped as smoothly as possible to
/// both fit in the range and avoid creating excessive distortion in the
/// process.
///
/// # Arguments
/// * `pcm`          - Input PCM and modified PCM.
/// * `channels`     - Number of channels.
/// * `softclip_mem` - State memory for the soft clipping process
///                    (one float per channel, initialized to zero).
///
pub fn pcm_soft_clip(pcm: &mut [f32], channels: usize, softclip_mem: &mut [f32]) {
    if pcm.is_empty() || channels == 0 || softclip_mem.len() < channels {
        return;
    }
    let channels = channels;
    let frame_size = pcm.len() / channels;

    // First thing: saturate everything to +/- 2 which is the highest level our
    // non-linearity can handle. At the point where the signal reaches +/-2,
    // the derivative will be zero anyway, so this doesn't introduce any
    // discontinuity in the derivative.
    pcm.iter_mut()
        .for_each(|x| *x = f32::min(f32::max(*x, -2.0), 2.0));

    (0..channels).into_iter().for_each(|c| {
        let mut a = softclip_mem[c];

        // Continue applying the non-linearity from the previous frame to avoid
        // any discontinuity.
        for i in 0..frame_size {
            let off = c + i * channels;
            if pcm[off] * a >= 0.0 {
                break;
            }
            pcm[off] += a * pcm[off] * pcm[off];
        }

        let mut curr = 0;
        let x0 = pcm[c];

        loop {
            let mut pos = 0;
            for i in curr..frame_size {
                pos = i;
                if pcm[c + pos * channels] > 1.0 || pcm[c + pos * channels] < -1.0 {
                    break;
                }
            }

            if pos == frame_size {
                a = 0.0;
                break;
            }

            let mut peak_pos = pos;
            let mut start = pos;
            let mut end = pos;
            let mut maxval = f32::abs(pcm[c + pos * channels]);

            // Look for first zero crossing before clipping.
            while start > 0 && pcm[c + pos * channels] * pcm[c + (start - 1) * channels] >= 0.0 {
                start -= 1;
            }

            // Look for first zero crossing after clipping.
            while end < frame_size && pcm[c + pos * channels] * pcm[c + end * channels] >= 0.0 {
                // Look for other peaks until the next zero-crossing.
                if f32::abs(pcm[c + end * channels]) > maxval {
                    maxval = f32::abs(pcm[c + end * channels]);
                    peak_pos = end;
                }
                end += 1;
            }

            // Detect the special case where we clip before the first zero crossing.
            let special = start == 0 && (pcm[c + pos * channels] * pcm[c]) >= 0.0;

            // Compute a such that maxval + a * maxval^2 = 1
            a = (maxval - 1.0) / (maxval * maxval);

            // Ported for compatibility with the reference implementation:
            // Slightly boost "a" by 2^-22. This is just enough to ensure -ffast-math
            // does not cause output values larger than +/-1, but small enough not
            // to matter even for 24-bit output.
            a += a * 2.4e-7;

            if pcm[c + pos * channels] > 0.0 {
                a = -a;
            }

            // Apply soft clipping.
            (start..end).into_iter().for_each(|i| {
                let off = c + i * channels;
                pcm[off] += a * pcm[off] * pcm[off];
            });

            if special && peak_pos >= 2 {
                // Add a linear ramp from the first sample to the signal peak.
                // This avoids a discontinuity at the beginning of the frame.
                let mut offset = x0 - pcm[c];
                let delta = offset / peak_pos as f32;

                (curr..peak_pos).into_iter().for_each(|i| {
                    let off = c + i * channels;
                    offset -= delta;
                    pcm[off] += offset;
                    pcm[off] = f32::min(f32::max(pcm[off], -1.0), 1.0);
                });
            }

            curr = end;
            if curr == frame_size {
                break;
            }
        }
        softclip_mem[c] = a;
    });
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_pcm_soft_clip() {
        let mut x = [0_f32; 1024];
        let mut s = [0_f32; 8];

        (0..1024).into_iter().for_each(|i| {
            (0..1024).into_iter().for_each(|j| {
                x[j] = (j & 255) as f32 * (1.0 / 32.0) - 4.0;
            });

            pcm_soft_clip(&mut x[i..], 1, &mut s);

            (i..1024).into_iter().for_each(|j| {
                assert!(x[j] <= 1.0);
                assert!(x[j] >= -1.0);
            });
        });

        (1..9).into_iter().for_each(|i| {
            (0..1024).into_iter().for_each(|j| {
                x[j] = (j & 255) as f32 * (1.0 / 32.0) - 4.0;
            });
            pcm_soft_clip(&mut x, i, &mut s);
            (0..(1024 / i) * i).into_iter().for_each(|j| {
                assert!(x[j] <= 1.0);
                assert!(x[j] >= -1.0);
            });
        });
    }
}
