//! The Opus packet Table-Of-Contents (TOC) byte.
//!
//! Every Opus packet starts with one TOC byte `CCCCCSCC`: a 5-bit
//! configuration, a stereo flag, and a 2-bit frame code (spec §3, §6).

use crate::{Bandwidth, Channels, CodecMode, DecoderError, SamplingRate};

/// One of the 32 `(mode, bandwidth, frame length)` triples a TOC
/// configuration selects (spec §6's table).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Configuration {
    /// Codec mode (SILK / Hybrid / CELT).
    pub mode: CodecMode,
    /// Audio bandwidth.
    pub bandwidth: Bandwidth,
    /// Frame duration, in units of 1/400th of a second (2.5 ms). E.g. `4`
    /// means 10 ms, `8` means 20 ms.
    pub frame_duration_400ths: u32,
}

/// The 32-entry configuration table from spec §6.
const CONFIGURATION_TABLE: [Configuration; 32] = {
    const fn c(mode: CodecMode, bandwidth: Bandwidth, frame_duration_400ths: u32) -> Configuration {
        Configuration {
            mode,
            bandwidth,
            frame_duration_400ths,
        }
    }
    use Bandwidth::*;
    use CodecMode::*;
    [
        // 0..=3: SILK NB, {10,20,40,60} ms
        c(Silk, Narrowband, 4),
        c(Silk, Narrowband, 8),
        c(Silk, Narrowband, 16),
        c(Silk, Narrowband, 24),
        // 4..=7: SILK MB
        c(Silk, Mediumband, 4),
        c(Silk, Mediumband, 8),
        c(Silk, Mediumband, 16),
        c(Silk, Mediumband, 24),
        // 8..=11: SILK WB
        c(Silk, Wideband, 4),
        c(Silk, Wideband, 8),
        c(Silk, Wideband, 16),
        c(Silk, Wideband, 24),
        // 12..=13: Hybrid SWB {10,20}
        c(Hybrid, Superwideband, 4),
        c(Hybrid, Superwideband, 8),
        // 14..=15: Hybrid FB {10,20}
        c(Hybrid, Fullband, 4),
        c(Hybrid, Fullband, 8),
        // 16..=19: CELT NB {2.5,5,10,20}
        c(Celt, Narrowband, 1),
        c(Celt, Narrowband, 2),
        c(Celt, Narrowband, 4),
        c(Celt, Narrowband, 8),
        // 20..=23: CELT WB
        c(Celt, Wideband, 1),
        c(Celt, Wideband, 2),
        c(Celt, Wideband, 4),
        c(Celt, Wideband, 8),
        // 24..=27: CELT SWB
        c(Celt, Superwideband, 1),
        c(Celt, Superwideband, 2),
        c(Celt, Superwideband, 4),
        c(Celt, Superwideband, 8),
        // 28..=31: CELT FB
        c(Celt, Fullband, 1),
        c(Celt, Fullband, 2),
        c(Celt, Fullband, 4),
        c(Celt, Fullband, 8),
    ]
};

/// The packet's 2-bit frame code: how many frames it contains and how they
/// are length-prefixed (spec §3, §4.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameCode {
    /// A single frame.
    One,
    /// Two frames of equal, implicit size.
    TwoEqual,
    /// Two frames; the first is explicitly length-prefixed.
    TwoDifferent,
    /// An arbitrary number of frames (1 to 48), with a frame-count byte.
    Arbitrary,
}

impl From<u8> for FrameCode {
    fn from(code: u8) -> Self {
        match code & 0x3 {
            0 => FrameCode::One,
            1 => FrameCode::TwoEqual,
            2 => FrameCode::TwoDifferent,
            _ => FrameCode::Arbitrary,
        }
    }
}

/// A parsed TOC byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Toc {
    /// The 5-bit configuration index (0..=31).
    pub config: u8,
    /// Whether the packet carries stereo frames.
    pub stereo: bool,
    /// The frame code.
    pub code: FrameCode,
}

impl Toc {
    /// Parses a TOC byte.
    pub fn parse(byte: u8) -> Self {
        Toc {
            config: (byte & 0xF8) >> 3,
            stereo: byte & 0x4 != 0,
            code: FrameCode::from(byte),
        }
    }

    /// Encodes this TOC back into a byte.
    pub fn to_byte(self) -> u8 {
        let code = match self.code {
            FrameCode::One => 0,
            FrameCode::TwoEqual => 1,
            FrameCode::TwoDifferent => 2,
            FrameCode::Arbitrary => 3,
        };
        (self.config << 3) | (u8::from(self.stereo) << 2) | code
    }

    /// Returns this TOC's `(mode, bandwidth, frame length)` triple.
    pub fn configuration(self) -> Configuration {
        CONFIGURATION_TABLE[self.config as usize]
    }

    /// Returns the number of channels this TOC declares.
    pub fn channels(self) -> Channels {
        if self.stereo {
            Channels::Stereo
        } else {
            Channels::Mono
        }
    }
}

/// Returns the bandwidth of an Opus packet.
pub fn query_packet_bandwidth(packet: &[u8]) -> Bandwidth {
    debug_assert!(!packet.is_empty());
    Toc::parse(packet[0]).configuration().bandwidth
}

/// Returns the number of channels declared by an Opus packet's TOC.
pub fn query_packet_channel_count(packet: &[u8]) -> Channels {
    debug_assert!(!packet.is_empty());
    Toc::parse(packet[0]).channels()
}

/// Returns the number of frames in an Opus packet.
pub fn query_packet_frame_count(packet: &[u8]) -> Result<usize, DecoderError> {
    debug_assert!(!packet.is_empty());
    match FrameCode::from(packet[0]) {
        FrameCode::One => Ok(1),
        FrameCode::TwoEqual | FrameCode::TwoDifferent => Ok(2),
        FrameCode::Arbitrary => {
            if packet.len() < 2 {
                Err(DecoderError::InvalidPacket)
            } else {
                Ok((packet[1] & 0x3F) as usize)
            }
        }
    }
}

/// Returns the number of samples per frame (at `sampling_rate`) from an
/// Opus packet's TOC.
pub fn query_packet_samples_per_frame(packet: &[u8], sampling_rate: SamplingRate) -> usize {
    let configuration = Toc::parse(packet[0]).configuration();
    (sampling_rate as usize * configuration.frame_duration_400ths as usize) / 400
}

/// Returns the codec mode of an Opus packet.
pub fn query_packet_codec_mode(packet: &[u8]) -> CodecMode {
    Toc::parse(packet[0]).configuration().mode
}

/// Finds the 5-bit configuration index whose `(mode, bandwidth, frame
/// duration)` triple matches exactly, the encoder's reverse lookup into
/// the table `Toc::configuration` reads forward.
pub(crate) fn configuration_to_index(
    mode: CodecMode,
    bandwidth: Bandwidth,
    frame_duration_400ths: u32,
) -> Option<u8> {
    CONFIGURATION_TABLE
        .iter()
        .position(|c| c.mode == mode && c.bandwidth == bandwidth && c.frame_duration_400ths == frame_duration_400ths)
        .map(|i| i as u8)
}

/// Returns the number of samples encoded in an Opus packet.
///
/// Packet must have at least a size of 1. Rejects packets that would imply
/// more than 120 ms of audio.
pub fn query_packet_sample_count(
    packet: &[u8],
    sampling_rate: SamplingRate,
) -> Result<usize, DecoderError> {
    let count = query_packet_frame_count(packet)?;
    let samples = count * query_packet_samples_per_frame(packet, sampling_rate);
    if samples * 25 > sampling_rate as usize * 3 {
        Err(DecoderError::InvalidPacket)
    } else {
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Property 2 (spec §8): `config -> (mode, bw, frame_len) -> config` is
    /// an identity — there are no aliased or unreachable configurations.
    #[test]
    fn test_configuration_table_is_bijective() {
        let mut seen = std::collections::HashSet::new();
        for config in 0..32u8 {
            let triple = CONFIGURATION_TABLE[config as usize];
            assert!(
                seen.insert((triple.mode, triple.bandwidth, triple.frame_duration_400ths)),
                "config {} duplicates an earlier triple",
                config
            );
        }
        assert_eq!(seen.len(), 32);
    }

    #[test]
    fn test_toc_round_trip() {
        for config in 0..32u8 {
            for stereo in [false, true] {
                for code in [
                    FrameCode::One,
                    FrameCode::TwoEqual,
                    FrameCode::TwoDifferent,
                    FrameCode::Arbitrary,
                ] {
                    let toc = Toc {
                        config,
                        stereo,
                        code,
                    };
                    let byte = toc.to_byte();
                    assert_eq!(Toc::parse(byte), toc);
                }
            }
        }
    }

    /// S1 from spec §8: TOC `0x48` is config 9 (SILK WB, 20 ms), mono, code 0.
    #[test]
    fn test_scenario_s1_toc() {
        let toc = Toc::parse(0x48);
        assert_eq!(toc.config, 9);
        assert!(!toc.stereo);
        assert!(matches!(toc.code, FrameCode::One));
        let configuration = toc.configuration();
        assert_eq!(configuration.mode, CodecMode::Silk);
        assert_eq!(configuration.bandwidth, Bandwidth::Wideband);
        assert_eq!(
            query_packet_samples_per_frame(&[0x48], SamplingRate::Hz48000),
            960 // 20 ms @ 48 kHz
        );
    }
}
