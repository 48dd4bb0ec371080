//! Opus packet framing: splitting a packet into its encapsulated frames,
//! and the reverse operation, repacketization (spec §4.8).

use crate::toc::{query_packet_samples_per_frame, FrameCode, Toc};
use crate::{DecoderError, SamplingRate};

/// Parses an Opus packet into one or more frames.
///
/// Returns the number of frames inside the packet.
///
/// `decode()` performs this operation internally so most applications do
/// not need to call this directly.
///
/// This function does not copy the frames, it returns the offsets to the
/// frames inside the packet.
///
/// # Arguments
/// * `packet`         - Opus packet to be parsed.
/// * `self_delimited` - True if the packet has self delimited framing.
/// * `frames`         - Returns the encapsulated frame offsets.
/// * `sizes`          - Returns the sizes of the encapsulated frames.
/// * `payload_offset` - Returns the position of the payload within the packet (in bytes).
/// * `packet_offset`  - Returns the position of the next packet (in bytes) in
///                      multi channel packets.
pub fn parse_packet(
    packet: &[u8],
    self_delimited: bool,
    mut frames: Option<&mut [usize; 48]>,
    sizes: &mut [usize; 48],
    payload_offset: Option<&mut usize>,
    packet_offset: Option<&mut usize>,
) -> Result<usize, DecoderError> {
    if packet.is_empty() {
        return Err(DecoderError::PacketTooShort);
    }

    let framesize = query_packet_samples_per_frame(packet, SamplingRate::Hz48000);
    let mut offset = 1;
    let mut len = packet.len() - offset;
    let mut last_size = len;
    let mut cbr = false;
    let mut pad = 0;
    let count: usize;

    match Toc::parse(packet[0]).code {
        FrameCode::One => {
            count = 1;
        }
        FrameCode::TwoEqual => {
            count = 2;
            cbr = true;

            if !self_delimited {
                if len & 0x1 == 1 {
                    return Err(DecoderError::InvalidPacket);
                }
                last_size = len / 2;
                // If last_size doesn't fit in size[0], we'll catch it later.
                sizes[0] = last_size;
            }
        }
        FrameCode::TwoDifferent => {
            count = 2;
            let bytes = parse_size(&packet[offset..], &mut sizes[0])?;
            len -= bytes;
            if sizes[0] > len {
                return Err(DecoderError::InvalidPacket);
            }
            offset += bytes;
            last_size = len - sizes[0];
        }
        FrameCode::Arbitrary => {
            // Multiple CBR/VBR frames (from 0 to 120 ms).
            if len < 1 {
                return Err(DecoderError::InvalidPacket);
            }
            // Number of frames encoded in bits 0 to 5.
            let ch = usize::from(packet[offset]);
            offset += 1;

            count = ch & 0x3F;
            if count == 0 || framesize * count > 5760 {
                return Err(DecoderError::InvalidFrameCount);
            }
            len -= 1;

            // Padding flag is bit 6.
            if ch & 0x40 != 0x0 {
                let mut p = 255;
                while p == 255 {
                    if offset >= packet.len() {
                        return Err(DecoderError::InvalidPacket);
                    }
                    p = usize::from(packet[offset]);
                    offset += 1;
                    len -= 1;

                    let tmp = if p == 255 { 254 } else { p };
                    len -= tmp;
                    pad += tmp;
                }
            }

            // VBR flag is bit 7.
            cbr = ch & 0x80 == 0;
            if !cbr {
                // VBR case
                last_size = len;
                for i in 0..count - 1 {
                    let bytes = parse_size(&packet[offset..], &mut sizes[i])?;
                    len -= bytes;
                    if sizes[i] > len {
                        return Err(DecoderError::InvalidPacket);
                    }
                    offset += bytes;
                    last_size -= bytes + sizes[i];
                }
            } else if !self_delimited {
                // CBR case.
                last_size = len / count;
                if last_size * count != len {
                    return Err(DecoderError::InvalidPacket);
                }
                for i in 0..count - 1 {
                    sizes[i] = last_size;
                }
            }
        }
    }

    // Self-delimited framing has an extra size for the last frame.
    if self_delimited {
        let bytes = parse_size(&packet[offset..], &mut sizes[count - 1])?;
        len -= bytes;
        if sizes[count - 1] > len {
            return Err(DecoderError::InvalidPacket);
        }
        offset += bytes;
        // For CBR packets, apply the size to all the frames.
        if cbr {
            if sizes[count - 1] * count > len {
                return Err(DecoderError::InvalidPacket);
            }
            for i in 0..count - 1 {
                sizes[i] = sizes[count - 1];
            }
        } else if bytes + sizes[count - 1] > last_size {
            return Err(DecoderError::InvalidPacket);
        }
    } else {
        // Because it's not encoded explicitly, it's possible the size of the
        // last packet (or all the packets, for the CBR case) is larger than
        // 1275. Reject them here.
        if last_size > 1275 {
            return Err(DecoderError::PacketTooLarge);
        }
        sizes[count - 1] = last_size;
    }

    if let Some(payload_offset) = payload_offset {
        *payload_offset = offset;
    }

    for i in 0..count {
        if let Some(frames) = &mut frames {
            frames[i] = offset;
        }
        offset += sizes[i];
    }

    if let Some(packet_offset) = packet_offset {
        *packet_offset = pad + offset;
    }

    Ok(count)
}

pub(crate) fn parse_size(data: &[u8], size: &mut usize) -> Result<usize, DecoderError> {
    if data.is_empty() {
        Err(DecoderError::InvalidPacket)
    } else if data[0] < 252 {
        *size = data[0] as usize;
        Ok(1)
    } else if data.len() < 2 {
        Err(DecoderError::InvalidPacket)
    } else {
        *size = 4 * usize::from(data[1]) + usize::from(data[0]);
        Ok(2)
    }
}

/// Maximum number of bytes a single encoded Opus frame can occupy.
const MAX_FRAME_BYTES: usize = 1275;

/// Reassembles independently encoded Opus packets into combined packets
/// with an arbitrary (code 3) frame count, without touching the compressed
/// data itself.
///
/// Frames can only be merged when their TOC bytes agree on mode, bandwidth,
/// and frame length — merging frames with different configurations would
/// produce a packet no decoder could parse. A cap at 120 ms of total audio
/// mirrors the limit `parse_packet` enforces on the way back out.
#[derive(Clone, Debug, Default)]
pub struct Repacketizer {
    toc: Option<u8>,
    frames: Vec<Vec<u8>>,
    total_samples: usize,
}

impl Repacketizer {
    /// Creates an empty repacketizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards any frames accumulated so far.
    pub fn reset(&mut self) {
        self.toc = None;
        self.frames.clear();
        self.total_samples = 0;
    }

    /// Number of frames currently queued.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Feeds one packet's frames into the repacketizer.
    ///
    /// Rejects the packet if its configuration (mode/bandwidth/frame
    /// length) does not match frames already queued, or if adding it
    /// would exceed 120 ms of total audio.
    pub fn cat(&mut self, packet: &[u8]) -> Result<(), DecoderError> {
        if packet.is_empty() {
            return Err(DecoderError::PacketTooShort);
        }

        match self.toc {
            Some(toc) if (toc & 0xF8) != (packet[0] & 0xF8) => {
                return Err(DecoderError::InvalidPacket);
            }
            _ => self.toc = Some(packet[0] & 0xFC),
        }

        let mut frame_offsets = [0usize; 48];
        let mut sizes = [0usize; 48];
        let mut payload_offset = 0;
        let count = parse_packet(
            packet,
            false,
            Some(&mut frame_offsets),
            &mut sizes,
            Some(&mut payload_offset),
            None,
        )?;

        let samples_per_frame = query_packet_samples_per_frame(packet, SamplingRate::Hz48000);
        let added_samples = samples_per_frame * count;
        if (self.total_samples + added_samples) * 25 > (SamplingRate::Hz48000 as usize) * 3 {
            return Err(DecoderError::InvalidFrameCount);
        }

        for i in 0..count {
            let start = frame_offsets[i];
            self.frames.push(packet[start..start + sizes[i]].to_vec());
        }
        self.total_samples += added_samples;

        Ok(())
    }

    /// Emits the queued frames as one combined packet using the code-3
    /// (arbitrary frame count) framing, writing into `out`.
    ///
    /// Returns the number of bytes written. Frames retain their original
    /// (possibly unequal) lengths, so the VBR flag is always set.
    pub fn out(&self, out: &mut [u8]) -> Result<usize, DecoderError> {
        let Some(toc) = self.toc else {
            return Err(DecoderError::InvalidPacket);
        };
        if self.frames.is_empty() || self.frames.len() > 48 {
            return Err(DecoderError::InvalidFrameCount);
        }
        for frame in &self.frames {
            if frame.len() > MAX_FRAME_BYTES {
                return Err(DecoderError::PacketTooLarge);
            }
        }

        let mut offset = 0;
        let mut push = |byte: u8| -> Result<(), DecoderError> {
            *out.get_mut(offset).ok_or(DecoderError::BufferTooSmall)? = byte;
            offset += 1;
            Ok(())
        };

        if self.frames.len() == 1 {
            push(toc)?;
            let frame = &self.frames[0];
            out.get_mut(offset..offset + frame.len())
                .ok_or(DecoderError::BufferTooSmall)?
                .copy_from_slice(frame);
            return Ok(offset + frame.len());
        }

        push(toc | 0x3)?;
        push((self.frames.len() as u8) | 0x80)?;
        for frame in &self.frames[..self.frames.len() - 1] {
            write_frame_size(frame.len(), &mut push)?;
        }
        for frame in &self.frames {
            out.get_mut(offset..offset + frame.len())
                .ok_or(DecoderError::BufferTooSmall)?
                .copy_from_slice(frame);
            offset += frame.len();
        }

        Ok(offset)
    }
}

fn write_frame_size(
    size: usize,
    push: &mut impl FnMut(u8) -> Result<(), DecoderError>,
) -> Result<(), DecoderError> {
    if size < 252 {
        push(size as u8)
    } else {
        let rem = size - 252;
        push(252 + (rem & 0x3) as u8)?;
        push((rem >> 2) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PACKET_SINGLE: &[u8] = &[
        0x80, 0xDA, 0x84, 0xE8, 0x87, 0x77, 0x83, 0xD6, 0x48, 0xB3, 0x6B, 0x45,
    ];
    const TEST_PACKET_CBR: &[u8] = &[
        0x81, 0xDA, 0x84, 0xE8, 0x87, 0x77, 0x83, 0xD6, 0x48, 0xB3, 0x6B,
    ];
    const TEST_PACKET_VBR: &[u8] = &[
        0x82, 0x4, 0xDA, 0x84, 0xE8, 0x87, 0x77, 0x83, 0xD6, 0x48, 0xB3, 0x6B,
    ];
    const TEST_PACKET_INVALID: &[u8] = &[0x81, 0xDA];

    #[test]
    fn test_parse_packet_with_single_frame() {
        let mut frames = [0; 48];
        let mut sizes = [0; 48];
        let mut payload_offset = 0;
        let mut packet_offset = 0;

        let count = parse_packet(
            TEST_PACKET_SINGLE,
            false,
            Some(&mut frames),
            &mut sizes,
            Some(&mut payload_offset),
            Some(&mut packet_offset),
        )
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(frames[0], 1);
        assert_eq!(sizes[0], 11);
        assert_eq!(payload_offset, 1);
        assert_eq!(packet_offset, 12);
    }

    #[test]
    fn test_parse_packet_with_two_cbr_frames() {
        let mut frames = [0; 48];
        let mut sizes = [0; 48];
        let mut payload_offset = 0;
        let mut packet_offset = 0;

        let count = parse_packet(
            TEST_PACKET_CBR,
            false,
            Some(&mut frames),
            &mut sizes,
            Some(&mut payload_offset),
            Some(&mut packet_offset),
        )
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(frames[0], 1);
        assert_eq!(sizes[0], 5);
        assert_eq!(frames[1], 6);
        assert_eq!(sizes[1], 5);
        assert_eq!(payload_offset, 1);
        assert_eq!(packet_offset, 11);
    }

    #[test]
    fn test_parse_packet_with_two_vbr_frames() {
        let mut frames = [0; 48];
        let mut sizes = [0; 48];
        let mut payload_offset = 0;
        let mut packet_offset = 0;

        let count = parse_packet(
            TEST_PACKET_VBR,
            false,
            Some(&mut frames),
            &mut sizes,
            Some(&mut payload_offset),
            Some(&mut packet_offset),
        )
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(frames[0], 2);
        assert_eq!(sizes[0], 4);
        assert_eq!(frames[1], 6);
        assert_eq!(sizes[1], 6);
        assert_eq!(payload_offset, 2);
        assert_eq!(packet_offset, 12);
    }

    #[test]
    fn test_parse_packet_invalid_frame() {
        let mut frames = [0; 48];
        let mut sizes = [0; 48];

        assert!(parse_packet(
            TEST_PACKET_INVALID,
            false,
            Some(&mut frames),
            &mut sizes,
            None,
            None,
        )
        .is_err())
    }

    #[test]
    fn test_repacketizer_merges_matching_frames() {
        let mut r = Repacketizer::new();
        r.cat(TEST_PACKET_SINGLE).unwrap();
        r.cat(TEST_PACKET_SINGLE).unwrap();
        assert_eq!(r.frame_count(), 2);

        let mut out = [0u8; 64];
        let written = r.out(&mut out).unwrap();

        let mut frames = [0; 48];
        let mut sizes = [0; 48];
        let count = parse_packet(&out[..written], false, Some(&mut frames), &mut sizes, None, None).unwrap();
        assert_eq!(count, 2);
        assert_eq!(sizes[0], 11);
        assert_eq!(sizes[1], 11);
    }

    /// Property 8 (spec §8): TOC mismatch is rejected.
    #[test]
    fn test_repacketizer_rejects_toc_mismatch() {
        let mut r = Repacketizer::new();
        r.cat(TEST_PACKET_SINGLE).unwrap();
        // A CELT wideband packet: different config nibble than the CELT
        // fullband TEST_PACKET_SINGLE (config bits differ).
        let other = [0x20u8, 0xAA, 0xBB];
        assert!(r.cat(&other).is_err());
    }

    /// Property 9 (spec §8): combined duration is capped at 120 ms.
    #[test]
    fn test_repacketizer_rejects_duration_overflow() {
        let mut r = Repacketizer::new();
        // TEST_PACKET_SINGLE is a 2.5 ms CELT narrowband frame (120 samples
        // at 48 kHz); 48 of them exactly fill the 120 ms / 5760-sample cap.
        for _ in 0..48 {
            r.cat(TEST_PACKET_SINGLE).unwrap();
        }
        assert!(r.cat(TEST_PACKET_SINGLE).is_err());
    }
}
