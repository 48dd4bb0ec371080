//! Multistream Opus: packing several independently coded Opus streams
//! (mono or coupled stereo pairs) into one packet, per the channel
//! mapping families of RFC 7845.

use crate::framing::parse_packet;
use crate::{Channels, Decoder, DecoderConfiguration, DecoderError, Sample, SamplingRate};

/// Value in a channel mapping table meaning "this output channel is
/// silent" rather than sourced from any stream.
pub const SILENT_CHANNEL: u8 = 255;

/// A channel mapping family, as defined by RFC 7845 §5.1.1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChannelMappingFamily {
    /// Mono or stereo, mapping table implicit (0 -> left/mono, 1 -> right).
    Family0,
    /// Up to 8 channels, Vorbis channel order.
    Family1,
    /// Ambisonics, un-normalized (ACN channel order, SN3D normalization).
    Family2,
    /// Ambisonics with a non-diagonal mixing/projection matrix applied.
    Family3,
}

/// Describes how output channels are assembled from decoded streams.
#[derive(Clone, Debug)]
pub struct ChannelMapping {
    /// Total number of output channels.
    pub channel_count: usize,
    /// Number of streams coded.
    pub stream_count: usize,
    /// Of `stream_count` streams, how many are coupled (decode to stereo).
    pub coupled_count: usize,
    /// For each output channel, which decoded channel it is sourced from
    /// (`0..2*coupled_count` for coupled streams, followed by
    /// `2*coupled_count..2*coupled_count+(stream_count-coupled_count)` for
    /// mono streams), or `SILENT_CHANNEL`.
    pub mapping: Vec<u8>,
}

impl ChannelMapping {
    /// The canonical mapping for family 0: 1 channel (mono, one stream) or
    /// 2 channels (stereo, one coupled stream).
    pub fn family0(channels: Channels) -> Self {
        match channels {
            Channels::Mono => ChannelMapping {
                channel_count: 1,
                stream_count: 1,
                coupled_count: 0,
                mapping: vec![0],
            },
            Channels::Stereo => ChannelMapping {
                channel_count: 2,
                stream_count: 1,
                coupled_count: 1,
                mapping: vec![0, 1],
            },
        }
    }

    /// Validates a caller-supplied mapping (families 1-3): the mapping
    /// table's entries must address only valid decoded channels or the
    /// silent-channel sentinel, and stream/coupled counts must be
    /// consistent.
    pub fn new(
        channel_count: usize,
        stream_count: usize,
        coupled_count: usize,
        mapping: Vec<u8>,
    ) -> Result<Self, DecoderError> {
        if coupled_count > stream_count || stream_count == 0 || stream_count > 255 {
            return Err(DecoderError::InvalidChannels);
        }
        if mapping.len() != channel_count {
            return Err(DecoderError::InvalidChannels);
        }
        let decoded_channels = coupled_count * 2 + (stream_count - coupled_count);
        for &entry in &mapping {
            if entry != SILENT_CHANNEL && entry as usize >= decoded_channels {
                return Err(DecoderError::InvalidChannels);
            }
        }
        Ok(ChannelMapping {
            channel_count,
            stream_count,
            coupled_count,
            mapping,
        })
    }
}

/// A decoder for multistream Opus packets: demultiplexes the self-delimited
/// sub-packets, decodes each with its own single-stream `Decoder`, and
/// interleaves their output according to a `ChannelMapping`.
#[derive(Debug)]
pub struct MultistreamDecoder {
    decoders: Vec<Decoder>,
    mapping: ChannelMapping,
    sampling_rate: SamplingRate,
}

impl MultistreamDecoder {
    /// Creates a multistream decoder for `mapping`, allocating one
    /// single-stream `Decoder` per coded stream (mono for the uncoupled
    /// streams, stereo for the coupled ones).
    pub fn new(
        sampling_rate: SamplingRate,
        mapping: ChannelMapping,
    ) -> Result<Self, DecoderError> {
        let mut decoders = Vec::with_capacity(mapping.stream_count);
        for i in 0..mapping.stream_count {
            let channels = if i < mapping.coupled_count {
                Channels::Stereo
            } else {
                Channels::Mono
            };
            decoders.push(Decoder::new(&DecoderConfiguration {
                sampling_rate,
                channels,
                gain: 0,
            })?);
        }
        Ok(Self {
            decoders,
            mapping,
            sampling_rate,
        })
    }

    /// Number of output channels this decoder produces.
    pub fn channels(&self) -> usize {
        self.mapping.channel_count
    }

    /// Decodes one multistream packet into interleaved PCM.
    ///
    /// `samples` must hold at least `frame_size * mapping.channel_count`
    /// entries. Sub-packets beyond the first are self-delimited (each
    /// carries its own trailing length), per RFC 7845 §6.
    pub fn decode<S: Sample + Copy + Default>(
        &mut self,
        packet: Option<&[u8]>,
        samples: &mut [S],
        frame_size: usize,
    ) -> Result<u32, DecoderError> {
        let channel_count = self.mapping.channel_count;
        if samples.len() < frame_size * channel_count {
            return Err(DecoderError::BufferTooSmall);
        }

        let decoded_channels =
            self.mapping.coupled_count * 2 + (self.mapping.stream_count - self.mapping.coupled_count);
        let mut scratch = vec![S::default(); frame_size * decoded_channels];
        let mut decoded_offset = 0;

        let mut rest = packet;
        for (i, decoder) in self.decoders.iter_mut().enumerate() {
            let self_delimited = i + 1 < self.decoders.len();
            let channels = if i < self.mapping.coupled_count { 2 } else { 1 };

            let sub_packet = match rest {
                None => None,
                Some(data) => {
                    if self_delimited {
                        let mut frames = [0usize; 48];
                        let mut sizes = [0usize; 48];
                        let mut packet_offset = 0;
                        parse_packet(
                            data,
                            true,
                            Some(&mut frames),
                            &mut sizes,
                            None,
                            Some(&mut packet_offset),
                        )?;
                        let (head, tail) = data.split_at(packet_offset);
                        rest = Some(tail);
                        Some(head)
                    } else {
                        rest = None;
                        Some(data)
                    }
                }
            };

            decoder.decode(
                sub_packet,
                &mut scratch[decoded_offset..decoded_offset + frame_size * channels],
                frame_size,
                false,
            )?;
            decoded_offset += frame_size * channels;
        }

        for (out_ch, &src) in self.mapping.mapping.iter().enumerate() {
            for frame in 0..frame_size {
                samples[frame * channel_count + out_ch] = if src == SILENT_CHANNEL {
                    S::default()
                } else {
                    scratch[frame * decoded_channels + src as usize]
                };
            }
        }

        Ok((frame_size * channel_count) as u32)
    }

    /// Resets every underlying single-stream decoder.
    pub fn reset(&mut self) -> Result<(), DecoderError> {
        for decoder in &mut self.decoders {
            decoder.reset()?;
        }
        Ok(())
    }

    /// Sampling rate this multistream decoder was created with.
    pub fn sampling_rate(&self) -> SamplingRate {
        self.sampling_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family0_mono_mapping() {
        let mapping = ChannelMapping::family0(Channels::Mono);
        assert_eq!(mapping.channel_count, 1);
        assert_eq!(mapping.stream_count, 1);
        assert_eq!(mapping.coupled_count, 0);
        assert_eq!(mapping.mapping, vec![0]);
    }

    #[test]
    fn test_family0_stereo_mapping() {
        let mapping = ChannelMapping::family0(Channels::Stereo);
        assert_eq!(mapping.channel_count, 2);
        assert_eq!(mapping.stream_count, 1);
        assert_eq!(mapping.coupled_count, 1);
        assert_eq!(mapping.mapping, vec![0, 1]);
    }

    #[test]
    fn test_custom_mapping_rejects_out_of_range_entry() {
        // 1 stream, 0 coupled -> only decoded channel 0 exists.
        assert!(ChannelMapping::new(1, 1, 0, vec![1]).is_err());
    }

    #[test]
    fn test_custom_mapping_allows_silent_channel() {
        let mapping = ChannelMapping::new(2, 1, 0, vec![0, SILENT_CHANNEL]).unwrap();
        assert_eq!(mapping.mapping[1], SILENT_CHANNEL);
    }

    #[test]
    fn test_custom_mapping_rejects_coupled_exceeding_streams() {
        assert!(ChannelMapping::new(2, 1, 2, vec![0, 1]).is_err());
    }
}
