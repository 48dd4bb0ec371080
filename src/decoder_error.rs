//! Decoder errors.

/// Errors thrown by the decoder.
///
/// The packet-parsing variants reject the packet outright; the caller may
/// then drive PLC for the implied frame duration. `RangeCoderCorrupt` is
/// raised *during* a frame and is handled identically to packet loss:
/// already-decoded samples are kept, the remainder comes from PLC, and the
/// next packet is decoded normally (spec §7).
#[derive(Debug)]
pub enum DecoderError {
    /// `sample_rate` is not one of 8000, 12000, 16000, 24000 or 48000 Hz.
    InvalidSampleRate,
    /// `channels` is neither 1 (mono) nor 2 (stereo).
    InvalidChannels,
    /// The packet is shorter than the minimum 1-byte TOC.
    PacketTooShort,
    /// The packet (or an implied frame within it) exceeds 1275 bytes.
    PacketTooLarge,
    /// The packet failed a framing invariant (bad length prefix, frame
    /// count, or code-3 padding).
    InvalidPacket,
    /// A code-3 packet's frame count is zero, exceeds 48, or would exceed
    /// 120 ms of total audio.
    InvalidFrameCount,
    /// The caller-provided output buffer cannot hold the decoded samples.
    BufferTooSmall,
    /// The range coder's `update()` saw `fl >= fh`, or a renormalization
    /// invariant broke. Equivalent to packet loss for the current frame.
    RangeCoderCorrupt,
    /// An internal decoder error.
    InternalError(&'static str),
}

impl std::fmt::Display for DecoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderError::InvalidSampleRate => write!(f, "invalid sample rate"),
            DecoderError::InvalidChannels => write!(f, "invalid channel count"),
            DecoderError::PacketTooShort => write!(f, "packet is too short"),
            DecoderError::PacketTooLarge => write!(f, "packet is too large"),
            DecoderError::InvalidPacket => write!(f, "invalid packet"),
            DecoderError::InvalidFrameCount => write!(f, "invalid frame count"),
            DecoderError::BufferTooSmall => write!(f, "output buffer is too small"),
            DecoderError::RangeCoderCorrupt => write!(f, "range coder state is corrupt"),
            DecoderError::InternalError(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for DecoderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
