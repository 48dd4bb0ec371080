//! Custom errors.

use crate::decoder_error::DecoderError;
use crate::encoder_error::EncoderError;

/// Errors thrown by the decoder / encoder, unified behind one type for
/// callers that drive both sides through the same error-handling path
/// (e.g. the multistream and repacketizer helpers, which can hit either a
/// decoder or an encoder failure depending on the call).
#[derive(Debug)]
pub enum OpusError {
    /// Bad arguments.
    BadArguments(&'static str),
    /// Invalid packet.
    InvalidPacket,
    /// Frame size is too small for the packet.
    FrameSizeTooSmall,
    /// The buffer is too small.
    BufferToSmall,
    /// An internal error.
    InternalError(&'static str),
    /// Wraps a decoder-specific error.
    Decoder(DecoderError),
    /// Wraps an encoder-specific error.
    Encoder(EncoderError),
}

impl From<DecoderError> for OpusError {
    fn from(error: DecoderError) -> Self {
        OpusError::Decoder(error)
    }
}

impl From<EncoderError> for OpusError {
    fn from(error: EncoderError) -> Self {
        OpusError::Encoder(error)
    }
}

impl std::fmt::Display for OpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpusError::BadArguments(message) => {
                write!(f, "{}", message)
            }
            OpusError::InternalError(message) => {
                write!(f, "{}", message)
            }
            OpusError::BufferToSmall => {
                write!(f, "buffer is too small")
            }
            OpusError::FrameSizeTooSmall => {
                write!(f, "the frame size is too small for the packet")
            }
            OpusError::InvalidPacket => {
                write!(f, "invalid packet")
            }
            OpusError::Decoder(error) => write!(f, "{}", error),
            OpusError::Encoder(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for OpusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpusError::Decoder(error) => Some(error),
            OpusError::Encoder(error) => Some(error),
            _ => None,
        }
    }
}
