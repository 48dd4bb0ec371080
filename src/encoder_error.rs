//! Encoder errors.

/// Errors thrown by the encoder.
///
/// Every variant here is one of the closed set of encoder-side failures: the
/// config errors are raised only by `Encoder::new` and the `set_*` control
/// setters, never mid-`encode()`. The encoder never fails on valid audio
/// input — numerically dangerous inputs are regularized instead of
/// rejected — so there is no "bad sample" variant.
#[derive(Debug)]
pub enum EncoderError {
    /// `sample_rate` is not one of 8000, 12000, 16000, 24000 or 48000 Hz.
    InvalidSampleRate,
    /// `channels` is neither 1 (mono) nor 2 (stereo).
    InvalidChannels,
    /// The requested application is not one of voip, audio or low-delay.
    InvalidApplication,
    /// The requested bandwidth is not a recognized `Bandwidth` value.
    InvalidBandwidth,
    /// The requested frame size does not correspond to a legal Opus frame
    /// duration (2.5/5/10/20/40/60/80/100/120 ms) for the active mode.
    InvalidFrameSize,
    /// `bitrate` is outside `6000..=510000 * channels`.
    InvalidBitrate,
    /// `complexity` is outside `0..=10`.
    InvalidComplexity,
    /// `packet_loss_perc` is outside `0..=100`.
    InvalidPacketLoss,
    /// `force_channels` is not one of auto, mono or stereo.
    InvalidForceChannels,
    /// The signal hint is not one of auto, voice or music.
    InvalidSignal,
    /// `lsb_depth` is outside `8..=24`.
    InvalidLsbDepth,
    /// The output buffer is too small to hold the encoded packet.
    BufferToSmall,
    /// An internal encoder error.
    InternalError(&'static str),
}

impl std::fmt::Display for EncoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderError::InvalidSampleRate => write!(f, "invalid sample rate"),
            EncoderError::InvalidChannels => write!(f, "invalid channel count"),
            EncoderError::InvalidApplication => write!(f, "invalid application"),
            EncoderError::InvalidBandwidth => write!(f, "invalid bandwidth"),
            EncoderError::InvalidFrameSize => write!(f, "invalid frame size"),
            EncoderError::InvalidBitrate => write!(f, "invalid bitrate"),
            EncoderError::InvalidComplexity => write!(f, "invalid complexity"),
            EncoderError::InvalidPacketLoss => write!(f, "invalid packet loss percentage"),
            EncoderError::InvalidForceChannels => write!(f, "invalid force-channels value"),
            EncoderError::InvalidSignal => write!(f, "invalid signal hint"),
            EncoderError::InvalidLsbDepth => write!(f, "invalid LSB depth"),
            EncoderError::BufferToSmall => write!(f, "output buffer is too small"),
            EncoderError::InternalError(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for EncoderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
