//! Implements the SILK codec (spec §4.2/§4.3).

#[cfg(feature = "decoder")]
pub(crate) use decoder::{LostFlag, SilkDecoder};
#[cfg(feature = "encoder")]
pub(crate) use encoder::SilkEncoder;

#[cfg(feature = "decoder")]
mod decoder;
#[cfg(feature = "encoder")]
mod encoder;
mod excitation;
mod lsf;
mod ltp;
mod resampler;
pub(crate) mod tables;
