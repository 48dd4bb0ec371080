#[cfg(feature = "decoder")]
pub(crate) use decoder::CeltDecoder;
#[cfg(feature = "encoder")]
pub(crate) use encoder::CeltEncoder;

pub(crate) mod bit_allocation;
mod comb_filter;
#[cfg(feature = "decoder")]
mod decoder;
#[cfg(feature = "encoder")]
mod encoder;
mod kiss_fft;
mod mdct;
mod mode;
pub(crate) mod pvq;
pub(crate) mod tables;
