//! JPEG decoding: entropy decode, scaled inverse DCT, color conversion.

pub mod bit_reader;
pub mod idct;
pub mod jpeg;

pub use idct::idct;
pub use jpeg::{decode, decode_config, decode_scaled, JpegConfig, JpegImage};
