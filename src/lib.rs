//! # jscale
//!
//! A minimal-dependency JPEG decoding library with decoder-side scaling.
//!
//! The decoder reconstructs each 8x8 DCT coefficient block directly into
//! an NxN pixel block (N = 1..=8) using a size-specific integer inverse
//! DCT, so a thumbnail-sized image comes out of the decode loop itself
//! rather than from a separate resampling pass. The integer kernels match
//! the IJG reference implementation (jidctint.c) bit for bit.
//!
//! ## Features
//!
//! - **Zero runtime dependencies**
//! - **Baseline JPEG decoding** (grayscale, YCbCr color, CMYK as-is)
//! - **Scaled reconstruction** at 1/8 .. 8/8 of the encoded resolution
//! - Truncated streams decode to whatever was recoverable
//!
//! ## Example
//!
//! ```rust,no_run
//! use jscale::decode_scaled;
//!
//! let data = std::fs::read("photo.jpg").unwrap();
//! // Decode at half resolution: every 8x8 block becomes a 4x4 block.
//! let image = decode_scaled(&data, 4).unwrap();
//! assert!(!image.pixels.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod color;
pub mod decode;
pub mod error;

pub use color::ColorType;
pub use decode::{decode, decode_config, decode_scaled, idct, JpegConfig, JpegImage};
pub use error::{Error, Result};
