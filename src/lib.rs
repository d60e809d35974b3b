//! Lossless compression of `f64` streams.
//!
//! A collection of streaming codecs for time series of doubles, all built on the same
//! [`bitstream::BitWriter`]/[`bitstream::BitReader`] pair and the same
//! [`codec::Encoder`]/[`codec::Decoder`] contract:
//!
//! - XOR family: [Gorilla](gorilla), [Chimp](chimp), [Chimp128](chimp128)
//! - Elf family (erase the low mantissa bits a decimal doesn't need, then XOR):
//!   [Elf](elf_gorilla), [ElfPlus](elf_plus), [ElfStar and SElfStar](elf_star)
//! - decimal family (model a value as `digits * 10^q` and share leading digits):
//!   [DeXOR, DXOR, ATDP](dexor), [BDeXOR](bdexor), [Camel](camel), [DPF](dpf)
//! - [ALP](alp): decimal to integer, frame-of-reference packed
//!
//! Every codec is bit-exact, NaN payloads and `-0.0` included. Values that don't fit
//! a codec's model take an escape path ([`exception`]) instead of being rounded.
//!
//! # Example
//! ```rust
//! use decxor::{Algorithm, CodecConfig};
//! let values = vec![21.5, 21.25, 21.25, 21.75, f64::NAN, 22.0];
//! let config = CodecConfig::parse("{rho:8}");
//!
//! for algorithm in Algorithm::ALL {
//!     let mut enc = algorithm.encoder(Vec::new(), &config).unwrap();
//!     let mut bits = 0;
//!     for &v in values.iter() {
//!         bits += enc.encode(v).unwrap();
//!     }
//!     bits += enc.close().unwrap();
//!     let bytes = enc.into_inner().unwrap();
//!     assert_eq!(bytes.len(), (bits + 7) / 8);
//!
//!     let mut dec = algorithm.decoder(std::io::Cursor::new(bytes), &config).unwrap();
//!     for &v in values.iter() {
//!         assert_eq!(dec.decode_next().unwrap().to_bits(), v.to_bits());
//!     }
//! }
//! ```
//!
//! # Streams
//! There is no header and no end marker; the decoder must be told how many values to read
//! and must be built with the same configuration as the encoder.
//! Windowed codecs (ElfStar, BDeXOR, DPF, ALP) only write when a window is full:
//! [`codec::Encoder::close`] must be called before [`codec::Encoder::into_inner`].
#![deny(missing_docs)]
use bitvec::prelude as bv;

pub mod alp;
pub mod bdexor;
pub mod bitstream;
pub mod camel;
pub mod chimp;
pub mod chimp128;
pub mod codec;
pub mod config;
pub mod decimal;
pub mod dexor;
pub mod dpf;
pub mod elf;
pub mod elf_gorilla;
pub mod elf_plus;
pub mod elf_star;
pub mod error;
pub mod exception;
pub mod gorilla;
pub mod harness;
pub mod huffman;
pub mod post_office;
#[cfg(test)]
mod testutil;

// Msb0 so that `store_be`/`load_be` on a slice put the most significant bit first in the stream
pub(crate) type MyBitVector = bv::BitVec<u8, bv::Msb0>;

pub use codec::{Algorithm, Decoder, Encoder};
pub use config::CodecConfig;
pub use error::{CodecError, Result};
