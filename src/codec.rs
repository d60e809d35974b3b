//! The encoder/decoder contract and the algorithm registry.
//!
//! Every codec is a pair of state machines around a [`BitWriter`]/[`BitReader`].
//! [`Algorithm`] lists all of them; [`Algorithm::encoder`]/[`Algorithm::decoder`]
//! build a boxed instance over any sink/source, [`open_encoder`]/[`open_decoder`]
//! over a file.
//!
//! # Example
//! ```rust
//! # use decxor::codec::Algorithm;
//! # use decxor::config::CodecConfig;
//! let config = CodecConfig::default();
//! let mut enc = Algorithm::Chimp.encoder(Vec::new(), &config).unwrap();
//! for v in [1.0, 1.5, 1.5, f64::NAN] {
//!     enc.encode(v).unwrap();
//! }
//! enc.close().unwrap();
//! let bytes = enc.into_inner().unwrap();
//!
//! let mut dec = Algorithm::Chimp.decoder(std::io::Cursor::new(bytes), &config).unwrap();
//! assert_eq!(dec.decode_next().unwrap(), 1.0);
//! assert_eq!(dec.decode_next().unwrap(), 1.5);
//! ```
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;
use crate::alp::{AlpDecoder, AlpEncoder};
use crate::bdexor::{BDeXorDecoder, BDeXorEncoder};
use crate::bitstream::BitWriter;
use crate::camel::{CamelDecoder, CamelEncoder};
use crate::chimp::{ChimpDecoder, ChimpEncoder};
use crate::chimp128::{Chimp128Decoder, Chimp128Encoder};
use crate::config::CodecConfig;
use crate::dexor::{CaseCodes, DeXorDecoder, DeXorEncoder};
use crate::dpf::{DpfDecoder, DpfEncoder};
use crate::elf_gorilla::{ElfDecoder, ElfEncoder};
use crate::elf_plus::{ElfPlusDecoder, ElfPlusEncoder};
use crate::elf_star::{ElfStarDecoder, ElfStarEncoder, SElfStarDecoder, SElfStarEncoder};
use crate::error::{CodecError, Result};
use crate::gorilla::{GorillaDecoder, GorillaEncoder};

/// Compresses one value at a time into a bit stream.
pub trait Encoder<W: Write> {
    /// Encode the next value, returns the bits it cost. Windowed codecs
    /// return 0 while buffering and the whole window's cost when it is emitted.
    fn encode(&mut self, value: f64) -> Result<usize>;

    /// the underlying stream
    fn stream(&mut self) -> &mut BitWriter<W>;

    /// Emit whatever is still buffered and return its cost.
    /// Values of an unfinished window are lost without this.
    fn close(&mut self) -> Result<usize> {
        self.stream().track_bits()
    }

    /// Pad to a byte boundary and push all bytes to the sink. Call once, at the end.
    fn flush(&mut self) -> Result<()> {
        self.stream().flush()
    }

    /// bits produced so far (without padding)
    fn bits_written(&mut self) -> u64 {
        self.stream().bits_written()
    }

    /// flush and hand back the sink (does *not* [`Encoder::close`])
    fn into_inner(self: Box<Self>) -> Result<W>;
}

/// Reconstructs values from a bit stream, one per call.
///
/// There is no end marker: decoding more values than were encoded yields garbage.
pub trait Decoder {
    /// decode the next value
    fn decode_next(&mut self) -> Result<f64>;
}

/// All codecs of the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    /// XOR with the previous value, reusable leading/trailing window
    Gorilla,
    /// XOR with the previous value, 3 bit leading zeros
    Chimp,
    /// Chimp with a 128 value lookback
    Chimp128,
    /// erasure + Gorilla XOR
    Elf,
    /// erasure + Elf XOR
    ElfPlus,
    /// erasure, Huffman coded beta* and optimised zero-run positions per window
    ElfStar,
    /// streaming ElfStar, codes learned from the previous window
    SElfStar,
    /// integer and decimal part coded separately
    Camel,
    /// decimal prefix/residual coding, ATDP case codes
    Atdp,
    /// decimal prefix/residual coding
    DeXor,
    /// alias of the native DeXOR strategy
    Dxor,
    /// DeXOR with Huffman coded scale and delta per batch
    BDeXor,
    /// adaptive lossless floating point (decimal to integer + FFOR)
    Alp,
    /// decimal prefix forest per batch
    Dpf,
}

impl Algorithm {
    /// every algorithm, in a fixed order
    pub const ALL: [Algorithm; 14] = [
        Algorithm::Gorilla, Algorithm::Chimp, Algorithm::Chimp128, Algorithm::Elf, Algorithm::ElfPlus,
        Algorithm::ElfStar, Algorithm::SElfStar, Algorithm::Camel, Algorithm::Atdp,
        Algorithm::DeXor, Algorithm::Dxor, Algorithm::BDeXor, Algorithm::Alp, Algorithm::Dpf,
    ];

    /// display name
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Gorilla => "Gorilla",
            Algorithm::Chimp => "Chimp",
            Algorithm::Chimp128 => "Chimp128",
            Algorithm::Elf => "Elf",
            Algorithm::ElfPlus => "ElfPlus",
            Algorithm::ElfStar => "ElfStar",
            Algorithm::SElfStar => "SElfStar",
            Algorithm::Camel => "Camel",
            Algorithm::Atdp => "ATDP",
            Algorithm::DeXor => "DeXOR",
            Algorithm::Dxor => "DXOR",
            Algorithm::BDeXor => "BDeXOR",
            Algorithm::Alp => "ALP",
            Algorithm::Dpf => "DPF",
        }
    }

    /// Build an encoder writing into `sink`.
    /// Fails only if the configuration has an unparsable value.
    pub fn encoder<W: Write + 'static>(self, sink: W, config: &CodecConfig) -> Result<Box<dyn Encoder<W>>> {
        let enc: Box<dyn Encoder<W>> = match self {
            Algorithm::Gorilla => Box::new(GorillaEncoder::new(sink)),
            Algorithm::Chimp => Box::new(ChimpEncoder::new(sink)),
            Algorithm::Chimp128 => Box::new(Chimp128Encoder::new(sink)),
            Algorithm::Elf => Box::new(ElfEncoder::new(sink)),
            Algorithm::ElfPlus => Box::new(ElfPlusEncoder::new(sink)),
            Algorithm::ElfStar => Box::new(ElfStarEncoder::new(sink, config)?),
            Algorithm::SElfStar => Box::new(SElfStarEncoder::new(sink, config)?),
            Algorithm::Camel => Box::new(CamelEncoder::new(sink, config)?),
            Algorithm::Atdp => Box::new(DeXorEncoder::native(sink, CaseCodes::ATDP, config)?),
            Algorithm::DeXor => Box::new(DeXorEncoder::new(sink, config)?),
            Algorithm::Dxor => Box::new(DeXorEncoder::native(sink, CaseCodes::DEXOR, config)?),
            Algorithm::BDeXor => Box::new(BDeXorEncoder::new(sink, config)?),
            Algorithm::Alp => Box::new(AlpEncoder::new(sink, config)?),
            Algorithm::Dpf => Box::new(DpfEncoder::new(sink, config)?),
        };
        Ok(enc)
    }

    /// Build a decoder reading from `source`; `config` must match the encoder's.
    pub fn decoder<R: Read + 'static>(self, source: R, config: &CodecConfig) -> Result<Box<dyn Decoder>> {
        let dec: Box<dyn Decoder> = match self {
            Algorithm::Gorilla => Box::new(GorillaDecoder::new(source)),
            Algorithm::Chimp => Box::new(ChimpDecoder::new(source)),
            Algorithm::Chimp128 => Box::new(Chimp128Decoder::new(source)),
            Algorithm::Elf => Box::new(ElfDecoder::new(source)),
            Algorithm::ElfPlus => Box::new(ElfPlusDecoder::new(source)),
            Algorithm::ElfStar => Box::new(ElfStarDecoder::new(source, config)?),
            Algorithm::SElfStar => Box::new(SElfStarDecoder::new(source, config)?),
            Algorithm::Camel => Box::new(CamelDecoder::new(source, config)?),
            Algorithm::Atdp => Box::new(DeXorDecoder::native(source, CaseCodes::ATDP, config)?),
            Algorithm::DeXor => Box::new(DeXorDecoder::new(source, config)?),
            Algorithm::Dxor => Box::new(DeXorDecoder::native(source, CaseCodes::DEXOR, config)?),
            Algorithm::BDeXor => Box::new(BDeXorDecoder::new(source, config)?),
            Algorithm::Alp => Box::new(AlpDecoder::new(source, config)?),
            Algorithm::Dpf => Box::new(DpfDecoder::new(source, config)?),
        };
        Ok(dec)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = CodecError;
    /// case insensitive
    fn from_str(s: &str) -> Result<Self> {
        Algorithm::ALL
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| CodecError::UnknownAlgorithm(s.to_string()))
    }
}

/// Encoder writing to a (new or truncated) file. `config` uses the `"{k:v,...}"` syntax.
pub fn open_encoder(algorithm: Algorithm, path: impl AsRef<Path>, config: &str) -> Result<Box<dyn Encoder<File>>> {
    let file = File::create(path)?;
    algorithm.encoder(file, &CodecConfig::parse(config))
}

/// Decoder reading from a file written by [`open_encoder`] with the same config.
pub fn open_decoder(algorithm: Algorithm, path: impl AsRef<Path>, config: &str) -> Result<Box<dyn Decoder>> {
    let file = File::open(path)?;
    algorithm.decoder(file, &CodecConfig::parse(config))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_roundtrip() {
        for a in Algorithm::ALL {
            assert_eq!(a.name().parse::<Algorithm>().unwrap(), a);
            assert_eq!(a.to_string().to_lowercase().parse::<Algorithm>().unwrap(), a);
        }
        assert_eq!("elf".parse::<Algorithm>().unwrap(), Algorithm::Elf);
        assert!(matches!("Elf2".parse::<Algorithm>(), Err(CodecError::UnknownAlgorithm(_))));
    }

    #[test]
    fn test_bad_config_is_fatal() {
        let config = CodecConfig::parse("{rho:x}");
        assert!(Algorithm::DeXor.encoder(Vec::new(), &config).is_err());
        assert!(Algorithm::DeXor.decoder(std::io::Cursor::new(Vec::new()), &config).is_err());
        // Gorilla doesn't care
        assert!(Algorithm::Gorilla.encoder(Vec::new(), &config).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let res = open_decoder(Algorithm::Chimp, dir.path().join("nope.bin"), "");
        assert!(matches!(res, Err(CodecError::Io(_))));
    }
}
