//! Elf: erasure in front of the Gorilla XOR stage.
//!
//! Per value, the erasure flag:
//! - `0`: not erased
//! - `1` + beta* (4 bits): erased, rebuilt with [`recover`]
//!
//! followed by the Gorilla XOR of the (erased) bits with the previous (erased) bits.
//! The first value is written raw.
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::elf::{erase, recover};
use crate::error::Result;
use crate::gorilla::GorillaXor;

/// Elf encoder
pub struct ElfEncoder<W: Write> {
    out: BitWriter<W>,
    xor: GorillaXor,
    first: bool,
}

impl<W: Write> ElfEncoder<W> {
    /// new encoder writing into `sink`
    pub fn new(sink: W) -> Self {
        ElfEncoder { out: BitWriter::new(sink), xor: GorillaXor::new(), first: true }
    }
}

impl<W: Write> Encoder<W> for ElfEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        if self.first {
            self.first = false;
            self.out.write_f64(value);
            self.xor.previous = value.to_bits();
            return self.out.track_bits();
        }

        let erased = erase(value, None);
        match erased.beta_star {
            Some(b) => {
                self.out.write_bool(true);
                self.out.write(b as u64, 4);
            }
            None => self.out.write_bool(false),
        }
        self.xor.write(&mut self.out, erased.bits);
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// Elf decoder
pub struct ElfDecoder<R: Read> {
    input: BitReader<R>,
    xor: GorillaXor,
    first: bool,
}

impl<R: Read> ElfDecoder<R> {
    /// new decoder reading from `source`
    pub fn new(source: R) -> Self {
        ElfDecoder { input: BitReader::new(source), xor: GorillaXor::new(), first: true }
    }
}

impl<R: Read> Decoder for ElfDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.first {
            self.first = false;
            let v = self.input.read_f64()?;
            self.xor.previous = v.to_bits();
            return Ok(v);
        }

        let beta_star = if self.input.read_bool()? { Some(self.input.read(4)? as u32) } else { None };
        let v = f64::from_bits(self.xor.read(&mut self.input)?);
        Ok(match beta_star {
            Some(b) => recover(v, b),
            None => v,
        })
    }
}
