//! ElfPlus: erasure in front of a Chimp-like XOR stage.
//!
//! Per value, the erasure flag:
//! - `0`: erased, same beta* as the last erased value
//! - `11` + beta* (4 bits): erased with a new beta*
//! - `10`: not erased
//!
//! followed by the XOR of the (erased) bits with the previous (erased) bits:
//! - `00` + center: same leading zeros (capped at 7) and at least as many trailing zeros
//! - `01`: identical
//! - `10` + lead (3) + length - 1 (4) + center, for centers up to 16 bits
//! - `11` + lead (3) + length - 1 (6) + center
//!
//! The first value is written raw.
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::elf::{erase, recover};
use crate::error::Result;

const MAX_LEAD: u32 = 7;

/// Leading/trailing state of the Elf XOR stage
#[derive(Debug, Clone, Copy)]
struct XorState {
    previous: u64,
    lead: u32,
    tail: u32,
}

impl XorState {
    fn new() -> Self {
        XorState { previous: 0, lead: 0, tail: 0 }
    }

    fn write<W: Write>(&mut self, out: &mut BitWriter<W>, bits: u64) {
        let xor = bits ^ self.previous;
        let lead = xor.leading_zeros().min(MAX_LEAD);
        let tail = xor.trailing_zeros();

        if xor == 0 {
            out.write(0b01, 2);
            self.lead = MAX_LEAD;
            self.tail = 64;
        } else {
            if lead == self.lead && tail >= self.tail {
                out.write(0b00, 2);
                out.write(xor >> self.tail, 64 - self.lead - self.tail);
            } else {
                let len = 64 - lead - tail;
                if len <= 16 {
                    out.write(0b10, 2);
                    out.write(lead as u64, 3);
                    out.write(len as u64 - 1, 4);
                } else {
                    out.write(0b11, 2);
                    out.write(lead as u64, 3);
                    out.write(len as u64 - 1, 6);
                }
                out.write(xor >> tail, len);
            }
            self.lead = lead;
            self.tail = tail;
        }
        self.previous = bits;
    }

    fn read<R: Read>(&mut self, input: &mut BitReader<R>) -> Result<u64> {
        let xor = match input.read(2)? {
            0b00 => {
                let center = 64_u32.saturating_sub(self.lead + self.tail);
                let xor = input.read(center)? << self.tail;
                self.lead = xor.leading_zeros().min(MAX_LEAD);
                self.tail = xor.trailing_zeros();
                xor
            }
            0b01 => {
                self.lead = MAX_LEAD;
                self.tail = 64;
                0
            }
            code => {
                self.lead = input.read(3)? as u32;
                let len_bits = if code == 0b10 { 4 } else { 6 };
                let len = input.read(len_bits)? as u32 + 1;
                self.tail = 64_u32.saturating_sub(len + self.lead);
                input.read(len)? << self.tail
            }
        };
        self.previous ^= xor;
        Ok(self.previous)
    }
}

/// ElfPlus encoder
pub struct ElfPlusEncoder<W: Write> {
    out: BitWriter<W>,
    xor: XorState,
    previous_beta_star: u32,
    first: bool,
}

impl<W: Write> ElfPlusEncoder<W> {
    /// new encoder writing into `sink`
    pub fn new(sink: W) -> Self {
        ElfPlusEncoder { out: BitWriter::new(sink), xor: XorState::new(), previous_beta_star: 0, first: true }
    }
}

impl<W: Write> Encoder<W> for ElfPlusEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        if self.first {
            self.first = false;
            self.out.write_f64(value);
            self.xor.previous = value.to_bits();
            return self.out.track_bits();
        }

        let erased = erase(value, Some(self.previous_beta_star));
        match erased.beta_star {
            Some(b) if b == self.previous_beta_star => self.out.write_bool(false),
            Some(b) => {
                self.out.write(0b11, 2);
                self.out.write(b as u64, 4);
                self.previous_beta_star = b;
            }
            None => self.out.write(0b10, 2),
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

/// ElfPlus decoder
pub struct ElfPlusDecoder<R: Read> {
    input: BitReader<R>,
    xor: XorState,
    previous_beta_star: u32,
    first: bool,
}

impl<R: Read> ElfPlusDecoder<R> {
    /// new decoder reading from `source`
    pub fn new(source: R) -> Self {
        ElfPlusDecoder { input: BitReader::new(source), xor: XorState::new(), previous_beta_star: 0, first: true }
    }
}

impl<R: Read> Decoder for ElfPlusDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.first {
            self.first = false;
            let v = self.input.read_f64()?;
            self.xor.previous = v.to_bits();
            return Ok(v);
        }

        let erased = if !self.input.read_bool()? {
            true
        } else if self.input.read_bool()? {
            self.previous_beta_star = self.input.read(4)? as u32;
            true
        } else {
            false
        };
        let bits = self.xor.read(&mut self.input)?;
        let v = f64::from_bits(bits);
        Ok(if erased { recover(v, self.previous_beta_star) } else { v })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{check_roundtrip, decimal_walk};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decimal_walk() {
        let values = decimal_walk(5000, 1);
        let bytes = check_roundtrip(&values, ElfPlusEncoder::new(Vec::new()), ElfPlusDecoder::new);
        // far below the raw 64 bits per value
        assert!(bytes.len() * 8 < values.len() * 40, "{} bytes", bytes.len());
    }

    #[test]
    fn test_same_beta_star_is_one_bit() {
        let mut enc = ElfPlusEncoder::new(Vec::new());
        enc.encode(3.14).unwrap();
        enc.encode(3.15).unwrap();
        // identical again after erasure: flag `0` + xor `01`
        assert_eq!(enc.encode(3.15).unwrap(), 1 + 2);
    }

    #[test]
    fn test_specials() {
        let values = [
            1.5, 0.0, -0.0, f64::NAN, 2.25, f64::INFINITY, 5e-324, 1e-310, 3.3, f64::NEG_INFINITY,
            f64::from_bits(0x7ff4_0000_0000_0001), 0.1 + 0.2, 123456789.123, f64::MAX, f64::MIN_POSITIVE,
        ];
        check_roundtrip(&values, ElfPlusEncoder::new(Vec::new()), ElfPlusDecoder::new);
    }

    #[test]
    fn test_random_bits() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let values: Vec<f64> = (0..2000).map(|_| f64::from_bits(rng.gen())).collect();
        check_roundtrip(&values, ElfPlusEncoder::new(Vec::new()), ElfPlusDecoder::new);
    }
}
