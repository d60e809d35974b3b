//! Gorilla value compression (Pelkonen et al., VLDB 2015).
//!
//! `xor` against the previous value, then
//! - `0`: same value
//! - `10` + center: the nonzero bits fit the previous leading/trailing window
//! - `11` + leading zeros (5 bits, capped at 31) + center length - 1 (6 bits) + center
//!
//! The first value goes out raw.
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::error::Result;

const MAX_LEAD: u32 = 31;

/// The XOR stage on its own: previous bits and the last leading/trailing window
#[derive(Debug, Clone, Copy)]
pub(crate) struct GorillaXor {
    pub(crate) previous: u64,
    lead: u32,
    tail: u32,
}

impl GorillaXor {
    pub(crate) fn new() -> Self {
        GorillaXor { previous: 0, lead: 64, tail: 64 }
    }

    pub(crate) fn write<W: Write>(&mut self, out: &mut BitWriter<W>, bits: u64) {
        let xor = bits ^ self.previous;
        if xor == 0 {
            out.write_bool(false);
        } else {
            let lead = xor.leading_zeros().min(MAX_LEAD);
            let tail = xor.trailing_zeros();
            if lead >= self.lead && tail >= self.tail {
                out.write(0b10, 2);
                out.write(xor >> self.tail, 64 - self.lead - self.tail);
            } else {
                let center = 64 - lead - tail;
                out.write(0b11, 2);
                out.write(lead as u64, 5);
                out.write(center as u64 - 1, 6);
                out.write(xor >> tail, center);
                self.lead = lead;
                self.tail = tail;
            }
        }
        self.previous = bits;
    }

    pub(crate) fn read<R: Read>(&mut self, input: &mut BitReader<R>) -> Result<u64> {
        if input.read_bool()? {
            if input.read_bool()? {
                self.lead = input.read(5)? as u32;
                let center = input.read(6)? as u32 + 1;
                self.tail = 64_u32.saturating_sub(self.lead + center);
            }
            let center = 64_u32.saturating_sub(self.lead + self.tail);
            self.previous ^= input.read(center)? << self.tail;
        }
        Ok(self.previous)
    }
}

/// Gorilla encoder
pub struct GorillaEncoder<W: Write> {
    out: BitWriter<W>,
    xor: GorillaXor,
    first: bool,
}

impl<W: Write> GorillaEncoder<W> {
    /// new encoder writing into `sink`
    pub fn new(sink: W) -> Self {
        GorillaEncoder { out: BitWriter::new(sink), xor: GorillaXor::new(), first: true }
    }
}

impl<W: Write> Encoder<W> for GorillaEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        let bits = value.to_bits();
        if self.first {
            self.first = false;
            self.out.write(bits, 64);
            self.xor.previous = bits;
        } else {
            self.xor.write(&mut self.out, bits);
        }
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// Gorilla decoder
pub struct GorillaDecoder<R: Read> {
    input: BitReader<R>,
    xor: GorillaXor,
    first: bool,
}

impl<R: Read> GorillaDecoder<R> {
    /// new decoder reading from `source`
    pub fn new(source: R) -> Self {
        GorillaDecoder { input: BitReader::new(source), xor: GorillaXor::new(), first: true }
    }
}

impl<R: Read> Decoder for GorillaDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        let bits = if self.first {
            self.first = false;
            self.xor.previous = self.input.read(64)?;
            self.xor.previous
        } else {
            self.xor.read(&mut self.input)?
        };
        Ok(f64::from_bits(bits))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roundtrip(values: &[f64]) -> (Vec<u64>, u64) {
        let mut enc = Box::new(GorillaEncoder::new(Vec::new()));
        for &v in values {
            enc.encode(v).unwrap();
        }
        let bits = enc.bits_written();
        let bytes = enc.into_inner().unwrap();
        let mut dec = GorillaDecoder::new(bytes.as_slice());
        let out = values.iter().map(|_| dec.decode_next().unwrap().to_bits()).collect();
        (out, bits)
    }

    #[test]
    fn test_costs() {
        let mut enc = GorillaEncoder::new(Vec::new());
        assert_eq!(enc.encode(12.0).unwrap(), 64);
        assert_eq!(enc.encode(12.0).unwrap(), 1);
        // 12 -> 24: only the exponent's lowest bit flips: 1 bit center
        assert_eq!(enc.encode(24.0).unwrap(), 2 + 5 + 6 + 1);
        // 24 -> 12: same single bit, reuses the window
        assert_eq!(enc.encode(12.0).unwrap(), 2 + 1);
    }

    #[test]
    fn test_roundtrip() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.1).sin() * 100.0).collect();
        let (out, _) = roundtrip(&values);
        assert_eq!(out, values.iter().map(|v| v.to_bits()).collect::<Vec<_>>());
    }

    #[test]
    fn test_specials() {
        let values = [0.0, -0.0, f64::NAN, f64::INFINITY, 1.0, f64::NEG_INFINITY, 5e-324, f64::MAX, 0.0];
        let (out, _) = roundtrip(&values);
        assert_eq!(out, values.iter().map(|v| v.to_bits()).collect::<Vec<_>>());
    }

    #[test]
    fn test_long_lead_is_capped() {
        // xor with 40 leading zeros
        let a = f64::from_bits(0x4000_0000_0000_0000);
        let b = f64::from_bits(0x4000_0000_00F0_0000);
        let (out, _) = roundtrip(&[a, b, a]);
        assert_eq!(out, vec![a.to_bits(), b.to_bits(), a.to_bits()]);
    }
}
