//! The escape path shared by the decimal codecs.
//!
//! A value that doesn't fit the decimal model is stored as
//! `exponent delta | sign | 52 bit mantissa`, where the exponent delta
//! (relative to the previous escaped exponent) uses an adaptive width `EL`:
//!
//! - `|delta| <= 2^(EL-1) - 1`: write `delta + bias` in `EL` bits, then sign and mantissa
//! - otherwise: write `EL` one-bits, then the raw 64 bits, and widen `EL` (max 10)
//!
//! After `rho` consecutive deltas that would also have fit into `EL-1` bits, `EL` shrinks by one.
//! Encoder and decoder run the exact same bookkeeping.
use std::io::{Read, Write};
use tracing::trace;
use crate::bitstream::{BitReader, BitWriter};
use crate::error::Result;

/// default contraction threshold
pub const DEFAULT_RHO: u32 = 8;
const MAX_WIDTH: u32 = 10;
const EXP_REFERENCE: i64 = 1023;
const MANTISSA_MASK: u64 = (1 << 52) - 1;

/// biased exponent field of a double
#[inline]
pub(crate) fn exponent(bits: u64) -> i64 {
    ((bits >> 52) & 0x7ff) as i64
}

/// Adaptive exponent-delta coder. One instance per stream side.
#[derive(Debug, Clone)]
pub struct ExceptionCoder {
    previous_exp: i64,
    width: u32,
    contract_step: u32,
    rho: u32,
}

impl ExceptionCoder {
    /// fresh state, `rho` is the contraction threshold
    pub fn new(rho: u32) -> Self {
        ExceptionCoder { previous_exp: EXP_REFERENCE, width: 1, contract_step: 0, rho: rho.max(1) }
    }

    /// current width of the exponent delta field
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    fn bias(width: u32) -> i64 {
        (1_i64 << (width - 1)) - 1
    }

    /// common bookkeeping after a delta that fit
    fn fitted(&mut self, delta: i64) {
        if self.width > 1 {
            if delta.abs() <= Self::bias(self.width - 1) {
                self.contract_step += 1;
            } else {
                self.contract_step = 0;
            }
            if self.contract_step >= self.rho {
                self.width -= 1;
                self.contract_step = 0;
                trace!(width = self.width, "escape width contracted");
            }
        }
    }

    /// common bookkeeping after an overflow
    fn overflowed(&mut self) {
        self.contract_step = 0;
        if self.width < MAX_WIDTH {
            self.width += 1;
            trace!(width = self.width, "escape width expanded");
        }
    }

    /// write `value` through the escape path
    pub fn encode<W: Write>(&mut self, value: f64, out: &mut BitWriter<W>) {
        let bits = value.to_bits();
        let exp = exponent(bits);
        let delta = exp - self.previous_exp;
        let bias = Self::bias(self.width);

        if delta.abs() <= bias {
            out.write((delta + bias) as u64, self.width);
            out.write_bool(bits >> 63 == 1);
            out.write(bits & MANTISSA_MASK, 52);
            self.fitted(delta);
        } else {
            out.write(u64::MAX, self.width);
            out.write(bits, 64);
            self.overflowed();
        }
        self.previous_exp = exp;
    }

    /// read one value written by [`ExceptionCoder::encode`]
    pub fn decode<R: Read>(&mut self, input: &mut BitReader<R>) -> Result<f64> {
        let code = input.read(self.width)? as i64;
        let sentinel = (1_i64 << self.width) - 1;

        let bits = if code == sentinel {
            let bits = input.read(64)?;
            self.overflowed();
            bits
        } else {
            let delta = code - Self::bias(self.width);
            let exp = (self.previous_exp + delta) as u64 & 0x7ff;
            let sign = input.read_bool()? as u64;
            let mantissa = input.read(52)?;
            self.fitted(delta);
            (sign << 63) | (exp << 52) | mantissa
        };
        self.previous_exp = exponent(bits);
        Ok(f64::from_bits(bits))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roundtrip(values: &[f64], rho: u32) -> (Vec<f64>, u64) {
        let mut enc = ExceptionCoder::new(rho);
        let mut w = BitWriter::new(Vec::new());
        for &v in values {
            enc.encode(v, &mut w);
        }
        let bits = w.bits_written();
        let bytes = w.into_inner().unwrap();

        let mut dec = ExceptionCoder::new(rho);
        let mut r = BitReader::new(bytes.as_slice());
        let decoded = values.iter().map(|_| dec.decode(&mut r).unwrap()).collect();
        (decoded, bits)
    }

    fn bits_of(v: &[f64]) -> Vec<u64> {
        v.iter().map(|x| x.to_bits()).collect()
    }

    #[test]
    fn test_first_value_same_exponent() {
        // 1.5 has exponent 1023 -> delta 0 fits EL=1
        let (dec, bits) = roundtrip(&[1.5], 8);
        assert_eq!(bits_of(&dec), bits_of(&[1.5]));
        assert_eq!(bits, 1 + 1 + 52);
    }

    #[test]
    fn test_overflow_widens() {
        let mut enc = ExceptionCoder::new(8);
        let mut w = BitWriter::new(Vec::new());
        enc.encode(1e300, &mut w);
        assert_eq!(enc.width(), 2);
        assert_eq!(w.track_bits().unwrap(), 1 + 64);
        enc.encode(f64::NAN, &mut w);
        assert_eq!(enc.width(), 3);
    }

    #[test]
    fn test_width_capped() {
        let vals: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 1e300 } else { 1e-300 }).collect();
        let mut enc = ExceptionCoder::new(8);
        let mut w = BitWriter::new(Vec::new());
        for v in vals.iter() {
            enc.encode(*v, &mut w);
        }
        assert_eq!(enc.width(), 10);
        let (dec, _) = roundtrip(&vals, 8);
        assert_eq!(bits_of(&dec), bits_of(&vals));
    }

    #[test]
    fn test_contraction() {
        // grow to EL=3, then feed constant exponents until it shrinks back
        let mut vals = vec![1e300, 1e-300];
        vals.extend(std::iter::repeat(3.0).take(40));
        let mut enc = ExceptionCoder::new(4);
        let mut w = BitWriter::new(Vec::new());
        for v in vals.iter() {
            enc.encode(*v, &mut w);
        }
        assert_eq!(enc.width(), 1);

        let (dec, _) = roundtrip(&vals, 4);
        assert_eq!(bits_of(&dec), bits_of(&vals));
    }

    #[test]
    fn test_specials() {
        let vals = vec![
            f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.0, f64::MIN_POSITIVE,
            5e-324, f64::MAX, f64::MIN, -1.0, 1.0, f64::from_bits(0x7ff8_dead_beef_0001),
        ];
        let (dec, _) = roundtrip(&vals, 8);
        assert_eq!(bits_of(&dec), bits_of(&vals));
    }
}
