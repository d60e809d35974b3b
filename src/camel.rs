//! Camel: the integer and the fractional part of a value are coded separately.
//!
//! Integer part (`floor(v)`), as a difference to the previous one:
//! `00`/`01`/`10` for -1/0/+1, otherwise `11` + sign + a `>= 8` flag + magnitude in 16 or 3 bits.
//! The unused difference "minus zero" (`11 0 0 000`) announces an escaped value.
//!
//! Fractional part `d = v - floor(v)` with `l` decimal places (1..=4):
//! - `l - 1` in 2 bits
//! - if `d >= 2^-l`: flag `1` and the top `l` mantissa bits of `(1 + d) ^ (1 + m)`, where `m = d mod 2^-l`;
//!   otherwise flag `0` and `m = d`
//! - `round(m * 10^l)` in a width depending on `l`
//!
//! The encoder replays the decoder and takes the smallest `l` that gives back the exact
//! bit pattern; values with no such `l` (or `|v| >= 2^52`) go through the escape coder.
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::config::{CodecConfig, RHO};
use crate::error::Result;
use crate::exception::{ExceptionCoder, DEFAULT_RHO};

const POW10: [u64; 5] = [1, 10, 100, 1000, 10000];
const INV_POW2: [f64; 5] = [1.0, 0.5, 0.25, 0.125, 0.0625];
const MAX_DIFF: u64 = (1 << 16) - 1;
const INTEGER_LIMIT: f64 = 4503599627370496.0; // 2^52

/// `floor(v)` if it is small enough to be an exact integer offset
fn integer_part(v: f64) -> Option<i64> {
    (v.is_finite() && v.abs() < INTEGER_LIMIT).then(|| v.floor() as i64)
}

/// widths of `round(m * 10^l)`, per 2 bit selector (`l` = 3 and 4)
fn selector_widths(l: u32) -> [u32; 4] {
    match l {
        3 => [1, 3, 5, 7],
        _ => [4, 6, 8, 10],
    }
}

/// everything the decimal part writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fraction {
    l: u32,
    /// top `l` mantissa bits of the xor, if the flag is set
    center: Option<u64>,
    scaled: u64,
}

impl Fraction {
    /// the candidate for `d` with `l` places (not checked yet)
    fn with_places(d: f64, l: u32) -> Self {
        let step = INV_POW2[l as usize];
        let (center, m) = if d >= step {
            let m = d - step * (d / step).floor();
            let xor = (1.0 + d).to_bits() ^ (1.0 + m).to_bits();
            (Some(xor >> (52 - l) & ((1 << l) - 1)), m)
        } else {
            (None, d)
        };
        let scaled = (m * POW10[l as usize] as f64).round() as u64;
        Fraction { l, center, scaled }
    }

    /// the decoder's view
    fn value(&self) -> f64 {
        let m = self.scaled as f64 / POW10[self.l as usize] as f64;
        match self.center {
            Some(c) => f64::from_bits((c << (52 - self.l)) ^ (1.0 + m).to_bits()) - 1.0,
            None => m,
        }
    }

    fn fits(&self) -> bool {
        let max = match self.l {
            1 => 7,
            2 => 31,
            3 => 127,
            _ => 1023,
        };
        self.scaled <= max
    }

    fn write<W: Write>(&self, out: &mut BitWriter<W>) {
        out.write(self.l as u64 - 1, 2);
        out.write_bool(self.center.is_some());
        if let Some(c) = self.center {
            out.write(c, self.l);
        }
        match self.l {
            1 => out.write(self.scaled, 3),
            2 => {
                let wide = self.scaled >= 8;
                out.write_bool(wide);
                out.write(self.scaled, if wide { 5 } else { 3 });
            }
            l => {
                let widths = selector_widths(l);
                let selector = widths.iter().position(|&w| self.scaled < 1 << w).unwrap_or(3);
                out.write(selector as u64, 2);
                out.write(self.scaled, widths[selector]);
            }
        }
    }

    fn read<R: Read>(input: &mut BitReader<R>) -> Result<Self> {
        let l = input.read(2)? as u32 + 1;
        let center = if input.read_bool()? { Some(input.read(l)?) } else { None };
        let scaled = match l {
            1 => input.read(3)?,
            2 => {
                let wide = input.read_bool()?;
                input.read(if wide { 5 } else { 3 })?
            }
            l => {
                let selector = input.read(2)? as usize;
                input.read(selector_widths(l)[selector])?
            }
        };
        Ok(Fraction { l, center, scaled })
    }
}

/// Camel encoder
pub struct CamelEncoder<W: Write> {
    out: BitWriter<W>,
    previous_integer: i64,
    first: bool,
    exceptions: ExceptionCoder,
}

impl<W: Write> CamelEncoder<W> {
    /// `rho` is the only setting
    pub fn new(sink: W, config: &CodecConfig) -> Result<Self> {
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(CamelEncoder { out: BitWriter::new(sink), previous_integer: 0, first: true, exceptions: ExceptionCoder::new(rho) })
    }

    /// integer part and the fraction that reproduces `v` exactly
    fn split(v: f64) -> Option<(i64, Fraction)> {
        let integer = integer_part(v)?;
        let d = v - integer as f64;
        (1..=4)
            .map(|l| Fraction::with_places(d, l))
            .find(|f| f.fits() && (integer as f64 + f.value()).to_bits() == v.to_bits())
            .map(|f| (integer, f))
    }

    /// the difference must be within [`MAX_DIFF`]
    fn write_integer(&mut self, integer: i64) {
        let diff = integer.wrapping_sub(self.previous_integer);
        if (-1..=1).contains(&diff) {
            self.out.write((diff + 1) as u64, 2);
            return;
        }
        let magnitude = diff.unsigned_abs();
        self.out.write(0b11, 2);
        self.out.write_bool(diff >= 0);
        let wide = magnitude >= 8;
        self.out.write_bool(wide);
        self.out.write(magnitude, if wide { 16 } else { 3 });
    }
}

impl<W: Write> Encoder<W> for CamelEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        if self.first {
            self.first = false;
            self.out.write_f64(value);
            self.previous_integer = integer_part(value).unwrap_or(0);
            return self.out.track_bits();
        }

        let split = Self::split(value).filter(|(integer, _)| {
            integer.wrapping_sub(self.previous_integer).unsigned_abs() <= MAX_DIFF
        });
        match split {
            Some((integer, fraction)) => {
                self.write_integer(integer);
                fraction.write(&mut self.out);
                self.previous_integer = integer;
            }
            None => {
                // "minus zero" difference
                self.out.write(0b11_0_0_000, 7);
                self.exceptions.encode(value, &mut self.out);
            }
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

/// Camel decoder
pub struct CamelDecoder<R: Read> {
    input: BitReader<R>,
    previous_integer: i64,
    first: bool,
    exceptions: ExceptionCoder,
}

impl<R: Read> CamelDecoder<R> {
    /// same configuration as the encoder
    pub fn new(source: R, config: &CodecConfig) -> Result<Self> {
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(CamelDecoder { input: BitReader::new(source), previous_integer: 0, first: true, exceptions: ExceptionCoder::new(rho) })
    }

    /// the integer part, `None` for the escape code
    fn read_integer(&mut self) -> Result<Option<i64>> {
        let code = self.input.read(2)?;
        if code < 3 {
            return Ok(Some(self.previous_integer + code as i64 - 1));
        }
        let positive = self.input.read_bool()?;
        let wide = self.input.read_bool()?;
        let magnitude = self.input.read(if wide { 16 } else { 3 })? as i64;
        if !positive && !wide && magnitude == 0 {
            return Ok(None);
        }
        let diff = if positive { magnitude } else { -magnitude };
        Ok(Some(self.previous_integer.wrapping_add(diff)))
    }
}

impl<R: Read> Decoder for CamelDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.first {
            self.first = false;
            let value = self.input.read_f64()?;
            self.previous_integer = integer_part(value).unwrap_or(0);
            return Ok(value);
        }
        match self.read_integer()? {
            Some(integer) => {
                let fraction = Fraction::read(&mut self.input)?;
                self.previous_integer = integer;
                Ok(integer as f64 + fraction.value())
            }
            None => self.exceptions.decode(&mut self.input),
        }
    }
}
