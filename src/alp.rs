//! ALP: adaptive lossless floating point.
//!
//! Values are cut into rows of 1024, `rows` rows (default 10) form a block.
//! A value becomes the integer `n = round(v * 10^e / 10^f)` if `n / 10^e * 10^f`
//! gives back the same bits, everything else is an exception stored raw.
//! The integers of a row are frame-of-reference packed.
//!
//! Choosing `(e, f)` takes two sampling rounds: over the block the 8 pairs that
//! fit most sampled values are kept, then every row takes the one of those that
//! fits most of its own samples.
//!
//! Row layout: length (11 bits), `e` (5), `f` (5), exception count (11),
//! per exception its index (10) and raw bits (64), packing width (7), base (64),
//! then `length` offsets of `width` bits. Exceptions take the first encodable
//! value's integer as placeholder so they don't widen the frame.
//!
//! There is no raw first value: the stream is a plain sequence of rows, each starting
//! with the row header above.
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::io::{Read, Write};
use itertools::Itertools;
use tracing::debug;
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::config::{CodecConfig, ROWS};
use crate::decimal::F64_POW10;
use crate::error::{CodecError, Result};

/// values per row
pub const ROW_LENGTH: usize = 1024;
/// default rows per block
pub const DEFAULT_ROWS: usize = 10;
const MAX_EXPONENT: u32 = 22;
const SAMPLE_ROWS: usize = 5;
const SAMPLES_PER_ROW: usize = 256;
const ROW_SAMPLES: usize = 512;
const CANDIDATES: usize = 8;

/// the `(e, f)` pair of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Exponents {
    e: u32,
    f: u32,
}

impl Exponents {
    #[inline]
    fn encode(&self, v: f64) -> i64 {
        // saturating cast, NaN becomes 0; both fail the check
        (v * F64_POW10[self.e as usize] / F64_POW10[self.f as usize]).round() as i64
    }

    #[inline]
    fn decode(&self, n: i64) -> f64 {
        n as f64 / F64_POW10[self.e as usize] * F64_POW10[self.f as usize]
    }

    /// the integer for `v`, if it comes back bit-exact
    fn try_encode(&self, v: f64) -> Option<i64> {
        let n = self.encode(v);
        (self.decode(n).to_bits() == v.to_bits()).then_some(n)
    }

    fn all() -> impl Iterator<Item = Exponents> {
        (0..=MAX_EXPONENT).flat_map(|e| (0..=e).map(move |f| Exponents { e, f }))
    }
}

/// evenly spaced sample of at most `n` items
fn sample<T>(items: &[T], n: usize) -> impl Iterator<Item = &T> {
    items.iter().step_by((items.len() / n).max(1)).take(n)
}

/// pairs fitting most values of a sample of the block, best first
fn first_sampling(rows: &[Vec<f64>]) -> Vec<Exponents> {
    sample(rows, SAMPLE_ROWS)
        .flat_map(|row| sample(row, SAMPLES_PER_ROW))
        .flat_map(|&v| Exponents::all().filter(move |x| x.try_encode(v).is_some()))
        .counts()
        .into_iter()
        .sorted_by_key(|&(x, count)| (Reverse(count), x))
        .take(CANDIDATES)
        .map(|(x, _)| x)
        .collect()
}

/// the candidate fitting most of the row's sample, first one on ties
fn second_sampling(row: &[f64], candidates: &[Exponents]) -> Exponents {
    let samples: Vec<f64> = sample(row, ROW_SAMPLES).copied().collect();
    candidates
        .iter()
        .map(|x| (samples.iter().filter(|&&v| x.try_encode(v).is_some()).count(), *x))
        .rev()
        .max_by_key(|&(count, _)| count)
        .filter(|&(count, _)| count > 0)
        .map_or(Exponents { e: 0, f: 0 }, |(_, x)| x)
}

/// ALP encoder
pub struct AlpEncoder<W: Write> {
    out: BitWriter<W>,
    rows: usize,
    block: Vec<Vec<f64>>,
}

impl<W: Write> AlpEncoder<W> {
    /// reads `rows`
    pub fn new(sink: W, config: &CodecConfig) -> Result<Self> {
        let rows = config.get_or(ROWS, DEFAULT_ROWS)?.max(1);
        Ok(AlpEncoder { out: BitWriter::new(sink), rows, block: Vec::with_capacity(rows) })
    }

    fn write_row(&mut self, row: &[f64], x: Exponents) {
        let mut exceptions = Vec::new();
        let mut encoded: Vec<Option<i64>> = Vec::with_capacity(row.len());
        for (i, &v) in row.iter().enumerate() {
            let n = x.try_encode(v);
            if n.is_none() {
                exceptions.push((i, v));
            }
            encoded.push(n);
        }
        let placeholder = encoded.iter().flatten().next().copied().unwrap_or(0);
        let encoded: Vec<i64> = encoded.into_iter().map(|n| n.unwrap_or(placeholder)).collect();

        self.out.write(row.len() as u64, 11);
        self.out.write(x.e as u64, 5);
        self.out.write(x.f as u64, 5);
        self.out.write(exceptions.len() as u64, 11);
        for &(i, v) in exceptions.iter() {
            self.out.write(i as u64, 10);
            self.out.write_f64(v);
        }

        let (base, max) = encoded.iter().minmax().into_option().map_or((0, 0), |(a, b)| (*a, *b));
        let width = 64 - (max.wrapping_sub(base) as u64).leading_zeros();
        self.out.write(width as u64, 7);
        self.out.write(base as u64, 64);
        for &n in encoded.iter() {
            self.out.write(n.wrapping_sub(base) as u64, width);
        }
    }

    fn emit_block(&mut self) {
        let block = std::mem::take(&mut self.block);
        let candidates = first_sampling(&block);
        for row in block.iter() {
            let x = second_sampling(row, &candidates);
            self.write_row(row, x);
        }
        debug!(rows = block.len(), candidates = candidates.len(), bits = self.out.bits_written(), "ALP block flushed");
    }
}

impl<W: Write> Encoder<W> for AlpEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        match self.block.last_mut() {
            Some(row) if row.len() < ROW_LENGTH => row.push(value),
            _ => {
                let mut row = Vec::with_capacity(ROW_LENGTH);
                row.push(value);
                self.block.push(row);
            }
        }
        if self.block.len() == self.rows && self.block.last().map_or(false, |r| r.len() == ROW_LENGTH) {
            self.emit_block();
        }
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn close(&mut self) -> Result<usize> {
        if !self.block.is_empty() {
            self.emit_block();
        }
        self.out.track_bits()
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// ALP decoder, decodes a whole row at a time
pub struct AlpDecoder<R: Read> {
    input: BitReader<R>,
    row: VecDeque<f64>,
}

impl<R: Read> AlpDecoder<R> {
    /// the decoder needs no settings, `config` is accepted for symmetry
    pub fn new(source: R, _config: &CodecConfig) -> Result<Self> {
        Ok(AlpDecoder { input: BitReader::new(source), row: VecDeque::with_capacity(ROW_LENGTH) })
    }

    fn read_row(&mut self) -> Result<()> {
        let len = self.input.read(11)? as usize;
        let x = Exponents { e: self.input.read(5)? as u32, f: self.input.read(5)? as u32 };
        if x.e > MAX_EXPONENT || x.f > MAX_EXPONENT {
            return Err(CodecError::MalformedTable("ALP exponent out of range"));
        }
        let exception_count = self.input.read(11)? as usize;
        let exceptions = (0..exception_count)
            .map(|_| Ok((self.input.read(10)? as usize, self.input.read_f64()?)))
            .collect::<Result<Vec<_>>>()?;
        let width = self.input.read(7)? as u32;
        let base = self.input.read(64)? as i64;

        let mut values = (0..len)
            .map(|_| Ok(x.decode((self.input.read(width.min(64))? as i64).wrapping_add(base))))
            .collect::<Result<Vec<f64>>>()?;
        for (i, v) in exceptions {
            if let Some(slot) = values.get_mut(i) {
                *slot = v;
            }
        }
        self.row = values.into();
        Ok(())
    }
}

impl<R: Read> Decoder for AlpDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.row.is_empty() {
            self.read_row()?;
        }
        Ok(self.row.pop_front().unwrap_or(0.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{check_roundtrip, decimal_walk};
    use pretty_assertions::assert_eq;

    fn roundtrip(values: &[f64], rows: usize) -> Vec<u8> {
        let c = CodecConfig::default().with(ROWS, rows);
        check_roundtrip(values, AlpEncoder::new(Vec::new(), &c).unwrap(), |r| AlpDecoder::new(r, &c).unwrap())
    }

    mod sampling {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_exponents() {
            let x = Exponents { e: 2, f: 0 };
            assert_eq!(x.try_encode(12.5), Some(1250));
            assert_eq!(x.try_encode(-0.25), Some(-25));
            assert_eq!(x.try_encode(f64::NAN), None);
            assert_eq!(x.try_encode(-0.0), None);
            assert_eq!(x.try_encode(f64::INFINITY), None);
            assert_eq!(Exponents::all().count(), 23 * 24 / 2);
        }

        #[test]
        fn test_candidates() {
            let rows = vec![vec![1.5, 2.25, 3.75, 100.0]; 3];
            let candidates = first_sampling(&rows);
            assert_eq!(candidates.len(), CANDIDATES);
            // every value fits e=2, nothing smaller fits 2.25
            assert_eq!(candidates[0], Exponents { e: 2, f: 0 });
            assert_eq!(second_sampling(&rows[0], &candidates), Exponents { e: 2, f: 0 });
        }

        #[test]
        fn test_nothing_fits() {
            let rows = vec![vec![f64::NAN, f64::INFINITY]];
            let candidates = first_sampling(&rows);
            assert!(candidates.is_empty());
            assert_eq!(second_sampling(&rows[0], &candidates), Exponents { e: 0, f: 0 });
        }
    }

    #[test]
    fn test_decimal_walk() {
        let values = decimal_walk(3 * ROW_LENGTH, 51);
        let bytes = roundtrip(&values, DEFAULT_ROWS);
        assert!(bytes.len() * 8 < values.len() * 16);
    }

    #[test]
    fn test_blocks_and_partial_rows() {
        let values = decimal_walk(2 * 2 * ROW_LENGTH + 5, 52);
        roundtrip(&values, 2);
        roundtrip(&values, 1);
    }

    #[test]
    fn test_block_cost_arrives_at_once() {
        let c = CodecConfig::default().with(ROWS, 1);
        let mut enc = AlpEncoder::new(Vec::new(), &c).unwrap();
        for i in 0..ROW_LENGTH - 1 {
            assert_eq!(enc.encode(i as f64).unwrap(), 0);
        }
        assert!(enc.encode(0.5).unwrap() > 0);
        assert_eq!(enc.encode(1.0).unwrap(), 0);
        assert!(enc.close().unwrap() > 0);
    }

    #[test]
    fn test_exceptions() {
        let mut values = decimal_walk(1500, 53);
        let specials = [f64::NAN, -0.0, f64::INFINITY, f64::NEG_INFINITY, 5e-324, f64::MAX, f64::MIN, 0.1 + 0.2, 1e300];
        for (i, s) in specials.iter().enumerate() {
            values[i * 101] = *s;
        }
        roundtrip(&values, DEFAULT_ROWS);
    }

    #[test]
    fn test_only_exceptions() {
        let values: Vec<f64> = (0..100_u64).map(|i| f64::from_bits(0x7ff8_0000_0000_0000 | i)).collect();
        roundtrip(&values, DEFAULT_ROWS);
    }

    #[test]
    fn test_wide_range() {
        // offsets need the full 64 bits
        let values = [-9.0e18, 9.0e18, 0.0, 1.0];
        roundtrip(&values, DEFAULT_ROWS);
    }
}
