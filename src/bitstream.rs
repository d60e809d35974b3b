//! Bit-level writer/reader on top of any `Write`/`Read` (usually a file).
//!
//! Values of 1-64 bits are appended MSB first, i.e. the byte stream looks
//! exactly like a classic big-endian bit packer would produce it.
//! Internally we keep a small `BitVec<u8, Msb0>` and move whole bytes to the
//! sink every once in a while; the last partial byte is zero-padded on [`BitWriter::flush`].
//!
//! The reader never fails on a short stream: once the source is exhausted it
//! hands out zero bits. Codecs know from their own protocol when to stop.
//!
//! # Example
//! ```rust
//! # use decxor::bitstream::{BitWriter, BitReader};
//! let mut w = BitWriter::new(Vec::new());
//! w.write(0b101, 3);
//! w.write_bool(true);
//! w.write(u64::MAX, 64);
//! let bytes = w.into_inner().unwrap();
//! assert_eq!(bytes.len(), 9); // 68 bits, padded
//!
//! let mut r = BitReader::new(bytes.as_slice());
//! assert_eq!(r.read(3).unwrap(), 0b101);
//! assert!(r.read_bool().unwrap());
//! assert_eq!(r.read(64).unwrap(), u64::MAX);
//! ```
use std::io::{ErrorKind, Read, Write};
use bitvec::field::BitField;
use crate::error::Result;
use crate::MyBitVector;

/// move completed bytes out once the buffer is this large (bits)
const SPILL_BITS: usize = 1 << 16;
/// bytes pulled from the source per refill
const REFILL_BYTES: usize = 4096;

/// Appends arbitrary width integers to a byte sink.
pub struct BitWriter<W: Write> {
    sink: W,
    buffer: MyBitVector,
    /// bits written since the last [`BitWriter::track_bits`]
    delta_bits: usize,
    /// bits written over the lifetime of the writer (no padding)
    total_bits: u64,
}

impl<W: Write> BitWriter<W> {
    /// new writer owning the sink
    pub fn new(sink: W) -> Self {
        BitWriter { sink, buffer: MyBitVector::with_capacity(SPILL_BITS + 64), delta_bits: 0, total_bits: 0 }
    }

    /// Append the lowest `width` bits of `value`, most significant first.
    /// `width == 0` is a no-op; higher bits of `value` are ignored.
    pub fn write(&mut self, value: u64, width: u32) {
        debug_assert!(width <= 64);
        if width == 0 {
            return;
        }
        let start = self.buffer.len();
        self.buffer.resize(start + width as usize, false);
        // store_be chops off the higher bits
        self.buffer[start..].store_be::<u64>(value);
        self.delta_bits += width as usize;
        self.total_bits += width as u64;
    }

    /// append a single bit
    pub fn write_bool(&mut self, bit: bool) {
        self.buffer.push(bit);
        self.delta_bits += 1;
        self.total_bits += 1;
    }

    /// the raw 64 bit pattern of a double
    pub fn write_f64(&mut self, value: f64) {
        self.write(value.to_bits(), 64);
    }

    /// Number of bits written since the previous call (per value cost accounting).
    /// Also the spot where full bytes get handed to the sink.
    pub fn track_bits(&mut self) -> Result<usize> {
        if self.buffer.len() >= SPILL_BITS {
            self.spill()?;
        }
        let d = self.delta_bits;
        self.delta_bits = 0;
        Ok(d)
    }

    /// total bits written so far, without padding
    pub fn bits_written(&self) -> u64 {
        self.total_bits
    }

    /// hand all completed bytes to the sink, keep the partial one
    fn spill(&mut self) -> Result<()> {
        let full_bytes = self.buffer.len() / 8;
        if full_bytes == 0 {
            return Ok(());
        }
        self.sink.write_all(&self.buffer.as_raw_slice()[..full_bytes])?;
        let rest = self.buffer[full_bytes * 8..].to_bitvec();
        self.buffer = rest;
        Ok(())
    }

    /// Pad the last partial byte with zeros and push everything to the sink.
    /// Meant to be called once, at the end of the stream.
    pub fn flush(&mut self) -> Result<()> {
        let rem = self.buffer.len() % 8;
        if rem != 0 {
            let padded = self.buffer.len() + 8 - rem;
            self.buffer.resize(padded, false);
        }
        self.spill()?;
        self.sink.flush()?;
        Ok(())
    }

    /// flush and give back the sink
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.sink)
    }
}

/// Reads back what a [`BitWriter`] produced.
pub struct BitReader<R: Read> {
    source: R,
    buffer: MyBitVector,
    position: usize,
    exhausted: bool,
}

impl<R: Read> BitReader<R> {
    /// new reader owning the source
    pub fn new(source: R) -> Self {
        BitReader { source, buffer: MyBitVector::new(), position: 0, exhausted: false }
    }

    /// make sure at least `width` unread bits are buffered (zero filled after EOF)
    fn ensure(&mut self, width: usize) -> Result<()> {
        while self.buffer.len() - self.position < width {
            // drop consumed whole bytes
            let consumed = self.position / 8 * 8;
            if consumed > 0 {
                let rest = self.buffer[consumed..].to_bitvec();
                self.buffer = rest;
                self.position -= consumed;
            }

            let mut chunk = [0_u8; REFILL_BYTES];
            let n = if self.exhausted { 0 } else {
                match self.source.read(&mut chunk) {
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            };
            if n == 0 {
                self.exhausted = true;
                let missing = self.position + width;
                self.buffer.resize(missing, false);
                break;
            }
            self.buffer.extend_from_raw_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Read `width` bits as an unsigned integer (MSB first). `width == 0` yields 0.
    pub fn read(&mut self, width: u32) -> Result<u64> {
        debug_assert!(width <= 64);
        if width == 0 {
            return Ok(0);
        }
        let w = width as usize;
        self.ensure(w)?;
        let v = self.buffer[self.position..self.position + w].load_be::<u64>();
        self.position += w;
        Ok(v)
    }

    /// read a single bit
    pub fn read_bool(&mut self) -> Result<bool> {
        self.ensure(1)?;
        let b = self.buffer[self.position];
        self.position += 1;
        Ok(b)
    }

    /// a raw 64 bit double
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read(64)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    #[test]
    fn test_msb_first_layout() {
        let mut w = BitWriter::new(Vec::new());
        w.write(0b1, 1);
        w.write(0b01, 2);
        w.write(0b00001, 5);
        w.write(0xABCD, 16);
        let bytes = w.into_inner().unwrap();
        assert_eq!(bytes, vec![0b1010_0001, 0xAB, 0xCD]);
    }

    #[test]
    fn test_padding() {
        let mut w = BitWriter::new(Vec::new());
        w.write(0b111, 3);
        assert_eq!(w.bits_written(), 3);
        let bytes = w.into_inner().unwrap();
        assert_eq!(bytes, vec![0b1110_0000]);
    }

    #[test]
    fn test_zero_width_noop() {
        let mut w = BitWriter::new(Vec::new());
        w.write(12345, 0);
        assert_eq!(w.track_bits().unwrap(), 0);
        assert_eq!(w.into_inner().unwrap(), Vec::<u8>::new());

        let mut r = BitReader::new(&[0xFF_u8][..]);
        assert_eq!(r.read(0).unwrap(), 0);
        assert_eq!(r.read(8).unwrap(), 0xFF);
    }

    #[test]
    fn test_high_bits_ignored() {
        let mut w = BitWriter::new(Vec::new());
        w.write(0xFF, 4);
        w.write(0, 4);
        assert_eq!(w.into_inner().unwrap(), vec![0xF0]);
    }

    #[test]
    fn test_past_eof_is_zero() {
        let mut r = BitReader::new(&[0xFF_u8][..]);
        assert_eq!(r.read(4).unwrap(), 0xF);
        assert_eq!(r.read(8).unwrap(), 0xF0);
        assert_eq!(r.read(64).unwrap(), 0);
        assert!(!r.read_bool().unwrap());
    }

    #[test]
    fn test_track_bits() {
        let mut w = BitWriter::new(Vec::new());
        w.write(1, 10);
        w.write_bool(false);
        assert_eq!(w.track_bits().unwrap(), 11);
        w.write_f64(1.5);
        assert_eq!(w.track_bits().unwrap(), 64);
        assert_eq!(w.track_bits().unwrap(), 0);
        assert_eq!(w.bits_written(), 75);
    }

    mod random {
        use super::*;
        use pretty_assertions::assert_eq;

        /// lots of random widths, enough to trigger spills and refills
        #[test]
        fn test_random_roundtrip() {
            let mut rng = rand::thread_rng();
            let items: Vec<(u64, u32)> = (0..50_000)
                .map(|_| {
                    let width = rng.gen_range(0..=64_u32);
                    let v: u64 = rng.gen();
                    let v = if width == 64 { v } else { v & ((1_u64 << width) - 1) };
                    (v, width)
                })
                .collect();

            let mut w = BitWriter::new(Vec::new());
            let mut total = 0;
            for &(v, width) in items.iter() {
                w.write(v, width);
                total += w.track_bits().unwrap();
            }
            assert_eq!(total as u64, w.bits_written());
            let bytes = w.into_inner().unwrap();
            assert_eq!(bytes.len(), total.div_ceil(8));

            let mut r = BitReader::new(bytes.as_slice());
            for &(v, width) in items.iter() {
                assert_eq!(r.read(width).unwrap(), v);
            }
        }
    }
}
