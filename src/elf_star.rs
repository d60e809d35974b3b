//! ElfStar and SElfStar: erasure plus a window-adaptive XOR stage.
//!
//! Both cut the stream into windows (1000 values by default). Inside a window the
//! XOR stage stores leading/trailing zero counts as indices into a small set of
//! positions (see [`crate::post_office`]), the first value of a window is written
//! with its trailing zeros stripped:
//! - first value: trailing zeros (7 bits) + the bits above the lowest one
//! - `1` + center: fits the stored lead/trail window (and that is cheaper than a new one)
//! - `01`: identical to the previous value
//! - `00` + lead index + trail index + center
//!
//! **ElfStar** buffers a whole window and emits: beta* Huffman table, lead positions,
//! trail positions, then every value as (beta* code, XOR code).
//!
//! **SElfStar** streams. The first window uses fixed beta* codes (`0` same, `10` not erased,
//! `11` + 4 bits new), later windows a Huffman code both sides derive from the previous
//! window's beta* histogram, so no table is ever written. Positions are fixed.
//!
//! Neither writes the first value of the stream raw: each window opens with its own
//! header (the tables for ElfStar) and the first value of every window goes through
//! the trailing-zero form above.
use std::io::{Read, Write};
use tracing::debug;
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::config::{CodecConfig, BATCH_SIZE, WINDOW};
use crate::elf::{erase, recover, Erasure, NOT_ERASED};
use crate::error::Result;
use crate::huffman::HuffmanCode;
use crate::post_office::Positions;

/// default number of values per window
pub const DEFAULT_WINDOW: usize = 1000;
/// beta* 0..=15 plus "not erased"
const SYMBOLS: usize = NOT_ERASED as usize + 1;
const SYMBOL_BITS: u32 = 5;

const DEFAULT_LEAD_POSITIONS: [u32; 8] = [0, 8, 12, 16, 18, 20, 22, 24];
const DEFAULT_TRAIL_POSITIONS: [u32; 8] = [0, 22, 28, 32, 36, 40, 42, 46];

fn window_size(config: &CodecConfig) -> Result<usize> {
    let fallback = config.get_or(BATCH_SIZE, DEFAULT_WINDOW)?;
    Ok(config.get_or(WINDOW, fallback)?.max(1))
}

/// The positional XOR stage, identical on both sides
#[derive(Debug, Clone)]
struct StarXor {
    lead: Positions,
    trail: Positions,
    stored: u64,
    stored_lead: u32,
    stored_tail: u32,
    first: bool,
}

impl StarXor {
    fn new(lead: Positions, trail: Positions) -> Self {
        StarXor { lead, trail, stored: 0, stored_lead: u32::MAX, stored_tail: u32::MAX, first: true }
    }

    /// start a new window
    fn reset(&mut self) {
        self.stored = 0;
        self.stored_lead = u32::MAX;
        self.stored_tail = u32::MAX;
        self.first = true;
    }

    fn write<W: Write>(&mut self, out: &mut BitWriter<W>, bits: u64) {
        if self.first {
            self.first = false;
            let tz = bits.trailing_zeros();
            out.write(tz as u64, 7);
            if tz < 63 {
                out.write(bits >> (tz + 1), 63 - tz);
            }
            self.stored = bits;
            return;
        }

        let xor = self.stored ^ bits;
        if xor == 0 {
            out.write(0b01, 2);
            return;
        }
        let lead = self.lead.round(xor.leading_zeros());
        let tail = self.trail.round(xor.trailing_zeros());
        let index_bits = self.lead.bits() + self.trail.bits();
        if lead >= self.stored_lead
            && tail >= self.stored_tail
            && (lead - self.stored_lead) + (tail - self.stored_tail) < 1 + index_bits
        {
            out.write_bool(true);
            out.write(xor >> self.stored_tail, 64 - self.stored_lead - self.stored_tail);
        } else {
            self.stored_lead = lead;
            self.stored_tail = tail;
            out.write(0b00, 2);
            out.write(self.lead.representation(lead), self.lead.bits());
            out.write(self.trail.representation(tail), self.trail.bits());
            out.write(xor >> tail, 64 - lead - tail);
        }
        self.stored = bits;
    }

    fn read<R: Read>(&mut self, input: &mut BitReader<R>) -> Result<u64> {
        if self.first {
            self.first = false;
            let tz = input.read(7)? as u32;
            self.stored = if tz >= 64 { 0 } else { ((input.read(63 - tz)? << 1) | 1) << tz };
            return Ok(self.stored);
        }

        if input.read_bool()? {
            let center = 64_u32.saturating_sub(self.stored_lead.saturating_add(self.stored_tail));
            self.stored ^= input.read(center)? << self.stored_tail.min(63);
        } else if !input.read_bool()? {
            self.stored_lead = self.lead.position(input.read(self.lead.bits())?);
            self.stored_tail = self.trail.position(input.read(self.trail.bits())?);
            let center = 64_u32.saturating_sub(self.stored_lead + self.stored_tail);
            self.stored ^= input.read(center)? << self.stored_tail;
        }
        Ok(self.stored)
    }
}

/// leading/trailing zero histograms of successive (nonzero) XORs
fn zero_run_distribution(values: &[Erasure]) -> ([u64; 64], [u64; 64]) {
    let mut lead = [0_u64; 64];
    let mut trail = [0_u64; 64];
    if let Some(first) = values.first() {
        let mut last = first.bits;
        for e in values[1..].iter() {
            let xor = last ^ e.bits;
            if xor != 0 {
                lead[xor.leading_zeros() as usize] += 1;
                trail[xor.trailing_zeros() as usize] += 1;
                last = e.bits;
            }
        }
    }
    (lead, trail)
}

fn restore(bits: u64, symbol: usize) -> f64 {
    let v = f64::from_bits(bits);
    if symbol < NOT_ERASED as usize { recover(v, symbol as u32) } else { v }
}

/// ElfStar encoder, emits one window at a time
pub struct ElfStarEncoder<W: Write> {
    out: BitWriter<W>,
    window: usize,
    buffer: Vec<Erasure>,
    last_beta_star: Option<u32>,
}

impl<W: Write> ElfStarEncoder<W> {
    /// window size from `window` (or `batch_size`), default 1000
    pub fn new(sink: W, config: &CodecConfig) -> Result<Self> {
        let window = window_size(config)?;
        Ok(ElfStarEncoder { out: BitWriter::new(sink), window, buffer: Vec::with_capacity(window), last_beta_star: None })
    }

    fn emit_window(&mut self) {
        let mut frequency = [0_u64; SYMBOLS];
        for e in self.buffer.iter() {
            frequency[e.symbol()] += 1;
        }
        let Some(huffman) = HuffmanCode::from_frequencies(&frequency) else {
            return;
        };
        huffman.write_table(&mut self.out, SYMBOL_BITS);

        let (lead_dist, trail_dist) = zero_run_distribution(&self.buffer);
        let lead = Positions::solve(&lead_dist);
        let trail = Positions::solve(&trail_dist);
        lead.write(&mut self.out);
        trail.write(&mut self.out);

        let mut xor = StarXor::new(lead, trail);
        for e in self.buffer.iter() {
            huffman.encode(e.symbol(), &mut self.out);
            xor.write(&mut self.out, e.bits);
        }
        debug!(values = self.buffer.len(), bits = self.out.bits_written(), "ElfStar window flushed");
        self.buffer.clear();
        self.last_beta_star = None;
    }
}

impl<W: Write> Encoder<W> for ElfStarEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        let e = erase(value, self.last_beta_star);
        if e.beta_star.is_some() {
            self.last_beta_star = e.beta_star;
        }
        self.buffer.push(e);
        if self.buffer.len() == self.window {
            self.emit_window();
        }
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn close(&mut self) -> Result<usize> {
        if !self.buffer.is_empty() {
            self.emit_window();
        }
        self.out.track_bits()
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// ElfStar decoder, rereads the tables at every window boundary
pub struct ElfStarDecoder<R: Read> {
    input: BitReader<R>,
    window: usize,
    remaining: usize,
    state: Option<(HuffmanCode, StarXor)>,
}

impl<R: Read> ElfStarDecoder<R> {
    /// same configuration as the encoder
    pub fn new(source: R, config: &CodecConfig) -> Result<Self> {
        Ok(ElfStarDecoder { input: BitReader::new(source), window: window_size(config)?, remaining: 0, state: None })
    }
}

impl<R: Read> Decoder for ElfStarDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.remaining == 0 || self.state.is_none() {
            let huffman = HuffmanCode::read_table(&mut self.input, SYMBOL_BITS)?;
            let lead = Positions::read(&mut self.input)?;
            let trail = Positions::read(&mut self.input)?;
            self.state = Some((huffman, StarXor::new(lead, trail)));
            self.remaining = self.window;
        }
        self.remaining -= 1;
        match self.state.as_mut() {
            Some((huffman, xor)) => {
                let symbol = huffman.decode(&mut self.input)?;
                let bits = xor.read(&mut self.input)?;
                Ok(restore(bits, symbol))
            }
            None => Ok(0.0),
        }
    }
}

/// beta* code of SElfStar: fixed in the first window, Huffman afterwards
#[derive(Debug, Clone)]
enum BetaCode {
    Fixed,
    Learned(HuffmanCode),
}

/// state both SElfStar sides share
#[derive(Debug, Clone)]
struct SElfStarState {
    window: usize,
    count: usize,
    frequency: [u64; SYMBOLS],
    code: BetaCode,
    last_beta_star: Option<u32>,
    xor: StarXor,
}

impl SElfStarState {
    fn new(window: usize) -> Self {
        SElfStarState {
            window,
            count: 0,
            frequency: [0; SYMBOLS],
            code: BetaCode::Fixed,
            last_beta_star: None,
            xor: StarXor::new(
                Positions::from_positions(DEFAULT_LEAD_POSITIONS.to_vec()),
                Positions::from_positions(DEFAULT_TRAIL_POSITIONS.to_vec()),
            ),
        }
    }

    /// bookkeeping after a value, switches codes at the window boundary
    fn advance(&mut self, symbol: usize) {
        self.frequency[symbol] += 1;
        if symbol < NOT_ERASED as usize {
            self.last_beta_star = Some(symbol as u32);
        }
        self.count += 1;
        if self.count == self.window {
            // every symbol stays codable in the next window
            let smoothed = self.frequency.map(|f| f + 1);
            if let Some(h) = HuffmanCode::from_frequencies(&smoothed) {
                self.code = BetaCode::Learned(h);
            }
            self.frequency = [0; SYMBOLS];
            self.count = 0;
            self.last_beta_star = None;
            self.xor.reset();
        }
    }
}

/// SElfStar encoder, streaming
pub struct SElfStarEncoder<W: Write> {
    out: BitWriter<W>,
    state: SElfStarState,
}

impl<W: Write> SElfStarEncoder<W> {
    /// window size from `window` (or `batch_size`), default 1000
    pub fn new(sink: W, config: &CodecConfig) -> Result<Self> {
        Ok(SElfStarEncoder { out: BitWriter::new(sink), state: SElfStarState::new(window_size(config)?) })
    }
}

impl<W: Write> Encoder<W> for SElfStarEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        let e = erase(value, self.state.last_beta_star);
        match &self.state.code {
            BetaCode::Learned(h) => h.encode(e.symbol(), &mut self.out),
            BetaCode::Fixed => match e.beta_star {
                Some(b) if Some(b) == self.state.last_beta_star => self.out.write_bool(false),
                Some(b) => {
                    self.out.write(0b11, 2);
                    self.out.write(b as u64, 4);
                }
                None => self.out.write(0b10, 2),
            },
        }
        self.state.xor.write(&mut self.out, e.bits);
        self.state.advance(e.symbol());
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// SElfStar decoder
pub struct SElfStarDecoder<R: Read> {
    input: BitReader<R>,
    state: SElfStarState,
}

impl<R: Read> SElfStarDecoder<R> {
    /// same configuration as the encoder
    pub fn new(source: R, config: &CodecConfig) -> Result<Self> {
        Ok(SElfStarDecoder { input: BitReader::new(source), state: SElfStarState::new(window_size(config)?) })
    }
}

impl<R: Read> Decoder for SElfStarDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        let symbol = match &self.state.code {
            BetaCode::Learned(h) => h.decode(&mut self.input)?,
            BetaCode::Fixed => {
                if !self.input.read_bool()? {
                    self.state.last_beta_star.unwrap_or(0) as usize
                } else if self.input.read_bool()? {
                    self.input.read(4)? as usize
                } else {
                    NOT_ERASED as usize
                }
            }
        };
        let bits = self.state.xor.read(&mut self.input)?;
        self.state.advance(symbol);
        Ok(restore(bits, symbol))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{check_roundtrip, decimal_walk};
    use pretty_assertions::assert_eq;

    fn config(window: usize) -> CodecConfig {
        CodecConfig::default().with(WINDOW, window)
    }

    mod xor_stage {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_first_value() {
            for bits in [0_u64, 1, 1 << 63, 0x4009_1eb8_51eb_851f, u64::MAX] {
                let p = || Positions::from_positions(vec![0]);
                let mut x = StarXor::new(p(), p());
                let mut w = BitWriter::new(Vec::new());
                x.write(&mut w, bits);
                let bytes = w.into_inner().unwrap();
                let mut y = StarXor::new(p(), p());
                assert_eq!(y.read(&mut BitReader::new(bytes.as_slice())).unwrap(), bits);
            }
        }
    }

    mod elf_star {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_window_plus_one() {
            let values = decimal_walk(DEFAULT_WINDOW + 1, 2);
            let c = config(DEFAULT_WINDOW);
            check_roundtrip(&values, ElfStarEncoder::new(Vec::new(), &c).unwrap(), |r| ElfStarDecoder::new(r, &c).unwrap());
        }

        #[test]
        fn test_costs_reported_per_window() {
            let c = config(4);
            let mut enc = ElfStarEncoder::new(Vec::new(), &c).unwrap();
            assert_eq!(enc.encode(1.5).unwrap(), 0);
            assert_eq!(enc.encode(2.5).unwrap(), 0);
            assert_eq!(enc.encode(3.5).unwrap(), 0);
            assert!(enc.encode(4.5).unwrap() > 0);
            assert_eq!(enc.encode(5.5).unwrap(), 0);
            assert!(enc.close().unwrap() > 0);
        }

        #[test]
        fn test_small_windows_and_specials() {
            let values = [
                f64::NAN, 0.0, -0.0, 3.14, f64::INFINITY, 3.15, f64::from_bits(0x7ff4_0000_0000_0001),
                5e-324, 2.0, 2.0, 2.0, -1e-300, f64::MAX, 0.1 + 0.2,
            ];
            for window in [1, 2, 3, 5, 1000] {
                let c = config(window);
                check_roundtrip(&values, ElfStarEncoder::new(Vec::new(), &c).unwrap(), |r| ElfStarDecoder::new(r, &c).unwrap());
            }
        }

        #[test]
        fn test_compresses_decimals() {
            let values = decimal_walk(10_000, 3);
            let c = CodecConfig::default();
            let bytes = check_roundtrip(&values, ElfStarEncoder::new(Vec::new(), &c).unwrap(), |r| ElfStarDecoder::new(r, &c).unwrap());
            assert!(bytes.len() * 8 < values.len() * 40);
        }
    }

    mod selfstar {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_window_plus_one() {
            let values = decimal_walk(DEFAULT_WINDOW + 1, 4);
            let c = config(DEFAULT_WINDOW);
            check_roundtrip(&values, SElfStarEncoder::new(Vec::new(), &c).unwrap(), |r| SElfStarDecoder::new(r, &c).unwrap());
        }

        #[test]
        fn test_many_windows() {
            let mut values = decimal_walk(3000, 5);
            // a window without any erasure, then decimals again
            for v in values[1000..1100].iter_mut() {
                *v = f64::from_bits(v.to_bits() ^ 0x1234_5);
            }
            for window in [7, 100] {
                let c = config(window);
                check_roundtrip(&values, SElfStarEncoder::new(Vec::new(), &c).unwrap(), |r| SElfStarDecoder::new(r, &c).unwrap());
            }
        }

        #[test]
        fn test_streams_immediately() {
            let c = CodecConfig::default();
            let mut enc = SElfStarEncoder::new(Vec::new(), &c).unwrap();
            // first value: beta* flag + 7 bit trailing zeros + the rest
            assert!(enc.encode(3.14).unwrap() > 7);
            assert!(enc.encode(3.15).unwrap() > 0);
            // same erased bits: flag `0` + xor `01`
            assert_eq!(enc.encode(3.15).unwrap(), 3);
        }

        #[test]
        fn test_specials() {
            let values = [f64::NAN, 0.0, -0.0, f64::NEG_INFINITY, 1.25, 5e-324, -7.5, f64::NAN, 1e300];
            let c = config(3);
            check_roundtrip(&values, SElfStarEncoder::new(Vec::new(), &c).unwrap(), |r| SElfStarDecoder::new(r, &c).unwrap());
        }
    }
}
