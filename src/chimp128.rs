//! Chimp128: Chimp with a lookback over the last 128 values.
//!
//! A direct-mapped table keyed by the lowest 14 bits of a value remembers where that
//! bit pattern was last seen. If that was within the last 128 values, we XOR against
//! it (lots of trailing zeros guaranteed), otherwise against the previous value:
//! - `0` + distance - 1 (7 bits) + (`1` + lead + center length + center | `0` same value)
//! - `1` + Chimp's lead payload against the previous value
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::chimp::{read_center_payload, read_lead_payload, write_center_payload, write_lead_payload};
use crate::codec::{Decoder, Encoder};
use crate::error::Result;

const WINDOW: u64 = 128;
const KEY_BITS: u32 = 14;
const KEY_MASK: u64 = (1 << KEY_BITS) - 1;

/// Ring buffer of the last 128 values plus the "last seen" index
struct Lookback {
    window: [u64; WINDOW as usize],
    last_seen: Vec<u64>,
    /// 1-based index of the most recent value
    id: u64,
}

impl Lookback {
    fn new() -> Self {
        Lookback { window: [0; WINDOW as usize], last_seen: vec![0; 1 << KEY_BITS], id: 0 }
    }

    /// id of a recent value sharing the low bits with `bits`
    fn candidate(&self, bits: u64) -> Option<u64> {
        let best = self.last_seen[(bits & KEY_MASK) as usize];
        (best != 0 && self.id + 1 - best <= WINDOW).then_some(best)
    }

    fn get(&self, id: u64) -> u64 {
        self.window[(id % WINDOW) as usize]
    }

    fn push(&mut self, bits: u64) {
        self.id += 1;
        self.window[(self.id % WINDOW) as usize] = bits;
        self.last_seen[(bits & KEY_MASK) as usize] = self.id;
    }
}

/// Chimp128 encoder
pub struct Chimp128Encoder<W: Write> {
    out: BitWriter<W>,
    lookback: Lookback,
    previous_lead: u32,
}

impl<W: Write> Chimp128Encoder<W> {
    /// new encoder writing into `sink`
    pub fn new(sink: W) -> Self {
        Chimp128Encoder { out: BitWriter::new(sink), lookback: Lookback::new(), previous_lead: 0 }
    }
}

impl<W: Write> Encoder<W> for Chimp128Encoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        let bits = value.to_bits();
        if self.lookback.id == 0 {
            self.out.write(bits, 64);
        } else {
            let id = self.lookback.id + 1;
            let xor = match self.lookback.candidate(bits) {
                Some(best) => {
                    let xor = bits ^ self.lookback.get(best);
                    self.out.write_bool(false);
                    self.out.write(id - best - 1, 7);
                    if xor != 0 {
                        self.out.write_bool(true);
                        write_center_payload(&mut self.out, xor);
                    } else {
                        self.out.write_bool(false);
                    }
                    xor
                }
                None => {
                    let xor = bits ^ self.lookback.get(id - 1);
                    self.out.write_bool(true);
                    write_lead_payload(&mut self.out, xor, xor.leading_zeros(), self.previous_lead);
                    xor
                }
            };
            self.previous_lead = xor.leading_zeros();
        }
        self.lookback.push(bits);
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// Chimp128 decoder
pub struct Chimp128Decoder<R: Read> {
    input: BitReader<R>,
    lookback: Lookback,
    previous_lead: u32,
}

impl<R: Read> Chimp128Decoder<R> {
    /// new decoder reading from `source`
    pub fn new(source: R) -> Self {
        Chimp128Decoder { input: BitReader::new(source), lookback: Lookback::new(), previous_lead: 0 }
    }
}

impl<R: Read> Decoder for Chimp128Decoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        let bits = if self.lookback.id == 0 {
            self.input.read(64)?
        } else {
            let id = self.lookback.id + 1;
            let (reference, xor) = if self.input.read_bool()? {
                let xor = read_lead_payload(&mut self.input, self.previous_lead)?;
                (id - 1, xor)
            } else {
                let distance = self.input.read(7)? + 1;
                let xor = if self.input.read_bool()? { read_center_payload(&mut self.input)? } else { 0 };
                (id.saturating_sub(distance), xor)
            };
            self.previous_lead = xor.leading_zeros();
            self.lookback.get(reference) ^ xor
        };
        self.lookback.push(bits);
        Ok(f64::from_bits(bits))
    }
}
