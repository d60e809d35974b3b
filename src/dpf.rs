//! DPF: a decimal prefix forest per batch.
//!
//! Where DeXOR shares digits with the previous value only, DPF looks at a whole batch
//! (`2^batch_bits` values, default 128) and picks a list of decimal prefixes
//! `P * 10^exp` that many values start with. A value below such a prefix only writes
//! how many digits `k` follow it and those digits.
//!
//! Batch layout:
//! - number of prefixes in `batch_bits + 4` bits
//! - per prefix: `exp + 20` (6 bits), sign, bit length of `|P|` (6 bits), `|P|`
//! - per value a selector of `bit_length(len + 1)` bits:
//!   - `0`: escape coder
//!   - `1`: plain decimal, `q + 20` (5 bits), sign, digit count `n` (4 bits), `|digits|` in [`decimal_bits`]`(n)`
//!   - `id + 2`: prefix `id`, `k` (4 bits), the remaining digits in [`decimal_bits`]`(k)`, signed like the prefix
//!
//! Prefixes are chosen greedily by gain: bits saved over each value's cheapest
//! current form, minus the cost of listing the prefix.
//!
//! There is no raw first value: the stream is a plain sequence of batches, each starting
//! with its prefix list.
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io::{Read, Write};
use itertools::Itertools;
use tracing::debug;
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::config::{CodecConfig, BATCH_BITS, RHO};
use crate::decimal::{decimal_bits, digit_count, join_prefix, pow10_i64, Decimal, SCALE_BIAS};
use crate::error::{CodecError, Result};
use crate::exception::{ExceptionCoder, DEFAULT_RHO};

/// default log2 of the batch size
pub const DEFAULT_BATCH_BITS: u32 = 7;
const MAX_BATCH_BITS: u32 = 16;
const PREFIX_HEADER_BITS: u32 = 6 + 1 + 6;
/// ranking only, an escape is about this long
const EXCEPTION_COST: u32 = 64;

#[inline]
fn bit_length(x: u64) -> u32 {
    64 - x.leading_zeros()
}

fn plain_cost(d: &Decimal) -> Option<u32> {
    let n = digit_count(d.digits);
    (n <= 15).then(|| 5 + 1 + 4 + decimal_bits(n))
}

#[inline]
fn prefix_cost(k: u32) -> u32 {
    4 + decimal_bits(k)
}

fn batch_bits(config: &CodecConfig) -> Result<u32> {
    let bits = config.get_or(BATCH_BITS, DEFAULT_BATCH_BITS)?;
    if bits > MAX_BATCH_BITS {
        return Err(CodecError::Config(BATCH_BITS.to_string(), bits.to_string()));
    }
    Ok(bits)
}

/// `value * 10^exp`, never zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Prefix {
    exp: i32,
    value: i64,
}

impl Prefix {
    fn cost(&self) -> u32 {
        PREFIX_HEADER_BITS + bit_length(self.value.unsigned_abs())
    }

    fn write<W: Write>(&self, out: &mut BitWriter<W>) {
        let magnitude = self.value.unsigned_abs();
        out.write((self.exp + SCALE_BIAS) as u64, 6);
        out.write_bool(self.value < 0);
        out.write(bit_length(magnitude) as u64, 6);
        out.write(magnitude, bit_length(magnitude));
    }

    fn read<R: Read>(input: &mut BitReader<R>) -> Result<Self> {
        let exp = input.read(6)? as i32 - SCALE_BIAS;
        let negative = input.read_bool()?;
        let width = input.read(6)? as u32;
        let magnitude = input.read(width)? as i64;
        Ok(Prefix { exp, value: if negative { -magnitude } else { magnitude } })
    }
}

/// every prefix `d` can be written under, with the digit count `k` below it
fn chain(d: Decimal) -> impl Iterator<Item = (Prefix, u32)> {
    (0..digit_count(d.digits).min(16)).filter_map(move |k| {
        let exp = d.scale + k as i32;
        d.prefix(exp).filter(|&p| p != 0).map(|value| (Prefix { exp, value }, k))
    })
}

/// Lazy greedy selection. Gains only shrink as values find cheaper forms,
/// so a popped candidate whose gain is still current is the best one.
fn select_prefixes(decimals: &[Option<Decimal>], max_entries: usize) -> Vec<Prefix> {
    let mut cost: Vec<u32> = decimals
        .iter()
        .map(|d| d.as_ref().and_then(plain_cost).unwrap_or(EXCEPTION_COST))
        .collect();
    let users: HashMap<Prefix, Vec<(usize, u32)>> = decimals
        .iter()
        .enumerate()
        .filter_map(|(i, d)| d.map(|d| (i, d)))
        .flat_map(|(i, d)| chain(d).map(move |(p, k)| (p, (i, k))))
        .into_group_map();

    let gain = |p: &Prefix, users: &[(usize, u32)], cost: &[u32]| -> i64 {
        let saved: i64 = users.iter().map(|&(i, k)| cost[i].saturating_sub(prefix_cost(k)) as i64).sum();
        saved - p.cost() as i64
    };
    let mut heap: BinaryHeap<(i64, Reverse<Prefix>)> =
        users.iter().map(|(p, u)| (gain(p, u, &cost), Reverse(*p))).collect();

    let mut chosen = Vec::new();
    while let Some((stale, Reverse(p))) = heap.pop() {
        if chosen.len() >= max_entries {
            break;
        }
        let Some(u) = users.get(&p) else { continue };
        let current = gain(&p, u, &cost);
        if current < stale {
            heap.push((current, Reverse(p)));
            continue;
        }
        // one more entry may widen every selector
        let len = chosen.len() as u64;
        let growth = (bit_length(len + 2) - bit_length(len + 1)) as i64 * decimals.len() as i64;
        if current <= growth {
            break;
        }
        for &(i, k) in u.iter() {
            cost[i] = cost[i].min(prefix_cost(k));
        }
        chosen.push(p);
    }
    chosen
}

/// how one value of a batch is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Exception,
    Plain(Decimal),
    Prefix { id: usize, k: u32, beta: u64 },
}

fn choose(d: Option<Decimal>, index: &HashMap<Prefix, usize>) -> Choice {
    let Some(d) = d else {
        return Choice::Exception;
    };
    let plain = plain_cost(&d).map(|c| (c, Choice::Plain(d)));
    let prefixed = chain(d).filter_map(|(p, k)| {
        index.get(&p).map(|&id| {
            let beta = d.digits.wrapping_sub(p.value.wrapping_mul(pow10_i64(k).unwrap_or(1)));
            (prefix_cost(k), Choice::Prefix { id, k, beta: beta.unsigned_abs() })
        })
    });
    plain.into_iter().chain(prefixed).min_by_key(|(c, _)| *c).map_or(Choice::Exception, |(_, choice)| choice)
}

/// DPF encoder
pub struct DpfEncoder<W: Write> {
    out: BitWriter<W>,
    batch_bits: u32,
    values: Vec<f64>,
    decimals: Vec<Option<Decimal>>,
    hint: i32,
    exceptions: ExceptionCoder,
}

impl<W: Write> DpfEncoder<W> {
    /// reads `batch_bits` and `rho`
    pub fn new(sink: W, config: &CodecConfig) -> Result<Self> {
        let batch_bits = batch_bits(config)?;
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(DpfEncoder {
            out: BitWriter::new(sink),
            batch_bits,
            values: Vec::with_capacity(1 << batch_bits),
            decimals: Vec::with_capacity(1 << batch_bits),
            hint: 0,
            exceptions: ExceptionCoder::new(rho),
        })
    }

    fn emit_batch(&mut self) {
        let max_entries = (1_usize << (self.batch_bits + 4)) - 1;
        let prefixes = select_prefixes(&self.decimals, max_entries);
        self.out.write(prefixes.len() as u64, self.batch_bits + 4);
        for p in prefixes.iter() {
            p.write(&mut self.out);
        }

        let index: HashMap<Prefix, usize> = prefixes.iter().enumerate().map(|(id, p)| (*p, id)).collect();
        let selector_bits = bit_length(prefixes.len() as u64 + 1);
        for (&v, &d) in self.values.iter().zip(self.decimals.iter()) {
            match choose(d, &index) {
                Choice::Exception => {
                    self.out.write(0, selector_bits);
                    self.exceptions.encode(v, &mut self.out);
                }
                Choice::Plain(d) => {
                    let n = digit_count(d.digits);
                    self.out.write(1, selector_bits);
                    self.out.write((d.scale + SCALE_BIAS) as u64, 5);
                    self.out.write_bool(d.digits < 0);
                    self.out.write(n as u64, 4);
                    self.out.write(d.digits.unsigned_abs(), decimal_bits(n));
                }
                Choice::Prefix { id, k, beta } => {
                    self.out.write(id as u64 + 2, selector_bits);
                    self.out.write(k as u64, 4);
                    self.out.write(beta, decimal_bits(k));
                }
            }
        }
        debug!(values = self.values.len(), prefixes = prefixes.len(), bits = self.out.bits_written(), "DPF batch flushed");
        self.values.clear();
        self.decimals.clear();
    }
}

impl<W: Write> Encoder<W> for DpfEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        let d = Decimal::from_f64(value, self.hint);
        if let Some(d) = d {
            self.hint = d.scale;
        }
        self.values.push(value);
        self.decimals.push(d);
        if self.values.len() == 1 << self.batch_bits {
            self.emit_batch();
        }
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn close(&mut self) -> Result<usize> {
        if !self.values.is_empty() {
            self.emit_batch();
        }
        self.out.track_bits()
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// DPF decoder
pub struct DpfDecoder<R: Read> {
    input: BitReader<R>,
    batch_bits: u32,
    remaining: usize,
    prefixes: Vec<Prefix>,
    selector_bits: u32,
    exceptions: ExceptionCoder,
}

impl<R: Read> DpfDecoder<R> {
    /// same configuration as the encoder
    pub fn new(source: R, config: &CodecConfig) -> Result<Self> {
        let batch_bits = batch_bits(config)?;
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(DpfDecoder {
            input: BitReader::new(source),
            batch_bits,
            remaining: 0,
            prefixes: Vec::new(),
            selector_bits: 1,
            exceptions: ExceptionCoder::new(rho),
        })
    }

    fn read_prefixes(&mut self) -> Result<()> {
        let n = self.input.read(self.batch_bits + 4)? as usize;
        self.prefixes = (0..n).map(|_| Prefix::read(&mut self.input)).collect::<Result<_>>()?;
        self.selector_bits = bit_length(n as u64 + 1);
        self.remaining = 1 << self.batch_bits;
        Ok(())
    }
}

impl<R: Read> Decoder for DpfDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.remaining == 0 {
            self.read_prefixes()?;
        }
        self.remaining -= 1;

        match self.input.read(self.selector_bits)? as usize {
            0 => self.exceptions.decode(&mut self.input),
            1 => {
                let q = self.input.read(5)? as i32 - SCALE_BIAS;
                let negative = self.input.read_bool()?;
                let n = self.input.read(4)? as u32;
                let magnitude = self.input.read(decimal_bits(n))? as i64;
                Ok(Decimal::new(q, if negative { -magnitude } else { magnitude }).to_f64())
            }
            selector => {
                let p = *self.prefixes.get(selector - 2).ok_or(CodecError::MalformedTable("prefix id out of range"))?;
                let k = self.input.read(4)? as u32;
                let beta = self.input.read(decimal_bits(k))?;
                Ok(Decimal::new(p.exp - k as i32, join_prefix(p.value, k, beta, false)).to_f64())
            }
        }
    }
}
