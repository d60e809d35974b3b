//! BDeXOR: DeXOR with the delta and scale fields Huffman coded per batch.
//!
//! Values are collected in batches (`batch_size`, default 1000). A batch is emitted as
//! - the delta table: symbols `0..=15`, plus `16` for exceptions
//! - one presence bit, then the scale table (symbols `q + 20`) if any value is decimal
//! - per value: the delta code, then either the escape, or the scale code,
//!   sign (only when the shared prefix is 0) and the residual in [`decimal_bits`]`(delta)` bits
//!
//! The reference for the shared prefix is the last decimal coded value,
//! it carries over from one batch into the next.
//!
//! There is no raw first value: the stream is a plain sequence of batches, each starting
//! with its tables.
use std::io::{Read, Write};
use tracing::debug;
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::config::{CodecConfig, BATCH_SIZE, RHO};
use crate::decimal::{decimal_bits, join_prefix, pow10_i64, shared_prefix, Decimal, SCALE_BIAS};
use crate::error::Result;
use crate::exception::{ExceptionCoder, DEFAULT_RHO};
use crate::huffman::HuffmanCode;

/// default values per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;
const EXCEPTION: usize = 16;
const DELTA_SYMBOLS: usize = 17;
const SCALE_SYMBOLS: usize = 32;
const SYMBOL_BITS: u32 = 5;

#[derive(Debug, Clone, Copy)]
enum Entry {
    Exception(f64),
    Decimal { decimal: Decimal, delta: u32, alpha: i64 },
}

impl Entry {
    fn delta_symbol(&self) -> usize {
        match self {
            Entry::Exception(_) => EXCEPTION,
            Entry::Decimal { delta, .. } => *delta as usize,
        }
    }
}

/// BDeXOR encoder
pub struct BDeXorEncoder<W: Write> {
    out: BitWriter<W>,
    batch_size: usize,
    batch: Vec<Entry>,
    reference: Decimal,
    exceptions: ExceptionCoder,
}

impl<W: Write> BDeXorEncoder<W> {
    /// reads `batch_size` and `rho`
    pub fn new(sink: W, config: &CodecConfig) -> Result<Self> {
        let batch_size = config.get_or(BATCH_SIZE, DEFAULT_BATCH_SIZE)?.max(1);
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(BDeXorEncoder {
            out: BitWriter::new(sink),
            batch_size,
            batch: Vec::with_capacity(batch_size),
            reference: Decimal::ZERO,
            exceptions: ExceptionCoder::new(rho),
        })
    }

    fn classify(&mut self, value: f64) -> Entry {
        let fit = Decimal::from_f64(value, self.reference.scale)
            .and_then(|decimal| shared_prefix(&decimal, &self.reference).map(|(delta, alpha)| (decimal, delta, alpha)));
        match fit {
            Some((decimal, delta, alpha)) => {
                self.reference = decimal;
                Entry::Decimal { decimal, delta, alpha }
            }
            None => Entry::Exception(value),
        }
    }

    fn emit_batch(&mut self) {
        let mut delta_frequency = [0_u64; DELTA_SYMBOLS];
        let mut scale_frequency = [0_u64; SCALE_SYMBOLS];
        for entry in self.batch.iter() {
            delta_frequency[entry.delta_symbol()] += 1;
            if let Entry::Decimal { decimal, .. } = entry {
                scale_frequency[(decimal.scale + SCALE_BIAS) as usize] += 1;
            }
        }
        let Some(delta_code) = HuffmanCode::from_frequencies(&delta_frequency) else {
            return;
        };
        delta_code.write_table(&mut self.out, SYMBOL_BITS);
        let scale_code = HuffmanCode::from_frequencies(&scale_frequency);
        self.out.write_bool(scale_code.is_some());
        if let Some(code) = &scale_code {
            code.write_table(&mut self.out, SYMBOL_BITS);
        }

        for entry in self.batch.iter() {
            delta_code.encode(entry.delta_symbol(), &mut self.out);
            match (entry, &scale_code) {
                (Entry::Exception(v), _) => self.exceptions.encode(*v, &mut self.out),
                (Entry::Decimal { decimal, delta, alpha }, Some(code)) => {
                    code.encode((decimal.scale + SCALE_BIAS) as usize, &mut self.out);
                    if *alpha == 0 {
                        self.out.write_bool(decimal.digits < 0);
                    }
                    let p = pow10_i64(*delta).unwrap_or(1);
                    let beta = decimal.digits.wrapping_sub(alpha.wrapping_mul(p));
                    self.out.write(beta.unsigned_abs(), decimal_bits(*delta));
                }
                // a decimal entry always makes a scale table
                (Entry::Decimal { .. }, None) => {}
            }
        }
        debug!(values = self.batch.len(), bits = self.out.bits_written(), "BDeXOR batch flushed");
        self.batch.clear();
    }
}

impl<W: Write> Encoder<W> for BDeXorEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        let entry = self.classify(value);
        self.batch.push(entry);
        if self.batch.len() == self.batch_size {
            self.emit_batch();
        }
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn close(&mut self) -> Result<usize> {
        if !self.batch.is_empty() {
            self.emit_batch();
        }
        self.out.track_bits()
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// BDeXOR decoder
pub struct BDeXorDecoder<R: Read> {
    input: BitReader<R>,
    batch_size: usize,
    remaining: usize,
    tables: Option<(HuffmanCode, Option<HuffmanCode>)>,
    reference: Decimal,
    exceptions: ExceptionCoder,
}

impl<R: Read> BDeXorDecoder<R> {
    /// same configuration as the encoder
    pub fn new(source: R, config: &CodecConfig) -> Result<Self> {
        let batch_size = config.get_or(BATCH_SIZE, DEFAULT_BATCH_SIZE)?.max(1);
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(BDeXorDecoder {
            input: BitReader::new(source),
            batch_size,
            remaining: 0,
            tables: None,
            reference: Decimal::ZERO,
            exceptions: ExceptionCoder::new(rho),
        })
    }

    fn read_tables(&mut self) -> Result<(HuffmanCode, Option<HuffmanCode>)> {
        let delta_code = HuffmanCode::read_table(&mut self.input, SYMBOL_BITS)?;
        let scale_code = if self.input.read_bool()? {
            Some(HuffmanCode::read_table(&mut self.input, SYMBOL_BITS)?)
        } else {
            None
        };
        Ok((delta_code, scale_code))
    }
}

impl<R: Read> Decoder for BDeXorDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.remaining == 0 || self.tables.is_none() {
            self.tables = Some(self.read_tables()?);
            self.remaining = self.batch_size;
        }
        self.remaining -= 1;
        let Some((delta_code, scale_code)) = &self.tables else {
            return Ok(0.0);
        };

        let delta = delta_code.decode(&mut self.input)?;
        let scale_code = match scale_code {
            Some(code) if delta != EXCEPTION => code,
            _ => return self.exceptions.decode(&mut self.input),
        };
        let q = scale_code.decode(&mut self.input)? as i32 - SCALE_BIAS;
        let delta = delta as u32;
        let alpha = self.reference.prefix(q + delta as i32).unwrap_or(0);
        let negative = alpha == 0 && self.input.read_bool()?;
        let beta = self.input.read(decimal_bits(delta))?;
        self.reference = Decimal::new(q, join_prefix(alpha, delta, beta, negative));
        Ok(self.reference.to_f64())
    }
}
