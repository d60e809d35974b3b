//! Chimp (Liakos et al., VLDB 2022).
//!
//! Like Gorilla, but tuned for XORs with few trailing zeros:
//! - `1` + `1` + leading zeros (3 bits, capped at 7) + `64 - lead` bits: short trailing run, new lead
//! - `1` + `0` + `64 - previous_lead` bits: short trailing run, same lead as before
//! - `0` + `1` + lead (3 bits) + center length - 1 (6 bits) + center: long trailing run
//! - `0` + `0`: same value
use std::io::{Read, Write};
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::error::Result;

/// leading zeros that still fit the 3 bit field
pub(crate) const MAX_LEAD: u32 = 7;
/// trailing runs up to this length are not worth a length field
pub(crate) const SHORT_TAIL: u32 = 6;

/// the "keep everything below the leading zeros" payload, shared with Chimp128
pub(crate) fn write_lead_payload<W: Write>(out: &mut BitWriter<W>, xor: u64, lead: u32, previous_lead: u32) {
    if lead == previous_lead {
        out.write_bool(false);
        out.write(xor, 64 - previous_lead);
    } else {
        let lim = lead.min(MAX_LEAD);
        out.write_bool(true);
        out.write(lim as u64, 3);
        out.write(xor, 64 - lim);
    }
}

/// inverse of [`write_lead_payload`]
pub(crate) fn read_lead_payload<R: Read>(input: &mut BitReader<R>, previous_lead: u32) -> Result<u64> {
    if input.read_bool()? {
        let lim = input.read(3)? as u32;
        input.read(64 - lim)
    } else {
        input.read(64_u32.saturating_sub(previous_lead))
    }
}

/// lead (3 bits) + center length - 1 (6 bits) + center, for a nonzero xor
pub(crate) fn write_center_payload<W: Write>(out: &mut BitWriter<W>, xor: u64) {
    let lim = xor.leading_zeros().min(MAX_LEAD);
    let tail = xor.trailing_zeros();
    let center = 64 - lim - tail;
    out.write(lim as u64, 3);
    out.write(center as u64 - 1, 6);
    out.write(xor >> tail, center);
}

/// inverse of [`write_center_payload`]
pub(crate) fn read_center_payload<R: Read>(input: &mut BitReader<R>) -> Result<u64> {
    let lim = input.read(3)? as u32;
    let center = input.read(6)? as u32 + 1;
    let tail = 64_u32.saturating_sub(lim + center);
    Ok(input.read(center)? << tail)
}

/// Chimp encoder
pub struct ChimpEncoder<W: Write> {
    out: BitWriter<W>,
    previous: u64,
    previous_lead: u32,
    first: bool,
}

impl<W: Write> ChimpEncoder<W> {
    /// new encoder writing into `sink`
    pub fn new(sink: W) -> Self {
        ChimpEncoder { out: BitWriter::new(sink), previous: 0, previous_lead: 0, first: true }
    }
}

impl<W: Write> Encoder<W> for ChimpEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        let bits = value.to_bits();
        if self.first {
            self.first = false;
            self.out.write(bits, 64);
        } else {
            let xor = bits ^ self.previous;
            let lead = xor.leading_zeros();
            if xor.trailing_zeros() <= SHORT_TAIL {
                self.out.write_bool(true);
                write_lead_payload(&mut self.out, xor, lead, self.previous_lead);
                self.previous_lead = lead;
            } else if xor != 0 {
                self.out.write(0b01, 2);
                write_center_payload(&mut self.out, xor);
                self.previous_lead = lead;
            } else {
                // previous_lead stays, the decoder can't see a lead here
                self.out.write(0b00, 2);
            }
        }
        self.previous = bits;
        self.out.track_bits()
    }

    fn stream(&mut self) -> &mut BitWriter<W> {
        &mut self.out
    }

    fn into_inner(self: Box<Self>) -> Result<W> {
        self.out.into_inner()
    }
}

/// Chimp decoder
pub struct ChimpDecoder<R: Read> {
    input: BitReader<R>,
    previous: u64,
    previous_lead: u32,
    first: bool,
}

impl<R: Read> ChimpDecoder<R> {
    /// new decoder reading from `source`
    pub fn new(source: R) -> Self {
        ChimpDecoder { input: BitReader::new(source), previous: 0, previous_lead: 0, first: true }
    }
}

impl<R: Read> Decoder for ChimpDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if self.first {
            self.first = false;
            self.previous = self.input.read(64)?;
            return Ok(f64::from_bits(self.previous));
        }
        let xor = if self.input.read_bool()? {
            read_lead_payload(&mut self.input, self.previous_lead)?
        } else if self.input.read_bool()? {
            read_center_payload(&mut self.input)?
        } else {
            return Ok(f64::from_bits(self.previous));
        };
        self.previous_lead = xor.leading_zeros();
        self.previous ^= xor;
        Ok(f64::from_bits(self.previous))
    }
}
