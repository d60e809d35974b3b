//! DeXOR: decimal prefix/residual coding.
//!
//! Every value is read as a [`Decimal`] `digits * 10^q`. The digits above
//! `10^(q + delta)` are taken from a reference (the previous value), only the
//! residual `beta` below it is written, in [`decimal_bits`]`(delta)` bits.
//! A 2 bit case code tells the decoder what changed:
//!
//! | case       | DeXOR | ATDP | followed by                          |
//! |------------|-------|------|--------------------------------------|
//! | same       | `10`  | `11` | sign (if the prefix is 0), beta      |
//! | new delta  | `01`  | `01` | delta (4 bits), sign, beta           |
//! | new scale  | `00`  | `00` | q+20 (5 bits), delta, sign, beta     |
//! | exception  | `11`  | `10` | the [`ExceptionCoder`] escape         |
//!
//! The first value of a stream is stored raw and seeds the reference.
//!
//! Two optional strategies come on top of the plain one:
//! - **buffered** (`buffer_bits > 0`): the reference is the best of the last `2^buffer_bits`
//!   decimal values, its index follows the case code
//! - **skippable** (`skip_available >= 0`): after that many exceptions in a row the
//!   stream switches to bare escapes for good, without case codes
//!
//! # Example
//! ```rust
//! # use decxor::dexor::{DeXorEncoder, DeXorDecoder};
//! # use decxor::codec::{Encoder, Decoder};
//! # use decxor::config::CodecConfig;
//! let config = CodecConfig::default();
//! let mut enc = Box::new(DeXorEncoder::new(Vec::new(), &config).unwrap());
//! for v in [3.14, 3.14, 3.15, 2.0] {
//!     enc.encode(v).unwrap();
//! }
//! let bytes = enc.into_inner().unwrap();
//!
//! let mut dec = DeXorDecoder::new(bytes.as_slice(), &config).unwrap();
//! assert_eq!(dec.decode_next().unwrap(), 3.14);
//! assert_eq!(dec.decode_next().unwrap(), 3.14);
//! assert_eq!(dec.decode_next().unwrap(), 3.15);
//! assert_eq!(dec.decode_next().unwrap(), 2.0);
//! ```
use std::io::{Read, Write};
use tracing::debug;
use crate::bitstream::{BitReader, BitWriter};
use crate::codec::{Decoder, Encoder};
use crate::config::{CodecConfig, BUFFER_BITS, RHO, SKIP_AVAILABLE};
use crate::decimal::{decimal_bits, join_prefix, pow10_i64, shared_prefix, Decimal, SCALE_BIAS};
use crate::error::{CodecError, Result};
use crate::exception::{ExceptionCoder, DEFAULT_RHO};

/// largest accepted `buffer_bits`
const MAX_BUFFER_BITS: u32 = 16;

/// The four 2 bit case codes of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseCodes {
    /// value went through the escape coder
    pub exception: u64,
    /// scale and delta as before
    pub same: u64,
    /// new scale (and delta)
    pub new_scale: u64,
    /// same scale, new delta
    pub new_delta: u64,
}

impl CaseCodes {
    /// DeXOR / DXOR assignment
    pub const DEXOR: CaseCodes = CaseCodes { exception: 0b11, same: 0b10, new_scale: 0b00, new_delta: 0b01 };
    /// ATDP assignment
    pub const ATDP: CaseCodes = CaseCodes { exception: 0b10, same: 0b11, new_scale: 0b00, new_delta: 0b01 };

    fn case(&self, code: u64) -> Case {
        match code {
            c if c == self.exception => Case::Exception,
            c if c == self.same => Case::Same,
            c if c == self.new_scale => Case::NewScale,
            _ => Case::NewDelta,
        }
    }

    fn code(&self, case: Case) -> u64 {
        match case {
            Case::Exception => self.exception,
            Case::Same => self.same,
            Case::NewScale => self.new_scale,
            Case::NewDelta => self.new_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Case {
    Exception,
    Same,
    NewScale,
    NewDelta,
}

/// How the references are kept and when to give up on decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// the previous value is the only reference
    Native,
    /// the last `2^bits` decimal values are candidates
    Buffered(u32),
    /// plain, but escape-only after this many exceptions in a row
    Skippable(u32),
}

impl Strategy {
    /// `buffer_bits > 0` wins over `skip_available >= 0`, otherwise native
    pub fn from_config(config: &CodecConfig) -> Result<Self> {
        let buffer_bits: u32 = config.get_or(BUFFER_BITS, 0)?;
        let skip_available: i64 = config.get_or(SKIP_AVAILABLE, -1)?;
        if buffer_bits > MAX_BUFFER_BITS {
            return Err(CodecError::Config(BUFFER_BITS.to_string(), buffer_bits.to_string()));
        }
        Ok(if buffer_bits > 0 {
            Strategy::Buffered(buffer_bits)
        } else if skip_available >= 0 {
            Strategy::Skippable(skip_available.min(u32::MAX as i64) as u32)
        } else {
            Strategy::Native
        })
    }
}

/// The state both sides keep in lockstep
#[derive(Debug, Clone)]
struct Context {
    codes: CaseCodes,
    id_bits: u32,
    references: Vec<Decimal>,
    next: usize,
    prev_q: i32,
    prev_delta: u32,
    skip_available: Option<u32>,
    exception_run: u32,
    skipping: bool,
    seeded: bool,
    exceptions: ExceptionCoder,
}

/// how a decimal value is coded against one of the references
struct Fit {
    decimal: Decimal,
    id: usize,
    delta: u32,
    alpha: i64,
}

impl Context {
    fn new(codes: CaseCodes, strategy: Strategy, rho: u32) -> Self {
        let (id_bits, skip_available) = match strategy {
            Strategy::Native => (0, None),
            Strategy::Buffered(bits) => (bits, None),
            Strategy::Skippable(n) => (0, Some(n)),
        };
        Context {
            codes,
            id_bits,
            references: vec![Decimal::ZERO; 1 << id_bits],
            next: 0,
            prev_q: 0,
            prev_delta: 0,
            skip_available,
            exception_run: 0,
            skipping: false,
            seeded: false,
            exceptions: ExceptionCoder::new(rho),
        }
    }

    /// the raw first value becomes every reference
    fn seed(&mut self, value: f64) {
        self.seeded = true;
        if let Some(d) = Decimal::from_f64(value, 0) {
            self.references.fill(d);
            self.prev_q = d.scale;
        }
    }

    /// best reference: smallest delta, then lowest index
    fn fit(&self, value: f64) -> Option<Fit> {
        let decimal = Decimal::from_f64(value, self.prev_q)?;
        self.references
            .iter()
            .enumerate()
            .filter_map(|(id, r)| shared_prefix(&decimal, r).map(|(delta, alpha)| (delta, id, alpha)))
            .min_by_key(|&(delta, id, _)| (delta, id))
            .map(|(delta, id, alpha)| Fit { decimal, id, delta, alpha })
    }

    fn case_of(&self, fit: &Fit) -> Case {
        if fit.decimal.scale != self.prev_q {
            Case::NewScale
        } else if fit.delta != self.prev_delta {
            Case::NewDelta
        } else {
            Case::Same
        }
    }

    fn accept(&mut self, decimal: Decimal, delta: u32) {
        self.prev_q = decimal.scale;
        self.prev_delta = delta;
        self.references[self.next] = decimal;
        self.next = (self.next + 1) % self.references.len();
        self.exception_run = 0;
    }

    fn exception_seen(&mut self) {
        self.exception_run += 1;
        if let Some(limit) = self.skip_available {
            if !self.skipping && self.exception_run >= limit {
                self.skipping = true;
                debug!(run = self.exception_run, "DeXOR switched to escape-only");
            }
        }
    }
}

/// DeXOR (and ATDP, DXOR) encoder
pub struct DeXorEncoder<W: Write> {
    out: BitWriter<W>,
    context: Context,
}

impl<W: Write> DeXorEncoder<W> {
    /// DeXOR case codes, strategy picked from `buffer_bits` / `skip_available`
    pub fn new(sink: W, config: &CodecConfig) -> Result<Self> {
        Self::with_strategy(sink, CaseCodes::DEXOR, Strategy::from_config(config)?, config)
    }

    /// plain strategy with the given case codes (ATDP, DXOR)
    pub fn native(sink: W, codes: CaseCodes, config: &CodecConfig) -> Result<Self> {
        Self::with_strategy(sink, codes, Strategy::Native, config)
    }

    /// everything explicit; `rho` still comes from the config
    pub fn with_strategy(sink: W, codes: CaseCodes, strategy: Strategy, config: &CodecConfig) -> Result<Self> {
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(DeXorEncoder { out: BitWriter::new(sink), context: Context::new(codes, strategy, rho) })
    }

    fn write_decimal(&mut self, fit: Fit) {
        let ctx = &mut self.context;
        let out = &mut self.out;
        let case = ctx.case_of(&fit);
        out.write(ctx.codes.code(case), 2);
        out.write(fit.id as u64, ctx.id_bits);
        if case == Case::NewScale {
            out.write((fit.decimal.scale + SCALE_BIAS) as u64, 5);
        }
        if case != Case::Same {
            out.write(fit.delta as u64, 4);
        }
        if fit.alpha == 0 {
            out.write_bool(fit.decimal.digits < 0);
        }
        let p = pow10_i64(fit.delta).unwrap_or(1);
        let beta = fit.decimal.digits.wrapping_sub(fit.alpha.wrapping_mul(p));
        out.write(beta.unsigned_abs(), decimal_bits(fit.delta));
        ctx.accept(fit.decimal, fit.delta);
    }
}

impl<W: Write> Encoder<W> for DeXorEncoder<W> {
    fn encode(&mut self, value: f64) -> Result<usize> {
        if !self.context.seeded {
            self.out.write_f64(value);
            self.context.seed(value);
        } else if self.context.skipping {
            self.context.exceptions.encode(value, &mut self.out);
        } else {
            match self.context.fit(value) {
                Some(fit) => self.write_decimal(fit),
                None => {
                    self.out.write(self.context.codes.exception, 2);
                    self.context.exceptions.encode(value, &mut self.out);
                    self.context.exception_seen();
                }
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

/// DeXOR (and ATDP, DXOR) decoder
pub struct DeXorDecoder<R: Read> {
    input: BitReader<R>,
    context: Context,
}

impl<R: Read> DeXorDecoder<R> {
    /// counterpart of [`DeXorEncoder::new`]
    pub fn new(source: R, config: &CodecConfig) -> Result<Self> {
        Self::with_strategy(source, CaseCodes::DEXOR, Strategy::from_config(config)?, config)
    }

    /// counterpart of [`DeXorEncoder::native`]
    pub fn native(source: R, codes: CaseCodes, config: &CodecConfig) -> Result<Self> {
        Self::with_strategy(source, codes, Strategy::Native, config)
    }

    /// counterpart of [`DeXorEncoder::with_strategy`]
    pub fn with_strategy(source: R, codes: CaseCodes, strategy: Strategy, config: &CodecConfig) -> Result<Self> {
        let rho = config.get_or(RHO, DEFAULT_RHO)?;
        Ok(DeXorDecoder { input: BitReader::new(source), context: Context::new(codes, strategy, rho) })
    }

    fn read_decimal(&mut self, case: Case) -> Result<f64> {
        let ctx = &mut self.context;
        let input = &mut self.input;
        let id = input.read(ctx.id_bits)? as usize;
        let q = if case == Case::NewScale { input.read(5)? as i32 - SCALE_BIAS } else { ctx.prev_q };
        let delta = if case == Case::Same { ctx.prev_delta } else { input.read(4)? as u32 };

        let reference = ctx.references.get(id).copied().unwrap_or(Decimal::ZERO);
        let alpha = reference.prefix(q + delta as i32).unwrap_or(0);
        let negative = alpha == 0 && input.read_bool()?;
        let beta = input.read(decimal_bits(delta))?;
        let decimal = Decimal::new(q, join_prefix(alpha, delta, beta, negative));
        ctx.accept(decimal, delta);
        Ok(decimal.to_f64())
    }
}

impl<R: Read> Decoder for DeXorDecoder<R> {
    fn decode_next(&mut self) -> Result<f64> {
        if !self.context.seeded {
            let value = self.input.read_f64()?;
            self.context.seed(value);
            return Ok(value);
        }
        if self.context.skipping {
            return self.context.exceptions.decode(&mut self.input);
        }
        match self.context.codes.case(self.input.read(2)?) {
            Case::Exception => {
                self.context.exception_seen();
                self.context.exceptions.decode(&mut self.input)
            }
            case => self.read_decimal(case),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{check_roundtrip, decimal_walk};
    use pretty_assertions::assert_eq;

    fn roundtrip(values: &[f64], codes: CaseCodes, strategy: Strategy) -> Vec<u8> {
        let c = CodecConfig::default();
        check_roundtrip(
            values,
            DeXorEncoder::with_strategy(Vec::new(), codes, strategy, &c).unwrap(),
            |r| DeXorDecoder::with_strategy(r, codes, strategy, &c).unwrap(),
        )
    }

    /// the case code each value gets, after the seed
    fn cases(values: &[f64], codes: CaseCodes) -> Vec<Case> {
        let mut enc = DeXorEncoder::native(Vec::new(), codes, &CodecConfig::default()).unwrap();
        let mut result = Vec::new();
        for &v in values {
            if enc.context.seeded {
                let case = enc.context.fit(v).map_or(Case::Exception, |f| enc.context.case_of(&f));
                result.push(case);
            }
            enc.encode(v).unwrap();
        }
        result
    }

    mod cases {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_scenario() {
            let values = [3.14, 3.14, 3.15, 2.0, f64::NAN];
            assert_eq!(
                cases(&values, CaseCodes::DEXOR),
                vec![Case::Same, Case::NewDelta, Case::NewScale, Case::Exception]
            );
            for codes in [CaseCodes::DEXOR, CaseCodes::ATDP] {
                roundtrip(&values, codes, Strategy::Native);
            }
        }

        #[test]
        fn test_costs() {
            let mut enc = DeXorEncoder::new(Vec::new(), &CodecConfig::default()).unwrap();
            assert_eq!(enc.encode(3.14).unwrap(), 64);
            // `10` + beta in 0 bits
            assert_eq!(enc.encode(3.14).unwrap(), 2);
            // `01` + delta 1 + beta 5 in 4 bits
            assert_eq!(enc.encode(3.15).unwrap(), 2 + 4 + 4);
            // `00` + scale + delta 1 + sign (prefix 0) + beta 2 in 4 bits
            assert_eq!(enc.encode(2.0).unwrap(), 2 + 5 + 4 + 1 + 4);
        }

        #[test]
        fn test_code_tables_differ() {
            let values = [1.5, 1.5, 1.5];
            let c = CodecConfig::default();
            let mut a = Box::new(DeXorEncoder::native(Vec::new(), CaseCodes::ATDP, &c).unwrap());
            let mut d = Box::new(DeXorEncoder::native(Vec::new(), CaseCodes::DEXOR, &c).unwrap());
            for v in values {
                a.encode(v).unwrap();
                d.encode(v).unwrap();
            }
            assert_ne!(a.into_inner().unwrap(), d.into_inner().unwrap());
        }
    }

    mod native {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_decimal_walk() {
            let values = decimal_walk(5000, 11);
            let bytes = roundtrip(&values, CaseCodes::DEXOR, Strategy::Native);
            assert!(bytes.len() * 8 < values.len() * 16);
        }

        #[test]
        fn test_quarter_steps() {
            let values: Vec<f64> = (0..1000).map(|i| i as f64 * 0.25).collect();
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Native);
        }

        #[test]
        fn test_monotonic_same_case() {
            let values = [1.23, 1.24, 1.25, 1.26, 1.27, 1.28, 1.29];
            assert_eq!(
                cases(&values, CaseCodes::DEXOR),
                vec![Case::NewDelta, Case::Same, Case::Same, Case::Same, Case::Same, Case::Same]
            );

            let mut enc = DeXorEncoder::new(Vec::new(), &CodecConfig::default()).unwrap();
            let costs: Vec<usize> = values.iter().map(|&v| enc.encode(v).unwrap()).collect();
            // seed, `01` + delta + beta, then `10` + beta only
            assert_eq!(costs, vec![64, 2 + 4 + 4, 2 + 4, 2 + 4, 2 + 4, 2 + 4, 2 + 4]);
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Native);
        }

        #[test]
        fn test_signs_and_zero() {
            let values = [0.0, -1.5, 1.5, -0.001, 0.0, 0.002, -12.0, 12.0, -0.0, 0.0];
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Native);
            roundtrip(&values, CaseCodes::ATDP, Strategy::Native);
        }

        #[test]
        fn test_specials_alternating() {
            let mut values = Vec::new();
            for i in 0..200 {
                values.push(if i % 2 == 0 { f64::NAN } else { f64::INFINITY });
                values.push(i as f64 / 10.0);
                values.push(f64::NEG_INFINITY);
                values.push(5e-324 * i as f64);
            }
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Native);
        }

        #[test]
        fn test_extreme_scales() {
            let values = [1e-20, 3e-20, 12345e11, 1e15, 123456789012345.6, -9007199254740991.0, 1e-19];
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Native);
        }
    }

    mod strategies {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_from_config() {
            let s = |c: &str| Strategy::from_config(&CodecConfig::parse(c)).unwrap();
            assert_eq!(s(""), Strategy::Native);
            assert_eq!(s("buffer_bits:3"), Strategy::Buffered(3));
            assert_eq!(s("skip_available:2"), Strategy::Skippable(2));
            assert_eq!(s("buffer_bits:3,skip_available:2"), Strategy::Buffered(3));
            assert!(Strategy::from_config(&CodecConfig::parse("buffer_bits:40")).is_err());
        }

        #[test]
        fn test_buffered_finds_older_reference() {
            // two interleaved series, the value two steps back is the better reference
            let values: Vec<f64> = (0..400).map(|i| if i % 2 == 0 { (100_000 + i) as f64 / 100.0 } else { 2.5 }).collect();
            let native = roundtrip(&values, CaseCodes::DEXOR, Strategy::Native);
            let buffered = roundtrip(&values, CaseCodes::DEXOR, Strategy::Buffered(2));
            assert!(buffered.len() < native.len());
        }

        #[test]
        fn test_buffered_with_specials() {
            let mut values = decimal_walk(300, 12);
            values[10] = f64::NAN;
            values[100] = -0.0;
            values[200] = 0.1 + 0.2;
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Buffered(4));
        }

        #[test]
        fn test_skippable_gives_up() {
            let values = [1.0, 2.0, f64::NAN, f64::INFINITY, f64::NAN, f64::NEG_INFINITY, 3.0, 4.0];
            let c = CodecConfig::default();
            let mut enc = DeXorEncoder::with_strategy(Vec::new(), CaseCodes::DEXOR, Strategy::Skippable(3), &c).unwrap();
            for &v in values.iter() {
                enc.encode(v).unwrap();
            }
            assert!(enc.context.skipping);
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Skippable(3));
        }

        #[test]
        fn test_skippable_resets_run() {
            let values = [1.0, f64::NAN, f64::NAN, 2.0, f64::NAN, f64::NAN, 3.0, 4.0];
            let c = CodecConfig::default();
            let mut enc = DeXorEncoder::with_strategy(Vec::new(), CaseCodes::DEXOR, Strategy::Skippable(3), &c).unwrap();
            for &v in values.iter() {
                enc.encode(v).unwrap();
            }
            assert!(!enc.context.skipping);
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Skippable(3));
            roundtrip(&values, CaseCodes::DEXOR, Strategy::Skippable(0));
        }
    }
}
