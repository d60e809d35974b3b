//! Exact decimal view of a double: `value == digits * 10^scale`.
//!
//! `digits` stays below 2^53 in magnitude and `scale` within [`MIN_SCALE`]..=[`MAX_SCALE`],
//! so that [`Decimal::to_f64`] is a single, correctly rounded multiplication or division
//! by an exactly representable power of ten. A value "is" a decimal only if that
//! reconstruction gives back its very bit pattern, there is no tolerance involved.
//!
//! # Example
//! ```rust
//! # use decxor::decimal::Decimal;
//! let d = Decimal::from_f64(3.14, 0).unwrap();
//! assert_eq!((d.scale, d.digits), (-2, 314));
//! assert_eq!(d.prefix(-1), Some(31));
//! assert_eq!(d.to_f64(), 3.14);
//! ```

/// smallest decimal exponent we model
pub const MIN_SCALE: i32 = -20;
/// largest decimal exponent we model
pub const MAX_SCALE: i32 = 11;
/// offset that makes a scale non-negative (fits into 5 bits)
pub const SCALE_BIAS: i32 = 20;
/// digits must stay below this to convert exactly
const DIGITS_LIMIT: f64 = 9007199254740992.0; // 2^53

/// exact powers of ten as doubles
pub(crate) const F64_POW10: [f64; 23] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11,
    1e12, 1e13, 1e14, 1e15, 1e16, 1e17, 1e18, 1e19, 1e20, 1e21, 1e22,
];

/// bits needed to store a residual with `delta` decimal digits: ceil(delta * log2(10))
pub const DECIMAL_BITS: [u32; 16] = [0, 4, 7, 10, 14, 17, 20, 24, 27, 30, 34, 37, 40, 44, 47, 50];

/// `10^k` as integer, `None` if it doesn't fit
#[inline]
pub fn pow10_i64(k: u32) -> Option<i64> {
    10_i64.checked_pow(k)
}

/// bit width for a residual of `delta` digits
#[inline]
pub fn decimal_bits(delta: u32) -> u32 {
    DECIMAL_BITS[delta as usize]
}

/// number of decimal digits of `|n|` (0 for 0)
pub fn digit_count(n: i64) -> u32 {
    let mut m = n.unsigned_abs();
    let mut c = 0;
    while m > 0 {
        m /= 10;
        c += 1;
    }
    c
}

/// A double written as `digits * 10^scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    /// decimal exponent
    pub scale: i32,
    /// signed significand
    pub digits: i64,
}

impl Decimal {
    /// Zero at scale 0, the reference before the first value.
    pub const ZERO: Decimal = Decimal { scale: 0, digits: 0 };

    /// build from parts, no checks
    pub fn new(scale: i32, digits: i64) -> Self {
        Decimal { scale, digits }
    }

    /// the double this decimal stands for
    pub fn to_f64(&self) -> f64 {
        let n = self.digits as f64;
        if self.scale >= 0 {
            n * F64_POW10[self.scale as usize]
        } else {
            n / F64_POW10[(-self.scale) as usize]
        }
    }

    /// `v` at a given scale, if it's exact there
    fn exact_at(v: f64, scale: i32) -> Option<Decimal> {
        let n = if scale >= 0 {
            (v / F64_POW10[scale as usize]).round()
        } else {
            (v * F64_POW10[(-scale) as usize]).round()
        };
        if !(n.abs() < DIGITS_LIMIT) {
            return None;
        }
        let d = Decimal { scale, digits: n as i64 };
        (d.to_f64().to_bits() == v.to_bits()).then_some(d)
    }

    /// Decompose `v` using the largest scale that reproduces it exactly.
    ///
    /// The search starts at `hint` (usually the previous value's scale) and walks up
    /// while the value stays exact, or down until it becomes exact.
    /// `None` for NaN, infinities, -0.0 and anything with too many digits.
    pub fn from_f64(v: f64, hint: i32) -> Option<Decimal> {
        if !v.is_finite() {
            return None;
        }
        let hint = hint.clamp(MIN_SCALE, MAX_SCALE);
        // +0.0 is exact everywhere, stay where the stream is
        if v.to_bits() == 0 {
            return Some(Decimal::new(hint, 0));
        }
        // finer scales first when the hint misses, those are what a miss usually means
        let mut best = Self::exact_at(v, hint)
            .or_else(|| (MIN_SCALE..hint).rev().find_map(|s| Self::exact_at(v, s)))
            .or_else(|| (hint + 1..=MAX_SCALE).find_map(|s| Self::exact_at(v, s)))?;
        while best.scale < MAX_SCALE {
            match Self::exact_at(v, best.scale + 1) {
                Some(d) => best = d,
                None => break,
            }
        }
        Some(best)
    }

    /// `trunc(value / 10^exp)`, computed on the integers.
    /// `None` if the result doesn't fit an i64 (only possible for `exp < scale`).
    pub fn prefix(&self, exp: i32) -> Option<i64> {
        if self.digits == 0 {
            return Some(0);
        }
        if exp >= self.scale {
            let k = (exp - self.scale) as u32;
            // 10^19 and above exceed every i64
            Some(pow10_i64(k).map_or(0, |p| self.digits / p))
        } else {
            let k = (self.scale - exp) as u32;
            pow10_i64(k).and_then(|p| self.digits.checked_mul(p))
        }
    }

    /// true for the decimal encoding of +0.0
    pub fn is_zero(&self) -> bool {
        self.digits == 0
    }
}

/// Smallest `delta` in `0..16` such that `value` and `reference` agree on all digits at
/// and above `10^(value.scale + delta)`. Returns `(delta, shared_prefix)`.
pub fn shared_prefix(value: &Decimal, reference: &Decimal) -> Option<(u32, i64)> {
    (0..16_u32).find_map(|delta| {
        let exp = value.scale + delta as i32;
        match (value.prefix(exp), reference.prefix(exp)) {
            (Some(a), Some(b)) if a == b => Some((delta, a)),
            _ => None,
        }
    })
}

/// Rebuild the digits from a shared prefix, `delta` and the magnitude of the residual.
/// The residual carries the prefix's sign, or `negative` when the prefix is zero.
pub fn join_prefix(alpha: i64, delta: u32, beta: u64, negative: bool) -> i64 {
    let p = pow10_i64(delta).unwrap_or(0);
    let beta = beta as i64;
    let signed_beta = if alpha < 0 || (alpha == 0 && negative) { beta.wrapping_neg() } else { beta };
    alpha.wrapping_mul(p).wrapping_add(signed_beta)
}
