//! Erasure arithmetic of the Elf family.
//!
//! A double `v` with `beta` significant decimal digits can be rebuilt from any
//! `v'` that lies between `v` and the next decimal at that precision, by rounding
//! `v'` away from zero at `alpha = beta - sp - 1` decimal places (`sp` being the
//! position of the leading digit). So the low mantissa bits of `v` can be zeroed
//! ("erased") and only `beta*` has to be stored, see [`erase`] and [`recover`].
//!
//! `beta* = 0` is the special case `v = 10^-i`.
use crate::decimal::F64_POW10;
use crate::exception::exponent;

/// beta* symbol meaning "value kept as is"
pub const NOT_ERASED: u32 = 16;

/// f(alpha) = ceil(alpha * log2(10)) for small alpha
const F_ALPHA: [i32; 21] = [0, 4, 7, 10, 14, 17, 20, 24, 27, 30, 34, 37, 40, 44, 47, 50, 54, 57, 60, 64, 67];
const LOG2_10: f64 = std::f64::consts::LOG2_10;

/// `10^i` as the nearest double
pub(crate) fn pow10(i: i32) -> f64 {
    if (0..=22).contains(&i) {
        F64_POW10[i as usize]
    } else if (-22..0).contains(&i) {
        1.0 / F64_POW10[(-i) as usize]
    } else {
        // out of the exact range, let the float parser round it
        format!("1e{i}").parse().unwrap_or(f64::NAN)
    }
}

/// minimal number of bits to hold `alpha` decimal places
fn f_alpha(alpha: i32) -> i32 {
    match alpha {
        a if a < 0 => 0,
        a if (a as usize) < F_ALPHA.len() => F_ALPHA[a as usize],
        a => (a as f64 * LOG2_10).ceil() as i32,
    }
}

/// Exponent of the leading decimal digit of `v > 0`, and whether `v == 10^sp` for `v < 1`.
fn significand_position(v: f64) -> (i32, bool) {
    if v >= 1.0 {
        if let Some(i) = (0..10).find(|&i| v < F64_POW10[i + 1]) {
            return (i as i32, false);
        }
    } else if let Some(i) = (1..=10).find(|&i| v >= pow10(-i)) {
        return (-i, v == pow10(-i));
    }
    let log10v = v.log10();
    let sp = log10v.floor() as i32;
    (sp, v < 1.0 && log10v == log10v.trunc())
}

/// position of the leading decimal digit
pub(crate) fn sp(v: f64) -> i32 {
    significand_position(v).0
}

/// Number of significant decimal digits of `v > 0`, 17 if it has (too) many.
/// `last_beta_star` only steers where the search starts.
fn significant_count(v: f64, sp: i32, last_beta_star: Option<u32>) -> i32 {
    let mut i = match last_beta_star {
        Some(b) if b != 0 => (b as i32 - sp - 1).max(1),
        None => 17 - sp - 1,
        Some(_) if sp >= 0 => 1,
        Some(_) => -sp,
    };
    // beyond 17 digits every double is an integer anyway; bound the search
    let limit = 17 - sp + 1;
    let mut temp = v * pow10(i);
    let mut temp_long = temp as i64;
    while temp_long as f64 != temp {
        i += 1;
        if i > limit {
            return 17;
        }
        temp = v * pow10(i);
        temp_long = temp as i64;
    }
    if temp / pow10(i) != v {
        return 17;
    }
    while i > 0 && temp_long % 10 == 0 {
        i -= 1;
        temp_long /= 10;
    }
    sp + i + 1
}

/// `(alpha, beta*)` of a nonzero finite `v`
pub(crate) fn alpha_and_beta_star(v: f64, last_beta_star: Option<u32>) -> (i32, i32) {
    let v = v.abs();
    let (sp, ten_power) = significand_position(v);
    let beta = significant_count(v, sp, last_beta_star);
    let beta_star = if ten_power { 0 } else { beta };
    (beta - sp - 1, beta_star)
}

/// round `v` away from zero at `alpha` decimal places
fn round_up(v: f64, alpha: i32) -> f64 {
    let scale = pow10(alpha);
    if v < 0.0 {
        (v * scale).floor() / scale
    } else {
        (v * scale).ceil() / scale
    }
}

/// Outcome of [`erase`]: the bits to XOR-code and the beta* needed to undo it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erasure {
    /// the (possibly) erased bit pattern
    pub bits: u64,
    /// `None` if nothing was erased
    pub beta_star: Option<u32>,
}

impl Erasure {
    /// symbol used in the beta* histograms (0..=15, or [`NOT_ERASED`])
    pub fn symbol(&self) -> usize {
        self.beta_star.unwrap_or(NOT_ERASED) as usize
    }
}

/// Zero the low mantissa bits of `v` if that saves more than 4 bits and [`recover`]
/// gives back exactly `v`. Zero, NaN, infinities keep their bits.
pub fn erase(v: f64, last_beta_star: Option<u32>) -> Erasure {
    let bits = v.to_bits();
    let keep = Erasure { bits, beta_star: None };
    if v == 0.0 || !v.is_finite() {
        return keep;
    }

    let (alpha, beta_star) = alpha_and_beta_star(v, last_beta_star);
    if !(0..NOT_ERASED as i32).contains(&beta_star) || alpha < 0 {
        return keep;
    }
    let g_alpha = f_alpha(alpha) + exponent(bits) as i32 - 1023;
    let erase_bits = 52 - g_alpha;
    if !(5..=52).contains(&erase_bits) {
        return keep;
    }
    let mask = u64::MAX << erase_bits;
    if bits & !mask == 0 {
        return keep;
    }
    let erased = bits & mask;
    let beta_star = beta_star as u32;
    if recover(f64::from_bits(erased), beta_star).to_bits() != bits {
        return keep;
    }
    Erasure { bits: erased, beta_star: Some(beta_star) }
}

/// Rebuild the original value from an erased one.
pub fn recover(v_prime: f64, beta_star: u32) -> f64 {
    let sp = sp(v_prime.abs());
    if beta_star == 0 {
        let r = pow10(sp + 1);
        if v_prime < 0.0 { -r } else { r }
    } else {
        round_up(v_prime, beta_star as i32 - sp - 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sp() {
        assert_eq!(sp(1.0), 0);
        assert_eq!(sp(9.99), 0);
        assert_eq!(sp(10.0), 1);
        assert_eq!(sp(123456.0), 5);
        assert_eq!(sp(0.5), -1);
        assert_eq!(sp(0.1), -1);
        assert_eq!(sp(0.0999), -2);
        assert_eq!(sp(5e12), 12);
        assert_eq!(sp(3e-15), -15);
    }

    #[test]
    fn test_significant_digits() {
        assert_eq!(alpha_and_beta_star(3.14, None), (2, 3));
        assert_eq!(alpha_and_beta_star(-3.14, Some(0)), (2, 3));
        assert_eq!(alpha_and_beta_star(3.14, Some(5)), (2, 3));
        assert_eq!(alpha_and_beta_star(0.01, None), (2, 0));
        assert_eq!(alpha_and_beta_star(123.0, Some(0)), (0, 3));
        assert_eq!(alpha_and_beta_star(0.1 + 0.2, None).1, 17);
    }

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0), 1.0);
        assert_eq!(pow10(3), 1000.0);
        assert_eq!(pow10(-3), 0.001);
        assert_eq!(pow10(-30), 1e-30);
        assert_eq!(pow10(30), 1e30);
        assert_eq!(pow10(400), f64::INFINITY);
    }

    #[test]
    fn test_erase_recover() {
        for &v in &[3.14, -3.14, 0.01, 100.3, 12345.678, 1e-5, -0.3, 2.71828, 99.99] {
            let e = erase(v, None);
            assert!(e.beta_star.is_some(), "{v} should be erasable");
            assert!(e.bits.trailing_zeros() >= 5);
            assert_eq!(recover(f64::from_bits(e.bits), e.beta_star.unwrap()).to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_not_erased() {
        for &v in &[0.0, -0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1.0, 0.5, 5e-324, 0.1 + 0.2, std::f64::consts::E] {
            let e = erase(v, None);
            assert_eq!(e.beta_star, None, "{v}");
            assert_eq!(e.bits, v.to_bits());
            assert_eq!(e.symbol(), NOT_ERASED as usize);
        }
    }

    #[test]
    fn test_random_decimals_always_recover() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut last = None;
        for _ in 0..20_000 {
            let digits: i64 = rng.gen_range(-1_000_000..1_000_000);
            let v = digits as f64 / pow10(rng.gen_range(0..8));
            let e = erase(v, last);
            if let Some(b) = e.beta_star {
                last = Some(b);
                assert_eq!(recover(f64::from_bits(e.bits), b).to_bits(), v.to_bits());
            } else {
                assert_eq!(e.bits, v.to_bits());
            }
        }
    }
}
