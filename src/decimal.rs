/// Most significant decimal digits a 64-bit float can need.
pub(crate) const MAX_DIGITS_F64: u32 = 17;

/// Most significant decimal digits a 32-bit float can need.
pub(crate) const MAX_DIGITS_F32: u32 = 8;

/// Ceiling on the digit-count probe. Any value still unresolved here is
/// reported at the maximum digit count and handled by the raw path.
const PROBE_LIMIT: u32 = 400;

const LOG2_10: f64 = 3.321928095;

/// Mantissa bits needed to preserve `alpha` decimal places, precomputed
/// as `ceil(alpha * log2(10))` for the common range.
const F_ALPHA: [u32; 21] = [
    0, 4, 7, 10, 14, 17, 20, 24, 27, 30, 34, 37, 40, 44, 47, 50, 54, 57, 60, 64, 67,
];

const POW_10: [f64; 21] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16,
    1e17, 1e18, 1e19, 1e20,
];

const POW_10_NEG: [f64; 21] = [
    1e0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10, 1e-11, 1e-12, 1e-13, 1e-14,
    1e-15, 1e-16, 1e-17, 1e-18, 1e-19, 1e-20,
];

const SP_GREATER: [f64; 10] = [1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9];

const SP_LESS: [f64; 11] = [
    1e0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10,
];

pub(crate) fn f_alpha(alpha: u32) -> u32 {
    if (alpha as usize) < F_ALPHA.len() {
        F_ALPHA[alpha as usize]
    } else {
        (alpha as f64 * LOG2_10).ceil() as u32
    }
}

/// `10^i`, saturating to infinity beyond the double range.
pub(crate) fn pow10(i: u32) -> f64 {
    if (i as usize) < POW_10.len() {
        POW_10[i as usize]
    } else {
        10f64.powi(i as i32)
    }
}

/// `10^-i`.
pub(crate) fn pow10_neg(i: u32) -> f64 {
    if (i as usize) < POW_10_NEG.len() {
        POW_10_NEG[i as usize]
    } else {
        10f64.powi(-(i as i32))
    }
}

/// Decimal order of magnitude of `v`: the integer p with
/// `10^p <= v < 10^(p+1)`. `v` must be positive and finite.
pub(crate) fn sp(v: f64) -> i32 {
    if v >= 1.0 {
        for i in 0..SP_GREATER.len() - 1 {
            if v < SP_GREATER[i + 1] {
                return i as i32;
            }
        }
    } else {
        for i in 1..SP_LESS.len() {
            if v >= SP_LESS[i] {
                return -(i as i32);
            }
        }
    }
    v.log10().floor() as i32
}

/// Like [`sp`], also reporting whether `v` is exactly one of the tabled
/// negative powers of ten. Values at or above one never set the flag.
fn sp_and_power_flag(v: f64) -> (i32, bool) {
    if v >= 1.0 {
        for i in 0..SP_GREATER.len() - 1 {
            if v < SP_GREATER[i + 1] {
                return (i as i32, false);
            }
        }
        (v.log10().floor() as i32, false)
    } else {
        for i in 1..SP_LESS.len() {
            if v >= SP_LESS[i] {
                return (-(i as i32), v == SP_LESS[i]);
            }
        }
        let log10v = v.log10();
        (log10v.floor() as i32, log10v == log10v.round())
    }
}

/// Counts the significant decimal digits of `v` by probing for the
/// smallest scale at which `v` becomes an integer. `last_beta_star`
/// seeds the probe near the previous value's count (`u32::MAX` when
/// unknown); the result does not depend on the seed.
fn significant_count(v: f64, sp: i32, last_beta_star: u32, max_digits: u32) -> i32 {
    let start = if last_beta_star != u32::MAX && last_beta_star != 0 {
        (last_beta_star as i32 - sp - 1).max(1)
    } else if last_beta_star == u32::MAX {
        max_digits as i32 - sp - 1
    } else if sp >= 0 {
        1
    } else {
        -sp
    };
    let mut i = start.max(0) as u32;

    let mut temp = v * pow10(i);
    let mut temp_int = temp as i64;
    while temp_int as f64 != temp {
        if i >= PROBE_LIMIT {
            return max_digits as i32;
        }
        i += 1;
        temp = v * pow10(i);
        temp_int = temp as i64;
    }
    if temp / pow10(i) != v {
        return max_digits as i32;
    }
    while i > 0 && temp_int % 10 == 0 {
        i -= 1;
        temp_int /= 10;
    }
    sp + i as i32 + 1
}

/// Returns `(alpha, beta_star)` for nonzero finite `v`: `alpha` is the
/// number of decimal places needed to write `v` exactly, `beta_star` its
/// significant digit count with zero reserved for exact powers of ten.
/// A value needing more than `max_digits` digits reports `max_digits`,
/// which callers treat as not decimally representable.
pub(crate) fn alpha_and_beta_star(v: f64, last_beta_star: u32, max_digits: u32) -> (i32, u32) {
    let v = v.abs();
    let (sp_v, is_power) = sp_and_power_flag(v);
    let beta = significant_count(v, sp_v, last_beta_star, max_digits);
    let beta_star = if is_power { 0 } else { beta as u32 };
    (beta - sp_v - 1, beta_star)
}

/// Rounds `v` away from zero at `alpha` decimal places, recovering the
/// value an erased mantissa was truncated from.
pub(crate) fn round_up(v: f64, alpha: u32) -> f64 {
    let scale = pow10(alpha);
    if v < 0.0 {
        (v * scale).floor() / scale
    } else {
        (v * scale).ceil() / scale
    }
}

// ── single-precision variants ───────────────────────────────────────────
//
// The probe must run in f32 arithmetic: a short decimal like 3.17f32
// widens to seventeen digits under f64, but scales back to an integer
// exactly under f32 rounding.

const POW_10_F32: [f32; 11] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10,
];

const POW_10_NEG_F32: [f32; 11] = [
    1e0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10,
];

const SP_GREATER_F32: [f32; 10] = [1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9];

const SP_LESS_F32: [f32; 11] = [
    1e0, 1e-1, 1e-2, 1e-3, 1e-4, 1e-5, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10,
];

fn pow10_32(i: u32) -> f32 {
    if (i as usize) < POW_10_F32.len() {
        POW_10_F32[i as usize]
    } else {
        10f32.powi(i as i32)
    }
}

pub(crate) fn pow10_neg_32(i: u32) -> f32 {
    if (i as usize) < POW_10_NEG_F32.len() {
        POW_10_NEG_F32[i as usize]
    } else {
        10f32.powi(-(i as i32))
    }
}

pub(crate) fn sp32(v: f32) -> i32 {
    if v >= 1.0 {
        for i in 0..SP_GREATER_F32.len() - 1 {
            if v < SP_GREATER_F32[i + 1] {
                return i as i32;
            }
        }
    } else {
        for i in 1..SP_LESS_F32.len() {
            if v >= SP_LESS_F32[i] {
                return -(i as i32);
            }
        }
    }
    v.log10().floor() as i32
}

fn sp32_and_power_flag(v: f32) -> (i32, bool) {
    if v >= 1.0 {
        for i in 0..SP_GREATER_F32.len() - 1 {
            if v < SP_GREATER_F32[i + 1] {
                return (i as i32, false);
            }
        }
        (v.log10().floor() as i32, false)
    } else {
        for i in 1..SP_LESS_F32.len() {
            if v >= SP_LESS_F32[i] {
                return (-(i as i32), v == SP_LESS_F32[i]);
            }
        }
        let log10v = v.log10();
        (log10v.floor() as i32, log10v == log10v.round())
    }
}

fn significant_count32(v: f32, sp: i32, last_beta_star: u32) -> i32 {
    let start = if last_beta_star != u32::MAX && last_beta_star != 0 {
        (last_beta_star as i32 - sp - 1).max(1)
    } else if last_beta_star == u32::MAX {
        MAX_DIGITS_F32 as i32 - sp - 1
    } else if sp >= 0 {
        1
    } else {
        -sp
    };
    let mut i = start.max(0) as u32;

    let mut temp = v * pow10_32(i);
    let mut temp_int = temp as i64;
    while temp_int as f32 != temp {
        if i >= PROBE_LIMIT {
            return MAX_DIGITS_F32 as i32;
        }
        i += 1;
        temp = v * pow10_32(i);
        temp_int = temp as i64;
    }
    if temp / pow10_32(i) != v {
        return MAX_DIGITS_F32 as i32;
    }
    while i > 0 && temp_int % 10 == 0 {
        i -= 1;
        temp_int /= 10;
    }
    sp + i as i32 + 1
}

/// Single-precision counterpart of [`alpha_and_beta_star`].
pub(crate) fn alpha_and_beta_star32(v: f32, last_beta_star: u32) -> (i32, u32) {
    let v = v.abs();
    let (sp_v, is_power) = sp32_and_power_flag(v);
    let beta = significant_count32(v, sp_v, last_beta_star);
    let beta_star = if is_power { 0 } else { beta as u32 };
    (beta - sp_v - 1, beta_star)
}

/// Single-precision counterpart of [`round_up`].
pub(crate) fn round_up32(v: f32, alpha: u32) -> f32 {
    let scale = pow10_32(alpha);
    if v < 0.0 {
        (v * scale).floor() / scale
    } else {
        (v * scale).ceil() / scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f_alpha_table_and_fallback() {
        assert_eq!(f_alpha(0), 0);
        assert_eq!(f_alpha(1), 4);
        assert_eq!(f_alpha(3), 10);
        assert_eq!(f_alpha(20), 67);
        assert_eq!(f_alpha(21), 70);
        assert_eq!(f_alpha(30), 100);
    }

    #[test]
    fn test_sp_magnitudes() {
        assert_eq!(sp(1.0), 0);
        assert_eq!(sp(9.99), 0);
        assert_eq!(sp(123.4), 2);
        assert_eq!(sp(0.05), -2);
        assert_eq!(sp(0.1), -1);
        assert_eq!(sp(1e12), 12);
        assert_eq!(sp(1e-15), -15);
    }

    #[test]
    fn test_power_of_ten_flag() {
        assert_eq!(alpha_and_beta_star(0.1, u32::MAX, MAX_DIGITS_F64), (1, 0));
        assert_eq!(alpha_and_beta_star(0.001, u32::MAX, MAX_DIGITS_F64), (3, 0));
        let (_, beta_star) = alpha_and_beta_star(0.25, u32::MAX, MAX_DIGITS_F64);
        assert_ne!(beta_star, 0);
        let (_, beta_star) = alpha_and_beta_star(10.0, u32::MAX, MAX_DIGITS_F64);
        assert_ne!(beta_star, 0);
    }

    #[test]
    fn test_digit_counts() {
        assert_eq!(alpha_and_beta_star(0.25, u32::MAX, MAX_DIGITS_F64), (2, 2));
        assert_eq!(alpha_and_beta_star(3.14, u32::MAX, MAX_DIGITS_F64), (2, 3));
        assert_eq!(alpha_and_beta_star(100.0, u32::MAX, MAX_DIGITS_F64), (0, 3));
        assert_eq!(alpha_and_beta_star(-7.5, u32::MAX, MAX_DIGITS_F64), (1, 2));
    }

    #[test]
    fn test_probe_seed_does_not_change_result() {
        for seed in [u32::MAX, 0, 1, 5, 14] {
            assert_eq!(alpha_and_beta_star(0.25, seed, MAX_DIGITS_F64), (2, 2));
        }
    }

    #[test]
    fn test_unrepresentable_value_reports_max_digits() {
        // 0.1 + 0.2 carries the full mantissa's worth of decimal digits.
        let v = 0.1 + 0.2;
        let (alpha, beta_star) = alpha_and_beta_star(v, u32::MAX, MAX_DIGITS_F64);
        assert_eq!(beta_star, MAX_DIGITS_F64);
        assert_eq!(alpha, MAX_DIGITS_F64 as i32);
    }

    #[test]
    fn test_probe_is_bounded_for_subnormals() {
        // The scale probe overflows to infinity long before an integer
        // appears; the count must still come back, at the maximum.
        let (alpha, beta_star) = alpha_and_beta_star(1e-310, u32::MAX, MAX_DIGITS_F64);
        assert!(alpha > 300);
        assert!(beta_star == MAX_DIGITS_F64 || beta_star == 0);
    }

    #[test]
    fn test_round_up_recovers_truncation() {
        assert_eq!(round_up(0.2999999999, 1), 0.3);
        assert_eq!(round_up(-0.2999999999, 1), -0.3);
        assert_eq!(round_up(2.998, 0), 3.0);
        assert_eq!(round_up(99.9999993, 2), 100.0);
    }

    #[test]
    fn test_digit_counts_f32() {
        // Under f64 these widen to long tails; f32 arithmetic scales
        // them back to integers at the written precision.
        assert_eq!(alpha_and_beta_star32(3.17, u32::MAX), (2, 3));
        assert_eq!(alpha_and_beta_star32(0.25, u32::MAX), (2, 2));
        assert_eq!(alpha_and_beta_star32(100.0, u32::MAX), (0, 3));
        assert_eq!(alpha_and_beta_star32(0.1, u32::MAX), (1, 0));
    }

    #[test]
    fn test_round_up_f32() {
        assert_eq!(round_up32(3.1699, 2), 3.17);
        assert_eq!(round_up32(-0.2999, 1), -0.3);
    }
}
