//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point numbers for cross-platform simulation.
//! All game physics and state hashing operates on these values instead
//! of floats, so two conforming implementations produce identical
//! results given identical input traces.

use thiserror::Error;

/// Raw fixed-point storage: signed Q16.16, 16 integer bits, 16
/// fractional bits.
pub type Fixed = i32;

/// Number of fractional bits.
pub const FIXED_SCALE: u32 = 16;

/// Fixed-point representation of `1.0`.
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// Fixed-point representation of `0.5`.
pub const FIXED_HALF: Fixed = FIXED_ONE / 2;

/// Largest representable fixed-point value.
pub const FIXED_MAX: Fixed = Fixed::MAX;

/// Smallest representable fixed-point value.
pub const FIXED_MIN: Fixed = Fixed::MIN;

/// Arithmetic errors raised by fixed-point operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    /// Division by a zero fixed-point value.
    #[error("fixed-point division by zero")]
    DivisionByZero,
}

/// Convert a float literal to fixed-point at compile time.
///
/// Only intended for constant construction (game tuning constants);
/// runtime float conversion should go through [`from_float`].
pub const fn to_fixed(v: f64) -> Fixed {
    (v * (1i64 << FIXED_SCALE) as f64) as Fixed
}

/// Convert a float to fixed-point, truncating toward zero.
#[inline]
pub fn from_float(v: f64) -> Fixed {
    (v * (1i64 << FIXED_SCALE) as f64) as Fixed
}

/// Convert an integer to fixed-point.
#[inline]
pub const fn from_int(v: i32) -> Fixed {
    v << FIXED_SCALE
}

/// Construct a fixed-point value directly from its raw representation.
#[inline]
pub const fn from_raw(raw: i32) -> Fixed {
    raw
}

/// Convert fixed-point to a float (for rendering/debugging only).
#[inline]
pub fn to_float(v: Fixed) -> f64 {
    v as f64 / (1i64 << FIXED_SCALE) as f64
}

/// Convert fixed-point to an integer, truncating toward zero.
#[inline]
pub fn to_int(v: Fixed) -> i32 {
    v / FIXED_ONE
}

/// Multiply two fixed-point values.
///
/// Widens to i64 to avoid overflow on the intermediate product, then
/// shifts back down by the fractional bit count.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    (((a as i64) * (b as i64)) >> FIXED_SCALE) as Fixed
}

/// Multiply a fixed-point value by a plain integer scalar.
///
/// Cheaper than [`fixed_mul`] since no shift is needed: `raw * k` is
/// already in Q16.16 terms.
#[inline]
pub fn fixed_mul_int(a: Fixed, k: i32) -> Fixed {
    a.wrapping_mul(k)
}

/// Divide two fixed-point values.
///
/// Returns [`ArithmeticError::DivisionByZero`] when `b` is zero rather
/// than silently returning zero.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Result<Fixed, ArithmeticError> {
    if b == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    Ok((((a as i64) << FIXED_SCALE) / (b as i64)) as Fixed)
}

/// Integer square root via Newton-Raphson, fixed at six iterations for
/// determinism (no data-dependent loop bound).
#[inline]
pub fn fixed_sqrt(v: Fixed) -> Fixed {
    if v <= 0 {
        return 0;
    }
    let mut x = v;
    for _ in 0..6 {
        if x == 0 {
            break;
        }
        let next = fixed_div(x + fixed_div(v, x).unwrap_or(0), from_int(2)).unwrap_or(x);
        x = next;
    }
    x
}

/// Absolute value.
#[inline]
pub fn fixed_abs(v: Fixed) -> Fixed {
    v.wrapping_abs()
}

/// Minimum of two fixed-point values.
#[inline]
pub fn fixed_min(a: Fixed, b: Fixed) -> Fixed {
    if a < b { a } else { b }
}

/// Maximum of two fixed-point values.
#[inline]
pub fn fixed_max(a: Fixed, b: Fixed) -> Fixed {
    if a > b { a } else { b }
}

/// Clamp a fixed-point value to `[min, max]`.
#[inline]
pub fn fixed_clamp(v: Fixed, min: Fixed, max: Fixed) -> Fixed {
    fixed_max(min, fixed_min(max, v))
}

/// Linear interpolation. `t = 0` returns `a`, `t = FIXED_ONE` returns `b`.
#[inline]
pub fn fixed_lerp(a: Fixed, b: Fixed, t: Fixed) -> Fixed {
    a.wrapping_add(fixed_mul(b.wrapping_sub(a), t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(FIXED_ONE, 65536);
        assert_eq!(FIXED_HALF, 32768);
    }

    #[test]
    fn test_to_fixed_and_back() {
        let v = to_fixed(3.5);
        assert_eq!(v, 229376);
        assert!((to_float(v) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_int_to_int() {
        assert_eq!(from_int(5), 5 * FIXED_ONE);
        assert_eq!(to_int(from_int(5)), 5);
        // Truncation toward zero, not floor, for negative values.
        assert_eq!(to_int(from_int(-3) + FIXED_HALF), -2);
    }

    #[test]
    fn test_mul() {
        let a = to_fixed(2.0);
        let b = to_fixed(3.0);
        assert_eq!(fixed_mul(a, b), to_fixed(6.0));
    }

    #[test]
    fn test_mul_int() {
        let a = to_fixed(2.5);
        assert_eq!(fixed_mul_int(a, 4), to_fixed(10.0));
    }

    #[test]
    fn test_div() {
        let a = to_fixed(6.0);
        let b = to_fixed(2.0);
        assert_eq!(fixed_div(a, b).unwrap(), to_fixed(3.0));
    }

    #[test]
    fn test_div_by_zero_errors() {
        let a = to_fixed(6.0);
        assert_eq!(fixed_div(a, 0), Err(ArithmeticError::DivisionByZero));
    }

    #[test]
    fn test_sqrt() {
        let v = to_fixed(16.0);
        let root = fixed_sqrt(v);
        assert!((to_float(root) - 4.0).abs() < 0.01);

        assert_eq!(fixed_sqrt(0), 0);
        assert_eq!(fixed_sqrt(-5), 0);
    }

    #[test]
    fn test_clamp() {
        let min = to_fixed(-1.0);
        let max = to_fixed(1.0);
        assert_eq!(fixed_clamp(to_fixed(5.0), min, max), max);
        assert_eq!(fixed_clamp(to_fixed(-5.0), min, max), min);
        assert_eq!(fixed_clamp(to_fixed(0.5), min, max), to_fixed(0.5));
    }

    #[test]
    fn test_determinism_over_many_iterations() {
        let a = to_fixed(1.23456);
        let b = to_fixed(7.891011);
        let first = fixed_mul(a, b);
        for _ in 0..1000 {
            assert_eq!(fixed_mul(a, b), first);
        }
    }
}
