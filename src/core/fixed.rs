//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for the fortress simulation.
//! All operations use integer arithmetic only - no floats in the tick path.
//!
//! ## Format: Q16.16
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Bit Layout: Q16.16 (32-bit signed integer)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  [S][IIIIIIIIIIIIIIII][FFFFFFFFFFFFFFFF]                    │
//! │   │  └──── 16 bits ────┘└──── 16 bits ────┘                 │
//! │   └─ Sign bit                                               │
//! │                                                             │
//! │  Range: -32768.0 to +32767.99998 (approx)                   │
//! │  Precision: 1/65536 ≈ 0.000015 units                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//!
//! Multiplication and division widen to i64 and truncate toward zero.
//! Addition and subtraction wrap. Division by zero saturates instead of
//! panicking so a hostile input can never abort a verification.

/// Q16.16 fixed-point number stored as i32.
pub type Fixed = i32;

/// Number of fractional bits (16)
pub const FIXED_SCALE: i32 = 16;

/// 1.0 in fixed-point (65536)
pub const FIXED_ONE: Fixed = 1 << FIXED_SCALE;

/// 0.5 in fixed-point (32768)
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

/// Maximum positive value
pub const FIXED_MAX: Fixed = i32::MAX;

/// Minimum negative value
pub const FIXED_MIN: Fixed = i32::MIN;

// =============================================================================
// FIELD CONSTANTS (integer literals only)
// =============================================================================

/// Length of the battlefield along X: 40.0 units. Fortress sits at x = 0,
/// enemies enter at x = FIELD_LENGTH.
pub const FIELD_LENGTH: Fixed = 40 * FIXED_ONE;

/// Half-height of the lane band: 6.0 units.
pub const FIELD_HALF_HEIGHT: Fixed = 6 * FIXED_ONE;

/// Fortress wall radius: 1.5 units. Enemies stop at the wall.
pub const FORTRESS_RADIUS: Fixed = 98304;

// =============================================================================
// CORE OPERATIONS
// =============================================================================

/// Convert an integer to fixed-point.
#[inline]
pub const fn fixed_from_int(i: i32) -> Fixed {
    i << FIXED_SCALE
}

/// Convert a float to fixed-point, truncating toward zero.
///
/// # Warning
/// Only use for configuration and tests. NEVER in the tick loop.
///
/// # Example
/// ```
/// use fortress_sim::core::fixed::{fixed_from_float, FIXED_ONE};
/// assert_eq!(fixed_from_float(2.5), FIXED_ONE * 2 + FIXED_ONE / 2);
/// ```
#[inline]
pub fn fixed_from_float(f: f64) -> Fixed {
    (f * FIXED_ONE as f64) as Fixed
}

/// Convert fixed-point to float for display and summaries.
///
/// # Warning
/// Only use for visual or reporting output. NEVER feed the result back
/// into the simulation.
#[inline]
pub fn fixed_to_float(f: Fixed) -> f64 {
    f as f64 / FIXED_ONE as f64
}

/// Integer part of a fixed-point value, truncated toward zero.
#[inline]
pub fn fixed_to_int(f: Fixed) -> i32 {
    f / FIXED_ONE
}

/// Add two fixed-point numbers (wrapping).
#[inline]
pub fn fixed_add(a: Fixed, b: Fixed) -> Fixed {
    a.wrapping_add(b)
}

/// Subtract two fixed-point numbers (wrapping).
#[inline]
pub fn fixed_sub(a: Fixed, b: Fixed) -> Fixed {
    a.wrapping_sub(b)
}

/// Multiply two fixed-point numbers.
///
/// Widens to i64, multiplies, then divides by 2^16 which truncates toward
/// zero. The final narrowing to i32 wraps.
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide / FIXED_ONE as i64) as Fixed
}

/// Divide two fixed-point numbers.
///
/// Pre-shifts the numerator to keep precision and truncates toward zero.
/// Division by zero returns `FIXED_MAX` for a non-negative numerator and
/// `FIXED_MIN` otherwise.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return if a >= 0 { FIXED_MAX } else { FIXED_MIN };
    }
    let wide = (a as i64) << FIXED_SCALE;
    (wide / b as i64) as Fixed
}

/// Square root of a fixed-point number.
///
/// Runs Newton's method on the raw integer until it stops decreasing, then
/// scales by 2^8 (the square root of 2^16). Non-positive inputs return 0.
///
/// Prefer comparing squared distances when possible.
#[inline]
pub fn fixed_sqrt(x: Fixed) -> Fixed {
    if x <= 0 {
        return 0;
    }

    let raw = x as i64;
    let mut guess = raw;
    let mut next = (guess + 1) >> 1;
    while next < guess {
        guess = next;
        next = (guess + raw / guess) >> 1;
    }

    (guess << 8) as Fixed
}

/// Absolute value of a fixed-point number.
#[inline]
pub fn fixed_abs(x: Fixed) -> Fixed {
    if x < 0 { x.wrapping_neg() } else { x }
}

/// Minimum of two fixed-point numbers.
#[inline]
pub fn fixed_min(a: Fixed, b: Fixed) -> Fixed {
    if a < b { a } else { b }
}

/// Maximum of two fixed-point numbers.
#[inline]
pub fn fixed_max(a: Fixed, b: Fixed) -> Fixed {
    if a > b { a } else { b }
}

/// Clamp a fixed-point number to a range.
#[inline]
pub fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    fixed_max(min, fixed_min(max, value))
}

/// Scale a value by an integer percentage (150 = 1.5x), truncating toward zero.
#[inline]
pub fn fixed_percent(value: Fixed, pct: i32) -> Fixed {
    ((value as i64 * pct as i64) / 100) as Fixed
}

// =============================================================================
// TESTS
// =============================================================================
