//! Numeric modes of the scorer.
//!
//! The strategies are written once, generic over [`Arithmetic`], and
//! instantiated for [`FloatArithmetic`] (f32 values and scores) and
//! [`IntegerArithmetic`] (values and weights quantized to thousandths,
//! accumulated in u64).

use std::cmp::Ordering;
use std::fmt::Debug;

use crate::models::config::NumericMode;

/// Quantization scale of the integer mode.
pub const INT_SCALE: f32 = 1000.0;

pub trait ScoreValue: Copy + Default + PartialEq + Send + Sync + Debug + 'static {
    /// Total order used for ranking, higher is better.
    fn score_cmp(&self, other: &Self) -> Ordering;
    fn is_positive(&self) -> bool;
    fn as_f64(&self) -> f64;
}

impl ScoreValue for f32 {
    #[inline]
    fn score_cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    #[inline]
    fn is_positive(&self) -> bool {
        *self > 0.0
    }

    fn as_f64(&self) -> f64 {
        *self as f64
    }
}

impl ScoreValue for u64 {
    #[inline]
    fn score_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    #[inline]
    fn is_positive(&self) -> bool {
        *self > 0
    }

    fn as_f64(&self) -> f64 {
        *self as f64
    }
}

pub trait Arithmetic: Send + Sync + 'static {
    /// Spectrum vector entry.
    type Value: Copy + Default + PartialEq + Send + Sync + Debug + 'static;
    /// Candidate peak weight.
    type Weight: Copy + Send + Sync + Debug + 'static;
    type Score: ScoreValue;

    const MODE: NumericMode;
    const UNIT_WEIGHT: Self::Weight;

    fn value(x: f32) -> Self::Value;
    fn weight(x: f32) -> Self::Weight;

    /// `acc + weight * value`, always as two separate operations so every
    /// strategy rounds the same way.
    fn mul_add(acc: Self::Score, weight: Self::Weight, value: Self::Value) -> Self::Score;

    /// Final score of a candidate with `len` peaks.
    fn finish(acc: Self::Score, len: usize, normalize: bool) -> Self::Score;
}

#[derive(Debug, Clone, Copy)]
pub struct FloatArithmetic;

impl Arithmetic for FloatArithmetic {
    type Value = f32;
    type Weight = f32;
    type Score = f32;

    const MODE: NumericMode = NumericMode::Float;
    const UNIT_WEIGHT: f32 = 1.0;

    #[inline]
    fn value(x: f32) -> f32 {
        x
    }

    #[inline]
    fn weight(x: f32) -> f32 {
        x
    }

    #[inline]
    fn mul_add(acc: f32, weight: f32, value: f32) -> f32 {
        let prod = weight * value;
        acc + prod
    }

    #[inline]
    fn finish(acc: f32, len: usize, normalize: bool) -> f32 {
        if !normalize {
            return acc;
        }
        if len == 0 {
            return 0.0;
        }
        acc / len as f32
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntegerArithmetic;

#[inline]
fn quantize(x: f32) -> u32 {
    // `as` saturates, negatives and NaN land on 0
    (x * INT_SCALE).round() as u32
}

impl Arithmetic for IntegerArithmetic {
    type Value = u32;
    type Weight = u32;
    type Score = u64;

    const MODE: NumericMode = NumericMode::Integer;
    const UNIT_WEIGHT: u32 = 1;

    #[inline]
    fn value(x: f32) -> u32 {
        quantize(x)
    }

    #[inline]
    fn weight(x: f32) -> u32 {
        quantize(x)
    }

    #[inline]
    fn mul_add(acc: u64, weight: u32, value: u32) -> u64 {
        // u32 * u32 always fits, only the running sum can overflow.
        acc.saturating_add(weight as u64 * value as u64)
    }

    #[inline]
    fn finish(acc: u64, len: usize, normalize: bool) -> u64 {
        if !normalize {
            return acc;
        }
        if len == 0 {
            return 0;
        }
        acc.saturating_mul(INT_SCALE as u64) / len as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_quantization() {
        assert_eq!(IntegerArithmetic::value(1.0), 1000);
        assert_eq!(IntegerArithmetic::value(0.0111), 11);
        assert_eq!(IntegerArithmetic::weight(-2.0), 0);
        let acc = IntegerArithmetic::mul_add(0, 1, 1000);
        let acc = IntegerArithmetic::mul_add(acc, 1, 1000);
        assert_eq!(IntegerArithmetic::finish(acc, 3, true), 666_666);
        assert_eq!(IntegerArithmetic::finish(acc, 3, false), 2000);
    }

    #[test]
    fn test_float_finish() {
        assert_eq!(FloatArithmetic::finish(0.0, 0, true), 0.0);
        assert_eq!(FloatArithmetic::finish(2.0, 4, true), 0.5);
        assert_eq!(FloatArithmetic::finish(2.0, 4, false), 2.0);
    }

    #[test]
    fn test_score_order() {
        assert_eq!(1.0f32.score_cmp(&0.5), Ordering::Greater);
        assert_eq!(3u64.score_cmp(&3), Ordering::Equal);
        assert!(!0.0f32.is_positive());
    }

    #[test]
    fn test_integer_accumulation_saturates() {
        let mut acc = 0u64;
        for _ in 0..3 {
            acc = IntegerArithmetic::mul_add(acc, u32::MAX, u32::MAX);
        }
        assert_eq!(acc, u64::MAX);
        assert_eq!(IntegerArithmetic::finish(acc, 1, true), u64::MAX);
        assert_eq!(IntegerArithmetic::finish(acc, 2, true), u64::MAX / 2);
        assert_eq!(IntegerArithmetic::finish(acc, 2, false), u64::MAX);
        // Huge quantized values saturate rather than wrap.
        assert_eq!(IntegerArithmetic::value(f32::MAX), u32::MAX);
    }
}
