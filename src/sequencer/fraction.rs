// Exact fraction - Rational numbers for drift-free musical time
// Denominators are kept as given (no reduction) so beat and subbeat parts
// stay expressed over their unit divisor.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Greatest common divisor (Euclid)
pub fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple, `0` if either side is zero
pub fn lcm(a: u128, b: u128) -> u128 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}

/// Non-negative rational number over a wide unsigned integer.
///
/// Equality and ordering compare values, so `1/2 == 2/4`, but the stored
/// denominator is preserved by every operation that does not need to change it.
#[derive(Debug, Clone, Copy)]
pub struct Fraction {
    numer: u128,
    denom: u128,
}

impl Fraction {
    /// Creates a new fraction
    pub fn new(numer: u128, denom: u128) -> Self {
        assert!(denom > 0, "Fraction denominator must be > 0");
        Self { numer, denom }
    }

    /// Zero expressed over `denom`
    pub fn zero(denom: u128) -> Self {
        Self::new(0, denom)
    }

    pub fn numer(&self) -> u128 {
        self.numer
    }

    pub fn denom(&self) -> u128 {
        self.denom
    }

    pub fn is_zero(&self) -> bool {
        self.numer == 0
    }

    /// `numerator < denominator`
    pub fn is_proper(&self) -> bool {
        self.numer < self.denom
    }

    /// Re-expresses the fraction over `denom`.
    ///
    /// Returns `None` when the value is not exactly representable over the
    /// new denominator; this type never rounds.
    pub fn rebase(&self, denom: u128) -> Option<Self> {
        if denom == 0 {
            return None;
        }
        if denom == self.denom {
            return Some(*self);
        }
        let scaled = self.numer.checked_mul(denom)?;
        if scaled % self.denom != 0 {
            return None;
        }
        Some(Self::new(scaled / self.denom, denom))
    }

    /// Splits into the integer part and the proper remainder (same denominator)
    pub fn split(&self) -> (u128, Self) {
        (
            self.numer / self.denom,
            Self::new(self.numer % self.denom, self.denom),
        )
    }

    /// `floor(self * n)`
    pub fn floor_mul(&self, n: u128) -> u128 {
        self.numer * n / self.denom
    }

    /// Subtraction that fails instead of going below zero
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let (a, b) = Self::common_base(self, rhs);
        a.numer.checked_sub(b.numer).map(|n| Self::new(n, a.denom))
    }

    pub fn to_f64(&self) -> f64 {
        self.numer as f64 / self.denom as f64
    }

    /// Rebases both operands onto the least common multiple of their denominators
    fn common_base(a: Self, b: Self) -> (Self, Self) {
        if a.denom == b.denom {
            return (a, b);
        }
        let base = lcm(a.denom, b.denom);
        (
            Self::new(a.numer * (base / a.denom), base),
            Self::new(b.numer * (base / b.denom), base),
        )
    }
}

impl Add for Fraction {
    type Output = Fraction;

    fn add(self, rhs: Self) -> Self::Output {
        let (a, b) = Self::common_base(self, rhs);
        Self::new(a.numer + b.numer, a.denom)
    }
}

impl Sub for Fraction {
    type Output = Fraction;

    fn sub(self, rhs: Self) -> Self::Output {
        match self.checked_sub(rhs) {
            Some(result) => result,
            None => panic!("Fraction subtraction underflow: {} - {}", self, rhs),
        }
    }
}

impl Mul for Fraction {
    type Output = Fraction;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(self.numer * rhs.numer, self.denom * rhs.denom)
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.denom == other.denom {
            return self.numer.cmp(&other.numer);
        }
        (self.numer * other.denom).cmp(&(other.numer * self.denom))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcd_lcm() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(7, 0), 7);
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(480, 4), 480);
        assert_eq!(lcm(0, 4), 0);
    }

    #[test]
    fn test_add_same_denominator() {
        let sum = Fraction::new(1, 4) + Fraction::new(2, 4);
        assert_eq!(sum.numer(), 3);
        assert_eq!(sum.denom(), 4);
    }

    #[test]
    fn test_add_rebases_to_lcm() {
        // 1/4 + 1/6 = 3/12 + 2/12
        let sum = Fraction::new(1, 4) + Fraction::new(1, 6);
        assert_eq!(sum.denom(), 12);
        assert_eq!(sum.numer(), 5);
    }

    #[test]
    fn test_sub() {
        let diff = Fraction::new(3, 4) - Fraction::new(1, 2);
        assert_eq!(diff, Fraction::new(1, 4));
        assert_eq!(diff.denom(), 4);
        assert!(Fraction::new(1, 4).checked_sub(Fraction::new(1, 2)).is_none());
    }

    #[test]
    #[should_panic]
    fn test_sub_underflow_panics() {
        let _ = Fraction::new(1, 8) - Fraction::new(1, 4);
    }

    #[test]
    fn test_mul() {
        let product = Fraction::new(2, 3) * Fraction::new(3, 4);
        assert_eq!(product, Fraction::new(1, 2));
        assert_eq!(product.denom(), 12);
    }

    #[test]
    fn test_rebase_exact_and_inexact() {
        let quarter = Fraction::new(1, 4);
        assert_eq!(quarter.rebase(480).map(|f| f.numer()), Some(120));
        assert_eq!(Fraction::new(120, 480).rebase(4).map(|f| f.numer()), Some(1));
        assert!(Fraction::new(1, 3).rebase(4).is_none());
        assert!(quarter.rebase(0).is_none());
    }

    #[test]
    fn test_split_and_proper() {
        let f = Fraction::new(11, 4);
        assert!(!f.is_proper());
        let (whole, rest) = f.split();
        assert_eq!(whole, 2);
        assert_eq!(rest.numer(), 3);
        assert_eq!(rest.denom(), 4);
        assert!(rest.is_proper());
        assert!(!Fraction::new(4, 4).is_proper());
    }

    #[test]
    fn test_ordering_across_denominators() {
        assert_eq!(Fraction::new(1, 2), Fraction::new(240, 480));
        assert!(Fraction::new(1, 3) < Fraction::new(1, 2));
        assert!(Fraction::new(3, 4) > Fraction::new(359, 480));
    }

    #[test]
    #[should_panic(expected = "denominator must be > 0")]
    fn test_zero_denominator_rejected() {
        let _ = Fraction::new(1, 0);
    }
}
