//! Opaque physical-unit algebra.
//!
//! A [`Unit`] is a vector of integer exponents over a fixed set of named
//! base units. Multiplication and division combine exponents; addition and
//! subtraction of quantities require equal units and are checked with
//! [`Unit::expect_same`]. There is no scale conversion between bases
//! (microseconds never turn into seconds here); that belongs to a physics
//! layer on top.
//!
//! # Example
//!
//! ```rust
//! use labeled_units::Unit;
//!
//! let speed = Unit::m() / Unit::s();
//! assert_eq!(speed.to_string(), "m/s");
//! assert_eq!(speed * Unit::s(), Unit::m());
//! assert!((Unit::m() * Unit::m()).sqrt().unwrap() == Unit::m());
//! ```

use std::fmt;
use std::ops::{Div, Mul};

/// Errors arising from unit arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    /// Additive combination of quantities with different units.
    #[error("cannot add or subtract quantities in {0} and {1}")]
    Incompatible(String, String),

    /// Square root of a unit with an odd exponent.
    #[error("unit {0} is not a perfect square")]
    NotASquare(String),

    /// An operation that only accepts dimensionless input.
    #[error("expected dimensionless operand, got {0}")]
    NotDimensionless(String),
}

const NUM_BASES: usize = 8;
const BASE_NAMES: [&str; NUM_BASES] = ["m", "kg", "s", "K", "counts", "angstrom", "us", "meV"];

/// A physical unit as exponents over the base units.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Unit {
    powers: [i8; NUM_BASES],
}

impl Unit {
    const fn base(index: usize) -> Self {
        let mut powers = [0i8; NUM_BASES];
        powers[index] = 1;
        Self { powers }
    }

    /// The neutral unit.
    pub const fn dimensionless() -> Self {
        Self {
            powers: [0; NUM_BASES],
        }
    }

    /// Meter.
    pub const fn m() -> Self {
        Self::base(0)
    }

    /// Kilogram.
    pub const fn kg() -> Self {
        Self::base(1)
    }

    /// Second.
    pub const fn s() -> Self {
        Self::base(2)
    }

    /// Kelvin.
    pub const fn kelvin() -> Self {
        Self::base(3)
    }

    /// Detector counts.
    pub const fn counts() -> Self {
        Self::base(4)
    }

    /// Angstrom, kept distinct from meter (no scale conversion).
    pub const fn angstrom() -> Self {
        Self::base(5)
    }

    /// Microsecond, kept distinct from second (no scale conversion).
    pub const fn us() -> Self {
        Self::base(6)
    }

    /// Milli-electronvolt.
    pub const fn mev() -> Self {
        Self::base(7)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.powers.iter().all(|&p| p == 0)
    }

    /// The unit for an additive combination; fails unless both sides match.
    pub fn expect_same(self, other: Unit) -> Result<Unit, UnitError> {
        if self == other {
            Ok(self)
        } else {
            Err(UnitError::Incompatible(
                self.to_string(),
                other.to_string(),
            ))
        }
    }

    /// Fails unless `self` carries no unit.
    pub fn expect_dimensionless(self) -> Result<Unit, UnitError> {
        if self.is_dimensionless() {
            Ok(self)
        } else {
            Err(UnitError::NotDimensionless(self.to_string()))
        }
    }

    /// Halve all exponents; fails on odd exponents.
    pub fn sqrt(self) -> Result<Unit, UnitError> {
        let mut powers = [0i8; NUM_BASES];
        for (out, &p) in powers.iter_mut().zip(self.powers.iter()) {
            if p % 2 != 0 {
                return Err(UnitError::NotASquare(self.to_string()));
            }
            *out = p / 2;
        }
        Ok(Unit { powers })
    }

    /// The reciprocal unit.
    pub fn recip(self) -> Unit {
        let mut powers = self.powers;
        for p in &mut powers {
            *p = -*p;
        }
        Unit { powers }
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(self, rhs: Unit) -> Unit {
        let mut powers = self.powers;
        for (p, &q) in powers.iter_mut().zip(rhs.powers.iter()) {
            *p += q;
        }
        Unit { powers }
    }
}

impl Div for Unit {
    type Output = Unit;

    fn div(self, rhs: Unit) -> Unit {
        let mut powers = self.powers;
        for (p, &q) in powers.iter_mut().zip(rhs.powers.iter()) {
            *p -= q;
        }
        Unit { powers }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let mut numerator = String::new();
        let mut denominator = String::new();
        for (name, &p) in BASE_NAMES.iter().zip(self.powers.iter()) {
            let (target, mag) = if p > 0 {
                (&mut numerator, p)
            } else if p < 0 {
                (&mut denominator, -p)
            } else {
                continue;
            };
            if !target.is_empty() {
                target.push(' ');
            }
            target.push_str(name);
            if mag > 1 {
                target.push_str(&format!("^{mag}"));
            }
        }
        match (numerator.is_empty(), denominator.is_empty()) {
            (false, true) => write!(f, "{numerator}"),
            (false, false) => write!(f, "{numerator}/{denominator}"),
            (true, false) => write!(f, "1/{denominator}"),
            (true, true) => unreachable!("dimensionless handled above"),
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unit({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensionless_is_default() {
        assert_eq!(Unit::default(), Unit::dimensionless());
        assert!(Unit::default().is_dimensionless());
    }

    #[test]
    fn test_mul_div_roundtrip() {
        let u = Unit::m() * Unit::kg() / Unit::s();
        assert_eq!(u * Unit::s(), Unit::m() * Unit::kg());
        assert_eq!(u / u, Unit::dimensionless());
    }

    #[test]
    fn test_expect_same() {
        assert_eq!(Unit::m().expect_same(Unit::m()), Ok(Unit::m()));
        assert!(matches!(
            Unit::m().expect_same(Unit::s()),
            Err(UnitError::Incompatible(_, _))
        ));
    }

    #[test]
    fn test_sqrt() {
        let area = Unit::m() * Unit::m();
        assert_eq!(area.sqrt(), Ok(Unit::m()));
        assert!(matches!(Unit::m().sqrt(), Err(UnitError::NotASquare(_))));
        assert_eq!(Unit::dimensionless().sqrt(), Ok(Unit::dimensionless()));
    }

    #[test]
    fn test_recip() {
        let hz = Unit::s().recip();
        assert_eq!(hz * Unit::s(), Unit::dimensionless());
    }

    #[test]
    fn test_display() {
        assert_eq!(Unit::dimensionless().to_string(), "dimensionless");
        assert_eq!((Unit::m() / Unit::s()).to_string(), "m/s");
        assert_eq!(
            (Unit::m() * Unit::m() / (Unit::s() * Unit::s())).to_string(),
            "m^2/s^2"
        );
        assert_eq!(Unit::s().recip().to_string(), "1/s");
        assert_eq!((Unit::counts() * Unit::mev()).to_string(), "counts meV");
    }

    #[test]
    fn test_angstrom_and_us_are_distinct_bases() {
        assert_ne!(Unit::angstrom(), Unit::m());
        assert_ne!(Unit::us(), Unit::s());
    }
}
