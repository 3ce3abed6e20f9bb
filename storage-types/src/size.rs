// SPDX-License-Identifier: GPL-3.0-only

//! Byte sizes with exact integer arithmetic
//!
//! Every size the planner reasons about (free space, extents, caps) is a
//! whole number of bytes. Percentage caps are expressed as a [`Ratio`] and
//! applied with integer math so results never drift.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

/// Size in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(u64);

/// Exact fraction used for percentage caps (e.g. 4/5 for 80%)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    numerator: u64,
    denominator: u64,
}

impl Ratio {
    /// Build a ratio; a zero denominator is treated as one
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator: if denominator == 0 { 1 } else { denominator },
        }
    }
}

impl Size {
    pub const ZERO: Size = Size(0);
    pub const MIB: u64 = 1024 * 1024;
    pub const GIB: u64 = 1024 * 1024 * 1024;

    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * Self::MIB)
    }

    pub const fn from_gib(gib: u64) -> Self {
        Self(gib * Self::GIB)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, other: Size) -> Size {
        Size(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Size) -> Size {
        Size(self.0.saturating_add(other.0))
    }

    /// Scale by an exact ratio, rounding down
    pub fn scale(self, ratio: Ratio) -> Size {
        let scaled = (self.0 as u128 * ratio.numerator as u128) / ratio.denominator as u128;
        Size(scaled.min(u64::MAX as u128) as u64)
    }

    /// Human-readable size with the exact byte count appended
    pub fn to_pretty_with_bytes(self) -> String {
        format!("{} ({} bytes)", self, self.0.to_formatted_string(&Locale::en))
    }
}

impl fmt::Display for Size {
    /// Binary units; whole values print without decimals ("1 GiB"),
    /// others with two ("1.50 GiB")
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

        let mut unit = 0;
        let mut divisor: u64 = 1;
        while unit < UNITS.len() - 1 && self.0 >= divisor * 1024 {
            divisor *= 1024;
            unit += 1;
        }

        if self.0 % divisor == 0 {
            write!(f, "{} {}", self.0 / divisor, UNITS[unit])
        } else {
            write!(f, "{:.2} {}", self.0 as f64 / divisor as f64, UNITS[unit])
        }
    }
}

// Operators saturate at the u64 bounds
impl Add for Size {
    type Output = Size;

    fn add(self, rhs: Size) -> Size {
        self.saturating_add(rhs)
    }
}

impl Sub for Size {
    type Output = Size;

    fn sub(self, rhs: Size) -> Size {
        self.saturating_sub(rhs)
    }
}

impl Mul<u64> for Size {
    type Output = Size;

    fn mul(self, rhs: u64) -> Size {
        Size(self.0.saturating_mul(rhs))
    }
}

impl Sum for Size {
    fn sum<I: Iterator<Item = Size>>(iter: I) -> Size {
        iter.fold(Size::ZERO, Size::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_binary_units() {
        assert_eq!(Size::from_gib(1).to_string(), "1 GiB");
        assert_eq!(Size::from_mib(512).to_string(), "512 MiB");
        assert_eq!(Size::from_mib(1536).to_string(), "1.50 GiB");
        assert_eq!(Size::from_bytes(100).to_string(), "100 B");
    }

    #[test]
    fn scale_rounds_down() {
        assert_eq!(Size::from_gib(10).scale(Ratio::new(4, 5)), Size::from_gib(8));
        assert_eq!(Size::from_bytes(9).scale(Ratio::new(4, 5)), Size::from_bytes(7));
    }

    #[test]
    fn scale_does_not_overflow_large_sizes() {
        let huge = Size::from_bytes(u64::MAX);
        assert_eq!(huge.scale(Ratio::new(1, 2)), Size::from_bytes(u64::MAX / 2));
    }

    #[test]
    fn pretty_with_bytes_groups_digits() {
        assert_eq!(
            Size::from_mib(1).to_pretty_with_bytes(),
            "1 MiB (1,048,576 bytes)"
        );
    }

    #[test]
    fn operators_saturate_instead_of_overflowing() {
        let half = Size::from_bytes(u64::MAX / 2 + 1);
        assert_eq!(half * 2, Size::from_bytes(u64::MAX));
        assert_eq!(half + half, Size::from_bytes(u64::MAX));
        assert_eq!(Size::from_mib(1) - Size::from_mib(2), Size::ZERO);
    }

    #[test]
    fn sum_saturates() {
        let total: Size = [Size::from_mib(2), Size::from_mib(3)].into_iter().sum();
        assert_eq!(total, Size::from_mib(5));
    }
}
