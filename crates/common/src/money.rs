use serde::{Deserialize, Serialize};

/// Money amount in minor currency units (paise, cents) to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates a new amount from whole major units.
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the whole major-unit portion.
    pub fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor-unit remainder after the major portion.
    pub fn minor_part(&self) -> i64 {
        self.0.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies by a quantity, saturating at the `i64` bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Returns `percent`% of this amount, rounded half away from zero to the
    /// nearest minor unit.
    pub fn percent(&self, percent: u32) -> Money {
        let scaled = self.0.saturating_mul(i64::from(percent));
        let rounded = if scaled >= 0 {
            scaled.saturating_add(50) / 100
        } else {
            scaled.saturating_sub(50) / 100
        };
        Money(rounded)
    }

    /// Subtracts, flooring the result at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}.{:02}", self.major().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major() {
        let money = Money::from_major(50);
        assert_eq!(money.minor(), 5000);
        assert_eq!(money.major(), 50);
        assert_eq!(money.minor_part(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1234).to_string(), "12.34");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_percent_rounds_half_up() {
        assert_eq!(Money::from_minor(1000).percent(50).minor(), 500);
        assert_eq!(Money::from_minor(999).percent(15).minor(), 150);
        assert_eq!(Money::from_minor(10).percent(5).minor(), 1);
        assert_eq!(Money::from_minor(10).percent(4).minor(), 0);
    }

    #[test]
    fn test_large_quantities_saturate() {
        let line = Money::from_major(1_000_000).multiply(u32::MAX);
        assert_eq!(line.minor(), 429_496_729_500_000_000);
        let huge = Money::from_minor(i64::MAX);
        assert_eq!(huge.multiply(2).minor(), i64::MAX);
        assert_eq!((huge + Money::from_minor(1)).minor(), i64::MAX);
        assert_eq!(huge.percent(50).minor(), i64::MAX / 100);
    }

    #[test]
    fn test_saturating_sub() {
        let a = Money::from_minor(100);
        assert_eq!(a.saturating_sub(Money::from_minor(30)).minor(), 70);
        assert_eq!(a.saturating_sub(Money::from_minor(300)).minor(), 0);
    }

    #[test]
    fn test_sum() {
        let total: Money = [1, 2, 3].into_iter().map(Money::from_minor).sum();
        assert_eq!(total.minor(), 6);
    }

    #[test]
    fn test_multiply() {
        assert_eq!(Money::from_minor(250).multiply(4).minor(), 1000);
    }
}
