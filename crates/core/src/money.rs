//! Monetary amounts in smallest currency units.
//!
//! Upstream APIs deliver all amounts as integer minor units (cents); the
//! divide-by-100 rule lives here and nowhere else. Arithmetic stays exact
//! integer arithmetic; only display produces the decimal form ("19.99").

use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;

/// A signed amount in minor units (cents).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Wrap an upstream integer-minor-units amount.
    pub fn from_minor_units(cents: i64) -> Self {
        Self(cents)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiply by a quantity (line total = unit price × qty).
    ///
    /// Saturates on overflow; real order quantities never get close.
    pub fn times(&self, quantity: i64) -> Money {
        Money(self.0.saturating_mul(quantity))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sign, rest) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };

        let (units_str, frac_str) = match rest.split_once('.') {
            Some((u, f)) => (u, f),
            None => (rest, ""),
        };

        if units_str.is_empty() || frac_str.len() > 2 {
            return Err(DomainError::validation(format!("malformed amount: {s}")));
        }

        let units: i64 = units_str
            .parse()
            .map_err(|_| DomainError::validation(format!("malformed amount: {s}")))?;
        let frac: i64 = if frac_str.is_empty() {
            0
        } else {
            // "5" means 50 cents, "05" means 5 cents.
            let parsed: i64 = frac_str
                .parse()
                .map_err(|_| DomainError::validation(format!("malformed amount: {s}")))?;
            if frac_str.len() == 1 { parsed * 10 } else { parsed }
        };

        Ok(Money(sign * units.saturating_mul(100).saturating_add(frac)))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn displays_as_decimal_string() {
        assert_eq!(Money::from_minor_units(1999).to_string(), "19.99");
        assert_eq!(Money::from_minor_units(500).to_string(), "5.00");
        assert_eq!(Money::from_minor_units(5).to_string(), "0.05");
        assert_eq!(Money::from_minor_units(0).to_string(), "0.00");
        assert_eq!(Money::from_minor_units(-125).to_string(), "-1.25");
        assert_eq!(Money::from_minor_units(-5).to_string(), "-0.05");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("19.99".parse::<Money>().unwrap(), Money::from_minor_units(1999));
        assert_eq!("5".parse::<Money>().unwrap(), Money::from_minor_units(500));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_minor_units(50));
        assert_eq!("-1.25".parse::<Money>().unwrap(), Money::from_minor_units(-125));
        assert!("1.999".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn sums_line_totals() {
        let total: Money = [999, 999, 500]
            .into_iter()
            .map(Money::from_minor_units)
            .sum();
        assert_eq!(total, Money::from_minor_units(2498));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Money::from_minor_units(1999)).unwrap();
        assert_eq!(json, "\"19.99\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from_minor_units(1999));
    }

    proptest! {
        #[test]
        fn display_round_trips(cents in -1_000_000_000i64..1_000_000_000i64) {
            let money = Money::from_minor_units(cents);
            let parsed: Money = money.to_string().parse().unwrap();
            prop_assert_eq!(parsed, money);
        }

        #[test]
        fn addition_matches_minor_units(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let sum = Money::from_minor_units(a) + Money::from_minor_units(b);
            prop_assert_eq!(sum.minor_units(), a + b);
        }
    }
}
