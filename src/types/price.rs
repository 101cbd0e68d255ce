use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::str::FromStr;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Lowest representable price; the starting point of a running maximum.
    pub const MIN: Price = Price(Decimal::MIN);
    /// Highest representable price; the starting point of a running minimum.
    pub const MAX: Price = Price(Decimal::MAX);

    pub fn new(value: Decimal) -> Self {
        Price(value)
    }

    pub fn from_i64(value: i64) -> Self {
        Price(Decimal::from(value))
    }

    pub fn zero() -> Self {
        Price(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Price(self.0.abs())
    }

    /// Relative move from `previous` to `self`, in percent of `previous`.
    ///
    /// Returns `None` when `previous` is zero since the ratio is undefined.
    pub fn change_percent_from(&self, previous: Price) -> Option<Decimal> {
        if previous.is_zero() {
            return None;
        }
        let delta = (self.0 - previous.0).abs();
        delta
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|scaled| scaled.checked_div(previous.0.abs()))
    }
}

impl Add for Price {
    type Output = Price;
    fn add(self, other: Price) -> Price {
        Price(self.0 + other.0)
    }
}

impl Sub for Price {
    type Output = Price;
    fn sub(self, other: Price) -> Price {
        Price(self.0 - other.0)
    }
}

impl From<Decimal> for Price {
    fn from(value: Decimal) -> Self {
        Price(value)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Price)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn change_percent_is_relative_to_previous() {
        let previous = Price::new(dec!(100));
        assert_eq!(Price::new(dec!(120)).change_percent_from(previous), Some(dec!(20)));
        assert_eq!(Price::new(dec!(95)).change_percent_from(previous), Some(dec!(5)));
    }

    #[test]
    fn change_percent_from_zero_is_undefined() {
        assert_eq!(Price::new(dec!(1)).change_percent_from(Price::zero()), None);
    }

    #[test]
    fn parses_trimmed_decimal_strings() {
        assert_eq!(" 1.0850 ".parse::<Price>().unwrap(), Price::new(dec!(1.0850)));
        assert!("abc".parse::<Price>().is_err());
    }
}
