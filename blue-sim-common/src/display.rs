//! Helpers rendering simulator values in log fields.

use std::fmt::{Display, Formatter};

use alloy_primitives::U256;
use tracing::Value;

use crate::math::WAD;

/// Renders an `Option<T>` as its inner value or `None`.
pub struct DisplayOption<'a, T>(&'a Option<T>);

impl<'a, T: Display> Display for DisplayOption<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(inner) => write!(f, "{}", inner),
            None => write!(f, "None"),
        }
    }
}

/// Lets you write `price = opt(&market.price)` in `tracing` fields.
pub fn opt<T: Display>(val: &Option<T>) -> impl Value + '_ {
    tracing::field::display(DisplayOption(val))
}

/// Renders a WAD-scaled ratio as a decimal number, `860000000000000000` as `0.86`.
pub struct DisplayWad(pub U256);

impl Display for DisplayWad {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (integer, fraction) = self.0.div_rem(WAD);
        if fraction.is_zero() {
            return write!(f, "{}", integer);
        }

        let digits = format!("{:0>18}", fraction.to_string());
        write!(f, "{}.{}", integer, digits.trim_end_matches('0'))
    }
}

/// Lets you write `fee = wad(market.fee)` in `tracing` fields.
pub fn wad(val: U256) -> impl Value {
    tracing::field::display(DisplayWad(val))
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_display_option() {
        assert_eq!(DisplayOption(&Some(U256::from(42u64))).to_string(), "42");
        assert_eq!(DisplayOption::<U256>(&None).to_string(), "None");
    }

    #[rstest]
    #[case::zero(0, "0")]
    #[case::one(1_000_000_000_000_000_000, "1")]
    #[case::lltv(860_000_000_000_000_000, "0.86")]
    #[case::smallest(1, "0.000000000000000001")]
    #[case::above_one(2_500_000_000_000_000_000, "2.5")]
    fn test_display_wad(#[case] value: u128, #[case] expected: &str) {
        assert_eq!(DisplayWad(U256::from(value)).to_string(), expected);
    }
}
