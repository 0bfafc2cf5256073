use std::{fmt::Display, iter::Sum, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// The number of fractional digits carried by order amounts and prices.
pub const AMOUNT_DECIMALS: usize = 2;
const HUNDREDTHS_PER_UNIT: i64 = 100;
/// Observed ledger convention: divide the smallest on-chain unit by this value to get whole tokens.
pub const DEFAULT_LEDGER_SCALE: u64 = 10_000_000;

//--------------------------------------     TokenAmount       ---------------------------------------------------------
/// A fixed-point token quantity with exactly two decimal places, stored as an integer number of hundredths.
///
/// Floating point never enters the picture: `"25.00"` parses to `TokenAmount(2500)` and compares exactly against
/// ledger amounts via [`TokenAmount::matches_ledger_units`].
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAmount(i64);

op!(binary TokenAmount: Add::add, Sub::sub);
op!(inplace TokenAmount: AddAssign::add_assign, SubAssign::sub_assign);
op!(unary TokenAmount: Neg::neg);

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, v| acc + v)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenAmountParseError {
    #[error("'{0}' is not a decimal number")]
    Malformed(String),
    #[error("'{0}' has more than {AMOUNT_DECIMALS} decimal places")]
    TooManyDecimals(String),
    #[error("'{0}' is too large to be represented")]
    OutOfRange(String),
}

impl TokenAmount {
    pub fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    pub fn from_whole(units: i64) -> Self {
        Self(units * HUNDREDTHS_PER_UNIT)
    }

    pub fn hundredths(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if `units` of the smallest ledger denomination, divided by `scale`, is exactly this amount.
    pub fn matches_ledger_units(&self, units: u128, scale: u64) -> bool {
        if self.0 < 0 || scale == 0 {
            return false;
        }
        #[allow(clippy::cast_sign_loss)]
        let expected = (self.0 as u128).checked_mul(u128::from(scale));
        let observed = units.checked_mul(HUNDREDTHS_PER_UNIT as u128);
        matches!((expected, observed), (Some(e), Some(o)) if e == o)
    }

    /// Converts a ledger amount into a `TokenAmount`. Returns `None` if the amount has more precision than two decimal
    /// places can express, or does not fit.
    pub fn from_ledger_units(units: u128, scale: u64) -> Option<Self> {
        if scale == 0 {
            return None;
        }
        let scaled = units.checked_mul(HUNDREDTHS_PER_UNIT as u128)?;
        let scale = u128::from(scale);
        if scaled % scale != 0 {
            return None;
        }
        i64::try_from(scaled / scale).ok().map(Self)
    }
}

impl FromStr for TokenAmount {
    type Err = TokenAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((_, "")) => return Err(TokenAmountParseError::Malformed(s.to_string())),
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let digits_only = |v: &str| v.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !digits_only(whole) || !digits_only(frac) {
            return Err(TokenAmountParseError::Malformed(s.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS {
            return Err(TokenAmountParseError::TooManyDecimals(s.to_string()));
        }
        let out_of_range = || TokenAmountParseError::OutOfRange(s.to_string());
        let whole = whole.parse::<i64>().map_err(|_| out_of_range())?;
        let frac = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| out_of_range())? * 10,
            _ => frac.parse::<i64>().map_err(|_| out_of_range())?,
        };
        whole.checked_mul(HUNDREDTHS_PER_UNIT).and_then(|v| v.checked_add(frac)).map(Self).ok_or_else(out_of_range)
    }
}

impl TryFrom<String> for TokenAmount {
    type Error = TokenAmountParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenAmount> for String {
    fn from(value: TokenAmount) -> Self {
        value.to_string()
    }
}

impl From<i64> for TokenAmount {
    fn from(hundredths: i64) -> Self {
        Self(hundredths)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_unit = HUNDREDTHS_PER_UNIT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per_unit, abs % per_unit)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_amounts() {
        assert_eq!("25".parse::<TokenAmount>().unwrap(), TokenAmount::from_whole(25));
        assert_eq!("25.5".parse::<TokenAmount>().unwrap(), TokenAmount::from_hundredths(2550));
        assert_eq!("25.05".parse::<TokenAmount>().unwrap(), TokenAmount::from_hundredths(2505));
        assert_eq!(" 0.01 ".parse::<TokenAmount>().unwrap(), TokenAmount::from_hundredths(1));
        assert!(matches!("25.001".parse::<TokenAmount>(), Err(TokenAmountParseError::TooManyDecimals(_))));
        assert!(matches!("-1.00".parse::<TokenAmount>(), Err(TokenAmountParseError::Malformed(_))));
        assert!(matches!("1e3".parse::<TokenAmount>(), Err(TokenAmountParseError::Malformed(_))));
        assert!(matches!("12.".parse::<TokenAmount>(), Err(TokenAmountParseError::Malformed(_))));
        assert!(matches!(".5".parse::<TokenAmount>(), Err(TokenAmountParseError::Malformed(_))));
        assert!(matches!("".parse::<TokenAmount>(), Err(TokenAmountParseError::Malformed(_))));
        assert!(matches!("99999999999999999999".parse::<TokenAmount>(), Err(TokenAmountParseError::OutOfRange(_))));
    }

    #[test]
    fn display() {
        assert_eq!(TokenAmount::from_hundredths(2500).to_string(), "25.00");
        assert_eq!(TokenAmount::from_hundredths(7).to_string(), "0.07");
        assert_eq!(TokenAmount::from_hundredths(-150).to_string(), "-1.50");
    }

    #[test]
    fn ledger_units() {
        let amount = TokenAmount::from_whole(25);
        assert!(amount.matches_ledger_units(250_000_000, DEFAULT_LEDGER_SCALE));
        assert!(!amount.matches_ledger_units(249_900_000, DEFAULT_LEDGER_SCALE));
        assert!(!amount.matches_ledger_units(250_100_000, DEFAULT_LEDGER_SCALE));
        assert!(!amount.matches_ledger_units(250_000_001, DEFAULT_LEDGER_SCALE));
        assert_eq!(TokenAmount::from_ledger_units(249_900_000, DEFAULT_LEDGER_SCALE), Some(TokenAmount::from(2499)));
        assert_eq!(TokenAmount::from_ledger_units(1, DEFAULT_LEDGER_SCALE), None);
        assert_eq!(TokenAmount::from_ledger_units(1, 0), None);
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let amount = TokenAmount::from_hundredths(150);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"1.50\"");
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
        assert!(serde_json::from_str::<TokenAmount>("\"1.505\"").is_err());
    }
}
