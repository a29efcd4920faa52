//! Fixed-point currency type for ledger amounts.
//!
//! Amounts are stored as whole cents in an `i64` so that sums and
//! differences are exact. Binary floating point never touches a stored
//! total; the running-total invariant depends on this.

use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub},
    str::FromStr,
};

use rusqlite::{
    ToSql,
    types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};

use crate::Error;

/// A monetary amount in hundredths of the currency unit.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create an amount from a count of cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Create an amount from whole units and cents, e.g. `(10, 50)` for 10.50.
    pub const fn from_units(units: i64, cents: i64) -> Self {
        Self(units * 100 + cents)
    }

    /// The zero amount.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The amount as a count of cents.
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whether the amount is strictly greater than zero.
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The amount as a fraction of `total`, or `None` when `total` is zero.
    ///
    /// Used for percentage displays; the result is not currency and may
    /// safely be floating point.
    pub fn ratio_of(&self, total: Money) -> Option<f64> {
        if total.0 == 0 {
            None
        } else {
            Some(self.0 as f64 / total.0 as f64)
        }
    }

    /// Format the amount as a plain decimal with exactly two decimal places
    /// and no currency symbol, e.g. `"10.50"` or `"-0.05"`.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.abs();

        format!("{}{}.{:02}", sign, cents / 100, cents % 100)
    }

    /// Parse a decimal amount such as `"10.50"`, `"10"`, `"$10.50"` or
    /// `"-3.07"`.
    ///
    /// At most two digits are accepted after the decimal point; currency
    /// amounts are defined in cents.
    ///
    /// # Errors
    /// Returns [Error::InvalidAmountFormat] if the string is not a decimal
    /// amount.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let error = || Error::InvalidAmountFormat(input.to_string());
        let trimmed = input.trim();

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let unsigned = unsigned.strip_prefix('$').unwrap_or(unsigned);

        if unsigned.is_empty() {
            return Err(error());
        }

        // Any sign has been consumed above; the remaining segments must be
        // bare digits, or inputs like "10.-5" would parse to a wrong amount.
        let parse_digits = |text: &str| -> Result<i64, Error> {
            if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(error());
            }

            text.parse().map_err(|_| error())
        };

        let cents = match unsigned.split_once('.') {
            None => parse_digits(unsigned)? * 100,
            Some((units_text, cents_text)) => {
                if cents_text.len() > 2 {
                    return Err(error());
                }

                let units = parse_digits(units_text)?;
                let cents = parse_digits(cents_text)?;
                let cents = if cents_text.len() == 1 { cents * 10 } else { cents };

                units * 100 + cents
            }
        };

        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.abs();

        write!(f, "{}${}.{:02}", sign, cents / 100, cents % 100)
    }
}

impl FromStr for Money {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, amount| acc + amount)
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(Self)
    }
}
