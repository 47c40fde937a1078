//! Monetary units, money range rules, and per-byte fee rates.

use std::fmt;

pub type Amount = i64;

pub const COIN: Amount = 1_000_000;

/// No amount larger than this (in base units) is valid.
pub const MAX_MONEY: Amount = 210_000_000_000 * COIN;

pub fn money_range(value: Amount) -> bool {
    (0..=MAX_MONEY).contains(&value)
}

/// Fee rate expressed in base units per serialized byte.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FeeRate {
    per_byte: Amount,
}

impl FeeRate {
    pub const fn new(per_byte: Amount) -> Self {
        Self { per_byte }
    }

    pub fn from_paid(fee_paid: Amount, size: usize) -> Self {
        if size == 0 {
            return Self::default();
        }
        Self {
            per_byte: fee_paid / size as Amount,
        }
    }

    pub fn per_byte(&self) -> Amount {
        self.per_byte
    }

    /// Fee owed for `size` bytes; a positive rate never rounds down to zero.
    pub fn fee(&self, size: usize) -> Amount {
        let fee = self.per_byte.saturating_mul(size as Amount);
        if fee == 0 && self.per_byte > 0 {
            return self.per_byte;
        }
        fee
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}/B",
            self.per_byte / COIN,
            (self.per_byte % COIN).abs()
        )
    }
}

pub fn format_money(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let coin = COIN as u64;
    format!("{sign}{}.{:06}", abs / coin, abs % coin)
}
