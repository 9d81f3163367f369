//! The fixed euro denomination map.
//!
//! Eleven denominations are accepted at the till: six banknotes (€200 down to
//! €5) and five coins (€2 down to 10c). Each maps to a pair of columns in the
//! `daily_cash_count` table plus its face value. Raw symbols like `€` never
//! appear in SQL — only the safe column names defined here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

/// A currency denomination accepted at the till, notes largest-first then
/// coins largest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Denomination {
    Euro200,
    Euro100,
    Euro50,
    Euro20,
    Euro10,
    Euro5,
    Euro2,
    Euro1,
    Cent50,
    Cent20,
    Cent10,
}

impl Denomination {
    /// All denominations in canonical column order.
    pub const ALL: [Denomination; 11] = [
        Denomination::Euro200,
        Denomination::Euro100,
        Denomination::Euro50,
        Denomination::Euro20,
        Denomination::Euro10,
        Denomination::Euro5,
        Denomination::Euro2,
        Denomination::Euro1,
        Denomination::Cent50,
        Denomination::Cent20,
        Denomination::Cent10,
    ];

    /// The coin denominations (face value ≤ €2). Their subtotals roll forward
    /// into the next day's `next_day_cash_coin`.
    pub const COINS: [Denomination; 5] = [
        Denomination::Euro2,
        Denomination::Euro1,
        Denomination::Cent50,
        Denomination::Cent20,
        Denomination::Cent10,
    ];

    /// Face value in euros.
    pub fn face_value(self) -> f64 {
        match self {
            Denomination::Euro200 => 200.0,
            Denomination::Euro100 => 100.0,
            Denomination::Euro50 => 50.0,
            Denomination::Euro20 => 20.0,
            Denomination::Euro10 => 10.0,
            Denomination::Euro5 => 5.0,
            Denomination::Euro2 => 2.0,
            Denomination::Euro1 => 1.0,
            Denomination::Cent50 => 0.5,
            Denomination::Cent20 => 0.2,
            Denomination::Cent10 => 0.1,
        }
    }

    /// Display label as shown on the till buttons (e.g. `€50`, `10c`).
    pub fn label(self) -> &'static str {
        match self {
            Denomination::Euro200 => "€200",
            Denomination::Euro100 => "€100",
            Denomination::Euro50 => "€50",
            Denomination::Euro20 => "€20",
            Denomination::Euro10 => "€10",
            Denomination::Euro5 => "€5",
            Denomination::Euro2 => "€2",
            Denomination::Euro1 => "€1",
            Denomination::Cent50 => "50c",
            Denomination::Cent20 => "20c",
            Denomination::Cent10 => "10c",
        }
    }

    /// Safe SQL column name holding the recorded quantity.
    pub fn qty_column(self) -> &'static str {
        match self {
            Denomination::Euro200 => "euro200_qty",
            Denomination::Euro100 => "euro100_qty",
            Denomination::Euro50 => "euro50_qty",
            Denomination::Euro20 => "euro20_qty",
            Denomination::Euro10 => "euro10_qty",
            Denomination::Euro5 => "euro5_qty",
            Denomination::Euro2 => "euro2_qty",
            Denomination::Euro1 => "euro1_qty",
            Denomination::Cent50 => "cent50_qty",
            Denomination::Cent20 => "cent20_qty",
            Denomination::Cent10 => "cent10_qty",
        }
    }

    /// Safe SQL column name holding the accumulated subtotal.
    pub fn total_column(self) -> &'static str {
        match self {
            Denomination::Euro200 => "euro200_total",
            Denomination::Euro100 => "euro100_total",
            Denomination::Euro50 => "euro50_total",
            Denomination::Euro20 => "euro20_total",
            Denomination::Euro10 => "euro10_total",
            Denomination::Euro5 => "euro5_total",
            Denomination::Euro2 => "euro2_total",
            Denomination::Euro1 => "euro1_total",
            Denomination::Cent50 => "cent50_total",
            Denomination::Cent20 => "cent20_total",
            Denomination::Cent10 => "cent10_total",
        }
    }

    /// Whether this denomination is a coin (face value ≤ €2).
    pub fn is_coin(self) -> bool {
        self.face_value() <= 2.0
    }

    /// Position in [`Denomination::ALL`], used to index per-row arrays.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Denomination {
    type Err = LedgerError;

    /// Parse a till button label. Unknown labels fail fast with
    /// [`LedgerError::UnknownDenomination`] and never reach storage.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Denomination::ALL
            .iter()
            .copied()
            .find(|d| d.label() == s.trim())
            .ok_or_else(|| LedgerError::UnknownDenomination(s.to_string()))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for denom in Denomination::ALL {
            let parsed: Denomination = denom.label().parse().expect("label should parse");
            assert_eq!(parsed, denom);
        }
    }

    #[test]
    fn test_unknown_label_fails_fast() {
        let err = "€500".parse::<Denomination>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownDenomination(_)));
        assert!("".parse::<Denomination>().is_err());
        assert!("50".parse::<Denomination>().is_err());
    }

    #[test]
    fn test_index_agrees_with_canonical_order() {
        // Per-row arrays are filled in ALL order and read back via index();
        // the two must never drift apart
        for (pos, denom) in Denomination::ALL.iter().enumerate() {
            assert_eq!(denom.index(), pos, "index mismatch for {denom}");
            assert_eq!(Denomination::ALL[denom.index()], *denom);
        }
    }

    #[test]
    fn test_coin_set_is_face_value_at_most_two() {
        for denom in Denomination::ALL {
            assert_eq!(
                denom.is_coin(),
                Denomination::COINS.contains(&denom),
                "coin set mismatch for {denom}"
            );
        }
    }

    #[test]
    fn test_face_values() {
        assert_eq!(Denomination::Euro200.face_value(), 200.0);
        assert_eq!(Denomination::Euro5.face_value(), 5.0);
        assert_eq!(Denomination::Cent50.face_value(), 0.5);
        assert_eq!(Denomination::Cent10.face_value(), 0.1);
    }

    #[test]
    fn test_column_names_are_ascii_safe() {
        for denom in Denomination::ALL {
            assert!(denom.qty_column().is_ascii());
            assert!(denom.total_column().is_ascii());
            assert!(denom.qty_column().ends_with("_qty"));
            assert!(denom.total_column().ends_with("_total"));
        }
    }
}
