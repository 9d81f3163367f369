//! Error taxonomy for E-Cash Desk.
//!
//! Absent rows are not errors — point lookups return `Option::None` so the UI
//! can distinguish "no data for this date" from an actual failure.

use thiserror::Error;

/// All failures surfaced by the ledger store, reconciliation engine, and
/// export layer.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The denomination label is not one of the 11 fixed identifiers.
    /// Fails fast before any row is touched.
    #[error("unknown denomination: {0}")]
    UnknownDenomination(String),

    /// A free-text amount from the UI did not parse as a non-negative number.
    /// Fails fast before any row is touched.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// Underlying SQLite statement failure. Per-statement atomicity only —
    /// no partial commit is left behind.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Export file could not be created or written.
    #[error("export i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The shared connection mutex was poisoned by a panicking caller.
    #[error("database connection lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LedgerError>;
