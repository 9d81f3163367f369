//! E-Cash Desk - daily cash reconciliation backend.
//!
//! Storage and computation layer behind the supermarket till's end-of-day
//! desk tool: a cashier records denomination counts, expenses, old-invoice
//! payments, and bio cash movements for a business day; this crate keeps the
//! per-date ledger, derives the daily summary (coin carry-forward, cash sold,
//! daily totals), and exports historical ranges as CSV sheets.
//!
//! The UI layer owns windows, dialogs, and date pickers; it hands this crate
//! `(date, denomination label, quantity)` triples and free-text amounts, and
//! renders whatever comes back. All operations are synchronous over a single
//! long-lived SQLite connection opened by [`db::init`].

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod db;
pub mod denomination;
pub mod error;
pub mod export;
pub mod ledger;
pub mod reconcile;

pub use db::DbState;
pub use denomination::Denomination;
pub use error::LedgerError;
pub use ledger::{BioCashMovement, DailySummary, DenominationCount, Expense, OldInvoicePayment};
pub use reconcile::CashSold;

/// Initialize structured logging (console + daily rolling file).
///
/// Filter defaults to `info,ecash_desk=debug`; override with `RUST_LOG`.
/// Call once at process startup, before [`db::init`].
pub fn init_logging(log_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ecash_desk=debug"));

    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, "ecash");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes
    // logs. Leaked intentionally since the tool runs until process exit.
    std::mem::forget(guard);
}
