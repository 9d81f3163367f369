//! Daily reconciliation for E-Cash Desk.
//!
//! Pure arithmetic over the ledger store's per-date rows. Two derived
//! quantities: the coin carry-forward (coin subtotals roll into the next
//! day's float) and the cash-sold snapshot (counted cash minus yesterday's
//! carry-forward and the day's cash outflows). Both are written back into
//! the date's `daily_cash` summary row.

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::db::DbState;
use crate::denomination::Denomination;
use crate::error::{LedgerError, Result};
use crate::ledger::{self, date_key};

/// Point-in-time cash-sold snapshot returned by [`recompute_cash_sold`].
///
/// Re-invocation after new expense or invoice entries yields different
/// numbers; nothing here is a running total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashSold {
    pub total_cash: f64,
    pub prev_day_cash: f64,
    pub expense_sum: f64,
    pub invoice_sum: f64,
    /// `total_cash − prev_day_cash − expense_sum − invoice_sum`
    pub total_cash_sell: f64,
    /// Bio cash sum for the date.
    pub other_sell: f64,
    /// `total_cash_sell + total_card_sell` (card total from the summary row).
    pub total_daily_sell: f64,
}

// ---------------------------------------------------------------------------
// Coin carry-forward
// ---------------------------------------------------------------------------

/// Sum the five coin subtotals for the date and upsert the sum into the
/// summary's `next_day_cash_coin`.
///
/// Runs after every denomination recording; idempotent for unchanged inputs.
/// A date with no count row carries forward zero coins. Returns the sum.
pub fn recompute_coin_carry_forward(db: &DbState, date: NaiveDate) -> Result<f64> {
    let conn = db.lock()?;
    coin_carry_forward_on(&conn, date)
}

pub(crate) fn coin_carry_forward_on(conn: &Connection, date: NaiveDate) -> Result<f64> {
    let cols = Denomination::COINS
        .iter()
        .map(|d| format!("COALESCE({}, 0)", d.total_column()))
        .collect::<Vec<_>>()
        .join(" + ");

    // A date with no count row carries zero coins; real statement failures
    // must reach the caller, not overwrite the summary with zero
    let coin_sum: f64 = match conn.query_row(
        &format!("SELECT {cols} FROM daily_cash_count WHERE date = ?1"),
        params![date_key(date)],
        |row| row.get(0),
    ) {
        Ok(sum) => sum,
        Err(rusqlite::Error::QueryReturnedNoRows) => 0.0,
        Err(e) => {
            error!("coin carry-forward read on {date}: {e}");
            return Err(LedgerError::Storage(e));
        }
    };

    conn.execute(
        "INSERT INTO daily_cash (date, next_day_cash_coin) VALUES (?1, ?2)
         ON CONFLICT(date) DO UPDATE SET
             next_day_cash_coin = excluded.next_day_cash_coin",
        params![date_key(date), coin_sum],
    )
    .map_err(|e| {
        error!("coin carry-forward upsert on {date}: {e}");
        LedgerError::Storage(e)
    })?;

    Ok(coin_sum)
}

// ---------------------------------------------------------------------------
// Cash sold
// ---------------------------------------------------------------------------

/// Recompute the date's cash-sold fields and write them to the summary row.
///
/// `total_cash_sell = total_cash − prev_day_cash − expense_sum − invoice_sum`
/// where `total_cash` comes from the count row (0 if absent) and
/// `prev_day_cash` from the existing summary (0 if absent). Also refreshes
/// `other_sell` (bio cash sum) and `total_daily_sell` (cash + card).
pub fn recompute_cash_sold(db: &DbState, date: NaiveDate) -> Result<CashSold> {
    let conn = db.lock()?;

    let total_cash = ledger::get_count_on(&conn, date)?
        .map(|c| c.total_cash)
        .unwrap_or(0.0);
    let summary = ledger::get_summary_on(&conn, date)?;
    let prev_day_cash = summary.as_ref().map(|s| s.prev_day_cash).unwrap_or(0.0);
    let total_card_sell = summary.as_ref().map(|s| s.total_card_sell).unwrap_or(0.0);

    let expense_sum = ledger::sum_amount_on(&conn, "daily_expenses", date)?;
    let invoice_sum = ledger::sum_amount_on(&conn, "old_invoices", date)?;
    let other_sell = ledger::sum_amount_on(&conn, "bio_cash", date)?;

    let total_cash_sell = total_cash - prev_day_cash - expense_sum - invoice_sum;
    let total_daily_sell = total_cash_sell + total_card_sell;

    conn.execute(
        "INSERT INTO daily_cash (date, total_cash_sell, other_sell, total_daily_sell)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(date) DO UPDATE SET
             total_cash_sell  = excluded.total_cash_sell,
             other_sell       = excluded.other_sell,
             total_daily_sell = excluded.total_daily_sell",
        params![date_key(date), total_cash_sell, other_sell, total_daily_sell],
    )
    .map_err(|e| {
        error!("cash-sold upsert on {date}: {e}");
        LedgerError::Storage(e)
    })?;

    info!("Cash sold for {date}: €{total_cash_sell:.2} (counted €{total_cash:.2})");

    Ok(CashSold {
        total_cash,
        prev_day_cash,
        expense_sum,
        invoice_sum,
        total_cash_sell,
        other_sell,
        total_daily_sell,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
