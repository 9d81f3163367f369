//! Ledger store for E-Cash Desk.
//!
//! Four input streams feed the daily reconciliation: denomination counts
//! (one row per date, additive upserts), plus three append-only logs for
//! expenses, old-invoice payments, and bio cash movements. The daily summary
//! lives in `daily_cash`, one row per date, upserted field by field.
//!
//! Amounts arrive from the UI as free text and must parse as non-negative
//! numbers; denomination labels are validated here against the fixed 11-way
//! map before any row is touched.

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::db::DbState;
use crate::denomination::Denomination;
use crate::error::{LedgerError, Result};
use crate::reconcile;

/// Numeric summary fields accepted by [`upsert_summary`], in column order.
const SUMMARY_NUM_FIELDS: [&str; 8] = [
    "prev_day_cash",
    "total_cash_sell",
    "other_sell",
    "total_card_sell",
    "total_daily_sell",
    "next_day_cash_note",
    "next_day_cash_coin",
    "total_cash_taken",
];

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One `daily_cash_count` row: per-denomination quantities and subtotals for
/// a single business day. Arrays are indexed by [`Denomination::ALL`] order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenominationCount {
    pub date: NaiveDate,
    pub quantities: [i64; 11],
    pub subtotals: [f64; 11],
    pub total_cash: f64,
}

impl DenominationCount {
    /// Recorded quantity for one denomination.
    pub fn qty(&self, denom: Denomination) -> i64 {
        self.quantities[denom.index()]
    }

    /// Accumulated subtotal (quantity × face value) for one denomination.
    pub fn subtotal(&self, denom: Denomination) -> f64 {
        self.subtotals[denom.index()]
    }

    /// Sum of all 11 subtotals. Always equals `total_cash`.
    pub fn subtotal_sum(&self) -> f64 {
        self.subtotals.iter().sum()
    }

    /// Sum of the five coin subtotals (face value ≤ €2).
    pub fn coin_subtotal(&self) -> f64 {
        Denomination::COINS
            .iter()
            .map(|d| self.subtotal(*d))
            .sum()
    }
}

/// One `daily_cash` row: the derived daily summary for a business day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub prev_day_cash: f64,
    pub total_cash_sell: f64,
    pub other_sell: f64,
    pub total_card_sell: f64,
    pub total_daily_sell: f64,
    pub next_day_cash_note: f64,
    pub next_day_cash_coin: f64,
    pub total_cash_taken: f64,
    pub cash_taken_by: Option<String>,
}

/// One `daily_expenses` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub date: NaiveDate,
    pub invoice: String,
    pub amount: f64,
    pub status: String,
}

/// One `old_invoices` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OldInvoicePayment {
    pub id: i64,
    pub date: NaiveDate,
    pub invoice: String,
    pub amount: f64,
}

/// One `bio_cash` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BioCashMovement {
    pub id: i64,
    pub date: NaiveDate,
    pub purpose: String,
    pub amount: f64,
    pub vendor: String,
    pub sold_by: String,
}

// ---------------------------------------------------------------------------
// Denomination recording
// ---------------------------------------------------------------------------

/// Record a counted stack of one denomination for a date.
///
/// Creates the date's `daily_cash_count` row if absent, then **adds** the
/// quantity and subtotal into the denomination's columns and into
/// `total_cash` — repeated recordings for the same denomination on the same
/// date accumulate. The coin carry-forward in the date's summary row is
/// refreshed afterwards. Returns the updated row.
///
/// Unknown labels fail fast with [`LedgerError::UnknownDenomination`] and
/// leave every row untouched.
pub fn record_denomination(
    db: &DbState,
    date: NaiveDate,
    denom_label: &str,
    qty: u32,
) -> Result<DenominationCount> {
    let denom: Denomination = denom_label.parse()?;
    let subtotal = f64::from(qty) * denom.face_value();

    let conn = db.lock()?;

    let sql = format!(
        "INSERT INTO daily_cash_count (date, {qty_col}, {total_col}, total_cash)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(date) DO UPDATE SET
             {qty_col}   = COALESCE({qty_col}, 0) + excluded.{qty_col},
             {total_col} = COALESCE({total_col}, 0) + excluded.{total_col},
             total_cash  = COALESCE(total_cash, 0) + excluded.{total_col}",
        qty_col = denom.qty_column(),
        total_col = denom.total_column(),
    );
    conn.execute(&sql, params![date_key(date), i64::from(qty), subtotal])
        .map_err(|e| {
            error!("record_denomination {denom} on {date}: {e}");
            LedgerError::Storage(e)
        })?;

    // Coin subtotals roll forward into the summary after every recording
    reconcile::coin_carry_forward_on(&conn, date)?;

    info!("Recorded {qty} × {denom} for {date} (+€{subtotal:.2})");

    get_count_on(&conn, date)?.ok_or_else(|| {
        // The row was just upserted; absence means the statement silently failed
        error!("daily_cash_count row missing after upsert for {date}");
        LedgerError::Storage(rusqlite::Error::QueryReturnedNoRows)
    })
}

// ---------------------------------------------------------------------------
// Append-only logs
// ---------------------------------------------------------------------------

/// Append an expense row. No dedup; the amount must parse as a non-negative
/// number.
pub fn append_expense(
    db: &DbState,
    date: NaiveDate,
    invoice: &str,
    amount_text: &str,
    status: &str,
) -> Result<Expense> {
    let amount = parse_amount(amount_text)?;
    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO daily_expenses (date, invoice, amount, status) VALUES (?1, ?2, ?3, ?4)",
        params![date_key(date), invoice, amount, status],
    )
    .map_err(|e| {
        error!("append_expense on {date}: {e}");
        LedgerError::Storage(e)
    })?;
    Ok(Expense {
        id: conn.last_insert_rowid(),
        date,
        invoice: invoice.to_string(),
        amount,
        status: status.to_string(),
    })
}

/// Append an old-invoice payment row.
pub fn append_old_invoice(
    db: &DbState,
    date: NaiveDate,
    invoice: &str,
    amount_text: &str,
) -> Result<OldInvoicePayment> {
    let amount = parse_amount(amount_text)?;
    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO old_invoices (date, invoice, amount) VALUES (?1, ?2, ?3)",
        params![date_key(date), invoice, amount],
    )
    .map_err(|e| {
        error!("append_old_invoice on {date}: {e}");
        LedgerError::Storage(e)
    })?;
    Ok(OldInvoicePayment {
        id: conn.last_insert_rowid(),
        date,
        invoice: invoice.to_string(),
        amount,
    })
}

/// Append a bio cash movement row.
pub fn append_bio_cash(
    db: &DbState,
    date: NaiveDate,
    purpose: &str,
    amount_text: &str,
    vendor: &str,
    sold_by: &str,
) -> Result<BioCashMovement> {
    let amount = parse_amount(amount_text)?;
    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO bio_cash (date, purpose, amount, vendor, sold_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![date_key(date), purpose, amount, vendor, sold_by],
    )
    .map_err(|e| {
        error!("append_bio_cash on {date}: {e}");
        LedgerError::Storage(e)
    })?;
    Ok(BioCashMovement {
        id: conn.last_insert_rowid(),
        date,
        purpose: purpose.to_string(),
        amount,
        vendor: vendor.to_string(),
        sold_by: sold_by.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Summary upsert
// ---------------------------------------------------------------------------

/// Create-or-update named fields on the date's `daily_cash` row.
///
/// Only the recognized numeric fields present in the patch (plus
/// `cash_taken_by` as text) are written; absent fields keep their previous
/// value on update, or the schema's zero default on create. Numeric values
/// may arrive as JSON numbers or numeric strings.
pub fn upsert_summary(db: &DbState, date: NaiveDate, patch: &Value) -> Result<()> {
    let mut cols: Vec<&str> = Vec::new();
    let mut vals: Vec<rusqlite::types::Value> = vec![date_key(date).into()];

    for field in SUMMARY_NUM_FIELDS {
        if let Some(v) = num_field(patch, field) {
            cols.push(field);
            vals.push(v.into());
        }
    }
    if let Some(name) = str_field(patch, "cash_taken_by") {
        cols.push("cash_taken_by");
        vals.push(name.into());
    }

    let conn = db.lock()?;

    if cols.is_empty() {
        // Nothing to set — still guarantee the row exists with zero defaults
        conn.execute(
            "INSERT INTO daily_cash (date) VALUES (?1) ON CONFLICT(date) DO NOTHING",
            params![date_key(date)],
        )
        .map_err(|e| {
            error!("upsert_summary (empty patch) on {date}: {e}");
            LedgerError::Storage(e)
        })?;
        return Ok(());
    }

    let placeholders: Vec<String> = (2..=cols.len() + 1).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = cols.iter().map(|c| format!("{c} = excluded.{c}")).collect();
    let sql = format!(
        "INSERT INTO daily_cash (date, {}) VALUES (?1, {})
         ON CONFLICT(date) DO UPDATE SET {}",
        cols.join(", "),
        placeholders.join(", "),
        updates.join(", "),
    );

    conn.execute(&sql, params_from_iter(vals)).map_err(|e| {
        error!("upsert_summary on {date}: {e}");
        LedgerError::Storage(e)
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Point lookups
// ---------------------------------------------------------------------------

/// The date's denomination count row, or `None` when nothing was recorded.
pub fn get_denomination_count(db: &DbState, date: NaiveDate) -> Result<Option<DenominationCount>> {
    let conn = db.lock()?;
    get_count_on(&conn, date)
}

/// The date's daily summary row, or `None` when nothing was written yet.
pub fn get_summary(db: &DbState, date: NaiveDate) -> Result<Option<DailySummary>> {
    let conn = db.lock()?;
    get_summary_on(&conn, date)
}

pub(crate) fn get_count_on(conn: &Connection, date: NaiveDate) -> Result<Option<DenominationCount>> {
    let sql = format!(
        "SELECT date, {}, COALESCE(total_cash, 0) FROM daily_cash_count WHERE date = ?1",
        count_columns()
    );
    let row = conn
        .query_row(&sql, params![date_key(date)], map_count_row)
        .map(Some);
    match row {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(LedgerError::Storage(e)),
    }
}

pub(crate) fn get_summary_on(conn: &Connection, date: NaiveDate) -> Result<Option<DailySummary>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM daily_cash WHERE date = ?1",
                SUMMARY_SELECT_COLUMNS
            ),
            params![date_key(date)],
            map_summary_row,
        )
        .map(Some);
    match row {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(LedgerError::Storage(e)),
    }
}

// ---------------------------------------------------------------------------
// Per-date aggregates and listings
// ---------------------------------------------------------------------------

/// Sum of expense amounts for a date (0 when none).
pub fn expense_total(db: &DbState, date: NaiveDate) -> Result<f64> {
    let conn = db.lock()?;
    sum_amount_on(&conn, "daily_expenses", date)
}

/// Sum of old-invoice payment amounts for a date (0 when none).
pub fn old_invoice_total(db: &DbState, date: NaiveDate) -> Result<f64> {
    let conn = db.lock()?;
    sum_amount_on(&conn, "old_invoices", date)
}

/// Sum of bio cash amounts for a date (0 when none).
pub fn bio_cash_total(db: &DbState, date: NaiveDate) -> Result<f64> {
    let conn = db.lock()?;
    sum_amount_on(&conn, "bio_cash", date)
}

pub(crate) fn sum_amount_on(conn: &Connection, table: &str, date: NaiveDate) -> Result<f64> {
    let sum = conn.query_row(
        &format!("SELECT COALESCE(SUM(amount), 0) FROM {table} WHERE date = ?1"),
        params![date_key(date)],
        |row| row.get(0),
    )?;
    Ok(sum)
}

/// All expense rows for a date, insertion order.
pub fn list_expenses(db: &DbState, date: NaiveDate) -> Result<Vec<Expense>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(
        "SELECT id, date, invoice, amount, status FROM daily_expenses
         WHERE date = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![date_key(date)], |row| {
            Ok(Expense {
                id: row.get(0)?,
                date: parse_date_col(row, 1)?,
                invoice: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                amount: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All old-invoice payment rows for a date, insertion order.
pub fn list_old_invoices(db: &DbState, date: NaiveDate) -> Result<Vec<OldInvoicePayment>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(
        "SELECT id, date, invoice, amount FROM old_invoices WHERE date = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![date_key(date)], |row| {
            Ok(OldInvoicePayment {
                id: row.get(0)?,
                date: parse_date_col(row, 1)?,
                invoice: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                amount: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All bio cash rows for a date, insertion order.
pub fn list_bio_cash(db: &DbState, date: NaiveDate) -> Result<Vec<BioCashMovement>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(
        "SELECT id, date, purpose, amount, vendor, sold_by FROM bio_cash
         WHERE date = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![date_key(date)], |row| {
            Ok(BioCashMovement {
                id: row.get(0)?,
                date: parse_date_col(row, 1)?,
                purpose: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                amount: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                vendor: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                sold_by: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Denomination count rows for an inclusive date range, ascending by date.
pub fn list_counts(db: &DbState, from: NaiveDate, to: NaiveDate) -> Result<Vec<DenominationCount>> {
    let conn = db.lock()?;
    list_counts_on(&conn, from, to)
}

/// Daily summary rows for an inclusive date range, ascending by date.
pub fn list_summaries(db: &DbState, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailySummary>> {
    let conn = db.lock()?;
    list_summaries_on(&conn, from, to)
}

pub(crate) fn list_counts_on(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DenominationCount>> {
    let sql = format!(
        "SELECT date, {}, COALESCE(total_cash, 0) FROM daily_cash_count
         WHERE date BETWEEN ?1 AND ?2 ORDER BY date ASC",
        count_columns()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![date_key(from), date_key(to)], map_count_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn list_summaries_on(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailySummary>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUMMARY_SELECT_COLUMNS} FROM daily_cash
         WHERE date BETWEEN ?1 AND ?2 ORDER BY date ASC",
    ))?;
    let rows = stmt
        .query_map(params![date_key(from), date_key(to)], map_summary_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const SUMMARY_SELECT_COLUMNS: &str = "date,
    COALESCE(prev_day_cash, 0), COALESCE(total_cash_sell, 0),
    COALESCE(other_sell, 0), COALESCE(total_card_sell, 0),
    COALESCE(total_daily_sell, 0), COALESCE(next_day_cash_note, 0),
    COALESCE(next_day_cash_coin, 0), COALESCE(total_cash_taken, 0),
    cash_taken_by";

/// `qty, total` column pairs for all 11 denominations, NULL-coalesced, in
/// canonical order.
fn count_columns() -> String {
    Denomination::ALL
        .iter()
        .map(|d| {
            format!(
                "COALESCE({}, 0), COALESCE({}, 0)",
                d.qty_column(),
                d.total_column()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn map_count_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DenominationCount> {
    let date = parse_date_col(row, 0)?;
    let mut quantities = [0_i64; 11];
    let mut subtotals = [0.0_f64; 11];
    for (i, _) in Denomination::ALL.iter().enumerate() {
        quantities[i] = row.get(1 + i * 2)?;
        subtotals[i] = row.get(2 + i * 2)?;
    }
    let total_cash: f64 = row.get(1 + Denomination::ALL.len() * 2)?;
    Ok(DenominationCount {
        date,
        quantities,
        subtotals,
        total_cash,
    })
}

fn map_summary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailySummary> {
    Ok(DailySummary {
        date: parse_date_col(row, 0)?,
        prev_day_cash: row.get(1)?,
        total_cash_sell: row.get(2)?,
        other_sell: row.get(3)?,
        total_card_sell: row.get(4)?,
        total_daily_sell: row.get(5)?,
        next_day_cash_note: row.get(6)?,
        next_day_cash_coin: row.get(7)?,
        total_cash_taken: row.get(8)?,
        cash_taken_by: row.get(9)?,
    })
}

fn parse_date_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

/// ISO `YYYY-MM-DD` key used for every `date` column.
pub(crate) fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a free-text amount from the UI. Rejects negatives and non-numbers.
fn parse_amount(text: &str) -> Result<f64> {
    let amount: f64 = text
        .trim()
        .parse()
        .map_err(|_| LedgerError::InvalidAmount(text.to_string()))?;
    if !amount.is_finite() || amount < 0.0 {
        return Err(LedgerError::InvalidAmount(text.to_string()));
    }
    Ok(amount)
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(String::from)
}

fn num_field(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    })
}

// ===========================================================================
// Tests
// ===========================================================================
