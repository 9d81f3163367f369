//! Spreadsheet export for E-Cash Desk.
//!
//! Writes date-range reports as CSV: one sheet listing the denomination
//! count rows, one listing the daily summary rows, both ascending by date.
//! Files start with a UTF-8 BOM so Excel renders the € labels correctly.

use chrono::NaiveDate;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::db::DbState;
use crate::denomination::Denomination;
use crate::error::Result;
use crate::ledger::{self, date_key};

/// UTF-8 BOM so Excel detects the encoding.
const BOM: &[u8] = b"\xEF\xBB\xBF";
/// Column separator.
const SEP: &str = ",";

/// Quote a field if it contains the separator, a quote, or a newline.
fn escape_csv(value: &str) -> String {
    if value.contains(SEP) || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_sheet(path: &Path, headers: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(BOM)?;
    writeln!(file, "{}", headers.join(SEP))?;
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| escape_csv(v)).collect();
        writeln!(file, "{}", line.join(SEP))?;
    }
    Ok(())
}

/// Export all denomination count rows in the inclusive date range to `path`.
///
/// Columns: `date`, the 11 `qty`/`total` pairs in canonical order,
/// `total_cash`. An empty range produces a header-only file. Returns the
/// number of data rows written.
pub fn export_counts_csv(
    db: &DbState,
    from: NaiveDate,
    to: NaiveDate,
    path: &Path,
) -> Result<usize> {
    let counts = ledger::list_counts(db, from, to)?;

    let mut headers = vec!["date"];
    for denom in Denomination::ALL {
        headers.push(denom.qty_column());
        headers.push(denom.total_column());
    }
    headers.push("total_cash");

    let rows: Vec<Vec<String>> = counts
        .iter()
        .map(|c| {
            let mut row = vec![date_key(c.date)];
            for denom in Denomination::ALL {
                row.push(c.qty(denom).to_string());
                row.push(format!("{:.2}", c.subtotal(denom)));
            }
            row.push(format!("{:.2}", c.total_cash));
            row
        })
        .collect();

    write_sheet(path, &headers, &rows)?;
    info!(
        "Exported {} cash count rows ({from}..={to}) to {}",
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}

/// Export all daily summary rows in the inclusive date range to `path`.
/// Returns the number of data rows written.
pub fn export_summaries_csv(
    db: &DbState,
    from: NaiveDate,
    to: NaiveDate,
    path: &Path,
) -> Result<usize> {
    let summaries = ledger::list_summaries(db, from, to)?;

    let headers = [
        "date",
        "prev_day_cash",
        "total_cash_sell",
        "other_sell",
        "total_card_sell",
        "total_daily_sell",
        "next_day_cash_note",
        "next_day_cash_coin",
        "total_cash_taken",
        "cash_taken_by",
    ];

    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|s| {
            vec![
                date_key(s.date),
                format!("{:.2}", s.prev_day_cash),
                format!("{:.2}", s.total_cash_sell),
                format!("{:.2}", s.other_sell),
                format!("{:.2}", s.total_card_sell),
                format!("{:.2}", s.total_daily_sell),
                format!("{:.2}", s.next_day_cash_note),
                format!("{:.2}", s.next_day_cash_coin),
                format!("{:.2}", s.total_cash_taken),
                s.cash_taken_by.clone().unwrap_or_default(),
            ]
        })
        .collect();

    write_sheet(path, &headers, &rows)?;
    info!(
        "Exported {} summary rows ({from}..={to}) to {}",
        rows.len(),
        path.display()
    );
    Ok(rows.len())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, DbState};
    use crate::ledger::{record_denomination, upsert_summary};
    use crate::reconcile::recompute_cash_sold;
    use rusqlite::Connection;

    fn test_db() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: std::sync::Mutex::new(conn),
            db_path: std::path::PathBuf::from(":memory:"),
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid test date")
    }

    /// Minimal CSV reader for the files this module writes (no embedded
    /// newlines in our fields).
    fn read_sheet(path: &Path) -> Vec<Vec<String>> {
        let raw = std::fs::read(path).expect("read exported file");
        assert_eq!(&raw[..3], BOM, "missing UTF-8 BOM");
        let text = String::from_utf8(raw[3..].to_vec()).expect("utf-8");
        text.lines()
            .map(|line| {
                let mut fields = Vec::new();
                let mut cur = String::new();
                let mut in_quotes = false;
                let mut chars = line.chars().peekable();
                while let Some(c) = chars.next() {
                    match c {
                        '"' if in_quotes && chars.peek() == Some(&'"') => {
                            cur.push('"');
                            chars.next();
                        }
                        '"' => in_quotes = !in_quotes,
                        ',' if !in_quotes => fields.push(std::mem::take(&mut cur)),
                        _ => cur.push(c),
                    }
                }
                fields.push(cur);
                fields
            })
            .collect()
    }

    #[test]
    fn test_counts_round_trip() {
        let db = test_db();
        record_denomination(&db, day("2024-01-01"), "€50", 5).unwrap();
        record_denomination(&db, day("2024-01-01"), "10c", 10).unwrap();
        record_denomination(&db, day("2024-01-02"), "€20", 3).unwrap();
        record_denomination(&db, day("2024-02-15"), "€5", 1).unwrap(); // outside range

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.csv");
        let written =
            export_counts_csv(&db, day("2024-01-01"), day("2024-01-31"), &path).unwrap();
        assert_eq!(written, 2);

        let sheet = read_sheet(&path);
        assert_eq!(sheet.len(), 3, "header + 2 rows");
        assert_eq!(sheet[0][0], "date");
        assert_eq!(sheet[0].len(), 1 + 22 + 1);

        // Row values reproduce the source rows
        let source = crate::ledger::list_counts(&db, day("2024-01-01"), day("2024-01-31")).unwrap();
        for (row, count) in sheet[1..].iter().zip(&source) {
            assert_eq!(row[0], date_key(count.date));
            for (i, denom) in Denomination::ALL.iter().enumerate() {
                assert_eq!(row[1 + i * 2], count.qty(*denom).to_string());
                assert_eq!(row[2 + i * 2], format!("{:.2}", count.subtotal(*denom)));
            }
            assert_eq!(*row.last().unwrap(), format!("{:.2}", count.total_cash));
        }
        assert_eq!(sheet[1][0], "2024-01-01");
        assert_eq!(*sheet[1].last().unwrap(), "251.00");
    }

    #[test]
    fn test_summaries_round_trip_with_quoted_field() {
        let db = test_db();
        let date = day("2024-03-01");
        record_denomination(&db, date, "€100", 2).unwrap();
        upsert_summary(
            &db,
            date,
            &serde_json::json!({
                "prev_day_cash": 50.0,
                "cash_taken_by": "Petrov, Ivan",
            }),
        )
        .unwrap();
        recompute_cash_sold(&db, date).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.csv");
        let written = export_summaries_csv(&db, date, date, &path).unwrap();
        assert_eq!(written, 1);

        let sheet = read_sheet(&path);
        assert_eq!(sheet.len(), 2);
        let row = &sheet[1];
        assert_eq!(row[0], "2024-03-01");
        assert_eq!(row[1], "50.00"); // prev_day_cash
        assert_eq!(row[2], "150.00"); // total_cash_sell = 200 - 50
        assert_eq!(row[9], "Petrov, Ivan"); // comma survived quoting
    }

    #[test]
    fn test_empty_range_writes_header_only() {
        let db = test_db();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        let written =
            export_counts_csv(&db, day("2031-01-01"), day("2031-12-31"), &path).unwrap();
        assert_eq!(written, 0);
        assert_eq!(read_sheet(&path).len(), 1);
    }
}
