//! Local SQLite database layer for E-Cash Desk.
//!
//! Uses rusqlite with WAL mode. Owns schema bootstrap and migrations for the
//! five ledger tables. Databases created by earlier prototypes of the tool
//! are upgraded in place by adding missing columns with zero defaults —
//! migrations are never destructive.

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::denomination::Denomination;
use crate::error::{LedgerError, Result};

/// Shared state holding the single long-lived database connection.
///
/// Opened once at startup and passed to both the ledger store and the
/// reconciliation engine — no module-level singleton.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// Lock the connection, mapping a poisoned mutex to a ledger error.
    pub(crate) fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Database file name inside the data directory.
const DB_FILE: &str = "ecash.db";

/// Initialize the database at `{data_dir}/ecash.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once. Schema failures here are fatal;
/// nothing else in the crate terminates the process.
pub fn init(data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(data_dir)?;

    let db_path = data_dir.join(DB_FILE);
    info!("Opening ledger database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!("Database open failed ({first_err}), deleting and retrying once");
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Ledger database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
pub(crate) fn run_migrations(conn: &Connection) -> Result<()> {
    // Ensure schema_version table exists first
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: create the five ledger tables.
///
/// `daily_cash_count` is created minimalist (surrogate key only) so that v2's
/// additive column pass is the single code path for both fresh databases and
/// ones inherited from the earlier prototypes, which shipped divergent column
/// sets.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- per-date denomination ledger; columns added in v2
        CREATE TABLE IF NOT EXISTS daily_cash_count (
            id INTEGER PRIMARY KEY AUTOINCREMENT
        );

        -- expense log (append-only)
        CREATE TABLE IF NOT EXISTS daily_expenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT, invoice TEXT, amount REAL, status TEXT
        );

        -- old invoice payments (append-only)
        CREATE TABLE IF NOT EXISTS old_invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT, invoice TEXT, amount REAL
        );

        -- miscellaneous cash movements (append-only)
        CREATE TABLE IF NOT EXISTS bio_cash (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT, purpose TEXT, amount REAL, vendor TEXT, sold_by TEXT
        );

        -- daily summary, one row per date
        CREATE TABLE IF NOT EXISTS daily_cash (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT,
            total_card_sell REAL DEFAULT 0,
            total_daily_sell REAL DEFAULT 0,
            next_day_cash_note REAL DEFAULT 0,
            next_day_cash_coin REAL DEFAULT 0,
            total_cash_taken REAL DEFAULT 0,
            cash_taken_by TEXT
        );

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        LedgerError::Storage(e)
    })?;

    info!("Applied migration v1 (ledger tables)");
    Ok(())
}

/// Migration v2: ensure every required column exists, then add the unique
/// per-date indexes the additive upserts rely on.
fn migrate_v2(conn: &Connection) -> Result<()> {
    ensure_column(conn, "daily_cash_count", "date", "TEXT")?;
    for denom in Denomination::ALL {
        ensure_column(
            conn,
            "daily_cash_count",
            denom.qty_column(),
            "INTEGER DEFAULT 0",
        )?;
        ensure_column(
            conn,
            "daily_cash_count",
            denom.total_column(),
            "REAL DEFAULT 0",
        )?;
    }
    ensure_column(conn, "daily_cash_count", "total_cash", "REAL DEFAULT 0")?;

    // The earlier prototypes shipped divergent daily_cash shapes; ensure the
    // full summary column set
    ensure_column(conn, "daily_cash", "date", "TEXT")?;
    for col in [
        "prev_day_cash",
        "total_cash_sell",
        "other_sell",
        "total_card_sell",
        "total_daily_sell",
        "next_day_cash_note",
        "next_day_cash_coin",
        "total_cash_taken",
    ] {
        ensure_column(conn, "daily_cash", col, "REAL DEFAULT 0")?;
    }
    ensure_column(conn, "daily_cash", "cash_taken_by", "TEXT")?;

    // Some prototypes logged expenses and bio cash without a date column
    for table in ["daily_expenses", "old_invoices", "bio_cash"] {
        ensure_column(conn, table, "date", "TEXT")?;
    }

    conn.execute_batch(
        "
        CREATE UNIQUE INDEX IF NOT EXISTS idx_dcc_date ON daily_cash_count(date);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_dc_date ON daily_cash(date);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        LedgerError::Storage(e)
    })?;

    info!("Applied migration v2 (column backfill + date indexes)");
    Ok(())
}

/// Column names currently present on a table.
fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(cols)
}

/// Add `col` to `table` if it is missing. Never drops or rewrites data.
fn ensure_column(conn: &Connection, table: &str, col: &str, decl: &str) -> Result<()> {
    if !table_columns(conn, table)?.iter().any(|c| c == col) {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {col} {decl}"))
            .map_err(|e| {
                error!("ensure_column {table}.{col} failed: {e}");
                LedgerError::Storage(e)
            })?;
    }
    Ok(())
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    /// Open an in-memory database and apply pragmas (mirrors open_and_configure).
    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .expect("pragma setup");
        conn
    }

    /// Helper: list table names in the database.
    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_fresh_database() {
        let conn = test_conn();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        for table in [
            "daily_cash_count",
            "daily_cash",
            "daily_expenses",
            "old_invoices",
            "bio_cash",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }

        // Every denomination column pair must exist after v2
        let cols = table_columns(&conn, "daily_cash_count").unwrap();
        for denom in Denomination::ALL {
            assert!(cols.iter().any(|c| c == denom.qty_column()));
            assert!(cols.iter().any(|c| c == denom.total_column()));
        }
        assert!(cols.iter().any(|c| c == "total_cash"));

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_conn();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run should be a no-op");
    }

    #[test]
    fn test_prototype_database_upgrades_in_place() {
        // Simulate a database left behind by an earlier prototype: partial
        // daily_cash_count, daily_cash without the v2 summary fields, and
        // existing rows that must survive the upgrade.
        let conn = test_conn();
        conn.execute_batch(
            "CREATE TABLE daily_cash_count (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT,
                euro50_qty INTEGER, euro50_total REAL,
                total_cash REAL
            );
            CREATE TABLE daily_cash (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT,
                next_day_cash_coin REAL DEFAULT 0
            );
            CREATE TABLE bio_cash (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                purpose TEXT, amount REAL, vendor TEXT, sold_by TEXT
            );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO daily_cash_count (date, euro50_qty, euro50_total, total_cash)
             VALUES ('2023-11-05', 4, 200.0, 200.0)",
            [],
        )
        .unwrap();

        run_migrations(&conn).expect("upgrade should succeed");

        // New columns exist with zero defaults, old data untouched
        let (qty, total, cent10): (i64, f64, f64) = conn
            .query_row(
                "SELECT euro50_qty, total_cash, COALESCE(cent10_total, 0)
                 FROM daily_cash_count WHERE date = '2023-11-05'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(qty, 4);
        assert_eq!(total, 200.0);
        assert_eq!(cent10, 0.0);

        let dc_cols = table_columns(&conn, "daily_cash").unwrap();
        for col in [
            "prev_day_cash",
            "total_cash_sell",
            "other_sell",
            "total_card_sell",
            "total_daily_sell",
            "total_cash_taken",
            "cash_taken_by",
        ] {
            assert!(dc_cols.iter().any(|c| c == col), "missing {col}");
        }

        // Date-less prototype log table gains its date column
        let bio_cols = table_columns(&conn, "bio_cash").unwrap();
        assert!(bio_cols.iter().any(|c| c == "date"));
    }

    #[test]
    fn test_date_unique_index_enforced() {
        let conn = test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO daily_cash_count (date, total_cash) VALUES (?1, 0)",
            params!["2024-01-01"],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO daily_cash_count (date, total_cash) VALUES (?1, 0)",
            params!["2024-01-01"],
        );
        assert!(dup.is_err(), "duplicate date must violate the unique index");
    }
}
