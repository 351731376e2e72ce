//! SQLite persistence for closed bars.
//!
//! Single-table autocommit inserts; persistence is best-effort and an insert
//! failure never stops the bar from being broadcast. Only open-time errors
//! are fatal.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::warn;

use crate::models::Bar;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS tick_1min(\
    symbol TEXT, ts INT, open REAL, high REAL, low REAL, close REAL, volume INT);";

pub struct BarStore {
    conn: Mutex<Connection>,
}

impl BarStore {
    /// Open (or create) the store at `path` and bootstrap the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open bar store at {path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to create tick_1min schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Best-effort insert; errors are logged and swallowed.
    pub fn insert(&self, bar: &Bar) {
        // A bar whose open never seeded gets no row.
        if !bar.open.is_finite() {
            warn!(symbol = %bar.symbol, ts = bar.ts, "bar without a seeded open, skipping insert");
            return;
        }
        let result = self.conn.lock().execute(
            "INSERT INTO tick_1min(symbol, ts, open, high, low, close, volume) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                bar.symbol,
                bar.ts,
                round5(bar.open),
                round5(bar.high),
                round5(bar.low),
                round5(bar.close),
                bar.volume
            ],
        );
        if let Err(e) = result {
            warn!(symbol = %bar.symbol, ts = bar.ts, error = %e, "bar insert failed");
        }
    }

    pub fn count(&self) -> Result<i64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM tick_1min", [], |row| row.get(0))
            .context("failed to count bars")
    }
}

/// Prices persist with five fractional digits.
fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar() -> Bar {
        Bar {
            symbol: "S0001".to_string(),
            ts: 1_714_000_000,
            open: 1.170123456,
            high: 1.2,
            low: 0.9,
            close: 1.1,
            volume: 30,
        }
    }

    #[test]
    fn open_bootstraps_schema_and_inserts() {
        let store = BarStore::open(":memory:").unwrap();
        assert_eq!(store.count().unwrap(), 0);
        store.insert(&bar());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn prices_are_rounded_to_five_digits() {
        let store = BarStore::open(":memory:").unwrap();
        store.insert(&bar());
        let open: f64 = store
            .conn
            .lock()
            .query_row("SELECT open FROM tick_1min", [], |row| row.get(0))
            .unwrap();
        assert_eq!(open, 1.17012);
    }

    #[test]
    fn non_finite_open_is_skipped() {
        let store = BarStore::open(":memory:").unwrap();
        let mut b = bar();
        b.open = f64::NAN;
        store.insert(&b);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn reopening_keeps_the_table() {
        let store = BarStore::open(":memory:").unwrap();
        // Schema creation is idempotent.
        store.conn.lock().execute_batch(SCHEMA_SQL).unwrap();
        store.insert(&bar());
        assert_eq!(store.count().unwrap(), 1);
    }
}
