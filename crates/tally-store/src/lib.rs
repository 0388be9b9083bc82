//! Tally Storage Layer
//!
//! Implements the LedgerStore trait on SQLite.
//!
//! The ledger is a single append-only `spends` table. Every extraction event
//! is written as one transaction, so a failed insert never leaves part of an
//! event behind.
//!
//! # Examples
//!
//! ```no_run
//! use tally_store::SqliteStore;
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! // Store is now ready for ledger writes
//! ```

#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tally_domain::traits::LedgerStore;
use tally_domain::{LedgerRecord, Source};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

const INSERT_SQL: &str = "INSERT INTO spends (
    id, tg_user_id, created_at, source, raw_text,
    spend_total, currency, item_name, item_price, cashier_name, json
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const SELECT_SQL: &str = "SELECT id, tg_user_id, created_at, source, raw_text,
    spend_total, currency, item_name, item_price, cashier_name, json
FROM spends";

/// SQLite-based implementation of LedgerStore
///
/// # Thread Safety
///
/// SQLite connections are not thread-safe. Share one store between tasks
/// behind a mutex; SQLite's own locking serializes the transactions.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the ledger at the given path
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tally_store::SqliteStore;
    ///
    /// let store = SqliteStore::new("spends.db").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema. Safe to run on an existing ledger.
    fn initialize_schema(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<LedgerRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<LedgerRecord> {
        let source_str: String = row.get(3)?;
        let source = Source::parse(&source_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(StoreError::InvalidData(format!("Unknown source: {}", source_str))),
            )
        })?;

        let created_at: DateTime<Utc> = row.get(2)?;

        Ok(LedgerRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            created_at,
            source,
            raw_text: row.get(4)?,
            spend_total: row.get(5)?,
            currency: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            item_name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            item_price: row.get::<_, Option<f64>>(8)?.unwrap_or_default(),
            cashier_name: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            json: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        })
    }
}

impl LedgerStore for SqliteStore {
    type Error = StoreError;

    fn insert_batch(&mut self, records: &[LedgerRecord]) -> Result<usize, Self::Error> {
        // Dropping the transaction on any early return rolls it back
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(INSERT_SQL)?;
            for record in records {
                stmt.execute(params![
                    &record.id,
                    record.user_id,
                    record.created_at,
                    record.source.as_str(),
                    &record.raw_text,
                    record.spend_total,
                    &record.currency,
                    &record.item_name,
                    record.item_price,
                    &record.cashier_name,
                    &record.json,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Committed {} ledger records", records.len());
        Ok(records.len())
    }

    fn records_with_prefix(&self, correlation: &str) -> Result<Vec<LedgerRecord>, Self::Error> {
        let escaped = correlation
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("{}-%", escaped);
        let sql = format!(
            "{} WHERE id = ?1 OR id LIKE ?2 ESCAPE '\\' ORDER BY rowid",
            SELECT_SQL
        );
        self.query(&sql, params![correlation, pattern])
    }

    fn records_for_user(&self, user_id: i64) -> Result<Vec<LedgerRecord>, Self::Error> {
        let sql = format!("{} WHERE tg_user_id = ?1 ORDER BY created_at, rowid", SELECT_SQL);
        self.query(&sql, params![user_id])
    }

    fn count(&self) -> Result<usize, Self::Error> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM spends", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, user_id: i64) -> LedgerRecord {
        LedgerRecord {
            id: id.to_string(),
            user_id,
            created_at: Utc::now(),
            source: Source::Voice,
            raw_text: None,
            spend_total: 12.5,
            currency: "EUR".to_string(),
            item_name: "coffee".to_string(),
            item_price: 12.5,
            cashier_name: String::new(),
            json: "{}".to_string(),
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        assert!(store.initialize_schema().is_ok());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        assert_eq!(store.insert_batch(&[]).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_prefix_match_does_not_treat_underscore_as_wildcard() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        store.insert_batch(&[record("a_b-0", 1), record("axb-0", 1)]).unwrap();

        let found = store.records_with_prefix("a_b").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a_b-0");
    }

    #[test]
    fn test_unknown_source_is_rejected_on_read() {
        let mut store = SqliteStore::new(":memory:").unwrap();
        store.insert_batch(&[record("x", 1)]).unwrap();
        store
            .conn
            .execute("UPDATE spends SET source = 'fax' WHERE id = 'x'", [])
            .unwrap();

        assert!(store.records_for_user(1).is_err());
    }
}
