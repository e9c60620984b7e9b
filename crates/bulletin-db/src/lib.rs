pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Transaction};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Handle to the relational store. Constructed once at startup and shared
/// behind an `Arc` by everything that needs it.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        let db = Self::from_connection(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Runs `f` inside a single transaction. Commits when `f` returns `Ok`,
    /// rolls back (on drop) otherwise.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// True when `err` comes from a `UNIQUE` constraint rejecting a write. Callers
/// that check for duplicates first use this to catch the write that lost a race.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_inserts_are_unique_violations() {
        let db = Database::open_in_memory().unwrap();
        db.create_website("Shop", "shop.example.com", false).unwrap();

        let err = db.create_website("Copy", "shop.example.com", false).unwrap_err();
        assert!(is_unique_violation(&err));

        assert!(!is_unique_violation(&anyhow::anyhow!("something else")));
    }

    #[test]
    fn foreign_key_failures_are_not_unique_violations() {
        let db = Database::open_in_memory().unwrap();
        let err = db.create_invitation("jo@example.com", 42).unwrap_err();
        assert!(!is_unique_violation(&err));
    }
}
