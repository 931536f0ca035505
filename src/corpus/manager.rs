// Corpus manager: owns the SQLite connection behind a mutex and runs
// migrations on open. Documents, postings, vectors and aggregates all live
// in one database so call replacement is a single transaction.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;

use super::migrations;

/// Owns the SQLite connection for the corpus database.
pub struct CorpusManager {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl CorpusManager {
    /// Open (or create) the corpus database at the given path.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create corpus database directory")?;
        }

        let conn = Connection::open(&db_path)
            .context("Failed to open corpus database")?;

        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;

        migrations::run_migrations(&conn)
            .context("Failed to run corpus migrations")?;

        log::info!("Corpus database initialized at: {:?}", db_path);

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Execute a function with access to the database connection.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock()
            .map_err(|e| anyhow::anyhow!("Failed to lock corpus connection: {}", e))?;
        f(&conn)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("corpus.db");

        let manager = CorpusManager::new(db_path.clone()).unwrap();
        assert!(db_path.exists());

        manager.with_connection(|conn| {
            let count: i32 = conn.query_row(
                "SELECT COUNT(*) FROM calls",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(count, 0);
            Ok(())
        }).unwrap();
    }
}
