// Schema migrations for the corpus database.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version
const SCHEMA_VERSION: i32 = 3;

/// Run all necessary migrations to bring the database up to date
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    ).unwrap_or(false);

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    ).unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [version],
    ).context("Failed to record schema version")?;
    Ok(())
}

/// Document graph: companies, periods, calls, participants, turns,
/// statements (version 1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS companies (
            ticker TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS periods (
            id TEXT PRIMARY KEY,
            ticker TEXT NOT NULL REFERENCES companies(ticker),
            fiscal_year INTEGER NOT NULL,
            quarter INTEGER NOT NULL,
            UNIQUE(ticker, fiscal_year, quarter)
        );

        CREATE TABLE IF NOT EXISTS calls (
            id TEXT PRIMARY KEY,
            period_id TEXT NOT NULL REFERENCES periods(id),
            call_date TEXT NOT NULL,
            duration_seconds REAL NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            checkpoint TEXT NOT NULL DEFAULT 'pending',
            roster_json TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS participants (
            id TEXT PRIMARY KEY,
            call_id TEXT NOT NULL REFERENCES calls(id) ON DELETE CASCADE,
            speaker_label TEXT NOT NULL,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'unknown',
            confidence REAL NOT NULL DEFAULT 0.0,
            identity_key TEXT
        );

        CREATE TABLE IF NOT EXISTS turns (
            id TEXT PRIMARY KEY,
            call_id TEXT NOT NULL REFERENCES calls(id) ON DELETE CASCADE,
            participant_id TEXT NOT NULL REFERENCES participants(id),
            seq INTEGER NOT NULL,
            start_s REAL NOT NULL,
            end_s REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS statements (
            id TEXT PRIMARY KEY,
            turn_id TEXT NOT NULL REFERENCES turns(id) ON DELETE CASCADE,
            call_id TEXT NOT NULL REFERENCES calls(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            start_s REAL NOT NULL,
            end_s REAL NOT NULL,
            text TEXT NOT NULL,
            normalized_text TEXT NOT NULL,
            topic_tags TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_calls_period ON calls(period_id);
        CREATE INDEX IF NOT EXISTS idx_participants_call ON participants(call_id);
        CREATE INDEX IF NOT EXISTS idx_turns_call ON turns(call_id, seq);
        CREATE INDEX IF NOT EXISTS idx_statements_call ON statements(call_id);
        CREATE INDEX IF NOT EXISTS idx_statements_turn ON statements(turn_id, seq);
        "#,
    ).context("Failed to create document graph tables")?;

    set_schema_version(conn, 1)
}

/// Lexical postings and semantic vectors (version 2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS lexical_postings (
            token TEXT NOT NULL,
            statement_id TEXT NOT NULL,
            call_id TEXT NOT NULL,
            PRIMARY KEY (token, statement_id)
        );

        CREATE TABLE IF NOT EXISTS statement_vectors (
            statement_id TEXT PRIMARY KEY,
            call_id TEXT NOT NULL,
            dim INTEGER NOT NULL,
            vector BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_postings_statement ON lexical_postings(statement_id);
        CREATE INDEX IF NOT EXISTS idx_postings_call ON lexical_postings(call_id);
        CREATE INDEX IF NOT EXISTS idx_vectors_call ON statement_vectors(call_id);
        "#,
    ).context("Failed to create index tables")?;

    set_schema_version(conn, 2)
}

/// Denormalized role aggregates (version 3)
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS role_statement_counts (
            ticker TEXT NOT NULL,
            role TEXT NOT NULL,
            count INTEGER NOT NULL,
            PRIMARY KEY (ticker, role)
        );
        "#,
    ).context("Failed to create aggregate tables")?;

    set_schema_version(conn, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_to_latest() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
