// Index maintenance: lexical postings and semantic vectors derived from
// statements.
//
// All writers take an open connection so the ingestion pipeline can put
// index updates in the same transaction as the documents they index.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::corpus::models::Statement;
use crate::errors::IndexConsistencyError;
use crate::index::lexical;

/// Index one statement: postings for every token of its normalized text,
/// plus its embedding vector. Idempotent: re-adding an already-indexed
/// statement id is a no-op.
pub fn add_statement(conn: &Connection, statement: &Statement, vector: &[f32]) -> Result<()> {
    for token in lexical::tokenize(&statement.normalized_text) {
        conn.execute(
            "INSERT OR IGNORE INTO lexical_postings (token, statement_id, call_id) VALUES (?1, ?2, ?3)",
            params![token, statement.id, statement.call_id],
        ).context("Failed to insert lexical posting")?;
    }

    conn.execute(
        r#"
        INSERT OR IGNORE INTO statement_vectors (statement_id, call_id, dim, vector)
        VALUES (?1, ?2, ?3, ?4)
        "#,
        params![
            statement.id,
            statement.call_id,
            vector.len() as i64,
            encode_vector(vector),
        ],
    ).context("Failed to insert statement vector")?;

    Ok(())
}

/// Remove every posting and vector belonging to a call. Exact by
/// construction: both index tables carry the call id.
pub fn remove_statements_for_call(conn: &Connection, call_id: &str) -> Result<()> {
    let postings = conn.execute(
        "DELETE FROM lexical_postings WHERE call_id = ?",
        params![call_id],
    ).context("Failed to delete lexical postings")?;

    let vectors = conn.execute(
        "DELETE FROM statement_vectors WHERE call_id = ?",
        params![call_id],
    ).context("Failed to delete statement vectors")?;

    log::debug!(
        "Removed {} postings and {} vectors for call {}",
        postings,
        vectors,
        call_id
    );
    Ok(())
}

/// Exhaustive scan for index entries referencing a call. Used by tests and
/// consistency checks; returns (posting count, vector count).
pub fn scan_entries_for_call(conn: &Connection, call_id: &str) -> Result<(i64, i64)> {
    let postings: i64 = conn.query_row(
        "SELECT COUNT(*) FROM lexical_postings WHERE call_id = ?",
        params![call_id],
        |row| row.get(0),
    ).context("Failed to count postings")?;

    let vectors: i64 = conn.query_row(
        "SELECT COUNT(*) FROM statement_vectors WHERE call_id = ?",
        params![call_id],
        |row| row.get(0),
    ).context("Failed to count vectors")?;

    Ok((postings, vectors))
}

/// Verify no index entry references a statement that no longer exists.
/// A violation is an internal bug, never silently repaired.
pub fn verify_consistency(conn: &Connection) -> Result<()> {
    let orphaned_postings: i64 = conn.query_row(
        r#"
        SELECT COUNT(*) FROM lexical_postings lp
        WHERE NOT EXISTS (SELECT 1 FROM statements s WHERE s.id = lp.statement_id)
        "#,
        [],
        |row| row.get(0),
    ).context("Failed to scan for orphaned postings")?;

    let orphaned_vectors: i64 = conn.query_row(
        r#"
        SELECT COUNT(*) FROM statement_vectors sv
        WHERE NOT EXISTS (SELECT 1 FROM statements s WHERE s.id = sv.statement_id)
        "#,
        [],
        |row| row.get(0),
    ).context("Failed to scan for orphaned vectors")?;

    if orphaned_postings > 0 || orphaned_vectors > 0 {
        return Err(IndexConsistencyError {
            detail: format!(
                "{} orphaned postings, {} orphaned vectors",
                orphaned_postings, orphaned_vectors
            ),
        }
        .into());
    }

    Ok(())
}

/// Fetch the stored vector for a statement, if indexed.
pub fn get_vector(conn: &Connection, statement_id: &str) -> Result<Option<Vec<f32>>> {
    use rusqlite::OptionalExtension;

    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT vector FROM statement_vectors WHERE statement_id = ?",
            params![statement_id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to fetch statement vector")?;

    Ok(blob.map(|b| decode_vector(&b)))
}

/// Statement ids whose postings contain the given token.
pub fn statement_ids_for_token(conn: &Connection, token: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT statement_id FROM lexical_postings WHERE token = ? ORDER BY statement_id",
    ).context("Failed to prepare posting lookup")?;

    let ids = stmt
        .query_map(params![token], |row| row.get::<_, String>(0))
        .context("Failed to query postings")?;

    ids.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect posting ids")
}

/// Little-endian f32 packing for vector blobs.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::migrations;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn
    }

    fn statement(id: &str, call_id: &str, text: &str) -> Statement {
        Statement {
            id: id.to_string(),
            turn_id: format!("{}:t0", call_id),
            call_id: call_id.to_string(),
            seq: 0,
            start_s: 0.0,
            end_s: 5.0,
            text: text.to_string(),
            normalized_text: lexical::normalize(text),
            topic_tags: Vec::new(),
        }
    }

    #[test]
    fn test_add_statement_writes_postings_and_vector() {
        let conn = setup_test_db();
        let s = statement("c1:t0:s0", "c1", "Guidance raised for the year.");

        add_statement(&conn, &s, &[0.1, 0.2, 0.3]).unwrap();

        let ids = statement_ids_for_token(&conn, "guidance").unwrap();
        assert_eq!(ids, vec!["c1:t0:s0"]);

        let vector = get_vector(&conn, "c1:t0:s0").unwrap().unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_indexing_is_idempotent() {
        let conn = setup_test_db();
        let s = statement("c1:t0:s0", "c1", "Guidance raised.");

        add_statement(&conn, &s, &[1.0, 0.0]).unwrap();
        add_statement(&conn, &s, &[1.0, 0.0]).unwrap();

        let (postings, vectors) = scan_entries_for_call(&conn, "c1").unwrap();
        assert_eq!(postings, 2); // "guidance", "raised"
        assert_eq!(vectors, 1);
    }

    #[test]
    fn test_remove_leaves_no_entries_for_call() {
        let conn = setup_test_db();
        add_statement(&conn, &statement("c1:t0:s0", "c1", "guidance up"), &[1.0]).unwrap();
        add_statement(&conn, &statement("c2:t0:s0", "c2", "guidance down"), &[1.0]).unwrap();

        remove_statements_for_call(&conn, "c1").unwrap();

        assert_eq!(scan_entries_for_call(&conn, "c1").unwrap(), (0, 0));
        let (postings, vectors) = scan_entries_for_call(&conn, "c2").unwrap();
        assert!(postings > 0 && vectors == 1);
    }

    #[test]
    fn test_vector_blob_roundtrip() {
        let original = vec![0.5f32, -1.25, 3.75, 0.0];
        assert_eq!(decode_vector(&encode_vector(&original)), original);
    }

    #[test]
    fn test_verify_consistency_detects_orphans() {
        let conn = setup_test_db();
        verify_consistency(&conn).unwrap();

        // Posting with no backing statement row.
        conn.execute(
            "INSERT INTO lexical_postings (token, statement_id, call_id) VALUES ('ghost', 'missing', 'c9')",
            [],
        ).unwrap();

        let err = verify_consistency(&conn).unwrap_err();
        assert!(err.downcast_ref::<IndexConsistencyError>().is_some());
    }
}
