// Call-level repository: companies, periods, calls, lifecycle status and
// the denormalized role aggregates.
//
// Public methods lock the connection; the *_impl functions take an open
// connection so the ingestion pipeline can compose them inside one
// transaction.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;

use crate::domain::{CallStatus, PeriodKey, SpeakerRole};

use super::models::{Call, Period, RoleStatementCount};
use super::CorpusManager;

impl CorpusManager {
    /// Look up a call by id.
    pub fn get_call(&self, call_id: &str) -> Result<Option<Call>> {
        self.with_connection(|conn| get_call_impl(conn, call_id))
    }

    /// All calls for a company, most recent first.
    pub fn list_calls_for_company(&self, ticker: &str) -> Result<Vec<Call>> {
        self.with_connection(|conn| list_calls_for_company_impl(conn, ticker))
    }

    /// All calls for one fiscal period of a company (normally one, but
    /// restatements and replays are allowed).
    pub fn list_calls_for_period(&self, ticker: &str, period: PeriodKey) -> Result<Vec<Call>> {
        self.with_connection(|conn| list_calls_for_period_impl(conn, ticker, period))
    }

    /// Delete a call and all descendants plus their index entries.
    pub fn delete_call(&self, call_id: &str) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()
                .context("Failed to start delete_call transaction")?;
            delete_call_impl(&tx, call_id)?;
            tx.commit().context("Failed to commit delete_call")
        })
    }

    /// Denormalized statement counts by role for a company.
    pub fn role_counts(&self, ticker: &str) -> Result<Vec<RoleStatementCount>> {
        self.with_connection(|conn| get_role_counts_impl(conn, ticker))
    }
}

/// Insert the company and period rows for a call if absent; returns the
/// period id.
pub(crate) fn ensure_company_period(
    conn: &Connection,
    ticker: &str,
    company_name: &str,
    key: PeriodKey,
) -> Result<String> {
    let ticker = ticker.to_uppercase();

    conn.execute(
        "INSERT INTO companies (ticker, name) VALUES (?1, ?2)
         ON CONFLICT(ticker) DO UPDATE SET name = excluded.name",
        params![ticker, company_name],
    ).context("Failed to upsert company")?;

    let period_id = Period::make_id(&ticker, key);
    conn.execute(
        "INSERT OR IGNORE INTO periods (id, ticker, fiscal_year, quarter) VALUES (?1, ?2, ?3, ?4)",
        params![period_id, ticker, key.year, key.quarter.as_number()],
    ).context("Failed to insert period")?;

    Ok(period_id)
}

pub(crate) fn insert_call(
    conn: &Connection,
    call: &Call,
    roster_json: Option<&str>,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO calls (id, period_id, call_date, duration_seconds, status, checkpoint, roster_json)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            call.id,
            call.period_id,
            call.call_date.to_string(),
            call.duration_secs,
            call.status.as_str(),
            call.checkpoint.as_str(),
            roster_json,
        ],
    ).context("Failed to insert call")?;

    Ok(())
}

/// Advance a call's lifecycle status, enforcing forward-only transitions.
/// Successful phases also move the resumption checkpoint.
pub(crate) fn set_call_status(
    conn: &Connection,
    call_id: &str,
    next: CallStatus,
) -> Result<()> {
    let call = get_call_impl(conn, call_id)?
        .ok_or_else(|| anyhow!("Call not found: {}", call_id))?;

    // Regressions from failed are legal only back to the checkpoint or
    // beyond it, which can_advance_to encodes via the checkpoint rank.
    let current = if call.status == CallStatus::Failed {
        call.checkpoint
    } else {
        call.status
    };
    if !current.can_advance_to(next) {
        return Err(anyhow!(
            "Illegal status transition for call {}: {} -> {}",
            call_id,
            call.status,
            next
        ));
    }

    if next.rank().is_some() {
        conn.execute(
            "UPDATE calls SET status = ?1, checkpoint = ?1 WHERE id = ?2",
            params![next.as_str(), call_id],
        ).context("Failed to update call status")?;
    } else {
        // Failure keeps the checkpoint so ingestion can resume from it.
        conn.execute(
            "UPDATE calls SET status = ?1 WHERE id = ?2",
            params![next.as_str(), call_id],
        ).context("Failed to mark call failed")?;
    }

    Ok(())
}

pub(crate) fn get_call_impl(conn: &Connection, call_id: &str) -> Result<Option<Call>> {
    let row = conn
        .query_row(
            r#"
            SELECT c.id, c.period_id, p.ticker, c.call_date, c.duration_seconds,
                   c.status, c.checkpoint
            FROM calls c
            JOIN periods p ON c.period_id = p.id
            WHERE c.id = ?
            "#,
            params![call_id],
            raw_call_row,
        )
        .optional()
        .context("Failed to query call")?;

    row.map(call_from_raw).transpose()
}

pub(crate) fn get_call_roster_json(conn: &Connection, call_id: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT roster_json FROM calls WHERE id = ?",
        params![call_id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .context("Failed to query call roster")
    .map(|r| r.flatten())
}

pub(crate) fn list_calls_for_company_impl(conn: &Connection, ticker: &str) -> Result<Vec<Call>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT c.id, c.period_id, p.ticker, c.call_date, c.duration_seconds,
               c.status, c.checkpoint
        FROM calls c
        JOIN periods p ON c.period_id = p.id
        WHERE p.ticker = ?
        ORDER BY c.call_date DESC, c.id ASC
        "#,
    ).context("Failed to prepare list_calls_for_company query")?;

    let rows = stmt
        .query_map(params![ticker.to_uppercase()], raw_call_row)
        .context("Failed to query calls for company")?;

    collect_calls(rows)
}

pub(crate) fn list_calls_for_period_impl(
    conn: &Connection,
    ticker: &str,
    period: PeriodKey,
) -> Result<Vec<Call>> {
    let period_id = Period::make_id(&ticker.to_uppercase(), period);
    let mut stmt = conn.prepare(
        r#"
        SELECT c.id, c.period_id, p.ticker, c.call_date, c.duration_seconds,
               c.status, c.checkpoint
        FROM calls c
        JOIN periods p ON c.period_id = p.id
        WHERE c.period_id = ?
        ORDER BY c.call_date DESC, c.id ASC
        "#,
    ).context("Failed to prepare list_calls_for_period query")?;

    let rows = stmt
        .query_map(params![period_id], raw_call_row)
        .context("Failed to query calls for period")?;

    collect_calls(rows)
}

/// Remove a call and every descendant row, index entry and aggregate
/// contribution. Must run inside a transaction.
pub(crate) fn delete_call_impl(conn: &Connection, call_id: &str) -> Result<()> {
    let Some(call) = get_call_impl(conn, call_id)? else {
        return Ok(());
    };

    crate::index::builder::remove_statements_for_call(conn, call_id)?;

    conn.execute("DELETE FROM statements WHERE call_id = ?", params![call_id])
        .context("Failed to delete statements")?;
    conn.execute("DELETE FROM turns WHERE call_id = ?", params![call_id])
        .context("Failed to delete turns")?;
    conn.execute("DELETE FROM participants WHERE call_id = ?", params![call_id])
        .context("Failed to delete participants")?;
    conn.execute("DELETE FROM calls WHERE id = ?", params![call_id])
        .context("Failed to delete call")?;

    recompute_role_counts(conn, &call.ticker)?;

    log::info!("Deleted call {} and all descendants", call_id);
    Ok(())
}

/// Rebuild the per-role statement counts for one company from its indexed
/// calls. Runs inside the same transaction as the mutation it follows.
pub(crate) fn recompute_role_counts(conn: &Connection, ticker: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM role_statement_counts WHERE ticker = ?",
        params![ticker.to_uppercase()],
    ).context("Failed to clear role counts")?;

    conn.execute(
        r#"
        INSERT INTO role_statement_counts (ticker, role, count)
        SELECT p.ticker, pa.role, COUNT(s.id)
        FROM statements s
        JOIN turns t ON s.turn_id = t.id
        JOIN participants pa ON t.participant_id = pa.id
        JOIN calls c ON s.call_id = c.id
        JOIN periods p ON c.period_id = p.id
        WHERE p.ticker = ?1 AND c.status = 'indexed'
        GROUP BY p.ticker, pa.role
        "#,
        params![ticker.to_uppercase()],
    ).context("Failed to rebuild role counts")?;

    Ok(())
}

pub(crate) fn get_role_counts_impl(
    conn: &Connection,
    ticker: &str,
) -> Result<Vec<RoleStatementCount>> {
    let mut stmt = conn.prepare(
        "SELECT ticker, role, count FROM role_statement_counts WHERE ticker = ? ORDER BY role",
    ).context("Failed to prepare role counts query")?;

    let rows = stmt
        .query_map(params![ticker.to_uppercase()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .context("Failed to query role counts")?;

    let mut counts = Vec::new();
    for row in rows {
        let (ticker, role, count) = row.context("Failed to read role count row")?;
        counts.push(RoleStatementCount {
            ticker,
            role: SpeakerRole::from_str(&role).map_err(|e| anyhow!(e))?,
            count,
        });
    }
    Ok(counts)
}

type RawCall = (String, String, String, String, f64, String, String);

fn raw_call_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCall> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn call_from_raw(raw: RawCall) -> Result<Call> {
    let (id, period_id, ticker, call_date, duration_secs, status, checkpoint) = raw;
    Ok(Call {
        id,
        period_id,
        ticker,
        call_date: NaiveDate::parse_from_str(&call_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid call_date in database: {}", call_date))?,
        duration_secs,
        status: CallStatus::from_str(&status).map_err(|e| anyhow!(e))?,
        checkpoint: CallStatus::from_str(&checkpoint).map_err(|e| anyhow!(e))?,
    })
}

fn collect_calls(
    rows: impl Iterator<Item = rusqlite::Result<RawCall>>,
) -> Result<Vec<Call>> {
    let mut calls = Vec::new();
    for row in rows {
        calls.push(call_from_raw(row.context("Failed to read call row")?)?);
    }
    Ok(calls)
}
