// Turn / statement / participant repository.
//
// Rows are written during ingestion and never mutated afterwards, except
// for participant resolution, which updates rows in place during the
// attribution phase.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::str::FromStr;

use crate::domain::SpeakerRole;

use super::models::{Participant, Statement, Turn};
use super::CorpusManager;

impl CorpusManager {
    /// Ordered turns of a call.
    pub fn get_turns_for_call(&self, call_id: &str) -> Result<Vec<Turn>> {
        self.with_connection(|conn| get_turns_impl(conn, call_id))
    }

    /// Ordered statements of a call.
    pub fn get_statements_for_call(&self, call_id: &str) -> Result<Vec<Statement>> {
        self.with_connection(|conn| get_statements_impl(conn, call_id))
    }

    /// Participants of a call, in speaker-appearance order.
    pub fn get_participants_for_call(&self, call_id: &str) -> Result<Vec<Participant>> {
        self.with_connection(|conn| get_participants_impl(conn, call_id))
    }
}

pub(crate) fn insert_participants(conn: &Connection, participants: &[Participant]) -> Result<()> {
    for p in participants {
        conn.execute(
            r#"
            INSERT INTO participants (id, call_id, speaker_label, display_name, role, confidence, identity_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                p.id,
                p.call_id,
                p.speaker_label,
                p.display_name,
                p.role.as_str(),
                p.confidence,
                p.identity_key,
            ],
        ).context("Failed to insert participant")?;
    }
    Ok(())
}

pub(crate) fn insert_turns(conn: &Connection, turns: &[Turn]) -> Result<()> {
    for t in turns {
        conn.execute(
            r#"
            INSERT INTO turns (id, call_id, participant_id, seq, start_s, end_s)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![t.id, t.call_id, t.participant_id, t.seq, t.start_s, t.end_s],
        ).context("Failed to insert turn")?;
    }
    Ok(())
}

pub(crate) fn insert_statements(conn: &Connection, statements: &[Statement]) -> Result<()> {
    for s in statements {
        let tags = serde_json::to_string(&s.topic_tags)
            .context("Failed to serialize topic tags")?;
        conn.execute(
            r#"
            INSERT INTO statements (id, turn_id, call_id, seq, start_s, end_s, text, normalized_text, topic_tags)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                s.id,
                s.turn_id,
                s.call_id,
                s.seq,
                s.start_s,
                s.end_s,
                s.text,
                s.normalized_text,
                tags,
            ],
        ).context("Failed to insert statement")?;
    }
    Ok(())
}

/// Apply a speaker-attribution result to a participant. Roles confirmed at
/// or above the threshold are immutable: a later conflicting assignment is
/// logged and dropped rather than applied.
pub(crate) fn confirm_participant(
    conn: &Connection,
    participant_id: &str,
    display_name: &str,
    role: SpeakerRole,
    confidence: f32,
    identity_key: Option<&str>,
    threshold: f32,
) -> Result<()> {
    let (current_role, current_confidence): (String, f32) = conn
        .query_row(
            "SELECT role, confidence FROM participants WHERE id = ?",
            params![participant_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .context("Failed to read participant")?;

    let current_role = SpeakerRole::from_str(&current_role).map_err(|e| anyhow!(e))?;
    let confirmed = current_role != SpeakerRole::Unknown && current_confidence >= threshold;

    if confirmed && current_role != role {
        log::warn!(
            "Participant {} already confirmed as {}; ignoring conflicting assignment {}",
            participant_id,
            current_role,
            role
        );
        return Ok(());
    }

    conn.execute(
        r#"
        UPDATE participants
        SET display_name = ?1, role = ?2, confidence = ?3, identity_key = ?4
        WHERE id = ?5
        "#,
        params![display_name, role.as_str(), confidence, identity_key, participant_id],
    ).context("Failed to update participant")?;

    Ok(())
}

pub(crate) fn get_participants_impl(conn: &Connection, call_id: &str) -> Result<Vec<Participant>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, call_id, speaker_label, display_name, role, confidence, identity_key
        FROM participants
        WHERE call_id = ?
        ORDER BY id ASC
        "#,
    ).context("Failed to prepare participants query")?;

    let rows = stmt
        .query_map(params![call_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f32>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })
        .context("Failed to query participants")?;

    let mut participants = Vec::new();
    for row in rows {
        let (id, call_id, speaker_label, display_name, role, confidence, identity_key) =
            row.context("Failed to read participant row")?;
        participants.push(Participant {
            id,
            call_id,
            speaker_label,
            display_name,
            role: SpeakerRole::from_str(&role).map_err(|e| anyhow!(e))?,
            confidence,
            identity_key,
        });
    }
    Ok(participants)
}

pub(crate) fn get_turns_impl(conn: &Connection, call_id: &str) -> Result<Vec<Turn>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, call_id, participant_id, seq, start_s, end_s
        FROM turns
        WHERE call_id = ?
        ORDER BY seq ASC
        "#,
    ).context("Failed to prepare turns query")?;

    let turns = stmt
        .query_map(params![call_id], |row| {
            Ok(Turn {
                id: row.get(0)?,
                call_id: row.get(1)?,
                participant_id: row.get(2)?,
                seq: row.get(3)?,
                start_s: row.get(4)?,
                end_s: row.get(5)?,
            })
        })
        .context("Failed to query turns")?;

    turns
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect turns")
}

pub(crate) fn get_statements_impl(conn: &Connection, call_id: &str) -> Result<Vec<Statement>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, turn_id, call_id, seq, start_s, end_s, text, normalized_text, topic_tags
        FROM statements
        WHERE call_id = ?
        ORDER BY seq ASC
        "#,
    ).context("Failed to prepare statements query")?;

    let rows = stmt
        .query_map(params![call_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })
        .context("Failed to query statements")?;

    let mut statements = Vec::new();
    for row in rows {
        let (id, turn_id, call_id, seq, start_s, end_s, text, normalized_text, tags) =
            row.context("Failed to read statement row")?;
        statements.push(Statement {
            id,
            turn_id,
            call_id,
            seq,
            start_s,
            end_s,
            text,
            normalized_text,
            topic_tags: serde_json::from_str(&tags)
                .context("Invalid topic_tags JSON in database")?,
        });
    }
    Ok(statements)
}
