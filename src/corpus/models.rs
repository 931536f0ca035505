// Corpus document model: Company → Period → Call → Turn → Statement, plus
// per-call Participants.
//
// Entities are addressed by stable string ids. Ids are deterministic
// functions of the call's identity (ticker, period, call date) and the
// element's position, so re-ingesting identical input reproduces identical
// rows. Parent links are plain id references, never owning cycles.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{CallStatus, PeriodKey, Quarter, SpeakerRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub id: String,
    pub ticker: String,
    pub fiscal_year: u16,
    pub quarter: Quarter,
}

impl Period {
    pub fn make_id(ticker: &str, key: PeriodKey) -> String {
        format!("{}:{}{}", ticker.to_uppercase(), key.year, key.quarter)
    }

    pub fn key(&self) -> PeriodKey {
        PeriodKey::new(self.fiscal_year, self.quarter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub period_id: String,
    pub ticker: String,
    pub call_date: NaiveDate,
    pub duration_secs: f64,
    pub status: CallStatus,
    /// Last successfully committed ingestion phase; resumption re-enters
    /// the pipeline here after a failure.
    pub checkpoint: CallStatus,
}

impl Call {
    pub fn make_id(ticker: &str, key: PeriodKey, call_date: NaiveDate) -> String {
        format!(
            "{}:{}{}:{}",
            ticker.to_uppercase(),
            key.year,
            key.quarter,
            call_date
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub call_id: String,
    /// The diarization label this participant resolved from.
    pub speaker_label: String,
    pub display_name: String,
    pub role: SpeakerRole,
    pub confidence: f32,
    /// Cross-call identity link (normalized name + ticker); None while the
    /// participant is unresolved.
    pub identity_key: Option<String>,
}

impl Participant {
    pub fn make_id(call_id: &str, index: usize) -> String {
        format!("{}:p{}", call_id, index)
    }

    /// Identity key tying the same person together across calls for one
    /// company.
    pub fn make_identity_key(normalized_name: &str, ticker: &str) -> String {
        format!("{}@{}", normalized_name, ticker.to_uppercase())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub call_id: String,
    pub participant_id: String,
    pub seq: i64,
    pub start_s: f64,
    pub end_s: f64,
}

impl Turn {
    pub fn make_id(call_id: &str, seq: i64) -> String {
        format!("{}:t{}", call_id, seq)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
    pub turn_id: String,
    pub call_id: String,
    pub seq: i64,
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
    pub normalized_text: String,
    pub topic_tags: Vec<String>,
}

impl Statement {
    pub fn make_id(turn_id: &str, seq: i64) -> String {
        format!("{}:s{}", turn_id, seq)
    }
}

/// Denormalized per-company statement counts by speaker role, maintained
/// transactionally with ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleStatementCount {
    pub ticker: String,
    pub role: SpeakerRole,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_ids() {
        let key = PeriodKey::new(2024, Quarter::Q1);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let call_id = Call::make_id("acme", key, date);
        assert_eq!(call_id, "ACME:2024Q1:2024-05-01");

        let turn_id = Turn::make_id(&call_id, 0);
        assert_eq!(Statement::make_id(&turn_id, 2), "ACME:2024Q1:2024-05-01:t0:s2");
    }
}
