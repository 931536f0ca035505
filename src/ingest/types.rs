// Boundary types for the external ASR / diarization / roster collaborators.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Quarter, SpeakerRole};

/// One word-level token from the ASR system. Start times are expected to be
/// monotonically non-decreasing across the sequence; small gaps or overlaps
/// between adjacent tokens are tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrToken {
    pub text: String,
    /// Start offset into the call audio, in seconds.
    pub start: f64,
    /// End offset into the call audio, in seconds.
    pub end: f64,
}

impl AsrToken {
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// One speaker turn from the diarization system. Anonymous label, expected
/// monotonically non-decreasing and non-overlapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationTurn {
    pub speaker_label: String,
    pub start: f64,
    pub end: f64,
}

/// An expected participant from the call agenda, used to resolve anonymous
/// diarization labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub expected_name: String,
    pub expected_role: SpeakerRole,
}

/// Identity of the call being ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMeta {
    pub ticker: String,
    pub company_name: String,
    pub fiscal_year: u16,
    pub quarter: Quarter,
    pub call_date: NaiveDate,
    /// Total audio duration in seconds.
    pub duration_secs: f64,
}
