// Shared domain types: fiscal periods, speaker roles, call lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fiscal quarter of an earnings call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub fn as_number(&self) -> u8 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }

    pub fn from_number(n: u8) -> Option<Quarter> {
        match n {
            1 => Some(Quarter::Q1),
            2 => Some(Quarter::Q2),
            3 => Some(Quarter::Q3),
            4 => Some(Quarter::Q4),
            _ => None,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.as_number())
    }
}

impl FromStr for Quarter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "Q1" | "1" => Ok(Quarter::Q1),
            "Q2" | "2" => Ok(Quarter::Q2),
            "Q3" | "3" => Ok(Quarter::Q3),
            "Q4" | "4" => Ok(Quarter::Q4),
            _ => Err(format!("Invalid quarter: {}", s)),
        }
    }
}

/// A (fiscal year, quarter) pair. Orders chronologically, so period-range
/// filters can compare keys directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: u16,
    pub quarter: Quarter,
}

impl PeriodKey {
    pub fn new(year: u16, quarter: Quarter) -> Self {
        Self { year, quarter }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.quarter, self.year)
    }
}

impl FromStr for PeriodKey {
    type Err = String;

    /// Parses `"Q3-2024"` (or `"2024-Q3"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid period: {}", s))?;
        let (quarter_str, year_str) = if a.to_uppercase().starts_with('Q') {
            (a, b)
        } else {
            (b, a)
        };
        let quarter = Quarter::from_str(quarter_str)?;
        let year: u16 = year_str
            .parse()
            .map_err(|_| format!("Invalid fiscal year: {}", year_str))?;
        Ok(Self { year, quarter })
    }
}

/// Role of a call participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    Management,
    Analyst,
    Operator,
    Unknown,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Management => "management",
            SpeakerRole::Analyst => "analyst",
            SpeakerRole::Operator => "operator",
            SpeakerRole::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeakerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "management" => Ok(SpeakerRole::Management),
            "analyst" => Ok(SpeakerRole::Analyst),
            "operator" => Ok(SpeakerRole::Operator),
            "unknown" => Ok(SpeakerRole::Unknown),
            _ => Err(format!("Invalid speaker role: {}", s)),
        }
    }
}

/// Lifecycle status of a call's ingestion. Advances forward only
/// (pending → aligned → attributed → indexed) or moves to failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Pending,
    Aligned,
    Attributed,
    Indexed,
    Failed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Aligned => "aligned",
            CallStatus::Attributed => "attributed",
            CallStatus::Indexed => "indexed",
            CallStatus::Failed => "failed",
        }
    }

    /// Position in the pipeline; `Failed` carries no rank of its own.
    pub fn rank(&self) -> Option<u8> {
        match self {
            CallStatus::Pending => Some(0),
            CallStatus::Aligned => Some(1),
            CallStatus::Attributed => Some(2),
            CallStatus::Indexed => Some(3),
            CallStatus::Failed => None,
        }
    }

    /// Whether a transition to `next` is legal. Any status may move to
    /// `Failed`; a failed call may re-enter the pipeline at any phase
    /// (resumption restarts from the last committed checkpoint).
    pub fn can_advance_to(&self, next: CallStatus) -> bool {
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (None, Some(_)) => true,
            (Some(cur), Some(nxt)) => nxt > cur,
        }
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CallStatus::Pending),
            "aligned" => Ok(CallStatus::Aligned),
            "attributed" => Ok(CallStatus::Attributed),
            "indexed" => Ok(CallStatus::Indexed),
            "failed" => Ok(CallStatus::Failed),
            _ => Err(format!("Invalid call status: {}", s)),
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_parse_roundtrip() {
        assert_eq!(Quarter::from_str("q2").unwrap(), Quarter::Q2);
        assert_eq!(Quarter::from_str("Q4").unwrap().to_string(), "Q4");
        assert!(Quarter::from_str("Q5").is_err());
    }

    #[test]
    fn test_period_key_ordering() {
        let q4_2023 = PeriodKey::from_str("Q4-2023").unwrap();
        let q1_2024 = PeriodKey::from_str("Q1-2024").unwrap();
        assert!(q4_2023 < q1_2024);
        assert_eq!(q1_2024, PeriodKey::from_str("2024-Q1").unwrap());
    }

    #[test]
    fn test_status_transitions_forward_only() {
        assert!(CallStatus::Pending.can_advance_to(CallStatus::Aligned));
        assert!(CallStatus::Aligned.can_advance_to(CallStatus::Indexed));
        assert!(!CallStatus::Indexed.can_advance_to(CallStatus::Aligned));
        assert!(!CallStatus::Attributed.can_advance_to(CallStatus::Attributed));
        // Any phase may fail, and a failed call may resume.
        assert!(CallStatus::Aligned.can_advance_to(CallStatus::Failed));
        assert!(CallStatus::Failed.can_advance_to(CallStatus::Attributed));
    }
}
