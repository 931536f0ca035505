// Structured query filters and their validation.

use serde::{Deserialize, Serialize};

use crate::domain::{PeriodKey, SpeakerRole};
use crate::errors::InvalidFilterError;

/// Metadata restrictions applied before any scoring. All fields are
/// conjunctive; `None` means unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Restrict to these tickers.
    pub tickers: Option<Vec<String>>,
    /// Inclusive fiscal-period range.
    pub period_range: Option<(PeriodKey, PeriodKey)>,
    /// Restrict to statements spoken in this role.
    pub role: Option<SpeakerRole>,
    /// Restrict to one participant, by identity key or display name.
    pub participant: Option<String>,
    /// Restrict to specific calls.
    pub call_ids: Option<Vec<String>>,
}

impl SearchFilters {
    pub fn validate(&self) -> Result<(), InvalidFilterError> {
        if let Some((start, end)) = self.period_range {
            if end < start {
                return Err(InvalidFilterError::InvertedPeriodRange { start, end });
            }
        }
        if matches!(&self.tickers, Some(t) if t.is_empty()) {
            return Err(InvalidFilterError::EmptyTickerList);
        }
        if matches!(&self.call_ids, Some(c) if c.is_empty()) {
            return Err(InvalidFilterError::EmptyCallIdList);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Quarter;

    #[test]
    fn test_default_filters_are_valid() {
        SearchFilters::default().validate().unwrap();
    }

    #[test]
    fn test_inverted_period_range_rejected() {
        let filters = SearchFilters {
            period_range: Some((
                PeriodKey::new(2024, Quarter::Q3),
                PeriodKey::new(2023, Quarter::Q1),
            )),
            ..Default::default()
        };
        assert!(matches!(
            filters.validate(),
            Err(InvalidFilterError::InvertedPeriodRange { .. })
        ));
    }

    #[test]
    fn test_empty_ticker_list_rejected() {
        let filters = SearchFilters {
            tickers: Some(Vec::new()),
            ..Default::default()
        };
        assert!(matches!(
            filters.validate(),
            Err(InvalidFilterError::EmptyTickerList)
        ));
    }
}
