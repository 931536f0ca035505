// Engine configuration with sensible defaults for earnings-call audio.

use serde::{Deserialize, Serialize};

use crate::domain::SpeakerRole;

/// Tunable parameters for alignment, attribution, indexing and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on a single statement's duration in seconds. Tokens are
    /// split into a new statement once this is exceeded, even without a
    /// sentence boundary.
    pub max_statement_secs: f64,
    /// Minimum confidence for a roster assignment to stick; below this the
    /// participant stays `unknown`.
    pub roster_confidence_threshold: f32,
    /// A turn at least this long counts as "extended" for the
    /// speaking-order heuristic.
    pub extended_turn_secs: f64,
    /// Conventional role order of the first distinct speakers on a call
    /// (operator opens, then management). Used by the speaking-order
    /// heuristic; labels beyond the list get no order-based assignment.
    pub speaking_order_roles: Vec<SpeakerRole>,
    /// Weight of the lexical score in the combined ranking.
    pub lexical_weight: f64,
    /// Weight of the semantic score in the combined ranking.
    pub semantic_weight: f64,
    /// Token-set similarity at or above which two statements from the same
    /// participant identity are folded as near-duplicates.
    pub dedup_similarity_threshold: f64,
    /// Timeout for a single external embedding call, in seconds.
    pub embedding_timeout_secs: u64,
    /// Representative statements returned per period by topic aggregation.
    pub topic_samples_per_period: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_statement_secs: 30.0,
            roster_confidence_threshold: 0.5,
            extended_turn_secs: 20.0,
            speaking_order_roles: vec![
                SpeakerRole::Operator,
                SpeakerRole::Management,
                SpeakerRole::Management,
            ],
            lexical_weight: 0.5,
            semantic_weight: 0.5,
            dedup_similarity_threshold: 0.8,
            embedding_timeout_secs: 30,
            topic_samples_per_period: 3,
        }
    }
}
