// Error taxonomy for the corpus engine.
//
// Typed errors cover the cases a caller must distinguish (duplicate calls,
// malformed alignment input, bad query filters). Storage plumbing below the
// repositories uses anyhow with context strings.

use thiserror::Error;

use crate::domain::PeriodKey;

/// Malformed alignment input. Fatal to that call's ingestion; the call is
/// marked failed and is not retried automatically.
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("ASR tokens are not monotonically non-decreasing at index {index} ({prev:.3}s > {cur:.3}s)")]
    NonMonotonicTokens { index: usize, prev: f64, cur: f64 },

    #[error("Diarization turns are not monotonically non-decreasing at index {index}")]
    NonMonotonicTurns { index: usize },

    #[error("Diarization turns overlap at index {index} ({prev_end:.3}s > {start:.3}s)")]
    OverlappingTurns {
        index: usize,
        prev_end: f64,
        start: f64,
    },

    #[error("Token at index {index} has end before start ({start:.3}s > {end:.3}s)")]
    InvertedToken { index: usize, start: f64, end: f64 },

    #[error("Diarization produced no turns for a non-empty token sequence ({token_count} tokens)")]
    NoTurns { token_count: usize },
}

/// A call for the same (ticker, period, call date) already exists and
/// replace was not requested.
#[derive(Debug, Error)]
#[error("Call already ingested for {ticker} {period} on {call_date} (id: {existing_call_id}); request replace to re-ingest")]
pub struct DuplicateCallError {
    pub ticker: String,
    pub period: PeriodKey,
    pub call_date: String,
    pub existing_call_id: String,
}

/// Internal invariant violation between the document store and the indexes.
/// Should never occur in correct operation; surfaces as a bug, never as
/// silent recovery.
#[derive(Debug, Error)]
#[error("Index consistency violation: {detail}")]
pub struct IndexConsistencyError {
    pub detail: String,
}

/// Failure of the external embedding capability.
#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("Embedding timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Embedding failed: {0}")]
    Failed(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Malformed query filter combination. Returned synchronously with no
/// side effects.
#[derive(Debug, Error)]
pub enum InvalidFilterError {
    #[error("Period range end {end} precedes start {start}")]
    InvertedPeriodRange { start: PeriodKey, end: PeriodKey },

    #[error("Ticker filter is present but empty")]
    EmptyTickerList,

    #[error("Call id filter is present but empty")]
    EmptyCallIdList,

    #[error("top_k must be at least 1")]
    ZeroTopK,
}

/// The supplied filters match zero indexed calls.
#[derive(Debug, Error)]
#[error("No indexed calls match the supplied filters")]
pub struct EmptyCorpusError;

/// Errors surfaced by the ingestion pipeline, tagged with the phase that
/// failed so operators can see where a call stopped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Alignment failed: {0}")]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Duplicate(#[from] DuplicateCallError),

    #[error("Embedding failed during indexing: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("Call {call_id} cannot resume: {reason}")]
    CannotResume { call_id: String, reason: String },

    #[error("Storage error during {phase}: {source}")]
    Storage {
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Media file failed pre-ASR validation.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File is empty")]
    FileEmpty,

    #[error("File too large. Limit is {limit}MB. Got: {got}MB")]
    FileTooLarge { limit: u64, got: u64 },

    #[error("Invalid format: {0}. Allowed: {1:?}")]
    InvalidFormat(String, &'static [&'static str]),

    #[error("Could not determine file type")]
    UnknownType,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Query-time errors. Recoverable, never corrupt index state.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    InvalidFilter(#[from] InvalidFilterError),

    #[error(transparent)]
    EmptyCorpus(#[from] EmptyCorpusError),

    #[error("Embedding failed for query text: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}
