// Earnings-corpus - alignment, attribution and retrieval for earnings calls
//
// The engine covers:
// - Time alignment of ASR tokens against diarization turns
// - Speaker attribution against an optional expected roster
// - A SQLite-backed corpus with lexical and vector indexes
// - Hybrid search and per-period topic aggregation across calls

pub mod config;
pub mod corpus;
pub mod domain;
pub mod errors;
pub mod index;
pub mod ingest;
pub mod query;

pub use config::EngineConfig;
pub use corpus::CorpusManager;
pub use query::{QueryEngine, SearchFilters};
