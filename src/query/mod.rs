// Query layer: filtered hybrid search and topic aggregation over indexed
// calls. Strictly read-only.

pub mod engine;
pub mod filters;

pub use engine::{DuplicateRef, QueryEngine, SearchHit, TopicPeriodSummary, TopicSample};
pub use filters::SearchFilters;
