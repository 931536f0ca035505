// Corpus module: the canonical document graph and its SQLite persistence.

pub mod calls_repo;
pub mod manager;
pub mod migrations;
pub mod models;
pub mod statements_repo;

pub use manager::CorpusManager;
pub use models::*;
