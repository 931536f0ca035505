// Index layer: lexical posting lists and semantic vectors over statements,
// kept transactionally consistent with the document store.

pub mod builder;
pub mod embedder;
pub mod lexical;

pub use embedder::{cosine_similarity, embed_with_timeout, Embedder, HashingEmbedder};
