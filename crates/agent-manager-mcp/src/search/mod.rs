//! In-memory full-text index over the agent corpus.

pub mod index;
pub mod types;

pub use index::SearchIndex;
pub use types::*;
