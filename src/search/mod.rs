//! Ranked full-text search over the lemma index
//!
//! Queries are reduced to lemmas the same way pages are. A page matches when
//! it indexes every query lemma.

mod engine;
mod types;

pub use engine::SearchEngine;
pub use types::{SearchError, SearchItem, SearchRequest, SearchResponse};
