//! Lemma extraction and search snippets
//!
//! Both work on whitespace-separated tokens trimmed to their letters and
//! share the morphology used for indexing, so a snippet highlights exactly
//! the words that were indexed under the query lemmas.

mod extractor;
mod snippet;

pub use extractor::{search_word, LemmaExtractor, SearchWord};
pub use snippet::SnippetBuilder;
