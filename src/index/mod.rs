//! Incremental lemma index maintenance
//!
//! Re-analyzing a page turns into a diff against what the page indexed
//! before. The diff is planned in memory and applied by storage in one
//! transaction under the site's lock.

mod locks;
mod maintainer;

pub use locks::KeyedLocks;
pub use maintainer::{plan_index_diff, IndexMaintainer};
