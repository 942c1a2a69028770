//! State module for tracking indexing progress
//!
//! # Components
//!
//! - `TaskState`: Lifecycle of a single page analysis task
//! - `SiteStatus`: Persisted indexing status of a site

mod site_status;
mod task_state;

// Re-export main types
pub use site_status::SiteStatus;
pub use task_state::TaskState;
