//! Output module for index reports
//!
//! This module handles:
//! - Aggregating per-site page and lemma counts
//! - Printing statistics for the command line

pub mod stats;

pub use stats::{
    load_statistics, print_statistics, SiteStatistics, StatisticsReport, TotalStatistics,
};
