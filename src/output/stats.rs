//! Statistics generation from the index database
//!
//! This module provides functionality for extracting and displaying
//! per-site indexing statistics from the storage layer.

use crate::state::SiteStatus;
use crate::storage::Storage;
use crate::SiteSearchError;

/// Totals over all stored sites
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TotalStatistics {
    pub sites: u64,
    pub pages: u64,
    pub lemmas: u64,
    /// True while any site is being indexed
    pub indexing: bool,
}

/// Statistics of one site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteStatistics {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: String,
    pub error: Option<String>,
    pub pages: u64,
    pub lemmas: u64,
}

/// Index statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsReport {
    pub total: TotalStatistics,
    pub detailed: Vec<SiteStatistics>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StatisticsReport)` - Successfully loaded statistics
/// * `Err(SiteSearchError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<StatisticsReport, SiteSearchError> {
    let mut report = StatisticsReport::default();

    for site in storage.list_sites()? {
        let pages = storage.count_pages(site.id)?;
        let lemmas = storage.count_lemmas(site.id)?;

        report.total.sites += 1;
        report.total.pages += pages;
        report.total.lemmas += lemmas;
        report.total.indexing |= site.status == SiteStatus::Indexing;

        report.detailed.push(SiteStatistics {
            url: site.url,
            name: site.name,
            status: site.status,
            status_time: site.status_time,
            error: site.last_error,
            pages,
            lemmas,
        });
    }

    Ok(report)
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `report` - The statistics to display
pub fn print_statistics(report: &StatisticsReport) {
    println!("=== Index Statistics ===\n");

    println!("Overview:");
    println!("  Sites: {}", report.total.sites);
    println!("  Pages: {}", report.total.pages);
    println!("  Lemmas: {}", report.total.lemmas);
    println!(
        "  Indexing: {}",
        if report.total.indexing { "yes" } else { "no" }
    );
    println!();

    for site in &report.detailed {
        println!("{} ({})", site.name, site.url);
        println!("  Status: {} at {}", site.status, site.status_time);
        println!("  Pages: {}", site.pages);
        println!("  Lemmas: {}", site.lemmas);
        if let Some(error) = &site.error {
            println!("  Last error: {}", error);
        }
        println!();
    }
}
