//! Crawl manager - global crawl start/stop coordination
//!
//! The manager owns the lifecycle `Idle -> Running -> Stopping -> Idle`
//! behind a single mutex. Starting is rejected unless idle, stopping is
//! rejected unless running. A background supervisor joins the root task of
//! every site and returns the manager to idle once the last one finishes.

use super::fetcher::{HttpFetcher, PageFetcher};
use super::task::{CrawlContext, PageTask, SiteContext, TaskHandle};
use crate::config::{Config, SiteEntry};
use crate::index::{IndexMaintainer, KeyedLocks};
use crate::lemma::LemmaExtractor;
use crate::state::{SiteStatus, TaskState};
use crate::storage::{
    self, SharedStorage, SiteRecord, Storage, StorageError, PROCESSING_CODE,
};
use crate::url::resolve_site_url;
use crate::{SiteSearchError, UrlError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Last error of sites whose crawl was stopped on request
pub const STOPPED_BY_USER: &str = "Indexing stopped by user";

/// Last error of sites whose root task ended without settling the site
const ABANDONED: &str = "Indexing ended unexpectedly";

/// Reasons a control request is rejected
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Indexing is already running")]
    AlreadyRunning,

    #[error("Indexing is still stopping")]
    StillStopping,

    #[error("Indexing is not running")]
    NotRunning,

    #[error("Indexing is already stopping")]
    AlreadyStopping,

    #[error("URL is empty")]
    EmptyUrl,

    #[error("This page is located outside the sites specified in the configuration file")]
    OutsideConfiguredSites,

    #[error("Invalid page URL: {0}")]
    InvalidUrl(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SiteSearchError> for ControlError {
    fn from(err: SiteSearchError) -> Self {
        ControlError::Internal(err.to_string())
    }
}

impl From<StorageError> for ControlError {
    fn from(err: StorageError) -> Self {
        ControlError::Internal(err.to_string())
    }
}

/// Global crawl lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPhase {
    Idle,
    Running,
    Stopping,
}

/// Result of a single-page index request
#[derive(Debug)]
pub enum PageJob {
    /// The page is already waiting for its analysis
    AlreadyQueued,

    /// The analysis runs in the background
    Started(JoinHandle<TaskState>),
}

struct Control {
    phase: CrawlPhase,
    token: CancellationToken,
}

struct ManagerInner {
    config: Arc<Config>,
    ctx: Arc<CrawlContext>,
    control: Mutex<Control>,
    idle: watch::Sender<bool>,
}

/// Starts, stops and observes crawls of the configured sites
#[derive(Clone)]
pub struct CrawlManager {
    inner: Arc<ManagerInner>,
}

impl CrawlManager {
    /// Creates a manager fetching pages over HTTP
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(
        config: Config,
        storage: SharedStorage,
        extractor: LemmaExtractor,
    ) -> crate::Result<Self> {
        let fetcher = HttpFetcher::new(&config.bot, &config.crawler)?;
        Ok(Self::with_fetcher(
            config,
            storage,
            extractor,
            Arc::new(fetcher),
        ))
    }

    /// Creates a manager with a custom page fetcher
    pub fn with_fetcher(
        config: Config,
        storage: SharedStorage,
        extractor: LemmaExtractor,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let site_locks = Arc::new(KeyedLocks::new("site"));
        let ctx = CrawlContext {
            storage: Arc::clone(&storage),
            fetcher,
            extractor,
            maintainer: IndexMaintainer::new(storage, site_locks),
            page_locks: Arc::new(KeyedLocks::new("page")),
            permits: Arc::new(Semaphore::new(config.crawler.max_concurrent_pages as usize)),
            interval: config.bot.requests_interval,
        };
        let (idle, _) = watch::channel(true);

        Self {
            inner: Arc::new(ManagerInner {
                config: Arc::new(config),
                ctx: Arc::new(ctx),
                control: Mutex::new(Control {
                    phase: CrawlPhase::Idle,
                    token: CancellationToken::new(),
                }),
                idle,
            }),
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.inner.control().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() != CrawlPhase::Idle
    }

    /// Starts crawling every configured site
    ///
    /// Each site is reset to INDEXING with an empty tree and its root page
    /// seeded as processing. Crawling continues in the background.
    ///
    /// # Errors
    ///
    /// Rejected without any state change while a crawl is running or stopping
    pub fn start(&self) -> Result<(), ControlError> {
        let mut control = self.inner.control();
        match control.phase {
            CrawlPhase::Running => return Err(ControlError::AlreadyRunning),
            CrawlPhase::Stopping => return Err(ControlError::StillStopping),
            CrawlPhase::Idle => {}
        }

        let ctx = &self.inner.ctx;
        let seeded = {
            let mut storage = storage::lock(&ctx.storage)?;
            let mut seeded = Vec::with_capacity(self.inner.config.sites.len());
            for entry in &self.inner.config.sites {
                let site = storage.reset_site(&entry.url, &entry.name)?;
                let root = storage.insert_page(site.id, "/", PROCESSING_CODE, "")?;
                seeded.push((site, root));
            }
            seeded
        };

        let token = CancellationToken::new();
        let mut roots = Vec::with_capacity(seeded.len());
        for (site, root) in seeded {
            tracing::info!("Indexing {} ({})", site.url, site.name);
            let site_id = site.id;
            let site = Arc::new(SiteContext::for_crawl(site, token.child_token()));
            let task = PageTask::new(
                Arc::clone(ctx),
                Arc::clone(&site),
                root,
                site.token().child_token(),
                true,
            );
            roots.push((site_id, TaskHandle::spawn(task)));
        }

        control.phase = CrawlPhase::Running;
        control.token = token;
        self.inner.idle.send_replace(false);
        drop(control);

        tokio::spawn(supervise(Arc::clone(&self.inner), roots, Instant::now()));
        Ok(())
    }

    /// Requests every running task to stop
    ///
    /// Tasks drain in the background; sites still INDEXING afterwards are
    /// marked FAILED with [`STOPPED_BY_USER`].
    ///
    /// # Errors
    ///
    /// Rejected when no crawl is running or a stop is already under way
    pub fn stop(&self) -> Result<(), ControlError> {
        let mut control = self.inner.control();
        match control.phase {
            CrawlPhase::Idle => return Err(ControlError::NotRunning),
            CrawlPhase::Stopping => return Err(ControlError::AlreadyStopping),
            CrawlPhase::Running => {}
        }

        control.phase = CrawlPhase::Stopping;
        control.token.cancel();
        tracing::info!("Stopping indexing");
        Ok(())
    }

    /// Waits until no crawl is running or stopping
    pub async fn wait_until_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Re-analyzes a single page in the background
    ///
    /// The page's previous index contribution is removed and the page is
    /// recreated as processing. No links are followed. A site never crawled
    /// before is created and marked INDEXED once its page is analyzed.
    ///
    /// # Errors
    ///
    /// Rejected when the URL is blank or outside every configured site
    pub fn index_page(&self, url: &str) -> Result<PageJob, ControlError> {
        let (entry, path) = match resolve_site_url(&self.inner.config.sites, url) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return Err(ControlError::OutsideConfiguredSites),
            Err(UrlError::Empty) => return Err(ControlError::EmptyUrl),
            Err(e) => return Err(ControlError::InvalidUrl(e.to_string())),
        };

        let ctx = &self.inner.ctx;
        let (site, created) = self.site_for(entry)?;

        let existing = storage::lock(&ctx.storage)?.find_page(site.id, &path)?;
        if let Some(page) = existing {
            if page.is_processing() {
                return Ok(PageJob::AlreadyQueued);
            }
            ctx.maintainer.clear_page(site.id, page.id)?;
        }

        let page = match storage::lock(&ctx.storage)?.insert_page(site.id, &path, PROCESSING_CODE, "") {
            Ok(page) => page,
            Err(StorageError::ConstraintViolation(_)) => return Ok(PageJob::AlreadyQueued),
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Indexing page {}{}", site.url, page.path);

        let site_id = site.id;
        let site = Arc::new(SiteContext::for_single_page(site, CancellationToken::new()));
        let task = PageTask::new(
            Arc::clone(ctx),
            Arc::clone(&site),
            page,
            site.token().child_token(),
            false,
        );
        let shared = Arc::clone(&ctx.storage);

        let join = tokio::spawn(async move {
            let state = task.run().await;
            if created && !site.has_failed() {
                let marked = storage::lock(&shared).and_then(|mut storage| {
                    Ok(storage.transition_site_status(
                        site_id,
                        SiteStatus::Indexing,
                        SiteStatus::Indexed,
                        None,
                    )?)
                });
                if let Err(e) = marked {
                    tracing::error!("Failed to mark site {} indexed: {}", site_id, e);
                }
            }
            state
        });

        Ok(PageJob::Started(join))
    }

    /// Finds the stored site of a configured entry, creating it if missing
    fn site_for(&self, entry: &SiteEntry) -> Result<(SiteRecord, bool), ControlError> {
        let mut storage = storage::lock(&self.inner.ctx.storage)?;
        match storage.get_site_by_url(&entry.url)? {
            Some(site) => Ok((site, false)),
            None => Ok((storage.create_site(&entry.url, &entry.name)?, true)),
        }
    }
}

impl ManagerInner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Joins the root tasks of a crawl and settles the sites they leave behind
async fn supervise(inner: Arc<ManagerInner>, roots: Vec<(i64, TaskHandle)>, started: Instant) {
    let site_ids: Vec<i64> = roots.iter().map(|(id, _)| *id).collect();

    for (site_id, handle) in roots {
        match handle.join().await {
            Ok(state) => tracing::debug!("Root task of site {} ended {}", site_id, state),
            Err(e) => tracing::error!("Root task of site {} terminated: {}", site_id, e),
        }
    }

    let stopped = inner.control().phase == CrawlPhase::Stopping;
    let reason = if stopped { STOPPED_BY_USER } else { ABANDONED };

    match storage::lock(&inner.ctx.storage) {
        Ok(mut storage) => {
            for site_id in site_ids {
                let result = storage.transition_site_status(
                    site_id,
                    SiteStatus::Indexing,
                    SiteStatus::Failed,
                    Some(reason),
                );
                match result {
                    Ok(true) => tracing::warn!("Site {} marked failed: {}", site_id, reason),
                    Ok(false) => {}
                    Err(e) => tracing::error!("Failed to settle site {}: {}", site_id, e),
                }
            }
        }
        Err(e) => tracing::error!("Failed to settle sites: {}", e),
    }

    if !inner.ctx.page_locks.is_empty() {
        tracing::debug!("Page locks still held by single-page analyses");
    }

    inner.control().phase = CrawlPhase::Idle;
    inner.idle.send_replace(true);
    tracing::info!(
        "Indexing {} in {:.2?}",
        if stopped { "stopped" } else { "finished" },
        started.elapsed()
    );
}
