//! Recursive page analysis tasks
//!
//! Every page of a crawl is analyzed by one `PageTask`. A task fetches its
//! page, commits the page's lemmas, inserts placeholder rows for newly
//! discovered links and spawns one child task per placeholder. Parents join
//! their children, so a site's root task finishes only after its whole tree
//! has finished.
//!
//! Cancellation is cooperative. Each task polls its cancellation token and
//! its site's failure flag between steps. Child tokens derive from the
//! parent's token, so cancelling a task reaches its whole subtree, and a task
//! always waits out its spawned children before reporting.

use super::fetcher::{pacing_delay, FetchOutcome, PageFetcher};
use super::parser::extract_site_links;
use crate::config::RequestsInterval;
use crate::index::{IndexMaintainer, KeyedLocks};
use crate::lemma::LemmaExtractor;
use crate::state::{SiteStatus, TaskState};
use crate::storage::{
    self, PageRecord, SharedStorage, SiteRecord, Storage, FETCH_ERROR_CODE,
    UNSUPPORTED_CONTENT_CODE,
};
use crate::url::{normalized_path, page_url};
use crate::{Result, SiteSearchError};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Collaborators shared by every task of every site
pub struct CrawlContext {
    pub storage: SharedStorage,
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: LemmaExtractor,
    pub maintainer: IndexMaintainer,
    pub page_locks: Arc<KeyedLocks>,
    /// Bounds the number of pages fetched and analyzed at the same time
    pub permits: Arc<Semaphore>,
    pub interval: RequestsInterval,
}

/// State shared by all tasks of one site
pub struct SiteContext {
    site: SiteRecord,
    token: CancellationToken,
    failed: AtomicBool,
    /// A failure overwrites any status instead of only INDEXING
    overwrite_status: bool,
    pacing: tokio::sync::Mutex<()>,
}

impl SiteContext {
    /// Context for a full crawl; only the first fatal error fails the site
    pub fn for_crawl(site: SiteRecord, token: CancellationToken) -> Self {
        Self::new(site, token, false)
    }

    /// Context for a single-page analysis; any fatal error fails the site
    pub fn for_single_page(site: SiteRecord, token: CancellationToken) -> Self {
        Self::new(site, token, true)
    }

    fn new(site: SiteRecord, token: CancellationToken, overwrite_status: bool) -> Self {
        Self {
            site,
            token,
            failed: AtomicBool::new(false),
            overwrite_status,
            pacing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn site(&self) -> &SiteRecord {
        &self.site
    }

    /// Token every task of the site derives its own token from
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Raises the failure flag and cancels every task of the site
    ///
    /// # Returns
    ///
    /// True if this call raised the flag
    fn mark_failed(&self) -> bool {
        let first = !self.failed.swap(true, Ordering::SeqCst);
        self.token.cancel();
        first
    }

    /// Waits out the pacing delay, one request of the site at a time
    async fn pace(&self, interval: RequestsInterval) {
        let delay = pacing_delay(interval);
        if delay.is_zero() {
            return;
        }
        let _gate = self.pacing.lock().await;
        tokio::time::sleep(delay).await;
    }
}

/// Handle to a spawned task
pub struct TaskHandle {
    path: String,
    token: CancellationToken,
    join: JoinHandle<TaskState>,
}

impl TaskHandle {
    /// Spawns the task on the runtime
    pub fn spawn(task: PageTask) -> Self {
        let path = task.page.path.clone();
        let token = task.token.clone();
        Self {
            path,
            token,
            join: tokio::spawn(task.run()),
        }
    }

    /// Waits for the task's final state
    pub async fn join(self) -> std::result::Result<TaskState, JoinError> {
        self.join.await
    }

    /// Cancels the task and its subtree, then waits for it to report
    ///
    /// A task that already finished reports its final state.
    pub async fn cancel(self) -> TaskState {
        self.token.cancel();
        self.join.await.unwrap_or(TaskState::Cancelled)
    }
}

/// Analysis of one page, optionally followed by its links
pub struct PageTask {
    ctx: Arc<CrawlContext>,
    site: Arc<SiteContext>,
    page: PageRecord,
    token: CancellationToken,
    /// Follow links and spawn children after the analysis
    discover: bool,
    /// The page's lemmas are in the index
    indexed: bool,
    children: Vec<TaskHandle>,
    state: TaskState,
}

impl PageTask {
    pub fn new(
        ctx: Arc<CrawlContext>,
        site: Arc<SiteContext>,
        page: PageRecord,
        token: CancellationToken,
        discover: bool,
    ) -> Self {
        Self {
            ctx,
            site,
            page,
            token,
            discover,
            indexed: false,
            children: Vec::new(),
            state: TaskState::Pending,
        }
    }

    /// Runs the task to a terminal state
    ///
    /// Any error escaping the analysis is fatal for the site: the page gets
    /// the fetch error code and the site fails. Content whose lemmas were
    /// already committed is kept so the page's index rows stay backed by it.
    pub fn run(mut self) -> BoxFuture<'static, TaskState> {
        Box::pin(async move {
            match self.process().await {
                Ok(state) => state,
                Err(e) => {
                    self.state = TaskState::FatalError;
                    let message = e.to_string();
                    tracing::error!(
                        "Analysis of {} failed: {}",
                        page_url(&self.site.site.url, &self.page.path),
                        message
                    );
                    let content = if self.indexed { self.page.content.as_str() } else { "" };
                    if let Err(e) = self.persist_fetch(FETCH_ERROR_CODE, content) {
                        tracing::error!("Failed to record error on page {}: {}", self.page.id, e);
                    }
                    self.fail_site(&message);
                    self.join_children().await;
                    self.set_state(TaskState::Done);
                    TaskState::Done
                }
            }
        })
    }

    async fn process(&mut self) -> Result<TaskState> {
        let paced = tokio::select! {
            _ = self.token.cancelled() => false,
            _ = self.site.pace(self.ctx.interval) => true,
        };
        if !paced || self.should_stop() {
            return Ok(self.stopped().await);
        }

        let permits = Arc::clone(&self.ctx.permits);
        let permit = tokio::select! {
            _ = self.token.cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            return Ok(self.stopped().await);
        };
        if self.should_stop() {
            return Ok(self.stopped().await);
        }

        self.set_state(TaskState::Fetching);
        let url = page_url(&self.site.site.url, &self.page.path);
        let fetcher = Arc::clone(&self.ctx.fetcher);
        let outcome = tokio::select! {
            _ = self.token.cancelled() => None,
            outcome = fetcher.fetch(&url) => Some(outcome),
        };
        let Some(outcome) = outcome else {
            return Ok(self.stopped().await);
        };
        if self.should_stop() {
            return Ok(self.stopped().await);
        }

        match outcome {
            FetchOutcome::Success { status_code, body } => {
                self.persist_fetch(status_code, &body)?;
                tracing::debug!("Fetched {} ({})", url, status_code);
                self.page.code = status_code;
                self.page.content = body;
            }
            FetchOutcome::HttpError { status_code } => {
                self.persist_fetch(status_code, "")?;
                tracing::warn!("{} answered with status {}", url, status_code);
                self.set_state(TaskState::HttpFailed);
                self.set_state(TaskState::Done);
                return Ok(TaskState::Done);
            }
            FetchOutcome::UnsupportedContent { content_type } => {
                self.persist_fetch(UNSUPPORTED_CONTENT_CODE, "")?;
                tracing::warn!("{} has unsupported content type {:?}", url, content_type);
                self.set_state(TaskState::UnsupportedContent);
                self.set_state(TaskState::Done);
                return Ok(TaskState::Done);
            }
            FetchOutcome::Failed { error } => {
                self.persist_fetch(FETCH_ERROR_CODE, "")?;
                tracing::error!("Fetching {} failed: {}", url, error);
                self.set_state(TaskState::FatalError);
                self.fail_site(&error);
                self.set_state(TaskState::Done);
                return Ok(TaskState::Done);
            }
        }

        let Some(lemmas) = self.extract(&self.page.content).await? else {
            return Ok(self.stopped().await);
        };
        if self.should_stop() {
            return Ok(self.stopped().await);
        }
        self.ctx
            .maintainer
            .commit(self.site.site.id, self.page.id, &lemmas)?;
        self.indexed = true;
        self.set_state(TaskState::Analyzed);

        if !self.discover {
            self.set_state(TaskState::Done);
            return Ok(TaskState::Done);
        }

        self.set_state(TaskState::Discovering);
        let paths = self.discover_paths(&self.page.content)?;
        if self.should_stop() {
            return Ok(self.stopped().await);
        }
        let pages = self.insert_placeholders(&paths)?;
        drop(permit);

        self.set_state(TaskState::Spawning);
        for page in pages {
            let child = PageTask::new(
                Arc::clone(&self.ctx),
                Arc::clone(&self.site),
                page,
                self.token.child_token(),
                true,
            );
            self.children.push(TaskHandle::spawn(child));
        }
        if !self.children.is_empty() {
            tracing::debug!(
                "{} spawned {} child pages",
                url,
                self.children.len()
            );
        }

        self.set_state(TaskState::Joining);
        self.join_children().await;
        if self.should_stop() {
            self.set_state(TaskState::Cancelled);
            return Ok(TaskState::Cancelled);
        }

        if self.page.is_root() {
            let indexed = storage::lock(&self.ctx.storage)?.transition_site_status(
                self.site.site.id,
                SiteStatus::Indexing,
                SiteStatus::Indexed,
                None,
            )?;
            if indexed {
                tracing::info!("Site {} indexed", self.site.site.url);
            }
        }

        self.set_state(TaskState::Done);
        Ok(TaskState::Done)
    }

    fn should_stop(&self) -> bool {
        self.token.is_cancelled() || self.site.has_failed()
    }

    /// Cancels the spawned children, waits for them and reports cancelled
    async fn stopped(&mut self) -> TaskState {
        for child in &self.children {
            child.token.cancel();
        }
        self.join_children().await;
        self.set_state(TaskState::Cancelled);
        TaskState::Cancelled
    }

    /// Waits for every spawned child
    ///
    /// A child that panicked is recorded on this page; its siblings keep
    /// running.
    async fn join_children(&mut self) {
        for child in std::mem::take(&mut self.children) {
            let path = child.path.clone();
            match child.join().await {
                Ok(state) => {
                    tracing::trace!("Child {} of page {} ended {}", path, self.page.id, state);
                }
                Err(e) => {
                    tracing::error!("Child {} of page {} terminated: {}", path, self.page.id, e);
                    if let Err(e) = self.persist_fetch(FETCH_ERROR_CODE, &self.page.content) {
                        tracing::error!(
                            "Failed to record child failure on page {}: {}",
                            self.page.id,
                            e
                        );
                    }
                }
            }
        }
    }

    /// Extracts lemma counts off the async runtime
    ///
    /// # Returns
    ///
    /// None if the task was cancelled before the extraction finished
    async fn extract(
        &self,
        body: &str,
    ) -> Result<Option<std::collections::HashMap<String, usize>>> {
        let extractor = self.ctx.extractor.clone();
        let html = body.to_string();
        let extraction = tokio::task::spawn_blocking(move || extractor.find_lemmas_in_html(&html));

        tokio::select! {
            _ = self.token.cancelled() => Ok(None),
            lemmas = extraction => lemmas
                .map(Some)
                .map_err(|e| SiteSearchError::Task(e.to_string())),
        }
    }

    /// Normalizes the page's site links into distinct paths
    fn discover_paths(&self, body: &str) -> Result<Vec<String>> {
        let site_url = &self.site.site.url;
        let mut paths: Vec<String> = Vec::new();
        for link in extract_site_links(body, site_url) {
            let path = normalized_path(site_url, &link)?;
            if path != self.page.path && !paths.contains(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Inserts placeholders under the site lock
    ///
    /// # Returns
    ///
    /// Pages created by this call; paths that already had a row are skipped
    fn insert_placeholders(&self, paths: &[String]) -> Result<Vec<PageRecord>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let site_id = self.site.site.id;
        self.ctx.maintainer.site_locks().with_lock(site_id, || {
            Ok(storage::lock(&self.ctx.storage)?.insert_placeholder_pages(site_id, paths)?)
        })
    }

    /// Stores a fetch outcome and touches the site
    fn persist_fetch(&self, code: u16, content: &str) -> Result<()> {
        self.ctx.page_locks.with_lock(self.page.id, || {
            let mut storage = storage::lock(&self.ctx.storage)?;
            storage.update_page_fetch(self.page.id, code, content)?;
            storage.touch_site(self.site.site.id)?;
            Ok(())
        })
    }

    /// Fails the site, stopping all of its tasks
    fn fail_site(&self, message: &str) {
        if !self.site.mark_failed() && !self.site.overwrite_status {
            return;
        }

        let site_id = self.site.site.id;
        let result = storage::lock(&self.ctx.storage).and_then(|mut storage| {
            if self.site.overwrite_status {
                storage.update_site_status(site_id, SiteStatus::Failed, Some(message))?;
                Ok(true)
            } else {
                Ok(storage.transition_site_status(
                    site_id,
                    SiteStatus::Indexing,
                    SiteStatus::Failed,
                    Some(message),
                )?)
            }
        });

        match result {
            Ok(true) => tracing::error!("Site {} failed: {}", self.site.site.url, message),
            Ok(false) => {}
            Err(e) => tracing::error!("Failed to mark site {} failed: {}", site_id, e),
        }
    }

    fn set_state(&mut self, next: TaskState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Page {} moved from {} to {} out of order",
                self.page.id,
                self.state,
                next
            );
        }
        tracing::trace!("Page {}: {} -> {}", self.page.id, self.state, next);
        self.state = next;
    }
}
