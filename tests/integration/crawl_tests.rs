//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and a scripted
//! fetcher to test the full crawl cycle end-to-end.

use async_trait::async_trait;
use site_search::config::{
    BotConfig, Config, CrawlerConfig, MorphologyConfig, RequestsInterval, SearchConfig,
    SiteEntry, StorageConfig,
};
use site_search::crawler::{
    ControlError, CrawlContext, CrawlManager, FetchOutcome, PageFetcher, PageJob, PageTask,
    SiteContext, TaskHandle, STOPPED_BY_USER,
};
use site_search::index::{IndexMaintainer, KeyedLocks};
use site_search::storage::{self, SharedStorage, SqliteStorage, Storage, PROCESSING_CODE};
use site_search::{LemmaExtractor, Morphology, SiteStatus, TaskState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for the given sites
fn create_test_config(sites: &[(&str, &str)], db_path: &str) -> Config {
    Config {
        bot: BotConfig {
            user_agent: "TestBot/1.0".to_string(),
            referer: Some("https://www.google.com".to_string()),
            requests_interval: RequestsInterval { min: 0, max: None },
        },
        crawler: CrawlerConfig {
            max_concurrent_pages: 4,
            fetch_timeout_secs: 5,
        },
        search: SearchConfig::default(),
        storage: StorageConfig {
            database_path: db_path.to_string(),
        },
        morphology: MorphologyConfig::default(),
        sites: sites
            .iter()
            .map(|(url, name)| SiteEntry {
                url: url.to_string(),
                name: name.to_string(),
            })
            .collect(),
    }
}

fn memory_storage() -> SharedStorage {
    storage::shared(SqliteStorage::new_in_memory().expect("Failed to open storage"))
}

fn extractor() -> LemmaExtractor {
    LemmaExtractor::new(Arc::new(Morphology::builtin()))
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html; charset=utf-8")
}

async fn wait_idle(manager: &CrawlManager) {
    tokio::time::timeout(Duration::from_secs(10), manager.wait_until_idle())
        .await
        .expect("Crawl did not finish in time");
}

fn site(storage: &SharedStorage, url: &str) -> site_search::storage::SiteRecord {
    storage::lock(storage)
        .unwrap()
        .get_site_by_url(url)
        .unwrap()
        .expect("Site should exist")
}

fn lemma_frequency(storage: &SharedStorage, site_id: i64, lemma: &str) -> Option<i64> {
    storage::lock(storage)
        .unwrap()
        .find_lemmas(site_id, &[lemma.to_string()])
        .unwrap()
        .first()
        .map(|l| l.frequency)
}

/// Fetcher answering from a fixed script, optionally slowly
struct ScriptedFetcher {
    pages: HashMap<String, FetchOutcome>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(pages: Vec<(&str, FetchOutcome)>, delay: Duration) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, outcome)| (url.to_string(), outcome))
                .collect(),
            delay,
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.pages
            .get(url)
            .cloned()
            .unwrap_or(FetchOutcome::HttpError { status_code: 404 })
    }
}

/// Fetcher serving an endless tree: every page links to five children
struct EndlessFetcher {
    delay: Duration,
    fetches: AtomicUsize,
}

#[async_trait]
impl PageFetcher for EndlessFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let path = url
            .split_once(".example")
            .map_or("", |(_, path)| path.trim_end_matches('/'));
        let links: String = (0..5)
            .map(|i| format!(r#"<a href="{}/p{}">link</a>"#, path, i))
            .collect();
        FetchOutcome::Success {
            status_code: 200,
            body: format!("<html><body><p>кот</p>{}</body></html>", links),
        }
    }
}

fn success(body: &str) -> FetchOutcome {
    FetchOutcome::Success {
        status_code: 200,
        body: format!("<html><body>{}</body></html>", body),
    }
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    // Start a mock server
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r##"<p>кот и пёс</p>
            <a href="/a">A</a>
            <a href="{}/b/">B</a>
            <a href="/missing">Missing</a>
            <a href="/file.pdf">File</a>
            <a href="#top">Top</a>
            <a href="https://other.example/x">Elsewhere</a>"##,
            base_url
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<p>кот кот мышь</p><a href="/">Home</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<p>пёс</p>"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/file.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8, 1, 2, 3])
                .insert_header("content-type", "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    // Create test database
    let db_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = db_dir.path().join("crawl.db");
    let config = create_test_config(&[(&base_url, "Mock")], &db_path.to_string_lossy());
    let storage = storage::shared(SqliteStorage::new(&db_path).expect("Failed to open storage"));

    let manager = CrawlManager::new(config, Arc::clone(&storage), extractor())
        .expect("Failed to create manager");
    manager.start().expect("Crawl should start");
    wait_idle(&manager).await;

    let site = site(&storage, &base_url);
    assert_eq!(site.status, SiteStatus::Indexed);
    assert!(site.last_error.is_none());

    let guard = storage::lock(&storage).unwrap();
    assert_eq!(guard.count_pages(site.id).unwrap(), 5);

    let code = |path: &str| guard.find_page(site.id, path).unwrap().unwrap().code;
    assert_eq!(code("/"), 200);
    assert_eq!(code("/a"), 200);
    assert_eq!(code("/b"), 200);
    assert_eq!(code("/missing"), 404);
    assert_eq!(code("/file.pdf"), 415);
    assert_ne!(code("/a"), PROCESSING_CODE);

    assert!(guard.lemma_frequency_mismatches(site.id).unwrap().is_empty());
    drop(guard);

    assert_eq!(lemma_frequency(&storage, site.id, "кот"), Some(2));
    assert_eq!(lemma_frequency(&storage, site.id, "пёс"), Some(2));
    assert_eq!(lemma_frequency(&storage, site.id, "мышь"), Some(1));
    // Conjunctions are not indexed
    assert_eq!(lemma_frequency(&storage, site.id, "и"), None);
}

#[tokio::test]
async fn test_recrawl_resets_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>кот</p>"))
        .mount(&mock_server)
        .await;

    let storage = memory_storage();
    let config = create_test_config(&[(&base_url, "Mock")], ":memory:");
    let manager = CrawlManager::new(config, Arc::clone(&storage), extractor()).unwrap();

    manager.start().unwrap();
    wait_idle(&manager).await;
    let first = site(&storage, &base_url);

    manager.start().unwrap();
    wait_idle(&manager).await;
    let second = site(&storage, &base_url);

    assert_ne!(first.id, second.id);
    assert_eq!(second.status, SiteStatus::Indexed);
    assert_eq!(lemma_frequency(&storage, second.id, "кот"), Some(1));
}

#[tokio::test]
async fn test_fatal_error_fails_only_its_site() {
    let fetcher = ScriptedFetcher::new(
        vec![
            (
                "https://fail.example/",
                success(r#"<p>кот</p><a href="/a">A</a><a href="/b">B</a>"#),
            ),
            (
                "https://fail.example/a",
                FetchOutcome::Failed {
                    error: "connection reset".to_string(),
                },
            ),
            (
                "https://fail.example/b",
                success(r#"<p>пёс</p><a href="/c">C</a>"#),
            ),
            ("https://ok.example/", success("<p>кот</p>")),
        ],
        Duration::from_millis(20),
    );

    let storage = memory_storage();
    let config = create_test_config(
        &[("https://fail.example", "Fail"), ("https://ok.example", "Ok")],
        ":memory:",
    );
    let manager =
        CrawlManager::with_fetcher(config, Arc::clone(&storage), extractor(), Arc::new(fetcher));

    manager.start().unwrap();
    wait_idle(&manager).await;

    let failed = site(&storage, "https://fail.example");
    assert_eq!(failed.status, SiteStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("connection reset"));

    let page = storage::lock(&storage)
        .unwrap()
        .find_page(failed.id, "/a")
        .unwrap()
        .unwrap();
    assert_eq!(page.code, 500);

    let ok = site(&storage, "https://ok.example");
    assert_eq!(ok.status, SiteStatus::Indexed);
}

#[tokio::test]
async fn test_lookalike_hosts_are_not_followed() {
    let fetcher = Arc::new(ScriptedFetcher::new(
        vec![(
            "https://site.example/",
            success(
                r#"<p>кот</p>
                <a href="https://site.example.community/page">Longer host</a>
                <a href="https://site.example.evil.org/x">Other domain</a>
                <a href="https://site.examplehttps://evil.example/x">Glued</a>"#,
            ),
        )],
        Duration::ZERO,
    ));

    let storage = memory_storage();
    let config = create_test_config(&[("https://site.example", "Site")], ":memory:");
    let manager = CrawlManager::with_fetcher(
        config,
        Arc::clone(&storage),
        extractor(),
        Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
    );

    manager.start().unwrap();
    wait_idle(&manager).await;

    let site = site(&storage, "https://site.example");
    assert_eq!(site.status, SiteStatus::Indexed);
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(storage::lock(&storage).unwrap().count_pages(site.id).unwrap(), 1);
}

#[tokio::test]
async fn test_failure_after_commit_keeps_indexed_content() {
    let body = r#"<p>кот собака</p><a href="/trap">Trap</a>"#;
    let fetcher = ScriptedFetcher::new(
        vec![("https://site.example/", success(body))],
        Duration::ZERO,
    );

    let db_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = db_dir.path().join("crawl.db");
    let storage = storage::shared(SqliteStorage::new(&db_path).expect("Failed to open storage"));

    // Placeholder insertion for /trap fails after the root's lemmas are committed
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_trap BEFORE INSERT ON pages WHEN NEW.path = '/trap'
         BEGIN SELECT RAISE(ABORT, 'trap rejected'); END;",
    )
    .unwrap();
    drop(conn);

    let config = create_test_config(&[("https://site.example", "Site")], ":memory:");
    let manager =
        CrawlManager::with_fetcher(config, Arc::clone(&storage), extractor(), Arc::new(fetcher));

    manager.start().unwrap();
    wait_idle(&manager).await;

    let site = site(&storage, "https://site.example");
    assert_eq!(site.status, SiteStatus::Failed);
    assert!(site.last_error.unwrap().contains("trap rejected"));

    let guard = storage::lock(&storage).unwrap();
    let root = guard.find_page(site.id, "/").unwrap().unwrap();
    assert_eq!(root.code, 500);
    assert!(!root.content.is_empty());

    // Every index row of the page is backed by its stored content
    let expected = extractor().find_lemmas_in_html(&root.content);
    let indexed: HashMap<String, usize> = guard
        .find_page_indexes(root.id)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.lemma, entry.rank as usize))
        .collect();
    assert_eq!(indexed, expected);
    assert_eq!(indexed.get("кот"), Some(&1));
    assert!(guard.lemma_frequency_mismatches(site.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_marks_sites_failed() {
    let fetcher = EndlessFetcher {
        delay: Duration::from_millis(30),
        fetches: AtomicUsize::new(0),
    };

    let storage = memory_storage();
    let config = create_test_config(&[("https://deep.example", "Deep")], ":memory:");
    let manager =
        CrawlManager::with_fetcher(config, Arc::clone(&storage), extractor(), Arc::new(fetcher));

    manager.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    manager.stop().expect("Stop should be accepted");
    assert!(matches!(manager.stop(), Err(ControlError::AlreadyStopping)));
    assert!(matches!(manager.start(), Err(ControlError::StillStopping)));

    wait_idle(&manager).await;

    let site = site(&storage, "https://deep.example");
    assert_eq!(site.status, SiteStatus::Failed);
    assert_eq!(site.last_error.as_deref(), Some(STOPPED_BY_USER));

    let pages = storage::lock(&storage).unwrap().count_pages(site.id).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        storage::lock(&storage).unwrap().count_pages(site.id).unwrap(),
        pages
    );
    assert!(storage::lock(&storage)
        .unwrap()
        .lemma_frequency_mismatches(site.id)
        .unwrap()
        .is_empty());

    // Idle again, so a new crawl is accepted
    manager.start().expect("Crawl should start after stopping");
    manager.stop().unwrap();
    wait_idle(&manager).await;
}

#[tokio::test]
async fn test_control_rejections() {
    let fetcher = EndlessFetcher {
        delay: Duration::from_millis(30),
        fetches: AtomicUsize::new(0),
    };
    let storage = memory_storage();
    let config = create_test_config(&[("https://deep.example", "Deep")], ":memory:");
    let manager =
        CrawlManager::with_fetcher(config, Arc::clone(&storage), extractor(), Arc::new(fetcher));

    assert!(matches!(manager.stop(), Err(ControlError::NotRunning)));

    manager.start().unwrap();
    assert!(manager.is_running());
    assert!(matches!(manager.start(), Err(ControlError::AlreadyRunning)));

    manager.stop().unwrap();
    wait_idle(&manager).await;
    assert!(!manager.is_running());
}

#[tokio::test]
async fn test_cancel_root_task_stops_all_writes() {
    let fetcher = Arc::new(EndlessFetcher {
        delay: Duration::from_millis(20),
        fetches: AtomicUsize::new(0),
    });
    let storage = memory_storage();

    let (site, root) = {
        let mut guard = storage::lock(&storage).unwrap();
        let site = guard.create_site("https://deep.example", "Deep").unwrap();
        let root = guard.insert_page(site.id, "/", PROCESSING_CODE, "").unwrap();
        (site, root)
    };
    let site_id = site.id;
    let page_locks = Arc::new(KeyedLocks::new("page"));

    let ctx = Arc::new(CrawlContext {
        storage: Arc::clone(&storage),
        fetcher: Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
        extractor: extractor(),
        maintainer: IndexMaintainer::new(Arc::clone(&storage), Arc::new(KeyedLocks::new("site"))),
        page_locks: Arc::clone(&page_locks),
        permits: Arc::new(Semaphore::new(8)),
        interval: RequestsInterval::default(),
    });
    let site = Arc::new(SiteContext::for_crawl(site, CancellationToken::new()));
    let task = PageTask::new(ctx, Arc::clone(&site), root, site.token().child_token(), true);
    let handle = TaskHandle::spawn(task);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(storage::lock(&storage).unwrap().count_pages(site_id).unwrap() > 1);

    assert_eq!(handle.cancel().await, TaskState::Cancelled);

    let fetches = fetcher.fetches.load(Ordering::SeqCst);
    let pages = storage::lock(&storage).unwrap().count_pages(site_id).unwrap();
    let root_code = storage::lock(&storage)
        .unwrap()
        .find_page(site_id, "/")
        .unwrap()
        .unwrap()
        .code;

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), fetches);
    assert_eq!(
        storage::lock(&storage).unwrap().count_pages(site_id).unwrap(),
        pages
    );
    assert_eq!(root_code, 200);
    // Every page written during the crawl released its lock shard
    assert!(page_locks.is_empty());

    // A cancelled tree never marks its site indexed
    assert_eq!(
        storage::lock(&storage).unwrap().get_site(site_id).unwrap().status,
        SiteStatus::Indexing
    );
    assert!(storage::lock(&storage)
        .unwrap()
        .lemma_frequency_mismatches(site_id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_index_single_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // First analysis sees both words, later ones only "кот"
    Mock::given(method("GET"))
        .and(path("/news/item"))
        .respond_with(html(r#"<p>кот мышь</p><a href="/other">Other</a>"#))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/news/item"))
        .respond_with(html("<p>кот кот</p>"))
        .mount(&mock_server)
        .await;

    let storage = memory_storage();
    let config = create_test_config(&[(&base_url, "Mock")], ":memory:");
    let manager = CrawlManager::new(config, Arc::clone(&storage), extractor()).unwrap();

    let url = format!("{}/News/Item/?utm=1", base_url);
    let PageJob::Started(job) = manager.index_page(&url).unwrap() else {
        panic!("Page analysis should start");
    };
    assert_eq!(job.await.unwrap(), TaskState::Done);

    let site = site(&storage, &base_url);
    assert_eq!(site.status, SiteStatus::Indexed);
    assert_eq!(lemma_frequency(&storage, site.id, "кот"), Some(1));
    assert_eq!(lemma_frequency(&storage, site.id, "мышь"), Some(1));
    // Links are not followed
    assert_eq!(storage::lock(&storage).unwrap().count_pages(site.id).unwrap(), 1);

    let PageJob::Started(job) = manager.index_page(&url).unwrap() else {
        panic!("Page analysis should start");
    };
    assert_eq!(job.await.unwrap(), TaskState::Done);

    assert_eq!(lemma_frequency(&storage, site.id, "кот"), Some(1));
    assert_eq!(lemma_frequency(&storage, site.id, "мышь"), None);
    let guard = storage::lock(&storage).unwrap();
    let page = guard.find_page(site.id, "/news/item").unwrap().unwrap();
    assert_eq!(page.code, 200);
    let indexes = guard.find_page_indexes(page.id).unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].rank, 2.0);
}

#[tokio::test]
async fn test_index_page_rejections() {
    let storage = memory_storage();
    let config = create_test_config(&[("https://site.example", "Site")], ":memory:");
    let fetcher = ScriptedFetcher::new(vec![], Duration::ZERO);
    let manager =
        CrawlManager::with_fetcher(config, Arc::clone(&storage), extractor(), Arc::new(fetcher));

    assert!(matches!(
        manager.index_page("   "),
        Err(ControlError::EmptyUrl)
    ));
    assert!(matches!(
        manager.index_page("https://elsewhere.example/page"),
        Err(ControlError::OutsideConfiguredSites)
    ));
    assert!(matches!(
        manager.index_page("https://site.example.evil/page"),
        Err(ControlError::OutsideConfiguredSites)
    ));

    // A page still waiting for its analysis is left alone
    {
        let mut guard = storage::lock(&storage).unwrap();
        let site = guard.create_site("https://site.example", "Site").unwrap();
        guard
            .insert_page(site.id, "/queued", PROCESSING_CODE, "")
            .unwrap();
    }
    assert!(matches!(
        manager.index_page("https://site.example/queued"),
        Ok(PageJob::AlreadyQueued)
    ));
}

#[tokio::test]
async fn test_single_page_failure_fails_site() {
    let fetcher = ScriptedFetcher::new(
        vec![(
            "https://site.example/page",
            FetchOutcome::Failed {
                error: "timed out".to_string(),
            },
        )],
        Duration::ZERO,
    );
    let storage = memory_storage();
    let config = create_test_config(&[("https://site.example", "Site")], ":memory:");
    let manager =
        CrawlManager::with_fetcher(config, Arc::clone(&storage), extractor(), Arc::new(fetcher));

    // Already indexed sites fail as well
    {
        let mut guard = storage::lock(&storage).unwrap();
        let site = guard.create_site("https://site.example", "Site").unwrap();
        guard
            .update_site_status(site.id, SiteStatus::Indexed, None)
            .unwrap();
    }

    let PageJob::Started(job) = manager.index_page("https://site.example/page").unwrap() else {
        panic!("Page analysis should start");
    };
    job.await.unwrap();

    let site = site(&storage, "https://site.example");
    assert_eq!(site.status, SiteStatus::Failed);
    assert_eq!(site.last_error.as_deref(), Some("timed out"));
}
