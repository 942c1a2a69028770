//! Integration tests for search
//!
//! Pages are indexed through the index maintainer the same way a crawl
//! indexes them, then queried through the search engine.

use site_search::config::{
    BotConfig, Config, CrawlerConfig, MorphologyConfig, RequestsInterval, SearchConfig,
    SiteEntry, StorageConfig,
};
use site_search::index::{IndexMaintainer, KeyedLocks};
use site_search::search::{SearchEngine, SearchError, SearchRequest};
use site_search::storage::{self, SharedStorage, SqliteStorage, Storage};
use site_search::{LemmaExtractor, Morphology, SiteStatus};
use std::sync::Arc;

const FIRST: &str = "https://first.example";
const SECOND: &str = "https://second.example";

fn create_test_config(sites: &[(&str, &str)]) -> Config {
    Config {
        bot: BotConfig {
            user_agent: "TestBot/1.0".to_string(),
            referer: None,
            requests_interval: RequestsInterval::default(),
        },
        crawler: CrawlerConfig::default(),
        search: SearchConfig::default(),
        storage: StorageConfig {
            database_path: ":memory:".to_string(),
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

fn extractor() -> LemmaExtractor {
    LemmaExtractor::new(Arc::new(Morphology::builtin()))
}

fn page_html(title: &str, text: &str) -> String {
    format!(
        "<html><head><title>{}</title></head><body><p>{}</p></body></html>",
        title, text
    )
}

/// Test fixture: storage with indexed pages
struct Fixture {
    storage: SharedStorage,
    maintainer: IndexMaintainer,
    extractor: LemmaExtractor,
}

impl Fixture {
    fn new() -> Self {
        let storage = storage::shared(SqliteStorage::new_in_memory().unwrap());
        let maintainer =
            IndexMaintainer::new(Arc::clone(&storage), Arc::new(KeyedLocks::new("site")));
        Self {
            storage,
            maintainer,
            extractor: extractor(),
        }
    }

    fn site(&self, url: &str, name: &str, status: SiteStatus) -> i64 {
        let mut guard = storage::lock(&self.storage).unwrap();
        let site = guard.create_site(url, name).unwrap();
        guard.update_site_status(site.id, status, None).unwrap();
        site.id
    }

    fn page(&self, site_id: i64, path: &str, html: &str) -> i64 {
        let page = storage::lock(&self.storage)
            .unwrap()
            .insert_page(site_id, path, 200, html)
            .unwrap();
        let lemmas = self.extractor.find_lemmas_in_html(html);
        self.maintainer.commit(site_id, page.id, &lemmas).unwrap();
        page.id
    }

    fn engine(&self, config: &Config) -> SearchEngine {
        SearchEngine::new(config, Arc::clone(&self.storage), self.extractor.clone())
    }
}

/// One indexed site with pages /a (кот x3) and /b (кот, пёс)
fn single_site() -> (Fixture, Config) {
    let fixture = Fixture::new();
    let site = fixture.site(FIRST, "First", SiteStatus::Indexed);
    fixture.page(site, "/a", &page_html("Про котов", "кот кот кот"));
    fixture.page(site, "/b", &page_html("Разное", "кот пёс"));
    (fixture, create_test_config(&[(FIRST, "First")]))
}

#[test]
fn test_single_lemma_ranking() {
    let (fixture, config) = single_site();
    let engine = fixture.engine(&config);

    let response = engine.search(&SearchRequest::new("кот")).unwrap();

    assert_eq!(response.count, 2);
    assert_eq!(response.items.len(), 2);

    let first = &response.items[0];
    assert_eq!(first.uri, "/a");
    assert_eq!(first.relevance, 1.0);
    assert_eq!(first.site_url, FIRST);
    assert_eq!(first.site_name, "First");
    assert_eq!(first.title, "Про котов");
    assert!(first.snippet.contains("<b>кот кот кот</b>"));

    let second = &response.items[1];
    assert_eq!(second.uri, "/b");
    assert!((second.relevance - 1.0 / 3.0).abs() < 1e-9);
    assert!(second.snippet.contains("<b>кот</b>"));
}

#[test]
fn test_all_lemmas_required() {
    let (fixture, config) = single_site();
    let engine = fixture.engine(&config);

    let both = engine.search(&SearchRequest::new("кот пёс")).unwrap();
    assert_eq!(both.count, 1);
    assert_eq!(both.items[0].uri, "/b");
    assert_eq!(both.items[0].relevance, 1.0);

    let missing = engine.search(&SearchRequest::new("кот собака")).unwrap();
    assert_eq!(missing.count, 0);
    assert!(missing.items.is_empty());
}

#[test]
fn test_query_of_particles_only() {
    let (fixture, config) = single_site();
    let engine = fixture.engine(&config);

    let response = engine.search(&SearchRequest::new("и в на")).unwrap();
    assert_eq!(response.count, 0);
}

#[test]
fn test_pagination_window() {
    let (fixture, config) = single_site();
    let engine = fixture.engine(&config);

    let response = engine
        .search(&SearchRequest::new("кот").limit(1).offset(1))
        .unwrap();
    assert_eq!(response.count, 2);
    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].uri, "/b");

    let past_end = engine
        .search(&SearchRequest::new("кот").limit(5).offset(10))
        .unwrap();
    assert_eq!(past_end.count, 2);
    assert!(past_end.items.is_empty());
}

#[test]
fn test_search_across_sites() {
    let fixture = Fixture::new();
    let first = fixture.site(FIRST, "First", SiteStatus::Indexed);
    let second = fixture.site(SECOND, "Second", SiteStatus::Failed);
    fixture.page(first, "/a", &page_html("A", "кот"));
    fixture.page(second, "/x", &page_html("X", "кот кот"));
    // Lemma present on the second site only
    fixture.page(second, "/y", &page_html("Y", "мышь"));

    let config = create_test_config(&[(FIRST, "First"), (SECOND, "Second")]);
    let engine = fixture.engine(&config);

    let all = engine.search(&SearchRequest::new("кот")).unwrap();
    assert_eq!(all.count, 2);
    assert_eq!(all.items[0].site_url, SECOND);
    assert_eq!(all.items[0].relevance, 1.0);
    assert_eq!(all.items[1].site_url, FIRST);
    assert_eq!(all.items[1].relevance, 0.5);

    let filtered = engine
        .search(&SearchRequest::new("кот").site("HTTPS://First.example/"))
        .unwrap();
    assert_eq!(filtered.count, 1);
    assert_eq!(filtered.items[0].uri, "/a");
    assert_eq!(filtered.items[0].relevance, 1.0);

    let none = engine
        .search(&SearchRequest::new("мышь").site(FIRST))
        .unwrap();
    assert_eq!(none.count, 0);
}

#[test]
fn test_request_validation() {
    let (fixture, config) = single_site();
    let engine = fixture.engine(&config);

    assert!(matches!(
        engine.search(&SearchRequest::new("   ")),
        Err(SearchError::EmptyQuery)
    ));
    assert!(matches!(
        engine.search(&SearchRequest::new("кот").limit(0)),
        Err(SearchError::InvalidLimit(0))
    ));
    assert!(matches!(
        engine.search(&SearchRequest::new("кот").offset(-1)),
        Err(SearchError::InvalidOffset(-1))
    ));
    assert!(matches!(
        engine.search(&SearchRequest::new("кот").site("https://unknown.example")),
        Err(SearchError::SiteNotConfigured(_))
    ));
}

#[test]
fn test_sites_must_be_indexed() {
    let fixture = Fixture::new();
    let first = fixture.site(FIRST, "First", SiteStatus::Indexing);
    fixture.page(first, "/a", &page_html("A", "кот"));

    let config = create_test_config(&[(FIRST, "First"), (SECOND, "Second")]);
    let engine = fixture.engine(&config);

    assert!(matches!(
        engine.search(&SearchRequest::new("кот").site(FIRST)),
        Err(SearchError::IndexingIncomplete(_))
    ));
    assert!(matches!(
        engine.search(&SearchRequest::new("кот").site(SECOND)),
        Err(SearchError::SiteNotIndexed(_))
    ));
    assert!(matches!(
        engine.search(&SearchRequest::new("кот")),
        Err(SearchError::IndexingIncomplete(_))
    ));
}

#[test]
fn test_page_without_content() {
    let fixture = Fixture::new();
    let site = fixture.site(FIRST, "First", SiteStatus::Indexed);
    let page = storage::lock(&fixture.storage)
        .unwrap()
        .insert_page(site, "/empty", 200, "")
        .unwrap();
    let lemmas = [("кот".to_string(), 1)].into_iter().collect();
    fixture.maintainer.commit(site, page.id, &lemmas).unwrap();

    let config = create_test_config(&[(FIRST, "First")]);
    let response = fixture.engine(&config).search(&SearchRequest::new("кот")).unwrap();

    assert_eq!(response.count, 1);
    assert!(response.items[0].title.is_empty());
    assert!(response.items[0].snippet.is_empty());
}
