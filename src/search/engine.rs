use super::types::{SearchError, SearchItem, SearchRequest, SearchResponse};
use crate::config::{canonical_site_url, Config, SiteEntry};
use crate::crawler::{extract_title, html_to_text};
use crate::lemma::{LemmaExtractor, SnippetBuilder};
use crate::state::SiteStatus;
use crate::storage::{self, PageRecord, SharedStorage, SiteRecord, Storage};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Answers ranked queries over the indexed sites
pub struct SearchEngine {
    storage: SharedStorage,
    extractor: LemmaExtractor,
    snippets: SnippetBuilder,
    sites: Vec<SiteEntry>,
    default_limit: i64,
}

impl SearchEngine {
    pub fn new(config: &Config, storage: SharedStorage, extractor: LemmaExtractor) -> Self {
        let snippets = SnippetBuilder::new(
            extractor.clone(),
            config.search.words_range,
            config.search.spoiler_threshold,
        );
        Self {
            storage,
            extractor,
            snippets,
            sites: config.sites.clone(),
            default_limit: config.search.default_limit,
        }
    }

    /// Runs a query
    ///
    /// Pages match when they index every lemma of the query. A page's
    /// absolute relevance is the sum of its ranks for those lemmas; the
    /// reported relevance is relative to the best match. Results are ordered
    /// by relevance, then by page id.
    ///
    /// # Errors
    ///
    /// Invalid requests are rejected before storage is read. A site filter
    /// must name a configured site that exists and is not being indexed;
    /// without a filter every configured site must satisfy that.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let limit = request.limit.unwrap_or(self.default_limit);
        if limit <= 0 {
            return Err(SearchError::InvalidLimit(limit));
        }
        if request.offset < 0 {
            return Err(SearchError::InvalidOffset(request.offset));
        }

        let lemmas = self.extractor.lemma_set(query);

        let (sites, pages, count) = {
            let storage = storage::lock(&self.storage)?;
            let sites = self.candidate_sites(&*storage, request.site.as_deref())?;
            if lemmas.is_empty() {
                return Ok(SearchResponse::default());
            }

            let mut absolute: HashMap<i64, f64> = HashMap::new();
            for site in &sites {
                absolute.extend(site_matches(&*storage, site.id, &lemmas)?);
            }

            let ranked = rank(absolute);
            let count = ranked.len();
            let mut pages = Vec::new();
            for (page_id, relevance) in ranked
                .into_iter()
                .skip(request.offset as usize)
                .take(limit as usize)
            {
                pages.push((storage.get_page(page_id)?, relevance));
            }
            (sites, pages, count)
        };

        tracing::debug!("Query {:?} matched {} pages", query, count);

        let sites: HashMap<i64, &SiteRecord> = sites.iter().map(|site| (site.id, site)).collect();
        let items = pages
            .into_iter()
            .filter_map(|(page, relevance)| {
                let site = sites.get(&page.site_id)?;
                Some(self.item(site, page, relevance, &lemmas))
            })
            .collect();

        Ok(SearchResponse { count, items })
    }

    /// Resolves the stored sites a request searches
    fn candidate_sites(
        &self,
        storage: &dyn Storage,
        filter: Option<&str>,
    ) -> Result<Vec<SiteRecord>, SearchError> {
        let entries: Vec<&SiteEntry> = match filter {
            Some(url) => {
                let url = canonical_site_url(url);
                let entry = self
                    .sites
                    .iter()
                    .find(|site| site.url == url)
                    .ok_or(SearchError::SiteNotConfigured(url))?;
                vec![entry]
            }
            None => self.sites.iter().collect(),
        };

        let mut sites = Vec::with_capacity(entries.len());
        for entry in entries {
            let site = storage
                .get_site_by_url(&entry.url)?
                .ok_or_else(|| SearchError::SiteNotIndexed(entry.url.clone()))?;
            if site.status == SiteStatus::Indexing {
                return Err(SearchError::IndexingIncomplete(site.url));
            }
            sites.push(site);
        }
        Ok(sites)
    }

    fn item(
        &self,
        site: &SiteRecord,
        page: PageRecord,
        relevance: f64,
        lemmas: &HashSet<String>,
    ) -> SearchItem {
        let (title, snippet) = if page.content.is_empty() {
            (String::new(), String::new())
        } else {
            (
                extract_title(&page.content).unwrap_or_default(),
                self.snippets.build(&html_to_text(&page.content), lemmas),
            )
        };

        SearchItem {
            site_url: site.url.clone(),
            site_name: site.name.clone(),
            uri: page.path,
            title,
            snippet,
            relevance,
        }
    }
}

/// Finds the pages of one site indexing every query lemma
///
/// # Returns
///
/// Page ID -> summed rank; empty when any lemma is unknown to the site
fn site_matches(
    storage: &dyn Storage,
    site_id: i64,
    lemmas: &HashSet<String>,
) -> Result<HashMap<i64, f64>, SearchError> {
    let names: Vec<String> = lemmas.iter().cloned().collect();
    let mut records = storage.find_lemmas(site_id, &names)?;
    if records.len() < lemmas.len() {
        return Ok(HashMap::new());
    }

    // Rarest first keeps the candidate set small
    records.sort_by(|a, b| {
        a.frequency
            .cmp(&b.frequency)
            .then_with(|| a.lemma.cmp(&b.lemma))
    });

    let mut pages = storage.find_lemma_ranks(records[0].id)?;
    for record in &records[1..] {
        if pages.is_empty() {
            break;
        }
        let candidates: Vec<i64> = pages.keys().copied().collect();
        let ranks = storage.find_lemma_ranks_in_pages(record.id, &candidates)?;
        pages.retain(|page_id, total| match ranks.get(page_id) {
            Some(rank) => {
                *total += rank;
                true
            }
            None => false,
        });
    }

    Ok(pages)
}

/// Orders pages by relative relevance, best first
fn rank(absolute: HashMap<i64, f64>) -> Vec<(i64, f64)> {
    let max = absolute.values().copied().fold(0.0_f64, f64::max);
    let mut ranked: Vec<(i64, f64)> = absolute
        .into_iter()
        .map(|(page_id, relevance)| {
            let relative = if max > 0.0 { relevance / max } else { 0.0 };
            (page_id, relative)
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}
