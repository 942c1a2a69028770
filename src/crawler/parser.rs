//! HTML parser for page text, titles and same-site links
//!
//! This module handles parsing HTML content to extract:
//! - The visible text used for lemma extraction and snippets
//! - Page title
//! - Links that stay inside the crawled site

use crate::url::belongs_to_site;
use scraper::{Html, Selector};

/// Elements that flow inside a text line rather than starting a new block
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "font", "i", "kbd",
    "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
];

/// Converts an HTML document to plain text
///
/// Text of different blocks is separated by a space, text inside one block is
/// glued as written, whitespace runs collapse to single spaces and script and
/// style bodies are skipped. The result is a single line.
///
/// # Example
///
/// ```
/// use site_search::crawler::html_to_text;
///
/// let text = html_to_text("<p>Один <b>дв</b>а</p><p>три</p>");
/// assert_eq!(text, "Один два три");
/// ```
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::with_capacity(html.len() / 2);
    let mut last_block = None;

    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map(|element| matches!(element.name(), "script" | "style" | "noscript"))
            .unwrap_or(false);
        if hidden || text.is_empty() {
            continue;
        }

        let block = node
            .ancestors()
            .find(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|element| !INLINE_ELEMENTS.contains(&element.name()))
                    .unwrap_or(true)
            })
            .map(|ancestor| ancestor.id());

        if last_block.is_some() && block != last_block {
            raw.push(' ');
        }
        raw.push_str(text);
        last_block = block;
    }

    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts the page title from an HTML document
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts links pointing into the given site
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` values on the site's own host (case-insensitive, so
///   `https://example.com` does not own `https://example.community`)
/// - `<a href="...">` values starting with a single `/`
///
/// **Exclude:**
/// - Any href containing `#`
/// - Protocol-relative `//host/...` links
/// - Relative paths without a leading `/`
///
/// The returned hrefs are raw and still need path normalization.
pub fn extract_site_links(html: &str, site_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    let Ok(a_selector) = Selector::parse("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        if let Some(href) = element.value().attr("href") {
            if is_site_link(href, site_url) && !links.iter().any(|link| link == href) {
                links.push(href.to_string());
            }
        }
    }

    links
}

fn is_site_link(href: &str, site_url: &str) -> bool {
    if href.contains('#') {
        return false;
    }

    if href.starts_with("//") {
        return false;
    }

    href.starts_with('/') || belongs_to_site(site_url, href)
}
