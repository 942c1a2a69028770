use crate::config::SiteEntry;
use crate::UrlError;

/// Reduces a link or page URL to the path stored for a site's page
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Remove the query string and fragment
/// 3. Remove a trailing slash
/// 4. Lowercase everything
/// 5. Strip the site's own URL prefix if present
/// 6. Reject anything still carrying a `scheme://` before its first path slash
/// 7. Prepend `/` if missing
///
/// # Arguments
///
/// * `site_url` - Root URL of the site the link belongs to
/// * `url` - Absolute URL on that site or a site-relative path
///
/// # Returns
///
/// * `Ok(String)` - The normalized path, `/` for the site root
/// * `Err(UrlError::ForeignOrigin)` - The URL points at another origin
///
/// # Examples
///
/// ```
/// use site_search::url::normalized_path;
///
/// let path = normalized_path("https://example.com", "https://EXAMPLE.com/a/b/?x=1").unwrap();
/// assert_eq!(path, "/a/b");
///
/// assert!(normalized_path("https://example.com", "https://other.org/a").is_err());
/// ```
pub fn normalized_path(site_url: &str, url: &str) -> Result<String, UrlError> {
    let mut url = url.trim();

    if let Some(end) = url.find(['?', '#']) {
        url = &url[..end];
    }

    if let Some(stripped) = url.strip_suffix('/') {
        url = stripped;
    }

    let mut path = url.to_lowercase();

    let root = site_url.trim().trim_end_matches('/').to_lowercase();
    if let Some(rest) = path.strip_prefix(&root) {
        path = rest.to_string();
    }

    if let Some(scheme_end) = path.find("://") {
        if scheme_end > 0 && path.find('/') == Some(scheme_end + 1) {
            return Err(UrlError::ForeignOrigin { url: path, root });
        }
    }

    if !path.starts_with('/') {
        path.insert(0, '/');
    }

    Ok(path)
}

/// Absolute URL of a stored page path
pub fn page_url(site_url: &str, path: &str) -> String {
    let root = site_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", root, path)
    } else {
        format!("{}/{}", root, path)
    }
}

/// Returns true if the URL lies under the site's root URL
///
/// Matching is case-insensitive and respects the host boundary, so
/// `https://example.com` does not own `https://example.community`.
pub fn belongs_to_site(site_url: &str, url: &str) -> bool {
    let url = url.trim().to_lowercase();
    let root = site_url.trim().trim_end_matches('/').to_lowercase();

    match url.strip_prefix(&root) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Finds the configured site owning a URL together with the page path
///
/// # Returns
///
/// * `Ok(Some((site, path)))` - The owning site and the normalized path
/// * `Ok(None)` - No configured site owns the URL
/// * `Err(UrlError::Empty)` - The URL is blank
pub fn resolve_site_url<'a>(
    sites: &'a [SiteEntry],
    url: &str,
) -> Result<Option<(&'a SiteEntry, String)>, UrlError> {
    if url.trim().is_empty() {
        return Err(UrlError::Empty);
    }

    let Some(site) = sites.iter().find(|site| belongs_to_site(&site.url, url)) else {
        return Ok(None);
    };

    let path = normalized_path(&site.url, url)?;
    Ok(Some((site, path)))
}
