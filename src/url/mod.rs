//! URL handling module for Site-Search
//!
//! Pages are stored by site-relative path. This module turns discovered links
//! and operator-supplied URLs into those paths and back.

mod normalize;

pub use normalize::{belongs_to_site, normalized_path, page_url, resolve_site_url};
