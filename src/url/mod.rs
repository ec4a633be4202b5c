//! URL handling module for news-harvest
//!
//! Feeds are rate limited and interleaved by their network host, so the only
//! URL logic the crate needs is reliable domain extraction and scheme checks.

mod domain;

use crate::{UrlError, UrlResult};
use url::Url;

// Re-export main functions
pub use domain::extract_domain;

/// Parses a feed or article URL and returns its lowercase host
///
/// Only `http` and `https` URLs are accepted.
///
/// # Examples
///
/// ```
/// use news_harvest::url::domain_of;
///
/// assert_eq!(domain_of("https://www.Tagesschau.de/xml/rss2/").unwrap(), "www.tagesschau.de");
/// assert!(domain_of("ftp://example.com/feed").is_err());
/// ```
pub fn domain_of(raw: &str) -> UrlResult<String> {
    let url = Url::parse(raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    extract_domain(&url).ok_or(UrlError::MissingDomain)
}
