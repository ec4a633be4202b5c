use url::Url;

/// Extracts the domain from a URL
///
/// The host is the unit of per-domain concurrency limiting and of round-robin
/// ordering, so it is lowercased to keep `SPIEGEL.de` and `spiegel.de` in one group.
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain/host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use news_harvest::url::extract_domain;
///
/// let url = Url::parse("https://www.tagesschau.de/xml/rss2/").unwrap();
/// assert_eq!(extract_domain(&url), Some("www.tagesschau.de".to_string()));
///
/// let url = Url::parse("https://RSS.DW.COM/xml/rss-de-all").unwrap();
/// assert_eq!(extract_domain(&url), Some("rss.dw.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
