//! RSS 2.0 and Atom feed parsing
//!
//! Feeds are deserialised with quick-xml's serde support. Only the fields the
//! harvester stores are declared; everything else in the document is ignored.
//! HTML in summaries is reduced to plain text with `scraper`.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use scraper::Html;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while parsing a feed document
#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("malformed feed XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("document is neither RSS nor Atom")]
    UnknownFormat,
}

/// One entry of a parsed feed, before it is turned into a `RawItem`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub link: Option<String>,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded")]
    content_encoded: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Parses an RSS 2.0 or Atom document into entries
///
/// # Arguments
///
/// * `body` - The feed document
///
/// # Returns
///
/// * `Ok(Vec<ParsedEntry>)` - Entries in document order (may be empty)
/// * `Err(FeedParseError)` - The document is not a feed or is malformed
///
/// # Example
///
/// ```
/// use news_harvest::fetch::parse_feed;
///
/// let rss = r#"<rss version="2.0"><channel><title>t</title>
///   <item><title>Hallo</title><link>https://www.dw.com/de/a-1</link></item>
/// </channel></rss>"#;
/// let entries = parse_feed(rss).unwrap();
/// assert_eq!(entries[0].title, "Hallo");
/// ```
pub fn parse_feed(body: &str) -> Result<Vec<ParsedEntry>, FeedParseError> {
    let body = body.trim_start_matches('\u{feff}');
    match detect_format(body) {
        Some(FeedFormat::Rss) => parse_rss(body),
        Some(FeedFormat::Atom) => parse_atom(body),
        None => Err(FeedParseError::UnknownFormat),
    }
}

enum FeedFormat {
    Rss,
    Atom,
}

fn detect_format(body: &str) -> Option<FeedFormat> {
    let rss = body.find("<rss");
    let atom = body.find("<feed");
    match (rss, atom) {
        (Some(r), Some(a)) if a < r => Some(FeedFormat::Atom),
        (Some(_), _) => Some(FeedFormat::Rss),
        (None, Some(_)) => Some(FeedFormat::Atom),
        (None, None) => None,
    }
}

fn parse_rss(body: &str) -> Result<Vec<ParsedEntry>, FeedParseError> {
    let rss: Rss = from_str(body)?;
    Ok(rss
        .channel
        .items
        .into_iter()
        .map(|item| {
            let content = item
                .content_encoded
                .filter(|c| !c.trim().is_empty())
                .or(item.description)
                .unwrap_or_default();
            ParsedEntry {
                link: non_empty(item.link),
                title: html_to_text(item.title.as_deref().unwrap_or_default()),
                published_at: item.pub_date.as_deref().and_then(parse_date),
                content: html_to_text(&content),
            }
        })
        .collect())
}

fn parse_atom(body: &str) -> Result<Vec<ParsedEntry>, FeedParseError> {
    let feed: AtomFeed = from_str(body)?;
    Ok(feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone());
            let content = entry
                .content
                .filter(|c| !c.value.trim().is_empty())
                .or(entry.summary)
                .map(|c| c.value)
                .unwrap_or_default();
            ParsedEntry {
                link: non_empty(link),
                title: html_to_text(&entry.title.map(|t| t.value).unwrap_or_default()),
                published_at: entry
                    .published
                    .as_deref()
                    .or(entry.updated.as_deref())
                    .and_then(parse_date),
                content: html_to_text(&content),
            }
        })
        .collect())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a feed timestamp: RFC 2822 first, then RFC 3339
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Reduces an HTML fragment to whitespace-normalised text
pub fn html_to_text(fragment: &str) -> String {
    if !fragment.contains('<') {
        return collapse_whitespace(fragment);
    }
    let html = Html::parse_fragment(fragment);
    let text: Vec<&str> = html.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
