use chrono::{DateTime, Utc};
use serde::Serialize;

/// An article extracted from a feed
///
/// The source URL is the natural key; storing the same item twice updates it
/// in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawItem {
    pub url: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub source_domain: String,
    /// URL of the feed the item was listed in
    pub source_feed: String,
    pub theme: String,
    /// Plain-text body or summary
    pub raw_content: String,
}

impl RawItem {
    /// The natural key used for idempotent upserts
    pub fn natural_key(&self) -> &str {
        &self.url
    }
}
