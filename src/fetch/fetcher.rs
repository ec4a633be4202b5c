//! Fetch capability and its HTTP implementation
//!
//! The scheduler only sees the `FetchCapability` trait. `HttpFeedFetcher`
//! is the production implementation: one GET per attempt, status and
//! transport errors classified into the failure taxonomy, the body parsed
//! as RSS or Atom and filtered by the feed's strategy.

use super::parser::{parse_feed, FeedParseError, ParsedEntry};
use crate::config::{DailyWindow, UserAgentConfig};
use crate::model::{FeedDescriptor, FetchStrategy, RawItem};
use crate::retry::{classify_http_status, classify_reqwest_error, Classify};
use crate::state::FailureKind;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error returned by a single fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Parse(#[from] FeedParseError),

    #[error("feed listed {0} entries but none had a link")]
    NoUsableEntries(usize),

    #[error("{message}")]
    Failed { kind: FailureKind, message: String },
}

impl FetchError {
    /// Builds an error of an explicit kind
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }
}

impl Classify for FetchError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Status { status, .. } => classify_http_status(*status),
            Self::Transport { source, .. } => classify_reqwest_error(source),
            Self::Timeout(_) => FailureKind::TransientNetwork,
            Self::Parse(_) | Self::NoUsableEntries(_) => FailureKind::Extraction,
            Self::Failed { kind, .. } => *kind,
        }
    }
}

/// Something that can turn a feed descriptor into raw items
///
/// A fetch is split in two steps. `fetch_body` is the network step and runs
/// while the scheduler holds a slot on the feed's domain; `extract` is local
/// work and runs after that slot has been released.
#[async_trait]
pub trait FetchCapability: Send + Sync {
    /// Performs one network request bounded by `timeout`
    async fn fetch_body(
        &self,
        descriptor: &FeedDescriptor,
        timeout: Duration,
    ) -> Result<String, FetchError>;

    /// Parses a fetched body into items
    async fn extract(
        &self,
        descriptor: &FeedDescriptor,
        body: String,
    ) -> Result<Vec<RawItem>, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use news_harvest::config::UserAgentConfig;
/// use news_harvest::fetch::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "NewsHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.org/bot".to_string(),
///     contact_email: "bot@example.org".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Keeps the entries a feed's strategy asks for
///
/// `FullArchive` keeps everything. `DailyUpdates` keeps entries published on
/// the previous UTC day, or in the last 24 hours with `DailyWindow::Last24h`.
/// Undated entries are always kept.
pub fn select_entries(
    entries: Vec<ParsedEntry>,
    strategy: FetchStrategy,
    window: DailyWindow,
    now: DateTime<Utc>,
) -> Vec<ParsedEntry> {
    if strategy == FetchStrategy::FullArchive {
        return entries;
    }

    let keep = |published: DateTime<Utc>| match window {
        DailyWindow::PreviousDay => {
            published.date_naive() == (now - ChronoDuration::days(1)).date_naive()
        }
        DailyWindow::Last24h => published >= now - ChronoDuration::hours(24) && published <= now,
    };

    entries
        .into_iter()
        .filter(|e| e.published_at.map_or(true, |p| keep(p)))
        .collect()
}

/// Turns parsed entries into raw items for `descriptor`
///
/// Entries without a link cannot be keyed and are dropped. A feed that listed
/// entries but had none with a link is an extraction failure.
pub fn entries_to_items(
    descriptor: &FeedDescriptor,
    entries: Vec<ParsedEntry>,
    window: DailyWindow,
    now: DateTime<Utc>,
) -> Result<Vec<RawItem>, FetchError> {
    let listed = entries.len();
    let usable: Vec<ParsedEntry> = entries.into_iter().filter(|e| e.link.is_some()).collect();
    if listed > 0 && usable.is_empty() {
        return Err(FetchError::NoUsableEntries(listed));
    }

    let selected = select_entries(usable, descriptor.strategy, window, now);
    Ok(selected
        .into_iter()
        .filter_map(|entry| {
            let url = entry.link?;
            Some(RawItem {
                title: if entry.title.is_empty() {
                    url.clone()
                } else {
                    entry.title
                },
                url,
                published_at: entry.published_at,
                source_domain: descriptor.domain.clone(),
                source_feed: descriptor.url.clone(),
                theme: descriptor.theme.clone(),
                raw_content: entry.content,
            })
        })
        .collect())
}

/// Fetches feeds over HTTP
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: Client,
    daily_window: DailyWindow,
}

impl HttpFeedFetcher {
    pub fn new(client: Client, daily_window: DailyWindow) -> Self {
        Self {
            client,
            daily_window,
        }
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout(timeout)
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| transport(e))
    }
}

#[async_trait]
impl FetchCapability for HttpFeedFetcher {
    async fn fetch_body(
        &self,
        descriptor: &FeedDescriptor,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        self.get_text(&descriptor.url, timeout).await
    }

    async fn extract(
        &self,
        descriptor: &FeedDescriptor,
        body: String,
    ) -> Result<Vec<RawItem>, FetchError> {
        let entries = parse_feed(&body)?;
        let items = entries_to_items(descriptor, entries, self.daily_window, Utc::now())?;
        debug!("{}: {} items", descriptor.url, items.len());
        Ok(items)
    }
}
