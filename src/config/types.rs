use crate::fetch::OrderingStrategy;
use crate::model::{FeedDescriptor, FetchStrategy};
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for news-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedEntry>,
}

/// Which entries a `daily-updates` feed keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum DailyWindow {
    /// Entries published on the previous UTC calendar day
    #[default]
    #[serde(rename = "previous-day")]
    PreviousDay,
    /// Entries published in the 24 hours before the fetch
    #[serde(rename = "last-24h")]
    Last24h,
}

/// Fetch scheduler configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Maximum number of feeds fetched at once
    pub global_concurrency: u32,

    /// Maximum number of feeds fetched at once from the same domain
    pub per_domain_concurrency: u32,

    /// Minimum spacing between requests to the same domain
    pub per_domain_delay_ms: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,

    /// Timeout for a single fetch attempt
    pub fetch_timeout_secs: u64,

    /// How long in-flight fetches may drain after cancellation
    pub grace_period_secs: u64,

    /// Log a progress snapshot every N results
    pub progress_interval: u64,

    pub ordering: OrderingStrategy,

    pub daily_window: DailyWindow,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 15,
            per_domain_concurrency: 3,
            per_domain_delay_ms: 500,
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_ms: 250,
            fetch_timeout_secs: 30,
            grace_period_secs: 10,
            progress_interval: 50,
            ordering: OrderingStrategy::RoundRobin,
            daily_window: DailyWindow::PreviousDay,
        }
    }
}

impl SchedulerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn per_domain_delay(&self) -> Duration {
        Duration::from_millis(self.per_domain_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Enrichment pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EnrichmentConfig {
    /// Maximum number of enrichment requests in flight
    pub workers: u32,

    /// Cumulative spending ceiling for one run
    pub budget_ceiling_usd: f64,

    /// Minimum spacing between two API requests
    pub min_dispatch_interval_ms: u64,

    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,

    /// Articles with less content than this are not enriched
    pub min_content_chars: usize,

    /// Enrich at most this many articles per run
    pub batch_limit: Option<usize>,

    /// How long in-flight jobs may drain after cancellation
    pub grace_period_secs: u64,

    /// Log a progress snapshot every N finished jobs
    pub progress_interval: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            budget_ceiling_usd: 5.0,
            min_dispatch_interval_ms: 500,
            max_retries: 3,
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            jitter_ms: 500,
            min_content_chars: 100,
            batch_limit: None,
            grace_period_secs: 30,
            progress_interval: 10,
        }
    }
}

impl EnrichmentConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }

    pub fn min_dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.min_dispatch_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Chat-completion API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AiConfig {
    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,

    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Completion token limit per request
    pub max_tokens: u32,

    pub temperature: f32,

    /// USD per million prompt tokens
    pub input_cost_per_million: f64,

    /// USD per million completion tokens
    pub output_cost_per_million: f64,

    pub request_timeout_secs: u64,

    /// Article content is truncated to this many characters before sending
    pub max_content_chars: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            max_tokens: 1000,
            temperature: 0.3,
            input_cost_per_million: 0.59,
            output_cost_per_million: 0.79,
            request_timeout_secs: 60,
            max_content_chars: 4000,
        }
    }
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the harvester
    pub crawler_name: String,

    pub crawler_version: String,

    /// URL with information about the harvester
    pub contact_url: String,

    /// Email address for harvester-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent string: `Name/Version (+ContactURL; ContactEmail)`
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// One `[[feed]]` entry of the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub url: String,

    /// Grouping domain; defaults to the URL's host
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default = "default_priority")]
    pub priority: u8,

    #[serde(default)]
    pub strategy: FetchStrategy,

    pub theme: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_priority() -> u8 {
    2
}

impl FeedEntry {
    /// Converts the entry into a descriptor, deriving the domain from the URL
    /// when none is configured
    pub fn to_descriptor(&self) -> crate::UrlResult<FeedDescriptor> {
        let domain = match &self.domain {
            Some(domain) => domain.to_lowercase(),
            None => crate::url::domain_of(&self.url)?,
        };
        Ok(FeedDescriptor {
            url: self.url.clone(),
            domain,
            priority: self.priority,
            strategy: self.strategy,
            theme: self.theme.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
        })
    }
}

impl Config {
    /// Builds the catalog of feed descriptors in configuration order
    pub fn feed_descriptors(&self) -> crate::UrlResult<Vec<FeedDescriptor>> {
        self.feeds.iter().map(FeedEntry::to_descriptor).collect()
    }
}
