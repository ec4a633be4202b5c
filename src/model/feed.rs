use serde::{Deserialize, Serialize};
use std::fmt;

/// How much of a feed to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Keep every entry the feed currently lists
    #[default]
    FullArchive,
    /// Keep only recent entries (see `DailyWindow`)
    DailyUpdates,
}

impl FetchStrategy {
    /// Converts the strategy to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::FullArchive => "full_archive",
            Self::DailyUpdates => "daily_updates",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// A single feed to fetch
///
/// Descriptors come from the catalog and never change during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedDescriptor {
    /// Feed URL
    pub url: String,

    /// Domain used for grouping and per-domain limits
    pub domain: String,

    /// Lower values are more important
    pub priority: u8,

    pub strategy: FetchStrategy,

    /// Editorial theme, e.g. "politics" or "technology"
    pub theme: String,

    pub category: Option<String>,

    pub description: Option<String>,
}

impl FeedDescriptor {
    /// Creates a descriptor with default priority, strategy and no metadata
    pub fn new(url: impl Into<String>, domain: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            domain: domain.into(),
            priority: 2,
            strategy: FetchStrategy::FullArchive,
            theme: theme.into(),
            category: None,
            description: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}
