//! Feed ordering strategies
//!
//! All orderings are pure functions over the catalog: they never do I/O and
//! return the same sequence for the same input (except `shuffle`, which is
//! driven by the supplied RNG).

use crate::model::FeedDescriptor;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, info};

/// Selectable ordering for the fetch plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingStrategy {
    /// One feed per domain per cycle, largest domains first
    #[default]
    RoundRobin,
    /// Stable sort by priority, lower values first
    Priority,
    /// Round-robin within each priority level, levels ascending
    Hybrid,
    /// Random permutation
    Shuffle,
}

impl fmt::Display for OrderingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RoundRobin => "round-robin",
            Self::Priority => "priority",
            Self::Hybrid => "hybrid",
            Self::Shuffle => "shuffle",
        };
        write!(f, "{}", s)
    }
}

/// Orders the catalog with the given strategy
pub fn order_feeds(strategy: OrderingStrategy, feeds: &[FeedDescriptor]) -> Vec<FeedDescriptor> {
    let ordered = match strategy {
        OrderingStrategy::RoundRobin => round_robin_by_domain(feeds),
        OrderingStrategy::Priority => priority_sort(feeds),
        OrderingStrategy::Hybrid => hybrid_priority_round_robin(feeds),
        OrderingStrategy::Shuffle => shuffle(feeds, &mut rand::rng()),
    };
    info!(
        "Ordered {} feeds across {} domains ({})",
        ordered.len(),
        count_domains(feeds),
        strategy
    );
    ordered
}

/// Groups feeds by domain, keeping each domain's relative order.
///
/// Groups are returned in order of first appearance.
fn group_by_domain(feeds: &[FeedDescriptor]) -> Vec<(String, Vec<FeedDescriptor>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<FeedDescriptor>)> = Vec::new();

    for feed in feeds {
        match index.get(feed.domain.as_str()) {
            Some(&i) => groups[i].1.push(feed.clone()),
            None => {
                index.insert(feed.domain.as_str(), groups.len());
                groups.push((feed.domain.clone(), vec![feed.clone()]));
            }
        }
    }
    groups
}

fn count_domains(feeds: &[FeedDescriptor]) -> usize {
    group_by_domain(feeds).len()
}

/// Interleaves feeds by domain so every domain appears early.
///
/// Each cycle emits one feed from every domain that still has feeds left.
/// Within a cycle, domains with more remaining feeds go first; ties are broken
/// alphabetically. For D domains and N >= D feeds, the first D feeds cover all
/// D domains exactly once.
///
/// # Example
///
/// ```
/// use news_harvest::fetch::round_robin_by_domain;
/// use news_harvest::FeedDescriptor;
///
/// let feeds = vec![
///     FeedDescriptor::new("https://a.de/1", "a.de", "news"),
///     FeedDescriptor::new("https://a.de/2", "a.de", "news"),
///     FeedDescriptor::new("https://b.de/1", "b.de", "news"),
/// ];
/// let ordered = round_robin_by_domain(&feeds);
/// let urls: Vec<_> = ordered.iter().map(|f| f.url.as_str()).collect();
/// assert_eq!(urls, ["https://a.de/1", "https://b.de/1", "https://a.de/2"]);
/// ```
pub fn round_robin_by_domain(feeds: &[FeedDescriptor]) -> Vec<FeedDescriptor> {
    let mut groups: Vec<(String, VecDeque<FeedDescriptor>)> = group_by_domain(feeds)
        .into_iter()
        .map(|(domain, feeds)| (domain, feeds.into()))
        .collect();

    // Every non-empty group shrinks by one per cycle, so the visitation order
    // sorted once up front stays sorted by remaining size.
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    for (domain, queue) in &groups {
        debug!("  {}: {} feeds", domain, queue.len());
    }

    let mut ordered = Vec::with_capacity(feeds.len());
    while ordered.len() < feeds.len() {
        for (_, queue) in groups.iter_mut() {
            if let Some(feed) = queue.pop_front() {
                ordered.push(feed);
            }
        }
    }
    ordered
}

/// Stable sort by priority, lower values first
pub fn priority_sort(feeds: &[FeedDescriptor]) -> Vec<FeedDescriptor> {
    let mut sorted = feeds.to_vec();
    sorted.sort_by_key(|f| f.priority);
    sorted
}

/// Round-robin by domain within each priority level, levels ascending
pub fn hybrid_priority_round_robin(feeds: &[FeedDescriptor]) -> Vec<FeedDescriptor> {
    let mut levels: BTreeMap<u8, Vec<FeedDescriptor>> = BTreeMap::new();
    for feed in feeds {
        levels.entry(feed.priority).or_default().push(feed.clone());
    }

    levels
        .values()
        .flat_map(|level| round_robin_by_domain(level))
        .collect()
}

/// Random permutation driven by `rng`
pub fn shuffle<R: Rng + ?Sized>(feeds: &[FeedDescriptor], rng: &mut R) -> Vec<FeedDescriptor> {
    let mut shuffled = feeds.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

/// Takes at most `per_domain` feeds from each domain.
///
/// Domains appear in order of first appearance; each domain keeps its
/// relative order.
pub fn stratified_sample(feeds: &[FeedDescriptor], per_domain: usize) -> Vec<FeedDescriptor> {
    group_by_domain(feeds)
        .into_iter()
        .flat_map(|(_, group)| group.into_iter().take(per_domain))
        .collect()
}
