/// Per-domain outcome tallies
///
/// One `DomainState` is kept for every domain that produced at least one
/// terminal fetch result during the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainState {
    /// Feeds from this domain that reached a terminal outcome
    pub processed: u64,

    /// Items extracted from this domain's feeds
    pub items: u64,

    /// Feeds from this domain that failed
    pub errors: u64,
}

impl DomainState {
    /// Creates an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful feed and the items it produced
    pub fn record_success(&mut self, items: u64) {
        self.processed += 1;
        self.items += items;
    }

    /// Records a failed feed
    pub fn record_failure(&mut self) {
        self.processed += 1;
        self.errors += 1;
    }

    /// Number of feeds from this domain that succeeded
    pub fn succeeded(&self) -> u64 {
        self.processed - self.errors
    }

    /// A domain counts as covered once any of its feeds succeeded
    pub fn is_covered(&self) -> bool {
        self.succeeded() > 0
    }
}
