//! Per-domain concurrency limiter
//!
//! One semaphore per domain, created the first time the domain is seen.
//! Each domain also gets a throttle so that consecutive requests to the same
//! host are spaced at least `delay` apart.

use crate::throttle::DispatchThrottle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
struct DomainGate {
    slots: Arc<Semaphore>,
    pacing: DispatchThrottle,
}

/// Lazily created per-domain semaphores sharing one cap
#[derive(Debug)]
pub struct DomainLimiter {
    per_domain: usize,
    delay: Duration,
    gates: Mutex<HashMap<String, Arc<DomainGate>>>,
}

impl DomainLimiter {
    /// Creates a limiter allowing `per_domain` concurrent holders per domain
    pub fn new(per_domain: usize) -> Self {
        Self::with_delay(per_domain, Duration::ZERO)
    }

    /// Like [`DomainLimiter::new`], also spacing requests to one domain by `delay`
    pub fn with_delay(per_domain: usize, delay: Duration) -> Self {
        Self {
            per_domain: per_domain.max(1),
            delay,
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn gate(&self, domain: &str) -> Arc<DomainGate> {
        let mut map = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(domain.to_string())
            .or_insert_with(|| {
                Arc::new(DomainGate {
                    slots: Arc::new(Semaphore::new(self.per_domain)),
                    pacing: DispatchThrottle::new(self.delay),
                })
            })
            .clone()
    }

    /// Waits for a slot on `domain`, then for the domain's request spacing
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn acquire(&self, domain: &str) -> Result<OwnedSemaphorePermit, AcquireError> {
        let gate = self.gate(domain);
        let permit = Arc::clone(&gate.slots).acquire_owned().await?;
        gate.pacing.wait().await;
        Ok(permit)
    }

    /// Number of slots currently held for `domain`
    pub fn in_use(&self, domain: &str) -> usize {
        let map = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(domain)
            .map(|g| self.per_domain - g.slots.available_permits())
            .unwrap_or(0)
    }

    /// Number of domains seen so far
    pub fn domain_count(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
