//! Reserve/settle budget tracker
//!
//! Amounts are kept in integer micro-dollars so that repeated small charges
//! add up exactly. Every check and mutation happens under one lock; the
//! committed amount (`spent + reserved`) never exceeds the ceiling through a
//! reservation.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::warn;

const MICROS_PER_USD: f64 = 1_000_000.0;

/// Converts dollars to micro-dollars, rounding to the nearest micro-dollar
fn to_micros(usd: f64) -> u64 {
    if usd.is_finite() && usd > 0.0 {
        (usd * MICROS_PER_USD).round() as u64
    } else {
        0
    }
}

fn to_usd(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_USD
}

/// Returned when a reservation would push the committed amount past the ceiling
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("budget exceeded: requested ${requested_usd:.4}, ${remaining_usd:.4} of ${ceiling_usd:.2} remaining")]
pub struct BudgetExceeded {
    pub requested_usd: f64,
    pub remaining_usd: f64,
    pub ceiling_usd: f64,
}

/// Budget held for one job from dispatch until it settles or is released
///
/// Not `Clone`: a job is charged exactly once.
#[must_use = "a reservation must be settled or released"]
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    micros: u64,
}

impl Reservation {
    pub fn amount_usd(&self) -> f64 {
        to_usd(self.micros)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    spent: u64,
    reserved: u64,
    /// Set by the first refused reservation or an overshooting settlement
    exhausted: bool,
}

/// Tracks spend against a ceiling for one enrichment run
#[derive(Debug)]
pub struct BudgetTracker {
    ceiling: u64,
    ledger: Mutex<Ledger>,
}

impl BudgetTracker {
    /// Creates a tracker with the given ceiling in dollars
    pub fn new(ceiling_usd: f64) -> Self {
        Self {
            ceiling: to_micros(ceiling_usd),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves `estimate_usd` if it fits under the ceiling
    ///
    /// Once a reservation has been refused every later one is refused too, so
    /// a cheaper item further down the queue cannot jump ahead.
    ///
    /// # Arguments
    ///
    /// * `estimate_usd` - Estimated cost of the job
    ///
    /// # Returns
    ///
    /// * `Ok(Reservation)` - The amount is now committed
    /// * `Err(BudgetExceeded)` - Nothing was committed
    pub fn try_reserve(&self, estimate_usd: f64) -> Result<Reservation, BudgetExceeded> {
        let micros = to_micros(estimate_usd);
        let mut ledger = self.lock();
        let committed = ledger.spent.saturating_add(ledger.reserved);

        // An unbounded estimate can never fit
        if !estimate_usd.is_finite()
            || ledger.exhausted
            || committed.saturating_add(micros) > self.ceiling
        {
            ledger.exhausted = true;
            return Err(BudgetExceeded {
                requested_usd: if estimate_usd.is_finite() {
                    to_usd(micros)
                } else {
                    estimate_usd
                },
                remaining_usd: to_usd(self.ceiling.saturating_sub(committed)),
                ceiling_usd: to_usd(self.ceiling),
            });
        }

        ledger.reserved += micros;
        Ok(Reservation { micros })
    }

    /// Replaces a reservation with the actual cost of the finished job
    ///
    /// An actual cost above the estimate is recorded as-is; if that takes the
    /// spend past the ceiling no further reservation is granted. A non-finite
    /// actual cost is charged as the whole remaining ceiling.
    pub fn settle(&self, reservation: Reservation, actual_usd: f64) {
        let mut ledger = self.lock();
        ledger.reserved = ledger.reserved.saturating_sub(reservation.micros);

        if !actual_usd.is_finite() {
            ledger.spent = ledger.spent.max(self.ceiling);
            ledger.exhausted = true;
            warn!(
                "Actual cost {} is not a number; charging the full ${:.2} ceiling",
                actual_usd,
                to_usd(self.ceiling)
            );
            return;
        }

        let actual = to_micros(actual_usd);
        ledger.spent = ledger.spent.saturating_add(actual);

        if ledger.spent.saturating_add(ledger.reserved) > self.ceiling {
            ledger.exhausted = true;
            warn!(
                "Actual cost ${:.4} exceeded the ${:.4} estimate; spend is now ${:.4} of ${:.2}",
                to_usd(actual),
                to_usd(reservation.micros),
                to_usd(ledger.spent),
                to_usd(self.ceiling)
            );
        }
    }

    /// Returns a reservation unused (terminal failure or cancellation)
    pub fn release(&self, reservation: Reservation) {
        let mut ledger = self.lock();
        ledger.reserved = ledger.reserved.saturating_sub(reservation.micros);
    }

    pub fn ceiling_usd(&self) -> f64 {
        to_usd(self.ceiling)
    }

    /// Settled spend so far
    pub fn spent_usd(&self) -> f64 {
        to_usd(self.lock().spent)
    }

    /// Amount held by jobs that have not settled yet
    pub fn reserved_usd(&self) -> f64 {
        to_usd(self.lock().reserved)
    }

    /// Headroom left for new reservations
    pub fn remaining_usd(&self) -> f64 {
        let ledger = self.lock();
        to_usd(
            self.ceiling
                .saturating_sub(ledger.spent.saturating_add(ledger.reserved)),
        )
    }

    /// True once a reservation has been refused or spend passed the ceiling
    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }
}

impl fmt::Display for BudgetTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ledger = self.lock();
        write!(
            f,
            "${:.4} spent, ${:.4} reserved of ${:.2}",
            to_usd(ledger.spent),
            to_usd(ledger.reserved),
            to_usd(self.ceiling)
        )
    }
}
