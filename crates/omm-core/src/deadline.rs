//! Run-wide wall-clock budget.

use tokio::time::{Duration, Instant};

/// Absolute deadline fixed once at run start.
///
/// Every unit of work (game, tournament, page, batch) asks [`DeadlineClock::exceeded`]
/// before it begins. The safety margin keeps the last in-flight request inside
/// the budget; nothing here cancels a call that has already been issued.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineClock {
    started_at: Instant,
    deadline: Instant,
    safety_margin: Duration,
}

impl DeadlineClock {
    pub fn start(budget: Duration, safety_margin: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            started_at,
            deadline: started_at + budget,
            safety_margin,
        }
    }

    /// `now + safety_margin > deadline`
    pub fn exceeded(&self) -> bool {
        Instant::now() + self.safety_margin > self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }
}
