use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock source for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A wall time pinned to a Tokio instant. Wall time advances exactly as the
/// Tokio clock does, so under `tokio::time::pause` the scheduler sees days go
/// by without waiting for them.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    wall: DateTime<Utc>,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            anchor: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.anchor);
        self.wall + chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero())
    }
}
