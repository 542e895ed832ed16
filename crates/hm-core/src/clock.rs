//! Time sources.
//!
//! The engine reads wall-clock time for record timestamps and a monotonic
//! instant for durations. Both come from a [`Clock`] so tests can advance time
//! explicitly.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Current monotonic instant.
    fn instant(&self) -> Instant;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Wall time and the monotonic instant advance together.
#[derive(Debug)]
pub struct ManualClock {
    wall_origin: DateTime<Utc>,
    instant_origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(wall_origin: DateTime<Utc>) -> Self {
        Self {
            wall_origin,
            instant_origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }

    /// Moves the clock to `offset` past its origin. Never moves backwards.
    pub fn set_elapsed(&self, offset: Duration) {
        let mut current = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        if offset > *current {
            *current = offset;
        }
    }

    /// Time elapsed since the origin.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let offset =
            chrono::Duration::from_std(self.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + offset
    }

    fn instant(&self) -> Instant {
        self.instant_origin + self.elapsed()
    }
}
