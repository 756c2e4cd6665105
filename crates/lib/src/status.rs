//! Open/closed state records.
//!
//! An item's state is kept beside its position rather than folded into it:
//! closing or reopening an item never touches its key. A closed record
//! carries who closed it and when, so "is it closed?" and "by whom?" are
//! answered by one value instead of a flag plus loose columns.
//!
//! Time comes from a [`Clock`] so tests can pin it.
//!
//! ```
//! use ordinal::status::{Status, SystemClock};
//!
//! let mut status = Status::default();
//! assert!(!status.is_closed());
//!
//! status.close("robin", &SystemClock);
//! assert_eq!(status.closed_by(), Some("robin"));
//!
//! status.reopen();
//! assert_eq!(status, Status::Open);
//! ```

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;

/// A source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    /// Creates a clock reading `millis` since the Unix epoch.
    pub fn new(millis: i64) -> Self {
        Self {
            now: Mutex::new(DateTime::from_timestamp_millis(millis).unwrap_or_default()),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, ms: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::milliseconds(ms);
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::new(1_704_067_200_000)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether an item is open or closed, and by whom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Closed {
        by: String,
        at: DateTime<Utc>,
    },
}

impl Status {
    /// Closes the item. Closing a closed item records the new closer.
    pub fn close(&mut self, by: impl Into<String>, clock: &dyn Clock) {
        *self = Status::Closed {
            by: by.into(),
            at: clock.now(),
        };
    }

    pub fn reopen(&mut self) {
        *self = Status::Open;
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Status::Closed { .. })
    }

    pub fn closed_by(&self) -> Option<&str> {
        match self {
            Status::Closed { by, .. } => Some(by),
            Status::Open => None,
        }
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Status::Closed { at, .. } => Some(*at),
            Status::Open => None,
        }
    }
}
