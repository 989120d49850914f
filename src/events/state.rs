//! Reconnect state machine pieces

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Default first reconnect delay
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Default reconnect delay cap
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(30);

/// Lifecycle of the event connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    BackoffWait,
    /// Terminal; set by `stop`
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::BackoffWait => "backoff_wait",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Doubling reconnect delay, capped at the ceiling and reset on a good open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_FLOOR, DEFAULT_BACKOFF_CEILING)
    }
}

impl Backoff {
    /// A ceiling below the floor is raised to the floor
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
            current: floor,
        }
    }

    /// Delay to wait now; advances the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Delay the next failure will wait, without advancing
    #[must_use]
    pub const fn peek(&self) -> Duration {
        self.current
    }

    pub const fn reset(&mut self) {
        self.current = self.floor;
    }

    #[must_use]
    pub const fn floor(&self) -> Duration {
        self.floor
    }

    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        self.ceiling
    }
}
