//! Event stream settings (`[events]` in the config file)

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::Scope;
use crate::{Error, Result};

/// Settings for the live event subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Subscribe when the node starts
    pub enabled: bool,
    /// Server-side key filter sent with the subscription
    pub patterns: Vec<String>,
    pub scope: Option<Scope>,
    pub scope_id: Option<String>,
    pub backoff_floor_ms: u64,
    pub backoff_ceiling_ms: u64,
    /// Upper bound for a single handler run
    pub handler_timeout_ms: u64,
    /// Extra headers; only `authorization`, `cookie` and `x-*` are sent
    pub headers: BTreeMap<String, String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            patterns: Vec::new(),
            scope: None,
            scope_id: None,
            backoff_floor_ms: 1_000,
            backoff_ceiling_ms: 30_000,
            handler_timeout_ms: 10_000,
            headers: BTreeMap::new(),
        }
    }
}

impl EventsConfig {
    #[must_use]
    pub const fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.backoff_floor_ms)
    }

    #[must_use]
    pub const fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }

    #[must_use]
    pub const fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Check timing bounds and patterns
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for zero timings, a ceiling below the floor, or an empty pattern
    pub fn validate(&self) -> Result<()> {
        if self.backoff_floor_ms == 0 || self.handler_timeout_ms == 0 {
            return Err(Error::Config(
                "events backoff floor and handler timeout must be positive".to_string(),
            ));
        }
        if self.backoff_ceiling_ms < self.backoff_floor_ms {
            return Err(Error::Config(format!(
                "events backoff ceiling ({}ms) is below the floor ({}ms)",
                self.backoff_ceiling_ms, self.backoff_floor_ms
            )));
        }
        if self.patterns.iter().any(String::is_empty) {
            return Err(Error::Config("events patterns must not be empty".to_string()));
        }
        Ok(())
    }
}
