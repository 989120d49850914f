//! Event handlers and the filters that select events for them

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use super::types::{ChangeEvent, Scope};
use crate::{Error, Result};

/// Type-erased async event handler
pub type EventHandler = Arc<dyn Fn(ChangeEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as an [`EventHandler`]
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Key pattern where `*` matches any run of characters
///
/// `customer_*` matches `customer_123`; `order.*.status` matches `order.45.status`.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    raw: String,
    regex: Regex,
}

impl KeyPattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the pattern is empty
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::Config("event key pattern must not be empty".to_string()));
        }
        let body = raw
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| Error::Config(format!("bad event key pattern {raw:?}: {e}")))?;
        Ok(Self {
            raw: raw.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

/// Which events a handler wants
///
/// No patterns means every key. A scope id only applies together with a scope.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    patterns: Vec<KeyPattern>,
    scope: Option<Scope>,
    scope_id: Option<String>,
}

impl EventFilter {
    /// Match every event
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match keys against any of `patterns`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a pattern is empty
    pub fn patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| KeyPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            patterns,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn in_scope(mut self, scope: Scope, scope_id: Option<String>) -> Self {
        self.scope = Some(scope);
        self.scope_id = scope_id;
        self
    }

    #[must_use]
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(scope) = self.scope {
            if event.scope != scope {
                return false;
            }
            if self.scope_id.is_some() && event.scope_id != self.scope_id {
                return false;
            }
        }
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(&event.key))
    }
}

/// Identifies a registered handler for [`super::EventClient::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

pub(crate) struct Subscription {
    pub id: SubscriptionId,
    pub filter: EventFilter,
    pub handler: EventHandler,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcards() {
        assert!(KeyPattern::new("customer_*").unwrap().matches("customer_123"));
        assert!(KeyPattern::new("order.*.status").unwrap().matches("order.45.status"));
        assert!(!KeyPattern::new("user_*").unwrap().matches("device_1"));
        assert!(!KeyPattern::new("cart.total").unwrap().matches("cartXtotal"));
        assert!(KeyPattern::new("*").unwrap().matches(""));
        assert!(KeyPattern::new("").is_err());
    }

    #[test]
    fn scoped_filter() {
        let filter = EventFilter::patterns(["cart.*"])
            .unwrap()
            .in_scope(Scope::Session, Some("s1".to_string()));

        let hit = ChangeEvent::new("cart.total", json!(42)).scoped(Scope::Session, "s1");
        let other_session = ChangeEvent::new("cart.total", json!(42)).scoped(Scope::Session, "s2");
        let other_key = ChangeEvent::new("user.name", json!("a")).scoped(Scope::Session, "s1");

        assert!(filter.matches(&hit));
        assert!(!filter.matches(&other_session));
        assert!(!filter.matches(&other_key));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let event = ChangeEvent::new("anything", json!(null)).scoped(Scope::Workflow, "wf");
        assert!(EventFilter::all().matches(&event));
        assert!(
            EventFilter::all()
                .in_scope(Scope::Workflow, None)
                .matches(&event)
        );
    }
}
