//! Past change events from the control plane

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::types::{ChangeEvent, Scope};
use crate::pool::ConnectionPool;
use crate::{Error, Result};

const HISTORY_PATH: &str = "/api/v1/memory/events/history";

/// Filter for a history request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub patterns: Vec<String>,
    pub scope: Option<Scope>,
    pub scope_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.patterns.is_empty() {
            params.push(("patterns", self.patterns.join(",")));
        }
        if let Some(scope) = self.scope {
            params.push(("scope", scope.to_string()));
        }
        if let Some(scope_id) = &self.scope_id {
            params.push(("scope_id", scope_id.clone()));
        }
        if let Some(since) = self.since {
            params.push(("since", since.to_rfc3339()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

/// Servers answer with either a bare array or `{"events": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    List(Vec<ChangeEvent>),
    Wrapped { events: Vec<ChangeEvent> },
}

pub(crate) async fn fetch_history(
    pool: &ConnectionPool,
    base_url: &str,
    headers: &[(String, String)],
    query: &HistoryQuery,
) -> Result<Vec<ChangeEvent>> {
    let mut request = pool
        .client()
        .get(format!("{base_url}{HISTORY_PATH}"))
        .query(&query.params());
    for (name, value) in headers {
        request = request.header(name, value);
    }

    let response = pool.execute(request).await?;
    if !response.is_success() {
        return Err(Error::Transport(format!(
            "event history returned {}: {}",
            response.status,
            response.text()
        )));
    }
    let events = match response.json::<HistoryResponse>()? {
        HistoryResponse::List(events) | HistoryResponse::Wrapped { events } => events,
    };
    Ok(events)
}
