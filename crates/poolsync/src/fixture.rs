//! JSON fixtures standing in for a pool backend.
//!
//! A pool fixture is served through `PageSource`: each range is answered
//! with the cumulative window from the head of the (filtered) pool. An
//! event log is a list of push events published in file order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use poolsync_core::{
    FilterQuery, Page, PageSource, PushEvent, RequestPayload, Resource, ResourceId, SyncError,
};

use crate::error::CliError;

// ── Resource ─────────────────────────────────────────────────────────

/// One pool entry. Fields beyond `id`, `name` and `state` are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureResource {
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource for FixtureResource {
    fn resource_id(&self) -> ResourceId {
        self.id.clone()
    }
}

impl FixtureResource {
    fn field(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "name" => Some(self.name.clone()),
            "state" => Some(self.state.clone()),
            other => self.extra.get(other).map(|v| match v {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            }),
        }
    }

    fn matches(&self, filter: Option<&FilterQuery>) -> bool {
        filter.is_none_or(|f| {
            f.params
                .iter()
                .all(|(k, v)| self.field(k).as_deref() == Some(v.as_str()))
        })
    }
}

// ── Pool ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PoolFile {
    Items(Vec<FixtureResource>),
    Pool {
        #[serde(default)]
        kind: Option<String>,
        items: Vec<FixtureResource>,
        #[serde(default)]
        latency_ms: u64,
    },
}

/// A fixture pool served page by page.
#[derive(Debug, Clone)]
pub struct FixturePool {
    pub kind: Option<String>,
    items: Arc<Vec<FixtureResource>>,
    latency: Duration,
}

impl FixturePool {
    pub fn new(items: Vec<FixtureResource>) -> Self {
        Self {
            kind: None,
            items: Arc::new(items),
            latency: Duration::ZERO,
        }
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let pool = match read_json::<PoolFile>(path)? {
            PoolFile::Items(items) => Self::new(items),
            PoolFile::Pool {
                kind,
                items,
                latency_ms,
            } => Self {
                kind,
                items: Arc::new(items),
                latency: Duration::from_millis(latency_ms),
            },
        };
        tracing::debug!(path = %path.display(), items = pool.len(), "pool fixture loaded");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Answer one pool request: filter, then take the window up to the
    /// range's extent.
    fn answer(&self, payload: &RequestPayload) -> Option<Page<FixtureResource>> {
        let range = payload.range()?;
        let items = self
            .items
            .iter()
            .filter(|item| item.matches(payload.filter()))
            .take(range.extent())
            .cloned()
            .collect();
        Some(Page::new(range, items))
    }
}

impl PageSource<Page<FixtureResource>> for FixturePool {
    fn fetch(
        &self,
        payload: RequestPayload,
    ) -> BoxFuture<'static, Result<Option<Page<FixtureResource>>, SyncError>> {
        let pool = self.clone();
        Box::pin(async move {
            if !pool.latency.is_zero() {
                tokio::time::sleep(pool.latency).await;
            }
            // A payload without a range is a malformed request for a pool.
            Ok(pool.answer(&payload))
        })
    }
}

// ── Event log ────────────────────────────────────────────────────────

pub fn load_events(path: &Path) -> Result<Vec<PushEvent<FixtureResource>>, CliError> {
    let events: Vec<PushEvent<FixtureResource>> = read_json(path)?;
    tracing::debug!(path = %path.display(), events = events.len(), "event log loaded");
    Ok(events)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::FixtureRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::FixtureFormat {
        path: path.to_path_buf(),
        source,
    })
}
