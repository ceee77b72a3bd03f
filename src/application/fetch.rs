//! Request-scoped data-fetch cache: the late-arrival collaborator.
//!
//! Components trigger data fetches while rendering; fetches still pending
//! when the body finishes streaming become late arrivals, pushed to the
//! client as they settle. The cache also dehydrates its state into the
//! bootstrap payload so the client starts from what the server already knew.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture, future::Shared};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("data fetch failed: {message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A fetch future that can be awaited from multiple places.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

/// A fetch that had not settled at enumeration time.
pub struct PendingFetch {
    /// Correlation identifier sent to the client alongside the payload.
    pub url: String,
    pub data: SharedFetch,
}

/// The data-fetch cache surface the engine consumes.
pub trait FetchCache: Send + Sync {
    /// Fetches not yet settled. Enumerated once, at body-render completion.
    fn pending_requests(&self) -> Vec<PendingFetch>;

    /// Total fetches tracked this request.
    fn all_requests(&self) -> usize;

    /// Fetches previously marked late.
    fn late_requests(&self) -> usize;

    /// Flag every currently-pending fetch as late, for accounting.
    fn mark_late_requests(&self);

    /// Serialize cache state for the client bootstrap payload.
    fn dehydrate(&self) -> Value;
}

struct FetchEntry {
    data: SharedFetch,
    late: AtomicBool,
}

/// Per-request [`FetchCache`] implementation. Fetches are tracked as shared
/// futures keyed by URL; a driver task polls each to completion so that
/// settlement is observable regardless of who else awaits it.
#[derive(Default)]
pub struct RequestFetchCache {
    entries: DashMap<String, FetchEntry>,
}

impl RequestFetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a fetch under `url` and return a handle components can await.
    pub fn track<F>(&self, url: impl Into<String>, future: F) -> SharedFetch
    where
        F: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let shared = future.boxed().shared();
        tokio::spawn(shared.clone().map(|_| ()));
        self.entries.insert(
            url.into(),
            FetchEntry {
                data: shared.clone(),
                late: AtomicBool::new(false),
            },
        );
        shared
    }
}

impl FetchCache for RequestFetchCache {
    fn pending_requests(&self) -> Vec<PendingFetch> {
        self.entries
            .iter()
            .filter(|entry| entry.value().data.peek().is_none())
            .map(|entry| PendingFetch {
                url: entry.key().clone(),
                data: entry.value().data.clone(),
            })
            .collect()
    }

    fn all_requests(&self) -> usize {
        self.entries.len()
    }

    fn late_requests(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().late.load(Ordering::Relaxed))
            .count()
    }

    fn mark_late_requests(&self) {
        for entry in self.entries.iter() {
            if entry.value().data.peek().is_none() {
                entry.value().late.store(true, Ordering::Relaxed);
            }
        }
    }

    fn dehydrate(&self) -> Value {
        let mut map = serde_json::Map::new();
        for entry in self.entries.iter() {
            let state = match entry.value().data.peek() {
                Some(Ok(value)) => serde_json::json!({
                    "state": "resolved",
                    "data": value,
                }),
                Some(Err(err)) => serde_json::json!({
                    "state": "failed",
                    "error": err.to_string(),
                }),
                None => serde_json::json!({ "state": "pending" }),
            };
            map.insert(entry.key().clone(), state);
        }
        Value::Object(map)
    }
}

/// A cache with nothing in it, for pages that fetch no data.
pub fn empty_cache() -> Arc<dyn FetchCache> {
    Arc::new(RequestFetchCache::new())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn resolved_fetches_leave_the_pending_set() {
        let cache = RequestFetchCache::new();
        cache.track("/api/fast", async { Ok(serde_json::json!({"ok": true})) });
        cache.track("/api/slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        });

        // Let the driver task settle the fast fetch.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let pending = cache.pending_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "/api/slow");
        assert_eq!(cache.all_requests(), 2);
    }

    #[tokio::test]
    async fn mark_late_requests_flags_only_pending() {
        let cache = RequestFetchCache::new();
        cache.track("/api/fast", async { Ok(Value::Null) });
        cache.track("/api/slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.mark_late_requests();
        assert_eq!(cache.late_requests(), 1);
    }

    #[tokio::test]
    async fn dehydrate_reports_settled_and_pending_state() {
        let cache = RequestFetchCache::new();
        cache.track("/api/user", async { Ok(serde_json::json!({"id": 7})) });
        cache.track("/api/broken", async { Err(FetchError::new("upstream 502")) });
        cache.track("/api/slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = cache.dehydrate();
        assert_eq!(state["/api/user"]["state"], "resolved");
        assert_eq!(state["/api/user"]["data"]["id"], 7);
        assert_eq!(state["/api/broken"]["state"], "failed");
        assert_eq!(state["/api/slow"]["state"], "pending");
    }
}
