// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TTL cache in front of every outbound request.
//!
//! Upstream weather APIs are rate limited and occasionally flaky, so every
//! request made by the alert monitor and the radar animator goes through a
//! [`FetchCache`]. Both successes and failures are cached under the caller's
//! TTL: a failing URL is not retried faster than its TTL.
//!
//! Two concurrent callers that both find a stale entry each issue their own
//! upstream request; the later completion replaces the earlier entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::FetchError;

/// Outcome of a single request. Also the `result` object of the proxy
/// delegation protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub ok: bool,
    pub status: u16,
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResult {
    pub fn success(status: u16, body: impl Into<String>) -> Self {
        Self {
            ok: true,
            status,
            body: Some(body.into()),
            error: None,
        }
    }

    /// A failed request. `status` is 0 when no HTTP response was received.
    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            status,
            body: None,
            error: Some(error.into()),
        }
    }

    /// Parse the body as JSON, mapping failures into [`FetchError`].
    pub fn json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        if !self.ok {
            return Err(FetchError::Failed {
                url: url.to_string(),
                status: self.status,
                reason: self.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let body = self.body.as_deref().ok_or_else(|| FetchError::Malformed {
            url: url.to_string(),
            reason: "empty body".to_string(),
        })?;

        serde_json::from_str(body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// The network capability used by the cache.
///
/// Implementations never fail: every error is reported as a
/// [`FetchResult`] with `ok == false`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str, ttl: Duration) -> FetchResult;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    timestamp: Instant,
    ttl: Duration,
    result: FetchResult,
}

impl CacheEntry {
    fn is_stale(&self, now: Instant) -> bool {
        now.duration_since(self.timestamp) >= self.ttl
    }
}

/// Request cache keyed by URL.
#[derive(Clone)]
pub struct FetchCache {
    transport: Arc<dyn Transport>,
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    default_ttl: Duration,
}

impl std::fmt::Debug for FetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCache")
            .field("default_ttl", &self.default_ttl)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl FetchCache {
    pub fn new(transport: Arc<dyn Transport>, default_ttl: Duration) -> Self {
        Self {
            transport,
            entries: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached outcome for `url` if still fresh, otherwise fetch it
    /// and cache the outcome (success or failure) for `ttl`.
    pub async fn fetch(&self, url: &str, ttl: Duration) -> FetchResult {
        if let Some(hit) = self.lookup(url) {
            debug!("Cache hit for {}", url);
            return hit;
        }

        let result = self.transport.fetch(url, ttl).await;
        if !result.ok {
            warn!(
                "Fetch failed for {} (status {}): {}",
                url,
                result.status,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                url.to_string(),
                CacheEntry {
                    timestamp: Instant::now(),
                    ttl,
                    result: result.clone(),
                },
            );
        }

        result
    }

    /// Fetch with the cache's default TTL.
    pub async fn fetch_default(&self, url: &str) -> FetchResult {
        self.fetch(url, self.default_ttl).await
    }

    /// Fetch and parse the body as JSON.
    pub async fn fetch_json(&self, url: &str, ttl: Duration) -> Result<serde_json::Value, FetchError> {
        self.fetch(url, ttl).await.json(url)
    }

    fn lookup(&self, url: &str) -> Option<FetchResult> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(url)
            .filter(|entry| !entry.is_stale(Instant::now()))
            .map(|entry| entry.result.clone())
    }

    /// Drop stale entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| !entry.is_stale(now));
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
