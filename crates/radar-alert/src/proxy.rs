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

//! Fetch delegation to a privileged proxy.
//!
//! Some hosts cannot reach the weather APIs directly and instead hand each
//! request to a separate process. [`ProxyTransport`] implements
//! [`Transport`] by sending a [`ProxyRequest`] and parking the caller until
//! the matching [`ProxyResponse`] is fed back through
//! [`ProxyTransport::resolve`]. Responses may arrive in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::cache::{FetchResult, Transport};

/// Outbound message `{id, url, ttl}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub id: u64,
    pub url: String,
    #[serde(rename = "ttl")]
    pub ttl_ms: u64,
}

/// Inbound message `{id, result}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub id: u64,
    pub result: FetchResult,
}

/// Transport that delegates every request to an external proxy.
pub struct ProxyTransport {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<FetchResult>>>,
    outbound: mpsc::UnboundedSender<ProxyRequest>,
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ProxyTransport {
    /// Create the transport and the receiver the proxy reads requests from.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ProxyRequest>) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            outbound,
        });
        (transport, requests)
    }

    /// Deliver a response to the waiter that issued `response.id`.
    ///
    /// Returns `false` when no waiter is registered for the id (unknown, or
    /// already resolved).
    pub fn resolve(&self, response: ProxyResponse) -> bool {
        let waiter = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&response.id));

        match waiter {
            Some(tx) => {
                if tx.send(response.result).is_err() {
                    debug!("Proxy waiter {} went away before its response", response.id);
                }
                true
            }
            None => {
                warn!("Dropping proxy response for unknown request id {}", response.id);
                false
            }
        }
    }

    /// Feed responses from a channel until it closes.
    pub async fn pump(self: Arc<Self>, mut responses: mpsc::UnboundedReceiver<ProxyResponse>) {
        while let Some(response) = responses.recv().await {
            self.resolve(response);
        }
        debug!("Proxy response channel closed");
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn fetch(&self, url: &str, ttl: Duration) -> FetchResult {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }

        let request = ProxyRequest {
            id,
            url: url.to_string(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        };

        if self.outbound.send(request).is_err() {
            self.forget(id);
            return FetchResult::failure(0, "proxy is not running");
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => FetchResult::failure(0, format!("proxy dropped request {id}")),
        }
    }
}

impl Drop for ProxyTransport {
    fn drop(&mut self) {
        if let Ok(pending) = self.pending.lock() {
            for id in pending.keys() {
                warn!("Proxy request {} never resolved", id);
            }
        }
    }
}
