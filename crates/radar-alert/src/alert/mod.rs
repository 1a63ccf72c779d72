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

//! Alert polling.
//!
//! The monitor walks regions in configured order and, for each region, the
//! providers in configured order. The first event whose type passes the
//! filter wins and ends the scan. Provider errors are logged and treated as
//! "no alert from this provider for this region".

pub mod provider;

pub use provider::{AlertProvider, ProviderEvent};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::cache::FetchCache;
use crate::region::{AlertEvent, Region};

/// Configuration for the alert monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub regions: Vec<Region>,
    pub providers: Vec<AlertProvider>,
    /// Event types that trigger the overlay. Empty matches every event.
    pub alert_types: Vec<String>,
    /// Cache TTL for provider queries.
    pub cache_ttl: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            providers: vec![AlertProvider::nws()],
            alert_types: Vec::new(),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Result of one poll. Replaces the previous outcome wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOutcome {
    pub active: bool,
    pub event: Option<AlertEvent>,
}

impl PollOutcome {
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn active(event: AlertEvent) -> Self {
        Self {
            active: true,
            event: Some(event),
        }
    }
}

/// Polls the configured regions against the configured providers.
#[derive(Debug, Clone)]
pub struct AlertMonitor {
    cache: FetchCache,
    config: Arc<MonitorConfig>,
    filter: Arc<HashSet<String>>,
}

impl AlertMonitor {
    pub fn new(cache: FetchCache, config: MonitorConfig) -> Self {
        let filter = config
            .alert_types
            .iter()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            cache,
            config: Arc::new(config),
            filter: Arc::new(filter),
        }
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.config.regions
    }

    /// Whether `event_type` passes the alert-type filter.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        self.filter.is_empty() || self.filter.contains(&normalize(event_type))
    }

    pub async fn poll(&self) -> PollOutcome {
        for region in &self.config.regions {
            for provider in &self.config.providers {
                if let Some(event) = self.query(region, provider).await {
                    info!(
                        "Active alert '{}' for region '{}' via {}",
                        event.event_type,
                        region.name,
                        provider.name()
                    );
                    return PollOutcome::active(event);
                }
            }
        }

        debug!("No active alerts across {} regions", self.config.regions.len());
        PollOutcome::inactive()
    }

    async fn query(&self, region: &Region, provider: &AlertProvider) -> Option<AlertEvent> {
        let Some(url) = provider.resolve_query_url(region) else {
            warn!(
                "Region '{}' has no alert identifier for {}",
                region.name,
                provider.name()
            );
            return None;
        };

        let result = self.cache.fetch(&url, self.config.cache_ttl).await;
        if !result.ok {
            warn!(
                "Alert query for region '{}' via {} failed: {}",
                region.name,
                provider.name(),
                result.error.as_deref().unwrap_or("unknown error")
            );
            return None;
        }

        let events = match provider.extract_events(&url, result.body.as_deref().unwrap_or_default()) {
            Ok(events) => events,
            Err(e) => {
                warn!("Alert query for region '{}' unusable: {}", region.name, e);
                return None;
            }
        };

        events
            .into_iter()
            .find(|event| self.matches(&event.event_type))
            .map(|event| AlertEvent {
                event_type: event.event_type,
                headline: event.headline,
                description: event.description,
                source_region: region.clone(),
            })
    }
}

fn normalize(event_type: &str) -> String {
    event_type.trim().to_lowercase()
}
