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

//! Severe-weather alert watching with an animated radar overlay.
//!
//! The crate polls alert providers for a set of regions and, while an alert
//! is active, shows a radar loop for the alerting region on a host-provided
//! map surface. It is split into layers that can be used on their own:
//!
//! - **Fetch layer**: [`FetchCache`], a TTL cache over a pluggable [`Transport`],
//!   with [`ProxyTransport`] for delegating requests to another process
//! - **Alert layer**: [`AlertMonitor`] and the [`AlertProvider`] feed adapters
//! - **Radar layer**: [`RadarDisplay`], including the cross-fading [`RadarAnimator`],
//!   plus [`ViewportFitter`] for placing the map
//! - **Display layer**: [`DisplayOrchestrator`], the show / repeat / hide state machine
//!
//! Nothing is drawn by the crate itself. Hosts implement [`RenderTarget`],
//! [`TileLayer`] and [`AudioCue`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use radar_alert::{AlertProvider, MonitorConfig, Region, Watcher, WatcherConfig};
//! # use radar_alert::{AudioCue, RenderTarget, Transport};
//! # fn host() -> (Arc<dyn Transport>, Arc<dyn RenderTarget>, Arc<dyn AudioCue>) { unimplemented!() }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (transport, target, audio) = host();
//!     let watcher = Watcher::new(
//!         WatcherConfig {
//!             monitor: MonitorConfig {
//!                 regions: vec![Region::new("Oklahoma County", "OKC109").with_radar_site("KTLX")],
//!                 providers: vec![AlertProvider::nws()],
//!                 alert_types: vec!["Tornado Warning".to_string()],
//!                 ..Default::default()
//!             },
//!             ..Default::default()
//!         },
//!         transport,
//!         target,
//!         audio,
//!     );
//!     watcher.start();
//!
//!     let mut events = watcher.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

pub mod alert;
pub mod cache;
pub mod display;
pub mod error;
pub mod proxy;
pub mod radar;
pub mod region;
pub mod render;
pub mod viewport;

mod timer;

#[cfg(test)]
mod test_support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

pub use alert::{AlertMonitor, AlertProvider, MonitorConfig, PollOutcome, ProviderEvent};
pub use cache::{FetchCache, FetchResult, Transport};
pub use display::{AudioCue, DisplayConfig, DisplayEvent, DisplayOrchestrator, DisplaySnapshot, DisplayState};
pub use error::{AudioError, ConfigError, FetchError};
pub use proxy::{ProxyRequest, ProxyResponse, ProxyTransport};
pub use radar::{RadarAnimator, RadarConfig, RadarDisplay, RadarProviderKind, TileParams};
pub use region::{AlertEvent, Region};
pub use render::{Banner, LoadSignal, RenderTarget, TileLayer};
pub use viewport::{BoundingBox, Placement, ViewportFitter};

use timer::TimerHandle;

/// Configuration for the full-stack watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub monitor: MonitorConfig,
    pub display: DisplayConfig,
    pub radar: RadarConfig,
    pub viewport: ViewportFitter,
    /// Time between alert polls. The first poll runs immediately.
    pub poll_interval: Duration,
    /// TTL for cache lookups that do not name their own.
    pub cache_ttl: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            display: DisplayConfig::default(),
            radar: RadarConfig::default(),
            viewport: ViewportFitter::default(),
            poll_interval: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Wires the cache, alert monitor and display orchestrator together and
/// runs the poll loop.
///
/// Polls are serialized: a slow poll delays the next one instead of
/// overlapping it.
pub struct Watcher {
    cache: FetchCache,
    monitor: AlertMonitor,
    display: DisplayOrchestrator,
    poll_interval: Duration,
    poller: Mutex<Option<TimerHandle>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("poll_interval", &self.poll_interval)
            .field("display", &self.display)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    #[must_use]
    pub fn new(
        config: WatcherConfig,
        transport: Arc<dyn Transport>,
        target: Arc<dyn RenderTarget>,
        audio: Arc<dyn AudioCue>,
    ) -> Self {
        let cache = FetchCache::new(transport, config.cache_ttl);
        let monitor = AlertMonitor::new(cache.clone(), config.monitor);
        let radar = RadarDisplay::new(cache.clone(), config.radar, config.viewport);
        let display = DisplayOrchestrator::new(config.display, target, radar, config.viewport, audio);

        Self {
            cache,
            monitor,
            display,
            poll_interval: config.poll_interval,
            poller: Mutex::new(None),
        }
    }

    /// Start polling. Must be called from within a Tokio runtime.
    /// Restarting replaces the running poll loop.
    pub fn start(&self) {
        info!(
            "Watching {} regions every {:?}",
            self.monitor.regions().len(),
            self.poll_interval
        );

        let cache = self.cache.clone();
        let monitor = self.monitor.clone();
        let display = self.display.clone();
        let period = self.poll_interval;

        let handle = TimerHandle::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired cache entries", purged);
                }
                display.handle_poll(monitor.poll().await);
            }
        });

        if let Ok(mut poller) = self.poller.lock() {
            *poller = Some(handle);
        }
    }

    /// Stop polling, cancel every display timer and hide immediately.
    pub fn suspend(&self) {
        if let Ok(mut poller) = self.poller.lock() {
            poller.take();
        }
        self.display.suspend();
        info!("Alert watching suspended");
    }

    /// Resume after [`Watcher::suspend`]; polls immediately.
    pub fn resume(&self) {
        self.start();
    }

    /// User dismissal of the current overlay.
    pub fn dismiss(&self) {
        self.display.dismiss();
    }

    /// Run a single poll outside the loop and apply it.
    pub async fn poll_now(&self) -> PollOutcome {
        let outcome = self.monitor.poll().await;
        self.display.handle_poll(outcome.clone());
        outcome
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.display.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> DisplaySnapshot {
        self.display.snapshot()
    }

    #[must_use]
    pub fn display(&self) -> &DisplayOrchestrator {
        &self.display
    }
}
