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

//! In-memory fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::oneshot;

use crate::cache::{FetchResult, Transport};
use crate::display::AudioCue;
use crate::error::AudioError;
use crate::region::Region;
use crate::render::{Banner, LoadSignal, RenderTarget, TileLayer};
use crate::viewport::{BoundingBox, Placement};

/// Transport answering from a fixed URL table.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, FetchResult>>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Mutex<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, result: FetchResult) {
        self.responses.lock().unwrap().insert(url.to_string(), result);
    }

    /// Delay every answer by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, url: &str, _ttl: Duration) -> FetchResult {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchResult::failure(404, format!("no response for {url}")))
    }
}

pub struct FakeLayer {
    url: Mutex<String>,
    opacity: Mutex<f32>,
    live: AtomicBool,
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
    auto_load: Arc<AtomicBool>,
}

impl FakeLayer {
    fn complete_load(&self) {
        for waiter in self.waiters.lock().unwrap().drain(..) {
            let _ = waiter.send(());
        }
    }
}

impl TileLayer for FakeLayer {
    fn set_url(&self, url: &str) {
        *self.url.lock().unwrap() = url.to_string();
        if self.auto_load.load(Ordering::SeqCst) {
            self.complete_load();
        }
    }

    fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    fn set_opacity(&self, opacity: f32) {
        *self.opacity.lock().unwrap() = opacity;
    }

    fn opacity(&self) -> f32 {
        *self.opacity.lock().unwrap()
    }

    fn bring_to_front(&self) {}

    fn on_loaded(&self) -> LoadSignal {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().push(tx);
        rx
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Overlay {
    visible: bool,
    exiting: bool,
    banner: Option<Banner>,
    shows: usize,
}

/// Render target recording every call.
pub struct FakeTarget {
    ready: AtomicBool,
    auto_load: Arc<AtomicBool>,
    layers: Mutex<Vec<Arc<FakeLayer>>>,
    created: AtomicUsize,
    base_layers: AtomicUsize,
    viewport: Mutex<Option<Placement>>,
    image: Mutex<Option<String>>,
    overlay: Mutex<Overlay>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            auto_load: Arc::new(AtomicBool::new(false)),
            layers: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            base_layers: AtomicUsize::new(0),
            viewport: Mutex::new(None),
            image: Mutex::new(None),
            overlay: Mutex::new(Overlay::default()),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Complete every load as soon as a layer's URL changes.
    pub fn set_auto_load(&self, auto: bool) {
        self.auto_load.store(auto, Ordering::SeqCst);
    }

    pub fn complete_loads(&self) {
        for layer in self.layers.lock().unwrap().iter() {
            layer.complete_load();
        }
    }

    /// Detach every layer, as if the map was torn down.
    pub fn drop_layers(&self) {
        for layer in self.layers.lock().unwrap().drain(..) {
            layer.live.store(false, Ordering::SeqCst);
        }
    }

    /// Tile layers created over the target's lifetime.
    pub fn layer_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn base_layers(&self) -> usize {
        self.base_layers.load(Ordering::SeqCst)
    }

    pub fn viewport(&self) -> Option<Placement> {
        *self.viewport.lock().unwrap()
    }

    pub fn image(&self) -> Option<String> {
        self.image.lock().unwrap().clone()
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay.lock().unwrap().visible
    }

    pub fn show_count(&self) -> usize {
        self.overlay.lock().unwrap().shows
    }

    pub fn banner(&self) -> Option<Banner> {
        self.overlay.lock().unwrap().banner.clone()
    }
}

impl RenderTarget for FakeTarget {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn set_viewport_center(&self, lat: f64, lon: f64, zoom: u8) {
        *self.viewport.lock().unwrap() = Some(Placement::Center { lat, lon, zoom });
    }

    fn fit_bounds(&self, bounds: BoundingBox, padding: u32, max_zoom: u8) {
        *self.viewport.lock().unwrap() = Some(Placement::Fit {
            bounds,
            padding,
            max_zoom,
        });
    }

    fn create_base_layer(&self, _url_template: &str, _max_zoom: u8) {
        self.base_layers.fetch_add(1, Ordering::SeqCst);
    }

    fn create_tile_layer(&self, url: &str, opacity: f32, _z_index: i32) -> Arc<dyn TileLayer> {
        let layer = Arc::new(FakeLayer {
            url: Mutex::new(url.to_string()),
            opacity: Mutex::new(opacity),
            live: AtomicBool::new(true),
            waiters: Mutex::new(Vec::new()),
            auto_load: self.auto_load.clone(),
        });
        self.created.fetch_add(1, Ordering::SeqCst);
        self.layers.lock().unwrap().push(layer.clone());
        layer
    }

    fn remove_layer(&self, layer: &Arc<dyn TileLayer>) {
        let url = layer.url();
        self.layers.lock().unwrap().retain(|l| {
            let keep = l.url() != url;
            if !keep {
                l.live.store(false, Ordering::SeqCst);
            }
            keep
        });
    }

    fn invalidate_size(&self) {}

    fn set_image(&self, url: Option<&str>) {
        *self.image.lock().unwrap() = url.map(str::to_string);
    }

    fn show_overlay(&self, banner: &Banner) {
        let mut overlay = self.overlay.lock().unwrap();
        overlay.visible = true;
        overlay.exiting = false;
        overlay.banner = Some(banner.clone());
        overlay.shows += 1;
    }

    fn begin_exit(&self) {
        self.overlay.lock().unwrap().exiting = true;
    }

    fn clear_overlay(&self) {
        let mut overlay = self.overlay.lock().unwrap();
        overlay.visible = false;
        overlay.exiting = false;
        overlay.banner = None;
    }
}

#[derive(Default)]
pub struct FakeAudio {
    failing: AtomicBool,
    played: Mutex<Vec<String>>,
    tones: AtomicUsize,
}

impl FakeAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn fallback_tones(&self) -> usize {
        self.tones.load(Ordering::SeqCst)
    }
}

impl AudioCue for FakeAudio {
    fn play(&self, cue: &str) -> Result<(), AudioError> {
        self.played.lock().unwrap().push(cue.to_string());
        if self.failing.load(Ordering::SeqCst) {
            Err(AudioError::NotFound(cue.to_string()))
        } else {
            Ok(())
        }
    }

    fn play_fallback_tone(&self) {
        self.tones.fetch_add(1, Ordering::SeqCst);
    }
}

/// NWS-shaped alert collection with one feature per event type.
pub fn alerts_body(events: &[&str]) -> String {
    let features: Vec<_> = events
        .iter()
        .map(|event| json!({"properties": {"event": event, "headline": format!("{event} in effect")}}))
        .collect();
    json!({"type": "FeatureCollection", "features": features}).to_string()
}

/// Radar metadata with `frames` past frames ten minutes apart.
pub fn radar_metadata_body(frames: usize) -> String {
    let past: Vec<_> = (0..frames)
        .map(|i| {
            let time = 1_700_000_000 + 600 * i64::try_from(i).unwrap();
            json!({"time": time, "path": format!("/v2/radar/{time}")})
        })
        .collect();
    json!({
        "version": "2.0",
        "host": "https://tilecache.rainviewer.com",
        "radar": {"past": past, "nowcast": []}
    })
    .to_string()
}

pub fn test_region() -> Region {
    Region::new("Test", "OKC109")
        .with_radar_site("KTLX")
        .with_position(35.33, -97.28)
        .with_zoom(11)
}

/// Let spawned tasks run to their next await point.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
