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

//! Radar imagery providers.
//!
//! The orchestrator picks one [`RadarProviderKind`] and drives it through
//! [`RadarDisplay::start`] / [`RadarDisplay::stop`]:
//!
//! - **Basemap overlay**: tiled radar on the map, cross-faded by [`RadarAnimator`]
//! - **Static image loop**: one coordinate-centred image per frame, swapped in place
//! - **Single provider GIF**: a ready-made animated loop for the region's radar site

pub mod animator;
pub mod frames;

pub use animator::{AnimationBufferPair, RadarAnimator};
pub use frames::{FrameDescriptor, FrameIndex, TileParams, RAINVIEWER_METADATA_URL};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::FetchCache;
use crate::region::Region;
use crate::render::RenderTarget;
use crate::timer::TimerHandle;
use crate::viewport::ViewportFitter;

pub const NWS_RIDGE_GIF_TEMPLATE: &str = "https://radar.weather.gov/ridge/standard/{site}_loop.gif";

/// Which radar imagery implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RadarProviderKind {
    #[default]
    BasemapOverlay,
    StaticImageLoop,
    SingleProviderGif,
}

/// Radar imagery configuration.
#[derive(Debug, Clone)]
pub struct RadarConfig {
    pub provider: RadarProviderKind,
    pub metadata_url: String,
    pub metadata_ttl: Duration,
    pub include_nowcast: bool,
    pub tile: TileParams,
    /// Time between animation ticks.
    pub frame_interval: Duration,
    /// Opacity of the visible radar layer.
    pub opacity: f32,
    /// Longest wait for a preloaded frame before it is shown anyway.
    pub load_timeout: Duration,
    pub z_index: i32,
    /// URL template with a `{site}` placeholder.
    pub gif_url_template: String,
    /// Image shown when no radar imagery is available.
    pub placeholder_image_url: Option<String>,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            provider: RadarProviderKind::default(),
            metadata_url: RAINVIEWER_METADATA_URL.to_string(),
            metadata_ttl: Duration::from_secs(300),
            include_nowcast: false,
            tile: TileParams::default(),
            frame_interval: Duration::from_millis(500),
            opacity: 0.7,
            load_timeout: Duration::from_secs(4),
            z_index: 400,
            gif_url_template: NWS_RIDGE_GIF_TEMPLATE.to_string(),
            placeholder_image_url: None,
        }
    }
}

#[derive(Default)]
struct LoopState {
    /// Bumped by every stop; a start that resumes under an older value
    /// installs nothing.
    generation: u64,
    timer: Option<TimerHandle>,
}

/// Loops coordinate-centred radar images through the single image overlay.
#[derive(Clone)]
pub struct StaticImageLoop {
    cache: FetchCache,
    config: Arc<RadarConfig>,
    fitter: ViewportFitter,
    state: Arc<Mutex<LoopState>>,
}

impl std::fmt::Debug for StaticImageLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticImageLoop")
            .field("fitter", &self.fitter)
            .finish_non_exhaustive()
    }
}

impl StaticImageLoop {
    pub fn new(cache: FetchCache, config: Arc<RadarConfig>, fitter: ViewportFitter) -> Self {
        Self {
            cache,
            config,
            fitter,
            state: Arc::new(Mutex::new(LoopState::default())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn start(&self, target: Arc<dyn RenderTarget>, region: &Region) -> bool {
        let generation = {
            let mut state = self.lock();
            state.generation += 1;
            state.timer = None;
            state.generation
        };

        let index = match frames::fetch_index(
            &self.cache,
            &self.config.metadata_url,
            self.config.metadata_ttl,
            self.config.include_nowcast,
        )
        .await
        {
            Ok(index) => index,
            Err(e) => {
                warn!("Radar images unavailable for region '{}': {}", region.name, e);
                return false;
            }
        };

        let (lat, lon) = region.coordinates();
        let params = TileParams {
            size: 512,
            ..self.config.tile
        };
        let urls: Vec<String> = index
            .image_frames(&params, self.fitter.resolve_zoom(region), lat, lon)
            .into_iter()
            .map(|frame| frame.url_template)
            .collect();

        let Some(last) = urls.last() else {
            return false;
        };

        let mut state = self.lock();
        if state.generation != generation {
            debug!("Image loop for region '{}' stopped while loading", region.name);
            return false;
        }
        target.set_image(Some(last));

        let mut current = urls.len() - 1;
        state.timer = Some(TimerHandle::every(self.config.frame_interval, move || {
            current = (current + 1) % urls.len();
            target.set_image(Some(&urls[current]));
        }));
        true
    }

    pub fn stop(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.timer = None;
    }

    fn is_running(&self) -> bool {
        self.lock().timer.is_some()
    }
}

/// Shows the provider's own animated loop for the region's radar site.
#[derive(Debug, Clone)]
pub struct ProviderGif {
    url_template: String,
}

impl ProviderGif {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
        }
    }

    #[must_use]
    pub fn url_for(&self, region: &Region) -> Option<String> {
        let site = region.radar_site.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(self.url_template.replace("{site}", site))
    }

    pub fn start(&self, target: &dyn RenderTarget, region: &Region) -> bool {
        match self.url_for(region) {
            Some(url) => {
                target.set_image(Some(&url));
                true
            }
            None => {
                warn!("Region '{}' has no radar site for the GIF provider", region.name);
                false
            }
        }
    }
}

/// Dispatch over the configured radar provider.
#[derive(Debug, Clone)]
pub struct RadarDisplay {
    kind: RadarProviderKind,
    animator: RadarAnimator,
    image_loop: StaticImageLoop,
    gif: ProviderGif,
    placeholder: Option<String>,
    image_shown: Arc<AtomicBool>,
    stops: Arc<AtomicU64>,
}

impl RadarDisplay {
    pub fn new(cache: FetchCache, config: RadarConfig, fitter: ViewportFitter) -> Self {
        let config = Arc::new(config);
        Self {
            kind: config.provider,
            animator: RadarAnimator::new(cache.clone(), config.clone()),
            image_loop: StaticImageLoop::new(cache, config.clone(), fitter),
            gif: ProviderGif::new(config.gif_url_template.clone()),
            placeholder: config.placeholder_image_url.clone(),
            image_shown: Arc::new(AtomicBool::new(false)),
            stops: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> RadarProviderKind {
        self.kind
    }

    #[must_use]
    pub fn animator(&self) -> &RadarAnimator {
        &self.animator
    }

    /// Populate the overlay for `region`. Falls back to the placeholder image
    /// when the provider has nothing to show; returns whether real radar
    /// imagery is displayed.
    pub async fn start(&self, target: Arc<dyn RenderTarget>, region: &Region) -> bool {
        info!("Starting {:?} radar for region '{}'", self.kind, region.name);
        let stops = self.stops.load(Ordering::SeqCst);

        let started = match self.kind {
            RadarProviderKind::BasemapOverlay => self.animator.start(target.clone(), region).await,
            RadarProviderKind::StaticImageLoop => self.image_loop.start(target.clone(), region).await,
            RadarProviderKind::SingleProviderGif => self.gif.start(target.as_ref(), region),
        };

        if self.stops.load(Ordering::SeqCst) != stops {
            // Stopped while loading; leave the target empty
            return false;
        }

        if started {
            if self.kind != RadarProviderKind::BasemapOverlay {
                self.image_shown.store(true, Ordering::SeqCst);
            }
        } else if let Some(placeholder) = self.placeholder.as_deref() {
            debug!("Showing radar placeholder for region '{}'", region.name);
            target.set_image(Some(placeholder));
            self.image_shown.store(true, Ordering::SeqCst);
        }

        started
    }

    /// Stop every animation and remove the single image overlay if shown.
    /// Safe to call when nothing was started.
    pub fn stop(&self, target: &dyn RenderTarget) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.animator.stop();
        self.image_loop.stop();
        if self.image_shown.swap(false, Ordering::SeqCst) {
            target.set_image(None);
        }
    }

    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.animator.is_running() || self.image_loop.is_running()
    }
}
