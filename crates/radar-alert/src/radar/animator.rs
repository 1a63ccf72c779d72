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

//! Double-buffered radar tile animation.
//!
//! Two tile layers alternate: the active one is shown at the target opacity
//! while the next frame is loaded into the inactive one at zero opacity.
//! Only once the inactive layer reports its tiles loaded is it raised and
//! faded in and the previous layer faded out, so a partially loaded frame is
//! never visible. Playback starts at the most recent frame and loops forever.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::time::{sleep, timeout};

use super::frames::{fetch_index, FrameDescriptor};
use super::RadarConfig;
use crate::cache::FetchCache;
use crate::region::Region;
use crate::render::{RenderTarget, TileLayer};
use crate::timer::TimerHandle;

/// The two animation layers and which of them is visible.
pub struct AnimationBufferPair {
    a: Arc<dyn TileLayer>,
    b: Arc<dyn TileLayer>,
    active_is_a: bool,
}

impl std::fmt::Debug for AnimationBufferPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationBufferPair")
            .field("active_is_a", &self.active_is_a)
            .finish_non_exhaustive()
    }
}

impl AnimationBufferPair {
    #[must_use]
    pub fn active(&self) -> &Arc<dyn TileLayer> {
        if self.active_is_a {
            &self.a
        } else {
            &self.b
        }
    }

    #[must_use]
    pub fn inactive(&self) -> &Arc<dyn TileLayer> {
        if self.active_is_a {
            &self.b
        } else {
            &self.a
        }
    }

    fn swap(&mut self) {
        self.active_is_a = !self.active_is_a;
    }

    fn is_live(&self) -> bool {
        self.a.is_live() && self.b.is_live()
    }
}

#[derive(Default)]
struct AnimatorState {
    frames: Vec<FrameDescriptor>,
    index: usize,
    buffers: Option<AnimationBufferPair>,
    timer: Option<TimerHandle>,
    /// Bumped by every start/stop so in-flight work can detect it was superseded.
    generation: u64,
}

/// Drives the cross-fade loop for the map overlay radar provider.
#[derive(Clone)]
pub struct RadarAnimator {
    cache: FetchCache,
    config: Arc<RadarConfig>,
    state: Arc<Mutex<AnimatorState>>,
}

impl std::fmt::Debug for RadarAnimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadarAnimator")
            .field("frames", &self.frame_count())
            .field("active_index", &self.active_index())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl RadarAnimator {
    pub fn new(cache: FetchCache, config: Arc<RadarConfig>) -> Self {
        Self {
            cache,
            config,
            state: Arc::new(Mutex::new(AnimatorState::default())),
        }
    }

    /// Fetch frame metadata and start looping.
    ///
    /// Returns `false` when no frames are available; the caller shows a
    /// placeholder instead. Calling `start` again replaces the running loop
    /// and reuses the existing layers when they are still live.
    pub async fn start(&self, target: Arc<dyn RenderTarget>, region: &Region) -> bool {
        let generation = self.bump_generation();

        let frames = match fetch_index(
            &self.cache,
            &self.config.metadata_url,
            self.config.metadata_ttl,
            self.config.include_nowcast,
        )
        .await
        {
            Ok(index) => index.tile_frames(&self.config.tile),
            Err(e) => {
                warn!("Radar frames unavailable for region '{}': {}", region.name, e);
                Vec::new()
            }
        };

        self.install(target.as_ref(), frames, generation)
    }

    /// Load `frames`, position on the most recent one, and arm the tick loop.
    fn install(&self, target: &dyn RenderTarget, frames: Vec<FrameDescriptor>, generation: u64) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        if state.generation != generation {
            debug!("Radar start superseded before frames arrived");
            return false;
        }

        let Some(last) = frames.last() else {
            debug!("No radar frames to animate");
            return false;
        };
        let start_url = last.url_template.clone();
        let opacity = self.config.opacity;

        match state.buffers.as_ref() {
            Some(buffers) if buffers.is_live() => {
                let active = buffers.active();
                let inactive = buffers.inactive();
                active.set_url(&start_url);
                inactive.set_url(&start_url);
                inactive.set_opacity(0.0);
                active.set_opacity(opacity);
                active.bring_to_front();
            }
            stale => {
                if let Some(stale) = stale {
                    debug!("Radar layers detached, recreating");
                    target.remove_layer(&stale.a);
                    target.remove_layer(&stale.b);
                }
                let a = target.create_tile_layer(&start_url, opacity, self.config.z_index);
                let b = target.create_tile_layer(&start_url, 0.0, self.config.z_index);
                state.buffers = Some(AnimationBufferPair {
                    a,
                    b,
                    active_is_a: true,
                });
            }
        }

        info!("Animating {} radar frames", frames.len());
        state.index = frames.len() - 1;
        state.frames = frames;

        let animator = self.clone();
        let interval = self.config.frame_interval;
        state.timer = Some(TimerHandle::spawn(async move {
            loop {
                sleep(interval).await;
                animator.advance(generation).await;
            }
        }));

        true
    }

    /// Cancel the tick loop. Layers are kept for reuse by the next start.
    pub fn stop(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.generation += 1;
            if state.timer.take().is_some() {
                debug!("Radar animation stopped");
            }
        }
    }

    /// One tick: preload the next frame into the hidden layer, wait for it to
    /// load, then swap.
    async fn advance(&self, generation: u64) {
        let (next, url, incoming, outgoing) = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            if state.generation != generation || state.frames.is_empty() {
                return;
            }
            let Some(buffers) = state.buffers.as_ref() else {
                return;
            };
            let next = (state.index + 1) % state.frames.len();
            (
                next,
                state.frames[next].url_template.clone(),
                buffers.inactive().clone(),
                buffers.active().clone(),
            )
        };

        let loaded = incoming.on_loaded();
        incoming.set_url(&url);

        match timeout(self.config.load_timeout, loaded).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("Layer dropped its load signal for {}", url),
            Err(_) => warn!(
                "Radar frame {} not loaded after {:?}, showing it anyway",
                url, self.config.load_timeout
            ),
        }

        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.generation != generation {
            return;
        }

        incoming.bring_to_front();
        incoming.set_opacity(self.config.opacity);
        outgoing.set_opacity(0.0);
        if let Some(buffers) = state.buffers.as_mut() {
            buffers.swap();
        }
        state.index = next;
    }

    fn bump_generation(&self) -> u64 {
        self.state
            .lock()
            .map(|mut state| {
                state.timer = None;
                state.generation += 1;
                state.generation
            })
            .unwrap_or_default()
    }

    /// Index of the visible frame, if animating.
    #[must_use]
    pub fn active_index(&self) -> Option<usize> {
        let state = self.state.lock().ok()?;
        (!state.frames.is_empty()).then_some(state.index)
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.state.lock().map(|s| s.frames.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().map(|s| s.timer.is_some()).unwrap_or(false)
    }

    /// Layers currently (active, inactive).
    #[must_use]
    pub fn layers(&self) -> Option<(Arc<dyn TileLayer>, Arc<dyn TileLayer>)> {
        let state = self.state.lock().ok()?;
        state
            .buffers
            .as_ref()
            .map(|b| (b.active().clone(), b.inactive().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchResult;
    use crate::test_support::{radar_metadata_body, settle, FakeTarget, FakeTransport};
    use std::time::Duration;

    fn animator(transport: &Arc<FakeTransport>, frames: usize) -> RadarAnimator {
        let config = RadarConfig::default();
        transport.respond(
            &config.metadata_url,
            FetchResult::success(200, radar_metadata_body(frames)),
        );
        let cache = FetchCache::new(transport.clone(), Duration::from_secs(60));
        RadarAnimator::new(cache, Arc::new(config))
    }

    fn interval() -> Duration {
        RadarConfig::default().frame_interval
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_at_most_recent_frame() {
        let transport = Arc::new(FakeTransport::new());
        let target = Arc::new(FakeTarget::new());
        let animator = animator(&transport, 3);

        assert!(animator.start(target.clone(), &crate::test_support::test_region()).await);
        assert_eq!(animator.active_index(), Some(2));
        assert_eq!(target.layer_count(), 2);

        let (active, inactive) = animator.layers().unwrap();
        assert!(active.url().contains("/v2/radar/1700001200/"));
        assert_eq!(active.url(), inactive.url());
        assert!((active.opacity() - RadarConfig::default().opacity).abs() < f32::EPSILON);
        assert!(inactive.opacity().abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_advances_and_wraps() {
        let transport = Arc::new(FakeTransport::new());
        let target = Arc::new(FakeTarget::new());
        target.set_auto_load(true);
        let animator = animator(&transport, 3);
        animator.start(target.clone(), &crate::test_support::test_region()).await;

        // 2 -> 0 (wrap) -> 1
        sleep(interval() + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(animator.active_index(), Some(0));

        sleep(interval()).await;
        settle().await;
        assert_eq!(animator.active_index(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_waits_for_load() {
        let transport = Arc::new(FakeTransport::new());
        let target = Arc::new(FakeTarget::new());
        let animator = animator(&transport, 3);
        animator.start(target.clone(), &crate::test_support::test_region()).await;
        let (first_active, first_inactive) = animator.layers().unwrap();

        sleep(interval() + Duration::from_millis(1)).await;
        settle().await;

        // Next frame preloaded invisibly, previous layer still fully visible
        assert!(first_inactive.url().contains("/v2/radar/1700000000/"));
        assert!(first_inactive.opacity().abs() < f32::EPSILON);
        assert!(first_active.opacity() > 0.0);
        assert_eq!(animator.active_index(), Some(2));

        target.complete_loads();
        settle().await;

        assert_eq!(animator.active_index(), Some(0));
        assert!(first_active.opacity().abs() < f32::EPSILON);
        assert!(first_inactive.opacity() > 0.0);
        let (active, _) = animator.layers().unwrap();
        assert!(Arc::ptr_eq(&active, &first_inactive));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_promotes_frame() {
        let transport = Arc::new(FakeTransport::new());
        let target = Arc::new(FakeTarget::new());
        let animator = animator(&transport, 2);
        animator.start(target.clone(), &crate::test_support::test_region()).await;

        sleep(interval() + RadarConfig::default().load_timeout + Duration::from_millis(5)).await;
        settle().await;
        assert_eq!(animator.active_index(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_reuses_layers() {
        let transport = Arc::new(FakeTransport::new());
        let target = Arc::new(FakeTarget::new());
        let animator = animator(&transport, 3);
        let region = crate::test_support::test_region();

        animator.start(target.clone(), &region).await;
        animator.start(target.clone(), &region).await;
        assert_eq!(target.layer_count(), 2);
        assert!(animator.is_running());

        target.drop_layers();
        animator.start(target.clone(), &region).await;
        assert_eq!(target.layer_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_frames_abort() {
        let transport = Arc::new(FakeTransport::new());
        let target = Arc::new(FakeTarget::new());
        let animator = animator(&transport, 0);

        assert!(!animator.start(target.clone(), &crate::test_support::test_region()).await);
        assert!(!animator.is_running());
        assert_eq!(target.layer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_safe_and_halts_ticks() {
        let transport = Arc::new(FakeTransport::new());
        let target = Arc::new(FakeTarget::new());
        target.set_auto_load(true);
        let animator = animator(&transport, 3);

        animator.stop();
        animator.start(target.clone(), &crate::test_support::test_region()).await;
        animator.stop();
        assert!(!animator.is_running());

        sleep(interval() * 3).await;
        settle().await;
        assert_eq!(animator.active_index(), Some(2));
    }
}
