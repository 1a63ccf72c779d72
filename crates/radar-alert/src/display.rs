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

//! Show / repeat / hide lifecycle of the radar overlay.
//!
//! ```text
//!   Idle --active--> Showing --hide timer--> RepeatScheduled --repeat tick--> Showing
//!     ^                 |                         |
//!     +----inactive-----+-------------------------+
//! ```
//!
//! All timers are [`TimerHandle`]s held in one place; replacing or clearing
//! a slot cancels the old timer, so every handler is safe to run twice.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::alert::PollOutcome;
use crate::error::AudioError;
use crate::radar::RadarDisplay;
use crate::region::AlertEvent;
use crate::render::{Banner, RenderTarget};
use crate::timer::TimerHandle;
use crate::viewport::ViewportFitter;

/// Default CARTO dark basemap, also the fallback for an invalid template.
pub const DEFAULT_BASE_TILE_URL: &str = "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png";

/// Plays the alert sound.
pub trait AudioCue: Send + Sync {
    fn play(&self, cue: &str) -> Result<(), AudioError>;

    /// Synthesized tone used when the cue cannot be played.
    fn play_fallback_tone(&self);
}

/// Lifecycle state of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayState {
    /// No alert, nothing shown.
    #[default]
    Idle,
    /// Overlay visible.
    Showing,
    /// Alert still active, waiting for the next repeat tick.
    RepeatScheduled,
    /// Hidden while an alert may still be active (display finished or dismissed).
    Hidden,
}

/// Notifications for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    StateChanged(DisplayState),
    Shown { title: String },
    Hidden,
    /// The user dismissed the overlay.
    Dismissed,
}

/// Timing and content settings for the overlay.
#[derive(Debug, Clone)]
pub struct DisplayConfig {
    /// How long each show lasts. Zero keeps it up until the alert clears.
    pub show_duration: Duration,
    /// Interval between re-shows while the alert persists. Zero disables.
    pub repeat_interval: Duration,
    pub exit_transition: Duration,
    pub layout_settle: Duration,
    /// Total time to wait for the render target to become ready.
    pub ready_budget: Duration,
    pub ready_initial_backoff: Duration,
    pub ready_max_backoff: Duration,
    pub base_tile_url: String,
    pub base_max_zoom: u8,
    pub sound_cue: Option<String>,
    pub fallback_title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_duration: Duration::from_secs(60),
            repeat_interval: Duration::from_secs(600),
            exit_transition: Duration::from_millis(500),
            layout_settle: Duration::from_millis(150),
            ready_budget: Duration::from_secs(10),
            ready_initial_backoff: Duration::from_millis(100),
            ready_max_backoff: Duration::from_secs(2),
            base_tile_url: DEFAULT_BASE_TILE_URL.to_string(),
            base_max_zoom: 18,
            sound_cue: None,
            fallback_title: "Severe Weather Alert".to_string(),
        }
    }
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub state: DisplayState,
    pub banner: Option<Banner>,
    pub event_type: Option<String>,
    /// Number of shows that reached the visible stage.
    pub shows: u64,
    pub repeat_armed: bool,
    pub hide_armed: bool,
    pub exit_pending: bool,
    pub show_pending: bool,
}

impl DisplaySnapshot {
    /// Timers still outstanding (repeat, hide, exit transition, show sequence).
    #[must_use]
    pub fn outstanding_timers(&self) -> usize {
        [self.repeat_armed, self.hide_armed, self.exit_pending, self.show_pending]
            .iter()
            .filter(|armed| **armed)
            .count()
    }
}

#[derive(Default)]
struct Slots {
    state: DisplayState,
    event: Option<AlertEvent>,
    banner: Option<Banner>,
    shows: u64,
    /// Bumped by every hide; a show sequence started under an older epoch
    /// must not touch the target.
    epoch: u64,
    base_layer_created: bool,
    repeat: Option<TimerHandle>,
    hide: Option<TimerHandle>,
    exit: Option<TimerHandle>,
    show: Option<TimerHandle>,
}

struct Inner {
    config: DisplayConfig,
    target: Arc<dyn RenderTarget>,
    radar: RadarDisplay,
    fitter: ViewportFitter,
    audio: Arc<dyn AudioCue>,
    slots: Mutex<Slots>,
    events: broadcast::Sender<DisplayEvent>,
}

/// The display state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DisplayOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DisplayOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayOrchestrator")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl DisplayOrchestrator {
    pub fn new(
        config: DisplayConfig,
        target: Arc<dyn RenderTarget>,
        radar: RadarDisplay,
        fitter: ViewportFitter,
        audio: Arc<dyn AudioCue>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                config,
                target,
                radar,
                fitter,
                audio,
                slots: Mutex::new(Slots::default()),
                events,
            }),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DisplayEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn radar(&self) -> &RadarDisplay {
        &self.inner.radar
    }

    #[must_use]
    pub fn snapshot(&self) -> DisplaySnapshot {
        let slots = self.slots();
        DisplaySnapshot {
            state: slots.state,
            banner: slots.banner.clone(),
            event_type: slots.event.as_ref().map(|e| e.event_type.clone()),
            shows: slots.shows,
            repeat_armed: slots.repeat.is_some(),
            hide_armed: slots.hide.is_some(),
            exit_pending: slots.exit.is_some(),
            show_pending: slots.show.is_some(),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        // A poisoned lock only means a panicking test thread; the data is plain state.
        self.inner
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, event: DisplayEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn set_state(&self, slots: &mut Slots, state: DisplayState) {
        if slots.state != state {
            debug!("Display state {:?} -> {:?}", slots.state, state);
            slots.state = state;
            self.emit(DisplayEvent::StateChanged(state));
        }
    }

    /// Apply a poll outcome.
    pub fn handle_poll(&self, outcome: PollOutcome) {
        match (outcome.active, outcome.event) {
            (true, event) => self.alert_active(event),
            (false, _) => self.alert_cleared(),
        }
    }

    fn alert_active(&self, event: Option<AlertEvent>) {
        let mut slots = self.slots();
        slots.event = event;

        let cycle_running = slots.repeat.is_some()
            || (slots.state == DisplayState::Showing && self.inner.config.repeat_interval.is_zero());
        if cycle_running {
            return;
        }

        if !self.inner.config.repeat_interval.is_zero() {
            let this = self.clone();
            slots.repeat = Some(TimerHandle::every(self.inner.config.repeat_interval, move || {
                this.show();
            }));
        }
        self.show_locked(&mut slots);
    }

    fn alert_cleared(&self) {
        let mut slots = self.slots();
        let was_idle = slots.state == DisplayState::Idle && slots.show.is_none();
        slots.repeat = None;
        slots.event = None;
        if !was_idle {
            info!("Alert cleared, hiding radar");
            self.hide_locked(&mut slots, true);
        }
        self.set_state(&mut slots, DisplayState::Idle);
    }

    /// User dismissal: same as a cleared alert, plus a [`DisplayEvent::Dismissed`]
    /// notification. The next active poll shows the overlay again.
    pub fn dismiss(&self) {
        let mut slots = self.slots();
        slots.repeat = None;
        self.hide_locked(&mut slots, true);
        self.set_state(&mut slots, DisplayState::Hidden);
        drop(slots);
        info!("Radar overlay dismissed");
        self.emit(DisplayEvent::Dismissed);
    }

    /// Cancel every timer and hide immediately.
    pub fn suspend(&self) {
        let mut slots = self.slots();
        slots.repeat = None;
        slots.event = None;
        self.hide_locked(&mut slots, true);
        self.set_state(&mut slots, DisplayState::Idle);
    }

    /// Show the overlay for the current alert.
    pub fn show(&self) {
        let mut slots = self.slots();
        self.show_locked(&mut slots);
    }

    fn show_locked(&self, slots: &mut Slots) {
        slots.hide = None;
        let epoch = slots.epoch;
        let this = self.clone();
        slots.show = Some(TimerHandle::spawn(async move {
            this.run_show(epoch).await;
        }));
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.slots().epoch == epoch
    }

    async fn run_show(&self, epoch: u64) {
        if !self.wait_until_ready().await {
            warn!(
                "Render target not ready after {:?}, skipping this show",
                self.inner.config.ready_budget
            );
            let mut slots = self.slots();
            if slots.epoch == epoch {
                slots.show = None;
            }
            return;
        }

        let (banner, region) = {
            let mut slots = self.slots();
            if slots.epoch != epoch {
                debug!("Show superseded before it started");
                return;
            }
            slots.hide = None;
            slots.exit = None;
            let banner = Banner::for_event(slots.event.as_ref(), &self.inner.config.fallback_title);
            let region = slots.event.as_ref().map(|e| e.source_region.clone());
            slots.banner = Some(banner.clone());
            slots.shows += 1;
            self.set_state(&mut slots, DisplayState::Showing);
            // Under the lock, so a concurrent hide sees either nothing or a
            // fully shown overlay
            info!("Showing radar overlay: {} ({})", banner.title, banner.subtitle);
            self.inner.target.show_overlay(&banner);
            (banner, region)
        };

        self.emit(DisplayEvent::Shown {
            title: banner.title.clone(),
        });

        sleep(self.inner.config.layout_settle).await;
        if !self.is_current(epoch) {
            debug!("Show hidden during layout settle");
            return;
        }
        self.inner.target.invalidate_size();

        if let Some(region) = region {
            self.ensure_base_layer();
            self.inner.fitter.place(self.inner.target.as_ref(), &region);
            self.inner.radar.start(self.inner.target.clone(), &region).await;
        }

        if !self.is_current(epoch) {
            // The hide ran while the radar was starting and could not stop it
            debug!("Show hidden while the radar started, stopping it");
            self.inner.radar.stop(self.inner.target.as_ref());
            return;
        }

        self.play_cue();

        let mut slots = self.slots();
        if slots.epoch != epoch {
            return;
        }
        if !self.inner.config.show_duration.is_zero() {
            let this = self.clone();
            slots.hide = Some(TimerHandle::after(self.inner.config.show_duration, async move {
                this.display_elapsed();
            }));
        }
        slots.show = None;
    }

    /// Poll readiness with doubling backoff until the budget is spent.
    async fn wait_until_ready(&self) -> bool {
        let config = &self.inner.config;
        let mut waited = Duration::ZERO;
        let mut delay = config.ready_initial_backoff;

        while !self.inner.target.is_ready() {
            if waited >= config.ready_budget {
                return false;
            }
            let step = delay.min(config.ready_budget - waited);
            debug!("Render target not ready, retrying in {:?}", step);
            sleep(step).await;
            waited += step;
            delay = (delay * 2).min(config.ready_max_backoff);
        }
        true
    }

    fn ensure_base_layer(&self) {
        let mut slots = self.slots();
        if !slots.base_layer_created {
            self.inner
                .target
                .create_base_layer(&self.inner.config.base_tile_url, self.inner.config.base_max_zoom);
            slots.base_layer_created = true;
        }
    }

    fn play_cue(&self) {
        let Some(cue) = self.inner.config.sound_cue.as_deref() else {
            self.inner.audio.play_fallback_tone();
            return;
        };
        if let Err(e) = self.inner.audio.play(cue) {
            warn!("Alert sound '{}' failed ({}), playing fallback tone", cue, e);
            self.inner.audio.play_fallback_tone();
        }
    }

    fn display_elapsed(&self) {
        let mut slots = self.slots();
        self.hide_locked(&mut slots, false);
        let next = if slots.repeat.is_some() {
            DisplayState::RepeatScheduled
        } else {
            DisplayState::Hidden
        };
        self.set_state(&mut slots, next);
    }

    /// Hide the overlay. `immediate` skips the exit transition delay.
    pub fn hide(&self, immediate: bool) {
        let mut slots = self.slots();
        self.hide_locked(&mut slots, immediate);
        let next = match slots.state {
            DisplayState::Idle => DisplayState::Idle,
            _ if slots.repeat.is_some() => DisplayState::RepeatScheduled,
            _ => DisplayState::Hidden,
        };
        self.set_state(&mut slots, next);
    }

    fn hide_locked(&self, slots: &mut Slots, immediate: bool) {
        slots.epoch += 1;
        slots.show = None;
        slots.hide = None;
        slots.exit = None;

        self.inner.radar.stop(self.inner.target.as_ref());
        self.inner.target.begin_exit();

        if immediate {
            self.inner.target.clear_overlay();
        } else {
            let this = self.clone();
            slots.exit = Some(TimerHandle::after(self.inner.config.exit_transition, async move {
                this.inner.target.clear_overlay();
                this.slots().exit = None;
            }));
        }

        slots.banner = None;
        self.emit(DisplayEvent::Hidden);
    }
}
