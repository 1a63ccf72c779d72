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

//! Capability interface to the map surface the overlay is drawn on.
//!
//! The crate never renders anything itself. Hosts implement [`RenderTarget`]
//! (a tile map plus the overlay container around it) and [`TileLayer`] (one
//! URL-templated tile layer on that map).

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::region::AlertEvent;
use crate::viewport::BoundingBox;

/// Resolves once a layer has finished loading the tiles for its current URL.
pub type LoadSignal = oneshot::Receiver<()>;

/// A tile layer created by [`RenderTarget::create_tile_layer`].
pub trait TileLayer: Send + Sync {
    /// Point the layer at a new `{z}/{x}/{y}` URL template.
    fn set_url(&self, url: &str);

    fn url(&self) -> String;

    fn set_opacity(&self, opacity: f32);

    fn opacity(&self) -> f32;

    /// Raise the layer above every other tile layer.
    fn bring_to_front(&self);

    /// Signal for the next load completion. Request it before calling
    /// [`TileLayer::set_url`] so a load that finishes immediately is not missed.
    fn on_loaded(&self) -> LoadSignal;

    /// Whether the layer is still attached to its map.
    fn is_live(&self) -> bool;
}

/// Title and subtitle shown above the radar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub title: String,
    pub subtitle: String,
}

impl Banner {
    /// Build the banner for `event`, or a generic one when there is none.
    #[must_use]
    pub fn for_event(event: Option<&AlertEvent>, fallback_title: &str) -> Self {
        match event {
            Some(event) => Self {
                title: if event.event_type.trim().is_empty() {
                    fallback_title.to_string()
                } else {
                    event.event_type.clone()
                },
                subtitle: if event.headline.trim().is_empty() {
                    event.source_region.name.clone()
                } else {
                    event.headline.clone()
                },
            },
            None => Self {
                title: fallback_title.to_string(),
                subtitle: String::new(),
            },
        }
    }
}

/// The map widget plus the overlay container that hosts it.
pub trait RenderTarget: Send + Sync {
    /// Whether the container is attached and visible so it can be populated.
    fn is_ready(&self) -> bool;

    fn set_viewport_center(&self, lat: f64, lon: f64, zoom: u8);

    fn fit_bounds(&self, bounds: BoundingBox, padding: u32, max_zoom: u8);

    fn create_base_layer(&self, url_template: &str, max_zoom: u8);

    fn create_tile_layer(&self, url: &str, opacity: f32, z_index: i32) -> Arc<dyn TileLayer>;

    fn remove_layer(&self, layer: &Arc<dyn TileLayer>);

    /// Recompute layout after the container changed size or visibility.
    fn invalidate_size(&self);

    /// Show a single image over the map (static radar loops, provider GIFs,
    /// placeholders), or remove it with `None`.
    fn set_image(&self, url: Option<&str>);

    /// Make the overlay visible with its enter transition.
    fn show_overlay(&self, banner: &Banner);

    /// Start the exit transition.
    fn begin_exit(&self);

    /// Detach and clear everything the overlay shows.
    fn clear_overlay(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    #[test]
    fn test_banner_from_event() {
        let event = AlertEvent {
            event_type: "Tornado Warning".to_string(),
            headline: String::new(),
            description: String::new(),
            source_region: Region::new("Oklahoma County", "OKC109"),
        };
        let banner = Banner::for_event(Some(&event), "Severe Weather Alert");
        assert_eq!(banner.title, "Tornado Warning");
        assert_eq!(banner.subtitle, "Oklahoma County");

        let banner = Banner::for_event(None, "Severe Weather Alert");
        assert_eq!(banner.title, "Severe Weather Alert");
        assert!(banner.subtitle.is_empty());
    }
}
