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

//! Configured regions of interest and the alert events matched against them.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Geographic centre of the contiguous United States, used whenever a region
/// carries no usable coordinate.
pub const CONTINENTAL_CENTER: (f64, f64) = (39.8283, -98.5795);

/// Deepest zoom any slippy-map tile server publishes.
pub const MAX_ZOOM: u8 = 22;

/// A configured area watched for alerts and shown on the radar overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Display name (used as a subtitle fallback and in logs).
    pub name: String,

    /// Provider-specific zone or feed key substituted into `{region}`.
    #[serde(alias = "alertIdentifier")]
    pub alert_id: String,

    /// Radar site identifier (e.g. "KTLX") for single-site GIF providers.
    #[serde(default, alias = "radarSite")]
    pub radar_site: Option<String>,

    /// Latitude in degrees.
    #[serde(default)]
    pub lat: Option<f64>,

    /// Longitude in degrees.
    #[serde(default)]
    pub lon: Option<f64>,

    /// Explicit zoom level for this region.
    #[serde(default)]
    pub zoom: Option<u8>,

    /// Radius in kilometres; when set the viewport fits a bounding box.
    #[serde(default, alias = "radiusKm")]
    pub radius_km: Option<f64>,
}

impl Region {
    pub fn new(name: impl Into<String>, alert_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alert_id: alert_id.into(),
            radar_site: None,
            lat: None,
            lon: None,
            zoom: None,
            radius_km: None,
        }
    }

    #[must_use]
    pub fn with_position(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    #[must_use]
    pub fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = Some(zoom);
        self
    }

    #[must_use]
    pub fn with_radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = Some(radius_km);
        self
    }

    #[must_use]
    pub fn with_radar_site(mut self, site: impl Into<String>) -> Self {
        self.radar_site = Some(site.into());
        self
    }

    /// Coordinates to display, falling back to [`CONTINENTAL_CENTER`] when
    /// either value is missing, non-finite or out of range.
    #[must_use]
    pub fn coordinates(&self) -> (f64, f64) {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if valid_lat(lat) && valid_lon(lon) => (lat, lon),
            _ => CONTINENTAL_CENTER,
        }
    }

    /// Radius usable for bounds fitting (present and strictly positive).
    #[must_use]
    pub fn fit_radius_km(&self) -> Option<f64> {
        self.radius_km.filter(|r| r.is_finite() && *r > 0.0)
    }

    /// Check the region for configuration defects without modifying it.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();

        if self.alert_id.trim().is_empty() {
            problems.push(ConfigError::InvalidRegion {
                name: self.name.clone(),
                reason: "missing alert identifier".to_string(),
            });
        }

        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                if !valid_lat(lat) {
                    problems.push(ConfigError::InvalidRegion {
                        name: self.name.clone(),
                        reason: format!("latitude {lat} outside [-90, 90]"),
                    });
                }
                if !valid_lon(lon) {
                    problems.push(ConfigError::InvalidRegion {
                        name: self.name.clone(),
                        reason: format!("longitude {lon} outside [-180, 180]"),
                    });
                }
            }
            _ => problems.push(ConfigError::InvalidRegion {
                name: self.name.clone(),
                reason: "missing coordinates".to_string(),
            }),
        }

        if let Some(zoom) = self.zoom.filter(|zoom| *zoom > MAX_ZOOM) {
            problems.push(ConfigError::InvalidRegion {
                name: self.name.clone(),
                reason: format!("zoom {zoom} above {MAX_ZOOM}"),
            });
        }

        if let Some(radius) = self.radius_km {
            if !(radius.is_finite() && radius > 0.0) {
                problems.push(ConfigError::InvalidRegion {
                    name: self.name.clone(),
                    reason: format!("radius {radius} km must be positive"),
                });
            }
        }

        problems
    }

    /// Log every defect and return a copy safe to display: invalid
    /// coordinates are cleared (so the continental centre is used), zoom is
    /// capped at [`MAX_ZOOM`] and a non-positive radius is dropped.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        for problem in self.validate() {
            warn!("{}", problem);
        }

        if !matches!((self.lat, self.lon), (Some(lat), Some(lon)) if valid_lat(lat) && valid_lon(lon))
        {
            self.lat = None;
            self.lon = None;
        }
        self.zoom = self.zoom.map(|zoom| zoom.min(MAX_ZOOM));
        self.radius_km = self.fit_radius_km();
        self
    }
}

fn valid_lat(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

fn valid_lon(lon: f64) -> bool {
    lon.is_finite() && (-180.0..=180.0).contains(&lon)
}

/// An active alert matched for a region. Replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub event_type: String,
    pub headline: String,
    pub description: String,
    pub source_region: Region,
}
