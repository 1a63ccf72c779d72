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

//! Viewport placement for a region: centre+zoom, or a radius-derived
//! bounding box.

use serde::{Deserialize, Serialize};

use crate::region::{Region, MAX_ZOOM};
use crate::render::RenderTarget;

/// Zoom used when neither the region nor the configuration sets one.
pub const FALLBACK_ZOOM: u8 = 8;

/// Kilometres per degree of latitude (equirectangular approximation).
const KM_PER_DEGREE: f64 = 111.0;

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Box centred on `(lat, lon)` extending `radius_km` in each direction.
    ///
    /// Not valid near the poles, where `cos(lat)` approaches zero.
    #[must_use]
    pub fn around(lat: f64, lon: f64, radius_km: f64) -> Self {
        let half_height = radius_km / KM_PER_DEGREE;
        let half_width = radius_km / (KM_PER_DEGREE * lat.to_radians().cos());

        Self {
            south: lat - half_height,
            west: lon - half_width,
            north: lat + half_height,
            east: lon + half_width,
        }
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }

    #[must_use]
    pub fn half_height(&self) -> f64 {
        (self.north - self.south) / 2.0
    }

    #[must_use]
    pub fn half_width(&self) -> f64 {
        (self.east - self.west) / 2.0
    }
}

/// What the fitter tells the render target to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    Center { lat: f64, lon: f64, zoom: u8 },
    Fit {
        bounds: BoundingBox,
        padding: u32,
        max_zoom: u8,
    },
}

/// Computes and applies a [`Placement`] for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportFitter {
    /// Globally configured zoom default.
    pub default_zoom: Option<u8>,
    /// Zoom ceiling for bounds fitting (base layer maximum).
    pub max_zoom: u8,
    /// Padding in pixels around a fitted box.
    pub padding: u32,
}

impl Default for ViewportFitter {
    fn default() -> Self {
        Self {
            default_zoom: None,
            max_zoom: 18,
            padding: 20,
        }
    }
}

impl ViewportFitter {
    /// Zoom priority: region, then configured default, then [`FALLBACK_ZOOM`].
    /// Never deeper than the base layer goes.
    #[must_use]
    pub fn resolve_zoom(&self, region: &Region) -> u8 {
        region
            .zoom
            .or(self.default_zoom)
            .unwrap_or(FALLBACK_ZOOM)
            .min(self.zoom_ceiling())
    }

    fn zoom_ceiling(&self) -> u8 {
        self.max_zoom.min(MAX_ZOOM)
    }

    #[must_use]
    pub fn placement(&self, region: &Region) -> Placement {
        let (lat, lon) = region.coordinates();

        match region.fit_radius_km() {
            Some(radius_km) => Placement::Fit {
                bounds: BoundingBox::around(lat, lon, radius_km),
                padding: self.padding,
                max_zoom: self.zoom_ceiling(),
            },
            None => Placement::Center {
                lat,
                lon,
                zoom: self.resolve_zoom(region),
            },
        }
    }

    pub fn place(&self, target: &dyn RenderTarget, region: &Region) {
        match self.placement(region) {
            Placement::Center { lat, lon, zoom } => target.set_viewport_center(lat, lon, zoom),
            Placement::Fit {
                bounds,
                padding,
                max_zoom,
            } => target.fit_bounds(bounds, padding, max_zoom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::CONTINENTAL_CENTER;

    #[test]
    fn test_radius_bounding_box() {
        let region = Region::new("Tampa", "FLZ151")
            .with_position(27.94, -82.29)
            .with_radius_km(25.0);

        let Placement::Fit { bounds, .. } = ViewportFitter::default().placement(&region) else {
            panic!("radius should fit bounds");
        };

        assert!((bounds.half_height() - 0.225).abs() < 0.001);
        assert!((bounds.half_width() - 0.255).abs() < 0.001);
        let (lat, lon) = bounds.center();
        assert!((lat - 27.94).abs() < 1e-9);
        assert!((lon + 82.29).abs() < 1e-9);
    }

    #[test]
    fn test_radius_wins_over_zoom() {
        let fitter = ViewportFitter {
            max_zoom: 10,
            ..Default::default()
        };
        let region = Region::new("Tampa", "FLZ151")
            .with_position(27.94, -82.29)
            .with_zoom(12)
            .with_radius_km(40.0);

        assert!(matches!(
            fitter.placement(&region),
            Placement::Fit { max_zoom: 10, padding: 20, .. }
        ));
    }

    #[test]
    fn test_zoom_priority() {
        let fitter = ViewportFitter {
            default_zoom: Some(8),
            ..Default::default()
        };
        let region = Region::new("Test", "OKC109").with_position(35.33, -97.28);
        assert_eq!(fitter.resolve_zoom(&region.clone().with_zoom(11)), 11);
        assert_eq!(fitter.resolve_zoom(&region), 8);

        let fitter = ViewportFitter {
            default_zoom: Some(6),
            ..Default::default()
        };
        assert_eq!(fitter.resolve_zoom(&region), 6);
        assert_eq!(ViewportFitter::default().resolve_zoom(&region), FALLBACK_ZOOM);
    }

    #[test]
    fn test_zoom_capped_by_base_layer() {
        let fitter = ViewportFitter {
            max_zoom: 12,
            ..Default::default()
        };
        let region = Region::new("Test", "OKC109").with_position(35.33, -97.28);
        assert_eq!(fitter.resolve_zoom(&region.clone().with_zoom(200)), 12);

        let fitter = ViewportFitter {
            default_zoom: Some(99),
            max_zoom: u8::MAX,
            ..Default::default()
        };
        assert_eq!(fitter.resolve_zoom(&region), MAX_ZOOM);
        assert!(matches!(
            fitter.placement(&region.with_radius_km(10.0)),
            Placement::Fit { max_zoom: MAX_ZOOM, .. }
        ));
    }

    #[test]
    fn test_missing_coordinates_center_on_continent() {
        let region = Region::new("Unknown", "XXZ000");
        assert_eq!(
            ViewportFitter::default().placement(&region),
            Placement::Center {
                lat: CONTINENTAL_CENTER.0,
                lon: CONTINENTAL_CENTER.1,
                zoom: FALLBACK_ZOOM,
            }
        );
    }
}
