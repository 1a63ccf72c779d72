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

//! Radar frame metadata and frame URL construction.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::FetchCache;
use crate::error::FetchError;

pub const RAINVIEWER_METADATA_URL: &str = "https://api.rainviewer.com/public/weather-maps.json";

/// One radar observation, convertible to a fetchable tile URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub timestamp: DateTime<Utc>,
    /// Tile URL with `{z}`, `{x}` and `{y}` left for the render target.
    pub url_template: String,
}

/// Rendering parameters for radar imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileParams {
    pub size: u16,
    /// Colour palette index.
    pub color: u8,
    pub smooth: bool,
    pub snow: bool,
}

impl Default for TileParams {
    fn default() -> Self {
        Self {
            size: 256,
            color: 4,
            smooth: true,
            snow: true,
        }
    }
}

impl TileParams {
    fn suffix(&self) -> String {
        format!("{}/{}_{}.png", self.color, u8::from(self.smooth), u8::from(self.snow))
    }

    /// `{host}{path}/{size}/{z}/{x}/{y}/{color}/{smooth}_{snow}.png`
    #[must_use]
    pub fn tile_url(&self, host: &str, path: &str) -> String {
        format!("{host}{path}/{}/{{z}}/{{x}}/{{y}}/{}", self.size, self.suffix())
    }

    /// Single image centred on a coordinate:
    /// `{host}{path}/{size}/{zoom}/{lat}/{lon}/{color}/{smooth}_{snow}.png`
    #[must_use]
    pub fn image_url(&self, host: &str, path: &str, zoom: u8, lat: f64, lon: f64) -> String {
        format!(
            "{host}{path}/{}/{zoom}/{lat:.4}/{lon:.4}/{}",
            self.size,
            self.suffix()
        )
    }
}

#[derive(Debug, Deserialize)]
struct RadarMetadata {
    host: String,
    radar: RadarFrames,
}

#[derive(Debug, Deserialize)]
struct RadarFrames {
    #[serde(default)]
    past: Vec<RawFrame>,
    #[serde(default)]
    nowcast: Vec<RawFrame>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFrame {
    Timestamp(i64),
    Entry { time: i64, path: Option<String> },
}

impl RawFrame {
    fn into_parts(self) -> (i64, String) {
        match self {
            Self::Timestamp(time) => (time, format!("/v2/radar/{time}")),
            Self::Entry { time, path } => {
                let path = path.unwrap_or_else(|| format!("/v2/radar/{time}"));
                (time, path)
            }
        }
    }
}

/// Frame metadata resolved to a host and ordered `(timestamp, path)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameIndex {
    pub host: String,
    pub frames: Vec<(DateTime<Utc>, String)>,
}

impl FrameIndex {
    /// Parse a metadata document. Frames are ordered oldest first.
    pub fn parse(url: &str, body: &serde_json::Value, include_nowcast: bool) -> Result<Self, FetchError> {
        let metadata = RadarMetadata::deserialize(body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut raw = metadata.radar.past;
        if include_nowcast {
            raw.extend(metadata.radar.nowcast);
        }

        let mut frames: Vec<(DateTime<Utc>, String)> = raw
            .into_iter()
            .map(RawFrame::into_parts)
            .filter_map(|(time, path)| DateTime::from_timestamp(time, 0).map(|ts| (ts, path)))
            .collect();
        frames.sort_by_key(|(ts, _)| *ts);

        Ok(Self {
            host: metadata.host,
            frames,
        })
    }

    /// Tile frame descriptors for the map overlay.
    #[must_use]
    pub fn tile_frames(&self, params: &TileParams) -> Vec<FrameDescriptor> {
        self.frames
            .iter()
            .map(|(timestamp, path)| FrameDescriptor {
                timestamp: *timestamp,
                url_template: params.tile_url(&self.host, path),
            })
            .collect()
    }

    /// Single-image URLs centred on `(lat, lon)`.
    #[must_use]
    pub fn image_frames(&self, params: &TileParams, zoom: u8, lat: f64, lon: f64) -> Vec<FrameDescriptor> {
        self.frames
            .iter()
            .map(|(timestamp, path)| FrameDescriptor {
                timestamp: *timestamp,
                url_template: params.image_url(&self.host, path, zoom, lat, lon),
            })
            .collect()
    }
}

/// Fetch and parse radar metadata through the cache.
pub async fn fetch_index(
    cache: &FetchCache,
    url: &str,
    ttl: std::time::Duration,
    include_nowcast: bool,
) -> Result<FrameIndex, FetchError> {
    let body = cache.fetch_json(url, ttl).await?;
    FrameIndex::parse(url, &body, include_nowcast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mixed_entries() {
        let body = json!({
            "host": "https://tilecache.rainviewer.com",
            "radar": {
                "past": [
                    {"time": 1_700_000_600, "path": "/v2/radar/abc"},
                    1_700_000_000,
                ],
                "nowcast": [{"time": 1_700_001_200, "path": "/v2/radar/nowcast_1"}]
            }
        });

        let index = FrameIndex::parse("u", &body, false).unwrap();
        assert_eq!(index.frames.len(), 2);
        assert_eq!(index.frames[0].1, "/v2/radar/1700000000");
        assert_eq!(index.frames[1].1, "/v2/radar/abc");

        let index = FrameIndex::parse("u", &body, true).unwrap();
        assert_eq!(index.frames.len(), 3);
        assert_eq!(index.frames[2].1, "/v2/radar/nowcast_1");
    }

    #[test]
    fn test_tile_url() {
        let params = TileParams {
            color: 2,
            smooth: false,
            ..Default::default()
        };
        assert_eq!(
            params.tile_url("https://tilecache.rainviewer.com", "/v2/radar/abc"),
            "https://tilecache.rainviewer.com/v2/radar/abc/256/{z}/{x}/{y}/2/0_1.png"
        );
    }

    #[test]
    fn test_image_url() {
        let params = TileParams {
            size: 512,
            ..Default::default()
        };
        assert_eq!(
            params.image_url("https://h", "/v2/radar/1", 7, 35.33, -97.28),
            "https://h/v2/radar/1/512/7/35.3300/-97.2800/4/1_1.png"
        );
    }

    #[test]
    fn test_parse_rejects_missing_host() {
        let err = FrameIndex::parse("u", &json!({"radar": {"past": []}}), false).unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
    }
}
