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

//! Alert feed variants.
//!
//! Each provider knows how to build its query URL for a region and how to
//! pull event types out of a response body. The monitor iterates providers
//! without knowing which feed it is talking to.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ConfigError, FetchError};
use crate::region::Region;

pub const NWS_URL_TEMPLATE: &str = "https://api.weather.gov/alerts/active?zone={region}";
pub const METEOALARM_URL_TEMPLATE: &str =
    "https://feeds.meteoalarm.org/api/v1/warnings/feeds-{region}";

/// One event extracted from a provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub event_type: String,
    pub headline: String,
    pub description: String,
}

/// Supported alert feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertProvider {
    /// US National Weather Service active alerts (GeoJSON).
    Nws { url_template: String },
    /// MeteoAlarm country feeds.
    MeteoAlarm { url_template: String },
    /// Any other feed returning the NWS GeoJSON shape.
    GeoJson { name: String, url_template: String },
}

impl AlertProvider {
    #[must_use]
    pub fn nws() -> Self {
        Self::Nws {
            url_template: NWS_URL_TEMPLATE.to_string(),
        }
    }

    #[must_use]
    pub fn meteoalarm() -> Self {
        Self::MeteoAlarm {
            url_template: METEOALARM_URL_TEMPLATE.to_string(),
        }
    }

    /// Resolve a configured provider name. `templates` overrides the default
    /// URL of a built-in provider and defines custom GeoJSON providers.
    pub fn from_name(name: &str, templates: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let key = name.trim().to_ascii_lowercase();
        let template = templates.get(&key).or_else(|| templates.get(name)).cloned();

        match key.as_str() {
            "nws" => Ok(Self::Nws {
                url_template: template.unwrap_or_else(|| NWS_URL_TEMPLATE.to_string()),
            }),
            "meteoalarm" => Ok(Self::MeteoAlarm {
                url_template: template.unwrap_or_else(|| METEOALARM_URL_TEMPLATE.to_string()),
            }),
            _ => template
                .map(|url_template| Self::GeoJson {
                    name: name.to_string(),
                    url_template,
                })
                .ok_or_else(|| ConfigError::UnknownProvider(name.to_string())),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Nws { .. } => "nws",
            Self::MeteoAlarm { .. } => "meteoalarm",
            Self::GeoJson { name, .. } => name,
        }
    }

    fn url_template(&self) -> &str {
        match self {
            Self::Nws { url_template }
            | Self::MeteoAlarm { url_template }
            | Self::GeoJson { url_template, .. } => url_template,
        }
    }

    /// Query URL for `region`, or `None` when the region has no identifier.
    #[must_use]
    pub fn resolve_query_url(&self, region: &Region) -> Option<String> {
        let id = region.alert_id.trim();
        if id.is_empty() {
            return None;
        }
        Some(self.url_template().replace("{region}", id))
    }

    /// Extract events from a response body.
    pub fn extract_events(&self, url: &str, body: &str) -> Result<Vec<ProviderEvent>, FetchError> {
        let malformed = |e: serde_json::Error| FetchError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        };

        match self {
            Self::Nws { .. } | Self::GeoJson { .. } => {
                let collection: FeatureCollection = serde_json::from_str(body).map_err(malformed)?;
                Ok(collection
                    .features
                    .into_iter()
                    .filter_map(|feature| {
                        let props = feature.properties;
                        props.event.map(|event_type| ProviderEvent {
                            event_type,
                            headline: props.headline.unwrap_or_default(),
                            description: props.description.unwrap_or_default(),
                        })
                    })
                    .collect())
            }
            Self::MeteoAlarm { .. } => {
                let feed: MeteoAlarmFeed = serde_json::from_str(body).map_err(malformed)?;
                Ok(feed
                    .warnings
                    .into_iter()
                    .flat_map(|warning| warning.alert.info)
                    .filter_map(|info| {
                        info.event.map(|event_type| ProviderEvent {
                            event_type,
                            headline: info.headline.unwrap_or_default(),
                            description: info.description.unwrap_or_default(),
                        })
                    })
                    .collect())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    event: Option<String>,
    headline: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeteoAlarmFeed {
    #[serde(default)]
    warnings: Vec<MeteoAlarmWarning>,
}

#[derive(Debug, Deserialize)]
struct MeteoAlarmWarning {
    #[serde(default)]
    alert: MeteoAlarmAlert,
}

#[derive(Debug, Default, Deserialize)]
struct MeteoAlarmAlert {
    #[serde(default)]
    info: Vec<MeteoAlarmInfo>,
}

#[derive(Debug, Deserialize)]
struct MeteoAlarmInfo {
    event: Option<String>,
    headline: Option<String>,
    description: Option<String>,
}
