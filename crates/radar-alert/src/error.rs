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

//! Error types shared across the crate.

use thiserror::Error;

/// Failures while retrieving or interpreting a remote resource.
///
/// None of these are fatal: callers log them and degrade to "no alert" or a
/// fallback visual.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed (status {status}): {reason}")]
    Failed {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Configuration defects. Each one is logged and replaced by a safe default.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown alert provider '{0}'")]
    UnknownProvider(String),

    #[error("invalid tile URL template '{0}'")]
    InvalidTileTemplate(String),

    #[error("region '{name}': {reason}")]
    InvalidRegion { name: String, reason: String },
}

/// Audio cue playback failures.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("sound '{0}' not found")]
    NotFound(String),

    #[error("audio playback failed: {0}")]
    Playback(String),
}
