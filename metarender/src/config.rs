// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Renderer configuration.
//!
//! [`RendererConfig`] tunes how the renderer reacts to transient source
//! failures and to stale deferred deliveries. It can be built in code or
//! loaded from a JSON document:
//!
//! ```json
//! {
//!   "max_consecutive_io_failures": 5,
//!   "drop_stale_deliveries": true,
//!   "sample_buffer_capacity": 4096
//! }
//! ```
//!
//! Missing fields take their [`Default`] values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Default initial capacity of the renderer's sample buffer, in bytes.
pub const DEFAULT_SAMPLE_BUFFER_CAPACITY: usize = 1024;

/// Tuning knobs for [`crate::MetadataTrackRenderer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Number of consecutive transient I/O failures (buffering or pulling)
    /// after which the renderer reports [`crate::Error::Playback`].
    ///
    /// `None` defers transient failures indefinitely; a persistent fault is
    /// then expected to resurface through a later read.
    pub max_consecutive_io_failures: Option<u32>,

    /// Invalidate already posted deferred deliveries on seek and disable.
    ///
    /// Only receivers checking the delivery generation honour this.
    pub drop_stale_deliveries: bool,

    /// Initial capacity of the sample buffer lent to the source.
    pub sample_buffer_capacity: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_consecutive_io_failures: None,
            drop_stale_deliveries: false,
            sample_buffer_capacity: DEFAULT_SAMPLE_BUFFER_CAPACITY,
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] for malformed JSON or unknown fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use metarender::config::RendererConfig;
    ///
    /// let config = RendererConfig::from_json_str(r#"{"drop_stale_deliveries": true}"#).unwrap();
    /// assert!(config.drop_stale_deliveries);
    /// assert_eq!(config.max_consecutive_io_failures, None);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Io`] if the file cannot be read
    /// - [`crate::Error::Json`] if its content is not a valid configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Sets [`Self::max_consecutive_io_failures`].
    pub fn with_max_consecutive_io_failures(mut self, limit: u32) -> Self {
        self.max_consecutive_io_failures = Some(limit);
        self
    }

    /// Sets [`Self::drop_stale_deliveries`].
    pub fn with_drop_stale_deliveries(mut self, drop_stale: bool) -> Self {
        self.drop_stale_deliveries = drop_stale;
        self
    }
}
