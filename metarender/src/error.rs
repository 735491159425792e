// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for metadata rendering.
//!
//! This module defines the error types returned by the renderer, the metadata
//! parsers and the delivery channel. The variants follow the three failure
//! classes of the rendering stage:
//!
//! - fatal pipeline failures ([`Error::Playback`])
//! - malformed sample payloads ([`Error::Parse`])
//! - misuse of the renderer lifecycle ([`Error::InvalidState`])
//!
//! Transient I/O failures during per-tick work never surface as an [`Error`]
//! unless a failure threshold is configured (see
//! [`crate::config::RendererConfig::max_consecutive_io_failures`]).

use std::io;

use crate::renderer::RendererState;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while rendering timed metadata.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unrecoverable source failure. Playback of the pipeline must stop.
    ///
    /// Raised when the source fails while being prepared, or when transient
    /// failures exceed the configured threshold.
    #[error("Playback error: {0}")]
    Playback(#[source] io::Error),

    /// A sample payload could not be parsed into a metadata value.
    #[error("Malformed metadata: {0}")]
    Parse(String),

    /// A configuration document is not valid JSON for the expected schema.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A lifecycle operation was invoked in a state that does not allow it.
    #[error("Cannot {operation} while renderer is {state:?}")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Renderer state at the time of the call.
        state: RendererState,
    },

    /// The target context is no longer accepting messages.
    #[error("Delivery target closed")]
    TargetClosed,

    /// The target context queue is full.
    #[error("Delivery target full")]
    TargetFull,

    /// A generic error not covered by the variants above.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Returns `true` if this error must abort playback of the whole pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Playback(_))
    }

    /// Builds a [`Error::Parse`] from anything printable.
    pub fn parse<E: std::fmt::Display>(err: E) -> Self {
        Error::Parse(err.to_string())
    }
}
