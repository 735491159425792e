// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Sample source contract consumed by the renderer.
//!
//! This module defines what the renderer needs from an upstream demuxer:
//! - Track enumeration and description ([`TrackInfo`])
//! - Readiness probing and per-track activation
//! - Non-blocking sample pulls into a reusable [`SampleHolder`] ([`ReadResult`])
//!
//! Buffering and demuxing stay inside the source. The renderer only holds the
//! source and the index of the track it selected during preparation.
//!
//! [`memory::MemorySource`] is a scripted implementation used by the demo and
//! the tests.

pub mod holder;
pub mod memory;

use std::io;

pub use holder::SampleHolder;

/// Description of one track exposed by a [`SampleSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// MIME type of the track content, e.g. `application/json`.
    pub mime_type: String,
    /// Declared track duration in microseconds, `None` if unknown.
    pub duration_us: Option<u64>,
}

impl TrackInfo {
    /// Creates a track description.
    pub fn new(mime_type: impl Into<String>, duration_us: Option<u64>) -> Self {
        Self {
            mime_type: mime_type.into(),
            duration_us,
        }
    }
}

/// Outcome of a single non-blocking [`SampleSource::read_data`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// A sample was written into the caller's [`SampleHolder`].
    SampleRead,
    /// The track format was (re)announced. No sample was produced.
    FormatRead(TrackInfo),
    /// Nothing is buffered yet. The caller retries on a later tick.
    NothingRead,
    /// The track has no more samples.
    EndOfStream,
}

/// Upstream provider of timestamped samples.
///
/// Implementations must never block in [`Self::read_data`]: when no sample
/// is buffered they return [`ReadResult::NothingRead`] immediately.
pub trait SampleSource {
    /// Tries to make the source ready, starting at `position_us`.
    ///
    /// Returns `Ok(false)` if the source needs more time. An error means the
    /// source cannot be read at all.
    fn prepare(&mut self, position_us: u64) -> io::Result<bool>;

    /// Number of tracks exposed once prepared.
    fn track_count(&self) -> usize;

    /// Describes the track at `index`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `index >= track_count()`.
    fn track_info(&self, index: usize) -> TrackInfo;

    /// Activates track `index`, starting at `position_us`.
    fn enable(&mut self, index: usize, position_us: u64);

    /// Deactivates track `index`.
    fn disable(&mut self, index: usize);

    /// Repositions all enabled tracks to `position_us`.
    fn seek_to(&mut self, position_us: u64);

    /// Lets the source buffer more data for track `index`.
    fn continue_buffering(&mut self, index: usize, position_us: u64) -> io::Result<()>;

    /// Pulls the next sample of track `index` without blocking.
    ///
    /// On [`ReadResult::SampleRead`] the sample payload and timestamp are
    /// written to `holder`.
    fn read_data(
        &mut self,
        index: usize,
        position_us: u64,
        holder: &mut SampleHolder,
    ) -> io::Result<ReadResult>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn prepare(&mut self, position_us: u64) -> io::Result<bool> {
        (**self).prepare(position_us)
    }

    fn track_count(&self) -> usize {
        (**self).track_count()
    }

    fn track_info(&self, index: usize) -> TrackInfo {
        (**self).track_info(index)
    }

    fn enable(&mut self, index: usize, position_us: u64) {
        (**self).enable(index, position_us)
    }

    fn disable(&mut self, index: usize) {
        (**self).disable(index)
    }

    fn seek_to(&mut self, position_us: u64) {
        (**self).seek_to(position_us)
    }

    fn continue_buffering(&mut self, index: usize, position_us: u64) -> io::Result<()> {
        (**self).continue_buffering(index, position_us)
    }

    fn read_data(
        &mut self,
        index: usize,
        position_us: u64,
        holder: &mut SampleHolder,
    ) -> io::Result<ReadResult> {
        (**self).read_data(index, position_us, holder)
    }
}
