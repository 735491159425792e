// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-memory sample source.
//!
//! [`MemorySource`] replays a fixed timeline of entries per track. It never
//! blocks, supports seeking by timestamp and can inject the failure modes a
//! real demuxer exhibits (slow preparation, read errors, buffering errors).

use std::{collections::VecDeque, io};

use tracing::trace;

use crate::source::{ReadResult, SampleHolder, SampleSource, TrackInfo};

/// One step of a scripted track timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A sample stamped at `time_us`.
    Sample {
        /// Presentation timestamp in microseconds.
        time_us: u64,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
    /// A format announcement, reported as [`ReadResult::FormatRead`].
    Format(TrackInfo),
    /// One read that finds nothing buffered.
    Starved,
    /// One read that fails with an I/O error carrying this message.
    ReadError(String),
}

impl Entry {
    /// Shorthand for [`Entry::Sample`].
    pub fn sample(time_us: u64, payload: impl Into<Vec<u8>>) -> Self {
        Entry::Sample {
            time_us,
            payload: payload.into(),
        }
    }
}

/// Call made by the renderer into the source, recorded in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCall {
    /// [`SampleSource::prepare`].
    Prepare(u64),
    /// [`SampleSource::enable`].
    Enable { index: usize, position_us: u64 },
    /// [`SampleSource::disable`].
    Disable(usize),
    /// [`SampleSource::seek_to`].
    SeekTo(u64),
    /// [`SampleSource::read_data`].
    Read { index: usize, position_us: u64 },
}

struct Track {
    info: TrackInfo,
    entries: Vec<Entry>,
    cursor: usize,
}

impl Track {
    /// Moves the cursor to the first sample at or after `position_us`.
    ///
    /// Non-sample entries belong to the sample that follows them, so the
    /// cursor backs up over any that directly precede the target.
    fn seek(&mut self, position_us: u64) {
        let mut cursor = self
            .entries
            .iter()
            .position(|entry| matches!(entry, Entry::Sample { time_us, .. } if *time_us >= position_us))
            .unwrap_or(self.entries.len());
        while cursor > 0 && !matches!(self.entries[cursor - 1], Entry::Sample { .. }) {
            cursor -= 1;
        }
        self.cursor = cursor;
    }
}

/// Sample source replaying scripted per-track timelines.
///
/// Tracks are declared up front with [`Self::with_track`]. Reads walk the
/// timeline in order. Once a timeline is exhausted, reads report
/// [`ReadResult::EndOfStream`] if the track was marked complete with
/// [`Self::end_of_stream`], and [`ReadResult::NothingRead`] otherwise.
///
/// # Examples
///
/// ```
/// use metarender::source::memory::{Entry, MemorySource};
/// use metarender::source::{ReadResult, SampleHolder, SampleSource, TrackInfo};
///
/// let mut source = MemorySource::new()
///     .with_track(TrackInfo::new("text/plain", Some(1_000_000)))
///     .with_entries(0, [Entry::sample(100_000, "hello")])
///     .end_of_stream(0);
///
/// assert!(source.prepare(0).unwrap());
/// source.enable(0, 0);
/// let mut holder = SampleHolder::new();
/// assert_eq!(source.read_data(0, 0, &mut holder).unwrap(), ReadResult::SampleRead);
/// assert_eq!(holder.payload(), b"hello");
/// assert_eq!(source.read_data(0, 0, &mut holder).unwrap(), ReadResult::EndOfStream);
/// ```
#[derive(Default)]
pub struct MemorySource {
    tracks: Vec<Track>,
    complete: Vec<bool>,
    enabled: Option<usize>,
    pending_not_ready: u32,
    prepare_error: Option<String>,
    buffering_errors: VecDeque<String>,
    calls: Vec<SourceCall>,
}

impl MemorySource {
    /// Creates a source without tracks that is immediately ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track with an empty timeline.
    pub fn with_track(mut self, info: TrackInfo) -> Self {
        self.tracks.push(Track {
            info,
            entries: Vec::new(),
            cursor: 0,
        });
        self.complete.push(false);
        self
    }

    /// Appends entries to the timeline of track `index`.
    ///
    /// # Panics
    ///
    /// Panics if the track was not declared.
    pub fn with_entries(mut self, index: usize, entries: impl IntoIterator<Item = Entry>) -> Self {
        self.push_entries(index, entries);
        self
    }

    /// Marks track `index` as complete: reads past its last entry report
    /// end of stream.
    pub fn end_of_stream(mut self, index: usize) -> Self {
        self.complete[index] = true;
        self
    }

    /// Reports "not ready" for the next `attempts` calls to `prepare`.
    pub fn not_ready_for(mut self, attempts: u32) -> Self {
        self.pending_not_ready = attempts;
        self
    }

    /// Makes every `prepare` call fail with `message`.
    pub fn failing_prepare(mut self, message: impl Into<String>) -> Self {
        self.prepare_error = Some(message.into());
        self
    }

    /// Appends entries while the source is in use.
    pub fn push_entries(&mut self, index: usize, entries: impl IntoIterator<Item = Entry>) {
        self.tracks[index].entries.extend(entries);
    }

    /// Queues a failure for the next `continue_buffering` call.
    pub fn fail_next_buffering(&mut self, message: impl Into<String>) {
        self.buffering_errors.push_back(message.into());
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> &[SourceCall] {
        &self.calls
    }

    /// Number of `read_data` calls received so far.
    pub fn read_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, SourceCall::Read { .. }))
            .count()
    }

    /// Index of the currently enabled track, if any.
    pub fn enabled_track(&self) -> Option<usize> {
        self.enabled
    }
}

impl SampleSource for MemorySource {
    fn prepare(&mut self, position_us: u64) -> io::Result<bool> {
        self.calls.push(SourceCall::Prepare(position_us));
        if let Some(message) = &self.prepare_error {
            return Err(io::Error::other(message.clone()));
        }
        if self.pending_not_ready > 0 {
            self.pending_not_ready -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_info(&self, index: usize) -> TrackInfo {
        self.tracks[index].info.clone()
    }

    fn enable(&mut self, index: usize, position_us: u64) {
        self.calls.push(SourceCall::Enable { index, position_us });
        self.enabled = Some(index);
        self.tracks[index].seek(position_us);
    }

    fn disable(&mut self, index: usize) {
        self.calls.push(SourceCall::Disable(index));
        if self.enabled == Some(index) {
            self.enabled = None;
        }
    }

    fn seek_to(&mut self, position_us: u64) {
        self.calls.push(SourceCall::SeekTo(position_us));
        if let Some(index) = self.enabled {
            self.tracks[index].seek(position_us);
        }
    }

    fn continue_buffering(&mut self, _index: usize, _position_us: u64) -> io::Result<()> {
        match self.buffering_errors.pop_front() {
            Some(message) => Err(io::Error::other(message)),
            None => Ok(()),
        }
    }

    fn read_data(
        &mut self,
        index: usize,
        position_us: u64,
        holder: &mut SampleHolder,
    ) -> io::Result<ReadResult> {
        self.calls.push(SourceCall::Read { index, position_us });
        let complete = self.complete[index];
        let track = &mut self.tracks[index];
        let Some(entry) = track.entries.get(track.cursor) else {
            return Ok(if complete {
                ReadResult::EndOfStream
            } else {
                ReadResult::NothingRead
            });
        };
        track.cursor += 1;
        trace!("Replaying entry {} of track {}", track.cursor - 1, index);
        match entry {
            Entry::Sample { time_us, payload } => {
                holder.replace(payload, *time_us);
                Ok(ReadResult::SampleRead)
            }
            Entry::Format(info) => Ok(ReadResult::FormatRead(info.clone())),
            Entry::Starved => Ok(ReadResult::NothingRead),
            Entry::ReadError(message) => Err(io::Error::other(message.clone())),
        }
    }
}
