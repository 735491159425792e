// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Metadata track renderer.
//!
//! [`MetadataTrackRenderer`] pulls samples of one metadata track from a
//! [`SampleSource`], parses each into a value and delivers it when the
//! playback position reaches the sample timestamp.
//!
//! ## Tick Algorithm
//!
//! Every call to [`TrackRenderer::do_some_work`]:
//!
//! 1. Lets the source buffer more data. Failures are logged and deferred.
//! 2. Pulls one sample if none is pending and the stream has not ended. The
//!    payload is parsed immediately, then the sample buffer is cleared.
//!    Parse failures are returned; I/O failures are logged and deferred.
//! 3. Delivers the pending value if its timestamp is at or before the
//!    playback position. At most one value is delivered per tick. A value
//!    the delivery target refuses stays pending and is posted again on the
//!    next tick.
//!
//! A slow tick rate can therefore delay deliveries but never skips or batches
//! them.
//!
//! ## Lifecycle
//!
//! ```text
//! Unprepared ──prepare──► Prepared ──enable──► Enabled ──start──► Started
//!     │                      ▲                   │  ▲                │
//!     │ (no track)           └─────disable───────┘  └──────stop──────┘
//!     ▼
//!  Ignored                 release: Unprepared/Prepared/Ignored ──► Released
//! ```

use std::io;

use tracing::{debug, trace, warn};

use crate::{
    Error, Result,
    config::RendererConfig,
    delivery::Delivery,
    parser::MetadataParser,
    pending::GateState,
    source::{ReadResult, SampleHolder, SampleSource},
};

/// Lifecycle state of a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// Waiting for a successful [`TrackRenderer::prepare`].
    Unprepared,
    /// A track was selected; the renderer is idle.
    Prepared,
    /// The source has no track this renderer can handle.
    Ignored,
    /// The track is active and ticks are accepted.
    Enabled,
    /// Playback is running. Behaves like [`RendererState::Enabled`].
    Started,
    /// Terminal state.
    Released,
}

impl RendererState {
    /// Returns `true` if the renderer accepts ticks and seeks.
    pub fn is_active(self) -> bool {
        matches!(self, RendererState::Enabled | RendererState::Started)
    }
}

/// Result of [`TrackRenderer::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The source is not ready yet. Call `prepare` again later.
    NotReady,
    /// A track was selected.
    Prepared {
        /// Index of the selected track within the source.
        track_index: usize,
    },
    /// No track matches; the renderer takes no further part in playback.
    Ignored,
}

/// How far ahead a renderer has buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferedPosition {
    /// Everything up to the end of the track is available.
    EndOfTrack,
    /// The buffered position is not known.
    Unknown,
    /// Buffered up to this position, in microseconds.
    Us(u64),
}

/// Renderer interface used by the playback driver.
pub trait TrackRenderer {
    /// Prepares the renderer, selecting a track.
    fn prepare(&mut self, position_us: u64) -> Result<PrepareOutcome>;

    /// Activates the selected track at `position_us`.
    fn enable(&mut self, position_us: u64, joining: bool) -> Result<()>;

    /// Signals that playback started.
    fn start(&mut self) -> Result<()>;

    /// Signals that playback stopped.
    fn stop(&mut self) -> Result<()>;

    /// Handles a discontinuity to `position_us`.
    fn seek_to(&mut self, position_us: u64) -> Result<()>;

    /// Performs one tick of work at playback position `position_us`.
    fn do_some_work(&mut self, position_us: u64, elapsed_realtime_us: u64) -> Result<()>;

    /// Deactivates the track.
    fn disable(&mut self) -> Result<()>;

    /// Releases the renderer for good.
    fn release(&mut self) -> Result<()>;

    /// Returns `true` once the renderer has nothing more to render.
    fn is_ended(&self) -> bool;

    /// Returns `true` if the renderer does not hold back playback.
    fn is_ready(&self) -> bool;

    /// Reports how far ahead the renderer has buffered.
    fn buffered_position(&self) -> BufferedPosition;

    /// Duration of the rendered track in microseconds, if known.
    fn duration_us(&self) -> Option<u64>;
}

/// Renderer for a timed metadata track.
///
/// Holds at most one parsed value at a time and hands it to its [`Delivery`]
/// once due. All work happens on the caller's thread and never blocks.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use metarender::{
///     Delivery, MetadataTrackRenderer, PrepareOutcome, TrackRenderer,
///     parser::TextMetadataParser,
///     source::{TrackInfo, memory::{Entry, MemorySource}},
/// };
///
/// # fn main() -> Result<(), metarender::Error> {
/// let source = MemorySource::new()
///     .with_track(TrackInfo::new("text/plain", Some(10_000_000)))
///     .with_entries(0, [Entry::sample(100_000, "chapter one")])
///     .end_of_stream(0);
/// let shown = Arc::new(Mutex::new(Vec::new()));
/// let sink = shown.clone();
/// let mut renderer = MetadataTrackRenderer::new(
///     source,
///     TextMetadataParser,
///     Delivery::direct(move |title: String| sink.lock().unwrap().push(title)),
/// );
///
/// assert_eq!(renderer.prepare(0)?, PrepareOutcome::Prepared { track_index: 0 });
/// renderer.enable(0, false)?;
/// renderer.do_some_work(50_000, 0)?;
/// assert!(shown.lock().unwrap().is_empty());
/// renderer.do_some_work(150_000, 0)?;
/// assert_eq!(*shown.lock().unwrap(), vec!["chapter one".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct MetadataTrackRenderer<T, S, P> {
    source: S,
    parser: P,
    delivery: Delivery<T>,
    config: RendererConfig,
    holder: SampleHolder,
    track_index: usize,
    state: RendererState,
    gate: GateState<T>,
    consecutive_io_failures: u32,
}

impl<T, S, P> MetadataTrackRenderer<T, S, P>
where
    S: SampleSource,
    P: MetadataParser<T>,
{
    /// Creates a renderer with the default [`RendererConfig`].
    pub fn new(source: S, parser: P, delivery: Delivery<T>) -> Self {
        Self::with_config(source, parser, delivery, RendererConfig::default())
    }

    /// Creates a renderer with an explicit configuration.
    pub fn with_config(source: S, parser: P, delivery: Delivery<T>, config: RendererConfig) -> Self {
        Self {
            holder: SampleHolder::with_capacity(config.sample_buffer_capacity),
            source,
            parser,
            delivery,
            config,
            track_index: 0,
            state: RendererState::Unprepared,
            gate: GateState::default(),
            consecutive_io_failures: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Index of the selected track, once prepared.
    pub fn track_index(&self) -> Option<usize> {
        match self.state {
            RendererState::Unprepared | RendererState::Ignored | RendererState::Released => None,
            _ => Some(self.track_index),
        }
    }

    /// Timestamp of the value waiting for delivery, if any.
    pub fn pending_timestamp_us(&self) -> Option<u64> {
        self.gate.pending().map(|item| item.timestamp_us)
    }

    /// The configuration in use.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The delivery channel in use.
    pub fn delivery(&self) -> &Delivery<T> {
        &self.delivery
    }

    /// Borrows the parser.
    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Borrows the source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutably borrows the source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn expect_state(&self, operation: &'static str, allowed: &[RendererState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Resets the gate after a discontinuity and, if configured, invalidates
    /// deliveries already posted.
    fn discontinuity(&mut self, position_us: u64) {
        if let Some(stale) = self.gate.reset() {
            trace!(
                "Discarding metadata at {}us after discontinuity to {}us",
                stale.timestamp_us, position_us
            );
        }
        self.consecutive_io_failures = 0;
        if self.config.drop_stale_deliveries {
            self.delivery.invalidate();
        }
    }

    /// Pulls one sample. Returns the transient I/O failure, if any.
    fn pull_sample(&mut self, position_us: u64) -> Result<Option<io::Error>> {
        let result = self
            .source
            .read_data(self.track_index, position_us, &mut self.holder);
        match result {
            Ok(ReadResult::SampleRead) => {
                let timestamp_us = self.holder.time_us;
                let parsed = self.parser.parse(self.holder.payload());
                self.holder.clear();
                let value = parsed.inspect_err(|err| {
                    debug!("Dropping sample at {}us: {}", timestamp_us, err);
                })?;
                trace!("Holding metadata for {}us", timestamp_us);
                self.gate.hold(timestamp_us, value);
            }
            Ok(ReadResult::EndOfStream) => {
                debug!("Metadata track {} ended", self.track_index);
                self.gate.mark_ended();
            }
            Ok(ReadResult::FormatRead(info)) => {
                debug!(
                    "Metadata track {} format: {}",
                    self.track_index, info.mime_type
                );
            }
            Ok(ReadResult::NothingRead) => {}
            Err(err) => return Ok(Some(err)),
        }
        Ok(None)
    }

    /// Logs a transient failure and decides whether it is still deferred.
    fn defer_io_failures(&mut self, failures: Vec<(&'static str, io::Error)>) -> Result<()> {
        if failures.is_empty() {
            self.consecutive_io_failures = 0;
            return Ok(());
        }
        self.consecutive_io_failures = self.consecutive_io_failures.saturating_add(1);
        let limit = self.config.max_consecutive_io_failures;
        let mut last = None;
        for (operation, err) in failures {
            warn!(
                "Deferring {} failure on metadata track {} ({} consecutive): {}",
                operation, self.track_index, self.consecutive_io_failures, err
            );
            last = Some(err);
        }
        match (limit, last) {
            (Some(limit), Some(err)) if self.consecutive_io_failures >= limit => {
                Err(Error::Playback(err))
            }
            _ => Ok(()),
        }
    }
}

impl<T, S, P> TrackRenderer for MetadataTrackRenderer<T, S, P>
where
    S: SampleSource,
    P: MetadataParser<T>,
{
    /// Probes the source and selects the first track the parser handles.
    ///
    /// # Errors
    ///
    /// - [`Error::Playback`] if the source fails to prepare
    /// - [`Error::InvalidState`] unless the renderer is unprepared
    fn prepare(&mut self, position_us: u64) -> Result<PrepareOutcome> {
        self.expect_state("prepare", &[RendererState::Unprepared])?;
        if !self.source.prepare(position_us).map_err(Error::Playback)? {
            trace!("Source not ready at {}us", position_us);
            return Ok(PrepareOutcome::NotReady);
        }
        let selected = (0..self.source.track_count())
            .find(|&index| self.parser.can_parse(&self.source.track_info(index).mime_type));
        match selected {
            Some(track_index) => {
                debug!("Selected metadata track {}", track_index);
                self.track_index = track_index;
                self.state = RendererState::Prepared;
                Ok(PrepareOutcome::Prepared { track_index })
            }
            None => {
                debug!("No metadata track among {} tracks", self.source.track_count());
                self.state = RendererState::Ignored;
                Ok(PrepareOutcome::Ignored)
            }
        }
    }

    fn enable(&mut self, position_us: u64, joining: bool) -> Result<()> {
        self.expect_state("enable", &[RendererState::Prepared])?;
        debug!(
            "Enabling metadata track {} at {}us (joining: {})",
            self.track_index, position_us, joining
        );
        self.source.enable(self.track_index, position_us);
        self.discontinuity(position_us);
        self.state = RendererState::Enabled;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.expect_state("start", &[RendererState::Enabled])?;
        self.state = RendererState::Started;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.expect_state("stop", &[RendererState::Started])?;
        self.state = RendererState::Enabled;
        Ok(())
    }

    fn seek_to(&mut self, position_us: u64) -> Result<()> {
        self.expect_state("seek", &[RendererState::Enabled, RendererState::Started])?;
        debug!("Seeking metadata track {} to {}us", self.track_index, position_us);
        self.source.seek_to(position_us);
        self.discontinuity(position_us);
        Ok(())
    }

    /// Runs one tick of the dispatch gate.
    ///
    /// # Errors
    ///
    /// - [`Error::Parse`] if the pulled sample is malformed
    /// - [`Error::Playback`] if transient failures exceed the configured limit
    /// - [`Error::TargetClosed`] / [`Error::TargetFull`] if a deferred
    ///   delivery cannot be posted; the value stays pending
    /// - [`Error::InvalidState`] unless the renderer is enabled or started
    fn do_some_work(&mut self, position_us: u64, elapsed_realtime_us: u64) -> Result<()> {
        self.expect_state(
            "do some work",
            &[RendererState::Enabled, RendererState::Started],
        )?;
        trace!(
            "Metadata tick at {}us (realtime {}us)",
            position_us, elapsed_realtime_us
        );

        let mut failures = Vec::new();
        if let Err(err) = self.source.continue_buffering(self.track_index, position_us) {
            failures.push(("continue buffering", err));
        }
        let mut parsed = Ok(());
        if self.gate.wants_sample() {
            match self.pull_sample(position_us) {
                Ok(Some(err)) => failures.push(("read", err)),
                Ok(None) => {}
                Err(err) => parsed = Err(err),
            }
        }
        // Buffering failures count even when the pulled payload is malformed.
        self.defer_io_failures(failures)?;
        parsed?;

        if let Some(item) = self.gate.take_due(position_us) {
            trace!(
                "Delivering metadata for {}us at {}us",
                item.timestamp_us, position_us
            );
            if let Err(rejected) = self.delivery.deliver(item.value) {
                debug!(
                    "Keeping metadata for {}us pending: {}",
                    item.timestamp_us, rejected.error
                );
                self.gate.hold(item.timestamp_us, rejected.message.into_value());
                return Err(rejected.error);
            }
        }
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        self.expect_state("disable", &[RendererState::Enabled])?;
        debug!("Disabling metadata track {}", self.track_index);
        if let Some(stale) = self.gate.discard_pending() {
            trace!("Discarding metadata at {}us on disable", stale.timestamp_us);
        }
        self.source.disable(self.track_index);
        if self.config.drop_stale_deliveries {
            self.delivery.invalidate();
        }
        self.state = RendererState::Prepared;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.state == RendererState::Started {
            self.stop()?;
        }
        if self.state == RendererState::Enabled {
            self.disable()?;
        }
        self.expect_state(
            "release",
            &[
                RendererState::Unprepared,
                RendererState::Prepared,
                RendererState::Ignored,
            ],
        )?;
        debug!("Releasing metadata renderer");
        self.state = RendererState::Released;
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.gate.is_ended()
    }

    /// Metadata never holds back playback: ready whenever enabled.
    fn is_ready(&self) -> bool {
        self.state.is_active()
    }

    /// Metadata does not limit how far ahead other tracks may render.
    fn buffered_position(&self) -> BufferedPosition {
        BufferedPosition::EndOfTrack
    }

    fn duration_us(&self) -> Option<u64> {
        self.track_index()
            .and_then(|index| self.source.track_info(index).duration_us)
    }
}
