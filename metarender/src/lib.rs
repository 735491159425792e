// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # metarender - timed metadata rendering
//!
//! A single-track rendering stage for timed metadata in a media pipeline. The
//! renderer pulls timestamped samples from a source, parses each into a typed
//! value, and hands that value to a consumer once the playback clock reaches
//! the sample timestamp.
//!
//! ## Overview
//!
//! Three independently paced processes meet in the renderer:
//!
//! - **Source availability**: samples may not be buffered yet
//! - **Playback time**: advanced by the driver, jumping on seeks
//! - **Consumer delivery**: optionally on another thread
//!
//! The renderer holds at most one undelivered value and never blocks the
//! driver.
//!
//! ## Architecture
//!
//! ```text
//! driver tick ──► SampleSource ──► MetadataParser ──► pending value
//!                  (read_data)       (parse)              │
//!                                                         ▼ timestamp <= position
//!                                             Delivery ──► MetadataOutput
//!                                     (direct or via MessageTarget)
//! ```
//!
//! ## Examples
//!
//! ### Rendering chapter titles on a dedicated thread
//!
//! ```
//! use metarender::{
//!     ContextThread, Delivery, MetadataTrackRenderer, TrackRenderer,
//!     parser::TextMetadataParser,
//!     source::{TrackInfo, memory::{Entry, MemorySource}},
//! };
//!
//! # fn main() -> Result<(), metarender::Error> {
//! let source = MemorySource::new()
//!     .with_track(TrackInfo::new("text/plain", None))
//!     .with_entries(0, [Entry::sample(0, "Opening"), Entry::sample(90_000_000, "Act I")])
//!     .end_of_stream(0);
//!
//! let context = ContextThread::spawn("chapters", |title: String| println!("{title}"))?;
//! let mut renderer = MetadataTrackRenderer::new(source, TextMetadataParser, Delivery::from(context));
//!
//! renderer.prepare(0)?;
//! renderer.enable(0, false)?;
//! for position_us in (0..=100_000_000).step_by(10_000_000) {
//!     renderer.do_some_work(position_us, position_us)?;
//! }
//! renderer.release()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - Source failures while preparing are fatal ([`Error::Playback`])
//! - Transient I/O failures during ticks are logged and deferred
//! - Malformed payloads fail the tick ([`Error::Parse`])
//!
//! See [`config::RendererConfig`] to surface persistent transient failures
//! and to drop deliveries made stale by a seek.
//!
//! ## Thread Safety
//!
//! - [`MetadataTrackRenderer`] is driven through `&mut self` from one thread
//! - Deferred deliveries carry only the parsed value across threads
//! - [`ContextThread`] runs the consumer in submission order

pub mod config;
pub mod delivery;
mod error;
pub mod parser;
pub mod pending;
mod renderer;
pub mod source;

pub use delivery::{
    ContextThread, Delivery, MessageTarget, MetadataMessage, MetadataOutput, Rejected,
};
pub use error::{Error, Result};
pub use parser::MetadataParser;
pub use pending::PendingMetadata;
pub use renderer::{
    BufferedPosition, MetadataTrackRenderer, PrepareOutcome, RendererState, TrackRenderer,
};
pub use source::{ReadResult, SampleHolder, SampleSource, TrackInfo};
