// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Plays a scripted chapter track against a simulated clock.
//!
//! Chapter markers are JSON samples. They are parsed by the renderer on the
//! driver thread and printed by a dedicated context thread once the clock
//! reaches them. An optional seek shows pending values being discarded.
//!
//! ```text
//! cargo run --example timed_metadata -- --chapters 6 --seek-at 20000 --seek-to 5000
//! ```

mod common;

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use metarender::{
    ContextThread, Delivery, MetadataTrackRenderer, PrepareOutcome, TrackRenderer,
    config::RendererConfig,
    parser::{JsonMetadataParser, MIME_JSON},
    source::{
        TrackInfo,
        memory::{Entry, MemorySource},
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of chapter markers on the track
    #[arg(short, long, default_value_t = 5)]
    chapters: u32,

    /// Spacing between chapter markers, in milliseconds
    #[arg(long, default_value_t = 10_000, value_name = "MS")]
    spacing_ms: u64,

    /// Simulated time advanced by each tick, in milliseconds
    #[arg(short, long, default_value_t = 2_500, value_name = "MS")]
    tick_ms: u64,

    /// Playback position at which to seek, in milliseconds
    #[arg(long, value_name = "MS", requires = "seek_to")]
    seek_at: Option<u64>,

    /// Seek target, in milliseconds
    #[arg(long, value_name = "MS", requires = "seek_at")]
    seek_to: Option<u64>,

    /// Inject a transient read error before this chapter
    #[arg(long, value_name = "INDEX")]
    fail_before: Option<u32>,

    /// Renderer configuration file (JSON)
    #[arg(long, env = "METARENDER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct Chapter {
    index: u32,
    title: String,
}

fn chapter_entries(args: &Args) -> Vec<Entry> {
    let mut entries = Vec::new();
    for index in 0..args.chapters {
        if args.fail_before == Some(index) {
            entries.push(Entry::ReadError("simulated network stall".to_string()));
        }
        let payload = format!(r#"{{"index": {index}, "title": "Chapter {}"}}"#, index + 1);
        entries.push(Entry::sample(u64::from(index) * args.spacing_ms * 1_000, payload));
    }
    entries
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::setup_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => RendererConfig::from_file(path)?,
        None => RendererConfig::default(),
    };
    info!("Renderer configuration: {:?}", config);

    let duration_us = u64::from(args.chapters) * args.spacing_ms * 1_000;
    let source = MemorySource::new()
        .with_track(TrackInfo::new("audio/mp4a-latm", Some(duration_us)))
        .with_track(TrackInfo::new(MIME_JSON, Some(duration_us)))
        .with_entries(1, chapter_entries(&args))
        .end_of_stream(1);

    let context = ContextThread::<Chapter>::spawn("chapters", |chapter: Chapter| {
        info!("Now playing chapter {}: {}", chapter.index, chapter.title);
    })?;
    let mut renderer = MetadataTrackRenderer::with_config(
        source,
        JsonMetadataParser::<Chapter>::new(),
        Delivery::from(context),
        config,
    );

    let track_index = loop {
        match renderer.prepare(0)? {
            PrepareOutcome::Prepared { track_index } => break track_index,
            PrepareOutcome::NotReady => continue,
            PrepareOutcome::Ignored => {
                warn!("Source carries no chapter track");
                return Ok(());
            }
        }
    };
    info!("Rendering chapters from track {}", track_index);

    renderer.enable(0, false)?;
    renderer.start()?;

    let tick_us = args.tick_ms.max(1) * 1_000;
    let mut position_us = 0;
    let mut elapsed_us = 0;
    let mut seek_pending = args.seek_at.zip(args.seek_to);
    while !renderer.is_ended() {
        if let Some((at_ms, to_ms)) = seek_pending
            && position_us >= at_ms * 1_000
        {
            info!("Seeking from {}us to {}us", position_us, to_ms * 1_000);
            position_us = to_ms * 1_000;
            renderer.seek_to(position_us)?;
            seek_pending = None;
        }
        renderer.do_some_work(position_us, elapsed_us)?;
        position_us += tick_us;
        elapsed_us += tick_us;
    }
    info!("Chapter track ended at {}us", position_us);

    renderer.stop()?;
    renderer.disable()?;
    renderer.release()?;
    // Joins the context thread once its queue is drained.
    drop(renderer);
    Ok(())
}
