// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the metadata track renderer.
//!
//! These tests drive a [`MetadataTrackRenderer`] over a scripted
//! [`MemorySource`] the way a playback loop would: prepare, enable, then tick
//! with an advancing playback position.
//!
//! # Test Coverage
//!
//! - Preparation outcomes (not ready, selected track, ignored, fatal failure)
//! - Timestamp gating and end of stream
//! - Discontinuities (seek) discarding pending values
//! - Parse failures surfacing from the tick
//! - Deferred delivery ordering on a context thread

use std::{
    cell::Cell,
    sync::{Arc, Mutex, mpsc},
};

use metarender::{
    ContextThread, Delivery, Error, MetadataMessage, MetadataParser, MetadataTrackRenderer,
    PrepareOutcome, RendererState, Result, TrackRenderer,
    parser::{JsonMetadataParser, TextMetadataParser},
    source::{
        TrackInfo,
        memory::{Entry, MemorySource, SourceCall},
    },
};
use tracing::info;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

type Seen = Arc<Mutex<Vec<String>>>;

/// Builds a renderer delivering directly into a shared vector.
fn direct_renderer<P: MetadataParser<String>>(
    source: MemorySource,
    parser: P,
) -> (MetadataTrackRenderer<String, MemorySource, P>, Seen) {
    setup_logging();
    let seen: Seen = Arc::default();
    let sink = seen.clone();
    let renderer = MetadataTrackRenderer::new(
        source,
        parser,
        Delivery::direct(move |value: String| sink.lock().unwrap().push(value)),
    );
    (renderer, seen)
}

fn text_track() -> TrackInfo {
    TrackInfo::new("text/plain", Some(10_000_000))
}

/// A sample at 100ms followed by end of stream: the value is held until the
/// playback position reaches it, and the end of stream is only noticed on the
/// tick after delivery.
#[test]
fn delivers_when_position_reaches_timestamp_then_ends() {
    let source = MemorySource::new()
        .with_track(text_track())
        .with_entries(0, [Entry::sample(100_000, "meta1")])
        .end_of_stream(0);
    let (mut renderer, seen) = direct_renderer(source, TextMetadataParser);
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();

    renderer.do_some_work(50_000, 0).unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(renderer.pending_timestamp_us(), Some(100_000));

    renderer.do_some_work(150_000, 100_000).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["meta1"]);
    assert!(!renderer.is_ended());

    renderer.do_some_work(160_000, 110_000).unwrap();
    assert!(renderer.is_ended());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

/// A value pending at 200ms is discarded by a seek back to 50ms. The tick at
/// 250ms pulls afresh instead of delivering the discarded value; the source
/// has nothing buffered yet right after the seek.
#[test]
fn seek_discards_pending_value() {
    let source = MemorySource::new()
        .with_track(text_track())
        .with_entries(0, [Entry::Starved, Entry::sample(200_000, "chapter")]);
    let (mut renderer, seen) = direct_renderer(source, TextMetadataParser);
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();
    renderer.do_some_work(0, 0).unwrap();
    renderer.do_some_work(0, 0).unwrap();
    assert_eq!(renderer.pending_timestamp_us(), Some(200_000));

    renderer.seek_to(50_000).unwrap();
    assert_eq!(renderer.pending_timestamp_us(), None);
    assert!(renderer.source().calls().contains(&SourceCall::SeekTo(50_000)));
    let reads_before = renderer.source().read_count();

    renderer.do_some_work(250_000, 0).unwrap();
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(renderer.source().read_count(), reads_before + 1);

    renderer.do_some_work(260_000, 0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["chapter"]);
}

/// Seeking clears the end-of-stream flag so pulls resume.
#[test]
fn seek_after_end_of_stream_resumes_pulling() {
    let source = MemorySource::new()
        .with_track(text_track())
        .with_entries(0, [Entry::sample(100, "only")])
        .end_of_stream(0);
    let (mut renderer, seen) = direct_renderer(source, TextMetadataParser);
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();
    for _ in 0..3 {
        renderer.do_some_work(1_000, 0).unwrap();
    }
    assert!(renderer.is_ended());

    renderer.seek_to(0).unwrap();
    assert!(!renderer.is_ended());
    renderer.do_some_work(1_000, 0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["only", "only"]);
}

/// A malformed payload fails the tick with a parse error and leaves nothing
/// pending.
#[test]
fn malformed_payload_fails_the_tick() {
    #[derive(serde::Deserialize)]
    struct Chapter {
        title: String,
    }

    setup_logging();
    let source = MemorySource::new()
        .with_track(TrackInfo::new("application/json", None))
        .with_entries(
            0,
            [
                Entry::sample(10, "{\"title\": "),
                Entry::sample(20, r#"{"title": "Intro"}"#),
            ],
        );
    let seen: Seen = Arc::default();
    let sink = seen.clone();
    let mut renderer = MetadataTrackRenderer::new(
        source,
        JsonMetadataParser::<Chapter>::new(),
        Delivery::direct(move |chapter: Chapter| sink.lock().unwrap().push(chapter.title)),
    );
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();

    let err = renderer.do_some_work(100, 0).unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
    assert!(!err.is_fatal());
    assert_eq!(renderer.pending_timestamp_us(), None);

    renderer.do_some_work(100, 0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["Intro"]);
}

/// Counts parse calls to check each pulled sample is parsed exactly once.
struct CountingParser {
    calls: Cell<usize>,
}

impl MetadataParser<String> for CountingParser {
    fn can_parse(&self, mime_type: &str) -> bool {
        mime_type == "text/plain"
    }

    fn parse(&self, data: &[u8]) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

/// Every pulled sample is parsed once, and values are never delivered before
/// their timestamp.
#[test]
fn parses_once_and_never_delivers_early() {
    let timestamps = [0u64, 15_000, 15_000, 40_000, 95_000];
    let source = MemorySource::new()
        .with_track(text_track())
        .with_entries(
            0,
            timestamps
                .iter()
                .map(|time_us| Entry::sample(*time_us, time_us.to_string())),
        )
        .end_of_stream(0);
    let (mut renderer, seen) = direct_renderer(
        source,
        CountingParser {
            calls: Cell::new(0),
        },
    );
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();

    let mut position_us = 0;
    while position_us <= 120_000 {
        let before = seen.lock().unwrap().len();
        renderer.do_some_work(position_us, position_us).unwrap();
        let seen = seen.lock().unwrap();
        assert!(seen.len() <= before + 1, "more than one delivery per tick");
        for value in &seen[before..] {
            let timestamp: u64 = value.parse().unwrap();
            assert!(timestamp <= position_us, "delivered {timestamp} at {position_us}");
        }
        position_us += 5_000;
    }

    let seen = seen.lock().unwrap();
    info!("Delivered {} values", seen.len());
    assert_eq!(seen.len(), timestamps.len());
    assert_eq!(renderer.parser().calls.get(), timestamps.len());
    assert_eq!(renderer.source().read_count(), timestamps.len() + 1);
}

/// A source that is not ready yet is retried; readiness is reported once the
/// source catches up.
#[test]
fn prepare_waits_for_source() {
    let source = MemorySource::new().with_track(text_track()).not_ready_for(2);
    let (mut renderer, _) = direct_renderer(source, TextMetadataParser);
    assert_eq!(renderer.prepare(0).unwrap(), PrepareOutcome::NotReady);
    assert_eq!(renderer.prepare(0).unwrap(), PrepareOutcome::NotReady);
    assert_eq!(renderer.state(), RendererState::Unprepared);
    assert_eq!(
        renderer.prepare(0).unwrap(),
        PrepareOutcome::Prepared { track_index: 0 }
    );
    assert_eq!(renderer.state(), RendererState::Prepared);
}

/// Without a parseable track the renderer steps aside.
#[test]
fn prepare_ignores_sources_without_metadata() {
    let source = MemorySource::new()
        .with_track(TrackInfo::new("audio/mp4a-latm", None))
        .with_track(TrackInfo::new("video/avc", None));
    let (mut renderer, _) = direct_renderer(source, TextMetadataParser);
    assert_eq!(renderer.prepare(0).unwrap(), PrepareOutcome::Ignored);
    assert_eq!(renderer.state(), RendererState::Ignored);
    assert!(renderer.enable(0, false).is_err());
    renderer.release().unwrap();
}

/// A source failing to prepare is a fatal playback error.
#[test]
fn prepare_failure_is_fatal() {
    let source = MemorySource::new()
        .with_track(text_track())
        .failing_prepare("manifest unreachable");
    let (mut renderer, _) = direct_renderer(source, TextMetadataParser);
    let err = renderer.prepare(0).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("manifest unreachable"));
}

/// Deferred deliveries run on the context thread in timestamp order and
/// never on the driver's thread.
#[test]
fn deferred_delivery_preserves_order() {
    setup_logging();
    let driver = std::thread::current().id();
    let (report, delivered) = mpsc::channel();
    let context = ContextThread::spawn("metadata-consumer", move |value: String| {
        report
            .send((value, std::thread::current().id()))
            .unwrap();
    })
    .unwrap();

    let source = MemorySource::new()
        .with_track(text_track())
        .with_entries(0, (0..20).map(|i| Entry::sample(i * 1_000, format!("item-{i}"))))
        .end_of_stream(0);
    let mut renderer =
        MetadataTrackRenderer::new(source, TextMetadataParser, Delivery::from(context));
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();
    renderer.start().unwrap();
    while !renderer.is_ended() {
        renderer.do_some_work(1_000_000, 0).unwrap();
    }
    renderer.release().unwrap();
    drop(renderer);

    let received: Vec<_> = delivered.iter().collect();
    assert_eq!(received.len(), 20);
    for (i, (value, thread)) in received.iter().enumerate() {
        assert_eq!(value, &format!("item-{i}"));
        assert_ne!(*thread, driver);
    }
}

/// Without stale-drop, a message posted before disable still reaches the
/// consumer afterwards.
#[test]
fn disable_does_not_retract_posted_messages() {
    setup_logging();
    let (sender, receiver) = mpsc::channel::<MetadataMessage<String>>();
    let source = MemorySource::new()
        .with_track(text_track())
        .with_entries(0, [Entry::sample(0, "posted")]);
    let mut renderer = MetadataTrackRenderer::new(source, TextMetadataParser, Delivery::deferred(sender));
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();
    renderer.do_some_work(0, 0).unwrap();
    renderer.disable().unwrap();

    let generation = renderer.delivery().generation().unwrap().clone();
    let mut seen = Vec::new();
    let mut output = |value: String| seen.push(value);
    for message in receiver.try_iter() {
        assert!(message.dispatch_if_current(&mut output, &generation));
    }
    assert_eq!(seen, vec!["posted"]);
}

/// A full bounded queue refuses the due value; it stays pending and reaches
/// the consumer once the queue drains, before the end of the track.
#[test]
fn full_target_queue_delays_but_never_loses_values() {
    setup_logging();
    let (sender, receiver) = mpsc::sync_channel::<MetadataMessage<String>>(1);
    let source = MemorySource::new()
        .with_track(text_track())
        .with_entries(0, [Entry::sample(0, "a"), Entry::sample(10, "b")])
        .end_of_stream(0);
    let mut renderer = MetadataTrackRenderer::new(source, TextMetadataParser, Delivery::deferred(sender));
    renderer.prepare(0).unwrap();
    renderer.enable(0, false).unwrap();

    renderer.do_some_work(100, 0).unwrap();
    assert!(matches!(renderer.do_some_work(100, 0), Err(Error::TargetFull)));
    assert_eq!(renderer.pending_timestamp_us(), Some(10));

    let mut seen: Vec<String> = receiver.try_iter().map(MetadataMessage::into_value).collect();
    while !renderer.is_ended() {
        renderer.do_some_work(100, 0).unwrap();
        seen.extend(receiver.try_iter().map(MetadataMessage::into_value));
    }
    assert_eq!(seen, vec!["a", "b"]);
}
