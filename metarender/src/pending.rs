// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Pending metadata buffer and the gate state bundle.

/// A decoded metadata value waiting for the playback clock to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMetadata<T> {
    /// Presentation timestamp in microseconds.
    pub timestamp_us: u64,
    /// The decoded value.
    pub value: T,
}

impl<T> PendingMetadata<T> {
    /// Returns `true` once playback has reached the item's timestamp.
    pub fn is_due(&self, position_us: u64) -> bool {
        self.timestamp_us <= position_us
    }
}

/// Mutable state of the dispatch gate.
///
/// Holds at most one pending item plus the end-of-stream flag. Only the
/// renderer mutates it, from the driver's thread.
#[derive(Debug)]
pub(crate) struct GateState<T> {
    pending: Option<PendingMetadata<T>>,
    input_stream_ended: bool,
}

impl<T> Default for GateState<T> {
    fn default() -> Self {
        Self {
            pending: None,
            input_stream_ended: false,
        }
    }
}

impl<T> GateState<T> {
    /// Discards any pending item and clears the end-of-stream flag.
    ///
    /// Used on enable and seek. Returns the discarded item, if any.
    pub(crate) fn reset(&mut self) -> Option<PendingMetadata<T>> {
        self.input_stream_ended = false;
        self.pending.take()
    }

    /// Discards any pending item, keeping the end-of-stream flag.
    pub(crate) fn discard_pending(&mut self) -> Option<PendingMetadata<T>> {
        self.pending.take()
    }

    /// Returns `true` if a new sample should be pulled from the source.
    pub(crate) fn wants_sample(&self) -> bool {
        !self.input_stream_ended && self.pending.is_none()
    }

    /// Stores a freshly decoded item.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if an item is already pending.
    pub(crate) fn hold(&mut self, timestamp_us: u64, value: T) {
        debug_assert!(self.pending.is_none(), "pending metadata overwritten");
        self.pending = Some(PendingMetadata {
            timestamp_us,
            value,
        });
    }

    pub(crate) fn mark_ended(&mut self) {
        self.input_stream_ended = true;
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.input_stream_ended
    }

    pub(crate) fn pending(&self) -> Option<&PendingMetadata<T>> {
        self.pending.as_ref()
    }

    /// Removes and returns the pending item if it is due at `position_us`.
    pub(crate) fn take_due(&mut self, position_us: u64) -> Option<PendingMetadata<T>> {
        if self.pending.as_ref()?.is_due(position_us) {
            self.pending.take()
        } else {
            None
        }
    }
}
