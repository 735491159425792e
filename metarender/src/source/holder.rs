// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Reusable sample buffer filled by [`crate::source::SampleSource::read_data`].

/// Caller-provided buffer for one pulled sample.
///
/// The renderer owns a single holder and lends it to the source on every
/// pull. After the payload has been parsed the holder is cleared, so parsers
/// must copy out whatever they need to keep.
///
/// # Examples
///
/// ```
/// use metarender::source::SampleHolder;
///
/// let mut holder = SampleHolder::new();
/// holder.replace(b"{\"title\":\"intro\"}", 100_000);
/// assert_eq!(holder.size(), 17);
/// holder.clear();
/// assert!(holder.is_empty());
/// ```
#[derive(Debug, Default, Clone)]
pub struct SampleHolder {
    data: Vec<u8>,
    /// Presentation timestamp of the sample, in microseconds.
    pub time_us: u64,
}

impl SampleHolder {
    /// Creates an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty holder with room for `capacity` payload bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Returns the valid payload bytes of the current sample.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Number of valid payload bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the holder carries no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overwrites the holder with `payload` stamped at `time_us`.
    ///
    /// The backing allocation is reused when large enough.
    pub fn replace(&mut self, payload: &[u8], time_us: u64) {
        self.data.clear();
        self.data.extend_from_slice(payload);
        self.time_us = time_us;
    }

    /// Drops the current payload while keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
