// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Metadata parsers.
//!
//! A [`MetadataParser`] turns the raw payload of one sample into a typed
//! metadata value. Parsers are stateless and must copy out everything they
//! keep: the payload buffer is reused for the next sample.
//!
//! Two parsers are provided:
//! - [`JsonMetadataParser`]: deserializes `application/json` payloads into any
//!   `serde` type
//! - [`TextMetadataParser`]: decodes UTF-8 `text/plain` payloads

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Converts sample payloads of a given content type into metadata values.
pub trait MetadataParser<T> {
    /// Returns `true` if tracks with this MIME type can be parsed.
    fn can_parse(&self, mime_type: &str) -> bool;

    /// Parses one sample payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the payload is malformed.
    fn parse(&self, data: &[u8]) -> Result<T>;
}

impl<T, P: MetadataParser<T> + ?Sized> MetadataParser<T> for Box<P> {
    fn can_parse(&self, mime_type: &str) -> bool {
        (**self).can_parse(mime_type)
    }

    fn parse(&self, data: &[u8]) -> Result<T> {
        (**self).parse(data)
    }
}

/// MIME type handled by [`JsonMetadataParser`].
pub const MIME_JSON: &str = "application/json";

/// MIME type handled by [`TextMetadataParser`].
pub const MIME_TEXT: &str = "text/plain";

/// Deserializes JSON payloads into `T`.
///
/// # Examples
///
/// ```
/// use metarender::parser::{JsonMetadataParser, MetadataParser};
///
/// #[derive(serde::Deserialize, Debug, PartialEq)]
/// struct Chapter {
///     title: String,
/// }
///
/// let parser = JsonMetadataParser::<Chapter>::new();
/// assert!(parser.can_parse("application/json"));
/// let chapter = parser.parse(br#"{"title":"Intro"}"#).unwrap();
/// assert_eq!(chapter.title, "Intro");
/// ```
pub struct JsonMetadataParser<T> {
    mime_type: String,
    phantom: PhantomData<fn() -> T>,
}

impl<T> JsonMetadataParser<T> {
    /// Creates a parser for `application/json` tracks.
    pub fn new() -> Self {
        Self::for_mime_type(MIME_JSON)
    }

    /// Creates a parser for tracks declaring `mime_type`.
    pub fn for_mime_type(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            phantom: PhantomData,
        }
    }
}

impl<T> Default for JsonMetadataParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> MetadataParser<T> for JsonMetadataParser<T> {
    fn can_parse(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case(&self.mime_type)
    }

    fn parse(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(Error::parse)
    }
}

/// Decodes UTF-8 text payloads. Trailing NUL padding is stripped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextMetadataParser;

impl MetadataParser<String> for TextMetadataParser {
    fn can_parse(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case(MIME_TEXT)
    }

    fn parse(&self, data: &[u8]) -> Result<String> {
        let end = data
            .iter()
            .rposition(|byte| *byte != 0)
            .map_or(0, |last| last + 1);
        std::str::from_utf8(&data[..end])
            .map(str::to_owned)
            .map_err(Error::parse)
    }
}
