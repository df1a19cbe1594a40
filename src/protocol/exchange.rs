//! Request and response payloads.
//!
//! The request is a short UTF-8 text written with acknowledgement. The
//! response is UTF-8 text of any length read back from the response channel.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Text written on every round unless configured otherwise.
pub const DEFAULT_REQUEST_TEXT: &str = "Hello, world!";

/// Request payload sent on the request channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    payload: Bytes,
}

impl Request {
    /// Build a request carrying `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            payload: Bytes::from(text.into()),
        }
    }

    /// Encoded bytes for the write.
    pub fn encode(&self) -> Bytes {
        self.payload.clone()
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TEXT)
    }
}

/// Response read from the response channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    text: String,
}

impl Response {
    /// Decode raw characteristic bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] when the bytes are not valid UTF-8.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|e| Error::InvalidData {
            context: format!(
                "Response is not UTF-8 ({} bytes, valid up to {}): {:02X?}",
                data.len(),
                e.valid_up_to(),
                &data[..std::cmp::min(data.len(), 20)]
            ),
        })?;

        Ok(Self {
            text: text.to_string(),
        })
    }

    /// Decoded text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the response, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
