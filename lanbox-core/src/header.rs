//! Fixed-width ASCII header fields.
//!
//! ```text
//! request:  | length (13) | type (10) | payload (length) |
//! response: | length (13) | payload (length) |
//! file:     | length (13) | "File" (10) | name_len (7) | name | content (length) |
//! ```
//!
//! Numbers are left-justified decimal, padded with spaces.

use crate::error::LanboxError;
use crate::message::FrameType;

/// Width of the length field in request and response headers.
pub const LENGTH_FIELD_SIZE: usize = 13;

/// Width of the type tag field in request headers.
pub const TYPE_FIELD_SIZE: usize = 10;

/// Width of the filename length field inside `File` requests.
pub const FILENAME_FIELD_SIZE: usize = 7;

/// Total size of a request header.
pub const REQUEST_HEADER_SIZE: usize = LENGTH_FIELD_SIZE + TYPE_FIELD_SIZE;

/// Write `text` left-justified into a field of `width` bytes.
fn pad_field(text: &str, width: usize) -> Result<Vec<u8>, LanboxError> {
    if text.len() > width {
        return Err(LanboxError::protocol(format!(
            "{text:?} does not fit a {width}-byte field"
        )));
    }
    let mut field = Vec::with_capacity(width);
    field.extend_from_slice(text.as_bytes());
    field.resize(width, b' ');
    Ok(field)
}

/// Encode `value` as a left-justified decimal field of `width` bytes.
pub fn encode_number(value: u64, width: usize) -> Result<Vec<u8>, LanboxError> {
    pad_field(&value.to_string(), width)
}

/// Parse a padded decimal field.
pub fn parse_number(field: &[u8]) -> Result<u64, LanboxError> {
    let text = std::str::from_utf8(field)
        .map_err(|_| LanboxError::protocol("length field is not ascii"))?;
    let trimmed = text.trim();
    trimmed
        .parse::<u64>()
        .map_err(|_| LanboxError::protocol(format!("invalid length field {trimmed:?}")))
}

// ── RequestHeader ────────────────────────────────────────────────

/// The 23-byte header in front of every request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Exact number of payload bytes that follow (for `File`, the file
    /// content only).
    pub length: u64,
    pub frame_type: FrameType,
}

impl RequestHeader {
    pub fn new(frame_type: FrameType, length: u64) -> Self {
        Self { length, frame_type }
    }

    /// Serialize to the wire representation.
    pub fn to_bytes(&self) -> Result<[u8; REQUEST_HEADER_SIZE], LanboxError> {
        let mut buf = [0u8; REQUEST_HEADER_SIZE];
        buf[..LENGTH_FIELD_SIZE].copy_from_slice(&encode_number(self.length, LENGTH_FIELD_SIZE)?);
        buf[LENGTH_FIELD_SIZE..].copy_from_slice(&pad_field(self.frame_type.tag(), TYPE_FIELD_SIZE)?);
        Ok(buf)
    }

    /// Parse the length and type fields.
    pub fn from_fields(length: &[u8], tag: &[u8]) -> Result<Self, LanboxError> {
        let length = parse_number(length)?;
        let tag = std::str::from_utf8(tag)
            .map_err(|_| LanboxError::protocol("type field is not ascii"))?;
        let frame_type = FrameType::from_tag(tag.trim())?;
        Ok(Self { length, frame_type })
    }
}
