//! Frame encoding and exact-length reads.
//!
//! Request frames are read field by field straight off the stream by the
//! connection worker, because a `File` payload is streamed to disk rather
//! than buffered. Response frames are small and are decoded as a stream
//! with [`ResponseCodec`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

use crate::error::{LanboxError, Result};
use crate::header::{
    FILENAME_FIELD_SIZE, LENGTH_FIELD_SIZE, RequestHeader, TYPE_FIELD_SIZE, encode_number,
    parse_number,
};
use crate::message::FrameType;

/// Upper bound for a single socket or file read.
pub const CHUNK_SIZE: usize = 2048;

/// Default limit for a decoded response frame.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

// ── Encoding ─────────────────────────────────────────────────────

/// Build a complete request frame: length, type tag, payload.
pub fn encode_request(frame_type: FrameType, payload: &[u8]) -> Result<Bytes> {
    let header = RequestHeader::new(frame_type, payload.len() as u64).to_bytes()?;
    let mut buf = BytesMut::with_capacity(header.len() + payload.len());
    buf.put_slice(&header);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Build a response frame: length, payload. No type tag.
pub fn encode_response(payload: &[u8]) -> Result<Bytes> {
    let length = encode_number(payload.len() as u64, LENGTH_FIELD_SIZE)?;
    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_SIZE + payload.len());
    buf.put_slice(&length);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Build everything of a `File` request that precedes the content:
/// main header, filename length field, filename.
pub fn encode_file_header(content_length: u64, filename: &str) -> Result<Bytes> {
    let header = RequestHeader::new(FrameType::File, content_length).to_bytes()?;
    let name_len = encode_number(filename.len() as u64, FILENAME_FIELD_SIZE)?;
    let mut buf = BytesMut::with_capacity(header.len() + name_len.len() + filename.len());
    buf.put_slice(&header);
    buf.put_slice(&name_len);
    buf.put_slice(filename.as_bytes());
    Ok(buf.freeze())
}

// ── Decoding ─────────────────────────────────────────────────────

/// Fill `buf` completely, failing with `PeerClosed` if the stream ends.
async fn fill<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(LanboxError::PeerClosed);
        }
        filled += n;
    }
    Ok(())
}

/// Read the 13-byte length and 10-byte type fields of a request.
pub async fn read_header<R>(reader: &mut R) -> Result<RequestHeader>
where
    R: AsyncRead + Unpin,
{
    let mut length = [0u8; LENGTH_FIELD_SIZE];
    fill(reader, &mut length).await?;
    let mut tag = [0u8; TYPE_FIELD_SIZE];
    fill(reader, &mut tag).await?;
    RequestHeader::from_fields(&length, &tag)
}

/// Read the 7-byte filename length field and the filename it announces.
pub async fn read_filename<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut field = [0u8; FILENAME_FIELD_SIZE];
    fill(reader, &mut field).await?;
    let len = parse_number(&field)?;
    read_exact(reader, len).await
}

/// Collect exactly `n` bytes using bounded reads.
///
/// If the stream closes first, fails with
/// [`LanboxError::TruncatedRead`] carrying whatever arrived.
pub async fn read_exact<R>(reader: &mut R, n: u64) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut collected = BytesMut::with_capacity(n.min(CHUNK_SIZE as u64) as usize);
    let mut chunk = [0u8; CHUNK_SIZE];
    while (collected.len() as u64) < n {
        let want = (n - collected.len() as u64).min(CHUNK_SIZE as u64) as usize;
        let got = reader.read(&mut chunk[..want]).await?;
        if got == 0 {
            return Err(LanboxError::TruncatedRead {
                expected: n,
                received: collected.freeze(),
            });
        }
        collected.extend_from_slice(&chunk[..got]);
    }
    Ok(collected.freeze())
}

/// Read and throw away exactly `n` bytes.
pub async fn discard_exact<R>(reader: &mut R, n: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut remaining = n;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let got = reader.read(&mut chunk[..want]).await?;
        if got == 0 {
            return Err(LanboxError::PeerClosed);
        }
        remaining -= got as u64;
    }
    Ok(())
}

/// One bounded, unframed read. Used for the handshake name.
pub async fn read_unframed<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(LanboxError::PeerClosed);
    }
    Ok(Bytes::copy_from_slice(&buf[..n]))
}

// ── ResponseCodec ────────────────────────────────────────────────

/// Stream decoder for response frames (receiver → sender).
#[derive(Debug, Clone)]
pub struct ResponseCodec {
    max_frame_length: usize,
}

impl ResponseCodec {
    pub fn new() -> Self {
        Self::with_max_frame_length(DEFAULT_MAX_RESPONSE_SIZE)
    }

    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }
}

impl Default for ResponseCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ResponseCodec {
    type Item = Bytes;
    type Error = LanboxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let length = parse_number(&src[..LENGTH_FIELD_SIZE])?;
        if length > self.max_frame_length as u64 {
            return Err(LanboxError::FrameTooLarge {
                size: length,
                max: self.max_frame_length as u64,
            });
        }

        let frame_len = LENGTH_FIELD_SIZE + length as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        Ok(Some(src.split_to(length as usize).freeze()))
    }
}
