//! Chunked byte sources for the decoder
//!
//! The cursor never sees where its bytes come from; it pulls chunks of
//! whatever size the source produces. Token recognition therefore has to
//! be (and is) correct across arbitrary chunk boundaries, which
//! [`SliceFeed`] exists to exercise.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::error::{ApiError, Result};

/// Read buffer size for spooled files
const FILE_CHUNK: usize = 64 * 1024;

/// One chunked byte source
#[async_trait]
pub trait ByteFeed: Send {
    /// Next chunk of the stream; `None` at clean end of stream. Chunks may
    /// be empty; callers skip those.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

#[async_trait]
impl ByteFeed for Box<dyn ByteFeed> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        (**self).next_chunk().await
    }
}

/// Feed over a live HTTP response body
pub struct BodyFeed {
    response: reqwest::Response,
}

impl BodyFeed {
    /// Wrap a response whose status has already been checked
    pub fn new(response: reqwest::Response) -> Self {
        BodyFeed { response }
    }
}

#[async_trait]
impl ByteFeed for BodyFeed {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.response.chunk().await {
            Ok(chunk) => Ok(chunk),
            // A connection dying mid-body is the same overload signal as a
            // connection that never answered: let bisection handle it.
            Err(e) if e.is_timeout() || e.is_connect() => {
                Err(ApiError::NoResponse(e.to_string()).into())
            }
            Err(e) => Err(ApiError::Transport(e).into()),
        }
    }
}

/// Feed over a spooled response file
pub struct FileFeed {
    file: tokio::fs::File,
}

impl FileFeed {
    /// Read from the start of the given file handle
    pub fn new(file: tokio::fs::File) -> Self {
        FileFeed { file }
    }
}

#[async_trait]
impl ByteFeed for FileFeed {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buf = vec![0u8; FILE_CHUNK];
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }
}

/// In-memory feed with a configurable chunk size
///
/// Test and bench source. A chunk size of 1 delivers the document one byte
/// at a time, the worst case for cross-chunk token recognition.
pub struct SliceFeed {
    data: Bytes,
    pos: usize,
    chunk: usize,
}

impl SliceFeed {
    /// Feed the whole slice as one chunk
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let chunk = data.len().max(1);
        SliceFeed {
            data,
            pos: 0,
            chunk,
        }
    }

    /// Feed the slice in chunks of at most `chunk` bytes
    pub fn chunked(data: impl Into<Bytes>, chunk: usize) -> Self {
        SliceFeed {
            data: data.into(),
            pos: 0,
            chunk: chunk.max(1),
        }
    }
}

#[async_trait]
impl ByteFeed for SliceFeed {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + self.chunk).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(Some(chunk))
    }
}
