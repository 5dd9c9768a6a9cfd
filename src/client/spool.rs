//! Response spooling
//!
//! Large stats responses can optionally be written to disk before decoding
//! so the HTTP connection is released early. The spool file is created with
//! [`tempfile::tempfile`], which unlinks it immediately, so it disappears
//! on drop no matter how decoding ends.

use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::decode::{ByteFeed, FileFeed};
use crate::error::Result;

/// Drain `feed` into an anonymous temp file and hand back a feed that
/// replays it from the start.
pub async fn capture(feed: &mut dyn ByteFeed) -> Result<FileFeed> {
    let std_file = tempfile::tempfile()?;
    let mut file = tokio::fs::File::from_std(std_file);
    while let Some(chunk) = feed.next_chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(FileFeed::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SliceFeed;

    async fn drain(feed: &mut dyn ByteFeed) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = feed.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn capture_replays_the_body() {
        let body = br#"{"values":[{"resourceId":"r1"}]}"#;
        let mut source = SliceFeed::chunked(body.to_vec(), 5);
        let mut spooled = capture(&mut source).await.unwrap();
        assert_eq!(drain(&mut spooled).await, body);
    }

    #[tokio::test]
    async fn capture_of_empty_body_is_empty() {
        let mut source = SliceFeed::new(Vec::new());
        let mut spooled = capture(&mut source).await.unwrap();
        assert!(spooled.next_chunk().await.unwrap().is_none());
    }
}
