use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::SourceError;

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Largest part (headers or JPEG body) we will buffer before giving up on it.
/// A camera that never sends the delimiter we are waiting for would otherwise
/// grow the buffer without bound.
const MAX_PART_BYTES: usize = 16 * 1024 * 1024;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental pull-based MJPEG multipart decoder: accumulate HTTP chunks in
/// a buffer and yield one complete JPEG per part.
pub struct MjpegStream {
    stream: ByteStream,
    buffer: BytesMut,
    state: ParseState,
    /// Where to resume scanning for the closing boundary, so old data is not
    /// re-scanned on every chunk.
    scan_from: usize,
}

impl MjpegStream {
    /// Connect to the camera's multipart endpoint.
    pub async fn connect(url: &str) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(SourceError::Connect)?;
        let response = client.get(url).send().await.map_err(SourceError::Connect)?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        info!(url, status = %response.status(), "connected to MJPEG stream");
        Ok(Self::from_stream(Box::pin(response.bytes_stream())))
    }

    fn from_stream(stream: ByteStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scan_from: 0,
        }
    }

    /// Next complete JPEG from the stream, or None once the server closes it.
    pub async fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        loop {
            if let Some(jpeg) = self.parse_buffered() {
                debug!(bytes = jpeg.len(), "parsed MJPEG part");
                return Ok(Some(jpeg));
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(SourceError::Stream(e)),
                None => return Ok(None),
            }
        }
    }

    /// Advance the parser over whatever is buffered. Returns a JPEG if one
    /// completed, None if more bytes are needed.
    fn parse_buffered(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        // Discard everything up to and including the boundary.
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep the last few bytes in case the boundary spans chunks.
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.scan_from = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        if self.buffer.len() > MAX_PART_BYTES {
                            self.resync();
                            continue;
                        }
                        return None;
                    }
                }
                ParseState::CollectingJpeg => {
                    if let Some(pos) = find_subsequence(&self.buffer[self.scan_from..], BOUNDARY) {
                        let jpeg_end = self.scan_from + pos;
                        // Strip the trailing \r\n before the boundary.
                        let end = if jpeg_end >= 2
                            && self.buffer[jpeg_end - 2] == b'\r'
                            && self.buffer[jpeg_end - 1] == b'\n'
                        {
                            jpeg_end - 2
                        } else {
                            jpeg_end
                        };

                        let jpeg_data = self.buffer[..end].to_vec();
                        let _ = self.buffer.split_to(jpeg_end + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;

                        if !jpeg_data.is_empty() {
                            return Some(jpeg_data);
                        }
                        // Empty part: keep parsing.
                    } else {
                        if self.buffer.len() > MAX_PART_BYTES {
                            self.resync();
                            continue;
                        }
                        // No closing boundary yet; remember how far we scanned.
                        self.scan_from = if self.buffer.len() > BOUNDARY.len() {
                            self.buffer.len() - BOUNDARY.len()
                        } else {
                            0
                        };
                        return None;
                    }
                }
            }
        }
    }

    /// Drop an oversized part and hunt for the next boundary. A short tail is
    /// kept in case a boundary straddles the trim point.
    fn resync(&mut self) {
        warn!(
            buffered = self.buffer.len(),
            "multipart section exceeded size cap, resynchronizing on next boundary"
        );
        let keep_from = self.buffer.len().saturating_sub(BOUNDARY.len());
        let _ = self.buffer.split_to(keep_from);
        self.scan_from = 0;
        self.state = ParseState::SeekingBoundary;
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn part(jpeg: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(BOUNDARY);
        out.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        out.extend_from_slice(jpeg);
        out.extend_from_slice(b"\r\n");
        out
    }

    fn stream_of(chunks: Vec<Vec<u8>>) -> MjpegStream {
        let items: Vec<reqwest::Result<Bytes>> =
            chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        MjpegStream::from_stream(Box::pin(stream::iter(items)))
    }

    #[tokio::test]
    async fn yields_each_part_in_order() {
        let mut body = part(b"first");
        body.extend_from_slice(&part(b"second"));
        body.extend_from_slice(BOUNDARY);
        let mut s = stream_of(vec![body]);

        assert_eq!(s.next_jpeg().await.unwrap().unwrap(), b"first");
        assert_eq!(s.next_jpeg().await.unwrap().unwrap(), b"second");
        assert!(s.next_jpeg().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reassembles_parts_split_across_chunks() {
        let mut body = part(b"split-across-many-chunks");
        body.extend_from_slice(BOUNDARY);
        // Deliver the body three bytes at a time.
        let chunks: Vec<Vec<u8>> = body.chunks(3).map(|c| c.to_vec()).collect();
        let mut s = stream_of(chunks);

        assert_eq!(
            s.next_jpeg().await.unwrap().unwrap(),
            b"split-across-many-chunks"
        );
        assert!(s.next_jpeg().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skips_leading_garbage_before_first_boundary() {
        let mut body = b"HTTP noise that precedes the first part".to_vec();
        body.extend_from_slice(&part(b"payload"));
        body.extend_from_slice(BOUNDARY);
        let mut s = stream_of(vec![body]);

        assert_eq!(s.next_jpeg().await.unwrap().unwrap(), b"payload");
    }

    #[tokio::test]
    async fn incomplete_final_part_is_dropped() {
        let mut body = part(b"complete");
        body.extend_from_slice(BOUNDARY);
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\ntrunc");
        let mut s = stream_of(vec![body]);

        assert_eq!(s.next_jpeg().await.unwrap().unwrap(), b"complete");
        assert!(s.next_jpeg().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_part_is_dropped_and_parsing_resumes() {
        // A part whose closing boundary never comes within the size cap must
        // not buffer forever; the stream recovers on the next boundary.
        let mut body = Vec::new();
        body.extend_from_slice(BOUNDARY);
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(&vec![0u8; MAX_PART_BYTES + 1024]);
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part(b"ok"));
        body.extend_from_slice(BOUNDARY);
        // Deliver in network-sized chunks so the cap trips mid-part.
        let chunks: Vec<Vec<u8>> = body.chunks(64 * 1024).map(|c| c.to_vec()).collect();
        let mut s = stream_of(chunks);

        assert_eq!(s.next_jpeg().await.unwrap().unwrap(), b"ok");
        assert!(s.next_jpeg().await.unwrap().is_none());
        assert!(s.buffer.len() <= BOUNDARY.len());
    }
}
