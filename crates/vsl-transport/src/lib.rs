//! HTTP byte access, grounded in `mesio_engine::flv::flv_downloader`'s
//! request/status/streaming handling: a plain `reqwest::Client`, a `Range`
//! header built from the caller's byte offset (suppressed when the segment
//! is flagged `http-continuous`), and incremental reads off the response's
//! byte stream rather than buffering the whole body up front.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use reqwest::{Client, StatusCode};
use tracing::{debug, trace, warn};

use vsl_core::{OpenRequest, SegmentStream, UrlOpener, VslError};

pub struct ReqwestUrlOpener {
    client: Client,
}

impl ReqwestUrlOpener {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestUrlOpener {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl UrlOpener for ReqwestUrlOpener {
    async fn open(&self, request: OpenRequest<'_>) -> Result<Box<dyn SegmentStream>, VslError> {
        let mut builder = self.client.get(request.url);
        if !request.continuous {
            if let Some(offset) = request.byte_offset {
                builder = builder.header(reqwest::header::RANGE, format!("bytes={offset}-"));
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| VslError::network(format!("request to {} failed: {e}", request.url)))?;

        let status = response.status();
        if !(status.is_success() || status == StatusCode::PARTIAL_CONTENT) {
            return Err(VslError::network(format!(
                "request to {} returned HTTP {status}",
                request.url
            )));
        }

        let size = response.content_length();
        debug!(url = %request.url, ?size, %status, "opened segment stream");

        Ok(Box::new(ReqwestSegmentStream {
            response: Some(response),
            buffer: BytesMut::new(),
            size,
            cached: 0,
            exhausted: false,
        }))
    }
}

/// Wraps one in-flight response, draining its body stream into a small
/// leftover buffer as reads consume less than a full chunk.
struct ReqwestSegmentStream {
    response: Option<reqwest::Response>,
    buffer: BytesMut,
    size: Option<u64>,
    cached: u64,
    exhausted: bool,
}

impl ReqwestSegmentStream {
    async fn fill(&mut self) -> Result<(), VslError> {
        if !self.buffer.is_empty() || self.exhausted {
            return Ok(());
        }
        let Some(response) = self.response.as_mut() else {
            self.exhausted = true;
            return Ok(());
        };
        match response.chunk().await {
            Ok(Some(chunk)) => {
                self.buffer.extend_from_slice(&chunk);
            }
            Ok(None) => {
                self.exhausted = true;
            }
            Err(e) => {
                warn!(error = %e, "segment stream read failed");
                return Err(VslError::network(format!("segment read failed: {e}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentStream for ReqwestSegmentStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, VslError> {
        self.fill().await?;
        if self.buffer.is_empty() {
            trace!("segment stream exhausted");
            return Ok(0);
        }
        let n = self.buffer.len().min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        self.cached += n as u64;
        Ok(n)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn cached_bytes(&self) -> u64 {
        self.cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_opener_builds_without_panicking() {
        let _opener = ReqwestUrlOpener::default();
    }
}
