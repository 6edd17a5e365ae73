//! In-memory test doubles, mirroring the way `mesio`'s scheduler tests
//! construct job fixtures without touching the network.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::VslError;
use crate::manifest::ManifestSource;
use crate::transport::{OpenRequest, SegmentStream, UrlOpener};

/// One fake segment body plus the declared size the fake manifest reports
/// for it (allowing tests to simulate `get_bytes` fallback separately from
/// the body's real length).
#[derive(Debug, Clone)]
pub struct FakeSegment {
    pub mrl: String,
    pub url: String,
    pub duration_ms: i64,
    pub declared_bytes: i64,
    pub body: Vec<u8>,
}

/// A fully in-memory [`ManifestSource`], keyed by segment order.
pub struct FakeManifest {
    segments: Vec<FakeSegment>,
    pub load_calls: Mutex<Vec<bool>>,
}

impl FakeManifest {
    pub fn new(segments: Vec<FakeSegment>) -> Self {
        Self {
            segments,
            load_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ManifestSource for FakeManifest {
    async fn load(&self, force_reload: bool) -> Result<(), VslError> {
        self.load_calls.lock().unwrap().push(force_reload);
        Ok(())
    }

    fn segment_count(&self) -> i64 {
        self.segments.len() as i64
    }

    fn segment_mrl(&self, order: u32) -> Option<String> {
        self.segments.get(order as usize).map(|s| s.mrl.clone())
    }

    fn segment_url(&self, order: u32) -> Option<String> {
        self.segments.get(order as usize).map(|s| s.url.clone())
    }

    fn segment_duration_ms(&self, order: u32) -> i64 {
        self.segments
            .get(order as usize)
            .map(|s| s.duration_ms)
            .unwrap_or(-1)
    }

    fn segment_bytes(&self, order: u32) -> i64 {
        self.segments
            .get(order as usize)
            .map(|s| s.declared_bytes)
            .unwrap_or(-1)
    }
}

/// A [`SegmentStream`] backed by an in-memory byte buffer, honoring a byte
/// offset the way a real `Range` request would.
pub struct FakeStream {
    data: Vec<u8>,
    cursor: usize,
    cached: u64,
}

impl FakeStream {
    pub fn new(data: Vec<u8>, byte_offset: Option<u64>) -> Self {
        let start = byte_offset.unwrap_or(0) as usize;
        let start = start.min(data.len());
        Self {
            data,
            cursor: start,
            cached: 0,
        }
    }
}

#[async_trait]
impl SegmentStream for FakeStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, VslError> {
        let remaining = &self.data[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        self.cached += n as u64;
        Ok(n)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn cached_bytes(&self) -> u64 {
        self.cached
    }
}

/// Resolves URLs of the form `"fake://<name>"` against a fixed map of
/// bodies, applying `?start=N` / `&start=N` suffixes as a byte offset -
/// good enough to exercise the plain-range and Sina byte-seek strategies
/// without a real HTTP stack.
pub struct FakeUrlOpener {
    bodies: Vec<(String, Vec<u8>)>,
}

impl FakeUrlOpener {
    pub fn new(bodies: Vec<(String, Vec<u8>)>) -> Self {
        Self { bodies }
    }

    fn body_for(&self, base_url: &str) -> Option<&Vec<u8>> {
        self.bodies
            .iter()
            .find(|(u, _)| u == base_url)
            .map(|(_, b)| b)
    }
}

#[async_trait]
impl UrlOpener for FakeUrlOpener {
    async fn open(&self, request: OpenRequest<'_>) -> Result<Box<dyn SegmentStream>, VslError> {
        let base = request.url.split(['?', '&']).next().unwrap_or(request.url);
        let body = self
            .body_for(base)
            .ok_or_else(|| VslError::network(format!("no fake body for {base}")))?
            .clone();
        Ok(Box::new(FakeStream::new(body, request.byte_offset)))
    }
}
