use async_trait::async_trait;

use crate::error::VslError;

/// A request to open a byte stream for a segment URL.
pub struct OpenRequest<'a> {
    pub url: &'a str,
    /// Byte offset to request via a `Range` header, when the site's
    /// strategy seeks by byte (plain-range, Sina). `None` opens from the
    /// start.
    pub byte_offset: Option<u64>,
    /// Suppresses Range requests entirely when the host has flagged this
    /// segment `http-continuous` (some origins reject ranged requests once
    /// that flag is set).
    pub continuous: bool,
}

/// A single origin segment's byte stream. Implementations hide whatever
/// origin-server quirks the site requires; the segment-access layer is only
/// ever aware of "read some bytes" and "how big is this declared to be".
#[async_trait]
pub trait SegmentStream: Send + Sync {
    /// Reads into `buf`, returning the number of bytes read. `Ok(0)` means
    /// end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, VslError>;

    /// The origin-declared size, if known (e.g. `Content-Length`). `None`
    /// when the origin never exposes one.
    fn size(&self) -> Option<u64>;

    /// Bytes buffered/received so far, used for the scheduler's cache
    /// percentage reporting.
    fn cached_bytes(&self) -> u64;
}

/// Opens origin byte streams. The production implementation
/// (`vsl-transport::ReqwestUrlOpener`) issues real HTTP requests; tests use
/// an in-memory double (`vsl_core::test_support`).
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, request: OpenRequest<'_>) -> Result<Box<dyn SegmentStream>, VslError>;
}
