//! Contracts the Scheduler drives but does not own: the downstream output
//! sink, and the inner, per-segment demuxer.

use async_trait::async_trait;

use crate::error::VslError;

/// The host's real elementary-stream output. `ManagedOutput`
/// (`vsl-scheduler::output`) wraps a value implementing this trait without
/// taking ownership semantics away from it.
pub trait OutputSink: Send + Sync {
    /// Whether all previously written packets have been consumed
    /// downstream. Polled during the post-transition drain.
    fn is_empty(&self) -> bool;

    /// Resets the presentation clock, issued once a transition's drain
    /// completes (or its budget expires).
    fn reset_pcr(&self);

    /// Forces one flush cycle; called once after a segment transition, per
    /// the `stop_buffering` latch.
    fn get_empty(&self);
}

/// Outcome of one inner-demux pump iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxStatus {
    /// More to come; the scheduler should call `pump` again.
    Continue,
    /// This segment is exhausted.
    Eof,
}

/// A control query this layer doesn't interpret itself and forwards
/// verbatim to the nested container demuxer, mirroring the original
/// `Control()`'s `default:` branch calling `demux_vaControl` on the segment
/// demuxer for anything it doesn't list explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassthroughControl {
    CanFastSeek,
    GetContentType,
    GetTitleInfo,
    SetTitle(u32),
    SetSeekpoint(u32),
    SetPrivateIdState(u32, bool),
}

/// Reply to a [`PassthroughControl`] query.
#[derive(Debug, Clone, PartialEq)]
pub enum PassthroughValue {
    Bool(bool),
    ContentType(Option<String>),
    Unit,
}

/// A single segment's inner demuxer: unwraps one container (FLV, MP4, ...)
/// and pushes its elementary streams into the output sink it was
/// constructed with. Format detection and the actual container parsing are
/// out of this crate's scope (host media framework concern); this trait is
/// the seam.
#[async_trait]
pub trait InnerDemux: Send + Sync {
    async fn pump(&mut self) -> Result<DemuxStatus, VslError>;

    /// Segment-local elapsed time, if the demuxer has established one yet.
    fn get_time_us(&self) -> Option<u64>;

    async fn set_time_us(&mut self, time_us: u64) -> Result<(), VslError>;

    fn set_pause(&mut self, paused: bool);

    /// Bytes consumed from the underlying origin stream so far, for the
    /// scheduler's cache-percentage reporting.
    fn cached_bytes(&self) -> u64;

    /// The underlying stream's declared total size, if known.
    fn total_size(&self) -> Option<u64>;

    /// Answers a query this crate's control surface doesn't handle itself.
    /// Default: unsupported, matching a container demuxer that doesn't
    /// implement the query either.
    async fn control_passthrough(
        &mut self,
        query: PassthroughControl,
    ) -> Result<PassthroughValue, VslError> {
        let _ = query;
        Err(VslError::Unsupported {
            what: "inner demux does not implement this control query",
        })
    }
}

/// Constructs an [`InnerDemux`] over a freshly opened segment stream,
/// auto-detecting the container format. Out of scope per the engine's
/// purpose (host media framework concern); injected so the scheduler never
/// depends on a concrete demuxer.
#[async_trait]
pub trait InnerDemuxFactory: Send + Sync {
    async fn open(
        &self,
        stream: Box<dyn crate::transport::SegmentStream>,
        out: std::sync::Arc<dyn OutputSink>,
    ) -> Result<Box<dyn InnerDemux>, VslError>;
}

/// Returned by a failed [`BufferFilterFactory::wrap`], handing the
/// original stream back so the caller can fall through to it unwrapped
/// instead of losing it.
pub struct BufferWrapError {
    pub error: VslError,
    pub stream: Box<dyn crate::transport::SegmentStream>,
}

/// An optional async read-ahead wrapper placed between the origin stream
/// and the inner demuxer. Construction failure is non-fatal: the scheduler
/// falls back to the raw stream.
#[async_trait]
pub trait BufferFilterFactory: Send + Sync {
    async fn wrap(
        &self,
        stream: Box<dyn crate::transport::SegmentStream>,
    ) -> Result<Box<dyn crate::transport::SegmentStream>, BufferWrapError>;
}
