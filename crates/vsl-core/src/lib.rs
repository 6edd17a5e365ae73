//! Shared types and trait seams for the segment-list playback engine:
//! the manifest contract, the transport contract, the data model (segment
//! descriptors and the index), configuration, and the error taxonomy.
//!
//! Concrete implementations live in sibling crates: `vsl-transport` (HTTP
//! byte access), `vsl-segment` (seek-capable per-segment access),
//! `vsl-scheduler` (the pump loop and managed output).

pub mod config;
pub mod error;
pub mod manifest;
pub mod model;
pub mod sink;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{SegmentAccessConfig, VslConfig};
pub use error::VslError;
pub use manifest::{FnManifestSource, ManifestCallbacksBuilder, ManifestSource};
pub use model::{AccessKind, AccessScheme, SeekStrategy, SegmentDescriptor, SegmentIndex, Site, SiteProfile};
pub use sink::{
    BufferFilterFactory, BufferWrapError, DemuxStatus, InnerDemux, InnerDemuxFactory, OutputSink,
    PassthroughControl, PassthroughValue,
};
pub use transport::{OpenRequest, SegmentStream, UrlOpener};
