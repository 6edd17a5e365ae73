//! Seek-capable per-segment byte access: hides origin-server quirks (byte
//! vs. second pseudo-seek, post-seek header noise, truncated placeholder
//! bodies, missing content length) behind a plain read/seek surface.

mod access;
mod flv_header;
mod strategy;

pub use access::SegmentAccess;
pub use strategy::SecondSeekState;
