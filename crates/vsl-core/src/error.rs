/// Error taxonomy for the segment-list playback engine.
///
/// Variants map directly onto the failure modes the scheduler and segment
/// access layers distinguish between: some are retried locally (manifest
/// load, segment open), some are surfaced to the caller (seek, read after a
/// successful open), and inner-demux errors pass through untouched.
#[derive(Debug, thiserror::Error)]
pub enum VslError {
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("manifest error: {reason}")]
    ManifestError { reason: String },

    #[error("network error: {reason}")]
    NetworkError { reason: String },

    #[error("truncated stream for segment {order}: {reason}")]
    TruncatedStream { order: u32, reason: String },

    #[error("segment {order} has no known size")]
    SizeUnknown { order: u32 },

    #[error("seek to {requested} out of range (size {size})")]
    SeekOutOfRange { requested: u64, size: u64 },

    #[error("invalid header after seeked stream open: {reason}")]
    SeekedHeaderInvalid { reason: String },

    #[error("inner demux error: {source}")]
    InnerDemuxError {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("unsupported operation: {what}")]
    Unsupported { what: &'static str },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl VslError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
        }
    }

    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::ManifestError {
            reason: reason.into(),
        }
    }

    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkError {
            reason: reason.into(),
        }
    }

    pub fn truncated(order: u32, reason: impl Into<String>) -> Self {
        Self::TruncatedStream {
            order,
            reason: reason.into(),
        }
    }

    pub fn inner_demux(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InnerDemuxError {
            source: Box::new(source),
        }
    }

    /// Whether this failure is worth a local, immediate retry (manifest
    /// load / segment open loops). Errors surfaced after a successful open
    /// (seek, read, inner demux) are not retryable at this layer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::TruncatedStream { .. } | Self::SizeUnknown { .. }
        )
    }
}
