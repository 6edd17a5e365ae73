//! Constructor-time configuration, replacing the global-like host state the
//! original module read ad hoc (`network-caching`, `http-continuous`).

/// Host-level configuration relevant to the playback engine.
#[derive(Debug, Clone)]
pub struct VslConfig {
    /// Network caching budget, in milliseconds. Used both as the reported
    /// PTS delay (`1000 * network_caching_ms` microseconds) and as the
    /// upper bound on the post-transition drain wait.
    pub network_caching_ms: u64,
}

impl Default for VslConfig {
    fn default() -> Self {
        Self {
            network_caching_ms: 1000,
        }
    }
}

impl VslConfig {
    pub fn pts_delay_us(&self) -> u64 {
        1000 * self.network_caching_ms
    }
}

/// Tunables for the segment byte-access layer. These were magic constants
/// in the original source; pulling them into a `Default`-backed struct
/// keeps them overridable in tests without touching the algorithm.
#[derive(Debug, Clone)]
pub struct SegmentAccessConfig {
    /// Floor applied to the computed bytes-per-second estimate.
    pub min_bytes_per_second: u64,
    /// Seek distances below this are served by discard-reading the current
    /// stream instead of opening a new one.
    pub short_seek_threshold_bytes: u64,
    /// A segment whose declared size is below this threshold, combined with
    /// `truncated_duration_threshold_ms`, is treated as a broken/placeholder
    /// body worth retrying.
    pub truncated_size_threshold_bytes: u64,
    pub truncated_duration_threshold_ms: i64,
    /// Youku/CNTV second-seek convergence constants.
    pub youku_lead_seconds: i64,
    pub youku_overshoot_margin_seconds: i64,
    pub youku_close_margin_bytes: i64,
    pub youku_close_adjust_bytes: i64,
    pub youku_min_seek_seconds: i64,
}

impl Default for SegmentAccessConfig {
    fn default() -> Self {
        Self {
            min_bytes_per_second: 25_000,
            short_seek_threshold_bytes: 128 * 1024,
            truncated_size_threshold_bytes: 64_000,
            truncated_duration_threshold_ms: 10_000,
            youku_lead_seconds: 15,
            youku_overshoot_margin_seconds: 5,
            youku_close_margin_bytes: 1_000_000,
            youku_close_adjust_bytes: 500_000,
            youku_min_seek_seconds: 5,
        }
    }
}
