use crate::error::VslError;

/// Immutable per-segment description, as loaded from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub order: u32,
    pub duration_us: u64,
    /// Cumulative sum of the durations of all preceding segments.
    pub start_time_us: u64,
    pub mrl: String,
}

/// The ordered segment list plus its cumulative duration, built once at
/// open and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SegmentIndex {
    segments: Vec<SegmentDescriptor>,
    total_duration_us: u64,
}

impl SegmentIndex {
    /// Builds the index from per-segment (mrl, duration_us) pairs in
    /// manifest order, computing cumulative start times.
    pub fn build(entries: Vec<(String, u64)>) -> Result<Self, VslError> {
        if entries.is_empty() {
            return Err(VslError::manifest("manifest reported zero segments"));
        }
        let mut segments = Vec::with_capacity(entries.len());
        let mut start_time_us = 0u64;
        for (order, (mrl, duration_us)) in entries.into_iter().enumerate() {
            if mrl.is_empty() {
                return Err(VslError::manifest(format!(
                    "segment {order} has an empty MRL"
                )));
            }
            segments.push(SegmentDescriptor {
                order: order as u32,
                duration_us,
                start_time_us,
                mrl,
            });
            start_time_us += duration_us;
        }
        Ok(Self {
            segments,
            total_duration_us: start_time_us,
        })
    }

    pub fn count(&self) -> usize {
        self.segments.len()
    }

    pub fn total_duration_us(&self) -> u64 {
        self.total_duration_us
    }

    pub fn get(&self, order: u32) -> Option<&SegmentDescriptor> {
        self.segments.get(order as usize)
    }

    pub fn last_order(&self) -> u32 {
        (self.segments.len() - 1) as u32
    }

    /// Finds the segment whose `[start_time_us, start_time_us + duration_us)`
    /// window contains `global_us`, clamping to the last segment when the
    /// position is past the end.
    ///
    /// The upstream bound check this mirrors used `i_segment > count` rather
    /// than `>=`; preserved here as a defensive comment since the loop's own
    /// termination already makes the branch unreachable for a well-formed
    /// index (see DESIGN.md, open question #2).
    pub fn find_segment_for_time(&self, global_us: u64) -> u32 {
        for segment in &self.segments {
            if global_us < segment.start_time_us + segment.duration_us {
                return segment.order;
            }
        }
        self.last_order()
    }
}

/// The seven upstream site schemes, each usable either as an index-layer
/// scheme or a segment-layer scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Vsl,
    Sina,
    Youku,
    Cntv,
    Sohu,
    Letv,
    Iqiyi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Index,
    Segment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessScheme {
    pub site: Site,
    pub kind: AccessKind,
}

impl AccessScheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        use AccessKind::*;
        use Site::*;
        let (site, kind) = match scheme {
            "vslindex" => (Vsl, Index),
            "vslsegment" => (Vsl, Segment),
            "sinaindex" => (Sina, Index),
            "sinasegment" => (Sina, Segment),
            "youkuindex" => (Youku, Index),
            "youkusegment" => (Youku, Segment),
            "cntvindex" => (Cntv, Index),
            "cntvsegment" => (Cntv, Segment),
            "sohuindex" => (Sohu, Index),
            "sohusegment" => (Sohu, Segment),
            "letvindex" => (Letv, Index),
            "letvsegment" => (Letv, Segment),
            "iqiyiindex" => (Iqiyi, Index),
            "iqiyisegment" => (Iqiyi, Segment),
            _ => return None,
        };
        Some(Self { site, kind })
    }
}

/// Seek strategy selected by site, shared between the index and segment
/// layers. CNTV reuses the Youku strategy verbatim (only `seekable` differs
/// between the two), mirroring the original's function-pointer reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStrategy {
    /// Fresh open, direct byte-range seek. Used by the generic `vsl` scheme
    /// and by sohu/letv/iqiyi.
    PlainRange,
    /// Sina: `url?start=<byte offset>`, server prepends an extra FLV header
    /// that must be skipped after reopening.
    SinaByteSeek,
    /// Youku/CNTV: `url?start=<second>`, convergence loop against the
    /// server's second-granularity seek.
    SecondSeek,
}

/// Per-site strategy bundle, resolved once at segment-access open.
#[derive(Debug, Clone, Copy)]
pub struct SiteProfile {
    pub strategy: SeekStrategy,
    pub seekable: bool,
    pub continuous: bool,
    pub retry_for_broken_stream: bool,
    pub require_content_length: bool,
}

impl Site {
    pub fn profile(self) -> SiteProfile {
        match self {
            Site::Sina => SiteProfile {
                strategy: SeekStrategy::SinaByteSeek,
                seekable: true,
                continuous: true,
                retry_for_broken_stream: true,
                require_content_length: true,
            },
            Site::Youku => SiteProfile {
                strategy: SeekStrategy::SecondSeek,
                seekable: true,
                continuous: true,
                retry_for_broken_stream: false,
                require_content_length: false,
            },
            Site::Cntv => SiteProfile {
                strategy: SeekStrategy::SecondSeek,
                seekable: false,
                continuous: true,
                retry_for_broken_stream: false,
                require_content_length: false,
            },
            Site::Sohu | Site::Letv | Site::Iqiyi => SiteProfile {
                strategy: SeekStrategy::PlainRange,
                seekable: true,
                continuous: false,
                retry_for_broken_stream: false,
                require_content_length: false,
            },
            Site::Vsl => SiteProfile {
                strategy: SeekStrategy::PlainRange,
                seekable: true,
                continuous: false,
                retry_for_broken_stream: false,
                require_content_length: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_cumulative_start_times() {
        let index = SegmentIndex::build(vec![
            ("a".into(), 1_000_000),
            ("b".into(), 2_000_000),
            ("c".into(), 500_000),
        ])
        .unwrap();
        assert_eq!(index.get(0).unwrap().start_time_us, 0);
        assert_eq!(index.get(1).unwrap().start_time_us, 1_000_000);
        assert_eq!(index.get(2).unwrap().start_time_us, 3_000_000);
        assert_eq!(index.total_duration_us(), 3_500_000);
    }

    #[test]
    fn rejects_empty_manifest() {
        assert!(SegmentIndex::build(vec![]).is_err());
    }

    #[test]
    fn finds_segment_by_time() {
        let index = SegmentIndex::build(vec![
            ("a".into(), 1_000_000),
            ("b".into(), 2_000_000),
            ("c".into(), 500_000),
        ])
        .unwrap();
        assert_eq!(index.find_segment_for_time(0), 0);
        assert_eq!(index.find_segment_for_time(999_999), 0);
        assert_eq!(index.find_segment_for_time(1_000_000), 1);
        assert_eq!(index.find_segment_for_time(2_999_999), 1);
        assert_eq!(index.find_segment_for_time(3_000_000), 2);
        // past the end clamps to the last segment
        assert_eq!(index.find_segment_for_time(10_000_000), 2);
    }

    #[test]
    fn scheme_parsing_round_trips_every_site() {
        for (text, site, kind) in [
            ("vslindex", Site::Vsl, AccessKind::Index),
            ("vslsegment", Site::Vsl, AccessKind::Segment),
            ("sinaindex", Site::Sina, AccessKind::Index),
            ("youkusegment", Site::Youku, AccessKind::Segment),
            ("cntvindex", Site::Cntv, AccessKind::Index),
            ("sohusegment", Site::Sohu, AccessKind::Segment),
            ("letvindex", Site::Letv, AccessKind::Index),
            ("iqiyisegment", Site::Iqiyi, AccessKind::Segment),
        ] {
            let scheme = AccessScheme::parse(text).unwrap();
            assert_eq!(scheme.site, site);
            assert_eq!(scheme.kind, kind);
        }
        assert!(AccessScheme::parse("bogus").is_none());
    }

    #[test]
    fn cntv_reuses_youku_strategy_with_seekable_false() {
        let youku = Site::Youku.profile();
        let cntv = Site::Cntv.profile();
        assert_eq!(youku.strategy, cntv.strategy);
        assert!(youku.seekable);
        assert!(!cntv.seekable);
    }
}
