//! Per-site seek strategies: given a seek target, produce a freshly opened
//! stream positioned (as closely as the origin allows) at that byte.

use tracing::{debug, trace};
use vsl_core::{OpenRequest, SegmentAccessConfig, SegmentStream, UrlOpener, VslError};

use crate::flv_header::{skip_flv_header, skip_unknown_header};

fn with_start_param(base_url: &str, value: impl std::fmt::Display) -> String {
    let sep = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{sep}start={value}")
}

/// Plain range seek: one fresh request at the exact byte offset. Used by
/// the generic `vsl` scheme and sohu/letv/iqiyi — all of which carry
/// `continuous = false` in their site profile, so `continuous` here is
/// always that profile value, not a hardcoded constant.
pub async fn open_plain_range(
    opener: &dyn UrlOpener,
    base_url: &str,
    pos: u64,
    continuous: bool,
) -> Result<Box<dyn SegmentStream>, VslError> {
    opener
        .open(OpenRequest {
            url: base_url,
            byte_offset: Some(pos),
            continuous,
        })
        .await
}

/// Sina byte-seek: the origin appends an extra FLV header ahead of the
/// requested byte offset which must be skipped with [`skip_flv_header`].
pub async fn open_sina_byte_seek(
    opener: &dyn UrlOpener,
    base_url: &str,
    order: u32,
    pos: u64,
    total_size: u64,
) -> Result<Box<dyn SegmentStream>, VslError> {
    let url = with_start_param(base_url, pos);
    let mut stream = opener
        .open(OpenRequest {
            url: &url,
            byte_offset: None,
            continuous: true,
        })
        .await?;
    let declared = stream
        .size()
        .ok_or(VslError::SizeUnknown { order })?;
    let expected_remaining = total_size.saturating_sub(pos);
    skip_flv_header(stream.as_mut(), order, declared, expected_remaining).await?;
    Ok(stream)
}

/// Convergence state carried across Youku/CNTV second-seeks, so a later
/// seek doesn't re-overshoot past a point an earlier seek already backed up
/// from.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecondSeekState {
    last_backward_target_sec: Option<i64>,
}

/// Youku/CNTV second-seek: the origin only seeks to whole-second
/// granularity, so this iterates, nudging the requested second forward or
/// backward based on how far off the server's actual cut point landed,
/// until it's close enough to accept.
///
/// The upstream loop has no hard iteration cap; this one does, as a
/// deliberate safety margin the clean-room port adds (see DESIGN.md).
pub async fn open_second_seek(
    opener: &dyn UrlOpener,
    config: &SegmentAccessConfig,
    base_url: &str,
    order: u32,
    pos: u64,
    total_size: u64,
    bytes_per_second: u64,
    state: &mut SecondSeekState,
) -> Result<Box<dyn SegmentStream>, VslError> {
    const MAX_ITERATIONS: u32 = 32;
    let bps = bytes_per_second.max(1) as i64;
    let pos_i = pos as i64;

    let mut target_sec = (pos_i / bps - config.youku_lead_seconds).max(0);
    let mut seeked_forward = false;

    for _ in 0..MAX_ITERATIONS {
        let url = if target_sec == 0 {
            base_url.to_string()
        } else {
            with_start_param(base_url, target_sec)
        };

        let mut stream = opener
            .open(OpenRequest {
                url: &url,
                byte_offset: None,
                continuous: true,
            })
            .await?;
        let stream_len = stream.size().ok_or(VslError::SizeUnknown { order })?;
        if stream_len == 0 {
            return Err(VslError::SizeUnknown { order });
        }

        let seeked = total_size as i64 - stream_len as i64;
        if seeked < 0 {
            return Err(VslError::network(
                "second-seek produced a stream larger than the segment's total size",
            ));
        }

        if seeked > pos_i {
            // Overshoot: landed past the requested position. Back off and
            // retry.
            let diff_sec = (seeked - pos_i) / bps;
            target_sec = (target_sec - diff_sec - config.youku_overshoot_margin_seconds).max(0);
            state.last_backward_target_sec = Some(target_sec);
            trace!(order, target_sec, "second-seek overshoot, backing off");
            if target_sec > config.youku_min_seek_seconds {
                continue;
            }
        } else if !seeked_forward
            && seeked + config.youku_close_margin_bytes > pos_i
        {
            // Close but short: nudge forward, but never past a point we've
            // already determined overshoots (monotone-termination guard).
            let diff_sec = (pos_i - seeked - config.youku_close_adjust_bytes) / bps;
            let converged = state
                .last_backward_target_sec
                .is_some_and(|last_backward| target_sec + diff_sec >= last_backward);
            if converged {
                debug!(order, target_sec, "second-seek converged against prior overshoot");
                skip_unknown_header(
                    stream.as_mut(),
                    order,
                    stream_len,
                    total_size.saturating_sub(pos),
                )
                .await?;
                return Ok(stream);
            }
            target_sec += diff_sec;
            seeked_forward = true;
            if target_sec > config.youku_min_seek_seconds {
                continue;
            }
        }

        let expected_remaining = total_size.saturating_sub(pos);
        skip_unknown_header(stream.as_mut(), order, stream_len, expected_remaining).await?;
        return Ok(stream);
    }

    Err(VslError::network(
        "second-seek did not converge within the iteration budget",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsl_core::test_support::FakeUrlOpener;

    #[tokio::test]
    async fn plain_range_requests_exact_offset() {
        let opener = FakeUrlOpener::new(vec![("fake://seg".into(), vec![1, 2, 3, 4, 5])]);
        let mut stream = open_plain_range(&opener, "fake://seg", 2, false).await.unwrap();
        let mut buf = [0u8; 8];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[3, 4, 5]);
    }

    #[tokio::test]
    async fn sina_seek_rejects_non_flv_signature() {
        let opener = FakeUrlOpener::new(vec![("fake://seg".into(), vec![0u8; 32])]);
        let err = open_sina_byte_seek(&opener, "fake://seg", 0, 10, 32)
            .await
            .unwrap_err();
        assert!(matches!(err, VslError::SeekedHeaderInvalid { .. }));
    }
}
