//! Header-skip logic applied to a freshly re-opened segment stream after a
//! seek. Both functions below only ever do length arithmetic: given the
//! stream's declared size and how many bytes the access layer still expects
//! to read from the current position, they discard the difference.
//!
//! The upstream FLV variant additionally walks the first few tags (audio /
//! video / metadata, reading each one's body length and previous-tag-size
//! fields) looking for a cleaner resync point, but that code path is
//! disabled in the source it was distilled from and never executes; only
//! the signature check plus the same length-arithmetic skip ships. This is
//! preserved here rather than "fixed" into a real tag walker — see
//! DESIGN.md, open question #1.

use vsl_core::{SegmentStream, VslError};

const DISCARD_CHUNK: usize = 4096;

/// Reads and discards exactly `remaining` bytes from `stream`, in bounded
/// chunks, mirroring the original's `stream_ReadSeek` helper.
async fn discard_bytes(
    stream: &mut dyn SegmentStream,
    order: u32,
    mut remaining: u64,
) -> Result<(), VslError> {
    let mut buf = [0u8; DISCARD_CHUNK];
    while remaining > 0 {
        let want = remaining.min(DISCARD_CHUNK as u64) as usize;
        let n = stream.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(VslError::truncated(
                order,
                "eof while discarding seeked-stream header bytes",
            ));
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Used by the second-seek (Youku/CNTV) strategy: discards
/// `stream_len - expected_remaining` bytes with no signature check at all.
///
/// `stream_len` is the size the reopened stream declares; `expected_remaining`
/// is `total_size - seek_pos`, i.e. how much of the *original* stream should
/// still be left from the seek point onward. Any surplus is origin-side
/// padding ahead of the real resync point.
pub async fn skip_unknown_header(
    stream: &mut dyn SegmentStream,
    order: u32,
    stream_len: u64,
    expected_remaining: u64,
) -> Result<u64, VslError> {
    if stream_len < expected_remaining {
        return Err(VslError::truncated(
            order,
            "seeked stream shorter than the expected remainder",
        ));
    }
    let alignment = stream_len - expected_remaining;
    if alignment > 0 {
        discard_bytes(stream, order, alignment).await?;
    }
    Ok(alignment)
}

/// Used by the Sina byte-seek strategy: validates an "FLV" signature on the
/// reopened stream, then performs the exact same length-arithmetic skip as
/// [`skip_unknown_header`] — not a tag walk.
pub async fn skip_flv_header(
    stream: &mut dyn SegmentStream,
    order: u32,
    stream_len: u64,
    expected_remaining: u64,
) -> Result<u64, VslError> {
    const MIN_HEADER_AND_TAG_SIZE: u64 = 9 + 4;
    if stream_len < MIN_HEADER_AND_TAG_SIZE {
        return Err(VslError::truncated(
            order,
            "seeked stream too small to contain an FLV header",
        ));
    }

    let mut signature = [0u8; 3];
    let mut have = 0usize;
    while have < signature.len() {
        let n = stream.read(&mut signature[have..]).await?;
        if n == 0 {
            return Err(VslError::truncated(
                order,
                "eof while reading seeked FLV signature",
            ));
        }
        have += n;
    }
    if &signature != b"FLV" {
        return Err(VslError::SeekedHeaderInvalid {
            reason: "not a valid flv stream".to_string(),
        });
    }

    if stream_len < expected_remaining {
        return Err(VslError::truncated(
            order,
            "seeked stream shorter than the expected remainder",
        ));
    }
    let alignment = stream_len - expected_remaining;
    // The 3 signature bytes already consumed above count toward `alignment`.
    let still_to_discard = alignment.saturating_sub(signature.len() as u64);
    if still_to_discard > 0 {
        discard_bytes(stream, order, still_to_discard).await?;
    }
    Ok(alignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsl_core::test_support::FakeStream;

    #[tokio::test]
    async fn flv_header_rejects_bad_signature() {
        let mut stream: Box<dyn SegmentStream> =
            Box::new(FakeStream::new(b"XYZ-not-flv-data-padding".to_vec(), None));
        let err = skip_flv_header(stream.as_mut(), 0, 24, 10).await.unwrap_err();
        assert!(matches!(err, VslError::SeekedHeaderInvalid { .. }));
    }

    #[tokio::test]
    async fn flv_header_discards_alignment_after_signature() {
        // 16 bytes total; signature "FLV" + 13 filler bytes. expected_remaining
        // of 6 means alignment = 16 - 6 = 10, of which 3 are the signature
        // itself, leaving 7 more bytes to discard, so the stream should have
        // exactly 6 bytes left afterwards.
        let mut data = b"FLV".to_vec();
        data.extend(vec![0u8; 13]);
        let mut stream: Box<dyn SegmentStream> = Box::new(FakeStream::new(data, None));
        skip_flv_header(stream.as_mut(), 0, 16, 6).await.unwrap();

        let mut buf = [0u8; 16];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 6);
    }

    #[tokio::test]
    async fn unknown_header_discards_full_alignment() {
        let data = vec![0u8; 20];
        let mut stream: Box<dyn SegmentStream> = Box::new(FakeStream::new(data, None));
        skip_unknown_header(stream.as_mut(), 0, 20, 5).await.unwrap();
        let mut buf = [0u8; 20];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 5);
    }

    #[tokio::test]
    async fn rejects_stream_shorter_than_expected_remainder() {
        let data = vec![0u8; 4];
        let mut stream: Box<dyn SegmentStream> = Box::new(FakeStream::new(data, None));
        let err = skip_unknown_header(stream.as_mut(), 0, 4, 10).await.unwrap_err();
        assert!(matches!(err, VslError::TruncatedStream { .. }));
    }
}
