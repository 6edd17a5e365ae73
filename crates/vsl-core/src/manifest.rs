//! The Manifest Callback Adapter: a narrow facade over the host's
//! per-segment manifest. The original module bound this as a vtable of raw
//! function pointers; here that becomes a trait, with the one genuinely
//! optional callback (`load_segment`) expressed as a default trait method
//! rather than a runtime presence check.

use async_trait::async_trait;

use crate::error::VslError;

/// The manifest contract the scheduler and segment-access layers depend on.
/// `load` and the five getters are required; `load_segment` defaults to a
/// no-op for hosts that never need a per-segment refresh hook.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// (Re)loads the manifest. `force_reload` is set on retry after an open
    /// failure, or to recover from a suspected truncated/stale manifest.
    async fn load(&self, force_reload: bool) -> Result<(), VslError>;

    /// Per-segment refresh hook, called before opening a segment. Default:
    /// no-op, for hosts whose manifest is fully resolved by `load`.
    async fn load_segment(&self, _first_attempt: bool, _order: u32) -> Result<(), VslError> {
        Ok(())
    }

    /// Segment count. `<= 0` is treated as a manifest error by callers.
    fn segment_count(&self) -> i64;

    fn segment_mrl(&self, order: u32) -> Option<String>;

    fn segment_url(&self, order: u32) -> Option<String>;

    /// `0` is a legitimate (if unusual) duration; negative is invalid.
    fn segment_duration_ms(&self, order: u32) -> i64;

    /// `<= 0` means "unknown", triggering the Segment Byte Access fallback
    /// size-probe.
    fn segment_bytes(&self, order: u32) -> i64;
}

type LoadFn = dyn Fn(bool) -> Result<(), VslError> + Send + Sync;
type LoadSegmentFn = dyn Fn(bool, u32) -> Result<(), VslError> + Send + Sync;
type CountFn = dyn Fn() -> i64 + Send + Sync;
type MrlFn = dyn Fn(u32) -> Option<String> + Send + Sync;
type UrlFn = dyn Fn(u32) -> Option<String> + Send + Sync;
type DurationFn = dyn Fn(u32) -> i64 + Send + Sync;
type BytesFn = dyn Fn(u32) -> i64 + Send + Sync;

/// A [`ManifestSource`] built from raw closures, mirroring the original
/// module's `vsl_cb_t` vtable most literally (useful for FFI-style hosts
/// that hand over bare function pointers rather than implementing a trait).
/// Unlike the trait-based path, a closure-built adapter validates its
/// required bindings at construction time, since there is no compiler check
/// standing in for a missing one.
pub struct FnManifestSource {
    load: Box<LoadFn>,
    load_segment: Option<Box<LoadSegmentFn>>,
    get_count: Box<CountFn>,
    get_mrl: Box<MrlFn>,
    get_url: Box<UrlFn>,
    get_duration_ms: Box<DurationFn>,
    get_bytes: Box<BytesFn>,
}

/// Builder for [`FnManifestSource`]; every required binding must be set
/// before [`build`](ManifestCallbacksBuilder::build) or construction fails
/// with `ConfigError`.
#[derive(Default)]
pub struct ManifestCallbacksBuilder {
    load: Option<Box<LoadFn>>,
    load_segment: Option<Box<LoadSegmentFn>>,
    get_count: Option<Box<CountFn>>,
    get_mrl: Option<Box<MrlFn>>,
    get_url: Option<Box<UrlFn>>,
    get_duration_ms: Option<Box<DurationFn>>,
    get_bytes: Option<Box<BytesFn>>,
}

impl ManifestCallbacksBuilder {
    pub fn load(mut self, f: impl Fn(bool) -> Result<(), VslError> + Send + Sync + 'static) -> Self {
        self.load = Some(Box::new(f));
        self
    }

    pub fn load_segment(
        mut self,
        f: impl Fn(bool, u32) -> Result<(), VslError> + Send + Sync + 'static,
    ) -> Self {
        self.load_segment = Some(Box::new(f));
        self
    }

    pub fn get_count(mut self, f: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.get_count = Some(Box::new(f));
        self
    }

    pub fn get_mrl(mut self, f: impl Fn(u32) -> Option<String> + Send + Sync + 'static) -> Self {
        self.get_mrl = Some(Box::new(f));
        self
    }

    pub fn get_url(mut self, f: impl Fn(u32) -> Option<String> + Send + Sync + 'static) -> Self {
        self.get_url = Some(Box::new(f));
        self
    }

    pub fn get_duration_ms(mut self, f: impl Fn(u32) -> i64 + Send + Sync + 'static) -> Self {
        self.get_duration_ms = Some(Box::new(f));
        self
    }

    pub fn get_bytes(mut self, f: impl Fn(u32) -> i64 + Send + Sync + 'static) -> Self {
        self.get_bytes = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<FnManifestSource, VslError> {
        Ok(FnManifestSource {
            load: self
                .load
                .ok_or_else(|| VslError::config("manifest callback adapter missing `load`"))?,
            load_segment: self.load_segment,
            get_count: self
                .get_count
                .ok_or_else(|| VslError::config("manifest callback adapter missing `get_count`"))?,
            get_mrl: self
                .get_mrl
                .ok_or_else(|| VslError::config("manifest callback adapter missing `get_mrl`"))?,
            get_url: self
                .get_url
                .ok_or_else(|| VslError::config("manifest callback adapter missing `get_url`"))?,
            get_duration_ms: self.get_duration_ms.ok_or_else(|| {
                VslError::config("manifest callback adapter missing `get_duration_ms`")
            })?,
            get_bytes: self
                .get_bytes
                .ok_or_else(|| VslError::config("manifest callback adapter missing `get_bytes`"))?,
        })
    }
}

#[async_trait]
impl ManifestSource for FnManifestSource {
    async fn load(&self, force_reload: bool) -> Result<(), VslError> {
        (self.load)(force_reload)
    }

    async fn load_segment(&self, first_attempt: bool, order: u32) -> Result<(), VslError> {
        match &self.load_segment {
            Some(f) => f(first_attempt, order),
            None => Ok(()),
        }
    }

    fn segment_count(&self) -> i64 {
        (self.get_count)()
    }

    fn segment_mrl(&self, order: u32) -> Option<String> {
        (self.get_mrl)(order)
    }

    fn segment_url(&self, order: u32) -> Option<String> {
        (self.get_url)(order)
    }

    fn segment_duration_ms(&self, order: u32) -> i64 {
        (self.get_duration_ms)(order)
    }

    fn segment_bytes(&self, order: u32) -> i64 {
        (self.get_bytes)(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fails_without_required_bindings() {
        let err = ManifestCallbacksBuilder::default()
            .load(|_| Ok(()))
            .build();
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn builder_succeeds_with_all_required_bindings() {
        let src = ManifestCallbacksBuilder::default()
            .load(|_| Ok(()))
            .get_count(|| 3)
            .get_mrl(|o| Some(format!("mrl-{o}")))
            .get_url(|o| Some(format!("https://example/{o}")))
            .get_duration_ms(|_| 1000)
            .get_bytes(|_| 100_000)
            .build()
            .unwrap();

        assert_eq!(src.segment_count(), 3);
        assert_eq!(src.segment_mrl(1).as_deref(), Some("mrl-1"));
        src.load(false).await.unwrap();
        src.load_segment(true, 0).await.unwrap();
    }
}
