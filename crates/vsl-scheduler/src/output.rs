use std::sync::Arc;

use vsl_core::OutputSink;

/// Dispose-without-destroying-backend wrapper over the host's real
/// elementary-stream output, grounded in the original module's
/// `demux_EsOutManagedNew`: a nested per-segment demuxer can be torn down
/// (dropping its `ManagedOutput`) without collapsing the downstream
/// pipeline the host owns.
///
/// All calls delegate straight through; the only thing this type adds is
/// that dropping it never calls anything resembling "destroy" on the
/// backend — it just drops its `Arc` clone.
pub struct ManagedOutput {
    backend: Arc<dyn OutputSink>,
}

impl ManagedOutput {
    pub fn new(backend: Arc<dyn OutputSink>) -> Self {
        Self { backend }
    }

    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    pub fn reset_pcr(&self) {
        self.backend.reset_pcr();
    }

    pub fn get_empty(&self) {
        self.backend.get_empty();
    }

    pub fn backend(&self) -> Arc<dyn OutputSink> {
        self.backend.clone()
    }
}

/// The inner demuxer writes into the managed wrapper, not the raw backend
/// directly, so that destroying a segment's demuxer never reaches past the
/// wrapper into the host's real output.
impl OutputSink for ManagedOutput {
    fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    fn reset_pcr(&self) {
        self.backend.reset_pcr()
    }

    fn get_empty(&self) {
        self.backend.get_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingSink {
        empty: AtomicBool,
        resets: AtomicUsize,
        flushes: AtomicUsize,
    }

    impl OutputSink for CountingSink {
        fn is_empty(&self) -> bool {
            self.empty.load(Ordering::SeqCst)
        }
        fn reset_pcr(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
        fn get_empty(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dropping_managed_output_does_not_touch_backend() {
        let backend = Arc::new(CountingSink {
            empty: AtomicBool::new(true),
            resets: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
        });
        {
            let managed = ManagedOutput::new(backend.clone());
            managed.reset_pcr();
            assert_eq!(backend.resets.load(Ordering::SeqCst), 1);
        }
        // backend survives the managed wrapper's drop untouched
        assert!(backend.is_empty());
        assert_eq!(backend.resets.load(Ordering::SeqCst), 1);
    }
}
