//! Progress-callback trait for per-object preprocessing events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::job::PreprocessJob::with_progress`] to receive events as the job
//! works through a notification batch.
//!
//! # Example
//!
//! ```rust
//! use ocrprep::{JobProgressCallback, StorageObjectRef};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     written: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_object_complete(&self, _object: &StorageObjectRef, output: &StorageObjectRef, _angle: f32) {
//!         self.written.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("wrote {output}");
//!     }
//! }
//! ```

use crate::naming::StorageObjectRef;
use std::sync::Arc;

/// Called by the preprocessing job as it processes a batch.
///
/// Objects are processed concurrently, so `on_object_*` may be called from
/// several tasks at once; implementations must synchronise their own state.
/// All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Called once per notification, after filtering.
    ///
    /// # Arguments
    /// * `total`   — intake objects that will be processed
    /// * `ignored` — objects outside the intake prefix
    fn on_batch_start(&self, total: usize, ignored: usize) {
        let _ = (total, ignored);
    }

    /// Called before an object is downloaded.
    fn on_object_start(&self, object: &StorageObjectRef) {
        let _ = object;
    }

    /// Called after the normalized variant was written.
    fn on_object_complete(&self, object: &StorageObjectRef, output: &StorageObjectRef, angle: f32) {
        let _ = (object, output, angle);
    }

    /// Called when an object failed; the batch carries on.
    fn on_object_error(&self, object: &StorageObjectRef, error: &str) {
        let _ = (object, error);
    }

    /// Called once after every object was attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type the job stores.
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
    }

    impl JobProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize, _ignored: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_object_start(&self, _object: &StorageObjectRef) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_object_complete(&self, _o: &StorageObjectRef, _out: &StorageObjectRef, _a: f32) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_object_error(&self, _object: &StorageObjectRef, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let obj = StorageObjectRef::new("c", "public/ocr/a.png");
        cb.on_batch_start(1, 0);
        cb.on_object_start(&obj);
        cb.on_object_complete(&obj, &obj, 0.5);
        cb.on_object_error(&obj, "boom");
        cb.on_batch_complete(1, 0);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let obj = StorageObjectRef::new("c", "public/ocr/a.png");

        tracker.on_batch_start(2, 1);
        tracker.on_object_start(&obj);
        tracker.on_object_complete(&obj, &obj, 1.0);
        tracker.on_object_start(&obj);
        tracker.on_object_error(&obj, "decode failed");

        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
