//! Upload-triggered preprocessing job.
//!
//! Runs once per object-created notification:
//!
//! ```text
//! notification ─▶ filter public/ocr/* ─▶ per object (concurrently):
//!     get ─▶ skew search ─▶ normalize ─▶ derive key ─▶ put image/jpeg
//! ```
//!
//! Every object maps to its own `Result`; results are collected into a
//! [`BatchReport`] and failures are only logged at the batch boundary. One
//! corrupt upload therefore never stops its siblings. Objects share no mutable
//! state, so they run concurrently up to `config.concurrency`; the stages
//! inside one object are strictly sequential.

use crate::config::PipelineConfig;
use crate::error::{ObjectError, OcrPrepError};
use crate::naming::{StorageObjectRef, OUTPUT_CONTENT_TYPE};
use crate::notification::StorageNotification;
use crate::pipeline::encode::decode_image;
use crate::pipeline::{normalize_image, PreprocessingResult, SkewSearch};
use crate::progress::ProgressCallback;
use crate::storage::ObjectStore;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A successfully preprocessed object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedObject {
    /// Where the normalized variant was written.
    pub output: StorageObjectRef,
    /// Rotation applied, in degrees.
    pub angle: f32,
    /// Size of the written object.
    pub bytes: usize,
    /// Output dimensions.
    pub width: u32,
    pub height: u32,
    pub duration_ms: u64,
}

/// The result for one intake object of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectOutcome {
    pub source: StorageObjectRef,
    pub result: Result<ProcessedObject, ObjectError>,
}

/// Everything that happened to one notification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// One entry per intake object, in notification order.
    pub outcomes: Vec<ObjectOutcome>,
    /// Objects outside the intake prefix; skipped without error.
    pub ignored: Vec<StorageObjectRef>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// The per-object errors, in notification order.
    pub fn errors(&self) -> impl Iterator<Item = &ObjectError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }
}

/// Preprocesses intake uploads into their normalized variants.
pub struct PreprocessJob {
    store: Arc<dyn ObjectStore>,
    config: PipelineConfig,
    progress: Option<ProgressCallback>,
}

impl PreprocessJob {
    pub fn new(store: Arc<dyn ObjectStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            progress: None,
        }
    }

    /// Report per-object events to `callback`.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process every intake object of a notification.
    ///
    /// Never fails as a whole: per-object failures are reported in the
    /// returned [`BatchReport`].
    pub async fn handle_notification(&self, notification: &StorageNotification) -> BatchReport {
        let (intake, ignored): (Vec<_>, Vec<_>) = notification
            .objects
            .iter()
            .cloned()
            .partition(StorageObjectRef::is_intake);

        for obj in &ignored {
            debug!("Ignoring {obj}: outside the intake prefix");
        }
        info!(
            "Preprocessing {} object(s), {} ignored",
            intake.len(),
            ignored.len()
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(intake.len(), ignored.len());
        }

        let mut indexed: Vec<(usize, ObjectOutcome)> =
            stream::iter(intake.into_iter().enumerate().map(|(idx, source)| async move {
                let result = self.process_object(&source).await;
                (idx, ObjectOutcome { source, result })
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        // Restore notification order
        indexed.sort_by_key(|(idx, _)| *idx);
        let outcomes: Vec<ObjectOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

        let report = BatchReport { outcomes, ignored };
        for err in report.errors() {
            warn!("Preprocessing failed: {err}");
        }
        info!(
            "Preprocessing complete: {}/{} object(s) written",
            report.succeeded(),
            report.outcomes.len()
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(report.outcomes.len(), report.succeeded());
        }
        report
    }

    /// Preprocess a single object and write its normalized variant.
    ///
    /// Objects outside the intake prefix are rejected with
    /// [`ObjectError::Preprocess`]; use
    /// [`handle_notification`](Self::handle_notification) to have them
    /// silently ignored instead.
    pub async fn process_object(
        &self,
        source: &StorageObjectRef,
    ) -> Result<ProcessedObject, ObjectError> {
        if let Some(ref cb) = self.progress {
            cb.on_object_start(source);
        }
        let result = self.run_object(source).await;
        if let Some(ref cb) = self.progress {
            match &result {
                Ok(done) => cb.on_object_complete(source, &done.output, done.angle),
                Err(e) => cb.on_object_error(source, &e.to_string()),
            }
        }
        result
    }

    async fn run_object(&self, source: &StorageObjectRef) -> Result<ProcessedObject, ObjectError> {
        let start = Instant::now();
        let output = source.preprocessed().ok_or_else(|| ObjectError::Preprocess {
            container: source.container.clone(),
            key: source.key.clone(),
            detail: "key is not under the intake prefix".into(),
        })?;

        // ── Step 1: Download ─────────────────────────────────────────────
        let bytes = self
            .store
            .get(source)
            .await
            .map_err(|e| ObjectError::Download {
                container: source.container.clone(),
                key: source.key.clone(),
                detail: e.to_string(),
            })?;
        debug!("Downloaded {source} ({} bytes)", bytes.len());

        // ── Step 2: Skew search + normalization (CPU-bound) ──────────────
        let config = self.config.clone();
        let normalized = tokio::task::spawn_blocking(move || -> Result<PreprocessingResult, OcrPrepError> {
            // Decoded once; the search and the chain share the image.
            let img = decode_image(&bytes)?;
            let estimate = SkewSearch::new(&config).estimate(&img);
            normalize_image(&img, estimate.angle, &config)
        })
        .await
        .map_err(|e| ObjectError::Internal {
            container: source.container.clone(),
            key: source.key.clone(),
            detail: format!("preprocessing task panicked: {e}"),
        })?
        .map_err(|e| ObjectError::Preprocess {
            container: source.container.clone(),
            key: source.key.clone(),
            detail: e.to_string(),
        })?;

        // ── Step 3: Upload under the derived key ─────────────────────────
        let size = normalized.bytes.len();
        self.store
            .put(&output, normalized.bytes, OUTPUT_CONTENT_TYPE)
            .await
            .map_err(|e| ObjectError::Upload {
                container: source.container.clone(),
                key: source.key.clone(),
                output_key: output.key.clone(),
                detail: e.to_string(),
            })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Preprocessed {source} → {} (angle {:.1}°, {}x{}, {}ms)",
            output.key, normalized.angle, normalized.width, normalized.height, duration_ms
        );

        Ok(ProcessedObject {
            output,
            angle: normalized.angle,
            bytes: size,
            width: normalized.width,
            height: normalized.height,
            duration_ms,
        })
    }
}
