//! # ocrprep
//!
//! Prepare scanned document images for OCR and extract their text with a
//! single fallback to the prepared variant.
//!
//! ## Why this crate?
//!
//! Phone photos and scans arrive tilted, oversized, in colour and with soft
//! edges. OCR providers do noticeably worse on such input. This crate
//! estimates the skew of every upload, straightens it and reduces it to a
//! sharp, binarized JPEG stored next to the original. When the provider fails
//! on the original image, extraction retries once on the prepared one.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload public/ocr/<path>/<name>.<ext>
//!  │
//!  ├─ 1. Notify     object-created event → PreprocessJob
//!  ├─ 2. Skew       row-projection search over [-5°, 5°] in 0.5° steps
//!  ├─ 3. Normalize  rotate → fit 2000px → gray → sharpen → threshold → JPEG
//!  └─ 4. Store      public/ocr-preprocessed/<name>.jpg
//!
//! extract(url)
//!  ├─ provider(original)      ok → persist outcome
//!  ├─ wait retry delay        interrupted → fail
//!  └─ provider(preprocessed)  ok → persist outcome, else fail
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocrprep::{PipelineConfig, PreprocessJob, StorageNotification, StorageObjectRef};
//! use ocrprep::storage::LocalObjectStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_env()?;
//!     let store = Arc::new(LocalObjectStore::new("./buckets"));
//!     let job = PreprocessJob::new(store, config);
//!
//!     let event = StorageNotification::new(vec![
//!         StorageObjectRef::new("uploads", "public/ocr/2024/receipt.png"),
//!     ]);
//!     let report = job.handle_notification(&event).await;
//!     eprintln!("{} written, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocrprep` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocrprep = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod naming;
pub mod notification;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{
    ExtractionError, FailureCause, ObjectError, OcrPrepError, ProviderError, StorageError,
};
pub use job::{BatchReport, ObjectOutcome, PreprocessJob, ProcessedObject};
pub use naming::{derive_output_key, derive_preprocessed_url, StorageObjectRef};
pub use notification::StorageNotification;
pub use ocr::{
    ExtractionService, ExtractionSuccess, OcrAttemptOutcome, OcrProvider, OutcomeStore,
    UrlVariant,
};
pub use pipeline::{normalize, row_projection_score, PreprocessingResult, SkewEstimate, SkewSearch};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use storage::ObjectStore;
