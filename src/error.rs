//! Error types for the ocrprep library.
//!
//! The pipeline fails in four different ways, and each gets its own type so
//! callers can react at the right level:
//!
//! * [`OcrPrepError`] — **Fatal for one operation**: an image could not be
//!   decoded or encoded, a storage call failed, or the configuration is
//!   invalid. Returned from the normalization chain and other single-shot
//!   entry points.
//!
//! * [`ObjectError`] — **Non-fatal for a batch**: one object in a storage
//!   notification failed. Stored inside [`crate::job::BatchReport`] next to
//!   its siblings' successes instead of aborting the batch.
//!
//! * [`ProviderError`] — a single OCR provider attempt failed. Consumed by
//!   the extraction service; never returned to its callers.
//!
//! * [`ExtractionError`] — the whole extraction request failed. Deliberately
//!   opaque so the failure contract stays stable when the provider changes.
//!
//! Metadata absence (e.g. unreadable image dimensions) is not an error at all:
//! the skew search degrades to "no rotation".

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by single-shot pipeline operations.
#[derive(Debug, Error)]
pub enum OcrPrepError {
    // ── Image errors ──────────────────────────────────────────────────────
    /// Input bytes are not a decodable image.
    #[error("Failed to decode image: {detail}")]
    Decode { detail: String },

    /// The normalized image could not be re-encoded.
    #[error("Failed to encode image as {format}: {detail}")]
    Encode { format: String, detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Object storage read or write failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    // ── Input errors ──────────────────────────────────────────────────────
    /// A storage notification payload could not be parsed.
    #[error("Invalid storage notification: {0}")]
    InvalidNotification(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by an object-storage or outcome-store backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object exists under the given container and key.
    #[error("Object not found: {container}/{key}")]
    NotFound { container: String, key: String },

    /// The key would escape the container (e.g. contains `..`) or is empty.
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Local file-system I/O failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other backend failure (serialisation, remote service).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A non-fatal error for a single notified object.
///
/// Stored alongside [`crate::job::ObjectOutcome`] when an object fails. The
/// rest of the batch continues.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ObjectError {
    /// The source object could not be downloaded.
    #[error("{container}/{key}: download failed: {detail}")]
    Download {
        container: String,
        key: String,
        detail: String,
    },

    /// Decoding, rotating or re-encoding failed.
    #[error("{container}/{key}: preprocessing failed: {detail}")]
    Preprocess {
        container: String,
        key: String,
        detail: String,
    },

    /// The normalized object could not be written.
    #[error("{container}/{key}: upload of '{output_key}' failed: {detail}")]
    Upload {
        container: String,
        key: String,
        output_key: String,
        detail: String,
    },

    /// The worker task for this object died.
    #[error("{container}/{key}: internal error: {detail}")]
    Internal {
        container: String,
        key: String,
        detail: String,
    },
}

/// A failed call to the external OCR provider.
///
/// The extraction service treats every variant identically ("attempt
/// failed"); the distinction exists only for logs.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider answered with a non-success HTTP status.
    #[error("OCR provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection, TLS or timeout failure.
    #[error("OCR provider request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("OCR provider returned a malformed response: {0}")]
    Malformed(String),

    /// The provider answered but recognised no text.
    #[error("OCR provider returned no text")]
    EmptyText,

    /// The vision-LLM backend failed.
    #[error("Vision model call failed: {0}")]
    Llm(String),
}

/// Why an extraction request ended in failure.
///
/// Provider-agnostic on purpose: no provider message or status code is
/// carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// Both the original and the preprocessed attempt failed.
    AttemptsExhausted,
    /// The wait before the fallback attempt was interrupted.
    WaitInterrupted,
    /// The original URL does not follow the intake naming convention, so no
    /// preprocessed variant exists to fall back to.
    NoPreprocessedVariant,
    /// Text was recognised but the outcome record could not be persisted.
    PersistenceFailed,
}

/// The single domain-level failure returned by
/// [`crate::ocr::ExtractionService::extract`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("OCR processing failed")]
    OcrProcessingFailed { cause: FailureCause },
}

impl ExtractionError {
    /// The provider-agnostic reason behind the failure.
    pub fn cause(&self) -> FailureCause {
        match self {
            ExtractionError::OcrProcessingFailed { cause } => *cause,
        }
    }
}
