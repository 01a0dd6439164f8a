//! OCR extraction with a single fallback to the preprocessed variant.

pub mod provider;
pub mod service;
pub mod store;
pub mod wait;

pub use provider::{HttpOcrProvider, OcrProvider, VisionOcrProvider};
pub use service::{ExtractionService, ExtractionState, ExtractionSuccess};
pub use store::{JsonlOutcomeStore, MemoryOutcomeStore, OcrAttemptOutcome, OutcomeStore, UrlVariant};
pub use wait::{CancelHandle, FallbackWait, TokioWait, WaitInterrupted};
