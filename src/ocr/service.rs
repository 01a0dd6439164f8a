//! Resilient OCR extraction.
//!
//! One request tries the original image URL first. On any provider failure it
//! waits for the configured delay, derives the preprocessed URL and tries that
//! once. Exactly two attempts, never more.
//!
//! ```text
//! TryOriginal ──ok──▶ Done
//!      │ fail
//!      ▼
//! WaitBeforeFallback ──interrupted──▶ Failed(WaitInterrupted)
//!      │ elapsed      ──no variant──▶ Failed(NoPreprocessedVariant)
//!      ▼
//! TryPreprocessed ──ok──▶ Done
//!      │ fail
//!      ▼
//! Failed(AttemptsExhausted)
//! ```
//!
//! `Done` persists one [`OcrAttemptOutcome`]; `Failed` persists nothing.
//! Callers only ever see [`ExtractionError::OcrProcessingFailed`].

use crate::config::PipelineConfig;
use crate::error::{ExtractionError, FailureCause};
use crate::naming::derive_preprocessed_url;
use crate::ocr::provider::OcrProvider;
use crate::ocr::store::{OcrAttemptOutcome, OutcomeStore, UrlVariant};
use crate::ocr::wait::FallbackWait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A step of one extraction request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionState {
    TryOriginal,
    WaitBeforeFallback,
    TryPreprocessed { url: String },
    Done { outcome: OcrAttemptOutcome },
    Failed { cause: FailureCause },
}

impl ExtractionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

/// Text recognised for a request, plus the record that was persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSuccess {
    pub text: String,
    pub used_url: String,
    pub variant: UrlVariant,
    pub outcome: OcrAttemptOutcome,
}

/// Runs extraction requests against one provider.
pub struct ExtractionService {
    provider: Arc<dyn OcrProvider>,
    store: Arc<dyn OutcomeStore>,
    waiter: Arc<dyn FallbackWait>,
    retry_delay: Duration,
}

impl ExtractionService {
    pub fn new(
        provider: Arc<dyn OcrProvider>,
        store: Arc<dyn OutcomeStore>,
        waiter: Arc<dyn FallbackWait>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            provider,
            store,
            waiter,
            retry_delay: config.retry_delay(),
        }
    }

    /// Extract the text of the image at `original_url`.
    ///
    /// Provider errors are logged and never returned; the only failure a
    /// caller sees is the opaque [`ExtractionError::OcrProcessingFailed`].
    pub async fn extract(&self, original_url: &str) -> Result<ExtractionSuccess, ExtractionError> {
        let mut state = ExtractionState::TryOriginal;
        while !state.is_terminal() {
            state = self.advance(original_url, state).await;
        }

        match state {
            ExtractionState::Done { outcome } => {
                if let Err(e) = self.store.save(&outcome).await {
                    warn!("Could not persist OCR outcome for {original_url}: {e}");
                    return Err(ExtractionError::OcrProcessingFailed {
                        cause: FailureCause::PersistenceFailed,
                    });
                }
                info!(
                    "OCR succeeded for {original_url} via {:?} URL ({} chars)",
                    outcome.variant,
                    outcome.text.len()
                );
                Ok(ExtractionSuccess {
                    text: outcome.text.clone(),
                    used_url: outcome.used_url.clone(),
                    variant: outcome.variant,
                    outcome,
                })
            }
            ExtractionState::Failed { cause } => {
                warn!("OCR failed for {original_url}: {cause:?}");
                Err(ExtractionError::OcrProcessingFailed { cause })
            }
            // The loop only exits on a terminal state.
            other => {
                warn!("Extraction stopped in non-terminal state {other:?}");
                Err(ExtractionError::OcrProcessingFailed {
                    cause: FailureCause::AttemptsExhausted,
                })
            }
        }
    }

    /// One transition of the request state machine.
    async fn advance(&self, original_url: &str, state: ExtractionState) -> ExtractionState {
        match state {
            ExtractionState::TryOriginal => match self.attempt(original_url).await {
                Some(text) => ExtractionState::Done {
                    outcome: self.outcome(original_url, original_url, UrlVariant::Original, text),
                },
                None => ExtractionState::WaitBeforeFallback,
            },
            ExtractionState::WaitBeforeFallback => {
                debug!("Waiting {:?} before fallback", self.retry_delay);
                if self.waiter.wait(self.retry_delay).await.is_err() {
                    return ExtractionState::Failed {
                        cause: FailureCause::WaitInterrupted,
                    };
                }
                match derive_preprocessed_url(original_url) {
                    Some(url) => ExtractionState::TryPreprocessed { url },
                    None => {
                        debug!("{original_url} has no preprocessed variant");
                        ExtractionState::Failed {
                            cause: FailureCause::NoPreprocessedVariant,
                        }
                    }
                }
            }
            ExtractionState::TryPreprocessed { url } => match self.attempt(&url).await {
                Some(text) => ExtractionState::Done {
                    outcome: self.outcome(original_url, &url, UrlVariant::Preprocessed, text),
                },
                None => ExtractionState::Failed {
                    cause: FailureCause::AttemptsExhausted,
                },
            },
            terminal @ (ExtractionState::Done { .. } | ExtractionState::Failed { .. }) => terminal,
        }
    }

    /// Call the provider once; every failure kind collapses to `None`.
    async fn attempt(&self, url: &str) -> Option<String> {
        match self.provider.extract(url).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                warn!("{} returned no text for {url}", self.provider.name());
                None
            }
            Err(e) => {
                warn!("{} failed on {url}: {e}", self.provider.name());
                None
            }
        }
    }

    fn outcome(
        &self,
        original_url: &str,
        used_url: &str,
        variant: UrlVariant,
        text: String,
    ) -> OcrAttemptOutcome {
        OcrAttemptOutcome::new(original_url, used_url, variant, text, self.provider.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, StorageError};
    use crate::ocr::store::MemoryOutcomeStore;
    use crate::ocr::wait::TokioWait;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const ORIGINAL: &str = "https://cdn.example/public/ocr/scan.png";
    const PREPROCESSED: &str = "https://cdn.example/public/ocr-preprocessed/scan.jpg";

    /// Answers from a script, one entry per call.
    struct ScriptedProvider {
        script: Mutex<Vec<Result<String, ProviderError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(mut script: Vec<Result<String, ProviderError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OcrProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn extract(&self, image_url: &str) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push(image_url.to_string());
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ProviderError::Transport("script exhausted".into())))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl OutcomeStore for FailingStore {
        async fn save(&self, _outcome: &OcrAttemptOutcome) -> Result<(), StorageError> {
            Err(StorageError::Backend("read-only".into()))
        }
    }

    fn service(
        provider: Arc<ScriptedProvider>,
        store: Arc<dyn OutcomeStore>,
    ) -> ExtractionService {
        let config = PipelineConfig::builder().retry_delay_ms(1).build().unwrap();
        ExtractionService::new(provider, store, Arc::new(TokioWait::new()), &config)
    }

    #[tokio::test]
    async fn empty_text_triggers_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("   ".into()),
            Ok("hello".into()),
        ]));
        let store = Arc::new(MemoryOutcomeStore::new());
        let ok = service(provider.clone(), store.clone())
            .extract(ORIGINAL)
            .await
            .unwrap();
        assert_eq!(ok.variant, UrlVariant::Preprocessed);
        assert_eq!(ok.used_url, PREPROCESSED);
        assert_eq!(provider.calls(), vec![ORIGINAL, PREPROCESSED]);
        assert_eq!(store.outcomes().len(), 1);
    }

    #[tokio::test]
    async fn non_intake_url_has_no_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::EmptyText)]));
        let store = Arc::new(MemoryOutcomeStore::new());
        let err = service(provider.clone(), store.clone())
            .extract("https://cdn.example/avatars/me.png")
            .await
            .unwrap_err();
        assert_eq!(err.cause(), FailureCause::NoPreprocessedVariant);
        assert_eq!(provider.calls().len(), 1);
        assert!(store.outcomes().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_is_a_domain_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("text".into())]));
        let err = service(provider, Arc::new(FailingStore))
            .extract(ORIGINAL)
            .await
            .unwrap_err();
        assert_eq!(err.cause(), FailureCause::PersistenceFailed);
        assert_eq!(err.to_string(), "OCR processing failed");
    }

    #[tokio::test]
    async fn provider_error_text_is_not_leaked() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Http {
                status: 401,
                body: "bad api key sk-123".into(),
            }),
            Err(ProviderError::Malformed("oops".into())),
        ]));
        let err = service(provider, Arc::new(MemoryOutcomeStore::new()))
            .extract(ORIGINAL)
            .await
            .unwrap_err();
        assert_eq!(err.cause(), FailureCause::AttemptsExhausted);
        assert!(!err.to_string().contains("sk-123"));
    }

    #[test]
    fn terminal_states() {
        assert!(!ExtractionState::TryOriginal.is_terminal());
        assert!(!ExtractionState::WaitBeforeFallback.is_terminal());
        assert!(ExtractionState::Failed {
            cause: FailureCause::WaitInterrupted
        }
        .is_terminal());
    }
}
