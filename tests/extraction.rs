//! Integration tests for the resilient extraction service.
//!
//! The stub provider and the recording waiter append to one shared event log,
//! so the tests can assert on the order of calls and waits.

use async_trait::async_trait;
use ocrprep::ocr::{
    FallbackWait, MemoryOutcomeStore, OcrProvider, TokioWait, WaitInterrupted,
};
use ocrprep::{
    ExtractionService, FailureCause, PipelineConfig, ProviderError, UrlVariant,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ORIGINAL: &str = "https://storage.example/v1/object/public/ocr/batch-7/receipt.png";
const PREPROCESSED: &str = "https://storage.example/v1/object/public/ocr-preprocessed/receipt.jpg";

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Call(String),
    Wait(Duration),
}

type EventLog = Arc<Mutex<Vec<Event>>>;

/// Succeeds only for the URLs it was told to accept.
struct StubProvider {
    accept: Vec<&'static str>,
    log: EventLog,
}

#[async_trait]
impl OcrProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn extract(&self, image_url: &str) -> Result<String, ProviderError> {
        self.log.lock().unwrap().push(Event::Call(image_url.to_string()));
        if self.accept.contains(&image_url) {
            Ok(format!("text of {image_url}"))
        } else {
            Err(ProviderError::Http {
                status: 500,
                body: "internal error".into(),
            })
        }
    }
}

/// Records the requested delay and returns immediately.
struct RecordingWait {
    log: EventLog,
    interrupt: bool,
}

#[async_trait]
impl FallbackWait for RecordingWait {
    async fn wait(&self, delay: Duration) -> Result<(), WaitInterrupted> {
        self.log.lock().unwrap().push(Event::Wait(delay));
        if self.interrupt {
            Err(WaitInterrupted)
        } else {
            Ok(())
        }
    }
}

struct Harness {
    service: ExtractionService,
    store: Arc<MemoryOutcomeStore>,
    log: EventLog,
}

fn harness(accept: Vec<&'static str>, interrupt: bool) -> Harness {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(MemoryOutcomeStore::new());
    let service = ExtractionService::new(
        Arc::new(StubProvider {
            accept,
            log: log.clone(),
        }),
        store.clone(),
        Arc::new(RecordingWait {
            log: log.clone(),
            interrupt,
        }),
        &PipelineConfig::default(),
    );
    Harness { service, store, log }
}

fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn original_success_needs_no_fallback() {
    let h = harness(vec![ORIGINAL], false);
    let ok = h.service.extract(ORIGINAL).await.unwrap();

    assert_eq!(ok.used_url, ORIGINAL);
    assert_eq!(ok.variant, UrlVariant::Original);
    assert_eq!(events(&h.log), vec![Event::Call(ORIGINAL.into())]);

    let saved = h.store.outcomes();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].used_url, ORIGINAL);
    assert_eq!(saved[0].original_url, ORIGINAL);
    assert_eq!(saved[0].provider, "stub");
}

#[tokio::test]
async fn failure_waits_then_uses_preprocessed_url() {
    let h = harness(vec![PREPROCESSED], false);
    let ok = h.service.extract(ORIGINAL).await.unwrap();

    assert_eq!(ok.used_url, PREPROCESSED);
    assert_eq!(ok.variant, UrlVariant::Preprocessed);
    assert_eq!(ok.text, format!("text of {PREPROCESSED}"));
    assert_eq!(
        events(&h.log),
        vec![
            Event::Call(ORIGINAL.into()),
            Event::Wait(Duration::from_millis(3000)),
            Event::Call(PREPROCESSED.into()),
        ]
    );

    let saved = h.store.outcomes();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].original_url, ORIGINAL);
    assert_eq!(saved[0].used_url, PREPROCESSED);
}

#[tokio::test]
async fn both_attempts_failing_is_one_domain_error() {
    let h = harness(vec![], false);
    let err = h.service.extract(ORIGINAL).await.unwrap_err();

    assert_eq!(err.to_string(), "OCR processing failed");
    assert_eq!(err.cause(), FailureCause::AttemptsExhausted);
    assert_eq!(events(&h.log).len(), 3);
    assert!(h.store.outcomes().is_empty());
}

#[tokio::test]
async fn interrupted_wait_skips_second_attempt() {
    let h = harness(vec![PREPROCESSED], true);
    let err = h.service.extract(ORIGINAL).await.unwrap_err();

    assert_eq!(err.cause(), FailureCause::WaitInterrupted);
    assert_eq!(
        events(&h.log),
        vec![
            Event::Call(ORIGINAL.into()),
            Event::Wait(Duration::from_millis(3000)),
        ]
    );
    assert!(h.store.outcomes().is_empty());
}

#[tokio::test]
async fn cancelled_timer_fails_the_request_promptly() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(MemoryOutcomeStore::new());
    let (cancel, waiter) = TokioWait::cancellable();
    let config = PipelineConfig::builder()
        .retry_delay_ms(60_000)
        .build()
        .unwrap();
    let service = ExtractionService::new(
        Arc::new(StubProvider {
            accept: vec![PREPROCESSED],
            log: log.clone(),
        }),
        store.clone(),
        Arc::new(waiter),
        &config,
    );

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });
    let err = tokio::time::timeout(Duration::from_secs(10), service.extract(ORIGINAL))
        .await
        .expect("cancelled wait must not run the full delay")
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.cause(), FailureCause::WaitInterrupted);
    assert_eq!(events(&log), vec![Event::Call(ORIGINAL.into())]);
    assert!(store.outcomes().is_empty());
}
