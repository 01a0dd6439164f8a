//! OCR provider collaborator.
//!
//! A provider turns an image URL into text and fails with a
//! [`ProviderError`] on any non-success condition. The extraction service
//! does not look at the error kind; network errors, auth failures, rate limits
//! and malformed bodies all count as one failed attempt.
//!
//! Implementations:
//! - [`HttpOcrProvider`]   — a JSON-over-HTTP OCR endpoint
//! - [`VisionOcrProvider`] — any `edgequake_llm` vision model

use crate::error::ProviderError;
use crate::prompts::OCR_SYSTEM_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An external OCR service reachable by image URL.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Identifier recorded in each [`crate::ocr::OcrAttemptOutcome`].
    fn name(&self) -> &str;

    /// Recognise the text of the image at `image_url`.
    async fn extract(&self, image_url: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct HttpOcrRequest<'a> {
    image_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct HttpOcrResponse {
    text: Option<String>,
}

/// OCR endpoint that accepts `POST {"image_url": "…"}` and answers
/// `{"text": "…"}`.
pub struct HttpOcrProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    name: String,
}

impl HttpOcrProvider {
    /// Create a provider with a per-request timeout.
    ///
    /// Timeouts surface as [`ProviderError::Transport`] like any other
    /// connection failure.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("client setup: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: None,
            name: "http-ocr".to_string(),
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the name recorded in outcomes.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl OcrProvider for HttpOcrProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, image_url: &str) -> Result<String, ProviderError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&HttpOcrRequest { image_url });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let parsed: HttpOcrResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let text = parsed.text.unwrap_or_default();
        debug!("{}: {} chars from {}", self.name, text.len(), image_url);
        non_empty(text)
    }
}

/// OCR through a vision-capable LLM.
///
/// The image is downloaded first and sent inline as base64, so the model
/// provider never needs access to the storage URL.
pub struct VisionOcrProvider {
    llm: Arc<dyn LLMProvider>,
    http: reqwest::Client,
    name: String,
    system_prompt: String,
    max_tokens: usize,
}

impl VisionOcrProvider {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("client setup: {e}")))?;
        Ok(Self {
            llm,
            http,
            name: name.into(),
            system_prompt: OCR_SYSTEM_PROMPT.to_string(),
            max_tokens: 4096,
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }

    async fn fetch_image(&self, image_url: &str) -> Result<ImageData, ProviderError> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: format!("fetching {image_url}"),
            });
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| mime_from_url(image_url).to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(ImageData::new(STANDARD.encode(&bytes), mime).with_detail("high"))
    }
}

#[async_trait]
impl OcrProvider for VisionOcrProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, image_url: &str) -> Result<String, ProviderError> {
        let image = self.fetch_image(image_url).await?;
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user_with_images("", vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .llm
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ProviderError::Llm(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );
        non_empty(response.content)
    }
}

fn non_empty(text: String) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::EmptyText)
    } else {
        Ok(text)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

/// Best-effort MIME type from the URL's extension.
fn mime_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}
