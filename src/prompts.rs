//! Prompts for the vision-LLM OCR provider.
//!
//! Kept in one place so they can be inspected by unit tests and changed
//! without touching request or retry code. Callers can override the default
//! via [`crate::ocr::VisionOcrProvider::with_system_prompt`].

/// Default system prompt for transcribing a preprocessed document image.
///
/// The input has already been deskewed and binarized, so the prompt only asks
/// for a faithful transcription; interpreting the text is not this crate's job.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR engine. Transcribe the text in the image exactly as written.

Rules:
1. Preserve the original wording, spelling, punctuation and line breaks.
2. Keep the reading order a human would use (top to bottom, left to right for each column).
3. Do not translate, summarise, correct or explain anything.
4. Do not describe images, decorations or layout.
5. If the image contains no legible text, answer with an empty response.
6. Output ONLY the transcribed text, without quotes or code fences."#;
