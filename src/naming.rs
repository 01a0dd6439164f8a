//! Object references and the intake → preprocessed naming convention.
//!
//! The preprocessing job and the extraction service never share in-process
//! state. The only thing tying a raw upload to its normalized counterpart is
//! the key convention implemented here:
//!
//! ```text
//! public/ocr/<any/dirs/>name.ext  ──▶  public/ocr-preprocessed/name.jpg
//! ```
//!
//! Both functions are pure string transforms, so deriving the same input
//! twice always yields the same output, no matter which side computes it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key prefix of uploads that should be preprocessed.
pub const INTAKE_PREFIX: &str = "public/ocr/";

/// Key prefix the normalized variants are written under.
pub const PREPROCESSED_PREFIX: &str = "public/ocr-preprocessed/";

/// Extension of every normalized variant, regardless of the input format.
pub const OUTPUT_EXTENSION: &str = "jpg";

/// Content type matching [`OUTPUT_EXTENSION`].
pub const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

/// A blob in object storage: a container (bucket) plus a key inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageObjectRef {
    pub container: String,
    pub key: String,
}

impl StorageObjectRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Whether this object lies under the intake prefix.
    pub fn is_intake(&self) -> bool {
        is_intake_key(&self.key)
    }

    /// The reference of this object's normalized variant, in the same container.
    pub fn preprocessed(&self) -> Option<StorageObjectRef> {
        derive_output_key(&self.key).map(|key| StorageObjectRef {
            container: self.container.clone(),
            key,
        })
    }
}

impl fmt::Display for StorageObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Whether `key` should trigger preprocessing.
///
/// Output keys never qualify, so the job cannot re-trigger on its own writes.
pub fn is_intake_key(key: &str) -> bool {
    key.starts_with(INTAKE_PREFIX) && base_stem(key).is_some()
}

/// Derive the preprocessed key for an intake key.
///
/// Returns `None` for keys outside the intake prefix or without a filename.
///
/// ```rust
/// use ocrprep::naming::derive_output_key;
///
/// assert_eq!(
///     derive_output_key("public/ocr/abc/def.png").as_deref(),
///     Some("public/ocr-preprocessed/def.jpg"),
/// );
/// assert_eq!(derive_output_key("avatars/me.png"), None);
/// ```
pub fn derive_output_key(key: &str) -> Option<String> {
    if !key.starts_with(INTAKE_PREFIX) {
        return None;
    }
    let stem = base_stem(key)?;
    Some(format!("{PREPROCESSED_PREFIX}{stem}.{OUTPUT_EXTENSION}"))
}

/// Derive the public URL of the preprocessed variant from an original URL.
///
/// The intake prefix is located in the URL; everything before it (scheme,
/// host, storage path) is kept and the remainder is treated as the key.
/// Query string and fragment are dropped: a signed token for the original
/// object is not valid for its derived variant.
pub fn derive_preprocessed_url(original_url: &str) -> Option<String> {
    let end = original_url
        .find(['?', '#'])
        .unwrap_or(original_url.len());
    let without_query = &original_url[..end];

    let start = without_query.find(INTAKE_PREFIX)?;
    let (base, key) = without_query.split_at(start);
    derive_output_key(key).map(|derived| format!("{base}{derived}"))
}

/// Last path segment of `key` without its final extension.
///
/// A leading dot is part of the name, not an extension separator.
fn base_stem(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next().unwrap_or(key);
    let stem = match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    };
    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}
