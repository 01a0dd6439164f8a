//! Object-created notifications.
//!
//! A notification carries zero or more `(container, key)` pairs for objects
//! that were just written. Storage services deliver them in the S3 event
//! shape:
//!
//! ```json
//! { "Records": [ { "s3": { "bucket": { "name": "uploads" },
//!                          "object": { "key": "public/ocr/u1/page+1.png" } } } ] }
//! ```
//!
//! Keys in that shape are URL-encoded with `+` for spaces; they are decoded
//! here so the rest of the pipeline only deals with real keys.

use crate::error::OcrPrepError;
use crate::naming::StorageObjectRef;
use serde::{Deserialize, Serialize};

/// The objects announced by one notification, in delivery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNotification {
    pub objects: Vec<StorageObjectRef>,
}

impl StorageNotification {
    pub fn new(objects: Vec<StorageObjectRef>) -> Self {
        Self { objects }
    }

    /// Parse an S3-style event document.
    pub fn from_s3_event_json(json: &str) -> Result<Self, OcrPrepError> {
        let event: S3Event = serde_json::from_str(json)
            .map_err(|e| OcrPrepError::InvalidNotification(e.to_string()))?;

        let objects = event
            .records
            .into_iter()
            .map(|record| {
                let key = decode_event_key(&record.s3.object.key)?;
                Ok(StorageObjectRef::new(record.s3.bucket.name, key))
            })
            .collect::<Result<Vec<_>, OcrPrepError>>()?;

        Ok(Self { objects })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

fn decode_event_key(raw: &str) -> Result<String, OcrPrepError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .map_err(|e| OcrPrepError::InvalidNotification(format!("key {raw:?}: {e}")))
}

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records", default)]
    records: Vec<S3Record>,
}

#[derive(Debug, Deserialize)]
struct S3Record {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}
