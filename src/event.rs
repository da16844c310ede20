//! S3 event notifications.
//!
//! Only the fields needed to locate the new object are modelled. Object keys
//! arrive form-encoded (`+` for space, `%XX` escapes) and are decoded here.

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::EventError;
use crate::pipeline::SourceObject;

/// Prefix shared by every object-created event name
const OBJECT_CREATED_PREFIX: &str = "ObjectCreated:";

#[derive(Debug, Clone, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3EventRecord {
    #[serde(default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl S3Event {
    pub fn from_json(input: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Objects to process, in record order.
    ///
    /// Records for anything other than object creation are skipped. A record
    /// without an event name is treated as a creation.
    pub fn sources(&self) -> Result<Vec<SourceObject>, EventError> {
        if self.records.is_empty() {
            return Err(EventError::NoRecords);
        }

        let mut sources = Vec::with_capacity(self.records.len());
        for record in &self.records {
            if let Some(name) = &record.event_name {
                if !name.starts_with(OBJECT_CREATED_PREFIX) {
                    info!(event = %name, key = %record.s3.object.key, "skipping non-create event");
                    continue;
                }
            }

            let key = decode_key(&record.s3.object.key)?;
            debug!(bucket = %record.s3.bucket.name, key = %key, size = ?record.s3.object.size, "event record");
            sources.push(SourceObject::new(record.s3.bucket.name.clone(), key));
        }
        Ok(sources)
    }
}

/// Decode a form-encoded object key
pub fn decode_key(raw: &str) -> Result<String, EventError> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|_| EventError::InvalidKey {
            key: raw.to_string(),
        })
}
