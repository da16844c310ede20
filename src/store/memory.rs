use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

use super::{ObjectFetcher, ObjectPublisher};
use crate::error::StoreError;

/// In-memory object store.
///
/// Implements both collaborator traits, counts calls, and can be told to
/// reject uploads for specific keys. Used to run the pipeline without S3.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// (bucket, key) -> body
    objects: Mutex<BTreeMap<(String, String), Bytes>>,
    failing_keys: Mutex<HashSet<String>>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store an object directly
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.objects()
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every upload of `key` fail
    pub fn fail_uploads_for(&self, key: &str) {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    pub fn download_calls(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<(String, String), Bytes>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn should_fail(&self, key: &str) -> bool {
        self.failing_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

#[async_trait]
impl ObjectFetcher for MemoryStore {
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<PathBuf, StoreError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        let body = self.get(bucket, key).ok_or_else(|| StoreError::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: "no such key".into(),
        })?;

        tokio::fs::write(dest, &body)
            .await
            .map_err(|source| StoreError::Io {
                path: dest.to_path_buf(),
                source,
            })?;

        Ok(dest.to_path_buf())
    }
}

#[async_trait]
impl ObjectPublisher for MemoryStore {
    async fn upload(&self, bucket: &str, key: &str, body: ByteStream) -> Result<(), StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);

        if self.should_fail(key) {
            return Err(StoreError::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: "simulated upload failure".into(),
            });
        }

        let bytes = body
            .collect()
            .await
            .map_err(|e| StoreError::Body {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source: Box::new(e),
            })?
            .into_bytes();

        self.insert(bucket, key, bytes);
        Ok(())
    }
}
