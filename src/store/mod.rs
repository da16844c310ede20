//! Seams to the remote object store.
//!
//! The pipeline only ever talks to storage through these two traits, so the
//! AWS client and the in-memory store are interchangeable.

mod memory;

pub use memory::MemoryStore;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::StoreError;

/// Retrieves a remote object into local storage
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    /// Download `bucket/key` to `dest`, returning the path written
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<PathBuf, StoreError>;
}

/// Publishes a byte stream as a remote object
#[async_trait]
pub trait ObjectPublisher: Send + Sync {
    /// Create or overwrite `bucket/key` with the contents of `body`
    async fn upload(&self, bucket: &str, key: &str, body: ByteStream) -> Result<(), StoreError>;
}
