//! Fan-out upload of an extracted directory tree.
//!
//! Every regular file under the root becomes one [`PublishTask`] running on
//! its own tokio task. A semaphore bounds how many run at once. Each task
//! hands its report back through a `JoinSet`, which only the coordinator
//! drains; tasks that never report (panics) are found through the map of
//! outstanding keys. The coordinator waits for all of them before deciding
//! the outcome. One failed file never stops its siblings.

mod key;

pub use key::derive_key;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::DEFAULT_UPLOAD_CONCURRENCY;
use crate::error::{AggregateUploadError, PublishError, UploadFailure};
use crate::s3::TransferMetrics;
use crate::store::ObjectPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Maximum number of uploads in flight
    pub concurrency: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

/// One file to publish
#[derive(Debug, Clone)]
pub struct PublishTask {
    pub path: PathBuf,
    pub key: String,
    pub bucket: String,
    /// Size seen during the walk
    pub size: u64,
}

/// Result of a fan-out in which every file was published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub uploaded: usize,
    pub bytes: u64,
}

/// What a finished upload task hands back to the coordinator
struct TaskReport {
    key: String,
    path: PathBuf,
    bytes: u64,
    result: Result<(), PublishError>,
}

/// Publishes every file of a local tree to a bucket
pub struct TreeUploader {
    publisher: Arc<dyn ObjectPublisher>,
    options: UploadOptions,
    metrics: Arc<TransferMetrics>,
}

impl TreeUploader {
    pub fn new(publisher: Arc<dyn ObjectPublisher>, options: UploadOptions) -> Self {
        TreeUploader {
            publisher,
            options,
            metrics: TransferMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &Arc<TransferMetrics> {
        &self.metrics
    }

    /// Upload every regular file under `root` to `bucket`, keyed by its path
    /// relative to `root`.
    ///
    /// Returns only after every dispatched upload has finished. If any file
    /// failed, the error carries all failures (sorted by path) along with the
    /// number of files that did upload.
    pub async fn publish_tree(
        &self,
        root: &Path,
        bucket: &str,
    ) -> Result<UploadOutcome, AggregateUploadError> {
        info!(root = %root.display(), bucket, "upload start");
        self.metrics.start_operation();

        let (tasks, mut failures) = discover_in_background(root, bucket).await;

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut running = JoinSet::new();
        // key -> path for tasks that have not reported back yet
        let mut outstanding: HashMap<String, PathBuf> = HashMap::new();

        for task in tasks {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    failures.push(UploadFailure {
                        path: task.path,
                        key: Some(task.key),
                        cause: PublishError::Aborted,
                    });
                    continue;
                }
            };

            outstanding.insert(task.key.clone(), task.path.clone());
            let publisher = Arc::clone(&self.publisher);
            let metrics = Arc::clone(&self.metrics);

            running.spawn(async move {
                let _permit = permit;
                publish_one(publisher.as_ref(), &metrics, task).await
            });
        }

        let mut uploaded = 0usize;
        let mut bytes = 0u64;

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(report) => {
                    outstanding.remove(&report.key);
                    match report.result {
                        Ok(()) => {
                            uploaded += 1;
                            bytes += report.bytes;
                        }
                        Err(cause) => failures.push(UploadFailure {
                            path: report.path,
                            key: Some(report.key),
                            cause,
                        }),
                    }
                }
                Err(err) => warn!(error = %err, "upload task did not finish"),
            }
        }

        // Tasks that panicked never reported; they are still failures
        for (key, path) in outstanding {
            self.metrics.record_failure();
            failures.push(UploadFailure {
                path,
                key: Some(key),
                cause: PublishError::Aborted,
            });
        }

        let elapsed_ms = self
            .metrics
            .operation_elapsed()
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let transfer_ms = self.metrics.total_transfer_time().as_millis() as u64;

        if failures.is_empty() {
            info!(
                uploaded,
                size = %humansize::format_size(bytes, humansize::DECIMAL),
                elapsed_ms,
                transfer_ms,
                "upload finish"
            );
            return Ok(UploadOutcome { uploaded, bytes });
        }

        failures.sort_by(|a, b| a.path.cmp(&b.path));
        error!(
            failed = failures.len(),
            uploaded, elapsed_ms, "upload finished with failures"
        );
        Err(AggregateUploadError { failures, uploaded })
    }
}

async fn publish_one(
    publisher: &dyn ObjectPublisher,
    metrics: &TransferMetrics,
    task: PublishTask,
) -> TaskReport {
    let started = Instant::now();

    // The opened body knows the file's length at upload time
    let (result, bytes) = match ByteStream::from_path(&task.path).await {
        Ok(body) => {
            let bytes = body.size_hint().1.unwrap_or(task.size);
            let result = publisher
                .upload(&task.bucket, &task.key, body)
                .await
                .map_err(PublishError::from);
            (result, bytes)
        }
        Err(source) => (Err(PublishError::Open { source }), task.size),
    };

    match &result {
        Ok(()) => {
            metrics.record_transfer(bytes, started.elapsed());
            debug!(key = %task.key, bytes, "uploaded");
        }
        Err(err) => {
            metrics.record_failure();
            error!(
                path = %task.path.display(),
                key = %task.key,
                error = %err,
                "failed to upload file"
            );
        }
    }

    TaskReport {
        key: task.key,
        path: task.path,
        bytes,
        result,
    }
}

/// Run [`discover`] on the blocking pool
async fn discover_in_background(
    root: &Path,
    bucket: &str,
) -> (Vec<PublishTask>, Vec<UploadFailure>) {
    let walk_root = root.to_path_buf();
    let walk_bucket = bucket.to_string();

    match tokio::task::spawn_blocking(move || discover(&walk_root, &walk_bucket)).await {
        Ok(found) => found,
        Err(err) => {
            warn!(root = %root.display(), error = %err, "directory walk did not finish");
            let failure = UploadFailure {
                path: root.to_path_buf(),
                key: None,
                cause: PublishError::Aborted,
            };
            (Vec::new(), vec![failure])
        }
    }
}

/// Walk `root` and build one task per regular file. Entries that cannot be
/// walked or keyed are returned as failures; the walk carries on past them.
pub fn discover(root: &Path, bucket: &str) -> (Vec<PublishTask>, Vec<UploadFailure>) {
    let mut tasks = Vec::new();
    let mut failures = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                warn!(path = %path.display(), error = %err, "failed to walk entry");
                failures.push(UploadFailure {
                    path,
                    key: None,
                    cause: PublishError::from(err),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path().to_path_buf();
        let key = match derive_key(root, &path) {
            Ok(key) => key,
            Err(err) => {
                failures.push(UploadFailure {
                    path,
                    key: None,
                    cause: err.into(),
                });
                continue;
            }
        };
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read file size");
                0
            }
        };

        debug!(path = %path.display(), key = %key, "handling file");
        tasks.push(PublishTask {
            path,
            key,
            bucket: bucket.to_string(),
            size,
        });
    }

    (tasks, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn write_file(root: &Path, rel: &str, body: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn uploader(store: &Arc<MemoryStore>, concurrency: usize) -> TreeUploader {
        TreeUploader::new(store.clone(), UploadOptions { concurrency })
    }

    #[tokio::test]
    async fn test_publishes_every_file_under_its_relative_key() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "dir/x.txt", b"hi");
        write_file(dir.path(), "y.txt", b"bye");
        write_file(dir.path(), "a/b/c.bin", &[0, 159, 146, 150]);
        let store = MemoryStore::new();

        let outcome = uploader(&store, 4)
            .publish_tree(dir.path(), "dest-bucket")
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome { uploaded: 3, bytes: 9 });
        assert_eq!(store.keys("dest-bucket"), vec!["a/b/c.bin", "dir/x.txt", "y.txt"]);
        assert_eq!(store.get("dest-bucket", "dir/x.txt").unwrap(), &b"hi"[..]);
        assert_eq!(store.get("dest-bucket", "a/b/c.bin").unwrap(), &[0u8, 159, 146, 150][..]);
    }

    #[tokio::test]
    async fn test_directories_are_not_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("empty/nested")).unwrap();
        write_file(dir.path(), "full/f.txt", b"f");
        let store = MemoryStore::new();

        let outcome = uploader(&store, 2)
            .publish_tree(dir.path(), "dest")
            .await
            .unwrap();

        assert_eq!(outcome.uploaded, 1);
        assert_eq!(store.keys("dest"), vec!["full/f.txt"]);
    }

    #[tokio::test]
    async fn test_empty_tree_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let outcome = uploader(&store, 2)
            .publish_tree(dir.path(), "dest")
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::default());
        assert_eq!(store.upload_calls(), 0);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"];
        for name in names {
            write_file(dir.path(), name, name.as_bytes());
        }
        let store = MemoryStore::new();
        store.fail_uploads_for("c.txt");
        let uploader = uploader(&store, 2);

        let err = uploader
            .publish_tree(dir.path(), "dest")
            .await
            .unwrap_err();

        assert_eq!(err.uploaded, 4);
        assert_eq!(err.failures.len(), 1);
        let failure = &err.failures[0];
        assert_eq!(failure.path, dir.path().join("c.txt"));
        assert_eq!(failure.key.as_deref(), Some("c.txt"));
        assert!(matches!(
            failure.cause,
            PublishError::Transport(StoreError::Put { .. })
        ));

        assert_eq!(store.upload_calls(), 5);
        assert_eq!(store.keys("dest"), vec!["a.txt", "b.txt", "d.txt", "e.txt"]);
        assert_eq!(uploader.metrics().object_count(), 4);
        assert_eq!(uploader.metrics().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "z.txt", b"z");
        write_file(dir.path(), "m.txt", b"m");
        write_file(dir.path(), "ok.txt", b"ok");
        let store = MemoryStore::new();
        store.fail_uploads_for("z.txt");
        store.fail_uploads_for("m.txt");

        let err = uploader(&store, 8)
            .publish_tree(dir.path(), "dest")
            .await
            .unwrap_err();

        let keys: Vec<_> = err.failures.iter().map(|f| f.key.clone().unwrap()).collect();
        assert_eq!(keys, vec!["m.txt", "z.txt"]);
        assert_eq!(err.uploaded, 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let err = uploader(&store, 2)
            .publish_tree(&dir.path().join("missing"), "dest")
            .await
            .unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert!(matches!(err.failures[0].cause, PublishError::Walk { .. }));
        assert_eq!(err.uploaded, 0);
    }

    /// Publisher that tracks how many uploads overlap
    #[derive(Default)]
    struct SlowPublisher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    #[async_trait]
    impl ObjectPublisher for SlowPublisher {
        async fn upload(&self, _bucket: &str, _key: &str, _body: ByteStream) -> Result<(), StoreError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..12 {
            write_file(dir.path(), &format!("f{i}.txt"), b"x");
        }
        let publisher = Arc::new(SlowPublisher::default());
        let uploader = TreeUploader::new(publisher.clone(), UploadOptions { concurrency: 3 });

        let outcome = uploader.publish_tree(dir.path(), "dest").await.unwrap();

        assert_eq!(outcome.uploaded, 12);
        assert_eq!(publisher.done.load(Ordering::SeqCst), 12);
        let peak = publisher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeded limit");
        assert!(peak >= 2, "uploads never overlapped");
    }

    #[tokio::test]
    async fn test_reported_bytes_come_from_published_body() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "grown.txt", b"longer than the walk saw");
        let store = MemoryStore::new();
        let metrics = TransferMetrics::new();
        let task = PublishTask {
            path: dir.path().join("grown.txt"),
            key: "grown.txt".to_string(),
            bucket: "dest".to_string(),
            size: 0,
        };

        let report = publish_one(store.as_ref(), &metrics, task).await;

        assert!(report.result.is_ok());
        assert_eq!(report.bytes, 24);
        assert_eq!(metrics.total_bytes(), 24);
        assert_eq!(store.get("dest", "grown.txt").unwrap(), &b"longer than the walk saw"[..]);
    }

    #[test]
    fn test_discover_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "d/one.txt", b"1");
        write_file(dir.path(), "two.txt", b"22");

        let (mut tasks, failures) = discover(dir.path(), "dest");
        tasks.sort_by(|a, b| a.key.cmp(&b.key));

        assert!(failures.is_empty());
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].key, "d/one.txt");
        assert_eq!(tasks[1].key, "two.txt");
        assert_eq!(tasks[1].size, 2);
        assert!(tasks.iter().all(|t| t.bucket == "dest"));
    }
}
