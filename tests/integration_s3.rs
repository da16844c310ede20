use std::io::{Cursor, Write};
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use s3unzip::s3::S3Client;
use s3unzip::{Pipeline, Settings, SourceObject};

/// Bucket the archive is uploaded to
const SOURCE_BUCKET: &str = "s3unzip-source";
/// Bucket the extracted files land in
const DEST_BUCKET: &str = "s3unzip-dest";

/// Helper function to create an S3 client pointing to localstack
async fn create_localstack_client() -> Client {
    let endpoint_url =
        std::env::var("AWS_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_string());

    let config = aws_config::defaults(BehaviorVersion::latest())
        .region("us-east-1")
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&config)
        .endpoint_url(&endpoint_url)
        .force_path_style(true) // Required for LocalStack
        .build();

    Client::from_conf(s3_config)
}

/// Create a bucket, ignoring "already exists" errors from earlier runs
async fn ensure_bucket(client: &Client, bucket: &str) {
    let _ = client.create_bucket().bucket(bucket).send().await;
}

fn build_archive() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o644);
    writer.start_file("dir/x.txt", options).unwrap();
    writer.write_all(b"hi").unwrap();
    writer.start_file("y.txt", options).unwrap();
    writer.write_all(b"bye").unwrap();
    writer.finish().unwrap().into_inner()
}

async fn read_object(client: &Client, bucket: &str, key: &str) -> Vec<u8> {
    client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .unwrap_or_else(|e| panic!("Failed to get {key}: {e}"))
        .body
        .collect()
        .await
        .expect("Failed to read object body")
        .into_bytes()
        .to_vec()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored --test-threads=1
async fn test_unzip_round_trip() {
    let client = create_localstack_client().await;
    ensure_bucket(&client, SOURCE_BUCKET).await;
    ensure_bucket(&client, DEST_BUCKET).await;

    client
        .put_object()
        .bucket(SOURCE_BUCKET)
        .key("uploads/a.zip")
        .body(ByteStream::from(build_archive()))
        .send()
        .await
        .expect("Failed to upload archive");

    let work = tempfile::tempdir().unwrap();
    let settings = Settings::new(DEST_BUCKET).with_work_dir(work.path());
    let s3 = Arc::new(S3Client::from_client(client.clone()));
    let pipeline = Pipeline::new(settings, s3.clone(), s3).unwrap();

    let report = pipeline
        .run(&SourceObject::new(SOURCE_BUCKET, "uploads/a.zip"))
        .await
        .expect("Pipeline run failed");

    assert_eq!(report.uploaded, 2);
    assert_eq!(read_object(&client, DEST_BUCKET, "dir/x.txt").await, b"hi");
    assert_eq!(read_object(&client, DEST_BUCKET, "y.txt").await, b"bye");
    assert_eq!(pipeline.metrics().object_count(), 2);
    assert_eq!(pipeline.metrics().total_bytes(), 5);
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored --test-threads=1
async fn test_missing_archive_is_retrieval_error() {
    let client = create_localstack_client().await;
    ensure_bucket(&client, SOURCE_BUCKET).await;
    ensure_bucket(&client, DEST_BUCKET).await;

    let work = tempfile::tempdir().unwrap();
    let settings = Settings::new(DEST_BUCKET).with_work_dir(work.path());
    let s3 = Arc::new(S3Client::from_client(client));
    let pipeline = Pipeline::new(settings, s3.clone(), s3).unwrap();

    let result = pipeline
        .run(&SourceObject::new(SOURCE_BUCKET, "does/not/exist.zip"))
        .await;

    assert!(matches!(
        result,
        Err(s3unzip::PipelineError::Retrieval { .. })
    ));
    assert!(std::fs::read_dir(work.path()).unwrap().next().is_none());
}
