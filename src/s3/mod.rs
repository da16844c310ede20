pub mod client;
pub mod metrics;

pub use client::S3Client;
pub use metrics::TransferMetrics;
