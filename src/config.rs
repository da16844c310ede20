//! Process configuration.
//!
//! Settings are read once from CLI flags or the environment, validated, and
//! then handed to the pipeline by value. Nothing below the binary looks at the
//! environment.

use std::path::PathBuf;

use clap::Args;

use crate::error::ConfigError;
use crate::upload::UploadOptions;

/// Default number of uploads allowed in flight at once
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 16;

/// Largest accepted upload concurrency (the upload semaphore's permit limit)
pub const MAX_UPLOAD_CONCURRENCY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Validated pipeline settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bucket that receives the extracted files
    pub destination_bucket: String,
    /// Parent directory for per-invocation working areas
    pub work_dir: PathBuf,
    /// Maximum concurrent uploads during fan-out
    pub upload_concurrency: usize,
    /// Optional custom endpoint URL (S3-compatible stores, LocalStack)
    pub endpoint_url: Option<String>,
    /// Whether to use path-style addressing
    pub force_path_style: bool,
    /// Optional region override
    pub region: Option<String>,
}

impl Settings {
    pub fn new(destination_bucket: impl Into<String>) -> Self {
        Settings {
            destination_bucket: destination_bucket.into(),
            work_dir: std::env::temp_dir(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            endpoint_url: None,
            force_path_style: false,
            region: None,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency;
        self
    }

    /// Check the settings before any I/O happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destination_bucket.trim().is_empty() {
            return Err(ConfigError::MissingDestination);
        }
        if self.upload_concurrency == 0 || self.upload_concurrency > MAX_UPLOAD_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency);
        }
        Ok(())
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            concurrency: self.upload_concurrency,
        }
    }
}

/// Command-line / environment view of [`Settings`]
#[derive(Debug, Clone, Args)]
pub struct SettingsArgs {
    /// Bucket that receives the extracted files
    #[arg(long, env = "DEST_BUCKET")]
    pub dest_bucket: Option<String>,

    /// Parent directory for per-invocation working areas
    #[arg(long, env = "S3UNZIP_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Maximum number of concurrent uploads
    #[arg(long, env = "S3UNZIP_UPLOAD_CONCURRENCY", default_value_t = DEFAULT_UPLOAD_CONCURRENCY)]
    pub upload_concurrency: usize,

    /// Custom S3 endpoint URL
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, env = "S3UNZIP_FORCE_PATH_STYLE")]
    pub force_path_style: bool,

    /// AWS region override
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,
}

impl From<SettingsArgs> for Settings {
    fn from(args: SettingsArgs) -> Self {
        Settings {
            destination_bucket: args.dest_bucket.unwrap_or_default(),
            work_dir: args.work_dir.unwrap_or_else(std::env::temp_dir),
            upload_concurrency: args.upload_concurrency,
            endpoint_url: args.endpoint_url,
            force_path_style: args.force_path_style,
            region: args.region,
        }
    }
}
