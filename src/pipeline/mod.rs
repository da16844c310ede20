//! Orchestration of one archive through download, extraction and upload.
//!
//! ```text
//! Idle -> StagingArchive -> Extracting -> Uploading -> Done
//!              \________________\______________\______-> Failed
//! ```
//!
//! Any stage error moves straight to `Failed`; nothing is retried here.
//! Retrying belongs to whatever delivered the trigger.

mod workspace;

pub use workspace::WorkArea;

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use crate::archive::{ArchiveExtractor, ZipExtractor};
use crate::config::Settings;
use crate::error::PipelineError;
use crate::s3::TransferMetrics;
use crate::store::{ObjectFetcher, ObjectPublisher};
use crate::upload::TreeUploader;

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    StagingArchive,
    Extracting,
    Uploading,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::StagingArchive => "staging archive",
            Stage::Extracting => "extracting",
            Stage::Uploading => "uploading",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The archive object that triggered an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub bucket: String,
    pub key: String,
}

impl SourceObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        SourceObject {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SourceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub source: SourceObject,
    /// Regular files written by extraction
    pub extracted: usize,
    /// Files published to the destination bucket
    pub uploaded: usize,
    /// Bytes published
    pub bytes: u64,
}

pub struct Pipeline {
    settings: Settings,
    fetcher: Arc<dyn ObjectFetcher>,
    extractor: Arc<dyn ArchiveExtractor>,
    uploader: TreeUploader,
}

impl Pipeline {
    /// Build a pipeline over the given collaborators.
    ///
    /// Settings are validated here, before any collaborator is touched.
    pub fn new(
        settings: Settings,
        fetcher: Arc<dyn ObjectFetcher>,
        publisher: Arc<dyn ObjectPublisher>,
    ) -> Result<Self, PipelineError> {
        settings.validate()?;

        let uploader = TreeUploader::new(publisher, settings.upload_options());
        Ok(Pipeline {
            settings,
            fetcher,
            extractor: Arc::new(ZipExtractor::new()),
            uploader,
        })
    }

    /// Replace the archive extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<TransferMetrics> {
        self.uploader.metrics()
    }

    /// Process every source in order, stopping at the first failure
    pub async fn run_all(&self, sources: &[SourceObject]) -> Result<Vec<PipelineReport>, PipelineError> {
        let mut reports = Vec::with_capacity(sources.len());
        for source in sources {
            reports.push(self.run(source).await?);
        }
        Ok(reports)
    }

    /// Download, extract and republish one archive.
    ///
    /// The work area is removed before returning, on success and on failure.
    pub async fn run(&self, source: &SourceObject) -> Result<PipelineReport, PipelineError> {
        info!(source = %source, dest = %self.settings.destination_bucket, "pipeline start");

        let work_area = WorkArea::allocate(&self.settings.work_dir).map_err(|err| {
            fail(
                Stage::Idle,
                source,
                PipelineError::Workspace {
                    path: self.settings.work_dir.clone(),
                    source: err,
                },
            )
        })?;

        let result = self.run_stages(source, &work_area).await;
        work_area.close();

        if let Ok(report) = &result {
            transition(Stage::Done, source);
            info!(
                source = %source,
                extracted = report.extracted,
                uploaded = report.uploaded,
                size = %humansize::format_size(report.bytes, humansize::DECIMAL),
                "pipeline finish"
            );
        }
        result
    }

    async fn run_stages(
        &self,
        source: &SourceObject,
        work_area: &WorkArea,
    ) -> Result<PipelineReport, PipelineError> {
        transition(Stage::StagingArchive, source);
        let archive = self
            .fetcher
            .download(&source.bucket, &source.key, &work_area.archive_path())
            .await
            .map_err(|err| {
                fail(
                    Stage::StagingArchive,
                    source,
                    PipelineError::Retrieval {
                        bucket: source.bucket.clone(),
                        key: source.key.clone(),
                        source: err,
                    },
                )
            })?;

        transition(Stage::Extracting, source);
        let root = work_area.extraction_root();
        let extractor = Arc::clone(&self.extractor);
        let extract_root = root.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract(&archive, &extract_root))
                .await
                .map_err(|err| {
                    fail(
                        Stage::Extracting,
                        source,
                        PipelineError::Aborted {
                            stage: Stage::Extracting,
                            source: err,
                        },
                    )
                })?
                .map_err(|err| fail(Stage::Extracting, source, PipelineError::from(err)))?;
        info!(source = %source, files = extracted.len(), "extraction finish");

        transition(Stage::Uploading, source);
        let outcome = self
            .uploader
            .publish_tree(&root, &self.settings.destination_bucket)
            .await
            .map_err(|err| fail(Stage::Uploading, source, PipelineError::from(err)))?;

        Ok(PipelineReport {
            source: source.clone(),
            extracted: extracted.len(),
            uploaded: outcome.uploaded,
            bytes: outcome.bytes,
        })
    }
}

fn transition(stage: Stage, source: &SourceObject) {
    info!(stage = %stage, source = %source, "stage");
}

/// Log a stage failure with its context and hand the error back unchanged
fn fail(stage: Stage, source: &SourceObject, err: PipelineError) -> PipelineError {
    error!(
        stage = %stage,
        next = %Stage::Failed,
        bucket = %source.bucket,
        key = %source.key,
        error = %err,
        "stage failed"
    );
    err
}
