//! Unpack zip archives that land in S3 and republish their contents.
//!
//! An invocation downloads one archive into a private work area, extracts
//! it, and uploads every extracted file to the destination bucket under its
//! path relative to the extraction root. See [`pipeline::Pipeline`].

pub mod archive;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod pipeline;
pub mod s3;
pub mod store;
pub mod upload;

pub use config::Settings;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineReport, SourceObject};
