use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use tracing::info;

use s3unzip::config::SettingsArgs;
use s3unzip::event::S3Event;
use s3unzip::s3::S3Client;
use s3unzip::{Pipeline, Settings, SourceObject, logging};

/// Unpack a zip archive from S3 and republish its contents to another bucket
#[derive(Debug, Parser)]
#[command(name = "s3unzip", version, about)]
struct Cli {
    /// S3 event notification JSON to process ("-" reads stdin)
    #[arg(long, conflicts_with_all = ["bucket", "key"])]
    event: Option<PathBuf>,

    /// Source bucket of the archive
    #[arg(long, requires = "key")]
    bucket: Option<String>,

    /// Source key of the archive
    #[arg(long, requires = "bucket")]
    key: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "S3UNZIP_LOG_JSON")]
    log_json: bool,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from(cli.settings);
    settings.validate()?;

    let sources = match (&cli.event, &cli.bucket, &cli.key) {
        (Some(path), _, _) => read_event(path)?.sources()?,
        (None, Some(bucket), Some(key)) => vec![SourceObject::new(bucket, key)],
        _ => return Err(anyhow!("either --event or --bucket/--key is required")),
    };

    if sources.is_empty() {
        info!("no object-created records to process");
        return Ok(());
    }

    let client = Arc::new(S3Client::from_settings(&settings).await);
    let pipeline = Pipeline::new(settings, client.clone(), client)?;

    for report in pipeline.run_all(&sources).await? {
        println!(
            "{} {} -> s3://{}/ ({} files, {})",
            "Done:".green().bold(),
            report.source,
            pipeline.settings().destination_bucket,
            report.uploaded,
            humansize::format_size(report.bytes, humansize::DECIMAL)
        );
    }

    let metrics = pipeline.metrics();
    info!(
        objects = metrics.object_count(),
        size = %humansize::format_size(metrics.total_bytes(), humansize::DECIMAL),
        failures = metrics.failure_count(),
        transfer_ms = metrics.total_transfer_time().as_millis() as u64,
        "invocation finish"
    );

    Ok(())
}

fn read_event(path: &Path) -> Result<S3Event> {
    let input = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| anyhow!("Failed to read event from stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read event file {}: {e}", path.display()))?
    };

    Ok(S3Event::from_json(&input)?)
}
