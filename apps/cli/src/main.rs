mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use sftpdeploy_ssh::SftpConnector;
use sftpdeploy_upload::{
    MemoryConnector, MemoryRemote, SessionConnector, UploadEvent, UploadPipeline,
    scan_files_for_upload,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let options = cli.load_options(&cwd)?;
    let config = sftpdeploy_config::resolve_options(options, &cwd)?;

    let local_dir = cwd.join(&cli.local_dir);
    let files = scan_files_for_upload(&local_dir)
        .with_context(|| format!("cannot scan {}", local_dir.display()))?;
    info!(dir = %local_dir.display(), entries = files.len(), "scanned local files");

    let connector: Arc<dyn SessionConnector> = if cli.dry_run {
        warn!("dry run: nothing is sent to {}", config.host);
        Arc::new(MemoryConnector::new(MemoryRemote::new()))
    } else {
        Arc::new(SftpConnector::new())
    };

    let mut pipeline = UploadPipeline::new(config, connector);
    if let Some(mut events) = pipeline.take_events() {
        let show_progress = cli.progress;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let UploadEvent::Progress {
                    remote_path,
                    percent,
                    bytes_per_second,
                    ..
                } = event
                {
                    if show_progress {
                        info!(
                            "{remote_path}: {percent}% ({:.1} KiB/s)",
                            bytes_per_second / 1024.0
                        );
                    }
                }
            }
        });
    }

    let records = futures_util::stream::iter(files).filter_map(|file| async move {
        match file.open().await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "skipping unreadable file");
                None
            }
        }
    });

    let summary = pipeline.run(records, None).await?;
    if summary.failed > 0 {
        anyhow::bail!("{} file(s) failed to upload", summary.failed);
    }
    Ok(())
}
