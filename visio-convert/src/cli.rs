///
/// This module implements the CLI for visio-convert: command parsing, wiring the
/// HTTP client into the lifecycle controller, and printing results.
///
/// All lifecycle logic (validation, polling, state transitions) lives in
/// [`visio-convert-core`]. This module is glue only.
///
/// ## How To Use
/// - For command-line users: run the installed `visio-convert` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`visio-convert-core`]: ../../visio-convert-core/
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;

use visio_convert_core::contract::{ConversionBackend, ConversionStatus};
use visio_convert_core::controller::{LifecycleController, Upload};
use visio_convert_core::notify::{Notice, NoticeReceiver};
use visio_convert_core::session::Session;
use visio_convert_core::validation::Candidate;

use crate::client::HttpBackend;
use crate::load_config::load_config;

/// CLI for visio-convert: convert Visio diagrams to XML through the conversion service.
#[derive(Parser)]
#[clap(
    name = "visio-convert",
    version,
    about = "Upload Visio diagrams, track their conversion to XML and fetch the results"
)]
pub struct Cli {
    /// Path to an optional YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload files, wait for their conversion and download the results
    Convert {
        /// Visio files to convert
        #[clap(required = true)]
        files: Vec<PathBuf>,
        /// Where converted files are written (defaults to the configured output_dir)
        #[clap(long)]
        output_dir: Option<PathBuf>,
        /// Only convert; do not download the results
        #[clap(long)]
        no_download: bool,
    },
    /// List every file known to the service
    List,
    /// Show the current conversion status of one file
    Status { id: String },
    /// Retry a failed conversion and wait for it to finish
    Retry { id: String },
    /// Delete a file from the service (not allowed while converting)
    Delete { id: String },
    /// Download the converted result of a completed file
    Download {
        id: String,
        #[clap(long)]
        output_dir: Option<PathBuf>,
    },
}

type Controller = LifecycleController<HttpBackend>;

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_config(cli.config.as_deref())?;
    let backend = Arc::new(
        HttpBackend::new(
            &config.api_url,
            Duration::from_secs(config.request_timeout_secs),
        )
        .context("Failed to construct conversion service client")?,
    );
    let (mut controller, mut notices) =
        LifecycleController::new(Arc::clone(&backend), &config.controller);

    let result = match cli.command {
        Commands::Convert {
            files,
            output_dir,
            no_download,
        } => {
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            convert(&mut controller, &mut notices, &backend, &files, &output_dir, no_download).await
        }
        Commands::List => list(&mut controller).await,
        Commands::Status { id } => {
            let report = backend.query_status(&id).await?;
            println!("{}\t{}\t{}", report.file_id, report.status, report.message);
            if let Some(url) = report.download_url {
                println!("download: {url}");
            }
            Ok(())
        }
        Commands::Retry { id } => {
            controller.refresh().await.map_err(|_| already_reported("retry"))?;
            controller.retry(&id).await.map_err(|_| already_reported("retry"))?;
            print_notices(&mut notices);
            controller.run_until_settled().await;
            let session = controller
                .session(&id)
                .with_context(|| format!("File {id} disappeared during retry"))?;
            print_session(session);
            match session.status() {
                ConversionStatus::Failed => anyhow::bail!("Conversion of {id} failed again"),
                _ => Ok(()),
            }
        }
        Commands::Delete { id } => {
            controller.refresh().await.map_err(|_| already_reported("delete"))?;
            controller.remove(&id).await.map_err(|_| already_reported("delete"))?;
            Ok(())
        }
        Commands::Download { id, output_dir } => {
            controller.refresh().await.map_err(|_| already_reported("download"))?;
            controller.fetch_result(&id).map_err(|_| already_reported("download"))?;
            let session = controller
                .session(&id)
                .with_context(|| format!("File {id} not found"))?;
            let output_dir = output_dir.as_deref().unwrap_or(config.output_dir.as_path());
            let dest = result_path(output_dir, session);
            let written = backend.download_to(&id, &dest).await?;
            println!("Saved {} ({})", dest.display(), format_file_size(written));
            Ok(())
        }
    };

    print_notices(&mut notices);
    match &result {
        Ok(_) => tracing::info!("Command completed"),
        Err(e) => tracing::error!(error = %e, "Command failed"),
    }
    result
}

async fn convert(
    controller: &mut Controller,
    notices: &mut NoticeReceiver,
    backend: &HttpBackend,
    files: &[PathBuf],
    output_dir: &Path,
    no_download: bool,
) -> Result<()> {
    // Content is read one file at a time, and only once it passes the gate.
    let lookups = files
        .iter()
        .map(|path| async move { (path, tokio::fs::metadata(path).await) });
    let inspected = join_all(lookups).await;

    let mut failures = 0usize;
    let mut submitted = Vec::new();
    for (path, metadata) in inspected {
        let size_bytes = match metadata {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                report_unreadable(path, &e);
                failures += 1;
                continue;
            }
        };
        let name = display_name(path);
        if controller
            .screen(&Candidate {
                name: &name,
                size_bytes,
            })
            .is_err()
        {
            print_notices(notices);
            failures += 1;
            continue;
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                report_unreadable(path, &e);
                failures += 1;
                continue;
            }
        };
        match controller.submit(Upload { name, bytes }).await {
            Ok(id) => submitted.push(id),
            Err(_) => failures += 1,
        }
        print_notices(notices);
    }

    if !submitted.is_empty() {
        println!("Waiting for {} conversion(s)...", submitted.len());
        controller.run_until_settled().await;
        print_notices(notices);
    }

    for id in &submitted {
        let Some(session) = controller.session(id) else {
            continue;
        };
        print_session(session);
        match session.status() {
            ConversionStatus::Completed if !no_download => {
                let dest = result_path(output_dir, session);
                match backend.download_to(id, &dest).await {
                    Ok(written) => {
                        println!("Saved {} ({})", dest.display(), format_file_size(written))
                    }
                    Err(e) => {
                        eprintln!("[ERROR] Download of {id} failed: {e:#}");
                        failures += 1;
                    }
                }
            }
            ConversionStatus::Completed => {}
            _ => failures += 1,
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} file(s) could not be converted");
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn report_unreadable(path: &Path, e: &std::io::Error) {
    tracing::error!(path = %path.display(), error = ?e, "Failed to read input file");
    eprintln!("[ERROR] Failed to read {}: {e}", path.display());
}

/// Controller errors are already on the notice channel; the returned error only
/// sets the exit status.
fn already_reported(command: &str) -> anyhow::Error {
    anyhow::anyhow!("{command} failed")
}

async fn list(controller: &mut Controller) -> Result<()> {
    let count = controller.refresh().await.map_err(|_| already_reported("list"))?;
    if count == 0 {
        println!("No files.");
    }
    for session in controller.sessions() {
        print_session(session);
    }
    Ok(())
}

/// Converted output is named after the original file, as the service does.
fn result_path(output_dir: &Path, session: &Session) -> PathBuf {
    output_dir.join(format!("{}.xml", session.original_name()))
}

fn print_session(session: &Session) {
    let detail = match session.status() {
        ConversionStatus::Completed => session
            .result_handle()
            .map(str::to_string)
            .unwrap_or_else(|| "completed (no download reference)".to_string()),
        ConversionStatus::Failed => session.error_text().unwrap_or_default().to_string(),
        _ => String::new(),
    };
    println!(
        "{}\t{:<10}\t{:>10}\t{}\t{}",
        session.id(),
        session.status().as_str(),
        format_file_size(session.size_bytes()),
        session.original_name(),
        detail
    );
}

fn print_notices(notices: &mut NoticeReceiver) {
    while let Ok(notice) = notices.try_recv() {
        match notice {
            Notice::Error(message) => eprintln!("[ERROR] {message}"),
            Notice::Success(message) => println!("{message}"),
        }
    }
}

/// Human-readable size with two decimals at most, in powers of 1024.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sizes_are_humanised() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(50_000), "48.83 KB");
        assert_eq!(format_file_size(1000 * 1024 * 1024), "1000 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn results_are_named_after_the_original_file() {
        let session = Session::uploaded("f1", "diagram.vsdx", 1);
        assert_eq!(
            result_path(Path::new("out"), &session),
            PathBuf::from("out/diagram.vsdx.xml")
        );
    }

    #[test]
    fn cli_parses_convert_with_global_config() {
        let cli = Cli::try_parse_from([
            "visio-convert",
            "convert",
            "a.vsdx",
            "b.vsd",
            "--no-download",
            "--config",
            "conf.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("conf.yaml")));
        match cli.command {
            Commands::Convert {
                files, no_download, ..
            } => {
                assert_eq!(files, vec![PathBuf::from("a.vsdx"), PathBuf::from("b.vsd")]);
                assert!(no_download);
            }
            _ => panic!("expected convert"),
        }
    }
}
