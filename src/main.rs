use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use alldl_lib::downloader::extractors::CliInfoExtractor;
use alldl_lib::downloader::utils::format_file_size;
use alldl_lib::downloader::{LogProgress, MediaFormat, Quality};
use alldl_lib::telemetry::{init_tracing, LogFormat};
use alldl_lib::{validate_url, DownloadError, DownloadOptions, MediaService, ServiceConfig};

#[derive(Parser)]
#[command(name = "alldl", version, about = "Download social media video and audio through yt-dlp")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "ALLDL_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print best-effort metadata for a URL
    Info { url: String },
    /// Download a URL into the downloads directory
    Download {
        url: String,
        #[arg(long, default_value = "video")]
        format: MediaFormat,
        /// highest, high, medium, low, lowest (or 1080p, 720p, ...)
        #[arg(long, default_value = "highest")]
        quality: String,
    },
    /// Delete expired files once
    Sweep,
    /// Run the periodic cleanup until interrupted
    Watch,
    /// Show yt-dlp and ffmpeg availability
    Tools,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_failure(err: &DownloadError) -> Result<ExitCode> {
    print_json(&err.to_descriptor())?;
    Ok(ExitCode::FAILURE)
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Text };
    init_tracing(format)?;

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    config
        .prepare_downloads_dir()
        .await
        .context("cannot use downloads directory")?;

    let extractor = Arc::new(CliInfoExtractor::from_config(&config));
    let service = MediaService::with_components(Arc::new(config), extractor, Arc::new(LogProgress));

    match cli.command {
        Command::Info { url } => {
            let validated = match validate_url(&url) {
                Ok(validated) => validated,
                Err(e) => return report_failure(&e.into()),
            };
            let info = service.get_media_info(&validated.clean_url, validated.platform).await;
            print_json(&info)?;
        }
        Command::Download { url, format, quality } => {
            if quality.parse::<Quality>().is_err() {
                warn!(%quality, "unknown quality, using highest");
            }
            let options = DownloadOptions {
                format,
                quality: Quality::parse_lenient(&quality),
                ..DownloadOptions::default()
            };

            match service
                .download_media_with_cancel(&url, options, interrupt_token())
                .await
            {
                Ok(result) => {
                    info!(size = %format_file_size(result.size_bytes), "saved {}", result.filename);
                    print_json(&result)?;
                }
                Err(e) => return report_failure(&e),
            }
        }
        Command::Sweep => {
            let deleted = service.sweep_now().await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Command::Watch => {
            let cancel = interrupt_token();
            service.spawn_sweeper(cancel).await?;
        }
        Command::Tools => {
            let tools = service.tool_manager().get_all_tools().await;
            print_json(&tools)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
