//! lanewatch CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use lanewatch::batch::BatchClient;
use lanewatch::camera;
use lanewatch::config::Config;
use lanewatch::render::{self, DiscardSurface, FileSurface, RenderSurface};
use lanewatch::session::{SessionController, StreamSettings};

#[derive(Parser, Debug)]
#[command(name = "lanewatch")]
#[command(about = "Streaming client for a remote object and lane detection service")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "lanewatch.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream the camera to the detection service in real time.
    /// Starts immediately; Enter toggles detection off/on, Ctrl-C exits.
    Stream,

    /// Upload a video for one-shot processing and print the result URL
    Upload {
        /// Video file to process
        video: PathBuf,

        /// Also download the annotated result to this path
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let config = Config::load_or_default(&cli.config)?;
    info!(config_path = %cli.config, origin = %config.service.origin, "lanewatch starting");

    match cli.command {
        Command::Stream => run_stream(config).await,
        Command::Upload { video, output } => run_upload(config, video, output).await,
    }
}

async fn run_stream(config: Config) -> Result<()> {
    let provider = camera::provider_for(&config.camera)?;

    let surface: Box<dyn RenderSurface> = match &config.output.frame_path {
        Some(path) => {
            info!(path = %path.display(), "annotated frames will be written here");
            Box::new(FileSurface::new(path.clone()))
        }
        None => Box::new(DiscardSurface::new()),
    };

    let controller = SessionController::new(
        StreamSettings {
            endpoint: config.ws_endpoint()?,
            interval: Duration::from_millis(config.capture.interval_ms),
            jpeg_quality: config.capture.jpeg_quality,
        },
        provider,
        render::shared(surface),
    );

    if let Err(e) = controller.toggle().await {
        error!(error = %e, "could not start detection");
    }

    info!("press Enter to toggle detection, Ctrl-C to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line {
                    Ok(Some(_)) => {
                        if let Err(e) = controller.toggle().await {
                            error!(error = %e, "could not start detection");
                        } else {
                            info!(status = ?controller.status(), "toggled");
                        }
                    }
                    // stdin gone (piped run): keep streaming until Ctrl-C
                    Ok(None) | Err(_) => {
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                }
            }
        }
    }

    info!("shutting down");
    controller.stop();
    Ok(())
}

async fn run_upload(config: Config, video: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let client = BatchClient::new(config.origin_url()?);
    let download_url = client.submit_file(&video).await?;
    println!("{download_url}");

    if let Some(dest) = output {
        client.download(&download_url, &dest).await?;
        println!("saved to {}", dest.display());
    }
    Ok(())
}
