//! Posture Coach - webcam and upload client for posture analysis.
//!
//! This is the main library crate. It provides the capture/analysis session
//! and the command-line front end built on it.

pub mod analysis;
pub mod capture;
pub mod commands;
pub mod config;
pub mod media;
pub mod render;
pub mod sampler;
pub mod session;
pub mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use analysis::{AnalysisClient, Mode, PushChannel};
use capture::{CaptureDevice, VirtualCamera};
use commands::SessionHandle;
use config::ClientConfig;
use session::{SessionBuilder, SessionSnapshot};
use utils::{AppError, AppResult, ErrorResponse};

#[derive(Parser, Debug)]
#[command(name = "posture-coach", version, about = "Posture and exercise-form feedback")]
struct Cli {
    /// Base URL of the analysis service
    #[arg(long, env = "POSTURE_API_URL")]
    api_url: Option<String>,

    /// Print snapshots as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Use the synthetic test-pattern camera
    #[arg(long)]
    virtual_camera: bool,

    /// Camera index for the native backend
    #[arg(long, default_value_t = 0)]
    camera: u32,

    /// Do not subscribe to live upload progress
    #[arg(long)]
    no_push: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a video file for batch analysis
    Upload {
        file: PathBuf,

        #[arg(long, default_value = "squat")]
        mode: Mode,
    },
    /// Analyze the webcam live without recording
    Live {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Record from the webcam with live feedback
    Record {
        #[arg(long, default_value_t = 5)]
        seconds: u64,

        /// Upload the recording for batch analysis afterwards
        #[arg(long)]
        analyze: bool,

        /// Directory to save the recording into
        #[arg(long)]
        save: Option<PathBuf>,

        #[arg(long, default_value = "squat")]
        mode: Mode,
    },
    /// List available cameras
    Cameras,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posture_coach=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(feature = "native-camera")]
fn capture_device(cli: &Cli) -> Arc<dyn CaptureDevice> {
    if cli.virtual_camera {
        Arc::new(VirtualCamera::new())
    } else {
        Arc::new(capture::native::NativeCamera::new(cli.camera))
    }
}

#[cfg(not(feature = "native-camera"))]
fn capture_device(cli: &Cli) -> Arc<dyn CaptureDevice> {
    if !cli.virtual_camera {
        tracing::warn!("Built without native camera support; using the virtual camera");
    }
    Arc::new(VirtualCamera::new())
}

fn print_snapshot(json: bool, snapshot: &SessionSnapshot) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        print!("{}", render::render_text(snapshot));
    }
    Ok(())
}

/// Print a failure the way the presentation layer reports it.
fn report(json: bool, error: impl Into<AppError>) -> anyhow::Error {
    let response = ErrorResponse::from(error.into());
    if json {
        if let Ok(body) = serde_json::to_string(&response) {
            println!("{}", body);
        }
    }
    anyhow::anyhow!("{} ({})", response.message, response.code)
}

/// Follow live feedback until `duration` has elapsed.
async fn follow_live(session: &SessionHandle, duration: Duration, json: bool) -> AppResult<()> {
    let deadline = Instant::now() + duration;
    let mut snapshots = session.subscribe_snapshots();
    let mut last = Vec::new();

    loop {
        tokio::select! {
            _ = sleep_until(deadline) => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.live_feedback != last && !snapshot.live_feedback.is_empty() {
                    last = snapshot.live_feedback.clone();
                    if json {
                        println!("{}", serde_json::to_string(&last)?);
                    } else {
                        println!("Live Feedback: {}", last.join(", "));
                    }
                }
            }
        }
    }
    Ok(())
}

async fn execute(cli: &Cli, session: &SessionHandle, device: &Arc<dyn CaptureDevice>) -> anyhow::Result<()> {
    let json = cli.json;

    match &cli.command {
        Command::Cameras => {
            for camera in device.cameras() {
                println!("{:<10} {}", camera.id, camera.name);
            }
        }
        Command::Upload { file, mode } => {
            session.set_mode(*mode).await.map_err(|e| report(json, e))?;
            session.select_file(file).await.map_err(|e| report(json, e))?;
            let outcome = session.upload().await;
            print_snapshot(json, &session.snapshot()).map_err(|e| report(json, e))?;
            outcome.map_err(|e| report(json, e))?;
        }
        Command::Live { seconds } => {
            session.start_webcam().await.map_err(|e| report(json, e))?;
            session.start_live_analysis().await.map_err(|e| report(json, e))?;
            follow_live(session, Duration::from_secs(*seconds), json)
                .await
                .map_err(|e| report(json, e))?;
            session.stop_live_analysis().await.map_err(|e| report(json, e))?;
            session.stop_webcam().await.map_err(|e| report(json, e))?;
        }
        Command::Record {
            seconds,
            analyze,
            save,
            mode,
        } => {
            session.set_mode(*mode).await.map_err(|e| report(json, e))?;
            session.start_webcam().await.map_err(|e| report(json, e))?;
            session.start_recording().await.map_err(|e| report(json, e))?;
            follow_live(session, Duration::from_secs(*seconds), json)
                .await
                .map_err(|e| report(json, e))?;

            let outcome = session.stop_recording().await.map_err(|e| report(json, e))?;
            if let Some(warning) = outcome.warning {
                eprintln!("{}", warning);
            }
            if let Some(dir) = save {
                let path = outcome.artifact.save_to(dir).map_err(|e| report(json, e))?;
                println!("Saved {}", path.display());
            }
            let result = if *analyze {
                session.analyze_recorded().await.map(|_| ())
            } else {
                Ok(())
            };
            print_snapshot(json, &session.snapshot()).map_err(|e| report(json, e))?;
            result.map_err(|e| report(json, e))?;
        }
    }
    Ok(())
}

/// Run the command-line application
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    tracing::info!("Starting Posture Coach v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::from_env();
    if let Some(url) = &cli.api_url {
        config.base_url = ClientConfig::new(url.as_str()).base_url;
    }
    tracing::info!("Analysis service: {}", config.base_url);

    let device = capture_device(&cli);
    let client = AnalysisClient::new(config.clone()).map_err(|e| report(cli.json, e))?;
    let mut builder = SessionBuilder::new(Arc::new(client), device.clone())
        .with_sample_interval(config.sample_interval);

    if !cli.no_push && !matches!(cli.command, Command::Cameras) {
        builder = builder.with_push(PushChannel::new(&config.base_url).subscribe());
    }

    let session = builder.spawn();
    let result = execute(&cli, &session, &device).await;
    session.shutdown().await;
    result
}
