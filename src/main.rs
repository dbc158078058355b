// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use quadcam::Config;
use quadcam::backends::camera::CameraBackendType;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "quadcam")]
#[command(about = "Camera capture with live quadrilateral detection")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Use the synthetic camera instead of real devices
    #[arg(long = "virtual", global = true)]
    virtual_camera: bool,

    /// Configuration file (default: ~/.config/quadcam/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in terminal mode (renders camera and detections to the terminal)
    Terminal,

    /// List available cameras
    List,

    /// Detect the biggest quadrilateral in an image file
    Detect {
        /// Image to analyse (PNG, JPEG)
        image: PathBuf,
    },

    /// Take a photo and import it into the photo library
    Photo {
        /// Seconds to let the camera settle before capturing
        #[arg(short, long, default_value = "1")]
        warmup: u64,
    },

    /// Record a video and import it into the video library
    Video {
        /// Recorded duration in seconds, excluding pauses
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Pause after this many seconds of recording
        #[arg(long)]
        pause_at: Option<u64>,

        /// Length of the pause in seconds
        #[arg(long, default_value = "2")]
        pause_for: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=quadcam=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    if cli.virtual_camera {
        config.backend = CameraBackendType::Virtual;
    }

    match cli.command {
        Some(Commands::List) => cli::list_cameras(&config),
        Some(Commands::Detect { image }) => cli::detect_image(&config, &image),
        Some(Commands::Photo { warmup }) => cli::take_photo(&config, warmup),
        Some(Commands::Video {
            duration,
            pause_at,
            pause_for,
        }) => cli::record_video(&config, duration, pause_at, pause_for),
        Some(Commands::Terminal) | None => quadcam::terminal::run(&config),
    }
}
