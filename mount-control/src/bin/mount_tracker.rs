use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shared::config::Settings;

/// Robotic mount tracker: keeps the moon centered in the camera's field
/// of view while a capture subprocess records.
#[derive(Parser, Debug)]
#[command(name = "mount_tracker", version, about)]
struct Args {
    /// Settings file path.
    #[arg(long, default_value = "settings.toml")]
    config: PathBuf,

    /// Override the recording output root from the settings file.
    #[arg(long)]
    output_root: Option<PathBuf>,

    /// Start recording immediately instead of waiting in preview for the
    /// control panel.
    #[arg(long)]
    record: bool,

    /// Maximum log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let mut settings = Settings::load(&args.config)?;
    if let Some(root) = args.output_root {
        settings.capture.output_root = root;
    }

    info!("mount tracker starting");
    info!("  output root: {}", settings.capture.output_root.display());
    info!(
        "  segment length: {}s, framecheck every {}ms",
        settings.capture.record_duration_secs, settings.guidance.framecheck_interval_ms
    );

    mount_control::run::run(settings, args.record)
}
