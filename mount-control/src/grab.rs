//! Screen-grabber frame source.
//!
//! The tracking loop watches the recorder's preview window, not the
//! recorder's own output: an external grabber tool snapshots the display
//! to a PNG, which is loaded back as an RGB frame. Liveness of the
//! capture subprocess comes from the supervisor's status handle.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};

use shared::frame::RgbFrame;

use crate::capture::CaptureStatus;
use crate::tracking::FrameSource;

pub struct GrabberFrameSource {
    command: Vec<String>,
    output_path: PathBuf,
    status: CaptureStatus,
}

impl GrabberFrameSource {
    /// `command` is the grabber executable plus fixed arguments; the
    /// snapshot path is appended as the final argument on every capture.
    pub fn new(command: Vec<String>, status: CaptureStatus) -> Result<Self> {
        if command.is_empty() {
            bail!("grabber command is empty");
        }
        Ok(Self {
            command,
            output_path: std::env::temp_dir().join("mount-tracker-grab.png"),
            status,
        })
    }
}

impl FrameSource for GrabberFrameSource {
    fn capture(&mut self) -> Result<RgbFrame> {
        let exit = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(&self.output_path)
            .status()
            .with_context(|| format!("failed to run grabber '{}'", self.command[0]))?;
        if !exit.success() {
            bail!("grabber exited with {exit}");
        }

        let image = image::open(&self.output_path)
            .with_context(|| format!("failed to read grab {}", self.output_path.display()))?
            .to_rgb8();
        let (width, height) = image.dimensions();
        RgbFrame::new(width as usize, height as usize, image.into_raw())
            .map_err(|e| anyhow::anyhow!(e))
    }

    fn process_alive(&mut self) -> bool {
        self.status.is_alive()
    }
}
