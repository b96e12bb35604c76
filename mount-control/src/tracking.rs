//! Vision tracking loop.
//!
//! Only active while recording: each tick grabs the preview region,
//! thresholds it to a binary mask, and lets the guidance engine decide a
//! motion command. Missed detections feed the lost counter; when it
//! reaches the configured threshold, tracking is declared lost and the
//! run aborts.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use selene::{GuidanceConfig, HorizontalDecision, TrackingCommand, VerticalDecision};
use shared::config::GuidanceSettings;
use shared::error::ControlError;
use shared::frame::{CropRegion, RgbFrame};
use shared::image_proc::{analyze_mask, threshold_mask};
use shared::state::{HorizontalMotion, RunMode, SharedState, VerticalMotion};
use tracing::{debug, error, info, warn};

/// Capability consumed by the tracking loop: a way to obtain the current
/// frame and to ask whether the capture subprocess is confirmed alive.
pub trait FrameSource: Send {
    /// Grab the current raw frame from the video source.
    fn capture(&mut self) -> Result<RgbFrame>;

    /// Whether the capture subprocess is confirmed alive.
    fn process_alive(&mut self) -> bool;
}

/// The vision tracking loop.
pub struct TrackingLoop<F: FrameSource> {
    source: F,
    state: SharedState,
    crop: CropRegion,
    threshold: u8,
    lost_thresh: u32,
    guidance: GuidanceConfig,
    interval: Duration,
}

impl<F: FrameSource> TrackingLoop<F> {
    pub fn new(source: F, state: SharedState, settings: &GuidanceSettings) -> Self {
        Self {
            source,
            state,
            crop: settings.crop,
            threshold: settings.bright_threshold,
            lost_thresh: settings.lost_thresh,
            guidance: GuidanceConfig {
                edge_divisor_w: settings.edge_divisor_w,
                edge_divisor_h: settings.edge_divisor_h,
            },
            interval: Duration::from_millis(settings.framecheck_interval_ms),
        }
    }

    /// Run until abort. Preview ticks are skipped entirely.
    pub fn run(&mut self) {
        info!("tracking loop started");
        loop {
            if self.state.abort_raised() {
                break;
            }
            self.tick();
            thread::sleep(self.interval);
        }
        info!("tracking loop stopped");
    }

    /// One framecheck pass.
    pub fn tick(&mut self) {
        if self.state.snapshot().mode != RunMode::Recording {
            return;
        }

        if !self.source.process_alive() {
            warn!("capture process not confirmed alive");
            self.note_lost();
            return;
        }

        let frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame capture failed: {e:#}");
                self.note_lost();
                return;
            }
        };

        let crop = self.crop.clamped(frame.width, frame.height);
        let mask = threshold_mask(&frame, &crop, self.threshold);
        let analysis = analyze_mask(&mask.view());

        match selene::decide(&analysis, crop.width, crop.height, &self.guidance) {
            None => {
                debug!("no target pixels in frame");
                self.note_lost();
            }
            Some(command) => {
                self.state.update(|s| s.lost_counter = 0);
                self.apply(command);
            }
        }
    }

    /// Record a missed detection and abort when the loss threshold is
    /// first reached.
    fn note_lost(&mut self) {
        let ticks = self.state.update(|s| {
            s.lost_counter += 1;
            s.lost_counter
        });
        warn!("target lost for {ticks} ticks");
        if ticks == self.lost_thresh {
            error!("{}", ControlError::TrackingLost { ticks });
            self.state.raise_abort();
        }
    }

    /// Write one decision into the shared state. Stops merge into the
    /// stop mask, so a tick where both axes hold becomes a single
    /// both-axes stop.
    fn apply(&self, command: TrackingCommand) {
        self.state.update(|s| {
            match command.vertical {
                VerticalDecision::Up => s.vert = VerticalMotion::Up,
                VerticalDecision::Down => s.vert = VerticalMotion::Down,
                VerticalDecision::Stop => s.stop.vertical = true,
            }
            match command.horizontal {
                HorizontalDecision::Left => s.horz = HorizontalMotion::Left,
                HorizontalDecision::Right => s.horz = HorizontalMotion::Right,
                HorizontalDecision::Stop => s.stop.horizontal = true,
            }
        });
    }
}
