//! Settings file surface.
//!
//! Settings load from a TOML file at startup, before any loop starts. A
//! missing file falls back to the defaults below; a file that exists but
//! does not parse is a fatal [`ControlError::ConfigParse`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::frame::CropRegion;
use crate::state::Iso;

/// Complete settings record for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub camera: CameraSettings,
    pub guidance: GuidanceSettings,
    pub motor: MotorSettings,
    pub capture: CaptureSettings,
}

/// Capture device parameters snapshotted into each recorder launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Initial sensor gain.
    pub iso: Iso,
    /// Initial shutter value in microseconds.
    pub shutter: u32,
    /// Recorded frame width in pixels.
    pub width: u32,
    /// Recorded frame height in pixels.
    pub height: u32,
    /// Recorder frame rate.
    pub framerate: u32,
    /// Recorder bitrate in bits per second.
    pub bitrate: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            iso: Iso::Iso200,
            shutter: 10_000,
            width: 1920,
            height: 1080,
            framerate: 30,
            bitrate: 8_000_000,
        }
    }
}

/// Tracking-loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceSettings {
    /// Divisor for the horizontal edge threshold (`width / divisor`).
    pub edge_divisor_w: usize,
    /// Divisor for the vertical edge threshold (`height / divisor`).
    pub edge_divisor_h: usize,
    /// Luminance cutoff for the binary mask.
    pub bright_threshold: u8,
    /// Consecutive missed detections before tracking is declared lost.
    pub lost_thresh: u32,
    /// Tracking tick interval in milliseconds.
    pub framecheck_interval_ms: u64,
    /// Region of the captured frame occupied by the preview window.
    pub crop: CropRegion,
}

impl Default for GuidanceSettings {
    fn default() -> Self {
        Self {
            edge_divisor_w: 10,
            edge_divisor_h: 10,
            bright_threshold: crate::image_proc::DEFAULT_BRIGHT_THRESHOLD,
            lost_thresh: 30,
            framecheck_interval_ms: 50,
            crop: CropRegion {
                x: 480,
                y: 540,
                width: 960,
                height: 540,
            },
        }
    }
}

/// Motor loop and drive electronics parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorSettings {
    /// Lowest duty the ramp will settle at while recording.
    pub min_duty: u8,
    /// Full drive duty.
    pub max_duty: u8,
    /// Seconds of full drive after a horizontal direction reversal.
    pub loose_wheel_duration_secs: f64,
    /// GPIO character device for the direction lines.
    pub gpio_chip: String,
    /// Direction line offsets for channel A (vertical).
    pub a_pin1: u32,
    pub a_pin2: u32,
    /// Direction line offsets for channel B (horizontal).
    pub b_pin1: u32,
    pub b_pin2: u32,
    /// Kernel PWM chip index.
    pub pwm_chip: u32,
    /// PWM channel index for channel A.
    pub pwm_a: u32,
    /// PWM channel index for channel B.
    pub pwm_b: u32,
    /// PWM period in nanoseconds.
    pub pwm_period_ns: u64,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            min_duty: 20,
            max_duty: 100,
            loose_wheel_duration_secs: 2.0,
            gpio_chip: "gpiochip0".to_string(),
            a_pin1: 27,
            a_pin2: 22,
            b_pin1: 10,
            b_pin2: 9,
            pwm_chip: 0,
            pwm_a: 0,
            pwm_b: 1,
            pwm_period_ns: 100_000,
        }
    }
}

/// Recorder subprocess and storage parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Recorder executable.
    pub recorder_exe: String,
    /// File the recorder's diagnostics are redirected to.
    pub recorder_log: PathBuf,
    /// Marker string in the diagnostic log that signals a driver failure.
    pub failure_marker: String,
    /// Screen grabber command used by the tracking loop, first element is
    /// the executable; the output path is appended as the last argument.
    pub grabber_command: Vec<String>,
    /// Root directory recordings are written under.
    pub output_root: PathBuf,
    /// Recording segment length in seconds.
    pub record_duration_secs: u64,
    /// Estimated recording throughput, used by the disk preflight.
    pub bytes_per_second: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            recorder_exe: "raspivid".to_string(),
            recorder_log: PathBuf::from("/tmp/recorder.log"),
            failure_marker: "mmal:".to_string(),
            grabber_command: vec!["raspi2png".to_string(), "-p".to_string()],
            output_root: PathBuf::from("/media/pi/MOON1"),
            record_duration_secs: 1800,
            bytes_per_second: 1_000_000,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// A missing file yields the defaults so a bare checkout still runs;
    /// a present but malformed file is fatal.
    pub fn load(path: &Path) -> Result<Self, ControlError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ControlError::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/settings.toml")).unwrap();
        assert_eq!(settings.motor.max_duty, 100);
        assert_eq!(settings.guidance.lost_thresh, 30);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[guidance]\nlost_thresh = 45\n\n[motor]\nmin_duty = 25\n"
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.guidance.lost_thresh, 45);
        assert_eq!(settings.motor.min_duty, 25);
        // Untouched fields keep their defaults.
        assert_eq!(settings.motor.max_duty, 100);
        assert_eq!(settings.camera.framerate, 30);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[motor\nmin_duty = ").unwrap();

        match Settings::load(file.path()) {
            Err(ControlError::ConfigParse(_)) => {}
            other => panic!("expected ConfigParse, got {other:?}"),
        }
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = Settings::default();
        let serialized = toml::to_string(&settings).unwrap();
        let parsed: Settings = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.capture.record_duration_secs, 1800);
        assert_eq!(parsed.guidance.crop.width, 960);
    }
}
