//! Capture subprocess supervision.
//!
//! The recorder is an external program; this module owns its lifecycle:
//! launch with the current capture settings, confirm it survived its
//! startup window, retry on the known driver failure up to a bound,
//! preflight the output disk before every segment, rotate segments on a
//! deadline, and guarantee the subprocess is dead before the program
//! exits.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};
use shared::config::{CameraSettings, CaptureSettings};
use shared::error::ControlError;
use shared::frame::CropRegion;
use shared::state::{RunMode, SharedState};
use sysinfo::Disks;
use tracing::{debug, error, info, warn};

/// Settle time between launching the recorder and inspecting its health.
const SETTLE_INTERVAL: Duration = Duration::from_secs(1);
/// Consecutive failed launches tolerated before escalating to abort.
const MAX_CAPTURE_RETRIES: u32 = 100;
/// Supervisor poll interval.
const SUPERVISOR_TICK: Duration = Duration::from_millis(500);

/// Health verdict for a freshly launched capture subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureHealth {
    Healthy,
    Failed,
}

/// Black-box health probe for the capture subprocess.
pub trait HealthCheck: Send {
    fn check(&mut self) -> CaptureHealth;
}

/// Health check that scans the recorder's diagnostic log for a known
/// failure marker.
pub struct LogMarkerHealthCheck {
    log_path: PathBuf,
    marker: String,
}

impl LogMarkerHealthCheck {
    pub fn new(log_path: PathBuf, marker: String) -> Self {
        Self { log_path, marker }
    }
}

impl HealthCheck for LogMarkerHealthCheck {
    fn check(&mut self) -> CaptureHealth {
        match fs::read_to_string(&self.log_path) {
            Ok(log) if log.contains(&self.marker) => CaptureHealth::Failed,
            Ok(_) => CaptureHealth::Healthy,
            Err(e) => {
                // No log yet means the recorder has not written anything;
                // that is not a failure signal.
                debug!("recorder log not readable: {e}");
                CaptureHealth::Healthy
            }
        }
    }
}

/// Shared liveness flag for the capture subprocess.
///
/// Owned by the supervisor, read by the tracking loop's frame source.
#[derive(Debug, Clone, Default)]
pub struct CaptureStatus(Arc<AtomicBool>);

impl CaptureStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alive(&self, alive: bool) {
        self.0.store(alive, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Encode parameters snapshotted when a capture launch is built.
#[derive(Debug, Clone)]
pub struct EncodeParams {
    pub iso: u32,
    pub shutter: u32,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub framerate: u32,
}

/// The recording segment currently on disk.
#[derive(Debug)]
pub struct RecordingSegment {
    pub path: PathBuf,
    pub started: Instant,
    pub params: EncodeParams,
}

/// Recorder child handle. The process is killed when this drops, so an
/// orphaned recorder cannot survive the program.
struct RecorderProcess {
    child: Child,
}

impl RecorderProcess {
    fn spawn(command: &mut Command) -> Result<Self, ControlError> {
        let child = command.spawn().map_err(|e| {
            ControlError::HardwareInit(format!(
                "failed to launch recorder {:?}: {e}",
                command.get_program()
            ))
        })?;
        Ok(Self { child })
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("failed to kill recorder: {e}");
        }
        let _ = self.child.wait();
    }
}

impl Drop for RecorderProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Supervises the recorder subprocess for one run.
pub struct CaptureSupervisor<H: HealthCheck> {
    state: SharedState,
    camera: CameraSettings,
    capture: CaptureSettings,
    crop: CropRegion,
    health: H,
    status: CaptureStatus,
    run_dir: PathBuf,
    record_duration: Duration,
    settle_interval: Duration,
    process: Option<RecorderProcess>,
    segment: Option<RecordingSegment>,
    error_count: u32,
}

impl<H: HealthCheck> CaptureSupervisor<H> {
    pub fn new(
        state: SharedState,
        camera: CameraSettings,
        capture: CaptureSettings,
        crop: CropRegion,
        health: H,
        status: CaptureStatus,
        run_dir: PathBuf,
    ) -> Self {
        let record_duration = Duration::from_secs(capture.record_duration_secs);
        Self {
            state,
            camera,
            capture,
            crop,
            health,
            status,
            run_dir,
            record_duration,
            settle_interval: SETTLE_INTERVAL,
            process: None,
            segment: None,
            error_count: 0,
        }
    }

    /// Supervisor thread body: preview until the mode turns to recording,
    /// then keep segments rolling until abort.
    pub fn run(&mut self) {
        info!("capture supervisor started");
        if let Err(e) = self.write_run_id() {
            warn!("failed to write run identity file: {e}");
        }
        if let Err(e) = self.start_preview() {
            error!("preview start failed: {e}");
            self.state.raise_abort();
        }

        loop {
            if self.state.abort_raised() {
                break;
            }
            let snap = self.state.snapshot();
            match snap.mode {
                RunMode::Preview => {
                    let refresh = self.state.update(|s| std::mem::take(&mut s.refresh_requested));
                    if refresh {
                        info!("refreshing preview with updated capture settings");
                        if let Err(e) = self.start_preview() {
                            error!("preview refresh failed: {e}");
                            self.state.raise_abort();
                        }
                    }
                }
                RunMode::Recording => {
                    if self.segment.is_none() {
                        if let Err(e) = self.start_recording() {
                            error!("recording start failed: {e}");
                            self.state.raise_abort();
                        }
                    } else {
                        let requested = self
                            .state
                            .update(|s| std::mem::take(&mut s.segment_rotate_requested));
                        let expired = self
                            .segment
                            .as_ref()
                            .is_some_and(|seg| seg.started.elapsed() > self.record_duration);
                        if requested || expired {
                            if let Err(e) = self.rotate_segment() {
                                error!("segment rotation failed: {e}");
                                self.state.raise_abort();
                            }
                        }
                    }
                }
            }
            thread::sleep(SUPERVISOR_TICK);
        }

        self.kill_process();
        info!("capture supervisor stopped");
    }

    /// Launch the recorder in preview mode (no output file).
    pub fn start_preview(&mut self) -> Result<(), ControlError> {
        self.kill_process();
        info!("starting capture preview");
        self.launch_confirmed(None)?;
        Ok(())
    }

    /// Preflight the disk, then launch a fresh recording segment and
    /// write its metadata sidecar.
    pub fn start_recording(&mut self) -> Result<(), ControlError> {
        self.confirm_disk_space()?;
        self.kill_process();

        let timestamp = Local::now().format("%Y%m%d%H%M%S");
        let path = self.run_dir.join(format!("{timestamp}outA.h264"));
        info!("starting recording segment {}", path.display());

        let params = self.launch_confirmed(Some(&path))?;
        self.write_sidecar(&path, &params)?;
        self.segment = Some(RecordingSegment {
            path,
            started: Instant::now(),
            params,
        });
        Ok(())
    }

    /// Kill and relaunch into a fresh timestamped segment, picking up any
    /// updated iso/shutter values.
    pub fn rotate_segment(&mut self) -> Result<(), ControlError> {
        info!("rotating recording segment");
        self.start_recording()
    }

    /// Current segment, if recording.
    pub fn segment(&self) -> Option<&RecordingSegment> {
        self.segment.as_ref()
    }

    /// Reject before launch if the output filesystem cannot hold one more
    /// segment.
    pub fn confirm_disk_space(&self) -> Result<(), ControlError> {
        let required = required_segment_bytes(
            self.capture.record_duration_secs,
            self.capture.bytes_per_second,
        );
        let available = available_space_for(&self.capture.output_root);
        check_disk_space(required, available)?;
        if available < 10 * required {
            warn!("output drive is low on space: {available} bytes remaining");
        }
        Ok(())
    }

    /// Spawn the recorder and loop until a launch survives its settle
    /// window, bounded by the retry limit.
    fn launch_confirmed(&mut self, output: Option<&Path>) -> Result<EncodeParams, ControlError> {
        loop {
            let snap = self.state.snapshot();
            let params = EncodeParams {
                iso: snap.iso.as_u32(),
                shutter: snap.shutter,
                width: self.camera.width,
                height: self.camera.height,
                bitrate: self.camera.bitrate,
                framerate: self.camera.framerate,
            };

            let mut command = self.recorder_command(&params, output)?;
            debug!("launching recorder: {command:?}");
            self.process = Some(RecorderProcess::spawn(&mut command)?);

            thread::sleep(self.settle_interval);
            match self.health.check() {
                CaptureHealth::Healthy => {
                    self.error_count = 0;
                    self.status.set_alive(true);
                    return Ok(params);
                }
                CaptureHealth::Failed => {
                    self.kill_process();
                    self.error_count += 1;
                    warn!(
                        "{}",
                        ControlError::TransientCapture {
                            attempt: self.error_count
                        }
                    );
                    if self.error_count >= MAX_CAPTURE_RETRIES {
                        error!("repeated capture driver failures, giving up");
                        self.state.raise_abort();
                        return Err(ControlError::TransientCapture {
                            attempt: self.error_count,
                        });
                    }
                }
            }
        }
    }

    /// Build the recorder command line from the snapshotted parameters.
    fn recorder_command(
        &self,
        params: &EncodeParams,
        output: Option<&Path>,
    ) -> Result<Command, ControlError> {
        // Truncate the previous diagnostic log so a stale failure marker
        // cannot fail a fresh launch.
        let log = File::create(&self.capture.recorder_log)?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&self.capture.recorder_exe);
        command
            .args(["-v", "-t", "0"])
            .args(["-w", &params.width.to_string()])
            .args(["-h", &params.height.to_string()])
            .args(["-fps", &params.framerate.to_string()])
            .args(["-b", &params.bitrate.to_string()])
            .args(["-ISO", &params.iso.to_string()])
            .args(["-ss", &params.shutter.to_string()])
            .args(["--exposure", "auto"])
            .args([
                "-p",
                &format!(
                    "{},{},{},{}",
                    self.crop.x, self.crop.y, self.crop.width, self.crop.height
                ),
            ])
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(path) = output {
            command.arg("-o").arg(path);
        }
        Ok(command)
    }

    /// Append this segment's metadata block to the sidecar next to the
    /// recordings.
    fn write_sidecar(&self, recording: &Path, params: &EncodeParams) -> Result<(), ControlError> {
        let sidecar = self.run_dir.join("recording_info.txt");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sidecar)?;
        let name = recording
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(file, "File: {name}")?;
        writeln!(file, "Width: {}", params.width)?;
        writeln!(file, "Height: {}", params.height)?;
        writeln!(file, "ISO: {}", params.iso)?;
        writeln!(file, "Shutter Speed: {}", params.shutter)?;
        writeln!(file, "Bitrate: {}", params.bitrate)?;
        writeln!(file, "Framerate: {}", params.framerate)?;
        writeln!(file)?;
        Ok(())
    }

    /// Write the run identity file: which unit recorded, starting when.
    fn write_run_id(&self) -> Result<(), ControlError> {
        let unit = fs::read_to_string("/etc/machine-id")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let path = self.run_dir.join(format!("{unit}.txt"));
        let mut file = File::create(path)?;
        writeln!(file, "Unit: {unit}")?;
        writeln!(file, "UTC : {}", Utc::now().format("%Y%m%d%H%M%S"))?;
        Ok(())
    }

    fn kill_process(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
        self.status.set_alive(false);
    }
}

/// Space one segment is estimated to need on disk.
pub fn required_segment_bytes(duration_secs: u64, bytes_per_second: u64) -> u64 {
    duration_secs * bytes_per_second
}

/// Preflight rule: the next segment must fit in the available space.
pub fn check_disk_space(required: u64, available: u64) -> Result<(), ControlError> {
    if available < required {
        return Err(ControlError::DiskSpaceExhausted {
            required,
            available,
        });
    }
    Ok(())
}

/// Available bytes on the filesystem holding `path`, by longest
/// mount-point match.
pub fn available_space_for(path: &Path) -> u64 {
    let disks = Disks::new_with_refreshed_list();
    let mut best: Option<(usize, u64)> = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let len = mount.as_os_str().len();
            if best.is_none_or(|(best_len, _)| len > best_len) {
                best = Some((len, disk.available_space()));
            }
        }
    }
    best.map(|(_, available)| available).unwrap_or(0)
}

/// Create the timestamped directory this run records into.
pub fn create_run_dir(output_root: &Path) -> Result<PathBuf, ControlError> {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    let run_dir = output_root.join(timestamp.to_string());
    fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::config::Settings;
    use shared::state::{ControlState, Iso};

    struct StubHealth(CaptureHealth);

    impl HealthCheck for StubHealth {
        fn check(&mut self) -> CaptureHealth {
            self.0
        }
    }

    fn test_supervisor(
        run_dir: PathBuf,
        output_root: PathBuf,
        health: CaptureHealth,
    ) -> (CaptureSupervisor<StubHealth>, SharedState) {
        let state = SharedState::new(ControlState::new(Iso::Iso200, 10_000));
        let settings = Settings::default();
        let capture = CaptureSettings {
            recorder_exe: "true".to_string(),
            recorder_log: run_dir.join("recorder.log"),
            output_root,
            record_duration_secs: 1,
            bytes_per_second: 1,
            ..settings.capture
        };
        let supervisor = CaptureSupervisor::new(
            state.clone(),
            settings.camera,
            capture,
            settings.guidance.crop,
            StubHealth(health),
            CaptureStatus::new(),
            run_dir,
        );
        (supervisor, state)
    }

    #[test]
    fn disk_preflight_thresholds() {
        let required = required_segment_bytes(1800, 1_000_000);
        assert_eq!(required, 1_800_000_000);

        match check_disk_space(required, 1_700_000_000) {
            Err(ControlError::DiskSpaceExhausted {
                required: r,
                available: a,
            }) => {
                assert_eq!(r, 1_800_000_000);
                assert_eq!(a, 1_700_000_000);
            }
            other => panic!("expected DiskSpaceExhausted, got {other:?}"),
        }

        assert!(check_disk_space(required, 1_900_000_000).is_ok());
    }

    #[test]
    fn available_space_resolves_some_filesystem_for_root() {
        // "/" is always mounted, so any absolute path resolves.
        let _ = available_space_for(Path::new("/"));
    }

    #[test]
    fn log_marker_health_check_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("recorder.log");

        let mut check =
            LogMarkerHealthCheck::new(log_path.clone(), "mmal:".to_string());

        // Missing log is not a failure signal.
        assert_eq!(check.check(), CaptureHealth::Healthy);

        fs::write(&log_path, "starting up\nall good\n").unwrap();
        assert_eq!(check.check(), CaptureHealth::Healthy);

        fs::write(&log_path, "mmal: out of resources\n").unwrap();
        assert_eq!(check.check(), CaptureHealth::Failed);
    }

    #[test]
    fn sidecar_blocks_append_per_segment() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, _) = test_supervisor(
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            CaptureHealth::Healthy,
        );

        let params = EncodeParams {
            iso: 400,
            shutter: 12_000,
            width: 1920,
            height: 1080,
            bitrate: 8_000_000,
            framerate: 30,
        };
        supervisor
            .write_sidecar(Path::new("/tmp/20200101000000outA.h264"), &params)
            .unwrap();
        supervisor
            .write_sidecar(Path::new("/tmp/20200101003000outA.h264"), &params)
            .unwrap();

        let contents = fs::read_to_string(dir.path().join("recording_info.txt")).unwrap();
        assert_eq!(contents.matches("File: ").count(), 2);
        assert!(contents.contains("File: 20200101000000outA.h264"));
        assert!(contents.contains("Width: 1920"));
        assert!(contents.contains("Height: 1080"));
        assert!(contents.contains("ISO: 400"));
        assert!(contents.contains("Shutter Speed: 12000"));
        assert!(contents.contains("Bitrate: 8000000"));
        assert!(contents.contains("Framerate: 30"));
    }

    #[test]
    fn recording_launch_confirms_and_marks_alive() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, _) = test_supervisor(
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            CaptureHealth::Healthy,
        );
        supervisor.settle_interval = Duration::ZERO;

        supervisor.start_recording().unwrap();

        let segment = supervisor.segment().expect("segment should be set");
        let name = segment.path.file_name().unwrap().to_string_lossy();
        assert!(name.ends_with("outA.h264"));
        assert_eq!(segment.path.parent().unwrap(), dir.path());
        assert!(supervisor.status.is_alive());

        supervisor.kill_process();
        assert!(!supervisor.status.is_alive());
    }

    #[test]
    fn repeated_failures_escalate_to_abort_at_the_bound() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, state) = test_supervisor(
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            CaptureHealth::Failed,
        );
        supervisor.settle_interval = Duration::ZERO;

        match supervisor.start_preview() {
            Err(ControlError::TransientCapture { attempt }) => {
                assert_eq!(attempt, MAX_CAPTURE_RETRIES);
            }
            other => panic!("expected TransientCapture, got {other:?}"),
        }
        assert!(state.abort_raised());
        assert!(supervisor.process.is_none());
        assert!(!supervisor.status.is_alive());
    }

    #[test]
    fn rotation_picks_up_updated_capture_settings() {
        let dir = tempfile::tempdir().unwrap();
        let (mut supervisor, state) = test_supervisor(
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            CaptureHealth::Healthy,
        );
        supervisor.settle_interval = Duration::ZERO;

        supervisor.start_recording().unwrap();
        assert_eq!(supervisor.segment().unwrap().params.iso, 200);

        state.update(|s| {
            s.iso_cycle();
            s.shutter_up();
        });
        supervisor.rotate_segment().unwrap();

        let params = &supervisor.segment().unwrap().params;
        assert_eq!(params.iso, 400);
        assert_eq!(params.shutter, 10_100);
    }
}
