//! Run orchestration.
//!
//! Builds the shared state, opens the motor hardware, and runs the three
//! loops on their own threads until the abort flag unwinds them. The
//! capture thread kills the recorder on its way out, and its handle is
//! joined before the program returns, so the subprocess cannot outlive
//! the run.

use std::thread;

use anyhow::{Context, Result};
use tracing::{info, warn};

use hardware::{GpioMotorBus, MotorChannelPins, SysfsPwm};
use shared::config::Settings;
use shared::state::{ControlState, SharedState};

use crate::capture::{
    self, CaptureStatus, CaptureSupervisor, LogMarkerHealthCheck,
};
use crate::grab::GrabberFrameSource;
use crate::motor::MotorControlLoop;
use crate::tracking::TrackingLoop;

/// Run one tracking session to completion.
///
/// `auto_record` skips the interactive preview phase and enters recording
/// immediately; otherwise the mode transition comes from the control
/// panel writing into the shared state.
pub fn run(settings: Settings, auto_record: bool) -> Result<()> {
    let state = SharedState::new(ControlState::new(
        settings.camera.iso,
        settings.camera.shutter,
    ));
    if auto_record {
        state.update(|s| s.begin_recording());
    }

    // Fail before any loop starts if the output drive cannot even hold
    // one segment.
    let required = capture::required_segment_bytes(
        settings.capture.record_duration_secs,
        settings.capture.bytes_per_second,
    );
    let available = capture::available_space_for(&settings.capture.output_root);
    capture::check_disk_space(required, available)?;

    let run_dir = capture::create_run_dir(&settings.capture.output_root)?;
    info!("recording into {}", run_dir.display());

    let motor_cfg = &settings.motor;
    let pwm_a = SysfsPwm::export(motor_cfg.pwm_chip, motor_cfg.pwm_a, motor_cfg.pwm_period_ns)
        .context("motor PWM init failed (channel A)")?;
    let pwm_b = SysfsPwm::export(motor_cfg.pwm_chip, motor_cfg.pwm_b, motor_cfg.pwm_period_ns)
        .context("motor PWM init failed (channel B)")?;
    let bus = GpioMotorBus::open(
        &motor_cfg.gpio_chip,
        MotorChannelPins {
            pin1: motor_cfg.a_pin1,
            pin2: motor_cfg.a_pin2,
        },
        MotorChannelPins {
            pin1: motor_cfg.b_pin1,
            pin2: motor_cfg.b_pin2,
        },
        pwm_a,
        pwm_b,
        motor_cfg.max_duty,
    )
    .context("motor GPIO init failed")?;

    let status = CaptureStatus::new();
    let health = LogMarkerHealthCheck::new(
        settings.capture.recorder_log.clone(),
        settings.capture.failure_marker.clone(),
    );
    let mut supervisor = CaptureSupervisor::new(
        state.clone(),
        settings.camera.clone(),
        settings.capture.clone(),
        settings.guidance.crop,
        health,
        status.clone(),
        run_dir,
    );

    let grabber = GrabberFrameSource::new(settings.capture.grabber_command.clone(), status)?;
    let mut tracker = TrackingLoop::new(grabber, state.clone(), &settings.guidance);
    let mut motors = MotorControlLoop::new(bus, state.clone(), &settings.motor);

    {
        let state = state.clone();
        ctrlc::set_handler(move || {
            info!("interrupt received, aborting run");
            state.raise_abort();
        })
        .context("failed to install interrupt handler")?;
    }

    let capture_handle = thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || supervisor.run())?;
    let tracking_handle = thread::Builder::new()
        .name("tracking".to_string())
        .spawn(move || tracker.run())?;
    let motor_handle = thread::Builder::new()
        .name("motor".to_string())
        .spawn(move || motors.run())?;

    // The capture thread kills the recorder on its way out; join it first
    // so the subprocess is guaranteed dead before the program exits.
    if capture_handle.join().is_err() {
        warn!("capture thread panicked");
    }
    if tracking_handle.join().is_err() {
        warn!("tracking thread panicked");
    }
    if motor_handle.join().is_err() {
        warn!("motor thread panicked");
    }

    info!("run complete");
    Ok(())
}
