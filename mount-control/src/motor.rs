//! Motor control loop.
//!
//! Runs on a fixed short tick and applies whatever the shared state
//! instructs: pending stops first, then vertical motion, then horizontal
//! motion with loose-wheel backlash compensation. The loop itself never
//! fails; drive electronics errors are logged and the next tick tries
//! again.

use std::thread;
use std::time::{Duration, Instant};

use hardware::{DrivePins, MotorBus, MotorChannelId};
use shared::config::MotorSettings;
use shared::state::{HorizontalMotion, RunMode, SharedState, StopMask, VerticalMotion};
use tracing::{debug, info, warn};

/// Tick interval for the motor loop.
pub const MOTOR_TICK: Duration = Duration::from_millis(50);
/// Sleep between PWM writes while ramping both channels down together.
const BOTH_STOP_STEP: Duration = Duration::from_micros(5);
/// Sleep between PWM writes while ramping a single channel down.
const SINGLE_STOP_STEP: Duration = Duration::from_micros(10);
/// Duty level a stop ramp drops to immediately before stepping to zero.
const STOP_RAMP_KNEE: u8 = 10;

/// The motor control loop and its per-channel ramp state.
pub struct MotorControlLoop<B: MotorBus> {
    bus: B,
    state: SharedState,
    min_duty: u8,
    max_duty: u8,
    loose_wheel: Duration,
    duty_a: u8,
    duty_b: u8,
    ramp_flip_a: bool,
    ramp_flip_b: bool,
    /// Last commanded horizontal direction, for reversal detection.
    last_horz: Option<HorizontalMotion>,
    /// When the in-progress horizontal reversal started.
    reversal_at: Option<Instant>,
}

impl<B: MotorBus> MotorControlLoop<B> {
    pub fn new(bus: B, state: SharedState, settings: &MotorSettings) -> Self {
        Self {
            bus,
            state,
            min_duty: settings.min_duty,
            max_duty: settings.max_duty,
            loose_wheel: Duration::from_secs_f64(settings.loose_wheel_duration_secs),
            duty_a: 0,
            duty_b: 0,
            ramp_flip_a: false,
            ramp_flip_b: false,
            last_horz: None,
            reversal_at: None,
        }
    }

    /// Current duty on the vertical channel.
    pub fn duty_a(&self) -> u8 {
        self.duty_a
    }

    /// Current duty on the horizontal channel.
    pub fn duty_b(&self) -> u8 {
        self.duty_b
    }

    /// Run until abort, then brake out.
    pub fn run(&mut self) {
        info!("motor control loop started");
        loop {
            if self.state.abort_raised() {
                break;
            }
            self.tick(Instant::now());
            thread::sleep(MOTOR_TICK);
        }
        self.final_stop();
        info!("motor control loop stopped");
    }

    /// One control tick. `now` feeds the backlash timer.
    pub fn tick(&mut self, now: Instant) {
        // Stops zero the corresponding direction commands before the ramp
        // so a queued motion does not immediately restart the axis.
        let stop = self.state.update(|s| {
            let stop = s.stop.take();
            if stop.vertical {
                s.vert = VerticalMotion::None;
            }
            if stop.horizontal {
                s.horz = HorizontalMotion::None;
            }
            stop
        });
        self.apply_stop(stop);

        let snap = self.state.snapshot();
        self.apply_vertical(snap.vert, snap.mode);
        self.apply_horizontal(snap.horz, snap.mode, now);

        let (duty_a, duty_b) = (self.duty_a, self.duty_b);
        self.state.update(|s| {
            s.duty_a = duty_a;
            s.duty_b = duty_b;
        });
    }

    fn apply_stop(&mut self, stop: StopMask) {
        if stop.is_none() {
            return;
        }
        if stop.is_both() {
            debug!("stopping both motors");
            while self.duty_a > 0 || self.duty_b > 0 {
                self.duty_a = stop_step(self.duty_a);
                self.duty_b = stop_step(self.duty_b);
                self.write_duty(MotorChannelId::A, self.duty_a);
                self.write_duty(MotorChannelId::B, self.duty_b);
                thread::sleep(BOTH_STOP_STEP);
            }
            self.set_direction(MotorChannelId::A, DrivePins::Brake);
            self.set_direction(MotorChannelId::B, DrivePins::Brake);
        } else if stop.vertical {
            debug!("stopping vertical motor (A)");
            self.stop_single(MotorChannelId::A);
        } else {
            debug!("stopping horizontal motor (B)");
            self.stop_single(MotorChannelId::B);
        }
    }

    fn stop_single(&mut self, channel: MotorChannelId) {
        while self.duty_of(channel) > 0 {
            let duty = self.duty_of(channel) - 1;
            self.set_duty_of(channel, duty);
            self.write_duty(channel, duty);
            thread::sleep(SINGLE_STOP_STEP);
        }
        self.set_direction(channel, DrivePins::Released);
    }

    fn apply_vertical(&mut self, motion: VerticalMotion, mode: RunMode) {
        let drive = match motion {
            VerticalMotion::None => return,
            VerticalMotion::Up => DrivePins::Forward,
            VerticalMotion::Down => DrivePins::Reverse,
        };
        self.set_direction(MotorChannelId::A, drive);
        self.duty_a = self.ramped(MotorChannelId::A, mode);
        self.write_duty(MotorChannelId::A, self.duty_a);
    }

    fn apply_horizontal(&mut self, motion: HorizontalMotion, mode: RunMode, now: Instant) {
        let drive = match motion {
            HorizontalMotion::None => return,
            HorizontalMotion::Left => DrivePins::Forward,
            HorizontalMotion::Right => DrivePins::Reverse,
        };
        self.set_direction(MotorChannelId::B, drive);
        let mut duty = self.ramped(MotorChannelId::B, mode);

        match self.last_horz {
            Some(prev) if prev != motion => {
                // Reversal: the gear train has to take up its backlash
                // before the axis produces net motion, so run at full
                // drive until the loose-wheel window elapses.
                let started = *self.reversal_at.get_or_insert(now);
                if now.duration_since(started) > self.loose_wheel {
                    duty = self.min_duty;
                    self.last_horz = Some(motion);
                    self.reversal_at = None;
                    info!("loose wheel maneuver complete");
                } else {
                    duty = self.max_duty;
                    debug!("running in loose wheel mode");
                }
            }
            _ => {
                self.last_horz = Some(motion);
                self.reversal_at = None;
            }
        }

        self.duty_b = duty;
        self.write_duty(MotorChannelId::B, duty);
    }

    /// Next duty for a commanded channel: manual preview wants immediate
    /// full response, recording ramps up gently.
    fn ramped(&mut self, channel: MotorChannelId, mode: RunMode) -> u8 {
        if mode == RunMode::Preview {
            return self.max_duty;
        }
        let (min, max) = (self.min_duty, self.max_duty);
        let (duty, flip) = match channel {
            MotorChannelId::A => (self.duty_a, &mut self.ramp_flip_a),
            MotorChannelId::B => (self.duty_b, &mut self.ramp_flip_b),
        };
        if duty < min {
            return min;
        }
        // Rate-limited ramp: one duty step every second tick.
        *flip = !*flip;
        if *flip && duty < max {
            duty + 1
        } else {
            duty
        }
    }

    /// Terminal action on abort: ramp everything to zero and let both
    /// axes coast, regardless of any in-progress backlash maneuver.
    pub fn final_stop(&mut self) {
        info!("stopping motors to end run");
        while self.duty_a > 0 || self.duty_b > 0 {
            self.duty_a = stop_step(self.duty_a);
            self.duty_b = stop_step(self.duty_b);
            self.write_duty(MotorChannelId::A, self.duty_a);
            self.write_duty(MotorChannelId::B, self.duty_b);
            thread::sleep(BOTH_STOP_STEP);
        }
        self.write_duty(MotorChannelId::A, 0);
        self.write_duty(MotorChannelId::B, 0);
        self.set_direction(MotorChannelId::A, DrivePins::Released);
        self.set_direction(MotorChannelId::B, DrivePins::Released);

        let (duty_a, duty_b) = (self.duty_a, self.duty_b);
        self.state.update(|s| {
            s.duty_a = duty_a;
            s.duty_b = duty_b;
        });
    }

    fn duty_of(&self, channel: MotorChannelId) -> u8 {
        match channel {
            MotorChannelId::A => self.duty_a,
            MotorChannelId::B => self.duty_b,
        }
    }

    fn set_duty_of(&mut self, channel: MotorChannelId, duty: u8) {
        match channel {
            MotorChannelId::A => self.duty_a = duty,
            MotorChannelId::B => self.duty_b = duty,
        }
    }

    fn set_direction(&mut self, channel: MotorChannelId, drive: DrivePins) {
        if let Err(e) = self.bus.set_direction(channel, drive) {
            warn!("failed to set direction pins on {channel:?}: {e:#}");
        }
    }

    fn write_duty(&mut self, channel: MotorChannelId, duty: u8) {
        if let Err(e) = self.bus.write_duty(channel, duty) {
            warn!("failed to write duty on {channel:?}: {e:#}");
        }
    }
}

/// One step of the stop ramp: anything above the knee drops straight to
/// it, below the knee the duty walks down one at a time.
fn stop_step(duty: u8) -> u8 {
    if duty > STOP_RAMP_KNEE {
        STOP_RAMP_KNEE
    } else {
        duty.saturating_sub(1)
    }
}
