//! Coarse-grained shared state for the cooperating control loops.
//!
//! One [`ControlState`] record exists per process, guarded by a single
//! mutex and injected into each loop as a [`SharedState`] handle. All
//! writers serialize on the lock; snapshots taken by a loop may be one
//! tick stale, which is an accepted design point: every decision is a
//! monotone correction that gets re-evaluated on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Lowest shutter value accepted by the capture device (microseconds).
pub const SHUTTER_MIN: u32 = 10;
/// Highest shutter value accepted by the capture device (microseconds).
pub const SHUTTER_MAX: u32 = 33_000;
/// Shutter adjustment per single step command.
pub const SHUTTER_STEP: u32 = 100;
/// Shutter adjustment per coarse step command.
pub const SHUTTER_STEP_BIG: u32 = 1_000;

/// Sensor gain steps supported by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Iso {
    Iso100,
    Iso200,
    Iso400,
    Iso800,
}

impl Iso {
    /// Numeric gain value as passed to the recorder command line.
    pub fn as_u32(self) -> u32 {
        match self {
            Iso::Iso100 => 100,
            Iso::Iso200 => 200,
            Iso::Iso400 => 400,
            Iso::Iso800 => 800,
        }
    }

    /// Advance to the next gain step, wrapping 800 back to 100.
    pub fn cycle(self) -> Self {
        match self {
            Iso::Iso100 => Iso::Iso200,
            Iso::Iso200 => Iso::Iso400,
            Iso::Iso400 => Iso::Iso800,
            Iso::Iso800 => Iso::Iso100,
        }
    }
}

/// Run phase of the program.
///
/// The transition to `Recording` happens at most once per run; nothing
/// ever returns the mode to `Preview`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Preview,
    Recording,
}

/// Commanded motion for the vertical axis (motor channel A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalMotion {
    None,
    Up,
    Down,
}

/// Commanded motion for the horizontal axis (motor channel B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HorizontalMotion {
    None,
    Left,
    Right,
}

/// Transient stop command, cleared in the same tick it is acted on.
///
/// Requesting a second axis while one is already pending merges into a
/// both-axes stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopMask {
    pub horizontal: bool,
    pub vertical: bool,
}

impl StopMask {
    /// True when no stop is pending.
    pub fn is_none(&self) -> bool {
        !self.horizontal && !self.vertical
    }

    /// True when both axes are to be stopped together.
    pub fn is_both(&self) -> bool {
        self.horizontal && self.vertical
    }

    /// Return the pending mask and clear it.
    pub fn take(&mut self) -> StopMask {
        std::mem::take(self)
    }
}

/// The single mutable record every loop reads and writes.
#[derive(Debug, Clone)]
pub struct ControlState {
    /// Sensor gain used for the next capture launch.
    pub iso: Iso,
    /// Shutter value in microseconds, always within
    /// [`SHUTTER_MIN`, `SHUTTER_MAX`].
    pub shutter: u32,
    /// Current run phase; monotonic Preview -> Recording.
    pub mode: RunMode,
    /// Consecutive tracking ticks without a detection.
    pub lost_counter: u32,
    /// Commanded vertical motion.
    pub vert: VerticalMotion,
    /// Commanded horizontal motion.
    pub horz: HorizontalMotion,
    /// Pending stop command.
    pub stop: StopMask,
    /// Current PWM duty on the vertical channel, mirrored for display.
    pub duty_a: u8,
    /// Current PWM duty on the horizontal channel, mirrored for display.
    pub duty_b: u8,
    /// One-shot request to restart the preview with current settings.
    pub refresh_requested: bool,
    /// One-shot request to rotate the recording segment early.
    pub segment_rotate_requested: bool,
}

impl ControlState {
    /// Initial state before any loop starts.
    pub fn new(iso: Iso, shutter: u32) -> Self {
        Self {
            iso,
            shutter: shutter.clamp(SHUTTER_MIN, SHUTTER_MAX),
            mode: RunMode::Preview,
            lost_counter: 0,
            vert: VerticalMotion::None,
            horz: HorizontalMotion::None,
            stop: StopMask::default(),
            duty_a: 0,
            duty_b: 0,
            refresh_requested: false,
            segment_rotate_requested: false,
        }
    }

    /// Set the shutter, clamped to the device-valid range.
    pub fn set_shutter(&mut self, value: u32) {
        self.shutter = value.clamp(SHUTTER_MIN, SHUTTER_MAX);
    }

    /// Raise the shutter by one step, saturating at the upper bound.
    pub fn shutter_up(&mut self) {
        self.set_shutter(self.shutter.saturating_add(SHUTTER_STEP));
    }

    /// Lower the shutter by one step, saturating at the lower bound.
    pub fn shutter_down(&mut self) {
        self.set_shutter(self.shutter.saturating_sub(SHUTTER_STEP));
    }

    /// Raise the shutter by one coarse step.
    pub fn shutter_up_big(&mut self) {
        self.set_shutter(self.shutter.saturating_add(SHUTTER_STEP_BIG));
    }

    /// Lower the shutter by one coarse step.
    pub fn shutter_down_big(&mut self) {
        self.set_shutter(self.shutter.saturating_sub(SHUTTER_STEP_BIG));
    }

    /// Advance the gain to the next step.
    pub fn iso_cycle(&mut self) {
        self.iso = self.iso.cycle();
    }

    /// Enter recording mode. The transition happens at most once; repeat
    /// calls are no-ops.
    pub fn begin_recording(&mut self) {
        self.mode = RunMode::Recording;
    }
}

/// Lock-free abort signal shared by every loop.
///
/// Monotonic false -> true; `raise` is idempotent and the flag is never
/// reset. Kept outside the state mutex so loops can poll it at tick top
/// without contending with writers.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the abort signal.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether abort has been raised.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to the process-wide shared state, cloned into each loop.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<ControlState>>,
    abort: AbortFlag,
}

impl SharedState {
    pub fn new(initial: ControlState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
            abort: AbortFlag::new(),
        }
    }

    /// Clone the whole record under the lock.
    ///
    /// Fields are consistent with each other at the moment of the clone
    /// but may be up to one tick stale by the time they are acted on.
    pub fn snapshot(&self) -> ControlState {
        self.inner.lock().unwrap().clone()
    }

    /// Run a closure with exclusive access to the record.
    pub fn update<R>(&self, f: impl FnOnce(&mut ControlState) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    /// The shared abort signal.
    pub fn abort(&self) -> &AbortFlag {
        &self.abort
    }

    /// Raise the abort signal.
    pub fn raise_abort(&self) {
        self.abort.raise();
    }

    /// Whether abort has been raised.
    pub fn abort_raised(&self) -> bool {
        self.abort.is_raised()
    }

    /// Request an early rotation of the current recording segment.
    pub fn request_rotate(&self) {
        self.update(|s| s.segment_rotate_requested = true);
    }

    /// Request a preview restart so updated iso/shutter take effect.
    pub fn request_refresh(&self) {
        self.update(|s| s.refresh_requested = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutter_clamps_to_device_range() {
        let mut state = ControlState::new(Iso::Iso200, 10_000);

        state.set_shutter(5);
        assert_eq!(state.shutter, SHUTTER_MIN);

        state.set_shutter(40_000);
        assert_eq!(state.shutter, SHUTTER_MAX);

        state.set_shutter(12_345);
        assert_eq!(state.shutter, 12_345);
    }

    #[test]
    fn shutter_steps_saturate() {
        let mut state = ControlState::new(Iso::Iso200, SHUTTER_MAX - 50);
        state.shutter_up();
        assert_eq!(state.shutter, SHUTTER_MAX);

        state.set_shutter(SHUTTER_MIN + 50);
        state.shutter_down();
        assert_eq!(state.shutter, SHUTTER_MIN);

        state.set_shutter(10_000);
        state.shutter_up_big();
        assert_eq!(state.shutter, 11_000);
        state.shutter_down();
        assert_eq!(state.shutter, 10_900);
    }

    #[test]
    fn iso_cycles_through_all_steps() {
        let mut iso = Iso::Iso200;
        let mut seen = vec![iso];
        for _ in 0..3 {
            iso = iso.cycle();
            seen.push(iso);
        }
        assert_eq!(
            seen,
            vec![Iso::Iso200, Iso::Iso400, Iso::Iso800, Iso::Iso100]
        );
        assert_eq!(iso.cycle(), Iso::Iso200);
    }

    #[test]
    fn recording_transition_is_monotonic() {
        let mut state = ControlState::new(Iso::Iso200, 10_000);
        assert_eq!(state.mode, RunMode::Preview);

        state.begin_recording();
        assert_eq!(state.mode, RunMode::Recording);

        // Repeat calls stay in Recording.
        state.begin_recording();
        assert_eq!(state.mode, RunMode::Recording);
    }

    #[test]
    fn stop_mask_take_clears_pending() {
        let mut mask = StopMask::default();
        mask.vertical = true;
        mask.horizontal = true;
        assert!(mask.is_both());

        let taken = mask.take();
        assert!(taken.is_both());
        assert!(mask.is_none());
    }

    #[test]
    fn abort_is_idempotent() {
        let flag = AbortFlag::new();
        assert!(!flag.is_raised());
        flag.raise();
        assert!(flag.is_raised());
        flag.raise();
        assert!(flag.is_raised());
    }

    #[test]
    fn one_shot_requests_are_visible_until_serviced() {
        let shared = SharedState::new(ControlState::new(Iso::Iso200, 10_000));
        shared.request_rotate();
        shared.request_refresh();

        let rotate = shared.update(|s| std::mem::take(&mut s.segment_rotate_requested));
        assert!(rotate);
        assert!(!shared.snapshot().segment_rotate_requested);
        assert!(shared.snapshot().refresh_requested);
    }
}
