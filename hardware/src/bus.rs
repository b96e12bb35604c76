use anyhow::Result;

/// Motor channel selector. A drives the vertical axis, B the horizontal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorChannelId {
    A,
    B,
}

/// H-bridge direction pin pair states.
///
/// `Forward` maps to Up on channel A and Left on channel B; `Reverse` to
/// Down and Right. `Brake` drives both pins high, `Released` lets the
/// axis coast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrivePins {
    Forward,
    Reverse,
    Brake,
    Released,
}

impl DrivePins {
    /// Pin levels (pin1, pin2) for this drive state.
    pub fn levels(self) -> (bool, bool) {
        match self {
            DrivePins::Forward => (false, true),
            DrivePins::Reverse => (true, false),
            DrivePins::Brake => (true, true),
            DrivePins::Released => (false, false),
        }
    }
}

/// Seam between the motor control loop and the drive electronics.
pub trait MotorBus: Send {
    /// Set the direction pin pair of one channel.
    fn set_direction(&mut self, channel: MotorChannelId, drive: DrivePins) -> Result<()>;

    /// Write a PWM duty value (percent of full drive) to one channel.
    fn write_duty(&mut self, channel: MotorChannelId, duty: u8) -> Result<()>;
}
