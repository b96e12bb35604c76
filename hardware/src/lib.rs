//! Motor drive electronics for the two-axis mount.
//!
//! The motor control loop drives everything through the [`MotorBus`]
//! trait so tests can substitute a recording mock. The production
//! implementation requests the H-bridge direction line pairs through the
//! GPIO character device and writes duty values to the kernel's sysfs PWM
//! interface; PWM waveform generation itself is the kernel's job.

pub mod bus;
pub mod gpio;
pub mod pwm;

pub use bus::{DrivePins, MotorBus, MotorChannelId};
pub use gpio::{GpioMotorBus, MotorChannelPins};
pub use pwm::SysfsPwm;
