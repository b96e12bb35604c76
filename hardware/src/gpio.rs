//! GPIO-backed motor bus.
//!
//! Each motor channel owns a pair of H-bridge direction lines requested
//! from the GPIO character device, plus a sysfs PWM channel for its duty.

use anyhow::{Context, Result};
use gpiod::{Chip, Lines, Options, Output};
use tracing::info;

use crate::bus::{DrivePins, MotorBus, MotorChannelId};
use crate::pwm::SysfsPwm;

/// Direction line offsets for one motor channel.
#[derive(Debug, Clone, Copy)]
pub struct MotorChannelPins {
    pub pin1: u32,
    pub pin2: u32,
}

struct GpioChannel {
    lines: Lines<Output>,
    pwm: SysfsPwm,
}

/// Production [`MotorBus`] over gpiod lines and kernel PWM.
pub struct GpioMotorBus {
    channel_a: GpioChannel,
    channel_b: GpioChannel,
    max_duty: u8,
}

impl GpioMotorBus {
    /// Open the GPIO chip, request both direction line pairs and take the
    /// PWM channels.
    ///
    /// Direction pins start high (braked), matching the idle state the
    /// drive electronics expect at power-up.
    pub fn open(
        chip_name: &str,
        a_pins: MotorChannelPins,
        b_pins: MotorChannelPins,
        pwm_a: SysfsPwm,
        pwm_b: SysfsPwm,
        max_duty: u8,
    ) -> Result<Self> {
        let chip = Chip::new(chip_name)
            .with_context(|| format!("failed to open GPIO chip '{chip_name}'"))?;

        let request_pair = |pins: MotorChannelPins, consumer: &str| -> Result<Lines<Output>> {
            let options = Options::output([pins.pin1, pins.pin2])
                .values([true, true])
                .consumer(consumer);
            chip.request_lines(options)
                .with_context(|| format!("failed to request GPIO lines {pins:?}"))
        };

        let lines_a = request_pair(a_pins, "mount-motor-a")?;
        let lines_b = request_pair(b_pins, "mount-motor-b")?;

        info!("motor GPIO ready on {chip_name}: A {a_pins:?}, B {b_pins:?}");

        Ok(Self {
            channel_a: GpioChannel {
                lines: lines_a,
                pwm: pwm_a,
            },
            channel_b: GpioChannel {
                lines: lines_b,
                pwm: pwm_b,
            },
            max_duty,
        })
    }

    fn channel(&mut self, id: MotorChannelId) -> &mut GpioChannel {
        match id {
            MotorChannelId::A => &mut self.channel_a,
            MotorChannelId::B => &mut self.channel_b,
        }
    }
}

impl MotorBus for GpioMotorBus {
    fn set_direction(&mut self, channel: MotorChannelId, drive: DrivePins) -> Result<()> {
        let (pin1, pin2) = drive.levels();
        self.channel(channel)
            .lines
            .set_values([pin1, pin2])
            .with_context(|| format!("failed to set direction pins on channel {channel:?}"))
    }

    fn write_duty(&mut self, channel: MotorChannelId, duty: u8) -> Result<()> {
        let full_scale = self.max_duty;
        self.channel(channel).pwm.write_percent(duty, full_scale)
    }
}
