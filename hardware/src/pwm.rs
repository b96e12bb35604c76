//! Kernel sysfs PWM channel.
//!
//! Thin wrapper over `/sys/class/pwm/pwmchipN/pwmM`: export the channel,
//! program the period once, then write duty cycles as fractions of it.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

pub struct SysfsPwm {
    channel_dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    /// Export and configure one PWM channel.
    pub fn export(chip: u32, channel: u32, period_ns: u64) -> Result<Self> {
        let chip_dir = PathBuf::from(format!("/sys/class/pwm/pwmchip{chip}"));
        let channel_dir = chip_dir.join(format!("pwm{channel}"));

        if !channel_dir.exists() {
            // Re-exporting an already exported channel returns EBUSY.
            if let Err(e) = fs::write(chip_dir.join("export"), channel.to_string()) {
                if e.kind() != ErrorKind::ResourceBusy {
                    return Err(e).with_context(|| {
                        format!("failed to export PWM channel {channel} on chip {chip}")
                    });
                }
            }
        }

        fs::write(channel_dir.join("period"), period_ns.to_string())
            .with_context(|| format!("failed to set PWM period on {}", channel_dir.display()))?;
        fs::write(channel_dir.join("duty_cycle"), "0")
            .with_context(|| format!("failed to zero PWM duty on {}", channel_dir.display()))?;
        fs::write(channel_dir.join("enable"), "1")
            .with_context(|| format!("failed to enable PWM on {}", channel_dir.display()))?;

        debug!("PWM channel {} ready, period {period_ns} ns", channel_dir.display());

        Ok(Self {
            channel_dir,
            period_ns,
        })
    }

    /// Open a channel rooted at an explicit directory. Used by tests with
    /// a temporary directory standing in for sysfs.
    pub fn with_dir(channel_dir: PathBuf, period_ns: u64) -> Self {
        Self {
            channel_dir,
            period_ns,
        }
    }

    /// Write a duty value as a percentage of full drive.
    pub fn write_percent(&mut self, duty: u8, full_scale: u8) -> Result<()> {
        let duty = duty.min(full_scale);
        let duty_ns = self.period_ns * duty as u64 / full_scale as u64;
        fs::write(self.channel_dir.join("duty_cycle"), duty_ns.to_string())
            .with_context(|| format!("failed to write PWM duty on {}", self.channel_dir.display()))
    }

    /// Stop driving the channel.
    pub fn disable(&mut self) -> Result<()> {
        fs::write(self.channel_dir.join("enable"), "0")
            .with_context(|| format!("failed to disable PWM on {}", self.channel_dir.display()))
    }
}
