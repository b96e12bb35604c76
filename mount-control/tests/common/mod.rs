//! Shared helpers for the control-loop integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use hardware::{DrivePins, MotorBus, MotorChannelId};
use shared::frame::RgbFrame;
use shared::state::{ControlState, Iso, SharedState};

/// One write the motor loop issued to the drive electronics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Direction(MotorChannelId, DrivePins),
    Duty(MotorChannelId, u8),
}

pub type BusLog = Arc<Mutex<Vec<BusEvent>>>;

/// Motor bus that records every write for inspection.
pub struct MockBus {
    events: BusLog,
}

impl MockBus {
    pub fn new() -> (Self, BusLog) {
        let events: BusLog = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: events.clone(),
            },
            events,
        )
    }
}

impl MotorBus for MockBus {
    fn set_direction(&mut self, channel: MotorChannelId, drive: DrivePins) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(BusEvent::Direction(channel, drive));
        Ok(())
    }

    fn write_duty(&mut self, channel: MotorChannelId, duty: u8) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(BusEvent::Duty(channel, duty));
        Ok(())
    }
}

pub fn test_state() -> SharedState {
    SharedState::new(ControlState::new(Iso::Iso200, 10_000))
}

/// Black frame of the given dimensions.
pub fn dark_frame(width: usize, height: usize) -> RgbFrame {
    RgbFrame::new(width, height, vec![0; width * height * 3]).unwrap()
}

/// Black frame with a white square blob centered at (cx, cy).
pub fn frame_with_blob(
    width: usize,
    height: usize,
    cx: usize,
    cy: usize,
    radius: usize,
) -> RgbFrame {
    let mut frame = dark_frame(width, height);
    for y in cy.saturating_sub(radius)..(cy + radius + 1).min(height) {
        for x in cx.saturating_sub(radius)..(cx + radius + 1).min(width) {
            let i = (y * width + x) * 3;
            frame.data[i] = 255;
            frame.data[i + 1] = 255;
            frame.data[i + 2] = 255;
        }
    }
    frame
}
