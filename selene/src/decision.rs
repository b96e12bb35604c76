//! Edge-priority-then-centroid steering policy.
//!
//! Each axis is decided independently. A target touching a border line is
//! at risk of leaving the field entirely, so an edge hit always overrides
//! the centroid for that axis. Otherwise the centroid offset from center
//! steers, with a dead-zone so a well-centered target holds the mount
//! still.

use log::debug;

use shared::image_proc::MaskAnalysis;

use crate::config::GuidanceConfig;

/// Fraction of the half-height inside which the vertical axis holds.
const VERT_DEAD_ZONE: f64 = 0.2;
/// Fraction of the half-width inside which the horizontal axis holds.
///
/// Wider than the vertical dead-zone: the horizontal gear train has
/// backlash, and a reversal near center would chatter.
const HORZ_DEAD_ZONE: f64 = 0.4;

/// Vertical axis decision for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalDecision {
    Up,
    Down,
    Stop,
}

/// Horizontal axis decision for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalDecision {
    Left,
    Right,
    Stop,
}

/// Combined decision for both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingCommand {
    pub vertical: VerticalDecision,
    pub horizontal: HorizontalDecision,
}

impl TrackingCommand {
    /// True when both axes resolved to stop in the same tick.
    pub fn is_full_stop(&self) -> bool {
        self.vertical == VerticalDecision::Stop && self.horizontal == HorizontalDecision::Stop
    }
}

/// Decide both axes from one mask analysis.
///
/// Returns `None` when the mask contained no target pixels; the caller
/// maintains the lost counter in that case.
pub fn decide(
    analysis: &MaskAnalysis,
    width: usize,
    height: usize,
    config: &GuidanceConfig,
) -> Option<TrackingCommand> {
    let (mean_x, mean_y) = analysis.centroid()?;

    debug!(
        "target at ({mean_x:.1}, {mean_y:.1}), edges t:b::l:r {}:{}::{}:{}",
        analysis.top_edge, analysis.bottom_edge, analysis.left_edge, analysis.right_edge
    );

    let v_thresh = (height / config.edge_divisor_h).max(1) as u32;
    let h_thresh = (width / config.edge_divisor_w).max(1) as u32;

    let top = analysis.top_edge >= v_thresh;
    let bottom = analysis.bottom_edge >= v_thresh;
    let vertical = if top && !bottom {
        debug!("target on top edge");
        VerticalDecision::Up
    } else if bottom && !top {
        debug!("target on bottom edge");
        VerticalDecision::Down
    } else {
        let half = height as f64 / 2.0;
        let offset = mean_y - half;
        if offset.abs() > VERT_DEAD_ZONE * half {
            if offset > 0.0 {
                VerticalDecision::Down
            } else {
                VerticalDecision::Up
            }
        } else {
            VerticalDecision::Stop
        }
    };

    let left = analysis.left_edge >= h_thresh;
    let right = analysis.right_edge >= h_thresh;
    let horizontal = if left && !right {
        debug!("target on left edge");
        HorizontalDecision::Left
    } else if right && !left {
        debug!("target on right edge");
        HorizontalDecision::Right
    } else {
        let half = width as f64 / 2.0;
        let offset = mean_x - half;
        if offset.abs() > HORZ_DEAD_ZONE * half {
            if offset > 0.0 {
                HorizontalDecision::Right
            } else {
                HorizontalDecision::Left
            }
        } else {
            HorizontalDecision::Stop
        }
    };

    Some(TrackingCommand {
        vertical,
        horizontal,
    })
}
