//! SELENE - Steering Engine from Luminance Edges and cENtroid Evaluation
//!
//! Pure per-frame guidance logic: given the analysis of one binary mask,
//! decide how each mount axis should move so the bright target stays
//! centered. No I/O, no clocks; the tracking loop owns the schedule and
//! applies the decisions to the shared state.

pub mod config;
pub mod decision;

pub use config::GuidanceConfig;
pub use decision::{decide, HorizontalDecision, TrackingCommand, VerticalDecision};
