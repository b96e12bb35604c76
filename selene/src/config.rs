use serde::{Deserialize, Serialize};

/// Tuning for the guidance decision policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuidanceConfig {
    /// Horizontal edge threshold is `width / edge_divisor_w` pixels.
    pub edge_divisor_w: usize,
    /// Vertical edge threshold is `height / edge_divisor_h` pixels.
    pub edge_divisor_h: usize,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            edge_divisor_w: 10,
            edge_divisor_h: 10,
        }
    }
}
