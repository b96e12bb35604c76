//! Image processing for target detection.
//!
//! The capture source hands the tracking loop an RGB frame; this module
//! reduces the cropped preview region to a binary brightness mask and
//! extracts the border-line counts and centroid the guidance policy runs
//! on.

pub mod centroid;

pub use centroid::{analyze_mask, MaskAnalysis};

use ndarray::Array2;

use crate::frame::{CropRegion, RgbFrame};

/// Default luminance cutoff above which a pixel counts as target.
pub const DEFAULT_BRIGHT_THRESHOLD: u8 = 25;

/// Build the binary target mask for a cropped region of a frame.
///
/// Luminance is the standard weighted sum `L = 0.30R + 0.59G + 0.11B`;
/// pixels strictly above `threshold` are `true`. The crop must fit the
/// frame (see [`CropRegion::clamped`]).
pub fn threshold_mask(frame: &RgbFrame, crop: &CropRegion, threshold: u8) -> Array2<bool> {
    assert!(
        crop.x + crop.width <= frame.width && crop.y + crop.height <= frame.height,
        "crop region must fit within the frame"
    );

    Array2::from_shape_fn((crop.height, crop.width), |(row, col)| {
        let (r, g, b) = frame.pixel(crop.x + col, crop.y + row);
        let lum = 0.30 * r as f32 + 0.59 * g as f32 + 0.11 * b as f32;
        lum > threshold as f32
    })
}
