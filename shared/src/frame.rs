//! Raw frames from the capture source and the crop geometry applied
//! before analysis.

use serde::{Deserialize, Serialize};

/// A packed, row-major RGB8 frame as delivered by the capture source.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: usize,
    pub height: usize,
    /// `width * height * 3` bytes, R then G then B per pixel.
    pub data: Vec<u8>,
}

impl RgbFrame {
    /// Wrap a raw buffer, checking that its length matches the dimensions.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, String> {
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(format!(
                "frame buffer length {} does not match {width}x{height} RGB ({expected})",
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// RGB triple at pixel coordinates, row-major.
    pub fn pixel(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let i = (y * self.width + x) * 3;
        (self.data[i], self.data[i + 1], self.data[i + 2])
    }
}

/// Crop rectangle matching the on-screen preview window.
///
/// The tracking loop only ever analyses this region; the rest of the
/// captured frame belongs to the surrounding display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl CropRegion {
    /// Shrink the region so it fits entirely within a frame of the given
    /// dimensions.
    pub fn clamped(&self, frame_width: usize, frame_height: usize) -> CropRegion {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        CropRegion {
            x,
            y,
            width: self.width.min(frame_width - x),
            height: self.height.min(frame_height - y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_is_validated() {
        assert!(RgbFrame::new(4, 4, vec![0; 4 * 4 * 3]).is_ok());
        assert!(RgbFrame::new(4, 4, vec![0; 10]).is_err());
    }

    #[test]
    fn crop_clamps_to_frame_bounds() {
        let crop = CropRegion {
            x: 100,
            y: 50,
            width: 200,
            height: 200,
        };
        let clamped = crop.clamped(150, 120);
        assert_eq!(clamped.x, 100);
        assert_eq!(clamped.y, 50);
        assert_eq!(clamped.width, 50);
        assert_eq!(clamped.height, 70);

        // Origin beyond the frame collapses to an empty region.
        let outside = CropRegion {
            x: 300,
            y: 300,
            width: 10,
            height: 10,
        };
        let clamped = outside.clamped(150, 120);
        assert_eq!(clamped.width, 0);
        assert_eq!(clamped.height, 0);
    }
}
