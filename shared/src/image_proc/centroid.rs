//! Mask analysis: border-line counts and centroid of the detected target.
//!
//! The guidance policy needs two things from a binary mask: how much of
//! the target touches each border line of the crop, and where its center
//! of mass sits. Both are pure functions of the mask.

use ndarray::ArrayView2;

/// Aggregated measurements over one binary mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskAnalysis {
    /// Sum of the column indices of all `true` pixels.
    pub sum_x: u64,
    /// Sum of the row indices of all `true` pixels.
    pub sum_y: u64,
    /// Number of `true` pixels.
    pub count: u64,
    /// `true` pixels on the top border row.
    pub top_edge: u32,
    /// `true` pixels on the bottom border row.
    pub bottom_edge: u32,
    /// `true` pixels on the left border column.
    pub left_edge: u32,
    /// `true` pixels on the right border column.
    pub right_edge: u32,
}

impl MaskAnalysis {
    /// True when the mask contained no target pixels at all.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean (x, y) of the `true` pixels, or `None` for an empty mask.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.count == 0 {
            return None;
        }
        Some((
            self.sum_x as f64 / self.count as f64,
            self.sum_y as f64 / self.count as f64,
        ))
    }
}

/// Count border-line pixels and accumulate the centroid sums in one pass.
pub fn analyze_mask(mask: &ArrayView2<bool>) -> MaskAnalysis {
    let (height, width) = mask.dim();

    let mut analysis = MaskAnalysis {
        sum_x: 0,
        sum_y: 0,
        count: 0,
        top_edge: 0,
        bottom_edge: 0,
        left_edge: 0,
        right_edge: 0,
    };

    for ((row, col), &on) in mask.indexed_iter() {
        if !on {
            continue;
        }
        analysis.sum_x += col as u64;
        analysis.sum_y += row as u64;
        analysis.count += 1;

        if row == 0 {
            analysis.top_edge += 1;
        }
        if row + 1 == height {
            analysis.bottom_edge += 1;
        }
        if col == 0 {
            analysis.left_edge += 1;
        }
        if col + 1 == width {
            analysis.right_edge += 1;
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn empty_mask_has_no_centroid() {
        let mask = Array2::from_elem((5, 5), false);
        let analysis = analyze_mask(&mask.view());
        assert!(analysis.is_empty());
        assert_eq!(analysis.centroid(), None);
        assert_eq!(analysis.top_edge, 0);
    }

    #[test]
    fn single_pixel_centroid() {
        let mut mask = Array2::from_elem((5, 7), false);
        mask[[2, 4]] = true;

        let analysis = analyze_mask(&mask.view());
        assert_eq!(analysis.count, 1);
        let (x, y) = analysis.centroid().unwrap();
        assert_relative_eq!(x, 4.0);
        assert_relative_eq!(y, 2.0);
    }

    #[test]
    fn block_centroid_is_its_center() {
        let mut mask = Array2::from_elem((9, 9), false);
        for row in 3..6 {
            for col in 3..6 {
                mask[[row, col]] = true;
            }
        }

        let analysis = analyze_mask(&mask.view());
        assert_eq!(analysis.count, 9);
        let (x, y) = analysis.centroid().unwrap();
        assert_relative_eq!(x, 4.0);
        assert_relative_eq!(y, 4.0);
    }

    #[test]
    fn edge_counts_cover_all_four_borders() {
        let mut mask = Array2::from_elem((4, 6), false);
        // Full top row, single pixels on the other borders.
        for col in 0..6 {
            mask[[0, col]] = true;
        }
        mask[[3, 2]] = true;
        mask[[2, 0]] = true;
        mask[[1, 5]] = true;

        let analysis = analyze_mask(&mask.view());
        assert_eq!(analysis.top_edge, 6);
        assert_eq!(analysis.bottom_edge, 1);
        // Top row corners also sit on the side borders.
        assert_eq!(analysis.left_edge, 2);
        assert_eq!(analysis.right_edge, 2);
    }

    #[test]
    fn analysis_is_a_pure_function_of_the_mask() {
        let mut mask = Array2::from_elem((6, 6), false);
        mask[[1, 1]] = true;
        mask[[4, 5]] = true;
        mask[[0, 3]] = true;

        let first = analyze_mask(&mask.view());
        let second = analyze_mask(&mask.view());
        assert_eq!(first, second);
    }
}
