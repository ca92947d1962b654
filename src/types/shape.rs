//! Admissible tensor shapes for stored energy maps.
//!
//! A map is admissible when it is two-dimensional, at least one side comes
//! from the allowed size set, and its reduced aspect ratio is square or 2:3.

use super::tensor::Tensor;

/// Allowed side lengths: the base scales {64, 128, 256} and their doubles.
pub const ALLOWED_DIMENSIONS: [usize; 4] = [64, 128, 256, 512];

/// Allowed reduced aspect ratios `(min / g, max / g)`.
///
/// `(3, 2)` can never be produced by a `(min, max)` normalization but is kept
/// so the allow-list reads the same in both orientations.
pub const ALLOWED_ASPECT_RATIOS: [(usize, usize); 3] = [(1, 1), (2, 3), (3, 2)];

/// Reason a tensor shape was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// Not a 2D tensor.
    #[error("Energy map must be 2-dimensional, got {rank} dimension(s)")]
    WrongRank {
        /// Observed rank.
        rank: usize,
    },
    /// Neither side is an allowed size.
    #[error("Unsupported dimension {height}x{width}: neither side is one of {allowed:?}")]
    UnsupportedDimension {
        /// Rows.
        height: usize,
        /// Columns.
        width: usize,
        /// The allow-list.
        allowed: [usize; 4],
    },
    /// Reduced aspect ratio is not allowed.
    #[error("Unsupported aspect ratio {ratio:?} for {height}x{width}")]
    UnsupportedAspectRatio {
        /// Rows.
        height: usize,
        /// Columns.
        width: usize,
        /// Reduced `(min, max)` ratio.
        ratio: (usize, usize),
    },
}

/// Stateless shape checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeValidator;

impl ShapeValidator {
    /// Validate a decoded tensor.
    pub fn validate(tensor: &Tensor) -> Result<(), ShapeError> {
        Self::validate_shape(tensor.shape())
    }

    /// Validate a raw shape.
    ///
    /// Checks run in a fixed order: rank, allowed dimension, aspect ratio.
    pub fn validate_shape(shape: &[usize]) -> Result<(), ShapeError> {
        let (height, width) = match shape {
            [h, w] => (*h, *w),
            _ => return Err(ShapeError::WrongRank { rank: shape.len() }),
        };

        if !ALLOWED_DIMENSIONS.contains(&height) && !ALLOWED_DIMENSIONS.contains(&width) {
            return Err(ShapeError::UnsupportedDimension {
                height,
                width,
                allowed: ALLOWED_DIMENSIONS,
            });
        }

        let ratio = reduced_ratio(height, width);
        if !ALLOWED_ASPECT_RATIOS.contains(&ratio) {
            return Err(ShapeError::UnsupportedAspectRatio { height, width, ratio });
        }

        Ok(())
    }
}

/// `(min / g, max / g)` with `g = gcd(h, w)`.
fn reduced_ratio(h: usize, w: usize) -> (usize, usize) {
    let g = gcd(h, w).max(1);
    (h.min(w) / g, h.max(w) / g)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
