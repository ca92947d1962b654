//! Thermodynamic field metrics.
//!
//! Entropy treats the field as an unnormalized probability mass.
//! Gradients follow the usual finite-difference convention: central
//! differences inside the grid, first-order one-sided differences on the
//! border.

use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis, Zip};

use crate::types::EnergyMap;

/// Stabilizer added to sums and probabilities before division and logarithms.
pub const ENTROPY_EPSILON: f64 = 1e-10;

/// Scalar summary of one field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSummary {
    /// Mean cell value.
    pub mean: f64,
    /// Population variance.
    pub variance: f64,
    /// Shannon entropy in nats.
    pub entropy: f64,
    /// Mean gradient magnitude.
    pub gradient_magnitude_mean: f64,
    /// Maximum gradient magnitude.
    pub gradient_magnitude_max: f64,
}

/// Stateless metric functions.
pub struct ThermodynamicMetrics;

impl ThermodynamicMetrics {
    /// Shannon entropy of the normalized field, in nats.
    pub fn entropy(map: &EnergyMap) -> f64 {
        let norm = map.total() + ENTROPY_EPSILON;
        -map.array()
            .iter()
            .map(|v| {
                let p = v / norm;
                p * (p + ENTROPY_EPSILON).ln()
            })
            .sum::<f64>()
    }

    /// Finite-difference gradients `(grad_x, grad_y)`.
    ///
    /// `grad_x` is the derivative along columns, `grad_y` along rows.
    pub fn gradients(map: &EnergyMap) -> (EnergyMap, EnergyMap) {
        let field = map.view();
        let mut gx = Array2::<f64>::zeros(field.raw_dim());
        let mut gy = Array2::<f64>::zeros(field.raw_dim());

        for (line, out) in field.lanes(Axis(1)).into_iter().zip(gx.lanes_mut(Axis(1))) {
            diff_line(line, out);
        }
        for (line, out) in field.lanes(Axis(0)).into_iter().zip(gy.lanes_mut(Axis(0))) {
            diff_line(line, out);
        }

        (EnergyMap::from_raw(gx), EnergyMap::from_raw(gy))
    }

    /// Elementwise `sqrt(gx² + gy²)`.
    pub fn magnitude(grad_x: &EnergyMap, grad_y: &EnergyMap) -> EnergyMap {
        debug_assert_eq!(grad_x.shape(), grad_y.shape());
        let mag = Zip::from(grad_x.array())
            .and(grad_y.array())
            .map_collect(|x, y| x.hypot(*y));
        EnergyMap::from_raw(mag)
    }

    /// Mean, variance, entropy and gradient-magnitude statistics.
    pub fn summarize(map: &EnergyMap) -> FieldSummary {
        let n = map.len().max(1) as f64;
        let mean = map.total() / n;
        let variance = map.array().iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        let (gx, gy) = Self::gradients(map);
        let mag = Self::magnitude(&gx, &gy);
        let gradient_magnitude_mean = mag.total() / n;
        let gradient_magnitude_max = mag.array().fold(0.0_f64, |acc, v| acc.max(*v));

        FieldSummary {
            mean,
            variance,
            entropy: Self::entropy(map),
            gradient_magnitude_mean,
            gradient_magnitude_max,
        }
    }
}

/// Derivative along one line, written into `out`.
fn diff_line(line: ArrayView1<'_, f64>, mut out: ArrayViewMut1<'_, f64>) {
    let n = line.len();
    if n < 2 {
        out.fill(0.0);
        return;
    }
    out[0] = line[1] - line[0];
    out[n - 1] = line[n - 1] - line[n - 2];
    for i in 1..n - 1 {
        out[i] = (line[i + 1] - line[i - 1]) / 2.0;
    }
}
