//! Resampling kernels for pyramid levels.
//!
//! The default kernel is cubic B-spline interpolation: each axis is
//! prefiltered into spline coefficients and then evaluated on the target
//! grid, with corner samples aligned (`x_in = x_out * (n_in - 1) / (n_out - 1)`)
//! and mirror boundaries. The two axes are processed one after the other,
//! which is exact for a tensor-product spline.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::types::EnergyMap;

/// Pole of the cubic B-spline prefilter, `sqrt(3) - 2`.
const CUBIC_POLE: f64 = -0.267_949_192_431_122_7;

/// Resizes an energy field to a target grid.
///
/// Implementations must be pure: the same input always yields the same output.
pub trait Resampler: Send + Sync {
    /// Resample `field` to `height x width`.
    fn resample(&self, field: &EnergyMap, height: usize, width: usize) -> EnergyMap;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Cubic (order 3) B-spline interpolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CubicResampler;

impl Resampler for CubicResampler {
    fn resample(&self, field: &EnergyMap, height: usize, width: usize) -> EnergyMap {
        if field.shape() == [height, width] {
            return field.clone();
        }
        // Along columns: h x w -> h x width, then along rows: -> height x width
        let wide = resample_axis(field.view(), Axis(1), width);
        EnergyMap::from_raw(resample_axis(wide.view(), Axis(0), height))
    }

    fn name(&self) -> &'static str {
        "cubic_bspline"
    }
}

/// Resample every lane of `field` along `axis` to `n_out` points.
fn resample_axis(field: ArrayView2<'_, f64>, axis: Axis, n_out: usize) -> Array2<f64> {
    let mut dim = field.raw_dim();
    dim[axis.index()] = n_out;
    let mut out = Array2::<f64>::zeros(dim);
    for (line, mut target) in field.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        target.assign(&Array1::from(resample_line(&line.to_vec(), n_out)));
    }
    out
}

/// Resample one line of samples to `n_out` points.
fn resample_line(samples: &[f64], n_out: usize) -> Vec<f64> {
    let n_in = samples.len();
    if n_in == n_out {
        return samples.to_vec();
    }
    if n_in == 1 {
        return vec![samples[0]; n_out];
    }

    let coeffs = bspline_coefficients(samples);
    let step = if n_out > 1 {
        (n_in - 1) as f64 / (n_out - 1) as f64
    } else {
        0.0
    };

    (0..n_out)
        .map(|i| evaluate(&coeffs, i as f64 * step))
        .collect()
}

/// Cubic B-spline coefficients with mirror boundary conditions.
///
/// Causal then anti-causal recursive filtering with the exact mirror
/// initialization for the causal pass.
fn bspline_coefficients(samples: &[f64]) -> Vec<f64> {
    let n = samples.len();
    let z = CUBIC_POLE;
    let gain = (1.0 - z) * (1.0 - 1.0 / z);
    let mut c: Vec<f64> = samples.iter().map(|v| v * gain).collect();

    // Causal initialization over the mirrored signal
    let mut zk = z;
    let zn = z.powi(n as i32 - 1);
    let mut z2n = zn * zn / z;
    let mut sum = c[0] + zn * c[n - 1];
    for v in c.iter().take(n - 1).skip(1) {
        sum += (zk + z2n) * v;
        zk *= z;
        z2n /= z;
    }
    c[0] = sum / (1.0 - zn * zn);

    for k in 1..n {
        c[k] += z * c[k - 1];
    }

    c[n - 1] = (z / (z * z - 1.0)) * (z * c[n - 2] + c[n - 1]);
    for k in (0..n - 1).rev() {
        c[k] = z * (c[k + 1] - c[k]);
    }

    c
}

/// Evaluate the spline defined by `coeffs` at fractional position `x`.
fn evaluate(coeffs: &[f64], x: f64) -> f64 {
    let n = coeffs.len();
    let base = x.floor();
    let t = x - base;
    let i = base as i64;

    let t2 = t * t;
    let t3 = t2 * t;
    let weights = [
        (1.0 - t).powi(3) / 6.0,
        (4.0 - 6.0 * t2 + 3.0 * t3) / 6.0,
        (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) / 6.0,
        t3 / 6.0,
    ];

    weights
        .iter()
        .enumerate()
        .map(|(k, w)| w * coeffs[mirror(i - 1 + k as i64, n)])
        .sum()
}

/// Fold an index into `0..n` by mirroring about the end samples.
fn mirror(i: i64, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as i64 - 1);
    let j = i.rem_euclid(period);
    if j >= n as i64 {
        (period - j) as usize
    } else {
        j as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spline_interpolates_samples() {
        let samples = [1.0, 4.0, 2.0, 8.0, 5.0, 7.0];
        let coeffs = bspline_coefficients(&samples);
        for (i, s) in samples.iter().enumerate() {
            let v = evaluate(&coeffs, i as f64);
            assert!((v - s).abs() < 1e-9, "sample {i}: {v} vs {s}");
        }
    }

    #[test]
    fn test_constant_line_stays_constant() {
        let out = resample_line(&[3.0; 7], 15);
        assert_eq!(out.len(), 15);
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_aligned_points_hit_samples() {
        // 8 -> 15 puts every even output exactly on an input sample
        let samples = [2.0, 9.0, 4.0, 4.0, 7.0, 1.0, 3.0, 6.0];
        let out = resample_line(&samples, 15);
        for (i, s) in samples.iter().enumerate() {
            assert!((out[2 * i] - s).abs() < 1e-9, "index {i}");
        }
    }

    #[test]
    fn test_two_sample_line() {
        let out = resample_line(&[0.0, 2.0], 3);
        assert!((out[0] - 0.0).abs() < 1e-9);
        assert!((out[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_mirror_indices() {
        assert_eq!(mirror(-1, 4), 1);
        assert_eq!(mirror(-2, 4), 2);
        assert_eq!(mirror(4, 4), 2);
        assert_eq!(mirror(5, 4), 1);
        assert_eq!(mirror(0, 1), 0);
    }

    #[test]
    fn test_cubic_resampler_output_shape() {
        let field = EnergyMap::from_fn(64, 96, |r, c| (r + c) as f64);
        let out = CubicResampler.resample(&field, 43, 64);
        assert_eq!(out.shape(), [43, 64]);
        assert!((out.get(0, 0) - 0.0).abs() < 1e-6);
        assert!((out.get(42, 63) - (63.0 + 95.0)).abs() < 1e-6);
    }
}
