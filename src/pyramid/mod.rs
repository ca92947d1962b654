//! Multi-resolution energy pyramids.
//!
//! A pyramid holds resampled copies of one source field at several target
//! scales, each renormalized so its total energy matches the source and
//! each carrying its own gradients. Pyramids live in memory only.
//!
//! ## Conservation Contract
//!
//! For every generated scale `s`:
//!
//! ```text
//! |Σ layer(s) − Σ source| / |Σ source| ≤ CONSERVATION_TOLERANCE
//! ```
//!
//! A single violating scale fails the whole computation.

pub mod resample;

use std::collections::BTreeMap;

use crate::canonical::Fingerprinter;
use crate::metrics::{ThermodynamicMetrics, ENTROPY_EPSILON};
use crate::types::EnergyMap;
use crate::CONSERVATION_TOLERANCE;

pub use resample::{CubicResampler, Resampler};

/// Error type for pyramid computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PyramidError {
    /// Total energy drifted beyond tolerance at one scale.
    #[error(
        "Thermodynamic violation at scale {scale}: energy ratio {ratio:.6} exceeds tolerance {tolerance}"
    )]
    ThermodynamicViolation {
        /// Offending target scale.
        scale: u32,
        /// Observed `|Σscaled − Σoriginal| / |Σoriginal|`.
        ratio: f64,
        /// Tolerance in force.
        tolerance: f64,
    },
    /// A target scale of zero was requested.
    #[error("Target scale must be positive")]
    ZeroScale,
}

/// One pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidLayer {
    /// Renormalized energy field.
    pub energy: EnergyMap,
    /// Derivative along columns.
    pub grad_x: EnergyMap,
    /// Derivative along rows.
    pub grad_y: EnergyMap,
    /// `sqrt(grad_x² + grad_y²)`.
    pub grad_magnitude: EnergyMap,
}

/// Pyramid layers keyed by target scale.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pyramid {
    layers: BTreeMap<u32, PyramidLayer>,
}

impl Pyramid {
    /// Layer at `scale`.
    pub fn get(&self, scale: u32) -> Option<&PyramidLayer> {
        self.layers.get(&scale)
    }

    /// Scales present, ascending.
    pub fn scales(&self) -> Vec<u32> {
        self.layers.keys().copied().collect()
    }

    /// Iterate `(scale, layer)` ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PyramidLayer)> {
        self.layers.iter().map(|(s, l)| (*s, l))
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no layers were generated.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Remove and return one layer.
    pub fn take(&mut self, scale: u32) -> Option<PyramidLayer> {
        self.layers.remove(&scale)
    }

    /// Deterministic content fingerprint over scales and all layer fields.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprinter::new();
        for (scale, layer) in &self.layers {
            fp.write_u64(u64::from(*scale))
                .write_field(&layer.energy)
                .write_field(&layer.grad_x)
                .write_field(&layer.grad_y)
                .write_field(&layer.grad_magnitude);
        }
        fp.finish_hex()
    }
}

/// Generates energy-conserving pyramids.
pub struct PyramidEngine {
    resampler: Box<dyn Resampler>,
    tolerance: f64,
}

impl PyramidEngine {
    /// Engine with cubic B-spline resampling.
    pub fn new() -> Self {
        Self::with_resampler(Box::new(CubicResampler))
    }

    /// Engine with a custom resampler.
    pub fn with_resampler(resampler: Box<dyn Resampler>) -> Self {
        Self {
            resampler,
            tolerance: CONSERVATION_TOLERANCE,
        }
    }

    /// Tolerance applied to every scale.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Compute one layer per requested scale.
    ///
    /// Duplicate scales collapse. Fails fast on the first scale that breaks
    /// energy conservation; no partial pyramid is returned.
    pub fn precompute_pyramids(
        &self,
        map: &EnergyMap,
        target_scales: &[u32],
    ) -> Result<Pyramid, PyramidError> {
        let original_total = map.total();
        let source_scale = map.scale().max(1) as f64;
        let mut layers = BTreeMap::new();

        for &scale in target_scales {
            if scale == 0 {
                return Err(PyramidError::ZeroScale);
            }
            if layers.contains_key(&scale) {
                continue;
            }

            let factor = f64::from(scale) / source_scale;
            let mut energy = if factor == 1.0 {
                map.clone()
            } else {
                let height = scaled_len(map.height(), factor);
                let width = scaled_len(map.width(), factor);
                self.resampler.resample(map, height, width)
            };

            let scaled_total = energy.total();
            energy.scale_in_place(original_total / scaled_total.max(ENTROPY_EPSILON));

            let (grad_x, grad_y) = ThermodynamicMetrics::gradients(&energy);
            let grad_magnitude = ThermodynamicMetrics::magnitude(&grad_x, &grad_y);

            let ratio = (energy.total() - original_total).abs()
                / original_total.abs().max(ENTROPY_EPSILON);
            if ratio.is_nan() || ratio > self.tolerance {
                tracing::error!(
                    scale,
                    ratio,
                    tolerance = self.tolerance,
                    resampler = self.resampler.name(),
                    "Energy conservation violated during pyramid computation"
                );
                return Err(PyramidError::ThermodynamicViolation {
                    scale,
                    ratio,
                    tolerance: self.tolerance,
                });
            }

            tracing::debug!(
                scale,
                height = energy.height(),
                width = energy.width(),
                ratio,
                "Pyramid layer computed"
            );

            layers.insert(scale, PyramidLayer { energy, grad_x, grad_y, grad_magnitude });
        }

        Ok(Pyramid { layers })
    }

    /// Energy field of a single rescaled level.
    pub fn rescale(&self, map: &EnergyMap, scale: u32) -> Result<EnergyMap, PyramidError> {
        let mut pyramid = self.precompute_pyramids(map, &[scale])?;
        pyramid
            .take(scale)
            .map(|layer| layer.energy)
            .ok_or(PyramidError::ZeroScale)
    }
}

impl Default for PyramidEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn scaled_len(len: usize, factor: f64) -> usize {
    ((len as f64 * factor).round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resampler that loses all energy.
    struct DrainResampler;

    impl Resampler for DrainResampler {
        fn resample(&self, _field: &EnergyMap, height: usize, width: usize) -> EnergyMap {
            EnergyMap::filled(height, width, 0.0)
        }

        fn name(&self) -> &'static str {
            "drain"
        }
    }

    fn test_field() -> EnergyMap {
        EnergyMap::from_fn(128, 128, |r, c| {
            1.0 + ((r as f64) * 0.1).sin().abs() + ((c as f64) * 0.07).cos().abs()
        })
    }

    #[test]
    fn test_pyramid_conserves_energy() {
        let map = test_field();
        let pyramid = PyramidEngine::new()
            .precompute_pyramids(&map, &[64, 128, 256])
            .unwrap();

        assert_eq!(pyramid.scales(), vec![64, 128, 256]);
        let total = map.total();
        for (scale, layer) in pyramid.iter() {
            let ratio = (layer.energy.total() - total).abs() / total;
            assert!(ratio <= CONSERVATION_TOLERANCE, "scale {scale}: {ratio}");
            assert_eq!(layer.energy.scale(), scale as usize);
        }
    }

    #[test]
    fn test_identity_scale_copies_field() {
        let map = test_field();
        let pyramid = PyramidEngine::new().precompute_pyramids(&map, &[128]).unwrap();
        let layer = pyramid.get(128).unwrap();
        assert!(layer.energy.max_abs_diff(&map).unwrap() < 1e-9);
    }

    #[test]
    fn test_non_square_layer_shape() {
        let map = EnergyMap::filled(64, 96, 1.0);
        let pyramid = PyramidEngine::new().precompute_pyramids(&map, &[64, 256]).unwrap();
        assert_eq!(pyramid.get(64).unwrap().energy.shape(), [43, 64]);
        assert_eq!(pyramid.get(256).unwrap().energy.shape(), [171, 256]);
    }

    #[test]
    fn test_broken_resampler_raises_violation() {
        let engine = PyramidEngine::with_resampler(Box::new(DrainResampler));
        let err = engine.precompute_pyramids(&test_field(), &[128, 64]).unwrap_err();
        match err {
            PyramidError::ThermodynamicViolation { scale, ratio, .. } => {
                assert_eq!(scale, 64);
                assert!((ratio - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("scale 64"));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let err = PyramidEngine::new()
            .precompute_pyramids(&test_field(), &[0])
            .unwrap_err();
        assert_eq!(err, PyramidError::ZeroScale);
    }

    #[test]
    fn test_pyramid_is_idempotent() {
        let engine = PyramidEngine::new();
        let map = test_field();
        let a = engine.precompute_pyramids(&map, &[64, 128, 256]).unwrap();
        let b = engine.precompute_pyramids(&map, &[64, 128, 256]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_zero_energy_map_passes() {
        let map = EnergyMap::filled(64, 64, 0.0);
        let pyramid = PyramidEngine::new().precompute_pyramids(&map, &[128]).unwrap();
        assert_eq!(pyramid.get(128).unwrap().energy.total(), 0.0);
    }

    #[test]
    fn test_rescale_returns_energy_only() {
        let map = test_field();
        let rescaled = PyramidEngine::new().rescale(&map, 64).unwrap();
        assert_eq!(rescaled.shape(), [64, 64]);
    }
}
