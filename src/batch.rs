//! Temporal windows of maps for sequence consumers.
//!
//! A window of `T` steps is taken from the sorted map files of a domain at
//! indices `0, stride, 2 * stride, ...`. The domain must hold at least
//! `window * stride` files; the unused tail of the last stride still has to
//! exist.

use crate::pyramid::PyramidEngine;
use crate::store::{MapStore, StoreError};
use crate::types::{BatchTensor, EnergyMap, EnergyMapMetadata};

/// Builds `[T, H, W]` batches from a [`MapStore`].
pub struct BatchLoader<'a> {
    store: &'a MapStore,
    engine: &'a PyramidEngine,
}

impl<'a> BatchLoader<'a> {
    /// Loader over `store`, rescaling with `engine`.
    pub fn new(store: &'a MapStore, engine: &'a PyramidEngine) -> Self {
        Self { store, engine }
    }

    /// Load `window` steps at `scale`, taking every `stride`-th file.
    ///
    /// Steps whose resolved scale differs from `scale` are resampled through
    /// the pyramid engine. Metadata is computed on the delivered field.
    pub fn load_batch(
        &self,
        domain: &str,
        window: usize,
        scale: u32,
        stride: usize,
    ) -> Result<(BatchTensor, Vec<EnergyMapMetadata>), StoreError> {
        if window == 0 {
            return Err(StoreError::InvalidArgument("window must be at least 1".to_string()));
        }
        if stride == 0 {
            return Err(StoreError::InvalidArgument("stride must be at least 1".to_string()));
        }
        let required = window
            .checked_mul(stride)
            .ok_or_else(|| StoreError::InvalidArgument("window * stride overflows".to_string()))?;

        let files = self.store.map_files(domain)?;
        if files.len() < required {
            return Err(StoreError::InsufficientFiles {
                required,
                available: files.len(),
            });
        }

        let mut maps: Vec<EnergyMap> = Vec::with_capacity(window);
        let mut metadata = Vec::with_capacity(window);

        for (index, file) in files.iter().step_by(stride).take(window).enumerate() {
            let mut map = self.store.read_map(file)?;
            if map.scale() as u32 != scale {
                map = self.engine.rescale(&map, scale)?;
            }

            if let Some(first) = maps.first() {
                if first.shape() != map.shape() {
                    return Err(StoreError::BatchShapeMismatch {
                        index,
                        expected: first.shape(),
                        found: map.shape(),
                    });
                }
            }

            let meta = EnergyMapMetadata::compute(&map, file.map_id.as_str(), domain);
            metadata.push(with_recorded_regime(self.store, meta));
            maps.push(map);
        }

        let batch = BatchTensor::stack(&maps)
            .ok_or_else(|| StoreError::InvalidArgument("empty batch".to_string()))?;

        tracing::debug!(
            domain,
            window,
            stride,
            scale,
            shape = ?batch.shape(),
            "Batch loaded"
        );
        Ok((batch, metadata))
    }
}

/// Carry regime fields over from the stored sidecar.
///
/// A missing or unreadable sidecar leaves the metadata unchanged.
pub(crate) fn with_recorded_regime(store: &MapStore, metadata: EnergyMapMetadata) -> EnergyMapMetadata {
    match store.read_metadata(&metadata.domain, &metadata.map_id) {
        Ok(Some(recorded)) => metadata.carry_regime_from(&recorded),
        Ok(None) => metadata,
        Err(e) => {
            tracing::warn!(
                domain = %metadata.domain,
                map_id = %metadata.map_id,
                error = %e,
                "Ignoring unreadable metadata sidecar"
            );
            metadata
        }
    }
}
