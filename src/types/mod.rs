//! Core types for the energy atlas.

pub mod tensor;
pub mod shape;
pub mod metadata;

pub use tensor::{Tensor, EnergyMap, BatchTensor, MapError};
pub use shape::{ShapeValidator, ShapeError, ALLOWED_DIMENSIONS, ALLOWED_ASPECT_RATIOS};
pub use metadata::{EnergyMapMetadata, DomainStats, DomainAggregate};
