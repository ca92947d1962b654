//! # energy-atlas
//!
//! Validated storage for two-dimensional energy map snapshots, with
//! on-demand multi-resolution pyramids.
//!
//! ## Core Contract
//!
//! 1. Only admissible shapes are stored: 2D, a side in {64, 128, 256, 512},
//!    reduced aspect ratio 1:1, 2:3 or 3:2
//! 2. Every stored map carries a metadata sidecar (entropy, gradient and
//!    energy statistics)
//! 3. Every pyramid level conserves total energy within
//!    [`CONSERVATION_TOLERANCE`]
//!
//! ## Architecture
//!
//! ```text
//! AtlasLoader → ShapeValidator → ThermodynamicMetrics → MapStore → MetadataSink
//!      ↓                                                   ↓
//! PyramidEngine (Resampler)                        MapCodec (npy / npt)
//! ```
//!
//! ## Failure Model
//!
//! - Malformed input and missing resources are returned as [`StoreError`]
//! - A conservation violation aborts the whole pyramid call
//! - Metadata graph failures are logged and never reach the caller

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod metrics;
pub mod canonical;
pub mod pyramid;
pub mod codec;
pub mod store;
pub mod batch;
pub mod sink;
pub mod loader;
pub mod config;

// Re-exports
pub use types::{
    Tensor, EnergyMap, BatchTensor, MapError,
    ShapeValidator, ShapeError, ALLOWED_DIMENSIONS, ALLOWED_ASPECT_RATIOS,
    EnergyMapMetadata, DomainStats, DomainAggregate,
};
pub use metrics::{ThermodynamicMetrics, FieldSummary};
pub use canonical::{Fingerprinter, field_fingerprint};
pub use pyramid::{Pyramid, PyramidLayer, PyramidEngine, PyramidError, Resampler, CubicResampler};
pub use codec::{MapCodec, CodecError, KeyedArchive};
pub use store::{MapStore, MapFile, StoreError, MapCache, CacheConfig, CacheStats};
pub use batch::BatchLoader;
pub use sink::{MetadataSink, SinkError, SinkOutcome, OfflineSink, InMemorySink, sync_metadata};
#[cfg(feature = "neo4j")]
pub use sink::Neo4jSink;
pub use loader::{AtlasLoader, generate_map_id};
pub use config::{AtlasConfig, GraphConfig};

/// Schema version written into every metadata sidecar as `schema_version`.
/// Increment on breaking changes to [`EnergyMapMetadata`].
pub const METADATA_SCHEMA_VERSION: &str = "1.0.0";

/// Maximum relative change of total energy allowed at any pyramid level.
pub const CONSERVATION_TOLERANCE: f64 = 0.05;

/// Scale requested when a caller does not choose one.
pub const DEFAULT_SCALE: u32 = 256;
