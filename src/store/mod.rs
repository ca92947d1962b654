//! Filesystem persistence of energy maps.
//!
//! ## Layout
//!
//! ```text
//! <data_root>/energy_maps/
//!     pyramids/                      reserved, never written
//!     <domain>/
//!         <map_id>.npy               raw tensor
//!         <map_id>.npt               keyed archive
//!         <map_id>_metadata.json     sidecar
//! ```
//!
//! File names sort lexicographically in temporal order, so the last map
//! file of a domain is its latest snapshot.

pub mod cache;
pub mod fs;

use crate::codec::CodecError;
use crate::pyramid::PyramidError;
use crate::types::{MapError, ShapeError};

pub use cache::{CacheConfig, CacheStats, CachedMap, FileStamp, MapCache};
pub use fs::{MapFile, MapStore, ENERGY_MAPS_DIR, METADATA_SUFFIX, PYRAMIDS_DIR};

/// Error type for storage-facing operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Domain directory does not exist.
    #[error("Domain not found: {0}")]
    DomainNotFound(String),
    /// No file for the requested map id, or an empty domain on a latest lookup.
    #[error("Map not found: {domain}/{map_id}")]
    MapNotFound {
        /// Domain searched.
        domain: String,
        /// Requested id, or `<latest>`.
        map_id: String,
    },
    /// Domain or map id contains disallowed characters or is reserved.
    #[error("Invalid {kind} name '{name}'")]
    InvalidName {
        /// `domain` or `map id`.
        kind: &'static str,
        /// The rejected value.
        name: String,
    },
    /// Map shape not admissible.
    #[error(transparent)]
    Shape(#[from] ShapeError),
    /// Map values invalid.
    #[error(transparent)]
    Map(#[from] MapError),
    /// Tensor file could not be read or written.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Rescaling broke energy conservation.
    #[error(transparent)]
    Pyramid(#[from] PyramidError),
    /// Filesystem failure outside the codecs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Sidecar could not be (de)serialized.
    #[error("Metadata JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Domain holds fewer files than a batch window needs.
    #[error("Insufficient files for batch: need {required}, found {available}")]
    InsufficientFiles {
        /// `window * stride`.
        required: usize,
        /// Files present.
        available: usize,
    },
    /// A numeric argument is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Batch steps resolved to different spatial shapes.
    #[error("Batch step {index} has shape {found:?}, expected {expected:?}")]
    BatchShapeMismatch {
        /// Step position in the window.
        index: usize,
        /// Shape of step 0.
        expected: [usize; 2],
        /// Shape of this step.
        found: [usize; 2],
    },
}
