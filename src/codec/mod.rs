//! On-disk tensor formats.
//!
//! The set of formats is closed: a raw NPY tensor or a keyed archive of NPY
//! members. The codec is chosen from the file extension.

pub mod archive;
pub mod npy;

use std::path::Path;

use crate::types::{MapError, Tensor};

pub use archive::{KeyedArchive, ENERGY_KEYS};

/// Extension of raw tensor files.
pub const RAW_TENSOR_EXT: &str = "npy";

/// Extension of keyed archive files.
pub const KEYED_ARCHIVE_EXT: &str = "npt";

/// Error type for encoding and decoding tensor files.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// I/O failure while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// File does not start with the NPY magic string.
    #[error("Not an NPY file: bad magic")]
    BadMagic,
    /// NPY major version not understood.
    #[error("Unsupported NPY version {0}")]
    UnsupportedVersion(u8),
    /// Header dict could not be parsed.
    #[error("Malformed NPY header: {0}")]
    MalformedHeader(String),
    /// Element type not supported.
    #[error("Unsupported dtype '{0}'")]
    UnsupportedDtype(String),
    /// Fewer bytes than the header promises.
    #[error("Truncated tensor payload")]
    Truncated,
    /// Keyed archive has no entries.
    #[error("Keyed archive is empty")]
    EmptyArchive,
    /// File extension is not a known format.
    #[error("Unsupported map format: {0}")]
    UnsupportedFormat(String),
    /// Decoded values do not form a valid tensor.
    #[error("Invalid tensor: {0}")]
    Tensor(#[from] MapError),
}

/// The supported map file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapCodec {
    /// Single NPY tensor.
    RawTensor,
    /// Tar archive of named NPY tensors.
    KeyedArchive,
}

impl MapCodec {
    /// All codecs, in lookup priority order.
    pub const ALL: [MapCodec; 2] = [MapCodec::RawTensor, MapCodec::KeyedArchive];

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::RawTensor => RAW_TENSOR_EXT,
            Self::KeyedArchive => KEYED_ARCHIVE_EXT,
        }
    }

    /// Codec for an extension, if supported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.extension() == ext)
    }

    /// Codec for a path, by extension.
    pub fn for_path(path: &Path) -> Result<Self, CodecError> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| CodecError::UnsupportedFormat(path.display().to_string()))
    }

    /// Decode the energy tensor from bytes.
    pub fn decode(self, bytes: &[u8]) -> Result<Tensor, CodecError> {
        match self {
            Self::RawTensor => npy::decode(bytes),
            Self::KeyedArchive => KeyedArchive::decode(bytes)?.into_energy(),
        }
    }

    /// Encode a tensor; archives store it under `energy`.
    pub fn encode(self, tensor: &Tensor) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::RawTensor => Ok(npy::encode(tensor)),
            Self::KeyedArchive => KeyedArchive::new()
                .with_entry(ENERGY_KEYS[0], tensor.clone())
                .encode(),
        }
    }

    /// Read and decode a file, choosing the codec from its extension.
    pub fn read_file(path: &Path) -> Result<Tensor, CodecError> {
        let codec = Self::for_path(path)?;
        let bytes = std::fs::read(path)?;
        codec.decode(&bytes)
    }

    /// Encode and write a file.
    pub fn write_file(self, path: &Path, tensor: &Tensor) -> Result<(), CodecError> {
        std::fs::write(path, self.encode(tensor)?)?;
        Ok(())
    }
}
