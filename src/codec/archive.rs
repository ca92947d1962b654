//! Keyed tensor archives: a tar file of named `.npy` members.
//!
//! Member `energy.npy` is stored under key `energy`. Entry order is the
//! order of the members in the tar stream.

use std::io::{Cursor, Read};

use super::{npy, CodecError};
use crate::types::Tensor;

/// Keys tried, in order, when extracting the energy field.
pub const ENERGY_KEYS: [&str; 2] = ["energy", "data"];

/// An ordered set of named tensors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedArchive {
    entries: Vec<(String, Tensor)>,
}

impl KeyedArchive {
    /// Empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = tensor,
            None => self.entries.push((key, tensor)),
        }
    }

    /// Builder-style insert.
    pub fn with_entry(mut self, key: impl Into<String>, tensor: Tensor) -> Self {
        self.insert(key, tensor);
        self
    }

    /// Entry by key.
    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, t)| t)
    }

    /// Keys in archive order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The energy field: `energy`, else `data`, else the first entry.
    pub fn into_energy(mut self) -> Result<Tensor, CodecError> {
        for key in ENERGY_KEYS {
            if let Some(pos) = self.entries.iter().position(|(k, _)| k == key) {
                return Ok(self.entries.swap_remove(pos).1);
            }
        }
        if self.entries.is_empty() {
            return Err(CodecError::EmptyArchive);
        }
        Ok(self.entries.swap_remove(0).1)
    }

    /// Decode an archive from tar bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut archive = tar::Archive::new(Cursor::new(bytes));
        let mut out = Self::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path()?.to_string_lossy().into_owned();
            let key = path.strip_suffix(".npy").unwrap_or(&path).to_string();

            // Header sizes are untrusted; never reserve past the input length
            let claimed = usize::try_from(entry.size()).unwrap_or(usize::MAX);
            let mut buf = Vec::with_capacity(claimed.min(bytes.len()));
            entry.read_to_end(&mut buf)?;
            out.insert(key, npy::decode(&buf)?);
        }

        Ok(out)
    }

    /// Encode as a tar stream of `.npy` members.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut builder = tar::Builder::new(Vec::new());
        for (key, tensor) in &self.entries {
            let payload = npy::encode(tensor);
            let mut header = tar::Header::new_gnu();
            header.set_size(payload.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(0);
            builder.append_data(&mut header, format!("{key}.npy"), payload.as_slice())?;
        }
        Ok(builder.into_inner()?)
    }
}
