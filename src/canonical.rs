//! Canonical hashing for deterministic fingerprints.
//!
//! Fields are hashed from their exact IEEE-754 bit patterns in row-major
//! order, prefixed by their shape, so two fields hash equally only when they
//! are bitwise identical.
//!
//! ## Determinism Guarantees
//!
//! - Stable value order: row-major, index order
//! - Stable float format: little-endian bit patterns, no text formatting
//! - Ordered maps only: callers iterate `BTreeMap`s when hashing collections

use xxhash_rust::xxh64::Xxh64;

use crate::types::EnergyMap;

/// Seed shared by every fingerprint in the crate.
pub const FINGERPRINT_SEED: u64 = 0;

/// Streaming fingerprint builder.
pub struct Fingerprinter {
    hasher: Xxh64,
}

impl Fingerprinter {
    /// Start a new fingerprint.
    pub fn new() -> Self {
        Self {
            hasher: Xxh64::new(FINGERPRINT_SEED),
        }
    }

    /// Mix in a string, length-prefixed.
    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.write_u64(s.len() as u64);
        self.hasher.update(s.as_bytes());
        self
    }

    /// Mix in an integer.
    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.hasher.update(&v.to_le_bytes());
        self
    }

    /// Mix in a field: shape, then values.
    pub fn write_field(&mut self, field: &EnergyMap) -> &mut Self {
        self.write_u64(field.height() as u64);
        self.write_u64(field.width() as u64);
        for v in field.array().iter() {
            self.hasher.update(&v.to_bits().to_le_bytes());
        }
        self
    }

    /// Finish as a raw digest.
    pub fn finish(&self) -> u64 {
        self.hasher.digest()
    }

    /// Finish as 16 lowercase hex digits.
    pub fn finish_hex(&self) -> String {
        hex::encode(self.finish().to_be_bytes())
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Fingerprint of a single field as hex.
pub fn field_fingerprint(field: &EnergyMap) -> String {
    Fingerprinter::new().write_field(field).finish_hex()
}
