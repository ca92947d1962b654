//! Metadata graph sinks.
//!
//! The atlas mirrors snapshot metadata into a graph database on a best-effort
//! basis. The sink is chosen when the loader is built:
//!
//! - [`OfflineSink`]: no-op, used when no graph is configured
//! - [`InMemorySink`]: records writes, for tests
//! - `Neo4jSink`: Bolt client (feature `neo4j`)
//!
//! Sink errors are returned to the caller of [`MetadataSink::upsert_snapshot`],
//! which logs them. They never reach the storage API.

pub mod memory;

#[cfg(feature = "neo4j")]
pub mod neo4j;

use crate::types::EnergyMapMetadata;

pub use memory::InMemorySink;

#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jSink;

/// Graph node label for snapshots.
pub const SNAPSHOT_LABEL: &str = "EnergySnapshot";

/// Graph node label for domains.
pub const DOMAIN_LABEL: &str = "EnergyDomain";

/// Relationship type from a domain to its snapshots.
pub const HAS_SNAPSHOT: &str = "HAS_SNAPSHOT";

/// Error type for sink writes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// Could not reach the graph.
    #[error("Metadata graph unreachable: {0}")]
    Connection(String),
    /// The graph rejected or failed the write.
    #[error("Metadata graph write failed: {0}")]
    Write(String),
    /// The call did not finish in time.
    #[error("Metadata graph call timed out after {0} ms")]
    Timeout(u64),
}

/// What a successful upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Snapshot merged into the graph.
    Written,
    /// Nothing written (offline).
    Skipped,
}

/// Write-only interface to the metadata graph.
///
/// Implementations upsert an `EnergySnapshot` node keyed by `map_id` and,
/// when an `EnergyDomain` with the same name exists, a `HAS_SNAPSHOT`
/// relationship from it. Domains are never created here.
pub trait MetadataSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Merge the snapshot node for `metadata`.
    fn upsert_snapshot(&self, metadata: &EnergyMapMetadata) -> Result<SinkOutcome, SinkError>;
}

/// Sink that drops every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineSink;

impl MetadataSink for OfflineSink {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn upsert_snapshot(&self, _metadata: &EnergyMapMetadata) -> Result<SinkOutcome, SinkError> {
        Ok(SinkOutcome::Skipped)
    }
}

/// Push metadata to a sink and log the result.
///
/// Returns the outcome for callers that care; failures are logged at warn
/// level and reported as `None`.
pub fn sync_metadata(sink: &dyn MetadataSink, metadata: &EnergyMapMetadata) -> Option<SinkOutcome> {
    match sink.upsert_snapshot(metadata) {
        Ok(outcome) => {
            tracing::debug!(
                sink = sink.name(),
                map_id = %metadata.map_id,
                domain = %metadata.domain,
                outcome = ?outcome,
                "Metadata synced"
            );
            Some(outcome)
        }
        Err(e) => {
            tracing::warn!(
                sink = sink.name(),
                map_id = %metadata.map_id,
                domain = %metadata.domain,
                error = %e,
                "Metadata graph sync failed"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnergyMap;

    struct FailingSink;

    impl MetadataSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn upsert_snapshot(&self, _metadata: &EnergyMapMetadata) -> Result<SinkOutcome, SinkError> {
            Err(SinkError::Connection("refused".to_string()))
        }
    }

    fn meta() -> EnergyMapMetadata {
        EnergyMapMetadata::compute(&EnergyMap::filled(64, 64, 1.0), "m1", "solar")
    }

    #[test]
    fn test_offline_sink_skips() {
        assert_eq!(OfflineSink.upsert_snapshot(&meta()).unwrap(), SinkOutcome::Skipped);
        assert_eq!(sync_metadata(&OfflineSink, &meta()), Some(SinkOutcome::Skipped));
    }

    #[test]
    fn test_sync_swallows_failures() {
        assert_eq!(sync_metadata(&FailingSink, &meta()), None);
    }
}
