//! In-memory metadata sink for testing.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use super::{MetadataSink, SinkError, SinkOutcome};
use crate::types::EnergyMapMetadata;

#[derive(Debug, Default)]
struct GraphState {
    /// Snapshot nodes by id.
    snapshots: BTreeMap<String, EnergyMapMetadata>,
    /// Domain nodes registered externally.
    domains: BTreeSet<String>,
    /// `(domain, snapshot_id)` relationships.
    links: BTreeSet<(String, String)>,
    /// Number of upsert calls.
    writes: u64,
}

/// Records snapshot upserts in memory.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Default)]
pub struct InMemorySink {
    state: Mutex<GraphState>,
}

impl InMemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a domain node, as an external collaborator would.
    pub fn register_domain(&self, name: impl Into<String>) {
        self.state.lock().domains.insert(name.into());
    }

    /// Snapshot node by id.
    pub fn snapshot(&self, map_id: &str) -> Option<EnergyMapMetadata> {
        self.state.lock().snapshots.get(map_id).cloned()
    }

    /// Number of distinct snapshot nodes.
    pub fn snapshot_count(&self) -> usize {
        self.state.lock().snapshots.len()
    }

    /// Whether `domain -[HAS_SNAPSHOT]-> map_id` exists.
    pub fn is_linked(&self, domain: &str, map_id: &str) -> bool {
        self.state
            .lock()
            .links
            .contains(&(domain.to_string(), map_id.to_string()))
    }

    /// Whether a domain node exists.
    pub fn has_domain(&self, name: &str) -> bool {
        self.state.lock().domains.contains(name)
    }

    /// Total upsert calls received.
    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }
}

impl MetadataSink for InMemorySink {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    fn upsert_snapshot(&self, metadata: &EnergyMapMetadata) -> Result<SinkOutcome, SinkError> {
        let mut state = self.state.lock();
        state.writes += 1;
        state
            .snapshots
            .insert(metadata.map_id.clone(), metadata.clone());

        if state.domains.contains(&metadata.domain) {
            state
                .links
                .insert((metadata.domain.clone(), metadata.map_id.clone()));
        }
        Ok(SinkOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnergyMap;

    fn meta(id: &str, domain: &str) -> EnergyMapMetadata {
        EnergyMapMetadata::compute(&EnergyMap::filled(64, 64, 1.0), id, domain)
    }

    #[test]
    fn test_upsert_without_domain_is_unlinked() {
        let sink = InMemorySink::new();
        let outcome = sink.upsert_snapshot(&meta("m1", "solar")).unwrap();
        assert_eq!(outcome, SinkOutcome::Written);
        assert!(!sink.has_domain("solar"));
        assert!(!sink.is_linked("solar", "m1"));
        assert!(sink.snapshot("m1").is_some());
    }

    #[test]
    fn test_upsert_links_existing_domain() {
        let sink = InMemorySink::new();
        sink.register_domain("solar");
        sink.upsert_snapshot(&meta("m1", "solar")).unwrap();
        assert!(sink.is_linked("solar", "m1"));
    }

    #[test]
    fn test_upsert_merges_by_id() {
        let sink = InMemorySink::new();
        sink.upsert_snapshot(&meta("m1", "solar")).unwrap();
        sink.upsert_snapshot(&meta("m1", "solar")).unwrap();
        assert_eq!(sink.snapshot_count(), 1);
        assert_eq!(sink.write_count(), 2);
    }
}
