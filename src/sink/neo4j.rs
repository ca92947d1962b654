//! Neo4j metadata sink.
//!
//! The Bolt connection is opened on the first upsert, not at construction,
//! and checked with a trivial query before it is kept. If connecting fails the sink logs a warning and stays offline for the
//! rest of the process. Every network call is bounded by
//! [`GraphConfig::timeout`] and driven on a private current-thread runtime,
//! so the synchronous storage API never depends on an ambient executor.

use std::future::Future;

use neo4rs::{query, Graph};
use parking_lot::Mutex;
use tokio::runtime::Runtime;

use super::{MetadataSink, SinkError, SinkOutcome};
use crate::config::GraphConfig;
use crate::types::EnergyMapMetadata;

/// Snapshot merge plus the optional domain link.
///
/// `FOREACH` over an empty list skips the relationship when no domain node
/// matches; domain nodes are never created here.
const UPSERT_SNAPSHOT: &str = "\
MERGE (s:EnergySnapshot {snapshot_id: $snapshot_id})
SET s.domain = $domain,
    s.scale = $scale,
    s.timestamp = $timestamp,
    s.energy_mean = $energy_mean,
    s.energy_var = $energy_var,
    s.entropy = $entropy,
    s.gradient_magnitude_mean = $gradient_magnitude_mean,
    s.gradient_magnitude_max = $gradient_magnitude_max
";

const SET_REGIME: &str = "SET s.regime = $regime\n";
const SET_CONFIDENCE: &str = "SET s.confidence = $confidence\n";

const LINK_DOMAIN: &str = "\
WITH s
OPTIONAL MATCH (d:EnergyDomain {name: $domain})
FOREACH (_ IN CASE WHEN d IS NULL THEN [] ELSE [1] END |
    MERGE (d)-[:HAS_SNAPSHOT]->(s))
";

enum Connection {
    /// Not attempted yet.
    Pending,
    Connected(Graph),
    /// Connecting failed earlier; all writes are skipped.
    Offline,
}

/// Metadata sink backed by Neo4j.
pub struct Neo4jSink {
    config: GraphConfig,
    runtime: Runtime,
    connection: Mutex<Connection>,
}

impl Neo4jSink {
    /// Create a sink. Does not connect.
    pub fn new(config: GraphConfig) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SinkError::Connection(format!("runtime: {e}")))?;

        tracing::info!(
            uri = %config.uri,
            timeout_ms = config.timeout.as_millis() as u64,
            "Neo4j metadata sink configured (lazy connect)"
        );

        Ok(Self {
            config,
            runtime,
            connection: Mutex::new(Connection::Pending),
        })
    }

    /// Whether the sink has given up on the graph.
    pub fn is_offline(&self) -> bool {
        matches!(*self.connection.lock(), Connection::Offline)
    }

    fn bounded<T, E: std::fmt::Display>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
        wrap: fn(String) -> SinkError,
    ) -> Result<T, SinkError> {
        let timeout = self.config.timeout;
        match self.runtime.block_on(tokio::time::timeout(timeout, fut)) {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(wrap(e.to_string())),
            Err(_) => Err(SinkError::Timeout(timeout.as_millis() as u64)),
        }
    }

    fn connect(&self) -> Result<Graph, SinkError> {
        let user = self.config.username.clone().unwrap_or_default();
        let password = self.config.password.clone().unwrap_or_default();
        let graph = self.bounded(
            Graph::new(self.config.uri.as_str(), user, password),
            SinkError::Connection,
        )?;
        // The driver pools lazily; make sure the server actually answers
        self.bounded(graph.run(query("RETURN 1")), SinkError::Connection)?;
        Ok(graph)
    }
}

impl MetadataSink for Neo4jSink {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    fn upsert_snapshot(&self, metadata: &EnergyMapMetadata) -> Result<SinkOutcome, SinkError> {
        let mut connection = self.connection.lock();

        if matches!(*connection, Connection::Pending) {
            match self.connect() {
                Ok(graph) => {
                    tracing::info!(uri = %self.config.uri, "Connected to metadata graph");
                    *connection = Connection::Connected(graph);
                }
                Err(e) => {
                    tracing::warn!(
                        uri = %self.config.uri,
                        error = %e,
                        "Metadata graph unavailable, switching to offline mode"
                    );
                    *connection = Connection::Offline;
                    return Err(e);
                }
            }
        }

        let graph = match &*connection {
            Connection::Connected(graph) => graph,
            _ => return Ok(SinkOutcome::Skipped),
        };

        let mut cypher = String::from(UPSERT_SNAPSHOT);
        if metadata.regime.is_some() {
            cypher.push_str(SET_REGIME);
        }
        if metadata.confidence.is_some() {
            cypher.push_str(SET_CONFIDENCE);
        }
        cypher.push_str(LINK_DOMAIN);

        let mut q = query(&cypher)
            .param("snapshot_id", metadata.map_id.as_str())
            .param("domain", metadata.domain.as_str())
            .param("scale", i64::from(metadata.scale))
            .param("timestamp", metadata.timestamp.to_rfc3339())
            .param("energy_mean", metadata.energy_mean)
            .param("energy_var", metadata.energy_var)
            .param("entropy", metadata.entropy)
            .param("gradient_magnitude_mean", metadata.gradient_magnitude_mean)
            .param("gradient_magnitude_max", metadata.gradient_magnitude_max);
        if let Some(regime) = &metadata.regime {
            q = q.param("regime", regime.as_str());
        }
        if let Some(confidence) = metadata.confidence {
            q = q.param("confidence", confidence);
        }

        self.bounded(graph.run(q), SinkError::Write)?;
        Ok(SinkOutcome::Written)
    }
}
