//! Extraction store
//!
//! Content-addressed snapshot storage organized by customer and extraction
//! id. The production deployment points this at an object store; the
//! filesystem implementation here mirrors the same key layout:
//!
//!   customer-graphs/{customer_id}/extractions/{extraction_id}/
//!     nodes.json       entity records
//!     edges.json       relationship records
//!     metadata.json    snapshot metadata + metrics
//!     manifest.json    written last; its presence marks the snapshot
//!                      complete
//!
//! Writes are atomic from the reader's perspective: everything lands in a
//! temp directory first and a single rename publishes it. Discovery only
//! trusts directories carrying a manifest, so a crash mid-write leaves
//! nothing visible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{PipelineError, Result};
use crate::graph::{Entity, GraphSnapshot, Relationship, SnapshotMetadata, SnapshotMetrics};
use crate::metrics::{Timer, STORE_OPS_DURATION, STORE_OPS_TOTAL};
use crate::validation::sanitize_key_component;

const CUSTOMER_PREFIX: &str = "customer-graphs";
const NODES_FILE: &str = "nodes.json";
const EDGES_FILE: &str = "edges.json";
const METADATA_FILE: &str = "metadata.json";
const MANIFEST_FILE: &str = "manifest.json";

/// Metadata document stored next to nodes and edges
#[derive(Debug, Serialize, Deserialize)]
struct MetadataDocument {
    customer_id: String,
    extraction_id: String,
    metadata: SnapshotMetadata,
    metrics: SnapshotMetrics,
}

/// Completion marker, written after everything else
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    complete: bool,
    written_at: DateTime<Utc>,
    node_count: usize,
    edge_count: usize,
}

/// Snapshot storage capability
#[async_trait]
pub trait ExtractionStore: Send + Sync {
    /// Persist a snapshot atomically. A reader either sees the whole
    /// snapshot or nothing
    async fn put_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()>;

    /// Load one complete snapshot
    async fn get_snapshot(&self, customer_id: &str, extraction_id: &str) -> Result<GraphSnapshot>;

    /// List complete extraction ids for a customer, lexically sorted so the
    /// timestamp-prefixed ids come back oldest first
    async fn list_extractions(&self, customer_id: &str) -> Result<Vec<String>>;
}

/// Filesystem-backed extraction store
pub struct FsExtractionStore {
    root: PathBuf,
}

impl FsExtractionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn customer_dir(&self, customer_id: &str) -> PathBuf {
        self.root
            .join(CUSTOMER_PREFIX)
            .join(sanitize_key_component(customer_id))
            .join("extractions")
    }

    fn extraction_dir(&self, customer_id: &str, extraction_id: &str) -> PathBuf {
        self.customer_dir(customer_id)
            .join(sanitize_key_component(extraction_id))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        fs::write(path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ExtractionStore for FsExtractionStore {
    async fn put_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let _timer = Timer::new(STORE_OPS_DURATION.with_label_values(&["write"]));

        let final_dir = self.extraction_dir(&snapshot.customer_id, &snapshot.extraction_id);
        let parent = self.customer_dir(&snapshot.customer_id);
        fs::create_dir_all(&parent).await?;

        // Stage under a unique temp name in the same directory so the final
        // rename stays on one filesystem
        let staging = parent.join(format!(".staging-{}", Uuid::new_v4()));
        fs::create_dir_all(&staging).await?;

        let result: Result<()> = async {
            Self::write_json(&staging.join(NODES_FILE), &snapshot.nodes).await?;
            Self::write_json(&staging.join(EDGES_FILE), &snapshot.edges).await?;
            Self::write_json(
                &staging.join(METADATA_FILE),
                &MetadataDocument {
                    customer_id: snapshot.customer_id.clone(),
                    extraction_id: snapshot.extraction_id.clone(),
                    metadata: snapshot.metadata.clone(),
                    metrics: snapshot.metrics.clone(),
                },
            )
            .await?;
            Self::write_json(
                &staging.join(MANIFEST_FILE),
                &Manifest {
                    complete: true,
                    written_at: Utc::now(),
                    node_count: snapshot.nodes.len(),
                    edge_count: snapshot.edges.len(),
                },
            )
            .await?;

            // Snapshots are immutable: an existing directory means this
            // extraction id was already stored, replacing it would mutate
            // history
            if fs::try_exists(&final_dir).await? {
                return Err(PipelineError::StorageError(format!(
                    "snapshot already exists for extraction {}",
                    snapshot.extraction_id
                )));
            }
            fs::rename(&staging, &final_dir).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_dir_all(&staging).await;
            STORE_OPS_TOTAL.with_label_values(&["write", "error"]).inc();
        } else {
            STORE_OPS_TOTAL.with_label_values(&["write", "ok"]).inc();
            debug!(
                customer_id = %snapshot.customer_id,
                extraction_id = %snapshot.extraction_id,
                "Snapshot stored"
            );
        }
        result
    }

    async fn get_snapshot(&self, customer_id: &str, extraction_id: &str) -> Result<GraphSnapshot> {
        let _timer = Timer::new(STORE_OPS_DURATION.with_label_values(&["read"]));

        let dir = self.extraction_dir(customer_id, extraction_id);
        if !fs::try_exists(&dir.join(MANIFEST_FILE)).await? {
            STORE_OPS_TOTAL.with_label_values(&["read", "error"]).inc();
            return Err(PipelineError::StorageError(format!(
                "no complete snapshot for customer {customer_id}, extraction {extraction_id}"
            )));
        }

        let nodes: Vec<Entity> = Self::read_json(&dir.join(NODES_FILE)).await?;
        let edges: Vec<Relationship> = Self::read_json(&dir.join(EDGES_FILE)).await?;
        let doc: MetadataDocument = Self::read_json(&dir.join(METADATA_FILE)).await?;

        STORE_OPS_TOTAL.with_label_values(&["read", "ok"]).inc();
        Ok(GraphSnapshot {
            customer_id: doc.customer_id,
            extraction_id: doc.extraction_id,
            nodes,
            edges,
            metadata: doc.metadata,
            metrics: doc.metrics,
        })
    }

    async fn list_extractions(&self, customer_id: &str) -> Result<Vec<String>> {
        let _timer = Timer::new(STORE_OPS_DURATION.with_label_values(&["list"]));

        let dir = self.customer_dir(customer_id);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            // Only manifest-bearing directories are complete snapshots
            if fs::try_exists(&entry.path().join(MANIFEST_FILE)).await? {
                ids.push(name);
            } else {
                warn!(customer_id, extraction_id = %name, "Skipping incomplete snapshot");
            }
        }

        ids.sort();
        STORE_OPS_TOTAL.with_label_values(&["list", "ok"]).inc();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{entity_id, AnalysisSource, EntityType};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_snapshot(customer_id: &str, extraction_id: &str) -> GraphSnapshot {
        let entity = Entity {
            id: entity_id(customer_id, EntityType::Person, "Tim Wolff"),
            entity_type: EntityType::Person,
            label: "Tim Wolff".to_string(),
            confidence: 0.95,
            sources: [AnalysisSource::FileAnalysis].into(),
            customer_id: customer_id.to_string(),
            extraction_id: extraction_id.to_string(),
            created_at: Utc::now(),
            properties: BTreeMap::new(),
        };
        GraphSnapshot {
            customer_id: customer_id.to_string(),
            extraction_id: extraction_id.to_string(),
            nodes: vec![entity],
            edges: vec![],
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                source_extraction_method: "rule_based_v2".to_string(),
                quality_score: 0.5,
            },
            metrics: SnapshotMetrics {
                total_nodes: 1,
                total_edges: 0,
                node_type_distribution: BTreeMap::new(),
                edge_type_distribution: BTreeMap::new(),
                mean_node_confidence: 0.95,
                mean_edge_confidence: 0.0,
                entity_diversity: 1,
                relationship_diversity: 0,
                evidence_coverage: 1.0,
                meaningful_relationship_ratio: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FsExtractionStore::new(dir.path());

        let snapshot = sample_snapshot("cust_1", "extraction_100_abc");
        store.put_snapshot(&snapshot).await.unwrap();

        let loaded = store.get_snapshot("cust_1", "extraction_100_abc").await.unwrap();
        assert_eq!(loaded.customer_id, "cust_1");
        assert_eq!(loaded.nodes.len(), 1);
        assert_eq!(loaded.nodes[0].label, "Tim Wolff");
    }

    #[tokio::test]
    async fn test_snapshots_are_immutable() {
        let dir = TempDir::new().unwrap();
        let store = FsExtractionStore::new(dir.path());

        let snapshot = sample_snapshot("cust_1", "extraction_100_abc");
        store.put_snapshot(&snapshot).await.unwrap();
        let err = store.put_snapshot(&snapshot).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn test_list_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let store = FsExtractionStore::new(dir.path());

        store
            .put_snapshot(&sample_snapshot("cust_1", "extraction_200_b"))
            .await
            .unwrap();
        store
            .put_snapshot(&sample_snapshot("cust_1", "extraction_100_a"))
            .await
            .unwrap();

        // Manifest-less directory must be invisible to discovery
        let incomplete = dir
            .path()
            .join("customer-graphs/cust_1/extractions/extraction_300_c");
        std::fs::create_dir_all(&incomplete).unwrap();
        std::fs::write(incomplete.join(NODES_FILE), b"[]").unwrap();

        let ids = store.list_extractions("cust_1").await.unwrap();
        assert_eq!(ids, vec!["extraction_100_a", "extraction_200_b"]);
    }

    #[tokio::test]
    async fn test_unknown_customer_lists_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsExtractionStore::new(dir.path());
        assert!(store.list_extractions("nobody").await.unwrap().is_empty());
    }
}
