//! Graph database capability
//!
//! The upload coordinator talks to the graph store exclusively through the
//! `GraphDatabase` trait: idempotent vertex/edge upserts keyed by id, plus a
//! per-customer query. The in-memory implementation backs tests and local
//! runs; a networked backend implements the same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::errors::{PipelineError, Result};

/// Which record class a query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Vertex,
    Edge,
}

#[derive(Debug, Clone)]
pub struct VertexRecord {
    pub id: String,
    pub vertex_type: String,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    pub edge_type: String,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum GraphRecord {
    Vertex(VertexRecord),
    Edge(EdgeRecord),
}

/// Graph store capability contract
///
/// Upserts are keyed by id: repeating an upsert replaces the record instead
/// of duplicating it, which is what makes at-least-once delivery safe.
#[async_trait]
pub trait GraphDatabase: Send + Sync {
    async fn upsert_vertex(
        &self,
        id: &str,
        vertex_type: &str,
        properties: HashMap<String, String>,
    ) -> Result<()>;

    /// Upsert an edge. Both endpoints must already exist; the store does not
    /// auto-create vertices for unresolved edges
    async fn upsert_edge(
        &self,
        id: &str,
        from: &str,
        to: &str,
        edge_type: &str,
        properties: HashMap<String, String>,
    ) -> Result<()>;

    /// All records whose `customer_id` property matches
    async fn query_by_customer(
        &self,
        customer_id: &str,
        kind: RecordKind,
    ) -> Result<Vec<GraphRecord>>;
}

/// In-memory graph database for tests and local pipelines
#[derive(Default)]
pub struct InMemoryGraphDatabase {
    vertices: DashMap<String, VertexRecord>,
    edges: DashMap<String, EdgeRecord>,
}

impl InMemoryGraphDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[async_trait]
impl GraphDatabase for InMemoryGraphDatabase {
    async fn upsert_vertex(
        &self,
        id: &str,
        vertex_type: &str,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        self.vertices.insert(
            id.to_string(),
            VertexRecord {
                id: id.to_string(),
                vertex_type: vertex_type.to_string(),
                properties,
            },
        );
        Ok(())
    }

    async fn upsert_edge(
        &self,
        id: &str,
        from: &str,
        to: &str,
        edge_type: &str,
        properties: HashMap<String, String>,
    ) -> Result<()> {
        if !self.vertices.contains_key(from) || !self.vertices.contains_key(to) {
            return Err(PipelineError::StorageError(format!(
                "edge {id} references missing endpoint ({from} -> {to})"
            )));
        }
        self.edges.insert(
            id.to_string(),
            EdgeRecord {
                id: id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
                edge_type: edge_type.to_string(),
                properties,
            },
        );
        Ok(())
    }

    async fn query_by_customer(
        &self,
        customer_id: &str,
        kind: RecordKind,
    ) -> Result<Vec<GraphRecord>> {
        let matches_customer = |props: &HashMap<String, String>| {
            props.get("customer_id").map(String::as_str) == Some(customer_id)
        };

        let records = match kind {
            RecordKind::Vertex => self
                .vertices
                .iter()
                .filter(|entry| matches_customer(&entry.value().properties))
                .map(|entry| GraphRecord::Vertex(entry.value().clone()))
                .collect(),
            RecordKind::Edge => self
                .edges
                .iter()
                .filter(|entry| matches_customer(&entry.value().properties))
                .map(|entry| GraphRecord::Edge(entry.value().clone()))
                .collect(),
        };
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(customer_id: &str) -> HashMap<String, String> {
        let mut props = HashMap::new();
        props.insert("customer_id".to_string(), customer_id.to_string());
        props
    }

    #[tokio::test]
    async fn test_upsert_vertex_is_idempotent() {
        let db = InMemoryGraphDatabase::new();
        db.upsert_vertex("v1", "person", props("cust_1")).await.unwrap();
        db.upsert_vertex("v1", "person", props("cust_1")).await.unwrap();
        assert_eq!(db.vertex_count(), 1);
    }

    #[tokio::test]
    async fn test_edge_requires_endpoints() {
        let db = InMemoryGraphDatabase::new();
        let err = db
            .upsert_edge("e1", "v1", "v2", "relates_to", props("cust_1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");

        db.upsert_vertex("v1", "person", props("cust_1")).await.unwrap();
        db.upsert_vertex("v2", "skill", props("cust_1")).await.unwrap();
        db.upsert_edge("e1", "v1", "v2", "relates_to", props("cust_1"))
            .await
            .unwrap();
        assert_eq!(db.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_query_scoped_by_customer() {
        let db = InMemoryGraphDatabase::new();
        db.upsert_vertex("a1", "person", props("cust_a")).await.unwrap();
        db.upsert_vertex("b1", "person", props("cust_b")).await.unwrap();

        let found = db.query_by_customer("cust_a", RecordKind::Vertex).await.unwrap();
        assert_eq!(found.len(), 1);
        match &found[0] {
            GraphRecord::Vertex(v) => assert_eq!(v.id, "a1"),
            GraphRecord::Edge(_) => panic!("expected vertex"),
        }
    }
}
