//! Graph assembly
//!
//! Combines extracted entities and relationships into one immutable
//! snapshot, computing the summary metrics and quality score that the
//! upload coordinator and downstream consumers read.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::errors::{PipelineError, Result};
use crate::graph::{
    Entity, GraphSnapshot, Relationship, SnapshotMetadata, SnapshotMetrics,
};

/// Number of entity types the pipeline can emit, for diversity scaling
const ENTITY_TYPE_COUNT: usize = 6;
/// Number of relationship types, for diversity scaling
const RELATION_TYPE_COUNT: usize = 4;

/// Quality score weights: type diversity, evidence coverage, meaningful
/// relationship ratio
const W_DIVERSITY: f32 = 0.4;
const W_EVIDENCE: f32 = 0.3;
const W_MEANINGFUL: f32 = 0.3;

const EXTRACTION_METHOD: &str = "rule_based_v2";

/// Builds immutable graph snapshots from extractor output
pub struct GraphAssembler;

impl GraphAssembler {
    /// Assemble one snapshot
    ///
    /// Drops any edge whose endpoints are not both present in the entity
    /// set, then computes metrics over what remains. Fails with `EmptyGraph`
    /// when zero entities survive; an entity-less snapshot has nothing to
    /// upload and would poison "latest extraction" queries.
    pub fn assemble(
        &self,
        customer_id: &str,
        extraction_id: &str,
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
    ) -> Result<GraphSnapshot> {
        if entities.is_empty() {
            return Err(PipelineError::EmptyGraph {
                customer_id: customer_id.to_string(),
                extraction_id: extraction_id.to_string(),
            });
        }

        let known_ids: BTreeSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let edges: Vec<Relationship> = relationships
            .into_iter()
            .filter(|r| {
                known_ids.contains(r.source_id.as_str()) && known_ids.contains(r.target_id.as_str())
            })
            .collect();

        let metrics = compute_metrics(&entities, &edges);
        let quality_score = quality_score(&metrics);

        info!(
            customer_id,
            extraction_id,
            nodes = metrics.total_nodes,
            edges = metrics.total_edges,
            quality = format!("{quality_score:.3}"),
            "Assembled graph snapshot"
        );

        Ok(GraphSnapshot {
            customer_id: customer_id.to_string(),
            extraction_id: extraction_id.to_string(),
            nodes: entities,
            edges,
            metadata: SnapshotMetadata {
                created_at: Utc::now(),
                source_extraction_method: EXTRACTION_METHOD.to_string(),
                quality_score,
            },
            metrics,
        })
    }
}

fn compute_metrics(entities: &[Entity], edges: &[Relationship]) -> SnapshotMetrics {
    let mut node_types: BTreeMap<String, usize> = BTreeMap::new();
    for entity in entities {
        *node_types
            .entry(entity.entity_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    let mut edge_types: BTreeMap<String, usize> = BTreeMap::new();
    for edge in edges {
        *edge_types
            .entry(edge.relation_type.as_str().to_string())
            .or_insert(0) += 1;
    }

    let mean_node_confidence = if entities.is_empty() {
        0.0
    } else {
        entities.iter().map(|e| e.confidence).sum::<f32>() / entities.len() as f32
    };
    let mean_edge_confidence = if edges.is_empty() {
        0.0
    } else {
        edges.iter().map(|e| e.confidence).sum::<f32>() / edges.len() as f32
    };

    let with_evidence = edges.iter().filter(|e| !e.evidence.is_empty()).count();
    let meaningful = edges
        .iter()
        .filter(|e| e.relation_type.is_meaningful() && !e.evidence.is_empty())
        .count();

    let (evidence_coverage, meaningful_ratio) = if edges.is_empty() {
        (1.0, 0.0)
    } else {
        (
            with_evidence as f32 / edges.len() as f32,
            meaningful as f32 / edges.len() as f32,
        )
    };

    SnapshotMetrics {
        total_nodes: entities.len(),
        total_edges: edges.len(),
        entity_diversity: node_types.len(),
        relationship_diversity: edge_types.len(),
        node_type_distribution: node_types,
        edge_type_distribution: edge_types,
        mean_node_confidence,
        mean_edge_confidence,
        evidence_coverage,
        meaningful_relationship_ratio: meaningful_ratio,
    }
}

/// Weighted quality score over diversity, evidence coverage and the
/// meaningful-relationship ratio
fn quality_score(metrics: &SnapshotMetrics) -> f32 {
    let diversity = (metrics.entity_diversity as f32 / ENTITY_TYPE_COUNT as f32
        + metrics.relationship_diversity as f32 / RELATION_TYPE_COUNT as f32)
        / 2.0;
    let score = W_DIVERSITY * diversity
        + W_EVIDENCE * metrics.evidence_coverage
        + W_MEANINGFUL * metrics.meaningful_relationship_ratio;
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{entity_id, relationship_id, AnalysisSource, EntityType, RelationType};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn entity(customer: &str, entity_type: EntityType, label: &str, confidence: f32) -> Entity {
        Entity {
            id: entity_id(customer, entity_type, label),
            entity_type,
            label: label.to_string(),
            confidence,
            sources: [AnalysisSource::FileAnalysis].into(),
            customer_id: customer.to_string(),
            extraction_id: "extraction_test".to_string(),
            created_at: Utc::now(),
            properties: BTreeMap::new(),
        }
    }

    fn edge(
        customer: &str,
        source: &Entity,
        target: &Entity,
        relation_type: RelationType,
    ) -> Relationship {
        Relationship {
            id: relationship_id(customer, &source.id, &target.id, relation_type),
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            relation_type,
            confidence: 0.8,
            evidence: vec!["supporting snippet".to_string()],
            reasoning: "test".to_string(),
            source: AnalysisSource::FileAnalysis,
        }
    }

    #[test]
    fn test_empty_graph_rejected() {
        let err = GraphAssembler
            .assemble("cust_1", "extraction_1", vec![], vec![])
            .unwrap_err();
        assert_eq!(err.code(), "EMPTY_GRAPH");
    }

    #[test]
    fn test_dangling_edges_dropped() {
        let person = entity("cust_1", EntityType::Person, "Tim Wolff", 0.95);
        let skill = entity("cust_1", EntityType::Skill, "Planning", 0.8);
        let ghost = entity("cust_1", EntityType::Concept, "Not Included", 0.5);

        let good = edge("cust_1", &person, &skill, RelationType::SpecializesIn);
        let dangling = edge("cust_1", &person, &ghost, RelationType::RelatesTo);

        let snapshot = GraphAssembler
            .assemble(
                "cust_1",
                "extraction_1",
                vec![person, skill],
                vec![good, dangling],
            )
            .unwrap();
        assert_eq!(snapshot.metrics.total_edges, 1);
    }

    #[test]
    fn test_metrics_and_quality() {
        let person = entity("cust_1", EntityType::Person, "Tim Wolff", 0.95);
        let skill = entity("cust_1", EntityType::Skill, "Planning", 0.8);
        let need = entity("cust_1", EntityType::Need, "Need: Growth", 0.7);

        let e1 = edge("cust_1", &person, &skill, RelationType::SpecializesIn);
        let e2 = edge("cust_1", &person, &need, RelationType::Demonstrates);

        let snapshot = GraphAssembler
            .assemble(
                "cust_1",
                "extraction_1",
                vec![person, skill, need],
                vec![e1, e2],
            )
            .unwrap();

        let m = &snapshot.metrics;
        assert_eq!(m.total_nodes, 3);
        assert_eq!(m.entity_diversity, 3);
        assert_eq!(m.relationship_diversity, 2);
        assert!((m.evidence_coverage - 1.0).abs() < f32::EPSILON);
        assert!((m.meaningful_relationship_ratio - 1.0).abs() < f32::EPSILON);
        // diversity = (3/6 + 2/4) / 2 = 0.5; score = 0.4*0.5 + 0.3 + 0.3
        assert!((snapshot.metadata.quality_score - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_edgeless_snapshot_is_valid() {
        let person = entity("cust_1", EntityType::Person, "Tim Wolff", 0.95);
        let snapshot = GraphAssembler
            .assemble("cust_1", "extraction_1", vec![person], vec![])
            .unwrap();
        assert_eq!(snapshot.metrics.total_edges, 0);
        assert!((snapshot.metrics.evidence_coverage - 1.0).abs() < f32::EPSILON);
        assert!((snapshot.metrics.meaningful_relationship_ratio - 0.0).abs() < f32::EPSILON);
    }
}
