//! Knowledge-graph data model
//!
//! Entities, relationships and the immutable per-extraction snapshot.
//! Entity and relationship ids are content-derived (sha256 of the scoping
//! customer id plus the identifying fields) so re-running extraction on
//! identical input yields identical ids, which is what makes graph-database
//! upserts idempotent downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Entity types recognized by the extraction pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Skill,
    Concept,
    BehavioralPattern,
    PersonalityTrait,
    Need,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Skill => "skill",
            Self::Concept => "concept",
            Self::BehavioralPattern => "behavioral_pattern",
            Self::PersonalityTrait => "personality_trait",
            Self::Need => "need",
        }
    }
}

/// Which upstream analysis produced an entity or relationship
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    FileAnalysis,
    NeedsAnalysis,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileAnalysis => "file_analysis",
            Self::NeedsAnalysis => "needs_analysis",
        }
    }
}

/// Typed entity record scoped to one customer and one extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable content-derived identifier, unique within an extraction
    pub id: String,

    pub entity_type: EntityType,

    /// Human-readable name
    pub label: String,

    /// Confidence in [0.0, 1.0]
    pub confidence: f32,

    /// Upstream analyses that produced this entity. Merged duplicates union
    /// their attributions
    pub sources: BTreeSet<AnalysisSource>,

    pub customer_id: String,
    pub extraction_id: String,
    pub created_at: DateTime<Utc>,

    /// Domain-specific attributes (need score, category, role)
    pub properties: BTreeMap<String, String>,
}

impl Entity {
    /// Case-insensitive, whitespace-normalized label used for deduplication
    pub fn normalized_label(&self) -> String {
        normalize_label(&self.label)
    }
}

/// Collapse whitespace and lowercase for label comparison
pub fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Generate a stable entity id from customer, type and normalized label
pub fn entity_id(customer_id: &str, entity_type: EntityType, label: &str) -> String {
    let digest = Sha256::digest(
        format!("{customer_id}:{}:{}", entity_type.as_str(), normalize_label(label)).as_bytes(),
    );
    format!("{}_{}", entity_type.as_str(), hex_prefix(&digest, 16))
}

/// Relationship types between entities
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    SpecializesIn,
    Demonstrates,
    Influences,
    RelatesTo,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecializesIn => "specializes_in",
            Self::Demonstrates => "demonstrates",
            Self::Influences => "influences",
            Self::RelatesTo => "relates_to",
        }
    }

    /// RELATES_TO is the generic catch-all; everything else carries domain
    /// meaning and counts toward the meaningful-relationship ratio
    pub fn is_meaningful(&self) -> bool {
        !matches!(self, Self::RelatesTo)
    }
}

/// Evidence-backed directed edge between two entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Stable content-derived identifier
    pub id: String,

    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,

    /// Confidence in [0.0, 1.0], justified by at least one evidence item
    pub confidence: f32,

    /// Supporting text snippets from the originating analysis. Never empty
    /// in assembled output: evidence-less candidates are rejected upstream
    pub evidence: Vec<String>,

    /// Free-text justification
    pub reasoning: String,

    pub source: AnalysisSource,
}

/// Generate a stable relationship id from endpoints and type
pub fn relationship_id(
    customer_id: &str,
    source_id: &str,
    target_id: &str,
    relation_type: RelationType,
) -> String {
    let digest = Sha256::digest(
        format!("{customer_id}:{source_id}:{target_id}:{}", relation_type.as_str()).as_bytes(),
    );
    format!("edge_{}", hex_prefix(&digest, 16))
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

/// Summary metrics computed at assembly time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetrics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub node_type_distribution: BTreeMap<String, usize>,
    pub edge_type_distribution: BTreeMap<String, usize>,
    pub mean_node_confidence: f32,
    pub mean_edge_confidence: f32,
    /// Distinct entity types present
    pub entity_diversity: usize,
    /// Distinct relationship types present
    pub relationship_diversity: usize,
    /// Fraction of edges carrying evidence (1.0 by construction)
    pub evidence_coverage: f32,
    /// Edges with a non-generic type and evidence, over total edges
    pub meaningful_relationship_ratio: f32,
}

/// Snapshot-level metadata stored alongside nodes and edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    pub source_extraction_method: String,
    pub quality_score: f32,
}

/// The immutable unit of persistence: one customer's graph for one extraction
///
/// Created once by the assembler, never mutated. A newer extraction for the
/// same customer supersedes it; nothing rewrites it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub customer_id: String,
    pub extraction_id: String,
    pub nodes: Vec<Entity>,
    pub edges: Vec<Relationship>,
    pub metadata: SnapshotMetadata,
    pub metrics: SnapshotMetrics,
}

/// Generate a timestamp-prefixed extraction id so that "latest extraction"
/// is resolvable by lexical sort
pub fn generate_extraction_id(suffix: &str) -> String {
    let ts = Utc::now().timestamp();
    let short: String = suffix.chars().take(8).collect();
    format!("extraction_{ts}_{short}")
}

/// Vertex/edge property maps handed to the graph database
pub fn entity_properties(entity: &Entity) -> HashMap<String, String> {
    let mut props: HashMap<String, String> = entity
        .properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    props.insert("label".to_string(), entity.label.clone());
    props.insert("confidence".to_string(), format!("{:.4}", entity.confidence));
    props.insert("customer_id".to_string(), entity.customer_id.clone());
    props.insert("extraction_id".to_string(), entity.extraction_id.clone());
    props.insert("created_at".to_string(), entity.created_at.to_rfc3339());
    props
}

pub fn relationship_properties(edge: &Relationship) -> HashMap<String, String> {
    let mut props = HashMap::new();
    props.insert("confidence".to_string(), format!("{:.4}", edge.confidence));
    props.insert("evidence_count".to_string(), edge.evidence.len().to_string());
    props.insert("evidence".to_string(), edge.evidence.join(" | "));
    props.insert("reasoning".to_string(), edge.reasoning.clone());
    props.insert("source".to_string(), edge.source.as_str().to_string());
    props
}
