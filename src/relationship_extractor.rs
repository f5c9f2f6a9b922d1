//! Relationship extraction over the entity set
//!
//! Two tiers of inference:
//! - Deterministic domain rules: subject-to-skill, subject-to-concept,
//!   subject-to-need, and need-to-behavior edges from a fixed lookup table.
//!   Deterministic rules give explainable edges with verbatim evidence.
//! - A pluggable similarity heuristic for generic RELATES_TO edges between
//!   same-domain pairs. This is the only non-deterministic step and hides
//!   behind the single-method `SimilarityScorer` trait so it can be swapped
//!   (or disabled) without touching the rest of the pipeline.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::graph::{
    normalize_label, relationship_id, AnalysisSource, Entity, EntityType, RelationType,
    Relationship,
};
use crate::metrics::EVIDENCELESS_EDGES_REJECTED;
use crate::validation::clamp_confidence;

/// Scores how related two entity labels are, in [0.0, 1.0]
///
/// Implementations must be deterministic for a given input pair within one
/// extraction run (an LLM-backed scorer should cache per pair).
pub trait SimilarityScorer: Send + Sync {
    fn score_similarity(&self, a: &str, b: &str) -> f32;
}

/// Deterministic lexical scorer: token overlap plus a domain-affinity boost
/// when both labels mention terms from the same topical group
pub struct LexicalScorer;

/// Topical term groups for the affinity boost. Labels sharing a group are
/// related even without literal token overlap
const TERM_GROUPS: [&[&str]; 5] = [
    &["financial", "finance", "investment", "investing", "portfolio", "wealth"],
    &["plan", "planning", "strategy", "strategic", "goal", "goals"],
    &["retirement", "pension", "savings", "security"],
    &["lead", "leader", "leadership", "manage", "manager", "management"],
    &["learn", "learning", "growth", "develop", "development", "mentor", "mentoring"],
];

impl SimilarityScorer for LexicalScorer {
    fn score_similarity(&self, a: &str, b: &str) -> f32 {
        let tokens_a = tokenize(a);
        let tokens_b = tokenize(b);
        if tokens_a.is_empty() || tokens_b.is_empty() {
            return 0.0;
        }

        let intersection = tokens_a.intersection(&tokens_b).count();
        let union = tokens_a.union(&tokens_b).count();
        let jaccard = intersection as f32 / union as f32;

        let affinity = TERM_GROUPS.iter().any(|group| {
            let a_hit = tokens_a.iter().any(|t| group.contains(&t.as_str()));
            let b_hit = tokens_b.iter().any(|t| group.contains(&t.as_str()));
            a_hit && b_hit
        });

        let score = if affinity { jaccard + 0.4 } else { jaccard };
        clamp_confidence(score)
    }
}

fn tokenize(label: &str) -> BTreeSet<String> {
    normalize_label(label)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

/// Relationship extraction result with bookkeeping from the evidence gate
#[derive(Debug)]
pub struct ExtractedRelationships {
    pub relationships: Vec<Relationship>,
    /// Candidates dropped because they carried no evidence
    pub rejected_evidenceless: usize,
}

/// Infers typed edges between extracted entities
pub struct RelationshipExtractor {
    config: PipelineConfig,
    scorer: Box<dyn SimilarityScorer>,
}

impl RelationshipExtractor {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            scorer: Box::new(LexicalScorer),
        }
    }

    /// Replace the similarity heuristic behind the RELATES_TO tier
    pub fn with_scorer(config: PipelineConfig, scorer: Box<dyn SimilarityScorer>) -> Self {
        Self { config, scorer }
    }

    /// Infer all edges for one customer's entity set
    ///
    /// Best effort: candidates without evidence are dropped and counted,
    /// never surfaced as failures.
    pub fn extract(&self, customer_id: &str, entities: &[Entity]) -> ExtractedRelationships {
        let mut candidates: Vec<Relationship> = Vec::new();

        let person = entities.iter().find(|e| e.entity_type == EntityType::Person);

        if let Some(person) = person {
            self.anchor_rules(customer_id, person, entities, &mut candidates);
        }
        self.need_behavior_rules(customer_id, entities, &mut candidates);
        self.similarity_tier(customer_id, entities, &mut candidates);

        let mut rejected = 0usize;
        candidates.retain(|edge| {
            if edge.evidence.iter().any(|e| !e.trim().is_empty()) {
                true
            } else {
                rejected += 1;
                false
            }
        });
        if rejected > 0 {
            EVIDENCELESS_EDGES_REJECTED.inc_by(rejected as u64);
            debug!(customer_id, rejected, "Dropped evidence-less edge candidates");
        }

        let relationships = deduplicate(candidates);

        ExtractedRelationships {
            relationships,
            rejected_evidenceless: rejected,
        }
    }

    /// Deterministic edges anchored on the primary subject
    fn anchor_rules(
        &self,
        customer_id: &str,
        person: &Entity,
        entities: &[Entity],
        out: &mut Vec<Relationship>,
    ) {
        for target in entities {
            match target.entity_type {
                EntityType::Skill | EntityType::Concept => {
                    // SPECIALIZES_IN applies to file-analysis findings only
                    if !target.sources.contains(&AnalysisSource::FileAnalysis) {
                        continue;
                    }
                    out.push(Relationship {
                        id: relationship_id(
                            customer_id,
                            &person.id,
                            &target.id,
                            RelationType::SpecializesIn,
                        ),
                        source_id: person.id.clone(),
                        target_id: target.id.clone(),
                        relation_type: RelationType::SpecializesIn,
                        confidence: target.confidence,
                        evidence: vec![target.label.clone()],
                        reasoning: format!(
                            "File analysis identifies '{}' as an area of focus for {}",
                            target.label, person.label
                        ),
                        source: AnalysisSource::FileAnalysis,
                    });
                }
                EntityType::Need => {
                    // Confidence tracks how strongly the need drives the
                    // customer, which is the need score, not the analyzer
                    // confidence already on the entity
                    let score = target
                        .properties
                        .get("score")
                        .and_then(|s| s.parse::<f32>().ok())
                        .unwrap_or(target.confidence);
                    out.push(Relationship {
                        id: relationship_id(
                            customer_id,
                            &person.id,
                            &target.id,
                            RelationType::Demonstrates,
                        ),
                        source_id: person.id.clone(),
                        target_id: target.id.clone(),
                        relation_type: RelationType::Demonstrates,
                        confidence: clamp_confidence(score),
                        evidence: vec![format!(
                            "Needs assessment scored {} at {:.2}",
                            target
                                .properties
                                .get("need")
                                .cloned()
                                .unwrap_or_else(|| target.label.clone()),
                            score
                        )],
                        reasoning: format!(
                            "{} demonstrates this need above the emission threshold",
                            person.label
                        ),
                        source: AnalysisSource::NeedsAnalysis,
                    });
                }
                _ => {}
            }
        }
    }

    /// NEED -> BEHAVIORAL_PATTERN edges from the fixed keyword table
    fn need_behavior_rules(
        &self,
        customer_id: &str,
        entities: &[Entity],
        out: &mut Vec<Relationship>,
    ) {
        use crate::analysis::Need;

        for need_entity in entities.iter().filter(|e| e.entity_type == EntityType::Need) {
            let Some(need) = need_entity
                .properties
                .get("need")
                .and_then(|n| Need::ALL.iter().find(|c| c.as_str() == n).copied())
            else {
                continue;
            };

            for pattern in entities
                .iter()
                .filter(|e| e.entity_type == EntityType::BehavioralPattern)
            {
                let normalized = normalize_label(&pattern.label);
                let Some(keyword) = need
                    .behavior_keywords()
                    .iter()
                    .find(|kw| normalized.contains(*kw))
                else {
                    continue;
                };

                out.push(Relationship {
                    id: relationship_id(
                        customer_id,
                        &need_entity.id,
                        &pattern.id,
                        RelationType::Influences,
                    ),
                    source_id: need_entity.id.clone(),
                    target_id: pattern.id.clone(),
                    relation_type: RelationType::Influences,
                    confidence: clamp_confidence(
                        need_entity.confidence.min(pattern.confidence),
                    ),
                    evidence: vec![format!(
                        "Pattern '{}' matches {} indicator '{}'",
                        pattern.label,
                        need.as_str(),
                        keyword
                    )],
                    reasoning: format!(
                        "The {} need typically expresses itself through this behavior category",
                        need.as_str()
                    ),
                    source: AnalysisSource::NeedsAnalysis,
                });
            }
        }
    }

    /// RELATES_TO tier: same-domain pairs above the similarity threshold
    fn similarity_tier(
        &self,
        customer_id: &str,
        entities: &[Entity],
        out: &mut Vec<Relationship>,
    ) {
        const PAIRS: [(EntityType, EntityType); 2] = [
            (EntityType::Skill, EntityType::Concept),
            (EntityType::BehavioralPattern, EntityType::PersonalityTrait),
        ];

        for (left_type, right_type) in PAIRS {
            for left in entities.iter().filter(|e| e.entity_type == left_type) {
                for right in entities.iter().filter(|e| e.entity_type == right_type) {
                    let score = self.scorer.score_similarity(&left.label, &right.label);
                    if score <= self.config.similarity_threshold {
                        continue;
                    }
                    out.push(Relationship {
                        id: relationship_id(
                            customer_id,
                            &left.id,
                            &right.id,
                            RelationType::RelatesTo,
                        ),
                        source_id: left.id.clone(),
                        target_id: right.id.clone(),
                        relation_type: RelationType::RelatesTo,
                        confidence: clamp_confidence(score),
                        evidence: vec![format!(
                            "'{}' and '{}' scored {:.2} on the similarity heuristic",
                            left.label, right.label, score
                        )],
                        reasoning: "Same-domain labels with related terminology".to_string(),
                        source: AnalysisSource::FileAnalysis,
                    });
                }
            }
        }
    }
}

/// Merge edges sharing (source, target, type): higher confidence wins,
/// evidence lists concatenate
fn deduplicate(candidates: Vec<Relationship>) -> Vec<Relationship> {
    let mut order: Vec<(String, String, RelationType)> = Vec::new();
    let mut by_key: BTreeMap<(String, String, RelationType), Relationship> = BTreeMap::new();

    for edge in candidates {
        let key = (
            edge.source_id.clone(),
            edge.target_id.clone(),
            edge.relation_type,
        );
        match by_key.get_mut(&key) {
            None => {
                order.push(key.clone());
                by_key.insert(key, edge);
            }
            Some(existing) => {
                existing.evidence.extend(edge.evidence.iter().cloned());
                if edge.confidence > existing.confidence {
                    existing.confidence = edge.confidence;
                    existing.reasoning = edge.reasoning;
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ExtractionRequest, FileAnalysis, Need, NeedsAnalysis, ScoredPhrase};
    use crate::entity_extractor::EntityExtractor;

    fn extract_entities(request: &ExtractionRequest) -> Vec<Entity> {
        EntityExtractor::new(PipelineConfig::default())
            .extract(request, "extraction_test")
            .unwrap()
            .entities
    }

    fn tim_wolff_request() -> ExtractionRequest {
        let mut scores = BTreeMap::new();
        scores.insert(Need::Certainty, 0.8);
        scores.insert(Need::Growth, 0.6);
        ExtractionRequest {
            customer_id: "cust_tim".to_string(),
            extraction_id: None,
            file_analysis: FileAnalysis {
                customer_name: Some("Tim Wolff".to_string()),
                ..FileAnalysis::default()
            },
            needs_analysis: Some(NeedsAnalysis {
                needs_scores: scores,
                confidence: 0.75,
                behavioral_patterns: vec![],
                personality_traits: vec![],
            }),
        }
    }

    #[test]
    fn test_person_demonstrates_needs() {
        let request = tim_wolff_request();
        let entities = extract_entities(&request);
        let result =
            RelationshipExtractor::new(PipelineConfig::default()).extract("cust_tim", &entities);

        let demonstrates: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.relation_type == RelationType::Demonstrates)
            .collect();
        assert_eq!(demonstrates.len(), 2);
        for edge in &demonstrates {
            assert!(!edge.evidence.is_empty());
        }
        // Edge confidence is the need score
        let certainty_id = entities
            .iter()
            .find(|e| e.label == "Need: Certainty")
            .map(|e| e.id.clone())
            .unwrap();
        let certainty_edge = demonstrates
            .iter()
            .find(|r| r.target_id == certainty_id)
            .unwrap();
        assert!((certainty_edge.confidence - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_specializes_in_skills() {
        let mut request = tim_wolff_request();
        request.file_analysis.key_insights.skills =
            vec![ScoredPhrase::with_confidence("Financial Planning", 0.8)];
        let entities = extract_entities(&request);
        let result =
            RelationshipExtractor::new(PipelineConfig::default()).extract("cust_tim", &entities);

        let edge = result
            .relationships
            .iter()
            .find(|r| r.relation_type == RelationType::SpecializesIn)
            .unwrap();
        assert!((edge.confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(edge.evidence, vec!["Financial Planning".to_string()]);
    }

    #[test]
    fn test_need_influences_matching_pattern() {
        let mut request = tim_wolff_request();
        request.needs_analysis.as_mut().unwrap().behavioral_patterns =
            vec!["Strategic Planner".to_string(), "Social Butterfly".to_string()];
        let entities = extract_entities(&request);
        let result =
            RelationshipExtractor::new(PipelineConfig::default()).extract("cust_tim", &entities);

        let influences: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.relation_type == RelationType::Influences)
            .collect();
        // "Strategic Planner" matches certainty keywords; "Social Butterfly"
        // matches nothing scored (connection was not scored)
        assert_eq!(influences.len(), 1);
        assert!(influences[0].evidence[0].contains("Strategic Planner"));
    }

    #[test]
    fn test_lexical_scorer_overlap_and_affinity() {
        let scorer = LexicalScorer;
        let same = scorer.score_similarity("Financial Planning", "Financial Planning");
        assert!(same > 0.9);
        let related = scorer.score_similarity("Investment Strategy", "Financial Planning");
        assert!(related > 0.3);
        let unrelated = scorer.score_similarity("Gardening", "Quantum Chromodynamics");
        assert!(unrelated < 0.1);
    }

    #[test]
    fn test_pluggable_scorer_drives_relates_to() {
        struct AlwaysRelated;
        impl SimilarityScorer for AlwaysRelated {
            fn score_similarity(&self, _a: &str, _b: &str) -> f32 {
                0.9
            }
        }

        let mut request = tim_wolff_request();
        request.file_analysis.key_insights.skills = vec![ScoredPhrase::new("Mentoring")];
        request.file_analysis.key_insights.themes = vec![ScoredPhrase::new("Gardening")];
        let entities = extract_entities(&request);

        let baseline =
            RelationshipExtractor::new(PipelineConfig::default()).extract("cust_tim", &entities);
        assert!(!baseline
            .relationships
            .iter()
            .any(|r| r.relation_type == RelationType::RelatesTo));

        let swapped = RelationshipExtractor::with_scorer(
            PipelineConfig::default(),
            Box::new(AlwaysRelated),
        )
        .extract("cust_tim", &entities);
        assert!(swapped
            .relationships
            .iter()
            .any(|r| r.relation_type == RelationType::RelatesTo));
    }

    #[test]
    fn test_duplicate_edges_merge() {
        let edges = vec![
            Relationship {
                id: "edge_a".to_string(),
                source_id: "n1".to_string(),
                target_id: "n2".to_string(),
                relation_type: RelationType::RelatesTo,
                confidence: 0.5,
                evidence: vec!["first".to_string()],
                reasoning: "low".to_string(),
                source: AnalysisSource::FileAnalysis,
            },
            Relationship {
                id: "edge_a".to_string(),
                source_id: "n1".to_string(),
                target_id: "n2".to_string(),
                relation_type: RelationType::RelatesTo,
                confidence: 0.8,
                evidence: vec!["second".to_string()],
                reasoning: "high".to_string(),
                source: AnalysisSource::FileAnalysis,
            },
        ];
        let merged = deduplicate(edges);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(merged[0].evidence.len(), 2);
        assert_eq!(merged[0].reasoning, "high");
    }
}
