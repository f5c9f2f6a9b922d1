//! Entity extraction from analyzer outputs
//!
//! Turns a customer's file analysis and needs analysis into typed entity
//! records. Each category carries a default confidence, labels go through a
//! cleanup pass before they become entities, and the final set is
//! deduplicated on (type, normalized label).

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::analysis::{ExtractionRequest, ScoredPhrase};
use crate::config::PipelineConfig;
use crate::errors::{PipelineError, Result};
use crate::graph::{entity_id, normalize_label, AnalysisSource, Entity, EntityType};
use crate::metrics::ENTITIES_MERGED;
use crate::validation::clamp_confidence;

/// Default confidences per entity category. Analyzer-provided scores on
/// individual phrases take precedence
pub const PERSON_CONFIDENCE: f32 = 0.95;
pub const SKILL_CONFIDENCE: f32 = 0.8;
pub const THEME_CONFIDENCE: f32 = 0.7;
pub const GOAL_CONFIDENCE: f32 = 0.6;
pub const DESCRIPTOR_CONFIDENCE: f32 = 0.8;

/// Minimum label length after cleanup; shorter fragments are analyzer noise
const MIN_LABEL_LENGTH: usize = 3;

/// Filler prefixes analyzers prepend to insight phrases
const STRIP_PREFIXES: [&str; 4] = ["Mentioned ", "Discussed ", "Has ", "Shows "];

/// Entity extraction result with bookkeeping from the dedup pass
#[derive(Debug)]
pub struct ExtractedEntities {
    pub entities: Vec<Entity>,
    /// Duplicates merged away during deduplication
    pub merged_duplicates: usize,
}

/// Extracts typed entities from analyzer documents
pub struct EntityExtractor {
    config: PipelineConfig,
}

impl EntityExtractor {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Extract all entities for one request
    ///
    /// Fails with `MissingPrimarySubject` when no PERSON entity can be
    /// derived: the relationship extractor anchors everything on the
    /// primary subject, so there is nothing useful to build without one.
    pub fn extract(
        &self,
        request: &ExtractionRequest,
        extraction_id: &str,
    ) -> Result<ExtractedEntities> {
        let mut raw: Vec<Entity> = Vec::new();

        let person = self.derive_primary_subject(request, extraction_id)?;
        raw.push(person);

        let insights = &request.file_analysis.key_insights;
        self.collect_phrases(
            &mut raw,
            request,
            extraction_id,
            &insights.skills,
            EntityType::Skill,
            SKILL_CONFIDENCE,
            self.config.max_skills,
            "skill",
        );
        self.collect_phrases(
            &mut raw,
            request,
            extraction_id,
            &insights.themes,
            EntityType::Concept,
            THEME_CONFIDENCE,
            self.config.max_themes,
            "theme",
        );
        self.collect_phrases(
            &mut raw,
            request,
            extraction_id,
            &insights.goals,
            EntityType::Concept,
            GOAL_CONFIDENCE,
            self.config.max_goals,
            "goal",
        );

        if let Some(needs) = &request.needs_analysis {
            let patterns: Vec<ScoredPhrase> = needs
                .behavioral_patterns
                .iter()
                .map(|p| ScoredPhrase::new(p.clone()))
                .collect();
            self.collect_phrases(
                &mut raw,
                request,
                extraction_id,
                &patterns,
                EntityType::BehavioralPattern,
                DESCRIPTOR_CONFIDENCE,
                self.config.max_descriptors,
                "behavioral_pattern",
            );

            let traits: Vec<ScoredPhrase> = needs
                .personality_traits
                .iter()
                .map(|t| ScoredPhrase::new(t.clone()))
                .collect();
            self.collect_phrases(
                &mut raw,
                request,
                extraction_id,
                &traits,
                EntityType::PersonalityTrait,
                DESCRIPTOR_CONFIDENCE,
                self.config.max_descriptors,
                "personality_trait",
            );

            for (need, score) in &needs.needs_scores {
                let score = clamp_confidence(*score);
                if score <= self.config.min_need_score {
                    continue;
                }
                let label = need.display_label();
                let mut properties = BTreeMap::new();
                properties.insert("need".to_string(), need.as_str().to_string());
                properties.insert("score".to_string(), format!("{score:.4}"));
                raw.push(Entity {
                    id: entity_id(&request.customer_id, EntityType::Need, &label),
                    entity_type: EntityType::Need,
                    label,
                    // Confidence reflects trust in the assessment itself;
                    // the score (how strongly the need drives the customer)
                    // is carried as a property instead
                    confidence: clamp_confidence(needs.confidence),
                    sources: [AnalysisSource::NeedsAnalysis].into(),
                    customer_id: request.customer_id.clone(),
                    extraction_id: extraction_id.to_string(),
                    created_at: Utc::now(),
                    properties,
                });
            }
        }

        let (entities, merged) = deduplicate(raw);
        if merged > 0 {
            ENTITIES_MERGED.inc_by(merged as u64);
            debug!(
                customer_id = %request.customer_id,
                merged, "Merged duplicate entities"
            );
        }

        Ok(ExtractedEntities {
            entities,
            merged_duplicates: merged,
        })
    }

    /// Build the PERSON entity: the named customer if the file analysis
    /// identified one, otherwise a customer-id placeholder when the needs
    /// analysis vouches that this customer exists
    fn derive_primary_subject(
        &self,
        request: &ExtractionRequest,
        extraction_id: &str,
    ) -> Result<Entity> {
        let (label, sources): (String, Vec<AnalysisSource>) = match request
            .file_analysis
            .customer_name
            .as_deref()
            .and_then(clean_label)
        {
            Some(name) => (name, vec![AnalysisSource::FileAnalysis]),
            None if request.needs_analysis.is_some() => {
                warn!(
                    customer_id = %request.customer_id,
                    "No customer name in file analysis, using placeholder subject"
                );
                (
                    format!("Customer {}", request.customer_id),
                    vec![AnalysisSource::NeedsAnalysis],
                )
            }
            None => {
                return Err(PipelineError::MissingPrimarySubject {
                    customer_id: request.customer_id.clone(),
                    extraction_id: extraction_id.to_string(),
                })
            }
        };

        // Max observed confidence among mentions of the subject's name;
        // the subject prior applies when the name only appears in metadata
        let confidence = request
            .file_analysis
            .entity_mentions
            .iter()
            .filter(|m| normalize_label(&m.text) == normalize_label(&label))
            .map(|m| clamp_confidence(m.confidence))
            .fold(None::<f32>, |acc, c| Some(acc.map_or(c, |a| a.max(c))))
            .unwrap_or(PERSON_CONFIDENCE);

        let mut properties = BTreeMap::new();
        properties.insert("role".to_string(), "primary_subject".to_string());

        Ok(Entity {
            id: entity_id(&request.customer_id, EntityType::Person, &label),
            entity_type: EntityType::Person,
            label,
            confidence,
            sources: sources.into_iter().collect(),
            customer_id: request.customer_id.clone(),
            extraction_id: extraction_id.to_string(),
            created_at: Utc::now(),
            properties,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_phrases(
        &self,
        out: &mut Vec<Entity>,
        request: &ExtractionRequest,
        extraction_id: &str,
        phrases: &[ScoredPhrase],
        entity_type: EntityType,
        default_confidence: f32,
        cap: usize,
        category: &str,
    ) {
        let source = match entity_type {
            EntityType::BehavioralPattern | EntityType::PersonalityTrait => {
                AnalysisSource::NeedsAnalysis
            }
            _ => AnalysisSource::FileAnalysis,
        };

        for phrase in phrases.iter().take(cap) {
            let Some(label) = clean_label(&phrase.text) else {
                debug!(category, text = %phrase.text, "Skipped unusable phrase");
                continue;
            };
            let confidence = clamp_confidence(phrase.confidence.unwrap_or(default_confidence));
            let mut properties = BTreeMap::new();
            properties.insert("category".to_string(), category.to_string());
            out.push(Entity {
                id: entity_id(&request.customer_id, entity_type, &label),
                entity_type,
                label,
                confidence,
                sources: [source].into(),
                customer_id: request.customer_id.clone(),
                extraction_id: extraction_id.to_string(),
                created_at: Utc::now(),
                properties,
            });
        }
    }
}

/// Normalize an analyzer phrase into an entity label
///
/// Collapses whitespace, strips filler prefixes, and rejects fragments
/// shorter than three characters. Returns None for unusable input.
pub fn clean_label(raw: &str) -> Option<String> {
    let mut label = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    for prefix in STRIP_PREFIXES {
        if let Some(rest) = label.strip_prefix(prefix) {
            label = rest.to_string();
            break;
        }
    }
    if label.len() < MIN_LABEL_LENGTH {
        return None;
    }
    Some(label)
}

/// Merge entities sharing (type, normalized label): the higher-confidence
/// record wins, source attributions are unioned. Returns the survivors in
/// first-seen order plus the number of records merged away
fn deduplicate(raw: Vec<Entity>) -> (Vec<Entity>, usize) {
    let mut order: Vec<(EntityType, String)> = Vec::new();
    let mut by_key: BTreeMap<(EntityType, String), Entity> = BTreeMap::new();
    let mut merged = 0usize;

    for entity in raw {
        let key = (entity.entity_type, entity.normalized_label());
        match by_key.get_mut(&key) {
            None => {
                order.push(key.clone());
                by_key.insert(key, entity);
            }
            Some(existing) => {
                merged += 1;
                let sources = entity.sources.clone();
                if entity.confidence > existing.confidence {
                    let mut winner = entity;
                    winner.sources.extend(existing.sources.iter().copied());
                    *existing = winner;
                } else {
                    existing.sources.extend(sources);
                }
            }
        }
    }

    let entities = order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect();
    (entities, merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{FileAnalysis, Need, NeedsAnalysis};

    fn request_with_name(name: &str) -> ExtractionRequest {
        ExtractionRequest {
            customer_id: "cust_1".to_string(),
            extraction_id: None,
            file_analysis: FileAnalysis {
                customer_name: Some(name.to_string()),
                ..FileAnalysis::default()
            },
            needs_analysis: None,
        }
    }

    #[test]
    fn test_clean_label() {
        assert_eq!(clean_label("  Financial   Planning "), Some("Financial Planning".to_string()));
        assert_eq!(clean_label("Mentioned Retirement"), Some("Retirement".to_string()));
        assert_eq!(clean_label("Shows Leadership"), Some("Leadership".to_string()));
        assert_eq!(clean_label("ab"), None);
        assert_eq!(clean_label("   "), None);
    }

    #[test]
    fn test_person_entity_from_name() {
        let extractor = EntityExtractor::new(PipelineConfig::default());
        let result = extractor
            .extract(&request_with_name("Tim Wolff"), "extraction_1")
            .unwrap();
        let person = &result.entities[0];
        assert_eq!(person.entity_type, EntityType::Person);
        assert_eq!(person.label, "Tim Wolff");
        assert!((person.confidence - PERSON_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_person_confidence_from_mentions() {
        use crate::analysis::EntityMention;

        let extractor = EntityExtractor::new(PipelineConfig::default());
        let mut request = request_with_name("Tim Wolff");
        request.file_analysis.entity_mentions = vec![
            EntityMention {
                text: "tim wolff".to_string(),
                confidence: 0.6,
            },
            EntityMention {
                text: "Tim  Wolff".to_string(),
                confidence: 0.88,
            },
            EntityMention {
                text: "Someone Else".to_string(),
                confidence: 0.99,
            },
        ];
        let result = extractor.extract(&request, "extraction_1").unwrap();
        assert!((result.entities[0].confidence - 0.88).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_subject_without_name_or_needs() {
        let extractor = EntityExtractor::new(PipelineConfig::default());
        let mut request = request_with_name("x");
        request.file_analysis.customer_name = None;
        let err = extractor.extract(&request, "extraction_1").unwrap_err();
        assert_eq!(err.code(), "MISSING_PRIMARY_SUBJECT");
    }

    #[test]
    fn test_placeholder_subject_with_needs_only() {
        let extractor = EntityExtractor::new(PipelineConfig::default());
        let mut request = request_with_name("x");
        request.file_analysis.customer_name = None;
        request.needs_analysis = Some(NeedsAnalysis {
            needs_scores: BTreeMap::new(),
            confidence: 0.9,
            behavioral_patterns: vec![],
            personality_traits: vec![],
        });
        let result = extractor.extract(&request, "extraction_1").unwrap();
        assert_eq!(result.entities[0].label, "Customer cust_1");
    }

    #[test]
    fn test_skill_cap_applies() {
        let extractor = EntityExtractor::new(PipelineConfig::default());
        let mut request = request_with_name("Tim Wolff");
        request.file_analysis.key_insights.skills = (0..10)
            .map(|i| ScoredPhrase::new(format!("Skill number {i}")))
            .collect();
        let result = extractor.extract(&request, "extraction_1").unwrap();
        let skills = result
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Skill)
            .count();
        assert_eq!(skills, 5);
    }

    #[test]
    fn test_need_threshold_and_confidence_semantics() {
        let extractor = EntityExtractor::new(PipelineConfig::default());
        let mut request = request_with_name("Tim Wolff");
        let mut scores = BTreeMap::new();
        scores.insert(Need::Growth, 0.85);
        scores.insert(Need::Variety, 0.2); // below the 0.3 threshold
        request.needs_analysis = Some(NeedsAnalysis {
            needs_scores: scores,
            confidence: 0.7,
            behavioral_patterns: vec![],
            personality_traits: vec![],
        });
        let result = extractor.extract(&request, "extraction_1").unwrap();
        let needs: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Need)
            .collect();
        assert_eq!(needs.len(), 1);
        assert_eq!(needs[0].label, "Need: Growth");
        // Confidence is the analysis confidence, not the need score
        assert!((needs[0].confidence - 0.7).abs() < f32::EPSILON);
        assert_eq!(needs[0].properties.get("score").unwrap(), "0.8500");
    }

    #[test]
    fn test_dedup_keeps_higher_confidence_and_unions_sources() {
        let mut request = request_with_name("Tim Wolff");
        request.file_analysis.key_insights.skills =
            vec![ScoredPhrase::with_confidence("Mentoring", 0.8)];
        request.needs_analysis = Some(NeedsAnalysis {
            needs_scores: BTreeMap::new(),
            confidence: 0.9,
            behavioral_patterns: vec![],
            personality_traits: vec![],
        });
        // Same label twice through themes with different casing: dedup as
        // Concept is separate from Skill, but two concepts merge
        request.file_analysis.key_insights.themes = vec![
            ScoredPhrase::with_confidence("Long Term Security", 0.6),
            ScoredPhrase::with_confidence("long  term security", 0.9),
        ];
        let extractor = EntityExtractor::new(PipelineConfig::default());
        let result = extractor.extract(&request, "extraction_1").unwrap();
        assert_eq!(result.merged_duplicates, 1);
        let concepts: Vec<_> = result
            .entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Concept)
            .collect();
        assert_eq!(concepts.len(), 1);
        assert!((concepts[0].confidence - 0.9).abs() < f32::EPSILON);
    }
}
