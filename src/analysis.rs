//! Upstream analysis document types
//!
//! The pipeline consumes two structured analyzer outputs per customer: a
//! file analysis (who the customer is, what they can do, what they care
//! about) and an optional psychological needs analysis. Both arrive as JSON
//! documents; the serde shapes here are the contract with the analyzers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The six psychological needs scored by the needs analyzer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Need {
    Certainty,
    Variety,
    Significance,
    Connection,
    Growth,
    Contribution,
}

impl Need {
    pub const ALL: [Need; 6] = [
        Need::Certainty,
        Need::Variety,
        Need::Significance,
        Need::Connection,
        Need::Growth,
        Need::Contribution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certainty => "certainty",
            Self::Variety => "variety",
            Self::Significance => "significance",
            Self::Connection => "connection",
            Self::Growth => "growth",
            Self::Contribution => "contribution",
        }
    }

    /// Human-readable entity label ("Need: Certainty")
    pub fn display_label(&self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        format!("Need: {capitalized}")
    }

    /// Behavior keywords associated with this need. A behavioral pattern
    /// containing one of these signals that the pattern expresses the need
    pub fn behavior_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Certainty => &["strategic", "planner", "risk", "manager", "cautious", "analytical"],
            Self::Variety => &["innovative", "creative", "explorer", "adventurous"],
            Self::Significance => &["leader", "achiever", "competitive", "ambitious"],
            Self::Connection => &["collaborative", "team", "social", "helper"],
            Self::Growth => &["learner", "developer", "improver", "student"],
            Self::Contribution => &["helper", "mentor", "teacher", "giver"],
        }
    }
}

/// A phrase the analyzer extracted, optionally with its own confidence.
/// Phrases without a score fall back to the per-category default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPhrase {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl ScoredPhrase {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: Some(confidence),
        }
    }
}

/// An entity mention the analyzer flagged in the source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    pub confidence: f32,
}

/// Key insights section of the file analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyInsights {
    #[serde(default)]
    pub skills: Vec<ScoredPhrase>,
    #[serde(default)]
    pub themes: Vec<ScoredPhrase>,
    #[serde(default)]
    pub goals: Vec<ScoredPhrase>,
}

/// Document-derived analysis of one customer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// The customer's name if the analyzer could identify one. Absence is
    /// recoverable as long as the needs analysis is present
    #[serde(default)]
    pub customer_name: Option<String>,

    /// Raw entity mentions with the analyzer's per-mention confidence.
    /// Mentions of the subject's name feed the PERSON entity confidence
    #[serde(default)]
    pub entity_mentions: Vec<EntityMention>,

    #[serde(default)]
    pub key_insights: KeyInsights,
}

/// Psychological needs analysis of one customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedsAnalysis {
    /// Score in [0.0, 1.0] per need. Missing needs count as unscored, not
    /// zero
    #[serde(default)]
    pub needs_scores: BTreeMap<Need, f32>,

    /// The analyzer's overall confidence in this assessment
    pub confidence: f32,

    #[serde(default)]
    pub behavioral_patterns: Vec<String>,

    #[serde(default)]
    pub personality_traits: Vec<String>,
}

/// One unit of work for the extraction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub customer_id: String,

    /// Caller-supplied extraction id; the pipeline generates a timestamped
    /// one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_id: Option<String>,

    pub file_analysis: FileAnalysis,

    /// Optional: extraction proceeds on file analysis alone when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_analysis: Option<NeedsAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_need_display_label() {
        assert_eq!(Need::Certainty.display_label(), "Need: Certainty");
        assert_eq!(Need::Contribution.display_label(), "Need: Contribution");
    }

    #[test]
    fn test_need_serde_snake_case() {
        let json = serde_json::to_string(&Need::Significance).unwrap();
        assert_eq!(json, "\"significance\"");
    }

    #[test]
    fn test_request_deserializes_with_missing_sections() {
        let raw = r#"{
            "customer_id": "cust_1",
            "file_analysis": {
                "customer_name": "Tim Wolff",
                "key_insights": { "skills": [{"text": "Financial Planning"}] }
            }
        }"#;
        let req: ExtractionRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.customer_id, "cust_1");
        assert!(req.needs_analysis.is_none());
        assert_eq!(req.file_analysis.key_insights.skills.len(), 1);
        assert!(req.file_analysis.key_insights.themes.is_empty());
    }

    #[test]
    fn test_behavior_keywords_cover_all_needs() {
        for need in Need::ALL {
            assert!(!need.behavior_keywords().is_empty());
        }
    }
}
