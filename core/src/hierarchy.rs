//! Records for the study tree:
//!
//!   Organization → Study → Node → Deviation → Cause → Consequence
//!                                                   ├─ Safeguard
//!                                                   ├─ Recommendation
//!                                                   └─ RiskAssessment (per phase)
//!
//! Legacy consequences, safeguards and recommendations may hang directly off
//! a deviation. Each record stores exactly one parent reference; the owning
//! deviation is always derived by walking the tree (`HazopStore::deviation_of`).

use crate::types::{EntityId, OrganizationId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
}

impl Organization {
    /// URL-friendly slug: lowercase, punctuation dropped, runs of
    /// whitespace and dashes collapsed to a single dash, max 100 chars.
    pub fn slug_for(name: &str) -> String {
        let mut slug = String::new();
        let mut pending_dash = false;
        for ch in name.trim().to_lowercase().chars() {
            if ch.is_alphanumeric() || ch == '_' {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(ch);
            } else if ch.is_whitespace() || ch == '-' {
                pending_dash = true;
            }
        }
        slug.chars().take(100).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub id: EntityId,
    pub organization_id: OrganizationId,
    pub title: String,
    pub description: Option<String>,
    pub facility_name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: EntityId,
    pub study_id: EntityId,
    pub node_number: String,
    pub node_name: String,
    pub description: Option<String>,
    pub design_intent: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub id: EntityId,
    pub node_id: EntityId,
    pub parameter: String,
    pub guide_word: String,
    pub deviation_description: String,
    /// Bumped on every change to the deviation's subtree. Clients compare
    /// this instead of diffing snapshots.
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiProvenance {
    pub ai_suggested: bool,
    pub ai_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cause {
    pub id: EntityId,
    pub deviation_id: EntityId,
    pub cause_description: String,
    pub likelihood: Option<String>,
    pub provenance: AiProvenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConsequenceParent {
    Cause(EntityId),
    /// Legacy: attached straight to the deviation, no cause.
    Deviation(EntityId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consequence {
    pub id: EntityId,
    pub parent: ConsequenceParent,
    pub consequence_description: String,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub provenance: AiProvenance,
}

/// Parent of a safeguard or recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MitigationParent {
    Consequence(EntityId),
    /// Legacy: attached straight to the deviation, no consequence.
    Deviation(EntityId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Safeguard {
    pub id: EntityId,
    pub parent: MitigationParent,
    pub safeguard_description: String,
    pub safeguard_type: Option<String>,
    pub effectiveness: Option<String>,
    pub provenance: AiProvenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Open,
    InProgress,
    Completed,
    Closed,
}

impl RecommendationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open       => "open",
            Self::InProgress => "in_progress",
            Self::Completed  => "completed",
            Self::Closed     => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open"        => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "completed"   => Some(Self::Completed),
            "closed"      => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: EntityId,
    pub parent: MitigationParent,
    pub recommendation_description: String,
    pub priority: Option<String>,
    pub responsible_party: Option<String>,
    pub target_date: Option<chrono::NaiveDate>,
    pub status: RecommendationStatus,
    pub provenance: AiProvenance,
}

// ── Creation payloads ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStudy {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub facility_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNode {
    pub node_number: String,
    pub node_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub design_intent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDeviation {
    pub parameter: String,
    pub guide_word: String,
    pub deviation_description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCause {
    pub cause_description: String,
    #[serde(default)]
    pub likelihood: Option<String>,
    #[serde(default)]
    pub provenance: AiProvenance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewConsequence {
    pub consequence_description: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub provenance: AiProvenance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSafeguard {
    pub safeguard_description: String,
    #[serde(default)]
    pub safeguard_type: Option<String>,
    #[serde(default)]
    pub effectiveness: Option<String>,
    #[serde(default)]
    pub provenance: AiProvenance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRecommendation {
    pub recommendation_description: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub responsible_party: Option<String>,
    #[serde(default)]
    pub target_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub provenance: AiProvenance,
}

// ── Addressing ─────────────────────────────────────────────────────

/// Any record below a deviation, addressed by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Deviation(EntityId),
    Cause(EntityId),
    Consequence(EntityId),
    Safeguard(EntityId),
    Recommendation(EntityId),
}

impl EntityRef {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deviation(_)      => "deviation",
            Self::Cause(_)          => "cause",
            Self::Consequence(_)    => "consequence",
            Self::Safeguard(_)      => "safeguard",
            Self::Recommendation(_) => "recommendation",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Deviation(id)
            | Self::Cause(id)
            | Self::Consequence(id)
            | Self::Safeguard(id)
            | Self::Recommendation(id) => id,
        }
    }
}

/// What a risk assessment is attached to. Exactly one, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AssessmentTarget {
    /// Legacy whole-deviation assessment.
    Deviation(EntityId),
    Consequence(EntityId),
}

impl AssessmentTarget {
    pub fn as_entity(&self) -> EntityRef {
        match self {
            Self::Deviation(id)   => EntityRef::Deviation(id.clone()),
            Self::Consequence(id) => EntityRef::Consequence(id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentPhase {
    /// Before safeguards are credited.
    Initial,
    /// After safeguards are credited.
    Residual,
}

impl AssessmentPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial  => "initial",
            Self::Residual => "residual",
        }
    }
}
