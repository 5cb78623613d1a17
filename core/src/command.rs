use serde::{Deserialize, Serialize};
use crate::{
    hierarchy::{
        AssessmentPhase, AssessmentTarget, ConsequenceParent, EntityRef, MitigationParent,
        NewCause, NewConsequence, NewDeviation, NewNode, NewRecommendation, NewSafeguard,
        NewStudy, RecommendationStatus,
    },
    similarity::{CopyOptions, DuplicateNodeRequest},
    types::EntityId,
};

/// All client-issued commands.
/// Variants are added over time; never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HazopCommand {
    // ── Hierarchy ─────────────────────────────────
    CreateStudy {
        #[serde(flatten)]
        study: NewStudy,
    },
    CreateNode {
        study_id: EntityId,
        #[serde(flatten)]
        node: NewNode,
    },
    CreateDeviation {
        node_id: EntityId,
        #[serde(flatten)]
        deviation: NewDeviation,
    },
    GetDeviation {
        deviation_id: EntityId,
    },
    ListStudies,
    ListNodes {
        study_id: EntityId,
    },
    ListDeviations {
        node_id: EntityId,
    },
    AddCause {
        deviation_id: EntityId,
        #[serde(flatten)]
        cause: NewCause,
    },
    AddConsequence {
        parent: ConsequenceParent,
        #[serde(flatten)]
        consequence: NewConsequence,
    },
    AddSafeguard {
        parent: MitigationParent,
        #[serde(flatten)]
        safeguard: NewSafeguard,
    },
    AddRecommendation {
        parent: MitigationParent,
        #[serde(flatten)]
        recommendation: NewRecommendation,
    },
    SetRecommendationStatus {
        recommendation_id: EntityId,
        status: RecommendationStatus,
    },
    Delete {
        entity: EntityRef,
    },
    DeleteStudy {
        study_id: EntityId,
    },
    DeleteNode {
        node_id: EntityId,
    },

    // ── Risk scoring ──────────────────────────────
    /// Score a rating set without storing it.
    Score {
        ratings: serde_json::Value,
    },
    Assess {
        target: AssessmentTarget,
        #[serde(default = "initial_phase")]
        phase: AssessmentPhase,
        ratings: serde_json::Value,
        #[serde(default)]
        notes: Option<String>,
    },
    GetAssessment {
        target: AssessmentTarget,
        #[serde(default = "initial_phase")]
        phase: AssessmentPhase,
    },
    DeleteAssessment {
        target: AssessmentTarget,
        #[serde(default = "initial_phase")]
        phase: AssessmentPhase,
    },
    ResidualReduction {
        target: AssessmentTarget,
    },
    ListAssessments {
        study_id: EntityId,
        #[serde(default = "initial_phase")]
        phase: AssessmentPhase,
    },
    RiskMatrix,

    // ── Copy from previous ────────────────────────
    FindSimilar {
        parameter: String,
        guide_word: String,
        #[serde(default)]
        exclude_deviation_id: Option<EntityId>,
    },
    CopyFromPrevious {
        target_deviation_id: EntityId,
        source_deviation_id: EntityId,
        #[serde(flatten)]
        flags: CopyFlags,
    },
    DuplicateNode {
        node_id: EntityId,
        #[serde(flatten)]
        request: DuplicateNodeRequest,
    },

    // ── Reporting ─────────────────────────────────
    RiskSummary {
        study_id: EntityId,
    },
    StudyMetrics {
        study_id: EntityId,
    },
    AuditLog,
}

fn initial_phase() -> AssessmentPhase {
    AssessmentPhase::Initial
}

/// Copy flags as sent by a client. Absent flags fall back to the
/// configured defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CopyFlags {
    #[serde(default)]
    pub copy_causes: Option<bool>,
    #[serde(default)]
    pub copy_consequences: Option<bool>,
    #[serde(default)]
    pub copy_safeguards: Option<bool>,
    #[serde(default)]
    pub copy_recommendations: Option<bool>,
}

impl CopyFlags {
    pub fn resolve(&self, defaults: &CopyOptions) -> CopyOptions {
        CopyOptions {
            copy_causes: self.copy_causes.unwrap_or(defaults.copy_causes),
            copy_consequences: self.copy_consequences.unwrap_or(defaults.copy_consequences),
            copy_safeguards: self.copy_safeguards.unwrap_or(defaults.copy_safeguards),
            copy_recommendations: self
                .copy_recommendations
                .unwrap_or(defaults.copy_recommendations),
        }
    }
}
