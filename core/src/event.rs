//! Audit events.
//!
//! RULE: every write that changes analysis content, and every denied
//! cross-organization access, is appended to the audit log.
//! Variants are added over time; never removed or reordered.

use crate::{
    hierarchy::{AssessmentPhase, AssessmentTarget},
    risk_engine::RiskLevel,
    similarity::CopyResult,
    types::{EntityId, OrganizationId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HazopEvent {
    AssessmentRecorded {
        target: AssessmentTarget,
        phase: AssessmentPhase,
        risk_score: u8,
        risk_level: RiskLevel,
    },
    AssessmentDeleted {
        target: AssessmentTarget,
        phase: AssessmentPhase,
    },
    SubtreeCopied {
        source_deviation_id: EntityId,
        target_deviation_id: EntityId,
        copied: CopyResult,
    },
    NodeDuplicated {
        source_node_id: EntityId,
        new_node_id: EntityId,
        deviations: usize,
        copied: CopyResult,
    },
    CrossTenantAccessDenied {
        entity: String,
        entity_id: EntityId,
        owner_organization_id: OrganizationId,
    },
}

impl HazopEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AssessmentRecorded { .. }      => "assessment_recorded",
            Self::AssessmentDeleted { .. }       => "assessment_deleted",
            Self::SubtreeCopied { .. }           => "subtree_copied",
            Self::NodeDuplicated { .. }          => "node_duplicated",
            Self::CrossTenantAccessDenied { .. } => "cross_tenant_access_denied",
        }
    }
}

/// One row of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Option<i64>,
    pub organization_id: OrganizationId,
    pub user_id: Option<EntityId>,
    pub event_type: String,
    pub payload: String,
    pub created_at: String,
}
