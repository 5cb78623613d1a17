//! Shared primitive types used across the whole crate.

use serde::{Deserialize, Serialize};

/// A stable, unique identifier for any stored entity (UUID v4 text).
pub type EntityId = String;

/// The organization that owns a study. One organization = one tenant.
pub type OrganizationId = String;

/// Who is asking. Every tenant-scoped operation takes one of these;
/// authentication itself happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub organization_id: OrganizationId,
    pub user_id: Option<EntityId>,
}

impl TenantContext {
    pub fn new(organization_id: impl Into<OrganizationId>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<EntityId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Fresh identifier for a new row.
pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

/// UTC timestamp with fixed-width fractional seconds so that
/// lexicographic order equals chronological order.
pub fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}
