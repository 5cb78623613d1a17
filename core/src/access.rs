//! Tenant boundary checks.
//!
//! RULE: every service entry point resolves the owning organization of the
//! records it touches and calls into here before reading or writing.
//! A miss is `NotFound`; a hit owned by someone else is `Forbidden`, logged
//! at warn and appended to the caller's audit log.

use crate::{
    error::{HazopError, HazopResult},
    event::HazopEvent,
    hierarchy::EntityRef,
    store::HazopStore,
    types::TenantContext,
};

/// Scope of a tenant check. Studies and nodes sit above the deviation
/// tree, so they are resolved separately from `EntityRef`.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Study(&'a str),
    Node(&'a str),
    Entity(&'a EntityRef),
}

impl Scope<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Scope::Study(_) => "study",
            Scope::Node(_) => "node",
            Scope::Entity(e) => e.kind(),
        }
    }

    fn id(&self) -> &str {
        match self {
            Scope::Study(id) | Scope::Node(id) => id,
            Scope::Entity(e) => e.id(),
        }
    }
}

pub fn authorize(store: &HazopStore, ctx: &TenantContext, scope: Scope<'_>) -> HazopResult<()> {
    let owner = match scope {
        Scope::Study(id) => store.organization_of_study(id)?,
        Scope::Node(id) => store.organization_of_node(id)?,
        Scope::Entity(entity) => store.organization_of(entity)?,
    };
    if owner == ctx.organization_id {
        return Ok(());
    }

    log::warn!(
        "org {} denied access to {} {} (owned by {owner})",
        ctx.organization_id,
        scope.kind(),
        scope.id()
    );
    store.append_event(
        ctx,
        &HazopEvent::CrossTenantAccessDenied {
            entity: scope.kind().to_string(),
            entity_id: scope.id().to_string(),
            owner_organization_id: owner,
        },
    )?;
    Err(HazopError::forbidden(scope.kind(), scope.id()))
}
