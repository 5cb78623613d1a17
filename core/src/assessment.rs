//! Persisted risk assessments.
//!
//! Every write re-runs the risk engine over the full rating set and stores
//! the result whole. Stored derived fields are never patched in place.

use crate::{
    access::{authorize, Scope},
    error::HazopResult,
    event::HazopEvent,
    hierarchy::{AssessmentPhase, AssessmentTarget},
    rating::{AssessmentInput, ImpactRatingSet, LikelihoodRating},
    risk_engine::{self, ReductionStats, RiskOutcome},
    store::HazopStore,
    types::{EntityId, TenantContext},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAssessment {
    pub id: EntityId,
    pub target: AssessmentTarget,
    pub phase: AssessmentPhase,
    pub impacts: ImpactRatingSet,
    pub likelihood: LikelihoodRating,
    #[serde(flatten)]
    pub outcome: RiskOutcome,
    pub notes: Option<String>,
    pub assessed_by: Option<EntityId>,
    pub assessed_at: String,
}

/// Both phases side by side, with the reduction once both exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualComparison {
    pub initial: Option<StoredAssessment>,
    pub residual: Option<StoredAssessment>,
    pub reduction: Option<ReductionStats>,
}

pub struct RiskAssessor<'a> {
    store: &'a HazopStore,
}

impl<'a> RiskAssessor<'a> {
    pub fn new(store: &'a HazopStore) -> Self {
        Self { store }
    }

    /// Create or replace the assessment of `target` for `phase`.
    /// Nothing is written when any rating fails validation.
    pub fn assess_target(
        &self,
        ctx: &TenantContext,
        target: &AssessmentTarget,
        phase: AssessmentPhase,
        input: &AssessmentInput,
        notes: Option<&str>,
    ) -> HazopResult<StoredAssessment> {
        let (impacts, likelihood) = input.validate()?;
        authorize(self.store, ctx, Scope::Entity(&target.as_entity()))?;

        let outcome = risk_engine::assess(&impacts, likelihood);
        let stored = self.store.upsert_assessment(
            target,
            phase,
            &impacts,
            likelihood,
            &outcome,
            notes,
            ctx.user_id.as_deref(),
        )?;
        self.store.append_event(
            ctx,
            &HazopEvent::AssessmentRecorded {
                target: target.clone(),
                phase,
                risk_score: outcome.risk_score,
                risk_level: outcome.risk_level,
            },
        )?;
        log::info!(
            "assessed {} {} ({}): score {} {}",
            target.as_entity().kind(),
            target.as_entity().id(),
            phase.as_str(),
            outcome.risk_score,
            outcome.risk_level.as_str()
        );
        Ok(stored)
    }

    pub fn assessment(
        &self,
        ctx: &TenantContext,
        target: &AssessmentTarget,
        phase: AssessmentPhase,
    ) -> HazopResult<Option<StoredAssessment>> {
        authorize(self.store, ctx, Scope::Entity(&target.as_entity()))?;
        self.store.get_assessment(target, phase)
    }

    /// Returns false when the target had no assessment for `phase`.
    pub fn delete_assessment(
        &self,
        ctx: &TenantContext,
        target: &AssessmentTarget,
        phase: AssessmentPhase,
    ) -> HazopResult<bool> {
        authorize(self.store, ctx, Scope::Entity(&target.as_entity()))?;
        let deleted = self.store.delete_assessment(target, phase)?;
        if deleted {
            self.store.append_event(
                ctx,
                &HazopEvent::AssessmentDeleted {
                    target: target.clone(),
                    phase,
                },
            )?;
        }
        Ok(deleted)
    }

    pub fn residual_reduction(
        &self,
        ctx: &TenantContext,
        target: &AssessmentTarget,
    ) -> HazopResult<ResidualComparison> {
        authorize(self.store, ctx, Scope::Entity(&target.as_entity()))?;
        let initial = self.store.get_assessment(target, AssessmentPhase::Initial)?;
        let residual = self.store.get_assessment(target, AssessmentPhase::Residual)?;
        let reduction = match (&initial, &residual) {
            (Some(i), Some(r)) => Some(risk_engine::reduction(&i.outcome, &r.outcome)),
            _ => None,
        };
        Ok(ResidualComparison {
            initial,
            residual,
            reduction,
        })
    }
}
