//! The HAZOP engine: one store, one config, one dispatch entry point.
//!
//! RULES:
//!   - Every command runs on behalf of a `TenantContext`.
//!   - Records are checked against the caller's organization before use.
//!   - Results are returned as JSON values so any front end can relay them.

use crate::{
    access::{authorize, Scope},
    assessment::RiskAssessor,
    command::HazopCommand,
    config::HazopConfig,
    error::HazopResult,
    hierarchy::{ConsequenceParent, EntityRef, MitigationParent},
    rating::AssessmentInput,
    reporting::{risk_matrix, StudyReporter},
    risk_engine,
    similarity::{CancelToken, SimilarityMatcher},
    store::HazopStore,
    types::TenantContext,
};
use serde::Serialize;
use serde_json::Value;

pub struct HazopEngine {
    store: HazopStore,
    config: HazopConfig,
}

impl HazopEngine {
    pub fn new(store: HazopStore, config: HazopConfig) -> Self {
        Self { store, config }
    }

    /// Open the database, apply migrations and load config from `data_dir`.
    pub fn build(db_path: &str, data_dir: &str) -> HazopResult<Self> {
        let store = HazopStore::open(db_path)?;
        store.migrate()?;
        let config = HazopConfig::load(data_dir)?;
        log::info!("engine ready: db={db_path} data_dir={data_dir}");
        Ok(Self::new(store, config))
    }

    /// In-memory store with the built-in test config.
    pub fn build_test() -> HazopResult<Self> {
        let store = HazopStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, HazopConfig::default_test()))
    }

    pub fn store(&self) -> &HazopStore {
        &self.store
    }

    pub fn config(&self) -> &HazopConfig {
        &self.config
    }

    pub fn assessor(&self) -> RiskAssessor<'_> {
        RiskAssessor::new(&self.store)
    }

    pub fn matcher(&self) -> SimilarityMatcher<'_> {
        SimilarityMatcher::new(&self.store, &self.config.similarity)
    }

    pub fn reporter(&self) -> StudyReporter<'_> {
        StudyReporter::new(&self.store)
    }

    /// Run one command without a cancellation handle.
    pub fn dispatch(&self, ctx: &TenantContext, cmd: HazopCommand) -> HazopResult<Value> {
        self.dispatch_with(ctx, cmd, &CancelToken::new())
    }

    pub fn dispatch_with(
        &self,
        ctx: &TenantContext,
        cmd: HazopCommand,
        cancel: &CancelToken,
    ) -> HazopResult<Value> {
        let store = &self.store;
        let created_by = ctx.user_id.as_deref();
        match cmd {
            // ── Hierarchy ─────────────────────────────
            HazopCommand::CreateStudy { study } => {
                store.get_organization(&ctx.organization_id)?;
                json(store.insert_study(&ctx.organization_id, created_by, &study)?)
            }
            HazopCommand::CreateNode { study_id, node } => {
                authorize(store, ctx, Scope::Study(&study_id))?;
                json(store.insert_node(&study_id, &node)?)
            }
            HazopCommand::CreateDeviation { node_id, deviation } => {
                authorize(store, ctx, Scope::Node(&node_id))?;
                json(store.insert_deviation(&node_id, &deviation)?)
            }
            HazopCommand::GetDeviation { deviation_id } => {
                authorize(store, ctx, Scope::Entity(&EntityRef::Deviation(deviation_id.clone())))?;
                json(store.get_deviation(&deviation_id)?)
            }
            HazopCommand::ListStudies => {
                json(store.studies_for_organization(&ctx.organization_id)?)
            }
            HazopCommand::ListNodes { study_id } => {
                authorize(store, ctx, Scope::Study(&study_id))?;
                json(store.nodes_for_study(&study_id)?)
            }
            HazopCommand::ListDeviations { node_id } => {
                authorize(store, ctx, Scope::Node(&node_id))?;
                json(store.deviations_for_node(&node_id)?)
            }
            HazopCommand::AddCause { deviation_id, cause } => {
                authorize(store, ctx, Scope::Entity(&EntityRef::Deviation(deviation_id.clone())))?;
                json(store.insert_cause(&deviation_id, &cause, created_by)?)
            }
            HazopCommand::AddConsequence { parent, consequence } => {
                let owner = match &parent {
                    ConsequenceParent::Cause(id) => EntityRef::Cause(id.clone()),
                    ConsequenceParent::Deviation(id) => EntityRef::Deviation(id.clone()),
                };
                authorize(store, ctx, Scope::Entity(&owner))?;
                json(store.insert_consequence(&parent, &consequence, created_by)?)
            }
            HazopCommand::AddSafeguard { parent, safeguard } => {
                authorize(store, ctx, Scope::Entity(&mitigation_owner(&parent)))?;
                json(store.insert_safeguard(&parent, &safeguard, created_by)?)
            }
            HazopCommand::AddRecommendation { parent, recommendation } => {
                authorize(store, ctx, Scope::Entity(&mitigation_owner(&parent)))?;
                json(store.insert_recommendation(&parent, &recommendation, created_by)?)
            }
            HazopCommand::SetRecommendationStatus { recommendation_id, status } => {
                let entity = EntityRef::Recommendation(recommendation_id.clone());
                authorize(store, ctx, Scope::Entity(&entity))?;
                store.update_recommendation_status(&recommendation_id, status)?;
                json(store.get_recommendation(&recommendation_id)?)
            }
            HazopCommand::Delete { entity } => {
                authorize(store, ctx, Scope::Entity(&entity))?;
                store.delete_entity(&entity)?;
                Ok(serde_json::json!({ "deleted": entity }))
            }
            HazopCommand::DeleteStudy { study_id } => {
                authorize(store, ctx, Scope::Study(&study_id))?;
                store.delete_study(&study_id)?;
                Ok(serde_json::json!({ "deleted": { "kind": "study", "id": study_id } }))
            }
            HazopCommand::DeleteNode { node_id } => {
                authorize(store, ctx, Scope::Node(&node_id))?;
                store.delete_node(&node_id)?;
                Ok(serde_json::json!({ "deleted": { "kind": "node", "id": node_id } }))
            }

            // ── Risk scoring ──────────────────────────
            HazopCommand::Score { ratings } => {
                let input = AssessmentInput::from_json(&ratings)?;
                json(risk_engine::assess_input(&input)?)
            }
            HazopCommand::Assess { target, phase, ratings, notes } => {
                let input = AssessmentInput::from_json(&ratings)?;
                json(self.assessor().assess_target(ctx, &target, phase, &input, notes.as_deref())?)
            }
            HazopCommand::GetAssessment { target, phase } => {
                json(self.assessor().assessment(ctx, &target, phase)?)
            }
            HazopCommand::DeleteAssessment { target, phase } => {
                let deleted = self.assessor().delete_assessment(ctx, &target, phase)?;
                Ok(serde_json::json!({ "deleted": deleted }))
            }
            HazopCommand::ResidualReduction { target } => {
                json(self.assessor().residual_reduction(ctx, &target)?)
            }
            HazopCommand::ListAssessments { study_id, phase } => {
                authorize(store, ctx, Scope::Study(&study_id))?;
                json(store.assessments_for_study(&study_id, phase)?)
            }
            HazopCommand::RiskMatrix => json(risk_matrix(&self.config.risk_matrix)),

            // ── Copy from previous ────────────────────
            HazopCommand::FindSimilar { parameter, guide_word, exclude_deviation_id } => {
                json(self.matcher().find_similar(
                    ctx,
                    &parameter,
                    &guide_word,
                    exclude_deviation_id.as_deref(),
                )?)
            }
            HazopCommand::CopyFromPrevious { target_deviation_id, source_deviation_id, flags } => {
                let options = flags.resolve(&self.config.similarity.default_copy);
                let copied = self.matcher().copy_subtree(
                    ctx,
                    &source_deviation_id,
                    &target_deviation_id,
                    &options,
                    cancel,
                )?;
                Ok(serde_json::json!({
                    "copied": copied,
                    "deviation": store.get_deviation(&target_deviation_id)?,
                }))
            }
            HazopCommand::DuplicateNode { node_id, request } => {
                json(self.matcher().duplicate_node(ctx, &node_id, &request, cancel)?)
            }

            // ── Reporting ─────────────────────────────
            HazopCommand::RiskSummary { study_id } => {
                json(self.reporter().risk_summary(ctx, &study_id)?)
            }
            HazopCommand::StudyMetrics { study_id } => {
                json(self.reporter().metrics(ctx, &study_id)?)
            }
            HazopCommand::AuditLog => json(store.audit_log(&ctx.organization_id)?),
        }
    }
}

fn mitigation_owner(parent: &MitigationParent) -> EntityRef {
    match parent {
        MitigationParent::Consequence(id) => EntityRef::Consequence(id.clone()),
        MitigationParent::Deviation(id) => EntityRef::Deviation(id.clone()),
    }
}

fn json<T: Serialize>(value: T) -> HazopResult<Value> {
    Ok(serde_json::to_value(value)?)
}
