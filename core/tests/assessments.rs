//! Persisted assessments: create, replace, residual comparison, cascade.

use hazop_core::{
    engine::HazopEngine,
    error::HazopError,
    hierarchy::{
        AssessmentPhase, AssessmentTarget, ConsequenceParent, EntityRef, NewCause,
        NewConsequence, NewDeviation, NewNode, NewStudy,
    },
    rating::AssessmentInput,
    risk_engine::RiskLevel,
    types::TenantContext,
};

struct Fixture {
    engine: HazopEngine,
    ctx: TenantContext,
    deviation_id: String,
    consequence_id: String,
}

fn fixture() -> Fixture {
    let engine = HazopEngine::build_test().unwrap();
    let store = engine.store();
    let org = store.insert_organization("Acme Refining").unwrap();
    let study = store
        .insert_study(&org.id, None, &NewStudy { title: "Unit 100".into(), ..Default::default() })
        .unwrap();
    let node = store
        .insert_node(
            &study.id,
            &NewNode { node_number: "1".into(), node_name: "Feed pump".into(), ..Default::default() },
        )
        .unwrap();
    let deviation = store
        .insert_deviation(
            &node.id,
            &NewDeviation {
                parameter: "Flow".into(),
                guide_word: "No".into(),
                deviation_description: "No flow to reactor".into(),
            },
        )
        .unwrap();
    let cause = store
        .insert_cause(
            &deviation.id,
            &NewCause { cause_description: "Pump trips".into(), ..Default::default() },
            None,
        )
        .unwrap();
    let consequence = store
        .insert_consequence(
            &ConsequenceParent::Cause(cause.id),
            &NewConsequence {
                consequence_description: "Reactor overheats".into(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    Fixture {
        ctx: TenantContext::new(org.id).with_user("u-analyst"),
        deviation_id: deviation.id,
        consequence_id: consequence.id,
        engine,
    }
}

fn ratings(max: i64, likelihood: i64) -> AssessmentInput {
    AssessmentInput {
        safety_impact: max,
        financial_impact: 1,
        environmental_impact: 1,
        reputation_impact: 1,
        schedule_impact: 1,
        performance_impact: 1,
        likelihood,
    }
}

#[test]
fn assessment_is_stored_with_derived_fields() {
    let f = fixture();
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());
    let stored = f
        .engine
        .assessor()
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(4, 5), Some("pre-safeguard"))
        .unwrap();
    assert_eq!(stored.outcome.risk_score, 20);
    assert_eq!(stored.outcome.risk_level, RiskLevel::High);
    assert_eq!(stored.assessed_by.as_deref(), Some("u-analyst"));

    let loaded = f
        .engine
        .assessor()
        .assessment(&f.ctx, &target, AssessmentPhase::Initial)
        .unwrap()
        .expect("assessment present");
    assert_eq!(loaded.id, stored.id);
    assert_eq!(loaded.outcome, stored.outcome);
    assert_eq!(loaded.notes.as_deref(), Some("pre-safeguard"));
}

#[test]
fn update_recomputes_everything_and_keeps_the_id() {
    let f = fixture();
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());
    let assessor = f.engine.assessor();
    let first = assessor
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(5, 5), None)
        .unwrap();
    let second = assessor
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(2, 3), None)
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.outcome.max_impact, 2);
    assert_eq!(second.outcome.risk_score, 6);
    assert_eq!(second.outcome.risk_level, RiskLevel::Low);
    assert_eq!(f.engine.store().assessment_count().unwrap(), 1);
}

#[test]
fn invalid_ratings_write_nothing() {
    let f = fixture();
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());
    let err = f
        .engine
        .assessor()
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(6, 1), None)
        .unwrap_err();
    assert!(matches!(err, HazopError::Validation { .. }));
    assert_eq!(f.engine.store().assessment_count().unwrap(), 0);
    assert_eq!(f.engine.store().get_deviation(&f.deviation_id).unwrap().revision, 2);
}

#[test]
fn residual_reduction_needs_both_phases() {
    let f = fixture();
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());
    let assessor = f.engine.assessor();

    assessor
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(5, 4), None)
        .unwrap();
    let partial = assessor.residual_reduction(&f.ctx, &target).unwrap();
    assert!(partial.initial.is_some());
    assert!(partial.residual.is_none());
    assert!(partial.reduction.is_none());

    assessor
        .assess_target(&f.ctx, &target, AssessmentPhase::Residual, &ratings(5, 1), None)
        .unwrap();
    let full = assessor.residual_reduction(&f.ctx, &target).unwrap();
    let stats = full.reduction.expect("both phases present");
    assert_eq!(stats.absolute, 15);
    assert!((stats.percentage - 75.0).abs() < 1e-9);
    assert_eq!(stats.initial_level, RiskLevel::High);
    assert_eq!(stats.residual_level, RiskLevel::Low);
}

#[test]
fn legacy_deviation_target_is_supported() {
    let f = fixture();
    let target = AssessmentTarget::Deviation(f.deviation_id.clone());
    let stored = f
        .engine
        .assessor()
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(3, 3), None)
        .unwrap();
    assert_eq!(stored.target, target);
    assert_eq!(stored.outcome.risk_score, 9);
}

#[test]
fn assessments_bump_the_deviation_revision() {
    let f = fixture();
    let store = f.engine.store();
    let before = store.get_deviation(&f.deviation_id).unwrap().revision;
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());
    f.engine
        .assessor()
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(1, 1), None)
        .unwrap();
    assert_eq!(store.get_deviation(&f.deviation_id).unwrap().revision, before + 1);
    assert!(f
        .engine
        .assessor()
        .delete_assessment(&f.ctx, &target, AssessmentPhase::Initial)
        .unwrap());
    assert_eq!(store.get_deviation(&f.deviation_id).unwrap().revision, before + 2);
    assert!(!f
        .engine
        .assessor()
        .delete_assessment(&f.ctx, &target, AssessmentPhase::Initial)
        .unwrap());
}

#[test]
fn deleting_the_owner_cascades_to_assessments() {
    let f = fixture();
    let store = f.engine.store();
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());
    for phase in [AssessmentPhase::Initial, AssessmentPhase::Residual] {
        f.engine
            .assessor()
            .assess_target(&f.ctx, &target, phase, &ratings(3, 2), None)
            .unwrap();
    }
    assert_eq!(store.assessment_count().unwrap(), 2);
    store
        .delete_entity(&EntityRef::Consequence(f.consequence_id.clone()))
        .unwrap();
    assert_eq!(store.assessment_count().unwrap(), 0);
}

#[test]
fn unknown_target_is_not_found() {
    let f = fixture();
    let err = f
        .engine
        .assessor()
        .assess_target(
            &f.ctx,
            &AssessmentTarget::Consequence("missing".into()),
            AssessmentPhase::Initial,
            &ratings(1, 1),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, HazopError::NotFound { .. }));
}

#[test]
fn other_organizations_are_forbidden_and_audited() {
    let f = fixture();
    let store = f.engine.store();
    let intruder = store.insert_organization("Other Co").unwrap();
    let ctx = TenantContext::new(intruder.id.clone());
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());

    let err = f
        .engine
        .assessor()
        .assess_target(&ctx, &target, AssessmentPhase::Initial, &ratings(2, 2), None)
        .unwrap_err();
    assert!(matches!(err, HazopError::Forbidden { entity: "consequence", .. }));
    assert_eq!(store.assessment_count().unwrap(), 0);

    let log = store.audit_log(&intruder.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event_type, "cross_tenant_access_denied");
}

#[test]
fn writes_are_audited() {
    let f = fixture();
    let target = AssessmentTarget::Consequence(f.consequence_id.clone());
    f.engine
        .assessor()
        .assess_target(&f.ctx, &target, AssessmentPhase::Initial, &ratings(5, 5), None)
        .unwrap();
    let log = f.engine.store().audit_log(&f.ctx.organization_id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event_type, "assessment_recorded");
    assert_eq!(log[0].user_id.as_deref(), Some("u-analyst"));
    let payload: serde_json::Value = serde_json::from_str(&log[0].payload).unwrap();
    assert_eq!(payload["risk_score"], 25);
    assert_eq!(payload["risk_level"], "Critical");
}
