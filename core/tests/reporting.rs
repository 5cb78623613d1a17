//! Study risk summary, dashboard metrics and the matrix reference.

use hazop_core::{
    engine::HazopEngine,
    error::HazopError,
    hierarchy::{
        AssessmentPhase, AssessmentTarget, ConsequenceParent, MitigationParent, NewCause,
        NewConsequence, NewDeviation, NewNode, NewRecommendation, NewSafeguard, NewStudy,
    },
    rating::{AssessmentInput, ImpactCategory},
    reporting::{risk_matrix, HIGH_RISK_ITEM_LIMIT},
    risk_engine::{RiskColor, RiskLevel},
    store::HazopStore,
    types::TenantContext,
};

struct Study {
    ctx: TenantContext,
    study_id: String,
}

fn study(store: &HazopStore) -> Study {
    let org = store.insert_organization("Acme").unwrap();
    let study = store
        .insert_study(
            &org.id,
            None,
            &NewStudy {
                title: "Unit 100".into(),
                facility_name: Some("North plant".into()),
                ..Default::default()
            },
        )
        .unwrap();
    Study { ctx: TenantContext::new(org.id), study_id: study.id }
}

fn node(store: &HazopStore, study_id: &str, number: &str, name: &str) -> String {
    store
        .insert_node(
            study_id,
            &NewNode { node_number: number.into(), node_name: name.into(), ..Default::default() },
        )
        .unwrap()
        .id
}

fn deviation(store: &HazopStore, node_id: &str, text: &str) -> String {
    store
        .insert_deviation(
            node_id,
            &NewDeviation {
                parameter: "Flow".into(),
                guide_word: "More".into(),
                deviation_description: text.into(),
            },
        )
        .unwrap()
        .id
}

/// Cause plus one consequence; returns the consequence id.
fn consequence(store: &HazopStore, deviation_id: &str, text: &str) -> String {
    let cause = store
        .insert_cause(
            deviation_id,
            &NewCause { cause_description: format!("cause of {text}"), ..Default::default() },
            None,
        )
        .unwrap();
    store
        .insert_consequence(
            &ConsequenceParent::Cause(cause.id),
            &NewConsequence { consequence_description: text.into(), ..Default::default() },
            None,
        )
        .unwrap()
        .id
}

fn assess(engine: &HazopEngine, ctx: &TenantContext, target: AssessmentTarget, max: i64, likelihood: i64) {
    let input = AssessmentInput {
        safety_impact: 1,
        financial_impact: max,
        environmental_impact: 1,
        reputation_impact: 1,
        schedule_impact: 1,
        performance_impact: 1,
        likelihood,
    };
    engine
        .assessor()
        .assess_target(ctx, &target, AssessmentPhase::Initial, &input, None)
        .unwrap();
}

#[test]
fn summary_buckets_deviations_by_their_worst_item() {
    let engine = HazopEngine::build_test().unwrap();
    let store = engine.store();
    let s = study(store);
    let n = node(store, &s.study_id, "1", "Feed");

    // Deviation A: Low and Critical consequences -> Critical.
    let a = deviation(store, &n, "A");
    let a1 = consequence(store, &a, "a1");
    let a2 = consequence(store, &a, "a2");
    assess(&engine, &s.ctx, AssessmentTarget::Consequence(a1), 1, 2);
    assess(&engine, &s.ctx, AssessmentTarget::Consequence(a2), 5, 5);
    // Deviation B: legacy whole-deviation assessment, Medium.
    let b = deviation(store, &n, "B");
    assess(&engine, &s.ctx, AssessmentTarget::Deviation(b), 4, 3);
    // Deviation C: nothing assessed.
    let c = deviation(store, &n, "C");
    consequence(store, &c, "c1");

    let summary = engine.reporter().risk_summary(&s.ctx, &s.study_id).unwrap();
    assert_eq!(summary.total_deviations, 3);
    assert_eq!(summary.risk_counts.get(RiskLevel::Critical), 1);
    assert_eq!(summary.risk_counts.get(RiskLevel::Medium), 1);
    assert_eq!(summary.risk_counts.get(RiskLevel::Low), 0);
    assert_eq!(summary.risk_counts.not_assessed, 1);
    assert!((summary.assessment_completion - 200.0 / 3.0).abs() < 1e-9);

    assert_eq!(summary.high_risk_items.len(), 1);
    let top = &summary.high_risk_items[0];
    assert_eq!(top.description, "a2");
    assert_eq!(top.risk_score, 25);
    assert_eq!(top.risk_color, RiskColor::Red);
    assert_eq!(top.deviation_id, a);
    assert_eq!(top.node_number, "1");
}

#[test]
fn high_risk_list_is_sorted_and_capped() {
    let engine = HazopEngine::build_test().unwrap();
    let store = engine.store();
    let s = study(store);
    let n = node(store, &s.study_id, "1", "Feed");
    let d = deviation(store, &n, "busy");

    // 12 elevated items with scores 16..=25 cycling, plus a low one.
    let scores = [(4, 5), (5, 4), (5, 5), (4, 5), (5, 5), (5, 4), (4, 5), (5, 5), (5, 4), (4, 5), (5, 5), (5, 4)];
    for (i, (max, likelihood)) in scores.iter().enumerate() {
        let q = consequence(store, &d, &format!("q{i}"));
        assess(&engine, &s.ctx, AssessmentTarget::Consequence(q), *max, *likelihood);
    }
    let low = consequence(store, &d, "low");
    assess(&engine, &s.ctx, AssessmentTarget::Consequence(low), 1, 1);

    let summary = engine.reporter().risk_summary(&s.ctx, &s.study_id).unwrap();
    assert_eq!(summary.high_risk_items.len(), HIGH_RISK_ITEM_LIMIT);
    let listed: Vec<u8> = summary.high_risk_items.iter().map(|i| i.risk_score).collect();
    let mut sorted = listed.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(listed, sorted);
    assert_eq!(listed[0], 25);
    assert!(summary.high_risk_items.iter().all(|i| i.risk_level.is_elevated()));
}

#[test]
fn empty_study_has_zero_completion() {
    let engine = HazopEngine::build_test().unwrap();
    let s = study(engine.store());
    let summary = engine.reporter().risk_summary(&s.ctx, &s.study_id).unwrap();
    assert_eq!(summary.total_deviations, 0);
    assert_eq!(summary.assessment_completion, 0.0);
    assert!(summary.high_risk_items.is_empty());
}

#[test]
fn summary_serializes_with_level_keys() {
    let engine = HazopEngine::build_test().unwrap();
    let store = engine.store();
    let s = study(store);
    let n = node(store, &s.study_id, "1", "Feed");
    deviation(store, &n, "unassessed");
    let summary = engine.reporter().risk_summary(&s.ctx, &s.study_id).unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["risk_counts"]["Not Assessed"], 1);
    assert_eq!(json["risk_counts"]["Critical"], 0);
    assert_eq!(json["assessment_completion"], 0.0);
}

#[test]
fn metrics_count_the_whole_tree() {
    let engine = HazopEngine::build_test().unwrap();
    let store = engine.store();
    let s = study(store);
    let feed = node(store, &s.study_id, "1", "Feed");
    let reactor = node(store, &s.study_id, "2", "Reactor");
    node(store, &s.study_id, "3", "Idle");

    let d1 = deviation(store, &feed, "d1");
    let q = consequence(store, &d1, "q");
    store
        .insert_safeguard(
            &MitigationParent::Consequence(q.clone()),
            &NewSafeguard { safeguard_description: "PSV".into(), ..Default::default() },
            None,
        )
        .unwrap();
    store
        .insert_recommendation(
            &MitigationParent::Consequence(q.clone()),
            &NewRecommendation { recommendation_description: "Test PSV".into(), ..Default::default() },
            None,
        )
        .unwrap();
    assess(&engine, &s.ctx, AssessmentTarget::Consequence(q), 5, 4);
    for i in 0..3 {
        deviation(store, &reactor, &format!("r{i}"));
    }

    let m = engine.reporter().metrics(&s.ctx, &s.study_id).unwrap();
    assert_eq!(m.title, "Unit 100");
    assert_eq!(m.facility_name.as_deref(), Some("North plant"));
    assert_eq!(m.totals.total_nodes, 3);
    assert_eq!(m.totals.total_deviations, 4);
    assert_eq!(m.totals.total_causes, 1);
    assert_eq!(m.totals.total_consequences, 1);
    assert_eq!(m.totals.total_safeguards, 1);
    assert_eq!(m.totals.total_recommendations, 1);
    assert_eq!(m.risk_distribution["high"], 1);
    assert_eq!(m.risk_distribution["low"], 0);

    let by_node: Vec<(&str, i64)> = m
        .deviations_by_node
        .iter()
        .map(|n| (n.node_name.as_str(), n.count))
        .collect();
    assert_eq!(by_node, vec![("Reactor", 3), ("Feed", 1), ("Idle", 0)]);
}

#[test]
fn reports_are_tenant_scoped() {
    let engine = HazopEngine::build_test().unwrap();
    let store = engine.store();
    let s = study(store);
    let other = store.insert_organization("Rival").unwrap();
    let ctx = TenantContext::new(other.id);

    let err = engine.reporter().risk_summary(&ctx, &s.study_id).unwrap_err();
    assert!(matches!(err, HazopError::Forbidden { entity: "study", .. }));
    let err = engine.reporter().metrics(&ctx, "missing").unwrap_err();
    assert!(matches!(err, HazopError::NotFound { entity: "study", .. }));
}

#[test]
fn risk_matrix_lists_bands_and_descriptions() {
    let engine = HazopEngine::build_test().unwrap();
    let matrix = risk_matrix(&engine.config().risk_matrix);
    let bands: Vec<(RiskLevel, u8, u8)> = matrix
        .bands
        .iter()
        .map(|b| (b.level, b.min_score, b.max_score))
        .collect();
    assert_eq!(
        bands,
        vec![
            (RiskLevel::Low, 1, 7),
            (RiskLevel::Medium, 8, 16),
            (RiskLevel::High, 17, 20),
            (RiskLevel::Critical, 21, 25),
        ]
    );
    assert_eq!(matrix.impact_descriptions.len(), 6);
    assert!(matrix.impact_descriptions[&ImpactCategory::Safety][&5].contains("fatalities"));
    assert_eq!(matrix.likelihood_descriptions[&1], "Very Unlikely");
}
