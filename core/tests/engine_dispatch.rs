//! End-to-end command flow through `HazopEngine::dispatch`.

use hazop_core::{
    command::HazopCommand, engine::HazopEngine, error::HazopError, types::TenantContext,
};
use serde_json::{json, Value};

fn run(engine: &HazopEngine, ctx: &TenantContext, cmd: Value) -> Result<Value, HazopError> {
    let cmd: HazopCommand = serde_json::from_value(cmd).expect("command parses");
    engine.dispatch(ctx, cmd)
}

fn ok(engine: &HazopEngine, ctx: &TenantContext, cmd: Value) -> Value {
    run(engine, ctx, cmd.clone()).unwrap_or_else(|e| panic!("{cmd} failed: {e}"))
}

fn ratings(max: u8, likelihood: u8) -> Value {
    json!({
        "safety_impact": max,
        "financial_impact": 1,
        "environmental_impact": 1,
        "reputation_impact": 1,
        "schedule_impact": 1,
        "performance_impact": 1,
        "likelihood": likelihood
    })
}

/// Study, node and a deviation with one cause and consequence.
/// Returns (study_id, deviation_id, consequence_id).
fn seed(engine: &HazopEngine, ctx: &TenantContext) -> (String, String, String) {
    let study = ok(engine, ctx, json!({"cmd": "create_study", "title": "Unit 200"}));
    let study_id = study["id"].as_str().unwrap().to_string();
    let node = ok(
        engine,
        ctx,
        json!({"cmd": "create_node", "study_id": study_id, "node_number": "2", "node_name": "Reactor"}),
    );
    let deviation = ok(
        engine,
        ctx,
        json!({
            "cmd": "create_deviation",
            "node_id": node["id"],
            "parameter": "Temperature",
            "guide_word": "High",
            "deviation_description": "Runaway reaction"
        }),
    );
    let deviation_id = deviation["id"].as_str().unwrap().to_string();
    let cause = ok(
        engine,
        ctx,
        json!({"cmd": "add_cause", "deviation_id": deviation_id, "cause_description": "Cooling water loss"}),
    );
    let consequence = ok(
        engine,
        ctx,
        json!({
            "cmd": "add_consequence",
            "parent": {"kind": "cause", "id": cause["id"]},
            "consequence_description": "Vessel overpressure"
        }),
    );
    let consequence_id = consequence["id"].as_str().unwrap().to_string();
    (study_id, deviation_id, consequence_id)
}

#[test]
fn score_is_stateless_and_validated() {
    let engine = HazopEngine::build_test().unwrap();
    let ctx = TenantContext::new("any-org");
    let out = ok(&engine, &ctx, json!({"cmd": "score", "ratings": ratings(4, 4)}));
    assert_eq!(out["risk_score"], 16);
    assert_eq!(out["risk_level"], "Medium");
    assert_eq!(out["risk_color"], "yellow");

    let err = run(&engine, &ctx, json!({"cmd": "score", "ratings": ratings(0, 4)})).unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn assess_then_reduce_through_commands() {
    let engine = HazopEngine::build_test().unwrap();
    let org = engine.store().insert_organization("Acme").unwrap();
    let ctx = TenantContext::new(org.id);
    let (_, _, consequence_id) = seed(&engine, &ctx);
    let target = json!({"kind": "consequence", "id": consequence_id});

    let stored = ok(
        &engine,
        &ctx,
        json!({"cmd": "assess", "target": target, "ratings": ratings(5, 4), "notes": "no credit"}),
    );
    assert_eq!(stored["risk_score"], 20);
    assert_eq!(stored["risk_level"], "High");
    assert_eq!(stored["phase"], "initial");

    ok(
        &engine,
        &ctx,
        json!({"cmd": "assess", "target": target, "phase": "residual", "ratings": ratings(5, 2)}),
    );
    let cmp = ok(&engine, &ctx, json!({"cmd": "residual_reduction", "target": target}));
    assert_eq!(cmp["reduction"]["absolute"], 10);
    assert_eq!(cmp["reduction"]["percentage"], 50.0);

    let deleted = ok(
        &engine,
        &ctx,
        json!({"cmd": "delete_assessment", "target": target, "phase": "residual"}),
    );
    assert_eq!(deleted["deleted"], true);
    let gone = ok(
        &engine,
        &ctx,
        json!({"cmd": "get_assessment", "target": target, "phase": "residual"}),
    );
    assert!(gone.is_null());
}

#[test]
fn find_and_copy_from_previous() {
    let engine = HazopEngine::build_test().unwrap();
    let org = engine.store().insert_organization("Acme").unwrap();
    let ctx = TenantContext::new(org.id).with_user("u-1");
    let (study_id, source_id, _) = seed(&engine, &ctx);

    let nodes = engine.store().nodes_for_study(&study_id).unwrap();
    let target = ok(
        &engine,
        &ctx,
        json!({
            "cmd": "create_deviation",
            "node_id": nodes[0].id,
            "parameter": "Temperature",
            "guide_word": "High",
            "deviation_description": "Hot spot in bed"
        }),
    );
    let target_id = target["id"].as_str().unwrap().to_string();

    let found = ok(
        &engine,
        &ctx,
        json!({
            "cmd": "find_similar",
            "parameter": "Temperature",
            "guide_word": "High",
            "exclude_deviation_id": target_id
        }),
    );
    assert!(found.is_array());
    assert_eq!(found.as_array().map(Vec::len), Some(1));
    assert_eq!(found[0]["deviation_id"], source_id.as_str());
    assert_eq!(found[0]["causes_count"], 1);

    let copied = ok(
        &engine,
        &ctx,
        json!({
            "cmd": "copy_from_previous",
            "target_deviation_id": target_id,
            "source_deviation_id": source_id,
            "copy_consequences": false
        }),
    );
    assert_eq!(copied["copied"]["causes"], 1);
    assert_eq!(copied["copied"]["consequences"], 0);
    assert_eq!(copied["deviation"]["id"], target_id.as_str());
}

#[test]
fn hierarchy_commands_are_tenant_checked() {
    let engine = HazopEngine::build_test().unwrap();
    let store = engine.store();
    let owner = TenantContext::new(store.insert_organization("Acme").unwrap().id);
    let intruder = TenantContext::new(store.insert_organization("Rival").unwrap().id);
    let (study_id, deviation_id, _) = seed(&engine, &owner);

    let err = run(
        &engine,
        &intruder,
        json!({"cmd": "create_node", "study_id": study_id, "node_number": "9", "node_name": "X"}),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "forbidden");

    let err = run(
        &engine,
        &intruder,
        json!({"cmd": "delete", "entity": {"kind": "deviation", "id": deviation_id}}),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "forbidden");
    assert!(store.get_deviation(&deviation_id).is_ok());

    let err = run(&engine, &intruder, json!({"cmd": "risk_summary", "study_id": study_id})).unwrap_err();
    assert_eq!(err.kind(), "forbidden");

    let log = ok(&engine, &intruder, json!({"cmd": "audit_log"}));
    assert_eq!(log.as_array().map(Vec::len), Some(3));
}

#[test]
fn create_study_needs_a_known_organization() {
    let engine = HazopEngine::build_test().unwrap();
    let err = run(
        &engine,
        &TenantContext::new("ghost"),
        json!({"cmd": "create_study", "title": "Orphan"}),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn reports_and_matrix_through_commands() {
    let engine = HazopEngine::build_test().unwrap();
    let org = engine.store().insert_organization("Acme").unwrap();
    let ctx = TenantContext::new(org.id);
    let (study_id, _, consequence_id) = seed(&engine, &ctx);
    ok(
        &engine,
        &ctx,
        json!({"cmd": "assess", "target": {"kind": "consequence", "id": consequence_id}, "ratings": ratings(5, 5)}),
    );

    let summary = ok(&engine, &ctx, json!({"cmd": "risk_summary", "study_id": study_id}));
    assert_eq!(summary["risk_counts"]["Critical"], 1);
    assert_eq!(summary["assessment_completion"], 100.0);

    let metrics = ok(&engine, &ctx, json!({"cmd": "study_metrics", "study_id": study_id}));
    assert_eq!(metrics["total_nodes"], 1);
    assert_eq!(metrics["risk_distribution"]["critical"], 1);

    let matrix = ok(&engine, &ctx, json!({"cmd": "risk_matrix"}));
    assert_eq!(matrix["bands"].as_array().map(Vec::len), Some(4));
    assert_eq!(matrix["bands"][3]["color"], "red");
}

#[test]
fn listing_and_deleting_through_commands() {
    let engine = HazopEngine::build_test().unwrap();
    let org = engine.store().insert_organization("Acme").unwrap();
    let ctx = TenantContext::new(org.id);
    let (study_id, deviation_id, consequence_id) = seed(&engine, &ctx);
    ok(
        &engine,
        &ctx,
        json!({"cmd": "assess", "target": {"kind": "consequence", "id": consequence_id}, "ratings": ratings(2, 2)}),
    );

    let studies = ok(&engine, &ctx, json!({"cmd": "list_studies"}));
    assert_eq!(studies[0]["id"], study_id.as_str());
    let nodes = ok(&engine, &ctx, json!({"cmd": "list_nodes", "study_id": study_id}));
    let node_id = nodes[0]["id"].as_str().unwrap().to_string();
    let deviations = ok(&engine, &ctx, json!({"cmd": "list_deviations", "node_id": node_id}));
    assert_eq!(deviations[0]["id"], deviation_id.as_str());
    let assessments = ok(&engine, &ctx, json!({"cmd": "list_assessments", "study_id": study_id}));
    assert_eq!(assessments.as_array().map(Vec::len), Some(1));

    ok(&engine, &ctx, json!({"cmd": "delete_node", "node_id": node_id}));
    assert!(engine.store().get_deviation(&deviation_id).is_err());
    assert_eq!(engine.store().assessment_count().unwrap(), 0);

    ok(&engine, &ctx, json!({"cmd": "delete_study", "study_id": study_id}));
    let studies = ok(&engine, &ctx, json!({"cmd": "list_studies"}));
    assert_eq!(studies.as_array().map(Vec::len), Some(0));
    let err = run(&engine, &ctx, json!({"cmd": "list_nodes", "study_id": study_id})).unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
