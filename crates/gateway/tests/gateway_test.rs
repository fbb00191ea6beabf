mod common;

use common::{fast_config, gateway_with, FakeCompute};
use compute_gateway::{
    compute::InstanceStatus,
    gateway::ToolGateway,
    ledger::{ActionKind, ActionOutcome},
    lifecycle::{LifecycleState, MutationResult, PROVISIONAL_NOTE},
    protocol::{RpcPayload, RpcResponse},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_test::assert_ok;

async fn call(gateway: &ToolGateway, name: &str, arguments: Value) -> RpcResponse {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 42,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    });
    gateway
        .handle_bytes(request.to_string().as_bytes())
        .await
        .expect("tools/call always gets a response")
}

fn text_of(response: &RpcResponse) -> Value {
    let RpcPayload::Result(result) = &response.payload else {
        panic!("expected a result, got {:?}", response.payload);
    };
    assert_eq!(result["content"].as_array().unwrap().len(), 1);
    assert_eq!(result["content"][0]["type"], "text");
    let text = result["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("text holds JSON")
}

fn error_code(response: &RpcResponse) -> i64 {
    match &response.payload {
        RpcPayload::Error(e) => e.code,
        RpcPayload::Result(r) => panic!("expected an error, got {}", r),
    }
}

#[tokio::test]
async fn list_instances_scenario() {
    let fake = Arc::new(
        FakeCompute::new()
            .with_instance("a", InstanceStatus::Running)
            .with_instance("b", InstanceStatus::Terminated),
    );
    let gateway = gateway_with(fake.clone(), &fast_config());

    let response = call(&gateway, "list_instances", json!({"project": "p1", "zone": "z1"})).await;

    assert_eq!(response.id, json!(42));
    assert_eq!(
        text_of(&response),
        json!({"instances": [
            {"name": "a", "status": "RUNNING"},
            {"name": "b", "status": "TERMINATED"}
        ]})
    );
    assert_eq!(fake.calls(), vec!["list p1/z1"]);

    let records = gateway.ledger().recent(10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ActionKind::List);
    assert_eq!(records[0].request, json!({"project": "p1", "zone": "z1"}));
    assert_eq!(records[0].result, text_of(&response));
}

#[tokio::test]
async fn unknown_tool_is_method_not_found_without_ledger_entry() {
    let fake = Arc::new(FakeCompute::new());
    let gateway = gateway_with(fake.clone(), &fast_config());

    let response = call(&gateway, "delete_instance", json!({"project": "p1"})).await;

    assert_eq!(error_code(&response), -32601);
    assert_eq!(response.id, json!(42));
    assert!(gateway.ledger().is_empty().await);
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn start_on_running_instance_polls_once() {
    let fake = Arc::new(FakeCompute::new().with_status_script("web-1", &[InstanceStatus::Running]));
    let gateway = gateway_with(fake.clone(), &fast_config());

    let response = call(
        &gateway,
        "start_instance",
        json!({"project": "p1", "zone": "z1", "name": "web-1"}),
    )
    .await;

    let result: MutationResult = serde_json::from_value(text_of(&response)).unwrap();
    assert_eq!(result.state, LifecycleState::TargetReached);
    assert_eq!(result.status, InstanceStatus::Running);
    assert_eq!(fake.count("start"), 1);
    assert_eq!(fake.count("instance"), 1);
}

#[tokio::test]
async fn start_that_never_converges_succeeds_provisionally() {
    let fake = Arc::new(FakeCompute::new().with_status_script("web-1", &[InstanceStatus::Staging]));
    let gateway = gateway_with(fake.clone(), &fast_config());

    let response = call(
        &gateway,
        "start_instance",
        json!({"project": "p1", "zone": "z1", "name": "web-1"}),
    )
    .await;

    let payload = text_of(&response);
    assert_eq!(payload["status"], "STAGING");
    assert_eq!(payload["provisional"], true);
    assert_eq!(payload["message"], PROVISIONAL_NOTE);
    assert_eq!(fake.count("instance"), 3);

    let records = gateway.ledger().recent(1).await;
    assert_eq!(records[0].outcome, ActionOutcome::Provisional);
}

#[tokio::test]
async fn stop_on_terminated_instance_still_calls_provider() {
    let fake = Arc::new(FakeCompute::new().with_instance("web-1", InstanceStatus::Terminated));
    let gateway = gateway_with(fake.clone(), &fast_config());

    let response = call(
        &gateway,
        "stop_instance",
        json!({"project": "p1", "zone": "z1", "name": "web-1"}),
    )
    .await;

    let payload = text_of(&response);
    assert_eq!(payload["state"], "SUBMITTED");
    assert_eq!(fake.count("stop web-1"), 1);

    let records = gateway.ledger().recent(10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ActionKind::Stop);
}

#[tokio::test]
async fn failed_operation_is_server_error_with_one_failed_record() {
    let fake = Arc::new(FakeCompute::new().with_failing_operations(403, "Quota 'CPUS' exceeded"));
    let gateway = gateway_with(fake.clone(), &fast_config());

    let response = call(
        &gateway,
        "start_instance",
        json!({"project": "p1", "zone": "z1", "name": "web-1"}),
    )
    .await;

    assert_eq!(error_code(&response), -32000);
    assert_eq!(response.id, json!(42));
    assert_eq!(fake.count("instance"), 0);

    let records = gateway.ledger().recent(10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ActionKind::Start);
    assert_eq!(records[0].outcome, ActionOutcome::Failed);
    assert_eq!(records[0].result["operation"], "operation-1");
    assert!(records[0].result["error"]
        .as_str()
        .unwrap()
        .contains("Quota 'CPUS' exceeded"));
}

#[tokio::test]
async fn provider_outage_after_submit_is_traced_to_the_operation() {
    let fake = Arc::new(FakeCompute::new().with_operation_outage(503));
    let gateway = gateway_with(fake.clone(), &fast_config());

    let response = call(
        &gateway,
        "start_instance",
        json!({"project": "p1", "zone": "z1", "name": "web-1"}),
    )
    .await;

    assert_eq!(error_code(&response), -32000);
    assert_eq!(fake.count("operation"), 1);

    let records = gateway.ledger().recent(10).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, ActionOutcome::Failed);
    assert_eq!(records[0].result["operation"], "operation-1");
    assert_eq!(
        records[0].result["error"],
        "Provider error (503): backend unavailable"
    );
}

#[tokio::test]
async fn tool_text_round_trips_handler_output() {
    let fake = Arc::new(
        FakeCompute::new()
            .with_instance("db-1", InstanceStatus::Stopping)
            .with_status_script("db-1", &[InstanceStatus::Provisioning, InstanceStatus::Running]),
    );
    let gateway = gateway_with(fake, &fast_config());

    for (tool, args) in [
        ("list_instances", json!({"project": "p1", "zone": "z1"})),
        ("start_instance", json!({"project": "p1", "zone": "z1", "name": "db-1"})),
        ("stop_instance", json!({"project": "p1", "zone": "z1", "name": "db-1"})),
    ] {
        let response = call(&gateway, tool, args).await;
        let parsed = text_of(&response);
        // the ledger keeps the handler output verbatim, so it must equal the parsed text
        let recorded = gateway.ledger().recent(1).await.remove(0).result;
        assert_eq!(parsed, recorded, "{} lost information", tool);
    }

    let response = call(&gateway, "get_recent_actions", json!({})).await;
    let parsed = text_of(&response);
    assert_eq!(parsed["count"], 3);
    let kinds: Vec<&str> = parsed["actions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["LIST", "START", "STOP"]);
}

#[tokio::test]
async fn ledger_evicts_oldest_through_the_gateway() {
    let mut config = fast_config();
    config.ledger.capacity = 2;
    let fake = Arc::new(FakeCompute::new());
    let gateway = gateway_with(fake, &config);

    for zone in ["z1", "z2", "z3"] {
        let args = json!({"project": "p1", "zone": zone});
        let response = call(&gateway, "list_instances", args).await;
        assert_ok!(serde_json::to_string(&response));
    }

    let zones: Vec<String> = gateway
        .ledger()
        .recent(10)
        .await
        .into_iter()
        .map(|r| r.instance.zone)
        .collect();
    assert_eq!(zones, vec!["z2", "z3"]);
}

#[tokio::test]
async fn concurrent_calls_on_different_instances() {
    let fake = Arc::new(
        FakeCompute::new()
            .with_status_script("a", &[InstanceStatus::Staging, InstanceStatus::Running])
            .with_status_script("b", &[InstanceStatus::Running]),
    );
    let gateway = gateway_with(fake.clone(), &fast_config());

    let (a, b) = tokio::join!(
        call(&gateway, "start_instance", json!({"project": "p1", "zone": "z1", "name": "a"})),
        call(&gateway, "start_instance", json!({"project": "p1", "zone": "z1", "name": "b"})),
    );

    assert_eq!(text_of(&a)["state"], "TARGET_REACHED");
    assert_eq!(text_of(&b)["state"], "TARGET_REACHED");
    assert_eq!(fake.count("instance a"), 2);
    assert_eq!(fake.count("instance b"), 1);
    assert_eq!(gateway.ledger().len().await, 2);
}
