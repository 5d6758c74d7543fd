//! End-to-end echo scenario against a real local socket (§8 "Echo").

mod common;

use common::{in_memory_identity_store, wait_connected, MockControlPlane};
use orra_sdk_core::service::OrraService;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoInput {
    message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct EchoOutput {
    message: String,
}

#[tokio::test]
async fn echoes_task_input() {
    let control_plane = MockControlPlane::start().await;

    let service = OrraService::new(
        "echo-test",
        "Echoes its input back",
        control_plane.base_url(),
        "sk-orra-test-key",
    )
    .unwrap()
    .with_identity_store(in_memory_identity_store())
    .on_task(|input: EchoInput, _task| async move { Ok(EchoOutput { message: input.message }) })
    .unwrap()
    .start()
    .await
    .unwrap();

    wait_connected(&service).await;
    assert_eq!(control_plane.registrations().await.len(), 1);

    control_plane.send(json!({
        "type": "task_request",
        "id": "t1",
        "executionId": "e1",
        "idempotencyKey": "k1",
        "input": { "message": "Hello World" }
    }));

    let frame = control_plane.recv().await;
    assert_eq!(frame["payload"]["type"], "task_result");
    assert_eq!(frame["payload"]["taskId"], "t1");
    assert_eq!(frame["payload"]["result"]["message"], "Hello World");
    assert!(frame["payload"]["error"].is_null());

    service.shutdown();
}
