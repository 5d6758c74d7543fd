//! A handler that calls `TaskContext::abort` emits a `task_aborted` frame
//! instead of a `task_result`, and the aborted execution is never cached
//! (§4.7 "Abort path").

mod common;

use common::{in_memory_identity_store, wait_connected, MockControlPlane};
use orra_sdk_core::service::OrraService;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema)]
struct TaskInput {
    message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct TaskOutput {
    message: String,
}

#[tokio::test]
async fn handler_abort_emits_task_aborted() {
    let control_plane = MockControlPlane::start().await;

    let service = OrraService::new(
        "abort-test",
        "Aborts instead of completing",
        control_plane.base_url(),
        "sk-orra-test-key",
    )
    .unwrap()
    .with_identity_store(in_memory_identity_store())
    .on_task(|_input: TaskInput, task: orra_sdk_core::task::TaskContext| async move {
        task.abort(json!({ "operation": "charge-card", "reason": "insufficient-funds" }));
        Ok(TaskOutput { message: "unused".to_string() })
    })
    .unwrap()
    .start()
    .await
    .unwrap();

    wait_connected(&service).await;

    control_plane.send(json!({
        "type": "task_request",
        "id": "t1",
        "executionId": "e1",
        "idempotencyKey": "k1",
        "input": { "message": "hi" }
    }));

    let frame = control_plane.recv().await;
    assert_eq!(frame["payload"]["type"], "task_aborted");
    assert_eq!(frame["payload"]["taskId"], "t1");
    assert_eq!(frame["payload"]["payload"]["operation"], "charge-card");
    assert_eq!(frame["payload"]["payload"]["reason"], "insufficient-funds");

    // A second delivery with the same idempotency key re-invokes the
    // handler: an abort is not cached the way a result or error is.
    control_plane.send(json!({
        "type": "task_request",
        "id": "t2",
        "executionId": "e2",
        "idempotencyKey": "k1",
        "input": { "message": "hi" }
    }));

    let second = control_plane.recv().await;
    assert_eq!(second["payload"]["type"], "task_aborted");

    service.shutdown();
}
