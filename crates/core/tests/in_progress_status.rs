//! A second delivery while the first is still executing yields
//! `task_status status="in_progress"` and never invokes the handler a
//! second time (§8 "In-progress status", testable property #2).

mod common;

use common::{in_memory_identity_store, wait_connected, MockControlPlane};
use orra_sdk_core::service::OrraService;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoInput {
    message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct EchoOutput {
    message: String,
}

struct Gates {
    started: Notify,
    proceed: Notify,
}

#[tokio::test]
async fn duplicate_while_in_progress_yields_status() {
    let control_plane = MockControlPlane::start().await;
    let gates = Arc::new(Gates {
        started: Notify::new(),
        proceed: Notify::new(),
    });

    let service = {
        let gates = gates.clone();
        OrraService::new(
            "echo-inprogress-test",
            "Echoes its input back, slowly",
            control_plane.base_url(),
            "sk-orra-test-key",
        )
        .unwrap()
        .with_identity_store(in_memory_identity_store())
        .on_task(move |input: EchoInput, _task| {
            let gates = gates.clone();
            async move {
                gates.started.notify_one();
                gates.proceed.notified().await;
                Ok(EchoOutput { message: input.message })
            }
        })
        .unwrap()
        .start()
        .await
        .unwrap()
    };

    wait_connected(&service).await;

    let task_frame = json!({
        "type": "task_request",
        "id": "t1",
        "executionId": "e1",
        "idempotencyKey": "k1",
        "input": { "message": "Hello World" }
    });

    control_plane.send(task_frame.clone());
    gates.started.notified().await;

    control_plane.send(task_frame);
    let status_frame = control_plane.recv().await;
    assert_eq!(status_frame["payload"]["type"], "task_status");
    assert_eq!(status_frame["payload"]["status"], "in_progress");

    gates.proceed.notify_one();
    let result_frame = control_plane.recv().await;
    assert_eq!(result_frame["payload"]["type"], "task_result");
    assert_eq!(result_frame["payload"]["result"]["message"], "Hello World");

    service.shutdown();
}
