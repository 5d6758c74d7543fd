//! Duplicate delivery of the same `idempotencyKey` invokes the handler
//! once and answers both deliveries identically (§8 "Duplicate delivery",
//! testable property #2).

mod common;

use common::{in_memory_identity_store, wait_connected, MockControlPlane};
use orra_sdk_core::service::OrraService;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoInput {
    message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct EchoOutput {
    message: String,
}

#[tokio::test]
async fn invokes_handler_once_for_duplicate_key() {
    let control_plane = MockControlPlane::start().await;
    let invocations = Arc::new(AtomicU32::new(0));

    let service = {
        let invocations = invocations.clone();
        OrraService::new(
            "echo-dup-test",
            "Echoes its input back",
            control_plane.base_url(),
            "sk-orra-test-key",
        )
        .unwrap()
        .with_identity_store(in_memory_identity_store())
        .on_task(move |input: EchoInput, _task| {
            let invocations = invocations.clone();
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
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
    let first = control_plane.recv().await;

    control_plane.send(task_frame);
    let second = control_plane.recv().await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(first["payload"]["result"], second["payload"]["result"]);

    service.shutdown();
}
