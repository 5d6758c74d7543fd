//! Compensation path (C10): wrapping a revertible handler's successful
//! output in a compensation envelope, and the revert status the revert
//! handler reports back.
//!
//! Dispatch of *inbound* revert requests lives in [`crate::task`]; this
//! module only builds the envelope a revertible handler's success is
//! wrapped in before it goes out as a `task_result`.

use serde_json::Value;

/// Wraps a revertible handler's output so the control plane knows this
/// task can later be compensated: `{task, compensation: {input: {...},
/// ttl_ms}}`. The wrapped value becomes the `result` field of the
/// outgoing `task_result`.
pub fn wrap_revertible_output(output: Value, original_input: &Value, ttl_ms: u64) -> Value {
    serde_json::json!({
        "task": output.clone(),
        "compensation": {
            "input": {
                "original_task": original_input,
                "task_result": output,
            },
            "ttl_ms": ttl_ms,
        }
    })
}
