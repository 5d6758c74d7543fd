//! Wire frame shapes exchanged with the control plane over the session
//! websocket, and the outbound envelope every frame is wrapped in.
//!
//! Every outbound message is wrapped `{ "id": <string>, "payload": {...} }`
//! so the control plane can ack it independently of its contents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A revert/compensation context attached to a task-request frame when the
/// control plane is asking for a previously-completed task to be undone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevertContext {
    /// Why the revert was triggered, e.g. `"aborted"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Arbitrary payload accompanying the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// The original input and output of a completed task, plus context,
/// handed to a revert handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertSource {
    /// The input the original task was invoked with.
    pub input: Value,
    /// The output the original task produced.
    pub output: Value,
    /// Optional context describing why the revert was requested.
    #[serde(default)]
    pub context: Option<RevertContext>,
}

/// Inbound `task_request` frame. Carries an optional `revert` block when
/// the control plane is asking for compensation of an already-completed
/// task rather than execution of a new one.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRequestPayload {
    /// Control-plane task id.
    pub id: String,
    /// Execution id grouping frames that belong to one logical run.
    #[serde(rename = "executionId")]
    pub execution_id: String,
    /// Idempotency key used for the dedup cache and in-progress table.
    #[serde(rename = "idempotencyKey")]
    pub idempotency_key: String,
    /// Raw task input, validated against the handler's input schema.
    pub input: Value,
    /// Present only when this frame is a compensation request.
    #[serde(default)]
    pub revert: Option<RevertSource>,
}

/// Inbound frame, routed by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundPayload {
    /// Liveness probe from the control plane.
    #[serde(rename = "ping")]
    Ping {
        /// Target service id; frames for other services are ignored.
        #[serde(rename = "serviceId")]
        service_id: String,
    },
    /// Acknowledgement of a previously sent outbound envelope.
    #[serde(rename = "ACK")]
    Ack {
        /// The outbound envelope `id` being acknowledged.
        id: String,
    },
    /// A task (or revert) assignment.
    #[serde(rename = "task_request")]
    TaskRequest(TaskRequestPayload),
}

/// Outcome of a revert handler invocation, forwarded verbatim.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RevertStatus {
    /// The compensating action fully completed.
    Completed,
    /// The compensating action failed outright.
    Failed,
    /// The compensating action completed only part of its work.
    Partial,
}

/// Outbound `task_result` frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultPayload {
    /// Control-plane task id this result answers.
    pub task_id: String,
    /// Execution id this result belongs to.
    pub execution_id: String,
    /// This service's persisted identity.
    pub service_id: String,
    /// Present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure; carries the handler/validation error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// Outbound `task_status` frame, emitted when a duplicate delivery finds a
/// task already in progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusPayload {
    /// Control-plane task id.
    pub task_id: String,
    /// Execution id.
    pub execution_id: String,
    /// This service's persisted identity.
    pub service_id: String,
    /// Current status, e.g. `"in_progress"`.
    pub status: String,
    /// RFC 3339 timestamp of this status report.
    pub timestamp: String,
}

/// Outbound `task_aborted` frame, emitted when the handler calls
/// `TaskContext::abort` instead of returning normally. Distinct from a
/// `task_result.error`: an abort is a deliberate handler decision, not a
/// failure, and is not cached in the dedup table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAbortedPayload {
    /// Control-plane task id.
    pub task_id: String,
    /// Execution id.
    pub execution_id: String,
    /// This service's persisted identity.
    pub service_id: String,
    /// Handler-supplied payload describing the aborted operation and reason.
    pub payload: Value,
}

/// Outbound `pong` frame, the reply to a matching `ping`.
#[derive(Debug, Clone, Serialize)]
pub struct PongPayload {
    /// This service's persisted identity.
    #[serde(rename = "serviceId")]
    pub service_id: String,
}

/// The tagged union of everything the SDK ever sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    /// See [`TaskResultPayload`].
    TaskResult(TaskResultPayload),
    /// See [`TaskStatusPayload`].
    TaskStatus(TaskStatusPayload),
    /// See [`TaskAbortedPayload`].
    TaskAborted(TaskAbortedPayload),
    /// See [`PongPayload`].
    Pong(PongPayload),
}

impl OutboundPayload {
    /// The `executionId` this payload belongs to, used to build the wire
    /// envelope id `msg_<seq>_<executionId>`. `Pong` has none.
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            OutboundPayload::TaskResult(p) => Some(&p.execution_id),
            OutboundPayload::TaskStatus(p) => Some(&p.execution_id),
            OutboundPayload::TaskAborted(p) => Some(&p.execution_id),
            OutboundPayload::Pong(_) => None,
        }
    }
}

/// Every outbound message is wrapped in this envelope before it is
/// serialized onto the wire; the `id` is what pending-ack tracking and
/// ack-timeout re-queueing key on.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundEnvelope {
    /// Unique per-process message id, stable across re-sends.
    pub id: String,
    /// The wrapped frame.
    pub payload: OutboundPayload,
}

impl OutboundEnvelope {
    /// Wraps `payload`, deriving its id from `seq` and, when present, the
    /// payload's `executionId`.
    pub fn new(seq: u64, payload: OutboundPayload) -> Self {
        let id = match payload.execution_id() {
            Some(execution_id) => format!("msg_{seq}_{execution_id}"),
            None => format!("msg_{seq}"),
        };
        Self { id, payload }
    }
}
