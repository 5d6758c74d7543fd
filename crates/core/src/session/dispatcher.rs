//! Inbound dispatcher (C7): parses each frame as JSON and routes it by
//! `type`. Malformed JSON and unrecognized frames are logged and
//! dropped; the session is never torn down by a bad frame.

use crate::outbound::OutboundHandle;
use crate::task::TaskEngine;
use crate::wire::{InboundPayload, PongPayload};
use crate::wire::OutboundPayload;
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Routes inbound frames to the outbound pipeline (`pong`, `ACK`) or the
/// task engine (`task_request`).
pub struct Dispatcher {
    service_id: String,
    outbound: OutboundHandle,
    engine: Arc<TaskEngine>,
}

impl Dispatcher {
    /// Builds a dispatcher bound to one service identity, outbound
    /// pipeline, and task engine.
    pub fn new(service_id: String, outbound: OutboundHandle, engine: Arc<TaskEngine>) -> Self {
        Self {
            service_id,
            outbound,
            engine,
        }
    }

    /// Parses and routes one inbound text frame.
    pub async fn handle_text(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "received malformed frame, dropping");
                return;
            }
        };

        let payload: InboundPayload = match serde_json::from_value(value.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                let frame_type = value.get("type").and_then(serde_json::Value::as_str);
                warn!(frame_type, error = %e, "dropping unrecognized frame");
                return;
            }
        };

        match payload {
            InboundPayload::Ping { service_id } => self.handle_ping(service_id),
            InboundPayload::Ack { id } => self.handle_ack(id),
            InboundPayload::TaskRequest(task) => self.handle_task_request(task).await,
        }
    }

    fn handle_ping(&self, service_id: String) {
        if service_id != self.service_id {
            trace!(%service_id, "ignoring ping addressed to another service");
            return;
        }

        self.outbound.enqueue(OutboundPayload::Pong(PongPayload {
            service_id: self.service_id.clone(),
        }));
    }

    fn handle_ack(&self, id: String) {
        if !self.outbound.acknowledge(&id) {
            trace!(message_id = %id, "ack for unknown or already-cleared message");
        }
    }

    async fn handle_task_request(&self, task: crate::wire::TaskRequestPayload) {
        // Spawned so one slow handler invocation never blocks the reader
        // loop from picking up the next frame; the engine itself is the
        // serialization point per idempotencyKey via the in-progress table.
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.handle(task).await;
        });
    }
}
