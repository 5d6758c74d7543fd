//! Task execution engine (C8) and compensation dispatch (C10): dedup
//! cache lookup, in-progress tracking, handler invocation, result/error
//! construction, and routing of revert requests to the revert handler.

pub mod cache;

use crate::compensation::wrap_revertible_output;
use crate::error::{OrraError, Result};
use crate::outbound::OutboundHandle;
use crate::schema::HandlerSchema;
use crate::types::{CachedError, CachedResult, HandlerKind};
use crate::wire::{
    OutboundPayload, RevertStatus, TaskAbortedPayload, TaskRequestPayload, TaskResultPayload, TaskStatusPayload,
};
use cache::{DedupCache, InProgressTable};
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};

/// Handed to every handler invocation so it can abort the execution
/// instead of returning normally (spec's "task.abort(payload)" path).
/// Calling [`TaskContext::abort`] more than once keeps only the last
/// payload; whatever the handler itself returns afterward is ignored once
/// abort has been called.
#[derive(Clone, Default)]
pub struct TaskContext {
    abort_payload: Arc<Mutex<Option<Value>>>,
}

impl TaskContext {
    fn new() -> Self {
        Self::default()
    }

    /// Marks this execution aborted with `payload`. The engine emits a
    /// `task_aborted` frame once the handler returns, in place of the
    /// ordinary `task_result`, and does not cache the outcome.
    pub fn abort(&self, payload: Value) {
        *self.abort_payload.lock().unwrap() = Some(payload);
    }

    fn taken(&self) -> Option<Value> {
        self.abort_payload.lock().unwrap().take()
    }
}

/// A validated handler invocation: raw JSON in, raw JSON out (or a
/// `HandlerError`-shaped failure). Boxed so the builder API in
/// [`crate::service`] can store one concrete closure behind a generic
/// `register` call.
pub type HandlerFn = Arc<dyn Fn(Value, TaskContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A revert handler invocation, given the original input/output/context.
pub type RevertFn =
    Arc<dyn Fn(crate::wire::RevertSource) -> BoxFuture<'static, Result<RevertStatus>> + Send + Sync>;

/// Everything the engine needs to know about one registered handler.
/// Created once at process start, before `Start()`; immutable thereafter.
pub struct HandlerRegistration {
    /// Handler name, sent at registration and echoed in logs.
    pub name: String,
    /// Human-readable description, sent at registration.
    pub description: String,
    /// Compiled input/output schemas.
    pub schema: HandlerSchema,
    /// Service vs. agent label.
    pub kind: HandlerKind,
    /// Whether successful output should be wrapped in a compensation
    /// envelope and later reverted.
    pub revertible: bool,
    /// Compensation eligibility window, milliseconds.
    pub revert_ttl_ms: u64,
    /// The handler itself.
    pub handler_fn: HandlerFn,
    /// Required when `revertible` is true; `Start()` fails without it.
    pub revert_fn: Option<RevertFn>,
}

/// The task execution engine: owns the dedup cache and in-progress
/// table, and turns inbound `task_request` frames into outbound
/// `task_result`/`task_status` frames.
pub struct TaskEngine {
    registration: Arc<HandlerRegistration>,
    service_id: String,
    dedup: DedupCache,
    in_progress: InProgressTable,
    outbound: OutboundHandle,
}

impl TaskEngine {
    /// Builds an engine bound to one handler registration and service id.
    pub fn new(registration: Arc<HandlerRegistration>, service_id: String, outbound: OutboundHandle) -> Self {
        Self {
            registration,
            service_id,
            dedup: DedupCache::default(),
            in_progress: InProgressTable::default(),
            outbound,
        }
    }

    /// Direct access to the dedup cache, used by housekeeping (C11).
    pub fn dedup_cache(&self) -> &DedupCache {
        &self.dedup
    }

    /// Direct access to the in-progress table, used by housekeeping (C11).
    pub fn in_progress(&self) -> &InProgressTable {
        &self.in_progress
    }

    /// Handles one inbound `task_request` frame. Routes to compensation
    /// dispatch when the frame carries a `revert` block, otherwise runs
    /// the ordinary execution pipeline (§4.7 steps 1-9).
    pub async fn handle(&self, task: TaskRequestPayload) {
        if let Some(revert_source) = task.revert.clone() {
            self.handle_revert(&task, revert_source).await;
            return;
        }

        self.handle_execution(task).await;
    }

    async fn handle_execution(&self, task: TaskRequestPayload) {
        // Step 1: cache lookup.
        if let Some(cached) = self.dedup.get(&task.idempotency_key) {
            info!(idempotency_key = %task.idempotency_key, "dedup cache hit, skipping handler");
            self.emit_result(&task, cached.outcome);
            return;
        }

        // Step 2: in-progress check.
        if self.in_progress.begin(&task.idempotency_key) {
            info!(idempotency_key = %task.idempotency_key, "execution already in progress");
            self.emit_status(&task, "in_progress");
            return;
        }

        // Steps 4-8: validate, invoke, validate, cache, emit. Step 9
        // (remove in-progress entry) always runs via the guard below.
        let outcome = self.run_validated(&task).await;
        self.in_progress.finish(&task.idempotency_key);

        match outcome {
            ExecutionOutcome::Aborted(payload) => {
                info!(idempotency_key = %task.idempotency_key, "handler aborted execution");
                self.emit_aborted(&task, payload);
            }
            ExecutionOutcome::Settled(outcome) => {
                self.dedup.insert(
                    task.idempotency_key.clone(),
                    CachedResult {
                        outcome: outcome.clone(),
                        timestamp: Instant::now(),
                    },
                );
                self.emit_result(&task, outcome);
            }
        }
    }

    async fn run_validated(&self, task: &TaskRequestPayload) -> ExecutionOutcome {
        if let Err(e) = self.registration.schema.validate_input(&task.input) {
            warn!(idempotency_key = %task.idempotency_key, error = %e, "input validation failed");
            return ExecutionOutcome::Settled(Err(to_cached_error(e)));
        }

        let ctx = TaskContext::new();
        let result = (self.registration.handler_fn)(task.input.clone(), ctx.clone()).await;

        if let Some(payload) = ctx.taken() {
            return ExecutionOutcome::Aborted(payload);
        }

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                error!(idempotency_key = %task.idempotency_key, error = %e, "handler error");
                return ExecutionOutcome::Settled(Err(to_cached_error(e)));
            }
        };

        if let Err(e) = self.registration.schema.validate_output(&output) {
            warn!(idempotency_key = %task.idempotency_key, error = %e, "output validation failed");
            return ExecutionOutcome::Settled(Err(to_cached_error(e)));
        }

        let output = if self.registration.revertible {
            wrap_revertible_output(output, &task.input, self.registration.revert_ttl_ms)
        } else {
            output
        };

        ExecutionOutcome::Settled(Ok(output))
    }

    async fn handle_revert(&self, task: &TaskRequestPayload, revert_source: crate::wire::RevertSource) {
        let Some(revert_fn) = self.registration.revert_fn.clone() else {
            error!(task_id = %task.id, "received revert request but no revert handler is registered");
            self.emit_result(
                task,
                Err(CachedError {
                    message: "no revert handler registered".to_string(),
                    details: None,
                }),
            );
            return;
        };

        let status = match revert_fn(revert_source).await {
            Ok(status) => status,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "revert handler failed");
                RevertStatus::Failed
            }
        };

        let result = serde_json::json!({ "status": status });
        self.emit_result(task, Ok(result));
    }

    fn emit_result(&self, task: &TaskRequestPayload, outcome: std::result::Result<Value, CachedError>) {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(cached) => (None, Some(cached.to_wire())),
        };

        self.outbound.enqueue(OutboundPayload::TaskResult(TaskResultPayload {
            task_id: task.id.clone(),
            execution_id: task.execution_id.clone(),
            service_id: self.service_id.clone(),
            result,
            error,
        }));
    }

    fn emit_status(&self, task: &TaskRequestPayload, status: &str) {
        self.outbound.enqueue(OutboundPayload::TaskStatus(TaskStatusPayload {
            task_id: task.id.clone(),
            execution_id: task.execution_id.clone(),
            service_id: self.service_id.clone(),
            status: status.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }));
    }

    fn emit_aborted(&self, task: &TaskRequestPayload, payload: Value) {
        self.outbound.enqueue(OutboundPayload::TaskAborted(TaskAbortedPayload {
            task_id: task.id.clone(),
            execution_id: task.execution_id.clone(),
            service_id: self.service_id.clone(),
            payload,
        }));
    }
}

/// What [`TaskEngine::run_validated`] produced: either a normal, cacheable
/// success/failure outcome, or an abort the handler requested via
/// [`TaskContext::abort`], which is neither cached nor sent as a
/// `task_result`.
enum ExecutionOutcome {
    Settled(std::result::Result<Value, CachedError>),
    Aborted(Value),
}

fn to_cached_error(e: OrraError) -> CachedError {
    let details = e.details();
    CachedError {
        message: e.to_string(),
        details,
    }
}
