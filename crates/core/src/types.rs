//! Core data model: identity, handler registration, and the runtime
//! tables the session owns (§3 of the design).

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Default retention window for compensation eligibility: 24 hours.
pub const DEFAULT_REVERT_TTL_MS: u64 = 86_400_000;

/// Evict dedup-cache entries older than this.
pub const MAX_PROCESSED_TASKS_AGE_SECS: u64 = 24 * 60 * 60;

/// Evict in-progress entries older than this (stuck handlers).
pub const MAX_IN_PROGRESS_AGE_SECS: u64 = 30 * 60;

/// How often housekeeping sweeps the dedup and in-progress tables.
pub const CLEANUP_INTERVAL_SECS: u64 = 60 * 60;

/// How long a sent message may sit unacked before it is re-queued.
pub const ACK_TIMEOUT_SECS: u64 = 5;

/// Base and max delay for the reconnect backoff curve.
pub const RECONNECT_BASE_SECS: u64 = 1;
pub const RECONNECT_MAX_SECS: u64 = 30;
/// Consecutive failures after which the reconnect controller gives up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// The control-plane-assigned identity of this service, persisted across
/// restarts. Created on first registration, mutated (version bump) on
/// re-registration, never destroyed by the SDK.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Opaque id, always prefixed `s_` by the control plane.
    pub id: String,
    /// Monotonically increasing registration version, starting at 1.
    pub version: u32,
}

/// Whether a registration is a service or an agent; only affects the
/// wire `kind` field and log labels, not SDK behaviour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// A plain task-executing service.
    Service,
    /// A service registered under the `agent` label.
    Agent,
}

/// An in-flight execution, tracked so a duplicate delivery of the same
/// `idempotencyKey` can be answered with `task_status` instead of a second
/// handler invocation.
#[derive(Debug, Clone)]
pub struct PendingTask {
    /// When execution began, used by housekeeping to evict stuck entries.
    pub start_time: Instant,
}

/// A finished execution's outcome, cached under `idempotencyKey` so any
/// later delivery with the same key can be answered without re-invoking
/// the handler.
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// `Ok(result)` on success, `Err(message)` on handler/validation
    /// failure, matching the mutually exclusive `result`/`error` wire
    /// fields.
    pub outcome: Result<serde_json::Value, CachedError>,
    /// When this entry was cached, used by housekeeping for eviction.
    pub timestamp: Instant,
}

/// The cached shape of a failed execution: a message plus optional
/// structured validation details, enough to rebuild the wire `error`
/// field without re-running validation.
#[derive(Debug, Clone)]
pub struct CachedError {
    /// Human-readable failure message.
    pub message: String,
    /// Structured validation issues, if this was a validation failure.
    pub details: Option<serde_json::Value>,
}

impl CachedError {
    /// Renders this cached error as the `error` value of a `task_result`.
    pub fn to_wire(&self) -> serde_json::Value {
        match &self.details {
            Some(details) => serde_json::json!({ "message": self.message, "details": details }),
            None => serde_json::json!({ "message": self.message }),
        }
    }
}

/// A sent-but-unacknowledged outbound envelope, re-queued if no matching
/// `ACK` arrives within [`ACK_TIMEOUT_SECS`].
#[derive(Debug, Clone)]
pub struct PendingMessage {
    /// The exact envelope that was sent, kept around so a timeout can
    /// re-queue it with the same wire `id`.
    pub envelope: crate::wire::OutboundEnvelope,
    /// When the message was sent, used to detect ack timeout.
    pub sent_at: Instant,
}

/// Session connection lifecycle. `Closed` is absorbing: once reached, no
/// reconnection is attempted and further `Start()` calls fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection attempt in flight.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The websocket is open and frames may flow.
    Connected,
    /// `Shutdown` was called; draining in-flight work before closing.
    Closing,
    /// Terminal. No further connection attempts are made.
    Closed,
}
