//! Logger context (C3): a structured logging span bound to this service's
//! identity, entered by every long-running task the session spawns.

use crate::types::{HandlerKind, ServiceIdentity};
use tracing::Span;

/// Service-scoped context attached to every log line the SDK emits once a
/// service has registered. Built once in [`crate::service`] and cloned
/// into each spawned task.
#[derive(Debug, Clone)]
pub struct LogContext {
    service_name: String,
    kind: HandlerKind,
    identity: ServiceIdentity,
}

impl LogContext {
    /// Builds a context for an already-registered service.
    pub fn new(service_name: impl Into<String>, kind: HandlerKind, identity: ServiceIdentity) -> Self {
        Self {
            service_name: service_name.into(),
            kind,
            identity,
        }
    }

    /// The persisted identity this context is bound to.
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// A `tracing` span carrying `service_id`, `service_name`, and `kind`
    /// as fields; entering it scopes every nested log line.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "orra_service",
            service_id = %self.identity.id,
            service_version = self.identity.version,
            service_name = %self.service_name,
            kind = ?self.kind,
        )
    }
}
