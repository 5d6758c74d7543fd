//! Public builder API: `OrraService` and `OrraAgent` configure a session,
//! attach one task handler and optionally one revert handler, then
//! `start()` into a running, self-contained [`ServiceHandle`].
//!
//! There is no global process-wide session: every handle returned here
//! owns its own identity store, registration client, session, task
//! engine, and housekeeping task, and any number may coexist in one
//! process.

use crate::error::{OrraError, Result};
use crate::identity::{FileIdentityStore, IdentityStore};
use crate::logger::LogContext;
use crate::outbound::OutboundPipeline;
use crate::registration::RegistrationClient;
use crate::schema::HandlerSchema;
use crate::session::{self, SessionHandle};
use crate::task::{HandlerFn, HandlerRegistration, RevertFn, TaskContext, TaskEngine};
use crate::types::{HandlerKind, ServiceIdentity, DEFAULT_REVERT_TTL_MS};
use crate::wire::{RevertSource, RevertStatus};
use futures::future::{BoxFuture, Future};
use futures::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

/// Configures a service registration before `start()`. Built by
/// [`OrraService::new`] or [`OrraAgent::new`]; the only difference
/// between the two is the `kind` sent at registration.
pub struct ServiceBuilder {
    kind: HandlerKind,
    name: String,
    description: String,
    registration_client: RegistrationClient,
    identity_store: Arc<dyn IdentityStore>,
    schema_and_handler: Option<(HandlerSchema, HandlerFn)>,
    revert_fn: Option<RevertFn>,
    revertible: bool,
    revert_ttl_ms: u64,
}

impl ServiceBuilder {
    fn new(kind: HandlerKind, name: impl Into<String>, description: impl Into<String>, base_url: Url, api_key: impl Into<String>) -> Result<Self> {
        let name = name.into();
        // RegistrationClient::new validates the api_key prefix, so a bad
        // key fails here at builder construction, not at start().
        let registration_client = RegistrationClient::new(base_url, api_key)?;

        let identity_store = Arc::new(FileIdentityStore::new(FileIdentityStore::default_path(&name)));
        Ok(Self {
            kind,
            description: description.into(),
            identity_store,
            registration_client,
            name,
            schema_and_handler: None,
            revert_fn: None,
            revertible: false,
            revert_ttl_ms: DEFAULT_REVERT_TTL_MS,
        })
    }

    /// Overrides identity persistence, e.g. with a [`crate::identity::CustomIdentityStore`].
    pub fn with_identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity_store = store;
        self
    }

    /// Declares this handler revertible, with an optional compensation
    /// eligibility window (defaults to [`DEFAULT_REVERT_TTL_MS`]). A
    /// revert handler must be attached via [`Self::on_revert`] before
    /// `start()`, or it fails with `MissingRevertHandlerError`.
    pub fn revertible(mut self, ttl_ms: Option<u64>) -> Self {
        self.revertible = true;
        self.revert_ttl_ms = ttl_ms.unwrap_or(DEFAULT_REVERT_TTL_MS);
        self
    }

    /// Attaches the task handler. `I` and `O` drive JSON schema derivation
    /// and are validated on every task arrival and handler return. The
    /// handler's second argument lets it abort the execution in place of
    /// returning normally; see [`TaskContext::abort`].
    pub fn on_task<I, O, F, Fut>(mut self, f: F) -> Result<Self>
    where
        I: DeserializeOwned + JsonSchema + Send + 'static,
        O: Serialize + JsonSchema + Send + 'static,
        F: Fn(I, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        let schema = HandlerSchema::for_types::<I, O>()?;
        let handler = Arc::new(f);
        let handler_fn: HandlerFn =
            Arc::new(move |value: Value, ctx: TaskContext| -> BoxFuture<'static, Result<Value>> {
                let handler = handler.clone();
                async move {
                    let input: I = serde_json::from_value(value).map_err(|e| {
                        OrraError::HandlerError(format!("failed to decode task input: {e}"))
                    })?;
                    let output = handler(input, ctx).await?;
                    serde_json::to_value(output).map_err(|e| {
                        OrraError::HandlerError(format!("failed to encode task output: {e}"))
                    })
                }
                .boxed()
            });

        self.schema_and_handler = Some((schema, handler_fn));
        Ok(self)
    }

    /// Attaches the compensation handler, required when the task handler
    /// is `revertible`.
    pub fn on_revert<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RevertSource) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RevertStatus>> + Send + 'static,
    {
        let handler = Arc::new(f);
        let revert_fn: RevertFn = Arc::new(move |source: RevertSource| -> BoxFuture<'static, Result<RevertStatus>> {
            let handler = handler.clone();
            async move { handler(source).await }.boxed()
        });

        self.revert_fn = Some(revert_fn);
        self
    }

    /// Registers with the control plane, opens the session, and spawns
    /// the session supervisor and housekeeping tasks. Fails synchronously
    /// if no task handler was attached, or if `revertible` was declared
    /// without a revert handler.
    pub async fn start(self) -> Result<ServiceHandle> {
        let (schema, handler_fn) = self.schema_and_handler.ok_or_else(|| {
            OrraError::InvalidArgument("no task handler registered".to_string())
        })?;

        if self.revertible && self.revert_fn.is_none() {
            return Err(OrraError::MissingRevertHandlerError);
        }

        let prior_id = self.identity_store.load().await?;
        let identity = self
            .registration_client
            .register(
                prior_id.as_deref(),
                &self.name,
                &self.description,
                schema.registration_schema(),
                1,
                self.kind,
                self.revertible,
            )
            .await?;
        self.identity_store.save(&identity.id).await?;

        let log_context = LogContext::new(self.name.clone(), self.kind, identity.clone());

        let registration = Arc::new(HandlerRegistration {
            name: self.name,
            description: self.description,
            schema,
            kind: self.kind,
            revertible: self.revertible,
            revert_ttl_ms: self.revert_ttl_ms,
            handler_fn,
            revert_fn: self.revert_fn,
        });

        let cancel = CancellationToken::new();
        let outbound = OutboundPipeline::new(cancel.clone());
        let engine = Arc::new(TaskEngine::new(registration, identity.id.clone(), outbound.handle()));

        let ws_url = session::derive_ws_url(
            self.registration_client.base_url(),
            &identity.id,
            self.registration_client.api_key(),
        )?;
        let (state_tx, state_rx) = watch::channel(crate::types::SessionState::Disconnected);

        tokio::spawn(
            session::run(ws_url, engine.clone(), identity.id.clone(), outbound, cancel.clone(), state_tx)
                .instrument(log_context.span()),
        );
        tokio::spawn(crate::housekeeping::run(engine, cancel.clone()).instrument(log_context.span()));

        Ok(ServiceHandle {
            identity,
            log_context,
            session: SessionHandle::new(state_rx, cancel),
        })
    }
}

/// A started, self-contained service: its identity, logging context, and
/// a handle into the running session.
pub struct ServiceHandle {
    identity: ServiceIdentity,
    log_context: LogContext,
    session: SessionHandle,
}

impl ServiceHandle {
    /// The identity adopted from the control plane at registration.
    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// The structured-logging context bound to this service.
    pub fn log_context(&self) -> &LogContext {
        &self.log_context
    }

    /// Current session connection state.
    pub fn state(&self) -> crate::types::SessionState {
        self.session.state()
    }

    /// A receiver that observes every session state transition, useful
    /// for tests and callers that want to wait for `Connected`.
    pub fn state_watch(&self) -> watch::Receiver<crate::types::SessionState> {
        self.session.state_watch()
    }

    /// Begins an orderly shutdown: `Closing` → close frame sent →
    /// housekeeping cancelled → `Closed`. Idempotent; any later `start()`
    /// on a new builder for the same identity is unaffected, but this
    /// handle's session never reconnects again.
    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}

/// Entry point for registering as a `service`.
pub struct OrraService;

impl OrraService {
    /// Begins configuring a service registration against `base_url` with
    /// bearer `api_key` (must carry the `sk-orra-` prefix).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        base_url: Url,
        api_key: impl Into<String>,
    ) -> Result<ServiceBuilder> {
        ServiceBuilder::new(HandlerKind::Service, name, description, base_url, api_key)
    }
}

/// Entry point for registering as an `agent`.
pub struct OrraAgent;

impl OrraAgent {
    /// Begins configuring an agent registration against `base_url` with
    /// bearer `api_key` (must carry the `sk-orra-` prefix).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        base_url: Url,
        api_key: impl Into<String>,
    ) -> Result<ServiceBuilder> {
        ServiceBuilder::new(HandlerKind::Agent, name, description, base_url, api_key)
    }
}
