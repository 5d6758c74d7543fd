//! Registration client (C2): a one-shot HTTP call that exchanges service
//! metadata for a canonical `{id, version}` identity.

use crate::error::{OrraError, Result};
use crate::types::{HandlerKind, ServiceIdentity};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

const API_KEY_PREFIX: &str = "sk-orra-";

/// Body of `POST {base}/register/service`.
#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    id: Option<&'a str>,
    name: &'a str,
    description: &'a str,
    schema: Value,
    version: u32,
    kind: HandlerKind,
    revertible: bool,
}

/// One-shot HTTP client that exchanges registration metadata for a
/// `ServiceIdentity`. Holds no session state of its own.
pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl RegistrationClient {
    /// Builds a client against `base_url`. Fails synchronously if
    /// `api_key` doesn't carry the literal `sk-orra-` prefix (a
    /// construction-time error, not a registration-time one).
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if !api_key.starts_with(API_KEY_PREFIX) {
            return Err(OrraError::InvalidArgument(
                "Invalid API key format".to_string(),
            ));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        })
    }

    /// The underlying api key, exposed so the session URL builder (C5)
    /// can append it as a query parameter without re-deriving it.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// The control-plane base URL this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Registers (or re-registers) this service with a single POST.
    /// `prior_id` is `None` on first registration, `Some(id)` to
    /// re-register and bump the version. The SDK unconditionally adopts
    /// whatever `{id, version}` the control plane returns. Any non-2xx
    /// response or network failure raises `ServiceRegistrationError`;
    /// the caller (`Start()`) does not retry.
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        &self,
        prior_id: Option<&str>,
        name: &str,
        description: &str,
        schema: Value,
        version: u32,
        kind: HandlerKind,
        revertible: bool,
    ) -> Result<ServiceIdentity> {
        let body = RegistrationRequest {
            id: prior_id,
            name,
            description,
            schema,
            version,
            kind,
            revertible,
        };

        let url = self
            .base_url
            .join("register/service")
            .map_err(OrraError::UrlError)?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrraError::ServiceRegistrationError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OrraError::ServiceRegistrationError(format!(
                "control plane returned {status}: {text}"
            )));
        }

        let identity = response
            .json::<ServiceIdentity>()
            .await
            .map_err(|e| OrraError::ServiceRegistrationError(e.to_string()))?;

        debug!(id = %identity.id, version = identity.version, "registered with control plane");
        Ok(identity)
    }
}
