//! Minimal external collaborator demonstrating `orra_sdk_core`: registers
//! an echo handler and runs until interrupted. Not part of the SDK
//! surface, shows how a real caller wires it up.

use orra_sdk_core::service::OrraService;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize, JsonSchema)]
struct EchoInput {
    message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct EchoOutput {
    message: String,
}

#[tokio::main]
async fn main() -> orra_sdk_core::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = std::env::var("ORRA_URL").unwrap_or_else(|_| "https://localhost:8005".to_string());
    let api_key = std::env::var("ORRA_API_KEY")
        .expect("ORRA_API_KEY must be set, e.g. sk-orra-...");

    let mut builder = OrraService::new(
        "echo-service",
        "Echoes its input back",
        url.parse().expect("ORRA_URL must be a valid URL"),
        api_key,
    )?;

    if let Ok(path) = std::env::var("ORRA_SERVICE_KEY_PATH") {
        builder = builder.with_identity_store(std::sync::Arc::new(
            orra_sdk_core::identity::FileIdentityStore::new(path),
        ));
    }

    let service = builder
        .on_task(|input: EchoInput, _task: orra_sdk_core::task::TaskContext| async move {
            tracing::info!(message = %input.message, "echoing task input");
            Ok(EchoOutput { message: input.message })
        })?
        .start()
        .await?;

    tracing::info!(
        id = %service.identity().id,
        version = service.identity().version,
        "echo-service registered and connected"
    );

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutting down");
    service.shutdown();

    Ok(())
}
