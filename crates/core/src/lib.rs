//! Orra SDK core: lets an external worker process join a remote
//! orchestration control plane, execute assigned tasks with exactly-once
//! semantics, and (for handlers declared revertible) execute later
//! compensating actions.
//!
//! Start with [`service::OrraService`] or [`service::OrraAgent`]:
//!
//! ```no_run
//! use orra_sdk_core::service::OrraService;
//! use serde::{Deserialize, Serialize};
//! use schemars::JsonSchema;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct EchoInput { message: String }
//!
//! #[derive(Serialize, JsonSchema)]
//! struct EchoOutput { message: String }
//!
//! # async fn run() -> orra_sdk_core::error::Result<()> {
//! let handle = OrraService::new(
//!     "echo-service",
//!     "Echoes its input back",
//!     "https://api.orra.dev".parse().unwrap(),
//!     std::env::var("ORRA_API_KEY").unwrap(),
//! )?
//! .on_task(|input: EchoInput, _task: orra_sdk_core::task::TaskContext| async move {
//!     Ok(EchoOutput { message: input.message })
//! })?
//! .start()
//! .await?;
//!
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod compensation;
pub mod error;
pub mod housekeeping;
pub mod identity;
pub mod logger;
pub mod outbound;
pub mod registration;
pub mod schema;
pub mod service;
pub mod session;
pub mod task;
pub mod types;
pub mod wire;

pub use error::{OrraError, Result};
pub use service::{OrraAgent, OrraService, ServiceBuilder, ServiceHandle};
pub use types::{HandlerKind, ServiceIdentity, SessionState};
