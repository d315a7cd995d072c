//! Service framework: define commands and subscriptions, validate them, and
//! run them against a shared event bridge and an optional HTTP gateway.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use edupage_services::bus::InMemoryBridge;
//! use edupage_services::service::{
//!     CommandDefinition, HttpMethod, Invocation, Runtime, ServiceDefinition, ServiceInfo,
//! };
//! use serde_json::{json, Value};
//!
//! let definition = ServiceDefinition::new(ServiceInfo::new("User", "1", "users"))
//!     .command(
//!         CommandDefinition::new("validate", "Validates a access token")
//!             .expose_http(HttpMethod::Get, "user/validate")
//!             .handler(|_ctx, _payload, _params| async { Ok(json!({ "valid": true })) }),
//!     );
//!
//! let runtime = Runtime::new(Arc::new(InMemoryBridge::new()));
//! let user = runtime.instance(definition)?;
//! user.start(None).await?;
//!
//! let out = user.invoke("validate", Invocation::new(json!({ "token": "t" }))).await?;
//! ```

mod command;
mod context;
mod definition;
mod error;
mod info;
mod instance;
mod runtime;
mod session;
mod subscription;

pub use command::{
    is_valid_command_name, is_valid_http_path, CommandDefinition, CommandHandler, HandlerFuture,
    HttpExposure, HttpMethod,
};
pub use context::{metadata, Context};
pub use definition::ServiceDefinition;
pub use error::{ConfigurationError, DispatchError, HandlerError, StartError, Violation};
pub use info::ServiceInfo;
pub use instance::{Invocation, RuntimeOptions, ServiceInstance, ServiceState};
pub use runtime::Runtime;
pub use session::{Session, PRINCIPAL_ID, TENANT_ID};
pub use subscription::{SubscriptionDefinition, SubscriptionHandler};

// HTTP gateway (requires "http" feature)
#[cfg(feature = "http")]
pub mod http;
