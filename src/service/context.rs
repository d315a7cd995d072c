//! Context passed to command and subscription handlers.
//!
//! Carries the identity of the running service, the caller's session, the
//! service configuration and a handle to the shared bridge. Handlers access
//! everything they need through the context.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::HandlerError;
use super::info::ServiceInfo;
use super::session::{Session, PRINCIPAL_ID};
use crate::bus::{Event, EventPattern, SharedBridge, TransportError};

/// Metadata keys stamped on every event a service publishes.
pub mod metadata {
    pub const SERVICE: &str = "service";
    pub const VERSION: &str = "version";
    pub const COMMAND: &str = "command";
    pub const CORRELATION_ID: &str = "correlation-id";
}

/// The context passed to every handler invocation.
///
/// Contexts are cheap to clone and own everything they reference, so a
/// handler may move its context into spawned work.
///
/// ## Example
///
/// ```ignore
/// async fn register(ctx: Context, payload: Value, _params: Value) -> Result<Value, HandlerError> {
///     let input: RegisterInput = serde_json::from_value(payload)?;
///     tracing::info!(service = %ctx.service(), username = %input.username, "registering");
///     Ok(json!({ "token": "..." }))
/// }
/// ```
#[derive(Clone)]
pub struct Context {
    service: ServiceInfo,
    /// Command name, or subscription pattern for event handlers.
    trigger: String,
    message_id: String,
    session: Session,
    config: Arc<Value>,
    bridge: Arc<SharedBridge>,
    shutdown: CancellationToken,
}

impl Context {
    pub(crate) fn new(
        service: ServiceInfo,
        trigger: impl Into<String>,
        message_id: impl Into<String>,
        session: Session,
        config: Arc<Value>,
        bridge: Arc<SharedBridge>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            service,
            trigger: trigger.into(),
            message_id: message_id.into(),
            session,
            config,
            bridge,
            shutdown,
        }
    }

    pub fn service(&self) -> &ServiceInfo {
        &self.service
    }

    /// Name of the command (or pattern of the subscription) being handled.
    pub fn command_name(&self) -> &str {
        &self.trigger
    }

    /// Id of the message that triggered this invocation. Used as the
    /// correlation id of any event published from it.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get the principal ID from the session. Returns `Unauthorized` if not present.
    pub fn principal_id(&self) -> Result<&str, HandlerError> {
        self.session
            .principal_id()
            .ok_or_else(|| HandlerError::Unauthorized("missing principal ID in session".into()))
    }

    /// Deserialize the service configuration into a typed struct.
    pub fn config<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.config.as_ref().clone())
            .map_err(|e| HandlerError::DecodeFailed(format!("service config: {e}")))
    }

    pub fn raw_config(&self) -> &Value {
        &self.config
    }

    /// Cancelled when the owning service instance stops.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Publish an additional event on the shared bridge.
    pub async fn emit<T: Serialize>(&self, event_name: &str, payload: &T) -> Result<(), HandlerError> {
        EventPattern::event_name(event_name)
            .map_err(|e| HandlerError::Rejected(format!("cannot emit `{event_name}`: {e}")))?;
        let payload = serde_json::to_value(payload)?;
        let event = outgoing_event(
            &self.service,
            &self.trigger,
            &self.message_id,
            &self.session,
            event_name,
            &payload,
        )?;
        self.bridge.publish(event).await?;
        Ok(())
    }
}

/// Build an event published by `service` while handling `trigger`.
pub(crate) fn outgoing_event(
    service: &ServiceInfo,
    trigger: &str,
    correlation_id: &str,
    session: &Session,
    event_name: &str,
    payload: &Value,
) -> Result<Event, TransportError> {
    let mut event = Event::with_json_payload(Event::next_id(), event_name, payload)
        .map_err(|e| TransportError::Publish(e.to_string()))?
        .with_metadata(metadata::SERVICE, service.name.as_str())
        .with_metadata(metadata::VERSION, service.version.as_str())
        .with_metadata(metadata::COMMAND, trigger)
        .with_metadata(metadata::CORRELATION_ID, correlation_id);
    if let Some(principal) = session.principal_id() {
        event = event.with_metadata(PRINCIPAL_ID, principal);
    }
    Ok(event)
}
