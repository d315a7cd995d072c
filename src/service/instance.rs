//! A started (or startable) service: lifecycle and command dispatch.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::command::{CommandDefinition, HandlerFuture};
use super::context::{outgoing_event, Context};
use super::definition::ServiceDefinition;
use super::error::{ConfigurationError, DispatchError, HandlerError, StartError, Violation};
use super::info::ServiceInfo;
use super::session::Session;
use crate::bus::{
    bridge_handler, CommandAddress, CommandResponse, Delivery, Event, EventPattern, Message,
    Route, SharedBridge, SubscriptionHandle, TransportError,
};
use crate::schema::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceState::Created => "created",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        })
    }
}

/// Knobs shared by every instance of a runtime.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Upper bound on a single handler run. Exceeding it fails the
    /// invocation as retryable `Unavailable`; the handler keeps running
    /// until it observes cancellation.
    pub handler_timeout: Option<Duration>,
}

/// One command call, independent of the transport it arrived on.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub payload: Value,
    pub parameters: Value,
    pub session: Session,
    pub message_id: Option<String>,
}

impl Invocation {
    /// Call with `payload` and empty parameters.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            parameters: json!({}),
            session: Session::new(),
            message_id: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Decode a bridge command message: a JSON object with optional
    /// `payload` and `parameter` members. Metadata becomes the session.
    pub fn from_message(message: &Message) -> Result<Self, ValidationError> {
        let envelope = if message.payload.iter().all(u8::is_ascii_whitespace) {
            json!({})
        } else {
            message.json::<Value>().map_err(|e| {
                ValidationError::single(format!("malformed JSON message: {e}")).prefixed("message")
            })?
        };
        let Value::Object(mut envelope) = envelope else {
            return Err(ValidationError::single(
                "expected object with `payload` and `parameter`",
            )
            .prefixed("message"));
        };
        let payload = envelope.remove("payload").unwrap_or(Value::Null);
        let parameters = envelope
            .remove("parameter")
            .or_else(|| envelope.remove("parameters"))
            .unwrap_or_else(|| json!({}));
        let session = message
            .metadata
            .as_deref()
            .map(Session::from_pairs)
            .unwrap_or_default();
        Ok(Self {
            payload,
            parameters,
            session,
            message_id: Some(message.id.clone()),
        })
    }
}

/// Configuration and cancellation scope of one run of the instance.
#[derive(Clone)]
struct Activation {
    config: Arc<Value>,
    shutdown: CancellationToken,
}

/// A [`ServiceDefinition`] bound to a bridge.
///
/// Created through [`super::Runtime::instance`]. Listeners are registered on
/// [`start`](Self::start) and removed on [`stop`](Self::stop); both are
/// idempotent and serialized against each other.
pub struct ServiceInstance {
    definition: Arc<ServiceDefinition>,
    bridge: Arc<SharedBridge>,
    options: RuntimeOptions,
    span: Span,
    state: Mutex<ServiceState>,
    activation: RwLock<Option<Activation>>,
    registrations: tokio::sync::Mutex<Vec<SubscriptionHandle>>,
}

impl ServiceInstance {
    pub(crate) fn new(
        definition: Arc<ServiceDefinition>,
        bridge: Arc<SharedBridge>,
        options: RuntimeOptions,
    ) -> Self {
        let info = definition.info();
        let span = info_span!("service", name = %info.name, version = %info.version);
        Self {
            definition,
            bridge,
            options,
            span,
            state: Mutex::new(ServiceState::Created),
            activation: RwLock::new(None),
            registrations: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn info(&self) -> &ServiceInfo {
        self.definition.info()
    }

    pub fn definition(&self) -> &Arc<ServiceDefinition> {
        &self.definition
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Bridge address of one of this service's commands.
    pub fn address(&self, command: &str) -> CommandAddress {
        let info = self.info();
        CommandAddress::new(info.name.as_str(), info.version.as_str(), command)
    }

    /// Validate `config` (or fall back to the default), connect the shared
    /// bridge and register one listener per command and subscription.
    ///
    /// Starting a running instance is a no-op.
    pub async fn start(self: &Arc<Self>, config: Option<Value>) -> Result<(), StartError> {
        let mut registrations = self.registrations.lock().await;
        if self.is_running() {
            debug!(parent: &self.span, "start ignored, already running");
            return Ok(());
        }
        self.set_state(ServiceState::Starting);

        match self.activate(config, &mut registrations).await {
            Ok(()) => {
                self.set_state(ServiceState::Running);
                info!(
                    parent: &self.span,
                    commands = self.definition.commands().len(),
                    subscriptions = self.definition.subscriptions().len(),
                    "service started"
                );
                Ok(())
            }
            Err(err) => {
                for handle in registrations.drain(..) {
                    if let Err(e) = self.bridge.unsubscribe(handle).await {
                        warn!(parent: &self.span, error = %e, "failed to roll back listener");
                    }
                }
                *self.write_activation() = None;
                self.set_state(ServiceState::Failed);
                error!(parent: &self.span, error = %err, "service failed to start");
                Err(err)
            }
        }
    }

    async fn activate(
        self: &Arc<Self>,
        config: Option<Value>,
        registrations: &mut Vec<SubscriptionHandle>,
    ) -> Result<(), StartError> {
        let config = self.resolve_config(config)?;
        self.bridge.ensure_connected().await?;
        *self.write_activation() = Some(Activation {
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        });

        for command in self.definition.commands() {
            let route = Route::Command(self.address(command.name()));
            let handler = self.command_listener(command.name());
            registrations.push(self.bridge.subscribe(route, handler).await?);
        }
        for (index, subscription) in self.definition.subscriptions().iter().enumerate() {
            let pattern = EventPattern::parse(subscription.pattern())
                .map_err(|e| TransportError::Subscribe(e.to_string()))?;
            let handler = self.event_listener(index);
            registrations.push(self.bridge.subscribe(Route::Events(pattern), handler).await?);
        }
        Ok(())
    }

    fn resolve_config(&self, config: Option<Value>) -> Result<Value, ConfigurationError> {
        let schema = self.definition.config_schema();
        let validated = match config {
            Some(config) => schema.validate(&config),
            None => {
                debug!(parent: &self.span, "no configuration given, using default");
                schema.validate(self.definition.default_config())
            }
        };
        validated.map_err(|err| ConfigurationError {
            service: self.info().to_string(),
            violations: vec![Violation::InvalidConfig(err)],
        })
    }

    fn command_listener(self: &Arc<Self>, command: &str) -> crate::bus::BridgeHandler {
        let instance: Weak<Self> = Arc::downgrade(self);
        let command = command.to_string();
        bridge_handler(move |message| {
            let instance = instance.upgrade();
            let command = command.clone();
            async move {
                match instance {
                    Some(instance) => instance.deliver_command(&command, message).await,
                    None => Delivery::nack("service instance dropped", true),
                }
            }
        })
    }

    fn event_listener(self: &Arc<Self>, index: usize) -> crate::bus::BridgeHandler {
        let instance: Weak<Self> = Arc::downgrade(self);
        bridge_handler(move |message| {
            let instance = instance.upgrade();
            async move {
                match instance {
                    Some(instance) => instance.deliver_event(index, message).await,
                    None => Delivery::nack("service instance dropped", true),
                }
            }
        })
    }

    /// Remove every listener and cancel in-flight handlers' shutdown token.
    /// Stopping an instance that is not running is a no-op.
    pub async fn stop(&self) -> Result<(), TransportError> {
        let mut registrations = self.registrations.lock().await;
        if !self.is_running() {
            return Ok(());
        }
        self.set_state(ServiceState::Stopping);
        let activation = self.write_activation().take();
        if let Some(activation) = activation {
            activation.shutdown.cancel();
        }

        let mut first_error = None;
        for handle in registrations.drain(..) {
            if let Err(e) = self.bridge.unsubscribe(handle).await {
                warn!(parent: &self.span, error = %e, "failed to remove listener");
                first_error.get_or_insert(e);
            }
        }
        self.set_state(ServiceState::Stopped);
        info!(parent: &self.span, "service stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Run one command: validate parameters and payload, run the handler,
    /// validate its output and publish the success event.
    ///
    /// Nothing is published unless every step succeeds.
    pub async fn invoke(
        &self,
        command: &str,
        invocation: Invocation,
    ) -> Result<Value, DispatchError> {
        let definition = self
            .definition
            .find_command(command)
            .ok_or_else(|| DispatchError::UnknownCommand(command.to_string()))?;
        let activation = self
            .current_activation()
            .ok_or_else(|| DispatchError::NotRunning(self.info().to_string()))?;
        let message_id = invocation.message_id.clone().unwrap_or_else(Event::next_id);

        let span = info_span!(parent: &self.span, "command", command = %command, message_id = %message_id);
        self.run_command(definition, activation, message_id, invocation)
            .instrument(span)
            .await
    }

    async fn run_command(
        &self,
        definition: &CommandDefinition,
        activation: Activation,
        message_id: String,
        invocation: Invocation,
    ) -> Result<Value, DispatchError> {
        let Invocation {
            payload,
            parameters,
            session,
            ..
        } = invocation;
        let (payload, parameters) = match validate_input(definition, &payload, &parameters) {
            Ok(valid) => valid,
            Err(err) => {
                debug!(error = %err, "rejected invalid input");
                return Err(DispatchError::Validation(err));
            }
        };
        let handler = definition.command_handler().ok_or_else(|| {
            HandlerError::Unavailable(format!("command {} has no handler", definition.name()))
        })?;

        let ctx = self.context(definition.name(), &message_id, session.clone(), &activation);
        let output = self.run_handler(handler(ctx, payload, parameters)).await?;

        let output = definition.output().validate(&output).map_err(|source| {
            error!(error = %source, "handler output violates its contract");
            DispatchError::OutputContract {
                command: definition.name().to_string(),
                source,
            }
        })?;

        if let Some(event_name) = definition.success_event_name() {
            let event = outgoing_event(
                self.info(),
                definition.name(),
                &message_id,
                &session,
                event_name,
                &output,
            )?;
            self.bridge.publish(event).await.map_err(|e| {
                error!(event = %event_name, error = %e, "failed to publish success event");
                e
            })?;
            debug!(event = %event_name, "success event published");
        }
        Ok(output)
    }

    async fn deliver_command(&self, command: &str, message: Message) -> Delivery {
        let result = match Invocation::from_message(&message) {
            Ok(invocation) => self.invoke(command, invocation).await,
            Err(err) => Err(DispatchError::Validation(err)),
        };
        match result {
            Ok(output) => Delivery::ack().with_response(CommandResponse::ok(output)),
            Err(err) => delivery_for(&err).with_response(err.to_response()),
        }
    }

    async fn deliver_event(&self, index: usize, message: Message) -> Delivery {
        let Some(subscription) = self.definition.subscriptions().get(index) else {
            return Delivery::ack();
        };
        let span = info_span!(
            parent: &self.span,
            "subscription",
            pattern = %subscription.pattern(),
            event = %message.event_type,
            message_id = %message.id,
        );
        let result = async {
            let activation = self
                .current_activation()
                .ok_or_else(|| DispatchError::NotRunning(self.info().to_string()))?;
            let payload = if message.payload.is_empty() {
                Value::Null
            } else {
                message.json::<Value>().map_err(|e| {
                    DispatchError::Validation(ValidationError::single(format!(
                        "malformed JSON event: {e}"
                    )))
                })?
            };
            let payload = subscription
                .payload()
                .validate(&payload)
                .map_err(|e| DispatchError::Validation(e.prefixed("payload")))?;
            let handler = subscription.subscription_handler().ok_or_else(|| {
                HandlerError::Unavailable(format!(
                    "subscription {} has no handler",
                    subscription.pattern()
                ))
            })?;

            let session = message
                .metadata
                .as_deref()
                .map(Session::from_pairs)
                .unwrap_or_default();
            let ctx = self.context(subscription.pattern(), &message.id, session.clone(), &activation);
            let output = self.run_handler(handler(ctx, payload)).await?;
            let output = subscription.output().validate(&output).map_err(|source| {
                error!(error = %source, "subscription output violates its contract");
                DispatchError::OutputContract {
                    command: subscription.pattern().to_string(),
                    source,
                }
            })?;
            if let Some(event_name) = subscription.emitted_event() {
                let event = outgoing_event(
                    self.info(),
                    subscription.pattern(),
                    &message.id,
                    &session,
                    event_name,
                    &output,
                )?;
                self.bridge.publish(event).await?;
            }
            Ok::<_, DispatchError>(())
        }
        .instrument(span.clone())
        .await;

        match result {
            Ok(()) => Delivery::ack(),
            Err(err) => {
                let _entered = span.enter();
                if err.is_retryable() {
                    warn!(error = %err, "event handling failed, requesting redelivery");
                } else {
                    debug!(error = %err, "event dropped");
                }
                delivery_for(&err)
            }
        }
    }

    /// Run a handler future on its own task, bounded by the handler timeout.
    /// A panicking handler fails only its own invocation.
    async fn run_handler(&self, future: HandlerFuture) -> Result<Value, HandlerError> {
        let started = Instant::now();
        let task = tokio::spawn(future);
        let joined = match self.options.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout_ms = millis(limit), "handler timed out");
                    return Err(HandlerError::Unavailable(format!(
                        "handler timed out after {}ms",
                        limit.as_millis()
                    )));
                }
            },
            None => task.await,
        };
        let elapsed_ms = millis(started.elapsed());
        let result = joined.unwrap_or_else(|join_error| {
            Err(HandlerError::Other(
                format!("handler panicked: {join_error}").into(),
            ))
        });
        match &result {
            Ok(_) => debug!(elapsed_ms, "handler completed"),
            Err(e) if e.is_retryable() => error!(elapsed_ms, error = %e, "handler failed"),
            Err(e) => warn!(elapsed_ms, error = %e, "handler rejected the command"),
        }
        result
    }

    fn context(
        &self,
        trigger: &str,
        message_id: &str,
        session: Session,
        activation: &Activation,
    ) -> Context {
        Context::new(
            self.info().clone(),
            trigger,
            message_id,
            session,
            Arc::clone(&activation.config),
            Arc::clone(&self.bridge),
            activation.shutdown.clone(),
        )
    }

    fn set_state(&self, state: ServiceState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn current_activation(&self) -> Option<Activation> {
        self.activation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_activation(&self) -> std::sync::RwLockWriteGuard<'_, Option<Activation>> {
        self.activation.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("service", self.info())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Parameters first, then payload. Issues from both are reported together.
fn validate_input(
    definition: &CommandDefinition,
    payload: &Value,
    parameters: &Value,
) -> Result<(Value, Value), ValidationError> {
    let parameters = definition
        .parameters()
        .validate(parameters)
        .map_err(|e| e.prefixed("parameter"));
    let payload = definition
        .payload()
        .validate(payload)
        .map_err(|e| e.prefixed("payload"));
    match (payload, parameters) {
        (Ok(payload), Ok(parameters)) => Ok((payload, parameters)),
        (Err(payload), Err(parameters)) => Err(parameters.merge(payload)),
        (Err(err), Ok(_)) | (Ok(_), Err(err)) => Err(err),
    }
}

/// Input that failed its schema is nacked without requeue so the broker can
/// dead-letter it. Other failures requeue only when retryable.
fn delivery_for(err: &DispatchError) -> Delivery {
    match err {
        DispatchError::Validation(_) => Delivery::nack(err.to_string(), false),
        _ if err.is_retryable() => Delivery::nack(err.to_string(), true),
        _ => Delivery::ack(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
