//! The event bridge contract: connect, publish, subscribe and invoke.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Message;
use super::route::{CommandAddress, Route};

/// Callback invoked by the bridge for every delivered message.
pub type BridgeHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, Delivery> + Send + Sync>;

/// Wrap an async closure as a [`BridgeHandler`].
pub fn bridge_handler<F, Fut>(f: F) -> BridgeHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Delivery> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)))
}

/// Identifies one listener registration on a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Acknowledgement decision for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Processed (successfully or with a non-retryable error). Do not redeliver.
    Ack,
    /// Not processed. The bridge may redeliver when `requeue` is set.
    Nack { reason: String, requeue: bool },
}

/// Reply to a command invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body (handler output or error).
    pub body: Value,
}

impl CommandResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// What a listener hands back to the bridge for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub ack: Ack,
    /// Reply for request/response deliveries (commands). `None` for events.
    pub response: Option<CommandResponse>,
}

impl Delivery {
    pub fn ack() -> Self {
        Self {
            ack: Ack::Ack,
            response: None,
        }
    }

    pub fn nack(reason: impl Into<String>, requeue: bool) -> Self {
        Self {
            ack: Ack::Nack {
                reason: reason.into(),
                requeue,
            },
            response: None,
        }
    }

    pub fn with_response(mut self, response: CommandResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn is_ack(&self) -> bool {
        self.ack == Ack::Ack
    }
}

/// Failure of a bridge operation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("no listener registered for {0}")]
    NoListener(String),
    #[error("bridge is not connected")]
    NotConnected,
    #[error("bridge connection is closed")]
    Closed,
    #[error("transport error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

/// Transport abstraction over a message broker.
///
/// Implementations might include:
/// - [`super::InMemoryBridge`] - for tests and single-process deployments
/// - an AMQP bridge - for RabbitMQ
/// - a NATS bridge
///
/// Retry and redelivery policy for nacked messages belongs to the
/// implementation.
#[async_trait]
pub trait EventBridge: Send + Sync {
    /// Open the broker connection.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the broker connection.
    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Publish an event to every matching subscription.
    async fn publish(&self, event: Message) -> Result<(), TransportError>;

    /// Attach a listener to a command address or an event pattern.
    async fn subscribe(
        &self,
        route: Route,
        handler: BridgeHandler,
    ) -> Result<SubscriptionHandle, TransportError>;

    /// Remove a listener. Unknown handles are ignored.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError>;

    /// Send a command to the single listener on `address` and wait for its reply.
    async fn invoke(
        &self,
        address: &CommandAddress,
        message: Message,
    ) -> Result<Delivery, TransportError>;
}
