//! In-memory event bridge for tests and single-process deployments.
//!
//! Implements [`EventBridge`] without a broker: command listeners and event
//! subscriptions live in process, every published event is kept in an
//! append-only log, and every ack/nack decision is recorded so tests can
//! assert on delivery outcomes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::bridge::{
    Ack, BridgeHandler, CommandResponse, Delivery, EventBridge, SubscriptionHandle, TransportError,
};
use super::event::Event;
use super::Message;
use super::route::{CommandAddress, EventPattern, Route};

struct Subscription {
    handle: SubscriptionHandle,
    pattern: EventPattern,
    handler: BridgeHandler,
}

struct Listener {
    handle: SubscriptionHandle,
    handler: BridgeHandler,
}

#[derive(Default)]
struct Inner {
    connected: AtomicBool,
    connects: AtomicUsize,
    next_handle: AtomicU64,
    listeners: RwLock<HashMap<CommandAddress, Listener>>,
    subscriptions: RwLock<Vec<Subscription>>,
    log: RwLock<Vec<Event>>,
    acked: Mutex<Vec<String>>,
    nacked: Mutex<Vec<(String, String)>>,
}

/// In-process [`EventBridge`].
///
/// Cheap to clone; clones share the same listeners and log.
///
/// ## Example
///
/// ```
/// use edupage_services::bus::{Event, EventBridge, InMemoryBridge};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let bridge = InMemoryBridge::new();
/// bridge.connect().await.unwrap();
///
/// bridge
///     .publish(Event::with_string_payload("evt-1", "userRegistered", r#"{"token":"hi"}"#))
///     .await
///     .unwrap();
///
/// assert_eq!(bridge.event_types(), vec!["userRegistered"]);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBridge {
    inner: Arc<Inner>,
}

impl InMemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events.
    pub fn events(&self) -> Vec<Event> {
        read(&self.inner.log).clone()
    }

    /// Get all published event types in order.
    pub fn event_types(&self) -> Vec<String> {
        read(&self.inner.log)
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Find all published events of a type.
    pub fn find_all_by_type(&self, event_type: &str) -> Vec<Event> {
        read(&self.inner.log)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Ids of acknowledged messages.
    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.inner.acked).clone()
    }

    /// Ids and reasons of negatively acknowledged messages.
    pub fn rejected(&self) -> Vec<(String, String)> {
        lock(&self.inner.nacked).clone()
    }

    /// Number of command listeners currently registered.
    pub fn listener_count(&self) -> usize {
        read(&self.inner.listeners).len()
    }

    /// Number of event subscriptions currently registered.
    pub fn subscription_count(&self) -> usize {
        read(&self.inner.subscriptions).len()
    }

    /// True if a listener is registered on `address`.
    pub fn listens_on(&self, address: &CommandAddress) -> bool {
        read(&self.inner.listeners).contains_key(address)
    }

    /// How many times `connect` has been called.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Clear the event log and delivery records (useful for test cleanup).
    pub fn clear(&self) {
        write(&self.inner.log).clear();
        lock(&self.inner.acked).clear();
        lock(&self.inner.nacked).clear();
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn record(&self, message_id: &str, delivery: &Delivery) {
        match &delivery.ack {
            Ack::Ack => lock(&self.inner.acked).push(message_id.to_string()),
            Ack::Nack { reason, .. } => {
                lock(&self.inner.nacked).push((message_id.to_string(), reason.clone()))
            }
        }
    }
}

#[async_trait]
impl EventBridge for InMemoryBridge {
    async fn connect(&self) -> Result<(), TransportError> {
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        write(&self.inner.listeners).clear();
        write(&self.inner.subscriptions).clear();
        Ok(())
    }

    async fn publish(&self, event: Message) -> Result<(), TransportError> {
        self.ensure_connected()?;
        write(&self.inner.log).push(event.clone());

        let handlers: Vec<BridgeHandler> = read(&self.inner.subscriptions)
            .iter()
            .filter(|s| s.pattern.matches(&event.event_type))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        debug!(event = %event.event_type, id = %event.id, subscribers = handlers.len(), "publishing event");

        // Each subscriber runs in its own task so one failing or panicking
        // handler cannot stop the others.
        let mut tasks = JoinSet::new();
        for handler in handlers {
            tasks.spawn(handler(event.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            let delivery = match joined {
                Ok(delivery) => delivery,
                Err(err) => {
                    warn!(event = %event.event_type, error = %err, "subscriber task failed");
                    Delivery::nack(format!("subscriber task failed: {err}"), true)
                }
            };
            self.record(&event.id, &delivery);
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        route: Route,
        handler: BridgeHandler,
    ) -> Result<SubscriptionHandle, TransportError> {
        self.ensure_connected()?;
        let handle = SubscriptionHandle(self.inner.next_handle.fetch_add(1, Ordering::SeqCst));

        match route {
            Route::Command(address) => {
                let mut listeners = write(&self.inner.listeners);
                if listeners.contains_key(&address) {
                    return Err(TransportError::Subscribe(format!(
                        "address {address} already has a listener"
                    )));
                }
                listeners.insert(address, Listener { handle, handler });
            }
            Route::Events(pattern) => {
                write(&self.inner.subscriptions).push(Subscription {
                    handle,
                    pattern,
                    handler,
                });
            }
        }

        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        write(&self.inner.listeners).retain(|_, listener| listener.handle != handle);
        write(&self.inner.subscriptions).retain(|s| s.handle != handle);
        Ok(())
    }

    async fn invoke(
        &self,
        address: &CommandAddress,
        message: Message,
    ) -> Result<Delivery, TransportError> {
        self.ensure_connected()?;
        let handler = read(&self.inner.listeners)
            .get(address)
            .map(|listener| Arc::clone(&listener.handler))
            .ok_or_else(|| TransportError::NoListener(address.to_string()))?;

        let message_id = message.id.clone();
        let delivery = match tokio::spawn(handler(message)).await {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!(%address, error = %err, "command listener task failed");
                Delivery::nack(format!("listener task failed: {err}"), true).with_response(
                    CommandResponse {
                        status: 500,
                        body: serde_json::json!({ "error": "internal error", "kind": "internal" }),
                    },
                )
            }
        };
        self.record(&message_id, &delivery);
        Ok(delivery)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
