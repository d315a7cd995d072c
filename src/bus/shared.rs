//! One bridge connection shared by every service instance in the process.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::bridge::{BridgeHandler, Delivery, EventBridge, SubscriptionHandle, TransportError};
use super::Message;
use super::route::{CommandAddress, Route};

/// Wraps the process-wide [`EventBridge`] so that `connect` and `disconnect`
/// each reach the underlying bridge at most once, however many service
/// instances race on them.
///
/// A failed connect leaves the bridge unconnected; the next caller retries.
/// Once disconnected the bridge cannot be reconnected.
pub struct SharedBridge {
    bridge: Arc<dyn EventBridge>,
    connected: OnceCell<()>,
    disconnected: OnceCell<()>,
}

impl SharedBridge {
    pub fn new(bridge: Arc<dyn EventBridge>) -> Self {
        Self {
            bridge,
            connected: OnceCell::new(),
            disconnected: OnceCell::new(),
        }
    }

    /// Connect the underlying bridge unless that already happened.
    pub async fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.disconnected.initialized() {
            return Err(TransportError::Closed);
        }
        self.connected
            .get_or_try_init(|| async {
                info!("connecting event bridge");
                self.bridge.connect().await
            })
            .await?;
        Ok(())
    }

    /// Disconnect the underlying bridge. Only the first call after a
    /// successful connect reaches the bridge; the rest are no-ops.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if !self.connected.initialized() {
            return Ok(());
        }
        self.disconnected
            .get_or_try_init(|| async {
                info!("disconnecting event bridge");
                self.bridge.disconnect().await
            })
            .await?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.initialized() && !self.disconnected.initialized()
    }

    pub async fn publish(&self, event: Message) -> Result<(), TransportError> {
        self.bridge.publish(event).await
    }

    pub async fn subscribe(
        &self,
        route: Route,
        handler: BridgeHandler,
    ) -> Result<SubscriptionHandle, TransportError> {
        self.bridge.subscribe(route, handler).await
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), TransportError> {
        self.bridge.unsubscribe(handle).await
    }

    pub async fn invoke(
        &self,
        address: &CommandAddress,
        message: Message,
    ) -> Result<Delivery, TransportError> {
        self.bridge.invoke(address, message).await
    }

    /// The wrapped bridge.
    pub fn inner(&self) -> &Arc<dyn EventBridge> {
        &self.bridge
    }
}
