//! Event bridge: transport abstraction between services and a message broker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               SharedBridge (one per process)                │
//! │  - connect() / disconnect() at most once                    │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    EventBridge trait                        │
//! │  publish(event)            fan-out to EventPattern subs     │
//! │  subscribe(route, handler) Command address or EventPattern  │
//! │  invoke(address, message)  point-to-point request/response  │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌──────────────┐    ┌─────────────┐    ┌─────────────────────┐
//! │InMemoryBridge│    │ AMQP bridge │    │    NATS bridge      │
//! │  (included)  │    │ (external)  │    │    (external)       │
//! └──────────────┘    └─────────────┘    └─────────────────────┘
//! ```

mod bridge;
mod event;
mod in_memory_bridge;
mod route;
mod shared;

pub use bridge::{
    bridge_handler, Ack, BridgeHandler, CommandResponse, Delivery, EventBridge,
    SubscriptionHandle, TransportError,
};
pub use event::Event;
pub use in_memory_bridge::InMemoryBridge;
pub use route::{CommandAddress, EventPattern, PatternError, Route};
pub use shared::SharedBridge;

/// Type alias for `Event` when used in a command/message context.
///
/// Commands and events are both messages. The distinction is in how they're
/// routed: `publish/subscribe` = events (fan-out), `invoke` = commands
/// (point-to-point).
pub type Message = Event;
