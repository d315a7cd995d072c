//! EduPage2 public API: an event-bridge microservice framework and the
//! services built on it.
//!
//! - [`schema`] validates command inputs and outputs.
//! - [`bus`] is the event bridge contract and its in-process implementation.
//! - [`service`] defines, validates and runs services, over the bridge and HTTP.
//! - [`services`] holds the `User`, `Icanteen` and `Edupage` services.

pub mod bus;
pub mod env;
pub mod schema;
pub mod service;
pub mod services;

mod bootstrap;

#[cfg(feature = "http")]
pub use bootstrap::launch;
pub use bootstrap::{bootstrap, BootstrapError};
