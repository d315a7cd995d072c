//! Service framework integration tests.

mod registry;
mod dispatch;
mod bootstrap;

#[cfg(feature = "http")]
mod http;
