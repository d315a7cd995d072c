//! The EduPage2 public API services.
//!
//! | Service | Commands |
//! |---|---|
//! | `User` v1 | `register` (POST), `validate` (GET), `info` (GET) |
//! | `Icanteen` v1 | `setup` (POST), `lunches` (GET) |
//! | `Edupage` v1 | `basetimeline`, `timeline`, `timelineitem` (GET) |

pub mod edupage;
pub mod icanteen;
pub mod user;

use std::fmt;

use crate::service::ServiceDefinition;

/// Events published by the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEvent {
    UserRegistered,
    IcanteenSetup,
}

impl ServiceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceEvent::UserRegistered => "userRegistered",
            ServiceEvent::IcanteenSetup => "icanteenSetup",
        }
    }
}

impl fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every service definition, in start order.
pub fn all() -> Vec<ServiceDefinition> {
    vec![user::definition(), icanteen::definition(), edupage::definition()]
}
