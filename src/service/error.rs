//! Error types for service definitions, command handlers and dispatch.

use std::error::Error;
use std::fmt;

use serde_json::json;

use super::command::HttpMethod;
use crate::bus::{CommandResponse, PatternError, TransportError};
use crate::schema::ValidationError;

/// Error type for command and subscription handlers.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Payload decode / deserialization failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// Business logic rejected the command (invariant violation).
    #[error("rejected: {0}")]
    Rejected(String),
    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Missing or invalid principal.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// A dependency is temporarily unavailable; the invocation may succeed later.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Publishing from inside the handler failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Other error.
    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

impl HandlerError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::DecodeFailed(_) => 400,
            HandlerError::Rejected(_) => 422,
            HandlerError::NotFound(_) => 404,
            HandlerError::Unauthorized(_) => 401,
            HandlerError::Unavailable(_) => 503,
            HandlerError::Transport(_) => 502,
            HandlerError::Other(_) => 500,
        }
    }

    /// Whether redelivering the message could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HandlerError::Unavailable(_) | HandlerError::Transport(_) | HandlerError::Other(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::DecodeFailed(_) => "decode",
            HandlerError::Rejected(_) => "rejected",
            HandlerError::NotFound(_) => "not_found",
            HandlerError::Unauthorized(_) => "unauthorized",
            HandlerError::Unavailable(_) => "unavailable",
            HandlerError::Transport(_) => "transport",
            HandlerError::Other(_) => "internal",
        }
    }
}

/// Failure of one command or event dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No command registered under this name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    /// The service instance has not been started (or was stopped).
    #[error("service {0} is not running")]
    NotRunning(String),
    /// Parameters or payload failed their schema. The handler never ran.
    #[error("invalid input: {0}")]
    Validation(ValidationError),
    /// The handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),
    /// The handler returned data violating its own output schema.
    #[error("command {command} violated its output contract: {source}")]
    OutputContract {
        command: String,
        source: ValidationError,
    },
    /// Publishing the success event failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl DispatchError {
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::UnknownCommand(_) => 404,
            DispatchError::NotRunning(_) => 503,
            DispatchError::Validation(_) => 400,
            DispatchError::Handler(e) => e.status_code(),
            DispatchError::OutputContract { .. } => 500,
            DispatchError::Transport(_) => 502,
        }
    }

    /// Retryable errors are negatively acknowledged with requeue so the bridge
    /// may redeliver them.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::UnknownCommand(_) | DispatchError::Validation(_) => false,
            DispatchError::Handler(e) => e.is_retryable(),
            DispatchError::NotRunning(_)
            | DispatchError::OutputContract { .. }
            | DispatchError::Transport(_) => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownCommand(_) => "unknown_command",
            DispatchError::NotRunning(_) => "not_running",
            DispatchError::Validation(_) => "validation",
            DispatchError::Handler(e) => e.kind(),
            DispatchError::OutputContract { .. } => "internal",
            DispatchError::Transport(_) => "transport",
        }
    }

    /// Status-coded JSON error body for HTTP and bridge callers.
    ///
    /// Output contract violations are reported as a plain internal error:
    /// the details are logged, not sent to the caller.
    pub fn to_response(&self) -> CommandResponse {
        let body = match self {
            DispatchError::Validation(err) => json!({
                "error": self.to_string(),
                "kind": self.kind(),
                "issues": err.issues(),
            }),
            DispatchError::OutputContract { .. } => json!({
                "error": "internal error",
                "kind": self.kind(),
            }),
            _ => json!({ "error": self.to_string(), "kind": self.kind() }),
        };
        CommandResponse {
            status: self.status_code(),
            body,
        }
    }
}

/// A single wiring problem in a service definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("command name `{0}` must match ^[a-z][a-zA-Z0-9]*$")]
    InvalidCommandName(String),
    #[error("command `{0}` has no description")]
    MissingDescription(String),
    #[error("command `{0}` is registered more than once")]
    DuplicateCommand(String),
    #[error("command `{0}` has no handler")]
    MissingHandler(String),
    #[error("{method} {path} is exposed by both {first} and {second}")]
    DuplicateHttpRoute {
        method: HttpMethod,
        path: String,
        first: String,
        second: String,
    },
    #[error("command `{command}` exposes invalid HTTP path `{path}`")]
    InvalidHttpPath { command: String, path: String },
    #[error("{owner} {slot} schema is malformed: {defect}")]
    MalformedSchema {
        owner: String,
        slot: &'static str,
        defect: String,
    },
    #[error("{owner} names an invalid event: {source}")]
    InvalidEventName { owner: String, source: PatternError },
    #[error("subscription pattern is invalid: {0}")]
    InvalidEventPattern(PatternError),
    #[error("subscription `{0}` has no handler")]
    MissingSubscriptionHandler(String),
    #[error("default configuration rejected: {0}")]
    InvalidConfig(ValidationError),
}

/// A service definition failed validation. Lists every violation found.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid definition of {service}: {}", Violations(.violations))]
pub struct ConfigurationError {
    pub service: String,
    pub violations: Vec<Violation>,
}

impl ConfigurationError {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

struct Violations<'a>(&'a [Violation]);

impl fmt::Display for Violations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// A service instance could not be started.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("event bridge rejected service startup: {0}")]
    Transport(#[from] TransportError),
}
