//! Command definitions: name, contract schemas, handler and HTTP exposure.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use super::context::Context;
use super::error::{HandlerError, Violation};
use crate::bus::EventPattern;
use crate::schema::Schema;

pub type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;

/// `(context, payload, parameters) -> output`
pub type CommandHandler = Arc<dyn Fn(Context, Value, Value) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        })
    }
}

/// Where a command is reachable over HTTP, relative to
/// `<mount>/v<service version>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpExposure {
    pub method: HttpMethod,
    pub path: String,
}

/// A command a service answers.
///
/// Payload and output default to [`Schema::Unvalidated`]; parameters default
/// to the empty object.
///
/// ```ignore
/// CommandDefinition::new("validate", "Validates a access token")
///     .expose_http(HttpMethod::Get, "user/validate")
///     .payload_schema(Schema::object([Field::required("token", Schema::non_empty_string())]))
///     .output_schema(Schema::object([Field::required("valid", Schema::boolean())]))
///     .handler(validate)
/// ```
#[derive(Clone)]
pub struct CommandDefinition {
    name: String,
    description: String,
    payload_schema: Schema,
    parameter_schema: Schema,
    output_schema: Schema,
    success_event: Option<String>,
    http: Option<HttpExposure>,
    handler: Option<CommandHandler>,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            payload_schema: Schema::Unvalidated,
            parameter_schema: Schema::empty_object(),
            output_schema: Schema::Unvalidated,
            success_event: None,
            http: None,
            handler: None,
        }
    }

    pub fn payload_schema(mut self, schema: Schema) -> Self {
        self.payload_schema = schema;
        self
    }

    pub fn parameter_schema(mut self, schema: Schema) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = schema;
        self
    }

    /// Publish `event_name` carrying the output after every successful run.
    pub fn success_event(mut self, event_name: impl Into<String>) -> Self {
        self.success_event = Some(event_name.into());
        self
    }

    pub fn expose_http(mut self, method: HttpMethod, path: impl Into<String>) -> Self {
        self.http = Some(HttpExposure {
            method,
            path: path.into(),
        });
        self
    }

    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx, payload, params| {
            Box::pin(f(ctx, payload, params))
        }));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payload(&self) -> &Schema {
        &self.payload_schema
    }

    pub fn parameters(&self) -> &Schema {
        &self.parameter_schema
    }

    pub fn output(&self) -> &Schema {
        &self.output_schema
    }

    pub fn success_event_name(&self) -> Option<&str> {
        self.success_event.as_deref()
    }

    pub fn http(&self) -> Option<&HttpExposure> {
        self.http.as_ref()
    }

    pub fn command_handler(&self) -> Option<&CommandHandler> {
        self.handler.as_ref()
    }

    /// Problems local to this one command.
    pub(crate) fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        if !is_valid_command_name(&self.name) {
            violations.push(Violation::InvalidCommandName(self.name.clone()));
        }
        if self.description.trim().is_empty() {
            violations.push(Violation::MissingDescription(self.name.clone()));
        }
        if self.handler.is_none() {
            violations.push(Violation::MissingHandler(self.name.clone()));
        }
        let owner = format!("command `{}`", self.name);
        for (slot, schema) in [
            ("payload", &self.payload_schema),
            ("parameter", &self.parameter_schema),
            ("output", &self.output_schema),
        ] {
            violations.extend(schema.defects().into_iter().map(|defect| {
                Violation::MalformedSchema {
                    owner: owner.clone(),
                    slot,
                    defect: defect.to_string(),
                }
            }));
        }
        if let Some(event_name) = &self.success_event {
            if let Err(source) = EventPattern::event_name(event_name) {
                violations.push(Violation::InvalidEventName {
                    owner: owner.clone(),
                    source,
                });
            }
        }
        if let Some(http) = &self.http {
            if !is_valid_http_path(&http.path) {
                violations.push(Violation::InvalidHttpPath {
                    command: self.name.clone(),
                    path: http.path.clone(),
                });
            }
        }
        violations
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("success_event", &self.success_event)
            .field("http", &self.http)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

/// `^[a-z][a-zA-Z0-9]*$`
pub fn is_valid_command_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Relative path: `/`-separated non-empty segments, each either a literal
/// (`[A-Za-z0-9._-]`) or a `:name` capture.
pub fn is_valid_http_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('/').all(|segment| match segment.strip_prefix(':') {
            Some(capture) => {
                !capture.is_empty()
                    && capture.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            None => {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            }
        })
}

/// Route identity of a path. Capture names do not affect matching, so every
/// `:name` segment becomes `:`.
pub(crate) fn route_key(path: &str) -> String {
    path.split('/')
        .map(|segment| if segment.starts_with(':') { ":" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}
