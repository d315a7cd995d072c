//! Subscriptions: handlers for events matching a pattern.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use super::command::HandlerFuture;
use super::context::Context;
use super::error::{HandlerError, Violation};
use crate::bus::EventPattern;
use crate::schema::Schema;

/// `(context, event payload) -> output`
pub type SubscriptionHandler = Arc<dyn Fn(Context, Value) -> HandlerFuture + Send + Sync>;

/// Reacts to every event whose name matches `pattern`
/// (`*` is one segment, `#` any number of segments).
///
/// When `emit` is set the handler output is published under that event
/// name, correlated with the triggering event.
#[derive(Clone)]
pub struct SubscriptionDefinition {
    pattern: String,
    description: String,
    payload_schema: Schema,
    output_schema: Schema,
    emit: Option<String>,
    handler: Option<SubscriptionHandler>,
}

impl SubscriptionDefinition {
    pub fn new(pattern: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            description: description.into(),
            payload_schema: Schema::Unvalidated,
            output_schema: Schema::Unvalidated,
            emit: None,
            handler: None,
        }
    }

    pub fn payload_schema(mut self, schema: Schema) -> Self {
        self.payload_schema = schema;
        self
    }

    pub fn output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn emit(mut self, event_name: impl Into<String>) -> Self {
        self.emit = Some(event_name.into());
        self
    }

    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx, payload| Box::pin(f(ctx, payload))));
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payload(&self) -> &Schema {
        &self.payload_schema
    }

    pub fn output(&self) -> &Schema {
        &self.output_schema
    }

    pub fn emitted_event(&self) -> Option<&str> {
        self.emit.as_deref()
    }

    pub fn subscription_handler(&self) -> Option<&SubscriptionHandler> {
        self.handler.as_ref()
    }

    pub(crate) fn violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        if let Err(e) = EventPattern::parse(&self.pattern) {
            violations.push(Violation::InvalidEventPattern(e));
        }
        if self.handler.is_none() {
            violations.push(Violation::MissingSubscriptionHandler(self.pattern.clone()));
        }
        let owner = format!("subscription `{}`", self.pattern);
        for (slot, schema) in [("payload", &self.payload_schema), ("output", &self.output_schema)] {
            violations.extend(schema.defects().into_iter().map(|defect| {
                Violation::MalformedSchema {
                    owner: owner.clone(),
                    slot,
                    defect: defect.to_string(),
                }
            }));
        }
        if let Some(event_name) = &self.emit {
            if let Err(source) = EventPattern::event_name(event_name) {
                violations.push(Violation::InvalidEventName { owner, source });
            }
        }
        violations
    }
}

impl fmt::Debug for SubscriptionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionDefinition")
            .field("pattern", &self.pattern)
            .field("emit", &self.emit)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
