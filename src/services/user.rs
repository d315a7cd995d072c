//! `User` v1: managing the user's connection to their EduPage account.

use serde::Deserialize;
use serde_json::{json, Value};

use super::ServiceEvent;
use crate::schema::{Field, Schema};
use crate::service::{
    CommandDefinition, Context, HandlerError, HttpMethod, ServiceDefinition, ServiceInfo,
};

pub const NAME: &str = "User";
pub const VERSION: &str = "1";

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub password: String,
}

pub fn definition() -> ServiceDefinition {
    ServiceDefinition::new(ServiceInfo::new(
        NAME,
        VERSION,
        "Managing the user's connection to their EduPage account",
    ))
    .command(
        CommandDefinition::new(
            "register",
            "Registers a new user by saving their EduPage credentials",
        )
        .expose_http(HttpMethod::Post, "user/register")
        .parameter_schema(Schema::Opaque)
        .payload_schema(Schema::object([
            Field::required("username", Schema::non_empty_string()),
            Field::required("password", Schema::non_empty_string()),
        ]))
        .output_schema(Schema::object([Field::required(
            "token",
            Schema::non_empty_string(),
        )]))
        .success_event(ServiceEvent::UserRegistered.as_str())
        .handler(register),
    )
    .command(
        CommandDefinition::new("validate", "Validates a access token")
            .expose_http(HttpMethod::Get, "user/validate")
            .payload_schema(Schema::object([Field::required(
                "token",
                Schema::non_empty_string(),
            )]))
            .output_schema(Schema::object([Field::required("valid", Schema::boolean())]))
            .handler(validate),
    )
    .command(
        CommandDefinition::new("info", "Returns info about user")
            .expose_http(HttpMethod::Get, "user/info")
            .handler(info),
    )
}

/// Credential storage is not wired yet; every registration gets the same token.
pub async fn register(
    ctx: Context,
    payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    let input: RegisterInput = serde_json::from_value(payload)?;
    tracing::info!(
        service = %ctx.service(),
        message_id = %ctx.message_id(),
        username = %input.username,
        "registering EduPage account"
    );
    Ok(json!({ "token": "hi" }))
}

pub async fn validate(
    _ctx: Context,
    _payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    Ok(json!({ "valid": true }))
}

pub async fn info(
    _ctx: Context,
    _payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    Ok(Value::Null)
}
