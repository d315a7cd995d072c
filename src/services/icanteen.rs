//! `Icanteen` v1: iCanteen integration for users.

use serde_json::Value;

use super::ServiceEvent;
use crate::service::{
    CommandDefinition, Context, HandlerError, HttpMethod, ServiceDefinition, ServiceInfo,
};

pub const NAME: &str = "Icanteen";
pub const VERSION: &str = "1";

pub fn definition() -> ServiceDefinition {
    ServiceDefinition::new(ServiceInfo::new(
        NAME,
        VERSION,
        "Manages iCanteen integration for users",
    ))
    .command(
        CommandDefinition::new("setup", "Sets up the iCanteen integration for a user")
            .expose_http(HttpMethod::Post, "icanteen/setup")
            .success_event(ServiceEvent::IcanteenSetup.as_str())
            .handler(setup),
    )
    .command(
        CommandDefinition::new(
            "lunches",
            "Returns list of lunch options for the following month",
        )
        .expose_http(HttpMethod::Get, "icanteen/lunches")
        .handler(lunches),
    )
}

pub async fn setup(
    _ctx: Context,
    _payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    Ok(Value::Null)
}

pub async fn lunches(
    _ctx: Context,
    _payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    Ok(Value::Null)
}
