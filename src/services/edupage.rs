//! `Edupage` v1: interfacing with the EduPage proxy and cache system.

use serde_json::Value;

use crate::service::{
    CommandDefinition, Context, HandlerError, HttpMethod, ServiceDefinition, ServiceInfo,
};

pub const NAME: &str = "Edupage";
pub const VERSION: &str = "1";

pub fn definition() -> ServiceDefinition {
    ServiceDefinition::new(ServiceInfo::new(
        NAME,
        VERSION,
        "Interfacing with the EduPage proxy and cache system",
    ))
    .command(
        CommandDefinition::new(
            "basetimeline",
            "Returns all the timeline items, with no modification",
        )
        .expose_http(HttpMethod::Get, "edupage/timeline/base")
        .handler(basetimeline),
    )
    .command(
        CommandDefinition::new("timeline", "Returns optimised timeline, stripped of useless info")
            .expose_http(HttpMethod::Get, "edupage/timeline")
            .handler(timeline),
    )
    .command(
        CommandDefinition::new(
            "timelineitem",
            "Get all the details of an item from the timeline by it's ID",
        )
        .expose_http(HttpMethod::Get, "edupage/timeline/item")
        .handler(timelineitem),
    )
}

pub async fn basetimeline(
    _ctx: Context,
    _payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    Ok(Value::Null)
}

pub async fn timeline(
    _ctx: Context,
    _payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    Ok(Value::Null)
}

pub async fn timelineitem(
    _ctx: Context,
    _payload: Value,
    _parameters: Value,
) -> Result<Value, HandlerError> {
    Ok(Value::Null)
}
