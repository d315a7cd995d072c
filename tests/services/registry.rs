//! Registry validation of service definitions.

use edupage_services::schema::{Field, Schema};
use edupage_services::service::{
    CommandDefinition, HandlerError, HttpMethod, ServiceDefinition, ServiceInfo, Violation,
};
use edupage_services::services::{self, edupage, icanteen, user};
use serde_json::{json, Value};

use crate::support::Harness;

async fn noop(
    _ctx: edupage_services::service::Context,
    _payload: Value,
    _params: Value,
) -> Result<Value, HandlerError> {
    Ok(Value::Null)
}

#[test]
fn shipped_services_validate() {
    for definition in services::all() {
        assert!(definition.validate_command_definitions().is_ok());
        assert!(definition.validate_subscription_definitions().is_ok());
        assert!(definition.validate().is_ok());
    }
}

#[test]
fn shipped_services_expose_their_commands() {
    let routes = |definition: ServiceDefinition| -> Vec<(String, HttpMethod, String)> {
        definition
            .commands()
            .iter()
            .map(|c| {
                let http = c.http().unwrap();
                (c.name().to_string(), http.method, http.path.clone())
            })
            .collect()
    };

    assert_eq!(
        routes(user::definition()),
        vec![
            ("register".into(), HttpMethod::Post, "user/register".into()),
            ("validate".into(), HttpMethod::Get, "user/validate".into()),
            ("info".into(), HttpMethod::Get, "user/info".into()),
        ]
    );
    assert_eq!(
        routes(icanteen::definition()),
        vec![
            ("setup".into(), HttpMethod::Post, "icanteen/setup".into()),
            ("lunches".into(), HttpMethod::Get, "icanteen/lunches".into()),
        ]
    );
    assert_eq!(
        routes(edupage::definition()),
        vec![
            ("basetimeline".into(), HttpMethod::Get, "edupage/timeline/base".into()),
            ("timeline".into(), HttpMethod::Get, "edupage/timeline".into()),
            ("timelineitem".into(), HttpMethod::Get, "edupage/timeline/item".into()),
        ]
    );
}

#[test]
fn canteen_with_setup_registered_twice_is_rejected() {
    let duplicate = icanteen::definition().command(
        CommandDefinition::new("setup", "Sets up the iCanteen integration for a user")
            .expose_http(HttpMethod::Post, "icanteen/setup")
            .handler(icanteen::setup),
    );

    let err = duplicate.validate_command_definitions().unwrap_err();
    assert_eq!(err.service, "Icanteen v1");
    assert!(err
        .violations
        .contains(&Violation::DuplicateCommand("setup".into())));

    let harness = Harness::new();
    assert!(harness.runtime.instance(duplicate).is_err());
    assert!(harness.runtime.instances().is_empty());
}

#[test]
fn every_violation_is_listed() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Broken", "1", "broken"))
        .config(
            Schema::object([Field::required("region", Schema::non_empty_string())]),
            json!({}),
        )
        .command(
            CommandDefinition::new("first", "one")
                .expose_http(HttpMethod::Get, "same/path")
                .handler(noop),
        )
        .command(
            CommandDefinition::new("second", "two")
                .expose_http(HttpMethod::Get, "same/path")
                .handler(noop),
        )
        .command(CommandDefinition::new("Third", "three").handler(noop));

    let err = definition.validate().unwrap_err();
    assert_eq!(err.violations.len(), 3, "{err}");
    assert!(err
        .violations
        .iter()
        .any(|v| matches!(v, Violation::DuplicateHttpRoute { .. })));
    assert!(err
        .violations
        .contains(&Violation::InvalidCommandName("Third".into())));
    assert!(err
        .violations
        .iter()
        .any(|v| matches!(v, Violation::InvalidConfig(_))));
}

#[tokio::test]
async fn instance_is_shared_per_name_and_version() {
    let harness = Harness::new();
    let first = harness.runtime.instance(user::definition()).unwrap();
    let second = harness.runtime.instance(user::definition()).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    let other_version = ServiceDefinition::new(ServiceInfo::new(user::NAME, "2", "next"));
    let third = harness.runtime.instance(other_version).unwrap();
    assert!(!std::sync::Arc::ptr_eq(&first, &third));
    assert_eq!(harness.runtime.instances().len(), 2);
    assert!(harness.runtime.get(user::NAME, "2").is_some());
}
