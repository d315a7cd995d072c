//! Command dispatch: validation, handler, output contract, success events.

use std::sync::Arc;
use std::time::Duration;

use edupage_services::schema::{Field, Schema};
use edupage_services::service::{
    metadata, CommandDefinition, DispatchError, HandlerError, Invocation, RuntimeOptions,
    ServiceDefinition, ServiceInfo, Session, PRINCIPAL_ID,
};
use edupage_services::services::{edupage, icanteen, user, ServiceEvent};
use serde_json::{json, Value};
use tokio::sync::Barrier;
use tracing_test::traced_test;

use crate::support::Harness;

#[tokio::test]
async fn validate_is_idempotent() {
    let harness = Harness::new();
    let user = harness.started(user::definition()).await;

    for _ in 0..5 {
        let out = user
            .invoke("validate", Invocation::new(json!({ "token": "abcd" })))
            .await
            .unwrap();
        assert_eq!(out, json!({ "valid": true }));
    }
    assert!(harness.bridge.events().is_empty());
}

#[tokio::test]
async fn register_without_credentials_is_rejected() {
    let harness = Harness::new();
    let user = harness.started(user::definition()).await;

    let err = user
        .invoke("register", Invocation::new(json!({})))
        .await
        .unwrap_err();

    let DispatchError::Validation(validation) = &err else {
        panic!("expected validation error, got {err}");
    };
    let paths: Vec<&str> = validation.issues().iter().map(|i| i.path.as_str()).collect();
    assert_eq!(paths, vec!["payload.username", "payload.password"]);
    assert_eq!(err.status_code(), 400);
    assert!(harness
        .bridge
        .find_all_by_type(ServiceEvent::UserRegistered.as_str())
        .is_empty());
}

#[tokio::test]
async fn register_publishes_user_registered_once() {
    let harness = Harness::new();
    let user = harness.started(user::definition()).await;

    let out = user
        .invoke(
            "register",
            Invocation::new(json!({ "username": "a", "password": "b" }))
                .with_message_id("msg-42")
                .with_session(Session::new().with(PRINCIPAL_ID, "student-7")),
        )
        .await
        .unwrap();

    let token = out["token"].as_str().unwrap();
    assert!(!token.is_empty());

    let events = harness
        .bridge
        .find_all_by_type(ServiceEvent::UserRegistered.as_str());
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.json::<Value>().unwrap(), out);
    assert_eq!(event.metadata_value(metadata::SERVICE), Some(user::NAME));
    assert_eq!(event.metadata_value(metadata::VERSION), Some(user::VERSION));
    assert_eq!(event.metadata_value(metadata::COMMAND), Some("register"));
    assert_eq!(event.metadata_value(metadata::CORRELATION_ID), Some("msg-42"));
    assert_eq!(event.metadata_value(PRINCIPAL_ID), Some("student-7"));
}

#[tokio::test]
async fn unknown_keys_are_stripped_from_payload() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Echo", "1", "echoes"))
        .command(
            CommandDefinition::new("echo", "Returns its payload")
                .payload_schema(Schema::object([Field::required("name", Schema::string())]))
                .handler(|_ctx, payload, _params| async move { Ok(payload) }),
        );
    let harness = Harness::new();
    let echo = harness.started(definition).await;

    let out = echo
        .invoke("echo", Invocation::new(json!({ "name": "x", "extra": 1 })))
        .await
        .unwrap();
    assert_eq!(out, json!({ "name": "x" }));
}

#[tokio::test]
async fn parameter_and_payload_issues_are_reported_together() {
    let harness = Harness::new();
    let user = harness.started(user::definition()).await;

    let err = user
        .invoke(
            "validate",
            Invocation::new(json!({ "token": "" })).with_parameters(json!("not an object")),
        )
        .await
        .unwrap_err();
    let DispatchError::Validation(validation) = err else {
        panic!("expected validation error");
    };
    let paths: Vec<&str> = validation.issues().iter().map(|i| i.path.as_str()).collect();
    assert_eq!(paths, vec!["parameter", "payload.token"]);
}

#[tokio::test]
async fn stub_commands_return_null() {
    let harness = Harness::new();
    let canteen = harness.started(icanteen::definition()).await;
    let portal = harness.started(edupage::definition()).await;

    assert_eq!(
        canteen.invoke("lunches", Invocation::new(Value::Null)).await.unwrap(),
        Value::Null
    );
    for command in ["basetimeline", "timeline", "timelineitem"] {
        let out = portal
            .invoke(command, Invocation::new(json!({ "anything": [1, 2] })))
            .await
            .unwrap();
        assert_eq!(out, Value::Null, "{command}");
    }
}

#[tokio::test]
async fn canteen_setup_emits_icanteen_setup() {
    let harness = Harness::new();
    let canteen = harness.started(icanteen::definition()).await;

    canteen.invoke("setup", Invocation::new(Value::Null)).await.unwrap();

    assert_eq!(
        harness.bridge.event_types(),
        vec![ServiceEvent::IcanteenSetup.as_str().to_string()]
    );
}

#[tokio::test]
#[traced_test]
async fn output_contract_violation_is_internal() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Liar", "1", "breaks contracts"))
        .command(
            CommandDefinition::new("token", "Promises a token")
                .output_schema(Schema::object([Field::required(
                    "token",
                    Schema::non_empty_string(),
                )]))
                .success_event("tokenIssued")
                .handler(|_ctx, _payload, _params| async { Ok(json!({ "token": "" })) }),
        );
    let harness = Harness::new();
    let liar = harness.started(definition).await;

    let err = liar
        .invoke("token", Invocation::new(Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::OutputContract { .. }));
    assert_eq!(err.status_code(), 500);
    assert!(harness.bridge.events().is_empty());
    assert!(logs_contain("handler output violates its contract"));
}

#[tokio::test]
async fn handler_errors_keep_their_status() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Strict", "1", "rejects"))
        .command(
            CommandDefinition::new("reject", "Always rejects")
                .success_event("neverPublished")
                .handler(|_ctx, _payload, _params| async {
                    Err(HandlerError::Rejected("account locked".into()))
                }),
        )
        .command(
            CommandDefinition::new("whoami", "Needs a principal")
                .handler(|ctx, _payload, _params| async move {
                    let principal = ctx.principal_id()?;
                    Ok(json!({ "principal": principal }))
                }),
        );
    let harness = Harness::new();
    let strict = harness.started(definition).await;

    let err = strict
        .invoke("reject", Invocation::new(Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 422);
    assert!(!err.is_retryable());
    assert!(harness.bridge.events().is_empty());

    let err = strict
        .invoke("whoami", Invocation::new(Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);

    let out = strict
        .invoke(
            "whoami",
            Invocation::new(Value::Null).with_session(Session::new().with(PRINCIPAL_ID, "u-1")),
        )
        .await
        .unwrap();
    assert_eq!(out, json!({ "principal": "u-1" }));
}

#[tokio::test]
async fn unknown_command_and_stopped_service() {
    let harness = Harness::new();
    let user = harness.runtime.instance(user::definition()).unwrap();

    let err = user
        .invoke("validate", Invocation::new(json!({ "token": "t" })))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotRunning(_)));
    assert_eq!(err.status_code(), 503);

    user.start(None).await.unwrap();
    let err = user
        .invoke("delete", Invocation::new(Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownCommand(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn slow_handler_times_out_as_unavailable() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Slow", "1", "sleeps"))
        .command(
            CommandDefinition::new("nap", "Sleeps for a while")
                .handler(|ctx, _payload, _params| async move {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(Value::Null),
                        _ = ctx.shutdown_token().cancelled() => Err(HandlerError::Unavailable("stopping".into())),
                    }
                }),
        );
    let harness = Harness::with_options(RuntimeOptions {
        handler_timeout: Some(Duration::from_millis(50)),
    });
    let slow = harness.started(definition).await;

    let err = slow
        .invoke("nap", Invocation::new(Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Handler(HandlerError::Unavailable(_))
    ));
    assert!(err.is_retryable());
    slow.stop().await.unwrap();
}

async fn explode(
    _ctx: edupage_services::service::Context,
    _payload: Value,
    _params: Value,
) -> Result<Value, HandlerError> {
    panic!("boom")
}

#[tokio::test]
async fn panicking_handler_fails_only_its_invocation() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Fragile", "1", "panics"))
        .command(
            CommandDefinition::new("explode", "Panics")
                .handler(explode),
        )
        .command(
            CommandDefinition::new("ping", "Answers")
                .handler(|_ctx, _payload, _params| async { Ok(json!("pong")) }),
        );
    let harness = Harness::new();
    let fragile = harness.started(definition).await;

    let err = fragile
        .invoke("explode", Invocation::new(Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Handler(HandlerError::Other(_))));

    let out = fragile.invoke("ping", Invocation::new(Value::Null)).await.unwrap();
    assert_eq!(out, json!("pong"));
    assert!(fragile.is_running());
}

#[tokio::test]
async fn concurrent_invocations_of_one_command_run_in_parallel() {
    let barrier = Arc::new(Barrier::new(2));
    let definition = ServiceDefinition::new(ServiceInfo::new("Meeting", "1", "two callers meet"))
        .command(CommandDefinition::new("meet", "Waits for a second caller").handler(
            move |_ctx, payload, _params| {
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    Ok(payload)
                }
            },
        ));
    let harness = Harness::new();
    let meeting = harness.started(definition).await;

    let (first, second) = tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(
            meeting.invoke("meet", Invocation::new(json!({ "caller": 1 }))),
            meeting.invoke("meet", Invocation::new(json!({ "caller": 2 }))),
        )
    })
    .await
    .expect("invocations of one command were serialized");

    assert_eq!(first.unwrap(), json!({ "caller": 1 }));
    assert_eq!(second.unwrap(), json!({ "caller": 2 }));
}
