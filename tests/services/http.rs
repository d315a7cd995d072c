//! HTTP gateway integration tests.
//!
//! Starts an axum server and exercises it with reqwest.

use std::sync::Arc;

use edupage_services::service::http;
use edupage_services::service::{
    CommandDefinition, HttpMethod, ServiceDefinition, ServiceInfo, ServiceInstance, Violation,
};
use edupage_services::services::{self, user, ServiceEvent};
use serde_json::{json, Value};

use crate::support::Harness;

/// Start every shipped service and bind the gateway to port 0.
async fn start_gateway() -> (Harness, String) {
    let harness = Harness::new();
    for definition in services::all() {
        harness.started(definition).await;
    }
    let base = start_server(&harness.runtime.instances()).await;
    (harness, base)
}

/// Bind to port 0 and return the actual address.
async fn start_server(instances: &[Arc<ServiceInstance>]) -> String {
    let app = http::router(instances, "/api").unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_check() {
    let (_harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/api/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    let services = body["services"].as_array().unwrap();
    assert_eq!(services.len(), 3);
    assert_eq!(services[0]["name"], "User");
    assert_eq!(services[0]["state"], "running");
    let commands = services[0]["commands"].as_array().unwrap();
    assert!(commands.iter().any(|c| c == "register"));
}

#[tokio::test]
async fn register_over_http() {
    let (harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/user/register"))
        .json(&json!({ "username": "a", "password": "b" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "token": "hi" }));

    assert_eq!(
        harness
            .bridge
            .find_all_by_type(ServiceEvent::UserRegistered.as_str())
            .len(),
        1
    );
}

#[tokio::test]
async fn register_accepts_form_bodies() {
    let (_harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/user/register"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body("username=a&password=b")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn invalid_input_is_a_400_with_issues() {
    let (harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/user/register"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "validation");
    let paths: Vec<&str> = body["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["payload.username", "payload.password"]);
    assert!(harness.bridge.events().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_400() {
    let (_harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/v1/user/register"))
        .header("content-type", "application/json")
        .body("{\"username\":")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn validate_with_get_body() {
    let (_harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/v1/user/validate"))
        .json(&json!({ "token": "abcd" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "valid": true }));
}

#[tokio::test]
async fn null_output_is_no_content() {
    let (_harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    for path in [
        "user/info",
        "icanteen/lunches",
        "edupage/timeline/base",
        "edupage/timeline",
        "edupage/timeline/item?id=42",
    ] {
        let resp = client
            .get(format!("{base}/api/v1/{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204, "{path}");
    }
}

#[tokio::test]
async fn wrong_method_is_rejected_by_the_router() {
    let (_harness, base) = start_gateway().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/api/v1/user/register"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn path_captures_and_query_become_parameters() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Items", "2", "timeline items"))
        .command(
            CommandDefinition::new("item", "Echoes its parameters")
                .expose_http(HttpMethod::Get, "items/:id")
                .parameter_schema(edupage_services::schema::Schema::Opaque)
                .handler(|_ctx, _payload, params| async move { Ok(params) }),
        );
    let harness = Harness::new();
    let items = harness.started(definition).await;
    let base = start_server(&[items]).await;

    let resp = reqwest::get(format!("{base}/api/v2/items/17?lang=sk"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "id": "17", "lang": "sk" }));
}

#[tokio::test]
async fn principal_header_reaches_the_handler() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Me", "1", "who am i"))
        .command(
            CommandDefinition::new("whoami", "Returns the caller")
                .expose_http(HttpMethod::Get, "me")
                .handler(|ctx, _payload, _params| async move {
                    Ok(json!({ "principal": ctx.principal_id()? }))
                }),
        );
    let harness = Harness::new();
    let me = harness.started(definition).await;
    let base = start_server(&[me]).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/api/v1/me")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{base}/api/v1/me"))
        .header("x-principal-id", "student-7")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["principal"], "student-7");
}

#[tokio::test]
async fn duplicate_routes_across_services_are_rejected() {
    let clone = ServiceDefinition::new(ServiceInfo::new("Shadow", user::VERSION, "copies user"))
        .command(
            CommandDefinition::new("register", "Registers again")
                .expose_http(HttpMethod::Post, "user/register")
                .handler(user::register),
        );
    let harness = Harness::new();
    let original = harness.started(user::definition()).await;
    let shadow = harness.started(clone).await;

    let err = http::router(&[original, shadow], "/api").unwrap_err();
    assert!(matches!(
        err.violations.as_slice(),
        [Violation::DuplicateHttpRoute { method: HttpMethod::Post, .. }]
    ));
}

fn echo(name: &str, method: HttpMethod, path: &str) -> CommandDefinition {
    CommandDefinition::new(name, "Echoes its parameters")
        .expose_http(method, path)
        .parameter_schema(edupage_services::schema::Schema::Opaque)
        .handler(|_ctx, _payload, params| async move { Ok(params) })
}

#[tokio::test]
async fn routes_differing_only_in_capture_names_are_rejected() {
    let by_id = ServiceDefinition::new(ServiceInfo::new("Items", "1", "items by id"))
        .command(echo("item", HttpMethod::Get, "items/:id"));
    let by_key = ServiceDefinition::new(ServiceInfo::new("Keyed", "1", "items by key"))
        .command(echo("item", HttpMethod::Get, "items/:key"));
    let harness = Harness::new();
    let by_id = harness.started(by_id).await;
    let by_key = harness.started(by_key).await;

    let err = http::router(&[by_id, by_key], "/api").unwrap_err();
    match err.violations.as_slice() {
        [Violation::DuplicateHttpRoute { method, path, .. }] => {
            assert_eq!(*method, HttpMethod::Get);
            assert_eq!(path, "/api/v1/items/:key");
        }
        other => panic!("unexpected violations: {other:?}"),
    }
}

#[tokio::test]
async fn shared_route_shape_keeps_each_commands_capture_names() {
    let definition = ServiceDefinition::new(ServiceInfo::new("Items", "1", "items"))
        .command(echo("item", HttpMethod::Get, "items/:id"))
        .command(echo("removeitem", HttpMethod::Delete, "items/:key"))
        .command(echo("itemtag", HttpMethod::Get, "items/:item/tags/:tag"));
    let harness = Harness::new();
    let items = harness.started(definition).await;
    let base = start_server(&[items]).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("{base}/api/v1/items/17"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "id": "17" }));

    let body: Value = client
        .delete(format!("{base}/api/v1/items/abc"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "key": "abc" }));

    let body: Value = client
        .get(format!("{base}/api/v1/items/17/tags/lunch"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "item": "17", "tag": "lunch" }));
}
