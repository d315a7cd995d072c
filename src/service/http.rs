//! HTTP gateway: maps HTTP requests onto command dispatch.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `<METHOD> <mount>/v<version>/<path>` for every command exposed over HTTP.
//!   Path captures and query values become parameters, the body becomes the
//!   payload and request headers become the session.
//! - `GET <mount>/health` returns `{ "ok": true, "services": [...] }`.
//!
//! ## Example
//!
//! ```ignore
//! let app = service::http::router(&runtime.instances(), "/api")?;
//! service::http::serve(app, "0.0.0.0:80", shutdown).await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Form, FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, on, MethodFilter, MethodRouter};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::command::{route_key, HttpMethod};
use super::error::{ConfigurationError, DispatchError, Violation};
use super::instance::{Invocation, ServiceInstance};
use super::session::Session;
use crate::schema::ValidationError;

/// Build an axum `Router` exposing every HTTP-enabled command of `instances`
/// under `api_mount_path`.
///
/// Two commands claiming the same method and route is a configuration error.
pub fn router(
    instances: &[Arc<ServiceInstance>],
    api_mount_path: &str,
) -> Result<Router, ConfigurationError> {
    let mount = normalize_mount(api_mount_path);
    let mut owners: HashMap<(HttpMethod, String), String> = HashMap::new();
    let mut routes: BTreeMap<String, MethodRouter> = BTreeMap::new();
    let mut violations = Vec::new();

    for instance in instances {
        for command in instance.definition().commands() {
            let Some(http) = command.http() else { continue };
            let path = route_path(&mount, &instance.info().version, &http.path);
            let owner = format!("{} `{}`", instance.info(), command.name());
            let key = (http.method, route_key(&path));
            if let Some(first) = owners.get(&key) {
                violations.push(Violation::DuplicateHttpRoute {
                    method: http.method,
                    path,
                    first: first.clone(),
                    second: owner,
                });
                continue;
            }
            owners.insert(key, owner);

            let endpoint = Endpoint {
                instance: Arc::clone(instance),
                command: command.name().to_string(),
                captures: capture_names(&http.path),
            };
            let method_router = on(method_filter(http.method), move |request: Request| {
                let endpoint = endpoint.clone();
                async move { endpoint.handle(request).await }
            });
            let routed = positional_path(&path);
            let merged = match routes.remove(&routed) {
                Some(existing) => existing.merge(method_router),
                None => method_router,
            };
            routes.insert(routed, merged);
        }
    }

    if !violations.is_empty() {
        return Err(ConfigurationError {
            service: "http gateway".to_string(),
            violations,
        });
    }

    let services: Arc<Vec<Arc<ServiceInstance>>> = Arc::new(instances.to_vec());
    let mut app = Router::new().route(
        &format!("{mount}/health"),
        get(move || health_handler(Arc::clone(&services))),
    );
    for (path, method_router) in routes {
        app = app.route(&path, method_router);
    }
    Ok(app)
}

/// Serve `app` at `addr` (e.g. `"0.0.0.0:80"`) until `shutdown` is cancelled.
pub async fn serve(
    app: Router,
    addr: &str,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "http gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// `<mount>/v<version>/<path>`, with the command's `:name` captures.
pub fn route_path(mount: &str, version: &str, path: &str) -> String {
    format!("{}/v{version}/{path}", normalize_mount(mount))
}

/// The router rejects one route shape with differing capture names, so
/// captures are registered by position (`:p0`, `:p1`, ...) and each endpoint
/// maps them back to its own names.
fn positional_path(path: &str) -> String {
    let mut position = 0;
    path.split('/')
        .map(|segment| {
            if segment.starts_with(':') {
                let capture = format!(":p{position}");
                position += 1;
                capture
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn capture_names(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix(':'))
        .map(str::to_string)
        .collect()
}

fn normalize_mount(mount: &str) -> String {
    let trimmed = mount.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

#[derive(Clone)]
struct Endpoint {
    instance: Arc<ServiceInstance>,
    command: String,
    /// Capture names of the command's path, in order.
    captures: Vec<String>,
}

impl Endpoint {
    async fn handle(&self, request: Request) -> Response {
        let invocation = match decode_request(request, &self.captures).await {
            Ok(invocation) => invocation,
            Err(err) => return error_response(&err),
        };
        match self.instance.invoke(&self.command, invocation).await {
            Ok(Value::Null) => StatusCode::NO_CONTENT.into_response(),
            Ok(output) => (StatusCode::OK, Json(output)).into_response(),
            Err(err) => error_response(&err),
        }
    }
}

/// Path captures and query string into parameters, body into payload.
async fn decode_request(
    request: Request,
    captures: &[String],
) -> Result<Invocation, DispatchError> {
    let (mut parts, body) = request.into_parts();

    let mut parameters = Map::new();
    if let Ok(Path(values)) =
        Path::<Vec<(String, String)>>::from_request_parts(&mut parts, &()).await
    {
        for (position, value) in values {
            let name = position
                .strip_prefix('p')
                .and_then(|index| index.parse::<usize>().ok())
                .and_then(|index| captures.get(index));
            if let Some(name) = name {
                parameters.insert(name.clone(), Value::String(value));
            }
        }
    }
    let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map_err(|e| invalid("parameter", format!("malformed query string: {e}")))?;
    for (key, value) in query {
        parameters.entry(key).or_insert(Value::String(value));
    }

    let session = session_from_headers(&parts.headers);
    let is_form = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    let request = Request::from_parts(parts, body);

    let payload = if is_form {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| invalid("payload", format!("malformed form body: {e}")))?;
        Value::Object(fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
    } else {
        let bytes = Bytes::from_request(request, &())
            .await
            .map_err(|e| invalid("payload", format!("unreadable body: {e}")))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| invalid("payload", format!("malformed JSON body: {e}")))?
        }
    };

    Ok(Invocation::new(payload)
        .with_parameters(Value::Object(parameters))
        .with_session(session))
}

fn invalid(root: &str, message: String) -> DispatchError {
    DispatchError::Validation(ValidationError::single(message).prefixed(root))
}

fn error_response(err: &DispatchError) -> Response {
    let response = err.to_response();
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

/// `GET <mount>/health`
async fn health_handler(services: Arc<Vec<Arc<ServiceInstance>>>) -> impl IntoResponse {
    let services: Vec<Value> = services
        .iter()
        .map(|instance| {
            let commands: Vec<&str> = instance
                .definition()
                .commands()
                .iter()
                .map(|c| c.name())
                .collect();
            json!({
                "name": instance.info().name,
                "version": instance.info().version,
                "state": instance.state(),
                "commands": commands,
            })
        })
        .collect();
    Json(json!({ "ok": true, "services": services }))
}

/// Extract session variables from HTTP headers.
///
/// All headers are lowercased and included as session variables.
fn session_from_headers(headers: &HeaderMap) -> Session {
    let mut vars = HashMap::new();
    for (name, value) in headers.iter() {
        if let Ok(v) = value.to_str() {
            vars.insert(name.as_str().to_string(), v.to_string());
        }
    }
    Session::from_map(vars)
}
