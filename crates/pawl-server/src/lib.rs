//! Reference condition host for the Pawl remote protocol v1.
//!
//! Engines whose graphs gate actions through `pawl_remote::HttpCondition`
//! POST an [`EvalRequest`] here and get a verdict back. Routes:
//! `POST /conditions/{name}` evaluates one hosted condition,
//! `GET /conditions` lists the hosted names, `GET /health` answers liveness
//! probes. Evaluation requests must carry an `X-Pawl-Protocol` header
//! matching [`PROTOCOL_VERSION`]; every non-200 response carries a JSON
//! [`ErrorBody`].
//!
//! The [`TestServer`] helper starts a host on a random port for integration testing.

use pawl_graph::{ArgMap, ProviderName, StepId, Value};
use pawl_remote::{ErrorBody, EvalRequest, EvalResponse, PROTOCOL_VERSION};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, warn};

/// Failure modes a hosted condition can report.
///
/// `MalformedArgs` maps to HTTP 422, which the engine surfaces as
/// `EvalError::MalformedArgs`; `Failed` maps to HTTP 500, which aborts the
/// attempt as `RemoteUnavailable`.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("malformed arguments: {0}")]
    MalformedArgs(String),
    #[error("evaluation failed: {0}")]
    Failed(String),
}

impl HostError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedArgs(detail.into())
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed(detail.into())
    }
}

/// A named condition served to remote engines.
///
/// Implementations see the wire projection of the transition scope, not the
/// live scope: `transient` carries only the keys the calling adapter was told
/// to marshal.
pub trait HostedCondition: Send + Sync {
    fn passes(&self, request: &EvalRequest) -> Result<bool, HostError>;
}

/// Closure adapter for [`HostedCondition`].
pub struct HostedFn<F>(pub F);

impl<F> HostedCondition for HostedFn<F>
where
    F: Fn(&EvalRequest) -> Result<bool, HostError> + Send + Sync,
{
    fn passes(&self, request: &EvalRequest) -> Result<bool, HostError> {
        (self.0)(request)
    }
}

/// Immutable table of hosted conditions, shared across request handling.
#[derive(Default)]
pub struct ConditionHost {
    conditions: BTreeMap<ProviderName, Arc<dyn HostedCondition>>,
}

impl ConditionHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `condition` under `name`. Hosting a name twice keeps the later entry.
    #[must_use]
    pub fn host(
        mut self,
        name: impl Into<ProviderName>,
        condition: impl HostedCondition + 'static,
    ) -> Self {
        self.conditions.insert(name.into(), Arc::new(condition));
        self
    }

    #[must_use]
    pub fn host_fn<F>(self, name: impl Into<ProviderName>, f: F) -> Self
    where
        F: Fn(&EvalRequest) -> Result<bool, HostError> + Send + Sync + 'static,
    {
        self.host(name, HostedFn(f))
    }

    pub fn condition(&self, name: &str) -> Option<&dyn HostedCondition> {
        self.conditions.get(&ProviderName::from(name)).map(|c| &**c)
    }

    /// Hosted names in sorted order, as served by `GET /conditions`.
    pub fn names(&self) -> Vec<&str> {
        self.conditions.keys().map(ProviderName::as_str).collect()
    }
}

fn text_arg<'a>(args: &'a ArgMap, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Resolve `key` against the posted scope projection, transient first.
fn wire_resolve<'a>(request: &'a EvalRequest, key: &str) -> Option<&'a Value> {
    request
        .transient
        .get(key)
        .or_else(|| request.persistent.get(key))
}

/// The scope primitives a reference host serves out of the box.
///
/// Wire-side counterparts of the engine's built-in conditions, under the same
/// names and argument shapes. `scope_defined` and `scope_equals` only see
/// transient keys the adapter marshaled; an unset key is unequal, not an error.
pub fn standard_host() -> ConditionHost {
    ConditionHost::new()
        .host_fn("scope_defined", |req| {
            let key = text_arg(&req.args, "key")
                .ok_or_else(|| HostError::malformed("missing text argument 'key'"))?;
            Ok(wire_resolve(req, key).is_some())
        })
        .host_fn("scope_equals", |req| {
            let key = text_arg(&req.args, "key")
                .ok_or_else(|| HostError::malformed("missing text argument 'key'"))?;
            let expected = req
                .args
                .get("value")
                .ok_or_else(|| HostError::malformed("missing argument 'value'"))?;
            Ok(wire_resolve(req, key) == Some(expected))
        })
        .host_fn("current_step_is", |req| {
            let step = text_arg(&req.args, "step")
                .ok_or_else(|| HostError::malformed("missing text argument 'step'"))?;
            Ok(req.current_steps.contains(&StepId::from(step)))
        })
        .host_fn("caller_is", |req| {
            let expected = text_arg(&req.args, "caller")
                .ok_or_else(|| HostError::malformed("missing text argument 'caller'"))?;
            Ok(req.caller.as_deref() == Some(expected))
        })
}

/// Parsed request target.
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Health,
    List,
    Condition(&'a str),
    Unknown,
}

fn parse_route(path: &str) -> Route<'_> {
    if path == "/health" {
        return Route::Health;
    }
    if path == "/conditions" || path == "/conditions/" {
        return Route::List;
    }
    if let Some(name) = path.strip_prefix("/conditions/") {
        if !name.is_empty() && !name.contains('/') {
            return Route::Condition(name);
        }
    }
    Route::Unknown
}

fn header_value<'a>(req: &'a tiny_http::Request, name: &'static str) -> Option<&'a str> {
    req.headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str())
}

fn respond_json(req: tiny_http::Request, json: impl Into<Vec<u8>>) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(Response::from_data(json.into()).with_header(header));
}

fn respond_err(req: tiny_http::Request, code: u16, msg: &str) {
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let body = serde_json::to_vec(&ErrorBody::new(msg)).unwrap_or_default();
    let _ = req.respond(
        Response::from_data(body)
            .with_header(header)
            .with_status_code(StatusCode(code)),
    );
}

fn read_body(req: &mut tiny_http::Request) -> Option<Vec<u8>> {
    let mut body = Vec::new();
    if req.as_reader().read_to_end(&mut body).is_ok() {
        Some(body)
    } else {
        None
    }
}

fn handle_eval(host: &ConditionHost, mut req: tiny_http::Request, name: &str) {
    // Reject protocol mismatches before touching the body.
    match header_value(&req, "X-Pawl-Protocol").map(str::to_owned) {
        Some(v) if v.parse() == Ok(PROTOCOL_VERSION) => {}
        Some(v) => {
            respond_err(req, 400, &format!("unsupported protocol version '{v}'"));
            return;
        }
        None => {
            respond_err(req, 400, "missing X-Pawl-Protocol header");
            return;
        }
    }

    let Some(condition) = host.condition(name) else {
        respond_err(req, 404, &format!("no hosted condition '{name}'"));
        return;
    };

    let Some(body) = read_body(&mut req) else {
        respond_err(req, 500, "read error");
        return;
    };
    let request: EvalRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            respond_err(req, 400, &format!("invalid request body: {e}"));
            return;
        }
    };

    match condition.passes(&request) {
        Ok(passes) => {
            debug!(
                "condition '{name}' on instance {}: {passes}",
                request.instance
            );
            let json = serde_json::to_vec(&EvalResponse { passes }).unwrap_or_default();
            respond_json(req, json);
        }
        Err(HostError::MalformedArgs(detail)) => {
            warn!("condition '{name}': malformed arguments: {detail}");
            respond_err(req, 422, &detail);
        }
        Err(HostError::Failed(detail)) => {
            error!("condition '{name}': {detail}");
            respond_err(req, 500, &detail);
        }
    }
}

/// Handle a single HTTP request, dispatching on the parsed route.
pub fn handle_request(host: &ConditionHost, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    match parse_route(&url) {
        Route::Condition(name) if method == Method::Post => handle_eval(host, req, name),
        Route::List if method == Method::Get => {
            let json = serde_json::to_string(&host.names()).unwrap_or_else(|_| "[]".to_owned());
            respond_json(req, json.into_bytes());
        }
        Route::Health if method == Method::Get => {
            let _ = req.respond(Response::from_string(r#"{"status":"ok"}"#));
        }
        Route::Condition(_) | Route::List | Route::Health => {
            respond_err(req, 405, "method not allowed");
        }
        Route::Unknown => respond_err(req, 404, "not found"),
    }
}

/// Start the host loop, blocking the current thread.
pub fn run_server(host: &Arc<ConditionHost>, addr: &str) {
    let server = Server::http(addr).expect("failed to bind HTTP server");
    for request in server.incoming_requests() {
        handle_request(host, request);
    }
}

/// A test helper that starts a condition host on a random port in a background thread.
///
/// The host listens on `127.0.0.1:{port}`. Dropping the `TestServer` unblocks
/// the accept loop and ends the thread.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl TestServer {
    /// Start a test host serving `host`. Binds to `127.0.0.1:0` (random port).
    pub fn start(host: ConditionHost) -> Self {
        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");

        let host = Arc::new(host);
        let srv = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            for request in srv.incoming_requests() {
                handle_request(&host, request);
            }
        });

        Self {
            url,
            port,
            server,
            _handle: handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawl_graph::{ActionId, GraphRef, InstanceId, WorkflowName};

    fn eval_request() -> EvalRequest {
        let mut transient = BTreeMap::new();
        transient.insert("score".to_owned(), Value::Int(42));
        let mut persistent = BTreeMap::new();
        persistent.insert("status".to_owned(), Value::from("pending"));
        persistent.insert("score".to_owned(), Value::Int(7));
        EvalRequest {
            args: ArgMap::new(),
            transient,
            persistent,
            instance: InstanceId::from(7),
            action: ActionId::from("approve"),
            current_steps: [StepId::from("review")].into_iter().collect(),
            graph: GraphRef {
                name: WorkflowName::from("articles"),
                digest: "ab".repeat(32),
            },
            caller: Some("kim".to_owned()),
        }
    }

    fn args(pairs: &[(&str, Value)]) -> ArgMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn parse_route_health() {
        assert_eq!(parse_route("/health"), Route::Health);
    }

    #[test]
    fn parse_route_list_with_and_without_slash() {
        assert_eq!(parse_route("/conditions"), Route::List);
        assert_eq!(parse_route("/conditions/"), Route::List);
    }

    #[test]
    fn parse_route_named_condition() {
        assert_eq!(parse_route("/conditions/quorum"), Route::Condition("quorum"));
    }

    #[test]
    fn parse_route_rejects_nested_names() {
        assert_eq!(parse_route("/conditions/a/b"), Route::Unknown);
    }

    #[test]
    fn parse_route_unrelated_paths() {
        assert_eq!(parse_route("/"), Route::Unknown);
        assert_eq!(parse_route("/blobs/x"), Route::Unknown);
    }

    #[test]
    fn host_lookup_by_name() {
        let host = ConditionHost::new().host_fn("yes", |_req| Ok(true));
        assert!(host.condition("yes").is_some());
        assert!(host.condition("no").is_none());
    }

    #[test]
    fn hosting_a_name_twice_keeps_the_later_entry() {
        let host = ConditionHost::new()
            .host_fn("flip", |_req| Ok(false))
            .host_fn("flip", |_req| Ok(true));
        let verdict = host.condition("flip").unwrap().passes(&eval_request());
        assert!(verdict.unwrap());
    }

    #[test]
    fn names_are_sorted() {
        let host = ConditionHost::new()
            .host_fn("zeta", |_req| Ok(true))
            .host_fn("alpha", |_req| Ok(true));
        assert_eq!(host.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn standard_scope_defined_sees_both_projections() {
        let host = standard_host();
        let condition = host.condition("scope_defined").unwrap();
        let mut req = eval_request();

        req.args = args(&[("key", Value::from("score"))]);
        assert!(condition.passes(&req).unwrap());
        req.args = args(&[("key", Value::from("status"))]);
        assert!(condition.passes(&req).unwrap());
        req.args = args(&[("key", Value::from("absent"))]);
        assert!(!condition.passes(&req).unwrap());
    }

    #[test]
    fn standard_scope_defined_requires_key() {
        let host = standard_host();
        let err = host
            .condition("scope_defined")
            .unwrap()
            .passes(&eval_request())
            .unwrap_err();
        assert!(matches!(err, HostError::MalformedArgs(_)));
    }

    #[test]
    fn standard_scope_equals_prefers_transient() {
        let host = standard_host();
        let condition = host.condition("scope_equals").unwrap();
        let mut req = eval_request();

        // "score" is 42 in the transient projection and 7 in the persistent one.
        req.args = args(&[("key", Value::from("score")), ("value", Value::Int(42))]);
        assert!(condition.passes(&req).unwrap());
        req.args = args(&[("key", Value::from("score")), ("value", Value::Int(7))]);
        assert!(!condition.passes(&req).unwrap());
    }

    #[test]
    fn standard_scope_equals_unset_key_is_unequal() {
        let host = standard_host();
        let mut req = eval_request();
        req.args = args(&[("key", Value::from("absent")), ("value", Value::Int(1))]);
        let verdict = host.condition("scope_equals").unwrap().passes(&req);
        assert!(!verdict.unwrap());
    }

    #[test]
    fn standard_current_step_is() {
        let host = standard_host();
        let condition = host.condition("current_step_is").unwrap();
        let mut req = eval_request();

        req.args = args(&[("step", Value::from("review"))]);
        assert!(condition.passes(&req).unwrap());
        req.args = args(&[("step", Value::from("done"))]);
        assert!(!condition.passes(&req).unwrap());
    }

    #[test]
    fn standard_caller_is() {
        let host = standard_host();
        let condition = host.condition("caller_is").unwrap();
        let mut req = eval_request();

        req.args = args(&[("caller", Value::from("kim"))]);
        assert!(condition.passes(&req).unwrap());
        req.args = args(&[("caller", Value::from("sam"))]);
        assert!(!condition.passes(&req).unwrap());

        req.caller = None;
        req.args = args(&[("caller", Value::from("kim"))]);
        assert!(!condition.passes(&req).unwrap());
    }
}
