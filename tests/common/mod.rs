//! In-process mock registry for integration tests

#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use registry_client::{ClientConfig, Logger, RegistryClient};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A request as seen by the mock registry
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query parameters in order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let query = self.query.as_deref().unwrap_or_default();
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

type Handler = dyn Fn(&RecordedRequest, &str) -> Response + Send + Sync;

#[derive(Clone)]
struct MockState {
    base: String,
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct MockRegistry {
    /// `http://127.0.0.1:<port>`
    pub base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockRegistry {
    /// Serves every request with `handler`, which also receives the base URL
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest, &str) -> Response + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = MockState {
            base: base.clone(),
            handler: Arc::new(handler),
            requests: Arc::clone(&requests),
        };
        let app = Router::new().fallback(dispatch).with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base, requests }
    }

    /// Repository reference served by this registry
    pub fn repo(&self) -> String {
        format!("{}/ns/name", self.base)
    }

    pub fn client(&self) -> RegistryClient {
        self.client_with(ClientConfig::default())
    }

    pub fn client_with(&self, config: ClientConfig) -> RegistryClient {
        RegistryClient::builder(self.repo())
            .with_config(config)
            .with_logger(Logger::new_quiet())
            .build()
            .unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn dispatch(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    };
    state.requests.lock().unwrap().push(request.clone());
    (state.handler)(&request, &state.base)
}

/// Builds a response with the given status, headers and body
pub fn respond(status: u16, headers: &[(&str, &str)], body: impl Into<Body>) -> Response {
    let mut builder = axum::http::Response::builder().status(StatusCode::from_u16(status).unwrap());
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(body.into()).unwrap()
}

pub fn json(status: u16, value: serde_json::Value) -> Response {
    respond(
        status,
        &[("content-type", "application/json")],
        value.to_string(),
    )
}

pub fn not_found() -> Response {
    json(
        404,
        serde_json::json!({"errors": [{"code": "NOT_FOUND", "message": "not found"}]}),
    )
}
