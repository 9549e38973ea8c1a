//! HTTP layer.
//!
//! Binds the matching engine to axum: every request is handed to the
//! endpoint selector with its method, raw target, decoded path, query
//! parameters, and buffered body; the first matching endpoint's response
//! is rendered and written back. The endpoint list lives in an atomically
//! swappable snapshot so reloads never disturb in-flight requests.

use crate::config::{self, ConfigError, Endpoint};
use crate::matcher::Selector;
use crate::template::TemplateEngine;
use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// An immutable endpoint list together with its compiled selector.
///
/// Reloads build a fresh snapshot off to the side and swap it in whole;
/// the snapshot itself is never mutated.
pub struct Snapshot {
    pub endpoints: Vec<Endpoint>,
    pub selector: Selector,
}

impl Snapshot {
    /// Compile an endpoint list into a snapshot.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        let selector = Selector::new(&endpoints)?;
        Ok(Self {
            endpoints,
            selector,
        })
    }

    /// Load and compile endpoint definitions from a file or directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::new(config::load(path)?)
    }
}

/// Application state shared by all requests.
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<ArcSwap<Snapshot>>,
    pub engine: Arc<TemplateEngine>,
}

impl AppState {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            engine: Arc::new(TemplateEngine::new()),
        }
    }

    /// Swap in a freshly compiled snapshot. In-flight requests keep the
    /// snapshot they already loaded.
    pub fn replace(&self, snapshot: Snapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }
}

/// Build the router: a single fallback handler serves every method and
/// path.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(handle)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn handle(State(state): State<AppState>, request: Request<Body>) -> Response {
    let method = request.method().as_str().to_string();
    let raw_path = request.uri().to_string();
    let decoded_path = percent_decode(request.uri().path());
    let query = parse_query(request.uri().query().unwrap_or(""));

    // The body is buffered once, up front, so every candidate endpoint
    // evaluates the same bytes.
    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            error!(error = %err, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    let snapshot = state.snapshot.load();
    let matched = snapshot.selector.find_match(
        &snapshot.endpoints,
        &method,
        &raw_path,
        &decoded_path,
        &query,
        &body,
    );

    let Some(matched) = matched else {
        warn!(method = %method, path = %raw_path, "No matching endpoint");
        return not_found();
    };

    info!(
        endpoint = matched.index,
        method = %method,
        path = %raw_path,
        "Request matched endpoint"
    );

    let rendered = match state.engine.render(&matched.endpoint.response, &matched.context) {
        Ok(rendered) => rendered,
        Err(err) => {
            error!(endpoint = matched.index, error = %err, "Failed to render response");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to render response")
                .into_response();
        }
    };

    let mut builder = Response::builder().status(rendered.status);
    for (name, value) in &rendered.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    match builder.body(Body::from(rendered.body)) {
        Ok(response) => response,
        Err(err) => {
            error!(endpoint = matched.index, error = %err, "Invalid response header or status");
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid response definition").into_response()
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [("content-type", "application/json")],
        r#"{"error":"not_found","message":"No matching endpoint"}"#,
    )
        .into_response()
}

/// Parse a query string into name -> values, preserving duplicates so the
/// matcher can pick the first value per name.
fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = match part.split_once('=') {
            Some((key, value)) => (key, value),
            None => (part, ""),
        };
        params
            .entry(form_decode(key))
            .or_default()
            .push(form_decode(value));
    }

    params
}

/// Percent-decode a path segment; `+` stays literal outside query strings.
fn percent_decode(s: &str) -> String {
    decode_bytes(s, false)
}

/// Decode a form-encoded query component, where `+` encodes a space.
fn form_decode(s: &str) -> String {
    decode_bytes(s, true)
}

fn decode_bytes(s: &str, plus_as_space: bool) -> String {
    let mut out = Vec::with_capacity(s.len());
    let mut bytes = s.bytes();

    while let Some(b) = bytes.next() {
        match b {
            b'%' => {
                let hi = bytes.next();
                let lo = bytes.next();
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        let hex = [hi, lo];
                        match u8::from_str_radix(std::str::from_utf8(&hex).unwrap_or(""), 16) {
                            Ok(byte) => out.push(byte),
                            Err(_) => {
                                out.push(b'%');
                                out.extend_from_slice(&hex);
                            }
                        }
                    }
                    (Some(hi), None) => {
                        out.push(b'%');
                        out.push(hi);
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            other => out.push(other),
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
