//! Admission middleware for the books API.
//!
//! Derives a client key from the request, charges the profile matching the
//! HTTP method, and either forwards the request (attaching quota headers) or
//! answers 429 with a Retry-After hint. Admission failures inside this layer
//! fail open: a broken key function or missing profile passes traffic
//! through rather than rejecting it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use super::AdmissionControl;
use super::bucket::Decision;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Failure of a custom key function. Only ever logged; requests for which a
/// key cannot be derived are admitted.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("client key unavailable: {0}")]
    Unavailable(String),
}

/// Custom client-key derivation, replacing the header/peer-address chain.
pub type KeyFn = Arc<dyn Fn(&Request) -> Result<String, KeyError> + Send + Sync>;

/// Called with (profile, client key) every time a request is rejected.
pub type OnLimitHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Everything the admission layer needs; fixed at construction.
#[derive(Clone)]
pub struct AdmissionState {
    control: Arc<AdmissionControl>,
    key_fn: Option<KeyFn>,
    on_limit: Option<OnLimitHook>,
}

impl AdmissionState {
    pub fn new(control: Arc<AdmissionControl>) -> Self {
        Self {
            control,
            key_fn: None,
            on_limit: None,
        }
    }

    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    pub fn with_on_limit(mut self, hook: OnLimitHook) -> Self {
        self.on_limit = Some(hook);
        self
    }
}

/// The middleware itself, for `axum::middleware::from_fn_with_state`.
pub async fn admit(
    State(state): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let key = match &state.key_fn {
        Some(key_fn) => match key_fn(&request) {
            Ok(key) => key,
            Err(err) => {
                warn!("Key derivation failed, admitting request unchecked: {}", err);
                return next.run(request).await;
            }
        },
        None => client_key(&request),
    };

    let profile_name = profile_for(request.method());
    let Some(registry) = state.control.profile(profile_name) else {
        warn!("Admission profile '{}' not configured, admitting request unchecked", profile_name);
        return next.run(request).await;
    };

    let decision = registry.consume(&key);
    let limit = registry.config().capacity;

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_quota_headers(response.headers_mut(), limit, &decision);
        response
    } else {
        if let Some(hook) = &state.on_limit {
            hook(profile_name, &key);
        }
        debug!(profile = profile_name, key = %key, "Rate limit exceeded");
        rejected(limit, &decision)
    }
}

/// Default client key: first `X-Forwarded-For` hop, then `X-Real-IP`, then
/// the peer address, then a shared sentinel. Never fails.
pub fn client_key(request: &Request) -> String {
    if let Some(forwarded) = header_value(request, "x-forwarded-for")
        .and_then(|value| value.split(',').next().map(str::trim))
        .filter(|value| !value.is_empty())
    {
        return forwarded.to_string();
    }
    if let Some(real_ip) = header_value(request, "x-real-ip")
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return real_ip.to_string();
    }
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    "unknown".to_string()
}

fn header_value<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|value| value.to_str().ok())
}

/// Reads ride the standard profile; everything mutating pays write rates.
fn profile_for(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" => "standard",
        _ => "write",
    }
}

fn apply_quota_headers(headers: &mut HeaderMap, limit: f64, decision: &Decision) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(limit as u64));
    headers.insert(
        HEADER_REMAINING,
        HeaderValue::from(decision.remaining.floor().max(0.0) as u64),
    );
    // A saturated reset_after would overflow the sum; cap the timestamp.
    let reset_unix = Utc::now()
        .timestamp()
        .saturating_add(decision.reset_after.as_secs_f64().ceil() as i64);
    headers.insert(HEADER_RESET, HeaderValue::from(reset_unix));
}

fn rejected(limit: f64, decision: &Decision) -> Response {
    let retry_secs = decision
        .retry_after
        .map(|wait| wait.as_secs_f64().ceil().max(1.0) as u64)
        .unwrap_or(1);
    // Waits beyond chrono's range pin the display time to the calendar
    // ceiling instead of panicking.
    let reset_secs = decision.reset_after.as_secs_f64().ceil() as i64;
    let reset_time = chrono::Duration::try_seconds(reset_secs)
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
    let body = json!({
        "error": "Rate limit exceeded",
        "message": format!("Too many requests; retry in {retry_secs}s"),
        "retry_after_seconds": retry_secs,
        "limit": limit as u64,
        "reset_time": reset_time.to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
    apply_quota_headers(response.headers_mut(), limit, decision);
    response
}
