//! Response finalization.
//!
//! Turns a loaded rule payload into the `{status, headers, body}` triple:
//! directive keys are stripped, echo/merge overlays the request body, and
//! status-code templates get `{path}`/`{method}` interpolation.

use crate::error::{MockError, Result};
use crate::request::MockRequest;
use crate::scenario::Condition;
use crate::store::RuleProvider;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::error;

pub const STATUS_DIRECTIVE: &str = "_status";
pub const HEADERS_DIRECTIVE: &str = "_headers";
pub const ECHO_DIRECTIVE: &str = "_echo";
pub const MERGE_DIRECTIVE: &str = "_merge";
pub const CONDITIONS_DIRECTIVE: &str = "_conditions";

const DIRECTIVE_KEYS: &[&str] = &[
    STATUS_DIRECTIVE,
    HEADERS_DIRECTIVE,
    ECHO_DIRECTIVE,
    MERGE_DIRECTIVE,
    CONDITIONS_DIRECTIVE,
];

/// Codes drawn by random error injection.
pub const INJECTED_STATUSES: [u16; 5] = [400, 401, 403, 404, 500];

/// The engine's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// Metadata carried by reserved payload keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Directives {
    #[serde(rename = "_status")]
    pub status: Option<u16>,
    #[serde(rename = "_headers", default)]
    pub headers: HashMap<String, String>,
    #[serde(rename = "_echo", default)]
    pub echo: bool,
    #[serde(rename = "_merge", default)]
    pub merge: bool,
    #[serde(rename = "_conditions")]
    pub conditions: Option<Vec<Condition>>,
}

impl Directives {
    /// `_echo` and `_merge` are aliases for the same overlay.
    pub fn overlays_request(&self) -> bool {
        self.echo || self.merge
    }
}

/// Remove directive keys from an object payload and parse them.
pub fn split_directives(payload: Value, source: &Path) -> Result<(Value, Directives)> {
    let Value::Object(mut body) = payload else {
        return Ok((payload, Directives::default()));
    };

    let mut meta = Map::new();
    for key in DIRECTIVE_KEYS {
        if let Some(value) = body.remove(*key) {
            meta.insert((*key).to_string(), value);
        }
    }

    let directive_error = |e: serde_json::Error| MockError::Directive {
        path: source.to_path_buf(),
        source: e,
    };
    let directives: Directives =
        serde_json::from_value(Value::Object(meta)).map_err(directive_error)?;

    if let Some(status) = directives.status {
        if !(100..=599).contains(&status) {
            return Err(directive_error(serde::de::Error::custom(format!(
                "status {} is outside 100..=599",
                status
            ))));
        }
    }

    Ok((Value::Object(body), directives))
}

/// Apply directives to a stripped body.
pub fn finalize(
    body: Value,
    directives: &Directives,
    default_status: u16,
    request: &MockRequest,
) -> ResolvedResponse {
    let body = if request.carries_body() && directives.overlays_request() {
        overlay(body, request.body.as_ref())
    } else {
        body
    };

    ResolvedResponse {
        status: directives.status.unwrap_or(default_status),
        headers: directives.headers.clone(),
        body,
    }
}

/// Shallow union; request keys win.
fn overlay(payload: Value, request_body: Option<&Value>) -> Value {
    match (payload, request_body) {
        (Value::Object(mut base), Some(Value::Object(extra))) => {
            for (key, value) in extra {
                base.insert(key.clone(), value.clone());
            }
            Value::Object(base)
        }
        (payload, _) => payload,
    }
}

/// Substitute `{path}` and `{method}` in the serialized payload and re-parse.
pub fn interpolate(payload: &Value, path: &str, method: &str) -> Result<Value> {
    let raw = payload
        .to_string()
        .replace("{method}", &json_escape(method))
        .replace("{path}", &json_escape(path));
    serde_json::from_str(&raw).map_err(MockError::Interpolation)
}

/// Escape `s` for embedding inside a JSON string literal.
fn json_escape(s: &str) -> String {
    let quoted = Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Built-in reason phrase and message for known error codes.
pub fn builtin_error(status: u16) -> Option<(&'static str, &'static str)> {
    let entry = match status {
        400 => ("Bad Request", "The request could not be understood"),
        401 => ("Unauthorized", "Authentication is required"),
        403 => ("Forbidden", "You do not have permission to access this resource"),
        404 => ("Not Found", "No mock is defined for this path"),
        409 => ("Conflict", "The request conflicts with the current state"),
        422 => ("Unprocessable Entity", "The request failed validation"),
        429 => ("Too Many Requests", "Rate limit exceeded"),
        500 => ("Internal Server Error", "Something went wrong"),
        502 => ("Bad Gateway", "Upstream returned an invalid response"),
        503 => ("Service Unavailable", "The service is temporarily unavailable"),
        504 => ("Gateway Timeout", "Upstream did not respond in time"),
        _ => return None,
    };
    Some(entry)
}

/// Map a named error keyword to its status code. Unknown names map to 500.
pub fn status_for_keyword(keyword: &str) -> u16 {
    match keyword.to_ascii_lowercase().replace('-', "_").as_str() {
        "bad_request" | "badrequest" => 400,
        "unauthorized" => 401,
        "forbidden" => 403,
        "not_found" | "notfound" => 404,
        "conflict" => 409,
        "validation" | "unprocessable" => 422,
        "rate_limit" | "too_many" => 429,
        "server" | "internal" => 500,
        "bad_gateway" => 502,
        "unavailable" => 503,
        "timeout" => 504,
        _ => 500,
    }
}

fn builtin_response(status: u16, request: &MockRequest) -> ResolvedResponse {
    let (status, (reason, message)) = match builtin_error(status) {
        Some(entry) => (status, entry),
        None => (500, ("Internal Server Error", "Something went wrong")),
    };

    ResolvedResponse {
        status,
        headers: HashMap::new(),
        body: json!({
            "error": reason,
            "message": message,
            "path": request.path,
            "method": request.method,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
    }
}

/// Synthesize an error response for `status`.
///
/// Uses the on-disk template when present, otherwise the built-in body.
/// Codes with neither are served as 500.
pub fn error_response<P: RuleProvider + ?Sized>(
    provider: &P,
    status: u16,
    request: &MockRequest,
) -> ResolvedResponse {
    let template = provider.error_template(status);
    if template.is_none() && builtin_error(status).is_none() {
        return error_response(provider, 500, request);
    }

    let Some(path) = template else {
        return builtin_response(status, request);
    };

    match render_template(provider, &path, status, request) {
        Ok(response) => response,
        Err(e) => {
            error!(status, error = %e, "Failed to render error template");
            if status == 500 {
                builtin_response(500, request)
            } else {
                error_response(provider, 500, request)
            }
        }
    }
}

fn render_template<P: RuleProvider + ?Sized>(
    provider: &P,
    path: &Path,
    status: u16,
    request: &MockRequest,
) -> Result<ResolvedResponse> {
    let payload = provider.load(path)?;
    let payload = interpolate(&payload, &request.path, &request.method)?;
    let (body, directives) = split_directives(payload, path)?;
    Ok(finalize(body, &directives, status, request))
}
