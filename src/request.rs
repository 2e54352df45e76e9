//! Incoming request model handed to the engine by the transport.

use serde_json::Value;
use std::collections::HashMap;

/// A request as seen by the resolution engine.
#[derive(Debug, Clone, Default)]
pub struct MockRequest {
    /// Upper-cased HTTP method
    pub method: String,
    /// Raw request path (without query string)
    pub path: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Request headers (last value wins for repeated names)
    pub headers: HashMap<String, String>,
    /// JSON request body, if one was sent and parsed
    pub body: Option<Value>,
}

impl MockRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Build a request from raw transport parts.
    ///
    /// Bodies that are empty or not valid JSON are dropped.
    pub fn from_parts(
        method: &str,
        path: &str,
        query_string: Option<&str>,
        headers: HashMap<String, String>,
        body: &[u8],
    ) -> Self {
        let body = if body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            serde_json::from_slice(body).ok()
        };

        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            query: parse_query_string(query_string.unwrap_or("")),
            headers,
            body,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Methods whose body participates in echo/merge.
    pub fn carries_body(&self) -> bool {
        matches!(self.method.as_str(), "POST" | "PUT")
    }
}

/// Parse a query string into key-value pairs.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        if let Some((key, value)) = part.split_once('=') {
            params.insert(percent_decode(key), percent_decode(value));
        } else {
            params.insert(percent_decode(part), String::new());
        }
    }

    params
}

/// Decode `%XX` escapes and `+` into a UTF-8 string.
fn percent_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned(),
    }
}
