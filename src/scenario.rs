//! Error scenario evaluation.
//!
//! Scenario files live in a path's error directory as `<METHOD>_<name>.json`.
//! A scenario either declares `_conditions` (fires when any condition holds)
//! or relies on a built-in predicate selected by its name.

use crate::error::Result;
use crate::matcher::split_path;
use crate::request::MockRequest;
use crate::response::{finalize, split_directives, ResolvedResponse};
use crate::store::RuleProvider;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Status used when a scenario payload has no `_status`.
pub const DEFAULT_SCENARIO_STATUS: u16 = 400;

const MIN_PASSWORD_LEN: usize = 6;

/// A conjunction of equality checks against the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default)]
    pub body: Option<Map<String, Value>>,
    #[serde(default)]
    pub query: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub headers: Option<HashMap<String, Value>>,
}

impl Condition {
    /// True when every declared check is satisfied.
    pub fn holds(&self, request: &MockRequest) -> bool {
        self.body_holds(request) && self.query_holds(request) && self.headers_holds(request)
    }

    fn body_holds(&self, request: &MockRequest) -> bool {
        let Some(expected) = &self.body else {
            return true;
        };
        if expected.is_empty() {
            return true;
        }
        match &request.body {
            Some(Value::Object(actual)) => expected
                .iter()
                .all(|(key, value)| actual.get(key) == Some(value)),
            _ => false,
        }
    }

    fn query_holds(&self, request: &MockRequest) -> bool {
        self.query.as_ref().map_or(true, |expected| {
            expected.iter().all(|(key, value)| {
                request
                    .query
                    .get(key)
                    .is_some_and(|actual| text_equals(actual, value))
            })
        })
    }

    fn headers_holds(&self, request: &MockRequest) -> bool {
        self.headers.as_ref().map_or(true, |expected| {
            expected.iter().all(|(name, value)| {
                request
                    .header(name)
                    .is_some_and(|actual| text_equals(actual, value))
            })
        })
    }
}

/// Compare a textual request value with a JSON expectation.
fn text_equals(actual: &str, expected: &Value) -> bool {
    match expected {
        Value::String(s) => actual == s,
        Value::Null => false,
        other => actual == other.to_string(),
    }
}

/// Named scenarios with predicates of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinScenario {
    ExistingEmail,
    InvalidInput,
    Unauthorized,
    Forbidden,
}

impl BuiltinScenario {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "existing_email" => Some(BuiltinScenario::ExistingEmail),
            "invalid_input" => Some(BuiltinScenario::InvalidInput),
            "unauthorized" => Some(BuiltinScenario::Unauthorized),
            "forbidden" => Some(BuiltinScenario::Forbidden),
            _ => None,
        }
    }

    pub fn fires(self, request: &MockRequest) -> bool {
        let value = |name: &str| request.body.as_ref().and_then(|b| b.get(name));
        let field = |name: &str| value(name).and_then(Value::as_str);
        // Absent, null or "" count as missing; any other value is present.
        let blank = |name: &str| match value(name) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };

        match self {
            BuiltinScenario::ExistingEmail => field("email").is_some_and(|e| e.contains("existing")),
            BuiltinScenario::InvalidInput => {
                blank("name")
                    || blank("email")
                    || field("password").is_some_and(|p| p.chars().count() < MIN_PASSWORD_LEN)
            }
            BuiltinScenario::Unauthorized => !request
                .header("authorization")
                .is_some_and(|v| v.starts_with("Bearer ")),
            BuiltinScenario::Forbidden => request.header("role") == Some("guest"),
        }
    }
}

/// Find the first scenario that fires for `request`.
///
/// Candidates come from the error directory reached by descending the rule
/// tree along the request path.
pub fn find_applicable_error<P: RuleProvider + ?Sized>(
    provider: &P,
    request: &MockRequest,
) -> Result<Option<ResolvedResponse>> {
    let segments = split_path(&request.path);

    for scenario in provider.scenarios_for(&segments, &request.method)? {
        let payload = provider.load(&scenario.source)?;
        let (body, directives) = split_directives(payload, &scenario.source)?;

        let fires = match &directives.conditions {
            Some(conditions) => conditions.iter().any(|c| c.holds(request)),
            None => BuiltinScenario::from_name(&scenario.name).is_some_and(|b| b.fires(request)),
        };

        debug!(
            scenario = %scenario.name,
            scope = %scenario.scope,
            fires,
            "Evaluated error scenario"
        );

        if fires {
            return Ok(Some(finalize(
                body,
                &directives,
                DEFAULT_SCENARIO_STATUS,
                request,
            )));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{store_for, write_rule};
    use serde_json::json;

    fn condition(value: Value) -> Condition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_body_condition_exact_equality() {
        let cond = condition(json!({"body": {"email": "a@b.com"}}));

        let hit = MockRequest::new("POST", "/users").with_body(json!({"email": "a@b.com"}));
        assert!(cond.holds(&hit));

        let other = MockRequest::new("POST", "/users").with_body(json!({"email": "a@b.co"}));
        assert!(!cond.holds(&other));

        let missing = MockRequest::new("POST", "/users");
        assert!(!cond.holds(&missing));
    }

    #[test]
    fn test_query_and_header_conditions() {
        let cond = condition(json!({"query": {"page": 2}, "headers": {"X-Tenant": "acme"}}));

        let hit = MockRequest::new("GET", "/items")
            .with_query("page", "2")
            .with_header("x-tenant", "acme");
        assert!(cond.holds(&hit));

        let no_header = MockRequest::new("GET", "/items").with_query("page", "2");
        assert!(!cond.holds(&no_header));
    }

    #[test]
    fn test_unknown_condition_keys_rejected() {
        assert!(serde_json::from_value::<Condition>(json!({"cookies": {}})).is_err());
    }

    #[test]
    fn test_builtin_existing_email() {
        let s = BuiltinScenario::from_name("existing-email").unwrap();
        let req = MockRequest::new("POST", "/u").with_body(json!({"email": "existing@x.io"}));
        assert!(s.fires(&req));
        let req = MockRequest::new("POST", "/u").with_body(json!({"email": "new@x.io"}));
        assert!(!s.fires(&req));
    }

    #[test]
    fn test_builtin_invalid_input() {
        let s = BuiltinScenario::InvalidInput;
        let valid = json!({"name": "Ann", "email": "ann@x.io", "password": "secret1"});
        assert!(!s.fires(&MockRequest::new("POST", "/u").with_body(valid)));

        let empty_name = json!({"name": "", "email": "ann@x.io"});
        assert!(s.fires(&MockRequest::new("POST", "/u").with_body(empty_name)));

        let short = json!({"name": "Ann", "email": "ann@x.io", "password": "abc"});
        assert!(s.fires(&MockRequest::new("POST", "/u").with_body(short)));

        let numeric_name = json!({"name": 42, "email": "ann@x.io"});
        assert!(!s.fires(&MockRequest::new("POST", "/u").with_body(numeric_name)));

        let null_email = json!({"name": "Ann", "email": null});
        assert!(s.fires(&MockRequest::new("POST", "/u").with_body(null_email)));
        assert!(s.fires(&MockRequest::new("POST", "/u")));
    }

    #[test]
    fn test_builtin_auth_scenarios() {
        let unauthorized = BuiltinScenario::Unauthorized;
        assert!(unauthorized.fires(&MockRequest::new("GET", "/")));
        assert!(unauthorized.fires(&MockRequest::new("GET", "/").with_header("Authorization", "Basic x")));
        assert!(!unauthorized.fires(&MockRequest::new("GET", "/").with_header("Authorization", "Bearer t")));

        let forbidden = BuiltinScenario::Forbidden;
        assert!(forbidden.fires(&MockRequest::new("GET", "/").with_header("Role", "guest")));
        assert!(!forbidden.fires(&MockRequest::new("GET", "/").with_header("Role", "admin")));
    }

    #[test]
    fn test_unknown_names_never_fire() {
        assert!(BuiltinScenario::from_name("server_melted").is_none());
    }

    #[test]
    fn test_find_applicable_error_declared_conditions() {
        let dir = tempfile::tempdir().unwrap();
        write_rule(
            dir.path(),
            "users/errors/POST_duplicate.json",
            r#"{"_status": 409, "_conditions": [{"body": {"email": "a@b.com"}}], "error": "duplicate"}"#,
        );
        let store = store_for(dir.path());

        let req = MockRequest::new("POST", "/users").with_body(json!({"email": "a@b.com"}));
        let response = find_applicable_error(&store, &req).unwrap().unwrap();
        assert_eq!(response.status, 409);
        assert_eq!(response.body, json!({"error": "duplicate"}));

        let req = MockRequest::new("POST", "/users").with_body(json!({"email": "c@d.com"}));
        assert!(find_applicable_error(&store, &req).unwrap().is_none());
    }

    #[test]
    fn test_find_applicable_error_builtin_and_default_status() {
        let dir = tempfile::tempdir().unwrap();
        write_rule(dir.path(), "users/{id}/errors/GET_unauthorized.json", r#"{"error": "login first"}"#);
        write_rule(dir.path(), "users/{id}/errors/GET_mystery.json", r#"{"error": "never"}"#);
        let store = store_for(dir.path());

        let req = MockRequest::new("GET", "/users/42");
        let response = find_applicable_error(&store, &req).unwrap().unwrap();
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"], "login first");

        let req = MockRequest::new("GET", "/users/42").with_header("Authorization", "Bearer ok");
        assert!(find_applicable_error(&store, &req).unwrap().is_none());
    }

    #[test]
    fn test_first_firing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_rule(dir.path(), "errors/GET_a.json", r#"{"_status": 418, "_conditions": [{}], "n": "a"}"#);
        write_rule(dir.path(), "errors/GET_b.json", r#"{"_status": 503, "_conditions": [{}], "n": "b"}"#);
        let store = store_for(dir.path());

        let response = find_applicable_error(&store, &MockRequest::new("GET", "/")).unwrap().unwrap();
        assert_eq!(response.status, 418);
        assert_eq!(response.body, json!({"n": "a"}));
    }

    #[test]
    fn test_empty_condition_list_never_fires() {
        let dir = tempfile::tempdir().unwrap();
        write_rule(dir.path(), "errors/GET_unauthorized.json", r#"{"_conditions": []}"#);
        let store = store_for(dir.path());

        assert!(find_applicable_error(&store, &MockRequest::new("GET", "/")).unwrap().is_none());
    }
}
