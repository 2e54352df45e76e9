//! Sample rule tree written by `--init`.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Relative path and content of every sample file.
const SAMPLE_RULES: &[(&str, &str)] = &[
    ("users/GET.json", include_str!("../demos/mocks/users/GET.json")),
    ("users/POST.json", include_str!("../demos/mocks/users/POST.json")),
    (
        "users/errors/GET_vip_only.json",
        include_str!("../demos/mocks/users/errors/GET_vip_only.json"),
    ),
    (
        "users/errors/POST_existing_email.json",
        include_str!("../demos/mocks/users/errors/POST_existing_email.json"),
    ),
    (
        "users/errors/POST_invalid_input.json",
        include_str!("../demos/mocks/users/errors/POST_invalid_input.json"),
    ),
    ("users/{id}/GET.json", include_str!("../demos/mocks/users/{id}/GET.json")),
    ("users/{id}/PUT.json", include_str!("../demos/mocks/users/{id}/PUT.json")),
    ("users/{id}/DELETE.json", include_str!("../demos/mocks/users/{id}/DELETE.json")),
    (
        "users/{id}/errors/GET_unauthorized.json",
        include_str!("../demos/mocks/users/{id}/errors/GET_unauthorized.json"),
    ),
    (
        "users/{id}/errors/DELETE_forbidden.json",
        include_str!("../demos/mocks/users/{id}/errors/DELETE_forbidden.json"),
    ),
    ("health.json", include_str!("../demos/mocks/health.json")),
];

/// Sample global error templates, keyed by status code.
const SAMPLE_TEMPLATES: &[(u16, &str)] = &[
    (404, include_str!("../demos/mocks/_errors/404.json")),
    (500, include_str!("../demos/mocks/_errors/500.json")),
];

/// Default configuration printed by `--print-config`.
pub const DEFAULT_CONFIG: &str = include_str!("../demos/default-config.yaml");

/// Write the sample tree under `root`, skipping files that already exist.
///
/// Returns the files that were created.
pub fn init(root: &Path, scenarios_dir: &str, templates_dir: &str) -> anyhow::Result<Vec<PathBuf>> {
    let rules = SAMPLE_RULES.iter().map(|(rel, content)| {
        let rel = rel.replace("/errors/", &format!("/{}/", scenarios_dir));
        (root.join(rel), *content)
    });
    let templates = SAMPLE_TEMPLATES.iter().map(|(status, content)| {
        (root.join(templates_dir).join(format!("{}.json", status)), *content)
    });

    let mut written = Vec::new();
    for (path, content) in rules.chain(templates) {
        if path.exists() {
            debug!(path = %path.display(), "Keeping existing file");
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }

    info!(root = %root.display(), files = written.len(), "Sample rules written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockServerConfig;
    use crate::engine::MockEngine;
    use crate::request::MockRequest;
    use serde_json::json;

    #[test]
    fn test_sample_files_are_valid_json() {
        for (rel, content) in SAMPLE_RULES {
            serde_json::from_str::<serde_json::Value>(content)
                .unwrap_or_else(|e| panic!("{} is not valid JSON: {}", rel, e));
        }
        for (status, content) in SAMPLE_TEMPLATES {
            serde_json::from_str::<serde_json::Value>(content)
                .unwrap_or_else(|e| panic!("{}.json is not valid JSON: {}", status, e));
        }
    }

    #[test]
    fn test_default_config_parses() {
        let config: MockServerConfig = serde_yaml::from_str(DEFAULT_CONFIG).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_init_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("users/GET.json");
        std::fs::create_dir_all(custom.parent().unwrap()).unwrap();
        std::fs::write(&custom, "[]").unwrap();

        let written = init(dir.path(), "errors", "_errors").unwrap();
        assert_eq!(written.len(), SAMPLE_RULES.len() + SAMPLE_TEMPLATES.len() - 1);
        assert_eq!(std::fs::read_to_string(&custom).unwrap(), "[]");

        assert!(init(dir.path(), "errors", "_errors").unwrap().is_empty());
    }

    #[test]
    fn test_init_honours_directory_names() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "failures", "_tpl").unwrap();
        assert!(dir.path().join("users/failures/POST_existing_email.json").is_file());
        assert!(dir.path().join("_tpl/404.json").is_file());
        assert!(!dir.path().join("users/errors").exists());
    }

    #[tokio::test]
    async fn test_sample_tree_resolves() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), "errors", "_errors").unwrap();
        let engine = MockEngine::from_dir(dir.path(), Default::default());

        let response = engine
            .resolve(&MockRequest::new("GET", "/users/7"), None)
            .await;
        assert_eq!(response.status, 401);
        assert_eq!(response.headers["WWW-Authenticate"], "Bearer");

        let request = MockRequest::new("GET", "/users/7").with_header("Authorization", "Bearer t");
        let response = engine.resolve(&request, None).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["role"], "admin");

        let request = MockRequest::new("PUT", "/users/7")
            .with_header("Authorization", "Bearer t")
            .with_body(json!({"name": "Grace"}));
        let response = engine.resolve(&request, None).await;
        assert_eq!(response.body["name"], "Grace");
        assert_eq!(response.body["updated"], true);

        let response = engine.resolve(&MockRequest::new("GET", "/health"), None).await;
        assert_eq!(response.body, json!({"status": "ok"}));

        let response = engine.resolve(&MockRequest::new("GET", "/nope"), None).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body["message"], "No mock defined for GET /nope");
    }
}
