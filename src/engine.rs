//! Mock resolution engine.

use crate::config::GlobalSettings;
use crate::error::Result;
use crate::matcher::{split_path, ParameterBinding};
use crate::request::MockRequest;
use crate::response::{
    error_response, finalize, split_directives, status_for_keyword, ResolvedResponse,
    INJECTED_STATUSES,
};
use crate::scenario::find_applicable_error;
use crate::store::{FsRuleStore, RuleProvider, RuleTemplate};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// A one-shot error armed by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedError {
    pub status: u16,
    /// Only requests whose path contains this substring consume the error
    pub path_filter: Option<String>,
}

impl ForcedError {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            path_filter: None,
        }
    }

    /// Parse a numeric code or a named keyword such as `unauthorized`.
    pub fn parse(code: &str) -> Self {
        let status = code
            .parse::<u16>()
            .unwrap_or_else(|_| status_for_keyword(code));
        Self::new(status)
    }

    pub fn scoped_to(mut self, path: impl Into<String>) -> Self {
        self.path_filter = Some(path.into());
        self
    }

    fn applies_to(&self, path: &str) -> bool {
        self.path_filter
            .as_deref()
            .map_or(true, |filter| path.contains(filter))
    }
}

/// Operator-adjustable runtime settings.
#[derive(Debug, Default)]
pub struct Knobs {
    delay_ms: AtomicU64,
    /// f64 bits
    error_rate: AtomicU64,
    forced: Mutex<Option<ForcedError>>,
}

impl Knobs {
    pub fn new(delay_ms: u64, error_rate: f64) -> Self {
        let knobs = Self::default();
        knobs.set_delay_ms(delay_ms);
        knobs.set_error_rate(error_rate);
        knobs
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms.load(Ordering::Relaxed)
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::Relaxed);
    }

    pub fn error_rate(&self) -> f64 {
        f64::from_bits(self.error_rate.load(Ordering::Relaxed))
    }

    /// Clamped to `0.0..=1.0`.
    pub fn set_error_rate(&self, rate: f64) {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self.error_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub async fn arm(&self, forced: ForcedError) {
        *self.forced.lock().await = Some(forced);
    }

    pub async fn disarm(&self) -> Option<ForcedError> {
        self.forced.lock().await.take()
    }

    pub async fn armed(&self) -> Option<ForcedError> {
        self.forced.lock().await.clone()
    }

    /// Take the forced error if it applies to `path`, leaving it armed otherwise.
    pub async fn take_for(&self, path: &str) -> Option<ForcedError> {
        let mut slot = self.forced.lock().await;
        if slot.as_ref().is_some_and(|f| f.applies_to(path)) {
            slot.take()
        } else {
            None
        }
    }
}

/// Request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub total: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub errors: u64,
}

/// One entry of the route listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// `ANY` for method-agnostic files
    pub method: String,
    pub path: String,
}

/// One entry of the scenario listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioInfo {
    pub method: String,
    pub path: String,
    pub name: String,
}

/// Transport-facing interface.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: MockRequest) -> ResolvedResponse;
}

/// Resolves requests against a rule tree.
pub struct MockEngine<P: RuleProvider = FsRuleStore> {
    provider: P,
    settings: GlobalSettings,
    knobs: Knobs,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
    requests_errored: AtomicU64,
}

enum Outcome {
    Matched(ResolvedResponse),
    Synthesized(ResolvedResponse),
    Unmatched,
}

impl MockEngine<FsRuleStore> {
    /// Engine over a directory using the configured directory names.
    pub fn from_dir(root: impl Into<std::path::PathBuf>, settings: GlobalSettings) -> Self {
        let store = FsRuleStore::new(
            root,
            settings.scenarios_dir.clone(),
            settings.templates_dir.clone(),
        );
        Self::new(store, settings)
    }
}

impl<P: RuleProvider> MockEngine<P> {
    pub fn new(provider: P, settings: GlobalSettings) -> Self {
        let knobs = Knobs::new(settings.delay_ms, settings.error_rate);

        info!(
            delay_ms = settings.delay_ms,
            error_rate = settings.error_rate,
            "Mock engine initialized"
        );

        Self {
            provider,
            settings,
            knobs,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            requests_errored: AtomicU64::new(0),
        }
    }

    pub fn knobs(&self) -> &Knobs {
        &self.knobs
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total: self.requests_total.load(Ordering::Relaxed),
            matched: self.requests_matched.load(Ordering::Relaxed),
            unmatched: self.requests_unmatched.load(Ordering::Relaxed),
            errors: self.requests_errored.load(Ordering::Relaxed),
        }
    }

    /// Resolve one request, then hold it for the configured delay.
    ///
    /// Never fails: rule file problems are logged and served as 500.
    pub async fn resolve(
        &self,
        request: &MockRequest,
        forced: Option<ForcedError>,
    ) -> ResolvedResponse {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let response = match self.resolve_now(request, forced) {
            Ok(Outcome::Matched(response)) => {
                self.requests_matched.fetch_add(1, Ordering::Relaxed);
                response
            }
            Ok(Outcome::Synthesized(response)) => {
                self.requests_errored.fetch_add(1, Ordering::Relaxed);
                response
            }
            Ok(Outcome::Unmatched) => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.settings.log_unmatched {
                    warn!(method = %request.method, path = %request.path, "No matching rule found");
                }
                error_response(&self.provider, 404, request)
            }
            Err(e) => {
                self.requests_errored.fetch_add(1, Ordering::Relaxed);
                error!(method = %request.method, path = %request.path, error = %e, "Failed to resolve request");
                error_response(&self.provider, 500, request)
            }
        };

        let delay_ms = self.knobs.delay_ms();
        if delay_ms > 0 {
            debug!(delay_ms, "Applying delay");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        response
    }

    fn resolve_now(&self, request: &MockRequest, forced: Option<ForcedError>) -> Result<Outcome> {
        if let Some(forced) = forced {
            info!(status = forced.status, path = %request.path, "Applying forced error");
            return Ok(Outcome::Synthesized(error_response(
                &self.provider,
                forced.status,
                request,
            )));
        }

        if let Some(response) = find_applicable_error(&self.provider, request)? {
            info!(status = response.status, path = %request.path, "Error scenario fired");
            return Ok(Outcome::Synthesized(response));
        }

        if let Some(status) = self.draw_injected_error() {
            info!(status, path = %request.path, "Injecting random error");
            return Ok(Outcome::Synthesized(error_response(&self.provider, status, request)));
        }

        let segments = split_path(&request.path);

        if let Some(rule) = self.provider.lookup(&segments, &request.method) {
            return self.serve(&rule, &ParameterBinding::new(), request).map(Outcome::Matched);
        }

        for rule in self.provider.templates()? {
            if !rule.accepts(&request.method) {
                continue;
            }
            if let Some(params) = rule.template.matches(&segments) {
                return self.serve(&rule, &params, request).map(Outcome::Matched);
            }
        }

        Ok(Outcome::Unmatched)
    }

    fn draw_injected_error(&self) -> Option<u16> {
        let rate = self.knobs.error_rate();
        if rate <= 0.0 {
            return None;
        }
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < rate {
            Some(INJECTED_STATUSES[rng.gen_range(0..INJECTED_STATUSES.len())])
        } else {
            None
        }
    }

    fn serve(
        &self,
        rule: &RuleTemplate,
        params: &ParameterBinding,
        request: &MockRequest,
    ) -> Result<ResolvedResponse> {
        let payload = self.provider.load(&rule.source)?;
        let (body, directives) = split_directives(payload, &rule.source)?;

        if self.settings.log_matches {
            info!(
                method = %request.method,
                path = %request.path,
                template = %rule.template,
                kind = ?rule.kind,
                source = %rule.source.display(),
                ?params,
                "Request matched rule"
            );
        }

        Ok(finalize(body, &directives, 200, request))
    }

    /// Every discovered rule, in resolution order.
    pub fn routes(&self) -> Result<Vec<RouteInfo>> {
        Ok(self
            .provider
            .templates()?
            .into_iter()
            .map(|rule| RouteInfo {
                method: rule.method.unwrap_or_else(|| "ANY".to_string()),
                path: rule.template.to_string(),
            })
            .collect())
    }

    /// Every scoped error scenario.
    pub fn scenarios(&self) -> Result<Vec<ScenarioInfo>> {
        Ok(self
            .provider
            .all_scenarios()?
            .into_iter()
            .map(|s| ScenarioInfo {
                method: s.method,
                path: s.scope.to_string(),
                name: s.name,
            })
            .collect())
    }
}

#[async_trait]
impl<P: RuleProvider> RequestHandler for MockEngine<P> {
    async fn handle(&self, request: MockRequest) -> ResolvedResponse {
        let forced = self.knobs.take_for(&request.path).await;
        self.resolve(&request, forced).await
    }
}
