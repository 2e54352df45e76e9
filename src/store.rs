//! Rule discovery.
//!
//! The rule tree on disk is the database: every call walks the directory
//! again, so edits to rule files take effect on the next request.

use crate::error::{MockError, Result};
use crate::matcher::{param_name, PathTemplate, TemplateSegment};
use globset::{Glob, GlobMatcher};
use serde_json::Value;
use std::fs::DirEntry;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RULE_EXTENSION: &str = "json";
const INDEX_FILE: &str = "index.json";

/// How a rule file was named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `<dir>/<METHOD>.json`
    Method,
    /// `<parent>/<name>.json`, answers any method
    Legacy,
    /// `<dir>/index.json`, answers any method
    Index,
}

/// A rule file addressed by its path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTemplate {
    pub template: PathTemplate,
    /// `None` for method-agnostic files
    pub method: Option<String>,
    pub kind: RuleKind,
    pub source: PathBuf,
}

impl RuleTemplate {
    /// Whether this rule may answer `method`.
    pub fn accepts(&self, method: &str) -> bool {
        self.method.as_deref().map_or(true, |m| m == method)
    }
}

/// A scoped error scenario file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorScenario {
    /// Middle part of `<METHOD>_<name>.json`
    pub name: String,
    pub method: String,
    /// Path prefix owning the scenario directory
    pub scope: PathTemplate,
    pub source: PathBuf,
}

/// Source of rules for the resolver.
///
/// Implementations must reflect the current state of the rule set on every
/// call; a caching provider has to invalidate on change.
pub trait RuleProvider: Send + Sync {
    /// Literal lookup for a normalized path.
    fn lookup(&self, segments: &[&str], method: &str) -> Option<RuleTemplate>;

    /// Every rule in deterministic traversal order.
    fn templates(&self) -> Result<Vec<RuleTemplate>>;

    /// Scenarios for `method` in the directory reached by `segments`.
    fn scenarios_for(&self, segments: &[&str], method: &str) -> Result<Vec<ErrorScenario>>;

    /// Every scenario in the tree, for listings.
    fn all_scenarios(&self) -> Result<Vec<ErrorScenario>>;

    /// Location of the global template for a status code, if present.
    fn error_template(&self, status: u16) -> Option<PathBuf>;

    /// Read and parse one rule file.
    fn load(&self, source: &Path) -> Result<Value>;
}

/// Filesystem-backed rule provider.
#[derive(Debug, Clone)]
pub struct FsRuleStore {
    root: PathBuf,
    scenarios_dir: String,
    templates_dir: String,
}

impl FsRuleStore {
    pub fn new(
        root: impl Into<PathBuf>,
        scenarios_dir: impl Into<String>,
        templates_dir: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            scenarios_dir: scenarios_dir.into(),
            templates_dir: templates_dir.into(),
        }
    }

    fn is_reserved(&self, name: &str) -> bool {
        name == self.scenarios_dir || name == self.templates_dir
    }

    /// Segments that may be joined onto the root.
    fn is_walkable(&self, segment: &str) -> bool {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment.contains('\\')
            && !self.is_reserved(segment)
    }

    fn walk(
        &self,
        dir: &Path,
        prefix: &mut Vec<TemplateSegment>,
        out: &mut Vec<RuleTemplate>,
    ) -> Result<()> {
        let mut subdirs = Vec::new();

        for entry in sorted_entries(dir)? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                if !self.is_reserved(&name) {
                    subdirs.push((name, path));
                }
                continue;
            }
            if let Some(rule) = classify_file(&name, prefix, path) {
                out.push(rule);
            }
        }

        for (name, path) in subdirs {
            prefix.push(TemplateSegment::parse(&name));
            self.walk(&path, prefix, out)?;
            prefix.pop();
        }

        Ok(())
    }

    /// Descend towards `segments`, preferring a parameter directory at each level.
    fn scope_dir(&self, segments: &[&str]) -> Result<Option<(PathBuf, Vec<TemplateSegment>)>> {
        let mut dir = self.root.clone();
        let mut scope = Vec::with_capacity(segments.len());

        for segment in segments {
            if let Some((name, path)) = self.param_child(&dir)? {
                scope.push(TemplateSegment::parse(&name));
                dir = path;
                continue;
            }
            if !self.is_walkable(segment) {
                return Ok(None);
            }
            let next = dir.join(segment);
            if !next.is_dir() {
                return Ok(None);
            }
            scope.push(TemplateSegment::Literal((*segment).to_string()));
            dir = next;
        }

        Ok(Some((dir, scope)))
    }

    fn param_child(&self, dir: &Path) -> Result<Option<(String, PathBuf)>> {
        for entry in sorted_entries(dir)? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if param_name(name).is_some() {
                    return Ok(Some((name.to_string(), path)));
                }
            }
        }
        Ok(None)
    }

    fn collect_scenarios(
        &self,
        dir: &Path,
        scope: &[TemplateSegment],
        filter: &GlobMatcher,
        out: &mut Vec<ErrorScenario>,
    ) -> Result<()> {
        for entry in sorted_entries(dir)? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !filter.is_match(&file_name) {
                continue;
            }
            if let Some((method, name)) = parse_scenario_file(&file_name) {
                out.push(ErrorScenario {
                    name: name.to_string(),
                    method: method.to_string(),
                    scope: PathTemplate::new(scope.to_vec()),
                    source: path,
                });
            }
        }
        Ok(())
    }

    fn walk_scenarios(
        &self,
        dir: &Path,
        prefix: &mut Vec<TemplateSegment>,
        filter: &GlobMatcher,
        out: &mut Vec<ErrorScenario>,
    ) -> Result<()> {
        let scenarios = dir.join(&self.scenarios_dir);
        if scenarios.is_dir() {
            self.collect_scenarios(&scenarios, prefix, filter, out)?;
        }

        for entry in sorted_entries(dir)? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || self.is_reserved(&name) {
                continue;
            }
            prefix.push(TemplateSegment::parse(&name));
            self.walk_scenarios(&path, prefix, filter, out)?;
            prefix.pop();
        }
        Ok(())
    }
}

impl RuleProvider for FsRuleStore {
    fn lookup(&self, segments: &[&str], method: &str) -> Option<RuleTemplate> {
        if !segments.iter().all(|s| self.is_walkable(s)) {
            return None;
        }

        let dir = segments.iter().fold(self.root.clone(), |acc, s| acc.join(s));
        let template = PathTemplate::new(
            segments
                .iter()
                .map(|s| TemplateSegment::Literal((*s).to_string()))
                .collect(),
        );

        let mut candidates = Vec::with_capacity(4);
        if is_method_name(method) {
            candidates.push((dir.join(format!("{}.{}", method, RULE_EXTENSION)), RuleKind::Method));
            candidates.push((dir.join(method), RuleKind::Method));
        }
        if let Some((last, _)) = segments.split_last() {
            candidates.push((dir.with_file_name(format!("{}.{}", last, RULE_EXTENSION)), RuleKind::Legacy));
        }
        candidates.push((dir.join(INDEX_FILE), RuleKind::Index));

        candidates
            .into_iter()
            .find(|(path, _)| path.is_file())
            .map(|(source, kind)| RuleTemplate {
                template: template.clone(),
                method: (kind == RuleKind::Method).then(|| method.to_string()),
                kind,
                source,
            })
    }

    fn templates(&self) -> Result<Vec<RuleTemplate>> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            warn!(root = %self.root.display(), "Rule directory does not exist");
            return Ok(out);
        }
        self.walk(&self.root, &mut Vec::new(), &mut out)?;
        Ok(out)
    }

    fn scenarios_for(&self, segments: &[&str], method: &str) -> Result<Vec<ErrorScenario>> {
        let mut out = Vec::new();
        if !is_method_name(method) || !self.root.is_dir() {
            return Ok(out);
        }

        let Some((dir, scope)) = self.scope_dir(segments)? else {
            return Ok(out);
        };
        let scenarios = dir.join(&self.scenarios_dir);
        if !scenarios.is_dir() {
            return Ok(out);
        }

        let filter = scenario_glob(method)?;
        self.collect_scenarios(&scenarios, &scope, &filter, &mut out)?;
        debug!(
            scope = %PathTemplate::new(scope),
            method,
            candidates = out.len(),
            "Collected error scenarios"
        );
        Ok(out)
    }

    fn all_scenarios(&self) -> Result<Vec<ErrorScenario>> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        let filter = scenario_glob("*")?;
        self.walk_scenarios(&self.root, &mut Vec::new(), &filter, &mut out)?;
        Ok(out)
    }

    fn error_template(&self, status: u16) -> Option<PathBuf> {
        let path = self
            .root
            .join(&self.templates_dir)
            .join(format!("{}.{}", status, RULE_EXTENSION));
        path.is_file().then_some(path)
    }

    fn load(&self, source: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(source).map_err(|e| MockError::io(source, e))?;
        serde_json::from_str(&content).map_err(|e| MockError::Json {
            path: source.to_path_buf(),
            source: e,
        })
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<DirEntry>> {
    let mut entries = std::fs::read_dir(dir)
        .and_then(|rd| rd.collect::<std::io::Result<Vec<_>>>())
        .map_err(|e| MockError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Method names are upper-case ASCII letters; `GET`, `PURGE` and any other
/// extension method alike.
fn is_method_name(method: &str) -> bool {
    !method.is_empty() && method.bytes().all(|b| b.is_ascii_uppercase())
}

fn scenario_glob(method: &str) -> Result<GlobMatcher> {
    Glob::new(&format!("{}_*.{}", method, RULE_EXTENSION))
        .map(|g| g.compile_matcher())
        .map_err(MockError::Pattern)
}

/// Split `<METHOD>_<name>.json` into its parts.
fn parse_scenario_file(file_name: &str) -> Option<(&str, &str)> {
    let stem = file_name.strip_suffix(&format!(".{}", RULE_EXTENSION))?;
    let (method, name) = stem.split_once('_')?;
    if name.is_empty() || !is_method_name(method) {
        return None;
    }
    Some((method, name))
}

fn classify_file(name: &str, prefix: &[TemplateSegment], source: PathBuf) -> Option<RuleTemplate> {
    let stem = name.strip_suffix(&format!(".{}", RULE_EXTENSION));

    let method = stem.unwrap_or(name);
    if is_method_name(method) {
        return Some(RuleTemplate {
            template: PathTemplate::new(prefix.to_vec()),
            method: Some(method.to_string()),
            kind: RuleKind::Method,
            source,
        });
    }

    let stem = stem?;
    if name == INDEX_FILE {
        return Some(RuleTemplate {
            template: PathTemplate::new(prefix.to_vec()),
            method: None,
            kind: RuleKind::Index,
            source,
        });
    }
    if stem.is_empty() {
        return None;
    }

    let mut segments = prefix.to_vec();
    segments.push(TemplateSegment::parse(stem));
    Some(RuleTemplate {
        template: PathTemplate::new(segments),
        method: None,
        kind: RuleKind::Legacy,
        source,
    })
}
