//! Path template matching.
//!
//! Request paths are split into segments and compared against rule templates
//! segment by segment. A template segment written as `{name}` binds the
//! request segment at that position.

use std::collections::HashMap;
use std::fmt;

/// Parameter name to captured request segment.
pub type ParameterBinding = HashMap<String, String>;

/// One segment of a rule template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl TemplateSegment {
    /// Classify a directory or file-stem name.
    pub fn parse(raw: &str) -> Self {
        match param_name(raw) {
            Some(name) => TemplateSegment::Param(name.to_string()),
            None => TemplateSegment::Literal(raw.to_string()),
        }
    }
}

/// Returns the inner name when `raw` is wrapped in braces.
pub fn param_name(raw: &str) -> Option<&str> {
    raw.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

/// An ordered sequence of template segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathTemplate {
    segments: Vec<TemplateSegment>,
}

impl PathTemplate {
    pub fn new(segments: Vec<TemplateSegment>) -> Self {
        Self { segments }
    }

    /// Parse a slash-separated template such as `/users/{id}`.
    pub fn parse(template: &str) -> Self {
        let segments = split_path(template)
            .into_iter()
            .map(TemplateSegment::parse)
            .collect();
        Self { segments }
    }

    /// Match already-split request segments against this template.
    pub fn matches(&self, request: &[&str]) -> Option<ParameterBinding> {
        match_segments(request, &self.segments)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(lit) => write!(f, "/{}", lit)?,
                TemplateSegment::Param(name) => write!(f, "/{{{}}}", name)?,
            }
        }
        Ok(())
    }
}

/// Split a path into segments, ignoring trailing slashes and a missing
/// leading slash. The root path has none.
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_end_matches('/');
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// Match request segments against template segments.
///
/// Counts must be equal. Literals compare byte-for-byte; parameters accept
/// any non-empty segment.
pub fn match_segments(request: &[&str], template: &[TemplateSegment]) -> Option<ParameterBinding> {
    if request.len() != template.len() {
        return None;
    }

    let mut params = ParameterBinding::new();
    for (value, segment) in request.iter().zip(template) {
        match segment {
            TemplateSegment::Literal(lit) => {
                if lit != value {
                    return None;
                }
            }
            TemplateSegment::Param(name) => {
                if value.is_empty() {
                    return None;
                }
                params.insert(name.clone(), (*value).to_string());
            }
        }
    }

    Some(params)
}
