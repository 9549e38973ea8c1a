//! Request matching.
//!
//! Decides whether an incoming request satisfies an endpoint's declared
//! request spec and captures named path parameters for response templating.

use crate::config::{non_empty, ConfigError, Endpoint, MatcherRule, RequestSpec};
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

/// Values captured from the request during matching, consumed by the
/// response template. Created fresh per request.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Path parameters extracted by `urlPathTemplate` matching.
    pub path_params: HashMap<String, String>,
    /// First value per query parameter name.
    pub query_params: HashMap<String, String>,
}

/// Result of matching a request against the endpoint list.
#[derive(Debug)]
pub struct MatchResult<'a> {
    /// The first endpoint that matched.
    pub endpoint: &'a Endpoint,
    /// Position of the endpoint in the list, for logging.
    pub index: usize,
    /// Context captured during matching.
    pub context: MatchContext,
}

/// Endpoint selector with all regexes compiled up front.
///
/// Built once per configuration load; `find_match` is read-only, so any
/// number of requests may use it concurrently.
pub struct Selector {
    compiled: Vec<CompiledRequest>,
}

struct CompiledRequest {
    url: Option<UrlRule>,
    query: HashMap<String, CompiledRule>,
    path_params: HashMap<String, CompiledRule>,
    body: Option<CompiledRule>,
}

/// One of the five mutually exclusive URL shapes an endpoint can declare.
enum UrlRule {
    /// Exact equality against the raw request target.
    Url(String),
    /// Regex search against the raw request target.
    UrlPattern(Regex),
    /// Exact equality against the decoded path.
    UrlPath(String),
    /// Regex search against the decoded path.
    UrlPathPattern(Regex),
    /// Segment template, stored pre-split on `/`.
    UrlPathTemplate(Vec<String>),
}

/// A `MatcherRule` with its regexes compiled.
pub struct CompiledRule {
    equal_to: Option<String>,
    matches: Option<Regex>,
    does_not_match: Option<Regex>,
    contains: Option<String>,
    does_not_contain: Option<String>,
}

impl CompiledRule {
    /// Compile a rule, surfacing invalid regex source as a load-time error.
    pub fn compile(rule: &MatcherRule) -> Result<Self, ConfigError> {
        Ok(Self {
            equal_to: non_empty(&rule.equal_to).map(str::to_string),
            matches: compile_pattern(&rule.matches)?,
            does_not_match: compile_pattern(&rule.does_not_match)?,
            contains: non_empty(&rule.contains).map(str::to_string),
            does_not_contain: non_empty(&rule.does_not_contain).map(str::to_string),
        })
    }

    /// Evaluate every specified check against `actual`; all must pass.
    /// A rule with no checks is trivially true.
    pub fn is_match(&self, actual: &str) -> bool {
        if let Some(expected) = &self.equal_to {
            if actual != expected {
                return false;
            }
        }
        if let Some(re) = &self.matches {
            if !re.is_match(actual) {
                return false;
            }
        }
        if let Some(re) = &self.does_not_match {
            if re.is_match(actual) {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !actual.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &self.does_not_contain {
            if actual.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

fn compile_pattern(field: &Option<String>) -> Result<Option<Regex>, ConfigError> {
    non_empty(field).map(compile_regex).transpose()
}

impl Selector {
    /// Compile the endpoint list into a selector.
    ///
    /// Regexes are compiled here, once per configuration load, and status
    /// codes validated; requests never pay compilation cost or see pattern
    /// errors.
    pub fn new(endpoints: &[Endpoint]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(endpoints.len());
        for (index, endpoint) in endpoints.iter().enumerate() {
            let status = endpoint.response.status;
            if !(100..=599).contains(&status) {
                return Err(ConfigError::Status { index, status });
            }
            compiled.push(CompiledRequest::compile(&endpoint.request)?);
        }
        Ok(Self { compiled })
    }

    /// Find the first endpoint matching the request.
    ///
    /// `endpoints` must be the same ordered list this selector was built
    /// from. `raw_path` is the request target as received (query string and
    /// all); `decoded_path` is the percent-decoded path. Returns `None`
    /// when the list is exhausted without a match.
    pub fn find_match<'a>(
        &self,
        endpoints: &'a [Endpoint],
        method: &str,
        raw_path: &str,
        decoded_path: &str,
        query: &HashMap<String, Vec<String>>,
        body: &str,
    ) -> Option<MatchResult<'a>> {
        for (index, (endpoint, compiled)) in endpoints.iter().zip(&self.compiled).enumerate() {
            if endpoint.request.method != method {
                continue;
            }
            let Some(path_params) = compiled.resolve_path(raw_path, decoded_path) else {
                continue;
            };
            if !compiled.resolve_query(query) {
                continue;
            }
            if let Some(rule) = &compiled.body {
                if !rule.is_match(body) {
                    continue;
                }
            }

            let mut context = MatchContext {
                path_params,
                ..Default::default()
            };
            for (name, values) in query {
                let first = values.first().cloned().unwrap_or_default();
                context.query_params.insert(name.clone(), first);
            }
            return Some(MatchResult {
                endpoint,
                index,
                context,
            });
        }
        None
    }
}

impl CompiledRequest {
    fn compile(request: &RequestSpec) -> Result<Self, ConfigError> {
        // First non-empty URL field wins; only one should be set.
        let url = if let Some(value) = non_empty(&request.url) {
            Some(UrlRule::Url(value.to_string()))
        } else if let Some(pattern) = non_empty(&request.url_pattern) {
            Some(UrlRule::UrlPattern(compile_regex(pattern)?))
        } else if let Some(value) = non_empty(&request.url_path) {
            Some(UrlRule::UrlPath(value.to_string()))
        } else if let Some(pattern) = non_empty(&request.url_path_pattern) {
            Some(UrlRule::UrlPathPattern(compile_regex(pattern)?))
        } else if let Some(template) = non_empty(&request.url_path_template) {
            let segments = normalize_path(template)
                .split('/')
                .map(str::to_string)
                .collect();
            Some(UrlRule::UrlPathTemplate(segments))
        } else {
            None
        };

        let mut query = HashMap::new();
        for (name, rule) in &request.query_parameters {
            query.insert(name.clone(), CompiledRule::compile(rule)?);
        }
        let mut path_params = HashMap::new();
        for (name, rule) in &request.path_parameters {
            path_params.insert(name.clone(), CompiledRule::compile(rule)?);
        }
        let body = match &request.body {
            Some(rule) => Some(CompiledRule::compile(rule)?),
            None => None,
        };

        Ok(Self {
            url,
            query,
            path_params,
            body,
        })
    }

    /// Resolve the declared URL shape against the request path.
    ///
    /// Returns the captured path parameters on a match; every shape other
    /// than `urlPathTemplate` captures nothing.
    fn resolve_path(&self, raw_path: &str, decoded_path: &str) -> Option<HashMap<String, String>> {
        let raw = normalize_path(raw_path);
        let decoded = normalize_path(decoded_path);

        match self.url.as_ref()? {
            UrlRule::Url(expected) => (raw == expected.as_str()).then(HashMap::new),
            UrlRule::UrlPattern(re) => re.is_match(raw).then(HashMap::new),
            UrlRule::UrlPath(expected) => (decoded == expected.as_str()).then(HashMap::new),
            UrlRule::UrlPathPattern(re) => re.is_match(decoded).then(HashMap::new),
            UrlRule::UrlPathTemplate(segments) => self.resolve_template(segments, decoded),
        }
    }

    fn resolve_template(
        &self,
        segments: &[String],
        decoded: &str,
    ) -> Option<HashMap<String, String>> {
        let actual: Vec<&str> = decoded.split('/').collect();
        if segments.len() != actual.len() {
            return None;
        }

        for (name, rule) in &self.path_params {
            let placeholder = format!("{{{name}}}");
            let Some(index) = segments.iter().position(|s| *s == placeholder) else {
                // Declared parameter without a placeholder is a
                // configuration inconsistency, not a fatal error.
                warn!(
                    parameter = %name,
                    "Declared path parameter has no {{name}} placeholder in urlPathTemplate"
                );
                return None;
            };
            if !rule.is_match(actual[index]) {
                return None;
            }
        }

        let mut captures = HashMap::new();
        for (index, segment) in segments.iter().enumerate() {
            if let Some(name) = placeholder_name(segment) {
                captures.insert(name.to_string(), actual[index].to_string());
            }
        }
        Some(captures)
    }

    /// Every declared query parameter must pass; undeclared actual
    /// parameters are ignored.
    fn resolve_query(&self, query: &HashMap<String, Vec<String>>) -> bool {
        self.query.iter().all(|(name, rule)| {
            let actual = query
                .get(name)
                .and_then(|values| values.first())
                .map(String::as_str)
                .unwrap_or("");
            rule.is_match(actual)
        })
    }
}

fn placeholder_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

/// Trim trailing slashes; an all-slash path normalizes back to `/`.
fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && !path.is_empty() {
        "/"
    } else {
        trimmed
    }
}
