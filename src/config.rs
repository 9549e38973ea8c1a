//! Endpoint configuration.
//!
//! Defines the JSON data model for endpoint definitions (request matcher +
//! canned response) and loads them from a file or a directory of files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Errors raised while loading or compiling endpoint configuration.
///
/// All of these surface at load time; a running server never sees them
/// per request.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A `matches`/`doesNotMatch` field holds invalid regex source.
    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid status code {status} in endpoint {index}")]
    Status { index: usize, status: u16 },
}

/// A single endpoint definition: one request matcher paired with one
/// response. Endpoints are held in an ordered list; the first endpoint
/// whose request spec matches wins.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    pub request: RequestSpec,
    pub response: ResponseSpec,
}

/// Declared shape of requests an endpoint accepts.
///
/// Exactly one of the five URL fields is expected to be set. When more than
/// one is present the first non-empty field in declaration order wins:
/// `url`, `urlPattern`, `urlPath`, `urlPathPattern`, `urlPathTemplate`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RequestSpec {
    /// Exact match against the raw request target, query string included.
    pub url: Option<String>,
    /// Regex search against the raw request target.
    pub url_pattern: Option<String>,
    /// Exact match against the decoded path.
    pub url_path: Option<String>,
    /// Regex search against the decoded path.
    pub url_path_pattern: Option<String>,
    /// Segment template with named placeholders, e.g. `/users/{id}`.
    /// The only form that captures path parameters.
    pub url_path_template: Option<String>,

    /// HTTP method, compared by exact string equality.
    pub method: String,

    /// Matcher rules keyed by query parameter name. The first value bound
    /// to the name in the actual query string is tested; an absent key is
    /// tested as the empty string.
    pub query_parameters: HashMap<String, MatcherRule>,

    /// Matcher rules keyed by `urlPathTemplate` placeholder name.
    pub path_parameters: HashMap<String, MatcherRule>,

    /// Matcher rule applied to the whole request body.
    pub body: Option<MatcherRule>,
}

/// Composite predicate over a single string value.
///
/// Every present, non-empty field must pass (logical AND). An empty-string
/// field counts as "not specified", and a rule with no fields at all is
/// trivially true.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MatcherRule {
    /// Exact string equality, no case folding.
    pub equal_to: Option<String>,
    /// Unanchored regex search.
    pub matches: Option<String>,
    /// Negated unanchored regex search.
    pub does_not_match: Option<String>,
    /// Literal substring containment.
    pub contains: Option<String>,
    /// Negated substring containment.
    pub does_not_contain: Option<String>,
}

impl MatcherRule {
    /// Whether any check is specified at all.
    pub fn is_empty(&self) -> bool {
        [
            &self.equal_to,
            &self.matches,
            &self.does_not_match,
            &self.contains,
            &self.does_not_contain,
        ]
        .into_iter()
        .all(|f| non_empty(f).is_none())
    }
}

/// Treats both absent and empty-string fields as unset.
pub(crate) fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Canned response for a matched endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ResponseSpec {
    /// HTTP status code, copied verbatim onto the response.
    pub status: u16,

    /// Inline response body template.
    pub body: Option<String>,

    /// Path to a file holding the body template. Takes precedence over
    /// `body` when both are set.
    pub body_file_name: Option<String>,

    /// Static response headers, copied verbatim.
    pub headers: HashMap<String, String>,

    /// Reserved for future response transformers; currently unused.
    pub transformers: Vec<String>,
}

impl Default for ResponseSpec {
    fn default() -> Self {
        Self {
            status: 200,
            body: None,
            body_file_name: None,
            headers: HashMap::new(),
            transformers: Vec::new(),
        }
    }
}

/// Load endpoint definitions from a JSON file, or from every `.json` file
/// in a directory.
///
/// A directory is traversed in sorted filename order and each file's
/// endpoints are appended exactly once, so list order (and therefore
/// matching precedence) is stable across loads.
pub fn load(path: &Path) -> Result<Vec<Endpoint>, ConfigError> {
    if path.is_dir() {
        load_dir(path)
    } else {
        load_file(path)
    }
}

fn load_file(path: &Path) -> Result<Vec<Endpoint>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_dir(dir: &Path) -> Result<Vec<Endpoint>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut endpoints = Vec::new();
    for file in files {
        let mut loaded = load_file(&file)?;
        tracing::debug!(path = %file.display(), count = loaded.len(), "Loaded endpoint file");
        endpoints.append(&mut loaded);
    }
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_simple_endpoint() {
        let json = r#"
        [
            {
                "request": {
                    "urlPath": "/hello",
                    "method": "GET"
                },
                "response": {
                    "status": 200,
                    "body": "Hello, World!"
                }
            }
        ]
        "#;
        let endpoints: Vec<Endpoint> = serde_json::from_str(json).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].request.url_path.as_deref(), Some("/hello"));
        assert_eq!(endpoints[0].request.method, "GET");
        assert_eq!(endpoints[0].response.status, 200);
    }

    #[test]
    fn parses_matcher_rules_and_template() {
        let json = r#"
        [
            {
                "request": {
                    "urlPathTemplate": "/users/{id}",
                    "method": "GET",
                    "pathParameters": {
                        "id": { "matches": "[0-9]+" }
                    },
                    "queryParameters": {
                        "page": { "equalTo": "1" }
                    },
                    "body": { "contains": "name" }
                },
                "response": {
                    "status": 201,
                    "headers": { "Content-Type": "application/json" },
                    "body": "{\"id\":\"{{.Path.id}}\"}"
                }
            }
        ]
        "#;
        let endpoints: Vec<Endpoint> = serde_json::from_str(json).unwrap();
        let request = &endpoints[0].request;
        assert_eq!(
            request.path_parameters["id"].matches.as_deref(),
            Some("[0-9]+")
        );
        assert_eq!(
            request.query_parameters["page"].equal_to.as_deref(),
            Some("1")
        );
        assert_eq!(request.body.as_ref().unwrap().contains.as_deref(), Some("name"));
    }

    #[test]
    fn response_defaults() {
        let json = r#"[{ "request": { "method": "GET" }, "response": {} }]"#;
        let endpoints: Vec<Endpoint> = serde_json::from_str(json).unwrap();
        let response = &endpoints[0].response;
        assert_eq!(response.status, 200);
        assert!(response.body.is_none());
        assert!(response.body_file_name.is_none());
        assert!(response.headers.is_empty());
        assert!(response.transformers.is_empty());
    }

    #[test]
    fn rejects_unknown_fields() {
        let json = r#"[{ "request": { "urlGlob": "/x/*" }, "response": {} }]"#;
        assert!(serde_json::from_str::<Vec<Endpoint>>(json).is_err());
    }

    #[test]
    fn empty_rule_is_empty() {
        assert!(MatcherRule::default().is_empty());
        let blank = MatcherRule {
            equal_to: Some(String::new()),
            ..Default::default()
        };
        assert!(blank.is_empty());
        let rule = MatcherRule {
            contains: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!rule.is_empty());
    }

    #[test]
    fn loads_directory_in_sorted_order_without_duplication() {
        let dir = tempfile::tempdir().unwrap();

        let mut b = std::fs::File::create(dir.path().join("b.json")).unwrap();
        b.write_all(
            br#"[{ "request": { "urlPath": "/second", "method": "GET" }, "response": {} }]"#,
        )
        .unwrap();

        let mut a = std::fs::File::create(dir.path().join("a.json")).unwrap();
        a.write_all(
            br#"[{ "request": { "urlPath": "/first", "method": "GET" }, "response": {} }]"#,
        )
        .unwrap();

        // Non-JSON files are ignored.
        std::fs::File::create(dir.path().join("notes.txt")).unwrap();

        let endpoints = load(dir.path()).unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].request.url_path.as_deref(), Some("/first"));
        assert_eq!(endpoints[1].request.url_path.as_deref(), Some("/second"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load(Path::new("/nonexistent/endpoints.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reports_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
