//! Response rendering.
//!
//! Resolves an endpoint's body source (inline string or referenced file)
//! and executes it as a Handlebars template against the values captured
//! from the request.

use crate::config::{non_empty, ResponseSpec};
use crate::matcher::MatchContext;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::HashMap;

/// Errors raised while rendering a matched endpoint's response. All of
/// these surface to the caller as a server error for that one request.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The response spec has neither `body` nor `bodyFileName`.
    #[error("response has neither body nor bodyFileName")]
    EmptyBody,

    #[error("failed to read body file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse response template: {source}")]
    TemplateParse {
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("failed to execute response template: {source}")]
    TemplateExec {
        #[source]
        source: Box<handlebars::RenderError>,
    },
}

/// A fully rendered response, ready for the HTTP layer to write.
#[derive(Debug)]
pub struct RenderedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// The closed set of lookup paths exposed to templates: `Path.<name>` and
/// `Query.<name>`. The request itself is never handed to the template.
#[derive(Serialize)]
struct RenderContext<'a> {
    #[serde(rename = "Path")]
    path: &'a HashMap<String, String>,
    #[serde(rename = "Query")]
    query: &'a HashMap<String, String>,
}

/// Renders response body templates against a [`MatchContext`].
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_helper("default", Box::new(default_helper));

        // Bodies are arbitrary payloads, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a matched endpoint's response.
    ///
    /// The body source is re-read and re-executed per request so that
    /// captured values always come from the request at hand; status and
    /// headers are copied verbatim from the spec.
    pub fn render(
        &self,
        response: &ResponseSpec,
        context: &MatchContext,
    ) -> Result<RenderedResponse, RenderError> {
        let source = self.body_source(response)?;
        let body = self.render_source(&source, context)?;

        Ok(RenderedResponse {
            status: response.status,
            headers: response.headers.clone(),
            body: body.into_bytes(),
        })
    }

    /// Resolve the template source: the referenced file wins over the
    /// inline body when both are set.
    fn body_source(&self, response: &ResponseSpec) -> Result<String, RenderError> {
        if let Some(path) = non_empty(&response.body_file_name) {
            return std::fs::read_to_string(path).map_err(|source| RenderError::FileRead {
                path: path.to_string(),
                source,
            });
        }
        if let Some(body) = non_empty(&response.body) {
            return Ok(body.to_string());
        }
        Err(RenderError::EmptyBody)
    }

    fn render_source(&self, source: &str, context: &MatchContext) -> Result<String, RenderError> {
        let source = normalize_source(source);

        // Compile first so malformed templates are reported as parse
        // failures rather than execution failures.
        handlebars::template::Template::compile(&source).map_err(|source| {
            RenderError::TemplateParse {
                source: Box::new(source),
            }
        })?;

        let ctx = RenderContext {
            path: &context.path_params,
            query: &context.query_params,
        };
        self.handlebars
            .render_template(&source, &ctx)
            .map_err(|source| RenderError::TemplateExec {
                source: Box::new(source),
            })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept the Go-template spelling of context lookups (`{{.Path.x}}`,
/// `{{.Query.x}}`) by dropping the leading dot, so stub files written for
/// the original engine render unchanged.
fn normalize_source(source: &str) -> String {
    source.replace("{{.", "{{")
}

/// `{{default value "fallback"}}` - emit the value unless it is missing or
/// empty, then emit the fallback.
fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let fallback = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    if let Some(v) = value {
        if let Some(s) = v.as_str() {
            if !s.is_empty() {
                out.write(s)?;
                return Ok(());
            }
        } else if !v.is_null() {
            out.write(&v.to_string())?;
            return Ok(());
        }
    }

    out.write(fallback)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn context(path: &[(&str, &str)], query: &[(&str, &str)]) -> MatchContext {
        MatchContext {
            path_params: path
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            query_params: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn inline(body: &str) -> ResponseSpec {
        ResponseSpec {
            body: Some(body.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn renders_path_and_query_lookups() {
        let engine = TemplateEngine::new();
        let ctx = context(&[("id", "123")], &[("page", "1")]);

        let rendered = engine
            .render(&inline("user {{Path.id}} page {{Query.page}}"), &ctx)
            .unwrap();
        assert_eq!(rendered.body, b"user 123 page 1");
    }

    #[test]
    fn accepts_go_template_spelling() {
        let engine = TemplateEngine::new();
        let ctx = context(&[], &[("id", "42")]);

        let rendered = engine
            .render(&inline(r#"{"q":"{{.Query.id}}"}"#), &ctx)
            .unwrap();
        assert_eq!(rendered.body, br#"{"q":"42"}"#);
    }

    #[test]
    fn body_file_renders_against_query() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"q":"{{.Query.id}}"}"#).unwrap();

        let response = ResponseSpec {
            body_file_name: Some(file.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let engine = TemplateEngine::new();
        let rendered = engine
            .render(&response, &context(&[], &[("id", "42")]))
            .unwrap();
        assert_eq!(rendered.body, br#"{"q":"42"}"#);
    }

    #[test]
    fn body_file_takes_precedence_over_inline_body() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"from file").unwrap();

        let response = ResponseSpec {
            body: Some("inline".to_string()),
            body_file_name: Some(file.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let engine = TemplateEngine::new();
        let rendered = engine.render(&response, &MatchContext::default()).unwrap();
        assert_eq!(rendered.body, b"from file");
    }

    #[test]
    fn missing_body_is_an_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render(&ResponseSpec::default(), &MatchContext::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::EmptyBody));
    }

    #[test]
    fn unreadable_body_file_is_an_error() {
        let response = ResponseSpec {
            body_file_name: Some("/nonexistent/body.json".to_string()),
            ..Default::default()
        };
        let engine = TemplateEngine::new();
        let err = engine
            .render(&response, &MatchContext::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::FileRead { .. }));
    }

    #[test]
    fn malformed_template_is_a_parse_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render(&inline("{{#if Path.id}}unclosed"), &MatchContext::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::TemplateParse { .. }));
    }

    #[test]
    fn unknown_lookup_renders_empty() {
        let engine = TemplateEngine::new();
        let rendered = engine
            .render(&inline("[{{Path.missing}}]"), &MatchContext::default())
            .unwrap();
        assert_eq!(rendered.body, b"[]");
    }

    #[test]
    fn default_helper_falls_back() {
        let engine = TemplateEngine::new();
        let ctx = context(&[], &[("page", "7")]);

        let rendered = engine
            .render(&inline(r#"{{default Query.page "1"}}/{{default Query.size "20"}}"#), &ctx)
            .unwrap();
        assert_eq!(rendered.body, b"7/20");
    }

    #[test]
    fn status_and_headers_copied_verbatim() {
        let response = ResponseSpec {
            status: 418,
            body: Some("tea".to_string()),
            headers: HashMap::from([("X-Stub".to_string(), "yes".to_string())]),
            ..Default::default()
        };
        let engine = TemplateEngine::new();
        let rendered = engine.render(&response, &MatchContext::default()).unwrap();
        assert_eq!(rendered.status, 418);
        assert_eq!(rendered.headers["X-Stub"], "yes");
    }
}
