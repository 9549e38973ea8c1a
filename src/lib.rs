//! api-stub-server
//!
//! A declarative HTTP stub server: endpoint definitions pair a request
//! matcher with a canned response, incoming requests are checked against
//! the ordered endpoint list, and the first match produces a response
//! rendered from values captured out of the request. Useful for test
//! harnesses and client development against an API that does not exist
//! yet.
//!
//! # Features
//!
//! - **URL matching**: exact URL, URL regex, exact path, path regex, or
//!   path template with named placeholders (`/users/{id}`)
//! - **Matcher rules**: `equalTo`, `matches`, `doesNotMatch`, `contains`,
//!   `doesNotContain` over path parameters, query parameters, and body
//! - **Templated responses**: bodies (inline or from file) render
//!   `{{Path.<name>}}` and `{{Query.<name>}}` lookups; the Go-template
//!   spelling `{{.Path.<name>}}` is accepted too
//! - **Atomic reload**: SIGHUP swaps in a freshly compiled endpoint
//!   snapshot without disturbing in-flight requests
//!
//! # Example configuration
//!
//! ```json
//! [
//!   {
//!     "request": {
//!       "urlPathTemplate": "/users/{id}",
//!       "method": "GET",
//!       "pathParameters": { "id": { "matches": "[0-9]+" } }
//!     },
//!     "response": {
//!       "status": 200,
//!       "headers": { "Content-Type": "application/json" },
//!       "body": "{\"id\": \"{{.Path.id}}\"}"
//!     }
//!   }
//! ]
//! ```

pub mod config;
pub mod matcher;
pub mod server;
pub mod template;

pub use config::{ConfigError, Endpoint, MatcherRule, RequestSpec, ResponseSpec};
pub use matcher::{MatchContext, MatchResult, Selector};
pub use server::{AppState, Snapshot};
pub use template::{RenderError, RenderedResponse, TemplateEngine};
