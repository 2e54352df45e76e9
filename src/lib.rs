//! dirmock - a directory-driven mock server
//!
//! Resolves HTTP requests to canned JSON responses by mapping the request
//! path onto a tree of rule files, with scoped error scenarios and failure
//! simulation.
//!
//! # Features
//!
//! - **Directory Rules**: `users/GET.json` answers `GET /users`
//! - **Path Parameters**: `users/{id}/GET.json` answers `GET /users/42`
//! - **Error Scenarios**: `users/errors/POST_existing_email.json` fires on matching requests
//! - **Directives**: `_status`, `_headers`, `_echo`/`_merge`, `_conditions`
//! - **Failure Injection**: one-shot forced errors and a random error rate
//! - **Latency Simulation**: fixed delay on every response
//! - **Hot Reload**: rule files are re-read on every request
//!
//! # Example Layout
//!
//! ```text
//! mocks/
//!   users/
//!     GET.json
//!     POST.json                 {"_status": 201, "_echo": true, "id": 3}
//!     {id}/GET.json
//!     {id}/errors/GET_unauthorized.json
//!   _errors/
//!     404.json                  {"error": "No mock for {method} {path}"}
//! ```

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod request;
pub mod response;
pub mod scaffold;
pub mod scenario;
pub mod server;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::MockServerConfig;
pub use engine::{ForcedError, MockEngine, RequestHandler};
pub use error::MockError;
pub use request::MockRequest;
pub use response::ResolvedResponse;
pub use store::{FsRuleStore, RuleProvider};
