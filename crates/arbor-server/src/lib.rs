//! Request handling for arbor.
//!
//! Ties a project's archives, branches and namespace together behind one
//! [`Dispatcher`]: permission checks, path resolution per branch, keyword
//! contraction on check-in and expansion on retrieval, and transactional
//! namespace changes. There is no network transport here; a front end
//! hands [`Request`]s to the dispatcher and relays the [`Response`]s.
//!
//! # Key Types
//!
//! - [`Dispatcher`] -- handles one request at a time, safe to share across threads
//! - [`Project`] -- archives, branch registry and namespace of one project
//! - [`ServerConfig`] -- TOML configuration
//! - [`PermissionCheck`] -- allow/deny decision before every request

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod project;
pub mod request;
pub mod telemetry;

pub use auth::{Action, AllowAll, DenyAll, Identity, PermissionCheck, RoleBased};
pub use config::{LogConfig, ServerConfig, StorageBackend};
pub use dispatcher::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use project::Project;
pub use request::{MetadataChange, Request, Response};
pub use telemetry::init_tracing;
