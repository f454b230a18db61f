pub mod auth;
pub mod config;
pub mod error;
pub mod module;
pub mod types;

pub use auth::{AllowAll, Authenticator, DenyAll, Principal};
pub use config::ServiceConfig;
pub use error::{FieldIssue, ServiceError};
pub use module::Module;
pub use types::{ListParams, ListResult, new_id, ok, to_db_timestamp};
