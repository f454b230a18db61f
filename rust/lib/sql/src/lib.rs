//! Embedded SQL storage for service modules.
//!
//! Modules talk to [`SQLStore`]; the server binary decides which backend
//! to hand them. [`SqliteStore`] is the only backend today.

pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::SQLError;
pub use sqlite::SqliteStore;
pub use traits::{Row, SQLStore, Value};
