//! HTTP surface for fidx.
//!
//! Serves `GET /api/manage/list`, whose `action` parameter selects a listing
//! (the default) or one of the index maintenance and reporting actions.
//! Maintenance actions are acknowledged with `202 Accepted` and run on a
//! background worker; their outcome shows up in `info` and
//! `index-storage-stats`.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::{ServerConfig, DEFAULT_SENSITIVE_KEYS};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use server::{open_store, FidxServer};
