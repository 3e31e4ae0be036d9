//! Line-delimited JSON protocol spoken over stdin/stdout.
//!
//! Every request is `{"id", "method", "params"}` and gets exactly one reply, either
//! `{"id", "ok": true, "result"}` or `{"id", "ok": false, "error": {"code", "message", "details"?}}`.
//! Handlers that touch the store run through `helpers::with_db`, which answers `no_workspace`
//! until `workspace.select` has succeeded.

mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use router::handle_request;
pub use types::{AppState, Request};
