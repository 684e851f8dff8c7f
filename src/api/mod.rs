//! HTTP control API for the auto-sell engine
//!
//! Start/stop/status endpoints plus the inbound trade webhook.

pub mod routes;
pub mod server;

pub use server::{create_app, AppState};
