//! HTTP surface and process lifecycle.
//!
//! The server owns an explicit router; routes bind on construction and all
//! shared facilities (audit log, throttle, storage, the platform client)
//! are built once in [`server::run`] and injected through [`state::AppState`].

pub mod auth;
pub mod error;
pub mod group_routes;
pub mod message_routes;
pub mod pair_routes;
pub mod send_routes;
pub mod server;
pub mod state;
pub mod supervisor;
pub mod throttle;
pub mod webhook_routes;
