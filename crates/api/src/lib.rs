//! HTTP API: server, routing, identity, and request/response mapping.

pub mod app;
pub mod context;
pub mod identity;
pub mod middleware;
