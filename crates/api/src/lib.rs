//! HTTP API: configuration, route registration, guard, handlers.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
pub mod registry;
