//! `contentgate-core`: authorization primitives shared by every crate.
//!
//! This crate contains **pure** types (no IO, no HTTP, no storage).

pub mod action;
pub mod error;
pub mod names;

pub use action::{Action, ActionFlags};
pub use error::{GateError, GateResult};
pub use names::{CallerId, Resource, Role};
