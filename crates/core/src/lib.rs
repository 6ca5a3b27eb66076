//! Weather Smart Core - Shared identity types.
//!
//! This crate provides the types passed between the Weather Smart components:
//! - `identity` - Session lifecycle and the Credential Store abstraction
//! - `web` - Consumer pages and the auth API
//! - `cli` - Account commands
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no clocks
//! beyond `chrono::Utc::now()` for expiry checks. This keeps it usable from
//! every crate and from tests.
//!
//! # Modules
//!
//! - [`types`] - Email addresses, user IDs, sessions and session-change events

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
