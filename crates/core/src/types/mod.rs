//! Core types for Weather Smart.
//!
//! This module provides type-safe wrappers for identity concepts.

pub mod email;
pub mod id;
pub mod session;

pub use email::{Email, EmailError};
pub use id::UserId;
pub use session::{Session, SessionEvent, SessionEventKind, SessionUser};
