//! Domain layer - Routing, conferencing and the extension contract
//!
//! This layer contains:
//! - Value objects exchanged with extension logic (headers, cookies, decisions)
//! - The conference controller and participant state machine
//! - The extension registry and its fault boundary

pub mod conference;
pub mod extension;
pub mod routing;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
