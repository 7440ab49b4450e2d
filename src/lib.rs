//! sipext - Extension boundary for a SIP proxy and conferencing server
//!
//! The signaling engine delegates two real-time decisions to pluggable
//! extension units: where to route an out-of-dialog request, and how to
//! admit and follow conference participants. Faults inside a unit are
//! contained at the boundary and never reach the engine.

pub mod config;
pub mod domain;
pub mod extensions;
pub mod infrastructure;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
