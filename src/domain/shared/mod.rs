//! Shared kernel - Common types used by routing, conferencing and the extension boundary

pub mod error;
pub mod result;
pub mod value_objects;

pub use error::DomainError;
pub use result::Result;
pub use value_objects::*;
