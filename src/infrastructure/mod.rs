//! Infrastructure layer - Engine-side adapters
//!
//! This layer contains:
//! - SIP request routing through the extension registry
//! - Conference admission and in-call event delivery

pub mod conference;
pub mod sip;
