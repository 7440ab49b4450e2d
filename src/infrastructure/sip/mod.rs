//! SIP side of the extension boundary
//!
//! Transport parsing and transactions live outside this crate; this module
//! adapts parsed `rsip` requests to the routing hook and turns its decision
//! back into SIP messages.

pub mod builder;
pub mod message;
pub mod proxy;

pub use builder::ResponseBuilder;
pub use message::{SipError, SipRequest, SipResponse};
pub use proxy::{ForkAttempt, ForkSink, ProxyEngine, ProxyOutcome};
