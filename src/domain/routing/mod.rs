//! Routing bounded context
//!
//! Value types exchanged between the proxy engine and the routing hook of
//! the active extension unit.

pub mod cookies;
pub mod decision;
pub mod headers;
pub mod request;

pub use cookies::SessionCookies;
pub use decision::{ForkTargets, Rejection, RouteDecision, RouteReply};
pub use headers::SipHeaders;
pub use request::{RouteRequest, TransportType};
