//! Input view of one out-of-dialog request awaiting a routing decision

use super::cookies::SessionCookies;
use super::headers::SipHeaders;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport the request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportType {
    Udp,
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Udp => "UDP",
            TransportType::Tcp => "TCP",
            TransportType::Tls => "TLS",
            TransportType::Ws => "WS",
            TransportType::Wss => "WSS",
        }
    }

    /// Whether the transport is a WebSocket, the only kind carrying session cookies
    pub fn is_websocket(&self) -> bool {
        matches!(self, TransportType::Ws | TransportType::Wss)
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" => Ok(TransportType::Udp),
            "TCP" => Ok(TransportType::Tcp),
            "TLS" => Ok(TransportType::Tls),
            "WS" => Ok(TransportType::Ws),
            "WSS" => Ok(TransportType::Wss),
            other => Err(format!("Unknown transport type: {}", other)),
        }
    }
}

/// Everything the routing hook may look at.
///
/// The engine guarantees `From` and `To` are present in `headers` and that
/// `method` is an uppercase method token.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: String,
    pub request_uri: String,
    pub headers: SipHeaders,
    pub transport: TransportType,
    pub body: Bytes,
    pub cookies: SessionCookies,
}

impl RouteRequest {
    pub fn from_header(&self) -> &str {
        self.headers.get("From").unwrap_or_default()
    }

    pub fn to_header(&self) -> &str {
        self.headers.get("To").unwrap_or_default()
    }

    pub fn is_method(&self, method: &str) -> bool {
        self.method == method
    }
}
