//! Routing decision returned by extension logic

use super::headers::SipHeaders;
use crate::domain::shared::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Non-empty ordered list of destination URIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForkTargets(Vec<String>);

impl ForkTargets {
    pub fn new<I, S>(targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            return Err(DomainError::EmptyForkList);
        }
        Ok(Self(targets))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for ForkTargets {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let targets = Vec::<String>::deserialize(deserializer)?;
        ForkTargets::new(targets).map_err(serde::de::Error::custom)
    }
}

/// Final response status and reason for a rejected request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    code: u16,
    reason: String,
}

impl Rejection {
    pub fn new(code: u16, reason: impl Into<String>) -> Result<Self> {
        if !(300..=699).contains(&code) {
            return Err(DomainError::InvalidStatusCode(code));
        }
        Ok(Self {
            code,
            reason: reason.into(),
        })
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub(crate) fn internal_error() -> Self {
        Self {
            code: 500,
            reason: "internal error".to_string(),
        }
    }

    pub(crate) fn timeout() -> Self {
        Self {
            code: 504,
            reason: "Extension Timeout".to_string(),
        }
    }
}

/// Either fork to the targets in order, or answer the request directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RouteDecision {
    Fork(ForkTargets),
    Reject(Rejection),
}

impl RouteDecision {
    pub fn fork<I, S>(targets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(RouteDecision::Fork(ForkTargets::new(targets)?))
    }

    pub fn reject(code: u16, reason: impl Into<String>) -> Result<Self> {
        Ok(RouteDecision::Reject(Rejection::new(code, reason)?))
    }

    pub fn is_fork(&self) -> bool {
        matches!(self, RouteDecision::Fork(_))
    }
}

/// What the routing hook hands back to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReply {
    pub decision: RouteDecision,
    /// Merged into the outbound request of every fork target
    pub new_headers: SipHeaders,
}

impl RouteReply {
    pub fn new(decision: RouteDecision) -> Self {
        Self {
            decision,
            new_headers: SipHeaders::new(),
        }
    }

    pub fn with_headers(decision: RouteDecision, new_headers: SipHeaders) -> Self {
        Self {
            decision,
            new_headers,
        }
    }

    pub(crate) fn internal_error() -> Self {
        Self::new(RouteDecision::Reject(Rejection::internal_error()))
    }

    pub(crate) fn timeout() -> Self {
        Self::new(RouteDecision::Reject(Rejection::timeout()))
    }
}
