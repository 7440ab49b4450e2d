//! Rule-driven router
//!
//! ```toml
//! [[extensions.units]]
//! name = "router"
//! kind = "static_route"
//!
//! [[extensions.units.settings.rules]]
//! method = "MESSAGE"
//! action = { reject = { code = 500, reason = "No MESSAGE for me" } }
//!
//! [[extensions.units.settings.rules]]
//! uri_prefix = "sip:bob@"
//! action = { fork = { targets = ["sip:bob@example.org", "sip:alice@example.org"] } }
//! ```

use crate::config::UnitConfig;
use crate::domain::extension::{Capability, CapabilitySet, ExtensionUnit};
use crate::domain::routing::{RouteDecision, RouteReply, RouteRequest, SipHeaders};
use crate::domain::shared::DomainError;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// What a matching rule does
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Fork {
        targets: Vec<String>,
        #[serde(default)]
        set_headers: BTreeMap<String, String>,
    },
    Reject {
        code: u16,
        reason: String,
    },
}

impl RuleAction {
    fn decision(&self) -> Result<(RouteDecision, SipHeaders), DomainError> {
        match self {
            RuleAction::Fork {
                targets,
                set_headers,
            } => {
                let mut headers = SipHeaders::new();
                for (name, value) in set_headers {
                    headers.set(name.as_str(), value.as_str());
                }
                Ok((RouteDecision::fork(targets.iter().map(String::as_str))?, headers))
            }
            RuleAction::Reject { code, reason } => {
                Ok((RouteDecision::reject(*code, reason.as_str())?, SipHeaders::new()))
            }
        }
    }
}

/// Matches when every given field matches
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRule {
    pub method: Option<String>,
    pub uri_prefix: Option<String>,
    pub action: RuleAction,
}

impl RouteRule {
    fn matches(&self, request: &RouteRequest) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .map_or(true, |method| request.method.eq_ignore_ascii_case(method));
        let uri_ok = self
            .uri_prefix
            .as_deref()
            .map_or(true, |prefix| request.request_uri.starts_with(prefix));
        method_ok && uri_ok
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticRouteSettings {
    pub rules: Vec<RouteRule>,
    /// Used when no rule matches; `Reject(404)` otherwise
    pub default: Option<RuleAction>,
    /// Cookie name -> header carrying its value on every fork
    pub cookie_headers: BTreeMap<String, String>,
}

/// Routes by the first matching rule
pub struct StaticRoute {
    name: String,
    settings: StaticRouteSettings,
}

impl StaticRoute {
    pub fn new(name: impl Into<String>, settings: StaticRouteSettings) -> Self {
        Self {
            name: name.into(),
            settings,
        }
    }

    pub fn from_config(config: &UnitConfig) -> anyhow::Result<Self> {
        let settings = if config.settings.is_null() {
            StaticRouteSettings::default()
        } else {
            serde_json::from_value(config.settings.clone())
                .context("invalid static_route settings")?
        };
        Ok(Self::new(config.name.clone(), settings))
    }

    fn cookie_headers(&self, request: &RouteRequest) -> SipHeaders {
        let mut headers = SipHeaders::new();
        for (cookie, header) in &self.settings.cookie_headers {
            let value = request
                .cookies
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(cookie))
                .map(|(_, value)| value);
            if let Some(value) = value {
                headers.set(header.as_str(), value);
            }
        }
        headers
    }
}

#[async_trait]
impl ExtensionUnit for StaticRoute {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty()
            .with(Capability::OnLoad)
            .with(Capability::ProvideRoute)
    }

    async fn on_load(&self) -> anyhow::Result<()> {
        for (index, rule) in self.settings.rules.iter().enumerate() {
            rule.action
                .decision()
                .with_context(|| format!("rule {} of {}", index + 1, self.name))?;
        }
        if let Some(default) = &self.settings.default {
            default
                .decision()
                .with_context(|| format!("default action of {}", self.name))?;
        }
        debug!("{}: {} routing rule(s)", self.name, self.settings.rules.len());
        Ok(())
    }

    async fn provide_route(&self, request: &RouteRequest) -> anyhow::Result<RouteReply> {
        let action = self
            .settings
            .rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| &rule.action)
            .or(self.settings.default.as_ref());

        let Some(action) = action else {
            return Ok(RouteReply::new(RouteDecision::reject(404, "Not Found")?));
        };

        let (decision, mut headers) = action.decision()?;
        if decision.is_fork() {
            headers.merge(&self.cookie_headers(request));
        }
        Ok(RouteReply::with_headers(decision, headers))
    }
}
