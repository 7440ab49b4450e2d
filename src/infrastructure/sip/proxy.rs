//! Proxy Engine
//!
//! Engine side of delegated routing: materializes the request for the
//! routing hook, then turns the decision into ordered fork attempts or a
//! final response.

use super::builder::ResponseBuilder;
use super::message::{SipError, SipRequest, SipResponse};
use crate::domain::extension::ExtensionRegistry;
use crate::domain::routing::{
    ForkTargets, RouteDecision, RouteRequest, SessionCookies, SipHeaders, TransportType,
};
use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info};

/// One outbound copy of the request, in fork order
#[derive(Debug, Clone)]
pub struct ForkAttempt {
    pub target: String,
    pub request: SipRequest,
}

/// What the engine does with a request after consulting the extension
#[derive(Debug, Clone)]
pub enum ProxyOutcome {
    /// Try these in order
    Fork(Vec<ForkAttempt>),
    /// Answer the request directly; nothing is forked
    Respond { response: SipResponse, reason: String },
    /// No unit routes requests; the engine's own routing applies
    Unhandled,
}

impl ProxyOutcome {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProxyOutcome::Respond { response, .. } => Some(response.status_code()),
            _ => None,
        }
    }
}

/// Where fork attempts and direct responses go
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForkSink: Send + Sync {
    async fn attempt(&self, attempt: &ForkAttempt) -> Result<(), SipError>;

    async fn respond(&self, response: &SipResponse) -> Result<(), SipError>;
}

/// Proxy engine
pub struct ProxyEngine {
    registry: Arc<ExtensionRegistry>,
}

impl ProxyEngine {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self { registry }
    }

    /// Decide what to do with an out-of-dialog request
    pub async fn route_request(
        &self,
        request: &SipRequest,
        transport: TransportType,
        cookies: SessionCookies,
    ) -> Result<ProxyOutcome, SipError> {
        let headers = request.sip_headers();
        if !headers.contains("From") || !headers.contains("To") {
            return Err(SipError::InvalidMessage(
                "request lacks From or To header".to_string(),
            ));
        }

        let route_request = RouteRequest {
            method: request.method(),
            request_uri: request.uri().to_string(),
            headers,
            transport,
            body: Bytes::copy_from_slice(request.body()),
            cookies,
        };
        debug!(
            "Routing {} {} via {}",
            route_request.method, route_request.request_uri, transport
        );

        let Some(reply) = self.registry.provide_route(route_request).await else {
            counter!("sipext_route_decisions_total", "outcome" => "unhandled").increment(1);
            return Ok(ProxyOutcome::Unhandled);
        };

        match reply.decision {
            RouteDecision::Fork(targets) => {
                match Self::fork_attempts(request, &targets, &reply.new_headers) {
                    Ok(attempts) => {
                        counter!("sipext_route_decisions_total", "outcome" => "fork").increment(1);
                        info!("Forking {} to {} target(s)", request.method(), attempts.len());
                        Ok(ProxyOutcome::Fork(attempts))
                    }
                    Err(err) => {
                        error!("Unusable fork target from extension: {}", err);
                        Self::respond(request, 500, "internal error")
                    }
                }
            }
            RouteDecision::Reject(rejection) => {
                Self::respond(request, rejection.code(), rejection.reason())
            }
        }
    }

    /// Route a request and hand the result to `sink`: fork attempts strictly in order
    pub async fn handle_request(
        &self,
        request: &SipRequest,
        transport: TransportType,
        cookies: SessionCookies,
        sink: &dyn ForkSink,
    ) -> Result<ProxyOutcome, SipError> {
        let outcome = self.route_request(request, transport, cookies).await?;
        match &outcome {
            ProxyOutcome::Fork(attempts) => {
                for attempt in attempts {
                    sink.attempt(attempt).await?;
                }
            }
            ProxyOutcome::Respond { response, .. } => sink.respond(response).await?,
            ProxyOutcome::Unhandled => {}
        }
        Ok(outcome)
    }

    fn fork_attempts(
        request: &SipRequest,
        targets: &ForkTargets,
        new_headers: &SipHeaders,
    ) -> Result<Vec<ForkAttempt>, SipError> {
        targets
            .iter()
            .map(|target| {
                let mut outbound = request.retarget(target)?;
                outbound.apply_header_rewrites(new_headers);
                Ok(ForkAttempt {
                    target: target.to_string(),
                    request: outbound,
                })
            })
            .collect()
    }

    fn respond(request: &SipRequest, code: u16, reason: &str) -> Result<ProxyOutcome, SipError> {
        counter!("sipext_route_decisions_total", "outcome" => "reject").increment(1);
        info!("Rejecting {} with {} {}", request.method(), code, reason);
        let response = ResponseBuilder::new(code)
            .reason(reason)
            .build_for_request(request)?;
        Ok(ProxyOutcome::Respond {
            response,
            reason: reason.to_string(),
        })
    }
}
