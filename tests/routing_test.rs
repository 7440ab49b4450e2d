//! Routing Integration Tests
//!
//! Drive SIP requests through `ProxyEngine` and an extension registry.

use async_trait::async_trait;
use sipext::config::Config;
use sipext::domain::extension::{Capability, CapabilitySet, ExtensionRegistry, ExtensionUnit};
use sipext::domain::routing::{
    RouteDecision, RouteReply, RouteRequest, SessionCookies, SipHeaders, TransportType,
};
use sipext::extensions::builtin_catalog;
use sipext::infrastructure::sip::{ProxyEngine, ProxyOutcome, SipRequest};
use std::sync::Arc;
use std::time::Duration;

const INVITE: &str = "INVITE sip:bob@example.org SIP/2.0\r\n\
Via: SIP/2.0/WSS client.invalid;branch=z9hG4bK-invite\r\n\
Max-Forwards: 70\r\n\
To: <sip:bob@example.org>\r\n\
From: Alice <sip:alice@example.org>;tag=88sja8x\r\n\
Call-ID: f81d4fae-7dec@client.invalid\r\n\
CSeq: 1 INVITE\r\n\
Content-Length: 0\r\n\r\n";

const MESSAGE: &str = "MESSAGE sip:bob@example.org SIP/2.0\r\n\
Via: SIP/2.0/WSS client.invalid;branch=z9hG4bK-message\r\n\
Max-Forwards: 70\r\n\
To: <sip:bob@example.org>\r\n\
From: Alice <sip:alice@example.org>;tag=49583\r\n\
Call-ID: 3848276298220188511@client.invalid\r\n\
CSeq: 1 MESSAGE\r\n\
Content-Type: text/plain\r\n\
Content-Length: 5\r\n\r\n\
hello";

enum Behaviour {
    Policy,
    Fail,
    Panic,
    Stall,
}

struct ScriptedRouter {
    behaviour: Behaviour,
}

#[async_trait]
impl ExtensionUnit for ScriptedRouter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty().with(Capability::ProvideRoute)
    }

    async fn provide_route(&self, request: &RouteRequest) -> anyhow::Result<RouteReply> {
        match self.behaviour {
            Behaviour::Policy => {
                if request.is_method("MESSAGE") {
                    return Ok(RouteReply::new(RouteDecision::reject(500, "No MESSAGE for me")?));
                }
                let mut headers = SipHeaders::new();
                headers.set("To", "sip:eve@example.org");
                if let Some(session) = request.cookies.get("WSSessionInfo") {
                    headers.set("X-WS-Session-Info", session);
                }
                Ok(RouteReply::with_headers(
                    RouteDecision::fork(["sip:bob@example.org", "sip:alice@example.org"])?,
                    headers,
                ))
            }
            Behaviour::Fail => anyhow::bail!("no route table"),
            Behaviour::Panic => panic!("router exploded"),
            Behaviour::Stall => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(RouteReply::new(RouteDecision::fork(["sip:late@example.org"])?))
            }
        }
    }
}

async fn engine(behaviour: Behaviour, timeout: Duration) -> ProxyEngine {
    let unit: Arc<dyn ExtensionUnit> = Arc::new(ScriptedRouter { behaviour });
    let registry = ExtensionRegistry::from_units(
        vec![unit],
        Some("scripted"),
        None,
        timeout,
    )
    .await;
    ProxyEngine::new(Arc::new(registry))
}

fn respond_parts(outcome: &ProxyOutcome) -> (u16, String) {
    match outcome {
        ProxyOutcome::Respond { response, reason } => (response.status_code(), reason.clone()),
        other => panic!("expected a direct response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_message_rejected_without_fork() {
    let engine = engine(Behaviour::Policy, Duration::from_secs(1)).await;
    let request = SipRequest::parse(MESSAGE.as_bytes()).unwrap();

    let outcome = engine
        .route_request(&request, TransportType::Wss, SessionCookies::empty())
        .await
        .unwrap();

    assert_eq!(respond_parts(&outcome), (500, "No MESSAGE for me".to_string()));
}

#[tokio::test]
async fn test_invite_forks_in_order_with_rewritten_to() {
    let engine = engine(Behaviour::Policy, Duration::from_secs(1)).await;
    let request = SipRequest::parse(INVITE.as_bytes()).unwrap();
    let cookies = SessionCookies::from_cookie_header("WSSessionInfo=abc123");

    let outcome = engine
        .route_request(&request, TransportType::Wss, cookies)
        .await
        .unwrap();

    let ProxyOutcome::Fork(attempts) = outcome else {
        panic!("expected a fork");
    };
    let targets: Vec<&str> = attempts.iter().map(|a| a.target.as_str()).collect();
    assert_eq!(targets, vec!["sip:bob@example.org", "sip:alice@example.org"]);

    for attempt in &attempts {
        assert_eq!(attempt.request.uri().to_string(), attempt.target);
        let headers = attempt.request.sip_headers();
        assert_eq!(headers.get_all("To"), vec!["sip:eve@example.org"]);
        assert_eq!(headers.get("X-WS-Session-Info"), Some("abc123"));
        assert!(headers.get("From").unwrap().contains("alice"));
    }
}

#[tokio::test]
async fn test_error_becomes_internal_error() {
    let engine = engine(Behaviour::Fail, Duration::from_secs(1)).await;
    let request = SipRequest::parse(INVITE.as_bytes()).unwrap();

    let outcome = engine
        .route_request(&request, TransportType::Udp, SessionCookies::empty())
        .await
        .unwrap();
    assert_eq!(respond_parts(&outcome), (500, "internal error".to_string()));
}

#[tokio::test]
async fn test_panic_becomes_internal_error() {
    let engine = engine(Behaviour::Panic, Duration::from_secs(1)).await;
    let request = SipRequest::parse(INVITE.as_bytes()).unwrap();

    let outcome = engine
        .route_request(&request, TransportType::Udp, SessionCookies::empty())
        .await
        .unwrap();
    assert_eq!(respond_parts(&outcome), (500, "internal error".to_string()));

    // the engine keeps serving after a contained panic
    let again = engine
        .route_request(&request, TransportType::Udp, SessionCookies::empty())
        .await
        .unwrap();
    assert_eq!(again.status_code(), Some(500));
}

#[tokio::test]
async fn test_slow_router_times_out() {
    let engine = engine(Behaviour::Stall, Duration::from_millis(50)).await;
    let request = SipRequest::parse(INVITE.as_bytes()).unwrap();

    let started = std::time::Instant::now();
    let outcome = engine
        .route_request(&request, TransportType::Tcp, SessionCookies::empty())
        .await
        .unwrap();

    assert_eq!(respond_parts(&outcome), (504, "Extension Timeout".to_string()));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_static_route_from_configuration() {
    let config = Config::from_toml_str(
        r#"
        [extensions]
        active_route = "router"

        [[extensions.units]]
        name = "router"
        kind = "static_route"

        [[extensions.units.settings.rules]]
        method = "MESSAGE"
        action = { reject = { code = 500, reason = "No MESSAGE for me" } }

        [[extensions.units.settings.rules]]
        uri_prefix = "sip:bob@"
        action = { fork = { targets = ["sip:bob@example.org", "sip:alice@example.org"], set_headers = { To = "sip:eve@example.org" } } }
        "#,
    )
    .unwrap();

    let registry = ExtensionRegistry::load(&config.extensions, &builtin_catalog()).await;
    assert_eq!(registry.active_route_unit(), Some("router"));
    let engine = ProxyEngine::new(Arc::new(registry));

    let message = SipRequest::parse(MESSAGE.as_bytes()).unwrap();
    let outcome = engine
        .route_request(&message, TransportType::Wss, SessionCookies::empty())
        .await
        .unwrap();
    assert_eq!(outcome.status_code(), Some(500));

    let invite = SipRequest::parse(INVITE.as_bytes()).unwrap();
    let outcome = engine
        .route_request(&invite, TransportType::Wss, SessionCookies::empty())
        .await
        .unwrap();
    let ProxyOutcome::Fork(attempts) = outcome else {
        panic!("expected a fork");
    };
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].target, "sip:bob@example.org");
    assert_eq!(
        attempts[1].request.sip_headers().get("to"),
        Some("sip:eve@example.org")
    );
}
