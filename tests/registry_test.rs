//! Extension Registry Integration Tests

use async_trait::async_trait;
use sipext::config::{Config, UnitConfig};
use sipext::domain::conference::ConferenceController;
use sipext::domain::extension::{
    Capability, CapabilitySet, ExtensionRegistry, ExtensionUnit, HookOutcome, IncomingParticipant,
    UnitCatalog,
};
use sipext::domain::routing::{
    RouteDecision, RouteReply, RouteRequest, SessionCookies, SipHeaders, TransportType,
};
use sipext::extensions::builtin_catalog;
use sipext::DomainError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Router that counts its lifecycle calls
struct CountingRouter {
    name: String,
    loads: Arc<AtomicUsize>,
    routes: Arc<AtomicUsize>,
    fail_load: bool,
}

impl CountingRouter {
    fn new(name: &str, fail_load: bool) -> Self {
        Self {
            name: name.to_string(),
            loads: Arc::new(AtomicUsize::new(0)),
            routes: Arc::new(AtomicUsize::new(0)),
            fail_load,
        }
    }
}

#[async_trait]
impl ExtensionUnit for CountingRouter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty()
            .with(Capability::OnLoad)
            .with(Capability::ProvideRoute)
    }

    async fn on_load(&self) -> anyhow::Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            anyhow::bail!("missing route table");
        }
        Ok(())
    }

    async fn provide_route(&self, _request: &RouteRequest) -> anyhow::Result<RouteReply> {
        assert_eq!(self.loads.load(Ordering::SeqCst), 1);
        self.routes.fetch_add(1, Ordering::SeqCst);
        Ok(RouteReply::new(RouteDecision::fork(["sip:bob@example.org"])?))
    }
}

/// Implements conference hooks but declares only routing
struct UndeclaredHooks;

#[async_trait]
impl ExtensionUnit for UndeclaredHooks {
    fn name(&self) -> &str {
        "undeclared"
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty().with(Capability::ProvideRoute)
    }

    async fn provide_route(&self, _request: &RouteRequest) -> anyhow::Result<RouteReply> {
        Ok(RouteReply::new(RouteDecision::reject(403, "Forbidden")?))
    }

    async fn on_incoming_participant(
        &self,
        _conference: &ConferenceController,
        _participant: &IncomingParticipant,
    ) -> anyhow::Result<()> {
        panic!("undeclared hook invoked");
    }
}

fn route_request() -> RouteRequest {
    let mut headers = SipHeaders::new();
    headers.append("From", "<sip:alice@example.org>;tag=1");
    headers.append("To", "<sip:bob@example.org>");
    RouteRequest {
        method: "INVITE".to_string(),
        request_uri: "sip:bob@example.org".to_string(),
        headers,
        transport: TransportType::Udp,
        body: bytes::Bytes::new(),
        cookies: SessionCookies::empty(),
    }
}

fn incoming(conference: &ConferenceController) -> IncomingParticipant {
    IncomingParticipant {
        handle: conference.create_participant("sip:room1@conf.example.org"),
        request_uri: "sip:room1@conf.example.org".to_string(),
        headers: SipHeaders::new(),
        auto_answer: true,
    }
}

#[tokio::test]
async fn test_on_load_runs_once_before_routing() {
    let router = CountingRouter::new("router", false);
    let loads = router.loads.clone();
    let routes = router.routes.clone();
    let unit: Arc<dyn ExtensionUnit> = Arc::new(router);

    let registry =
        ExtensionRegistry::from_units(vec![unit], Some("router"), None, Duration::from_secs(1))
            .await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    for _ in 0..3 {
        let reply = registry.provide_route(route_request()).await.unwrap();
        assert!(reply.decision.is_fork());
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(routes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failed_load_skips_only_that_unit() {
    let broken: Arc<dyn ExtensionUnit> = Arc::new(CountingRouter::new("broken", true));
    let healthy: Arc<dyn ExtensionUnit> = Arc::new(CountingRouter::new("healthy", false));

    let registry = ExtensionRegistry::from_units(
        vec![broken, healthy],
        Some("broken"),
        None,
        Duration::from_secs(1),
    )
    .await;

    assert!(registry.unit("broken").is_none());
    assert!(registry.unit("healthy").is_some());
    assert_eq!(registry.active_route_unit(), None);
    assert!(registry.provide_route(route_request()).await.is_none());
}

#[tokio::test]
async fn test_duplicate_names_keep_first() {
    let first: Arc<dyn ExtensionUnit> = Arc::new(CountingRouter::new("router", false));
    let second: Arc<dyn ExtensionUnit> = Arc::new(UndeclaredHooks);
    let third: Arc<dyn ExtensionUnit> = Arc::new(CountingRouter::new("router", false));

    let registry = ExtensionRegistry::from_units(
        vec![first, second, third],
        Some("router"),
        None,
        Duration::from_secs(1),
    )
    .await;
    assert_eq!(registry.units().count(), 2);
}

#[tokio::test]
async fn test_undeclared_hooks_are_skipped() {
    let unit: Arc<dyn ExtensionUnit> = Arc::new(UndeclaredHooks);
    let registry = ExtensionRegistry::from_units(
        vec![unit],
        Some("undeclared"),
        Some("undeclared"),
        Duration::from_secs(1),
    )
    .await;

    let loaded = registry.unit("undeclared").unwrap();
    assert!(loaded.capabilities().contains(Capability::ProvideRoute));
    assert!(!loaded.capabilities().contains(Capability::OnIncomingParticipant));

    let conference = ConferenceController::new();
    let participant = incoming(&conference);
    assert_eq!(
        registry
            .on_incoming_participant(&conference, &participant)
            .await,
        HookOutcome::Skipped
    );

    let reply = registry.provide_route(route_request()).await.unwrap();
    assert_eq!(reply.decision, RouteDecision::reject(403, "Forbidden").unwrap());
}

#[tokio::test]
async fn test_conference_fault_is_contained() {
    struct Faulty;

    #[async_trait]
    impl ExtensionUnit for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::empty().with(Capability::OnIncomingParticipant)
        }

        async fn on_incoming_participant(
            &self,
            _conference: &ConferenceController,
            _participant: &IncomingParticipant,
        ) -> anyhow::Result<()> {
            panic!("admission script crashed");
        }
    }

    let unit: Arc<dyn ExtensionUnit> = Arc::new(Faulty);
    let registry =
        ExtensionRegistry::from_units(vec![unit], None, Some("faulty"), Duration::from_secs(1))
            .await;
    let conference = ConferenceController::new();
    let participant = incoming(&conference);

    let outcome = registry
        .on_incoming_participant(&conference, &participant)
        .await;
    assert!(matches!(
        outcome,
        HookOutcome::Faulted(DomainError::ExtensionFault { ref unit, .. }) if unit == "faulty"
    ));
}

#[tokio::test]
async fn test_load_from_configuration() {
    let config = Config::from_toml_str(
        r#"
        [extensions]
        active_route = "router"
        active_conference = "rooms"
        route_timeout_ms = 250

        [[extensions.units]]
        name = "router"
        kind = "static_route"

        [[extensions.units]]
        name = "rooms"
        kind = "room_conference"

        [extensions.units.settings]
        default_room = "lobby"

        [[extensions.units]]
        name = "mystery"
        kind = "lua_script"
        "#,
    )
    .unwrap();

    let registry = ExtensionRegistry::load(&config.extensions, &builtin_catalog()).await;
    assert_eq!(registry.units().count(), 2);
    assert_eq!(registry.active_route_unit(), Some("router"));
    assert_eq!(registry.active_conference_unit(), Some("rooms"));
    assert_eq!(registry.route_timeout(), Duration::from_millis(250));

    // no rules and no default action
    let reply = registry.provide_route(route_request()).await.unwrap();
    assert_eq!(reply.decision, RouteDecision::reject(404, "Not Found").unwrap());
}

#[test]
fn test_catalog_rejects_unknown_kind() {
    let catalog = UnitCatalog::new();
    let err = catalog
        .build(&UnitConfig {
            name: "x".to_string(),
            kind: "lua_script".to_string(),
            settings: serde_json::Value::Null,
        })
        .err()
        .unwrap();
    assert_eq!(err, DomainError::UnknownUnitKind("lua_script".to_string()));
}
