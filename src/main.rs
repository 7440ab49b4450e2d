use sipext::config::Config;
use sipext::domain::conference::{ConferenceController, DtmfEvent, LoggingMediaStack};
use sipext::domain::extension::ExtensionRegistry;
use sipext::domain::routing::{SessionCookies, SipHeaders, TransportType};
use sipext::extensions::builtin_catalog;
use sipext::infrastructure::conference::{Admission, ConferenceEngine};
use sipext::infrastructure::sip::{ProxyEngine, ProxyOutcome, SipRequest};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_INVITE: &str = "INVITE sip:bob@example.org SIP/2.0\r\n\
Via: SIP/2.0/WSS client.invalid;branch=z9hG4bK-demo\r\n\
Max-Forwards: 70\r\n\
To: <sip:bob@example.org>\r\n\
From: Alice <sip:alice@example.org>;tag=demo\r\n\
Call-ID: demo-call@client.invalid\r\n\
CSeq: 1 INVITE\r\n\
Content-Length: 0\r\n\r\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting sipext");
    if let Some(path) = &config_path {
        info!("Configuration loaded from {}", path.display());
    }

    let catalog = builtin_catalog();
    info!("Available unit kinds: {:?}", catalog.kinds());
    let registry = Arc::new(ExtensionRegistry::load(&config.extensions, &catalog).await);

    let mut controller = ConferenceController::new();
    if config.conference.media_resources {
        controller = controller.with_media_stack(Arc::new(LoggingMediaStack));
    }
    let conference = Arc::new(ConferenceEngine::new(
        Arc::new(controller),
        registry.clone(),
        config.conference.clone(),
    ));
    let proxy = ProxyEngine::new(registry);

    demo_pass(&proxy, &conference).await?;

    let sweeper = conference.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        loop {
            ticker.tick().await;
            sweeper.sweep().await;
        }
    });

    info!("sipext initialized, press Ctrl-C to exit");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    Ok(())
}

/// Push one request and one conference call through the loaded extensions
async fn demo_pass(proxy: &ProxyEngine, conference: &ConferenceEngine) -> anyhow::Result<()> {
    info!("=== Extension Demo ===");

    let request = SipRequest::parse(DEMO_INVITE.as_bytes())?;
    let cookies = SessionCookies::from_cookie_header("WSSessionInfo=demo");
    match proxy.route_request(&request, TransportType::Wss, cookies).await? {
        ProxyOutcome::Fork(attempts) => {
            for attempt in &attempts {
                info!("Fork attempt to {}", attempt.target);
            }
        }
        ProxyOutcome::Respond { response, reason } => {
            info!("Direct response {} {}", response.status_code(), reason);
        }
        ProxyOutcome::Unhandled => info!("No routing unit active"),
    }

    let admission = conference
        .on_incoming_call("sip:demo@conference.invalid", SipHeaders::new())
        .await?;
    info!("Conference admission: {:?}", admission);

    if let Admission::Answered { handle, .. } = admission {
        conference.on_media_connected(handle).await?;
        conference.on_dtmf(handle, DtmfEvent::down(1, 0)).await?;
        conference.on_dtmf(handle, DtmfEvent::up(1, 120)).await?;
        conference.on_call_terminated(handle, 200).await?;
        if let Err(err) = conference.release(handle).await {
            warn!("Release of participant {} failed: {}", handle, err);
        }
    }

    info!("=== Extension Demo Complete ===");
    Ok(())
}
