//! Extension Registry
//!
//! Loads the configured units, remembers which hooks each one implements and
//! dispatches engine events to the active unit through the fault boundary.

use super::boundary::{contain, contain_with_deadline};
use super::capability::{Capability, CapabilitySet};
use super::catalog::UnitCatalog;
use super::unit::{ExtensionUnit, IncomingParticipant};
use crate::config::ExtensionsConfig;
use crate::domain::conference::{ConferenceController, DtmfEvent};
use crate::domain::routing::{RouteReply, RouteRequest};
use crate::domain::shared::{DomainError, ParticipantHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A unit that passed `on_load`
pub struct LoadedUnit {
    name: String,
    unit: Arc<dyn ExtensionUnit>,
    capabilities: CapabilitySet,
}

impl LoadedUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}

/// Result of dispatching a notification hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// No active unit, or it does not implement the hook
    Skipped,
    Completed,
    /// The hook failed; the failure was logged and contained
    Faulted(DomainError),
}

/// Loaded units plus the active selections
pub struct ExtensionRegistry {
    units: Vec<LoadedUnit>,
    active_route: Option<usize>,
    active_conference: Option<usize>,
    route_timeout: Duration,
}

impl ExtensionRegistry {
    /// Build every configured unit from `catalog` and load it
    pub async fn load(config: &ExtensionsConfig, catalog: &UnitCatalog) -> Self {
        let mut units = Vec::with_capacity(config.units.len());
        for unit_config in &config.units {
            match catalog.build(unit_config) {
                Ok(unit) => units.push(unit),
                Err(err) => error!("Skipping extension unit {}: {}", unit_config.name, err),
            }
        }

        Self::from_units(
            units,
            config.active_route.as_deref(),
            config.active_conference.as_deref(),
            config.route_timeout(),
        )
        .await
    }

    /// Load already constructed units.
    ///
    /// `on_load` runs once per unit, in order, before the registry is
    /// returned; a unit whose `on_load` fails is left out.
    pub async fn from_units(
        units: Vec<Arc<dyn ExtensionUnit>>,
        active_route: Option<&str>,
        active_conference: Option<&str>,
        route_timeout: Duration,
    ) -> Self {
        let mut loaded: Vec<LoadedUnit> = Vec::with_capacity(units.len());

        for unit in units {
            let name = unit.name().to_string();
            if loaded.iter().any(|u| u.name == name) {
                error!("Duplicate extension unit name {}, skipping", name);
                continue;
            }

            let capabilities = unit.capabilities();
            if capabilities.contains(Capability::OnLoad) {
                debug!("Invoking {}::on_load", name);
                if let Err(err) = contain(&name, Capability::OnLoad, unit.on_load()).await {
                    error!("Extension unit {} failed to load, skipping: {}", name, err);
                    continue;
                }
            }

            info!("Loaded extension unit {} with hooks {}", name, capabilities);
            loaded.push(LoadedUnit {
                name,
                unit,
                capabilities,
            });
        }

        let active_route = Self::select(&loaded, active_route, "routing");
        let active_conference = Self::select(&loaded, active_conference, "conference");

        Self {
            units: loaded,
            active_route,
            active_conference,
            route_timeout,
        }
    }

    /// Registry with no units; every hook is skipped
    pub fn empty() -> Self {
        Self {
            units: Vec::new(),
            active_route: None,
            active_conference: None,
            route_timeout: Duration::from_secs(2),
        }
    }

    fn select(loaded: &[LoadedUnit], wanted: Option<&str>, role: &str) -> Option<usize> {
        let wanted = wanted?;
        let index = loaded.iter().position(|u| u.name == wanted);
        match index {
            Some(_) => info!("Active {} unit: {}", role, wanted),
            None => warn!("Active {} unit {} is not loaded", role, wanted),
        }
        index
    }

    pub fn units(&self) -> impl Iterator<Item = &LoadedUnit> {
        self.units.iter()
    }

    pub fn unit(&self, name: &str) -> Option<&LoadedUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn active_route_unit(&self) -> Option<&str> {
        self.active_route.map(|i| self.units[i].name.as_str())
    }

    pub fn active_conference_unit(&self) -> Option<&str> {
        self.active_conference.map(|i| self.units[i].name.as_str())
    }

    pub fn route_timeout(&self) -> Duration {
        self.route_timeout
    }

    fn active(&self, index: Option<usize>, hook: Capability) -> Option<&LoadedUnit> {
        let unit = &self.units[index?];
        if unit.capabilities.contains(hook) {
            Some(unit)
        } else {
            debug!("{} does not implement {}, skipping", unit.name, hook);
            None
        }
    }

    /// Ask the active unit for a routing decision.
    ///
    /// `None` means no unit routes requests and the engine's own routing
    /// applies. Faults become `Reject(500)`, a missed deadline `Reject(504)`.
    pub async fn provide_route(&self, request: RouteRequest) -> Option<RouteReply> {
        let loaded = self.active(self.active_route, Capability::ProvideRoute)?;
        let unit = loaded.unit.clone();

        let result = contain_with_deadline(
            &loaded.name,
            Capability::ProvideRoute,
            self.route_timeout,
            async move { unit.provide_route(&request).await },
        )
        .await;

        Some(match result {
            Ok(reply) => reply,
            Err(DomainError::Timeout { .. }) => RouteReply::timeout(),
            Err(_) => RouteReply::internal_error(),
        })
    }

    pub async fn on_incoming_participant(
        &self,
        conference: &ConferenceController,
        participant: &IncomingParticipant,
    ) -> HookOutcome {
        let Some(loaded) = self.active(self.active_conference, Capability::OnIncomingParticipant)
        else {
            return HookOutcome::Skipped;
        };
        Self::outcome(
            contain(
                &loaded.name,
                Capability::OnIncomingParticipant,
                loaded.unit.on_incoming_participant(conference, participant),
            )
            .await,
        )
    }

    pub async fn on_dtmf_event(
        &self,
        conference: &ConferenceController,
        handle: ParticipantHandle,
        event: DtmfEvent,
    ) -> HookOutcome {
        let Some(loaded) = self.active(self.active_conference, Capability::OnDtmfEvent) else {
            return HookOutcome::Skipped;
        };
        Self::outcome(
            contain(
                &loaded.name,
                Capability::OnDtmfEvent,
                loaded.unit.on_dtmf_event(conference, handle, event),
            )
            .await,
        )
    }

    pub async fn on_participant_connected_confirmed(
        &self,
        conference: &ConferenceController,
        handle: ParticipantHandle,
    ) -> HookOutcome {
        let Some(loaded) = self.active(
            self.active_conference,
            Capability::OnParticipantConnectedConfirmed,
        ) else {
            return HookOutcome::Skipped;
        };
        Self::outcome(
            contain(
                &loaded.name,
                Capability::OnParticipantConnectedConfirmed,
                loaded.unit.on_participant_connected_confirmed(conference, handle),
            )
            .await,
        )
    }

    pub async fn on_participant_terminated(
        &self,
        conference: &ConferenceController,
        handle: ParticipantHandle,
        status_code: u16,
    ) -> HookOutcome {
        let Some(loaded) = self.active(self.active_conference, Capability::OnParticipantTerminated)
        else {
            return HookOutcome::Skipped;
        };
        Self::outcome(
            contain(
                &loaded.name,
                Capability::OnParticipantTerminated,
                loaded.unit.on_participant_terminated(conference, handle, status_code),
            )
            .await,
        )
    }

    pub async fn on_participant_destroyed(
        &self,
        conference: &ConferenceController,
        handle: ParticipantHandle,
    ) -> HookOutcome {
        let Some(loaded) = self.active(self.active_conference, Capability::OnParticipantDestroyed)
        else {
            return HookOutcome::Skipped;
        };
        Self::outcome(
            contain(
                &loaded.name,
                Capability::OnParticipantDestroyed,
                loaded.unit.on_participant_destroyed(conference, handle),
            )
            .await,
        )
    }

    fn outcome(result: crate::domain::shared::Result<()>) -> HookOutcome {
        match result {
            Ok(()) => HookOutcome::Completed,
            Err(err) => HookOutcome::Faulted(err),
        }
    }
}
