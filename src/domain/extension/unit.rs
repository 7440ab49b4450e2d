//! Extension unit contract

use super::capability::CapabilitySet;
use crate::domain::conference::{ConferenceController, DtmfEvent};
use crate::domain::routing::{RouteReply, RouteRequest, SipHeaders};
use crate::domain::shared::ParticipantHandle;
use async_trait::async_trait;

/// A call arriving at the conferencing server
#[derive(Debug, Clone)]
pub struct IncomingParticipant {
    pub handle: ParticipantHandle,
    pub request_uri: String,
    pub headers: SipHeaders,
    pub auto_answer: bool,
}

/// Pluggable logic the engine delegates routing and conference decisions to.
///
/// Only hooks listed in [`ExtensionUnit::capabilities`] are ever invoked; the
/// default bodies exist so a unit implements just what it declares. Errors and
/// panics raised by a hook are contained by the registry.
#[async_trait]
pub trait ExtensionUnit: Send + Sync {
    /// Unique name, used to select the active unit
    fn name(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    /// Called exactly once, before any other hook. An error skips the unit.
    async fn on_load(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn provide_route(&self, _request: &RouteRequest) -> anyhow::Result<RouteReply> {
        anyhow::bail!("{} does not provide routes", self.name())
    }

    /// Runs on the signaling path; may reject, or add to one room and answer
    async fn on_incoming_participant(
        &self,
        _conference: &ConferenceController,
        _participant: &IncomingParticipant,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_dtmf_event(
        &self,
        _conference: &ConferenceController,
        _handle: ParticipantHandle,
        _event: DtmfEvent,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Promised at most once per participant, but should be safe to repeat
    async fn on_participant_connected_confirmed(
        &self,
        _conference: &ConferenceController,
        _handle: ParticipantHandle,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_participant_terminated(
        &self,
        _conference: &ConferenceController,
        _handle: ParticipantHandle,
        _status_code: u16,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// The participant's record is gone; its handle is no longer usable
    async fn on_participant_destroyed(
        &self,
        _conference: &ConferenceController,
        _handle: ParticipantHandle,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
