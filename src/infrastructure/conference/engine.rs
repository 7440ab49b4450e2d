//! Conference Engine
//!
//! Engine side of conferencing. Each signaling event becomes one hook
//! dispatch through the registry; DTMF for a participant is queued so the
//! extension observes it in arrival order. After every event the engine
//! reports participants whose records were destroyed.

use crate::config::ConferenceConfig;
use crate::domain::conference::controller::DESTROY_INCOMING_STATUS;
use crate::domain::conference::{ConferenceController, DtmfEvent, ParticipantState};
use crate::domain::extension::{ExtensionRegistry, HookOutcome, IncomingParticipant};
use crate::domain::routing::SipHeaders;
use crate::domain::shared::{DomainError, ParticipantHandle, Result, RoomId, SipUri};
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How an incoming call left the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Answered {
        handle: ParticipantHandle,
        room: Option<RoomId>,
    },
    Rejected {
        handle: ParticipantHandle,
        status_code: u16,
    },
}

impl Admission {
    pub fn handle(&self) -> ParticipantHandle {
        match self {
            Admission::Answered { handle, .. } | Admission::Rejected { handle, .. } => *handle,
        }
    }
}

/// Conference engine
pub struct ConferenceEngine {
    controller: Arc<ConferenceController>,
    registry: Arc<ExtensionRegistry>,
    policy: ConferenceConfig,
    dtmf_queues: DashMap<ParticipantHandle, mpsc::UnboundedSender<DtmfEvent>>,
}

impl ConferenceEngine {
    pub fn new(
        controller: Arc<ConferenceController>,
        registry: Arc<ExtensionRegistry>,
        policy: ConferenceConfig,
    ) -> Self {
        Self {
            controller,
            registry,
            policy,
            dtmf_queues: DashMap::new(),
        }
    }

    pub fn controller(&self) -> &Arc<ConferenceController> {
        &self.controller
    }

    /// A call arrived: create its participant and run the admission gate
    pub async fn on_incoming_call(&self, request_uri: &str, headers: SipHeaders) -> Result<Admission> {
        let handle = self.controller.create_participant(request_uri);
        let participant = IncomingParticipant {
            handle,
            request_uri: request_uri.to_string(),
            headers,
            auto_answer: self.policy.auto_answer,
        };

        if let HookOutcome::Faulted(err) = self
            .registry
            .on_incoming_participant(&self.controller, &participant)
            .await
        {
            warn!("Admission hook failed for participant {}: {}", handle, err);
        }

        if let Ok(ParticipantState::Incoming) = self.controller.participant_state(handle).await {
            if let Err(err) = self.apply_default_policy(handle, request_uri).await {
                error!("Default policy failed for participant {}: {}", handle, err);
                self.controller.terminate_participant(handle, 500).await?;
            }
        }

        let admission = match self.controller.participant_state(handle).await {
            Ok(ParticipantState::Terminated) => {
                let status_code = self
                    .controller
                    .final_status(handle)
                    .await?
                    .unwrap_or(self.policy.fallback_reject_code);
                Self::rejected(handle, status_code)
            }
            // destroyed by the hook before a decision
            Err(DomainError::InvalidState { .. }) => {
                Self::rejected(handle, DESTROY_INCOMING_STATUS)
            }
            Ok(_) => {
                let room = self.controller.room_of(handle).await?;
                counter!("sipext_conference_admissions_total", "result" => "answered").increment(1);
                Admission::Answered { handle, room }
            }
            Err(err) => return Err(err),
        };
        info!("Admission for {}: {:?}", request_uri, admission);
        self.notify_destroyed().await;
        Ok(admission)
    }

    fn rejected(handle: ParticipantHandle, status_code: u16) -> Admission {
        counter!("sipext_conference_admissions_total", "result" => "rejected").increment(1);
        Admission::Rejected {
            handle,
            status_code,
        }
    }

    async fn apply_default_policy(&self, handle: ParticipantHandle, request_uri: &str) -> Result<()> {
        let room_name = SipUri::parse(request_uri)
            .ok()
            .and_then(|uri| uri.user().map(str::to_string));

        match room_name {
            Some(name) if self.policy.auto_answer => {
                debug!("Default policy: participant {} to room {}", handle, name);
                if self.controller.room_of(handle).await?.is_none() {
                    let room_id = self.controller.get_or_create_room(&name);
                    self.controller.add_participant(room_id, handle).await?;
                }
                self.controller.answer_participant(handle).await
            }
            _ => {
                debug!(
                    "Default policy: rejecting participant {} with {}",
                    handle, self.policy.fallback_reject_code
                );
                self.controller
                    .reject_participant(handle, self.policy.fallback_reject_code)
                    .await
            }
        }
    }

    /// Queue a DTMF edge for delivery to the extension
    pub async fn on_dtmf(&self, handle: ParticipantHandle, event: DtmfEvent) -> Result<()> {
        self.ensure_not_terminated(handle).await?;

        let queue = self
            .dtmf_queues
            .entry(handle)
            .or_insert_with(|| self.spawn_dtmf_worker(handle))
            .clone();

        // termination may have removed the queue before the insert above
        if let Err(err) = self.ensure_not_terminated(handle).await {
            self.dtmf_queues.remove(&handle);
            return Err(err);
        }

        if queue.send(event).is_err() {
            debug!("DTMF queue for participant {} already closed", handle);
        }
        Ok(())
    }

    async fn ensure_not_terminated(&self, handle: ParticipantHandle) -> Result<()> {
        let state = self.controller.participant_state(handle).await?;
        if state == ParticipantState::Terminated {
            return Err(DomainError::InvalidState {
                handle,
                state: state.name(),
            });
        }
        Ok(())
    }

    fn spawn_dtmf_worker(&self, handle: ParticipantHandle) -> mpsc::UnboundedSender<DtmfEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel::<DtmfEvent>();
        let controller = self.controller.clone();
        let registry = self.registry.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match controller.participant_state(handle).await {
                    Ok(state) if state.is_active() => {}
                    _ => {
                        debug!("Dropping DTMF {} for ended participant {}", event, handle);
                        continue;
                    }
                }
                if let HookOutcome::Faulted(err) =
                    registry.on_dtmf_event(&controller, handle, event).await
                {
                    warn!("DTMF hook failed for participant {}: {}", handle, err);
                }
            }
            debug!("DTMF worker for participant {} stopped", handle);
        });

        tx
    }

    /// Media is flowing; notify the extension the first time only
    pub async fn on_media_connected(&self, handle: ParticipantHandle) -> Result<HookOutcome> {
        if !self.controller.confirm_connected(handle).await? {
            debug!("Participant {} already confirmed", handle);
            return Ok(HookOutcome::Skipped);
        }
        let outcome = self
            .registry
            .on_participant_connected_confirmed(&self.controller, handle)
            .await;
        self.notify_destroyed().await;
        Ok(outcome)
    }

    /// The call ended on the engine side
    pub async fn on_call_terminated(
        &self,
        handle: ParticipantHandle,
        status_code: u16,
    ) -> Result<HookOutcome> {
        self.controller.terminate_participant(handle, status_code).await?;
        self.dtmf_queues.remove(&handle);
        let outcome = self
            .registry
            .on_participant_terminated(&self.controller, handle, status_code)
            .await;
        self.notify_destroyed().await;
        Ok(outcome)
    }

    /// Forget a participant once the engine no longer references it
    pub async fn release(&self, handle: ParticipantHandle) -> Result<()> {
        self.dtmf_queues.remove(&handle);
        self.controller.release_participant(handle).await?;
        self.notify_destroyed().await;
        Ok(())
    }

    /// Stop timed media resources that have run their course
    pub async fn sweep(&self) -> usize {
        let expired = self.controller.expire_media_resources().await;
        if !expired.is_empty() {
            debug!("Expired {} media resource(s)", expired.len());
        }
        self.notify_destroyed().await;
        expired.len()
    }

    /// Dispatch `on_participant_destroyed` for every record dropped since the last call
    async fn notify_destroyed(&self) {
        loop {
            let destroyed = self.controller.take_destroyed().await;
            if destroyed.is_empty() {
                return;
            }
            for handle in destroyed {
                self.dtmf_queues.remove(&handle);
                if let HookOutcome::Faulted(err) = self
                    .registry
                    .on_participant_destroyed(&self.controller, handle)
                    .await
                {
                    warn!("Destroyed hook failed for participant {}: {}", handle, err);
                }
            }
        }
    }
}
