//! Room-per-URI conference admission
//!
//! Callers land in the room named by a configured header, else by the user
//! part of the request URI, else in `default_room`. Calls naming no room
//! are rejected with `reject_code`.

use crate::config::UnitConfig;
use crate::domain::conference::{ConferenceController, DtmfEvent, MediaResourceDescriptor};
use crate::domain::extension::{Capability, CapabilitySet, ExtensionUnit, IncomingParticipant};
use crate::domain::shared::{DomainError, ParticipantHandle, SipUri};
use anyhow::Context;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomConferenceSettings {
    /// Header naming the room, checked before the request URI
    pub room_header: Option<String>,
    pub default_room: Option<String>,
    pub reject_code: u16,
    /// Played into the room when a participant's media first connects
    pub welcome_media: Option<String>,
    pub welcome_duration_ms: Option<u64>,
}

impl Default for RoomConferenceSettings {
    fn default() -> Self {
        Self {
            room_header: None,
            default_room: None,
            reject_code: 404,
            welcome_media: None,
            welcome_duration_ms: None,
        }
    }
}

pub struct RoomConference {
    name: String,
    settings: RoomConferenceSettings,
    /// Welcomed caller -> media resource playing its welcome
    welcomed: DashMap<ParticipantHandle, Option<ParticipantHandle>>,
}

impl RoomConference {
    pub fn new(name: impl Into<String>, settings: RoomConferenceSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            welcomed: DashMap::new(),
        }
    }

    pub fn from_config(config: &UnitConfig) -> anyhow::Result<Self> {
        let settings = if config.settings.is_null() {
            RoomConferenceSettings::default()
        } else {
            serde_json::from_value(config.settings.clone())
                .context("invalid room_conference settings")?
        };
        Ok(Self::new(config.name.clone(), settings))
    }

    fn room_name(&self, participant: &IncomingParticipant) -> Option<String> {
        let from_header = self
            .settings
            .room_header
            .as_deref()
            .and_then(|header| participant.headers.get(header))
            .map(str::trim)
            .filter(|room| !room.is_empty())
            .map(str::to_string);

        from_header
            .or_else(|| {
                SipUri::parse(&participant.request_uri)
                    .ok()
                    .and_then(|uri| uri.user().map(str::to_string))
            })
            .or_else(|| self.settings.default_room.clone())
    }

    fn welcome(&self) -> Option<MediaResourceDescriptor> {
        let media_url = self.settings.welcome_media.as_deref()?;
        let descriptor = MediaResourceDescriptor::new(media_url);
        Some(match self.settings.welcome_duration_ms {
            Some(duration_ms) => descriptor.with_duration_ms(duration_ms),
            None => descriptor,
        })
    }

    /// Destroy the welcome still playing for `caller`, if any
    async fn end_welcome(&self, conference: &ConferenceController, caller: ParticipantHandle) {
        let Some((_, Some(resource))) = self.welcomed.remove(&caller) else {
            return;
        };
        match conference.destroy_participant(resource).await {
            Ok(()) => debug!("Welcome {} for participant {} stopped", resource, caller),
            Err(err) => debug!("Welcome {} for participant {} already gone: {}", resource, caller, err),
        }
    }
}

#[async_trait]
impl ExtensionUnit for RoomConference {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty()
            .with(Capability::OnLoad)
            .with(Capability::OnIncomingParticipant)
            .with(Capability::OnDtmfEvent)
            .with(Capability::OnParticipantConnectedConfirmed)
            .with(Capability::OnParticipantTerminated)
            .with(Capability::OnParticipantDestroyed)
    }

    async fn on_load(&self) -> anyhow::Result<()> {
        if !(300..=699).contains(&self.settings.reject_code) {
            anyhow::bail!("reject_code {} is not a failure status", self.settings.reject_code);
        }
        Ok(())
    }

    async fn on_incoming_participant(
        &self,
        conference: &ConferenceController,
        participant: &IncomingParticipant,
    ) -> anyhow::Result<()> {
        let handle = participant.handle;
        let Some(room_name) = self.room_name(participant) else {
            info!("No room for {}, rejecting", participant.request_uri);
            conference
                .reject_participant(handle, self.settings.reject_code)
                .await?;
            return Ok(());
        };

        let room_id = conference.get_or_create_room(&room_name);
        conference.add_participant(room_id, handle).await?;
        if participant.auto_answer {
            conference.answer_participant(handle).await?;
        }
        info!("Participant {} admitted to room {}", handle, room_name);
        Ok(())
    }

    async fn on_dtmf_event(
        &self,
        _conference: &ConferenceController,
        handle: ParticipantHandle,
        event: DtmfEvent,
    ) -> anyhow::Result<()> {
        info!("DTMF from participant {}: {}", handle, event);
        Ok(())
    }

    async fn on_participant_connected_confirmed(
        &self,
        conference: &ConferenceController,
        handle: ParticipantHandle,
    ) -> anyhow::Result<()> {
        let Some(descriptor) = self.welcome() else {
            return Ok(());
        };
        match self.welcomed.entry(handle) {
            Entry::Occupied(_) => {
                debug!("Participant {} already welcomed", handle);
                return Ok(());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(None);
            }
        }
        let Some(room_id) = conference.room_of(handle).await? else {
            return Ok(());
        };

        match conference
            .create_media_resource_participant(room_id, descriptor)
            .await
        {
            Ok(resource) => {
                debug!("Welcome for participant {} playing as {}", handle, resource);
                let recorded = match self.welcomed.get_mut(&handle) {
                    Some(mut welcome) => {
                        *welcome = Some(resource);
                        true
                    }
                    None => false,
                };
                if !recorded {
                    // the caller left while the welcome was starting
                    conference.destroy_participant(resource).await?;
                }
                Ok(())
            }
            Err(DomainError::Unsupported(what)) => {
                warn!("No welcome for participant {}: {} unsupported", handle, what);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn on_participant_terminated(
        &self,
        conference: &ConferenceController,
        handle: ParticipantHandle,
        status_code: u16,
    ) -> anyhow::Result<()> {
        debug!("Participant {} left with {}", handle, status_code);
        self.end_welcome(conference, handle).await;
        Ok(())
    }

    async fn on_participant_destroyed(
        &self,
        conference: &ConferenceController,
        handle: ParticipantHandle,
    ) -> anyhow::Result<()> {
        self.end_welcome(conference, handle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conference::media::MockMediaStack;
    use crate::domain::conference::ParticipantState;
    use crate::domain::routing::SipHeaders;
    use std::sync::Arc;

    fn incoming(
        conference: &ConferenceController,
        request_uri: &str,
        headers: SipHeaders,
    ) -> IncomingParticipant {
        IncomingParticipant {
            handle: conference.create_participant(request_uri),
            request_uri: request_uri.to_string(),
            headers,
            auto_answer: true,
        }
    }

    #[tokio::test]
    async fn test_admits_into_uri_room() {
        let unit = RoomConference::new("rooms", RoomConferenceSettings::default());
        let conference = ConferenceController::new();

        let first = incoming(&conference, "sip:room1@conf.example.org", SipHeaders::new());
        let second = incoming(&conference, "sip:room1@conf.example.org", SipHeaders::new());
        unit.on_incoming_participant(&conference, &first).await.unwrap();
        unit.on_incoming_participant(&conference, &second).await.unwrap();

        let room = conference.room_by_name("room1").unwrap();
        assert_eq!(conference.room_count(), 1);
        assert_eq!(
            conference.members(room.id).await.unwrap(),
            vec![first.handle, second.handle]
        );
        assert_eq!(
            conference.participant_state(first.handle).await.unwrap(),
            ParticipantState::Connected
        );
    }

    #[tokio::test]
    async fn test_header_overrides_uri() {
        let unit = RoomConference::new(
            "rooms",
            RoomConferenceSettings {
                room_header: Some("X-Conference-Room".to_string()),
                ..RoomConferenceSettings::default()
            },
        );
        let conference = ConferenceController::new();
        let mut headers = SipHeaders::new();
        headers.append("x-conference-room", "standup");

        let participant = incoming(&conference, "sip:room1@conf.example.org", headers);
        unit.on_incoming_participant(&conference, &participant).await.unwrap();

        assert!(conference.room_by_name("standup").is_some());
        assert!(conference.room_by_name("room1").is_none());
    }

    #[tokio::test]
    async fn test_rejects_without_room() {
        let unit = RoomConference::new("rooms", RoomConferenceSettings::default());
        let conference = ConferenceController::new();

        let participant = incoming(&conference, "sip:conf.example.org", SipHeaders::new());
        unit.on_incoming_participant(&conference, &participant).await.unwrap();

        assert_eq!(
            conference.final_status(participant.handle).await.unwrap(),
            Some(404)
        );
    }

    #[tokio::test]
    async fn test_welcome_played_once() {
        let mut media = MockMediaStack::new();
        media.expect_supports_media_resources().return_const(true);
        media
            .expect_start_media_resource()
            .times(1)
            .returning(|_, _| Ok(()));

        let unit = RoomConference::new(
            "rooms",
            RoomConferenceSettings {
                welcome_media: Some("file:///prompts/welcome.wav".to_string()),
                ..RoomConferenceSettings::default()
            },
        );
        let conference = ConferenceController::new().with_media_stack(Arc::new(media));
        let participant = incoming(&conference, "sip:room1@conf.example.org", SipHeaders::new());
        unit.on_incoming_participant(&conference, &participant).await.unwrap();

        unit.on_participant_connected_confirmed(&conference, participant.handle)
            .await
            .unwrap();
        unit.on_participant_connected_confirmed(&conference, participant.handle)
            .await
            .unwrap();

        let room = conference.room_by_name("room1").unwrap();
        assert_eq!(conference.members(room.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_welcome_stops_when_caller_leaves() {
        let mut media = MockMediaStack::new();
        media.expect_supports_media_resources().return_const(true);
        media
            .expect_start_media_resource()
            .times(2)
            .returning(|_, _| Ok(()));
        media
            .expect_stop_media_resource()
            .times(2)
            .returning(|_, _| Ok(()));

        let unit = RoomConference::new(
            "rooms",
            RoomConferenceSettings {
                welcome_media: Some("file:///prompts/welcome.wav".to_string()),
                ..RoomConferenceSettings::default()
            },
        );
        let conference = ConferenceController::new().with_media_stack(Arc::new(media));

        let mut callers = Vec::new();
        for _ in 0..2 {
            let caller = incoming(&conference, "sip:room1@conf.example.org", SipHeaders::new());
            unit.on_incoming_participant(&conference, &caller).await.unwrap();
            unit.on_participant_connected_confirmed(&conference, caller.handle)
                .await
                .unwrap();
            callers.push(caller.handle);
        }
        let room = conference.room_by_name("room1").unwrap();
        assert_eq!(conference.members(room.id).await.unwrap().len(), 4);

        for caller in callers {
            conference.terminate_participant(caller, 200).await.unwrap();
            unit.on_participant_terminated(&conference, caller, 200)
                .await
                .unwrap();
        }
        assert!(conference.members(room.id).await.unwrap().is_empty());
        assert_eq!(conference.take_destroyed().await.len(), 2);
    }

    #[tokio::test]
    async fn test_welcome_tolerates_unsupported_media() {
        let unit = RoomConference::new(
            "rooms",
            RoomConferenceSettings {
                welcome_media: Some("tone:dialtone".to_string()),
                ..RoomConferenceSettings::default()
            },
        );
        let conference = ConferenceController::new();
        let participant = incoming(&conference, "sip:room1@conf.example.org", SipHeaders::new());
        unit.on_incoming_participant(&conference, &participant).await.unwrap();

        assert!(unit
            .on_participant_connected_confirmed(&conference, participant.handle)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_on_load_checks_reject_code() {
        let unit = RoomConference::new(
            "rooms",
            RoomConferenceSettings {
                reject_code: 200,
                ..RoomConferenceSettings::default()
            },
        );
        assert!(unit.on_load().await.is_err());
    }
}
