//! Participant State Machine
//!
//! One call leg in a conference moves `Incoming -> Connected -> Terminated`,
//! or `Incoming -> Terminated` when rejected. `Terminated` is absorbing.

use crate::domain::shared::{DomainError, ParticipantHandle, Result, RoomId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participant State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantState {
    /// Call arrived, admission not decided yet
    Incoming,
    /// Answered; media may or may not be confirmed yet
    Connected,
    /// Rejected or hung up
    Terminated,
}

impl ParticipantState {
    pub fn is_active(&self) -> bool {
        !matches!(self, ParticipantState::Terminated)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParticipantState::Incoming => "Incoming",
            ParticipantState::Connected => "Connected",
            ParticipantState::Terminated => "Terminated",
        }
    }
}

/// Participant State Machine Event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantEvent {
    /// Extension answered the call
    Answer,
    /// Extension rejected the call with a final status
    Reject(u16),
    /// Call ended by either side
    Hangup(u16),
}

/// Engine-side record of one participant
#[derive(Debug, Clone)]
pub struct Participant {
    handle: ParticipantHandle,
    state: ParticipantState,
    request_uri: String,
    room: Option<RoomId>,
    final_status: Option<u16>,
    media_confirmed: bool,
    media_resource: bool,
    created_at: DateTime<Utc>,
    alerted_at: Option<DateTime<Utc>>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    /// Media resources with a duration stop here
    expires_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(handle: ParticipantHandle, request_uri: impl Into<String>) -> Self {
        Self {
            handle,
            state: ParticipantState::Incoming,
            request_uri: request_uri.into(),
            room: None,
            final_status: None,
            media_confirmed: false,
            media_resource: false,
            created_at: Utc::now(),
            alerted_at: None,
            answered_at: None,
            ended_at: None,
            expires_at: None,
        }
    }

    /// Media-injection participants are connected as soon as they exist
    pub fn media_resource(
        handle: ParticipantHandle,
        media_url: impl Into<String>,
        duration_ms: Option<u64>,
    ) -> Self {
        let now = Utc::now();
        let expires_at = duration_ms
            .and_then(|ms| i64::try_from(ms).ok())
            .and_then(chrono::Duration::try_milliseconds)
            .and_then(|duration| now.checked_add_signed(duration));
        Self {
            state: ParticipantState::Connected,
            media_resource: true,
            media_confirmed: true,
            answered_at: Some(now),
            expires_at,
            ..Self::new(handle, media_url)
        }
    }

    pub fn handle(&self) -> ParticipantHandle {
        self.handle
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    pub fn final_status(&self) -> Option<u16> {
        self.final_status
    }

    pub fn is_media_resource(&self) -> bool {
        self.media_resource
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn alerted_at(&self) -> Option<DateTime<Utc>> {
        self.alerted_at
    }

    pub fn answered_at(&self) -> Option<DateTime<Utc>> {
        self.answered_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// A timed media resource whose duration has run out
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state.is_active() && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Fail with `InvalidState` once terminated
    pub fn ensure_active(&self) -> Result<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(self.invalid_state())
        }
    }

    /// Process an event and transition state
    pub fn process_event(&mut self, event: ParticipantEvent) -> Result<()> {
        let new_state = match (self.state, event) {
            (ParticipantState::Incoming, ParticipantEvent::Answer) => ParticipantState::Connected,
            (ParticipantState::Incoming, ParticipantEvent::Reject(_)) => ParticipantState::Terminated,
            (ParticipantState::Incoming, ParticipantEvent::Hangup(_)) => ParticipantState::Terminated,
            (ParticipantState::Connected, ParticipantEvent::Hangup(_)) => ParticipantState::Terminated,
            _ => return Err(self.invalid_state()),
        };

        match event {
            ParticipantEvent::Answer => self.answered_at = Some(Utc::now()),
            ParticipantEvent::Reject(code) | ParticipantEvent::Hangup(code) => {
                self.final_status = Some(code);
                self.ended_at = Some(Utc::now());
                self.room = None;
            }
        }

        self.state = new_state;
        Ok(())
    }

    /// Ringing indication; only an undecided call can be alerted
    pub(crate) fn alert(&mut self) -> Result<bool> {
        if self.state != ParticipantState::Incoming {
            return Err(self.invalid_state());
        }
        let first = self.alerted_at.is_none();
        if first {
            self.alerted_at = Some(Utc::now());
        }
        Ok(first)
    }

    pub(crate) fn set_room(&mut self, room: Option<RoomId>) {
        self.room = room;
    }

    /// Record media confirmation; true only the first time
    pub(crate) fn confirm_media(&mut self) -> Result<bool> {
        match self.state {
            ParticipantState::Connected if !self.media_confirmed => {
                self.media_confirmed = true;
                Ok(true)
            }
            ParticipantState::Connected => Ok(false),
            _ => Err(self.invalid_state()),
        }
    }

    fn invalid_state(&self) -> DomainError {
        DomainError::InvalidState {
            handle: self.handle,
            state: self.state.name(),
        }
    }
}
