//! Domain errors

use super::value_objects::{ParticipantHandle, RoomId};
use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid state: participant {handle} is {state}")]
    InvalidState {
        handle: ParticipantHandle,
        state: &'static str,
    },

    #[error("Participant {handle} is already a member of room {room}")]
    AlreadyMember {
        handle: ParticipantHandle,
        room: RoomId,
    },

    #[error("Participant {handle} is not a member of room {room}")]
    NotMember {
        handle: ParticipantHandle,
        room: RoomId,
    },

    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantHandle),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Media stack error: {0}")]
    Media(String),

    #[error("Invalid status code {0}, expected 300..=699")]
    InvalidStatusCode(u16),

    #[error("Fork decision without targets")]
    EmptyForkList,

    #[error("Extension fault in {unit}::{hook}: {message}")]
    ExtensionFault {
        unit: String,
        hook: &'static str,
        message: String,
    },

    #[error("Extension {unit}::{hook} timed out after {after_ms}ms")]
    Timeout {
        unit: String,
        hook: &'static str,
        after_ms: u64,
    },

    #[error("Unknown extension unit kind: {0}")]
    UnknownUnitKind(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl DomainError {
    /// Short machine-friendly name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::InvalidState { .. } => "invalid_state",
            DomainError::AlreadyMember { .. } => "already_member",
            DomainError::NotMember { .. } => "not_member",
            DomainError::RoomNotFound(_) => "room_not_found",
            DomainError::ParticipantNotFound(_) => "participant_not_found",
            DomainError::Unsupported(_) => "unsupported",
            DomainError::Media(_) => "media",
            DomainError::InvalidStatusCode(_) => "invalid_status_code",
            DomainError::EmptyForkList => "empty_fork_list",
            DomainError::ExtensionFault { .. } => "extension_fault",
            DomainError::Timeout { .. } => "timeout",
            DomainError::UnknownUnitKind(_) => "unknown_unit_kind",
            DomainError::Validation(_) => "validation",
        }
    }
}
