//! Conference bounded context
//!
//! Rooms, participants and the events the engine reports about them.

pub mod controller;
pub mod dtmf;
pub mod media;
pub mod participant;
pub mod room;

pub use controller::ConferenceController;
pub use dtmf::{DtmfEdge, DtmfEvent};
pub use media::{LoggingMediaStack, MediaResourceDescriptor, MediaStack};
pub use participant::{Participant, ParticipantEvent, ParticipantState};
pub use room::Room;
