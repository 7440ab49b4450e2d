/// Conference Controller
///
/// Owns the room registry and the participant table. Rooms are looked up
/// or created by name; participants move through the state machine in
/// `participant.rs` as the extension answers, rejects or the call ends.
///
/// There is no lock spanning unrelated entities: the registries are sharded
/// maps, each participant has its own mutex and each room guards only its
/// membership set. When both are needed the participant lock is taken first.
use super::media::{MediaResourceDescriptor, MediaStack};
use super::participant::{Participant, ParticipantEvent, ParticipantState};
use super::room::Room;
use crate::domain::shared::{DomainError, ParticipantHandle, Result, RoomId};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Final status when an undecided call is destroyed
pub const DESTROY_INCOMING_STATUS: u16 = 480;
/// Final status when an answered call is destroyed
const DESTROY_CONNECTED_STATUS: u16 = 200;

struct RoomEntry {
    room: Room,
    members: Mutex<BTreeSet<ParticipantHandle>>,
}

impl RoomEntry {
    fn new(room: Room) -> Self {
        Self {
            room,
            members: Mutex::new(BTreeSet::new()),
        }
    }
}

/// Conference controller shared by the engine and extension hooks
pub struct ConferenceController {
    /// room name -> room
    rooms_by_name: DashMap<String, Arc<RoomEntry>>,
    /// room id -> room
    rooms: DashMap<RoomId, Arc<RoomEntry>>,
    /// handle -> participant
    participants: DashMap<ParticipantHandle, Arc<Mutex<Participant>>>,
    /// Last handle issued
    last_handle: AtomicU64,
    media: Option<Arc<dyn MediaStack>>,
    /// Handles destroyed since the engine last drained them
    destroyed: Mutex<Vec<ParticipantHandle>>,
}

impl ConferenceController {
    /// Controller without media-resource support
    pub fn new() -> Self {
        Self {
            rooms_by_name: DashMap::new(),
            rooms: DashMap::new(),
            participants: DashMap::new(),
            last_handle: AtomicU64::new(0),
            media: None,
            destroyed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_media_stack(mut self, media: Arc<dyn MediaStack>) -> Self {
        self.media = Some(media);
        self
    }

    /// Get the room called `name`, creating it on first use.
    ///
    /// Racing callers for the same name all observe one creation and one id.
    pub fn get_or_create_room(&self, name: &str) -> RoomId {
        if let Some(entry) = self.rooms_by_name.get(name) {
            return entry.room.id;
        }

        match self.rooms_by_name.entry(name.to_string()) {
            Entry::Occupied(existing) => existing.get().room.id,
            Entry::Vacant(vacant) => {
                let entry = Arc::new(RoomEntry::new(Room::new(name)));
                let room_id = entry.room.id;
                // Publish by id before the name so a racer that sees the name can resolve the id
                self.rooms.insert(room_id, entry.clone());
                vacant.insert(entry);
                info!("Created conference room {} ({})", name, room_id);
                room_id
            }
        }
    }

    pub fn room(&self, room_id: RoomId) -> Option<Room> {
        self.rooms.get(&room_id).map(|entry| entry.room.clone())
    }

    pub fn room_by_name(&self, name: &str) -> Option<Room> {
        self.rooms_by_name.get(name).map(|entry| entry.room.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Current members of a room, in handle order
    pub async fn members(&self, room_id: RoomId) -> Result<Vec<ParticipantHandle>> {
        let room = self.room_entry(room_id)?;
        let members = room.members.lock().await;
        Ok(members.iter().copied().collect())
    }

    /// Participants with a live record, media resources included
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Register a newly arrived call leg in `Incoming` state
    pub fn create_participant(&self, request_uri: impl Into<String>) -> ParticipantHandle {
        let handle = self.issue_handle();
        self.participants
            .insert(handle, Arc::new(Mutex::new(Participant::new(handle, request_uri))));
        debug!("Created participant {}", handle);
        handle
    }

    pub async fn participant_state(&self, handle: ParticipantHandle) -> Result<ParticipantState> {
        let participant = self.participant(handle)?;
        let state = participant.lock().await.state();
        Ok(state)
    }

    /// Final status recorded by a rejection or hangup
    pub async fn final_status(&self, handle: ParticipantHandle) -> Result<Option<u16>> {
        let participant = self.participant(handle)?;
        let status = participant.lock().await.final_status();
        Ok(status)
    }

    /// Room the participant currently belongs to
    pub async fn room_of(&self, handle: ParticipantHandle) -> Result<Option<RoomId>> {
        let participant = self.participant(handle)?;
        let room = participant.lock().await.room();
        Ok(room)
    }

    /// Add a participant to a room; a participant belongs to at most one room
    pub async fn add_participant(&self, room_id: RoomId, handle: ParticipantHandle) -> Result<()> {
        let room = self.room_entry(room_id)?;
        let participant = self.participant(handle)?;

        let mut participant = participant.lock().await;
        participant.ensure_active()?;
        if let Some(current) = participant.room() {
            return Err(DomainError::AlreadyMember {
                handle,
                room: current,
            });
        }

        room.members.lock().await.insert(handle);
        participant.set_room(Some(room_id));
        info!("Participant {} joined room {}", handle, room.room.name);
        Ok(())
    }

    pub async fn remove_participant(&self, room_id: RoomId, handle: ParticipantHandle) -> Result<()> {
        let room = self.room_entry(room_id)?;
        let participant = self.participant(handle)?;

        let mut participant = participant.lock().await;
        participant.ensure_active()?;
        if participant.room() != Some(room_id) {
            return Err(DomainError::NotMember {
                handle,
                room: room_id,
            });
        }

        room.members.lock().await.remove(&handle);
        participant.set_room(None);
        info!("Participant {} left room {}", handle, room.room.name);
        Ok(())
    }

    pub async fn move_participant(
        &self,
        handle: ParticipantHandle,
        from: RoomId,
        to: RoomId,
    ) -> Result<()> {
        let source = self.room_entry(from)?;
        let destination = self.room_entry(to)?;
        let participant = self.participant(handle)?;

        let mut participant = participant.lock().await;
        participant.ensure_active()?;
        if participant.room() != Some(from) {
            return Err(DomainError::NotMember { handle, room: from });
        }
        if from == to {
            return Ok(());
        }

        source.members.lock().await.remove(&handle);
        destination.members.lock().await.insert(handle);
        participant.set_room(Some(to));
        info!(
            "Participant {} moved from room {} to room {}",
            handle, source.room.name, destination.room.name
        );
        Ok(())
    }

    /// Ring an incoming participant without deciding it.
    ///
    /// Legal only while `Incoming`; repeating it is a no-op.
    pub async fn alert_participant(&self, handle: ParticipantHandle) -> Result<()> {
        let participant = self.participant(handle)?;
        if participant.lock().await.alert()? {
            info!("Participant {} alerted", handle);
        }
        Ok(())
    }

    /// Answer an incoming participant
    pub async fn answer_participant(&self, handle: ParticipantHandle) -> Result<()> {
        let participant = self.participant(handle)?;
        participant.lock().await.process_event(ParticipantEvent::Answer)?;
        info!("Participant {} answered", handle);
        Ok(())
    }

    /// Reject an incoming participant; the engine sends `status_code` as final response
    pub async fn reject_participant(&self, handle: ParticipantHandle, status_code: u16) -> Result<()> {
        if !(300..=699).contains(&status_code) {
            return Err(DomainError::InvalidStatusCode(status_code));
        }
        self.end_participant(handle, ParticipantEvent::Reject(status_code)).await?;
        info!("Participant {} rejected with {}", handle, status_code);
        Ok(())
    }

    /// Engine-side hangup; legal from any state but `Terminated`
    pub async fn terminate_participant(&self, handle: ParticipantHandle, status_code: u16) -> Result<()> {
        self.end_participant(handle, ParticipantEvent::Hangup(status_code)).await?;
        info!("Participant {} terminated with {}", handle, status_code);
        Ok(())
    }

    /// Drop the record of a participant. Later use of the handle is `InvalidState`.
    pub async fn release_participant(&self, handle: ParticipantHandle) -> Result<()> {
        let participant = self.participant(handle)?;
        let room = participant.lock().await.room();
        if let Some(room_id) = room {
            warn!("Releasing participant {} still in room {}", handle, room_id);
            self.leave_room(room_id, handle).await;
        }
        self.forget(handle).await;
        debug!("Released participant {}", handle);
        Ok(())
    }

    /// End a participant from extension logic and drop its record.
    ///
    /// An undecided call is rejected, an answered one hung up and a media
    /// resource stopped. Destroying an already terminated participant only
    /// drops the record.
    pub async fn destroy_participant(&self, handle: ParticipantHandle) -> Result<()> {
        let participant = self.participant(handle)?;
        let (room, media_url) = {
            let mut participant = participant.lock().await;
            let room = participant.room();
            match participant.state() {
                ParticipantState::Incoming => participant
                    .process_event(ParticipantEvent::Reject(DESTROY_INCOMING_STATUS))?,
                ParticipantState::Connected => participant
                    .process_event(ParticipantEvent::Hangup(DESTROY_CONNECTED_STATUS))?,
                ParticipantState::Terminated => {}
            }
            if let Some(room_id) = room {
                self.leave_room(room_id, handle).await;
            }
            let media_url = participant
                .is_media_resource()
                .then(|| participant.request_uri().to_string());
            (room, media_url)
        };

        if let (Some(room_id), Some(media_url), Some(media)) = (room, media_url, &self.media) {
            if let Err(err) = media.stop_media_resource(room_id, &media_url).await {
                warn!("Stopping media resource {} failed: {}", handle, err);
            }
        }
        self.forget(handle).await;
        info!("Participant {} destroyed", handle);
        Ok(())
    }

    /// Destroy every timed media resource whose duration has run out
    pub async fn expire_media_resources(&self) -> Vec<ParticipantHandle> {
        let candidates: Vec<(ParticipantHandle, Arc<Mutex<Participant>>)> = self
            .participants
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let now = Utc::now();
        let mut expired = Vec::new();
        for (handle, participant) in candidates {
            if !participant.lock().await.is_expired(now) {
                continue;
            }
            match self.destroy_participant(handle).await {
                Ok(()) => expired.push(handle),
                Err(err) => debug!("Media resource {} already gone: {}", handle, err),
            }
        }
        expired
    }

    /// Handles destroyed or released since the last call, oldest first
    pub async fn take_destroyed(&self) -> Vec<ParticipantHandle> {
        std::mem::take(&mut *self.destroyed.lock().await)
    }

    /// Record that media is flowing. Returns true the first time only.
    pub async fn confirm_connected(&self, handle: ParticipantHandle) -> Result<bool> {
        let participant = self.participant(handle)?;
        let first = participant.lock().await.confirm_media()?;
        Ok(first)
    }

    /// Inject a tone or prompt into a room as a pseudo-participant
    pub async fn create_media_resource_participant(
        &self,
        room_id: RoomId,
        descriptor: MediaResourceDescriptor,
    ) -> Result<ParticipantHandle> {
        let media = self
            .media
            .as_ref()
            .filter(|media| media.supports_media_resources())
            .ok_or_else(|| {
                DomainError::Unsupported("media resource participants".to_string())
            })?;
        let room = self.room_entry(room_id)?;

        media
            .start_media_resource(room_id, &descriptor)
            .await
            .map_err(DomainError::Media)?;

        let handle = self.issue_handle();
        let mut participant = Participant::media_resource(
            handle,
            descriptor.media_url.clone(),
            descriptor.duration_ms,
        );
        participant.set_room(Some(room_id));
        self.participants.insert(handle, Arc::new(Mutex::new(participant)));
        room.members.lock().await.insert(handle);

        info!(
            "Media resource {} playing into room {} as participant {}",
            descriptor.media_url, room.room.name, handle
        );
        Ok(handle)
    }

    fn issue_handle(&self) -> ParticipantHandle {
        ParticipantHandle::from_raw(self.last_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn room_entry(&self, room_id: RoomId) -> Result<Arc<RoomEntry>> {
        self.rooms
            .get(&room_id)
            .map(|entry| entry.value().clone())
            .ok_or(DomainError::RoomNotFound(room_id))
    }

    fn participant(&self, handle: ParticipantHandle) -> Result<Arc<Mutex<Participant>>> {
        if let Some(participant) = self.participants.get(&handle) {
            return Ok(participant.value().clone());
        }
        let raw = handle.as_raw();
        if raw != 0 && raw <= self.last_handle.load(Ordering::SeqCst) {
            // Issued earlier and since released
            Err(DomainError::InvalidState {
                handle,
                state: ParticipantState::Terminated.name(),
            })
        } else {
            Err(DomainError::ParticipantNotFound(handle))
        }
    }

    async fn end_participant(&self, handle: ParticipantHandle, event: ParticipantEvent) -> Result<()> {
        let participant = self.participant(handle)?;
        let mut participant = participant.lock().await;
        let room = participant.room();
        participant.process_event(event)?;

        if let Some(room_id) = room {
            self.leave_room(room_id, handle).await;
        }
        Ok(())
    }

    async fn leave_room(&self, room_id: RoomId, handle: ParticipantHandle) {
        if let Ok(room) = self.room_entry(room_id) {
            room.members.lock().await.remove(&handle);
        }
    }

    async fn forget(&self, handle: ParticipantHandle) {
        if self.participants.remove(&handle).is_some() {
            self.destroyed.lock().await.push(handle);
        }
    }
}

impl Default for ConferenceController {
    fn default() -> Self {
        Self::new()
    }
}
