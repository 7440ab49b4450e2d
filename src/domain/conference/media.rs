//! Media-resource participants (tone / prompt injection into a room)

use crate::domain::shared::RoomId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What to play into the room, e.g. `tone:dialtone` or `file:///prompts/welcome.wav`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaResourceDescriptor {
    pub media_url: String,
    /// Stop after this long; `None` plays to completion
    pub duration_ms: Option<u64>,
}

impl MediaResourceDescriptor {
    pub fn new(media_url: impl Into<String>) -> Self {
        Self {
            media_url: media_url.into(),
            duration_ms: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Underlying media stack, as far as media resources are concerned
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStack: Send + Sync {
    /// Whether media-resource participants can be created at all
    fn supports_media_resources(&self) -> bool;

    /// Start playing `descriptor` into `room`
    async fn start_media_resource(
        &self,
        room: RoomId,
        descriptor: &MediaResourceDescriptor,
    ) -> Result<(), String>;

    /// Stop what `start_media_resource` began playing from `media_url`
    async fn stop_media_resource(&self, room: RoomId, media_url: &str) -> Result<(), String>;
}

/// Media stack that only logs, for deployments without a mixer
pub struct LoggingMediaStack;

#[async_trait]
impl MediaStack for LoggingMediaStack {
    fn supports_media_resources(&self) -> bool {
        true
    }

    async fn start_media_resource(
        &self,
        room: RoomId,
        descriptor: &MediaResourceDescriptor,
    ) -> Result<(), String> {
        tracing::info!("Playing {} into room {}", descriptor.media_url, room);
        Ok(())
    }

    async fn stop_media_resource(&self, room: RoomId, media_url: &str) -> Result<(), String> {
        tracing::info!("Stopped {} in room {}", media_url, room);
        Ok(())
    }
}
