/// Conference room
use crate::domain::shared::RoomId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conference room.
///
/// Created on first lookup by name and kept for the life of the process;
/// the id issued for a name never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RoomId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
