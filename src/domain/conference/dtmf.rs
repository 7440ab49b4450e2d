/// DTMF events reported by the media stack for one participant
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key-down or key-up edge of a tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtmfEdge {
    Down,
    Up,
}

impl DtmfEdge {
    /// Map the engine's `up` flag
    pub fn from_up(up: bool) -> Self {
        if up {
            DtmfEdge::Up
        } else {
            DtmfEdge::Down
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, DtmfEdge::Up)
    }
}

/// One DTMF edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtmfEvent {
    /// RFC 4733 event code: 0-9, 10 = '*', 11 = '#', 12-15 = A-D
    pub digit: i32,
    pub duration_ms: i32,
    pub edge: DtmfEdge,
}

impl DtmfEvent {
    pub fn new(digit: i32, duration_ms: i32, edge: DtmfEdge) -> Self {
        Self {
            digit,
            duration_ms,
            edge,
        }
    }

    pub fn down(digit: i32, duration_ms: i32) -> Self {
        Self::new(digit, duration_ms, DtmfEdge::Down)
    }

    pub fn up(digit: i32, duration_ms: i32) -> Self {
        Self::new(digit, duration_ms, DtmfEdge::Up)
    }

    /// Keypad character for the event code, if it has one
    pub fn to_char(&self) -> Option<char> {
        match self.digit {
            0..=9 => char::from_digit(self.digit as u32, 10),
            10 => Some('*'),
            11 => Some('#'),
            12 => Some('A'),
            13 => Some('B'),
            14 => Some('C'),
            15 => Some('D'),
            _ => None,
        }
    }
}

impl fmt::Display for DtmfEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_char() {
            Some(c) => write!(f, "{}", c)?,
            None => write!(f, "#{}", self.digit)?,
        }
        write!(f, " {:?} {}ms", self.edge, self.duration_ms)
    }
}
