//! Hook capabilities an extension unit may implement

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One optional hook of the extension surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    OnLoad,
    ProvideRoute,
    OnIncomingParticipant,
    OnDtmfEvent,
    OnParticipantConnectedConfirmed,
    OnParticipantTerminated,
    OnParticipantDestroyed,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::OnLoad,
        Capability::ProvideRoute,
        Capability::OnIncomingParticipant,
        Capability::OnDtmfEvent,
        Capability::OnParticipantConnectedConfirmed,
        Capability::OnParticipantTerminated,
        Capability::OnParticipantDestroyed,
    ];

    pub fn hook_name(&self) -> &'static str {
        match self {
            Capability::OnLoad => "on_load",
            Capability::ProvideRoute => "provide_route",
            Capability::OnIncomingParticipant => "on_incoming_participant",
            Capability::OnDtmfEvent => "on_dtmf_event",
            Capability::OnParticipantConnectedConfirmed => "on_participant_connected_confirmed",
            Capability::OnParticipantTerminated => "on_participant_terminated",
            Capability::OnParticipantDestroyed => "on_participant_destroyed",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

/// Hooks a unit implements, recorded once at load time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|c| c.hook_name()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_set() {
        let caps = CapabilitySet::empty()
            .with(Capability::ProvideRoute)
            .with(Capability::OnLoad);
        assert!(caps.contains(Capability::OnLoad));
        assert!(!caps.contains(Capability::OnDtmfEvent));
        assert_eq!(caps.to_string(), "[on_load, provide_route]");

        let all: CapabilitySet = Capability::ALL.into_iter().collect();
        assert_eq!(all.iter().count(), 7);
        assert_eq!(
            Capability::OnParticipantDestroyed.to_string(),
            "on_participant_destroyed"
        );
    }
}
