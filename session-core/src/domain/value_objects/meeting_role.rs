use serde::{Deserialize, Serialize};

/// Role inside a meeting SDK session. The SDK wants it as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeetingRole {
    #[default]
    Participant,
    Host,
}

impl MeetingRole {
    pub fn as_wire(&self) -> u8 {
        match self {
            MeetingRole::Participant => 0,
            MeetingRole::Host => 1,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(MeetingRole::Participant),
            1 => Some(MeetingRole::Host),
            _ => None,
        }
    }
}
