use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric participant id of the RTC channel provider.
///
/// `0` is a real value: it asks the provider to assign an id on join.
/// Absence of credentials is modelled by the call-config slot, never by a uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtcUid(u32);

impl RtcUid {
    pub const AUTO_ASSIGN: RtcUid = RtcUid(0);

    pub fn new(uid: u32) -> Self {
        Self(uid)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_auto_assign(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RtcUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
