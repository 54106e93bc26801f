use serde::{Deserialize, Serialize};

/// Document verification state of a teacher account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Unverified,
    InProgress,
    Rejected,
    NotSubmitted,
}

impl VerificationStatus {
    /// Accepts the legacy spellings `unverfied` and `reject` still issued by
    /// older token endpoints.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "verified" => Some(VerificationStatus::Verified),
            "unverified" | "unverfied" => Some(VerificationStatus::Unverified),
            "in_progress" => Some(VerificationStatus::InProgress),
            "rejected" | "reject" => Some(VerificationStatus::Rejected),
            "not_submitted" => Some(VerificationStatus::NotSubmitted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::InProgress => "in_progress",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::NotSubmitted => "not_submitted",
        }
    }
}

impl Default for VerificationStatus {
    fn default() -> Self {
        VerificationStatus::NotSubmitted
    }
}
