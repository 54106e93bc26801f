use serde::{Deserialize, Serialize};

/// Claims carried in the `access_token` payload, exactly as the backend
/// issues them. Validation and mapping to domain types happens in the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(default)]
    pub token_type: Option<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub jti: Option<String>,
    pub user_id: SubjectId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
    pub role: String,
    #[serde(default)]
    pub verification_status: Option<String>,
    #[serde(default)]
    pub subscription_type: Option<String>,
}

/// `user_id` is a string on newer backends and an integer primary key on
/// older ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    Text(String),
    Number(i64),
}

impl SubjectId {
    pub fn into_string(self) -> String {
        match self {
            SubjectId::Text(s) => s,
            SubjectId::Number(n) => n.to_string(),
        }
    }
}

/// Body of `POST /api/video/signature`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    pub meeting_number: String,
    pub role: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub signature: String,
}

/// Response of `GET /teacher/d/generate-token/{booking_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTokenResponse {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub expire_at: Option<i64>,
}

/// Error bodies produced by the backend. DRF uses `detail`, the hand written
/// views use `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl BackendErrorBody {
    pub fn message(&self) -> Option<&str> {
        self.error.as_deref().or(self.detail.as_deref())
    }
}

/// Authentication payload sent in the push connection handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeAuth {
    pub access_token: String,
}

/// Join payload of the meeting SDK (provider A)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingJoinPayload {
    pub signature: String,
    pub meeting_number: String,
    pub user_name: String,
    pub sdk_key: String,
    pub pass_word: String,
}

/// Join payload of the RTC channel SDK (provider B).
///
/// `uid` 0 asks the provider to assign an id and is sent as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelJoinPayload {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    pub uid: u32,
}
