use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use shared::{ChannelJoinPayload, ChannelTokenResponse, MeetingJoinPayload};
use std::fmt;

use crate::domain::value_objects::{MeetingRole, RtcUid};

/// Video provider a call is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Meeting SDK: signature based join, integer roles
    Zoom,
    /// RTC channel SDK: token based join, numeric uids
    Agora,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Zoom => f.write_str("zoom"),
            ProviderKind::Agora => f.write_str("agora"),
        }
    }
}

/// Credentials for joining a meeting SDK session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingCredential {
    pub signature: String,
    pub meeting_number: String,
    pub role: MeetingRole,
    pub user_name: String,
    pub sdk_key: String,
    pub password: Option<String>,
}

impl MeetingCredential {
    pub fn join_payload(&self) -> MeetingJoinPayload {
        MeetingJoinPayload {
            signature: self.signature.clone(),
            meeting_number: self.meeting_number.clone(),
            user_name: self.user_name.clone(),
            sdk_key: self.sdk_key.clone(),
            pass_word: self.password.clone().unwrap_or_default(),
        }
    }
}

/// Credentials for joining an RTC channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCredential {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    pub uid: RtcUid,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ChannelCredential {
    /// A response without `uid` gets the auto-assign uid, matching what the
    /// token endpoint signs for.
    pub fn from_response(response: ChannelTokenResponse) -> Self {
        Self {
            token: response.token,
            app_id: response.app_id,
            channel_name: response.channel_name,
            uid: response.uid.map(RtcUid::new).unwrap_or(RtcUid::AUTO_ASSIGN),
            expires_at: response
                .expire_at
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }
    }

    pub fn join_payload(&self) -> ChannelJoinPayload {
        ChannelJoinPayload {
            token: self.token.clone(),
            app_id: self.app_id.clone(),
            channel_name: self.channel_name.clone(),
            uid: self.uid.value(),
        }
    }
}

/// Short-lived, single-use join credentials for one call attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCredential {
    Meeting(MeetingCredential),
    Channel(ChannelCredential),
}

impl CallCredential {
    pub fn provider(&self) -> ProviderKind {
        match self {
            CallCredential::Meeting(_) => ProviderKind::Zoom,
            CallCredential::Channel(_) => ProviderKind::Agora,
        }
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        match self {
            CallCredential::Meeting(_) => None,
            CallCredential::Channel(c) => c.expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until().map(|until| now >= until).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(uid: Option<u32>) -> ChannelTokenResponse {
        ChannelTokenResponse {
            token: "t".into(),
            app_id: "a".into(),
            channel_name: "c".into(),
            uid,
            expire_at: Some(1_700_003_600),
        }
    }

    #[test]
    fn test_zero_uid_survives_into_join_payload() {
        let credential = ChannelCredential::from_response(response(Some(0)));
        let payload = credential.join_payload();
        assert_eq!(payload.uid, 0);
        assert_eq!(payload.token, "t");
        assert_eq!(payload.app_id, "a");
        assert_eq!(payload.channel_name, "c");
    }

    #[test]
    fn test_missing_uid_means_auto_assign() {
        let credential = ChannelCredential::from_response(response(None));
        assert!(credential.uid.is_auto_assign());
    }

    #[test]
    fn test_explicit_uid_kept() {
        let credential = ChannelCredential::from_response(response(Some(5150)));
        assert_eq!(credential.join_payload().uid, 5150);
    }

    #[test]
    fn test_channel_credential_expiry() {
        let credential = CallCredential::Channel(ChannelCredential::from_response(response(None)));
        let until = credential.valid_until().unwrap();
        assert!(credential.is_expired_at(until));
        assert!(!credential.is_expired_at(until - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_meeting_payload_defaults_empty_password() {
        let credential = MeetingCredential {
            signature: "sig".into(),
            meeting_number: "123".into(),
            role: MeetingRole::Host,
            user_name: "Kim".into(),
            sdk_key: "key".into(),
            password: None,
        };
        assert_eq!(credential.join_payload().pass_word, "");
        assert_eq!(
            CallCredential::Meeting(credential).provider(),
            ProviderKind::Zoom
        );
    }
}
