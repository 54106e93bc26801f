use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use shared::AccessTokenClaims;
use thiserror::Error;

use crate::domain::value_objects::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("unknown verification status: {0}")]
    UnknownVerificationStatus(String),
    #[error("unknown subscription type: {0}")]
    UnknownSubscription(String),
    #[error("unknown token type: {0}")]
    UnknownTokenType(String),
    #[error("{0} is not a valid timestamp: {1}")]
    InvalidTimestamp(&'static str, i64),
}

/// Claims of the current access token. Derived from the token on demand and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedClaims {
    pub token_type: TokenType,
    pub jti: Option<String>,
    pub user_id: UserId,
    pub username: Option<String>,
    pub full_name: Option<DisplayName>,
    pub email: Option<Email>,
    pub profile_pic: Option<String>,
    pub role: UserRole,
    pub verification_status: VerificationStatus,
    pub subscription: Option<SubscriptionTier>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DecodedClaims {
    pub fn from_wire(wire: AccessTokenClaims) -> Result<Self, ClaimsError> {
        let role = UserRole::parse(&wire.role).ok_or(ClaimsError::UnknownRole(wire.role))?;

        let verification_status = match wire.verification_status {
            Some(status) => VerificationStatus::parse(&status)
                .ok_or(ClaimsError::UnknownVerificationStatus(status))?,
            None => VerificationStatus::default(),
        };

        let subscription = match wire.subscription_type {
            Some(tier) => {
                Some(SubscriptionTier::parse(&tier).ok_or(ClaimsError::UnknownSubscription(tier))?)
            }
            None => None,
        };

        let token_type = match wire.token_type.as_deref() {
            None | Some("access") => TokenType::Access,
            Some("refresh") => TokenType::Refresh,
            Some(other) => return Err(ClaimsError::UnknownTokenType(other.to_string())),
        };

        let issued_at = Utc
            .timestamp_opt(wire.iat, 0)
            .single()
            .ok_or(ClaimsError::InvalidTimestamp("iat", wire.iat))?;
        let expires_at = Utc
            .timestamp_opt(wire.exp, 0)
            .single()
            .ok_or(ClaimsError::InvalidTimestamp("exp", wire.exp))?;

        Ok(Self {
            token_type,
            jti: wire.jti,
            user_id: UserId::from_subject(wire.user_id),
            username: wire.username,
            full_name: wire.full_name.as_deref().and_then(DisplayName::parse),
            email: wire.email.as_deref().and_then(Email::parse),
            profile_pic: wire.profile_pic.filter(|p| !p.is_empty()),
            role,
            verification_status,
            subscription,
            issued_at,
            expires_at,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Full name, falling back to the username and then the subject id
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.full_name {
            return name.to_string();
        }
        match &self.username {
            Some(username) if !username.is_empty() => username.clone(),
            _ => self.user_id.to_string(),
        }
    }
}
