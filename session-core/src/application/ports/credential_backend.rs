use async_trait::async_trait;
use shared::{ChannelTokenResponse, SignatureRequest, SignatureResponse};

use crate::error::NetworkError;

/// Trusted backend that mints short-lived call credentials.
///
/// `bearer` is the stored access token, attached when present.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    async fn request_join_signature(
        &self,
        bearer: Option<String>,
        request: SignatureRequest,
    ) -> Result<SignatureResponse, NetworkError>;

    async fn request_channel_token(
        &self,
        bearer: Option<String>,
        booking_id: String,
    ) -> Result<ChannelTokenResponse, NetworkError>;
}
