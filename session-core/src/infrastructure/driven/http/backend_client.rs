//! reqwest client for the credential endpoints of the backend.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use shared::{
    BackendErrorBody, ChannelTokenResponse, SignatureRequest, SignatureResponse,
};
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::ports::CredentialBackend;
use crate::error::NetworkError;

const SIGNATURE_PATH: &str = "api/video/signature";
const CHANNEL_TOKEN_PATH: &str = "teacher/d/generate-token";

#[derive(Clone)]
pub struct HttpCredentialBackend {
    base: String,
    client: Client,
    timeout: Duration,
}

impl HttpCredentialBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NetworkError> {
        Url::parse(base_url).map_err(|e| NetworkError::Transport(format!("invalid base url: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, NetworkError> {
        let raw = format!("{}/{}", self.base, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| NetworkError::Transport(format!("invalid url {}: {}", raw, e)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        bearer: Option<String>,
    ) -> Result<T, NetworkError> {
        let request = match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "backend response");

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| NetworkError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<BackendErrorBody>(&body)
            .ok()
            .and_then(|b| b.message().map(str::to_string))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            });
        warn!(status = status.as_u16(), %message, "backend refused credential request");

        if status.is_server_error() {
            Err(NetworkError::Server {
                status: status.as_u16(),
                message,
            })
        } else {
            Err(NetworkError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn map_error(&self, error: reqwest::Error) -> NetworkError {
        if error.is_timeout() {
            NetworkError::Timeout(self.timeout)
        } else {
            NetworkError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl CredentialBackend for HttpCredentialBackend {
    async fn request_join_signature(
        &self,
        bearer: Option<String>,
        request: SignatureRequest,
    ) -> Result<SignatureResponse, NetworkError> {
        let url = self.endpoint(SIGNATURE_PATH)?;
        self.send(self.client.post(url).json(&request), bearer).await
    }

    async fn request_channel_token(
        &self,
        bearer: Option<String>,
        booking_id: String,
    ) -> Result<ChannelTokenResponse, NetworkError> {
        let mut url = self.endpoint(CHANNEL_TOKEN_PATH)?;
        url.path_segments_mut()
            .map_err(|_| NetworkError::Transport("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(&booking_id);
        self.send(self.client.get(url), bearer).await
    }
}
