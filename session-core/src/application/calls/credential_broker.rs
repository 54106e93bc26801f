//! Exchanges a call identifier for short-lived join credentials.
//!
//! No caching and no retries: every attempt asks the backend again.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shared::SignatureRequest;

use super::call_config::CallConfigStore;
use crate::application::auth::TokenStore;
use crate::application::ports::CredentialBackend;
use crate::domain::aggregates::CallAttemptId;
use crate::domain::entities::{CallCredential, ChannelCredential, MeetingCredential, ProviderKind};
use crate::domain::value_objects::MeetingRole;
use crate::error::NetworkError;

/// What to fetch credentials for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallConfigRequest {
    /// Meeting SDK session
    Meeting {
        meeting_number: String,
        role: MeetingRole,
        user_name: String,
        password: Option<String>,
    },
    /// RTC channel for a booking
    Channel { booking_id: String },
}

impl CallConfigRequest {
    pub fn provider(&self) -> ProviderKind {
        match self {
            CallConfigRequest::Meeting { .. } => ProviderKind::Zoom,
            CallConfigRequest::Channel { .. } => ProviderKind::Agora,
        }
    }
}

pub struct CallCredentialBroker {
    backend: Arc<dyn CredentialBackend>,
    tokens: TokenStore,
    slot: CallConfigStore,
    request_timeout: Duration,
    meeting_sdk_key: String,
}

impl CallCredentialBroker {
    pub fn new(backend: Arc<dyn CredentialBackend>, tokens: TokenStore, slot: CallConfigStore) -> Self {
        Self {
            backend,
            tokens,
            slot,
            request_timeout: Duration::from_secs(10),
            meeting_sdk_key: String::new(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_meeting_sdk_key(mut self, key: impl Into<String>) -> Self {
        self.meeting_sdk_key = key.into();
        self
    }

    pub fn slot(&self) -> &CallConfigStore {
        &self.slot
    }

    /// Signature for joining `meeting_number` with `role`
    pub async fn request_join_signature(
        &self,
        meeting_number: &str,
        role: MeetingRole,
    ) -> Result<String, NetworkError> {
        let request = SignatureRequest {
            meeting_number: meeting_number.to_string(),
            role: role.as_wire(),
        };
        let response = timeout(
            self.request_timeout,
            self.backend
                .request_join_signature(self.tokens.access_token(), request),
        )
        .await
        .map_err(|_| NetworkError::Timeout(self.request_timeout))??;

        if response.signature.is_empty() {
            return Err(NetworkError::InvalidResponse("empty signature".to_string()));
        }
        Ok(response.signature)
    }

    /// Fetch credentials for `attempt` and publish them in the call-config
    /// slot.
    ///
    /// A response arriving after `liveness` was cancelled, or after another
    /// attempt claimed the slot, is discarded and reported as
    /// [`NetworkError::Cancelled`].
    pub async fn request_call_config(
        &self,
        request: CallConfigRequest,
        attempt: &CallAttemptId,
        liveness: &CancellationToken,
    ) -> Result<CallCredential, NetworkError> {
        self.slot.begin(attempt.clone());

        let fetched = tokio::select! {
            _ = liveness.cancelled() => Err(NetworkError::Cancelled),
            result = self.fetch(request) => result,
        };

        let credential = match fetched {
            Ok(credential) => credential,
            Err(e) => {
                self.slot.abandon(attempt);
                if !matches!(e, NetworkError::Cancelled) {
                    warn!(%attempt, error = %e, "credential request failed");
                }
                return Err(e);
            }
        };

        if liveness.is_cancelled() {
            debug!(%attempt, "discarding credentials for cancelled attempt");
            self.slot.abandon(attempt);
            return Err(NetworkError::Cancelled);
        }
        if !self.slot.fulfil(attempt, credential.clone()) {
            debug!(%attempt, "discarding credentials for superseded attempt");
            return Err(NetworkError::Cancelled);
        }

        info!(%attempt, provider = %credential.provider(), "call credentials ready");
        Ok(credential)
    }

    async fn fetch(&self, request: CallConfigRequest) -> Result<CallCredential, NetworkError> {
        match request {
            CallConfigRequest::Meeting {
                meeting_number,
                role,
                user_name,
                password,
            } => {
                let signature = self.request_join_signature(&meeting_number, role).await?;
                Ok(CallCredential::Meeting(MeetingCredential {
                    signature,
                    meeting_number,
                    role,
                    user_name,
                    sdk_key: self.meeting_sdk_key.clone(),
                    password,
                }))
            }
            CallConfigRequest::Channel { booking_id } => {
                let response = timeout(
                    self.request_timeout,
                    self.backend
                        .request_channel_token(self.tokens.access_token(), booking_id),
                )
                .await
                .map_err(|_| NetworkError::Timeout(self.request_timeout))??;

                if response.token.is_empty() || response.channel_name.is_empty() {
                    return Err(NetworkError::InvalidResponse(
                        "channel token response is missing fields".to_string(),
                    ));
                }
                Ok(CallCredential::Channel(ChannelCredential::from_response(
                    response,
                )))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::SlowBackend;
    use super::*;
    use crate::application::auth::AuthEventBus;
    use crate::application::calls::call_config::CallConfigSlot;
    use crate::application::ports::credential_backend::MockCredentialBackend;
    use crate::infrastructure::driven::storage::MemoryCookieJar;
    use shared::{ChannelTokenResponse, SignatureResponse};

    fn tokens() -> TokenStore {
        TokenStore::new(Arc::new(MemoryCookieJar::new()), AuthEventBus::new())
    }

    fn broker(backend: Arc<dyn CredentialBackend>, tokens: TokenStore) -> CallCredentialBroker {
        CallCredentialBroker::new(backend, tokens, CallConfigStore::new())
            .with_request_timeout(Duration::from_millis(200))
            .with_meeting_sdk_key("sdk-key")
    }

    fn channel_request() -> CallConfigRequest {
        CallConfigRequest::Channel {
            booking_id: "42".to_string(),
        }
    }

    #[tokio::test]
    async fn test_signature_request_sends_bearer_and_role() {
        let tokens = tokens();
        tokens.login("bearer-1");

        let mut backend = MockCredentialBackend::new();
        backend
            .expect_request_join_signature()
            .withf(|bearer, request| {
                bearer.as_deref() == Some("bearer-1")
                    && request.meeting_number == "8812345"
                    && request.role == 0
            })
            .times(1)
            .returning(|_, _| {
                Ok(SignatureResponse {
                    signature: "signed".to_string(),
                })
            });

        let broker = broker(Arc::new(backend), tokens);
        let signature = broker
            .request_join_signature("8812345", MeetingRole::Participant)
            .await
            .unwrap();
        assert_eq!(signature, "signed");
    }

    #[tokio::test]
    async fn test_rejection_surfaces_network_error() {
        let mut backend = MockCredentialBackend::new();
        backend.expect_request_join_signature().returning(|_, _| {
            Err(NetworkError::Rejected {
                status: 403,
                message: "not a participant".to_string(),
            })
        });

        let broker = broker(Arc::new(backend), tokens());
        let err = broker
            .request_join_signature("1", MeetingRole::Host)
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_call_config_fills_slot() {
        let mut backend = MockCredentialBackend::new();
        backend
            .expect_request_channel_token()
            .withf(|bearer, booking| bearer.is_none() && booking == "42")
            .returning(|_, _| {
                Ok(ChannelTokenResponse {
                    token: "t".to_string(),
                    app_id: "a".to_string(),
                    channel_name: "c".to_string(),
                    uid: Some(0),
                    expire_at: None,
                })
            });

        let broker = broker(Arc::new(backend), tokens());
        let attempt = CallAttemptId::generate();
        let credential = broker
            .request_call_config(channel_request(), &attempt, &CancellationToken::new())
            .await
            .unwrap();

        match &credential {
            CallCredential::Channel(channel) => assert_eq!(channel.join_payload().uid, 0),
            other => panic!("unexpected credential: {:?}", other),
        }
        assert_eq!(broker.slot().credential(), Some(credential));
    }

    #[tokio::test]
    async fn test_meeting_config_uses_signature_and_sdk_key() {
        let backend = SlowBackend::new(Duration::ZERO);
        let broker = broker(backend, tokens());

        let credential = broker
            .request_call_config(
                CallConfigRequest::Meeting {
                    meeting_number: "777".to_string(),
                    role: MeetingRole::Host,
                    user_name: "Sam".to_string(),
                    password: None,
                },
                &CallAttemptId::generate(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        match credential {
            CallCredential::Meeting(meeting) => {
                assert_eq!(meeting.signature, "sig-777-1");
                assert_eq!(meeting.sdk_key, "sdk-key");
                assert_eq!(meeting.join_payload().user_name, "Sam");
            }
            other => panic!("unexpected credential: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = SlowBackend::new(Duration::from_secs(5));
        let broker = broker(backend, tokens());
        let attempt = CallAttemptId::generate();

        let err = broker
            .request_call_config(channel_request(), &attempt, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, NetworkError::Timeout(Duration::from_millis(200)));
        assert_eq!(broker.slot().current(), CallConfigSlot::Empty);
    }

    #[tokio::test]
    async fn test_cancelled_attempt_never_writes_slot() {
        let backend = SlowBackend::new(Duration::from_millis(50));
        let broker = Arc::new(broker(backend, tokens()));
        let liveness = CancellationToken::new();
        let attempt = CallAttemptId::generate();

        let task = {
            let broker = broker.clone();
            let liveness = liveness.clone();
            let attempt = attempt.clone();
            tokio::spawn(async move {
                broker
                    .request_call_config(channel_request(), &attempt, &liveness)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        liveness.cancel();

        assert_eq!(task.await.unwrap(), Err(NetworkError::Cancelled));
        assert_eq!(broker.slot().current(), CallConfigSlot::Empty);
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        let backend = SlowBackend::new(Duration::from_millis(30));
        let broker = Arc::new(broker(backend, tokens()));
        let first = CallAttemptId::generate();

        let task = {
            let broker = broker.clone();
            let first = first.clone();
            tokio::spawn(async move {
                broker
                    .request_call_config(channel_request(), &first, &CancellationToken::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = CallAttemptId::generate();
        broker.slot().begin(second.clone());

        assert_eq!(task.await.unwrap(), Err(NetworkError::Cancelled));
        assert_eq!(broker.slot().current(), CallConfigSlot::Pending { attempt: second });
    }
}
