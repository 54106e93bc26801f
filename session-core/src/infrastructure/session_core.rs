//! Composition root. One `SessionCore` per process (or per test).

use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::auth::{AuthEventBus, SessionState, TokenStore};
use crate::application::calls::{CallConfigStore, CallController, CallCredentialBroker};
use crate::application::ports::{
    CookieStorage, CredentialBackend, MeetingSdk, ProviderEnvironment, RtcSdk, SocketConnector,
};
use crate::application::realtime::{reconnect, Connection, SocketConnectionManager};
use crate::config::CoreConfig;
use crate::domain::access_policy::{self, AccessDecision};
use crate::domain::entities::ProviderKind;
use crate::error::ConnectionError;

use super::driven::{storage, AgoraProvider, HttpCredentialBackend, TungsteniteConnector, ZoomProvider};

/// Native video SDK bindings handed over by the host shell
#[derive(Clone, Default)]
pub struct SdkBindings {
    pub meeting: Option<Arc<dyn MeetingSdk>>,
    pub rtc: Option<Arc<dyn RtcSdk>>,
}

pub struct SessionCore {
    config: CoreConfig,
    tokens: TokenStore,
    session: SessionState,
    sockets: Arc<SocketConnectionManager>,
    broker: Arc<CallCredentialBroker>,
    call_config: CallConfigStore,
}

impl SessionCore {
    /// Wire the production adapters
    pub fn build(config: CoreConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid configuration")?;

        let storage = storage::from_config(&config.storage);
        let backend = HttpCredentialBackend::new(&config.backend.base_url, config.backend.request_timeout())
            .context("failed to create backend client")?;

        Ok(Self::with_adapters(
            config,
            storage,
            Arc::new(backend),
            Arc::new(TungsteniteConnector::new()),
        ))
    }

    pub fn with_adapters(
        config: CoreConfig,
        storage: Arc<dyn CookieStorage>,
        backend: Arc<dyn CredentialBackend>,
        connector: Arc<dyn SocketConnector>,
    ) -> Self {
        let tokens = TokenStore::new(storage, AuthEventBus::new())
            .with_default_ttl(config.storage.token_ttl_days);
        if !tokens.is_available() {
            info!("cookie storage unavailable, session will not persist");
        }
        let session = SessionState::attach(tokens.clone());

        let sockets = SocketConnectionManager::new(connector)
            .with_policy(reconnect::from_config(&config.realtime.reconnect))
            .with_handshake_timeout(config.realtime.handshake_timeout());

        let call_config = CallConfigStore::new();
        let broker = CallCredentialBroker::new(backend, tokens.clone(), call_config.clone())
            .with_request_timeout(config.backend.request_timeout())
            .with_meeting_sdk_key(config.calls.zoom.sdk_key.clone());

        Self {
            config,
            tokens,
            session,
            sockets: Arc::new(sockets),
            broker: Arc::new(broker),
            call_config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn sockets(&self) -> &Arc<SocketConnectionManager> {
        &self.sockets
    }

    pub fn broker(&self) -> &Arc<CallCredentialBroker> {
        &self.broker
    }

    pub fn call_config(&self) -> &CallConfigStore {
        &self.call_config
    }

    pub fn login(&self, access_token: &str) {
        self.tokens.login(access_token);
    }

    /// Drop the stored token and any pending call credentials. Push
    /// connections stay open unless `realtime.close_on_logout` is set.
    pub fn logout(&self) {
        self.tokens.logout();
        self.call_config.clear();
        if self.config.realtime.close_on_logout {
            info!(connections = self.sockets.len(), "closing push connections on logout");
            self.sockets.close_all();
        }
    }

    /// Route gate decision for `path` under the current session
    pub fn access(&self, path: &str) -> AccessDecision {
        let snapshot = self.session.current();
        access_policy::evaluate(path, snapshot.claims(), chrono::Utc::now())
    }

    /// Shared push connection to the configured socket url, authenticated
    /// with the currently stored access token.
    pub fn connect_realtime(&self) -> Result<Connection, ConnectionError> {
        let token = self.tokens.access_token().unwrap_or_else(|| {
            debug!("no access token stored, connecting anonymously");
            String::new()
        });
        self.sockets
            .get_connection(&self.config.realtime.socket_url, &token)
    }

    /// Controller for one call screen. Every provider with a binding is
    /// registered; `provider` picks the one the attempt starts with.
    pub fn call_controller(
        &self,
        provider: ProviderKind,
        environment: ProviderEnvironment,
        bindings: &SdkBindings,
    ) -> CallController {
        let mut controller = CallController::new(self.broker.clone(), provider, environment)
            .with_join_timeout(self.config.calls.join_timeout());

        if let Some(sdk) = &bindings.meeting {
            controller = controller.with_provider(Arc::new(ZoomProvider::new(
                sdk.clone(),
                &self.config.calls.zoom,
            )));
        }
        if let Some(sdk) = &bindings.rtc {
            controller = controller.with_provider(Arc::new(AgoraProvider::new(
                sdk.clone(),
                &self.config.calls.agora,
            )));
        }
        controller
    }

    /// Same as [`SessionCore::call_controller`] with the configured provider
    pub fn default_call_controller(
        &self,
        environment: ProviderEnvironment,
        bindings: &SdkBindings,
    ) -> CallController {
        self.call_controller(self.config.calls.provider, environment, bindings)
    }
}
