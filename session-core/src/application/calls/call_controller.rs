//! Drives one call attempt on behalf of the screen hosting the call:
//! credentials, provider initialize, join, leave.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::credential_broker::{CallConfigRequest, CallCredentialBroker};
use crate::application::ports::{ProviderEnvironment, VideoProvider};
use crate::domain::aggregates::{CallSession, CallState, FailurePhase, FailureReason};
use crate::domain::entities::ProviderKind;
use crate::domain::events::{CallTransitioned, DomainEvent};
use crate::error::{CallError, NetworkError};

pub struct CallController {
    broker: Arc<CallCredentialBroker>,
    providers: HashMap<ProviderKind, Arc<dyn VideoProvider>>,
    environment: ProviderEnvironment,
    join_timeout: Duration,
    session: Mutex<CallSession>,
    liveness: Mutex<CancellationToken>,
    active: Mutex<Option<Arc<dyn VideoProvider>>>,
    events: broadcast::Sender<DomainEvent<CallTransitioned>>,
}

impl CallController {
    pub fn new(
        broker: Arc<CallCredentialBroker>,
        provider: ProviderKind,
        environment: ProviderEnvironment,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            broker,
            providers: HashMap::new(),
            environment,
            join_timeout: Duration::from_secs(30),
            session: Mutex::new(CallSession::new(provider)),
            liveness: Mutex::new(CancellationToken::new()),
            active: Mutex::new(None),
            events,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn VideoProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn state(&self) -> CallState {
        self.session.lock().state.clone()
    }

    pub fn provider(&self) -> ProviderKind {
        self.session.lock().provider
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent<CallTransitioned>> {
        self.events.subscribe()
    }

    /// Run one attempt through to `InCall`.
    ///
    /// On failure the session ends in `Failed` with the phase that failed.
    /// If the screen unmounts meanwhile, late results are dropped and no
    /// join is issued.
    pub async fn start(&self, request: CallConfigRequest) -> Result<(), CallError> {
        let (attempt, liveness) = {
            let mut session = self.session.lock();
            if request.provider() != session.provider {
                return Err(CallError::NoProvider(request.provider()));
            }
            let transition = session.request_credentials()?;
            self.publish(transition);
            (session.attempt().cloned(), self.renew_liveness())
        };
        let Some(attempt) = attempt else {
            return Err(CallError::Unmounted);
        };

        let credential = match self
            .broker
            .request_call_config(request, &attempt, &liveness)
            .await
        {
            Ok(credential) => credential,
            Err(NetworkError::Cancelled) if liveness.is_cancelled() => {
                self.fail(FailurePhase::Credentials, "call screen unmounted");
                return Err(CallError::Unmounted);
            }
            Err(e) => {
                self.fail(FailurePhase::Credentials, e.to_string());
                return Err(e.into());
            }
        };
        if liveness.is_cancelled() {
            self.fail(FailurePhase::Credentials, "call screen unmounted");
            return Err(CallError::Unmounted);
        }

        let provider_kind = credential.provider();
        {
            let mut session = self.session.lock();
            let transition = session.credentials_received(credential)?;
            self.publish(transition);
        }

        let Some(provider) = self.providers.get(&provider_kind).cloned() else {
            self.fail(FailurePhase::Initialize, format!("no adapter for {}", provider_kind));
            return Err(CallError::NoProvider(provider_kind));
        };
        // From here on the provider may hold a mounted surface or a channel
        *self.active.lock() = Some(provider.clone());

        if !provider.is_initialized() {
            let initialized = self
                .bounded("initialize", &liveness, provider.initialize(self.environment.clone()))
                .await;
            if let Err(e) = initialized.and_then(|r| r.map_err(CallError::from)) {
                self.release().await;
                self.fail(FailurePhase::Initialize, e.to_string());
                return Err(e);
            }
        }

        let credential = {
            let mut session = self.session.lock();
            let (credential, transition) = session.begin_join()?;
            self.publish(transition);
            credential
        };

        let joined = self
            .bounded("join", &liveness, provider.join(credential))
            .await;
        if let Err(e) = joined.and_then(|r| r.map_err(CallError::from)) {
            let phase = match &e {
                CallError::Join(join) => join.phase(),
                _ => FailurePhase::Join,
            };
            self.release().await;
            self.fail(phase, e.to_string());
            return Err(e);
        }

        if liveness.is_cancelled() {
            // Unmounted while the join was completing.
            self.release().await;
            self.fail(FailurePhase::Join, "call screen unmounted");
            return Err(CallError::Unmounted);
        }

        let mut session = self.session.lock();
        let transition = session.joined()?;
        self.publish(transition);
        info!(provider = %provider_kind, "call joined");
        Ok(())
    }

    /// Leave an ongoing call
    pub async fn leave(&self) -> Result<(), CallError> {
        let provider = self.active.lock().take();
        let left = match provider {
            Some(provider) => provider.leave().await,
            None => Ok(()),
        };

        {
            let mut session = self.session.lock();
            if matches!(session.state, CallState::Joining | CallState::InCall) {
                let transition = session.end()?;
                self.publish(transition);
            }
        }
        self.broker.slot().clear();
        left.map_err(CallError::from)
    }

    /// The hosting screen goes away: cancel the attempt in flight and leave
    /// any call in progress.
    pub async fn unmount(&self) {
        self.liveness.lock().cancel();
        if let Err(e) = self.leave().await {
            warn!(error = %e, "leave on unmount failed");
        }
    }

    /// Back to `Idle` after `Ended` or `Failed`
    pub fn reset(&self) -> Result<(), CallError> {
        let mut session = self.session.lock();
        let transition = session.reset()?;
        self.publish(transition);
        Ok(())
    }

    /// Tear down whatever the provider holds for a failed attempt. A no-op
    /// when `leave` or `unmount` already took it.
    async fn release(&self) {
        let provider = self.active.lock().take();
        if let Some(provider) = provider {
            if let Err(e) = provider.leave().await {
                warn!(provider = %provider.kind(), error = %e, "releasing provider failed");
            }
        }
    }

    fn renew_liveness(&self) -> CancellationToken {
        let mut liveness = self.liveness.lock();
        liveness.cancel();
        *liveness = CancellationToken::new();
        liveness.clone()
    }

    async fn bounded<T>(
        &self,
        step: &'static str,
        liveness: &CancellationToken,
        fut: impl Future<Output = T>,
    ) -> Result<T, CallError> {
        tokio::select! {
            _ = liveness.cancelled() => Err(CallError::Unmounted),
            result = timeout(self.join_timeout, fut) => {
                result.map_err(|_| CallError::Timeout(step, self.join_timeout))
            }
        }
    }

    fn fail(&self, phase: FailurePhase, message: impl Into<String>) {
        let mut session = self.session.lock();
        match session.fail(FailureReason::new(phase, message)) {
            Ok(transition) => self.publish(transition),
            Err(e) => warn!(error = %e, "could not mark call as failed"),
        }
    }

    fn publish(&self, transition: CallTransitioned) {
        info!(from = ?transition.from, to = ?transition.to, "call state");
        let _ = self.events.send(DomainEvent::new(transition));
    }
}
