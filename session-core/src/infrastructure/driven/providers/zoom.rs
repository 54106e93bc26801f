//! Meeting-SDK adapter: signature based join into a numbered meeting.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::ports::{
    MeetingInitOptions, MeetingSdk, ProviderEnvironment, SdkError, SurfaceHandle, VideoProvider,
};
use crate::config::ZoomConfig;
use crate::domain::entities::{CallCredential, ProviderKind};
use crate::error::JoinError;

#[derive(Default)]
struct ZoomState {
    sdk_ready: bool,
    surface: Option<SurfaceHandle>,
    joined: bool,
}

pub struct ZoomProvider {
    sdk: Arc<dyn MeetingSdk>,
    options: MeetingInitOptions,
    init_lock: tokio::sync::Mutex<()>,
    state: Mutex<ZoomState>,
}

impl ZoomProvider {
    pub fn new(sdk: Arc<dyn MeetingSdk>, config: &ZoomConfig) -> Self {
        Self {
            sdk,
            options: MeetingInitOptions {
                leave_url: config.leave_url.clone(),
                support_av: true,
            },
            init_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(ZoomState::default()),
        }
    }

    fn release_surface(&self) {
        let surface = self.state.lock().surface.take();
        if let Some(surface) = surface {
            debug!(?surface, "unmounting meeting surface");
            self.sdk.unmount(surface);
        }
    }
}

fn init_error(err: SdkError) -> JoinError {
    JoinError::Initialize {
        provider: ProviderKind::Zoom,
        message: err.message,
    }
}

fn join_error(err: SdkError) -> JoinError {
    JoinError::Join {
        provider: ProviderKind::Zoom,
        message: err.message,
    }
}

#[async_trait]
impl VideoProvider for ZoomProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Zoom
    }

    fn is_initialized(&self) -> bool {
        let state = self.state.lock();
        state.sdk_ready && state.surface.is_some()
    }

    async fn initialize(&self, environment: ProviderEnvironment) -> Result<(), JoinError> {
        let _guard = self.init_lock.lock().await;

        let (mounted, sdk_ready) = {
            let state = self.state.lock();
            (state.surface.is_some(), state.sdk_ready)
        };

        if !mounted {
            let surface = self.sdk.mount(&environment.container).map_err(init_error)?;
            self.state.lock().surface = Some(surface);
        }

        // The SDK itself only initializes once per process
        if !sdk_ready {
            if let Err(err) = self.sdk.init(self.options.clone()).await {
                warn!(error = %err, "meeting sdk init failed");
                self.release_surface();
                return Err(init_error(err));
            }
            self.state.lock().sdk_ready = true;
            info!(container = %environment.container, "meeting sdk initialized");
        }
        Ok(())
    }

    async fn join(&self, credential: CallCredential) -> Result<(), JoinError> {
        let credential = match credential {
            CallCredential::Meeting(credential) => credential,
            other => {
                return Err(JoinError::CredentialMismatch {
                    provider: ProviderKind::Zoom,
                    actual: other.provider(),
                })
            }
        };
        if !self.is_initialized() {
            return Err(JoinError::NotInitialized {
                provider: ProviderKind::Zoom,
            });
        }

        self.sdk
            .join(credential.join_payload())
            .await
            .map_err(join_error)?;
        self.state.lock().joined = true;
        info!(meeting = %credential.meeting_number, role = ?credential.role, "joined meeting");
        Ok(())
    }

    async fn leave(&self) -> Result<(), JoinError> {
        let joined = std::mem::take(&mut self.state.lock().joined);
        let result = if joined {
            self.sdk.leave().await.map_err(join_error)
        } else {
            Ok(())
        };
        self.release_surface();
        result
    }
}

impl Drop for ZoomProvider {
    fn drop(&mut self) {
        self.release_surface();
    }
}
