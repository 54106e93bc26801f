//! RTC-channel adapter: token based join, local tracks published after join,
//! remote participants subscribed as they publish.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::ports::{
    LocalTracks, MediaKind, ProviderEnvironment, RemoteUserEvent, RtcClientOptions, RtcSdk,
    SdkError, VideoProvider,
};
use crate::config::AgoraConfig;
use crate::domain::entities::{CallCredential, ProviderKind};
use crate::error::JoinError;

/// A remote participant and what it currently publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteUser {
    pub uid: u32,
    pub audio: bool,
    pub video: bool,
}

impl RemoteUser {
    fn set(&mut self, media: MediaKind, on: bool) {
        match media {
            MediaKind::Audio => self.audio = on,
            MediaKind::Video => self.video = on,
        }
    }
}

/// Element a remote user's video is rendered into
pub fn remote_container(uid: u32) -> String {
    format!("remote-video-{}", uid)
}

type Roster = Arc<Mutex<BTreeMap<u32, RemoteUser>>>;

#[derive(Default)]
struct AgoraState {
    client_ready: bool,
    container: Option<String>,
    tracks: LocalTracks,
    uid: Option<u32>,
    camera_on: bool,
    microphone_on: bool,
}

pub struct AgoraProvider {
    sdk: Arc<dyn RtcSdk>,
    options: RtcClientOptions,
    init_lock: tokio::sync::Mutex<()>,
    state: Mutex<AgoraState>,
    roster: Roster,
    remote_task: Mutex<Option<JoinHandle<()>>>,
}

impl AgoraProvider {
    pub fn new(sdk: Arc<dyn RtcSdk>, config: &AgoraConfig) -> Self {
        Self {
            sdk,
            options: RtcClientOptions {
                mode: config.mode.clone(),
                codec: config.codec.clone(),
            },
            init_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(AgoraState::default()),
            roster: Arc::new(Mutex::new(BTreeMap::new())),
            remote_task: Mutex::new(None),
        }
    }

    /// Uid the channel assigned on the last successful join
    pub fn assigned_uid(&self) -> Option<u32> {
        self.state.lock().uid
    }

    pub fn remote_users(&self) -> Vec<RemoteUser> {
        self.roster.lock().values().copied().collect()
    }

    pub fn camera_on(&self) -> bool {
        self.state.lock().camera_on
    }

    pub fn microphone_on(&self) -> bool {
        self.state.lock().microphone_on
    }

    /// Enable or disable the local camera. `Ok(false)` when no camera track
    /// exists for this call.
    pub async fn set_camera(&self, enabled: bool) -> Result<bool, JoinError> {
        let Some(track) = self.state.lock().tracks.video.clone() else {
            return Ok(false);
        };
        self.sdk
            .set_track_enabled(track, enabled)
            .await
            .map_err(join_error)?;
        self.state.lock().camera_on = enabled;
        Ok(true)
    }

    /// Enable or disable the local microphone. `Ok(false)` when no
    /// microphone track exists for this call.
    pub async fn set_microphone(&self, enabled: bool) -> Result<bool, JoinError> {
        let Some(track) = self.state.lock().tracks.audio.clone() else {
            return Ok(false);
        };
        self.sdk
            .set_track_enabled(track, enabled)
            .await
            .map_err(join_error)?;
        self.state.lock().microphone_on = enabled;
        Ok(true)
    }

    fn close_tracks(&self) {
        let tracks = {
            let mut state = self.state.lock();
            state.camera_on = false;
            state.microphone_on = false;
            std::mem::take(&mut state.tracks)
        };
        for track in tracks.all() {
            self.sdk.close_track(track);
        }
    }
}

fn join_error(err: SdkError) -> JoinError {
    JoinError::Join {
        provider: ProviderKind::Agora,
        message: err.message,
    }
}

async fn follow_remote_users(
    sdk: Arc<dyn RtcSdk>,
    roster: Roster,
    mut events: mpsc::UnboundedReceiver<RemoteUserEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RemoteUserEvent::Joined { uid } => debug!(uid, "remote user joined"),
            RemoteUserEvent::Published { uid, media } => {
                if let Err(e) = sdk.subscribe(uid, media).await {
                    warn!(uid, ?media, error = %e, "subscribing to remote track failed");
                    continue;
                }
                let container = match media {
                    MediaKind::Video => Some(remote_container(uid)),
                    MediaKind::Audio => None,
                };
                if let Err(e) = sdk.play_remote(uid, media, container) {
                    warn!(uid, ?media, error = %e, "playing remote track failed");
                }
                roster
                    .lock()
                    .entry(uid)
                    .or_insert(RemoteUser {
                        uid,
                        audio: false,
                        video: false,
                    })
                    .set(media, true);
            }
            RemoteUserEvent::Unpublished { uid, media } => {
                if let Some(user) = roster.lock().get_mut(&uid) {
                    user.set(media, false);
                }
            }
            RemoteUserEvent::Left { uid } => {
                roster.lock().remove(&uid);
                debug!(uid, "remote user left");
            }
        }
    }
}

#[async_trait]
impl VideoProvider for AgoraProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Agora
    }

    fn is_initialized(&self) -> bool {
        let state = self.state.lock();
        state.client_ready && state.container.is_some()
    }

    async fn initialize(&self, environment: ProviderEnvironment) -> Result<(), JoinError> {
        let _guard = self.init_lock.lock().await;
        let mut state = self.state.lock();

        if !state.client_ready {
            let events = self
                .sdk
                .create_client(self.options.clone())
                .map_err(|err| JoinError::Initialize {
                    provider: ProviderKind::Agora,
                    message: err.message,
                })?;
            let task = tokio::spawn(follow_remote_users(
                self.sdk.clone(),
                self.roster.clone(),
                events,
            ));
            *self.remote_task.lock() = Some(task);
            state.client_ready = true;
            info!(mode = %self.options.mode, codec = %self.options.codec, "rtc client created");
        }
        state.container = Some(environment.container);
        Ok(())
    }

    async fn join(&self, credential: CallCredential) -> Result<(), JoinError> {
        let credential = match credential {
            CallCredential::Channel(credential) => credential,
            other => {
                return Err(JoinError::CredentialMismatch {
                    provider: ProviderKind::Agora,
                    actual: other.provider(),
                })
            }
        };
        let container = {
            let state = self.state.lock();
            match (state.client_ready, state.container.clone()) {
                (true, Some(container)) => container,
                _ => {
                    return Err(JoinError::NotInitialized {
                        provider: ProviderKind::Agora,
                    })
                }
            }
        };

        // uid 0 goes out untouched and the channel assigns one
        let uid = self
            .sdk
            .join(credential.join_payload())
            .await
            .map_err(join_error)?;
        self.state.lock().uid = Some(uid);

        let permissions = self.sdk.device_permissions().await;
        let published = async {
            let tracks = if permissions.any() {
                self.sdk.create_local_tracks(permissions).await?
            } else {
                LocalTracks::default()
            };
            {
                let mut state = self.state.lock();
                state.tracks = tracks.clone();
                state.camera_on = tracks.video.is_some();
                state.microphone_on = tracks.audio.is_some();
            }
            if !tracks.is_empty() {
                self.sdk.publish(tracks.all()).await?;
            }
            if let Some(video) = tracks.video {
                self.sdk.play(video, container)?;
            }
            Ok::<(), SdkError>(())
        };
        if let Err(err) = published.await {
            warn!(error = %err, "publishing local tracks failed, leaving channel");
            self.close_tracks();
            let _ = self.sdk.leave().await;
            self.state.lock().uid = None;
            return Err(join_error(err));
        }

        info!(
            channel = %credential.channel_name,
            uid,
            camera = permissions.camera,
            microphone = permissions.microphone,
            "joined channel"
        );
        Ok(())
    }

    async fn leave(&self) -> Result<(), JoinError> {
        self.close_tracks();
        self.roster.lock().clear();
        let joined = {
            let mut state = self.state.lock();
            state.container = None;
            state.uid.take().is_some()
        };
        if joined {
            self.sdk.leave().await.map_err(join_error)?;
        }
        Ok(())
    }
}

impl Drop for AgoraProvider {
    fn drop(&mut self) {
        self.close_tracks();
        if let Some(task) = self.remote_task.lock().take() {
            task.abort();
        }
    }
}
