//! Binding surface of the two vendor video SDKs. The native bindings are
//! supplied by the host shell.

use async_trait::async_trait;
use shared::{ChannelJoinPayload, MeetingJoinPayload};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SdkError {
    pub code: Option<i32>,
    pub message: String,
}

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Handle to a mounted native video surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingInitOptions {
    pub leave_url: String,
    pub support_av: bool,
}

/// Meeting SDK (signature based)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeetingSdk: Send + Sync {
    fn mount(&self, container: &str) -> Result<SurfaceHandle, SdkError>;
    fn unmount(&self, surface: SurfaceHandle);
    async fn init(&self, options: MeetingInitOptions) -> Result<(), SdkError>;
    async fn join(&self, payload: MeetingJoinPayload) -> Result<(), SdkError>;
    async fn leave(&self) -> Result<(), SdkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcClientOptions {
    pub mode: String,
    pub codec: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalTrackId(pub String);

/// Devices the user granted access to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevicePermissions {
    pub camera: bool,
    pub microphone: bool,
}

impl DevicePermissions {
    pub fn any(&self) -> bool {
        self.camera || self.microphone
    }
}

/// Local tracks created for one join. A track is absent when its device
/// was not granted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalTracks {
    pub audio: Option<LocalTrackId>,
    pub video: Option<LocalTrackId>,
}

impl LocalTracks {
    pub fn all(&self) -> Vec<LocalTrackId> {
        self.audio.iter().chain(self.video.iter()).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Remote participant activity reported by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteUserEvent {
    Joined { uid: u32 },
    Published { uid: u32, media: MediaKind },
    Unpublished { uid: u32, media: MediaKind },
    Left { uid: u32 },
}

/// RTC channel SDK (token based)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RtcSdk: Send + Sync {
    /// Creates the client; remote user activity arrives on the returned
    /// channel until the client goes away.
    fn create_client(
        &self,
        options: RtcClientOptions,
    ) -> Result<mpsc::UnboundedReceiver<RemoteUserEvent>, SdkError>;
    async fn device_permissions(&self) -> DevicePermissions;
    /// Returns the uid the channel assigned
    async fn join(&self, payload: ChannelJoinPayload) -> Result<u32, SdkError>;
    /// Only creates tracks for the devices in `permissions`
    async fn create_local_tracks(&self, permissions: DevicePermissions) -> Result<LocalTracks, SdkError>;
    async fn publish(&self, tracks: Vec<LocalTrackId>) -> Result<(), SdkError>;
    fn play(&self, track: LocalTrackId, container: String) -> Result<(), SdkError>;
    async fn set_track_enabled(&self, track: LocalTrackId, enabled: bool) -> Result<(), SdkError>;
    fn close_track(&self, track: LocalTrackId);
    async fn subscribe(&self, uid: u32, media: MediaKind) -> Result<(), SdkError>;
    /// Play a subscribed remote track. Audio has no container.
    fn play_remote(&self, uid: u32, media: MediaKind, container: Option<String>) -> Result<(), SdkError>;
    async fn leave(&self) -> Result<(), SdkError>;
}
