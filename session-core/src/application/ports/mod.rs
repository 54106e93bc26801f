// Driven ports, implemented by infrastructure

pub mod cookie_storage;
pub mod credential_backend;
pub mod socket_connector;
pub mod video_provider;
pub mod video_sdk;

pub use cookie_storage::{CookieStorage, SameSite, StoredCookie};
pub use credential_backend::CredentialBackend;
pub use socket_connector::{LinkCommand, LinkEvent, SocketConnector, SocketLink};
pub use video_provider::{ProviderEnvironment, VideoProvider};
pub use video_sdk::{
    DevicePermissions, LocalTrackId, LocalTracks, MediaKind, MeetingInitOptions, MeetingSdk,
    RemoteUserEvent, RtcClientOptions, RtcSdk, SdkError, SurfaceHandle,
};
