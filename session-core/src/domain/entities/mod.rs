pub mod claims;
pub mod call_credential;

pub use claims::{ClaimsError, DecodedClaims, TokenType};
pub use call_credential::{
    CallCredential, ChannelCredential, MeetingCredential, ProviderKind,
};
