pub mod user_id;
pub mod email;
pub mod display_name;
pub mod user_role;
pub mod verification_status;
pub mod subscription_tier;
pub mod rtc_uid;
pub mod meeting_role;

pub use user_id::UserId;
pub use email::Email;
pub use display_name::DisplayName;
pub use user_role::UserRole;
pub use verification_status::VerificationStatus;
pub use subscription_tier::SubscriptionTier;
pub use rtc_uid::RtcUid;
pub use meeting_role::MeetingRole;
