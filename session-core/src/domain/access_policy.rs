//! Route gate for the areas a signed-in user may enter.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::entities::DecodedClaims;
use crate::domain::value_objects::{UserRole, VerificationStatus};

const PUBLIC_ONLY: &[&str] = &[
    "/login",
    "/signup",
    "/register",
    "/forget-password",
];

const PROTECTED: &[&str] = &["/student", "/trainer", "/dashboard"];

const PASSTHROUGH: &[&str] = &["/api/", "/_next/", "/favicon.ico", "/auth"];

/// Outcome of evaluating a path against the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    /// Not signed in; send to login and come back afterwards
    Login { return_to: String },
    Redirect {
        path: String,
        notice: Option<VerificationNotice>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationNotice {
    VerificationRequired,
    VerificationRejected,
    VerificationPending,
}

impl VerificationNotice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationNotice::VerificationRequired => "verification_required",
            VerificationNotice::VerificationRejected => "verification_rejected",
            VerificationNotice::VerificationPending => "verification_pending",
        }
    }

    fn for_status(status: VerificationStatus) -> Option<Self> {
        match status {
            VerificationStatus::NotSubmitted => Some(VerificationNotice::VerificationRequired),
            VerificationStatus::Rejected => Some(VerificationNotice::VerificationRejected),
            VerificationStatus::Unverified => Some(VerificationNotice::VerificationPending),
            VerificationStatus::Verified | VerificationStatus::InProgress => None,
        }
    }
}

struct RoleRules {
    allowed: &'static [&'static str],
    denied: &'static [&'static str],
}

fn rules_for(role: UserRole) -> RoleRules {
    match role {
        UserRole::Student => RoleRules {
            allowed: &["/student"],
            denied: &["/trainer", "/dashboard"],
        },
        UserRole::Teacher => RoleRules {
            allowed: &["/trainer", "/dashboard"],
            denied: &["/student"],
        },
        UserRole::Admin => RoleRules {
            allowed: &["/dashboard"],
            denied: &["/student", "/trainer"],
        },
    }
}

/// Landing area for a role
pub fn home_for(role: UserRole) -> &'static str {
    match role {
        UserRole::Student => "/student",
        UserRole::Teacher => "/trainer",
        UserRole::Admin => "/dashboard",
    }
}

pub fn is_public_only(path: &str) -> bool {
    path == "/" || PUBLIC_ONLY.iter().any(|route| path.starts_with(route))
}

pub fn is_protected(path: &str) -> bool {
    PROTECTED.iter().any(|route| path.starts_with(route))
}

pub fn role_may_enter(role: UserRole, path: &str) -> bool {
    let rules = rules_for(role);
    if rules.denied.iter().any(|route| path.starts_with(route)) {
        return false;
    }
    rules.allowed.iter().any(|route| path.starts_with(route))
}

/// Decide what happens when `path` is requested. Expired claims count as
/// signed out.
pub fn evaluate(path: &str, claims: Option<&DecodedClaims>, now: DateTime<Utc>) -> AccessDecision {
    if PASSTHROUGH.iter().any(|prefix| path.starts_with(prefix)) {
        return AccessDecision::Allow;
    }

    let claims = claims.filter(|c| !c.is_expired_at(now));

    let Some(claims) = claims else {
        if is_protected(path) {
            return AccessDecision::Login {
                return_to: path.to_string(),
            };
        }
        return AccessDecision::Allow;
    };

    if is_public_only(path) {
        return AccessDecision::Redirect {
            path: home_for(claims.role).to_string(),
            notice: None,
        };
    }

    if claims.role == UserRole::Teacher
        && path.starts_with("/dashboard")
        && claims.verification_status != VerificationStatus::Verified
    {
        return AccessDecision::Redirect {
            path: "/trainer".to_string(),
            notice: VerificationNotice::for_status(claims.verification_status),
        };
    }

    if is_protected(path) && !role_may_enter(claims.role, path) {
        return AccessDecision::Redirect {
            path: home_for(claims.role).to_string(),
            notice: None,
        };
    }

    AccessDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{AccessTokenClaims, SubjectId};

    fn claims(role: &str, verification: &str) -> DecodedClaims {
        DecodedClaims::from_wire(AccessTokenClaims {
            token_type: Some("access".into()),
            exp: 4_000_000_000,
            iat: 1_700_000_000,
            jti: None,
            user_id: SubjectId::Text("u1".into()),
            username: None,
            full_name: None,
            email: None,
            profile_pic: None,
            role: role.into(),
            verification_status: Some(verification.into()),
            subscription_type: None,
        })
        .unwrap()
    }

    #[test]
    fn test_signed_out_user_sent_to_login() {
        assert_eq!(
            evaluate("/student/bookings", None, Utc::now()),
            AccessDecision::Login {
                return_to: "/student/bookings".into()
            }
        );
        assert_eq!(evaluate("/login", None, Utc::now()), AccessDecision::Allow);
        assert_eq!(evaluate("/about", None, Utc::now()), AccessDecision::Allow);
    }

    #[test]
    fn test_signed_in_user_bounced_from_public_only_pages() {
        let student = claims("student", "not_submitted");
        assert_eq!(
            evaluate("/", Some(&student), Utc::now()),
            AccessDecision::Redirect {
                path: "/student".into(),
                notice: None
            }
        );
        assert_eq!(
            evaluate("/forget-password/verify-code", Some(&student), Utc::now()),
            AccessDecision::Redirect {
                path: "/student".into(),
                notice: None
            }
        );
    }

    #[test]
    fn test_role_rules() {
        let admin = claims("admin", "verified");
        assert_eq!(evaluate("/dashboard", Some(&admin), Utc::now()), AccessDecision::Allow);
        assert_eq!(
            evaluate("/trainer", Some(&admin), Utc::now()),
            AccessDecision::Redirect {
                path: "/dashboard".into(),
                notice: None
            }
        );

        let student = claims("student", "verified");
        assert!(!role_may_enter(student.role, "/dashboard"));
        assert!(role_may_enter(student.role, "/student/calls"));
    }

    #[test]
    fn test_unverified_teacher_kept_out_of_dashboard() {
        let cases = [
            ("not_submitted", Some(VerificationNotice::VerificationRequired)),
            ("reject", Some(VerificationNotice::VerificationRejected)),
            ("unverified", Some(VerificationNotice::VerificationPending)),
            ("in_progress", None),
        ];
        for (status, notice) in cases {
            let teacher = claims("teacher", status);
            assert_eq!(
                evaluate("/dashboard/earnings", Some(&teacher), Utc::now()),
                AccessDecision::Redirect {
                    path: "/trainer".into(),
                    notice
                },
                "status {}",
                status
            );
        }

        let verified = claims("teacher", "verified");
        assert_eq!(
            evaluate("/dashboard", Some(&verified), Utc::now()),
            AccessDecision::Allow
        );
    }

    #[test]
    fn test_expired_claims_count_as_signed_out() {
        let teacher = claims("teacher", "verified");
        let later = teacher.expires_at;
        assert_eq!(
            evaluate("/trainer", Some(&teacher), later),
            AccessDecision::Login {
                return_to: "/trainer".into()
            }
        );
    }

    #[test]
    fn test_api_paths_pass_through() {
        assert_eq!(evaluate("/api/video/signature", None, Utc::now()), AccessDecision::Allow);
    }
}
