use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Pro,
    Basic,
}

impl SubscriptionTier {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pro" => Some(SubscriptionTier::Pro),
            "basic" => Some(SubscriptionTier::Basic),
            _ => None,
        }
    }
}
