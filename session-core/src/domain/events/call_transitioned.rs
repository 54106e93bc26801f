use crate::domain::aggregates::call_session::{CallAttemptId, CallStateKind};

/// A call session moved between lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTransitioned {
    pub attempt: Option<CallAttemptId>,
    pub from: CallStateKind,
    pub to: CallStateKind,
}

impl CallTransitioned {
    pub fn is_terminal(&self) -> bool {
        matches!(self.to, CallStateKind::Ended | CallStateKind::Failed)
    }
}
