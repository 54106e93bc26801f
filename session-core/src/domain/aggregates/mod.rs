pub mod call_session;

pub use call_session::{
    CallAttemptId, CallSession, CallState, CallStateKind, FailurePhase, FailureReason,
    TransitionError,
};
