use crate::error::ErrorKind;
use std::fmt;

/// Lifecycle of the interview session.
///
/// `Idle -> Connecting -> Active -> Concluding -> Idle`, with `Error`
/// reachable from `Connecting` and `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    /// The agent called `conclude_interview`; teardown is pending.
    Concluding,
    Error(ErrorKind),
}

impl SessionState {
    /// A session exists in some form and owns (or is acquiring) resources.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Active | SessionState::Concluding
        )
    }

    /// `start_interview` and `connect` are legal from here.
    pub fn can_start(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Error(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Concluding => write!(f, "concluding"),
            SessionState::Error(kind) => write!(f, "failed ({:?})", kind),
        }
    }
}
