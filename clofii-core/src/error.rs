use crate::state::SessionState;
use clofii_audio::MediaError;
use llm::LiveError;
use std::time::Duration;
use thiserror::Error;

/// Why a connection attempt did not produce a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionFailure {
    #[error("the agent rejected the API key: {0}")]
    AuthRejected(String),
    #[error("could not reach the agent: {0}")]
    Network(String),
    #[error("session setup failed: {0}")]
    Handshake(String),
    #[error("the agent did not answer within {0:?}")]
    Timeout(Duration),
    #[error("a connection is already open")]
    AlreadyConnected,
}

impl From<LiveError> for ConnectionFailure {
    fn from(err: LiveError) -> Self {
        match err {
            LiveError::AuthRejected(reason) => ConnectionFailure::AuthRejected(reason),
            LiveError::Network(reason) => ConnectionFailure::Network(reason),
            LiveError::Handshake(reason) => ConnectionFailure::Handshake(reason),
            LiveError::Timeout(after) => ConnectionFailure::Timeout(after),
            LiveError::AlreadyConnected => ConnectionFailure::AlreadyConnected,
            other @ (LiveError::NotConnected
            | LiveError::Backpressure
            | LiveError::Protocol(_)) => ConnectionFailure::Handshake(other.to_string()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connection(ConnectionFailure),
    #[error("no interview is in progress")]
    NotConnected,
    #[error("tool '{name}' failed: {reason}")]
    ToolDispatch { name: String, reason: String },
    #[error("media capture failed: {0}")]
    MediaAcquisition(MediaError),
    #[error("the agent closed the session unexpectedly (code {code:?})")]
    UnexpectedClose { code: Option<u16> },
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

impl From<ConnectionFailure> for SessionError {
    fn from(failure: ConnectionFailure) -> Self {
        SessionError::Connection(failure)
    }
}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        SessionError::MediaAcquisition(err)
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Connection(ConnectionFailure::AuthRejected(_)) => ErrorKind::AuthRejected,
            SessionError::Connection(ConnectionFailure::Network(_)) => ErrorKind::Network,
            SessionError::Connection(ConnectionFailure::Timeout(_)) => ErrorKind::Timeout,
            SessionError::Connection(_) => ErrorKind::Handshake,
            SessionError::NotConnected => ErrorKind::NotConnected,
            SessionError::ToolDispatch { .. } => ErrorKind::ToolDispatch,
            SessionError::MediaAcquisition(MediaError::PermissionDenied(_))
            | SessionError::MediaAcquisition(MediaError::NotGranted) => {
                ErrorKind::PermissionDenied
            }
            SessionError::MediaAcquisition(_) => ErrorKind::MediaUnavailable,
            SessionError::UnexpectedClose { .. } => ErrorKind::UnexpectedClose,
            SessionError::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, SessionError::Connection(_))
    }
}

/// Coarse error class carried by [`SessionState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthRejected,
    Network,
    Timeout,
    Handshake,
    NotConnected,
    ToolDispatch,
    PermissionDenied,
    MediaUnavailable,
    UnexpectedClose,
    InvalidState,
}

/// What the UI should offer after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    UseFallback,
    GrantPermission,
    Dismiss,
}

impl ErrorKind {
    /// Whether this kind came from a failed connection attempt.
    pub fn is_connection(self) -> bool {
        matches!(
            self,
            ErrorKind::AuthRejected | ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Handshake
        )
    }

    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::AuthRejected => {
                "The interviewer service rejected the API key. Check the key and try again."
            }
            ErrorKind::Network => {
                "Could not reach the interviewer service. Check your connection and try again."
            }
            ErrorKind::Timeout => "The interviewer service took too long to answer. Try again.",
            ErrorKind::Handshake => "The interview session could not be set up. Try again.",
            ErrorKind::NotConnected => "No interview is in progress.",
            ErrorKind::ToolDispatch => "The interviewer asked for something this app cannot do.",
            ErrorKind::PermissionDenied => {
                "Microphone access was denied. Allow access to the microphone and start again."
            }
            ErrorKind::MediaUnavailable => {
                "No usable microphone or camera was found. Connect a device and start again."
            }
            ErrorKind::UnexpectedClose => {
                "The interview ended unexpectedly before the interviewer finished."
            }
            ErrorKind::InvalidState => "That action is not available right now.",
        }
    }

    pub fn recovery(self) -> RecoveryAction {
        match self {
            ErrorKind::AuthRejected
            | ErrorKind::Network
            | ErrorKind::Timeout
            | ErrorKind::Handshake
            | ErrorKind::UnexpectedClose => RecoveryAction::Retry,
            ErrorKind::PermissionDenied | ErrorKind::MediaUnavailable => {
                RecoveryAction::GrantPermission
            }
            ErrorKind::NotConnected | ErrorKind::ToolDispatch | ErrorKind::InvalidState => {
                RecoveryAction::Dismiss
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_errors_map_to_connection_kinds() {
        let cases = [
            (LiveError::AuthRejected("bad key".into()), ErrorKind::AuthRejected),
            (LiveError::Network("refused".into()), ErrorKind::Network),
            (LiveError::Timeout(Duration::from_secs(1)), ErrorKind::Timeout),
            (LiveError::Handshake("no setupComplete".into()), ErrorKind::Handshake),
            (LiveError::Protocol("bad frame".into()), ErrorKind::Handshake),
        ];
        for (live, kind) in cases {
            let err = SessionError::from(ConnectionFailure::from(live));
            assert!(err.is_connection_error());
            assert_eq!(err.kind(), kind);
            assert!(kind.is_connection());
        }
    }

    #[test]
    fn test_messages_distinguish_kinds() {
        let auth = ErrorKind::AuthRejected.user_message();
        let network = ErrorKind::Network.user_message();
        let denied = ErrorKind::PermissionDenied.user_message();
        let closed = ErrorKind::UnexpectedClose.user_message();
        assert!(auth != network && network != denied && denied != closed);
    }

    #[test]
    fn test_media_errors_pick_recovery() {
        let denied = SessionError::from(MediaError::PermissionDenied("microphone".into()));
        assert_eq!(denied.kind(), ErrorKind::PermissionDenied);
        assert_eq!(denied.kind().recovery(), RecoveryAction::GrantPermission);

        let missing = SessionError::from(MediaError::NoDevice("camera".into()));
        assert_eq!(missing.kind(), ErrorKind::MediaUnavailable);
        assert!(!missing.kind().is_connection());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SessionError::InvalidState {
            operation: "reconfigure",
            state: SessionState::Active,
        };
        assert_eq!(err.to_string(), "cannot reconfigure while active");
        assert_eq!(err.kind().recovery(), RecoveryAction::Dismiss);
    }
}
