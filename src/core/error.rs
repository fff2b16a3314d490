use thiserror::Error;

use super::session::LifecycleState;

/// Failures surfaced to the user. Every variant leaves the controller Idle
/// except `Busy`, which leaves it untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("number of cycles is not set")]
    InvalidConfiguration,

    #[error("no serial port selected")]
    NoPortSelected,

    #[error("cannot connect to {port}: {reason}")]
    ConnectionError { port: String, reason: String },

    #[error("connection to {port} lost: {reason}")]
    ConnectionLost { port: String, reason: String },

    #[error("action not available while {0}")]
    Busy(LifecycleState),
}

impl SessionError {
    /// Transport errors force a full reset; the rest are input errors.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionError { .. } | SessionError::ConnectionLost { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
