use thiserror::Error;

/// Failure of a single endpoint call.
///
/// Both variants display as a plain human-readable message, so callers can
/// show either one without inspecting the kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The endpoint answered with a non-success status.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The call never produced a usable response.
    #[error("{0}")]
    Transport(String),
}

impl ClientError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        if message.trim().is_empty() {
            ClientError::Transport("Network error".to_string())
        } else {
            ClientError::Transport(message)
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(_) => None,
        }
    }
}
