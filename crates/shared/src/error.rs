use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Offline,
    Unauthorized,
    Http,
    Transport,
    Decode,
    Storage,
    Validation,
    NotFound,
}

impl ErrorCode {
    /// Whether the failed operation can succeed later without user changes.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Offline | Self::Transport | Self::Http)
    }
}

/// Serializable failure snapshot handed to whatever renders the chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
