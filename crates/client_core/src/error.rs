use reqwest::StatusCode;
use shared::{
    domain::MessageId,
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network unavailable: {0}")]
    Offline(String),
    #[error("session rejected by server (401)")]
    Unauthorized,
    #[error("server returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid server payload: {0}")]
    Decode(String),
    #[error("local storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("no messages loaded yet; fetch the latest page first")]
    EmptyTimeline,
    #[error("unknown message {0}")]
    UnknownMessage(MessageId),
}

impl ClientError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Offline(_) => ErrorCode::Offline,
            ClientError::Unauthorized => ErrorCode::Unauthorized,
            ClientError::Http { .. } => ErrorCode::Http,
            ClientError::Transport(_) => ErrorCode::Transport,
            ClientError::Decode(_) => ErrorCode::Decode,
            ClientError::Storage(_) => ErrorCode::Storage,
            ClientError::Validation(_) | ClientError::EmptyTimeline => ErrorCode::Validation,
            ClientError::UnknownMessage(_) => ErrorCode::NotFound,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, ClientError::Offline(_))
    }

    pub fn to_api_error(&self) -> ApiError {
        ApiError::new(self.code(), self.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            ClientError::Offline(err.to_string())
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            if status == StatusCode::UNAUTHORIZED {
                ClientError::Unauthorized
            } else {
                ClientError::Http {
                    status,
                    body: String::new(),
                }
            }
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}
