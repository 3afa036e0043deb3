use async_trait::async_trait;

use crate::race::ApiResponse;

mod client;

pub use client::{parse_response, RacingApi, DEFAULT_COUNT};

/// Anything that can answer "what are the next `count` races".
#[async_trait]
pub trait RaceSource: Send + Sync {
    async fn next_races(&self, count: u32) -> Result<ApiResponse, ApiError>;
}

/// Failure modes of a single next-races request. The `Display` text is what
/// ends up on the store's error field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Failed to fetch races ({0})")]
    Http(u16),

    #[error("Invalid API response format")]
    InvalidFormat,

    #[error("Request timeout - please try again")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("Network error - please check your connection")]
    Network,
}

impl ApiError {
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return ApiError::Timeout;
        }
        let message = err.to_string();
        if message.trim().is_empty() {
            ApiError::Network
        } else {
            ApiError::Transport(message)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Http(_) => "http",
            ApiError::InvalidFormat => "invalid_format",
            ApiError::Timeout => "timeout",
            ApiError::Transport(_) => "transport",
            ApiError::Network => "network",
        }
    }
}
