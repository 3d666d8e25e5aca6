//! Common error types.

use thiserror::Error;

use crate::TabId;

/// Main error type for the privacy engine.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Platform operation failed: {0}")]
    Platform(String),

    #[error("Tab {0} is gone")]
    TabGone(TabId),

    #[error("Settings storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

pub type GuardResult<T> = Result<T, GuardError>;

impl GuardError {
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        Self::InvalidUrl(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn channel_closed(msg: impl Into<String>) -> Self {
        Self::ChannelClosed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GuardError::platform("script injection rejected");
        assert_eq!(err.to_string(), "Platform operation failed: script injection rejected");

        let err = GuardError::TabGone(7);
        assert_eq!(err.to_string(), "Tab 7 is gone");
    }

    #[test]
    fn test_url_parse_conversion() {
        let err: GuardError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, GuardError::UrlParse(_)));
    }
}
