//! Error types for bopher.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Server error: {0}")]
    Api(ApiError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection to the chat server closed")]
    ConnectionClosed,

    #[error("Gave up delivering message after {attempts} attempt(s)")]
    DeliveryAbandoned { attempts: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Error body returned by the chat server on a failed request.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detailed_error: String,
    #[serde(default)]
    pub status_code: u16,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id: {}, status: {})", self.message, self.id, self.status_code)?;
        if !self.detailed_error.is_empty() {
            write!(f, ": {}", self.detailed_error)?;
        }
        Ok(())
    }
}

impl Error {
    pub fn other(s: impl Into<String>) -> Self {
        Error::Other(s.into())
    }
}
