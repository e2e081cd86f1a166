//! Error types for the Zolari core library.
//!
//! Uses `thiserror` for public API error types, one enum per failure domain:
//! authentication, result fetching, submission and configuration.

use std::path::PathBuf;

/// Top-level error type for the Zolari core library.
#[derive(Debug, thiserror::Error)]
pub enum ZolariError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the identity provider handshake and session storage.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No pending login found for this redirect")]
    NoPendingLogin,

    #[error("Redirect state parameter mismatch")]
    StateMismatch,

    #[error("Identity provider returned '{error}': {description}")]
    Provider { error: String, description: String },

    #[error("Login redirect failed: {message}")]
    Redirect { message: String },

    #[error("Token exchange failed: {message}")]
    TokenExchange { message: String },

    #[error("Token refresh failed: {message}")]
    Refresh { message: String },

    #[error("Profile lookup failed: {message}")]
    Profile { message: String },

    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },

    #[error("Session storage failed: {message}")]
    Storage { message: String },
}

/// Errors from the results endpoint.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced inline by the request form.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Research topic cannot be empty.")]
    EmptyTopic,

    #[error("You must be logged in to submit research.")]
    NotSignedIn,

    #[error("Failed to submit research. Please try again.")]
    Rejected,
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `ZolariError`.
pub type Result<T> = std::result::Result<T, ZolariError>;
