//! Request error taxonomy and HTTP mapping.
//!
//! Three classes, resolved at the single orchestration boundary:
//!
//! - Configuration errors (missing key material): client error before any
//!   cryptographic work
//! - Key/format errors (undecodable keys, wrong passphrase, bad message
//!   structure): client error carrying the underlying message
//! - Crypto operation faults (I/O mid-stream, anything not attributable
//!   to bad input): server error
//!
//! Nothing here is retried: key and format errors are deterministic, so
//! retrying without fixing the input cannot succeed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sealpost_pgp::{KeyError, MessageError};
use thiserror::Error;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required configuration value is missing.
    ///
    /// Raised before any base64 decoding or cryptographic work; the
    /// message names the value so operators can fix the deployment.
    #[error("please add a base64 encoded key to a configuration value called {name}")]
    Configuration {
        /// Logical configuration name (e.g. `pgp-public-key`)
        name: &'static str,
    },

    /// A configuration value is not valid base64
    #[error("configuration value {name} is not valid base64: {source}")]
    InvalidBase64 {
        /// Logical configuration name
        name: &'static str,
        /// Decoder error
        source: base64::DecodeError,
    },

    /// Key material failed to parse or unlock
    #[error("{0}")]
    KeyFormat(#[from] KeyError),

    /// Failure inside the cryptographic core.
    ///
    /// Client errors (malformed structures) map to 400; environment
    /// faults (I/O) map to 500.
    #[error("{0}")]
    Crypto(#[from] MessageError),

    /// Function key missing or wrong
    #[error("unauthorized")]
    Unauthorized,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } | Self::InvalidBase64 { .. } | Self::KeyFormat(_) => {
                StatusCode::BAD_REQUEST
            },
            Self::Crypto(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
            // Internal detail stays in the logs
            (status, "internal error".to_string()).into_response()
        } else {
            (status, self.to_string()).into_response()
        }
    }
}
