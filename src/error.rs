//! Error handling for Trail Counter

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port open/configuration failure
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// Scanner reset line failure
    #[error("Scanner reset error: {0}")]
    Scanner(String),

    /// Log file append/read/truncate failure
    #[error("Persistence error ({path}): {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config error
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an IO error with the log file it happened on
    pub fn persistence(path: &std::path::Path, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.display().to_string(),
            source,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::Serial(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERIAL_ERROR",
                e.to_string(),
            ),
            Error::Scanner(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SCANNER_ERROR",
                msg.clone(),
            ),
            Error::Persistence { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                self.to_string(),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
