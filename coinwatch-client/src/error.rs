//! Error types and user-facing messages.

use http::StatusCode;
use thiserror::Error;

/// Generic transport failure, shown when the backend cannot be reached.
pub const NETWORK_FAILURE: &str = "خطایی رخ داده است، مجددا تلاش کنید!";
/// Returned without a network call while the circuit breaker is open.
pub const SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable";
/// Returned when a request already used its single refresh attempt.
pub const REFRESH_EXHAUSTED: &str = "Token refresh failed or maximum retries reached";
/// Refresh endpoint rejected the session and sent no usable message.
pub const REFRESH_FAILED: &str = "Token refresh failed";
/// Refresh endpoint could not be reached.
pub const REFRESH_NETWORK_FAILURE: &str = "Token refresh failed due to network error";
/// Login rejected without a server message.
pub const LOGIN_REJECTED: &str = "نام کاربری یا رمز عبور نادرست است";
/// Login could not reach the backend.
pub const LOGIN_FAILED: &str = "ورود با شکست مواجه شد، مجددا تلاش کنید!";
/// Signup failed.
pub const SIGNUP_FAILED: &str = "پروسه ثبت نام با مشکل مواجه شد، مجددا تلاش کنید!";
/// Email verification failed.
pub const VERIFY_FAILED: &str = "تائید ایمیل با شکست مواجه شد!";
/// Logout failed.
pub const LOGOUT_FAILED: &str = "خروج با شکست مواجه شد!";
/// Auth state could not be determined.
pub const AUTH_STATE_FAILED: &str = "خطا در دریافت وضعیت احراز هویت";
/// Premium upgrade rejected without a server message.
pub const UPGRADE_FAILED: &str = "درخواست ناموفق بود";

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// The client could not be constructed.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Why an API call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The request never produced a response, or the body could not be read.
    Transport,
    /// The circuit breaker short-circuited the call.
    CircuitOpen,
    /// The backend answered with a non-2xx status.
    Status(StatusCode),
    /// A 401 could not be recovered by refreshing the session.
    Refresh,
    /// The body did not match any accepted shape.
    Decode,
}

/// A failed API call: classification plus a message fit for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    failure: Failure,
    message: String,
}

/// Result of a typed API call.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(failure: Failure, message: impl Into<String>) -> Self {
        ApiError {
            failure,
            message: message.into(),
        }
    }

    pub(crate) fn decode(what: &str, detail: impl std::fmt::Display) -> Self {
        ApiError::new(
            Failure::Decode,
            format!("unrecognized {what} response: {detail}"),
        )
    }

    pub fn failure(&self) -> Failure {
        self.failure
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, if the backend answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self.failure {
            Failure::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Replaces the message, keeping the classification.
    pub fn with_message(self, message: impl Into<String>) -> Self {
        ApiError {
            failure: self.failure,
            message: message.into(),
        }
    }

    /// Whether retrying could help.
    ///
    /// Client errors other than 401 and unrecognized bodies are final.
    pub fn is_retriable(&self) -> bool {
        match self.failure {
            Failure::Status(status) => {
                !status.is_client_error() || status == StatusCode::UNAUTHORIZED
            }
            Failure::Decode => false,
            Failure::Transport | Failure::CircuitOpen | Failure::Refresh => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_final_except_unauthorized() {
        let status = |code: u16| {
            ApiError::new(Failure::Status(StatusCode::from_u16(code).unwrap()), "x")
        };
        assert!(!status(400).is_retriable());
        assert!(!status(404).is_retriable());
        assert!(status(401).is_retriable());
        assert!(status(500).is_retriable());
        assert!(status(503).is_retriable());
        assert!(ApiError::new(Failure::Transport, "x").is_retriable());
        assert!(!ApiError::new(Failure::Decode, "x").is_retriable());
    }
}
