//! Error taxonomy for the authentication flows.
//!
//! Every backend failure is converted into one of these variants at the call
//! site; none propagate as uncaught faults. A pending second factor is not an
//! error; it is a branch of [`LoginOutcome`](crate::flows::LoginOutcome).

/// The main error type for storefront authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed identifier, password, or profile field. Locally recoverable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resend requested while the cooldown window is still open.
    #[error("Too many requests: retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until a resend is allowed again.
        retry_after_secs: u64,
    },

    /// The one-time code is past its expiry. Requires a fresh code request.
    #[error("Verification code expired")]
    CodeExpired,

    /// The one-time code does not match the outstanding challenge.
    #[error("Incorrect verification code")]
    CodeMismatch,

    /// No verification attempts remain on the challenge.
    #[error("Too many incorrect attempts, request a new code")]
    AttemptsExhausted,

    /// Login rejection. Deliberately generic to avoid identifier enumeration.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration conflict: the identifier is already taken.
    #[error("Already registered: {0}")]
    DuplicateIdentifier(String),

    /// The channel transport (email/SMS) is not available for dispatch.
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Network or backend failure. Retried only on explicit user action.
    #[error("Backend unreachable: {0}")]
    ServerUnreachable(String),

    /// The backend rejected the request with a human-readable message.
    #[error("{0}")]
    Backend(String),
}

impl AuthError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn duplicate_identifier(msg: impl Into<String>) -> Self {
        Self::DuplicateIdentifier(msg.into())
    }

    pub fn channel_unavailable(msg: impl Into<String>) -> Self {
        Self::ChannelUnavailable(msg.into())
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::ServerUnreachable(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether the challenge is dead and the user must request a fresh code.
    pub fn requires_new_code(&self) -> bool {
        matches!(self, Self::CodeExpired | Self::AttemptsExhausted)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::ServerUnreachable("request timed out".into())
        } else if err.is_connect() {
            AuthError::ServerUnreachable(format!("connection error: {err}"))
        } else if err.is_status() {
            AuthError::Backend(format!("upstream error: {err}"))
        } else {
            AuthError::ServerUnreachable(format!("request error: {err}"))
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Backend(format!("malformed response: {err}"))
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::InvalidInput(format!("invalid URL: {err}"))
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_credentials_message_is_generic() {
        // Enumeration safety: the message must not reveal which part failed.
        let err = AuthError::InvalidCredentials;
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_rate_limited_carries_remaining_time() {
        let err = AuthError::rate_limited(23);
        assert!(matches!(
            err,
            AuthError::RateLimited {
                retry_after_secs: 23
            }
        ));
        assert!(err.to_string().contains("23"));
    }

    #[test]
    fn test_requires_new_code() {
        assert!(AuthError::CodeExpired.requires_new_code());
        assert!(AuthError::AttemptsExhausted.requires_new_code());
        assert!(!AuthError::CodeMismatch.requires_new_code());
        assert!(!AuthError::InvalidCredentials.requires_new_code());
    }

    #[test]
    fn test_from_serde_json_error() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: AuthError = result.unwrap_err().into();
        assert!(matches!(err, AuthError::Backend(_)));
        assert!(err.to_string().contains("malformed response"));
    }

    #[test]
    fn test_backend_message_passthrough() {
        let err = AuthError::backend("Mobile number already registered");
        assert_eq!(err.to_string(), "Mobile number already registered");
    }
}
