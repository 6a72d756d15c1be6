//! HTTP implementation of the backend contract.
//!
//! The wire convention is a JSON envelope with a numeric `status`: `1` for
//! success, `2` for success-but-challenge-pending, `0` for failure with a
//! human-readable `message`. Decoding folds that envelope into the domain
//! types and the error taxonomy; nothing is retried automatically.

use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::types::{
    CodeIssued, CodeProof, CodeRequest, CodeVerification, LoginReply, LoginSubmission,
    PasswordResetSubmission, RegistrationSubmission, TwoFactorType,
};
use super::AuthBackend;
use crate::error::{AuthError, Result};
use crate::session::{SessionToken, UserRecord};

const REQUEST_CODE_PATH: &str = "auth/otp/request";
const VERIFY_CODE_PATH: &str = "auth/otp/verify";
const LOGIN_PATH: &str = "auth/login";
const REGISTER_PATH: &str = "auth/register";
const RESET_PASSWORD_PATH: &str = "auth/password/reset";

/// Default request timeout.
const TIMEOUT_SECONDS: u64 = 30;

/// Backend client over the storefront's REST API.
#[derive(Clone)]
pub struct HttpAuthBackend {
    client: reqwest::Client,
    base: Url,
}

impl HttpAuthBackend {
    /// Create a client against a base URL with the default timeout.
    pub fn new(base: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self { client, base })
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    async fn post<B: Serialize, W: DeserializeOwned>(&self, path: &str, body: &B) -> Result<W> {
        let url = self.base.join(path)?;
        tracing::debug!(target: "auth.backend", path, "POST");
        let response = self.client.post(url).json(body).send().await?;
        Ok(response.json::<W>().await?)
    }
}

#[async_trait::async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn request_code(&self, req: &CodeRequest) -> Result<CodeIssued> {
        let wire: RequestCodeWire = self.post(REQUEST_CODE_PATH, req).await?;
        map_request_code(wire)
    }

    async fn verify_code(&self, req: &CodeVerification) -> Result<CodeProof> {
        let wire: VerifyCodeWire = self.post(VERIFY_CODE_PATH, req).await?;
        map_verify_code(wire)
    }

    async fn login(&self, req: &LoginSubmission) -> Result<LoginReply> {
        let wire: LoginWire = self.post(LOGIN_PATH, req).await?;
        map_login(wire, req.two_factor_code.is_some())
    }

    async fn register(&self, req: &RegistrationSubmission) -> Result<UserRecord> {
        let wire: RegisterWire = self.post(REGISTER_PATH, req).await?;
        map_register(wire)
    }

    async fn reset_password(&self, req: &PasswordResetSubmission) -> Result<()> {
        let wire: StatusWire = self.post(RESET_PASSWORD_PATH, req).await?;
        match wire.status {
            1 => Ok(()),
            _ => Err(AuthError::backend(failure_message(wire.message))),
        }
    }
}

// ============================================================================
// Wire envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RequestCodeWire {
    status: u8,
    message: Option<String>,
    #[serde(rename = "otpExpiry")]
    otp_expiry: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VerifyCodeWire {
    status: u8,
    message: Option<String>,
    token: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginWire {
    status: u8,
    message: Option<String>,
    token: Option<String>,
    data: Option<UserRecord>,
    two_factor_type: Option<TwoFactorType>,
}

#[derive(Debug, Deserialize)]
struct RegisterWire {
    status: u8,
    message: Option<String>,
    data: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
struct StatusWire {
    status: u8,
    message: Option<String>,
}

// ============================================================================
// Envelope decoding
// ============================================================================

fn failure_message(message: Option<String>) -> String {
    message.unwrap_or_else(|| "request failed".to_string())
}

fn map_request_code(wire: RequestCodeWire) -> Result<CodeIssued> {
    match wire.status {
        1 => {
            let secs = wire
                .otp_expiry
                .ok_or_else(|| AuthError::backend("malformed response: missing otpExpiry"))?;
            Ok(CodeIssued {
                expires_at: SystemTime::now() + Duration::from_secs(secs),
            })
        }
        _ => Err(AuthError::backend(failure_message(wire.message))),
    }
}

fn map_verify_code(wire: VerifyCodeWire) -> Result<CodeProof> {
    match wire.status {
        1 => Ok(CodeProof {
            token: wire.token,
            email: wire.email,
        }),
        _ => {
            // The backend reports every OTP failure as status 0 with a
            // message; classify it back into the taxonomy.
            let message = failure_message(wire.message).to_lowercase();
            if message.contains("expire") {
                Err(AuthError::CodeExpired)
            } else if message.contains("attempt") {
                Err(AuthError::AttemptsExhausted)
            } else {
                Err(AuthError::CodeMismatch)
            }
        }
    }
}

fn map_login(wire: LoginWire, had_second_factor_code: bool) -> Result<LoginReply> {
    match wire.status {
        1 => {
            let token = wire
                .token
                .ok_or_else(|| AuthError::backend("malformed response: missing token"))?;
            let user = wire
                .data
                .ok_or_else(|| AuthError::backend("malformed response: missing user record"))?;
            Ok(LoginReply::Authenticated {
                token: SessionToken::new(token),
                user,
            })
        }
        2 => {
            let kind = wire
                .two_factor_type
                .ok_or_else(|| AuthError::backend("malformed response: missing two_factor_type"))?;
            Ok(LoginReply::SecondFactorRequired { kind: kind.into() })
        }
        _ => {
            if let Some(message) = &wire.message {
                tracing::debug!(target: "auth.backend", message, "Login rejected");
            }
            // A rejected second-factor code is a code failure; anything else
            // stays a generic credential rejection to avoid enumeration.
            if had_second_factor_code {
                Err(AuthError::CodeMismatch)
            } else {
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

fn map_register(wire: RegisterWire) -> Result<UserRecord> {
    match wire.status {
        1 => wire
            .data
            .ok_or_else(|| AuthError::backend("malformed response: missing user record")),
        _ => {
            let message = failure_message(wire.message);
            let lowered = message.to_lowercase();
            if lowered.contains("already") || lowered.contains("exist") {
                Err(AuthError::duplicate_identifier(message))
            } else {
                Err(AuthError::backend(message))
            }
        }
    }
}
