//! Request and response types for the backend contract.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::challenge::ChallengeKind;
use crate::identifier::IdentifierKind;
use crate::session::{SessionToken, UserRecord};

/// Ask the backend to dispatch a one-time code over a channel.
#[derive(Debug, Clone, Serialize)]
pub struct CodeRequest {
    /// Dispatch channel: `email` or `mobile`.
    #[serde(rename = "type")]
    pub channel: IdentifierKind,
    /// The identifier to dispatch to.
    pub value: String,
    /// An already-verified value on the other channel, for context.
    #[serde(rename = "verifiedValue", skip_serializing_if = "Option::is_none")]
    pub verified_value: Option<String>,
}

/// Acknowledgement that a code was dispatched.
#[derive(Debug, Clone)]
pub struct CodeIssued {
    /// When the dispatched code stops being accepted.
    pub expires_at: SystemTime,
}

/// Present a one-time code for verification.
#[derive(Debug, Clone, Serialize)]
pub struct CodeVerification {
    #[serde(rename = "type")]
    pub channel: IdentifierKind,
    pub value: String,
    pub otp: String,
}

/// Result of a successful code verification.
#[derive(Debug, Clone)]
pub struct CodeProof {
    /// Proof token chaining this verification to the next step, when the
    /// backend issues one (it always does for password reset).
    pub token: Option<String>,
    /// Email on file for the verified identifier, when the backend knows it.
    pub email: Option<String>,
}

/// A short-lived, single-use token binding the steps of one sensitive flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempToken(String);

impl TempToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Credential submission, with the second-factor code on re-submission.
#[derive(Debug, Clone, Serialize)]
pub struct LoginSubmission {
    #[serde(rename = "type")]
    pub channel: IdentifierKind,
    pub value: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_factor_code: Option<String>,
}

/// Outcome of a login submission.
///
/// A required second factor is a control-flow branch, not an error.
#[derive(Debug, Clone)]
pub enum LoginReply {
    /// Fully authenticated: the backend issued the session credential.
    Authenticated {
        token: SessionToken,
        user: UserRecord,
    },
    /// The password was accepted but a second factor must be presented.
    SecondFactorRequired { kind: ChallengeKind },
}

/// Registration submission. Proven channels are enforced by the flow before
/// this is ever built; the backend re-checks server-side.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSubmission {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub mobile: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}

/// Final step of the password-reset chain.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetSubmission {
    pub identifier: String,
    pub password: String,
    #[serde(rename = "identifierType")]
    pub identifier_type: IdentifierKind,
    #[serde(rename = "tempToken")]
    pub temp_token: String,
}

/// Wire value of `two_factor_type` in a `status: 2` login response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorType {
    Otp,
    Authenticator,
}

impl From<TwoFactorType> for ChallengeKind {
    fn from(kind: TwoFactorType) -> Self {
        match kind {
            TwoFactorType::Otp => ChallengeKind::Otp,
            TwoFactorType::Authenticator => ChallengeKind::Authenticator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_request_wire_shape() {
        let req = CodeRequest {
            channel: IdentifierKind::Mobile,
            value: "9876543210".to_string(),
            verified_value: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "mobile");
        assert_eq!(json["value"], "9876543210");
        assert!(json.get("verifiedValue").is_none());

        let req = CodeRequest {
            verified_value: Some("a@b.com".to_string()),
            ..req
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["verifiedValue"], "a@b.com");
    }

    #[test]
    fn test_login_submission_omits_absent_code() {
        let req = LoginSubmission {
            channel: IdentifierKind::Email,
            value: "a@b.com".to_string(),
            password: "pw".to_string(),
            two_factor_code: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "email");
        assert!(json.get("two_factor_code").is_none());
    }

    #[test]
    fn test_reset_submission_wire_names() {
        let req = PasswordResetSubmission {
            identifier: "a@b.com".to_string(),
            password: "new-pw".to_string(),
            identifier_type: IdentifierKind::Email,
            temp_token: "tok".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["identifierType"], "email");
        assert_eq!(json["tempToken"], "tok");
    }

    #[test]
    fn test_two_factor_type_parsing() {
        let kind: TwoFactorType = serde_json::from_str("\"otp\"").unwrap();
        assert_eq!(ChallengeKind::from(kind), ChallengeKind::Otp);
        let kind: TwoFactorType = serde_json::from_str("\"authenticator\"").unwrap();
        assert_eq!(ChallengeKind::from(kind), ChallengeKind::Authenticator);
    }
}
