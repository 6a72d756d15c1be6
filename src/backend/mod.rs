//! The backend collaborator contract.
//!
//! Everything the flows need from the server fits in the narrow
//! [`AuthBackend`] seam: code dispatch and verification, credential
//! authentication, registration, and the password-reset completion. All
//! calls are asynchronous and retried only on explicit user action.

mod http;
mod types;

pub use http::HttpAuthBackend;
pub use types::{
    CodeIssued, CodeProof, CodeRequest, CodeVerification, LoginReply, LoginSubmission,
    PasswordResetSubmission, RegistrationSubmission, TempToken, TwoFactorType,
};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::UserRecord;

/// The backend's side of the identity protocol.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Dispatch a one-time code over the channel's transport.
    ///
    /// A repeat request for the same channel and identifier invalidates the
    /// previously dispatched code server-side.
    async fn request_code(&self, req: &CodeRequest) -> Result<CodeIssued>;

    /// Verify a dispatched code.
    ///
    /// Codes are single-use: a successful verification consumes the
    /// challenge, so presenting the same code again must fail.
    async fn verify_code(&self, req: &CodeVerification) -> Result<CodeProof>;

    /// Authenticate an identifier and password, optionally with a
    /// second-factor code on re-submission.
    async fn login(&self, req: &LoginSubmission) -> Result<LoginReply>;

    /// Create the account. Rejects duplicate identifiers.
    async fn register(&self, req: &RegistrationSubmission) -> Result<UserRecord>;

    /// Complete a password reset. Requires the temp token issued by the
    /// verification step; without it the chain cannot be completed.
    async fn reset_password(&self, req: &PasswordResetSubmission) -> Result<()>;
}

#[async_trait]
impl<B: AuthBackend + ?Sized> AuthBackend for Arc<B> {
    async fn request_code(&self, req: &CodeRequest) -> Result<CodeIssued> {
        (**self).request_code(req).await
    }

    async fn verify_code(&self, req: &CodeVerification) -> Result<CodeProof> {
        (**self).verify_code(req).await
    }

    async fn login(&self, req: &LoginSubmission) -> Result<LoginReply> {
        (**self).login(req).await
    }

    async fn register(&self, req: &RegistrationSubmission) -> Result<UserRecord> {
        (**self).register(req).await
    }

    async fn reset_password(&self, req: &PasswordResetSubmission) -> Result<()> {
        (**self).reset_password(req).await
    }
}
