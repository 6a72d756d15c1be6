//! Storefront identity verification and sign-in engine.
//!
//! This crate drives the storefront's registration, login, and
//! password-reset protocols against the REST backend: it classifies
//! identifiers, manages one-time-code challenges and their resend
//! cooldowns, accumulates per-attempt verification proofs, runs the
//! optional second factor, and establishes the persisted session record.
//!
//! # Features
//!
//! - **Identifier classification**: email-or-mobile tagging, re-evaluated
//!   on every edit
//! - **Challenges**: single active challenge per channel, single-use codes,
//!   attempt budgets, expiry
//! - **Cooldowns**: tick-driven resend timers that restart, never stack
//! - **Verification ledger**: proofs bound to exact field values, dropped
//!   when a verified field is edited
//! - **Second factor**: OTP-style and authenticator-code challenges behind
//!   one verify/cancel surface
//! - **Sessions**: atomic role-qualified persistence with a single writer
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use storefront_auth::{
//!     HttpAuthBackend, InMemorySessionStore, LoginFlow, Role, SessionEstablisher,
//! };
//!
//! #[tokio::main]
//! async fn main() -> storefront_auth::Result<()> {
//!     storefront_auth::init_tracing();
//!
//!     let backend = HttpAuthBackend::new("https://api.example.shop/".parse()?)?;
//!     let sessions = SessionEstablisher::new(InMemorySessionStore::new());
//!     let flow = LoginFlow::new(backend, sessions, Role::Customer);
//!
//!     let outcome = flow.login("a@b.com", "password").await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod challenge;
mod config;
pub mod cooldown;
mod error;
pub mod flows;
pub mod identifier;
pub mod ledger;
pub mod session;

// Re-exports for public API
pub use backend::{
    AuthBackend, CodeIssued, CodeProof, CodeRequest, CodeVerification, HttpAuthBackend,
    LoginReply, LoginSubmission, PasswordResetSubmission, RegistrationSubmission, TempToken,
};
pub use challenge::{Challenge, ChallengeChannel, ChallengeKind};
pub use config::{AuthConfig, IdentifierPolicy, OtpConfig, SecondFactorConfig};
pub use cooldown::{CooldownState, CooldownTimer};
pub use error::{AuthError, Result};
pub use flows::{
    FlowPhase, LoginFlow, LoginOutcome, PasswordResetFlow, RegisterOutcome, RegistrationFlow,
    RegistrationProfile, ResetOutcome, VerifyOutcome,
};
pub use identifier::{Identifier, IdentifierKind};
pub use ledger::{VerificationLedger, VerificationProof};
pub use session::{
    InMemorySessionStore, Role, SessionEstablisher, SessionRecord, SessionStore, SessionToken,
    UserRecord,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "storefront_auth=debug")
/// - `STOREFRONT_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("STOREFRONT_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
