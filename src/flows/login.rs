//! Login flow with optional second factor.
//!
//! One [`LoginFlow`] instance drives one sign-in attempt: submit
//! credentials, satisfy a second-factor challenge if the backend demands
//! one, and establish the session. A failed second-factor entry does not
//! invalidate the password credential; the user retries the code without
//! re-submitting the password.
//!
//! # Tracing Events
//!
//! - `auth.login.rejected` - Credentials rejected
//! - `auth.login.second_factor_required` - Backend demanded a second factor
//! - `auth.login.code_rejected` - Second-factor code rejected
//! - `auth.login.succeeded` - Session issued and persisted
//! - `auth.login.cancelled` - In-flight result discarded after cancellation

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use super::{FlowPhase, OpSlot};
use crate::backend::{AuthBackend, CodeRequest, LoginReply, LoginSubmission};
use crate::challenge::{Challenge, ChallengeChannel, ChallengeKind};
use crate::config::AuthConfig;
use crate::cooldown::{CooldownState, CooldownTimer};
use crate::error::{AuthError, Result};
use crate::identifier::Identifier;
use crate::session::{Role, SessionEstablisher, SessionRecord, SessionStore, SessionToken};

/// What a login step produced.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Fully authenticated; the record is persisted.
    SessionEstablished(SessionRecord),
    /// The password was accepted; a second factor must be presented.
    SecondFactorRequired { kind: ChallengeKind },
    /// The attempt was cancelled while the call was in flight; the result
    /// was discarded.
    Cancelled,
}

struct Credential {
    identifier: Identifier,
    password: SecretString,
}

struct LoginState {
    phase: FlowPhase,
    ops: OpSlot,
    credential: Option<Credential>,
    challenge: Option<Challenge>,
    cooldown: CooldownTimer,
}

impl LoginState {
    fn new() -> Self {
        Self {
            phase: FlowPhase::Idle,
            ops: OpSlot::default(),
            credential: None,
            challenge: None,
            cooldown: CooldownTimer::new(),
        }
    }

    fn clear_attempt(&mut self) {
        self.credential = None;
        self.challenge = None;
        self.cooldown.cancel();
    }
}

/// Drives one sign-in attempt for one storefront role.
pub struct LoginFlow<B: AuthBackend, S: SessionStore> {
    backend: B,
    sessions: SessionEstablisher<S>,
    role: Role,
    config: AuthConfig,
    state: Mutex<LoginState>,
}

impl<B: AuthBackend, S: SessionStore> LoginFlow<B, S> {
    pub fn new(backend: B, sessions: SessionEstablisher<S>, role: Role) -> Self {
        Self::with_config(backend, sessions, role, AuthConfig::default())
    }

    pub fn with_config(
        backend: B,
        sessions: SessionEstablisher<S>,
        role: Role,
        config: AuthConfig,
    ) -> Self {
        Self {
            backend,
            sessions,
            role,
            config,
            state: Mutex::new(LoginState::new()),
        }
    }

    /// The session surface for this role, readable by collaborator screens.
    pub fn sessions(&self) -> &SessionEstablisher<S> {
        &self.sessions
    }

    /// Submit identifier and password.
    pub async fn login(&self, raw_identifier: &str, password: &str) -> Result<LoginOutcome> {
        let identifier = Identifier::classify(raw_identifier, &self.config.identifier);
        if !identifier.is_recognized() {
            return Err(AuthError::invalid_input(
                "Enter a valid email address or mobile number",
            ));
        }
        if password.is_empty() {
            return Err(AuthError::invalid_input("Enter your password"));
        }

        let submission = LoginSubmission {
            channel: identifier.kind,
            value: identifier.value.clone(),
            password: password.to_string(),
            two_factor_code: None,
        };

        let generation = {
            let mut state = self.state.lock().await;
            state.clear_attempt();
            state.credential = Some(Credential {
                identifier,
                password: SecretString::from(password.to_string()),
            });
            state.phase = FlowPhase::Submitting;
            state.ops.begin()
        };

        let reply = self.backend.login(&submission).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            tracing::debug!(target: "auth.login.cancelled", "Discarding stale login result");
            return Ok(LoginOutcome::Cancelled);
        }

        match reply {
            Ok(LoginReply::Authenticated { token, user }) => {
                drop(state);
                self.establish(generation, token, user).await
            }
            Ok(LoginReply::SecondFactorRequired { kind }) => {
                let challenge = {
                    let credential = state.credential.as_ref().ok_or_else(|| {
                        AuthError::backend("challenge without pending credential")
                    })?;
                    self.second_factor_challenge(kind, credential)?
                };
                state.challenge = Some(challenge);
                if kind == ChallengeKind::Otp {
                    // The backend dispatched a code as part of this reply.
                    state.cooldown.start(self.config.otp.resend_cooldown_secs);
                }
                state.phase = FlowPhase::ChallengeActive;
                tracing::info!(
                    target: "auth.login.second_factor_required",
                    kind = ?kind,
                    "Second factor required"
                );
                Ok(LoginOutcome::SecondFactorRequired { kind })
            }
            Err(e) => {
                state.phase = FlowPhase::Failed;
                state.clear_attempt();
                tracing::info!(target: "auth.login.rejected", error = %e, "Login rejected");
                Err(e)
            }
        }
    }

    /// Present a second-factor code for the pending challenge.
    pub async fn verify_second_factor(&self, code: &str) -> Result<LoginOutcome> {
        let code = code.trim();

        let (generation, submission) = {
            let mut state = self.state.lock().await;
            let challenge = state
                .challenge
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No second factor pending"))?;

            if challenge.is_expired(std::time::SystemTime::now()) {
                // The code is dead. The challenge slot stays so the OTP
                // variant can still request a fresh code.
                return Err(AuthError::CodeExpired);
            }

            let expected_len = match challenge.kind {
                ChallengeKind::Otp => self.config.otp.code_length,
                ChallengeKind::Authenticator => self.config.second_factor.authenticator_digits,
            };
            if !is_code_shape(code, expected_len) {
                return Err(AuthError::invalid_input(format!(
                    "Enter the {expected_len}-digit code"
                )));
            }

            let credential = state
                .credential
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No sign-in attempt pending"))?;
            let submission = LoginSubmission {
                channel: credential.identifier.kind,
                value: credential.identifier.value.clone(),
                password: credential.password.expose_secret().to_string(),
                two_factor_code: Some(code.to_string()),
            };
            state.phase = FlowPhase::Submitting;
            (state.ops.begin(), submission)
        };

        let reply = self.backend.login(&submission).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            tracing::debug!(target: "auth.login.cancelled", "Discarding stale verification result");
            return Ok(LoginOutcome::Cancelled);
        }

        match reply {
            Ok(LoginReply::Authenticated { token, user }) => {
                drop(state);
                self.establish(generation, token, user).await
            }
            Ok(LoginReply::SecondFactorRequired { .. }) => {
                state.phase = FlowPhase::ChallengeActive;
                Err(AuthError::backend("unexpected repeat challenge"))
            }
            Err(e @ (AuthError::AttemptsExhausted | AuthError::CodeExpired)) => {
                // The backend declared the challenge dead: the attempt is
                // rejected and the password must be re-submitted.
                state.phase = FlowPhase::Failed;
                state.clear_attempt();
                tracing::warn!(target: "auth.login.code_rejected", error = %e, "Challenge dead");
                Err(e)
            }
            Err(AuthError::CodeMismatch) => {
                let remaining = state
                    .challenge
                    .as_mut()
                    .map(Challenge::record_failure)
                    .unwrap_or(0);
                if remaining == 0 {
                    // Attempts exhausted: the whole attempt is rejected and
                    // the password must be re-submitted.
                    state.phase = FlowPhase::Failed;
                    state.clear_attempt();
                    tracing::warn!(
                        target: "auth.login.code_rejected",
                        "Second-factor attempts exhausted"
                    );
                    return Err(AuthError::AttemptsExhausted);
                }
                // The password credential stays valid for another try.
                state.phase = FlowPhase::ChallengeActive;
                tracing::info!(
                    target: "auth.login.code_rejected",
                    attempts_remaining = remaining,
                    "Second-factor code rejected"
                );
                Err(AuthError::CodeMismatch)
            }
            Err(e) => {
                // Transient failure: challenge and credential stay as they
                // were so the user can retry deliberately.
                state.phase = FlowPhase::ChallengeActive;
                Err(e)
            }
        }
    }

    /// Request a fresh second-factor code.
    ///
    /// Only the OTP variant can be resent, and only once the cooldown
    /// window has elapsed.
    pub async fn resend_code(&self) -> Result<CooldownState> {
        let (generation, request, channel) = {
            let mut state = self.state.lock().await;
            let challenge = state
                .challenge
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No second factor pending"))?;
            if !challenge.allows_resend() {
                return Err(AuthError::invalid_input(
                    "Authenticator codes cannot be resent",
                ));
            }
            if !state.cooldown.resend_allowed() {
                return Err(AuthError::rate_limited(
                    state.cooldown.state().remaining_seconds as u64,
                ));
            }
            let credential = state
                .credential
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No sign-in attempt pending"))?;
            let channel = ChallengeChannel::for_identifier(&credential.identifier)
                .ok_or_else(|| AuthError::invalid_input("Identifier has no dispatch channel"))?;
            let request = CodeRequest {
                channel: credential.identifier.kind,
                value: credential.identifier.value.clone(),
                verified_value: None,
            };
            (state.ops.begin(), request, channel)
        };

        let result = self.backend.request_code(&request).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            return Ok(state.cooldown.state());
        }

        match result {
            Ok(issued) => {
                // The new code supersedes the old challenge and restarts
                // (never stacks) the cooldown.
                state.challenge = Some(Challenge::otp_until(
                    channel,
                    request.value.clone(),
                    issued.expires_at,
                    self.config.second_factor.max_attempts,
                ));
                state.cooldown.start(self.config.otp.resend_cooldown_secs);
                Ok(state.cooldown.state())
            }
            Err(e) => Err(e),
        }
    }

    /// Advance the resend cooldown by one elapsed second.
    pub async fn tick(&self) -> CooldownState {
        self.state.lock().await.cooldown.tick()
    }

    pub async fn cooldown(&self) -> CooldownState {
        self.state.lock().await.cooldown.state()
    }

    pub async fn phase(&self) -> FlowPhase {
        self.state.lock().await.phase
    }

    /// Abandon the attempt: discard the challenge, credential, and any
    /// in-flight result.
    pub async fn cancel(&self) {
        let mut state = self.state.lock().await;
        state.ops.invalidate();
        state.clear_attempt();
        state.phase = FlowPhase::Idle;
    }

    fn second_factor_challenge(
        &self,
        kind: ChallengeKind,
        credential: &Credential,
    ) -> Result<Challenge> {
        let ttl = std::time::Duration::from_secs(self.config.second_factor.ttl_secs);
        let attempts = self.config.second_factor.max_attempts;
        match kind {
            ChallengeKind::Otp => {
                let channel = ChallengeChannel::for_identifier(&credential.identifier)
                    .ok_or_else(|| AuthError::invalid_input("Identifier has no dispatch channel"))?;
                Ok(Challenge::otp(
                    channel,
                    credential.identifier.value.clone(),
                    ttl,
                    attempts,
                ))
            }
            ChallengeKind::Authenticator => Ok(Challenge::authenticator(
                credential.identifier.value.clone(),
                ttl,
                attempts,
            )),
        }
    }

    async fn establish(
        &self,
        generation: u64,
        token: SessionToken,
        user: crate::session::UserRecord,
    ) -> Result<LoginOutcome> {
        let record = SessionRecord {
            token,
            user,
            role: self.role,
        };
        let result = self.sessions.establish(record).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(record) => {
                if state.ops.is_current(generation) {
                    // Completed attempt: all challenge state is cleared.
                    state.phase = FlowPhase::Success;
                    state.clear_attempt();
                }
                tracing::info!(
                    target: "auth.login.succeeded",
                    role = self.role.as_key(),
                    "Login succeeded"
                );
                Ok(LoginOutcome::SessionEstablished(record))
            }
            Err(e) => {
                // Persist failed: never report success.
                state.phase = FlowPhase::Failed;
                Err(e)
            }
        }
    }
}

fn is_code_shape(code: &str, expected_len: usize) -> bool {
    code.len() == expected_len && code.chars().all(|c| c.is_ascii_digit())
}
