//! Password reset flow.
//!
//! A three-step chain: request a code for the identifier, verify it to
//! obtain a single-use temp token, then submit the new password together
//! with that token. The token is what proves the chain was not skipped; it
//! is discarded on completion, cancellation, or flow restart.
//!
//! # Tracing Events
//!
//! - `auth.reset.code_requested` - Reset code dispatched
//! - `auth.reset.verified` - Identifier verified, temp token held
//! - `auth.reset.completed` - Password changed
//! - `auth.reset.rejected` - Backend rejected a step

use std::time::SystemTime;

use tokio::sync::Mutex;

use super::{FlowPhase, OpSlot, VerifyOutcome};
use crate::backend::{
    AuthBackend, CodeRequest, CodeVerification, PasswordResetSubmission, TempToken,
};
use crate::challenge::{Challenge, ChallengeChannel};
use crate::config::AuthConfig;
use crate::cooldown::{CooldownState, CooldownTimer};
use crate::error::{AuthError, Result};
use crate::identifier::Identifier;

/// What the final reset step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Completed,
    /// The attempt was cancelled while the call was in flight; the result
    /// was discarded.
    Cancelled,
}

struct ResetState {
    phase: FlowPhase,
    ops: OpSlot,
    identifier: Option<Identifier>,
    challenge: Option<Challenge>,
    cooldown: CooldownTimer,
    temp_token: Option<TempToken>,
}

impl ResetState {
    fn new() -> Self {
        Self {
            phase: FlowPhase::Idle,
            ops: OpSlot::default(),
            identifier: None,
            challenge: None,
            cooldown: CooldownTimer::new(),
            temp_token: None,
        }
    }

    /// Drop everything belonging to the attempt, keeping the operation
    /// slot so stale in-flight results still fail the generation check.
    fn clear_attempt(&mut self) {
        self.identifier = None;
        self.challenge = None;
        self.cooldown.cancel();
        self.temp_token = None;
    }
}

/// Drives one password-reset attempt.
pub struct PasswordResetFlow<B: AuthBackend> {
    backend: B,
    config: AuthConfig,
    state: Mutex<ResetState>,
}

impl<B: AuthBackend> PasswordResetFlow<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, AuthConfig::default())
    }

    pub fn with_config(backend: B, config: AuthConfig) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(ResetState::new()),
        }
    }

    /// Dispatch a reset code to the identifier.
    ///
    /// Starting over with a different identifier restarts the flow and
    /// discards any temp token from the earlier chain. Re-requesting for
    /// the same identifier is a resend and is gated by the cooldown.
    pub async fn request_code(&self, raw_identifier: &str) -> Result<CooldownState> {
        let identifier = Identifier::classify(raw_identifier, &self.config.identifier);
        if !identifier.is_recognized() {
            return Err(AuthError::invalid_input(
                "Enter a valid email address or mobile number",
            ));
        }

        let (generation, request, channel) = {
            let mut state = self.state.lock().await;
            let same_target = state
                .identifier
                .as_ref()
                .map(|held| held.value == identifier.value)
                .unwrap_or(false);
            if same_target {
                if !state.cooldown.resend_allowed() {
                    return Err(AuthError::rate_limited(
                        state.cooldown.state().remaining_seconds as u64,
                    ));
                }
            } else {
                // Flow restart: the old chain's token and challenge die.
                state.challenge = None;
                state.temp_token = None;
                state.cooldown.cancel();
            }

            let channel = ChallengeChannel::for_identifier(&identifier)
                .ok_or_else(|| AuthError::invalid_input("Identifier has no dispatch channel"))?;
            let request = CodeRequest {
                channel: identifier.kind,
                value: identifier.value.clone(),
                verified_value: None,
            };
            state.identifier = Some(identifier);
            (state.ops.begin(), request, channel)
        };

        let result = self.backend.request_code(&request).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            return Ok(state.cooldown.state());
        }

        match result {
            Ok(issued) => {
                state.challenge = Some(Challenge::otp_until(
                    channel,
                    request.value.clone(),
                    issued.expires_at,
                    self.config.otp.max_attempts,
                ));
                state.cooldown.start(self.config.otp.resend_cooldown_secs);
                state.phase = FlowPhase::ChallengeActive;
                tracing::info!(
                    target: "auth.reset.code_requested",
                    channel = ?channel,
                    "Reset code dispatched"
                );
                Ok(state.cooldown.state())
            }
            Err(e) => Err(e),
        }
    }

    /// Resend the code to the identifier already on the flow.
    pub async fn resend_code(&self) -> Result<CooldownState> {
        let raw = {
            let state = self.state.lock().await;
            state
                .identifier
                .as_ref()
                .map(|identifier| identifier.value.clone())
                .ok_or_else(|| AuthError::invalid_input("No reset in progress"))?
        };
        self.request_code(&raw).await
    }

    /// Verify the dispatched code; on success the flow holds the temp token
    /// for the final step.
    pub async fn verify_code(&self, code: &str) -> Result<VerifyOutcome> {
        let code = code.trim();
        let (generation, verification) = {
            let mut state = self.state.lock().await;
            let challenge = state
                .challenge
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No code requested"))?;
            if challenge.is_expired(SystemTime::now()) {
                state.challenge = None;
                state.cooldown.cancel();
                return Err(AuthError::CodeExpired);
            }
            if !is_code_shape(code, self.config.otp.code_length) {
                return Err(AuthError::invalid_input(format!(
                    "Enter the {}-digit code",
                    self.config.otp.code_length
                )));
            }
            let identifier = state
                .identifier
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No reset in progress"))?;
            let verification = CodeVerification {
                channel: identifier.kind,
                value: identifier.value.clone(),
                otp: code.to_string(),
            };
            (state.ops.begin(), verification)
        };

        let result = self.backend.verify_code(&verification).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            return Ok(VerifyOutcome::Cancelled);
        }

        match result {
            Ok(proof) => {
                let token = proof
                    .token
                    .ok_or_else(|| AuthError::backend("malformed response: missing token"))?;
                state.challenge = None;
                state.cooldown.cancel();
                state.temp_token = Some(TempToken::new(token));
                state.phase = FlowPhase::Verified;
                tracing::info!(target: "auth.reset.verified", "Reset identifier verified");
                Ok(VerifyOutcome::Verified)
            }
            Err(e) if e.requires_new_code() => {
                state.challenge = None;
                state.cooldown.cancel();
                Err(e)
            }
            Err(AuthError::CodeMismatch) => {
                if let Some(challenge) = state.challenge.as_mut() {
                    challenge.record_failure();
                }
                Err(AuthError::CodeMismatch)
            }
            // Transient failure: the challenge stands.
            Err(e) => Err(e),
        }
    }

    /// Submit the new password, presenting the temp token.
    ///
    /// Without a token from a completed verification step this fails
    /// locally; the chain cannot be skipped.
    pub async fn reset_password(&self, new_password: &str) -> Result<ResetOutcome> {
        if new_password.is_empty() {
            return Err(AuthError::invalid_input("Choose a new password"));
        }

        let (generation, submission) = {
            let mut state = self.state.lock().await;
            let identifier = state
                .identifier
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No reset in progress"))?;
            let token = state
                .temp_token
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("Verify your identifier first"))?;
            let submission = PasswordResetSubmission {
                identifier: identifier.value.clone(),
                password: new_password.to_string(),
                identifier_type: identifier.kind,
                temp_token: token.as_str().to_string(),
            };
            state.phase = FlowPhase::Submitting;
            (state.ops.begin(), submission)
        };

        let result = self.backend.reset_password(&submission).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            return Ok(ResetOutcome::Cancelled);
        }

        match result {
            Ok(()) => {
                // Completed chain: the token is spent.
                state.clear_attempt();
                state.phase = FlowPhase::Success;
                tracing::info!(target: "auth.reset.completed", "Password reset completed");
                Ok(ResetOutcome::Completed)
            }
            Err(e) => {
                state.phase = FlowPhase::Verified;
                tracing::info!(target: "auth.reset.rejected", error = %e, "Password reset rejected");
                Err(e)
            }
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

    /// Abandon the attempt, discarding the temp token and challenge.
    pub async fn cancel(&self) {
        let mut state = self.state.lock().await;
        state.ops.invalidate();
        state.clear_attempt();
        state.phase = FlowPhase::Idle;
    }
}

fn is_code_shape(code: &str, expected_len: usize) -> bool {
    code.len() == expected_len && code.chars().all(|c| c.is_ascii_digit())
}
