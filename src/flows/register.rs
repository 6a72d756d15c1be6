//! Registration flow with multi-channel verification.
//!
//! The form carries a primary identifier (email or mobile, classified on
//! every edit) and an optional secondary value on the other channel. Each
//! present channel must be proven through an OTP challenge before the
//! profile can be submitted; the [`VerificationLedger`] holds the proofs and
//! drops any proof whose field was edited out from under it.
//!
//! # Tracing Events
//!
//! - `auth.register.code_requested` - Verification code dispatched
//! - `auth.register.channel_verified` - A channel proof was recorded
//! - `auth.register.rejected` - Backend rejected the submission
//! - `auth.register.succeeded` - Account created

use std::time::SystemTime;

use tokio::sync::Mutex;

use super::{FlowPhase, OpSlot, VerifyOutcome};
use crate::backend::{AuthBackend, CodeRequest, CodeVerification, RegistrationSubmission};
use crate::challenge::{Challenge, ChallengeChannel};
use crate::config::AuthConfig;
use crate::cooldown::{CooldownState, CooldownTimer};
use crate::error::{AuthError, Result};
use crate::identifier::{Identifier, IdentifierKind};
use crate::ledger::{VerificationLedger, VerificationProof};
use crate::session::UserRecord;

/// Profile fields submitted alongside the proven identifiers.
#[derive(Debug, Clone)]
pub struct RegistrationProfile {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub referral_code: Option<String>,
}

/// What a registration submission produced.
#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    Registered(UserRecord),
    /// The attempt was cancelled while the call was in flight; the result
    /// was discarded.
    Cancelled,
}

/// Challenge and cooldown for one dispatch channel.
#[derive(Default)]
struct ChannelSlot {
    challenge: Option<Challenge>,
    cooldown: CooldownTimer,
}

impl ChannelSlot {
    fn clear(&mut self) {
        self.challenge = None;
        self.cooldown.cancel();
    }
}

struct RegState {
    phase: FlowPhase,
    ops: OpSlot,
    primary: Identifier,
    secondary: Identifier,
    ledger: VerificationLedger,
    email_slot: ChannelSlot,
    mobile_slot: ChannelSlot,
}

impl RegState {
    fn new() -> Self {
        Self {
            phase: FlowPhase::Idle,
            ops: OpSlot::default(),
            primary: Identifier {
                kind: IdentifierKind::Unrecognized,
                value: String::new(),
            },
            secondary: Identifier {
                kind: IdentifierKind::Unrecognized,
                value: String::new(),
            },
            ledger: VerificationLedger::new(),
            email_slot: ChannelSlot::default(),
            mobile_slot: ChannelSlot::default(),
        }
    }

    /// The form value currently occupying a channel, if any.
    fn channel_value(&self, channel: ChallengeChannel) -> Option<&str> {
        let kind = match channel {
            ChallengeChannel::Email => IdentifierKind::Email,
            ChallengeChannel::Mobile => IdentifierKind::Mobile,
            ChallengeChannel::Authenticator => return None,
        };
        if self.primary.kind == kind {
            Some(self.primary.value.as_str())
        } else if self.secondary.kind == kind {
            Some(self.secondary.value.as_str())
        } else {
            None
        }
    }

    fn slot_mut(&mut self, channel: ChallengeChannel) -> Option<&mut ChannelSlot> {
        match channel {
            ChallengeChannel::Email => Some(&mut self.email_slot),
            ChallengeChannel::Mobile => Some(&mut self.mobile_slot),
            ChallengeChannel::Authenticator => None,
        }
    }

    /// Re-bind proofs and challenges to the current field values.
    fn sync_channels(&mut self) {
        for channel in [ChallengeChannel::Email, ChallengeChannel::Mobile] {
            let value = self.channel_value(channel).unwrap_or("").to_string();
            self.ledger.sync(channel, &value);
            let slot = match channel {
                ChallengeChannel::Email => &mut self.email_slot,
                ChallengeChannel::Mobile => &mut self.mobile_slot,
                ChallengeChannel::Authenticator => unreachable!(),
            };
            if let Some(challenge) = &slot.challenge {
                if challenge.target != value {
                    slot.clear();
                }
            }
        }
    }

    /// The channels that must be proven, or `None` while a present field is
    /// still unrecognized.
    fn requirements(&self) -> Option<Vec<ChallengeChannel>> {
        let mut required = Vec::with_capacity(2);
        match ChallengeChannel::for_identifier(&self.primary) {
            Some(channel) => required.push(channel),
            None => return None,
        }
        if !self.secondary.value.is_empty() {
            match ChallengeChannel::for_identifier(&self.secondary) {
                Some(channel) => required.push(channel),
                None => return None,
            }
        }
        Some(required)
    }

    fn is_ready(&self) -> bool {
        self.requirements()
            .map(|required| self.ledger.is_complete(&required))
            .unwrap_or(false)
    }

    fn discard_attempt(&mut self) {
        self.ledger.reset();
        self.email_slot.clear();
        self.mobile_slot.clear();
    }
}

/// Drives one sign-up attempt.
pub struct RegistrationFlow<B: AuthBackend> {
    backend: B,
    config: AuthConfig,
    state: Mutex<RegState>,
}

impl<B: AuthBackend> RegistrationFlow<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, AuthConfig::default())
    }

    pub fn with_config(backend: B, config: AuthConfig) -> Self {
        Self {
            backend,
            config,
            state: Mutex::new(RegState::new()),
        }
    }

    /// Update the primary identifier field, re-classifying it.
    ///
    /// Switching the primary between recognized channels discards every
    /// proof and challenge of the attempt: channel identity is not portable
    /// across re-classification. A same-channel edit only drops state bound
    /// to the old value.
    pub async fn set_primary(&self, raw: &str) -> IdentifierKind {
        let identifier = Identifier::classify(raw, &self.config.identifier);
        let mut state = self.state.lock().await;
        let switched = state.primary.is_recognized()
            && identifier.is_recognized()
            && state.primary.kind != identifier.kind;
        state.primary = identifier.clone();
        if switched {
            state.discard_attempt();
        } else {
            state.sync_channels();
        }
        identifier.kind
    }

    /// Update the optional secondary field, re-classifying it.
    pub async fn set_secondary(&self, raw: &str) -> IdentifierKind {
        let identifier = Identifier::classify(raw, &self.config.identifier);
        let mut state = self.state.lock().await;
        state.secondary = identifier.clone();
        state.sync_channels();
        identifier.kind
    }

    /// Dispatch a verification code for a channel.
    pub async fn request_code(&self, channel: ChallengeChannel) -> Result<CooldownState> {
        let (generation, request) = {
            let mut state = self.state.lock().await;
            let value = state
                .channel_value(channel)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AuthError::invalid_input("Nothing to verify on this channel"))?
                .to_string();
            let other = match channel {
                ChallengeChannel::Email => ChallengeChannel::Mobile,
                _ => ChallengeChannel::Email,
            };
            let verified_value = state
                .ledger
                .proof(other)
                .map(|proof| proof.identifier.clone());

            let slot = state
                .slot_mut(channel)
                .ok_or_else(|| AuthError::invalid_input("Channel cannot be dispatched to"))?;
            if !slot.cooldown.resend_allowed() {
                return Err(AuthError::rate_limited(
                    slot.cooldown.state().remaining_seconds as u64,
                ));
            }

            let kind = match channel {
                ChallengeChannel::Email => IdentifierKind::Email,
                _ => IdentifierKind::Mobile,
            };
            let request = CodeRequest {
                channel: kind,
                value,
                verified_value,
            };
            (state.ops.begin(), request)
        };

        let result = self.backend.request_code(&request).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            let slot = match channel {
                ChallengeChannel::Email => &state.email_slot,
                _ => &state.mobile_slot,
            };
            return Ok(slot.cooldown.state());
        }

        match result {
            Ok(issued) => {
                let max_attempts = self.config.otp.max_attempts;
                let window = self.config.otp.resend_cooldown_secs;
                let slot = match channel {
                    ChallengeChannel::Email => &mut state.email_slot,
                    _ => &mut state.mobile_slot,
                };
                // The new code supersedes any outstanding challenge and
                // restarts the cooldown.
                slot.challenge = Some(Challenge::otp_until(
                    channel,
                    request.value.clone(),
                    issued.expires_at,
                    max_attempts,
                ));
                slot.cooldown.start(window);
                let cooldown = slot.cooldown.state();
                state.phase = FlowPhase::ChallengeActive;
                tracing::info!(
                    target: "auth.register.code_requested",
                    channel = ?channel,
                    "Verification code dispatched"
                );
                Ok(cooldown)
            }
            Err(e) => Err(e),
        }
    }

    /// Verify a dispatched code and record the channel proof.
    pub async fn verify_code(&self, channel: ChallengeChannel, code: &str) -> Result<VerifyOutcome> {
        let code = code.trim();
        let (generation, verification) = {
            let mut state = self.state.lock().await;
            let slot = state
                .slot_mut(channel)
                .ok_or_else(|| AuthError::invalid_input("Channel cannot be verified"))?;
            let challenge = slot
                .challenge
                .as_ref()
                .ok_or_else(|| AuthError::invalid_input("No code requested for this channel"))?;

            if challenge.is_expired(SystemTime::now()) {
                slot.clear();
                return Err(AuthError::CodeExpired);
            }
            let target = challenge.target.clone();
            if !is_code_shape(code, self.config.otp.code_length) {
                return Err(AuthError::invalid_input(format!(
                    "Enter the {}-digit code",
                    self.config.otp.code_length
                )));
            }

            let kind = match channel {
                ChallengeChannel::Email => IdentifierKind::Email,
                _ => IdentifierKind::Mobile,
            };
            let verification = CodeVerification {
                channel: kind,
                value: target,
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
                if let Some(slot) = state.slot_mut(channel) {
                    slot.clear();
                }
                state.ledger.record(VerificationProof {
                    channel,
                    identifier: verification.value.clone(),
                    proof_token: proof.token,
                    verified_at: SystemTime::now(),
                });
                state.phase = if state.is_ready() {
                    FlowPhase::Verified
                } else {
                    FlowPhase::ChallengeActive
                };
                tracing::info!(
                    target: "auth.register.channel_verified",
                    channel = ?channel,
                    "Channel verified"
                );
                Ok(VerifyOutcome::Verified)
            }
            Err(e) if e.requires_new_code() => {
                if let Some(slot) = state.slot_mut(channel) {
                    slot.clear();
                }
                Err(e)
            }
            Err(AuthError::CodeMismatch) => {
                if let Some(slot) = state.slot_mut(channel) {
                    if let Some(challenge) = slot.challenge.as_mut() {
                        challenge.record_failure();
                    }
                }
                Err(AuthError::CodeMismatch)
            }
            // Transient failure: the challenge stands, the user retries
            // deliberately.
            Err(e) => Err(e),
        }
    }

    /// Whether every present channel holds a matching proof.
    pub async fn is_ready(&self) -> bool {
        self.state.lock().await.is_ready()
    }

    pub async fn is_verified(&self, channel: ChallengeChannel) -> bool {
        self.state.lock().await.ledger.is_verified(channel)
    }

    /// Submit the profile. Rejected locally unless the ledger is complete
    /// for every present channel.
    pub async fn register(&self, profile: &RegistrationProfile) -> Result<RegisterOutcome> {
        let (generation, submission) = {
            let mut state = self.state.lock().await;
            if profile.first_name.trim().is_empty() || profile.last_name.trim().is_empty() {
                return Err(AuthError::invalid_input("Enter your name"));
            }
            if profile.password.is_empty() {
                return Err(AuthError::invalid_input("Choose a password"));
            }
            if !state.primary.is_recognized() {
                return Err(AuthError::invalid_input(
                    "Enter a valid email address or mobile number",
                ));
            }
            if !state.secondary.value.is_empty() && !state.secondary.is_recognized() {
                return Err(AuthError::invalid_input(
                    "The secondary contact is not a valid email address or mobile number",
                ));
            }
            if !state.is_ready() {
                return Err(AuthError::invalid_input(
                    "Verify your contact details before continuing",
                ));
            }

            let mobile = state
                .channel_value(ChallengeChannel::Mobile)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AuthError::invalid_input("A mobile number is required"))?
                .to_string();
            let email = state
                .channel_value(ChallengeChannel::Email)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let submission = RegistrationSubmission {
                first_name: profile.first_name.trim().to_string(),
                last_name: profile.last_name.trim().to_string(),
                email,
                mobile,
                password: profile.password.clone(),
                referral_code: profile.referral_code.clone(),
            };
            state.phase = FlowPhase::Submitting;
            (state.ops.begin(), submission)
        };

        let result = self.backend.register(&submission).await;

        let mut state = self.state.lock().await;
        if !state.ops.is_current(generation) {
            return Ok(RegisterOutcome::Cancelled);
        }

        match result {
            Ok(user) => {
                // Completed attempt: proofs and challenges are spent.
                state.discard_attempt();
                state.phase = FlowPhase::Success;
                tracing::info!(
                    target: "auth.register.succeeded",
                    user_id = %user.id,
                    "Account created"
                );
                Ok(RegisterOutcome::Registered(user))
            }
            Err(e) => {
                // Proofs survive a rejection; the user corrects and retries
                // without re-proving untouched channels.
                state.phase = FlowPhase::Verified;
                tracing::info!(target: "auth.register.rejected", error = %e, "Registration rejected");
                Err(e)
            }
        }
    }

    /// Advance both channel cooldowns by one elapsed second.
    pub async fn tick(&self) {
        let mut state = self.state.lock().await;
        state.email_slot.cooldown.tick();
        state.mobile_slot.cooldown.tick();
    }

    pub async fn cooldown(&self, channel: ChallengeChannel) -> CooldownState {
        let mut state = self.state.lock().await;
        state
            .slot_mut(channel)
            .map(|slot| slot.cooldown.state())
            .unwrap_or(CooldownTimer::new().state())
    }

    pub async fn phase(&self) -> FlowPhase {
        self.state.lock().await.phase
    }

    /// Abandon the attempt entirely.
    pub async fn cancel(&self) {
        let mut state = self.state.lock().await;
        state.ops.invalidate();
        state.discard_attempt();
        state.primary = Identifier {
            kind: IdentifierKind::Unrecognized,
            value: String::new(),
        };
        state.secondary = Identifier {
            kind: IdentifierKind::Unrecognized,
            value: String::new(),
        };
        state.phase = FlowPhase::Idle;
    }
}

fn is_code_shape(code: &str, expected_len: usize) -> bool {
    code.len() == expected_len && code.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test::MockBackend;
    use std::sync::Arc;

    fn profile() -> RegistrationProfile {
        RegistrationProfile {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: "pw-1234".to_string(),
            referral_code: None,
        }
    }

    async fn verify_channel(
        flow: &RegistrationFlow<Arc<MockBackend>>,
        backend: &MockBackend,
        channel: ChallengeChannel,
        kind: IdentifierKind,
        value: &str,
    ) {
        flow.request_code(channel).await.unwrap();
        let code = backend.last_code_for(kind, value).unwrap();
        let outcome = flow.verify_code(channel, &code).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn test_register_requires_all_present_channels_proven() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        assert_eq!(flow.set_primary("9876543210").await, IdentifierKind::Mobile);
        assert_eq!(flow.set_secondary("a@b.com").await, IdentifierKind::Email);
        assert!(!flow.is_ready().await);

        // Submission is rejected until both channels are proven.
        let err = flow.register(&profile()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));

        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Mobile,
            IdentifierKind::Mobile,
            "9876543210",
        )
        .await;
        assert!(!flow.is_ready().await);

        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Email,
            IdentifierKind::Email,
            "a@b.com",
        )
        .await;
        assert!(flow.is_ready().await);
        assert_eq!(flow.phase().await, FlowPhase::Verified);

        let outcome = flow.register(&profile()).await.unwrap();
        let user = match outcome {
            RegisterOutcome::Registered(user) => user,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(user.mobile.as_deref(), Some("9876543210"));
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert_eq!(flow.phase().await, FlowPhase::Success);
    }

    #[tokio::test]
    async fn test_primary_only_registration() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("9876543210").await;
        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Mobile,
            IdentifierKind::Mobile,
            "9876543210",
        )
        .await;
        assert!(flow.is_ready().await);

        let outcome = flow.register(&profile()).await.unwrap();
        assert!(matches!(outcome, RegisterOutcome::Registered(_)));
    }

    #[tokio::test]
    async fn test_editing_verified_field_invalidates_its_proof() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("9876543210").await;
        flow.set_secondary("a@b.com").await;
        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Mobile,
            IdentifierKind::Mobile,
            "9876543210",
        )
        .await;
        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Email,
            IdentifierKind::Email,
            "a@b.com",
        )
        .await;
        assert!(flow.is_ready().await);

        // Edit the verified email: its proof falls, mobile's stands.
        flow.set_secondary("other@b.com").await;
        assert!(!flow.is_ready().await);
        assert!(!flow.is_verified(ChallengeChannel::Email).await);
        assert!(flow.is_verified(ChallengeChannel::Mobile).await);

        // Restoring the original value does not restore the proof.
        flow.set_secondary("a@b.com").await;
        assert!(!flow.is_verified(ChallengeChannel::Email).await);
    }

    #[tokio::test]
    async fn test_channel_switch_discards_all_state() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("9876543210").await;
        flow.set_secondary("a@b.com").await;
        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Mobile,
            IdentifierKind::Mobile,
            "9876543210",
        )
        .await;
        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Email,
            IdentifierKind::Email,
            "a@b.com",
        )
        .await;

        // Mobile digits become an email address: a channel switch.
        flow.set_primary("new@c.com").await;
        assert!(!flow.is_verified(ChallengeChannel::Mobile).await);
        assert!(!flow.is_verified(ChallengeChannel::Email).await);
    }

    #[tokio::test]
    async fn test_request_code_gated_by_cooldown() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("9876543210").await;
        flow.request_code(ChallengeChannel::Mobile).await.unwrap();

        let err = flow.request_code(ChallengeChannel::Mobile).await.unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));

        // The other channel is not affected by this cooldown.
        flow.set_secondary("a@b.com").await;
        flow.request_code(ChallengeChannel::Email).await.unwrap();

        while !{
            flow.tick().await;
            flow.cooldown(ChallengeChannel::Mobile).await.resend_allowed
        } {}
        flow.request_code(ChallengeChannel::Mobile).await.unwrap();
    }

    #[tokio::test]
    async fn test_resend_supersedes_challenge() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("a@b.com").await;
        flow.request_code(ChallengeChannel::Email).await.unwrap();
        let old_code = backend
            .last_code_for(IdentifierKind::Email, "a@b.com")
            .unwrap();

        while !{
            flow.tick().await;
            flow.cooldown(ChallengeChannel::Email).await.resend_allowed
        } {}
        flow.request_code(ChallengeChannel::Email).await.unwrap();
        let new_code = backend
            .last_code_for(IdentifierKind::Email, "a@b.com")
            .unwrap();

        if old_code != new_code {
            let err = flow
                .verify_code(ChallengeChannel::Email, &old_code)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::CodeMismatch));
        }
        let outcome = flow
            .verify_code(ChallengeChannel::Email, &new_code)
            .await
            .unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn test_mobile_required_for_submission() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("a@b.com").await;
        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Email,
            IdentifierKind::Email,
            "a@b.com",
        )
        .await;
        assert!(flow.is_ready().await);

        let err = flow.register(&profile()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
        assert!(err.to_string().contains("mobile"));
    }

    #[tokio::test]
    async fn test_duplicate_rejection_preserves_proofs() {
        let backend = Arc::new(MockBackend::new());
        backend.add_account(None, Some("9876543210"), "pw");
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("9876543210").await;
        verify_channel(
            &flow,
            &backend,
            ChallengeChannel::Mobile,
            IdentifierKind::Mobile,
            "9876543210",
        )
        .await;

        let err = flow.register(&profile()).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateIdentifier(_)));
        // The proof survives so the user can fix the number and only
        // re-prove what changed.
        assert!(flow.is_verified(ChallengeChannel::Mobile).await);
        assert_eq!(flow.phase().await, FlowPhase::Verified);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_verification_state() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("a@b.com").await;
        flow.request_code(ChallengeChannel::Email).await.unwrap();
        let code = backend
            .last_code_for(IdentifierKind::Email, "a@b.com")
            .unwrap();

        backend.set_unreachable(true);
        let err = flow
            .verify_code(ChallengeChannel::Email, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ServerUnreachable(_)));

        backend.set_unreachable(false);
        let outcome = flow.verify_code(ChallengeChannel::Email, &code).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn test_cancel_resets_everything() {
        let backend = Arc::new(MockBackend::new());
        let flow = RegistrationFlow::new(backend.clone());

        flow.set_primary("a@b.com").await;
        flow.request_code(ChallengeChannel::Email).await.unwrap();
        flow.cancel().await;

        assert_eq!(flow.phase().await, FlowPhase::Idle);
        assert!(!flow.is_verified(ChallengeChannel::Email).await);
        let err = flow
            .verify_code(ChallengeChannel::Email, "1234")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)));
    }
}
