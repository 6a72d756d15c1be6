//! Outstanding proof-of-possession challenges.
//!
//! A [`Challenge`] represents one outstanding OTP or second-factor request.
//! It is created when a code is requested and destroyed on successful
//! verification, explicit cancellation, or expiry. At most one challenge is
//! active per channel per attempt: a new request supersedes the old one.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::identifier::{Identifier, IdentifierKind};

/// The channel a challenge proves possession of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeChannel {
    Email,
    Mobile,
    Authenticator,
}

impl ChallengeChannel {
    /// The dispatch channel for a classified identifier, if it has one.
    pub fn for_identifier(identifier: &Identifier) -> Option<Self> {
        match identifier.kind {
            IdentifierKind::Email => Some(Self::Email),
            IdentifierKind::Mobile => Some(Self::Mobile),
            IdentifierKind::Unrecognized => None,
        }
    }
}

/// The two second-factor shapes, selected by the server response.
///
/// OTP-style challenges are dispatched over a transport and can be resent
/// under a cooldown; authenticator-style codes are generated on the user's
/// device, so there is nothing to resend. Expiry and attempt semantics are
/// shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Otp,
    Authenticator,
}

/// One outstanding proof-of-possession request.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub kind: ChallengeKind,
    pub channel: ChallengeChannel,
    /// The identifier value this challenge was issued against.
    pub target: String,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
    pub attempts_remaining: u32,
}

impl Challenge {
    /// Create a dispatched-code challenge for an email or mobile target.
    pub fn otp(
        channel: ChallengeChannel,
        target: impl Into<String>,
        ttl: Duration,
        max_attempts: u32,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            kind: ChallengeKind::Otp,
            channel,
            target: target.into(),
            issued_at: now,
            expires_at: now + ttl,
            attempts_remaining: max_attempts,
        }
    }

    /// Dispatched-code challenge with a backend-supplied expiry.
    pub fn otp_until(
        channel: ChallengeChannel,
        target: impl Into<String>,
        expires_at: SystemTime,
        max_attempts: u32,
    ) -> Self {
        Self {
            kind: ChallengeKind::Otp,
            channel,
            target: target.into(),
            issued_at: SystemTime::now(),
            expires_at,
            attempts_remaining: max_attempts,
        }
    }

    /// Create an authenticator-code challenge.
    pub fn authenticator(target: impl Into<String>, ttl: Duration, max_attempts: u32) -> Self {
        let now = SystemTime::now();
        Self {
            kind: ChallengeKind::Authenticator,
            channel: ChallengeChannel::Authenticator,
            target: target.into(),
            issued_at: now,
            expires_at: now + ttl,
            attempts_remaining: max_attempts,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Record an incorrect entry. Returns the attempts left.
    pub fn record_failure(&mut self) -> u32 {
        self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
        self.attempts_remaining
    }

    /// Only dispatched codes can be resent.
    pub fn allows_resend(&self) -> bool {
        self.kind == ChallengeKind::Otp
    }
}
