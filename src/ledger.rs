//! Per-attempt verification ledger.
//!
//! Tracks which channels (email, mobile) have been proven during one
//! registration attempt, and which proof tokens chain them to the backend.
//! A proof is only trusted while its bound identifier still matches the form
//! field it was issued for; editing a verified field invalidates its proof.

use std::time::SystemTime;

use crate::challenge::ChallengeChannel;

/// Evidence that a challenge was satisfied for a specific identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationProof {
    pub channel: ChallengeChannel,
    /// The exact identifier value the proof was issued against.
    pub identifier: String,
    /// Token returned by the backend on verification, when it issues one.
    pub proof_token: Option<String>,
    pub verified_at: SystemTime,
}

/// Proofs accumulated during one registration attempt.
///
/// Holds zero, one, or two proofs (email and/or mobile). State is cleared
/// only on field edits that break a proof's binding, on explicit reset, or
/// when the attempt completes, never on transient errors, so a failed call
/// does not force the user to re-prove a channel.
#[derive(Debug, Clone, Default)]
pub struct VerificationLedger {
    email: Option<VerificationProof>,
    mobile: Option<VerificationProof>,
}

impl VerificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a proof, replacing any earlier proof for the same channel.
    pub fn record(&mut self, proof: VerificationProof) {
        match proof.channel {
            ChallengeChannel::Email => self.email = Some(proof),
            ChallengeChannel::Mobile => self.mobile = Some(proof),
            // Authenticator proofs belong to login, not the ledger.
            ChallengeChannel::Authenticator => {}
        }
    }

    pub fn proof(&self, channel: ChallengeChannel) -> Option<&VerificationProof> {
        match channel {
            ChallengeChannel::Email => self.email.as_ref(),
            ChallengeChannel::Mobile => self.mobile.as_ref(),
            ChallengeChannel::Authenticator => None,
        }
    }

    pub fn is_verified(&self, channel: ChallengeChannel) -> bool {
        self.proof(channel).is_some()
    }

    /// Re-bind a channel's proof to the field's current value.
    ///
    /// Called on every field edit: if the value no longer matches what the
    /// proof was issued against, the proof is dropped.
    pub fn sync(&mut self, channel: ChallengeChannel, current_value: &str) {
        let slot = match channel {
            ChallengeChannel::Email => &mut self.email,
            ChallengeChannel::Mobile => &mut self.mobile,
            ChallengeChannel::Authenticator => return,
        };
        if let Some(proof) = slot {
            if proof.identifier != current_value {
                *slot = None;
            }
        }
    }

    /// Discard all proofs for the attempt.
    ///
    /// Used when the primary identifier is re-classified to a different
    /// channel: channel identity is not portable across re-classification.
    pub fn reset(&mut self) {
        self.email = None;
        self.mobile = None;
    }

    /// Whether every required channel currently holds a proof.
    pub fn is_complete(&self, required: &[ChallengeChannel]) -> bool {
        required.iter().all(|channel| self.is_verified(*channel))
    }
}
