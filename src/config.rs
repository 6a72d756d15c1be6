use serde::{Deserialize, Serialize};

/// Top-level configuration for the authentication flows.
///
/// Code lengths, expiries, cooldown windows, and attempt budgets vary between
/// deployments, so all of them live here rather than as constants.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub identifier: IdentifierPolicy,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub second_factor: SecondFactorConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identifier: IdentifierPolicy::default(),
            otp: OtpConfig::default(),
            second_factor: SecondFactorConfig::default(),
        }
    }
}

impl AuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the one-time code configuration.
    #[must_use]
    pub fn otp(mut self, otp: OtpConfig) -> Self {
        self.otp = otp;
        self
    }

    /// Replace the second-factor configuration.
    #[must_use]
    pub fn second_factor(mut self, second_factor: SecondFactorConfig) -> Self {
        self.second_factor = second_factor;
        self
    }

    /// Replace the identifier classification policy.
    #[must_use]
    pub fn identifier(mut self, identifier: IdentifierPolicy) -> Self {
        self.identifier = identifier;
        self
    }
}

/// Policy consulted by the identifier classifier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentifierPolicy {
    /// Exact digit count that makes a string a mobile number.
    #[serde(default = "default_mobile_digits")]
    pub mobile_digits: usize,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self {
            mobile_digits: default_mobile_digits(),
        }
    }
}

/// Configuration for one-time code challenges (email/SMS).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OtpConfig {
    /// Number of digits in a dispatched code.
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// How long a dispatched code stays valid, in seconds.
    #[serde(default = "default_code_ttl")]
    pub ttl_secs: u64,
    /// Resend cooldown window, in seconds.
    #[serde(default = "default_resend_cooldown")]
    pub resend_cooldown_secs: u32,
    /// Incorrect entries allowed before the challenge dies.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: default_code_length(),
            ttl_secs: default_code_ttl(),
            resend_cooldown_secs: default_resend_cooldown(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl OtpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The 60-second resend window used by the slower dispatch channels.
    pub fn lenient() -> Self {
        Self {
            resend_cooldown_secs: 60,
            ..Self::default()
        }
    }

    /// Tighter budget for high-risk surfaces: 3 attempts, 2-minute expiry.
    pub fn strict() -> Self {
        Self {
            ttl_secs: 120,
            max_attempts: 3,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    #[must_use]
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn resend_cooldown_secs(mut self, secs: u32) -> Self {
        self.resend_cooldown_secs = secs;
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Configuration for the second-factor challenge issued during login.
///
/// The OTP-style variant reuses [`OtpConfig`] mechanics; the
/// authenticator-code variant has its own length and never resends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecondFactorConfig {
    /// Fixed code length for authenticator-app codes.
    #[serde(default = "default_authenticator_digits")]
    pub authenticator_digits: usize,
    /// How long a pending second-factor challenge stays open, in seconds.
    #[serde(default = "default_challenge_ttl")]
    pub ttl_secs: u64,
    /// Incorrect entries allowed before the login attempt is rejected.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SecondFactorConfig {
    fn default() -> Self {
        Self {
            authenticator_digits: default_authenticator_digits(),
            ttl_secs: default_challenge_ttl(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_mobile_digits() -> usize {
    10
}

fn default_code_length() -> usize {
    4
}

fn default_code_ttl() -> u64 {
    300 // 5 minutes
}

fn default_resend_cooldown() -> u32 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_authenticator_digits() -> usize {
    6
}

fn default_challenge_ttl() -> u64 {
    300 // 5 minutes
}
