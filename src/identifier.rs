//! Identifier classification.
//!
//! A raw user-supplied string is tagged as an email address, a mobile number,
//! or unrecognized. Classification is a pure function of the input and the
//! [`IdentifierPolicy`]; it runs on every input change and must never be
//! cached across an edit.

use serde::{Deserialize, Serialize};

use crate::config::IdentifierPolicy;

/// What kind of identifier a raw string was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Email,
    Mobile,
    Unrecognized,
}

/// A classified identifier: the normalized value plus its tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl Identifier {
    /// Classify a raw input string.
    ///
    /// The value is normalized first (trimmed and lowercased; digits are
    /// unaffected). A string of exactly `policy.mobile_digits` ASCII digits
    /// is a mobile number; a structurally valid address is an email;
    /// everything else is unrecognized.
    pub fn classify(raw: &str, policy: &IdentifierPolicy) -> Self {
        let value = raw.trim().to_lowercase();
        let kind = if is_mobile(&value, policy.mobile_digits) {
            IdentifierKind::Mobile
        } else if is_valid_email(&value) {
            IdentifierKind::Email
        } else {
            IdentifierKind::Unrecognized
        };
        Self { kind, value }
    }

    /// Whether this identifier can be used to start a flow.
    pub fn is_recognized(&self) -> bool {
        self.kind != IdentifierKind::Unrecognized
    }
}

fn is_mobile(value: &str, digits: usize) -> bool {
    value.len() == digits && value.chars().all(|c| c.is_ascii_digit())
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    // Basic validation - has @ and domain
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let local = parts[0];
    let domain = parts[1];

    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !local.chars().any(char::is_whitespace)
        && !domain.chars().any(char::is_whitespace)
}
