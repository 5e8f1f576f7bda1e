//! Match confidence and rejection types produced by recognizers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Strength of evidence that a directory tree is in a given format.
///
/// Variants are declared weakest first so the derived ordering gives
/// `Exact > Medium > Low`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Weak evidence, e.g. "there are some image files here".
    Low,
    /// Structural evidence that other formats could share.
    Medium,
    /// Format-specific markers were found.
    Exact,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::Exact => "exact",
        };
        f.write_str(name)
    }
}

/// Why a recognizer did not match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Required files or structure are absent.
    UnmetRequirements,
    /// The format matched, but a stricter competitor matched better.
    InsufficientConfidence,
    /// The format is present but declares an incompatible version.
    UnsupportedVersion,
    /// The recognizer itself failed.
    InternalError,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::UnmetRequirements => "unmet_requirements",
            RejectionReason::InsufficientConfidence => "insufficient_confidence",
            RejectionReason::UnsupportedVersion => "unsupported_version",
            RejectionReason::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A categorized, human-readable rejection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn unmet(message: impl Into<String>) -> Self {
        Self::new(RejectionReason::UnmetRequirements, message)
    }

    pub fn unsupported_version(message: impl Into<String>) -> Self {
        Self::new(RejectionReason::UnsupportedVersion, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RejectionReason::InternalError, message)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// Outcome of running one recognizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recognition {
    Match(Confidence),
    Reject(Rejection),
}

impl From<Rejection> for Recognition {
    fn from(rejection: Rejection) -> Self {
        Recognition::Reject(rejection)
    }
}
