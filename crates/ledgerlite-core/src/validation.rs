use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable reason attached to a failed block validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InsufficientNodes,
    InactiveNodes,
    InvalidPrevHash,
    InvalidBlockHash,
    MissingSignature,
    InvalidSignature,
    VerificationError,
    InvalidAmount,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::InsufficientNodes => "INSUFFICIENT_NODES",
            ValidationCode::InactiveNodes => "INACTIVE_NODES",
            ValidationCode::InvalidPrevHash => "INVALID_PREV_HASH",
            ValidationCode::InvalidBlockHash => "INVALID_BLOCK_HASH",
            ValidationCode::MissingSignature => "MISSING_SIGNATURE",
            ValidationCode::InvalidSignature => "INVALID_SIGNATURE",
            ValidationCode::VerificationError => "VERIFICATION_ERROR",
            ValidationCode::InvalidAmount => "INVALID_AMOUNT",
        }
    }

    /// Quorum failures stop validation before any integrity check runs.
    pub fn is_quorum_failure(&self) -> bool {
        matches!(self, ValidationCode::InsufficientNodes | ValidationCode::InactiveNodes)
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
