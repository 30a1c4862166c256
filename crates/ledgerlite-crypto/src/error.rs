use thiserror::Error;

/// Error type for wallet and signature operations.
///
/// Verification itself never surfaces these to callers of [`crate::verify`];
/// they only distinguish malformed input inside [`crate::try_verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Private key is not 32 bytes of hex or is not a valid curve scalar
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Public key could not be decoded into a curve point
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature is not valid hex, or not a compact/DER ECDSA signature
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    /// Payload could not be turned into canonical JSON
    #[error("canonical encoding failed: {0}")]
    Encoding(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
