// WALLET: secp256k1 identity, address derivation and canonical signing.
//
// INVARIANTS:
// 1. The public key field carries the full 64-byte point, the address only its hash
// 2. sign and verify hash the same canonical encoding of the payload
// 3. verify never errors; malformed input is a failed verification

use crate::canonical::canonical_digest;
use crate::error::{CryptoError, CryptoResult};
use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Length of a raw uncompressed public key without the `0x04` tag.
pub const RAW_PUBLIC_KEY_LEN: usize = 64;

/// Length of a secp256k1 private key.
pub const PRIVATE_KEY_LEN: usize = 32;

/// Short account identifier: `0x` + hex(RIPEMD160(SHA256(raw public key))).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A secp256k1 key pair able to sign transaction payloads.
#[derive(Clone)]
pub struct Wallet {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Generate a fresh key pair from the thread RNG.
    pub fn generate() -> Self {
        let (secret_key, public_key) = SECP256K1.generate_keypair(&mut rand::thread_rng());
        Self { secret_key, public_key }
    }

    /// Import a hex-encoded private key (optionally `0x`-prefixed).
    ///
    /// Succeeds only if the input decodes to exactly 32 bytes that form a
    /// valid scalar. Nothing is constructed on failure.
    pub fn import_private_key(hex_str: &str) -> CryptoResult<Self> {
        let trimmed = strip_hex_prefix(hex_str.trim());
        let bytes = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?,
        );
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(CryptoError::InvalidPrivateKey(format!(
                "expected {} bytes, got {}",
                PRIVATE_KEY_LEN,
                bytes.len()
            )));
        }
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(SECP256K1, &secret_key);
        Ok(Self { secret_key, public_key })
    }

    /// Private key as 64 lowercase hex characters.
    pub fn export_private_key(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Raw 64-byte public key (X ‖ Y).
    pub fn raw_public_key(&self) -> [u8; RAW_PUBLIC_KEY_LEN] {
        let uncompressed = self.public_key.serialize_uncompressed();
        let mut raw = [0u8; RAW_PUBLIC_KEY_LEN];
        raw.copy_from_slice(&uncompressed[1..]);
        raw
    }

    /// `0x` + hex of the raw public key; the transaction `public_key` field.
    pub fn public_key_string(&self) -> String {
        format!("0x{}", hex::encode(self.raw_public_key()))
    }

    pub fn address(&self) -> Address {
        derive_address(&self.raw_public_key())
    }

    /// Sign the canonical encoding of `payload`.
    ///
    /// Signatures are deterministic (RFC 6979) and returned as 64-byte
    /// compact `r ‖ s`, hex encoded.
    pub fn sign<T: Serialize + ?Sized>(&self, payload: &T) -> CryptoResult<String> {
        let digest = canonical_digest(payload)?;
        let message = Message::from_digest(digest);
        let signature = SECP256K1.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(signature.serialize_compact()))
    }
}

/// Generate a key pair and return it with its derived address.
pub fn generate_keypair() -> (Wallet, Address) {
    let wallet = Wallet::generate();
    let address = wallet.address();
    (wallet, address)
}

/// Derive the short address from raw public key bytes.
pub fn derive_address(raw_public_key: &[u8]) -> Address {
    let sha = Sha256::digest(raw_public_key);
    let ripemd = Ripemd160::digest(sha);
    Address(format!("0x{}", hex::encode(ripemd)))
}

/// Verify `signature_hex` over `payload` under `public_key_hex`.
///
/// Returns `false` for any decode or verification failure.
pub fn verify<T: Serialize + ?Sized>(public_key_hex: &str, signature_hex: &str, payload: &T) -> bool {
    match try_verify(public_key_hex, signature_hex, payload) {
        Ok(valid) => valid,
        Err(e) => {
            log::debug!("Signature verification failed: {}", e);
            false
        }
    }
}

/// Like [`verify`] but reports malformed input as an error.
///
/// `Ok(false)` means the inputs were well formed and the signature does not
/// match the payload.
pub fn try_verify<T: Serialize + ?Sized>(
    public_key_hex: &str,
    signature_hex: &str,
    payload: &T,
) -> CryptoResult<bool> {
    let public_key = parse_public_key(public_key_hex)?;
    let mut signature = parse_signature(signature_hex)?;
    signature.normalize_s();

    let digest = canonical_digest(payload)?;
    let message = Message::from_digest(digest);
    Ok(SECP256K1.verify_ecdsa(&message, &signature, &public_key).is_ok())
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_public_key(public_key_hex: &str) -> CryptoResult<PublicKey> {
    let bytes = hex::decode(strip_hex_prefix(public_key_hex.trim()))
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let result = if bytes.len() == RAW_PUBLIC_KEY_LEN {
        let mut tagged = Vec::with_capacity(RAW_PUBLIC_KEY_LEN + 1);
        tagged.push(0x04);
        tagged.extend_from_slice(&bytes);
        PublicKey::from_slice(&tagged)
    } else {
        PublicKey::from_slice(&bytes)
    };
    result.map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

fn parse_signature(signature_hex: &str) -> CryptoResult<Signature> {
    let bytes = hex::decode(strip_hex_prefix(signature_hex.trim()))
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let result = if bytes.len() == 64 {
        Signature::from_compact(&bytes)
    } else {
        Signature::from_der(&bytes)
    };
    result.map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}
