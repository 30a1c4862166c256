//! Cryptographic identity for ledgerlite.
//!
//! Wallets hold a secp256k1 key pair. Transactions are signed over a
//! canonical JSON encoding of their payload so that every verifier
//! reproduces byte-identical input to the hash.

pub mod canonical;
pub mod error;
pub mod wallet;

pub use canonical::{canonical_digest, canonical_json, canonical_value, sha256_hex};
pub use error::{CryptoError, CryptoResult};
pub use wallet::{derive_address, generate_keypair, try_verify, verify, Address, Wallet};
