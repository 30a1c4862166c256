use ledgerlite_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    #[error("amount must be finite and non-negative, got {0}")]
    InvalidAmount(f64),

    #[error("transaction is already signed")]
    AlreadySigned,

    #[error("signing failed: {0}")]
    Signing(#[from] CryptoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("a block with hash {0} already exists")]
    DuplicateHash(String),

    #[error("no block with hash {0}")]
    UnknownBlock(String),

    #[error("refusing to store an empty chain")]
    EmptyChain,
}

/// Errors surfaced by [`crate::Ledger`] mutations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// A non-exempt transaction failed signature verification; nothing was written
    #[error("transaction {position} has an invalid signature: {reason}")]
    InvalidTransactionSignature { position: usize, reason: String },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),

    #[error("chain has no genesis block")]
    MissingGenesis,

    #[error("candidate chain rejected: {0}")]
    InvalidChain(String),

    #[error("candidate chain of length {candidate} is shorter than local chain of length {current}")]
    StaleChain { candidate: usize, current: usize },

    /// The local chain changed after the candidate was chosen
    #[error("local tip moved from {expected} to {actual}")]
    TipMoved { expected: String, actual: String },

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("transaction not found: {0}")]
    TransactionNotFound(u64),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
