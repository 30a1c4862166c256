//! Chain construction for ledgerlite.
//!
//! Transactions are signed with [`ledgerlite_crypto::Wallet`], grouped into
//! blocks whose hash commits to the previous block, the transaction list and
//! a proof-of-work nonce. The [`ledger::Ledger`] owns the single write path
//! into a [`store::ChainStore`].

pub mod block;
pub mod error;
pub mod ledger;
pub mod pow;
pub mod store;
pub mod transaction;
pub mod validation;
pub mod view;

pub use block::{calculate_hash, serialize_transactions, Block, ValidationStatus, GENESIS_PREVIOUS_HASH};
pub use error::{LedgerError, StoreError, TransactionError};
pub use ledger::{ChainStats, Ledger};
pub use pow::{ProofOfWork, DEFAULT_DIFFICULTY};
pub use store::{BlockLookup, ChainStore, MemoryStore};
pub use transaction::{SignatureCheck, SigningPayload, Transaction, SYSTEM_SENDER};
pub use validation::{ValidationCode, ValidationError};
pub use view::{BlockView, ChainResponse, TransactionView};
