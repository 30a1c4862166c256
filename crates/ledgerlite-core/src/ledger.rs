// LEDGER: the single write path into a ChainStore.
//
// INVARIANTS:
// 1. Exactly one genesis block exists, created on first open
// 2. Block creation and chain replacement never run concurrently
// 3. No block is written unless every transaction has a valid amount and
//    every non-exempt transaction verifies
// 4. Chain replacement is all-or-nothing and empties the pending pool

use crate::block::{Block, ValidationStatus};
use crate::error::LedgerError;
use crate::pow::ProofOfWork;
use crate::store::{BlockLookup, ChainStore, MemoryStore};
use crate::transaction::{SignatureCheck, Transaction};
use crate::validation::ValidationError;
use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregate counters over the stored chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub length: usize,
    pub transaction_count: usize,
    pub pending_blocks: usize,
    pub validated_blocks: usize,
    pub invalid_blocks: usize,
    pub pending_transactions: usize,
    pub tip_hash: Option<String>,
    pub difficulty: usize,
}

pub struct Ledger {
    store: Arc<dyn ChainStore>,
    pow: ProofOfWork,
    /// Held across block creation (including the nonce search) and replacement
    mutation: Mutex<()>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("length", &self.store.len())
            .field("pow", &self.pow)
            .finish()
    }
}

impl Ledger {
    /// Open a ledger over `store`, writing the genesis block if the store is empty.
    pub fn new(store: Arc<dyn ChainStore>, pow: ProofOfWork) -> Result<Self, LedgerError> {
        let ledger = Self {
            store,
            pow,
            mutation: Mutex::new(()),
        };
        ledger.ensure_genesis()?;
        Ok(ledger)
    }

    pub fn in_memory(difficulty: usize) -> Result<Self, LedgerError> {
        Self::new(Arc::new(MemoryStore::new()), ProofOfWork::new(difficulty))
    }

    fn ensure_genesis(&self) -> Result<(), LedgerError> {
        let _guard = self.mutation.lock();
        if !self.store.is_empty() {
            return Ok(());
        }
        let genesis = self.store.append_block(Block::genesis(Utc::now()))?;
        info!("Created genesis block {}", genesis.hash);
        Ok(())
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn store(&self) -> &Arc<dyn ChainStore> {
        &self.store
    }

    /// Verify and add a transaction to the pending pool.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<Transaction, LedgerError> {
        tx.validate_amount()?;
        let check = tx.check_signature();
        if !check.is_acceptable() {
            return Err(LedgerError::InvalidTransactionSignature {
                position: 0,
                reason: describe(&check),
            });
        }
        let stored = self.store.add_pending_transaction(tx)?;
        info!(
            "Accepted pending transaction {:?} {} -> {} ({})",
            stored.id, stored.sender, stored.recipient, stored.amount
        );
        Ok(stored)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.store.pending_transactions()
    }

    /// Mine a block over `transactions` on the current tip.
    ///
    /// Fails before any work is done with [`LedgerError::InvalidTransaction`]
    /// for a bad amount, or [`LedgerError::InvalidTransactionSignature`] if a
    /// non-exempt transaction does not verify.
    pub fn create_block(&self, transactions: Vec<Transaction>) -> Result<Block, LedgerError> {
        let _guard = self.mutation.lock();
        self.create_block_locked(transactions)
    }

    /// Mine every pending transaction into a block. Returns `None` when the
    /// pool is empty.
    pub fn mine_pending(&self) -> Result<Option<Block>, LedgerError> {
        let _guard = self.mutation.lock();
        let pending = self.store.pending_transactions();
        if pending.is_empty() {
            return Ok(None);
        }
        let ids: Vec<u64> = pending.iter().filter_map(|tx| tx.id).collect();
        let block = self.create_block_locked(pending)?;
        self.store.remove_pending(&ids);
        Ok(Some(block))
    }

    fn create_block_locked(&self, transactions: Vec<Transaction>) -> Result<Block, LedgerError> {
        for (position, tx) in transactions.iter().enumerate() {
            if let Err(e) = tx.validate_amount() {
                warn!("Rejecting block: transaction {} {}", position, e);
                return Err(e.into());
            }
            let check = tx.check_signature();
            if !check.is_acceptable() {
                warn!("Rejecting block: transaction {} {}", position, describe(&check));
                return Err(LedgerError::InvalidTransactionSignature {
                    position,
                    reason: describe(&check),
                });
            }
        }

        let tip = self.store.tip().ok_or(LedgerError::MissingGenesis)?;
        let (nonce, hash) = self.pow.find_proof(&tip.hash, &transactions);
        let block = self
            .store
            .append_block(Block::new(tip.hash, hash, nonce, transactions))?;
        info!(
            "Appended block {} ({} transactions, nonce {})",
            block.index,
            block.transactions.len(),
            block.nonce
        );
        Ok(block)
    }

    /// Check a full candidate chain front to back, stopping at the first breach.
    pub fn is_valid_chain(&self, chain: &[Block]) -> bool {
        let Some(genesis) = chain.first() else {
            warn!("Chain rejected: empty");
            return false;
        };
        if !genesis.is_genesis() || !genesis.hash_matches() {
            warn!("Chain rejected: first block is not a valid genesis block");
            return false;
        }

        for (offset, pair) in chain.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);
            let position = offset + 1;
            if block.previous_hash != previous.hash {
                warn!("Chain rejected: block {} does not link to its predecessor", position);
                return false;
            }
            if !self.pow.is_valid_proof(block.nonce, &block.previous_hash, &block.transactions) {
                warn!("Chain rejected: block {} has an invalid proof of work", position);
                return false;
            }
            if !block.hash_matches() {
                warn!("Chain rejected: block {} hash does not recompute", position);
                return false;
            }
            if let Some(tx) = block.transactions.iter().position(|tx| tx.validate_amount().is_err()) {
                warn!("Chain rejected: block {} transaction {} has an invalid amount", position, tx);
                return false;
            }
            if let Some(tx) = block.transactions.iter().position(|tx| !tx.verify_signature()) {
                warn!("Chain rejected: block {} transaction {} fails verification", position, tx);
                return false;
            }
        }
        true
    }

    /// Replace the local chain with `chain`, atomically.
    ///
    /// The candidate must be a valid chain at least as long as the local one.
    /// The pending pool is discarded with the old chain.
    pub fn replace_chain(&self, chain: Vec<Block>) -> Result<(), LedgerError> {
        let _guard = self.mutation.lock();
        self.replace_chain_locked(chain)
    }

    /// Like [`Ledger::replace_chain`], but only while the local tip is still
    /// `expected_tip`. Fails with [`LedgerError::TipMoved`] otherwise.
    pub fn replace_chain_if(&self, chain: Vec<Block>, expected_tip: &str) -> Result<(), LedgerError> {
        let _guard = self.mutation.lock();
        let actual = self.store.tip().ok_or(LedgerError::MissingGenesis)?.hash;
        if actual != expected_tip {
            return Err(LedgerError::TipMoved {
                expected: expected_tip.to_string(),
                actual,
            });
        }
        self.replace_chain_locked(chain)
    }

    fn replace_chain_locked(&self, chain: Vec<Block>) -> Result<(), LedgerError> {
        if !self.is_valid_chain(&chain) {
            return Err(LedgerError::InvalidChain("candidate failed chain validation".into()));
        }
        let current = self.store.len();
        if chain.len() < current {
            return Err(LedgerError::StaleChain {
                candidate: chain.len(),
                current,
            });
        }
        let length = chain.len();
        self.store.replace_blocks(chain)?;
        info!("Replaced local chain ({} -> {} blocks)", current, length);
        Ok(())
    }

    /// Received minus sent over committed transactions.
    pub fn balance(&self, address: &str) -> f64 {
        self.store
            .blocks()
            .iter()
            .flat_map(|b| b.transactions.iter())
            .fold(0.0, |mut acc, tx| {
                if tx.recipient == address {
                    acc += tx.amount;
                }
                if tx.sender == address {
                    acc -= tx.amount;
                }
                acc
            })
    }

    /// Attach a validation outcome to a stored block.
    pub fn record_validation(&self, hash: &str, errors: Vec<ValidationError>) -> Result<Block, LedgerError> {
        let mut block = self
            .store
            .block_by_hash(hash)
            .ok_or_else(|| LedgerError::BlockNotFound(hash.to_string()))?;
        if errors.is_empty() {
            block.validation_status = ValidationStatus::Validated;
            block.validation_errors = None;
        } else {
            block.validation_status = ValidationStatus::Invalid;
            block.validation_errors = Some(errors);
        }
        block.validation_timestamp = Some(Utc::now());
        self.store.update_block(block.clone())?;
        Ok(block)
    }

    pub fn stats(&self) -> ChainStats {
        let blocks = self.store.blocks();
        let count = |status: ValidationStatus| blocks.iter().filter(|b| b.validation_status == status).count();
        ChainStats {
            length: blocks.len(),
            transaction_count: blocks.iter().map(|b| b.transactions.len()).sum(),
            pending_blocks: count(ValidationStatus::Pending),
            validated_blocks: count(ValidationStatus::Validated),
            invalid_blocks: count(ValidationStatus::Invalid),
            pending_transactions: self.store.pending_transactions().len(),
            tip_hash: blocks.last().map(|b| b.hash.clone()),
            difficulty: self.pow.difficulty(),
        }
    }

    pub fn chain(&self) -> Vec<Block> {
        self.store.blocks()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn tip(&self) -> Option<Block> {
        self.store.tip()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        self.store.block_by_index(index)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<Block> {
        self.store.block_by_hash(hash)
    }

    /// Committed or pending transaction by id.
    pub fn transaction(&self, id: u64) -> Option<Transaction> {
        self.store.transaction_by_id(id)
    }

    /// Re-check the signature of a stored transaction.
    pub fn verify_transaction(&self, id: u64) -> Result<SignatureCheck, LedgerError> {
        self.transaction(id)
            .map(|tx| tx.check_signature())
            .ok_or(LedgerError::TransactionNotFound(id))
    }
}

impl BlockLookup for Ledger {
    fn contains_hash(&self, hash: &str) -> bool {
        self.store.block_by_hash(hash).is_some()
    }
}

fn describe(check: &SignatureCheck) -> String {
    match check {
        SignatureCheck::Missing => "signature or public key missing".to_string(),
        SignatureCheck::Invalid => "signature does not match payload".to_string(),
        SignatureCheck::Malformed(e) => format!("malformed signature data: {}", e),
        SignatureCheck::Exempt | SignatureCheck::Valid => "ok".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransactionError;
    use crate::validation::ValidationCode;
    use ledgerlite_crypto::Wallet;

    fn signed(wallet: &Wallet, recipient: &str, amount: f64) -> Transaction {
        let mut tx = Transaction::new(wallet.address().into_string(), recipient, amount).unwrap();
        tx.sign(wallet).unwrap();
        tx
    }

    /// Signs whatever amount is given, skipping the constructor's checks.
    fn signed_raw(wallet: &Wallet, recipient: &str, amount: f64) -> Transaction {
        let mut tx = Transaction::new(wallet.address().into_string(), recipient, 1.0).unwrap();
        tx.amount = amount;
        tx.signature = Some(wallet.sign(&tx.signing_payload()).unwrap());
        tx.public_key = Some(wallet.public_key_string());
        tx
    }

    /// Mine a block on `parent` without any transaction checks.
    fn mined_on(ledger: &Ledger, parent: &Block, transactions: Vec<Transaction>) -> Block {
        let (nonce, hash) = ledger.pow().find_proof(&parent.hash, &transactions);
        Block::new(parent.hash.clone(), hash, nonce, transactions)
    }

    #[test]
    fn test_genesis_is_created_once() {
        let store: Arc<dyn ChainStore> = Arc::new(MemoryStore::new());
        let first = Ledger::new(store.clone(), ProofOfWork::new(1)).unwrap();
        let genesis = first.tip().unwrap();
        assert!(genesis.is_genesis());

        let reopened = Ledger::new(store, ProofOfWork::new(1)).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.tip().unwrap().hash, genesis.hash);
    }

    #[test]
    fn test_create_block_links_to_tip() {
        let _ = env_logger::builder().is_test(true).try_init();
        let ledger = Ledger::in_memory(2).unwrap();
        let wallet = Wallet::generate();
        let genesis = ledger.tip().unwrap();

        let block = ledger.create_block(vec![signed(&wallet, "0xbob", 3.0)]).unwrap();
        assert_eq!(block.previous_hash, genesis.hash);
        assert_eq!(block.index, 2);
        assert!(block.hash.starts_with("00"));
        assert!(block.hash_matches());
        assert!(ledger.is_valid_chain(&ledger.chain()));
    }

    #[test]
    fn test_invalid_signature_writes_nothing() {
        let ledger = Ledger::in_memory(1).unwrap();
        let wallet = Wallet::generate();
        let mut tx = signed(&wallet, "0xbob", 3.0);
        tx.amount = 300.0;

        let err = ledger
            .create_block(vec![signed(&wallet, "0xcarol", 1.0), tx])
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransactionSignature { position: 1, .. }));
        assert_eq!(ledger.len(), 1);

        let unsigned = Transaction::new("a", "b", 1.0).unwrap();
        assert!(ledger.create_block(vec![unsigned]).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_mine_pending_drains_pool() {
        let ledger = Ledger::in_memory(1).unwrap();
        assert!(ledger.mine_pending().unwrap().is_none());

        let wallet = Wallet::generate();
        ledger.submit_transaction(signed(&wallet, "0xbob", 2.0)).unwrap();
        ledger.submit_transaction(Transaction::system("0xbob", 50.0).unwrap()).unwrap();
        assert_eq!(ledger.pending_transactions().len(), 2);

        let block = ledger.mine_pending().unwrap().unwrap();
        assert_eq!(block.transactions.len(), 2);
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.stats().transaction_count, 2);
    }

    #[test]
    fn test_submit_rejects_unsigned() {
        let ledger = Ledger::in_memory(1).unwrap();
        let err = ledger
            .submit_transaction(Transaction::new("a", "b", 1.0).unwrap())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransactionSignature { .. }));
        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn test_balance() {
        let ledger = Ledger::in_memory(1).unwrap();
        let alice = Wallet::generate();
        let alice_addr = alice.address().into_string();
        ledger
            .create_block(vec![Transaction::system(alice_addr.clone(), 10.0).unwrap()])
            .unwrap();
        ledger.create_block(vec![signed(&alice, "0xbob", 4.0)]).unwrap();

        assert_eq!(ledger.balance(&alice_addr), 6.0);
        assert_eq!(ledger.balance("0xbob"), 4.0);
        assert_eq!(ledger.balance("0xnobody"), 0.0);
    }

    #[test]
    fn test_record_validation() {
        let ledger = Ledger::in_memory(1).unwrap();
        let genesis = ledger.tip().unwrap();

        let ok = ledger.record_validation(&genesis.hash, Vec::new()).unwrap();
        assert_eq!(ok.validation_status, ValidationStatus::Validated);
        assert!(ok.validation_timestamp.is_some());

        let errors = vec![ValidationError::new(ValidationCode::InvalidBlockHash, "mismatch")];
        let bad = ledger.record_validation(&genesis.hash, errors.clone()).unwrap();
        assert_eq!(bad.validation_status, ValidationStatus::Invalid);
        assert_eq!(ledger.tip().unwrap().validation_errors, Some(errors));

        assert!(matches!(
            ledger.record_validation("missing", Vec::new()),
            Err(LedgerError::BlockNotFound(_))
        ));
    }

    #[test]
    fn test_replace_chain_rules() {
        let source = Ledger::in_memory(1).unwrap();
        for amount in [1.0, 2.0] {
            source
                .create_block(vec![Transaction::system("miner", amount).unwrap()])
                .unwrap();
        }
        let longer = source.chain();

        let local = Ledger::in_memory(1).unwrap();
        local.submit_transaction(Transaction::system("x", 1.0).unwrap()).unwrap();
        local.replace_chain(longer.clone()).unwrap();
        assert_eq!(local.len(), 3);
        assert_eq!(local.tip().unwrap().hash, longer[2].hash);
        assert!(local.pending_transactions().is_empty());

        let shorter = longer[..2].to_vec();
        assert!(matches!(
            local.replace_chain(shorter),
            Err(LedgerError::StaleChain { candidate: 2, current: 3 })
        ));

        let mut broken = longer;
        broken[1].nonce += 1;
        assert!(matches!(local.replace_chain(broken), Err(LedgerError::InvalidChain(_))));
        assert_eq!(local.len(), 3);
    }

    #[test]
    fn test_forged_system_debit_is_rejected() {
        let ledger = Ledger::in_memory(1).unwrap();
        let victim = Wallet::generate();
        let victim_addr = victim.address().into_string();
        let mut forged = Transaction::new(victim_addr.clone(), "0xattacker", 10.0).unwrap();
        forged.system = true;

        let err = ledger.create_block(vec![forged.clone()]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransactionSignature { position: 0, .. }));
        assert!(matches!(
            ledger.submit_transaction(forged.clone()),
            Err(LedgerError::InvalidTransactionSignature { .. })
        ));
        assert_eq!(ledger.len(), 1);

        let genesis = ledger.tip().unwrap();
        let block = mined_on(&ledger, &genesis, vec![forged]);
        assert!(!ledger.is_valid_chain(&[genesis, block]));
        assert_eq!(ledger.balance(&victim_addr), 0.0);
    }

    #[test]
    fn test_signed_negative_amount_is_rejected() {
        let ledger = Ledger::in_memory(1).unwrap();
        let thief = Wallet::generate();
        let drain = signed_raw(&thief, "0xvictim", -100.0);
        assert_eq!(drain.check_signature(), SignatureCheck::Valid);

        let err = ledger.create_block(vec![drain.clone()]).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidTransaction(TransactionError::InvalidAmount(-100.0))
        );
        assert!(ledger.submit_transaction(drain.clone()).is_err());
        assert_eq!(ledger.len(), 1);

        let genesis = ledger.tip().unwrap();
        let block = mined_on(&ledger, &genesis, vec![drain]);
        let chain = vec![genesis, block];
        assert!(!ledger.is_valid_chain(&chain));
        assert!(matches!(ledger.replace_chain(chain), Err(LedgerError::InvalidChain(_))));
        assert_eq!(ledger.balance("0xvictim"), 0.0);
    }

    #[test]
    fn test_adopted_transaction_is_not_mined_twice() {
        let alice = Wallet::generate();
        let tx = signed(&alice, "0xbob", 4.0);

        let peer = Ledger::in_memory(1).unwrap();
        peer.create_block(vec![tx.clone()]).unwrap();

        let local = Ledger::in_memory(1).unwrap();
        local.submit_transaction(tx).unwrap();
        local.replace_chain(peer.chain()).unwrap();

        assert!(local.pending_transactions().is_empty());
        assert!(local.mine_pending().unwrap().is_none());
        assert_eq!(local.balance("0xbob"), 4.0);
        assert_eq!(local.stats().transaction_count, 1);
    }

    #[test]
    fn test_replace_chain_if_requires_unchanged_tip() {
        let peer = Ledger::in_memory(1).unwrap();
        for amount in [1.0, 2.0] {
            peer.create_block(vec![Transaction::system("miner", amount).unwrap()]).unwrap();
        }
        let candidate = peer.chain();

        let local = Ledger::in_memory(1).unwrap();
        let seen = local.tip().unwrap().hash;
        let mined = local
            .create_block(vec![Transaction::system("local", 1.0).unwrap()])
            .unwrap();

        let err = local.replace_chain_if(candidate.clone(), &seen).unwrap_err();
        assert_eq!(
            err,
            LedgerError::TipMoved {
                expected: seen,
                actual: mined.hash.clone(),
            }
        );
        assert_eq!(local.tip().unwrap().hash, mined.hash);

        local.replace_chain_if(candidate.clone(), &mined.hash).unwrap();
        assert_eq!(local.tip().unwrap().hash, candidate[2].hash);
    }

    #[test]
    fn test_transaction_lookup_and_verify() {
        let ledger = Ledger::in_memory(1).unwrap();
        let alice = Wallet::generate();
        let block = ledger.create_block(vec![signed(&alice, "0xbob", 2.0)]).unwrap();
        let committed = block.transactions[0].id.unwrap();
        let pending = ledger
            .submit_transaction(Transaction::system("0xbob", 5.0).unwrap())
            .unwrap()
            .id
            .unwrap();

        assert_eq!(ledger.transaction(committed).unwrap().block_id, Some(2));
        assert_eq!(ledger.verify_transaction(committed), Ok(SignatureCheck::Valid));
        assert_eq!(ledger.transaction(pending).unwrap().block_id, None);
        assert_eq!(ledger.verify_transaction(pending), Ok(SignatureCheck::Exempt));
        assert_eq!(
            ledger.verify_transaction(404),
            Err(LedgerError::TransactionNotFound(404))
        );
    }

    #[test]
    fn test_stats() {
        let ledger = Ledger::in_memory(1).unwrap();
        ledger
            .create_block(vec![Transaction::system("miner", 1.0).unwrap()])
            .unwrap();
        let stats = ledger.stats();
        assert_eq!(stats.length, 2);
        assert_eq!(stats.pending_blocks, 2);
        assert_eq!(stats.transaction_count, 1);
        assert_eq!(stats.difficulty, 1);
        assert_eq!(stats.tip_hash, ledger.tip().map(|b| b.hash));
    }
}
