use crate::block::Block;
use crate::error::StoreError;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Answers whether a block hash is known, for previous-hash checks.
pub trait BlockLookup {
    fn contains_hash(&self, hash: &str) -> bool;
}

impl BlockLookup for [Block] {
    fn contains_hash(&self, hash: &str) -> bool {
        self.iter().any(|b| b.hash == hash)
    }
}

impl BlockLookup for HashSet<String> {
    fn contains_hash(&self, hash: &str) -> bool {
        self.contains(hash)
    }
}

/// Ordered, queryable storage of the chain and the pending transaction pool.
///
/// Implementations must make `append_block` and `replace_blocks` atomic:
/// readers see either the old chain or the new one, never a mix.
pub trait ChainStore: Send + Sync {
    /// Snapshot of the whole chain in order.
    fn blocks(&self) -> Vec<Block>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tip(&self) -> Option<Block>;

    /// Lookup by 1-based index.
    fn block_by_index(&self, index: u64) -> Option<Block>;

    fn block_by_hash(&self, hash: &str) -> Option<Block>;

    /// Append a block and its transactions as one unit. Assigns the block
    /// index, transaction ids and transaction `block_id`.
    fn append_block(&self, block: Block) -> Result<Block, StoreError>;

    /// Discard the chain and the pending pool, then store `blocks` in order,
    /// all or nothing.
    fn replace_blocks(&self, blocks: Vec<Block>) -> Result<(), StoreError>;

    /// Overwrite a stored block, matched by hash.
    fn update_block(&self, block: Block) -> Result<(), StoreError>;

    fn pending_transactions(&self) -> Vec<Transaction>;

    /// Add to the pool and return the transaction with its assigned id.
    fn add_pending_transaction(&self, tx: Transaction) -> Result<Transaction, StoreError>;

    fn remove_pending(&self, ids: &[u64]);

    /// Committed or pending transaction by store-assigned id.
    fn transaction_by_id(&self, id: u64) -> Option<Transaction>;
}

impl BlockLookup for dyn ChainStore {
    fn contains_hash(&self, hash: &str) -> bool {
        self.block_by_hash(hash).is_some()
    }
}

#[derive(Debug, Default)]
struct ChainState {
    blocks: Vec<Block>,
    by_hash: HashMap<String, usize>,
    pending: Vec<Transaction>,
    next_tx_id: u64,
}

impl ChainState {
    fn assign_tx_id(&mut self, tx: &mut Transaction) {
        if tx.id.is_none() {
            self.next_tx_id += 1;
            tx.id = Some(self.next_tx_id);
        }
    }
}

/// In-memory [`ChainStore`] guarded by a single `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<ChainState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryStore {
    fn blocks(&self) -> Vec<Block> {
        self.state.read().blocks.clone()
    }

    fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    fn tip(&self) -> Option<Block> {
        self.state.read().blocks.last().cloned()
    }

    fn block_by_index(&self, index: u64) -> Option<Block> {
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.state.read().blocks.get(position).cloned()
    }

    fn block_by_hash(&self, hash: &str) -> Option<Block> {
        let state = self.state.read();
        state.by_hash.get(hash).map(|&i| state.blocks[i].clone())
    }

    fn append_block(&self, mut block: Block) -> Result<Block, StoreError> {
        let mut state = self.state.write();
        if state.by_hash.contains_key(&block.hash) {
            return Err(StoreError::DuplicateHash(block.hash));
        }
        let position = state.blocks.len();
        block.index = position as u64 + 1;
        for tx in block.transactions.iter_mut() {
            state.assign_tx_id(tx);
            tx.block_id = Some(block.index);
        }
        state.by_hash.insert(block.hash.clone(), position);
        state.blocks.push(block.clone());
        Ok(block)
    }

    fn replace_blocks(&self, blocks: Vec<Block>) -> Result<(), StoreError> {
        if blocks.is_empty() {
            return Err(StoreError::EmptyChain);
        }

        // Build the replacement beside the live chain, then swap.
        let mut state = self.state.write();
        let mut next_tx_id = state.next_tx_id;
        let mut by_hash = HashMap::with_capacity(blocks.len());
        let mut rebuilt = Vec::with_capacity(blocks.len());
        for (position, mut block) in blocks.into_iter().enumerate() {
            if by_hash.insert(block.hash.clone(), position).is_some() {
                return Err(StoreError::DuplicateHash(block.hash));
            }
            block.index = position as u64 + 1;
            for tx in block.transactions.iter_mut() {
                next_tx_id += 1;
                tx.id = Some(next_tx_id);
                tx.block_id = Some(block.index);
            }
            rebuilt.push(block);
        }

        state.blocks = rebuilt;
        state.by_hash = by_hash;
        state.pending.clear();
        state.next_tx_id = next_tx_id;
        Ok(())
    }

    fn update_block(&self, block: Block) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let position = *state
            .by_hash
            .get(&block.hash)
            .ok_or_else(|| StoreError::UnknownBlock(block.hash.clone()))?;
        state.blocks[position] = block;
        Ok(())
    }

    fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.read().pending.clone()
    }

    fn add_pending_transaction(&self, mut tx: Transaction) -> Result<Transaction, StoreError> {
        let mut state = self.state.write();
        state.assign_tx_id(&mut tx);
        tx.block_id = None;
        state.pending.push(tx.clone());
        Ok(tx)
    }

    fn remove_pending(&self, ids: &[u64]) {
        let mut state = self.state.write();
        state.pending.retain(|tx| tx.id.map_or(true, |id| !ids.contains(&id)));
    }

    fn transaction_by_id(&self, id: u64) -> Option<Transaction> {
        let state = self.state.read();
        state
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .chain(state.pending.iter())
            .find(|tx| tx.id == Some(id))
            .cloned()
    }
}
