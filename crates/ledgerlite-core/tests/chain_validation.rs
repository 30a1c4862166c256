// Tamper detection over a three-block chain.

use ledgerlite_core::{calculate_hash, Block, Ledger, Transaction};
use ledgerlite_crypto::Wallet;

const DIFFICULTY: usize = 2;

fn three_block_chain() -> (Ledger, Vec<Block>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let ledger = Ledger::in_memory(DIFFICULTY).unwrap();
    let alice = Wallet::generate();

    ledger
        .create_block(vec![Transaction::system(alice.address().into_string(), 10.0).unwrap()])
        .unwrap();

    let mut tx = Transaction::new(alice.address().into_string(), "0xbob", 4.0).unwrap();
    tx.sign(&alice).unwrap();
    ledger.create_block(vec![tx]).unwrap();

    let chain = ledger.chain();
    assert_eq!(chain.len(), 3);
    (ledger, chain)
}

/// Re-mine `block` in place so its nonce and hash are consistent again.
fn remine(ledger: &Ledger, block: &mut Block) {
    let (nonce, hash) = ledger.pow().find_proof(&block.previous_hash, &block.transactions);
    block.nonce = nonce;
    block.hash = hash;
}

#[test]
fn test_untouched_chain_is_valid() {
    let (ledger, chain) = three_block_chain();
    assert!(ledger.is_valid_chain(&chain));
}

#[test]
fn test_empty_chain_is_invalid() {
    let (ledger, _) = three_block_chain();
    assert!(!ledger.is_valid_chain(&[]));
}

#[test]
fn test_previous_hash_tamper_detected() {
    let (ledger, chain) = three_block_chain();
    for i in 0..chain.len() {
        let mut tampered = chain.clone();
        tampered[i].previous_hash = "ab".repeat(32);
        assert!(!ledger.is_valid_chain(&tampered), "block {}", i);
    }
}

#[test]
fn test_hash_tamper_detected() {
    let (ledger, chain) = three_block_chain();
    for i in 0..chain.len() {
        let mut tampered = chain.clone();
        tampered[i].hash = format!("00{}", "f".repeat(62));
        assert!(!ledger.is_valid_chain(&tampered), "block {}", i);
    }
}

#[test]
fn test_nonce_tamper_detected() {
    let (ledger, chain) = three_block_chain();
    for i in 0..chain.len() {
        let mut tampered = chain.clone();
        tampered[i].nonce += 1;
        assert!(!ledger.is_valid_chain(&tampered), "block {}", i);
    }
}

#[test]
fn test_remining_last_block_restores_validity() {
    let (ledger, chain) = three_block_chain();
    let mut tampered = chain.clone();
    let last = tampered.len() - 1;
    tampered[last].nonce += 1;
    assert!(!ledger.is_valid_chain(&tampered));

    remine(&ledger, &mut tampered[last]);
    assert!(ledger.is_valid_chain(&tampered));
    assert_eq!(tampered[last].hash, chain[last].hash);
}

#[test]
fn test_relinking_after_tamper_restores_validity() {
    let (ledger, chain) = three_block_chain();
    let mut tampered = chain.clone();
    tampered[1].transactions[0].amount = 11.0;
    assert!(!ledger.is_valid_chain(&tampered));

    // system transactions carry no signature, so re-mining block 1 and
    // relinking block 2 yields a consistent fork
    remine(&ledger, &mut tampered[1]);
    tampered[2].previous_hash = tampered[1].hash.clone();
    remine(&ledger, &mut tampered[2]);
    assert!(ledger.is_valid_chain(&tampered));
}

#[test]
fn test_signed_transaction_tamper_cannot_be_remined() {
    let (ledger, chain) = three_block_chain();
    let mut tampered = chain;
    tampered[2].transactions[0].amount = 400.0;
    remine(&ledger, &mut tampered[2]);
    assert_eq!(
        tampered[2].hash,
        calculate_hash(&tampered[2].previous_hash, &tampered[2].transactions, tampered[2].nonce)
    );
    assert!(!ledger.is_valid_chain(&tampered));
}
