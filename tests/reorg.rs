//! Reorganization scenarios over an in-memory store

mod common;

use trichain_core::chain::{
    connect_block, disconnect_block, reorganize, ChainError, Effects, ProcessStatus,
};
use trichain_core::consensus::{Channel, SourceBlock};
use trichain_core::crypto::hash_bytes;
use trichain_core::mempool::Mempool;
use trichain_core::storage::{Ledger, StagedStore};
use trichain_core::validation::{signature_script, LegacyTransaction, Transaction, TxInput, TxOutput};

use common::*;

use trichain_core::constants::RESERVE_EXEMPT_VERSION;

const GENESIS_TIME: u64 = trichain_core::constants::GENESIS_TIMESTAMP;

/// Genesis, then A1..A5 staked by one sigchain. A4 carries `t`, A5 carries
/// `u`. B4 (prime) and B5 (hash, also carrying `u`) fork off A3.
struct Fork {
    tc: TestChain,
    a: Vec<SourceBlock>,
    b4: SourceBlock,
    b5: SourceBlock,
    t: Transaction,
    u: Transaction,
}

fn fork() -> Fork {
    let tc = TestChain::new();
    let t = transfer(b"t-sender", GENESIS_TIME);
    let u = transfer(b"u-sender", GENESIS_TIME);
    assert!(tc.mempool.accept(t.clone()));
    assert!(tc.mempool.accept(u.clone()));

    let mut staker = Staker::new(b"staker");
    let mut tip = Tip::of(&tc.genesis);
    let mut a = Vec::new();
    for height in 1..=5 {
        let transactions = match height {
            4 => vec![t.clone()],
            5 => vec![u.clone()],
            _ => vec![],
        };
        let block = staker.stake_block(tip, transactions);
        assert_eq!(tc.process(&block), ProcessStatus::Accepted, "A{height}");
        assert_eq!(tc.best_hash(), block.hash());
        tip = Tip::of(&block);
        a.push(block);
    }

    let b4 = work_block(Tip::of(&a[2]), Channel::Prime, vec![], b"b4");
    let b5 = work_block(Tip::of(&b4), Channel::Hash, vec![u.clone()], b"b5");
    Fork { tc, a, b4, b5, t, u }
}


#[test]
fn test_heavier_branch_takes_over() {
    let Fork { tc, a, b4, b5, .. } = fork();
    let a3 = tc.state(&a[2]);

    // One channel ahead, one tied, one behind: not enough on its own
    assert_eq!(tc.process(&b4), ProcessStatus::Accepted);
    assert_eq!(tc.best_hash(), a[4].hash());
    assert!(tc.state(&b4).hash_next.is_zero());

    assert_eq!(tc.process(&b5), ProcessStatus::Accepted);
    let best = tc.chain.best().unwrap();
    assert_eq!(best.hash, b5.hash());
    assert_eq!(best.height, 5);
    // Two channel switches
    assert_eq!(best.trust, a3.chain_trust + 3 + 3);

    assert_eq!(tc.state(&a[2]).hash_next, b4.hash());
    assert_eq!(tc.state(&b4).hash_next, b5.hash());
    assert!(tc.state(&a[3]).hash_next.is_zero());
    assert_eq!(tc.chain.block_at(4).unwrap().map(|b| b.hash()), Some(b4.hash()));

    // The abandoned branch stays stored
    assert!(tc.chain.block(&a[4].hash()).unwrap().is_some());

    // Channel heights count per channel; genesis is the first hash block
    assert_eq!(tc.state(&b4).channel_height, 1);
    assert_eq!(tc.state(&b5).channel_height, 2);
    assert_eq!(tc.state(&a[4]).channel_height, 5);
}

#[test]
fn test_sigchain_pointers_follow_the_reorg() {
    let Fork { tc, a, b4, b5, .. } = fork();
    let ledger = tc.chain.ledger();
    let staker = hash_bytes(b"staker");
    assert_eq!(ledger.read_last_stake(&staker).unwrap(), Some(producer_hash(&a[4])));

    tc.process(&b4);
    tc.process(&b5);

    // Disconnecting A5 then A4 leaves the stake pointer on A3
    assert_eq!(ledger.read_last_stake(&staker).unwrap(), Some(producer_hash(&a[2])));
    assert_eq!(ledger.read_last_tx(&staker).unwrap(), Some(producer_hash(&a[2])));
    assert_eq!(ledger.read_index(&producer_hash(&a[3])).unwrap(), None);
    assert_eq!(ledger.read_index(&producer_hash(&b5)).unwrap(), Some(b5.hash()));
}

#[test]
fn test_mempool_after_reorg() {
    let Fork { tc, a, b4, b5, t, u } = fork();

    // Confirmed transactions leave the pool
    assert!(tc.mempool.is_empty());

    tc.process(&b4);
    tc.process(&b5);
    assert_eq!(tc.best_hash(), b5.hash());

    // `t` lost its block; `u` was confirmed again by B5
    assert!(tc.mempool.contains(&t.hash()));
    assert!(!tc.mempool.contains(&u.hash()));
    assert_eq!(tc.mempool.size(), 1);

    // Producers never return to the pool
    assert!(!tc.mempool.contains(&producer_hash(&a[3])));
    assert!(!tc.mempool.contains(&producer_hash(&a[4])));
}

#[test]
fn test_disconnect_connect_round_trip() {
    let Fork { tc, a, .. } = fork();
    let tip = a[4].hash();
    let before = tc.state(&a[4]);
    let prev_before = tc.state(&a[3]);
    assert!(before.fees > 0);

    let staged = StagedStore::new(tc.chain.store());
    let ledger = Ledger::new(&staged);
    let context = tc.chain.context();
    let mut effects = Effects::new();

    disconnect_block(&tip, &ledger, context, &mut effects).unwrap();
    let detached = ledger.read_block(&tip).unwrap().unwrap();
    assert_eq!(detached.fee_reserve, before.fee_reserve - before.fees);
    assert!(ledger.read_block(&a[3].hash()).unwrap().unwrap().hash_next.is_zero());
    assert_eq!(ledger.read_height(5).unwrap(), None);

    connect_block(&tip, &ledger, context, &mut effects).unwrap();
    assert_eq!(ledger.read_block(&tip).unwrap(), Some(before));
    assert_eq!(ledger.read_block(&a[3].hash()).unwrap(), Some(prev_before));
    assert_eq!(ledger.read_height(5).unwrap(), Some(tip));
}

#[test]
fn test_reorganize_orders_and_stays_staged() {
    let Fork { tc, a, b4, .. } = fork();
    assert_eq!(tc.process(&b4), ProcessStatus::Accepted);
    let best = tc.chain.best().unwrap();

    let staged = StagedStore::new(tc.chain.store());
    let ledger = Ledger::new(&staged);
    let target = ledger.read_block(&b4.hash()).unwrap().unwrap();
    let mut effects = Effects::new();
    let reorg = reorganize(&target, &ledger, tc.chain.context(), &best, &mut effects).unwrap();

    let disconnected: Vec<_> = reorg.disconnected.iter().map(|b| b.hash()).collect();
    let connected: Vec<_> = reorg.connected.iter().map(|b| b.hash()).collect();
    assert_eq!(disconnected, vec![a[4].hash(), a[3].hash()]);
    assert_eq!(connected, vec![b4.hash()]);
    assert_eq!(reorg.best.hash, b4.hash());

    // Nothing reaches the store until the overlay is committed
    assert_eq!(tc.chain.ledger().read_best().unwrap(), Some(a[4].hash()));
    assert_eq!(tc.chain.best().unwrap().hash, a[4].hash());
}

#[test]
fn test_rewind_erases_and_resurrects() {
    let Fork { tc, a, t, u, .. } = fork();

    let best = tc.chain.rewind(&a[2].hash()).unwrap();
    assert_eq!(best.hash, a[2].hash());
    assert_eq!(best.height, 3);

    assert!(tc.chain.block(&a[3].hash()).unwrap().is_none());
    assert!(tc.chain.block(&a[4].hash()).unwrap().is_none());
    assert!(tc.state(&a[2]).hash_next.is_zero());
    assert_eq!(tc.chain.block_at(4).unwrap(), None);

    assert!(tc.mempool.contains(&t.hash()));
    assert!(tc.mempool.contains(&u.hash()));

    // The erased blocks can be processed again
    assert_eq!(tc.process(&a[3]), ProcessStatus::Accepted);
    assert_eq!(tc.best_hash(), a[3].hash());
}

#[test]
fn test_rewind_rejects_side_branch() {
    let Fork { tc, a, b4, b5, .. } = fork();
    tc.process(&b4);
    tc.process(&b5);

    let result = tc.chain.rewind(&a[3].hash());
    assert!(matches!(result, Err(ChainError::NotInMainChain(hash)) if hash == a[3].hash()));
    assert_eq!(tc.best_hash(), b5.hash());
}

#[test]
fn test_supply_and_fee_reserve_track_connects() {
    let Fork { tc, a, .. } = fork();
    let genesis = tc.state(&tc.genesis);
    let states: Vec<_> = a.iter().map(|block| tc.state(block)).collect();

    let minted: u64 = states.iter().map(|s| s.mint).sum();
    assert_eq!(states[4].money_supply, genesis.money_supply + minted);
    assert!(states.iter().all(|s| s.mint == STAKE_REWARD));

    // Fee reserve carries along the stake channel
    assert_eq!(states[3].fees, 5);
    assert_eq!(states[3].fee_reserve, 5);
    assert_eq!(states[4].fee_reserve, 10);
}

#[test]
fn test_orphans_wait_for_their_parent() {
    let tc = TestChain::new();
    let b1 = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![], b"1");
    let b2 = work_block(Tip::of(&b1), Channel::Prime, vec![], b"2");
    let b3 = work_block(Tip::of(&b2), Channel::Hash, vec![], b"3");

    assert_eq!(tc.process(&b3), ProcessStatus::Orphan);
    assert_eq!(tc.process(&b2), ProcessStatus::Orphan);
    assert_eq!(tc.process(&b2), ProcessStatus::Duplicate);
    assert_eq!(tc.chain.orphan_count().unwrap(), 2);

    assert_eq!(tc.process(&b1), ProcessStatus::Accepted);
    assert_eq!(tc.chain.orphan_count().unwrap(), 0);
    assert_eq!(tc.best_hash(), b3.hash());
    assert_eq!(tc.process(&b3), ProcessStatus::Duplicate);
}

#[test]
fn test_orphan_limits() {
    let mut config = test_config();
    config.max_orphans = 1;
    let tc = TestChain::with_config(config);

    let b1 = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![], b"1");
    let b2 = work_block(Tip::of(&b1), Channel::Prime, vec![], b"2");
    let other = work_block(Tip::of(&b1), Channel::Stake, vec![], b"other");
    let b3 = work_block(Tip::of(&b2), Channel::Hash, vec![], b"3");

    assert_eq!(tc.process(&b2), ProcessStatus::Orphan);
    // Same predecessor already has a waiting orphan
    assert_eq!(tc.process(&other), ProcessStatus::Ignored);
    // Map full
    assert_eq!(tc.process(&b3), ProcessStatus::Ignored);
}

#[test]
fn test_orphans_below_checkpoint_are_ignored() {
    let mut config = test_config();
    config.testnet = false;
    config.checkpoint_timespan = SPACING;
    let tc = TestChain::with_config(config);

    let b1 = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![], b"1");
    let b2 = work_block(Tip::of(&b1), Channel::Prime, vec![], b"2");
    assert_eq!(tc.process(&b1), ProcessStatus::Accepted);
    assert_eq!(tc.process(&b2), ProcessStatus::Accepted);
    assert_eq!(tc.chain.best().unwrap().checkpoint_height, 2);

    // A stranger claiming height 2 with an unknown parent
    let unknown = Tip { hash: hash_bytes(b"unknown"), height: 1, time: GENESIS_TIME };
    let stale = work_block(unknown, Channel::Hash, vec![], b"stale");
    assert_eq!(tc.process(&stale), ProcessStatus::Ignored);

    let future = Tip { hash: hash_bytes(b"unknown"), height: 9, time: GENESIS_TIME };
    let ahead = work_block(future, Channel::Hash, vec![], b"ahead");
    assert_eq!(tc.process(&ahead), ProcessStatus::Orphan);
}

#[test]
fn test_conflicted_block_stays_off_best_chain() {
    let tc = TestChain::new();
    let first = transfer(b"double", GENESIS_TIME);
    let second = transfer(b"double", GENESIS_TIME + 1);
    assert!(tc.mempool.accept(first));
    assert!(tc.mempool.accept(second.clone()));
    assert!(tc.mempool.is_conflicted(&second.hash()));

    let block = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![second], b"c");
    assert_eq!(tc.process(&block), ProcessStatus::Accepted);

    let state = tc.state(&block);
    assert!(state.conflicted);
    assert!(state.hash_next.is_zero());
    assert_eq!(tc.best_hash(), tc.genesis.hash());
}

#[test]
fn test_client_block_needs_bodies() {
    let tc = TestChain::new();
    let pending = transfer(b"pending", GENESIS_TIME);
    let block = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![pending.clone()], b"client");
    let client = as_client(&block);

    match tc.process(&client) {
        ProcessStatus::Incomplete { missing } => assert_eq!(missing, block.vtx()),
        status => panic!("expected incomplete, got {status:?}"),
    }
    assert!(tc.chain.block(&block.hash()).unwrap().is_none());

    // Bodies carried by the full block, then the client form is a duplicate
    assert_eq!(tc.process(&block), ProcessStatus::Accepted);
    assert_eq!(tc.process(&client), ProcessStatus::Duplicate);
    assert_eq!(tc.best_hash(), block.hash());
}

#[test]
fn test_client_block_takes_bodies_from_mempool() {
    let tc = TestChain::new();
    let pending = transfer(b"pending", GENESIS_TIME);
    let block = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![pending.clone()], b"client");
    let client = as_client(&block);
    assert!(tc.mempool.accept(pending));

    // Only the producer is still unknown
    match tc.process(&client) {
        ProcessStatus::Incomplete { missing } => assert_eq!(missing, vec![block.vtx()[1]]),
        status => panic!("expected incomplete, got {status:?}"),
    }

    assert_eq!(tc.process(&block), ProcessStatus::Accepted);
    assert!(tc.mempool.is_empty());
}

#[test]
fn test_relay_skipped_while_synchronizing() {
    let mut tc = TestChain::new();
    let genesis = tc.relayed();
    assert_eq!(genesis.len(), 1);
    assert_eq!(genesis[0].hash, tc.genesis.hash());

    let b1 = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![], b"1");
    let b2 = work_block(Tip::of(&b1), Channel::Prime, vec![], b"2");

    tc.chain.set_synchronizing(true);
    tc.process(&b1);
    assert!(tc.relayed().is_empty());

    tc.chain.set_synchronizing(false);
    tc.process(&b2);
    let relayed = tc.relayed();
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].hash, b2.hash());
    assert_eq!(relayed[0].height, 2);
}

#[test]
fn test_second_genesis_is_refused() {
    let tc = TestChain::new();
    assert_eq!(tc.process(&tc.genesis), ProcessStatus::Duplicate);

    let other = trichain_core::node::genesis_block(GENESIS_TIME + 1, vec![]);
    assert_eq!(tc.process(&other), ProcessStatus::Rejected);
}

#[test]
fn test_invalid_blocks_are_rejected_without_trace() {
    let tc = TestChain::new();
    let b1 = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![], b"1");

    // Wrong height
    let mut bad = b1.clone();
    if let SourceBlock::Tritium(block) = &mut bad {
        block.header.height = 7;
    }
    assert_eq!(tc.process(&bad), ProcessStatus::Rejected);

    // Miner pays more than the reserve released so far
    let greedy = tritium_block(
        Tip::of(&tc.genesis),
        Channel::Hash,
        vec![],
        coinbase(b"greedy", GENESIS_TIME + SPACING, 1_000_000),
        None,
    );
    assert_eq!(tc.process(&greedy), ProcessStatus::Rejected);
    assert!(tc.chain.block(&greedy.hash()).unwrap().is_none());

    // Unsigned stake block
    let mut staker = Staker::new(b"staker");
    let signed = staker.stake_block(Tip::of(&tc.genesis), vec![]);
    let mut unsigned = signed.clone();
    if let SourceBlock::Tritium(block) = &mut unsigned {
        block.signature.clear();
    }
    assert_eq!(tc.process(&unsigned), ProcessStatus::Rejected);
    assert_eq!(tc.process(&signed), ProcessStatus::Accepted);
    assert_eq!(tc.best_hash(), signed.hash());
}

#[test]
fn test_legacy_spend_double_spend_and_rollback() {
    let tc = TestChain::new();
    let key = tc.wallet.generate_key().unwrap();
    let merchant = hash_bytes(b"merchant");

    let t1 = GENESIS_TIME + SPACING;
    let reward = LegacyTransaction::coinbase(vec![TxOutput { amount: 500, pubkey_hash: key.pubkey_hash() }], t1);
    let l1 = legacy_block(Tip::of(&tc.genesis), vec![reward.clone()]);
    assert_eq!(tc.process(&l1), ProcessStatus::Accepted);
    assert_eq!(tc.wallet.get_balance(), 500);
    assert_eq!(tc.state(&l1).mint, 500);

    let mut spend = LegacyTransaction::new(
        vec![TxInput::new(reward.hash(), 0)],
        vec![TxOutput { amount: 400, pubkey_hash: merchant }],
        t1 + SPACING,
    );
    tc.wallet.sign_inputs(&mut spend).unwrap();
    let l2 = legacy_block(
        Tip::of(&l1),
        vec![LegacyTransaction::coinbase(vec![TxOutput { amount: 1, pubkey_hash: merchant }], t1 + SPACING), spend.clone()],
    );
    assert_eq!(tc.process(&l2), ProcessStatus::Accepted);
    assert_eq!(tc.best_hash(), l2.hash());

    let l2_state = tc.state(&l2);
    assert_eq!(l2_state.fees, 100);
    assert_eq!(l2_state.fee_reserve, 100);
    assert_eq!(tc.chain.ledger().read_spent(&reward.hash(), 0).unwrap(), Some(spend.hash()));
    assert_eq!(tc.wallet.get_balance(), 0);

    // Spending the same output again fails the whole reorganization
    let mut again = LegacyTransaction::new(
        vec![TxInput::new(reward.hash(), 0)],
        vec![TxOutput { amount: 300, pubkey_hash: merchant }],
        t1 + 2 * SPACING,
    );
    again.inputs[0].script = signature_script(key.private_key(), &again);
    let l3 = legacy_block(
        Tip::of(&l2),
        vec![LegacyTransaction::coinbase(vec![TxOutput { amount: 2, pubkey_hash: merchant }], t1 + 2 * SPACING), again],
    );
    match tc.chain.process(l3.clone(), NOW) {
        Err(ChainError::Reorg { hash, source }) => {
            assert_eq!(hash, l3.hash());
            assert!(matches!(*source, ChainError::DoubleSpend { index: 0, .. }));
        }
        other => panic!("expected failed reorganization, got {other:?}"),
    }
    assert_eq!(tc.best_hash(), l2.hash());
    assert!(tc.chain.block(&l3.hash()).unwrap().is_none());

    // Rolling back frees the output and returns the spend to the pool
    tc.chain.rewind(&l1.hash()).unwrap();
    assert_eq!(tc.chain.ledger().read_spent(&reward.hash(), 0).unwrap(), None);
    assert!(tc.chain.block(&l2.hash()).unwrap().is_none());
    assert!(tc.mempool.contains(&spend.hash()));
    assert_eq!(tc.chain.best().unwrap().tip.fee_reserve, 0);
}

#[test]
fn test_failing_orphan_does_not_undo_its_parent() {
    let tc = TestChain::new();
    let t = transfer(b"t-repeat", GENESIS_TIME);
    let p1 = work_block(Tip::of(&tc.genesis), Channel::Hash, vec![t.clone()], b"p1");
    // Carries `t` a second time
    let child = work_block(Tip::of(&p1), Channel::Prime, vec![t], b"child");
    let grandchild = work_block(Tip::of(&child), Channel::Hash, vec![], b"grandchild");

    assert_eq!(tc.process(&grandchild), ProcessStatus::Orphan);
    assert_eq!(tc.process(&child), ProcessStatus::Orphan);
    assert_eq!(tc.chain.orphan_count().unwrap(), 2);

    assert!(matches!(tc.chain.process(p1.clone(), NOW), Ok(ProcessStatus::Accepted)));
    assert_eq!(tc.best_hash(), p1.hash());
    assert!(tc.chain.block(&child.hash()).unwrap().is_none());
    assert!(tc.chain.block(&grandchild.hash()).unwrap().is_none());
    // The bad branch is gone from the gate as well
    assert_eq!(tc.chain.orphan_count().unwrap(), 0);
    assert_eq!(tc.process(&grandchild), ProcessStatus::Orphan);
}

#[test]
fn test_reserve_exempt_version_may_overdraw() {
    let tc = TestChain::new();
    let miner = hash_bytes(b"early-miner");
    let t1 = GENESIS_TIME + SPACING;
    let payout = |time| LegacyTransaction::coinbase(vec![TxOutput { amount: 1_000_000, pubkey_hash: miner }], time);
    let released = tc.state(&tc.genesis).released_reserve[0] + test_config().release_per_minute[0];
    assert!(1_000_000 > released);

    let current = legacy_block(Tip::of(&tc.genesis), vec![payout(t1)]);
    assert_eq!(tc.process(&current), ProcessStatus::Rejected);

    let exempt = legacy_block_at_version(Tip::of(&tc.genesis), RESERVE_EXEMPT_VERSION, vec![payout(t1 + 1)]);
    assert_eq!(tc.process(&exempt), ProcessStatus::Accepted);
    let state = tc.state(&exempt);
    assert_eq!(state.mint, 1_000_000);
    assert_eq!(state.released_reserve[0], 0);
    assert_eq!(state.money_supply, tc.state(&tc.genesis).money_supply + 1_000_000);
}
