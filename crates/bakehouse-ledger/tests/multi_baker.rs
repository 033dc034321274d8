// Copyright 2024 PRAGMA
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod common;

use bakehouse_kernel::{
    AccountId, BalanceCategory, BalanceUpdate, Cycle, Delegation, Hash, Level, Mutez,
    Pseudotokens, RightKind, RightStatus, StakerRef, VdfSolution,
};
use bakehouse_ledger::{
    state::staking::StakingError, store::columns::seed_inputs, LedgerError, ReadStore,
    ValidationError,
};
use common::{attestation_slots, cycle_of, network::*, BLOCKS_PER_CYCLE};
use pretty_assertions::{assert_eq, assert_ne};
use std::collections::BTreeSet;

fn own(baker: AccountId) -> StakerRef {
    StakerRef::Baker { baker }
}

fn pool(delegate: AccountId) -> StakerRef {
    StakerRef::Shared { delegate }
}

fn carol() -> StakerRef {
    StakerRef::Single {
        contract: CAROL,
        delegate: BAKER_A,
    }
}

fn operations(pairs: &[[BalanceUpdate; 2]]) -> Vec<BalanceUpdate> {
    pairs.concat()
}

// Rounds
// ----------------------------------------------------------------------------

#[test]
fn two_bakers_settle_every_cycle() {
    let mut chain = Chain::new();
    let genesis = chain.store().clone();

    chain.run_until(3 * BLOCKS_PER_CYCLE + 1);

    for cycle in (0..3).map(Cycle::new) {
        let rows = [BAKER_A, BAKER_B].map(|baker| chain.baker_cycle(cycle, baker));
        for row in &rows {
            assert!(row.is_settled(), "{} in cycle {cycle}", row.baker);
            assert_eq!((row.missed_blocks, row.missed_attestations), (0, 0));
            assert_eq!(
                row.attestation_rewards.total(),
                Mutez::from(row.attestations) * rewards().attestation_reward_per_slot
            );
        }
        assert_eq!(rows.iter().map(|row| row.blocks).sum::<u32>(), BLOCKS_PER_CYCLE);
        assert_eq!(
            rows.iter().map(|row| row.attestations).sum::<u32>(),
            attestation_slots(cycle)
        );
    }

    while chain.next_level() > 1 {
        chain.revert();
    }
    assert_eq!(chain.store(), &genesis);
}

#[test]
fn reproposed_payload_realizes_the_proposer_right() {
    let mut chain = Chain::new();
    let level = chain.advance_to(contested);
    let cycle = cycle_of(level);

    let rights = chain.baking_rights(level);
    let (proposer, producer) = (rights[0].baker, rights[1].baker);
    assert_eq!(rights[0].round, Some(0));

    let before = chain.store().clone();
    let proposer_before = chain.baker_cycle(cycle, proposer);
    let producer_before = chain.baker_cycle(cycle, producer);

    let block = chain.apply(Plan {
        reproposal: Some(1),
        ..Plan::default()
    });
    assert_eq!((block.payload_round, block.proposer), (0, proposer));
    assert_eq!((block.block_round, block.producer), (rights[1].round.unwrap(), producer));

    assert_eq!(
        chain.right(level, RightKind::Baking, proposer).status,
        RightStatus::Realized
    );
    assert_eq!(
        chain.right(level, RightKind::Baking, producer).status,
        RightStatus::Uncovered
    );

    let bonus = rewards().block_bonus(block.attestation_power(), common::THRESHOLD);
    let max_bonus = common::constants().max_block_bonus(&rewards());

    let realized = chain.baker_cycle(cycle, proposer);
    assert_eq!(realized.blocks, proposer_before.blocks + 1);
    assert_eq!(realized.missed_blocks, proposer_before.missed_blocks);
    assert_eq!(realized.future_blocks, proposer_before.future_blocks - 1);
    assert_eq!(
        realized.missed_block_rewards,
        proposer_before.missed_block_rewards + max_bonus - bonus
    );
    assert_eq!(
        realized.block_rewards.delegated,
        proposer_before.block_rewards.delegated + rewards().block_reward
    );

    let uncovered = chain.baker_cycle(cycle, producer);
    assert_eq!(uncovered.blocks, producer_before.blocks);
    assert_eq!(uncovered.missed_blocks, producer_before.missed_blocks);
    assert_eq!(uncovered.missed_block_rewards, producer_before.missed_block_rewards);
    assert_eq!(uncovered.future_blocks, producer_before.future_blocks - 1);
    assert_eq!(
        uncovered.future_block_rewards,
        producer_before.future_block_rewards - full_block_rewards()
    );
    assert_eq!(
        uncovered.block_rewards.delegated,
        producer_before.block_rewards.delegated + bonus
    );

    chain.revert();
    assert_eq!(chain.baker_cycle(cycle, proposer), proposer_before);
    assert_eq!(chain.baker_cycle(cycle, producer), producer_before);
    assert_eq!(
        chain.right(level, RightKind::Baking, producer).status,
        RightStatus::Future
    );
    assert_eq!(chain.store(), &before);
}

#[test]
fn rounds_before_the_payload_are_missed() {
    let mut chain = Chain::new();
    let level = chain.advance_to(contested);
    let cycle = cycle_of(level);

    let rights = chain.baking_rights(level);
    let (absent, proposer) = (rights[0].baker, rights[1].baker);

    let before = chain.store().clone();
    let absent_before = chain.baker_cycle(cycle, absent);
    let proposer_before = chain.baker_cycle(cycle, proposer);

    let block = chain.apply(Plan {
        proposal: 1,
        ..Plan::default()
    });
    assert_eq!(block.payload_round, rights[1].round.unwrap());

    assert_eq!(
        chain.right(level, RightKind::Baking, absent).status,
        RightStatus::Missed
    );
    assert_eq!(
        chain.right(level, RightKind::Baking, proposer).status,
        RightStatus::Realized
    );

    let missed = chain.baker_cycle(cycle, absent);
    assert_eq!(missed.missed_blocks, absent_before.missed_blocks + 1);
    assert_eq!(
        missed.missed_block_rewards,
        absent_before.missed_block_rewards + full_block_rewards()
    );
    assert_eq!(missed.blocks, absent_before.blocks);
    assert_eq!(missed.future_blocks, absent_before.future_blocks - 1);

    let realized = chain.baker_cycle(cycle, proposer);
    assert_eq!(realized.blocks, proposer_before.blocks + 1);
    assert_eq!(realized.missed_blocks, proposer_before.missed_blocks);

    chain.revert();
    assert_eq!(chain.baker_cycle(cycle, absent), absent_before);
    assert_eq!(chain.baker_cycle(cycle, proposer), proposer_before);
    assert_eq!(chain.store(), &before);
}

// Attestations
// ----------------------------------------------------------------------------

#[test]
fn silent_attesters_miss_their_slots() {
    let mut chain = Chain::new();
    let level = chain.advance_to(|chain, level| {
        level % BLOCKS_PER_CYCLE != 0 && chain.attestation_rights(level).len() == 2
    });

    let rights = chain.attestation_rights(level);
    let (loud, quiet) = (&rights[0], &rights[1]);
    let (loud_slots, quiet_slots) = (loud.slots.unwrap(), quiet.slots.unwrap());

    let before = chain.store().clone();
    let loud_before = chain.baker_cycle(loud.cycle, loud.baker);
    let quiet_before = chain.baker_cycle(quiet.cycle, quiet.baker);

    let block = chain.apply(Plan {
        silent: vec![quiet.baker],
        ..Plan::default()
    });
    assert_eq!(block.attestation_power(), loud_slots);

    let attested = chain.baker_cycle(loud.cycle, loud.baker);
    assert_eq!(attested.attestations, loud_before.attestations + loud_slots);
    assert_eq!(attested.missed_attestations, loud_before.missed_attestations);

    let silent = chain.baker_cycle(quiet.cycle, quiet.baker);
    assert_eq!(silent.attestations, quiet_before.attestations);
    assert_eq!(silent.missed_attestations, quiet_before.missed_attestations + quiet_slots);
    assert_eq!(silent.future_attestations, quiet_before.future_attestations - quiet_slots);

    assert_eq!(
        chain.right(level, RightKind::Attestation, loud.baker).status,
        RightStatus::Realized
    );
    assert_eq!(
        chain.right(level, RightKind::Attestation, quiet.baker).status,
        RightStatus::Missed
    );

    chain.revert();
    assert_eq!(chain.baker_cycle(quiet.cycle, quiet.baker), quiet_before);
    assert_eq!(chain.store(), &before);
}

#[test]
fn forfeited_attesting_rewards_are_lost() {
    let mut chain = Chain::new();
    chain.run_until(2 * BLOCKS_PER_CYCLE);
    let cycle = Cycle::new(1);

    let due_a = chain.baker_cycle(cycle, BAKER_A).future_attestation_rewards;
    let due_b = chain.baker_cycle(cycle, BAKER_B).future_attestation_rewards;
    assert!(due_b > 0, "baker B has no attestation duty in cycle {cycle}");

    let before = chain.store().clone();
    let balance_before = chain.baker(BAKER_B).balance;
    let plan = Plan {
        silent: vec![BAKER_B],
        forfeit: vec![BAKER_B],
        ..Plan::default()
    };

    let mut short = chain.block(plan.clone());
    let lost = short
        .balance_updates
        .iter()
        .position(|update| update.category == Some(BalanceCategory::LostAttestingRewards))
        .unwrap();
    short.balance_updates[lost].change -= 1;
    short.balance_updates[lost - 1].change += 1;
    assert!(matches!(
        chain.ledger().apply(&short),
        Err(LedgerError::Validation(ValidationError::AttestationRewards { baker, expected, found, .. }))
            if baker == BAKER_B && expected == due_b && found == due_b - 1
    ));
    assert_eq!(chain.store(), &before);

    let block = chain.apply(plan);

    let forfeited = chain.baker_cycle(cycle, BAKER_B);
    assert_eq!(forfeited.missed_attestation_rewards, due_b);
    assert_eq!(forfeited.attestation_rewards.total(), 0);
    assert_eq!(forfeited.future_attestation_rewards, 0);

    let paid = chain.baker_cycle(cycle, BAKER_A);
    assert_eq!(paid.attestation_rewards.delegated, due_a);
    assert_eq!(paid.missed_attestation_rewards, 0);

    // Lost rewards are burned as soon as minted, B only keeps what it baked.
    let baked: Mutez = block
        .balance_updates
        .iter()
        .filter(|update| update.contract == Some(BAKER_B))
        .map(|update| update.change)
        .sum();
    assert_eq!(chain.baker(BAKER_B).balance, balance_before + baked);

    chain.revert();
    assert_eq!(chain.baker_cycle(cycle, BAKER_B).future_attestation_rewards, due_b);
    assert_eq!(chain.baker_cycle(cycle, BAKER_B).missed_attestation_rewards, 0);
    assert_eq!(chain.store(), &before);
}

// Staking
// ----------------------------------------------------------------------------

#[test]
fn slashes_credit_the_denouncer() {
    let mut chain = Chain::new();
    chain.run_until(2);
    let cycle = cycle_of(2);

    chain.apply(Plan {
        operations: operations(&[
            BalanceUpdate::pair(
                BalanceUpdate::contract(CAROL, 0),
                BalanceUpdate::deposits(carol(), 0),
                2_000,
            ),
            BalanceUpdate::pair(
                BalanceUpdate::deposits(own(BAKER_B), 0),
                BalanceUpdate::unstaked_deposits(own(BAKER_B), cycle, 0),
                1_000,
            ),
        ]),
        ..Plan::default()
    });

    let before = chain.store().clone();
    let a_before = chain.baker(BAKER_A);
    let b_before = chain.baker(BAKER_B);
    let alice_before = chain.account(ALICE);
    assert_eq!(b_before.own_unstaked, 1_000);

    chain.apply(Plan {
        operations: operations(&[
            BalanceUpdate::pair(
                BalanceUpdate::deposits(own(BAKER_B), 0),
                BalanceUpdate::contract(ALICE, 0),
                300,
            ),
            BalanceUpdate::pair(
                BalanceUpdate::unstaked_deposits(own(BAKER_B), cycle, 0),
                BalanceUpdate::contract(ALICE, 0),
                100,
            ),
            BalanceUpdate::pair(
                BalanceUpdate::deposits(own(BAKER_B), 0),
                BalanceUpdate::burned(BalanceCategory::Punishments, 0),
                200,
            ),
            BalanceUpdate::pair(
                BalanceUpdate::deposits(pool(BAKER_A), 0),
                BalanceUpdate::burned(BalanceCategory::Punishments, 0),
                50,
            ),
        ]),
        ..Plan::default()
    });

    let slashed = chain.baker(BAKER_B);
    assert_eq!(slashed.own_staked, b_before.own_staked - 500);
    assert_eq!(slashed.own_unstaked, 900);

    let shared = chain.baker(BAKER_A);
    assert_eq!(shared.external_staked, a_before.external_staked - 50);
    assert_eq!(shared.issued_pseudotokens, a_before.issued_pseudotokens);
    assert_eq!(chain.account(CAROL).staked_pseudotokens, Pseudotokens::from(2_000));

    // ALICE denounced B, and delegates to A.
    assert_eq!(chain.account(ALICE).balance, alice_before.balance + 400);
    assert_eq!(shared.delegated_balance, a_before.delegated_balance + 400);

    let penalties = chain.baker_cycle(cycle, BAKER_B);
    assert_eq!((penalties.slashed_staked, penalties.slashed_unstaked), (500, 100));
    assert_eq!(chain.baker_cycle(cycle, BAKER_A).slashed_staked, 50);

    let request = chain
        .store()
        .unstake_request(&(BAKER_B, cycle, Some(BAKER_B)))
        .unwrap()
        .unwrap();
    assert_eq!((request.slashed, request.remaining()), (100, 900));

    chain.revert();
    assert_eq!(chain.baker(BAKER_B), b_before);
    assert_eq!(chain.account(ALICE), alice_before);
    assert_eq!(chain.store(), &before);
}

#[test]
fn restaked_funds_rejoin_the_pool() {
    let mut chain = Chain::new();
    chain.run_until(2);
    let cycle = cycle_of(2);

    chain.apply(Plan {
        operations: operations(&[BalanceUpdate::pair(
            BalanceUpdate::contract(CAROL, 0),
            BalanceUpdate::deposits(carol(), 0),
            2_000,
        )]),
        ..Plan::default()
    });
    chain.apply(Plan {
        operations: operations(&[BalanceUpdate::pair(
            BalanceUpdate::deposits(carol(), 0),
            BalanceUpdate::unstaked_deposits(carol(), cycle, 0),
            500,
        )]),
        ..Plan::default()
    });

    let before = chain.store().clone();
    let restake = |amount| Plan {
        operations: operations(&[BalanceUpdate::pair(
            BalanceUpdate::unstaked_deposits(carol(), cycle, 0),
            BalanceUpdate::deposits(carol(), 0),
            amount,
        )]),
        ..Plan::default()
    };

    let overdrawn = chain.block(restake(501));
    assert!(matches!(
        chain.ledger().apply(&overdrawn),
        Err(LedgerError::Staking(StakingError::ExceedsRequest { remaining: 500, .. }))
    ));
    assert_eq!(chain.store(), &before);

    let block = chain.apply(restake(200));

    let baker = chain.baker(BAKER_A);
    assert_eq!((baker.external_staked, baker.external_unstaked), (1_700, 300));
    assert_eq!(baker.issued_pseudotokens, Pseudotokens::from(1_700));

    let staker = chain.account(CAROL);
    assert_eq!(staker.staked_pseudotokens, Pseudotokens::from(1_700));
    assert_eq!(staker.unstaked_balance, 300);
    assert_eq!(staker.balance, DELEGATOR_BALANCE - 2_000);

    let request = chain
        .store()
        .unstake_request(&(BAKER_A, cycle, Some(CAROL)))
        .unwrap()
        .unwrap();
    assert_eq!((request.requested, request.restaked), (500, 200));
    assert_eq!((request.remaining(), request.updates_count), (300, 2));
    assert_eq!(request.last_level, block.level);

    chain.revert();
    let request = chain
        .store()
        .unstake_request(&(BAKER_A, cycle, Some(CAROL)))
        .unwrap()
        .unwrap();
    assert_eq!((request.restaked, request.updates_count), (0, 1));
    assert_eq!(request.last_level, Level::new(3));
    assert_eq!(chain.store(), &before);
}

// Revelations
// ----------------------------------------------------------------------------

#[test]
fn revelations_are_rewarded_and_seed_future_cycles() {
    let mut chain = Chain::new();
    chain.run_until(2);
    let before = chain.store().clone();

    let revealer = chain.baking_rights(2)[0].baker;
    let nonce = Hash::new([7; 32]);
    let vdf = VdfSolution(vec![0xab; 100]);

    chain.apply(Plan {
        operations: operations(&[
            BalanceUpdate::pair(
                BalanceUpdate::minted(BalanceCategory::NonceRevelationRewards, 0),
                BalanceUpdate::contract(revealer, 0),
                NONCE_TIP,
            ),
            BalanceUpdate::pair(
                BalanceUpdate::minted(BalanceCategory::VdfRevelationRewards, 0),
                BalanceUpdate::contract(revealer, 0),
                VDF_TIP,
            ),
        ]),
        nonce_revelations: vec![nonce],
        vdf_revelation: Some(vdf.clone()),
        ..Plan::default()
    });

    let row = chain.baker_cycle(Cycle::new(0), revealer);
    assert_eq!(row.revelation_rewards.delegated, NONCE_TIP + VDF_TIP);
    assert_eq!(row.revelation_rewards.total(), NONCE_TIP + VDF_TIP);

    let store = chain.store();
    assert_eq!(
        store.seed_input(&(Level::new(2), 0)).unwrap(),
        Some(seed_inputs::Row::Nonce(nonce))
    );
    assert_eq!(
        store.seed_input(&(Level::new(2), 1)).unwrap(),
        Some(seed_inputs::Row::Vdf(vdf))
    );

    // What cycle 0 reveals seeds cycle 2, drawn as cycle 1 starts.
    let mut quiet = Chain::new();
    chain.run_until(BLOCKS_PER_CYCLE + 2);
    quiet.run_until(BLOCKS_PER_CYCLE + 2);

    let seed = |chain: &Chain, cycle| chain.store().cycle(&Cycle::new(cycle)).unwrap().unwrap().seed;
    assert_eq!(seed(&chain, 1), seed(&quiet, 1));
    assert_ne!(seed(&chain, 2), seed(&quiet, 2));

    while chain.next_level() > 2 {
        chain.revert();
    }
    assert_eq!(chain.store().seed_input(&(Level::new(2), 0)).unwrap(), None);
    assert_eq!(chain.store(), &before);
}

// Delegations
// ----------------------------------------------------------------------------

#[test]
fn delegations_move_between_bakers() {
    let mut chain = Chain::new();
    chain.run_until(2);
    let dave = AccountId::new(30);

    let before = chain.store().clone();
    let a_before = chain.baker(BAKER_A);
    let b_before = chain.baker(BAKER_B);

    chain.apply(Plan {
        delegations: vec![
            Delegation {
                account: ALICE,
                delegate: Some(BAKER_B),
            },
            Delegation {
                account: BOB,
                delegate: None,
            },
            Delegation {
                account: dave,
                delegate: Some(dave),
            },
        ],
        ..Plan::default()
    });

    let a = chain.baker(BAKER_A);
    assert_eq!(a.delegated_balance, a_before.delegated_balance - DELEGATOR_BALANCE);
    assert_eq!(a.delegators_count, a_before.delegators_count - 1);

    // ALICE joins as BOB leaves.
    let b = chain.baker(BAKER_B);
    assert_eq!(b.delegated_balance, b_before.delegated_balance);
    assert_eq!(b.delegators_count, b_before.delegators_count);

    assert_eq!(chain.account(ALICE).delegate, Some(BAKER_B));
    assert_eq!(chain.account(BOB).delegate, None);

    let registered = chain.baker(dave);
    assert!(registered.active);
    assert_eq!(registered.registration_level, Level::new(2));

    chain.revert();
    assert_eq!(chain.account(ALICE).delegate, Some(BAKER_A));
    assert_eq!(chain.account(BOB).delegate, Some(BAKER_B));
    assert_eq!(chain.baker(BAKER_A), a_before);
    assert_eq!(chain.store().baker(&dave).unwrap(), None);
    assert_eq!(chain.store(), &before);
}

#[test]
fn deactivated_bakers_leave_future_cycles() {
    let mut chain = Chain::new();
    chain.run_until(BLOCKS_PER_CYCLE);
    let before = chain.store().clone();

    chain.apply(Plan {
        deactivated: vec![BAKER_B],
        ..Plan::default()
    });
    let deactivated = chain.store().clone();

    let baker = chain.baker(BAKER_B);
    assert!(!baker.active);
    assert_eq!(baker.deactivation_level, Some(Level::new(BLOCKS_PER_CYCLE)));

    // Cycle 2 is drawn as cycle 1 starts, without B.
    chain.apply(Plan::default());
    let cycle = Cycle::new(2);
    let store = chain.store();
    assert_eq!(store.cycle(&cycle).unwrap().unwrap().selected_bakers, 1);

    let bakers: BTreeSet<AccountId> = store
        .rights_in(cycle)
        .unwrap()
        .filter(|right| right.kind == RightKind::Baking)
        .map(|right| right.baker)
        .collect();
    assert_eq!(bakers, BTreeSet::from([BAKER_A]));

    let leftover = store.baker_cycle(&(cycle, BAKER_B)).unwrap();
    assert!(leftover.map_or(true, |row| row.baking_power == 0 && row.future_blocks == 0));

    chain.revert();
    assert_eq!(chain.store(), &deactivated);

    chain.revert();
    let baker = chain.baker(BAKER_B);
    assert!(baker.active);
    assert_eq!(baker.deactivation_level, None);
    assert_eq!(chain.store(), &before);
}
