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

//! A sandbox chain run by a single baker, producing every block at round 0 with full attestation
//! power and paying every reward exactly as due.

#![allow(dead_code)]

pub mod network;

use bakehouse_kernel::{
    AccountId, Attestation, BalanceCategory, BalanceUpdate, Block, BlockHash, Cycle, CycleEras,
    Hash, Level, Mutez, ProtocolConstants, ProtocolVersion, RewardConstants, StakerRef,
};
use bakehouse_ledger::{Genesis, GenesisAccount, GenesisBaker, Ledger, MemoryStore, RuleRegistry};

pub const BAKER: AccountId = AccountId::new(1);
pub const ALICE: AccountId = AccountId::new(10);
pub const BOB: AccountId = AccountId::new(11);

pub const BLOCKS_PER_CYCLE: u32 = 4;
pub const COMMITTEE: u32 = 4;
pub const THRESHOLD: u32 = 3;

pub const BAKER_BALANCE: Mutez = 10_000_000;
pub const BAKER_STAKE: Mutez = 1_000_000;
pub const DELEGATOR_BALANCE: Mutez = 5_000;

pub fn constants() -> ProtocolConstants {
    ProtocolConstants {
        blocks_per_cycle: BLOCKS_PER_CYCLE,
        consensus_rights_delay: 1,
        consensus_committee_size: COMMITTEE,
        consensus_threshold: THRESHOLD,
        max_round: 2,
        minimal_stake: 1,
        minimal_frozen_stake: 1,
        delegation_over_baking_divisor: 1,
        limit_of_staking_over_baking: 5,
    }
}

pub fn rewards() -> RewardConstants {
    RewardConstants {
        block_reward: 100,
        block_bonus_per_slot: 10,
        attestation_reward_per_slot: 5,
        nonce_revelation_tip: 0,
        vdf_revelation_tip: 0,
    }
}

pub fn hash(level: u32) -> BlockHash {
    let mut bytes = [0; 32];
    bytes[..4].copy_from_slice(&level.to_be_bytes());
    Hash::new(bytes)
}

pub fn genesis() -> Genesis {
    Genesis {
        hash: hash(0),
        protocol: ProtocolVersion(0),
        timestamp: 0,
        bakers: vec![GenesisBaker {
            id: BAKER,
            balance: BAKER_BALANCE,
            staked: BAKER_STAKE,
        }],
        accounts: vec![
            GenesisAccount {
                id: ALICE,
                balance: DELEGATOR_BALANCE,
                delegate: Some(BAKER),
            },
            GenesisAccount {
                id: BOB,
                balance: DELEGATOR_BALANCE,
                delegate: Some(BAKER),
            },
        ],
        issuance: Vec::new(),
    }
}

/// A bootstrapped ledger, at level 0.
pub fn ledger() -> Ledger<MemoryStore> {
    let eras = CycleEras::single(BLOCKS_PER_CYCLE).unwrap();
    let registry = RuleRegistry::sandbox(constants(), rewards());
    let mut ledger = Ledger::new(MemoryStore::new(), registry, eras);
    ledger.bootstrap(&genesis()).unwrap();
    ledger
}

pub fn cycle_of(level: u32) -> Cycle {
    Cycle::new((level - 1) / BLOCKS_PER_CYCLE)
}

/// Attestation slots the baker owes over `cycle`. The first level of the chain has nothing to
/// attest.
pub fn attestation_slots(cycle: Cycle) -> u32 {
    if cycle == Cycle::new(0) {
        (BLOCKS_PER_CYCLE - 1) * COMMITTEE
    } else {
        BLOCKS_PER_CYCLE * COMMITTEE
    }
}

pub fn attestation_power(level: u32) -> u32 {
    if level > 1 {
        COMMITTEE
    } else {
        0
    }
}

/// What the baker earns from the block at `level`.
pub fn earnings(level: u32) -> Mutez {
    let mut earned = rewards().block_reward
        + rewards().block_bonus(attestation_power(level), THRESHOLD);
    if level % BLOCKS_PER_CYCLE == 0 {
        earned += Mutez::from(attestation_slots(cycle_of(level))) * rewards().attestation_reward_per_slot;
    }
    earned
}

/// The block at `level`, carrying `operations` ahead of the block's own rewards.
pub fn block(level: u32, operations: Vec<BalanceUpdate>) -> Block {
    let power = attestation_power(level);

    let mut balance_updates = operations;
    balance_updates.extend(BalanceUpdate::pair(
        BalanceUpdate::minted(BalanceCategory::BakingRewards, 0),
        BalanceUpdate::contract(BAKER, 0),
        rewards().block_reward,
    ));

    let bonus = rewards().block_bonus(power, THRESHOLD);
    if bonus > 0 {
        balance_updates.extend(BalanceUpdate::pair(
            BalanceUpdate::minted(BalanceCategory::BakingBonuses, 0),
            BalanceUpdate::contract(BAKER, 0),
            bonus,
        ));
    }

    if level % BLOCKS_PER_CYCLE == 0 {
        let slots = attestation_slots(cycle_of(level));
        balance_updates.extend(BalanceUpdate::pair(
            BalanceUpdate::minted(BalanceCategory::AttestingRewards, 0),
            BalanceUpdate::contract(BAKER, 0),
            Mutez::from(slots) * rewards().attestation_reward_per_slot,
        ));
    }

    Block {
        level: Level::new(level),
        hash: hash(level),
        predecessor: hash(level - 1),
        timestamp: i64::from(level) * 8,
        protocol: ProtocolVersion(0),
        payload_round: 0,
        block_round: 0,
        proposer: BAKER,
        producer: BAKER,
        attestations: if power > 0 {
            vec![Attestation {
                baker: BAKER,
                power,
            }]
        } else {
            Vec::new()
        },
        balance_updates,
        nonce_revelations: Vec::new(),
        vdf_revelation: None,
        delegations: Vec::new(),
        deactivated: Vec::new(),
        issuance: Vec::new(),
    }
}

fn single(staker: AccountId) -> StakerRef {
    StakerRef::Single {
        contract: staker,
        delegate: BAKER,
    }
}

pub fn stake(staker: AccountId, amount: Mutez) -> [BalanceUpdate; 2] {
    BalanceUpdate::pair(
        BalanceUpdate::contract(staker, 0),
        BalanceUpdate::deposits(single(staker), 0),
        amount,
    )
}

pub fn unstake(staker: AccountId, cycle: Cycle, amount: Mutez) -> [BalanceUpdate; 2] {
    BalanceUpdate::pair(
        BalanceUpdate::deposits(single(staker), 0),
        BalanceUpdate::unstaked_deposits(single(staker), cycle, 0),
        amount,
    )
}

pub fn finalize(staker: AccountId, cycle: Cycle, amount: Mutez) -> [BalanceUpdate; 2] {
    BalanceUpdate::pair(
        BalanceUpdate::unstaked_deposits(single(staker), cycle, 0),
        BalanceUpdate::contract(staker, 0),
        amount,
    )
}
