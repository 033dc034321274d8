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

//! The settlement row of a baker over one cycle.
//!
//! Counters come in three families. _Future_ counters are seeded from the rights drawn when the
//! cycle got created; every right then leaves them exactly once, either to the _realized_
//! counters or to the _missed_ ones. At any point in time, for each kind of duty:
//!
//! ```text
//! future + realized + missed == assigned
//! ```

use bakehouse_kernel::{AccountId, Cycle, Level, Mutez};
use serde::{Deserialize, Serialize};

pub type Key = (Cycle, AccountId);

/// Who a reward ends up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    /// Paid on the liquid balance of the baker, covering delegated tez.
    Delegated,
    /// Frozen as the baker's own stake.
    StakedOwn,
    /// The baker's cut on the rewards of its stakers, frozen as own stake.
    StakedEdge,
    /// Frozen in the external staking pool.
    StakedShared,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSplit {
    pub delegated: Mutez,
    pub staked_own: Mutez,
    pub staked_edge: Mutez,
    pub staked_shared: Mutez,
}

impl RewardSplit {
    pub fn total(&self) -> Mutez {
        self.delegated + self.staked_own + self.staked_edge + self.staked_shared
    }

    pub fn add(&mut self, bucket: Bucket, amount: Mutez) {
        match bucket {
            Bucket::Delegated => self.delegated += amount,
            Bucket::StakedOwn => self.staked_own += amount,
            Bucket::StakedEdge => self.staked_edge += amount,
            Bucket::StakedShared => self.staked_shared += amount,
        }
    }

    pub fn merge(&mut self, other: &RewardSplit, sign: Mutez) {
        self.delegated += sign * other.delegated;
        self.staked_own += sign * other.staked_own;
        self.staked_edge += sign * other.staked_edge;
        self.staked_shared += sign * other.staked_shared;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub cycle: Cycle,
    pub baker: AccountId,

    // Snapshot
    pub baking_power: u64,
    pub own_staked: Mutez,
    pub external_staked: Mutez,
    pub own_delegated: Mutez,
    pub external_delegated: Mutez,
    pub stakers_count: u32,
    pub delegators_count: u32,

    // Future
    pub future_blocks: u32,
    pub future_block_rewards: Mutez,
    pub future_attestations: u32,
    pub future_attestation_rewards: Mutez,

    // Realized
    pub blocks: u32,
    pub attestations: u32,
    pub block_rewards: RewardSplit,
    pub attestation_rewards: RewardSplit,
    pub revelation_rewards: RewardSplit,
    pub block_fees: Mutez,

    // Missed
    pub missed_blocks: u32,
    pub missed_block_rewards: Mutez,
    pub missed_attestations: u32,
    pub missed_attestation_rewards: Mutez,

    // Penalties
    pub slashed_staked: Mutez,
    pub slashed_unstaked: Mutez,

    /// Level of the block that created the row. Usually the one that created the cycle, unless the
    /// baker only showed up in the cycle through a penalty.
    pub created_at: Level,
}

impl Row {
    pub fn new(cycle: Cycle, baker: AccountId, created_at: Level) -> Self {
        Self {
            cycle,
            baker,
            baking_power: 0,
            own_staked: 0,
            external_staked: 0,
            own_delegated: 0,
            external_delegated: 0,
            stakers_count: 0,
            delegators_count: 0,
            future_blocks: 0,
            future_block_rewards: 0,
            future_attestations: 0,
            future_attestation_rewards: 0,
            blocks: 0,
            attestations: 0,
            block_rewards: RewardSplit::default(),
            attestation_rewards: RewardSplit::default(),
            revelation_rewards: RewardSplit::default(),
            block_fees: 0,
            missed_blocks: 0,
            missed_block_rewards: 0,
            missed_attestations: 0,
            missed_attestation_rewards: 0,
            slashed_staked: 0,
            slashed_unstaked: 0,
            created_at,
        }
    }

    pub fn key(&self) -> Key {
        (self.cycle, self.baker)
    }

    /// Blocks assigned to the baker, minus the rounds that were never reached.
    pub fn assigned_blocks(&self) -> u32 {
        self.future_blocks + self.blocks + self.missed_blocks
    }

    pub fn assigned_attestations(&self) -> u32 {
        self.future_attestations + self.attestations + self.missed_attestations
    }

    pub fn is_settled(&self) -> bool {
        self.future_blocks == 0
            && self.future_block_rewards == 0
            && self.future_attestations == 0
            && self.future_attestation_rewards == 0
    }
}
