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

use crate::{Cycle, Mutez};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential number of a protocol upgrade. Blocks carry the version they were produced under.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProtocolVersion(pub u16);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Constants of a protocol that shape rights and stake snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConstants {
    pub blocks_per_cycle: u32,

    /// Number of cycles between a snapshot and the cycle whose rights it drives.
    pub consensus_rights_delay: u32,

    /// Number of attestation slots drawn per level.
    pub consensus_committee_size: u32,

    /// Attestation power a block must gather before a bonus is paid.
    pub consensus_threshold: u32,

    /// Highest baking round materialized in the rights table.
    pub max_round: u32,

    /// Minimal baking power to be selected at all.
    pub minimal_stake: Mutez,

    /// Minimal own stake a baker must have frozen to be selected.
    pub minimal_frozen_stake: Mutez,

    /// Delegated tez weigh `1 / delegation_over_baking_divisor` of staked tez.
    pub delegation_over_baking_divisor: i64,

    /// External stake beyond `own_staked * limit_of_staking_over_baking` counts as delegated.
    pub limit_of_staking_over_baking: i64,
}

impl ProtocolConstants {
    pub fn rights_parameters(&self, round_selection: RoundSelection) -> RightsParameters {
        RightsParameters {
            attestation_slots: self.consensus_committee_size,
            max_round: self.max_round,
            round_selection,
        }
    }

    /// The largest bonus a block producer can earn, reached at full attestation power.
    pub fn max_block_bonus(&self, rewards: &RewardConstants) -> Mutez {
        rewards.block_bonus(self.consensus_committee_size, self.consensus_threshold)
    }
}

/// Reward amounts fixed for the whole of a cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardConstants {
    pub block_reward: Mutez,
    pub block_bonus_per_slot: Mutez,
    pub attestation_reward_per_slot: Mutez,
    pub nonce_revelation_tip: Mutez,
    pub vdf_revelation_tip: Mutez,
}

impl RewardConstants {
    pub fn block_bonus(&self, attestation_power: u32, threshold: u32) -> Mutez {
        Mutez::from(attestation_power.saturating_sub(threshold)) * self.block_bonus_per_slot
    }
}

/// Reward constants announced by the node for an upcoming cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedIssuance {
    pub cycle: Cycle,
    #[serde(flatten)]
    pub rewards: RewardConstants,
}

/// How the owner of a baking round is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundSelection {
    /// One independent draw per round.
    Independent,
    /// Round `r` belongs to the owner of attestation slot `r mod committee_size`.
    SlotOwner,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RightsParameters {
    pub attestation_slots: u32,
    pub max_round: u32,
    pub round_selection: RoundSelection,
}
