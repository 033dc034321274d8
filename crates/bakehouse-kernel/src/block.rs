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

use crate::{
    serde_utils::{bytes_to_hex, hex_to_bytes},
    AccountId, BalanceUpdate, BlockHash, Cycle, ExpectedIssuance, Level, Nonce, ProtocolVersion,
};
use serde::{Deserialize, Serialize};

/// A block as decoded by the node client, reduced to what the ledger needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub level: Level,
    pub hash: BlockHash,
    pub predecessor: BlockHash,
    #[serde(default)]
    pub timestamp: i64,
    pub protocol: ProtocolVersion,

    /// Round at which the block payload was first proposed.
    #[serde(default)]
    pub payload_round: u32,

    /// Round at which the block was finally produced.
    #[serde(default)]
    pub block_round: u32,

    pub proposer: AccountId,
    pub producer: AccountId,

    /// Attestations of the previous level included in this block.
    #[serde(default)]
    pub attestations: Vec<Attestation>,

    /// Every balance update of the block, in order, operations first and block-level updates
    /// last.
    #[serde(default)]
    pub balance_updates: Vec<BalanceUpdate>,

    #[serde(default)]
    pub nonce_revelations: Vec<Nonce>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdf_revelation: Option<VdfSolution>,

    #[serde(default)]
    pub delegations: Vec<Delegation>,

    /// Bakers deactivated by this block, only ever non-empty at the end of a cycle.
    #[serde(default)]
    pub deactivated: Vec<AccountId>,

    /// Reward constants announced for upcoming cycles.
    #[serde(default)]
    pub issuance: Vec<ExpectedIssuance>,
}

impl Block {
    /// Total attestation power gathered by the block.
    pub fn attestation_power(&self) -> u32 {
        self.attestations.iter().map(|a| a.power).sum()
    }

    pub fn attestation_power_of(&self, baker: AccountId) -> u32 {
        self.attestations
            .iter()
            .filter(|a| a.baker == baker)
            .map(|a| a.power)
            .sum()
    }

    pub fn issuance_for(&self, cycle: Cycle) -> Option<&ExpectedIssuance> {
        self.issuance.iter().find(|issuance| issuance.cycle == cycle)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub baker: AccountId,
    pub power: u32,
}

/// A change of delegate. Delegating to oneself registers (or reactivates) a baker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub account: AccountId,
    pub delegate: Option<AccountId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VdfSolution(
    #[serde(serialize_with = "bytes_to_hex", deserialize_with = "hex_to_bytes")] pub Vec<u8>,
);

impl AsRef<[u8]> for VdfSolution {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
