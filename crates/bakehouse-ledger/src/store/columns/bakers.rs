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

use bakehouse_kernel::{serde_utils::pseudotokens, AccountId, Level, Mutez, Pseudotokens};
use serde::{Deserialize, Serialize};

pub type Key = AccountId;

/// A registered baker. Rows are never deleted, only deactivated; except when reverting the
/// block that registered them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: AccountId,

    /// Liquid balance.
    pub balance: Mutez,

    pub own_staked: Mutez,
    pub own_unstaked: Mutez,

    /// Stake of external stakers, as one pool shared according to their pseudotokens.
    pub external_staked: Mutez,

    /// Sum of the pending unstake requests of external stakers.
    pub external_unstaked: Mutez,

    /// Sum of the liquid balances of delegators.
    pub delegated_balance: Mutez,

    #[serde(with = "pseudotokens")]
    pub issued_pseudotokens: Pseudotokens,

    pub stakers_count: u32,
    pub delegators_count: u32,

    pub active: bool,
    pub deactivation_level: Option<Level>,
    pub registration_level: Level,
}

impl Row {
    pub fn new(id: AccountId, registration_level: Level) -> Self {
        Self {
            id,
            balance: 0,
            own_staked: 0,
            own_unstaked: 0,
            external_staked: 0,
            external_unstaked: 0,
            delegated_balance: 0,
            issued_pseudotokens: Pseudotokens::default(),
            stakers_count: 0,
            delegators_count: 0,
            active: true,
            deactivation_level: None,
            registration_level,
        }
    }

    /// Everything the baker owns or is delegated, frozen or not.
    pub fn staking_balance(&self) -> Mutez {
        self.balance
            + self.own_staked
            + self.own_unstaked
            + self.external_staked
            + self.external_unstaked
            + self.delegated_balance
    }

    pub fn total_staked(&self) -> Mutez {
        self.own_staked + self.external_staked
    }
}
