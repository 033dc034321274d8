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
use num::Zero;
use serde::{Deserialize, Serialize};

pub type Key = AccountId;

/// A plain account, delegator or staker. Bakers live in their own column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub balance: Mutez,
    pub delegate: Option<AccountId>,

    /// Claim on the external staking pool of `delegate`.
    #[serde(with = "pseudotokens")]
    pub staked_pseudotokens: Pseudotokens,

    /// Sum of the account's pending unstake requests.
    pub unstaked_balance: Mutez,

    /// Level at which the account was first seen. Reverting that level deletes the row.
    pub first_level: Level,
}

impl Row {
    pub fn new(first_level: Level) -> Self {
        Self {
            balance: 0,
            delegate: None,
            staked_pseudotokens: Pseudotokens::zero(),
            unstaked_balance: 0,
            first_level,
        }
    }

    pub fn is_staker(&self) -> bool {
        self.staked_pseudotokens > Pseudotokens::zero()
    }
}
