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

//! Append-only log of staking operations. Reverting a block replays its entries backwards, by
//! descending id, and never recomputes pseudotoken prices.

use crate::store::columns::unstake_requests;
use bakehouse_kernel::{
    serde_utils::option_pseudotokens, AccountId, Cycle, Level, Mutez, Pseudotokens,
};
use serde::{Deserialize, Serialize};

pub type Key = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Stake,
    Unstake,
    Restake,
    Finalize,
    SlashStaked,
    SlashUnstaked,
}

impl Kind {
    /// Whether operations of this kind belong to a pending-unstake bucket.
    pub fn touches_request(&self) -> bool {
        match self {
            Kind::Stake | Kind::SlashStaked => false,
            Kind::Unstake | Kind::Restake | Kind::Finalize | Kind::SlashUnstaked => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: u64,
    pub level: Level,

    /// The cycle of the unstake request for operations touching one; the current cycle otherwise.
    pub cycle: Cycle,

    pub baker: AccountId,

    /// `Some(baker)` for the baker's own stake, `None` for the external pool as a whole.
    pub staker: Option<AccountId>,

    pub kind: Kind,
    pub amount: Mutez,

    /// Pseudotokens minted (positive) or burned (negative).
    #[serde(default, with = "option_pseudotokens")]
    pub pseudotokens: Option<Pseudotokens>,

    #[serde(default)]
    pub rounding_error: Option<Mutez>,
}

impl Row {
    pub fn request_key(&self) -> Option<unstake_requests::Key> {
        self.kind
            .touches_request()
            .then_some((self.baker, self.cycle, self.staker))
    }

    pub fn is_own(&self) -> bool {
        self.staker == Some(self.baker)
    }
}
