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

use bakehouse_kernel::{AccountId, Cycle, Level, Mutez};
use serde::{Deserialize, Serialize};

/// (baker, cycle of the request, staker). The staker is `None` for amounts that could not be
/// attributed to any single staker, i.e. slashing remainders.
pub type Key = (AccountId, Cycle, Option<AccountId>);

/// Aggregate of every staking update touching one pending-unstake bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub requested: Mutez,
    pub restaked: Mutez,
    pub finalized: Mutez,
    pub slashed: Mutez,
    pub rounding_error: Mutez,
    pub updates_count: u32,
    pub first_level: Level,
    pub last_level: Level,
}

impl Row {
    pub fn new(level: Level) -> Self {
        Self {
            requested: 0,
            restaked: 0,
            finalized: 0,
            slashed: 0,
            rounding_error: 0,
            updates_count: 0,
            first_level: level,
            last_level: level,
        }
    }

    /// What is still pending, i.e. neither restaked, finalized, slashed nor lost to rounding.
    pub fn remaining(&self) -> Mutez {
        self.requested - self.restaked - self.finalized - self.slashed - self.rounding_error
    }
}
