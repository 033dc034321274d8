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

use bakehouse_kernel::{
    Cycle, CycleBounds, Level, ProtocolVersion, RewardConstants, Seed,
};
use serde::{Deserialize, Serialize};

pub type Key = Cycle;

/// A cycle, as fixed when it got created `consensus_rights_delay` cycles ahead of time. Rows are
/// immutable; reverting the block that created them deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub cycle: Cycle,
    pub first_level: Level,
    pub last_level: Level,

    /// Last level whose state fed the baking power snapshot.
    pub snapshot_level: Level,

    pub seed: Seed,

    pub selected_bakers: u32,
    pub selected_power: u64,

    pub rewards: RewardConstants,

    pub protocol: ProtocolVersion,

    /// Level of the block that created the cycle.
    pub created_at: Level,
}

impl Row {
    pub fn bounds(&self) -> CycleBounds {
        CycleBounds {
            first: self.first_level,
            last: self.last_level,
        }
    }
}
