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

use crate::{AccountId, Cycle, Level};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightKind {
    Baking,
    Attestation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightStatus {
    Future,
    Realized,
    Missed,
    /// A baking round that was never reached because the level got baked earlier.
    Uncovered,
}

/// A duty assigned to a baker. Baking rights carry a round; attestation rights carry a number of
/// slots and sit at the level of the block that includes the attestations (attested level + 1).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Right {
    pub cycle: Cycle,
    pub level: Level,
    pub baker: AccountId,
    pub kind: RightKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<u32>,
    pub status: RightStatus,
}

impl Right {
    pub fn baking(cycle: Cycle, level: Level, baker: AccountId, round: u32) -> Self {
        Self {
            cycle,
            level,
            baker,
            kind: RightKind::Baking,
            round: Some(round),
            slots: None,
            status: RightStatus::Future,
        }
    }

    pub fn attestation(cycle: Cycle, level: Level, baker: AccountId, slots: u32) -> Self {
        Self {
            cycle,
            level,
            baker,
            kind: RightKind::Attestation,
            round: None,
            slots: Some(slots),
            status: RightStatus::Future,
        }
    }

    pub fn key(&self) -> (Level, RightKind, AccountId) {
        (self.level, self.kind, self.baker)
    }
}

/// Column-oriented batch of freshly generated rights, all in `Future` status. A cycle may hold
/// millions of rows, so they travel to the store as parallel arrays rather than as structs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RightsTable {
    pub cycles: Vec<Cycle>,
    pub levels: Vec<Level>,
    pub bakers: Vec<AccountId>,
    pub kinds: Vec<RightKind>,
    pub rounds: Vec<Option<u32>>,
    pub slots: Vec<Option<u32>>,
}

impl RightsTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cycles: Vec::with_capacity(capacity),
            levels: Vec::with_capacity(capacity),
            bakers: Vec::with_capacity(capacity),
            kinds: Vec::with_capacity(capacity),
            rounds: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, right: &Right) {
        self.cycles.push(right.cycle);
        self.levels.push(right.level);
        self.bakers.push(right.baker);
        self.kinds.push(right.kind);
        self.rounds.push(right.round);
        self.slots.push(right.slots);
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = Right> + '_ {
        (0..self.len()).map(|ix| Right {
            cycle: self.cycles[ix],
            level: self.levels[ix],
            baker: self.bakers[ix],
            kind: self.kinds[ix],
            round: self.rounds[ix],
            slots: self.slots[ix],
            status: RightStatus::Future,
        })
    }
}

impl<'a> FromIterator<&'a Right> for RightsTable {
    fn from_iter<T: IntoIterator<Item = &'a Right>>(iter: T) -> Self {
        let mut table = RightsTable::default();
        for right in iter {
            table.push(right);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_preserves_rows() {
        let rights = vec![
            Right::baking(Cycle::new(3), Level::new(10), AccountId::new(1), 0),
            Right::attestation(Cycle::new(3), Level::new(11), AccountId::new(2), 7),
        ];
        let table: RightsTable = rights.iter().collect();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows().collect::<Vec<_>>(), rights);
    }
}
