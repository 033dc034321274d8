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

use bakehouse_kernel::{AccountId, Block, BlockHash, Cycle, Level, ProtocolVersion};
use serde::{Deserialize, Serialize};

pub type Key = Level;

/// A block applied to the ledger; the chain of rows is what `revert` checks against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub level: Level,
    pub hash: BlockHash,
    pub predecessor: BlockHash,
    pub protocol: ProtocolVersion,
    pub cycle: Cycle,
    pub producer: Option<AccountId>,
    pub timestamp: i64,
}

impl Row {
    pub fn new(block: &Block, cycle: Cycle) -> Self {
        Self {
            level: block.level,
            hash: block.hash,
            predecessor: block.predecessor,
            protocol: block.protocol,
            cycle,
            producer: Some(block.producer),
            timestamp: block.timestamp,
        }
    }
}
