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

//! Changes of delegate and of baker status, with whatever they overwrote. This is what makes
//! those changes invertible.

use crate::store::columns::accounts;
use bakehouse_kernel::{AccountId, Level};
use serde::{Deserialize, Serialize};

/// (level, position within the block).
pub type Key = (Level, u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    Delegated { previous: Option<AccountId> },
    /// The account became a baker. `replaced` is the plain account row it superseded, if any.
    Registered { replaced: Option<accounts::Row> },
    Reactivated {
        was_active: bool,
        previous_deactivation: Option<Level>,
    },
    Deactivated {
        previous_deactivation: Option<Level>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub account: AccountId,
    pub change: Change,
}
