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

//! Randomness revealed on-chain, kept so that the seed of any cycle can be derived again from
//! persisted data alone.

use bakehouse_kernel::{Level, Nonce, VdfSolution};
use serde::{Deserialize, Serialize};

/// (level, position within the block). VDF solutions come after nonces.
pub type Key = (Level, u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Row {
    Nonce(Nonce),
    Vdf(VdfSolution),
}
