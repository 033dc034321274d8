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

//! Shared vocabulary of the bakehouse crates: identifiers, amounts, hashes, and the decoded block
//! records handed over by the node client.

pub use level_arithmetic::{Cycle, CycleBounds, CycleEra, CycleEras, Level, LevelArithmeticError};
pub use num::BigInt;

pub mod account;
pub use account::{AccountId, Mutez, Pseudotokens};

pub mod balance_update;
pub use balance_update::{BalanceCategory, BalanceKind, BalanceUpdate, Origin, StakerRef};

pub mod block;
pub use block::{Attestation, Block, Delegation, VdfSolution};

pub mod hash;
pub use hash::{BlockHash, Hash, Hasher, Nonce, Seed, NULL_HASH32};

pub mod protocol;
pub use protocol::{
    ExpectedIssuance, ProtocolConstants, ProtocolVersion, RewardConstants, RightsParameters,
    RoundSelection,
};

pub mod rights;
pub use rights::{Right, RightKind, RightStatus, RightsTable};

pub mod serde_utils;
