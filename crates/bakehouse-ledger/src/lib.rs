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

//! The derived state of a chain of bakers: rights per cycle, their realization block after
//! block, balances, delegations and staking pools. Blocks are applied and reverted atomically
//! through a [`Store`].

pub mod context;
pub use context::BlockContext;

pub mod evidence;
pub use evidence::{movements, Movement, RewardKind};

pub mod genesis;
pub use genesis::{Genesis, GenesisAccount, GenesisBaker};

pub mod protocols;
pub use protocols::{ProtocolError, ProtocolRules, RuleRegistry};

pub mod state;
pub use state::{InvariantError, Ledger, LedgerError, ValidationError};

pub mod store;
pub use store::{in_memory::MemoryStore, ReadStore, Store, StoreError};
