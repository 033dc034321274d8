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

pub mod columns;
pub mod in_memory;

use bakehouse_kernel::{AccountId, Cycle, Level, RightsTable};
use columns::*;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[error("inconsistent store: {0}")]
    Inconsistent(String),
}

// ReadStore
// ----------------------------------------------------------------------------

/// Read access to the indexed state. Point lookups return `Ok(None)` for rows that do not exist
/// (yet); errors are reserved for the storage layer itself.
pub trait ReadStore {
    /// The latest block saved, if any.
    fn tip(&self) -> Result<Option<blocks::Row>, StoreError>;

    fn block(&self, level: &blocks::Key) -> Result<Option<blocks::Row>, StoreError>;

    fn baker(&self, id: &bakers::Key) -> Result<Option<bakers::Row>, StoreError>;

    fn account(&self, id: &accounts::Key) -> Result<Option<accounts::Row>, StoreError>;

    fn cycle(&self, cycle: &cycles::Key) -> Result<Option<cycles::Row>, StoreError>;

    fn baker_cycle(
        &self,
        key: &baker_cycles::Key,
    ) -> Result<Option<baker_cycles::Row>, StoreError>;

    fn right(&self, key: &rights::Key) -> Result<Option<rights::Row>, StoreError>;

    fn unstake_request(
        &self,
        key: &unstake_requests::Key,
    ) -> Result<Option<unstake_requests::Row>, StoreError>;

    fn staking_update(
        &self,
        id: &staking_updates::Key,
    ) -> Result<Option<staking_updates::Row>, StoreError>;

    fn seed_input(&self, key: &seed_inputs::Key) -> Result<Option<seed_inputs::Row>, StoreError>;

    fn delegation_change(
        &self,
        key: &delegations::Key,
    ) -> Result<Option<delegations::Row>, StoreError>;

    /// Every baker, active or not, by id.
    fn iter_bakers(&self) -> Result<impl Iterator<Item = bakers::Row>, StoreError>;

    /// The most recent cycle created.
    fn last_cycle(&self) -> Result<Option<cycles::Row>, StoreError>;

    fn cycles_created_at(
        &self,
        level: Level,
    ) -> Result<impl Iterator<Item = cycles::Row>, StoreError>;

    /// Baker cycle rows of `cycle`, by baker.
    fn baker_cycles(
        &self,
        cycle: Cycle,
    ) -> Result<impl Iterator<Item = baker_cycles::Row>, StoreError>;

    /// Rights at `level`, baking rights first, each kind by baker.
    fn rights_at(&self, level: Level) -> Result<impl Iterator<Item = rights::Row>, StoreError>;

    /// Rights whose level sits within `first..=last`.
    fn rights_between(
        &self,
        first: Level,
        last: Level,
    ) -> Result<impl Iterator<Item = rights::Row>, StoreError>;

    /// Rights that count towards `cycle`, including the attestations shifted into it.
    fn rights_in(&self, cycle: Cycle) -> Result<impl Iterator<Item = rights::Row>, StoreError>;

    /// Unstake requests of `baker` for `cycle`, by staker.
    fn unstake_requests(
        &self,
        baker: AccountId,
        cycle: Cycle,
    ) -> Result<impl Iterator<Item = (unstake_requests::Key, unstake_requests::Row)>, StoreError>;

    /// Staking updates of `level`, by ascending id.
    fn staking_updates_at(
        &self,
        level: Level,
    ) -> Result<impl Iterator<Item = staking_updates::Row>, StoreError>;

    /// The most recent update strictly before `before` touching the request `key`.
    fn previous_staking_update(
        &self,
        key: &unstake_requests::Key,
        before: staking_updates::Key,
    ) -> Result<Option<staking_updates::Row>, StoreError>;

    fn last_staking_update_id(&self) -> Result<Option<staking_updates::Key>, StoreError>;

    /// Seed inputs of levels `first..=last`, in block order.
    fn seed_inputs(
        &self,
        first: Level,
        last: Level,
    ) -> Result<impl Iterator<Item = (seed_inputs::Key, seed_inputs::Row)>, StoreError>;

    fn delegation_changes_at(
        &self,
        level: Level,
    ) -> Result<impl Iterator<Item = (delegations::Key, delegations::Row)>, StoreError>;

    /// Accounts holding pseudotokens of `baker`'s external staking pool.
    fn stakers_of(
        &self,
        baker: AccountId,
    ) -> Result<impl Iterator<Item = (accounts::Key, accounts::Row)>, StoreError>;
}

// Store
// ----------------------------------------------------------------------------

pub trait Store: ReadStore {
    /// Persist every change of one block at once. Either all of them land, or none.
    fn save(&self, changes: Changes) -> Result<(), StoreError>;
}

// Changes
// ----------------------------------------------------------------------------

/// Changes to one column: `Some` rows are inserted or replaced, `None` rows are removed.
pub type Column<K, V> = BTreeMap<K, Option<V>>;

/// Every change a block brings, over all columns, committed as a single unit.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Changes {
    /// The level of the latest applied block once the changes are saved.
    pub tip: Level,

    pub blocks: Column<blocks::Key, blocks::Row>,
    pub bakers: Column<bakers::Key, bakers::Row>,
    pub accounts: Column<accounts::Key, accounts::Row>,
    pub cycles: Column<cycles::Key, cycles::Row>,
    pub baker_cycles: Column<baker_cycles::Key, baker_cycles::Row>,
    pub rights: Column<rights::Key, rights::Row>,
    pub unstake_requests: Column<unstake_requests::Key, unstake_requests::Row>,
    pub staking_updates: Column<staking_updates::Key, staking_updates::Row>,
    pub seed_inputs: Column<seed_inputs::Key, seed_inputs::Row>,
    pub delegations: Column<delegations::Key, delegations::Row>,

    /// Freshly drawn rights, in bulk. Loaded before the row-level changes to `rights`.
    pub rights_tables: Vec<RightsTable>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.bakers.is_empty()
            && self.accounts.is_empty()
            && self.cycles.is_empty()
            && self.baker_cycles.is_empty()
            && self.rights.is_empty()
            && self.unstake_requests.is_empty()
            && self.staking_updates.is_empty()
            && self.seed_inputs.is_empty()
            && self.delegations.is_empty()
            && self.rights_tables.iter().all(RightsTable::is_empty)
    }
}
