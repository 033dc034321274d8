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

//! A write-back cache over a [`ReadStore`], owned by the processing of a single block.
//!
//! Rows are fetched on first access and remembered along with their original value. Nothing is
//! written until [`BlockContext::commit`], which hands every row whose value changed to
//! [`Store::save`] at once. Dropping the context (see [`BlockContext::discard`]) leaves the store
//! untouched, which is what happens whenever a block fails to apply or revert.

use crate::store::{columns::*, Changes, Column, ReadStore, Store, StoreError};
use bakehouse_kernel::{AccountId, Cycle, Level, RightsTable};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    ops::RangeBounds,
};

// Cache
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Cached<V> {
    original: Option<V>,
    current: Option<V>,
}

/// Cached rows of one column. Keys absent from the store are cached too, as `None`.
#[derive(Debug, Clone)]
pub struct Cache<K, V> {
    entries: BTreeMap<K, Cached<V>>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> Cache<K, V> {
    fn load<E>(
        &mut self,
        key: &K,
        fetch: impl FnOnce(&K) -> Result<Option<V>, E>,
    ) -> Result<&mut Cached<V>, E> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let original = fetch(e.key())?;
                Ok(e.insert(Cached {
                    current: original.clone(),
                    original,
                }))
            }
        }
    }

    pub fn get<E>(
        &mut self,
        key: &K,
        fetch: impl FnOnce(&K) -> Result<Option<V>, E>,
    ) -> Result<Option<&V>, E> {
        Ok(self.load(key, fetch)?.current.as_ref())
    }

    pub fn get_mut<E>(
        &mut self,
        key: &K,
        fetch: impl FnOnce(&K) -> Result<Option<V>, E>,
    ) -> Result<Option<&mut V>, E> {
        Ok(self.load(key, fetch)?.current.as_mut())
    }

    pub fn put<E>(
        &mut self,
        key: K,
        value: V,
        fetch: impl FnOnce(&K) -> Result<Option<V>, E>,
    ) -> Result<(), E> {
        self.load(&key, fetch)?.current = Some(value);
        Ok(())
    }

    pub fn remove<E>(
        &mut self,
        key: &K,
        fetch: impl FnOnce(&K) -> Result<Option<V>, E>,
    ) -> Result<Option<V>, E> {
        Ok(self.load(key, fetch)?.current.take())
    }

    /// Register rows known to be in the store, leaving alone those already cached.
    pub fn seed(&mut self, rows: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in rows {
            self.entries.entry(key).or_insert_with(|| Cached {
                original: Some(value.clone()),
                current: Some(value),
            });
        }
    }

    /// Current rows within `range`, skipping removed ones.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .range(range)
            .filter_map(|(key, cached)| cached.current.as_ref().map(|value| (key, value)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.range(..)
    }

    /// Rows whose value differs from what the store holds.
    pub fn changes(self) -> Column<K, V> {
        self.entries
            .into_iter()
            .filter(|(_, cached)| cached.current != cached.original)
            .map(|(key, cached)| (key, cached.current))
            .collect()
    }
}

// BlockContext
// ----------------------------------------------------------------------------

pub struct BlockContext<'s, S> {
    store: &'s S,
    blocks: Cache<blocks::Key, blocks::Row>,
    bakers: Cache<bakers::Key, bakers::Row>,
    bakers_loaded: bool,
    accounts: Cache<accounts::Key, accounts::Row>,
    cycles: Cache<cycles::Key, cycles::Row>,
    baker_cycles: Cache<baker_cycles::Key, baker_cycles::Row>,
    rights: Cache<rights::Key, rights::Row>,
    rights_tables: Vec<RightsTable>,
    unstake_requests: Cache<unstake_requests::Key, unstake_requests::Row>,
    staking_updates: Cache<staking_updates::Key, staking_updates::Row>,
    next_staking_update: Option<staking_updates::Key>,
    seed_inputs: Cache<seed_inputs::Key, seed_inputs::Row>,
    delegations: Cache<delegations::Key, delegations::Row>,
}

impl<'s, S: ReadStore> BlockContext<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self {
            store,
            blocks: Cache::default(),
            bakers: Cache::default(),
            bakers_loaded: false,
            accounts: Cache::default(),
            cycles: Cache::default(),
            baker_cycles: Cache::default(),
            rights: Cache::default(),
            rights_tables: Vec::new(),
            unstake_requests: Cache::default(),
            staking_updates: Cache::default(),
            next_staking_update: None,
            seed_inputs: Cache::default(),
            delegations: Cache::default(),
        }
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    // Blocks

    pub fn block(&mut self, level: Level) -> Result<Option<&blocks::Row>, StoreError> {
        let store = self.store;
        self.blocks.get(&level, |k| store.block(k))
    }

    pub fn put_block(&mut self, row: blocks::Row) -> Result<(), StoreError> {
        let store = self.store;
        self.blocks.put(row.level, row, |k| store.block(k))
    }

    pub fn remove_block(&mut self, level: Level) -> Result<Option<blocks::Row>, StoreError> {
        let store = self.store;
        self.blocks.remove(&level, |k| store.block(k))
    }

    // Bakers

    pub fn baker(&mut self, id: AccountId) -> Result<Option<&bakers::Row>, StoreError> {
        let store = self.store;
        self.bakers.get(&id, |k| store.baker(k))
    }

    pub fn baker_mut(&mut self, id: AccountId) -> Result<Option<&mut bakers::Row>, StoreError> {
        let store = self.store;
        self.bakers.get_mut(&id, |k| store.baker(k))
    }

    pub fn is_baker(&mut self, id: AccountId) -> Result<bool, StoreError> {
        Ok(self.baker(id)?.is_some())
    }

    pub fn put_baker(&mut self, row: bakers::Row) -> Result<(), StoreError> {
        let store = self.store;
        self.bakers.put(row.id, row, |k| store.baker(k))
    }

    pub fn remove_baker(&mut self, id: AccountId) -> Result<Option<bakers::Row>, StoreError> {
        let store = self.store;
        self.bakers.remove(&id, |k| store.baker(k))
    }

    /// Every baker as of now, by id; rows changed by the block included.
    pub fn bakers(&mut self) -> Result<Vec<bakers::Row>, StoreError> {
        if !self.bakers_loaded {
            let store = self.store;
            self.bakers.seed(store.iter_bakers()?.map(|row| (row.id, row)));
            self.bakers_loaded = true;
        }
        Ok(self.bakers.iter().map(|(_, row)| row.clone()).collect())
    }

    // Accounts

    pub fn account(&mut self, id: AccountId) -> Result<Option<&accounts::Row>, StoreError> {
        let store = self.store;
        self.accounts.get(&id, |k| store.account(k))
    }

    pub fn account_mut(
        &mut self,
        id: AccountId,
    ) -> Result<Option<&mut accounts::Row>, StoreError> {
        let store = self.store;
        self.accounts.get_mut(&id, |k| store.account(k))
    }

    pub fn put_account(&mut self, id: AccountId, row: accounts::Row) -> Result<(), StoreError> {
        let store = self.store;
        self.accounts.put(id, row, |k| store.account(k))
    }

    pub fn remove_account(&mut self, id: AccountId) -> Result<Option<accounts::Row>, StoreError> {
        let store = self.store;
        self.accounts.remove(&id, |k| store.account(k))
    }

    /// Stakers of `baker`'s external pool as of now, by id.
    pub fn stakers_of(
        &mut self,
        baker: AccountId,
    ) -> Result<Vec<(AccountId, accounts::Row)>, StoreError> {
        let store = self.store;
        self.accounts.seed(store.stakers_of(baker)?);
        Ok(self
            .accounts
            .iter()
            .filter(|(_, row)| row.delegate == Some(baker) && row.is_staker())
            .map(|(id, row)| (*id, row.clone()))
            .collect())
    }

    /// Accounts cached by the block that were first seen at `level`.
    pub fn accounts_created_at(&self, level: Level) -> Vec<AccountId> {
        self.accounts
            .iter()
            .filter(|(_, row)| row.first_level == level)
            .map(|(id, _)| *id)
            .collect()
    }

    // Cycles

    pub fn cycle(&mut self, cycle: Cycle) -> Result<Option<&cycles::Row>, StoreError> {
        let store = self.store;
        self.cycles.get(&cycle, |k| store.cycle(k))
    }

    pub fn put_cycle(&mut self, row: cycles::Row) -> Result<(), StoreError> {
        let store = self.store;
        self.cycles.put(row.cycle, row, |k| store.cycle(k))
    }

    pub fn remove_cycle(&mut self, cycle: Cycle) -> Result<Option<cycles::Row>, StoreError> {
        let store = self.store;
        self.cycles.remove(&cycle, |k| store.cycle(k))
    }

    /// The most recent cycle, including those created by the block. Only meaningful while the
    /// block has not removed any cycle.
    pub fn last_cycle(&mut self) -> Result<Option<cycles::Row>, StoreError> {
        let store = self.store;
        self.cycles
            .seed(store.last_cycle()?.map(|row| (row.cycle, row)));
        Ok(self.cycles.iter().last().map(|(_, row)| row.clone()))
    }

    // Baker cycles

    pub fn baker_cycle(
        &mut self,
        key: baker_cycles::Key,
    ) -> Result<Option<&baker_cycles::Row>, StoreError> {
        let store = self.store;
        self.baker_cycles.get(&key, |k| store.baker_cycle(k))
    }

    pub fn baker_cycle_mut(
        &mut self,
        key: baker_cycles::Key,
    ) -> Result<Option<&mut baker_cycles::Row>, StoreError> {
        let store = self.store;
        self.baker_cycles.get_mut(&key, |k| store.baker_cycle(k))
    }

    /// The row of `key`, created at `level` when missing.
    pub fn baker_cycle_or_new(
        &mut self,
        key: baker_cycles::Key,
        level: Level,
    ) -> Result<&mut baker_cycles::Row, StoreError> {
        let store = self.store;
        let (cycle, baker) = key;
        let cached = self.baker_cycles.load(&key, |k| store.baker_cycle(k))?;
        Ok(cached
            .current
            .get_or_insert_with(|| baker_cycles::Row::new(cycle, baker, level)))
    }

    pub fn put_baker_cycle(&mut self, row: baker_cycles::Row) -> Result<(), StoreError> {
        let store = self.store;
        self.baker_cycles
            .put(row.key(), row, |k| store.baker_cycle(k))
    }

    pub fn remove_baker_cycle(
        &mut self,
        key: baker_cycles::Key,
    ) -> Result<Option<baker_cycles::Row>, StoreError> {
        let store = self.store;
        self.baker_cycles.remove(&key, |k| store.baker_cycle(k))
    }

    /// Rows of `cycle` as of now, by baker.
    pub fn baker_cycles(&mut self, cycle: Cycle) -> Result<Vec<baker_cycles::Row>, StoreError> {
        let store = self.store;
        self.baker_cycles
            .seed(store.baker_cycles(cycle)?.map(|row| (row.key(), row)));
        Ok(self
            .baker_cycles
            .range((cycle, AccountId::new(0))..=(cycle, AccountId::new(u32::MAX)))
            .map(|(_, row)| row.clone())
            .collect())
    }

    /// Rows of the block created at `level`, i.e. every row cached with that creation level.
    pub fn baker_cycles_created_at(&self, level: Level) -> Vec<baker_cycles::Key> {
        self.baker_cycles
            .iter()
            .filter(|(_, row)| row.created_at == level)
            .map(|(key, _)| *key)
            .collect()
    }

    // Rights

    /// Queue a whole table of freshly drawn rights, saved in bulk on commit.
    pub fn add_rights(&mut self, table: RightsTable) {
        self.rights_tables.push(table);
    }

    /// Rights at `level`, baking first, including those queued by the block.
    pub fn rights_at(&mut self, level: Level) -> Result<Vec<rights::Row>, StoreError> {
        let store = self.store;
        self.rights
            .seed(store.rights_at(level)?.map(|row| (row.key(), row)));
        let pending: Vec<_> = self
            .rights_tables
            .iter()
            .flat_map(|table| table.rows())
            .filter(|row| row.level == level)
            .map(|row| (row.key(), row))
            .collect();
        self.rights.seed(pending);
        Ok(self
            .rights
            .range(rights::level_range(level))
            .map(|(_, row)| row.clone())
            .collect())
    }

    /// Replace a right previously obtained through [`Self::rights_at`].
    pub fn put_right(&mut self, row: rights::Row) -> Result<(), StoreError> {
        let store = self.store;
        self.rights.put(row.key(), row, |k| store.right(k))
    }

    /// Remove the rights stored within `first..=last` that match `filter`.
    pub fn remove_rights_between(
        &mut self,
        first: Level,
        last: Level,
        filter: impl Fn(&rights::Row) -> bool,
    ) -> Result<(), StoreError> {
        let store = self.store;
        for row in store.rights_between(first, last)?.filter(|row| filter(row)) {
            self.rights.remove(&row.key(), |k| store.right(k))?;
        }
        Ok(())
    }

    // Unstake requests

    pub fn unstake_request(
        &mut self,
        key: unstake_requests::Key,
    ) -> Result<Option<&unstake_requests::Row>, StoreError> {
        let store = self.store;
        self.unstake_requests
            .get(&key, |k| store.unstake_request(k))
    }

    pub fn unstake_request_mut(
        &mut self,
        key: unstake_requests::Key,
    ) -> Result<Option<&mut unstake_requests::Row>, StoreError> {
        let store = self.store;
        self.unstake_requests
            .get_mut(&key, |k| store.unstake_request(k))
    }

    /// The request of `key`, created at `level` when missing.
    pub fn unstake_request_or_new(
        &mut self,
        key: unstake_requests::Key,
        level: Level,
    ) -> Result<&mut unstake_requests::Row, StoreError> {
        let store = self.store;
        let cached = self
            .unstake_requests
            .load(&key, |k| store.unstake_request(k))?;
        Ok(cached
            .current
            .get_or_insert_with(|| unstake_requests::Row::new(level)))
    }

    pub fn remove_unstake_request(
        &mut self,
        key: unstake_requests::Key,
    ) -> Result<Option<unstake_requests::Row>, StoreError> {
        let store = self.store;
        self.unstake_requests
            .remove(&key, |k| store.unstake_request(k))
    }

    /// Requests of `baker` for `cycle` as of now, by staker.
    pub fn unstake_requests(
        &mut self,
        baker: AccountId,
        cycle: Cycle,
    ) -> Result<Vec<(unstake_requests::Key, unstake_requests::Row)>, StoreError> {
        let store = self.store;
        self.unstake_requests
            .seed(store.unstake_requests(baker, cycle)?);
        Ok(self
            .unstake_requests
            .range((baker, cycle, None)..=(baker, cycle, Some(AccountId::new(u32::MAX))))
            .map(|(key, row)| (*key, row.clone()))
            .collect())
    }

    // Staking updates

    /// Append an update to the log, under the next id.
    pub fn push_staking_update(
        &mut self,
        row: impl FnOnce(staking_updates::Key) -> staking_updates::Row,
    ) -> Result<staking_updates::Row, StoreError> {
        let store = self.store;
        let id = match self.next_staking_update {
            Some(id) => id,
            None => store.last_staking_update_id()?.map_or(1, |id| id + 1),
        };
        self.next_staking_update = Some(id + 1);
        let row = row(id);
        self.staking_updates
            .put(id, row.clone(), |k| store.staking_update(k))?;
        Ok(row)
    }

    /// Updates recorded at `level`, by descending id.
    pub fn staking_updates_at(
        &mut self,
        level: Level,
    ) -> Result<Vec<staking_updates::Row>, StoreError> {
        let mut rows: Vec<_> = self.store.staking_updates_at(level)?.collect();
        rows.reverse();
        Ok(rows)
    }

    pub fn remove_staking_update(
        &mut self,
        id: staking_updates::Key,
    ) -> Result<Option<staking_updates::Row>, StoreError> {
        let store = self.store;
        self.staking_updates
            .remove(&id, |k| store.staking_update(k))
    }

    pub fn previous_staking_update(
        &self,
        key: &unstake_requests::Key,
        before: staking_updates::Key,
    ) -> Result<Option<staking_updates::Row>, StoreError> {
        self.store.previous_staking_update(key, before)
    }

    // Seed inputs

    pub fn put_seed_input(
        &mut self,
        key: seed_inputs::Key,
        row: seed_inputs::Row,
    ) -> Result<(), StoreError> {
        let store = self.store;
        self.seed_inputs.put(key, row, |k| store.seed_input(k))
    }

    pub fn remove_seed_inputs_at(&mut self, level: Level) -> Result<(), StoreError> {
        let store = self.store;
        for (key, _) in store.seed_inputs(level, level)? {
            self.seed_inputs.remove(&key, |k| store.seed_input(k))?;
        }
        Ok(())
    }

    /// Seed inputs of levels `first..=last` as saved so far, in block order.
    pub fn seed_inputs(
        &self,
        first: Level,
        last: Level,
    ) -> Result<Vec<seed_inputs::Row>, StoreError> {
        Ok(self
            .store
            .seed_inputs(first, last)?
            .map(|(_, row)| row)
            .collect())
    }

    // Delegations

    pub fn put_delegation_change(
        &mut self,
        key: delegations::Key,
        row: delegations::Row,
    ) -> Result<(), StoreError> {
        let store = self.store;
        self.delegations
            .put(key, row, |k| store.delegation_change(k))
    }

    /// Changes recorded at `level`, last first.
    pub fn delegation_changes_at(
        &mut self,
        level: Level,
    ) -> Result<Vec<(delegations::Key, delegations::Row)>, StoreError> {
        let mut rows: Vec<_> = self.store.delegation_changes_at(level)?.collect();
        rows.reverse();
        Ok(rows)
    }

    pub fn remove_delegation_change(&mut self, key: delegations::Key) -> Result<(), StoreError> {
        let store = self.store;
        self.delegations
            .remove(&key, |k| store.delegation_change(k))?;
        Ok(())
    }

    // Lifecycle

    pub fn into_changes(self, tip: Level) -> Changes {
        Changes {
            tip,
            blocks: self.blocks.changes(),
            bakers: self.bakers.changes(),
            accounts: self.accounts.changes(),
            cycles: self.cycles.changes(),
            baker_cycles: self.baker_cycles.changes(),
            rights: self.rights.changes(),
            unstake_requests: self.unstake_requests.changes(),
            staking_updates: self.staking_updates.changes(),
            seed_inputs: self.seed_inputs.changes(),
            delegations: self.delegations.changes(),
            rights_tables: self.rights_tables,
        }
    }

    /// Drop every change made through the context.
    pub fn discard(self) {}
}

impl<S: Store> BlockContext<'_, S> {
    /// Save every change made through the context in one go, moving the tip to `tip`.
    pub fn commit(self, tip: Level) -> Result<(), StoreError> {
        let store = self.store;
        store.save(self.into_changes(tip))
    }
}
