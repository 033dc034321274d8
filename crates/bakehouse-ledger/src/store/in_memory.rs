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

use crate::store::{columns::*, Changes, Column, ReadStore, Store, StoreError};
use bakehouse_kernel::{AccountId, Cycle, Level};
use std::{cell::RefCell, collections::BTreeMap};

/// A store held entirely in memory. Two stores holding the same rows compare equal, which makes
/// it a convenient reference when checking that reverting a block restores the previous state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    tip: RefCell<Option<Level>>,
    blocks: RefCell<BTreeMap<blocks::Key, blocks::Row>>,
    bakers: RefCell<BTreeMap<bakers::Key, bakers::Row>>,
    accounts: RefCell<BTreeMap<accounts::Key, accounts::Row>>,
    cycles: RefCell<BTreeMap<cycles::Key, cycles::Row>>,
    baker_cycles: RefCell<BTreeMap<baker_cycles::Key, baker_cycles::Row>>,
    rights: RefCell<BTreeMap<rights::Key, rights::Row>>,
    unstake_requests: RefCell<BTreeMap<unstake_requests::Key, unstake_requests::Row>>,
    staking_updates: RefCell<BTreeMap<staking_updates::Key, staking_updates::Row>>,
    seed_inputs: RefCell<BTreeMap<seed_inputs::Key, seed_inputs::Row>>,
    delegations: RefCell<BTreeMap<delegations::Key, delegations::Row>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len_rights(&self) -> usize {
        self.rights.borrow().len()
    }
}

fn get<K: Ord, V: Clone>(column: &RefCell<BTreeMap<K, V>>, key: &K) -> Option<V> {
    column.borrow().get(key).cloned()
}

fn apply<K: Ord, V>(column: &RefCell<BTreeMap<K, V>>, changes: Column<K, V>) {
    let mut column = column.borrow_mut();
    for (key, row) in changes {
        match row {
            Some(row) => {
                column.insert(key, row);
            }
            None => {
                column.remove(&key);
            }
        }
    }
}

impl ReadStore for MemoryStore {
    fn tip(&self) -> Result<Option<blocks::Row>, StoreError> {
        let tip = *self.tip.borrow();
        Ok(tip.and_then(|level| get(&self.blocks, &level)))
    }

    fn block(&self, level: &blocks::Key) -> Result<Option<blocks::Row>, StoreError> {
        Ok(get(&self.blocks, level))
    }

    fn baker(&self, id: &bakers::Key) -> Result<Option<bakers::Row>, StoreError> {
        Ok(get(&self.bakers, id))
    }

    fn account(&self, id: &accounts::Key) -> Result<Option<accounts::Row>, StoreError> {
        Ok(get(&self.accounts, id))
    }

    fn cycle(&self, cycle: &cycles::Key) -> Result<Option<cycles::Row>, StoreError> {
        Ok(get(&self.cycles, cycle))
    }

    fn baker_cycle(
        &self,
        key: &baker_cycles::Key,
    ) -> Result<Option<baker_cycles::Row>, StoreError> {
        Ok(get(&self.baker_cycles, key))
    }

    fn right(&self, key: &rights::Key) -> Result<Option<rights::Row>, StoreError> {
        Ok(get(&self.rights, key))
    }

    fn unstake_request(
        &self,
        key: &unstake_requests::Key,
    ) -> Result<Option<unstake_requests::Row>, StoreError> {
        Ok(get(&self.unstake_requests, key))
    }

    fn staking_update(
        &self,
        id: &staking_updates::Key,
    ) -> Result<Option<staking_updates::Row>, StoreError> {
        Ok(get(&self.staking_updates, id))
    }

    fn seed_input(&self, key: &seed_inputs::Key) -> Result<Option<seed_inputs::Row>, StoreError> {
        Ok(get(&self.seed_inputs, key))
    }

    fn delegation_change(
        &self,
        key: &delegations::Key,
    ) -> Result<Option<delegations::Row>, StoreError> {
        Ok(get(&self.delegations, key))
    }

    #[allow(refining_impl_trait)]
    fn iter_bakers(&self) -> Result<std::vec::IntoIter<bakers::Row>, StoreError> {
        let rows: Vec<_> = self.bakers.borrow().values().cloned().collect();
        Ok(rows.into_iter())
    }

    fn last_cycle(&self) -> Result<Option<cycles::Row>, StoreError> {
        Ok(self
            .cycles
            .borrow()
            .last_key_value()
            .map(|(_, row)| row.clone()))
    }

    #[allow(refining_impl_trait)]
    fn cycles_created_at(
        &self,
        level: Level,
    ) -> Result<std::vec::IntoIter<cycles::Row>, StoreError> {
        let rows: Vec<_> = self
            .cycles
            .borrow()
            .values()
            .filter(|row| row.created_at == level)
            .cloned()
            .collect();
        Ok(rows.into_iter())
    }

    #[allow(refining_impl_trait)]
    fn baker_cycles(
        &self,
        cycle: Cycle,
    ) -> Result<std::vec::IntoIter<baker_cycles::Row>, StoreError> {
        let rows: Vec<_> = self
            .baker_cycles
            .borrow()
            .range((cycle, AccountId::new(0))..=(cycle, AccountId::new(u32::MAX)))
            .map(|(_, row)| row.clone())
            .collect();
        Ok(rows.into_iter())
    }

    #[allow(refining_impl_trait)]
    fn rights_at(&self, level: Level) -> Result<std::vec::IntoIter<rights::Row>, StoreError> {
        self.rights_between(level, level)
    }

    #[allow(refining_impl_trait)]
    fn rights_between(
        &self,
        first: Level,
        last: Level,
    ) -> Result<std::vec::IntoIter<rights::Row>, StoreError> {
        let rows: Vec<_> = self
            .rights
            .borrow()
            .range(*rights::level_range(first).start()..=*rights::level_range(last).end())
            .map(|(_, row)| row.clone())
            .collect();
        Ok(rows.into_iter())
    }

    #[allow(refining_impl_trait)]
    fn rights_in(&self, cycle: Cycle) -> Result<std::vec::IntoIter<rights::Row>, StoreError> {
        let rows: Vec<_> = self
            .rights
            .borrow()
            .values()
            .filter(|row| row.cycle == cycle)
            .cloned()
            .collect();
        Ok(rows.into_iter())
    }

    #[allow(refining_impl_trait)]
    fn unstake_requests(
        &self,
        baker: AccountId,
        cycle: Cycle,
    ) -> Result<std::vec::IntoIter<(unstake_requests::Key, unstake_requests::Row)>, StoreError>
    {
        let rows: Vec<_> = self
            .unstake_requests
            .borrow()
            .range((baker, cycle, None)..=(baker, cycle, Some(AccountId::new(u32::MAX))))
            .map(|(key, row)| (*key, row.clone()))
            .collect();
        Ok(rows.into_iter())
    }

    #[allow(refining_impl_trait)]
    fn staking_updates_at(
        &self,
        level: Level,
    ) -> Result<std::vec::IntoIter<staking_updates::Row>, StoreError> {
        let rows: Vec<_> = self
            .staking_updates
            .borrow()
            .values()
            .filter(|row| row.level == level)
            .cloned()
            .collect();
        Ok(rows.into_iter())
    }

    fn previous_staking_update(
        &self,
        key: &unstake_requests::Key,
        before: staking_updates::Key,
    ) -> Result<Option<staking_updates::Row>, StoreError> {
        Ok(self
            .staking_updates
            .borrow()
            .range(..before)
            .rev()
            .map(|(_, row)| row)
            .find(|row| row.request_key().as_ref() == Some(key))
            .cloned())
    }

    fn last_staking_update_id(&self) -> Result<Option<staking_updates::Key>, StoreError> {
        Ok(self.staking_updates.borrow().last_key_value().map(|(id, _)| *id))
    }

    #[allow(refining_impl_trait)]
    fn seed_inputs(
        &self,
        first: Level,
        last: Level,
    ) -> Result<std::vec::IntoIter<(seed_inputs::Key, seed_inputs::Row)>, StoreError> {
        let rows: Vec<_> = self
            .seed_inputs
            .borrow()
            .range((first, 0)..=(last, u32::MAX))
            .map(|(key, row)| (*key, row.clone()))
            .collect();
        Ok(rows.into_iter())
    }

    #[allow(refining_impl_trait)]
    fn delegation_changes_at(
        &self,
        level: Level,
    ) -> Result<std::vec::IntoIter<(delegations::Key, delegations::Row)>, StoreError> {
        let rows: Vec<_> = self
            .delegations
            .borrow()
            .range((level, 0)..=(level, u32::MAX))
            .map(|(key, row)| (*key, row.clone()))
            .collect();
        Ok(rows.into_iter())
    }

    #[allow(refining_impl_trait)]
    fn stakers_of(
        &self,
        baker: AccountId,
    ) -> Result<std::vec::IntoIter<(accounts::Key, accounts::Row)>, StoreError> {
        let rows: Vec<_> = self
            .accounts
            .borrow()
            .iter()
            .filter(|(_, row)| row.delegate == Some(baker) && row.is_staker())
            .map(|(id, row)| (*id, row.clone()))
            .collect();
        Ok(rows.into_iter())
    }
}

impl Store for MemoryStore {
    fn save(&self, changes: Changes) -> Result<(), StoreError> {
        let Changes {
            tip,
            blocks,
            bakers,
            accounts,
            cycles,
            baker_cycles,
            rights,
            unstake_requests,
            staking_updates,
            seed_inputs,
            delegations,
            rights_tables,
        } = changes;

        {
            let mut column = self.rights.borrow_mut();
            for table in rights_tables {
                for row in table.rows() {
                    column.insert(row.key(), row);
                }
            }
        }

        apply(&self.blocks, blocks);
        apply(&self.bakers, bakers);
        apply(&self.accounts, accounts);
        apply(&self.cycles, cycles);
        apply(&self.baker_cycles, baker_cycles);
        apply(&self.rights, rights);
        apply(&self.unstake_requests, unstake_requests);
        apply(&self.staking_updates, staking_updates);
        apply(&self.seed_inputs, seed_inputs);
        apply(&self.delegations, delegations);

        *self.tip.borrow_mut() = Some(tip);

        Ok(())
    }
}
