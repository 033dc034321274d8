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

//! Delegate changes: plain delegations, baker registrations and (de)activations.
//!
//! Every change is recorded with what it overwrote, so that reverting never has to look further
//! back than the change itself.

use crate::{
    context::BlockContext,
    state::{account_mut, baker_mut, InvariantError, LedgerError, Step, ValidationError},
    store::{
        columns::{
            accounts, bakers,
            delegations::{self, Change},
        },
        ReadStore,
    },
};
use bakehouse_kernel::{AccountId, Block, Mutez};
use tracing::{debug, instrument};

const EVENT_TARGET: &str = "bakehouse::ledger::delegations";

fn key(step: &Step<'_>, index: usize) -> delegations::Key {
    let index = u32::try_from(index)
        .unwrap_or_else(|_| unreachable!("more than u32::MAX changes in a single block"));
    (step.level, index)
}

fn attach<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    account: AccountId,
    delegate: AccountId,
    balance: Mutez,
) -> Result<(), LedgerError> {
    let baker = context
        .baker_mut(delegate)?
        .ok_or(InvariantError::DanglingDelegate { account, delegate })?;
    baker.delegated_balance += balance;
    baker.delegators_count += 1;
    Ok(())
}

fn detach<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    account: AccountId,
    delegate: AccountId,
    balance: Mutez,
) -> Result<(), LedgerError> {
    let baker = context
        .baker_mut(delegate)?
        .ok_or(InvariantError::DanglingDelegate { account, delegate })?;
    baker.delegated_balance -= balance;
    baker.delegators_count -= 1;
    Ok(())
}

// Apply
// ----------------------------------------------------------------------------

#[instrument(level = "trace", skip_all, name = "delegations.apply", fields(count = block.delegations.len()))]
pub fn apply<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    block: &Block,
) -> Result<(), LedgerError> {
    for (index, delegation) in block.delegations.iter().enumerate() {
        let account = delegation.account;

        let change = match delegation.delegate {
            Some(delegate) if delegate == account => register(context, step, account)?,
            target => delegate(context, step, account, target)?,
        };

        debug!(target: EVENT_TARGET, %account, ?change, "delegation.changed");

        context.put_delegation_change(key(step, index), delegations::Row { account, change })?;
    }

    Ok(())
}

/// Self-delegation: registers a new baker, or reactivates a known one.
fn register<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    account: AccountId,
) -> Result<Change, LedgerError> {
    if let Some(baker) = context.baker_mut(account)? {
        let change = Change::Reactivated {
            was_active: baker.active,
            previous_deactivation: baker.deactivation_level,
        };
        baker.active = true;
        baker.deactivation_level = None;
        return Ok(change);
    }

    let mut baker = bakers::Row::new(account, step.level);

    let replaced = context.remove_account(account)?;
    if let Some(row) = &replaced {
        if row.is_staker() || row.unstaked_balance != 0 {
            return Err(ValidationError::UnexpectedDelegation(account).into());
        }
        baker.balance = row.balance;
        if let Some(previous) = row.delegate {
            detach(context, account, previous, row.balance)?;
        }
    }

    context.put_baker(baker)?;

    Ok(Change::Registered { replaced })
}

/// Delegation of a plain account to `target`, or withdrawal of its delegation.
fn delegate<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    account: AccountId,
    target: Option<AccountId>,
) -> Result<Change, LedgerError> {
    if context.is_baker(account)? {
        return Err(ValidationError::UnexpectedDelegation(account).into());
    }

    if let Some(delegate) = target {
        if !context.is_baker(delegate)? {
            return Err(ValidationError::NotABaker { account, delegate }.into());
        }
    }

    if context.account(account)?.is_none() {
        context.put_account(account, accounts::Row::new(step.level))?;
    }

    let row = account_mut(context, account)?;
    if row.is_staker() {
        return Err(ValidationError::UnexpectedDelegation(account).into());
    }
    let previous = row.delegate;
    let balance = row.balance;
    row.delegate = target;

    if let Some(previous) = previous {
        detach(context, account, previous, balance)?;
    }
    if let Some(target) = target {
        attach(context, account, target, balance)?;
    }

    Ok(Change::Delegated { previous })
}

/// Mark the bakers the block deactivates. Their changes are numbered after the delegations'.
#[instrument(level = "trace", skip_all, name = "delegations.deactivate", fields(count = block.deactivated.len()))]
pub fn deactivate<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    block: &Block,
) -> Result<(), LedgerError> {
    let offset = block.delegations.len();

    for (index, account) in block.deactivated.iter().copied().enumerate() {
        let baker = context
            .baker_mut(account)?
            .ok_or(ValidationError::UnknownBaker(account))?;

        let change = Change::Deactivated {
            previous_deactivation: baker.deactivation_level,
        };
        baker.active = false;
        baker.deactivation_level = Some(step.level);

        debug!(target: EVENT_TARGET, baker = %account, "baker.deactivated");

        context.put_delegation_change(
            key(step, offset + index),
            delegations::Row { account, change },
        )?;
    }

    Ok(())
}

// Revert
// ----------------------------------------------------------------------------

pub fn revert_deactivations<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
) -> Result<(), LedgerError> {
    for (key, row) in context.delegation_changes_at(step.level)? {
        match row.change {
            Change::Deactivated {
                previous_deactivation,
            } => {
                let baker = baker_mut(context, row.account)?;
                baker.active = true;
                baker.deactivation_level = previous_deactivation;
                context.remove_delegation_change(key)?;
            }
            Change::Delegated { .. } | Change::Registered { .. } | Change::Reactivated { .. } => (),
        }
    }

    Ok(())
}

pub fn revert<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
) -> Result<(), LedgerError> {
    for (key, row) in context.delegation_changes_at(step.level)? {
        let account = row.account;

        match row.change {
            Change::Delegated { previous } => {
                let current = account_mut(context, account)?;
                let target = current.delegate;
                let balance = current.balance;
                current.delegate = previous;

                if let Some(target) = target {
                    detach(context, account, target, balance)?;
                }
                if let Some(previous) = previous {
                    attach(context, account, previous, balance)?;
                }
            }

            Change::Registered { replaced } => {
                context
                    .remove_baker(account)?
                    .ok_or(InvariantError::MissingBaker(account))?;

                if let Some(replaced) = replaced {
                    if let Some(previous) = replaced.delegate {
                        attach(context, account, previous, replaced.balance)?;
                    }
                    context.put_account(account, replaced)?;
                }
            }

            Change::Reactivated {
                was_active,
                previous_deactivation,
            } => {
                let baker = baker_mut(context, account)?;
                baker.active = was_active;
                baker.deactivation_level = previous_deactivation;
            }

            Change::Deactivated { .. } => continue,
        }

        context.remove_delegation_change(key)?;
    }

    Ok(())
}
