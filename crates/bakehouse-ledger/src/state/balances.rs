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

use crate::{
    context::BlockContext,
    evidence::Movement,
    state::{baker_mut, staking, InvariantError, LedgerError, Step, ValidationError},
    store::{
        columns::{accounts, baker_cycles::Bucket},
        ReadStore,
    },
};
use bakehouse_kernel::{AccountId, Mutez};
use tracing::{instrument, trace};

const EVENT_TARGET: &str = "bakehouse::ledger::balances";

/// Move `delta` in or out of the liquid balance of `account`. Plain accounts are created on
/// first sight, and their delegate's delegated balance follows theirs.
pub fn adjust_liquid<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    account: AccountId,
    delta: Mutez,
) -> Result<(), LedgerError> {
    if let Some(baker) = context.baker_mut(account)? {
        baker.balance += delta;
        return Ok(());
    }

    let delegate = match context.account_mut(account)? {
        Some(row) => {
            row.balance += delta;
            row.delegate
        }
        None => {
            let mut row = accounts::Row::new(step.level);
            row.balance = delta;
            context.put_account(account, row)?;
            None
        }
    };

    if let Some(delegate) = delegate {
        context
            .baker_mut(delegate)?
            .ok_or(InvariantError::DanglingDelegate { account, delegate })?
            .delegated_balance += delta;
    }

    Ok(())
}

fn credit_reward<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    baker: AccountId,
    bucket: Bucket,
    amount: Mutez,
) -> Result<(), LedgerError> {
    let row = context
        .baker_mut(baker)?
        .ok_or(ValidationError::UnattributableReward {
            level: step.level,
            baker,
        })?;
    match bucket {
        Bucket::Delegated => row.balance += amount,
        Bucket::StakedOwn | Bucket::StakedEdge => row.own_staked += amount,
        Bucket::StakedShared => row.external_staked += amount,
    }
    Ok(())
}

/// Apply every movement of the block, in order. `sign` is `-1` when reverting; staking movements
/// are then left to [`staking::revert`], which replays the log instead.
fn replay<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    movement: &Movement,
    sign: Mutez,
) -> Result<(), LedgerError> {
    match movement {
        Movement::Reward {
            kind,
            baker,
            bucket,
            amount,
        } => {
            credit_reward(context, step, *baker, *bucket, sign * amount)?;
            if kind.is_revelation() {
                context
                    .baker_cycle_or_new((step.cycle, *baker), step.level)?
                    .revelation_rewards
                    .add(*bucket, sign * amount);
            }
        }

        // Minted and burned at once; only the cycle settlement cares.
        Movement::LostAttestingRewards { .. } => (),

        Movement::BlockFees { baker, amount } => {
            baker_mut(context, *baker)?.balance += sign * amount;
            context
                .baker_cycle_or_new((step.cycle, *baker), step.level)?
                .block_fees += sign * amount;
        }

        Movement::Transfer { from, to, amount } => {
            adjust_liquid(context, step, *from, -sign * amount)?;
            adjust_liquid(context, step, *to, sign * amount)?;
        }

        Movement::Credit { account, amount } => {
            adjust_liquid(context, step, *account, sign * amount)?;
        }

        Movement::Debit { account, amount } => {
            adjust_liquid(context, step, *account, -sign * amount)?;
        }

        Movement::SlashStaked {
            baker,
            amount,
            beneficiary,
            ..
        } => {
            if sign > 0 {
                staking::apply(context, step, movement)?;
            }
            context
                .baker_cycle_or_new((step.cycle, *baker), step.level)?
                .slashed_staked += sign * amount;
            if let Some(beneficiary) = beneficiary {
                adjust_liquid(context, step, *beneficiary, sign * amount)?;
            }
        }

        Movement::SlashUnstaked {
            baker,
            amount,
            beneficiary,
            ..
        } => {
            if sign > 0 {
                staking::apply(context, step, movement)?;
            }
            context
                .baker_cycle_or_new((step.cycle, *baker), step.level)?
                .slashed_unstaked += sign * amount;
            if let Some(beneficiary) = beneficiary {
                adjust_liquid(context, step, *beneficiary, sign * amount)?;
            }
        }

        Movement::Stake { .. }
        | Movement::Unstake { .. }
        | Movement::Restake { .. }
        | Movement::Finalize { .. } => {
            if sign > 0 {
                staking::apply(context, step, movement)?;
            }
        }
    }

    Ok(())
}

#[instrument(level = "trace", skip_all, name = "balances.apply", fields(movements = movements.len()))]
pub fn apply<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    movements: &[Movement],
) -> Result<(), LedgerError> {
    for movement in movements {
        trace!(target: EVENT_TARGET, ?movement, "movement");
        replay(context, step, movement, 1)?;
    }
    Ok(())
}

pub fn revert<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    movements: &[Movement],
) -> Result<(), LedgerError> {
    for movement in movements.iter().rev() {
        replay(context, step, movement, -1)?;
    }
    Ok(())
}
