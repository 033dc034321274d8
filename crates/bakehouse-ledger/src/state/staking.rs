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

//! Staking accounting.
//!
//! A baker's own stake is tracked in mutez. External stakers share a single pool per baker, and
//! hold pseudotokens representing their claim on it: staking mints pseudotokens at the current
//! price of the pool, unstaking burns them. Rewards and slashes of the pool change its value but
//! not the amount of pseudotokens, and thereby the price.
//!
//! Every operation is logged as a [`staking_updates::Row`], carrying the exact deltas it
//! applied. Reverting a block replays the log backwards and never recomputes a price.

use crate::{
    context::BlockContext,
    evidence::Movement,
    state::{
        account_mut, baker_mut, balances::adjust_liquid, InvariantError, LedgerError, Step,
        ValidationError,
    },
    store::{
        columns::{bakers, staking_updates, staking_updates::Kind, unstake_requests},
        ReadStore,
    },
};
use bakehouse_kernel::{AccountId, Cycle, Mutez, Pseudotokens};
use num::{Signed, Zero};
use tracing::{debug, instrument};

const EVENT_TARGET: &str = "bakehouse::ledger::staking";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StakingError {
    #[error("{staker} unstakes from {baker} without holding any stake")]
    ZeroStake { baker: AccountId, staker: AccountId },
    #[error("{baker} unstakes {amount} of its own stake, which is only {staked}")]
    UnstakeExceedsStake {
        baker: AccountId,
        amount: Mutez,
        staked: Mutez,
    },
    #[error("{staker} burns {burned} pseudotokens but only holds {held}")]
    BurnExceedsHeld {
        staker: AccountId,
        burned: Pseudotokens,
        held: Pseudotokens,
    },
    #[error("staking {amount} with {baker} mints no pseudotokens")]
    ZeroMint { baker: AccountId, amount: Mutez },
    #[error("the pool of {baker} has issued pseudotokens but holds no stake")]
    EmptyPool { baker: AccountId },
    #[error(
        "{amount} exceeds the {remaining} remaining on the request of {staker:?} with {baker} \
         for cycle {cycle}"
    )]
    ExceedsRequest {
        baker: AccountId,
        staker: Option<AccountId>,
        cycle: Cycle,
        amount: Mutez,
        remaining: Mutez,
    },
    #[error("{0} stakes without a delegate")]
    NoDelegate(AccountId),
    #[error("{staker} stakes with {baker} but delegates to {delegate}")]
    WrongDelegate {
        staker: AccountId,
        baker: AccountId,
        delegate: AccountId,
    },
    #[error("unknown staker {0}")]
    UnknownStaker(AccountId),
}

// Prices
// ----------------------------------------------------------------------------

/// Pseudotokens worth `amount` in the pool of `baker`. An empty pool issues them 1:1.
pub fn mint(baker: &bakers::Row, amount: Mutez) -> Result<Pseudotokens, StakingError> {
    if baker.issued_pseudotokens.is_zero() {
        return Ok(Pseudotokens::from(amount));
    }

    if baker.external_staked <= 0 {
        return Err(StakingError::EmptyPool { baker: baker.id });
    }

    let minted = Pseudotokens::from(amount) * &baker.issued_pseudotokens
        / Pseudotokens::from(baker.external_staked);

    if minted.is_zero() && amount > 0 {
        return Err(StakingError::ZeroMint {
            baker: baker.id,
            amount,
        });
    }

    Ok(minted)
}

/// Pseudotokens to burn for `staker`, holding `held`, to withdraw `amount` from the pool of
/// `baker`. Withdrawing the whole value of the stake burns every pseudotoken held.
pub fn burn(
    baker: &bakers::Row,
    staker: AccountId,
    held: &Pseudotokens,
    amount: Mutez,
) -> Result<Pseudotokens, StakingError> {
    if !held.is_positive() || baker.issued_pseudotokens.is_zero() {
        return Err(StakingError::ZeroStake {
            baker: baker.id,
            staker,
        });
    }

    let value = held * Pseudotokens::from(baker.external_staked) / &baker.issued_pseudotokens;
    let amount = Pseudotokens::from(amount);

    let burned = if amount == value {
        held.clone()
    } else if value.is_positive() {
        held * amount / value
    } else {
        return Err(StakingError::ZeroStake {
            baker: baker.id,
            staker,
        });
    };

    if &burned > held {
        return Err(StakingError::BurnExceedsHeld {
            staker,
            burned,
            held: held.clone(),
        });
    }

    Ok(burned)
}

// Apply
// ----------------------------------------------------------------------------

/// Account for a staking movement. Other movements are ignored.
#[instrument(level = "trace", skip_all, name = "staking.apply")]
pub fn apply<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    movement: &Movement,
) -> Result<(), LedgerError> {
    let update = |cycle, baker, staker, kind, amount| staking_updates::Row {
        id: 0,
        level: step.level,
        cycle,
        baker,
        staker,
        kind,
        amount,
        pseudotokens: None,
        rounding_error: None,
    };

    match *movement {
        Movement::Stake {
            baker,
            staker,
            amount,
        } => {
            let mut row = update(step.cycle, baker, Some(staker), Kind::Stake, amount);
            if staker != baker {
                external_staking(context, step, baker, staker)?;
                row.pseudotokens = Some(mint(baker_mut(context, baker)?, amount)?);
            }
            record(context, step, row)
        }

        Movement::Unstake {
            baker,
            staker,
            cycle,
            amount,
        } => {
            let mut row = update(cycle, baker, Some(staker), Kind::Unstake, amount);
            if staker != baker {
                external_staking(context, step, baker, staker)?;
                let held = account_mut(context, staker)?.staked_pseudotokens.clone();
                let burned = burn(baker_mut(context, baker)?, staker, &held, amount)?;
                row.pseudotokens = Some(-burned);
            } else {
                own_unstake(baker_mut(context, baker)?, amount)?;
            }
            record(context, step, row)
        }

        Movement::Restake {
            baker,
            staker,
            cycle,
            amount,
        } => {
            let mut row = update(cycle, baker, Some(staker), Kind::Restake, amount);
            check_remaining(context, &row)?;
            if staker != baker {
                external_staking(context, step, baker, staker)?;
                row.pseudotokens = Some(mint(baker_mut(context, baker)?, amount)?);
            }
            record(context, step, row)
        }

        Movement::Finalize {
            baker,
            staker,
            cycle,
            amount,
        } => {
            let mut row = update(cycle, baker, Some(staker), Kind::Finalize, amount);
            let remaining = check_remaining(context, &row)?;
            if remaining != amount {
                row.rounding_error = Some(remaining - amount);
            }
            record(context, step, row)
        }

        Movement::SlashStaked {
            baker,
            staker,
            amount,
            ..
        } => {
            // Stakers share the pool's losses, a slash is never theirs alone.
            if let Some(staker) = staker.filter(|staker| *staker != baker) {
                return Err(InvariantError::ExternalStakedSlash { baker, staker }.into());
            }
            let row = update(step.cycle, baker, staker, Kind::SlashStaked, amount);
            record(context, step, row)
        }

        Movement::SlashUnstaked {
            baker,
            staker: Some(staker),
            cycle,
            amount,
            ..
        } => {
            let row = update(cycle, baker, Some(staker), Kind::SlashUnstaked, amount);
            record(context, step, row)
        }

        Movement::SlashUnstaked {
            baker,
            staker: None,
            cycle,
            amount,
            ..
        } => {
            let mut distributed = 0;
            for (share, staker) in slash_shares(context, baker, cycle, amount)? {
                distributed += share;
                let row = update(cycle, baker, Some(staker), Kind::SlashUnstaked, share);
                record(context, step, row)?;
            }

            let remainder = amount - distributed;
            if remainder != 0 {
                let mut row = update(cycle, baker, None, Kind::SlashUnstaked, 0);
                row.rounding_error = Some(remainder);
                record(context, step, row)?;
            }

            Ok(())
        }

        Movement::Reward { .. }
        | Movement::LostAttestingRewards { .. }
        | Movement::BlockFees { .. }
        | Movement::Transfer { .. }
        | Movement::Credit { .. }
        | Movement::Debit { .. } => Ok(()),
    }
}

/// A baker can only withdraw what it has frozen itself.
fn own_unstake(baker: &bakers::Row, amount: Mutez) -> Result<(), StakingError> {
    if baker.own_staked <= 0 {
        return Err(StakingError::ZeroStake {
            baker: baker.id,
            staker: baker.id,
        });
    }

    if amount > baker.own_staked {
        return Err(StakingError::UnstakeExceedsStake {
            baker: baker.id,
            amount,
            staked: baker.own_staked,
        });
    }

    Ok(())
}

/// External stakers can only stake with their own delegate, and only once the protocol allows it.
fn external_staking<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    baker: AccountId,
    staker: AccountId,
) -> Result<(), LedgerError> {
    if !step.rules.staking_enabled {
        return Err(ValidationError::StakingDisabled {
            level: step.level,
            protocol: step.rules.version,
        }
        .into());
    }

    let account = context
        .account(staker)?
        .ok_or(StakingError::UnknownStaker(staker))?;

    match account.delegate {
        None => Err(StakingError::NoDelegate(staker).into()),
        Some(delegate) if delegate != baker => Err(StakingError::WrongDelegate {
            staker,
            baker,
            delegate,
        }
        .into()),
        Some(_) => Ok(()),
    }
}

/// What the request touched by `row` still holds, provided it covers `row.amount`.
fn check_remaining<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    row: &staking_updates::Row,
) -> Result<Mutez, LedgerError> {
    let remaining = match row.request_key() {
        Some(key) => context
            .unstake_request(key)?
            .map(unstake_requests::Row::remaining)
            .unwrap_or_default(),
        None => 0,
    };

    if row.amount > remaining {
        return Err(StakingError::ExceedsRequest {
            baker: row.baker,
            staker: row.staker,
            cycle: row.cycle,
            amount: row.amount,
            remaining,
        }
        .into());
    }

    Ok(remaining)
}

/// Split a slash of the external stakers' pending unstakes over their requests, pro rata of what
/// each still has pending. Shares are rounded down.
fn slash_shares<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    baker: AccountId,
    cycle: Cycle,
    amount: Mutez,
) -> Result<Vec<(Mutez, AccountId)>, LedgerError> {
    let pending: Vec<(AccountId, Mutez)> = context
        .unstake_requests(baker, cycle)?
        .into_iter()
        .filter_map(|((_, _, staker), row)| match staker {
            Some(staker) if staker != baker && row.remaining() > 0 => {
                Some((staker, row.remaining()))
            }
            Some(_) | None => None,
        })
        .collect();

    let total: i128 = pending.iter().map(|(_, remaining)| i128::from(*remaining)).sum();
    if total == 0 {
        return Ok(Vec::new());
    }

    Ok(pending
        .into_iter()
        .filter_map(|(staker, remaining)| {
            let share = i128::from(amount) * i128::from(remaining) / total;
            let share = Mutez::try_from(share).unwrap_or_else(|_| {
                unreachable!("a share of {amount} is smaller than {amount}")
            });
            (share > 0).then_some((share, staker))
        })
        .collect())
}

/// Append `row` to the log and carry out its effects.
fn record<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    row: staking_updates::Row,
) -> Result<(), LedgerError> {
    let row = context.push_staking_update(|id| staking_updates::Row { id, ..row })?;

    effects(context, step, &row, 1)?;

    if let Some(key) = row.request_key() {
        let request = context.unstake_request_or_new(key, step.level)?;
        request_effects(request, &row, 1);
        request.updates_count += 1;
        request.last_level = step.level;
    }

    debug!(
        target: EVENT_TARGET,
        id = row.id,
        kind = ?row.kind,
        baker = %row.baker,
        staker = ?row.staker,
        amount = row.amount,
        "staking.update"
    );

    Ok(())
}

// Revert
// ----------------------------------------------------------------------------

/// Undo every staking update of the block, most recent first.
#[instrument(level = "trace", skip_all, name = "staking.revert", fields(level = %step.level))]
pub fn revert<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
) -> Result<(), LedgerError> {
    for row in context.staking_updates_at(step.level)? {
        effects(context, step, &row, -1)?;

        if let Some(key) = row.request_key() {
            let updates_left = {
                let request = context
                    .unstake_request_mut(key)?
                    .ok_or(InvariantError::MissingStakingUpdate { id: row.id })?;
                request_effects(request, &row, -1);
                request.updates_count -= 1;
                request.updates_count
            };

            if updates_left == 0 {
                context.remove_unstake_request(key)?;
            } else {
                let previous = context
                    .previous_staking_update(&key, row.id)?
                    .ok_or(InvariantError::MissingStakingUpdate { id: row.id })?;
                if let Some(request) = context.unstake_request_mut(key)? {
                    request.last_level = previous.level;
                }
            }
        }

        context.remove_staking_update(row.id)?;
    }

    Ok(())
}

// Effects
// ----------------------------------------------------------------------------

fn request_effects(request: &mut unstake_requests::Row, row: &staking_updates::Row, sign: Mutez) {
    let amount = sign * row.amount;
    let rounding_error = sign * row.rounding_error.unwrap_or_default();
    match row.kind {
        Kind::Unstake => request.requested += amount,
        Kind::Restake => request.restaked += amount,
        Kind::Finalize => {
            request.finalized += amount;
            request.rounding_error += rounding_error;
        }
        Kind::SlashUnstaked => {
            request.slashed += amount;
            request.rounding_error += rounding_error;
        }
        Kind::Stake | Kind::SlashStaked => (),
    }
}

/// Shift `delta` pseudotokens to `staker`, keeping the pool's issuance and stakers count along.
fn shift_pseudotokens<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    baker: AccountId,
    staker: AccountId,
    delta: &Pseudotokens,
) -> Result<(), LedgerError> {
    let account = account_mut(context, staker)?;
    let was_staker = account.staked_pseudotokens.is_positive();
    account.staked_pseudotokens += delta;
    let is_staker = account.staked_pseudotokens.is_positive();

    let pool = baker_mut(context, baker)?;
    pool.issued_pseudotokens += delta;
    match (was_staker, is_staker) {
        (false, true) => pool.stakers_count += 1,
        (true, false) => pool.stakers_count -= 1,
        (true, true) | (false, false) => (),
    }

    Ok(())
}

/// Balance changes of a logged update, forwards (`sign = 1`) or backwards (`sign = -1`).
fn effects<S: ReadStore>(
    context: &mut BlockContext<'_, S>,
    step: &Step<'_>,
    row: &staking_updates::Row,
    sign: Mutez,
) -> Result<(), LedgerError> {
    let baker = row.baker;
    let amount = sign * row.amount;
    let rounding_error = sign * row.rounding_error.unwrap_or_default();
    let pseudotokens = row
        .pseudotokens
        .as_ref()
        .map(|pt| pt * Pseudotokens::from(sign))
        .unwrap_or_default();

    let external = match row.staker {
        Some(staker) if staker != baker => Some(staker),
        Some(_) | None => None,
    };

    match (row.kind, external) {
        (Kind::Stake, None) => {
            let own = baker_mut(context, baker)?;
            own.balance -= amount;
            own.own_staked += amount;
        }
        (Kind::Stake, Some(staker)) => {
            adjust_liquid(context, step, staker, -amount)?;
            baker_mut(context, baker)?.external_staked += amount;
            shift_pseudotokens(context, baker, staker, &pseudotokens)?;
        }

        (Kind::Unstake, None) => {
            let own = baker_mut(context, baker)?;
            own.own_staked -= amount;
            own.own_unstaked += amount;
        }
        (Kind::Unstake, Some(staker)) => {
            shift_pseudotokens(context, baker, staker, &pseudotokens)?;
            let pool = baker_mut(context, baker)?;
            pool.external_staked -= amount;
            pool.external_unstaked += amount;
            account_mut(context, staker)?.unstaked_balance += amount;
        }

        (Kind::Restake, None) => {
            let own = baker_mut(context, baker)?;
            own.own_unstaked -= amount;
            own.own_staked += amount;
        }
        (Kind::Restake, Some(staker)) => {
            account_mut(context, staker)?.unstaked_balance -= amount;
            let pool = baker_mut(context, baker)?;
            pool.external_unstaked -= amount;
            pool.external_staked += amount;
            shift_pseudotokens(context, baker, staker, &pseudotokens)?;
        }

        (Kind::Finalize, None) => {
            let own = baker_mut(context, baker)?;
            own.own_unstaked -= amount + rounding_error;
            own.balance += amount;
        }
        (Kind::Finalize, Some(staker)) => {
            account_mut(context, staker)?.unstaked_balance -= amount + rounding_error;
            baker_mut(context, baker)?.external_unstaked -= amount + rounding_error;
            adjust_liquid(context, step, staker, amount)?;
        }

        (Kind::SlashStaked, None) => {
            let slashed = baker_mut(context, baker)?;
            match row.staker {
                None => slashed.external_staked -= amount,
                Some(_) => slashed.own_staked -= amount,
            }
        }
        (Kind::SlashStaked, Some(staker)) => {
            return Err(InvariantError::ExternalStakedSlash { baker, staker }.into());
        }

        (Kind::SlashUnstaked, None) if row.staker.is_none() => {
            baker_mut(context, baker)?.external_unstaked -= rounding_error;
        }
        (Kind::SlashUnstaked, None) => {
            baker_mut(context, baker)?.own_unstaked -= amount;
        }
        (Kind::SlashUnstaked, Some(staker)) => {
            account_mut(context, staker)?.unstaked_balance -= amount;
            baker_mut(context, baker)?.external_unstaked -= amount;
        }
    }

    Ok(())
}
